//! HTTP rule model
//!
//! Rules are matched by the detection service; this crate stores them so
//! records can reference them by name. Renaming a rule renames the reference
//! on its records, deleting one clears it. Records are never removed with it.

use serde::{Deserialize, Serialize};
use sqlx::{types::Json, FromRow};
use chrono::{DateTime, Utc};
use validator::Validate;

use crate::db::{Backend, Storage};
use crate::error::RecordError;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResponseHeader {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct HttpRule {
    pub name: String,
    pub flag_format: String,
    pub rank: i32,
    pub push_to_client: bool,
    pub notice: bool,
    pub response_status_code: String,
    pub response_headers: Json<Vec<ResponseHeader>>,
    pub response_body: String,
    pub created_at: DateTime<Utc>,
}

fn default_status_code() -> String {
    "200".to_string()
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateRule {
    #[validate(length(min = 1, max = 255))]
    pub name: String,
    #[validate(length(min = 1, max = 255))]
    pub flag_format: String,
    #[serde(default)]
    pub rank: i32,
    #[serde(default)]
    pub push_to_client: bool,
    #[serde(default)]
    pub notice: bool,
    #[serde(default = "default_status_code")]
    #[validate(length(min = 3, max = 3))]
    pub response_status_code: String,
    #[serde(default)]
    pub response_headers: Vec<ResponseHeader>,
    #[serde(default)]
    pub response_body: String,
}

/// Partial update. `name` renames the rule.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct UpdateRule {
    #[validate(length(min = 1, max = 255))]
    pub name: Option<String>,
    #[validate(length(min = 1, max = 255))]
    pub flag_format: Option<String>,
    pub rank: Option<i32>,
    pub push_to_client: Option<bool>,
    pub notice: Option<bool>,
    #[validate(length(min = 3, max = 3))]
    pub response_status_code: Option<String>,
    pub response_headers: Option<Vec<ResponseHeader>>,
    pub response_body: Option<String>,
}

impl HttpRule {
    pub async fn create(storage: &Storage, data: CreateRule) -> Result<Self, RecordError> {
        let created_at = Utc::now();
        let headers = Json(data.response_headers);
        let _guard = storage.gate().acquire().await;

        let rule = match storage.backend() {
            Backend::Sqlite(pool) => {
                sqlx::query_as::<_, HttpRule>(
                    r#"
                    INSERT INTO http_rules (name, flag_format, rank, push_to_client, notice,
                        response_status_code, response_headers, response_body, created_at)
                    VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                    RETURNING *
                    "#
                )
                .bind(&data.name)
                .bind(&data.flag_format)
                .bind(data.rank)
                .bind(data.push_to_client)
                .bind(data.notice)
                .bind(&data.response_status_code)
                .bind(&headers)
                .bind(&data.response_body)
                .bind(created_at)
                .fetch_one(pool)
                .await?
            }
            Backend::Postgres(pool) => {
                sqlx::query_as::<_, HttpRule>(
                    r#"
                    INSERT INTO http_rules (name, flag_format, rank, push_to_client, notice,
                        response_status_code, response_headers, response_body, created_at)
                    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                    RETURNING *
                    "#
                )
                .bind(&data.name)
                .bind(&data.flag_format)
                .bind(data.rank)
                .bind(data.push_to_client)
                .bind(data.notice)
                .bind(&data.response_status_code)
                .bind(&headers)
                .bind(&data.response_body)
                .bind(created_at)
                .fetch_one(pool)
                .await?
            }
        };

        tracing::info!("HTTP rule created: {}", rule.name);
        Ok(rule)
    }

    pub async fn find_by_name(storage: &Storage, name: &str) -> Result<Option<Self>, RecordError> {
        let rule = match storage.backend() {
            Backend::Sqlite(pool) => {
                sqlx::query_as::<_, HttpRule>("SELECT * FROM http_rules WHERE name = ?")
                    .bind(name)
                    .fetch_optional(pool)
                    .await?
            }
            Backend::Postgres(pool) => {
                sqlx::query_as::<_, HttpRule>("SELECT * FROM http_rules WHERE name = $1")
                    .bind(name)
                    .fetch_optional(pool)
                    .await?
            }
        };
        Ok(rule)
    }

    /// All rules, highest rank first
    pub async fn list(storage: &Storage) -> Result<Vec<Self>, RecordError> {
        const SQL: &str = "SELECT * FROM http_rules ORDER BY rank DESC, name ASC";

        let rules = match storage.backend() {
            Backend::Sqlite(pool) => sqlx::query_as::<_, HttpRule>(SQL).fetch_all(pool).await?,
            Backend::Postgres(pool) => sqlx::query_as::<_, HttpRule>(SQL).fetch_all(pool).await?,
        };
        Ok(rules)
    }

    pub async fn update(
        storage: &Storage,
        name: &str,
        data: UpdateRule,
    ) -> Result<Option<Self>, RecordError> {
        let headers = data.response_headers.map(Json);
        let _guard = storage.gate().acquire().await;

        let rule = match storage.backend() {
            Backend::Sqlite(pool) => {
                sqlx::query_as::<_, HttpRule>(
                    r#"
                    UPDATE http_rules
                    SET name = COALESCE(?, name),
                        flag_format = COALESCE(?, flag_format),
                        rank = COALESCE(?, rank),
                        push_to_client = COALESCE(?, push_to_client),
                        notice = COALESCE(?, notice),
                        response_status_code = COALESCE(?, response_status_code),
                        response_headers = COALESCE(?, response_headers),
                        response_body = COALESCE(?, response_body)
                    WHERE name = ?
                    RETURNING *
                    "#
                )
                .bind(&data.name)
                .bind(&data.flag_format)
                .bind(data.rank)
                .bind(data.push_to_client)
                .bind(data.notice)
                .bind(&data.response_status_code)
                .bind(&headers)
                .bind(&data.response_body)
                .bind(name)
                .fetch_optional(pool)
                .await?
            }
            Backend::Postgres(pool) => {
                sqlx::query_as::<_, HttpRule>(
                    r#"
                    UPDATE http_rules
                    SET name = COALESCE($1, name),
                        flag_format = COALESCE($2, flag_format),
                        rank = COALESCE($3, rank),
                        push_to_client = COALESCE($4, push_to_client),
                        notice = COALESCE($5, notice),
                        response_status_code = COALESCE($6, response_status_code),
                        response_headers = COALESCE($7, response_headers),
                        response_body = COALESCE($8, response_body)
                    WHERE name = $9
                    RETURNING *
                    "#
                )
                .bind(&data.name)
                .bind(&data.flag_format)
                .bind(data.rank)
                .bind(data.push_to_client)
                .bind(data.notice)
                .bind(&data.response_status_code)
                .bind(&headers)
                .bind(&data.response_body)
                .bind(name)
                .fetch_optional(pool)
                .await?
            }
        };

        if let Some(rule) = &rule {
            if rule.name != name {
                tracing::info!("HTTP rule renamed: {} -> {}", name, rule.name);
            }
        }
        Ok(rule)
    }

    /// Delete a rule. Records that referenced it are kept with no rule.
    pub async fn delete(storage: &Storage, name: &str) -> Result<bool, RecordError> {
        let _guard = storage.gate().acquire().await;

        let result = match storage.backend() {
            Backend::Sqlite(pool) => {
                sqlx::query("DELETE FROM http_rules WHERE name = ?")
                    .bind(name)
                    .execute(pool)
                    .await?
                    .rows_affected()
            }
            Backend::Postgres(pool) => {
                sqlx::query("DELETE FROM http_rules WHERE name = $1")
                    .bind(name)
                    .execute(pool)
                    .await?
                    .rows_affected()
            }
        };
        Ok(result > 0)
    }
}
