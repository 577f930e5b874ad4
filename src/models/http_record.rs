//! HTTP interaction record

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::db::Storage;
use crate::error::RecordError;
use crate::query::Predicate;

use super::record::{persist, BaseRecord, Record, RecordFilter, Value};
use super::rule::HttpRule;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct HttpRecord {
    #[serde(flatten)]
    #[sqlx(flatten)]
    pub base: BaseRecord,
    pub method: String,
    pub uri: String,
    /// Request exactly as captured
    pub raw_request: String,
    /// Rule that matched, loaded only for enrichment and never stored with the record
    #[serde(skip)]
    #[sqlx(skip)]
    pub rule: Option<HttpRule>,
}

/// What the HTTP listener hands over for one matched request
#[derive(Debug, Clone, Default)]
pub struct HttpInteraction {
    pub flag: String,
    pub method: String,
    pub uri: String,
    pub remote_ip: String,
    pub ip_area: String,
    pub raw_request: String,
}

/// Optional filters; unset fields do not constrain the result
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HttpRecordFilter {
    pub flag: Option<String>,
    pub method: Option<String>,
    pub uri: Option<String>,
    pub remote_ip: Option<String>,
    pub rule_name: Option<String>,
}

impl RecordFilter for HttpRecordFilter {
    fn predicate(&self) -> Predicate {
        Predicate::new()
            .eq("flag", self.flag.as_deref())
            .eq("method", self.method.as_deref())
            .contains("uri", self.uri.as_deref())
            .eq("remote_ip", self.remote_ip.as_deref())
            .eq("rule_name", self.rule_name.as_deref())
    }
}

impl Record for HttpRecord {
    const TABLE_NAME: &'static str = "http_records";
    const KIND: &'static str = "http";

    type Filter = HttpRecordFilter;

    fn base(&self) -> &BaseRecord {
        &self.base
    }

    fn columns(&self) -> Vec<(&'static str, Value)> {
        let mut columns = self.base.columns();
        columns.push(("method", Value::Text(self.method.clone())));
        columns.push(("uri", Value::Text(self.uri.clone())));
        columns.push(("raw_request", Value::Text(self.raw_request.clone())));
        columns
    }

    fn notice_fields(&self) -> Vec<(&'static str, String)> {
        let mut fields = self.base.notice_fields();
        fields.push(("method", self.method.clone()));
        fields.push(("uri", self.uri.clone()));
        fields
    }

    fn wants_notice(&self) -> bool {
        self.rule.as_ref().map_or(true, |rule| rule.notice)
    }
}

impl HttpRecord {
    /// Build a record for `interaction` matched by `rule` and store it.
    ///
    /// Notification is left to the caller.
    pub async fn create(
        storage: &Storage,
        rule: &HttpRule,
        interaction: HttpInteraction,
    ) -> Result<Self, RecordError> {
        let record = HttpRecord {
            base: BaseRecord::new(
                interaction.flag,
                interaction.remote_ip,
                interaction.ip_area,
                &rule.name,
            ),
            method: interaction.method,
            uri: interaction.uri,
            raw_request: interaction.raw_request,
            rule: None,
        };

        let mut stored = persist(storage, &record).await?;
        stored.rule = Some(rule.clone());
        Ok(stored)
    }
}
