//! Record handlers

use std::net::SocketAddr;

use axum::{extract::{ConnectInfo, State}, Json};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::{AppState, AppResult};
use crate::models::{self, HttpRecord, HttpRecordFilter};
use crate::query::{Order, Page};

use super::{succeed, ApiQuery};

/// Query string of the HTTP record endpoints
#[derive(Debug, Deserialize, Default)]
pub struct RecordsQuery {
    pub flag: Option<String>,
    pub method: Option<String>,
    pub uri: Option<String>,
    pub remote_ip: Option<String>,
    pub rule_name: Option<String>,
    pub order: Option<String>,
    pub page: Option<String>,
    #[serde(rename = "pageSize")]
    pub page_size: Option<String>,
    pub anchor: Option<String>,
}

impl RecordsQuery {
    fn filter(&self) -> HttpRecordFilter {
        HttpRecordFilter {
            flag: self.flag.clone(),
            method: self.method.clone(),
            uri: self.uri.clone(),
            remote_ip: self.remote_ip.clone(),
            rule_name: self.rule_name.clone(),
        }
    }
}

/// List HTTP records
pub async fn list(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<RecordsQuery>,
) -> AppResult<Json<Value>> {
    let page = Page::parse(query.page.as_deref(), query.page_size.as_deref())?
        .with_anchor(query.anchor.as_deref())?;
    let order = Order::parse(query.order.as_deref());

    let result = models::list::<HttpRecord>(&state.storage, &query.filter(), order, page).await?;
    Ok(succeed(result))
}

/// Delete HTTP records matching the filters. No filters deletes every record.
pub async fn purge(
    State(state): State<AppState>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    ApiQuery(query): ApiQuery<RecordsQuery>,
) -> AppResult<Json<Value>> {
    let filter = query.filter();
    let removed = models::purge::<HttpRecord>(&state.storage, &filter).await?;

    let caller = connect_info
        .map(|ConnectInfo(addr)| addr.to_string())
        .unwrap_or_else(|| "unknown".to_string());
    tracing::info!("{} http records deleted by {}", removed, caller);

    Ok(succeed(json!({ "removed": removed })))
}
