//! Base record model and the kind-independent record operations
//!
//! Every record kind embeds a [`BaseRecord`] and implements [`Record`].
//! [`persist`], [`list`] and [`purge`] only ever see that contract; the
//! kind-specific columns live in the kind's own `columns()` and filter.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{postgres::PgRow, sqlite::SqliteRow, FromRow};

use crate::db::Storage;
use crate::error::RecordError;
use crate::notice::{Notice, Notifier};
use crate::query::{Order, Page, Predicate};

/// Fields shared by every record kind
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq)]
pub struct BaseRecord {
    /// Assigned by the store, strictly increasing
    pub id: i64,
    /// Correlation token of the probe that triggered the interaction
    pub flag: String,
    pub remote_ip: String,
    pub ip_area: String,
    /// Detection time. Not guaranteed to follow `id` order.
    pub request_time: DateTime<Utc>,
    /// Set to NULL by the store when the rule is deleted
    pub rule_name: Option<String>,
}

impl BaseRecord {
    /// New, not yet stored base with the detection time set to now.
    ///
    /// The time is taken before the write gate, so under contention
    /// `request_time` order may differ from `id` order. Sort by `id`.
    pub fn new(
        flag: impl Into<String>,
        remote_ip: impl Into<String>,
        ip_area: impl Into<String>,
        rule_name: &str,
    ) -> Self {
        Self {
            id: 0,
            flag: flag.into(),
            remote_ip: remote_ip.into(),
            ip_area: ip_area.into(),
            request_time: Utc::now(),
            rule_name: Some(rule_name.to_string()),
        }
    }

    /// Insertable columns. `id` is left to the store.
    pub fn columns(&self) -> Vec<(&'static str, Value)> {
        vec![
            ("flag", Value::Text(self.flag.clone())),
            ("remote_ip", Value::Text(self.remote_ip.clone())),
            ("ip_area", Value::Text(self.ip_area.clone())),
            ("request_time", Value::Timestamp(self.request_time)),
            ("rule_name", Value::Nullable(self.rule_name.clone())),
        ]
    }

    pub fn notice_fields(&self) -> Vec<(&'static str, String)> {
        vec![
            ("flag", self.flag.clone()),
            ("remote_ip", self.remote_ip.clone()),
            ("ip_area", self.ip_area.clone()),
            ("request_time", self.request_time.to_rfc3339()),
            ("rule_name", self.rule_name.clone().unwrap_or_default()),
        ]
    }
}

/// A column value to bind on insert
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Text(String),
    Nullable(Option<String>),
    Timestamp(DateTime<Utc>),
}

/// Maps a kind's optional filter fields to a predicate
pub trait RecordFilter: Send + Sync {
    fn predicate(&self) -> Predicate;
}

/// Contract every persisted record kind implements
pub trait Record:
    Serialize
    + Send
    + Sync
    + Unpin
    + 'static
    + for<'r> FromRow<'r, SqliteRow>
    + for<'r> FromRow<'r, PgRow>
{
    /// Table the kind is stored in
    const TABLE_NAME: &'static str;

    /// Short label used in notices and logs
    const KIND: &'static str;

    type Filter: RecordFilter;

    fn base(&self) -> &BaseRecord;

    /// All insertable columns, base ones included
    fn columns(&self) -> Vec<(&'static str, Value)>;

    /// Fields exposed to the notification hook
    fn notice_fields(&self) -> Vec<(&'static str, String)>;

    fn wants_notice(&self) -> bool {
        true
    }

    /// Hand this record to the notification hook
    fn notice(&self, notifier: &dyn Notifier) {
        if !self.wants_notice() {
            return;
        }
        notifier.notify(&Notice {
            kind: Self::KIND,
            fields: self.notice_fields(),
        });
    }
}

/// One page of records plus the number of records matching the filter
#[derive(Debug, Clone, Serialize)]
pub struct RecordPage<R> {
    pub count: i64,
    pub data: Vec<R>,
    /// Pass back with later pages to keep them on this snapshot
    pub anchor: Option<i64>,
}

/// Store a new record under the write gate and return it with its id
pub async fn persist<R: Record>(storage: &Storage, record: &R) -> Result<R, RecordError> {
    let _guard = storage.gate().acquire().await;
    storage.create(record).await
}

/// List records matching `filter`, ordered by id.
///
/// With an anchored page only rows up to the anchor are considered.
pub async fn list<R: Record>(
    storage: &Storage,
    filter: &R::Filter,
    order: Order,
    page: Page,
) -> Result<RecordPage<R>, RecordError> {
    let mut predicate = filter.predicate();
    if let Some(anchor) = page.anchor {
        predicate = predicate.id_at_most(anchor);
    }

    let result = storage
        .query::<R>(&predicate, order, page.offset(), page.limit())
        .await?;

    Ok(RecordPage {
        count: result.total,
        data: result.rows,
        anchor: page.anchor.or(result.newest_id),
    })
}

/// Delete every record matching `filter`, then reclaim the freed space.
///
/// An empty filter deletes every record of the kind. If reclaiming fails the
/// deletion still stands and the error carries the number removed.
pub async fn purge<R: Record>(storage: &Storage, filter: &R::Filter) -> Result<u64, RecordError> {
    let predicate = filter.predicate();

    let removed = {
        let _guard = storage.gate().acquire().await;
        storage.delete_matching::<R>(&predicate).await?
    };

    let _guard = storage.gate().acquire().await;
    storage
        .reclaim_space()
        .await
        .map_err(|source| RecordError::Reclaim { removed, source })?;

    tracing::debug!("{} {} records purged", removed, R::KIND);
    Ok(removed)
}
