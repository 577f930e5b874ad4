//! Notification hook
//!
//! Persisting a record never notifies by itself. The detection pipeline
//! calls [`crate::models::Record::notice`] once the record is stored, and
//! the record hands a [`Notice`] to whichever [`Notifier`] it is given.

use serde::Serialize;

/// Flattened view of a stored record for alerting. Never carries the raw payload.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Notice {
    pub kind: &'static str,
    pub fields: Vec<(&'static str, String)>,
}

impl Notice {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(field, _)| *field == name)
            .map(|(_, value)| value.as_str())
    }
}

/// Notification dispatch hook
pub trait Notifier: Send + Sync {
    fn notify(&self, notice: &Notice);
}

/// Writes notices to the log
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, notice: &Notice) {
        let summary = notice
            .fields
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join(" ");
        tracing::info!("[{}] {}", notice.kind, summary);
    }
}
