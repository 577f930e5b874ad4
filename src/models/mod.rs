//! Data models

pub mod record;
pub mod http_record;
pub mod rule;

pub use record::*;
pub use http_record::*;
pub use rule::*;
