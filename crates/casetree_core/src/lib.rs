//! Persistence and hierarchy engine for forensic cases.
//!
//! A case is a directory holding one SQLite database and a per-item data
//! tree. Items form an ordered tree rooted at uid 1 and carry typed
//! attributes, an audit log, an optional datasource and evidence records.

pub mod codec;
pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;
pub mod storage;

pub use codec::{decode, encode, CodecError};
pub use config::CaseConfig;
pub use logging::{default_log_level, init_case_logging, init_logging, logging_status};
pub use model::data::{Data, DataMap};
pub use model::item::{Evidence, EvidenceUid, ItemEvent, ItemRecord, ItemUid, ROOT_ITEM_UID};
pub use repo::{RepoError, RepoResult};
pub use service::{
    Case, CaseError, CaseEvent, CaseResult, CaseTransaction, EventPublisher, Item, NoopPublisher,
};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::core_version;

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
