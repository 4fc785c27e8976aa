//! Case configuration.
//!
//! # Invariants
//! - Every field has a default, so partial JSON/TOML documents deserialize.
//! - File and directory names are single path components.

use crate::storage::DEFAULT_OVERFLOW_THRESHOLD;
use serde::{Deserialize, Serialize};
use std::path::{Component, Path};

const DEFAULT_DB_FILE_NAME: &str = "case.sqlite";
const DEFAULT_DATA_DIR_NAME: &str = "data";

/// Tunables for one opened case.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaseConfig {
    /// Database file name under the case root.
    pub db_file_name: String,
    /// Per-item data root under the case root.
    pub data_dir_name: String,
    /// Largest encoded attribute value stored inline, in bytes.
    pub overflow_threshold: usize,
    /// Wrap multi-statement writes in a transaction when none is open.
    pub atomic_writes: bool,
}

impl Default for CaseConfig {
    fn default() -> Self {
        Self {
            db_file_name: DEFAULT_DB_FILE_NAME.to_string(),
            data_dir_name: DEFAULT_DATA_DIR_NAME.to_string(),
            overflow_threshold: DEFAULT_OVERFLOW_THRESHOLD,
            atomic_writes: true,
        }
    }
}

impl CaseConfig {
    /// Checks field values before a case is opened.
    ///
    /// Returns a human-readable message for the first invalid field.
    pub fn validate(&self) -> Result<(), String> {
        for (field, value) in [
            ("db_file_name", self.db_file_name.as_str()),
            ("data_dir_name", self.data_dir_name.as_str()),
        ] {
            if !is_single_component(value) {
                return Err(format!(
                    "{field} must be a single path component, got `{value}`"
                ));
            }
        }
        if self.overflow_threshold == 0 {
            return Err("overflow_threshold must be greater than zero".to_string());
        }
        Ok(())
    }
}

fn is_single_component(value: &str) -> bool {
    let mut components = Path::new(value).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}
