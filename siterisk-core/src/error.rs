//! Boundary errors
//!
//! Only I/O at the persistence boundary fails. Scoring anomalies are
//! absorbed with defaults and never surface here.

use crate::model::FacilityId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("corrupt stored row in {table}: {detail}")]
    Corrupt { table: &'static str, detail: String },
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("facility not found: {0}")]
    FacilityNotFound(FacilityId),
}
