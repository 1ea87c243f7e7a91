//! Error types for the SVO pipeline
//!
//! Only hard failures live here. Transient conditions such as a full atlas,
//! an exhausted voxel budget or a busy scratch pool are reported through
//! `Option` / outcome enums and retried on a later frame.

use thiserror::Error;

/// Main error type for the crate
#[derive(Debug, Error)]
pub enum Error {
    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Texture error: {0}")]
    Texture(String),

    #[error("Atlas error: {0}")]
    Atlas(String),
}
