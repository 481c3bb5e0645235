// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Error types for take-off analysis
//!
//! Only problems that make a whole run meaningless are errors. Ambiguous
//! geometry and inconsistent detections are reported through warnings and
//! diagnostics on the result instead.

use thiserror::Error;

/// Result type for take-off operations
pub type Result<T> = std::result::Result<T, TakeoffError>;

/// Errors that abort an analysis run before any page is processed
#[derive(Error, Debug)]
pub enum TakeoffError {
    #[error("Invalid scale: {0}")]
    InvalidScale(String),

    #[error("Invalid configuration value for `{field}`: {reason}")]
    InvalidConfig { field: &'static str, reason: String },

    #[error("No resolution available: raster has no DPI or page size and no dpi is configured")]
    MissingResolution,

    #[error("Configuration parse error: {0}")]
    Json(#[from] serde_json::Error),
}

impl TakeoffError {
    pub(crate) fn config(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field,
            reason: reason.into(),
        }
    }
}
