//! Shape check for serialized count reports
//!
//! A report is valid when it is a JSON object with exactly the seven
//! matrix keys, each mapping to an object with exactly the twelve state
//! names, each holding a non-negative integer.

use crate::aggregate::MatrixKey;
use crate::model::ConnectionState;
use serde_json::Value;
use thiserror::Error;

/// First problem found in a report
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ShapeError {
    #[error("content is not JSON formatted: {0}")]
    NotJson(String),

    #[error("{0} is not a JSON object")]
    NotAnObject(String),

    #[error("data is missing expected key \"{0}\"")]
    MissingKey(String),

    #[error("found unexpected key \"{0}\"")]
    UnexpectedKey(String),

    #[error("protocol \"{protocol}\" is missing expected connection state \"{state}\"")]
    MissingState { protocol: String, state: String },

    #[error("found unexpected connection state \"{state}\" for protocol \"{protocol}\"")]
    UnexpectedState { protocol: String, state: String },

    #[error("state \"{state}\" for protocol \"{protocol}\" has unexpected value \"{value}\"")]
    BadValue {
        protocol: String,
        state: String,
        value: String,
    },
}

/// Parse `text` as JSON and check its shape
///
/// # Errors
///
/// `NotJson` for unparseable input, otherwise see [`validate_report`].
pub fn validate_json(text: &str) -> Result<(), ShapeError> {
    let value: Value =
        serde_json::from_str(text).map_err(|e| ShapeError::NotJson(e.to_string()))?;
    validate_report(&value)
}

/// Check that `report` has the count matrix shape
///
/// Checks run in a fixed order (missing keys, unexpected keys, missing
/// states, unexpected states, values) and stop at the first problem.
///
/// # Errors
///
/// The first [`ShapeError`] found.
pub fn validate_report(report: &Value) -> Result<(), ShapeError> {
    let root = report
        .as_object()
        .ok_or_else(|| ShapeError::NotAnObject("report".to_string()))?;

    for key in MatrixKey::ALL {
        if !root.contains_key(key.as_str()) {
            return Err(ShapeError::MissingKey(key.as_str().to_string()));
        }
    }
    if let Some(extra) = root
        .keys()
        .find(|k| !MatrixKey::ALL.iter().any(|key| key.as_str() == k.as_str()))
    {
        return Err(ShapeError::UnexpectedKey(extra.clone()));
    }

    // Collect every row first so the per-state checks can run key by key
    let mut rows = Vec::with_capacity(MatrixKey::COUNT);
    for key in MatrixKey::ALL {
        let row = root[key.as_str()]
            .as_object()
            .ok_or_else(|| ShapeError::NotAnObject(format!("protocol \"{key}\"")))?;
        rows.push((key, row));
    }

    for (key, row) in &rows {
        for state in ConnectionState::ALL {
            if !row.contains_key(state.as_str()) {
                return Err(ShapeError::MissingState {
                    protocol: key.to_string(),
                    state: state.to_string(),
                });
            }
        }
    }

    for (key, row) in &rows {
        if let Some(extra) = row
            .keys()
            .find(|s| s.parse::<ConnectionState>().is_err())
        {
            return Err(ShapeError::UnexpectedState {
                protocol: key.to_string(),
                state: extra.clone(),
            });
        }
    }

    for (key, row) in &rows {
        for state in ConnectionState::ALL {
            let value = &row[state.as_str()];
            // as_u64 is None for negatives, floats and non-numbers
            if value.as_u64().is_none() {
                return Err(ShapeError::BadValue {
                    protocol: key.to_string(),
                    state: state.to_string(),
                    value: value.to_string(),
                });
            }
        }
    }

    Ok(())
}
