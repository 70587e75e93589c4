use std::any::Any;

use carbon_error::{ErrorExt, StatusCode};
use thiserror::Error;

/// Ошибки построения модели документа из JSON.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ModelError {
    #[error("Invalid JSON: {0}")]
    Json(String),

    #[error("Document root must be a JSON object")]
    RootNotObject,

    #[error("Arrays of arrays are not supported (key: {key})")]
    ArrayOfArrays { key: String },

    #[error("Array mixes incompatible element types (key: {key})")]
    MixedTypes { key: String },

    #[error("Value of key {key} cannot be stored: {reason}")]
    Unrepresentable { key: String, reason: String },
}

impl ErrorExt for ModelError {
    fn status_code(&self) -> StatusCode {
        match self {
            ModelError::Json(_) => StatusCode::ParseError,
            ModelError::RootNotObject => StatusCode::InvalidData,
            ModelError::ArrayOfArrays { .. } | ModelError::MixedTypes { .. } => {
                StatusCode::TypeError
            }
            ModelError::Unrepresentable { .. } => StatusCode::InvalidValue,
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl From<serde_json::Error> for ModelError {
    fn from(e: serde_json::Error) -> Self {
        ModelError::Json(e.to_string())
    }
}
