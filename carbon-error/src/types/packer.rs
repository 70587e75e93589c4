use std::any::Any;

use thiserror::Error;

use crate::{ErrorExt, StatusCode};

/// Ошибки упаковщиков строк (Huffman, без сжатия).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PackerError {
    #[error("No Huffman code for byte 0x{letter:02X}")]
    NoCode { letter: u8 },
    #[error("Huffman code for byte 0x{letter:02X} is {len} bits long (max 63)")]
    CodeTooLong { letter: u8, len: usize },
    #[error("Corrupted packed string: {reason}")]
    Corrupted { reason: String },
    #[error("Not implemented: {what}")]
    NotImplemented { what: &'static str },
    #[error("Unknown packer strategy: {name}")]
    UnknownStrategy { name: String },
}

impl ErrorExt for PackerError {
    fn status_code(&self) -> StatusCode {
        match self {
            PackerError::NoCode { .. } | PackerError::CodeTooLong { .. } => {
                StatusCode::EncodingError
            }
            PackerError::Corrupted { .. } => StatusCode::DecodingError,
            PackerError::NotImplemented { .. } => StatusCode::NotImplemented,
            PackerError::UnknownStrategy { .. } => StatusCode::Unsupported,
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_and_codes() {
        let e = PackerError::NoCode { letter: b'z' };
        assert_eq!(e.to_string(), "No Huffman code for byte 0x7A");
        assert_eq!(e.status_code(), StatusCode::EncodingError);

        let e = PackerError::NotImplemented {
            what: "huffman read_extra from raw file",
        };
        assert_eq!(e.status_code(), StatusCode::NotImplemented);
        assert_eq!(e.client_message(), e.to_string());
    }

    #[test]
    fn test_into_stack_error() {
        let stack: crate::StackError = PackerError::Corrupted {
            reason: "bad bits".into(),
        }
        .into();
        assert_eq!(stack.status_code(), StatusCode::DecodingError);
        assert!(stack.downcast_ref::<PackerError>().is_some());
    }
}
