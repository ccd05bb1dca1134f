use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    FileNotFound,
    MalformedInput,
    InvalidConfig,
    InvalidRequest,
    SerializationError,
    IoError,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FileNotFound => write!(f, "FILE_NOT_FOUND"),
            Self::MalformedInput => write!(f, "MALFORMED_INPUT"),
            Self::InvalidConfig => write!(f, "INVALID_CONFIG"),
            Self::InvalidRequest => write!(f, "INVALID_REQUEST"),
            Self::SerializationError => write!(f, "SERIALIZATION_ERROR"),
            Self::IoError => write!(f, "IO_ERROR"),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CouplingError {
    pub code: ErrorCode,
    pub message: String,
}

impl fmt::Display for CouplingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for CouplingError {}

impl CouplingError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn file_not_found(path: &str) -> Self {
        Self::new(ErrorCode::FileNotFound, format!("File not found: {path}"))
    }

    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidConfig, message)
    }

    /// A row that could not be parsed. `line` is 1-indexed and counts the header.
    pub fn malformed(path: &str, line: u64, detail: impl fmt::Display) -> Self {
        Self::new(
            ErrorCode::MalformedInput,
            format!("{path}:{line}: {detail}"),
        )
    }
}

/// Extract the error code carried by an `anyhow::Error`, if any.
pub fn error_code(e: &anyhow::Error) -> Option<ErrorCode> {
    e.downcast_ref::<CouplingError>().map(|ce| ce.code)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_code() {
        let e = CouplingError::invalid_config("weights must sum to 1.0");
        assert_eq!(e.to_string(), "[INVALID_CONFIG] weights must sum to 1.0");
    }

    #[test]
    fn malformed_names_location() {
        let e = CouplingError::malformed("m.csv", 4, "column 'cbo': invalid float");
        assert_eq!(e.code, ErrorCode::MalformedInput);
        assert!(e.message.starts_with("m.csv:4:"));
    }

    #[test]
    fn error_code_survives_anyhow() {
        let e: anyhow::Error = CouplingError::file_not_found("x.csv").into();
        assert_eq!(error_code(&e), Some(ErrorCode::FileNotFound));
        let plain = anyhow::anyhow!("other");
        assert_eq!(error_code(&plain), None);
    }
}
