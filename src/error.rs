//! Unified error handling for the schoolmap library.
//!
//! Every fallible operation returns [`SchoolMapError`]. None of these are
//! retried automatically: callers either keep their previous state or
//! surface an explicit empty/error state to the UI.

use std::fmt;

/// Unified error type for schoolmap operations.
#[derive(Debug, Clone, PartialEq)]
pub enum SchoolMapError {
    /// Transport or non-success HTTP status from the school API
    Http {
        message: String,
        status_code: Option<u16>,
    },
    /// The requested school does not exist
    NotFound { urn: u32 },
    /// A postcode lookup did not resolve to a coordinate
    PostcodeNotFound { query: String },
    /// Coordinates outside the valid WGS84 range
    InvalidCoordinates { message: String },
    /// Persistence/storage error
    Persistence { message: String },
    /// Response body could not be decoded
    Decode { message: String },
    /// Configuration error
    Config { message: String },
    /// Generic internal error
    Internal { message: String },
}

impl SchoolMapError {
    /// Whether this failure came from the network layer.
    pub fn is_transport(&self) -> bool {
        matches!(self, SchoolMapError::Http { .. } | SchoolMapError::Decode { .. })
    }

    /// Message suitable for showing inline next to the input that caused it.
    pub fn user_message(&self) -> String {
        match self {
            SchoolMapError::PostcodeNotFound { query } => {
                format!("Could not find postcode \"{}\"", query)
            }
            SchoolMapError::NotFound { .. } => "School not found".to_string(),
            SchoolMapError::Http { .. } | SchoolMapError::Decode { .. } => {
                "Could not reach the school service".to_string()
            }
            other => other.to_string(),
        }
    }
}

impl fmt::Display for SchoolMapError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchoolMapError::Http {
                message,
                status_code,
            } => {
                if let Some(code) = status_code {
                    write!(f, "HTTP error ({}): {}", code, message)
                } else {
                    write!(f, "HTTP error: {}", message)
                }
            }
            SchoolMapError::NotFound { urn } => {
                write!(f, "School {} not found", urn)
            }
            SchoolMapError::PostcodeNotFound { query } => {
                write!(f, "Postcode '{}' could not be resolved", query)
            }
            SchoolMapError::InvalidCoordinates { message } => {
                write!(f, "Invalid coordinates: {}", message)
            }
            SchoolMapError::Persistence { message } => {
                write!(f, "Persistence error: {}", message)
            }
            SchoolMapError::Decode { message } => {
                write!(f, "Decode error: {}", message)
            }
            SchoolMapError::Config { message } => {
                write!(f, "Configuration error: {}", message)
            }
            SchoolMapError::Internal { message } => {
                write!(f, "Internal error: {}", message)
            }
        }
    }
}

impl std::error::Error for SchoolMapError {}

#[cfg(feature = "persistence")]
impl From<rusqlite::Error> for SchoolMapError {
    fn from(e: rusqlite::Error) -> Self {
        SchoolMapError::Persistence {
            message: e.to_string(),
        }
    }
}

#[cfg(feature = "persistence")]
impl From<rmp_serde::encode::Error> for SchoolMapError {
    fn from(e: rmp_serde::encode::Error) -> Self {
        SchoolMapError::Persistence {
            message: format!("encode: {}", e),
        }
    }
}

#[cfg(feature = "persistence")]
impl From<rmp_serde::decode::Error> for SchoolMapError {
    fn from(e: rmp_serde::decode::Error) -> Self {
        SchoolMapError::Persistence {
            message: format!("decode: {}", e),
        }
    }
}

#[cfg(feature = "http")]
impl From<reqwest::Error> for SchoolMapError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            return SchoolMapError::Decode {
                message: e.to_string(),
            };
        }
        SchoolMapError::Http {
            message: e.to_string(),
            status_code: e.status().map(|s| s.as_u16()),
        }
    }
}

/// Result type alias for schoolmap operations.
pub type Result<T> = std::result::Result<T, SchoolMapError>;

/// Extension trait for converting Option to SchoolMapError.
pub trait OptionExt<T> {
    /// Convert Option to Result with a not-found error for a school.
    fn ok_or_not_found(self, urn: u32) -> Result<T>;
}

impl<T> OptionExt<T> for Option<T> {
    fn ok_or_not_found(self, urn: u32) -> Result<T> {
        self.ok_or(SchoolMapError::NotFound { urn })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SchoolMapError::Http {
            message: "connection refused".to_string(),
            status_code: Some(502),
        };
        assert!(err.to_string().contains("502"));
        assert!(err.to_string().contains("connection refused"));

        let err = SchoolMapError::NotFound { urn: 100001 };
        assert_eq!(err.to_string(), "School 100001 not found");
    }

    #[test]
    fn test_user_message() {
        let err = SchoolMapError::PostcodeNotFound {
            query: "ZZ1 1ZZ".to_string(),
        };
        assert!(err.user_message().contains("ZZ1 1ZZ"));
        assert!(SchoolMapError::Decode {
            message: "eof".to_string()
        }
        .is_transport());
    }

    #[test]
    fn test_option_ext() {
        let none: Option<i32> = None;
        let result = none.ok_or_not_found(7);
        assert!(matches!(result, Err(SchoolMapError::NotFound { urn: 7 })));

        assert_eq!(Some(3).ok_or_not_found(7), Ok(3));
    }
}
