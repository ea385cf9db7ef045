use std::error::Error as StdError;
use std::io;

use http::StatusCode;

use crate::davxml::QName;

/// The fault type shared by the engine, method handlers and namespaces.
///
/// `Status` is the protocol taxonomy: a status code, an optional
/// condition tag for the `DAV:error` body and an optional message.
/// Everything else is unanticipated and reported as 500.
#[derive(Debug, thiserror::Error)]
pub enum DavError {
    #[error("{status}{}", .message.as_ref().map(|m| format!(": {m}")).unwrap_or_default())]
    Status {
        status: StatusCode,
        condition: Option<QName>,
        message: Option<String>,
    },
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("XML error: {0}")]
    Xml(#[from] xml::writer::Error),
    #[error("{0}")]
    Other(Box<dyn StdError + Send + Sync>),
}

pub type DavResult<T> = Result<T, DavError>;

impl DavError {
    fn status(status: StatusCode) -> DavError {
        DavError::Status {
            status,
            condition: None,
            message: None,
        }
    }

    /// Malformed header or request grammar.
    pub fn bad_request(message: impl Into<String>) -> DavError {
        DavError::status(StatusCode::BAD_REQUEST).with_message(message)
    }

    pub fn forbidden() -> DavError {
        DavError::status(StatusCode::FORBIDDEN)
    }

    pub fn not_found() -> DavError {
        DavError::status(StatusCode::NOT_FOUND)
    }

    pub fn gone() -> DavError {
        DavError::status(StatusCode::GONE)
    }

    /// Precondition mismatch and friends.
    pub fn conflict() -> DavError {
        DavError::status(StatusCode::CONFLICT)
    }

    pub fn server_error(message: impl Into<String>) -> DavError {
        DavError::status(StatusCode::INTERNAL_SERVER_ERROR).with_message(message)
    }

    /// Wrap any other error. Reported as 500.
    pub fn other(err: impl StdError + Send + Sync + 'static) -> DavError {
        DavError::Other(Box::new(err))
    }

    /// Attach a condition tag. Only meaningful for status faults.
    pub fn with_condition(self, tag: QName) -> DavError {
        match self {
            DavError::Status {
                status, message, ..
            } => DavError::Status {
                status,
                condition: Some(tag),
                message,
            },
            other => other,
        }
    }

    /// Attach a message. Only meaningful for status faults.
    pub fn with_message(self, msg: impl Into<String>) -> DavError {
        match self {
            DavError::Status {
                status, condition, ..
            } => DavError::Status {
                status,
                condition,
                message: Some(msg.into()),
            },
            other => other,
        }
    }

    pub fn statuscode(&self) -> StatusCode {
        match self {
            DavError::Status { status, .. } => *status,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn condition(&self) -> Option<&QName> {
        match self {
            DavError::Status { condition, .. } => condition.as_ref(),
            _ => None,
        }
    }

    /// Human readable message, if there is one.
    pub fn message(&self) -> Option<String> {
        match self {
            DavError::Status { message, .. } => message.clone(),
            other => Some(other.to_string()),
        }
    }

    /// True for faults that belong to the protocol taxonomy.
    pub fn is_status(&self) -> bool {
        matches!(self, DavError::Status { .. })
    }

    pub fn is_forbidden(&self) -> bool {
        self.is_status() && self.statuscode() == StatusCode::FORBIDDEN
    }

    pub fn is_server_error(&self) -> bool {
        self.statuscode() == StatusCode::INTERNAL_SERVER_ERROR
    }
}

impl From<StatusCode> for DavError {
    fn from(status: StatusCode) -> DavError {
        DavError::status(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tags;

    #[test]
    fn taxonomy_status_codes() {
        assert_eq!(DavError::bad_request("x").statuscode(), StatusCode::BAD_REQUEST);
        assert_eq!(DavError::forbidden().statuscode(), StatusCode::FORBIDDEN);
        assert_eq!(DavError::not_found().statuscode(), StatusCode::NOT_FOUND);
        assert_eq!(DavError::gone().statuscode(), StatusCode::GONE);
        assert_eq!(DavError::conflict().statuscode(), StatusCode::CONFLICT);
        assert!(DavError::server_error("boom").is_server_error());
    }

    #[test]
    fn unanticipated_errors_are_server_errors() {
        let err: DavError = io::Error::new(io::ErrorKind::Other, "disk").into();
        assert!(err.is_server_error());
        assert!(!err.is_status());
        assert!(err.condition().is_none());
        assert_eq!(err.message().as_deref(), Some("I/O error: disk"));
    }

    #[test]
    fn condition_and_message() {
        let err = DavError::forbidden()
            .with_condition(tags::NEED_PRIVILEGES)
            .with_message("no write");
        assert!(err.is_forbidden());
        assert_eq!(err.condition(), Some(&tags::NEED_PRIVILEGES));
        assert_eq!(err.message().as_deref(), Some("no write"));
        assert_eq!(err.to_string(), "403 Forbidden: no write");
    }

    #[test]
    fn from_statuscode() {
        let err: DavError = StatusCode::PAYLOAD_TOO_LARGE.into();
        assert_eq!(err.statuscode(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(err.message(), None);
    }
}
