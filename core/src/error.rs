//! Error types for the FileMaker XML client.
//!
//! # Design
//! Transport failures (`Connection`, `HttpStatus`) are kept apart from the
//! server's own error codes (`Server`) so callers can tell "the request never
//! got an answer" from "FileMaker answered with a failure". The common
//! "no records match" reply (code 401) gets a helper because callers often
//! treat it as an empty result.

use crate::codes;

/// Code FileMaker reports when a find matches nothing.
pub const NO_RECORDS_MATCH: i32 = 401;

/// Errors returned by `FmClient` and the response parser.
#[derive(Debug, thiserror::Error)]
pub enum FmError {
    /// The HTTP call could not complete (DNS, connect, IO).
    #[error("connection failed: {0}")]
    Connection(String),

    /// The web server answered with a non-2xx status.
    #[error("HTTP {status}: {body}")]
    HttpStatus { status: u16, body: String },

    /// The reply carried a non-zero `<ERRORCODE>`.
    #[error("FileMaker Error {code}: {message}")]
    Server { code: i32, message: String },

    /// The reply is not well-formed XML or does not have the FMPXMLRESULT shape.
    #[error("malformed FMPXMLRESULT: {0}")]
    Parse(String),

    /// A record was asked for a field it does not have.
    #[error("field not found: {0:?}")]
    FieldNotFound(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    /// An action was invoked before `set_db_data`.
    #[error("database and layout must be set before invoking an action")]
    MissingDatabase,
}

impl FmError {
    /// Build a `Server` error with the message from the code table.
    pub fn server(code: i32) -> Self {
        FmError::Server {
            code,
            message: codes::message_for(code).to_string(),
        }
    }

    /// True for failures below the FileMaker layer.
    pub fn is_transport(&self) -> bool {
        matches!(self, FmError::Connection(_) | FmError::HttpStatus { .. })
    }

    pub fn server_code(&self) -> Option<i32> {
        match self {
            FmError::Server { code, .. } => Some(*code),
            _ => None,
        }
    }

    pub fn is_no_records(&self) -> bool {
        self.server_code() == Some(NO_RECORDS_MATCH)
    }
}

impl From<ureq::Error> for FmError {
    fn from(err: ureq::Error) -> Self {
        FmError::Connection(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, FmError>;
