//! Synchronous client for the FileMaker Server XML publishing interface.
//!
//! # Overview
//! An [`FmClient`] accumulates find criteria, sort criteria and field values,
//! turns one action (`find`, `new_record`, `edit`, ...) into a single request
//! against `/fmi/xml/FMPXMLRESULT.xml`, and decodes the FMPXMLRESULT reply
//! into a [`ResultSet`].
//!
//! # Design
//! - Building requests and parsing responses are pure functions over the
//!   plain-data types in [`http`]; only the [`Transport`] does I/O.
//! - A non-zero `<ERRORCODE>` becomes [`FmError::Server`] with the message
//!   from the static [`codes`] table. Transport failures and malformed XML
//!   have their own variants.
//! - Field values follow the field's declared repetitions: `MAXREPEAT="1"`
//!   yields [`FieldValue::Scalar`], anything larger [`FieldValue::Repeated`].

pub mod client;
pub mod codes;
pub mod config;
pub mod error;
pub mod http;
pub mod params;
pub mod parser;
pub mod result;
pub mod transport;
mod xml;

pub use client::FmClient;
pub use config::{ClientConfig, Credentials, Scheme};
pub use error::{FmError, Result};
pub use http::{HttpMethod, HttpRequest, HttpResponse};
pub use params::{Action, Operator, QueryParams, ScriptTiming, SortOrder};
pub use parser::ResponseParser;
pub use result::{DatabaseInfo, FieldDescriptor, FieldType, FieldValue, Product, Record, ResultSet};
pub use transport::{Transport, UreqTransport};
