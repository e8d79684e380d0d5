//! CRPT Connector
//!
//! Client for the CRPT ("Chestny ZNAK") registry document API.
//!
//! Submits goods introduction documents (`LP_INTRODUCE_GOODS`) while keeping
//! all callers of one client inside the registry's request quota:
//!
//! - Admission: fixed or sliding window, shared by every caller
//! - Submission: JSON document, form-encoded body, bearer auth, one request
//! - Results: registry acceptance, registry rejection, transport and
//!   malformed-response failures, admission cancellation
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use crpt_connector::{CrptClient, CrptConfig};
//!
//! let client = Arc::new(CrptClient::new(&CrptConfig::load("crpt.toml")?)?);
//! let receipt = client.introduce_goods(&document, &signature).await?;
//! ```

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

mod client;
mod config;
mod error;
mod types;

pub use client::{CREATE_DOCUMENT_ENDPOINT, CrptClient};
pub use config::{BASE_URL_ENV, CrptConfig, RateLimitSettings, TOKEN_ENV};
pub use error::{CrptError, CrptResult};
pub use types::{
    DOCUMENT_FORMAT_MANUAL, DOCUMENT_TYPE_INTRODUCE_GOODS, Description, Document, DocumentReceipt,
    Product, SubmissionRequest, SubmissionResult, format_registry_date, parse_registry_date,
};
