//! CRPT registry types.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{CrptError, CrptResult};

/// `document_format` value for hand-built JSON documents.
pub const DOCUMENT_FORMAT_MANUAL: &str = "MANUAL";

/// `type` value for goods introduced into circulation.
pub const DOCUMENT_TYPE_INTRODUCE_GOODS: &str = "LP_INTRODUCE_GOODS";

/// Textual date format the registry expects.
pub const REGISTRY_DATE_FORMAT: &str = "%Y-%m-%d";

/// Format a date the way the registry expects it (`YYYY-MM-DD`).
#[must_use]
pub fn format_registry_date(date: NaiveDate) -> String {
    date.format(REGISTRY_DATE_FORMAT).to_string()
}

/// Parse a `YYYY-MM-DD` registry date.
///
/// # Errors
///
/// Returns the chrono parse error for anything else.
pub fn parse_registry_date(s: &str) -> Result<NaiveDate, chrono::ParseError> {
    NaiveDate::parse_from_str(s, REGISTRY_DATE_FORMAT)
}

mod registry_date {
    use chrono::NaiveDate;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(date: &NaiveDate, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&super::format_registry_date(*date))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<NaiveDate, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        super::parse_registry_date(&s).map_err(serde::de::Error::custom)
    }
}

/// Document description block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Description {
    /// INN of the participant submitting the document
    #[serde(rename = "participantInn")]
    pub participant_inn: String,
}

/// Goods introduction document (`LP_INTRODUCE_GOODS`).
///
/// Field order is the order of the serialized JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    /// Submitting participant
    pub description: Description,
    /// Caller-assigned document identifier
    pub doc_id: String,
    /// Document status as known to the caller
    pub doc_status: String,
    /// Document type, e.g. `LP_INTRODUCE_GOODS`
    pub doc_type: String,
    /// Whether the goods are imported
    #[serde(rename = "importRequest")]
    pub import_request: bool,
    /// INN of the goods owner
    pub owner_inn: String,
    /// INN of the participant
    pub participant_inn: String,
    /// INN of the producer
    pub producer_inn: String,
    /// Date the goods were produced
    #[serde(with = "registry_date")]
    pub production_date: NaiveDate,
    /// Production type, e.g. `OWN_PRODUCTION`
    pub production_type: String,
    /// Product lines
    #[serde(default)]
    pub products: Vec<Product>,
    /// Registration date
    #[serde(with = "registry_date")]
    pub reg_date: NaiveDate,
    /// Registration number
    pub reg_number: String,
}

impl Document {
    /// Serialize to the JSON text sent as `product_document`.
    ///
    /// # Errors
    ///
    /// Returns a JSON error if serialization fails.
    pub fn to_json(&self) -> CrptResult<String> {
        serde_json::to_string(self).map_err(CrptError::Serialization)
    }
}

/// One product line of a [`Document`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    /// Conformity document kind
    pub certificate_document: String,
    /// Conformity document issue date
    #[serde(with = "registry_date")]
    pub certificate_document_date: NaiveDate,
    /// Conformity document number
    pub certificate_document_number: String,
    /// INN of the product owner
    pub owner_inn: String,
    /// INN of the producer
    pub producer_inn: String,
    /// Date the product was produced
    #[serde(with = "registry_date")]
    pub production_date: NaiveDate,
    /// TN VED commodity code
    pub tnved_code: String,
    /// Unit identification code
    pub uit_code: String,
    /// Package identification code
    pub uitu_code: String,
}

/// Form body of `POST /api/v3/lk/documents/create`.
#[derive(Debug, Serialize)]
pub(crate) struct CreateDocumentForm<'a> {
    pub document_format: &'static str,
    pub product_document: &'a str,
    pub product_group: &'a str,
    pub signature: &'a str,
    #[serde(rename = "type")]
    pub document_type: &'static str,
}

impl<'a> CreateDocumentForm<'a> {
    pub(crate) const fn introduce_goods(
        product_document: &'a str,
        product_group: &'a str,
        signature: &'a str,
    ) -> Self {
        Self {
            document_format: DOCUMENT_FORMAT_MANUAL,
            product_document,
            product_group,
            signature,
            document_type: DOCUMENT_TYPE_INTRODUCE_GOODS,
        }
    }

    /// URL-form-encode the body.
    pub(crate) fn encode(&self) -> CrptResult<String> {
        serde_urlencoded::to_string(self).map_err(CrptError::from)
    }
}

/// Successful registry response (HTTP 200).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentReceipt {
    /// Registry-assigned document identifier
    pub value: String,
}

/// Registry error response body.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ApiError {
    pub code: String,
    /// Spelled this way by the registry.
    #[serde(rename = "error_massage")]
    pub message: String,
    #[serde(default)]
    pub description: String,
}

/// Outcome of one submission, in the registry's own terms.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SubmissionResult {
    /// The registry accepted the document.
    Success {
        /// Registry-assigned document identifier
        value: String,
    },
    /// The submission failed.
    Failure {
        /// Registry error code, or a client-side code such as `TRANSPORT_ERROR`
        code: String,
        /// Human-readable message
        message: String,
        /// Detail, empty when none was given
        description: String,
    },
}

impl SubmissionResult {
    /// Whether the registry accepted the document.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }
}

impl From<CrptResult<DocumentReceipt>> for SubmissionResult {
    fn from(result: CrptResult<DocumentReceipt>) -> Self {
        match result {
            Ok(receipt) => Self::Success {
                value: receipt.value,
            },
            Err(CrptError::Registry {
                code,
                message,
                description,
                ..
            }) => Self::Failure {
                code,
                message,
                description,
            },
            Err(e) => Self::Failure {
                code: e.code().into(),
                message: e.to_string(),
                description: e.description(),
            },
        }
    }
}

/// One entry of a batch submission file.
#[derive(Debug, Clone, Deserialize)]
pub struct SubmissionRequest {
    pub document: Document,
    pub signature: String,
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    pub(crate) fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    pub(crate) fn sample_product() -> Product {
        Product {
            certificate_document: "CONFORMITY_CERTIFICATE".into(),
            certificate_document_date: date(2023, 11, 2),
            certificate_document_number: "RU C-CN.AB12.B.00001/23".into(),
            owner_inn: "7701234567".into(),
            producer_inn: "7707654321".into(),
            production_date: date(2024, 1, 10),
            tnved_code: "6403993600".into(),
            uit_code: "010463003407001221SxMGorvNuq6Wk91fgr92sdfsdfghfgjh".into(),
            uitu_code: String::new(),
        }
    }

    pub(crate) fn sample_document() -> Document {
        Document {
            description: Description {
                participant_inn: "7701234567".into(),
            },
            doc_id: "doc-0001".into(),
            doc_status: "DRAFT".into(),
            doc_type: DOCUMENT_TYPE_INTRODUCE_GOODS.into(),
            import_request: false,
            owner_inn: "7701234567".into(),
            participant_inn: "7701234567".into(),
            producer_inn: "7707654321".into(),
            production_date: date(2024, 1, 15),
            production_type: "OWN_PRODUCTION".into(),
            products: vec![sample_product()],
            reg_date: date(2024, 2, 1),
            reg_number: "REG-42".into(),
        }
    }
}
