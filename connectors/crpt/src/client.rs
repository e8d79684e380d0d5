//! CRPT registry client.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crpt_ratelimit::{RateLimitState, RateLimiter, acquire, acquire_within, acquire_within_until};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, Response, StatusCode};
use tracing::{debug, info, instrument, warn};

use crate::{
    config::CrptConfig,
    error::{CrptError, CrptResult},
    types::{ApiError, CreateDocumentForm, Document, DocumentReceipt},
};

/// Document creation endpoint, relative to the base URL.
pub const CREATE_DOCUMENT_ENDPOINT: &str = "/api/v3/lk/documents/create";

/// CRPT registry client.
///
/// Every submission first takes a slot from the shared limiter, then makes
/// exactly one HTTP request. Share one client (behind an `Arc`) between all
/// callers that draw from the same quota.
pub struct CrptClient {
    client: Client,
    base_url: String,
    product_group: String,
    token: String,
    limiter: Arc<dyn RateLimiter>,
}

impl CrptClient {
    /// Create a new client from configuration.
    ///
    /// # Errors
    ///
    /// Returns `Config` if the configuration does not validate, or
    /// `Transport` if the HTTP client cannot be built.
    pub fn new(config: &CrptConfig) -> CrptResult<Self> {
        config.validate()?;

        let client = Client::builder()
            .timeout(config.timeout)
            .user_agent(format!("crpt-connector/{}", env!("CARGO_PKG_VERSION")))
            .build()?;

        let limiter = config.rate_limit.to_limiter_config().build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            product_group: config.product_group.clone(),
            token: config.token.clone(),
            limiter,
        })
    }

    /// Set the base URL (for testing).
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Replace the limiter, e.g. to share one quota between clients.
    #[must_use]
    pub fn with_limiter(mut self, limiter: Arc<dyn RateLimiter>) -> Self {
        self.limiter = limiter;
        self
    }

    /// Registry base URL.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Product group sent with every document.
    #[must_use]
    pub fn product_group(&self) -> &str {
        &self.product_group
    }

    /// Snapshot of the submission quota.
    #[must_use]
    pub fn rate_limit_state(&self) -> RateLimitState {
        self.limiter.state()
    }

    /// Submit a goods introduction document, waiting for a free slot first.
    ///
    /// # Errors
    ///
    /// Returns `Transport`, `Registry` or `MalformedResponse` for the
    /// exchange itself; the wait never fails.
    #[instrument(skip_all, fields(doc_id = %document.doc_id))]
    pub async fn introduce_goods(
        &self,
        document: &Document,
        signature: &str,
    ) -> CrptResult<DocumentReceipt> {
        let waited = acquire(self.limiter.as_ref()).await;
        debug!(waited_ms = waited.as_millis(), "Admitted");

        self.submit(document, signature).await
    }

    /// Submit a document unless `cancel` completes first.
    ///
    /// Cancellation before admission, including a `cancel` that is already
    /// complete on arrival, leaves the quota untouched and sends nothing.
    /// Cancellation after admission drops the in-flight request; the slot
    /// stays consumed.
    ///
    /// # Errors
    ///
    /// Returns `AdmissionCancelled` if `cancel` fired before admission,
    /// `Aborted` if it fired during the exchange, otherwise as
    /// [`introduce_goods`](Self::introduce_goods).
    #[instrument(skip_all, fields(doc_id = %document.doc_id))]
    pub async fn introduce_goods_until<F>(
        &self,
        document: &Document,
        signature: &str,
        cancel: F,
    ) -> CrptResult<DocumentReceipt>
    where
        F: Future,
    {
        self.admit_and_submit(document, signature, Duration::MAX, cancel).await
    }

    /// Submit a document if a slot frees up within `max_wait`.
    ///
    /// # Errors
    ///
    /// Returns `AdmissionCancelled` without sending anything when the quota
    /// cannot admit the call in time, otherwise as
    /// [`introduce_goods`](Self::introduce_goods).
    #[instrument(skip_all, fields(doc_id = %document.doc_id))]
    pub async fn introduce_goods_within(
        &self,
        document: &Document,
        signature: &str,
        max_wait: Duration,
    ) -> CrptResult<DocumentReceipt> {
        let waited = acquire_within(self.limiter.as_ref(), max_wait).await?;
        debug!(waited_ms = waited.as_millis(), "Admitted");

        self.submit(document, signature).await
    }

    /// Submit a document if a slot frees up within `max_wait`, unless
    /// `cancel` completes first.
    ///
    /// `max_wait` bounds admission only; `cancel` also aborts the exchange.
    ///
    /// # Errors
    ///
    /// As [`introduce_goods_until`](Self::introduce_goods_until) and
    /// [`introduce_goods_within`](Self::introduce_goods_within).
    #[instrument(skip_all, fields(doc_id = %document.doc_id))]
    pub async fn introduce_goods_within_until<F>(
        &self,
        document: &Document,
        signature: &str,
        max_wait: Duration,
        cancel: F,
    ) -> CrptResult<DocumentReceipt>
    where
        F: Future,
    {
        self.admit_and_submit(document, signature, max_wait, cancel).await
    }

    /// Exact request body that would be sent for this document.
    ///
    /// # Errors
    ///
    /// Returns `Serialization` or `FormEncoding` if the body cannot be built.
    pub fn render_form(&self, document: &Document, signature: &str) -> CrptResult<String> {
        let product_document = document.to_json()?;
        CreateDocumentForm::introduce_goods(&product_document, &self.product_group, signature)
            .encode()
    }

    async fn admit_and_submit<F>(
        &self,
        document: &Document,
        signature: &str,
        max_wait: Duration,
        cancel: F,
    ) -> CrptResult<DocumentReceipt>
    where
        F: Future,
    {
        tokio::pin!(cancel);

        // Only returns Ok while `cancel` is still pending
        let waited = acquire_within_until(self.limiter.as_ref(), max_wait, &mut cancel).await?;
        debug!(waited_ms = waited.as_millis(), "Admitted");

        tokio::select! {
            biased;
            _ = &mut cancel => {
                warn!("Submission cancelled in flight");
                Err(CrptError::Aborted)
            }
            result = self.submit(document, signature) => result,
        }
    }

    /// Send one admitted document. Callers must hold a slot.
    async fn submit(&self, document: &Document, signature: &str) -> CrptResult<DocumentReceipt> {
        let body = self.render_form(document, signature)?;
        let url = format!("{}{CREATE_DOCUMENT_ENDPOINT}", self.base_url);

        debug!(url, body_len = body.len(), "Making CRPT API request");

        let response = self
            .client
            .post(&url)
            .header(AUTHORIZATION, format!("Bearer {}", self.token))
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
            .map_err(|e| {
                warn!(error = %e, "CRPT API request failed");
                CrptError::Transport(e)
            })?;

        let receipt = handle_response(response).await?;
        info!(value = %receipt.value, "Document accepted by registry");
        Ok(receipt)
    }
}

impl fmt::Debug for CrptClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CrptClient")
            .field("base_url", &self.base_url)
            .field("product_group", &self.product_group)
            .field("token", &"[REDACTED]")
            .field("rate_limit", &self.limiter.state())
            .finish_non_exhaustive()
    }
}

/// Classify a registry response.
async fn handle_response(response: Response) -> CrptResult<DocumentReceipt> {
    let status = response.status();
    let bytes = response.bytes().await?;

    if status == StatusCode::OK {
        serde_json::from_slice(&bytes).map_err(|source| malformed(status, &bytes, source))
    } else {
        Err(parse_error_response(status, &bytes))
    }
}

/// Parse an error response.
fn parse_error_response(status: StatusCode, bytes: &[u8]) -> CrptError {
    match serde_json::from_slice::<ApiError>(bytes) {
        Ok(api_error) => {
            warn!(
                status = status.as_u16(),
                code = %api_error.code,
                message = %api_error.message,
                "Registry rejected document"
            );
            CrptError::Registry {
                status: status.as_u16(),
                code: api_error.code,
                message: api_error.message,
                description: api_error.description,
            }
        }
        Err(source) => malformed(status, bytes, source),
    }
}

fn malformed(status: StatusCode, bytes: &[u8], source: serde_json::Error) -> CrptError {
    warn!(status = status.as_u16(), error = %source, "Unparseable registry response");
    CrptError::MalformedResponse {
        status: status.as_u16(),
        body: String::from_utf8_lossy(bytes).into_owned(),
        source,
    }
}
