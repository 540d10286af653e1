//! Compliance service HTTP client and response types.
use base64ct::{Base64, Encoding};
use reqwest::{Client, RequestBuilder, Response};
use serde::{Deserialize, Serialize};
use std::marker::PhantomData;
use thiserror::Error;
use tracing::{debug, error};

use crate::{
    config::{Config, Endpoints},
    invoice::request::InvoiceRequest,
};

const ISSUED: &str = "ISSUED";

/// Errors returned by the compliance service client.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Invalid response from service: {0}")]
    InvalidResponse(String),
    #[error("Unauthorized: {0:?}")]
    Unauthorized(UnauthorizedResponse),
    #[error("Server error: {0:?}")]
    ServerError(ServerErrorResponse),
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Client state error: {0}")]
    ClientState(String),
    #[error("binary security token is not valid base64")]
    InvalidToken,
}

/// Marker trait for credential scope, either Compliance (CCSID) or Production (PCSID).
pub trait TokenScope {}
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
/// Compliance (CCSID) token scope.
pub struct Compliance;
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
/// Production (PCSID) token scope.
pub struct Production;
impl TokenScope for Compliance {}
impl TokenScope for Production {}

/// Validation response for compliance, clearance and reporting calls.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ValidationResponse {
    #[serde(rename = "validationResults", default)]
    validation_results: Option<ValidationResults>,
    #[serde(rename = "errorMessages", default)]
    error_messages: Vec<ValidationMessage>,
    #[serde(rename = "warningMessages", default)]
    warning_messages: Vec<ValidationMessage>,
    #[serde(rename = "reportingStatus")]
    reporting_status: Option<String>,
    #[serde(rename = "clearanceStatus")]
    clearance_status: Option<String>,
}

impl ValidationResponse {
    pub fn validation_results(&self) -> Option<&ValidationResults> {
        self.validation_results.as_ref()
    }

    pub fn error_messages(&self) -> &[ValidationMessage] {
        &self.error_messages
    }

    pub fn warning_messages(&self) -> &[ValidationMessage] {
        &self.warning_messages
    }

    pub fn reporting_status(&self) -> Option<&str> {
        self.reporting_status.as_deref()
    }

    pub fn clearance_status(&self) -> Option<&str> {
        self.clearance_status.as_deref()
    }

    /// `REPORTED` or `CLEARED`, compared case-insensitively.
    pub fn is_valid(&self) -> bool {
        let matches = |status: Option<&str>, expected: &str| {
            status.is_some_and(|s| s.trim().eq_ignore_ascii_case(expected))
        };
        matches(self.reporting_status(), "REPORTED") || matches(self.clearance_status(), "CLEARED")
    }
}

/// Validation results container.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ValidationResults {
    #[serde(rename = "infoMessages", default)]
    info_messages: MessageList,
    #[serde(rename = "warningMessages", default)]
    warning_messages: Vec<ValidationMessage>,
    #[serde(rename = "errorMessages", default)]
    error_messages: Vec<ValidationMessage>,
    #[serde(default)]
    status: Option<String>,
}

impl ValidationResults {
    pub fn info_messages(&self) -> &MessageList {
        &self.info_messages
    }

    pub fn warning_messages(&self) -> &[ValidationMessage] {
        &self.warning_messages
    }

    pub fn error_messages(&self) -> &[ValidationMessage] {
        &self.error_messages
    }

    pub fn status(&self) -> Option<&str> {
        self.status.as_deref()
    }
}

/// Validation message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationMessage {
    #[serde(rename = "type")]
    message_type: Option<String>,
    code: Option<String>,
    category: Option<String>,
    message: Option<String>,
    #[serde(default)]
    status: Option<String>,
}

impl ValidationMessage {
    pub fn message_type(&self) -> Option<&str> {
        self.message_type.as_deref()
    }

    pub fn code(&self) -> Option<&str> {
        self.code.as_deref()
    }

    pub fn category(&self) -> Option<&str> {
        self.category.as_deref()
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    pub fn status(&self) -> Option<&str> {
        self.status.as_deref()
    }
}

/// Message list returned by the service, either one object or an array.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageList {
    One(ValidationMessage),
    Many(Vec<ValidationMessage>),
    #[default]
    Empty,
}

/// Unauthorized response body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnauthorizedResponse {
    timestamp: Option<i64>,
    status: Option<u16>,
    error: Option<String>,
    message: Option<String>,
}

impl UnauthorizedResponse {
    fn from_body(body: &str) -> Self {
        serde_json::from_str(body).unwrap_or_else(|_| Self {
            timestamp: None,
            status: Some(401),
            error: Some("Unauthorized".into()),
            message: Some(body.to_string()),
        })
    }

    pub fn status(&self) -> Option<u16> {
        self.status
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }
}

/// Server error response body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerErrorResponse {
    category: Option<String>,
    code: Option<String>,
    message: Option<String>,
}

impl ServerErrorResponse {
    fn from_body(body: &str) -> Self {
        serde_json::from_str(body).unwrap_or_else(|_| Self {
            category: None,
            code: Some("ServerError".into()),
            message: Some(body.to_string()),
        })
    }

    pub fn code(&self) -> Option<&str> {
        self.code.as_deref()
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }
}

/// CSID credentials returned by the certificate endpoints.
///
/// Serialized with the service's field names, so a saved response body can
/// be read back as credentials.
///
/// # Examples
/// ```rust
/// use fotara_core::api::{CsidCredentials, Compliance};
///
/// let creds = CsidCredentials::<Compliance>::new(
///     Some(1234567890123),
///     "TUlJQ1BUQ0NBZU9nQXdJQkFnS....",
///     None,
/// );
/// assert!(!creds.is_issued());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CsidCredentials<T> {
    #[serde(rename = "requestID", default, skip_serializing_if = "Option::is_none")]
    request_id: Option<u64>,
    #[serde(rename = "binarySecurityToken")]
    binary_security_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    secret: Option<String>,
    #[serde(rename = "dispositionMessage", default, skip_serializing_if = "Option::is_none")]
    disposition_message: Option<String>,
    #[serde(skip)]
    _marker: PhantomData<T>,
}

impl<T> CsidCredentials<T> {
    pub fn new(
        request_id: Option<u64>,
        binary_security_token: impl Into<String>,
        secret: Option<String>,
    ) -> Self {
        Self {
            request_id,
            binary_security_token: binary_security_token.into(),
            secret,
            disposition_message: None,
            _marker: PhantomData,
        }
    }

    pub fn with_disposition(mut self, message: impl Into<String>) -> Self {
        self.disposition_message = Some(message.into());
        self
    }

    pub fn request_id(&self) -> Option<u64> {
        self.request_id
    }

    pub fn binary_security_token(&self) -> &str {
        &self.binary_security_token
    }

    pub fn secret(&self) -> Option<&str> {
        self.secret.as_deref()
    }

    pub fn disposition_message(&self) -> Option<&str> {
        self.disposition_message.as_deref()
    }

    pub fn is_issued(&self) -> bool {
        self.disposition_message()
            .is_some_and(|m| m.trim().eq_ignore_ascii_case(ISSUED))
    }

    /// The certificate carried by the token, ready for signing.
    pub fn certificate_pem(&self) -> Result<String, ApiError> {
        let bytes = Base64::decode_vec(self.binary_security_token.trim())
            .map_err(|_| ApiError::InvalidToken)?;
        String::from_utf8(bytes).map_err(|_| ApiError::InvalidToken)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        let password = self.secret().unwrap_or(&self.binary_security_token);
        request.basic_auth(&self.binary_security_token, Some(password))
    }
}

/// Client for the compliance, certificate, clearance and reporting endpoints.
///
/// Each call is a single request. Nothing is retried.
///
/// # Examples
/// ```rust,no_run
/// use fotara_core::api::FotaraClient;
/// use fotara_core::config::Config;
///
/// let client = FotaraClient::new(&Config::default())?;
/// # let _ = client;
/// # Ok::<(), fotara_core::api::ApiError>(())
/// ```
#[derive(Debug, Clone)]
pub struct FotaraClient {
    client: Client,
    endpoints: Endpoints,
}

impl FotaraClient {
    pub fn new(config: &Config) -> Result<Self, ApiError> {
        Self::with_endpoints(config.endpoints().clone())
    }

    pub fn with_endpoints(endpoints: Endpoints) -> Result<Self, ApiError> {
        let client = Client::builder().build().map_err(ApiError::Http)?;
        Ok(Self { client, endpoints })
    }

    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    /// Requests a compliance CSID for a base64 encoded CSR.
    ///
    /// # Errors
    /// Any non-2xx status is [`ApiError::InvalidResponse`].
    pub async fn compliance_csr(
        &self,
        otp: &str,
        csr_encoded: &str,
    ) -> Result<CsidCredentials<Compliance>, ApiError> {
        let url = &self.endpoints.compliance_csr;
        debug!(url, "compliance CSR");
        let request = self
            .client
            .post(url)
            .header("OTP", otp)
            .header("Accept", "application/json")
            .header("Accept-Language", "en")
            .header("Accept-Version", "V2")
            .json(&serde_json::json!({ "csr": csr_encoded }));
        read_credentials(request.send().await?).await
    }

    /// Validates a signed invoice with compliance credentials.
    pub async fn compliance_invoice(
        &self,
        credentials: &CsidCredentials<Compliance>,
        invoice: &InvoiceRequest,
    ) -> Result<ValidationResponse, ApiError> {
        let url = &self.endpoints.compliance_invoice;
        debug!(url, uuid = %invoice.uuid, "compliance invoice");
        let request = credentials.authorize(self.client.post(url)).json(invoice);
        read_validation(request.send().await?).await
    }

    /// Exchanges compliance credentials for a production CSID.
    pub async fn production_certificate(
        &self,
        credentials: &CsidCredentials<Compliance>,
    ) -> Result<CsidCredentials<Production>, ApiError> {
        let request_id = credentials
            .request_id()
            .ok_or_else(|| ApiError::ClientState("Missing compliance request_id".into()))?;
        let url = &self.endpoints.production_certificate;
        debug!(url, request_id, "production certificate");
        let request = credentials
            .authorize(self.client.post(url))
            .json(&serde_json::json!({ "compliance_request_id": request_id.to_string() }));
        read_credentials(request.send().await?).await
    }

    /// Clearance submission of a standard invoice.
    pub async fn submit_invoice(
        &self,
        credentials: &CsidCredentials<Production>,
        invoice: &InvoiceRequest,
    ) -> Result<ValidationResponse, ApiError> {
        let url = &self.endpoints.clearance;
        debug!(url, uuid = %invoice.uuid, "clearance invoice");
        let request = credentials.authorize(self.client.post(url)).json(invoice);
        read_validation(request.send().await?).await
    }

    /// Reporting submission of a simplified invoice.
    pub async fn report_invoice(
        &self,
        credentials: &CsidCredentials<Production>,
        invoice: &InvoiceRequest,
    ) -> Result<ValidationResponse, ApiError> {
        let url = &self.endpoints.reporting;
        debug!(url, uuid = %invoice.uuid, "report invoice");
        let request = credentials
            .authorize(self.client.post(url))
            .header("Accept", "application/json")
            .header("Accept-Language", "en")
            .header("Accept-Version", "V2")
            .json(invoice);
        read_validation(request.send().await?).await
    }
}

async fn read_credentials<T>(response: Response) -> Result<CsidCredentials<T>, ApiError> {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    debug!(status = status.as_u16(), "certificate response");

    if !status.is_success() {
        error!(status = status.as_u16(), "certificate request rejected");
        return Err(ApiError::InvalidResponse(format!("status {status}: {body}")));
    }
    serde_json::from_str(&body).map_err(|e| ApiError::InvalidResponse(e.to_string()))
}

async fn read_validation(response: Response) -> Result<ValidationResponse, ApiError> {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    debug!(status = status.as_u16(), "validation response");

    if status.as_u16() == 401 {
        return Err(ApiError::Unauthorized(UnauthorizedResponse::from_body(&body)));
    }
    if status.is_server_error() {
        error!(status = status.as_u16(), "service error");
        return Err(ApiError::ServerError(ServerErrorResponse::from_body(&body)));
    }
    if status.is_success() || status.is_client_error() {
        return serde_json::from_str::<ValidationResponse>(&body.replace('\n', ""))
            .map_err(|e| ApiError::InvalidResponse(format!("status {status}: {e}")));
    }

    Err(ApiError::InvalidResponse(format!("status {status}: {body}")))
}
