pub mod message;

use reqwest::blocking::{Client, RequestBuilder};
use reqwest::header::{ACCEPT, AUTHORIZATION, HeaderMap, HeaderValue};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::time::Instant;
use thiserror::Error;

use crate::config::Settings;
use crate::{
    ProviderSelection, RequestFile, SelfServiceRequest, SubmitReceipt, TemplateDefinition,
    TypeaheadHit,
};

pub use message::extract_message;

const API_PREFIX: &str = "/api/v4";
const CSRF_HEADER: &str = "x-xsrf-token";
const GENERIC_FAILURE: &str = "Something went wrong";

/// Errors surfaced by the API gateway.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    #[error("The request timed out after {0}s")]
    Timeout(u64),
    #[error("Could not reach the Noq API: {0}")]
    Transport(String),
    #[error("Your session has expired. Run `noq-request auth` to sign in again")]
    SessionExpired,
    /// Structured server-side rejection; displays the server's message verbatim.
    #[error("{message}")]
    Rejected { status: u16, message: String },
    #[error("Unexpected response from the Noq API: {0}")]
    Decode(String),
    #[error("Invalid client configuration: {0}")]
    Config(String),
}

impl ApiError {
    pub fn is_session_expired(&self) -> bool {
        matches!(self, ApiError::SessionExpired)
    }
}

pub type Result<T> = std::result::Result<T, ApiError>;

/// Parameters of a resource typeahead lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeaheadQuery {
    pub provider: String,
    pub template_id: String,
    pub field: String,
    pub prefix: String,
}

/// The data-access boundary: everything the request flow needs from the backend.
pub trait ApiGateway: Send + Sync {
    /// Provider/sub_type pairs that have a configured integration.
    fn configured_providers(&self) -> Result<Vec<ProviderSelection>>;

    /// Fields the Configure step collects for a template.
    fn template_definition(&self, provider: &str, template_id: &str) -> Result<TemplateDefinition>;

    fn resource_typeahead(&self, query: &TypeaheadQuery) -> Result<Vec<TypeaheadHit>>;

    /// Ask the backend to render the files a request would change.
    fn preview_request(&self, request: &SelfServiceRequest) -> Result<Vec<RequestFile>>;

    fn submit_request(&self, request: &SelfServiceRequest) -> Result<SubmitReceipt>;
}

#[derive(Deserialize)]
struct PreviewResponse {
    #[serde(default)]
    files: Vec<RequestFile>,
}

/// Blocking HTTP implementation of [`ApiGateway`].
///
/// Credentials and the CSRF header are attached to every request through the
/// client's default headers.
pub struct HttpGateway {
    client: Client,
    base_url: String,
    timeout_secs: u64,
}

impl HttpGateway {
    pub fn new(settings: &Settings) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        if let Some(token) = settings.token.as_deref() {
            let mut value = HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|e| ApiError::Config(format!("token: {}", e)))?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }
        if let Some(csrf) = settings.csrf_token.as_deref() {
            let value = HeaderValue::from_str(csrf)
                .map_err(|e| ApiError::Config(format!("csrf token: {}", e)))?;
            headers.insert(CSRF_HEADER, value);
        }

        let client = Client::builder()
            .timeout(settings.timeout)
            .default_headers(headers)
            .build()
            .map_err(|e| ApiError::Config(e.to_string()))?;

        Ok(Self {
            client,
            base_url: settings.api_url.clone(),
            timeout_secs: settings.timeout.as_secs(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}{}", self.base_url, API_PREFIX, path)
    }

    fn get(&self, path: &str, query: &[(&str, &str)]) -> Result<Value> {
        self.execute(path, self.client.get(self.url(path)).query(query))
    }

    fn post<T: serde::Serialize>(&self, path: &str, body: &T) -> Result<Value> {
        self.execute(path, self.client.post(self.url(path)).json(body))
    }

    fn execute(&self, path: &str, request: RequestBuilder) -> Result<Value> {
        let start = Instant::now();
        let response = request.send().map_err(|e| {
            if e.is_timeout() {
                ApiError::Timeout(self.timeout_secs)
            } else {
                ApiError::Transport(e.to_string())
            }
        })?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .map_err(|e| ApiError::Transport(e.to_string()))?;

        tracing::debug!(
            path,
            status,
            elapsed_ms = start.elapsed().as_millis() as u64,
            response_bytes = body.len(),
            "api call complete"
        );

        interpret_response(status, &body)
    }
}

impl ApiGateway for HttpGateway {
    fn configured_providers(&self) -> Result<Vec<ProviderSelection>> {
        decode(self.get("/providers", &[])?)
    }

    fn template_definition(&self, provider: &str, template_id: &str) -> Result<TemplateDefinition> {
        decode(self.get(
            "/providers/definitions",
            &[("provider", provider), ("template_id", template_id)],
        )?)
    }

    fn resource_typeahead(&self, query: &TypeaheadQuery) -> Result<Vec<TypeaheadHit>> {
        decode(self.get(
            "/self-service/typeahead",
            &[
                ("provider", query.provider.as_str()),
                ("template_id", query.template_id.as_str()),
                ("field", query.field.as_str()),
                ("prefix", query.prefix.as_str()),
            ],
        )?)
    }

    fn preview_request(&self, request: &SelfServiceRequest) -> Result<Vec<RequestFile>> {
        let preview: PreviewResponse = decode(self.post("/self-service/requests/validate", request)?)?;
        Ok(preview.files)
    }

    fn submit_request(&self, request: &SelfServiceRequest) -> Result<SubmitReceipt> {
        decode(self.post("/self-service/requests", request)?)
    }
}

/// Map a raw HTTP status and body to the unwrapped payload or an [`ApiError`].
///
/// Successful bodies are unwrapped from the `{status_code, data}` envelope when
/// present. A 401 always means the session expired.
pub fn interpret_response(status: u16, body: &str) -> Result<Value> {
    if status == 401 {
        return Err(ApiError::SessionExpired);
    }

    let parsed: Option<Value> = if body.trim().is_empty() {
        Some(Value::Null)
    } else {
        serde_json::from_str(body).ok()
    };

    if (200..300).contains(&status) {
        let value = parsed.ok_or_else(|| ApiError::Decode("body is not JSON".to_string()))?;
        return Ok(unwrap_envelope(value));
    }

    let message = parsed
        .as_ref()
        .and_then(extract_message)
        .unwrap_or_else(|| {
            if status >= 500 {
                GENERIC_FAILURE.to_string()
            } else {
                format!("Request failed with status {}", status)
            }
        });

    tracing::warn!(status, %message, "api call rejected");
    Err(ApiError::Rejected { status, message })
}

fn unwrap_envelope(value: Value) -> Value {
    match value {
        Value::Object(mut map) if map.contains_key("data") => {
            map.remove("data").unwrap_or(Value::Null)
        }
        other => other,
    }
}

fn decode<T: DeserializeOwned>(value: Value) -> Result<T> {
    serde_json::from_value(value).map_err(|e| ApiError::Decode(e.to_string()))
}
