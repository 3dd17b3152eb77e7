pub mod api;
pub mod cli;
pub mod config;
pub mod highlight;
pub mod inflight;
pub mod provider;
pub mod session;
pub mod tui;
pub mod viewer;
pub mod wizard;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One proposed change unit of a self-service request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestFile {
    pub file_path: String,
    #[serde(default)]
    pub repo_name: Option<String>,
    #[serde(default)]
    pub previous_body: String,
    pub template_body: String,
    #[serde(default)]
    pub additions: u32,
}

impl RequestFile {
    /// Extension of `file_path`, used to pick a syntax for highlighting.
    pub fn extension(&self) -> &str {
        std::path::Path::new(&self.file_path)
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
    }
}

/// A configured provider integration and the resource type under it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProviderSelection {
    pub provider: String,
    #[serde(default)]
    pub sub_type: String,
}

impl std::fmt::Display for ProviderSelection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.provider, self.sub_type)
    }
}

/// One input the Configure step collects for a template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub required: bool,
    /// Whether the backend offers prefix autocomplete for this field.
    #[serde(default)]
    pub typeahead: bool,
}

impl FieldSpec {
    pub fn display_label(&self) -> &str {
        self.label.as_deref().unwrap_or(&self.name)
    }
}

/// Template definition for a `(provider, template_id)` pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateDefinition {
    pub template_id: String,
    pub provider: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub fields: Vec<FieldSpec>,
}

/// Autocomplete suggestion for a resource field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeaheadHit {
    pub label: String,
    pub value: String,
}

/// Payload of the "submit self-service request" call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelfServiceRequest {
    pub provider: String,
    pub sub_type: String,
    pub fields: BTreeMap<String, serde_json::Value>,
    pub justification: String,
    pub files: Vec<RequestFile>,
}

/// What the backend returns for an accepted request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitReceipt {
    pub request_id: String,
    #[serde(default)]
    pub request_url: Option<String>,
}
