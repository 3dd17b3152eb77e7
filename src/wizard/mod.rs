use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use thiserror::Error;

use crate::{ProviderSelection, RequestFile, SelfServiceRequest, TemplateDefinition};

pub const PROVIDER_FIELD: &str = "provider";
pub const SUB_TYPE_FIELD: &str = "sub_type";
pub const JUSTIFICATION_FIELD: &str = "justification";

/// Field name to value, accumulated across steps.
pub type FormData = BTreeMap<String, Value>;

/// The three stages of request creation, in order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Step {
    #[default]
    SelectProvider,
    Configure,
    ReviewAndSubmit,
}

impl Step {
    pub const ALL: [Step; 3] = [Step::SelectProvider, Step::Configure, Step::ReviewAndSubmit];

    pub fn index(self) -> usize {
        match self {
            Step::SelectProvider => 0,
            Step::Configure => 1,
            Step::ReviewAndSubmit => 2,
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            Step::SelectProvider => "Select provider",
            Step::Configure => "Configure",
            Step::ReviewAndSubmit => "Review & submit",
        }
    }

    pub fn next(self) -> Option<Step> {
        Step::ALL.get(self.index() + 1).copied()
    }

    pub fn prev(self) -> Option<Step> {
        self.index().checked_sub(1).map(|i| Step::ALL[i])
    }
}

/// Why a transition or submission was refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WizardError {
    #[error("Required: {}", .0.join(", "))]
    MissingFields(Vec<String>),
    #[error("The template definition is still loading")]
    DefinitionPending,
    #[error("There are no changes to submit")]
    NoFiles,
    #[error("The preview no longer matches the configured values; regenerate it before submitting")]
    StalePreview,
    #[error("Complete the current step before moving to {}", .0.title())]
    SkipAhead(Step),
    #[error("Already on the last step")]
    NoNextStep,
    #[error("Requests can only be submitted from the review step")]
    NotOnReview,
    #[error("A submission is already in progress")]
    SubmitInProgress,
}

pub type Result<T> = std::result::Result<T, WizardError>;

/// State of one request-creation session.
///
/// Forward moves are gated on the current step's required fields; backward
/// moves are always allowed and never discard entered data.
#[derive(Debug, Clone, Default)]
pub struct Wizard {
    step: Step,
    form: FormData,
    definition: Option<TemplateDefinition>,
    files: Vec<RequestFile>,
    preview_fingerprint: Option<String>,
    submitting: bool,
}

impl Wizard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current_step(&self) -> Step {
        self.step
    }

    pub fn form_data(&self) -> &FormData {
        &self.form
    }

    pub fn field(&self, name: &str) -> Option<&Value> {
        self.form.get(name)
    }

    /// String value of a field, or `""` when absent or not a string.
    pub fn text(&self, name: &str) -> &str {
        self.form.get(name).and_then(Value::as_str).unwrap_or("")
    }

    /// Set a field. Changing the provider or sub_type to a different value
    /// discards everything that depended on it: configure fields, the loaded
    /// definition, and the request files.
    pub fn set_field(&mut self, name: &str, value: Value) {
        let is_selection = name == PROVIDER_FIELD || name == SUB_TYPE_FIELD;
        if is_selection && self.form.get(name) != Some(&value) {
            self.clear_dependents();
        }
        self.form.insert(name.to_string(), value);
    }

    pub fn set_text(&mut self, name: &str, value: impl Into<String>) {
        self.set_field(name, Value::String(value.into()));
    }

    pub fn select_provider(&mut self, selection: &ProviderSelection) {
        self.set_text(PROVIDER_FIELD, selection.provider.clone());
        self.set_text(SUB_TYPE_FIELD, selection.sub_type.clone());
    }

    /// The chosen provider pair, once both halves are non-empty.
    pub fn selection(&self) -> Option<ProviderSelection> {
        let provider = self.text(PROVIDER_FIELD);
        let sub_type = self.text(SUB_TYPE_FIELD);
        if provider.trim().is_empty() || sub_type.trim().is_empty() {
            return None;
        }
        Some(ProviderSelection {
            provider: provider.to_string(),
            sub_type: sub_type.to_string(),
        })
    }

    fn clear_dependents(&mut self) {
        self.form
            .retain(|k, _| k == PROVIDER_FIELD || k == SUB_TYPE_FIELD || k == JUSTIFICATION_FIELD);
        self.definition = None;
        self.files.clear();
        self.preview_fingerprint = None;
    }

    /// Install the definition for the current selection. Definitions for any
    /// other selection are ignored and `false` is returned.
    pub fn set_definition(&mut self, definition: TemplateDefinition) -> bool {
        let matches = self
            .selection()
            .is_some_and(|s| s.provider == definition.provider && s.sub_type == definition.template_id);
        if matches {
            self.definition = Some(definition);
        }
        matches
    }

    pub fn definition(&self) -> Option<&TemplateDefinition> {
        self.definition.as_ref()
    }

    /// Field names a step requires to be present and non-empty.
    pub fn required_fields(&self, step: Step) -> Vec<String> {
        match step {
            Step::SelectProvider => vec![PROVIDER_FIELD.to_string(), SUB_TYPE_FIELD.to_string()],
            Step::Configure => self
                .definition
                .iter()
                .flat_map(|d| d.fields.iter())
                .filter(|f| f.required)
                .map(|f| f.name.clone())
                .collect(),
            Step::ReviewAndSubmit => vec![JUSTIFICATION_FIELD.to_string()],
        }
    }

    pub fn missing_fields(&self, step: Step) -> Vec<String> {
        self.required_fields(step)
            .into_iter()
            .filter(|name| self.form.get(name).is_none_or(is_blank))
            .collect()
    }

    /// Check whether the given step is complete.
    pub fn validate(&self, step: Step) -> Result<()> {
        if step == Step::Configure && self.definition.is_none() {
            return Err(WizardError::DefinitionPending);
        }
        let missing = self.missing_fields(step);
        if !missing.is_empty() {
            return Err(WizardError::MissingFields(missing));
        }
        if step == Step::ReviewAndSubmit && self.files.is_empty() {
            return Err(WizardError::NoFiles);
        }
        Ok(())
    }

    /// Move to the next step if the current one validates.
    pub fn advance(&mut self) -> Result<Step> {
        let next = self.step.next().ok_or(WizardError::NoNextStep)?;
        self.validate(self.step)?;
        tracing::debug!(from = ?self.step, to = ?next, "wizard advanced");
        self.step = next;
        Ok(next)
    }

    /// Move one step back, if there is one.
    pub fn back(&mut self) -> Step {
        if let Some(prev) = self.step.prev() {
            self.step = prev;
        }
        self.step
    }

    /// Jump to a step indicator. Only the current or earlier steps are reachable.
    pub fn go_to(&mut self, step: Step) -> Result<()> {
        if step > self.step {
            return Err(WizardError::SkipAhead(step));
        }
        self.step = step;
        Ok(())
    }

    /// Values collected by the Configure step.
    pub fn configure_fields(&self) -> BTreeMap<String, Value> {
        self.form
            .iter()
            .filter(|(k, _)| {
                k.as_str() != PROVIDER_FIELD
                    && k.as_str() != SUB_TYPE_FIELD
                    && k.as_str() != JUSTIFICATION_FIELD
            })
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// SHA-256 over the inputs that determine the previewed files.
    pub fn preview_fingerprint(&self) -> String {
        let inputs = serde_json::json!({
            "provider": self.text(PROVIDER_FIELD),
            "sub_type": self.text(SUB_TYPE_FIELD),
            "fields": self.configure_fields(),
        });
        let mut hasher = Sha256::new();
        hasher.update(inputs.to_string().as_bytes());
        format!("{:x}", hasher.finalize())
    }

    /// Files must be (re)generated when none are loaded or the inputs changed.
    pub fn needs_preview(&self) -> bool {
        self.files.is_empty()
            || self.preview_fingerprint.as_deref() != Some(self.preview_fingerprint().as_str())
    }

    /// Install previewed files. Previews computed for outdated inputs are ignored.
    pub fn apply_preview(&mut self, fingerprint: &str, files: Vec<RequestFile>) -> bool {
        if fingerprint != self.preview_fingerprint() {
            return false;
        }
        self.files = files;
        self.preview_fingerprint = Some(fingerprint.to_string());
        true
    }

    pub fn files(&self) -> &[RequestFile] {
        &self.files
    }

    pub fn file(&self, file_path: &str) -> Option<&RequestFile> {
        self.files.iter().find(|f| f.file_path == file_path)
    }

    /// Replace the file with the same path by the confirmed edit.
    pub fn handle_modify_change(&mut self, file: RequestFile) -> bool {
        match self.files.iter_mut().find(|f| f.file_path == file.file_path) {
            Some(slot) => {
                *slot = file;
                true
            }
            None => false,
        }
    }

    /// Request built from the current state, using `files` as given.
    fn build_request(&self, files: Vec<RequestFile>) -> SelfServiceRequest {
        SelfServiceRequest {
            provider: self.text(PROVIDER_FIELD).to_string(),
            sub_type: self.text(SUB_TYPE_FIELD).to_string(),
            fields: self.configure_fields(),
            justification: self.text(JUSTIFICATION_FIELD).to_string(),
            files,
        }
    }

    /// Payload for the preview call.
    pub fn preview_request(&self) -> SelfServiceRequest {
        self.build_request(Vec::new())
    }

    pub fn is_submitting(&self) -> bool {
        self.submitting
    }

    /// Validate the review step and hand out the payload to send.
    pub fn begin_submit(&mut self) -> Result<SelfServiceRequest> {
        if self.step != Step::ReviewAndSubmit {
            return Err(WizardError::NotOnReview);
        }
        if self.submitting {
            return Err(WizardError::SubmitInProgress);
        }
        self.validate(Step::ReviewAndSubmit)?;
        if self.needs_preview() {
            return Err(WizardError::StalePreview);
        }
        self.submitting = true;
        Ok(self.build_request(self.files.clone()))
    }

    /// The backend accepted the request: the session is over.
    pub fn submit_succeeded(&mut self) {
        *self = Wizard::new();
    }

    /// The backend refused or could not be reached: keep everything for a retry.
    pub fn submit_failed(&mut self) {
        self.submitting = false;
    }
}

/// Null, whitespace-only strings, and empty arrays or objects count as missing.
pub fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        Value::Bool(_) | Value::Number(_) => false,
    }
}
