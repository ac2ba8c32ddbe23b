//! Remote classification of a single record.
//!
//! Builds the two-message cleaning prompt, calls the chat-completion
//! provider, writes the raw answer to the audit log and hands back repaired
//! text (or [`ClassifierOutput::Empty`] when there is nothing usable).

use std::sync::Arc;

use tracing::debug;

use super::types::{ClassifierOutput, Record};
use crate::error::LlmError;
use crate::llm::{GenerationRequest, LlmProvider, Message};
use crate::storage::AuditLog;
use crate::utils::repair_response;

/// Sampling temperature for cleaning calls; low to keep output literal.
pub const CLEANING_TEMPERATURE: f64 = 0.3;

/// Completion token ceiling for cleaning calls.
pub const CLEANING_MAX_TOKENS: u32 = 3000;

/// System instruction sent with every record.
pub const CLEANING_SYSTEM_PROMPT: &str = "The user will send you one chunk of a dataset as JSON, \
containing an input and an output. Remove any personal information such as names or nicknames \
and clean the chunk so it is suitable for training an LLM. Answer with the cleaned chunk as JSON \
with the same input and output keys. \
If the input or output asks to continue a previous response, JUST RETURN {\"reason\":\"conversational\"}. \
If the input or output refers to previous messages, JUST RETURN {\"reason\":\"conversational\"}. \
If the input or output refers to an attachment or an image, JUST RETURN {\"reason\":\"images\"}. \
If the input is irrelevant or not good for LLM training, JUST RETURN {\"reason\":\"irrelevant\"}. \
DO NOT ADD EXPLANATIONS. JUST ANSWER WITH THE CLEANED DATA.";

/// Classifies records through an [`LlmProvider`].
pub struct RecordClassifier {
    provider: Arc<dyn LlmProvider>,
    audit: Arc<AuditLog>,
    model: String,
}

impl RecordClassifier {
    /// Create a classifier. An empty `model` defers to the provider's default.
    pub fn new(provider: Arc<dyn LlmProvider>, audit: Arc<AuditLog>, model: impl Into<String>) -> Self {
        Self {
            provider,
            audit,
            model: model.into(),
        }
    }

    /// The audit log this classifier writes to.
    pub fn audit(&self) -> &Arc<AuditLog> {
        &self.audit
    }

    /// Build the chat request for one record. `model` is always stripped.
    pub fn build_request(&self, record: &Record) -> Result<GenerationRequest, LlmError> {
        let payload = serde_json::to_string(&record.without_model())
            .map_err(|e| LlmError::ParseError(format!("Failed to serialize record: {}", e)))?;

        Ok(GenerationRequest::new(
            self.model.clone(),
            vec![
                Message::system(CLEANING_SYSTEM_PROMPT),
                Message::user(payload),
            ],
        )
        .with_temperature(CLEANING_TEMPERATURE)
        .with_max_tokens(CLEANING_MAX_TOKENS))
    }

    /// Make one classifier call for `record`.
    ///
    /// # Errors
    ///
    /// Any provider failure is returned unchanged; the record cleaner decides
    /// whether to retry.
    pub async fn classify(&self, record: &Record) -> Result<ClassifierOutput, LlmError> {
        let request = self.build_request(record)?;
        let response = self.provider.generate(request).await?;

        let Some(choice) = response.first_choice() else {
            debug!(record_id = %record.id, "Classifier returned no choices");
            self.audit.append("clean result", "<no choices>").await;
            return Ok(ClassifierOutput::Empty);
        };

        self.audit
            .append("clean result", &choice.message.content)
            .await;

        if choice.is_content_filtered() {
            debug!(record_id = %record.id, "Classifier response was content-filtered");
            return Ok(ClassifierOutput::Empty);
        }

        let repaired = repair_response(&choice.message.content);
        if repaired.is_empty() {
            return Ok(ClassifierOutput::Empty);
        }
        Ok(ClassifierOutput::Text(repaired))
    }
}
