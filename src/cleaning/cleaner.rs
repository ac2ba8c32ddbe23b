//! Per-record cleaning: classifier call, parse, accept/reject, retry.
//!
//! Retry policy: only remote-call failures are retried, up to `max_retries`
//! times after the first attempt. An empty, unparseable or incomplete
//! response drops the record immediately. The final checkpoint does not
//! record why a record was dropped; the audit log is the only trace that
//! separates a real rejection from classifier garbage.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};

use super::classifier::RecordClassifier;
use super::types::{ClassifiedResult, ClassifierOutput, CleanedRecord, MalformedKind, Record, RejectionReason};

/// Default number of retries after a failed classifier call.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Outcome of cleaning one record plus how many classifier calls it took.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanOutcome {
    pub result: ClassifiedResult,
    pub attempts: u32,
}

/// Drives one record through classify → parse → decide.
pub struct RecordCleaner {
    classifier: Arc<RecordClassifier>,
    max_retries: u32,
}

impl RecordCleaner {
    pub fn new(classifier: Arc<RecordClassifier>) -> Self {
        Self {
            classifier,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Clean one record and return its terminal result.
    pub async fn clean(&self, record: &Record) -> ClassifiedResult {
        self.clean_with_attempts(record).await.result
    }

    /// Clean one record, also reporting the number of classifier calls made.
    pub async fn clean_with_attempts(&self, record: &Record) -> CleanOutcome {
        let record = record.without_model();
        let max_attempts = self.max_retries + 1;
        let mut attempts = 0;

        let output = loop {
            attempts += 1;
            match self.classifier.classify(&record).await {
                Ok(output) => break output,
                Err(e) if attempts < max_attempts => {
                    debug!(
                        record_id = %record.id,
                        attempt = attempts,
                        error = %e,
                        "Classifier call failed, retrying"
                    );
                }
                Err(e) => {
                    warn!(
                        record_id = %record.id,
                        attempts = attempts,
                        error = %e,
                        "Classifier call failed, giving up on record"
                    );
                    return self
                        .dropped(&record, MalformedKind::RetriesExhausted, attempts)
                        .await;
                }
            }
        };

        let text = match output {
            ClassifierOutput::Text(text) => text,
            ClassifierOutput::Empty => {
                return self
                    .dropped(&record, MalformedKind::EmptyResponse, attempts)
                    .await;
            }
        };

        let result = match interpret_response(&record.id, &text) {
            Ok(result) => result,
            Err(e) => {
                warn!(record_id = %record.id, error = %e, "Classifier response is not valid JSON");
                self.classifier
                    .audit()
                    .append("error", &format!("record {}: {}", record.id, e))
                    .await;
                ClassifiedResult::Malformed(MalformedKind::Unparseable)
            }
        };

        if let ClassifiedResult::Malformed(kind) = result {
            return self.dropped(&record, kind, attempts).await;
        }
        if let ClassifiedResult::Rejected(reason) = result {
            debug!(record_id = %record.id, reason = %reason, "Record rejected");
        }

        CleanOutcome { result, attempts }
    }

    async fn dropped(&self, record: &Record, kind: MalformedKind, attempts: u32) -> CleanOutcome {
        debug!(record_id = %record.id, reason = %kind, "Record dropped");
        self.classifier
            .audit()
            .append("dropped", &format!("record {}: {}", record.id, kind))
            .await;
        CleanOutcome {
            result: ClassifiedResult::Malformed(kind),
            attempts,
        }
    }
}

/// Decide what a (repaired) classifier answer means for record `id`.
///
/// Returns `Err` only when the text is not JSON at all. Non-object JSON is
/// `Unparseable`; an object with non-empty string `input` and `output` is
/// accepted under the original id; otherwise a known `reason` rejects, and
/// anything else is `MissingFields`.
pub fn interpret_response(id: &str, text: &str) -> Result<ClassifiedResult, serde_json::Error> {
    let value: Value = serde_json::from_str(text)?;
    let Value::Object(map) = value else {
        return Ok(ClassifiedResult::Malformed(MalformedKind::Unparseable));
    };

    if map.is_empty() {
        return Ok(ClassifiedResult::Malformed(MalformedKind::MissingFields));
    }

    let field = |key: &str| map.get(key).and_then(Value::as_str).filter(|s| !s.is_empty());

    if let (Some(input), Some(output)) = (field("input"), field("output")) {
        return Ok(ClassifiedResult::Accepted(CleanedRecord {
            input: input.to_string(),
            output: output.to_string(),
            id: id.to_string(),
        }));
    }

    match field("reason").and_then(|r| r.parse::<RejectionReason>().ok()) {
        Some(reason) => Ok(ClassifiedResult::Rejected(reason)),
        None => Ok(ClassifiedResult::Malformed(MalformedKind::MissingFields)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cleaning::testing::MockLlmProvider;
    use crate::storage::AuditLog;

    fn cleaner(provider: Arc<MockLlmProvider>) -> RecordCleaner {
        let classifier = RecordClassifier::new(provider, Arc::new(AuditLog::disabled()), "");
        RecordCleaner::new(Arc::new(classifier))
    }

    fn record() -> Record {
        Record {
            id: "rec-1".to_string(),
            input: "Hi, I'm Bob".to_string(),
            output: "Hello Bob".to_string(),
            model: Some("gpt-4".to_string()),
        }
    }

    #[test]
    fn test_interpret_accepts_input_output() {
        let result = interpret_response("rec-1", r#"{"input":"a","output":"b"}"#).expect("json");
        assert_eq!(
            result,
            ClassifiedResult::Accepted(CleanedRecord {
                input: "a".to_string(),
                output: "b".to_string(),
                id: "rec-1".to_string(),
            })
        );
    }

    #[test]
    fn test_interpret_overrides_returned_id() {
        let result =
            interpret_response("rec-1", r#"{"id":"other","input":"a","output":"b"}"#).expect("json");
        assert_eq!(result.into_accepted().expect("accepted").id, "rec-1");
    }

    #[test]
    fn test_interpret_rejections() {
        for reason in RejectionReason::ALL {
            let text = format!(r#"{{"reason":"{}"}}"#, reason);
            assert_eq!(
                interpret_response("r", &text).expect("json"),
                ClassifiedResult::Rejected(reason)
            );
        }
    }

    #[test]
    fn test_interpret_empty_fields_and_objects() {
        for text in [
            "{}",
            r#"{"input":"","output":"b"}"#,
            r#"{"input":"a","output":""}"#,
            r#"{"input":"a"}"#,
            r#"{"reason":"spam"}"#,
            r#"{"input":1,"output":2}"#,
        ] {
            assert_eq!(
                interpret_response("r", text).expect("json"),
                ClassifiedResult::Malformed(MalformedKind::MissingFields),
                "{}",
                text
            );
        }
    }

    #[test]
    fn test_interpret_non_object_and_garbage() {
        assert_eq!(
            interpret_response("r", r#"["a","b"]"#).expect("json"),
            ClassifiedResult::Malformed(MalformedKind::Unparseable)
        );
        assert!(interpret_response("r", "Sure! Here is the cleaned data").is_err());
    }

    #[tokio::test]
    async fn test_clean_accepts_and_reattaches_id() {
        let provider = Arc::new(MockLlmProvider::always_text(r#"{"input":"a","output":"b"}"#));
        let outcome = cleaner(provider.clone()).clean_with_attempts(&record()).await;

        assert_eq!(outcome.attempts, 1);
        assert_eq!(
            outcome.result,
            ClassifiedResult::Accepted(CleanedRecord {
                input: "a".to_string(),
                output: "b".to_string(),
                id: "rec-1".to_string(),
            })
        );
        assert!(!provider.payloads()[0].contains("gpt-4"));
    }

    #[tokio::test]
    async fn test_clean_rejects_images() {
        let provider = Arc::new(MockLlmProvider::always_text(r#"{"reason":"images"}"#));
        let result = cleaner(provider).clean(&record()).await;
        assert_eq!(result, ClassifiedResult::Rejected(RejectionReason::Images));
    }

    #[tokio::test]
    async fn test_clean_always_failing_gives_up_after_four_attempts() {
        let provider = Arc::new(MockLlmProvider::always_failing());
        let outcome = cleaner(provider.clone()).clean_with_attempts(&record()).await;

        assert_eq!(outcome.result, ClassifiedResult::Malformed(MalformedKind::RetriesExhausted));
        assert_eq!(outcome.attempts, 4);
        assert_eq!(provider.calls(), 4);
    }

    #[tokio::test]
    async fn test_clean_recovers_after_transient_failures() {
        let provider = Arc::new(MockLlmProvider::failing_then_text(
            3,
            r#"{"input":"a","output":"b"}"#,
        ));
        let outcome = cleaner(provider.clone()).clean_with_attempts(&record()).await;

        assert!(outcome.result.is_accepted());
        assert_eq!(outcome.attempts, 4);
    }

    #[tokio::test]
    async fn test_clean_malformed_response_not_retried() {
        let provider = Arc::new(MockLlmProvider::always_text("I cannot help with that."));
        let outcome = cleaner(provider.clone()).clean_with_attempts(&record()).await;

        assert_eq!(outcome.result, ClassifiedResult::Malformed(MalformedKind::Unparseable));
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test]
    async fn test_clean_empty_response_not_retried() {
        let provider = Arc::new(MockLlmProvider::always_filtered());
        let outcome = cleaner(provider.clone()).clean_with_attempts(&record()).await;

        assert_eq!(outcome.result, ClassifiedResult::Malformed(MalformedKind::EmptyResponse));
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test]
    async fn test_clean_respects_custom_retry_ceiling() {
        let provider = Arc::new(MockLlmProvider::always_failing());
        let classifier = RecordClassifier::new(provider.clone(), Arc::new(AuditLog::disabled()), "");
        let cleaner = RecordCleaner::new(Arc::new(classifier)).with_max_retries(0);

        cleaner.clean(&record()).await;
        assert_eq!(provider.calls(), 1);
    }
}
