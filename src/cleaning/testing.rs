//! Scripted LLM provider for unit tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::LlmError;
use crate::llm::{Choice, GenerationRequest, GenerationResponse, LlmProvider, Message, Usage};

type Responder = Box<dyn Fn(usize, &GenerationRequest) -> Result<GenerationResponse, LlmError> + Send + Sync>;

pub(crate) struct MockLlmProvider {
    responder: Responder,
    calls: AtomicUsize,
    payloads: Mutex<Vec<String>>,
}

pub(crate) fn response_with(content: &str, finish_reason: &str) -> GenerationResponse {
    GenerationResponse {
        id: Some("mock-id".to_string()),
        model: "mock-model".to_string(),
        choices: vec![Choice {
            index: 0,
            message: Message::assistant(content),
            finish_reason: Some(finish_reason.to_string()),
        }],
        usage: Some(Usage {
            prompt_tokens: 100,
            completion_tokens: 20,
            total_tokens: 120,
        }),
    }
}

impl MockLlmProvider {
    pub(crate) fn new<F>(responder: F) -> Self
    where
        F: Fn(usize, &GenerationRequest) -> Result<GenerationResponse, LlmError> + Send + Sync + 'static,
    {
        Self {
            responder: Box::new(responder),
            calls: AtomicUsize::new(0),
            payloads: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn always_text(content: &str) -> Self {
        let content = content.to_string();
        Self::new(move |_, _| Ok(response_with(&content, "stop")))
    }

    /// Answers every call with the user payload unchanged.
    pub(crate) fn echo() -> Self {
        Self::new(|_, request| {
            let payload = request
                .messages
                .last()
                .map(|m| m.content.clone())
                .unwrap_or_default();
            Ok(response_with(&payload, "stop"))
        })
    }

    pub(crate) fn always_no_choices() -> Self {
        Self::new(|_, _| {
            Ok(GenerationResponse {
                id: None,
                model: "mock-model".to_string(),
                choices: vec![],
                usage: None,
            })
        })
    }

    pub(crate) fn always_filtered() -> Self {
        Self::new(|_, _| Ok(response_with("", "content_filter")))
    }

    pub(crate) fn always_failing() -> Self {
        Self::new(|_, _| Err(LlmError::RequestFailed("connection reset".to_string())))
    }

    /// Fails the first `failures` calls, then answers with `content`.
    pub(crate) fn failing_then_text(failures: usize, content: &str) -> Self {
        let content = content.to_string();
        Self::new(move |call, _| {
            if call < failures {
                Err(LlmError::ApiError {
                    code: 502,
                    message: "bad gateway".to_string(),
                })
            } else {
                Ok(response_with(&content, "stop"))
            }
        })
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// User payloads of every call, in call order.
    pub(crate) fn payloads(&self) -> Vec<String> {
        self.payloads.lock().expect("lock not poisoned").clone()
    }
}

#[async_trait]
impl LlmProvider for MockLlmProvider {
    async fn generate(&self, request: GenerationRequest) -> Result<GenerationResponse, LlmError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(last) = request.messages.last() {
            self.payloads
                .lock()
                .expect("lock not poisoned")
                .push(last.content.clone());
        }
        (self.responder)(call, &request)
    }
}
