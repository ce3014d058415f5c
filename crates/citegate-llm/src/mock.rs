//! Deterministic mock backend for tests.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::backend::{LlmBackend, LlmError, LlmRequest, LlmResponse};

/// Replays a queue of canned responses and records every request it sees.
/// When the queue is exhausted the last response repeats; an empty mock
/// returns an empty string.
pub struct MockBackend {
    responses: Mutex<VecDeque<String>>,
    last: Mutex<Option<String>>,
    requests: Mutex<Vec<LlmRequest>>,
}

impl MockBackend {
    pub fn new(responses: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            responses: Mutex::new(responses.into_iter().map(Into::into).collect()),
            last: Mutex::new(None),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Single canned response, repeated for every call.
    pub fn always(response: impl Into<String>) -> Self {
        Self::new([response.into()])
    }

    /// Number of completion calls made so far.
    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    /// Copies of every request seen, in call order.
    pub fn requests(&self) -> Vec<LlmRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl LlmBackend for MockBackend {
    async fn complete(&self, req: LlmRequest) -> Result<LlmResponse, LlmError> {
        self.requests.lock().unwrap().push(req);

        let mut queue = self.responses.lock().unwrap();
        let mut last = self.last.lock().unwrap();
        let content = match queue.pop_front() {
            Some(r) => {
                *last = Some(r.clone());
                r
            }
            None => last.clone().unwrap_or_default(),
        };

        Ok(LlmResponse {
            content,
            model: "mock".to_string(),
            prompt_tokens: 0,
            completion_tokens: 0,
        })
    }

    fn model_id(&self) -> &str { "mock" }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{call_llm, CallOptions};

    #[tokio::test]
    async fn test_mock_replays_in_order_then_repeats() {
        let mock = MockBackend::new(["one", "two"]);
        assert_eq!(call_llm(&mock, "s", "u", CallOptions::default()).await.unwrap(), "one");
        assert_eq!(call_llm(&mock, "s", "u", CallOptions::default()).await.unwrap(), "two");
        assert_eq!(call_llm(&mock, "s", "u", CallOptions::default()).await.unwrap(), "two");
        assert_eq!(mock.call_count(), 3);
    }

    #[tokio::test]
    async fn test_mock_records_prompts() {
        let mock = MockBackend::always("{}");
        call_llm(&mock, "system text", "user text", CallOptions::default())
            .await
            .unwrap();
        let reqs = mock.requests();
        assert_eq!(reqs.len(), 1);
        assert_eq!(reqs[0].messages[0].content, "system text");
        assert_eq!(reqs[0].messages[1].content, "user text");
    }
}
