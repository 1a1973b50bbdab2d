//! OpenAI-compatible chat-completions transport.
//!
//! Works with Z.AI's `/api/paas/v4` endpoint and any other server that
//! speaks the OpenAI chat-completions dialect. The transport only ships the
//! request and hands back the body; it never interprets stream frames.

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use lightzai_core::error::TransportError;
use lightzai_core::transport::{ChatRequest, Transport, TransportResponse};
use tracing::{debug, warn};

/// An OpenAI-compatible HTTP transport.
pub struct OpenAiCompatTransport {
    name: String,
    endpoint: String,
    api_key: String,
    client: reqwest::Client,
    request_timeout: Option<Duration>,
}

impl OpenAiCompatTransport {
    /// Create a transport posting to a full chat-completions URL.
    pub fn new(
        name: impl Into<String>,
        endpoint: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| TransportError::NotConfigured(format!("HTTP client: {e}")))?;

        Ok(Self {
            name: name.into(),
            endpoint: endpoint.into(),
            api_key: api_key.into(),
            client,
            request_timeout: None,
        })
    }

    /// Bound the whole non-streaming exchange. Streaming responses are
    /// bounded per chunk by the caller instead.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }
}

#[async_trait]
impl Transport for OpenAiCompatTransport {
    fn name(&self) -> &str {
        &self.name
    }

    async fn send(&self, request: ChatRequest) -> Result<TransportResponse, TransportError> {
        if self.api_key.trim().is_empty() {
            return Err(TransportError::NotConfigured(
                "API key is not set (ZAI_API_KEY or LZAI_API_KEY)".into(),
            ));
        }

        let streaming = request.stream;
        debug!(
            transport = %self.name,
            model = %request.model,
            messages = request.messages.len(),
            streaming,
            "Sending chat request"
        );

        let mut builder = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&request);
        if streaming {
            builder = builder.header("Accept", "text/event-stream");
        } else if let Some(timeout) = self.request_timeout {
            builder = builder.timeout(timeout);
        }

        let response = builder.send().await.map_err(map_reqwest_error)?;
        let status = response.status().as_u16();

        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = extract_error_message(&body);
            warn!(status, message = %message, "Transport returned error");
            return Err(match status {
                401 | 403 => TransportError::AuthenticationFailed(message),
                429 => TransportError::RateLimited(message),
                _ => TransportError::Api {
                    status_code: status,
                    message,
                },
            });
        }

        if streaming {
            let stream = response
                .bytes_stream()
                .map(|chunk| chunk.map_err(|e| TransportError::StreamInterrupted(e.to_string())));
            return Ok(TransportResponse::Stream(Box::pin(stream)));
        }

        let value: serde_json::Value = response
            .json()
            .await
            .map_err(|e| TransportError::InvalidResponse(format!("Failed to parse response: {e}")))?;
        Ok(TransportResponse::Complete(value))
    }
}

fn map_reqwest_error(e: reqwest::Error) -> TransportError {
    if e.is_timeout() {
        TransportError::Timeout(e.to_string())
    } else {
        TransportError::Network(e.to_string())
    }
}

/// Pull a human-readable message out of an error body.
///
/// Accepts `{"error": {"message": ...}}`, `{"error": "..."}` and
/// `{"message": ...}`; anything else is returned trimmed.
pub fn extract_error_message(body: &str) -> String {
    let trimmed = body.trim();
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(trimmed) {
        let found = value
            .pointer("/error/message")
            .and_then(|m| m.as_str())
            .or_else(|| value.get("error").and_then(|e| e.as_str()))
            .or_else(|| value.get("message").and_then(|m| m.as_str()));
        if let Some(message) = found {
            return message.to_string();
        }
    }
    if trimmed.is_empty() {
        "empty error body".into()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lightzai_core::message::Message;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn transport_for(server: &MockServer) -> OpenAiCompatTransport {
        OpenAiCompatTransport::new("test", format!("{}/v4/chat/completions", server.uri()), "sk-test")
            .unwrap()
    }

    fn request(stream: bool) -> ChatRequest {
        let mut request = ChatRequest::new("glm-5", vec![Message::user("Hello")]);
        request.stream = stream;
        request
    }

    #[test]
    fn error_message_extraction() {
        assert_eq!(
            extract_error_message(r#"{"error":{"code":"1113","message":"Insufficient balance"}}"#),
            "Insufficient balance"
        );
        assert_eq!(extract_error_message(r#"{"error":"bad key"}"#), "bad key");
        assert_eq!(extract_error_message("  gateway timeout \n"), "gateway timeout");
        assert_eq!(extract_error_message(""), "empty error body");
    }

    #[tokio::test]
    async fn missing_key_is_not_configured() {
        let transport = OpenAiCompatTransport::new("t", "http://127.0.0.1:9/x", "").unwrap();
        let err = transport.send(request(false)).await.unwrap_err();
        assert!(matches!(err, TransportError::NotConfigured(_)));
    }

    #[tokio::test]
    async fn complete_response_returned_as_json() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v4/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .and(body_partial_json(serde_json::json!({"model": "glm-5"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {"content": "Hi"}, "finish_reason": "stop"}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let response = transport_for(&server).send(request(false)).await.unwrap();
        let TransportResponse::Complete(value) = response else {
            panic!("expected complete response");
        };
        assert_eq!(value["choices"][0]["message"]["content"], "Hi");
    }

    #[tokio::test]
    async fn streaming_response_yields_raw_bytes() {
        let server = MockServer::start().await;
        let body = "data: {\"choices\":[{\"delta\":{\"content\":\"Hi\"}}]}\n\ndata: [DONE]\n\n";
        Mock::given(method("POST"))
            .and(body_partial_json(serde_json::json!({"stream": true})))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/event-stream")
                    .set_body_string(body),
            )
            .mount(&server)
            .await;

        let response = transport_for(&server).send(request(true)).await.unwrap();
        let TransportResponse::Stream(mut stream) = response else {
            panic!("expected stream");
        };
        let mut collected = Vec::new();
        while let Some(chunk) = stream.next().await {
            collected.extend_from_slice(&chunk.unwrap());
        }
        assert_eq!(String::from_utf8(collected).unwrap(), body);
    }

    #[tokio::test]
    async fn status_codes_map_to_error_kinds() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(429)
                    .set_body_string(r#"{"error":{"message":"Insufficient balance or no resource package"}}"#),
            )
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_string("unauthorized"))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let transport = transport_for(&server);

        let err = transport.send(request(true)).await.unwrap_err();
        assert!(matches!(err, TransportError::RateLimited(_)));
        assert!(err.is_quota_exhausted());

        let err = transport.send(request(true)).await.unwrap_err();
        assert!(matches!(err, TransportError::AuthenticationFailed(_)));

        let err = transport.send(request(false)).await.unwrap_err();
        match err {
            TransportError::Api { status_code, message } => {
                assert_eq!(status_code, 500);
                assert_eq!(message, "boom");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn request_timeout_maps_to_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(500)))
            .mount(&server)
            .await;

        let transport = transport_for(&server).with_timeout(Duration::from_millis(50));
        let err = transport.send(request(false)).await.unwrap_err();
        assert!(matches!(err, TransportError::Timeout(_)));
    }
}
