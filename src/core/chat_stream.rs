//! Stream relay: forwards a conversation to an OpenAI-compatible
//! chat-completions endpoint and feeds the SSE reply back to the event loop
//! as incremental chunks over an unbounded channel.
//!
//! Every event carries the id of the stream that produced it, so the event
//! loop can drop output from a stream that has been superseded.

use futures_util::StreamExt;
use memchr::memchr;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::api::{ChatMessage, ChatRequest, ChatResponse};
use crate::utils::url::construct_api_url;

#[derive(Clone, Debug)]
pub enum StreamEvent {
    Chunk(String),
    Error(String),
    End,
}

pub struct StreamParams {
    pub client: reqwest::Client,
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub api_messages: Vec<ChatMessage>,
    pub cancel_token: CancellationToken,
    pub stream_id: u64,
}

#[derive(Clone)]
pub struct StreamDispatcher {
    tx: mpsc::UnboundedSender<(StreamEvent, u64)>,
}

impl StreamDispatcher {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<(StreamEvent, u64)>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn spawn(&self, params: StreamParams) {
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let cancel_token = params.cancel_token.clone();
            tokio::select! {
                _ = relay_stream(params, tx) => {}
                _ = cancel_token.cancelled() => {}
            }
        });
    }

    #[cfg(test)]
    pub fn send_for_test(&self, event: StreamEvent, stream_id: u64) {
        let _ = self.tx.send((event, stream_id));
    }
}

async fn relay_stream(params: StreamParams, tx: mpsc::UnboundedSender<(StreamEvent, u64)>) {
    let StreamParams {
        client,
        base_url,
        api_key,
        model,
        api_messages,
        cancel_token,
        stream_id,
    } = params;

    let request = ChatRequest {
        model,
        messages: api_messages,
        stream: true,
    };

    let url = construct_api_url(&base_url, "chat/completions");
    let mut http_request = client.post(url).header("Content-Type", "application/json");
    // Local endpoints (ollama and friends) run without a key.
    if !api_key.is_empty() {
        http_request = http_request.bearer_auth(&api_key);
    }

    let response = match http_request.json(&request).send().await {
        Ok(response) => response,
        Err(e) => {
            let _ = tx.send((StreamEvent::Error(format_api_error(&e.to_string())), stream_id));
            let _ = tx.send((StreamEvent::End, stream_id));
            return;
        }
    };

    if !response.status().is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "<no body>".to_string());
        let _ = tx.send((StreamEvent::Error(format_api_error(&body)), stream_id));
        let _ = tx.send((StreamEvent::End, stream_id));
        return;
    }

    let mut stream = response.bytes_stream();
    let mut buffer: Vec<u8> = Vec::new();

    while let Some(chunk) = stream.next().await {
        if cancel_token.is_cancelled() {
            return;
        }

        let chunk_bytes = match chunk {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(error = %e, "transport error mid-stream");
                let _ = tx.send((StreamEvent::End, stream_id));
                return;
            }
        };
        buffer.extend_from_slice(&chunk_bytes);

        while let Some(newline_pos) = memchr(b'\n', &buffer) {
            let line = match std::str::from_utf8(&buffer[..newline_pos]) {
                Ok(s) => s.trim().to_string(),
                Err(e) => {
                    warn!(error = %e, "invalid UTF-8 in stream");
                    buffer.drain(..=newline_pos);
                    continue;
                }
            };
            buffer.drain(..=newline_pos);

            if process_sse_line(&line, &tx, stream_id) {
                return;
            }
        }
    }

    // Connection closed without a [DONE] marker.
    let _ = tx.send((StreamEvent::End, stream_id));
}

/// Handle one SSE line. Returns true once the stream is finished, either by
/// the `[DONE]` sentinel or by an error payload embedded in the stream.
fn process_sse_line(
    line: &str,
    tx: &mpsc::UnboundedSender<(StreamEvent, u64)>,
    stream_id: u64,
) -> bool {
    // Both `data: {...}` and `data:{...}` appear in the wild.
    let Some(payload) = line.strip_prefix("data:").map(str::trim_start) else {
        return false;
    };

    if payload == "[DONE]" {
        let _ = tx.send((StreamEvent::End, stream_id));
        return true;
    }

    match serde_json::from_str::<ChatResponse>(payload) {
        Ok(response) => {
            if let Some(content) = response
                .choices
                .first()
                .and_then(|choice| choice.delta.content.as_deref())
            {
                let _ = tx.send((StreamEvent::Chunk(content.to_string()), stream_id));
            }
            false
        }
        Err(_) => {
            if payload.trim().is_empty() {
                return false;
            }
            // Some providers push an error object into the stream instead of
            // failing the request.
            let _ = tx.send((StreamEvent::Error(format_api_error(payload)), stream_id));
            let _ = tx.send((StreamEvent::End, stream_id));
            true
        }
    }
}

fn extract_error_summary(value: &serde_json::Value) -> Option<String> {
    let summary = value
        .pointer("/error/message")
        .and_then(|v| v.as_str())
        .map(str::to_owned)
        .or_else(|| match value.get("error") {
            Some(serde_json::Value::String(s)) => Some(s.clone()),
            _ => None,
        })
        .or_else(|| {
            value
                .get("message")
                .and_then(|v| v.as_str().map(str::to_owned))
        })?;

    let collapsed = summary.split_whitespace().collect::<Vec<_>>().join(" ");
    Some(collapsed.trim().to_string())
}

/// Wrap an API failure body for display in the transcript. JSON bodies are
/// pretty-printed with the provider's message pulled out as a summary line.
pub fn format_api_error(error_text: &str) -> String {
    let trimmed = error_text.trim();

    if trimmed.is_empty() {
        return "API error: <empty response body>".to_string();
    }

    if let Ok(json_value) = serde_json::from_str::<serde_json::Value>(trimmed) {
        if let Ok(pretty) = serde_json::to_string_pretty(&json_value) {
            if let Some(summary) = extract_error_summary(&json_value).filter(|s| !s.is_empty()) {
                return format!("API error: {}\n{}", summary, pretty);
            }
            return format!("API error:\n{}", pretty);
        }
    }

    format!("API error: {}", trimmed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sse_lines_with_and_without_spacing_produce_chunks() {
        let (dispatcher, mut rx) = StreamDispatcher::new();
        let cases = [
            (r#"data: {"choices":[{"delta":{"content":"Hello"}}]}"#, "Hello"),
            (r#"data:{"choices":[{"delta":{"content":"World"}}]}"#, "World"),
        ];

        for (index, (line, expected)) in cases.iter().enumerate() {
            let stream_id = index as u64 + 1;
            assert!(!process_sse_line(line, &dispatcher.tx, stream_id));
            let (event, received_id) = rx.try_recv().expect("expected chunk event");
            assert_eq!(received_id, stream_id);
            match event {
                StreamEvent::Chunk(content) => assert_eq!(content, *expected),
                other => panic!("expected chunk, got {:?}", other),
            }
        }
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn done_sentinel_ends_the_stream() {
        let (dispatcher, mut rx) = StreamDispatcher::new();
        for line in ["data: [DONE]", "data:[DONE]"] {
            assert!(process_sse_line(line, &dispatcher.tx, 7));
            let (event, id) = rx.try_recv().expect("expected end event");
            assert_eq!(id, 7);
            assert!(matches!(event, StreamEvent::End));
        }
    }

    #[test]
    fn non_data_lines_and_blank_payloads_are_ignored() {
        let (dispatcher, mut rx) = StreamDispatcher::new();
        assert!(!process_sse_line("", &dispatcher.tx, 1));
        assert!(!process_sse_line(": keepalive", &dispatcher.tx, 1));
        assert!(!process_sse_line("data:", &dispatcher.tx, 1));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn embedded_error_payloads_end_the_stream_with_an_error() {
        let (dispatcher, mut rx) = StreamDispatcher::new();
        let line = r#"data: {"error":{"message":"internal server error"}}"#;

        assert!(process_sse_line(line, &dispatcher.tx, 99));

        let (event, id) = rx.try_recv().expect("expected error event");
        assert_eq!(id, 99);
        match event {
            StreamEvent::Error(text) => {
                assert!(text.starts_with("API error: internal server error"));
                assert!(text.contains(r#""message": "internal server error""#));
            }
            other => panic!("expected error, got {:?}", other),
        }

        let (event, _) = rx.try_recv().expect("expected end event");
        assert!(matches!(event, StreamEvent::End));
    }

    #[test]
    fn format_api_error_pulls_out_the_provider_summary() {
        let raw = r#"{"error":{"message":"model   overloaded","type":"server_error"}}"#;
        let formatted = format_api_error(raw);
        assert!(formatted.starts_with("API error: model overloaded\n"));
        assert!(formatted.contains(r#""type": "server_error""#));
    }

    #[test]
    fn format_api_error_handles_json_without_a_summary() {
        let formatted = format_api_error(r#"{"status":"failed"}"#);
        assert!(formatted.starts_with("API error:\n"));
        assert!(formatted.contains(r#""status": "failed""#));
    }

    #[test]
    fn format_api_error_passes_plain_text_through() {
        assert_eq!(
            format_api_error("  connection refused  "),
            "API error: connection refused"
        );
        assert_eq!(format_api_error("   "), "API error: <empty response body>");
    }
}
