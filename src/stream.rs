//! Streaming consumer for SSE-style completion endpoints.
//!
//! [`stream_request`] posts a JSON payload, reads the newline-delimited
//! response body as it arrives, and echoes every text delta to an observer
//! while keeping a running token count and timing figures.

use std::time::{Duration, Instant};

use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{debug, trace};

/// Failure while issuing or consuming a streaming request.
///
/// Covers connection errors, non-2xx statuses and the whole-request timeout.
/// All of these are terminal for the stage that issued the request.
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("observer write failed: {0}")]
    Observer(#[from] std::io::Error),
}

/// Everything collected from one fully consumed stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamResult {
    /// Concatenation of all non-empty deltas in arrival order.
    pub text: String,
    /// Number of non-empty deltas. An approximation of the token count.
    pub token_count: usize,
    /// Time from request start to the first non-empty delta, if any arrived.
    pub ttft: Option<Duration>,
    /// Time from request start to end of stream.
    pub total_time: Duration,
    /// Time from the first delta (or request start when none arrived) to end
    /// of stream.
    pub gen_time: Duration,
}

impl StreamResult {
    /// Generation speed in tokens per second, zero when no time was spent
    /// generating.
    pub fn tokens_per_second(&self) -> f64 {
        let secs = self.gen_time.as_secs_f64();
        if secs > 0.0 {
            self.token_count as f64 / secs
        } else {
            0.0
        }
    }

    /// Write the benchmark stats block for this stream to `out`.
    pub async fn report<W>(&self, name: &str, out: &mut W) -> std::io::Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        let block = format!(
            "\n\n[{name}] stats:\n  total time: {:.2}s\n  ttft:       {:.2}s\n  gen speed:  {:.2} tok/s\n  tokens:     {}\n",
            self.total_time.as_secs_f64(),
            self.ttft.unwrap_or_default().as_secs_f64(),
            self.tokens_per_second(),
            self.token_count,
        );
        out.write_all(block.as_bytes()).await?;
        out.flush().await
    }
}

/// One decoded JSON chunk. Servers emit either the chat-completion shape or
/// the plain-completion shape; both are probed in order.
#[derive(Deserialize)]
#[serde(untagged)]
enum Chunk {
    Chat { choices: Vec<Choice> },
    Completion {
        #[serde(default)]
        content: String,
    },
}

#[derive(Deserialize)]
struct Choice {
    #[serde(default)]
    delta: Delta,
}

#[derive(Default, Deserialize)]
struct Delta {
    #[serde(default)]
    content: String,
}

enum LineEvent {
    /// A non-empty text delta.
    Delta(String),
    /// The `[DONE]` sentinel; stop consuming.
    Done,
    /// Blank line, empty delta, or a chunk that did not decode.
    Skip,
}

/// Decode one line of the response body.
///
/// The optional `data: ` prefix is stripped and undecodable payloads are
/// skipped rather than surfaced; stray non-JSON lines show up in some server
/// implementations.
fn decode_line(line: &str) -> LineEvent {
    let line = line.trim_end_matches('\r');
    if line.is_empty() {
        return LineEvent::Skip;
    }
    let payload = line.strip_prefix("data: ").unwrap_or(line);
    if payload == "[DONE]" {
        return LineEvent::Done;
    }
    let delta = match serde_json::from_str::<Chunk>(payload) {
        Ok(Chunk::Chat { choices }) => choices
            .into_iter()
            .next()
            .map(|c| c.delta.content)
            .unwrap_or_default(),
        Ok(Chunk::Completion { content }) => content,
        Err(e) => {
            trace!(payload, error = %e, "skipping undecodable chunk");
            return LineEvent::Skip;
        }
    };
    if delta.is_empty() {
        LineEvent::Skip
    } else {
        LineEvent::Delta(delta)
    }
}

/// Reassembles lines from body bytes that arrive at arbitrary boundaries.
#[derive(Default)]
struct LineBuffer(Vec<u8>);

impl LineBuffer {
    fn push(&mut self, bytes: &[u8]) {
        self.0.extend_from_slice(bytes);
    }

    /// Terminate a trailing partial line once the body is exhausted.
    fn finish(&mut self) {
        if !self.0.is_empty() {
            self.0.push(b'\n');
        }
    }

    fn next_line(&mut self) -> Option<String> {
        let pos = self.0.iter().position(|&b| b == b'\n')?;
        let rest = self.0.split_off(pos + 1);
        let mut line = std::mem::replace(&mut self.0, rest);
        line.pop();
        Some(String::from_utf8_lossy(&line).into_owned())
    }
}

/// Post `payload` to `url` and consume the streaming response.
///
/// Deltas are echoed to `out` as they arrive, preceded by a one-time
/// time-to-first-token announcement. The observer output never feeds back
/// into the returned [`StreamResult`].
pub async fn stream_request<W>(
    client: &reqwest::Client,
    name: &str,
    url: &str,
    payload: &impl Serialize,
    out: &mut W,
) -> Result<StreamResult, StreamError>
where
    W: AsyncWrite + Unpin,
{
    out.write_all(format!("\n[{name}] connecting... ").as_bytes())
        .await?;
    out.flush().await?;

    let start = Instant::now();
    let resp = client
        .post(url)
        .json(payload)
        .send()
        .await
        .and_then(|r| r.error_for_status())
        .map_err(|source| StreamError::Request {
            url: url.to_string(),
            source,
        })?;

    let mut first_token: Option<Instant> = None;
    let mut token_count = 0usize;
    let mut full_text = String::new();
    let mut lines = LineBuffer::default();
    let mut body = resp.bytes_stream();
    let mut done = false;
    let mut eof = false;

    while !done && !eof {
        match body.next().await {
            Some(bytes) => {
                let bytes = bytes.map_err(|source| StreamError::Request {
                    url: url.to_string(),
                    source,
                })?;
                lines.push(&bytes);
            }
            None => {
                lines.finish();
                eof = true;
            }
        }
        while let Some(line) = lines.next_line() {
            match decode_line(&line) {
                LineEvent::Done => {
                    done = true;
                    break;
                }
                LineEvent::Skip => {}
                LineEvent::Delta(delta) => {
                    if first_token.is_none() {
                        let now = Instant::now();
                        first_token = Some(now);
                        let ttft = (now - start).as_secs_f64();
                        out.write_all(
                            format!("connected (ttft {ttft:.2}s)\n[{name}] ").as_bytes(),
                        )
                        .await?;
                    }
                    out.write_all(delta.as_bytes()).await?;
                    out.flush().await?;
                    full_text.push_str(&delta);
                    token_count += 1;
                }
            }
        }
    }

    let end = Instant::now();
    debug!(response = %full_text, token_count, "stream complete");
    Ok(StreamResult {
        text: full_text,
        token_count,
        ttft: first_token.map(|t| t - start),
        total_time: end - start,
        gen_time: end - first_token.unwrap_or(start),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;

    fn delta(line: &str) -> Option<String> {
        match decode_line(line) {
            LineEvent::Delta(d) => Some(d),
            _ => None,
        }
    }

    #[test]
    fn decodes_chat_shape() {
        let line = r#"data: {"choices":[{"delta":{"content":"hi"}}]}"#;
        assert_eq!(delta(line), Some("hi".into()));
    }

    #[test]
    fn decodes_completion_shape_without_prefix() {
        assert_eq!(delta(r#"{"content":"hi"}"#), Some("hi".into()));
    }

    #[test]
    fn missing_delta_content_defaults_to_empty() {
        assert!(delta(r#"{"choices":[{"delta":{}}]}"#).is_none());
        assert!(delta(r#"{"choices":[]}"#).is_none());
        assert!(delta(r#"{"stop":true}"#).is_none());
    }

    #[test]
    fn done_sentinel_terminates() {
        assert!(matches!(decode_line("data: [DONE]"), LineEvent::Done));
        assert!(matches!(decode_line("[DONE]"), LineEvent::Done));
    }

    #[test]
    fn malformed_and_blank_lines_are_skipped() {
        assert!(matches!(decode_line("not json"), LineEvent::Skip));
        assert!(matches!(decode_line(""), LineEvent::Skip));
        assert!(matches!(decode_line("\r"), LineEvent::Skip));
    }

    #[test]
    fn line_buffer_joins_split_chunks() {
        let mut buf = LineBuffer::default();
        buf.push(b"{\"content\":");
        assert!(buf.next_line().is_none());
        buf.push(b"\"hi\"}\n{\"content\":\"yo\"}");
        assert_eq!(buf.next_line().unwrap(), "{\"content\":\"hi\"}");
        assert!(buf.next_line().is_none());
        buf.finish();
        assert_eq!(buf.next_line().unwrap(), "{\"content\":\"yo\"}");
    }

    #[test]
    fn tokens_per_second_zero_without_gen_time() {
        let res = StreamResult {
            text: "hi".into(),
            token_count: 1,
            ttft: None,
            total_time: Duration::from_secs(1),
            gen_time: Duration::ZERO,
        };
        assert_eq!(res.tokens_per_second(), 0.0);
    }

    #[tokio::test]
    async fn accumulates_deltas_and_counts_tokens() {
        let server = MockServer::start_async().await;
        let body = concat!(
            "data: {\"choices\":[{\"delta\":{\"content\":\"he\"}}]}\n",
            "\n",
            "garbage that is not json\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"\"}}]}\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"llo\"}}]}\n",
            "data: [DONE]\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"after\"}}]}\n",
        );
        server
            .mock_async(|when, then| {
                when.method(POST).path("/v1/chat/completions");
                then.status(200).body(body);
            })
            .await;

        let client = reqwest::Client::new();
        let url = format!("{}/v1/chat/completions", server.base_url());
        let mut out = Vec::new();
        let res = stream_request(&client, "drafter", &url, &json!({"stream": true}), &mut out)
            .await
            .unwrap();

        assert_eq!(res.text, "hello");
        assert_eq!(res.token_count, 2);
        let ttft = res.ttft.expect("first token seen");
        assert!(ttft <= res.total_time);
        let echoed = String::from_utf8(out).unwrap();
        assert!(echoed.contains("hello"));
        assert!(echoed.contains("ttft"));
    }

    #[tokio::test]
    async fn non_2xx_status_is_an_error() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/completion");
                then.status(500);
            })
            .await;

        let client = reqwest::Client::new();
        let url = format!("{}/completion", server.base_url());
        let mut out = Vec::new();
        let err = stream_request(&client, "reviewer", &url, &json!({}), &mut out)
            .await
            .unwrap_err();
        assert!(matches!(err, StreamError::Request { .. }));
    }

    #[tokio::test]
    async fn body_without_trailing_newline_still_decodes() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/completion");
                then.status(200).body("{\"content\":\"tail\"}");
            })
            .await;

        let client = reqwest::Client::new();
        let url = format!("{}/completion", server.base_url());
        let mut out = Vec::new();
        let res = stream_request(&client, "reviewer", &url, &json!({}), &mut out)
            .await
            .unwrap();
        assert_eq!(res.text, "tail");
        assert_eq!(res.token_count, 1);
    }
}
