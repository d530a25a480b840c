//! Server-sent-events push channel for live market updates.
//!
//! The backend streams named events (`POOL_UPDATE`, `MARKET_UPDATE`,
//! `ERROR`) scoped to one market id. One connection maps to one
//! [`PushStream`]; the stream ends on any transport error and the watcher
//! decides whether to reconnect.

use crate::market::{MarketUpdate, PoolUpdate, PushEvent};
use async_trait::async_trait;
use futures_util::stream::{self, Stream, StreamExt};
use serde::Deserialize;
use std::pin::Pin;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Error, Debug)]
pub enum PushError {
    #[error("push connection failed: {0}")]
    Connect(#[from] reqwest::Error),
    #[error("push endpoint returned status {0}")]
    Http(u16),
}

/// Stream of typed push events for one market. Ends when the connection
/// drops for any reason.
pub type PushStream = Pin<Box<dyn Stream<Item = PushEvent> + Send>>;

/// Capability to open a push subscription for a market.
#[async_trait]
pub trait PushConnect: Send + Sync + 'static {
    async fn connect(&self, market_id: &str) -> Result<PushStream, PushError>;
}

/// SSE client over the backend's live-stats endpoint.
pub struct SseConnector {
    http: reqwest::Client,
    base_url: String,
}

impl SseConnector {
    pub fn new(base_url: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url,
        }
    }
}

#[async_trait]
impl PushConnect for SseConnector {
    async fn connect(&self, market_id: &str) -> Result<PushStream, PushError> {
        let url = format!("{}/api/markets/live-stats", self.base_url);
        let resp = self
            .http
            .get(&url)
            .query(&[("marketId", market_id)])
            .header("Accept", "text/event-stream")
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(PushError::Http(resp.status().as_u16()));
        }

        debug!(market = market_id, "push channel connected");

        let events = resp
            .bytes_stream()
            .scan(SseParser::new(), |parser, chunk| {
                let events: Vec<PushEvent> = match chunk {
                    Ok(bytes) => parser
                        .feed(&String::from_utf8_lossy(&bytes))
                        .iter()
                        .filter_map(parse_push_event)
                        .collect(),
                    Err(e) => {
                        warn!(error = %e, "push stream transport error");
                        return futures_util::future::ready(None);
                    }
                };
                futures_util::future::ready(Some(stream::iter(events)))
            })
            .flatten();

        Ok(Box::pin(events))
    }
}

/// One complete SSE frame: the event name plus its data payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SseFrame {
    pub event: String,
    pub data: String,
}

/// Incremental SSE frame parser. Chunks arrive at arbitrary boundaries;
/// frames are dispatched on the blank line that terminates them.
pub(crate) struct SseParser {
    buf: String,
    event: String,
    data: Vec<String>,
}

impl SseParser {
    pub fn new() -> Self {
        Self {
            buf: String::new(),
            event: String::new(),
            data: Vec::new(),
        }
    }

    pub fn feed(&mut self, chunk: &str) -> Vec<SseFrame> {
        self.buf.push_str(chunk);
        let mut frames = Vec::new();

        while let Some(pos) = self.buf.find('\n') {
            let line: String = self.buf.drain(..=pos).collect();
            let line = line.trim_end_matches(['\n', '\r']);

            if line.is_empty() {
                if !self.data.is_empty() {
                    frames.push(SseFrame {
                        event: std::mem::take(&mut self.event),
                        data: self.data.join("\n"),
                    });
                    self.data.clear();
                } else {
                    self.event.clear();
                }
                continue;
            }
            if line.starts_with(':') {
                continue; // comment / keep-alive
            }

            let (field, value) = match line.split_once(':') {
                Some((f, v)) => (f, v.strip_prefix(' ').unwrap_or(v)),
                None => (line, ""),
            };
            match field {
                "event" => self.event = value.to_string(),
                "data" => self.data.push(value.to_string()),
                _ => {} // id / retry are irrelevant here
            }
        }

        frames
    }
}

#[derive(Debug, Deserialize)]
struct StreamErrorPayload {
    #[serde(default)]
    message: String,
    #[serde(default)]
    code: Option<String>,
}

/// Decode a frame into a typed event. Unknown event names and malformed
/// payloads are dropped with a log line rather than killing the stream.
pub(crate) fn parse_push_event(frame: &SseFrame) -> Option<PushEvent> {
    match frame.event.as_str() {
        "POOL_UPDATE" => match serde_json::from_str::<PoolUpdate>(&frame.data) {
            Ok(update) => Some(PushEvent::Pool(update)),
            Err(e) => {
                warn!(error = %e, "malformed POOL_UPDATE payload");
                None
            }
        },
        "MARKET_UPDATE" => match serde_json::from_str::<MarketUpdate>(&frame.data) {
            Ok(update) => Some(PushEvent::Market(update)),
            Err(e) => {
                warn!(error = %e, "malformed MARKET_UPDATE payload");
                None
            }
        },
        "ERROR" => {
            let payload: StreamErrorPayload =
                serde_json::from_str(&frame.data).unwrap_or(StreamErrorPayload {
                    message: frame.data.clone(),
                    code: None,
                });
            Some(PushEvent::StreamError {
                message: payload.message,
                code: payload.code,
            })
        }
        other => {
            debug!(event = other, "unhandled push event");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::MarketStatus;

    #[test]
    fn parses_frames_split_across_chunks() {
        let mut parser = SseParser::new();
        assert!(parser.feed("event: POOL_UP").is_empty());
        assert!(parser.feed("DATE\ndata: {\"x\":1}").is_empty());
        let frames = parser.feed("\n\n");
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].event, "POOL_UPDATE");
        assert_eq!(frames[0].data, "{\"x\":1}");
    }

    #[test]
    fn handles_crlf_comments_and_multiline_data() {
        let mut parser = SseParser::new();
        let frames =
            parser.feed(": keep-alive\r\nevent: ERROR\r\ndata: line1\r\ndata: line2\r\n\r\n");
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].event, "ERROR");
        assert_eq!(frames[0].data, "line1\nline2");
    }

    #[test]
    fn consecutive_frames_do_not_leak_state() {
        let mut parser = SseParser::new();
        let frames = parser.feed(
            "event: POOL_UPDATE\ndata: {}\n\nevent: MARKET_UPDATE\ndata: {\"status\":\"CLOSED\"}\n\n",
        );
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].event, "POOL_UPDATE");
        assert_eq!(frames[1].event, "MARKET_UPDATE");
        assert_eq!(frames[1].data, "{\"status\":\"CLOSED\"}");
    }

    #[test]
    fn decodes_typed_events() {
        let pool = SseFrame {
            event: "POOL_UPDATE".into(),
            data: r#"{"yesPool":"150","noPool":"100","totalPool":"250","yesPercent":60,"noPercent":40,"totalBets":11}"#.into(),
        };
        match parse_push_event(&pool) {
            Some(PushEvent::Pool(update)) => {
                assert_eq!(update.yes_pool, rust_decimal::Decimal::from(150));
                assert_eq!(update.total_bets, 11);
            }
            other => panic!("unexpected: {other:?}"),
        }

        let market = SseFrame {
            event: "MARKET_UPDATE".into(),
            data: r#"{"status":"RESOLVED","winner":"YES","timeRemaining":0,"hasEnded":true}"#
                .into(),
        };
        match parse_push_event(&market) {
            Some(PushEvent::Market(update)) => {
                assert_eq!(update.status, MarketStatus::Resolved);
                assert_eq!(update.winner.as_deref(), Some("YES"));
                assert!(update.has_ended);
            }
            other => panic!("unexpected: {other:?}"),
        }

        let error = SseFrame {
            event: "ERROR".into(),
            data: r#"{"message":"stream hiccup","code":"STREAM_ERROR"}"#.into(),
        };
        match parse_push_event(&error) {
            Some(PushEvent::StreamError { message, code }) => {
                assert_eq!(message, "stream hiccup");
                assert_eq!(code.as_deref(), Some("STREAM_ERROR"));
            }
            other => panic!("unexpected: {other:?}"),
        }

        let unknown = SseFrame {
            event: "HEARTBEAT".into(),
            data: "{}".into(),
        };
        assert!(parse_push_event(&unknown).is_none());
    }
}
