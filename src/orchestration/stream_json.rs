//! Interpreter for CLIs that emit newline-delimited JSON records.
//!
//! Every complete stdout line is tried as a record. A `result` record
//! carries the final answer; when several arrive, the last one wins.
//! Lines that are not JSON objects are kept as plain text and only used
//! after the process exits, when no result record was seen.

use serde::Deserialize;

use crate::dlog_trace;

use super::interpreter::{
    resolve_fallback, FailureReason, OutputInterpreter, RequestOutcome, StreamOrigin,
};

/// The subset of a stream record the interpreter cares about.
#[derive(Debug, Deserialize)]
struct StreamRecord {
    #[serde(rename = "type")]
    record_type: Option<String>,
    subtype: Option<String>,
    result: Option<serde_json::Value>,
    session_id: Option<String>,
    is_error: Option<bool>,
}

impl StreamRecord {
    /// The final answer, if this record is a result marker.
    fn result_text(&self) -> Option<&str> {
        let text = self.result.as_ref()?.as_str()?;
        match self.record_type.as_deref() {
            Some("result") | None => Some(text),
            Some(_) => None,
        }
    }

    fn is_error(&self) -> bool {
        self.is_error == Some(true)
            || self
                .subtype
                .as_deref()
                .is_some_and(|s| s.starts_with("error"))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct CapturedResult {
    text: String,
    is_error: bool,
}

#[derive(Debug, Default)]
pub struct StreamJsonInterpreter {
    stdout: String,
    stderr: String,
    /// Bytes after the last newline, waiting for the rest of their line.
    pending_line: String,
    fallback: String,
    result: Option<CapturedResult>,
    session_id: Option<String>,
    records: usize,
}

impl StreamJsonInterpreter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of JSON records parsed so far.
    pub fn record_count(&self) -> usize {
        self.records
    }

    fn process_line(&mut self, line: &str) {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return;
        }

        match serde_json::from_str::<StreamRecord>(trimmed) {
            Ok(record) => {
                self.records += 1;
                if let Some(id) = &record.session_id {
                    self.session_id = Some(id.clone());
                }
                if let Some(text) = record.result_text() {
                    self.result = Some(CapturedResult {
                        text: text.to_string(),
                        is_error: record.is_error(),
                    });
                }
            }
            Err(e) => {
                dlog_trace!("stream-json: treating line as text ({}): {}", e, trimmed);
                self.fallback.push_str(line);
                self.fallback.push('\n');
            }
        }
    }

    fn flush_pending(&mut self) {
        if !self.pending_line.is_empty() {
            let line = std::mem::take(&mut self.pending_line);
            self.process_line(&line);
        }
    }
}

impl OutputInterpreter for StreamJsonInterpreter {
    fn consume_chunk(&mut self, text: &str, origin: StreamOrigin) {
        match origin {
            StreamOrigin::Stderr => self.stderr.push_str(text),
            StreamOrigin::Stdout => {
                self.stdout.push_str(text);
                self.pending_line.push_str(text);
                while let Some(pos) = self.pending_line.find('\n') {
                    let rest = self.pending_line.split_off(pos + 1);
                    let line = std::mem::replace(&mut self.pending_line, rest);
                    self.process_line(&line[..pos]);
                }
            }
        }
    }

    fn result(&self) -> Option<String> {
        self.result
            .as_ref()
            .filter(|r| !r.is_error)
            .map(|r| r.text.clone())
    }

    fn stdout(&self) -> &str {
        &self.stdout
    }

    fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    fn finalize(&mut self, exit_code: i32) -> RequestOutcome {
        self.flush_pending();

        if let Some(result) = &self.result {
            if result.is_error {
                let message = if result.text.trim().is_empty() {
                    self.stderr.trim().to_string()
                } else {
                    result.text.trim().to_string()
                };
                return RequestOutcome::Failure(FailureReason::ProcessFailure(message));
            }
            return RequestOutcome::Success(result.text.clone());
        }

        resolve_fallback(exit_code, &self.fallback, &self.stderr)
    }
}
