//! Interpreter for CLIs that print their answer as unstructured text.

use super::interpreter::{resolve_fallback, OutputInterpreter, RequestOutcome, StreamOrigin};

#[derive(Debug, Default)]
pub struct PlainTextInterpreter {
    stdout: String,
    stderr: String,
}

impl PlainTextInterpreter {
    pub fn new() -> Self {
        Self::default()
    }
}

impl OutputInterpreter for PlainTextInterpreter {
    fn consume_chunk(&mut self, text: &str, origin: StreamOrigin) {
        match origin {
            StreamOrigin::Stdout => self.stdout.push_str(text),
            StreamOrigin::Stderr => self.stderr.push_str(text),
        }
    }

    fn result(&self) -> Option<String> {
        let trimmed = self.stdout.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    }

    fn stdout(&self) -> &str {
        &self.stdout
    }

    fn finalize(&mut self, exit_code: i32) -> RequestOutcome {
        resolve_fallback(exit_code, &self.stdout, &self.stderr)
    }
}
