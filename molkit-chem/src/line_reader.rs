//! Line source with one line of pushback, shared by the Molfile and SDF readers.

use std::io::BufRead;

use molkit_core::Result;

/// Reads `\n`/`\r\n` terminated lines and tracks the 1-based number of the
/// line most recently returned.
pub(crate) struct LineReader<R> {
    reader: R,
    pending: Option<String>,
    line_number: usize,
}

impl<R: BufRead> LineReader<R> {
    pub(crate) fn new(reader: R) -> Self {
        LineReader { reader, pending: None, line_number: 0 }
    }

    /// Next line without its terminator, or `None` at end of input.
    pub(crate) fn next_line(&mut self) -> Result<Option<String>> {
        if let Some(line) = self.pending.take() {
            self.line_number += 1;
            return Ok(Some(line));
        }
        let mut line = String::new();
        if self.reader.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        self.line_number += 1;
        if line.ends_with('\n') {
            line.pop();
            if line.ends_with('\r') {
                line.pop();
            }
        }
        Ok(Some(line))
    }

    /// Return a line so the next call to [`next_line`](Self::next_line)
    /// yields it again.
    pub(crate) fn push_back(&mut self, line: String) {
        debug_assert!(self.pending.is_none(), "only one line of pushback");
        self.pending = Some(line);
        self.line_number -= 1;
    }

    pub(crate) fn line_number(&self) -> usize {
        self.line_number
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_terminators() {
        let mut lines = LineReader::new("a\r\nb\nc".as_bytes());
        assert_eq!(lines.next_line().unwrap().as_deref(), Some("a"));
        assert_eq!(lines.next_line().unwrap().as_deref(), Some("b"));
        assert_eq!(lines.next_line().unwrap().as_deref(), Some("c"));
        assert_eq!(lines.next_line().unwrap(), None);
        assert_eq!(lines.line_number(), 3);
    }

    #[test]
    fn pushback_replays_line() {
        let mut lines = LineReader::new("first\nsecond\n".as_bytes());
        let first = lines.next_line().unwrap().unwrap();
        assert_eq!(lines.line_number(), 1);
        lines.push_back(first);
        assert_eq!(lines.line_number(), 0);
        assert_eq!(lines.next_line().unwrap().as_deref(), Some("first"));
        assert_eq!(lines.next_line().unwrap().as_deref(), Some("second"));
        assert_eq!(lines.line_number(), 2);
    }

    #[test]
    fn blank_lines_are_kept() {
        let mut lines = LineReader::new("\n\nx\n".as_bytes());
        assert_eq!(lines.next_line().unwrap().as_deref(), Some(""));
        assert_eq!(lines.next_line().unwrap().as_deref(), Some(""));
        assert_eq!(lines.next_line().unwrap().as_deref(), Some("x"));
    }
}
