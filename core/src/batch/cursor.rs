//! Cursor over a fully buffered batch response.
//!
//! The cursor owns the scan position and the stack of active boundaries, one
//! per multipart nesting level with the outermost first. Reads only move
//! forward; a caller that looks ahead takes a [`Mark`] first and resets to
//! it when the look-ahead does not match.

const LINE_END: &str = "\r\n";

/// A saved scan position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mark(usize);

#[derive(Debug)]
pub struct Cursor<'a> {
    text: &'a str,
    position: usize,
    boundaries: Vec<String>,
}

impl<'a> Cursor<'a> {
    pub fn new(text: &'a str, boundary: impl Into<String>) -> Self {
        Self {
            text,
            position: 0,
            boundaries: vec![boundary.into()],
        }
    }

    /// Read up to the next occurrence of `marker` and move past it.
    ///
    /// Returns `None`, without moving, when `marker` does not occur in the
    /// remaining text.
    pub fn read_to(&mut self, marker: &str) -> Option<&'a str> {
        let start = self.position;
        let end = start + self.text[start..].find(marker)?;
        self.position = end + marker.len();
        Some(&self.text[start..end])
    }

    /// Read everything that is left.
    pub fn read_to_end(&mut self) -> &'a str {
        let start = self.position;
        self.position = self.text.len();
        &self.text[start..]
    }

    /// Read up to the next `\r\n` and move past it.
    pub fn read_line(&mut self) -> Option<&'a str> {
        self.read_to(LINE_END)
    }

    /// Move past the current line, or to the end when no line break is left.
    pub fn skip_line(&mut self) {
        if self.read_line().is_none() {
            self.read_to_end();
        }
    }

    pub fn remaining(&self) -> &'a str {
        &self.text[self.position..]
    }

    pub fn is_at_end(&self) -> bool {
        self.position >= self.text.len()
    }

    pub fn mark(&self) -> Mark {
        Mark(self.position)
    }

    pub fn reset(&mut self, mark: Mark) {
        self.position = mark.0;
    }

    /// Boundary of the multipart body being scanned.
    pub fn boundary(&self) -> &str {
        self.boundaries.last().map(String::as_str).unwrap_or_default()
    }

    /// `--<boundary>` for the multipart body being scanned.
    pub fn delimiter(&self) -> String {
        format!("--{}", self.boundary())
    }

    pub fn push_boundary(&mut self, boundary: impl Into<String>) {
        self.boundaries.push(boundary.into());
    }

    /// Leave a nested body. The outermost boundary is never popped.
    pub fn pop_boundary(&mut self) {
        if self.boundaries.len() > 1 {
            self.boundaries.pop();
        }
    }
}
