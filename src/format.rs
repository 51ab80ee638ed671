use itertools::Itertools;
use serde_json::Value;
use std::fmt;

/// The default number of columns in a rendered line.
pub const LINE_LENGTH: usize = 62;

// Extra indentation applied to the continuation lines of an indented line.
const CONTINUATION_INDENT: &str = "    ";

/// A block of fixed width lines ready to be written into a document.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DisplayBlock {
    lines: Vec<String>,
}

impl DisplayBlock {
    /// Get the lines in this block.
    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// Returns true if this block has no lines.
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

impl fmt::Display for DisplayBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.lines.iter().join("\n"))
    }
}

impl From<Vec<String>> for DisplayBlock {
    fn from(lines: Vec<String>) -> Self {
        Self { lines }
    }
}

/// Wraps text and JSON values into fixed width blocks.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Formatter {
    line_length: usize,
}

impl Default for Formatter {
    fn default() -> Self {
        Self { line_length: LINE_LENGTH }
    }
}

impl Formatter {
    /// Construct a formatter that wraps at the given number of columns.
    pub fn new(line_length: usize) -> Self {
        Self { line_length: line_length.max(1) }
    }

    /// The number of columns lines are wrapped at.
    pub fn line_length(&self) -> usize {
        self.line_length
    }

    /// Render a value: strings are wrapped as text, anything else is pretty printed as JSON first.
    pub fn prettify(&self, value: &Value) -> DisplayBlock {
        match value {
            Value::String(text) => self.prettify_str(text),
            other => self.prettify_lines(&format!("{other:#}")),
        }
    }

    /// Render a piece of text, trimming it and wrapping every line independently.
    pub fn prettify_str(&self, text: &str) -> DisplayBlock {
        self.prettify_lines(text.trim())
    }

    /// Wrap a single line.
    ///
    /// The leading whitespace of the line is kept as its indent. Continuation lines are indented
    /// a little further so the soft wrap is visible.
    pub fn chunk(&self, line: &str) -> DisplayBlock {
        self.chunk_line(line).into()
    }

    /// Split opaque text into lines, escaping every non ASCII byte as `\xHH`.
    ///
    /// Lines are only broken at spaces. Text without a space at or before the line length is
    /// emitted as a single line.
    pub fn split_binary(&self, text: &str) -> DisplayBlock {
        let mut escaped = String::with_capacity(text.len());
        for byte in text.bytes() {
            if byte.is_ascii() {
                escaped.push(char::from(byte));
            } else {
                escaped.push_str("\\x");
                escaped.push_str(&hex::encode([byte]));
            }
        }

        // `escaped` is pure ASCII from here on so byte offsets are char offsets.
        let mut lines = Vec::new();
        let mut rest = escaped.as_str();
        while !rest.is_empty() {
            let position = if rest.len() < self.line_length {
                None
            } else {
                let window = &rest[..rest.len().min(self.line_length + 1)];
                window.rfind(' ')
            };
            match position {
                Some(position) => {
                    lines.push(rest[..position].to_string());
                    rest = &rest[position + 1..];
                }
                None => {
                    lines.push(rest.to_string());
                    rest = "";
                }
            }
        }
        lines.into()
    }

    fn prettify_lines(&self, text: &str) -> DisplayBlock {
        let lines = text.split('\n').flat_map(|line| self.chunk_line(line)).collect::<Vec<_>>();
        lines.into()
    }

    fn chunk_line(&self, line: &str) -> Vec<String> {
        let trimmed = line.trim_start();
        let (mut indent, mut rest) = if trimmed.is_empty() {
            (String::new(), line)
        } else {
            (line[..line.len() - trimmed.len()].to_string(), trimmed)
        };

        let mut lines = Vec::new();
        let mut first = true;
        while !rest.is_empty() {
            let indent_length = indent.chars().count();
            if rest.chars().count() + indent_length < self.line_length {
                lines.push(format!("{indent}{rest}"));
                rest = "";
            } else {
                let budget = self.line_length.saturating_sub(indent_length).max(1);
                let split = rest.char_indices().nth(budget).map(|(index, _)| index).unwrap_or(rest.len());
                let (head, tail) = rest.split_at(split);
                lines.push(format!("{indent}{head}"));
                rest = tail;
            }

            if first && !indent.is_empty() {
                indent.push_str(CONTINUATION_INDENT);
                first = false;
            }
        }
        if lines.is_empty() {
            lines.push(String::new());
        }
        lines
    }
}
