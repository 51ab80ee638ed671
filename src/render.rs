use crate::format::{Formatter, LINE_LENGTH};
use serde::Deserialize;
use std::{
    fmt,
    io::{self, Write},
};

/// How rendered documents look.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct RenderOptions {
    /// The number of columns values are wrapped at.
    pub line_length: usize,

    /// The character used for the rules framing every section.
    pub rule: char,

    /// The length of section rules.
    pub rule_length: usize,

    /// The character used for the line that opens and closes an example.
    pub separator: char,

    /// The length of example separators.
    pub separator_length: usize,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            line_length: LINE_LENGTH,
            rule: '~',
            rule_length: LINE_LENGTH,
            separator: '=',
            separator_length: LINE_LENGTH,
        }
    }
}

impl RenderOptions {
    /// The layout historically used for signature examples.
    pub fn signatures() -> Self {
        Self { line_length: 64, rule: '-', rule_length: 64, separator: '=', separator_length: 64 }
    }

    /// Set the number of columns values are wrapped at.
    pub fn line_length(mut self, line_length: usize) -> Self {
        self.line_length = line_length;
        self
    }

    /// Set the character and length of section rules.
    pub fn rule(mut self, rule: char, length: usize) -> Self {
        self.rule = rule;
        self.rule_length = length;
        self
    }

    /// Set the character and length of example separators.
    pub fn separator(mut self, separator: char, length: usize) -> Self {
        self.separator = separator;
        self.separator_length = length;
        self
    }

    /// The formatter matching these options.
    pub fn formatter(&self) -> Formatter {
        Formatter::new(self.line_length)
    }
}

/// Writes rule framed sections into a document.
#[derive(Debug)]
pub struct SectionWriter<W> {
    sink: W,
    options: RenderOptions,
    formatter: Formatter,
}

impl<W: Write> SectionWriter<W> {
    /// Construct a new writer.
    pub fn new(sink: W, options: RenderOptions) -> Self {
        let formatter = options.formatter();
        Self { sink, options, formatter }
    }

    /// The formatter values should be wrapped with.
    pub fn formatter(&self) -> &Formatter {
        &self.formatter
    }

    /// The options this writer uses.
    pub fn options(&self) -> &RenderOptions {
        &self.options
    }

    /// Write a titled section.
    ///
    /// This looks like a blank line, `<title>:`, a rule, the body and a closing rule.
    pub fn section<T: fmt::Display>(&mut self, title: &str, body: T) -> io::Result<()> {
        let rule = self.rule();
        writeln!(self.sink, "\n{title}:")?;
        writeln!(self.sink, "{rule}")?;
        writeln!(self.sink, "{body}")?;
        writeln!(self.sink, "{rule}")
    }

    /// Write the banner that opens an example.
    pub fn banner(&mut self, name: &str) -> io::Result<()> {
        writeln!(self.sink, "\nExample '{name}'")?;
        self.separator()
    }

    /// Write a separator line.
    pub fn separator(&mut self) -> io::Result<()> {
        let separator = self.options.separator.to_string().repeat(self.options.separator_length);
        writeln!(self.sink, "{separator}")
    }

    /// Write a plain line.
    pub fn line<T: fmt::Display>(&mut self, line: T) -> io::Result<()> {
        writeln!(self.sink, "{line}")
    }

    /// Write already rendered content as is.
    pub fn raw(&mut self, content: &[u8]) -> io::Result<()> {
        self.sink.write_all(content)
    }

    /// Consume this writer and return the underlying sink.
    pub fn into_inner(self) -> W {
        self.sink
    }

    fn rule(&self) -> String {
        self.options.rule.to_string().repeat(self.options.rule_length)
    }
}

impl SectionWriter<Vec<u8>> {
    /// Construct a writer that buffers its output in memory.
    pub fn buffered(options: RenderOptions) -> Self {
        Self::new(Vec::new(), options)
    }
}
