//! Ordered header list.
//!
//! Headers keep insertion order, because that is the order they are written
//! on the wire, and allow several lines with the same name.

use std::fmt;

/// Header names this stack reads or writes.
pub mod names {
    pub const FROM: &str = "From";
    pub const TO: &str = "To";
    pub const VIA: &str = "Via";
    pub const CALL_ID: &str = "Call-ID";
    pub const CSEQ: &str = "CSeq";
    pub const CONTACT: &str = "Contact";
    pub const EXPIRES: &str = "Expires";
    pub const ALLOW: &str = "Allow";
    pub const USER_AGENT: &str = "User-Agent";
    pub const CONTENT_LENGTH: &str = "Content-Length";
    pub const AUTHORIZATION: &str = "Authorization";
    pub const WWW_AUTHENTICATE: &str = "WWW-Authenticate";
}

/// A single `name: value` header line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderLine {
    pub name: String,
    pub value: String,
}

impl HeaderLine {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

impl fmt::Display for HeaderLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.value)
    }
}

/// Ordered sequence of header lines, duplicates allowed.
///
/// Name matching is exact (case-sensitive).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    lines: Vec<HeaderLine>,
}

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a header line, keeping any existing line with the same name.
    pub fn add(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.lines.push(HeaderLine::new(name, value));
    }

    /// Updates the value of the first line named `name`, or appends a new
    /// line when there is none.
    pub fn replace_or_add(&mut self, name: &str, value: impl Into<String>) {
        match self.lines.iter_mut().find(|line| line.name == name) {
            Some(line) => line.value = value.into(),
            None => self.add(name, value),
        }
    }

    /// First line named `name`
    pub fn find(&self, name: &str) -> Option<&HeaderLine> {
        self.lines.iter().find(|line| line.name == name)
    }

    /// Value of the first line named `name`
    pub fn get(&self, name: &str) -> Option<&str> {
        self.find(name).map(|line| line.value.as_str())
    }

    /// Values of every line named `name`, in order
    pub fn get_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.lines
            .iter()
            .filter(move |line| line.name == name)
            .map(|line| line.value.as_str())
    }

    pub fn iter(&self) -> std::slice::Iter<'_, HeaderLine> {
        self.lines.iter()
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

impl<'a> IntoIterator for &'a Headers {
    type Item = &'a HeaderLine;
    type IntoIter = std::slice::Iter<'a, HeaderLine>;

    fn into_iter(self) -> Self::IntoIter {
        self.lines.iter()
    }
}
