//! Line-oriented message template.
//!
//! Placeholders are written `{{ field }}`. A template line whose placeholder
//! refers to an absent optional field is left out of the rendered message,
//! which is how optional headers such as `In-Reply-To` are expressed.

use std::path::Path;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use thiserror::Error;

use super::message::OutboundMessage;

const BUILTIN_TEMPLATE: &str = include_str!("../../templates/message.tpl");

#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("failed to read template: {0}")]
    Io(#[from] std::io::Error),

    #[error("line {line}: unknown placeholder `{name}`")]
    UnknownField { line: usize, name: String },

    #[error("line {line}: unclosed placeholder")]
    Unclosed { line: usize },
}

/// Fields a template may reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    EmailTo,
    MessageId,
    IpFrom,
    Timestamp,
    NameFrom,
    EmailFrom,
    Subject,
    Body,
    InReplyTo,
}

impl Field {
    fn from_name(name: &str) -> Option<Self> {
        let field = match name {
            "email_to" => Field::EmailTo,
            "message_id" => Field::MessageId,
            "ip_from" => Field::IpFrom,
            "timestamp" => Field::Timestamp,
            "name_from" => Field::NameFrom,
            "email_from" => Field::EmailFrom,
            "subject" => Field::Subject,
            "body" => Field::Body,
            "in_reply_to" => Field::InReplyTo,
            _ => return None,
        };
        Some(field)
    }

    fn value<'a>(&self, message: &'a OutboundMessage) -> Option<&'a str> {
        match self {
            Field::EmailTo => Some(&message.email_to),
            Field::MessageId => Some(&message.message_id),
            Field::IpFrom => Some(&message.ip_from),
            Field::Timestamp => Some(&message.timestamp),
            Field::NameFrom => Some(&message.name_from),
            Field::EmailFrom => Some(&message.email_from),
            Field::Subject => Some(&message.subject),
            Field::Body => Some(&message.body),
            Field::InReplyTo => message.in_reply_to.as_deref(),
        }
    }

    /// Format `value` for use inside a header line.
    fn header_value(&self, value: &str) -> String {
        match self {
            Field::NameFrom => display_name(value),
            Field::EmailTo | Field::EmailFrom => header_address(value),
            Field::Subject => unstructured(value),
            _ => fold(value),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Text(String),
    Field(Field),
}

/// A parsed message template.
#[derive(Debug, Clone)]
pub struct MessageTemplate {
    lines: Vec<Vec<Segment>>,
}

impl MessageTemplate {
    /// The template shipped with the crate.
    pub fn builtin() -> Result<Self, TemplateError> {
        Self::parse(BUILTIN_TEMPLATE)
    }

    /// Read and parse a template file.
    pub fn load(path: &Path) -> Result<Self, TemplateError> {
        let source = std::fs::read_to_string(path)?;
        Self::parse(&source)
    }

    pub fn parse(source: &str) -> Result<Self, TemplateError> {
        let mut lines = Vec::new();

        for (index, raw) in source.lines().enumerate() {
            let mut segments = Vec::new();
            let mut rest = raw;

            while let Some(start) = rest.find("{{") {
                if start > 0 {
                    segments.push(Segment::Text(rest[..start].to_string()));
                }
                let after = &rest[start + 2..];
                let end = after
                    .find("}}")
                    .ok_or(TemplateError::Unclosed { line: index + 1 })?;
                let name = after[..end].trim();
                let field = Field::from_name(name).ok_or_else(|| TemplateError::UnknownField {
                    line: index + 1,
                    name: name.to_string(),
                })?;
                segments.push(Segment::Field(field));
                rest = &after[end + 2..];
            }
            if !rest.is_empty() {
                segments.push(Segment::Text(rest.to_string()));
            }

            lines.push(segments);
        }

        Ok(Self { lines })
    }

    /// Render `message` into RFC 5322 text.
    ///
    /// Values substituted before the blank line separating headers from the
    /// body are treated as header values. Line breaks are folded to spaces in
    /// every field. The sender name is written as a quoted string, or as
    /// encoded words when it is not ASCII. Addresses are stripped of
    /// characters that could start another mailbox and are never encoded.
    /// Non-ASCII subjects become RFC 2047 encoded words.
    pub fn render(&self, message: &OutboundMessage) -> String {
        let mut out = String::new();
        let mut in_headers = true;

        'lines: for segments in &self.lines {
            let mut line = String::new();

            for segment in segments {
                match segment {
                    Segment::Text(text) => line.push_str(text),
                    Segment::Field(field) => match field.value(message) {
                        Some(value) if in_headers => line.push_str(&field.header_value(value)),
                        Some(value) => line.push_str(value),
                        None => continue 'lines,
                    },
                }
            }

            if segments.is_empty() {
                in_headers = false;
            }
            out.push_str(&line);
            out.push('\n');
        }

        out
    }
}

/// Longest run of raw bytes carried by one encoded word. Base64 of 45 bytes
/// plus the `=?utf-8?b?` and `?=` delimiters is 72 characters, under the
/// 75 allowed by RFC 2047.
const ENCODED_WORD_BYTES: usize = 45;

/// Characters that would end or split a mailbox inside an address header.
const ADDRESS_DELIMITERS: &[char] = &['<', '>', '(', ')', '[', ']', ',', ';', ':', '"', '\\'];

/// Replace line breaks so a value cannot start a new header.
fn fold(value: &str) -> String {
    value
        .chars()
        .map(|c| if c == '\r' || c == '\n' { ' ' } else { c })
        .collect()
}

/// Free text header such as `Subject`.
fn unstructured(value: &str) -> String {
    let folded = fold(value);
    if folded.is_ascii() {
        folded
    } else {
        encoded_words(&folded)
    }
}

/// Display name for a mailbox, quoted so that commas, angle brackets and
/// other specials stay part of the name.
fn display_name(value: &str) -> String {
    let folded = fold(value);
    if !folded.is_ascii() {
        return encoded_words(&folded);
    }

    let mut quoted = String::with_capacity(folded.len() + 2);
    quoted.push('"');
    for c in folded.chars() {
        if c == '"' || c == '\\' {
            quoted.push('\\');
        }
        quoted.push(c);
    }
    quoted.push('"');
    quoted
}

/// Bare address as it appears between angle brackets.
pub(crate) fn header_address(value: &str) -> String {
    value
        .chars()
        .filter(|c| !c.is_whitespace() && !c.is_control() && !ADDRESS_DELIMITERS.contains(c))
        .collect()
}

/// Split `value` into `=?utf-8?b?..?=` words on character boundaries,
/// folding between words.
fn encoded_words(value: &str) -> String {
    let mut words = Vec::new();
    let mut chunk = String::new();

    for c in value.chars() {
        if chunk.len() + c.len_utf8() > ENCODED_WORD_BYTES {
            words.push(encoded_word(&chunk));
            chunk.clear();
        }
        chunk.push(c);
    }
    if !chunk.is_empty() {
        words.push(encoded_word(&chunk));
    }

    words.join("\n ")
}

fn encoded_word(chunk: &str) -> String {
    format!("=?utf-8?b?{}?=", STANDARD.encode(chunk.as_bytes()))
}
