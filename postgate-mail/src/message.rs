use std::fmt;
use std::io::{Cursor, Read};

use mail_parser::{HeaderValue, MessageParser, MessagePart, MimeHeaders, PartType};

use crate::address::{self, Address};

/// A file carried by the message, either a regular attachment (named by
/// its filename) or an embedded file (named by its content-id).
///
/// The content can only be read once.
pub struct FilePart {
    pub name: String,
    pub data: Box<dyn Read + Send>,
}

impl FilePart {
    pub fn new(name: impl Into<String>, data: impl Read + Send + 'static) -> Self {
        Self {
            name: name.into(),
            data: Box::new(data),
        }
    }

    pub fn from_bytes(name: impl Into<String>, data: Vec<u8>) -> Self {
        Self::new(name, Cursor::new(data))
    }
}

impl fmt::Debug for FilePart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilePart")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

#[derive(Debug)]
pub struct ParsedMessage {
    pub from: Address,
    pub to: Address,
    pub cc: Vec<Address>,
    pub bcc: Vec<Address>,
    pub subject: String,
    pub text_body: Vec<u8>,
    pub html_body: Vec<u8>,
    pub reply_to: Vec<Address>,
    pub in_reply_to: Vec<String>,
    pub references: Vec<String>,
    pub attachments: Vec<FilePart>,
    pub embedded_files: Vec<FilePart>,
}

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("message is empty")]
    Empty,
    #[error("message is not a valid RFC 5322 document")]
    Malformed,
    #[error("message has no recipient")]
    NoRecipient,
    #[error("message has no sender")]
    NoSender,
}

/// Every body part of the wanted kind, in order. Clients interleaving text
/// with inline images produce several of them.
fn body<'a, 'x: 'a>(parts: impl Iterator<Item = &'a MessagePart<'x>>, html: bool) -> Vec<u8> {
    let mut out = Vec::new();
    for part in parts {
        match &part.body {
            PartType::Text(text) if !html => out.extend_from_slice(text.as_bytes()),
            PartType::Html(text) if html => out.extend_from_slice(text.as_bytes()),
            _ => (),
        }
    }
    out
}

fn msg_id(id: &str) -> String {
    format!("<{}>", id.trim().trim_matches(|c: char| c == '<' || c == '>'))
}

fn message_ids(value: &HeaderValue<'_>) -> Vec<String> {
    match value {
        HeaderValue::Text(id) => vec![msg_id(id)],
        HeaderValue::TextList(ids) => ids.iter().map(|id| msg_id(id)).collect(),
        _ => vec![],
    }
}

fn is_attachment_disposition(part: &MessagePart<'_>) -> bool {
    part.content_disposition()
        .map(|d| d.ctype().eq_ignore_ascii_case("attachment"))
        .unwrap_or(false)
}

impl ParsedMessage {
    /// Parse the content received after DATA.
    ///
    /// `from` is the first mailbox of the From header (the envelope sender
    /// when the header is missing), `to` is the first envelope recipient.
    pub fn parse(
        reverse_path: &str,
        forward_paths: &[String],
        raw: &[u8],
    ) -> Result<Self, ParseError> {
        if raw.iter().all(u8::is_ascii_whitespace) {
            return Err(ParseError::Empty);
        }
        let to = match forward_paths {
            [] => return Err(ParseError::NoRecipient),
            [first, others @ ..] => {
                if !others.is_empty() {
                    tracing::warn!(
                        to = %first,
                        dropped = others.len(),
                        "several recipients, only the first one is relayed"
                    );
                }
                Address::bare(first.as_str())
            }
        };

        let message = MessageParser::default()
            .parse(raw)
            .ok_or(ParseError::Malformed)?;

        let from_header = address::from_header(message.from());
        if from_header.len() > 1 {
            tracing::warn!(
                count = from_header.len(),
                "several From mailboxes, only the first one is relayed"
            );
        }
        let from = match from_header.into_iter().next() {
            Some(addr) if !addr.address.is_empty() => addr,
            _ => Address::bare(reverse_path),
        };
        // Null reverse path and no usable From header
        if from.address.is_empty() {
            return Err(ParseError::NoSender);
        }

        let mut attachments = Vec::new();
        let mut embedded_files = Vec::new();
        for part in message.attachments() {
            let data = part.contents().to_vec();
            match part.content_id() {
                Some(cid) if !is_attachment_disposition(part) => {
                    embedded_files.push(FilePart::from_bytes(cid, data))
                }
                _ => attachments.push(FilePart::from_bytes(
                    part.attachment_name().unwrap_or_default(),
                    data,
                )),
            }
        }

        Ok(Self {
            from,
            to,
            cc: address::from_header(message.cc()),
            bcc: address::from_header(message.bcc()),
            subject: message.subject().unwrap_or_default().to_string(),
            text_body: body((0..).map_while(|i| message.text_part(i)), false),
            html_body: body((0..).map_while(|i| message.html_part(i)), true),
            reply_to: address::from_header(message.reply_to()),
            in_reply_to: message_ids(message.in_reply_to()),
            references: message_ids(message.references()),
            attachments,
            embedded_files,
        })
    }
}
