use std::io::Read;

use itertools::Itertools;

use crate::message::{FilePart, ParsedMessage};
use crate::payload::{DeliveryPayload, FileField, FileUpload};

#[derive(Debug, thiserror::Error)]
pub enum AdapterError {
    #[error("unable to read {field} {name:?}: {source}")]
    Unreadable {
        field: FileField,
        name: String,
        source: std::io::Error,
    },
}

fn drain(field: FileField, part: FilePart) -> Result<FileUpload, AdapterError> {
    let FilePart { name, mut data } = part;
    let mut buf = Vec::new();
    match data.read_to_end(&mut buf) {
        Ok(_) => Ok(FileUpload {
            field,
            name,
            data: buf,
        }),
        Err(source) => Err(AdapterError::Unreadable {
            field,
            name,
            source,
        }),
    }
}

/// Map a parsed message onto the provider's form fields.
///
/// Every file stream is read to its end here, once. A stream that fails
/// is reported instead of being relayed as an empty file.
pub fn adapt(message: ParsedMessage) -> Result<DeliveryPayload, AdapterError> {
    let mut payload = DeliveryPayload::new();

    payload.set("from", message.from.to_string());
    payload.set("to", message.to.address);
    payload.set("subject", message.subject);
    payload.set("text", String::from_utf8_lossy(&message.text_body));
    payload.set("html", String::from_utf8_lossy(&message.html_body));

    if !message.cc.is_empty() {
        payload.set("cc", message.cc.iter().map(|a| &a.address).join(","));
    }
    if !message.bcc.is_empty() {
        payload.set("bcc", message.bcc.iter().map(|a| &a.address).join(","));
    }
    if !message.reply_to.is_empty() {
        payload.set_header("Reply-To", message.reply_to.iter().join(", "));
    }
    if !message.in_reply_to.is_empty() {
        payload.set_header("In-Reply-To", message.in_reply_to.join(" "));
    }
    if !message.references.is_empty() {
        payload.set_header("References", message.references.join(" "));
    }

    for part in message.attachments {
        let file = drain(FileField::Attachment, part)?;
        payload.attach(file.field, file.name, file.data);
    }

    // The scalar `inline` field only ever holds the last content-id
    for part in message.embedded_files {
        let file = drain(FileField::Inline, part)?;
        payload.set("inline", file.name.as_str());
        payload.attach(file.field, file.name, file.data);
    }

    Ok(payload)
}
