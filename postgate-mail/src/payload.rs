use std::collections::BTreeMap;
use std::fmt;

/// Form field a file is uploaded under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileField {
    Attachment,
    Inline,
}

impl FileField {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Attachment => "attachment",
            Self::Inline => "inline",
        }
    }
}

impl fmt::Display for FileField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileUpload {
    pub field: FileField,
    /// Filename for attachments, content-id for inline files
    pub name: String,
    pub data: Vec<u8>,
}

/// What is sent to the provider: text fields, unique by name, and files
/// in the order they were found in the message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeliveryPayload {
    fields: BTreeMap<String, String>,
    files: Vec<FileUpload>,
}

impl DeliveryPayload {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a text field, replacing any previous value.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.fields.insert(name.into(), value.into());
    }

    /// Custom MIME headers are passed as `h:<Header-Name>` fields.
    pub fn set_header(&mut self, header: &str, value: impl Into<String>) {
        self.set(format!("h:{}", header), value);
    }

    pub fn attach(&mut self, field: FileField, name: impl Into<String>, data: Vec<u8>) {
        self.files.push(FileUpload {
            field,
            name: name.into(),
            data,
        });
    }

    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn files(&self) -> &[FileUpload] {
        &self.files
    }

    pub fn into_parts(self) -> (BTreeMap<String, String>, Vec<FileUpload>) {
        (self.fields, self.files)
    }
}
