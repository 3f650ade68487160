#[derive(Debug, Clone, PartialEq)]
pub enum ClientCommand {
    /// Identify the client, plain SMTP.
    Helo(String),
    /// Identify the client and ask for the list of supported extensions.
    Ehlo(String),
    Mail {
        /// Reverse path, empty for the null sender `<>` used by bounces.
        from: String,
        /// Size announced with the SIZE extension (RFC 1870), if any.
        size: Option<u64>,
    },
    Rcpt {
        /// Forward path, the mailbox the message must be delivered to.
        to: String,
    },
    Data,
    Rset,
    Noop,
    Quit,
    Vrfy(String),
    Help,
}

/// A three digit SMTP reply code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplyCode(pub u16);

impl ReplyCode {
    pub const HELP_MESSAGE: Self = Self(214);
    pub const SERVICE_READY: Self = Self(220);
    pub const SERVICE_CLOSING: Self = Self(221);
    pub const OKAY: Self = Self(250);
    pub const CANNOT_VRFY: Self = Self(252);
    pub const START_MAIL_INPUT: Self = Self(354);
    pub const SERVICE_NOT_AVAILABLE: Self = Self(421);
    pub const INSUFFICIENT_STORAGE: Self = Self(452);
    pub const COMMAND_UNRECOGNIZED: Self = Self(500);
    pub const SYNTAX_ERROR: Self = Self(501);
    pub const BAD_SEQUENCE: Self = Self(503);
    pub const POLICY_REASON: Self = Self(550);
    pub const EXCEEDED_STORAGE: Self = Self(552);
    pub const TRANSACTION_FAILED: Self = Self(554);

    pub fn is_positive(&self) -> bool {
        self.0 < 400
    }
}

/// A reply sent by the server, possibly spanning several lines
/// (EHLO capabilities for example).
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub code: ReplyCode,
    pub lines: Vec<String>,
}

impl Reply {
    pub fn new(code: ReplyCode, text: impl Into<String>) -> Self {
        Self {
            code,
            lines: vec![text.into()],
        }
    }

    pub fn multiline(code: ReplyCode, lines: Vec<String>) -> Self {
        Self { code, lines }
    }

    pub fn greeting(hostname: &str) -> Self {
        Self::new(
            ReplyCode::SERVICE_READY,
            format!("{} ESMTP Service Ready", hostname),
        )
    }

    pub fn okay() -> Self {
        Self::new(ReplyCode::OKAY, "2.0.0 OK")
    }

    pub fn queued() -> Self {
        Self::new(ReplyCode::OKAY, "2.0.0 OK: queued")
    }

    pub fn command_unrecognized() -> Self {
        Self::new(
            ReplyCode::COMMAND_UNRECOGNIZED,
            "5.5.2 Syntax error, command unrecognized",
        )
    }

    pub fn syntax_error() -> Self {
        Self::new(
            ReplyCode::SYNTAX_ERROR,
            "5.5.4 Syntax error in parameters or arguments",
        )
    }

    pub fn line_too_long() -> Self {
        Self::new(ReplyCode::COMMAND_UNRECOGNIZED, "5.5.2 Line too long")
    }

    pub fn message_too_big() -> Self {
        Self::new(
            ReplyCode::EXCEEDED_STORAGE,
            "5.3.4 Message size exceeds fixed maximum message size",
        )
    }

    pub fn timeout(hostname: &str) -> Self {
        Self::new(
            ReplyCode::SERVICE_NOT_AVAILABLE,
            format!("4.4.2 {} Error: timeout exceeded", hostname),
        )
    }

    pub fn shutting_down(hostname: &str) -> Self {
        Self::new(
            ReplyCode::SERVICE_NOT_AVAILABLE,
            format!("4.3.2 {} Service shutting down", hostname),
        )
    }
}

/// What the client asked us to do with the message, collected between
/// `MAIL FROM` and `DATA`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Envelope {
    pub helo: String,
    pub reverse_path: String,
    pub forward_paths: Vec<String>,
}

/// Session limits, RFC 5321 section 4.5.3.
#[derive(Debug, Clone)]
pub struct Limits {
    pub max_recipients: usize,
    pub max_message_size: usize,
}

impl Limits {
    /// Maximum length of a command line, CRLF included
    pub const COMMAND_LINE_MAX_LENGTH: usize = 512;
    /// Maximum number of recipients per transaction
    pub const MAX_RECIPIENTS: usize = 100;

    pub fn new(max_message_size: usize) -> Self {
        Self {
            max_recipients: Self::MAX_RECIPIENTS,
            max_message_size,
        }
    }
}
