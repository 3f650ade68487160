use super::types::*;

#[derive(Debug, Clone, PartialEq)]
pub enum State {
    /// Greeting sent, waiting for HELO/EHLO
    Init,
    Ready {
        helo: String,
    },
    MailFrom {
        helo: String,
        from: String,
    },
    RcptTo {
        helo: String,
        from: String,
        to: Vec<String>,
    },
    /// The client is now sending the message content
    Data(Envelope),
    Quit,
}

impl Default for State {
    fn default() -> Self {
        Self::Init
    }
}

fn bad_sequence(why: &str) -> Reply {
    Reply::new(
        ReplyCode::BAD_SEQUENCE,
        format!("5.5.1 Bad sequence of commands: {}", why),
    )
}

impl State {
    pub fn new() -> Self {
        Self::Init
    }

    fn helo(&self) -> Option<&str> {
        match self {
            Self::Ready { helo } | Self::MailFrom { helo, .. } | Self::RcptTo { helo, .. } => {
                Some(helo)
            }
            Self::Data(env) => Some(&env.helo),
            Self::Init | Self::Quit => None,
        }
    }

    /// Apply a client command, returning the reply to send back.
    pub fn progress(&mut self, cmd: ClientCommand, hostname: &str, limits: &Limits) -> Reply {
        let (new_state, reply) = match (std::mem::replace(self, State::Init), cmd) {
            (Self::Quit, _) => (Self::Quit, bad_sequence("session is closing")),
            (Self::Data(env), _) => (Self::Data(env), bad_sequence("message content expected")),

            // Commands valid in any state
            (_, ClientCommand::Helo(helo)) => {
                tracing::debug!(helo = %helo, "HELO");
                (Self::Ready { helo }, Reply::new(ReplyCode::OKAY, hostname))
            }
            (_, ClientCommand::Ehlo(helo)) => {
                tracing::debug!(helo = %helo, "EHLO");
                let capabilities = vec![
                    hostname.to_string(),
                    "PIPELINING".to_string(),
                    format!("SIZE {}", limits.max_message_size),
                    "8BITMIME".to_string(),
                    "ENHANCEDSTATUSCODES".to_string(),
                ];
                (
                    Self::Ready { helo },
                    Reply::multiline(ReplyCode::OKAY, capabilities),
                )
            }
            (_, ClientCommand::Quit) => (
                Self::Quit,
                Reply::new(
                    ReplyCode::SERVICE_CLOSING,
                    format!("2.0.0 {} Service closing transmission channel", hostname),
                ),
            ),
            (state, ClientCommand::Rset) => {
                let next = match state.helo() {
                    Some(helo) => Self::Ready {
                        helo: helo.to_string(),
                    },
                    None => Self::Init,
                };
                (next, Reply::okay())
            }
            (state, ClientCommand::Noop) => (state, Reply::okay()),
            (state, ClientCommand::Vrfy(_)) => (
                state,
                Reply::new(
                    ReplyCode::CANNOT_VRFY,
                    "2.5.0 Cannot VRFY user, but will accept message and attempt delivery",
                ),
            ),
            (state, ClientCommand::Help) => (
                state,
                Reply::new(
                    ReplyCode::HELP_MESSAGE,
                    "2.0.0 Supported commands: HELO EHLO MAIL RCPT DATA RSET NOOP VRFY HELP QUIT",
                ),
            ),

            // Transaction
            (Self::Init, _) => (Self::Init, bad_sequence("send HELO/EHLO first")),
            (Self::Ready { helo }, ClientCommand::Mail { from, size }) => match size {
                Some(size) if size > limits.max_message_size as u64 => {
                    tracing::info!(from = %from, size, "announced message is too big");
                    (Self::Ready { helo }, Reply::message_too_big())
                }
                _ => {
                    let reply = Reply::new(
                        ReplyCode::OKAY,
                        format!("2.1.0 Originator <{}> ok", from),
                    );
                    (Self::MailFrom { helo, from }, reply)
                }
            },
            (state @ (Self::MailFrom { .. } | Self::RcptTo { .. }), ClientCommand::Mail { .. }) => {
                (state, bad_sequence("nested MAIL command"))
            }
            (Self::Ready { helo }, ClientCommand::Rcpt { .. }) => {
                (Self::Ready { helo }, bad_sequence("need MAIL before RCPT"))
            }
            (state @ (Self::MailFrom { .. } | Self::RcptTo { .. }), ClientCommand::Rcpt { to })
                if to.is_empty() =>
            {
                (
                    state,
                    Reply::new(
                        ReplyCode::SYNTAX_ERROR,
                        "5.1.3 Bad recipient address syntax",
                    ),
                )
            }
            (Self::MailFrom { helo, from }, ClientCommand::Rcpt { to }) => {
                let reply = Reply::new(ReplyCode::OKAY, format!("2.1.5 Recipient <{}> ok", to));
                (
                    Self::RcptTo {
                        helo,
                        from,
                        to: vec![to],
                    },
                    reply,
                )
            }
            (Self::RcptTo { helo, from, mut to }, ClientCommand::Rcpt { to: rcpt }) => {
                if to.len() >= limits.max_recipients {
                    let reply = Reply::new(
                        ReplyCode::INSUFFICIENT_STORAGE,
                        "4.5.3 Too many recipients",
                    );
                    (Self::RcptTo { helo, from, to }, reply)
                } else {
                    let reply =
                        Reply::new(ReplyCode::OKAY, format!("2.1.5 Recipient <{}> ok", rcpt));
                    to.push(rcpt);
                    (Self::RcptTo { helo, from, to }, reply)
                }
            }
            (Self::Ready { helo }, ClientCommand::Data) => {
                (Self::Ready { helo }, bad_sequence("need MAIL before DATA"))
            }
            (Self::MailFrom { helo, from }, ClientCommand::Data) => (
                Self::MailFrom { helo, from },
                bad_sequence("need RCPT before DATA"),
            ),
            (Self::RcptTo { helo, from, to }, ClientCommand::Data) => (
                Self::Data(Envelope {
                    helo,
                    reverse_path: from,
                    forward_paths: to,
                }),
                Reply::new(
                    ReplyCode::START_MAIL_INPUT,
                    "Start mail input; end with <CRLF>.<CRLF>",
                ),
            ),
        };

        *self = new_state;
        reply
    }

    /// Leave the DATA state once the message content has been read,
    /// returning the envelope of the finished transaction.
    pub fn take_envelope(&mut self) -> Option<Envelope> {
        match std::mem::replace(self, State::Init) {
            Self::Data(env) => {
                *self = Self::Ready {
                    helo: env.helo.clone(),
                };
                Some(env)
            }
            other => {
                *self = other;
                None
            }
        }
    }

    pub fn is_data(&self) -> bool {
        matches!(self, Self::Data(_))
    }

    pub fn is_quit(&self) -> bool {
        matches!(self, Self::Quit)
    }
}
