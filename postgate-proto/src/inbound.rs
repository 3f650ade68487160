use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;

use postgate_delivery::{DeliveryClient, DeliveryResult};
use postgate_mail::{adapt, DeliveryPayload, ParsedMessage};
use postgate_smtp::types::{Envelope, Reply, ReplyCode};

/// One message, as received at the end of a DATA command.
#[derive(Debug, Clone)]
pub struct InboundMail {
    pub remote_addr: SocketAddr,
    pub envelope: Envelope,
    pub data: Vec<u8>,
}

/// Why a message is refused. Only the message text reaches the SMTP
/// client, details of delivery failures stay in the server logs.
#[derive(Debug, thiserror::Error)]
pub enum Rejection {
    #[error("Cannot read your message: {0}")]
    Unreadable(String),
    #[error("e1: Cannot send via Mailgun")]
    Transport,
    #[error("e2: Mailgun rejected the message")]
    Provider,
}

impl Rejection {
    pub fn code(&self) -> ReplyCode {
        match self {
            Self::Unreadable(_) => ReplyCode::POLICY_REASON,
            Self::Transport | Self::Provider => ReplyCode::TRANSACTION_FAILED,
        }
    }

    pub fn reply(&self) -> Reply {
        let enhanced = match self {
            Self::Unreadable(_) => "5.6.0",
            Self::Transport | Self::Provider => "5.0.0",
        };
        Reply::new(self.code(), format!("{} {}", enhanced, self))
    }
}

#[async_trait]
pub trait InboundHandler {
    async fn handle(&self, mail: InboundMail) -> Result<(), Rejection>;
}
pub type ArcInboundHandler = Arc<dyn InboundHandler + Send + Sync>;

/// Parse, adapt and post every message to the sending API.
pub struct Relay {
    client: DeliveryClient,
}

impl Relay {
    pub fn new(client: DeliveryClient) -> Self {
        Self { client }
    }
}

/// Turn a parsed message into the form to post. Reading a file part can
/// fail, the message is then refused as unreadable.
fn to_payload(
    message: ParsedMessage,
    remote_addr: SocketAddr,
) -> Result<DeliveryPayload, Rejection> {
    adapt(message).map_err(|e| {
        tracing::warn!(remote = %remote_addr, err = %e, "unable to adapt message");
        Rejection::Unreadable(e.to_string())
    })
}

#[async_trait]
impl InboundHandler for Relay {
    async fn handle(&self, mail: InboundMail) -> Result<(), Rejection> {
        let InboundMail {
            remote_addr,
            envelope,
            data,
        } = mail;

        let message =
            ParsedMessage::parse(&envelope.reverse_path, &envelope.forward_paths, &data)
                .map_err(|e| {
                    tracing::warn!(remote = %remote_addr, err = %e, "unable to parse message");
                    Rejection::Unreadable(e.to_string())
                })?;
        let payload = to_payload(message, remote_addr)?;

        match self.client.deliver(payload).await {
            DeliveryResult::Success => {
                tracing::info!(
                    remote = %remote_addr,
                    from = %envelope.reverse_path,
                    size = data.len(),
                    "message relayed"
                );
                Ok(())
            }
            DeliveryResult::Failure {
                reason,
                transport: true,
            } => {
                tracing::error!(remote = %remote_addr, reason = %reason, "delivery failed");
                Err(Rejection::Transport)
            }
            DeliveryResult::Failure {
                reason,
                transport: false,
            } => {
                tracing::error!(remote = %remote_addr, reason = %reason, "delivery refused");
                Err(Rejection::Provider)
            }
        }
    }
}
