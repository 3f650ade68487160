use std::sync::Arc;

use anyhow::Result;
use tokio::sync::watch;

use postgate_delivery::{Credentials, DeliveryClient};

use crate::config::Config;
use crate::inbound::{ArcInboundHandler, Relay};
use crate::smtp::SmtpServer;

pub struct Server {
    smtp_server: Arc<SmtpServer>,
}

impl Server {
    pub fn from_config(config: Config) -> Result<Self> {
        config.validate()?;
        tracing::debug!(config = ?config, "configuration loaded");

        let credentials = Credentials::new(config.delivery.api_user, config.delivery.api_key);
        let client = DeliveryClient::new(&config.delivery.webhook, credentials)?;
        let handler: ArcInboundHandler = Arc::new(Relay::new(client));

        Ok(Self {
            smtp_server: SmtpServer::new(config.smtp, handler),
        })
    }

    pub async fn run(self) -> Result<()> {
        tracing::info!("Starting postgate...");

        let (exit_signal, _provoke_exit) = watch_ctrl_c();
        self.smtp_server.run(exit_signal).await?;

        tracing::info!("Server exiting");
        Ok(())
    }
}

pub fn watch_ctrl_c() -> (watch::Receiver<bool>, Arc<watch::Sender<bool>>) {
    let (send_cancel, watch_cancel) = watch::channel(false);
    let send_cancel = Arc::new(send_cancel);
    let send_cancel_2 = send_cancel.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(err = %e, "failed to install CTRL+C signal handler");
            return;
        }
        tracing::info!("Received CTRL+C, shutting down.");
        let _ = send_cancel.send(true);
    });
    (watch_cancel, send_cancel_2)
}
