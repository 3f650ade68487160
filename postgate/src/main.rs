use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;

use postgate_proto::config::{load, ConfigOverrides};
use postgate_proto::server::Server;

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Args {
    #[clap(short, long, env = "POSTGATE_CONFIG")]
    /// Path to a TOML configuration file, flags and environment win over it
    config_file: Option<PathBuf>,

    #[clap(short, long, env = "POSTGATE_LISTEN")]
    /// Address the SMTP server listens on [default: 0.0.0.0:25]
    listen: Option<SocketAddr>,

    #[clap(long, env = "POSTGATE_READ_TIMEOUT")]
    /// Read timeout of SMTP sessions, in seconds [default: 5]
    read_timeout: Option<u64>,

    #[clap(long, env = "POSTGATE_WRITE_TIMEOUT")]
    /// Write timeout of SMTP sessions, in seconds [default: 5]
    write_timeout: Option<u64>,

    #[clap(long, env = "POSTGATE_MAX_MESSAGE_SIZE")]
    /// Largest accepted message, in bytes [default: 2097152]
    max_message_size: Option<usize>,

    #[clap(long, env = "POSTGATE_SERVER_NAME")]
    /// Name announced in the SMTP greeting [default: localhost]
    server_name: Option<String>,

    #[clap(long, env = "POSTGATE_API_KEY", hide_env_values = true)]
    /// Key of the sending API
    api_key: Option<String>,

    #[clap(long, env = "POSTGATE_API_USER")]
    /// User of the sending API [default: api]
    api_user: Option<String>,

    #[clap(long, env = "POSTGATE_WEBHOOK")]
    /// URL every message is posted to
    webhook: Option<String>,
}

impl Args {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            bind_addr: self.listen,
            hostname: self.server_name.clone(),
            read_timeout: self.read_timeout,
            write_timeout: self.write_timeout,
            max_message_size: self.max_message_size,
            webhook: self.webhook.clone(),
            api_user: self.api_user.clone(),
            api_key: self.api_key.clone(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "main=info,postgate=info,postgate_proto=info,postgate_delivery=info,postgate_mail=info")
    }

    // A panic only takes down the session it happened in
    std::panic::set_hook(Box::new(|panic_info| {
        eprintln!("{}", panic_info);
        eprintln!("{:?}", backtrace::Backtrace::new());
    }));

    tracing_subscriber::fmt::init();

    let args = Args::parse();
    let config = load(args.config_file.clone(), args.overrides())?;
    let server = Server::from_config(config)?;

    match server.run().await {
        Ok(()) => {
            tracing::info!("SMTP listener stopped");
            Ok(())
        }
        Err(e) => {
            tracing::error!(err = ?e, "SMTP listener failed");
            Err(e)
        }
    }
}
