#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use http_body_util::{BodyExt, Full};
use hyper::body::{Bytes, Incoming};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{HeaderMap, Request, Response};
use hyper_util::rt::TokioIo;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;

use postgate_proto::config::SmtpConfig;
use postgate_proto::inbound::{ArcInboundHandler, InboundHandler, InboundMail, Rejection};
use postgate_proto::smtp::SmtpServer;

// ---- fake sending API

pub struct Captured {
    pub path: String,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

pub struct Provider {
    pub url: String,
    pub requests: Arc<Mutex<Vec<Captured>>>,
}

impl Provider {
    pub fn count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn form(&self, idx: usize) -> Vec<FormPart> {
        form_parts(&self.requests.lock().unwrap()[idx])
    }
}

/// An HTTP server answering every request with `status` and `reply`.
pub async fn provider(status: u16, reply: &'static str) -> Provider {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let requests = Arc::new(Mutex::new(Vec::new()));

    let seen = requests.clone();
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let seen = seen.clone();
            tokio::spawn(async move {
                let service = service_fn(move |req: Request<Incoming>| {
                    let seen = seen.clone();
                    async move {
                        let (parts, body) = req.into_parts();
                        let body = body.collect().await?.to_bytes().to_vec();
                        seen.lock().unwrap().push(Captured {
                            path: parts.uri.path().to_string(),
                            headers: parts.headers,
                            body,
                        });
                        Ok::<_, hyper::Error>(
                            Response::builder()
                                .status(status)
                                .body(Full::new(Bytes::from(reply)))
                                .unwrap(),
                        )
                    }
                });
                let _ = http1::Builder::new()
                    .serve_connection(TokioIo::new(stream), service)
                    .await;
            });
        }
    });

    Provider {
        url: format!("http://{}/v3/example.com/messages", addr),
        requests,
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FormPart {
    pub name: String,
    pub filename: Option<String>,
    pub data: Vec<u8>,
}

impl FormPart {
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.data).to_string()
    }
}

fn find(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    haystack[from..]
        .windows(needle.len())
        .position(|w| w == needle)
        .map(|p| p + from)
}

fn param(header: &str, key: &str) -> Option<String> {
    let prefix = format!("{}=", key);
    header
        .split(';')
        .map(str::trim)
        .find_map(|p| p.strip_prefix(prefix.as_str()))
        .map(|v| v.trim_matches('"').to_string())
}

/// Minimal multipart/form-data reader, enough for what reqwest sends.
pub fn form_parts(req: &Captured) -> Vec<FormPart> {
    let content_type = req.headers["content-type"].to_str().unwrap();
    let boundary = content_type
        .split("boundary=")
        .nth(1)
        .unwrap()
        .trim_matches('"');
    let delimiter = format!("--{}", boundary).into_bytes();

    let mut positions = vec![];
    let mut from = 0;
    while let Some(p) = find(&req.body, &delimiter, from) {
        positions.push(p);
        from = p + delimiter.len();
    }

    positions
        .windows(2)
        .map(|w| {
            let section = &req.body[w[0] + delimiter.len()..w[1]];
            let section = section.strip_prefix(b"\r\n").unwrap();
            let section = section.strip_suffix(b"\r\n").unwrap();
            let split = find(section, b"\r\n\r\n", 0).unwrap();
            let headers = String::from_utf8_lossy(&section[..split]).to_string();
            let disposition = headers
                .lines()
                .find(|l| l.to_ascii_lowercase().starts_with("content-disposition"))
                .unwrap()
                .to_string();
            FormPart {
                name: param(&disposition, "name").unwrap(),
                filename: param(&disposition, "filename"),
                data: section[split + 4..].to_vec(),
            }
        })
        .collect()
}

pub fn field<'a>(parts: &'a [FormPart], name: &str) -> Option<&'a FormPart> {
    parts.iter().find(|p| p.name == name)
}

// ---- handlers

/// Accepts and keeps everything.
#[derive(Default)]
pub struct Recorder {
    pub mails: Mutex<Vec<InboundMail>>,
}

#[async_trait]
impl InboundHandler for Recorder {
    async fn handle(&self, mail: InboundMail) -> Result<(), Rejection> {
        self.mails.lock().unwrap().push(mail);
        Ok(())
    }
}

/// Holds messages sent to `held@` or `held-refused@` until `release` is
/// notified, the latter are then refused. Everything else goes through.
#[derive(Default)]
pub struct Gate {
    pub entered: Notify,
    pub release: Notify,
    pub mails: Mutex<Vec<InboundMail>>,
}

#[async_trait]
impl InboundHandler for Gate {
    async fn handle(&self, mail: InboundMail) -> Result<(), Rejection> {
        let rcpt = mail.envelope.forward_paths[0].clone();
        if rcpt.starts_with("held") {
            self.entered.notify_one();
            self.release.notified().await;
        }
        if rcpt.starts_with("held-refused@") {
            return Err(Rejection::Provider);
        }
        self.mails.lock().unwrap().push(mail);
        Ok(())
    }
}

// ---- smtp

pub fn smtp_config(max_message_size: usize) -> SmtpConfig {
    SmtpConfig {
        bind_addr: "127.0.0.1:0".parse().unwrap(),
        hostname: "mx.test".into(),
        read_timeout: 5,
        write_timeout: 5,
        max_message_size,
    }
}

pub struct Running {
    pub addr: SocketAddr,
    pub exit: watch::Sender<bool>,
    pub handle: JoinHandle<anyhow::Result<()>>,
}

pub async fn smtp_server(config: SmtpConfig, handler: ArcInboundHandler) -> Running {
    let listener = TcpListener::bind(config.bind_addr).await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (exit, must_exit) = watch::channel(false);
    let server = SmtpServer::new(config, handler);
    let handle = tokio::spawn(async move { server.serve(listener, must_exit).await });
    Running { addr, exit, handle }
}

pub struct SmtpClient {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl SmtpClient {
    /// Connect and consume the greeting.
    pub async fn connect(addr: SocketAddr) -> Self {
        let (read, writer) = TcpStream::connect(addr).await.unwrap().into_split();
        let mut client = Self {
            reader: BufReader::new(read),
            writer,
        };
        let (code, text) = client.reply().await;
        assert_eq!(code, 220, "unexpected greeting {}", text);
        client
    }

    /// Read a full, possibly multiline, reply.
    pub async fn reply(&mut self) -> (u16, String) {
        let mut text = String::new();
        loop {
            let mut line = String::new();
            let n = self.reader.read_line(&mut line).await.unwrap();
            assert!(n > 0, "connection closed, got so far: {:?}", text);
            text.push_str(&line);
            if line.as_bytes().get(3) != Some(&b'-') {
                return (line[..3].parse().unwrap(), text);
            }
        }
    }

    pub async fn send(&mut self, raw: &str) {
        self.writer.write_all(raw.as_bytes()).await.unwrap();
    }

    pub async fn command(&mut self, cmd: &str) -> (u16, String) {
        self.send(&format!("{}\r\n", cmd)).await;
        self.reply().await
    }

    /// Full transaction from MAIL to the end of DATA, returns the last reply.
    pub async fn mail(&mut self, from: &str, to: &[&str], content: &str) -> (u16, String) {
        assert_eq!(self.command(&format!("MAIL FROM:<{}>", from)).await.0, 250);
        for rcpt in to {
            assert_eq!(self.command(&format!("RCPT TO:<{}>", rcpt)).await.0, 250);
        }
        assert_eq!(self.command("DATA").await.0, 354);
        self.send(content).await;
        self.send(".\r\n").await;
        self.reply().await
    }

    /// True once the server has closed the connection.
    pub async fn is_closed(&mut self) -> bool {
        let mut line = String::new();
        matches!(self.reader.read_line(&mut line).await, Ok(0) | Err(_))
    }
}
