use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use futures::stream::{FuturesUnordered, StreamExt};
use tokio::io::BufStream;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::time;
use tokio_util::bytes::BytesMut;

use postgate_smtp::decode::{client_command, known_verb};
use postgate_smtp::encode::Encode;
use postgate_smtp::flow::State;
use postgate_smtp::types::{Limits, Reply};

use crate::config::SmtpConfig;
use crate::inbound::{ArcInboundHandler, InboundMail};

/// Message content is read by chunks of at most this size, a chunk
/// usually being a full line.
const DATA_CHUNK: u64 = 64 * 1024;

const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

pub struct SmtpServer {
    bind_addr: SocketAddr,
    hostname: String,
    read_timeout: Duration,
    write_timeout: Duration,
    limits: Limits,
    handler: ArcInboundHandler,
}

impl SmtpServer {
    pub fn new(config: SmtpConfig, handler: ArcInboundHandler) -> Arc<Self> {
        Arc::new(Self {
            bind_addr: config.bind_addr,
            read_timeout: config.read_timeout(),
            write_timeout: config.write_timeout(),
            limits: Limits::new(config.max_message_size),
            hostname: config.hostname,
            handler,
        })
    }

    pub async fn run(self: &Arc<Self>, must_exit: watch::Receiver<bool>) -> Result<()> {
        let tcp = TcpListener::bind(self.bind_addr)
            .await
            .with_context(|| format!("unable to listen on {}", self.bind_addr))?;
        self.serve(tcp, must_exit).await
    }

    /// Accept connections on an already bound listener until `must_exit`
    /// turns true, then wait for the open sessions to finish.
    pub async fn serve(
        self: &Arc<Self>,
        tcp: TcpListener,
        mut must_exit: watch::Receiver<bool>,
    ) -> Result<()> {
        tracing::info!("SMTP server listening on {:#}", tcp.local_addr()?);

        let mut connections = FuturesUnordered::new();

        while !*must_exit.borrow() {
            let wait_conn_finished = async {
                if connections.is_empty() {
                    futures::future::pending().await
                } else {
                    connections.next().await
                }
            };

            let (socket, remote_addr) = tokio::select! {
                a = tcp.accept() => match a {
                    Ok(conn) => conn,
                    Err(e) => {
                        // Out of descriptors or aborted handshake, the listener stays up
                        tracing::warn!(err = %e, "unable to accept connection");
                        time::sleep(ACCEPT_BACKOFF).await;
                        continue;
                    }
                },
                _ = wait_conn_finished => continue,
                _ = must_exit.changed() => continue,
            };

            tracing::info!(remote = %remote_addr, "SMTP: accepted connection");
            let conn = tokio::spawn(
                NetLoop::new(socket, remote_addr, self.clone(), must_exit.clone()).run_error(),
            );

            connections.push(conn);
        }
        drop(tcp);

        tracing::info!("SMTP server shutting down, draining remaining connections...");
        while connections.next().await.is_some() {}

        Ok(())
    }
}

enum Line {
    Read,
    TooLong,
    Closed,
    TimedOut,
}

enum Content {
    Complete(Vec<u8>),
    TooBig,
    Closed,
    TimedOut,
}

/// Read a single line, LF included, into `buf`. A line longer than
/// `limit` is consumed and dropped.
async fn read_line(
    stream: &mut BufStream<TcpStream>,
    buf: &mut Vec<u8>,
    limit: usize,
    timeout: Duration,
) -> Result<Line> {
    buf.clear();
    let mut reader = (&mut *stream).take(limit as u64);
    let bread = match time::timeout(timeout, reader.read_until(b'\n', buf)).await {
        Err(_) => return Ok(Line::TimedOut),
        Ok(res) => res?,
    };
    if bread == 0 {
        return Ok(Line::Closed);
    }
    if buf.ends_with(b"\n") {
        return Ok(Line::Read);
    }
    if buf.len() < limit {
        // EOF in the middle of a line
        return Ok(Line::Closed);
    }

    loop {
        buf.clear();
        let mut reader = (&mut *stream).take(limit as u64);
        let bread = match time::timeout(timeout, reader.read_until(b'\n', buf)).await {
            Err(_) => return Ok(Line::TimedOut),
            Ok(res) => res?,
        };
        if bread == 0 {
            return Ok(Line::Closed);
        }
        if buf.ends_with(b"\n") {
            buf.clear();
            return Ok(Line::TooLong);
        }
    }
}

fn strip_crlf(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}

struct NetLoop {
    server: Arc<SmtpServer>,
    remote_addr: SocketAddr,
    stream: BufStream<TcpStream>,
    stop: watch::Receiver<bool>,
    state: State,
    read_buf: Vec<u8>,
    write_buf: BytesMut,
}

impl NetLoop {
    fn new(
        stream: TcpStream,
        remote_addr: SocketAddr,
        server: Arc<SmtpServer>,
        stop: watch::Receiver<bool>,
    ) -> Self {
        Self {
            server,
            remote_addr,
            stream: BufStream::new(stream),
            stop,
            state: State::new(),
            read_buf: Vec::new(),
            write_buf: BytesMut::new(),
        }
    }

    async fn run_error(self) {
        let remote = self.remote_addr;
        match self.run().await {
            Ok(()) => tracing::info!(remote = %remote, "SMTP session closed"),
            Err(e) => tracing::error!(remote = %remote, err = ?e, "SMTP session failed"),
        }
    }

    async fn run(mut self) -> Result<()> {
        self.send(Reply::greeting(&self.server.hostname)).await?;

        loop {
            let line = tokio::select! {
                line = read_line(
                    &mut self.stream,
                    &mut self.read_buf,
                    Limits::COMMAND_LINE_MAX_LENGTH,
                    self.server.read_timeout,
                ) => line?,
                _ = self.stop.changed() => {
                    tracing::debug!("Server is stopping, closing idle session");
                    let reply = Reply::shutting_down(&self.server.hostname);
                    return self.send(reply).await;
                }
            };

            let reply = match line {
                Line::Closed => {
                    tracing::debug!("Connection closed by the client");
                    return Ok(());
                }
                Line::TimedOut => {
                    tracing::info!(remote = %self.remote_addr, "read timeout, closing session");
                    let reply = Reply::timeout(&self.server.hostname);
                    return self.send(reply).await;
                }
                Line::TooLong => Reply::line_too_long(),
                Line::Read => {
                    let line = strip_crlf(&self.read_buf);
                    match client_command(line) {
                        Ok((_, cmd)) => {
                            tracing::trace!(cmd = ?cmd, "Received command");
                            self.state
                                .progress(cmd, &self.server.hostname, &self.server.limits)
                        }
                        Err(_) if known_verb(line) => Reply::syntax_error(),
                        Err(_) => Reply::command_unrecognized(),
                    }
                }
            };
            self.send(reply).await?;

            if self.state.is_quit() {
                return Ok(());
            }
            if self.state.is_data() && !self.receive_message().await? {
                return Ok(());
            }
        }
    }

    /// Read the message content, hand it to the handler and send the final
    /// reply. Returns false when the session is over.
    async fn receive_message(&mut self) -> Result<bool> {
        let content = self.read_content().await?;
        let envelope = match self.state.take_envelope() {
            Some(env) => env,
            None => bail!("message content received outside of a mail transaction"),
        };

        let reply = match content {
            Content::Closed => {
                tracing::info!(remote = %self.remote_addr, "connection closed during DATA");
                return Ok(false);
            }
            Content::TimedOut => {
                tracing::info!(remote = %self.remote_addr, "read timeout during DATA");
                self.send(Reply::timeout(&self.server.hostname)).await?;
                return Ok(false);
            }
            Content::TooBig => {
                tracing::info!(
                    remote = %self.remote_addr,
                    from = %envelope.reverse_path,
                    max = self.server.limits.max_message_size,
                    "message is too big, discarded"
                );
                Reply::message_too_big()
            }
            Content::Complete(data) => {
                tracing::debug!(size = data.len(), "message received");
                let mail = InboundMail {
                    remote_addr: self.remote_addr,
                    envelope,
                    data,
                };
                match self.server.handler.handle(mail).await {
                    Ok(()) => Reply::queued(),
                    Err(rejection) => {
                        tracing::info!(remote = %self.remote_addr, reason = %rejection, "message rejected");
                        rejection.reply()
                    }
                }
            }
        };

        self.send(reply).await?;
        Ok(true)
    }

    /// Read up to the `.` line, undoing dot-stuffing. Once the size limit
    /// is crossed the rest of the content is read but not kept.
    async fn read_content(&mut self) -> Result<Content> {
        let max = self.server.limits.max_message_size;
        let mut data = Vec::new();
        let mut too_big = false;
        let mut line_start = true;

        loop {
            self.read_buf.clear();
            let mut reader = (&mut self.stream).take(DATA_CHUNK);
            let read = reader.read_until(b'\n', &mut self.read_buf);
            let bread = match time::timeout(self.server.read_timeout, read).await {
                Err(_) => return Ok(Content::TimedOut),
                Ok(res) => res?,
            };
            if bread == 0 {
                return Ok(Content::Closed);
            }

            let chunk = &self.read_buf[..];
            if line_start && (chunk == b".\r\n" || chunk == b".\n") {
                break;
            }
            let chunk = match line_start && chunk.starts_with(b".") {
                true => &chunk[1..],
                false => chunk,
            };
            line_start = chunk.ends_with(b"\n");

            if too_big {
                continue;
            }
            if data.len() + chunk.len() > max {
                too_big = true;
                data = Vec::new();
                continue;
            }
            data.extend_from_slice(chunk);
        }

        match too_big {
            true => Ok(Content::TooBig),
            false => Ok(Content::Complete(data)),
        }
    }

    async fn send(&mut self, reply: Reply) -> Result<()> {
        match reply.code.is_positive() {
            true => tracing::trace!(reply = ?reply, "Sent reply"),
            false => tracing::debug!(remote = %self.remote_addr, reply = ?reply, "Sent error reply"),
        }
        self.write_buf.clear();
        reply.encode(&mut self.write_buf)?;

        let timeout = self.server.write_timeout;
        let stream = &mut self.stream;
        let buf = &self.write_buf;
        let write = async move {
            stream.write_all(buf).await?;
            stream.flush().await
        };
        time::timeout(timeout, write)
            .await
            .map_err(|_| anyhow!("write timeout"))??;
        Ok(())
    }
}
