//! Server Module
//!
//! TCP listener speaking the Redis line protocol, plus the HTTP front end
//! for WebSocket and REST access.

mod codec;
mod config;
mod handler;
pub mod http;
mod pagination;

pub use codec::LineCodec;
pub use config::Config;
pub use handler::{Applied, CommandError, CommandHandler};
pub use pagination::{paginate_keys, KeyPage};

use std::io;
use std::sync::Arc;

use bytes::{BufMut, Bytes, BytesMut};
use futures::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::codec::Framed;
use tracing::{error, info};

/// Redis line-protocol server
pub struct Server {
    config: Config,
    handler: Arc<CommandHandler>,
}

impl Server {
    pub fn new(config: Config, handler: Arc<CommandHandler>) -> Self {
        Self { config, handler }
    }

    /// Bind and accept connections until the listener fails fatally
    pub async fn run(self) -> io::Result<()> {
        let addr = format!("{}:{}", self.config.bind, self.config.port);
        let listener = TcpListener::bind(&addr).await?;

        info!("listening on {}", addr);
        self.run_with_listener(listener).await
    }

    /// Serve an existing listener (lets tests bind an ephemeral port)
    pub async fn run_with_listener(self, listener: TcpListener) -> io::Result<()> {
        loop {
            match listener.accept().await {
                Ok((socket, peer_addr)) => {
                    let handler = self.handler.clone();

                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(socket, handler).await {
                            error!("connection error from {}: {}", peer_addr, e);
                        }
                    });
                }
                Err(e) => {
                    error!("accept error: {}", e);
                }
            }
        }
    }
}

async fn handle_connection(socket: TcpStream, handler: Arc<CommandHandler>) -> io::Result<()> {
    let mut framed = Framed::new(socket, LineCodec);

    while let Some(line) = framed.next().await {
        let (reply, applied) = dispatch(&line?, &handler);
        framed.send(reply).await?;

        // Broadcasts follow the client reply, never precede the mutation
        if let Some(applied) = applied {
            handler.publish(&applied);
        }
    }

    Ok(())
}

/// Parse one request line and run it against the command core
fn dispatch(line: &[u8], handler: &CommandHandler) -> (Bytes, Option<Applied>) {
    let parts = match parse_command_line(line) {
        Ok(parts) => parts,
        Err(err) => return (error_reply(&err), None),
    };

    if parts.is_empty() {
        return (Bytes::from_static(b"-ERR empty command\r\n"), None);
    }

    match parts[0].to_ascii_uppercase().as_slice() {
        b"SET" => match handler.handle_set(&parts) {
            Ok(applied) => (Bytes::from_static(b"+OK\r\n"), Some(applied)),
            Err(err) => (error_reply(&err), None),
        },
        b"GET" => match handler.handle_get(&parts) {
            Ok(value) => (value_reply(&value), None),
            Err(err) => (error_reply(&err), None),
        },
        b"DEL" => match handler.handle_del(&parts) {
            Ok(Some(applied)) => (Bytes::from_static(b":1\r\n"), Some(applied)),
            Ok(None) => (Bytes::from_static(b":0\r\n"), None),
            Err(err) => (error_reply(&err), None),
        },
        b"CLUSTER" => match handler.handle_cluster(&parts) {
            Ok(()) => (Bytes::from_static(b"+OK\r\n"), None),
            Err(err) => (error_reply(&err), None),
        },
        _ => (Bytes::from_static(b"-ERR unknown command\r\n"), None),
    }
}

/// A GET reply is the raw value followed by CRLF
fn value_reply(value: &Bytes) -> Bytes {
    let mut buf = BytesMut::with_capacity(value.len() + 2);
    buf.put_slice(value);
    buf.put_slice(b"\r\n");
    buf.freeze()
}

fn error_reply(err: &CommandError) -> Bytes {
    match err {
        CommandError::Moved { slot, host, port } => {
            Bytes::from(format!("-MOVED {slot} {host}:{port}\r\n"))
        }
        other => Bytes::from(format!("-ERR {other}\r\n")),
    }
}

/// Tokenize a request line.
///
/// Double quotes group tokens containing whitespace; a backslash escapes
/// the next byte. An unterminated quote fails the whole line. Tokens are
/// raw bytes; nothing outside the verb is interpreted as text.
fn parse_command_line(line: &[u8]) -> Result<Vec<Bytes>, CommandError> {
    let mut parts = Vec::new();
    let mut current = Vec::new();
    let mut in_quotes = false;
    let mut escaped = false;

    for &byte in line {
        if escaped {
            current.push(byte);
            escaped = false;
            continue;
        }

        match byte {
            b'\\' => escaped = true,
            b'"' => in_quotes = !in_quotes,
            b' ' | b'\t' if !in_quotes => {
                if !current.is_empty() {
                    parts.push(Bytes::from(std::mem::take(&mut current)));
                }
            }
            _ => current.push(byte),
        }
    }

    if in_quotes {
        return Err(CommandError::Protocol("unclosed quoted string".to_string()));
    }
    if !current.is_empty() {
        parts.push(Bytes::from(current));
    }

    Ok(parts)
}
