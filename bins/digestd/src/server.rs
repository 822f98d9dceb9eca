//! Minimal HTTP/1.1 listener: one request per connection.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use bytes::{Bytes, BytesMut};
use digest_auth::{AccountStore, AuthResult, DigestGate};
use digest_core::{Headers, Request, Response, StatusLine};
use digest_parse::{find_head_end, parse_request_head, serialize_response, DEFAULT_MAX_HEAD_SIZE};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

const READ_TIMEOUT: Duration = Duration::from_secs(10);

/// Accepts connections until the listener fails.
pub async fn run<S>(listener: TcpListener, gate: Arc<DigestGate<S>>) -> Result<()>
where
    S: AccountStore + 'static,
{
    info!(addr = %listener.local_addr()?, "listening (http)");
    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(pair) => pair,
            Err(e) => {
                error!(%e, "tcp accept error");
                continue;
            }
        };
        let gate = Arc::clone(&gate);
        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, peer, &gate).await {
                debug!(%peer, error = %e, "connection closed with error");
            }
        });
    }
}

async fn handle_connection<S: AccountStore>(
    mut stream: TcpStream,
    peer: SocketAddr,
    gate: &DigestGate<S>,
) -> Result<()> {
    let head = timeout(READ_TIMEOUT, read_head(&mut stream))
        .await
        .map_err(|_| anyhow!("timed out reading request head"))??;

    let mut response = match head.as_ref().and_then(parse_request_head) {
        Some(request) => respond(gate, &request, peer.ip()),
        None => {
            warn!(%peer, "unparseable request head");
            plain(StatusLine::bad_request(), "Bad Request\n")
        }
    };

    response.headers_mut().set("Connection", "close");
    stream.write_all(&serialize_response(&response)).await?;
    stream.shutdown().await?;
    Ok(())
}

/// Reads until the blank line ending the head. `None` when the peer closes
/// early or the head grows past [`DEFAULT_MAX_HEAD_SIZE`].
async fn read_head(stream: &mut TcpStream) -> Result<Option<Bytes>> {
    let mut buf = BytesMut::with_capacity(1024);
    loop {
        if let Some(end) = find_head_end(&buf) {
            buf.truncate(end);
            return Ok(Some(buf.freeze()));
        }
        if buf.len() > DEFAULT_MAX_HEAD_SIZE {
            return Ok(None);
        }
        if stream.read_buf(&mut buf).await? == 0 {
            return Ok(None);
        }
    }
}

/// Decides one request: a greeting for authenticated users, the gate's
/// denial otherwise.
pub fn respond<S: AccountStore>(gate: &DigestGate<S>, request: &Request, peer: IpAddr) -> Response {
    match gate.authenticate_request(request, Some(peer)) {
        AuthResult::Authenticated(principal) => {
            plain(StatusLine::ok(), &format!("Hello, {}\n", principal.username))
        }
        AuthResult::Denied(denial) => denial.to_response(),
    }
}

fn plain(status: StatusLine, body: &str) -> Response {
    let mut headers = Headers::new();
    headers.push("Content-Type", "text/plain; charset=utf-8");
    Response::new(status, headers, Bytes::copy_from_slice(body.as_bytes()))
}
