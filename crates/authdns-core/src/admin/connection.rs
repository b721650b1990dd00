//! Per-connection framing: 4-byte big-endian length prefix followed by an
//! ASCII command line in, a length-prefixed ASCII reply out. Grounded on
//! `adminReadHandler`/`adminWriteHandler`'s two-state (`READ_LEN`/`READ_N`,
//! `WRITE_LEN`/`WRITE_N`) loops in `src/admin.c`, collapsed into
//! straight-line async code since tokio does the buffering the original
//! hand-rolled with `EAGAIN` checks.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use super::{commands, AdminState, IDLE_TIMEOUT};
use crate::error::AdminError;

pub const LEN_BYTES: usize = 4;
/// Refuse to even attempt to read a command line longer than this; a
/// well-formed admin client never sends anything close to it.
const MAX_COMMAND_LEN: u32 = 64 * 1024;

pub async fn handle_connection(mut stream: TcpStream, peer: SocketAddr, state: Arc<AdminState>) -> Result<(), AdminError> {
    stream.set_nodelay(true).ok();
    if state.config.tcp_keepalive {
        let keepalive = socket2::TcpKeepalive::new().with_time(IDLE_TIMEOUT);
        socket2::SockRef::from(&stream).set_tcp_keepalive(&keepalive).ok();
    }
    loop {
        let mut len_buf = [0u8; LEN_BYTES];
        match tokio::time::timeout(IDLE_TIMEOUT, stream.read_exact(&mut len_buf)).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(()),
            Ok(Err(e)) => return Err(e.into()),
            Err(_elapsed) => return Ok(()), // idle timeout: close quietly
        }
        let len = u32::from_be_bytes(len_buf);
        if len > MAX_COMMAND_LEN {
            return Err(AdminError::Protocol(format!("command too long: {len} bytes")));
        }

        let mut payload = vec![0u8; len as usize];
        stream.read_exact(&mut payload).await?;
        let line = String::from_utf8_lossy(&payload).into_owned();

        let reply = commands::dispatch(&line, &state).await;
        write_framed(&mut stream, peer, &reply).await?;
    }
}

async fn write_framed(stream: &mut TcpStream, _peer: SocketAddr, reply: &str) -> Result<(), AdminError> {
    let bytes = reply.as_bytes();
    let len = bytes.len() as u32;
    stream.write_all(&len.to_be_bytes()).await?;
    stream.write_all(bytes).await?;
    Ok(())
}
