//! Async stream abstraction for tokio.

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

/// Size of one socket read.
pub const READ_CHUNK_SIZE: usize = 16 * 1024;

pub struct Stream {
    tcp: TcpStream,
    buf: Vec<u8>,
}

impl Stream {
    pub fn tcp(tcp: TcpStream) -> Self {
        Self {
            tcp,
            buf: vec![0; READ_CHUNK_SIZE],
        }
    }

    /// Read whatever the socket has; an empty chunk means EOF.
    ///
    /// Cancel safe.
    pub async fn read_chunk(&mut self) -> std::io::Result<&[u8]> {
        let n = self.tcp.read(&mut self.buf).await?;
        Ok(&self.buf[..n])
    }

    pub async fn write_all(&mut self, buf: &[u8]) -> std::io::Result<()> {
        if buf.is_empty() {
            return Ok(());
        }
        self.tcp.write_all(buf).await?;
        self.tcp.flush().await
    }

    pub async fn shutdown(&mut self) -> std::io::Result<()> {
        self.tcp.shutdown().await
    }
}
