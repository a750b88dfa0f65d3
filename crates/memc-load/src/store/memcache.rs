//! Memcached text-protocol client
//!
//! Only `set` and `get` are implemented. Each call runs under the client's
//! timeout; a connection that errors or times out is dropped, healthy ones
//! go back to a small idle pool.

use std::future::Future;
use std::io;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufStream};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tracing::debug;

use super::{StoreClient, StoreError};

/// Longest key memcached accepts
pub const MAX_KEY_LENGTH: usize = 250;

const MAX_IDLE_CONNECTIONS: usize = 2;

type Connection = BufStream<TcpStream>;

/// Client for a single memcached endpoint
pub struct MemcacheClient {
    addr: String,
    timeout: Duration,
    idle: Mutex<Vec<Connection>>,
}

impl MemcacheClient {
    /// Create a client for `addr` (`host:port`). No connection is made until
    /// the first operation.
    pub fn new(addr: impl Into<String>, timeout: Duration) -> Self {
        Self {
            addr: addr.into(),
            timeout,
            idle: Mutex::new(Vec::new()),
        }
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn checkout(&self) -> Result<Connection, StoreError> {
        if let Some(conn) = self.idle.lock().await.pop() {
            return Ok(conn);
        }

        debug!(addr = %self.addr, "Opening memcached connection");
        let stream = TcpStream::connect(&self.addr).await?;
        stream.set_nodelay(true)?;
        Ok(BufStream::new(stream))
    }

    async fn checkin(&self, conn: Connection) {
        let mut idle = self.idle.lock().await;
        if idle.len() < MAX_IDLE_CONNECTIONS {
            idle.push(conn);
        }
    }

    async fn with_timeout<T, F>(&self, op: F) -> Result<T, StoreError>
    where
        F: Future<Output = Result<T, StoreError>>,
    {
        tokio::time::timeout(self.timeout, op)
            .await
            .map_err(|_| StoreError::Timeout(self.timeout))?
    }
}

impl std::fmt::Debug for MemcacheClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemcacheClient")
            .field("addr", &self.addr)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl StoreClient for MemcacheClient {
    async fn set(&self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        validate_key(key)?;

        self.with_timeout(async {
            let mut conn = self.checkout().await?;
            conn.write_all(format!("set {} 0 0 {}\r\n", key, value.len()).as_bytes())
                .await?;
            conn.write_all(value).await?;
            conn.write_all(b"\r\n").await?;
            conn.flush().await?;

            let reply = read_line(&mut conn).await?;
            match reply.as_str() {
                "STORED" => {
                    self.checkin(conn).await;
                    Ok(())
                },
                "NOT_STORED" => {
                    self.checkin(conn).await;
                    Err(StoreError::NotStored)
                },
                _ => Err(StoreError::Protocol(reply)),
            }
        })
        .await
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        validate_key(key)?;

        self.with_timeout(async {
            let mut conn = self.checkout().await?;
            conn.write_all(format!("get {}\r\n", key).as_bytes()).await?;
            conn.flush().await?;

            let header = read_line(&mut conn).await?;
            if header == "END" {
                self.checkin(conn).await;
                return Ok(None);
            }

            let len = parse_value_header(&header, key)?;
            let mut data = vec![0u8; len + 2];
            conn.read_exact(&mut data).await?;
            if !data.ends_with(b"\r\n") {
                return Err(StoreError::Protocol("value not terminated by CRLF".to_string()));
            }
            data.truncate(len);

            let end = read_line(&mut conn).await?;
            if end != "END" {
                return Err(StoreError::Protocol(end));
            }

            self.checkin(conn).await;
            Ok(Some(data))
        })
        .await
    }
}

fn validate_key(key: &str) -> Result<(), StoreError> {
    let bad_byte = key.bytes().any(|b| b <= b' ' || b == 0x7f);
    if key.is_empty() || key.len() > MAX_KEY_LENGTH || bad_byte {
        return Err(StoreError::InvalidKey(key.to_string()));
    }
    Ok(())
}

async fn read_line(conn: &mut Connection) -> Result<String, StoreError> {
    let mut line = String::new();
    if conn.read_line(&mut line).await? == 0 {
        return Err(StoreError::Io(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "connection closed by server",
        )));
    }
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

/// Parse `VALUE <key> <flags> <bytes> [<cas>]` and return `<bytes>`.
fn parse_value_header(header: &str, key: &str) -> Result<usize, StoreError> {
    let parts: Vec<&str> = header.split_whitespace().collect();
    match parts.as_slice() {
        ["VALUE", k, _flags, len, ..] if *k == key => len
            .parse()
            .map_err(|_| StoreError::Protocol(header.to_string())),
        _ => Err(StoreError::Protocol(header.to_string())),
    }
}
