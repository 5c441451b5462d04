use async_trait::async_trait;
use tokio::net::TcpStream;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use crate::{Result, Error, Unlocker, LogReader, LogWriter, EventType, LogRecord, Meta, QueryFilter};
use crate::wire::{AppendRequest, DeleteRequest, ListRequest, LogsResponse, UnlockRequest};
use tokio::sync::Mutex;
use serde::Serialize;

/// Remote access to a running `agentlogd`.
///
/// The session lives in the daemon: unlocking through one client unlocks the
/// log for every client of that daemon until someone sends `LOCK`.
pub struct Client {
    addr: String,
    inner: Mutex<Option<ClientInner>>,
}

struct ClientInner {
    reader: BufReader<tokio::net::tcp::OwnedReadHalf>,
    writer: tokio::net::tcp::OwnedWriteHalf,
}

impl Client {
    pub async fn connect(addr: &str) -> Result<Self> {
        let inner = Client::connect_inner(addr).await?;
        Ok(Self {
            addr: addr.to_string(),
            inner: Mutex::new(Some(inner)),
        })
    }

    pub async fn ping(&self) -> Result<()> {
        let resp = self.send_and_receive("PING".to_string()).await?;
        if resp != "PONG" {
            return Err(Error::Internal(format!("unexpected reply: {}", resp)));
        }
        Ok(())
    }

    async fn send_and_receive(&self, cmd: String) -> Result<String> {
        let mut inner_guard = self.inner.lock().await;

        // Retry logic
        for i in 0..3u64 {
            if inner_guard.is_none() {
                match Client::connect_inner(&self.addr).await {
                    Ok(inner) => *inner_guard = Some(inner),
                    Err(e) => {
                        if i == 2 { return Err(e); }
                        tokio::time::sleep(std::time::Duration::from_millis((i + 1) * 200)).await;
                        continue;
                    }
                }
            }

            let inner = match inner_guard.as_mut() {
                Some(inner) => inner,
                None => continue,
            };

            if inner.writer.write_all(format!("{}\n", cmd).as_bytes()).await.is_err() {
                *inner_guard = None;
                continue;
            }

            let mut resp = String::new();
            match inner.reader.read_line(&mut resp).await {
                // The request may already have been applied, so it is not resent.
                Ok(0) | Err(_) => {
                    *inner_guard = None;
                    return Err(Error::Io(std::io::Error::new(
                        std::io::ErrorKind::ConnectionAborted,
                        "connection closed before a reply was received",
                    )));
                }
                Ok(_) => {
                    let resp = resp.trim();
                    if let Some(err) = resp.strip_prefix("ERR ") {
                        let (code, message) = err.split_once(' ').unwrap_or((err, ""));
                        return Err(Error::from_code(code, message));
                    }
                    return Ok(resp.to_string());
                }
            }
        }

        Err(Error::Internal("failed after 3 attempts".to_string()))
    }

    async fn connect_inner(addr: &str) -> Result<ClientInner> {
        let stream = TcpStream::connect(addr).await?;
        let (reader, writer) = stream.into_split();
        Ok(ClientInner {
            reader: BufReader::new(reader),
            writer,
        })
    }

    async fn request_logs<B: Serialize>(&self, command: &str, body: &B) -> Result<Vec<LogRecord>> {
        let body = serde_json::to_string(body)?;
        let resp = self.send_and_receive(format!("{} {}", command, body)).await?;
        let json_data = resp.strip_prefix("OK ").ok_or_else(|| Error::Internal("Invalid response".to_string()))?;
        let out: LogsResponse = serde_json::from_str(json_data)?;
        Ok(out.logs)
    }
}

#[async_trait]
impl Unlocker for Client {
    async fn unlock(&self, password: &str) -> Result<Vec<LogRecord>> {
        let req = UnlockRequest { password: password.to_string() };
        self.request_logs("UNLOCK", &req).await
    }

    async fn lock(&self) -> Result<()> {
        self.send_and_receive("LOCK".to_string()).await?;
        Ok(())
    }
}

#[async_trait]
impl LogReader for Client {
    async fn list(&self, filter: &QueryFilter) -> Result<Vec<LogRecord>> {
        self.request_logs("LIST", &ListRequest::from(filter)).await
    }
}

#[async_trait]
impl LogWriter for Client {
    async fn append(&self, event_type: EventType, meta: Meta, preview: &str) -> Result<Vec<LogRecord>> {
        let req = AppendRequest { event_type, meta, preview: preview.to_string() };
        self.request_logs("APPEND", &req).await
    }

    async fn delete(&self, id: u64) -> Result<Vec<LogRecord>> {
        self.request_logs("DELETE", &DeleteRequest { id }).await
    }
}
