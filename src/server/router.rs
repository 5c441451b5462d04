use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use std::sync::Arc;
use serde::de::DeserializeOwned;
use tokio::net::{TcpListener, TcpStream};
use crate::{Error, EventLog, LogRecord, Result};
use crate::wire::{AppendRequest, DeleteRequest, ListRequest, LogsResponse, UnlockRequest};
use log::{info, error};
use tokio::sync::Semaphore;

/// Upper bound on simultaneously served connections.
pub const MAX_CONNECTIONS: usize = 100;

pub struct Router {
    log: Arc<dyn EventLog>,
    semaphore: Arc<Semaphore>,
}

impl Router {
    pub fn new(log: Arc<dyn EventLog>) -> Self {
        Self {
            log,
            semaphore: Arc::new(Semaphore::new(MAX_CONNECTIONS)),
        }
    }

    pub async fn listen(&self, bind: &str, port: &str) -> Result<()> {
        let listener = TcpListener::bind(format!("{}:{}", bind, port)).await?;
        info!("Agent log daemon listening on {}:{}", bind, port);
        self.serve(listener).await
    }

    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        loop {
            let (socket, _) = listener.accept().await?;
            let log = self.log.clone();
            let sem = self.semaphore.clone();

            tokio::spawn(async move {
                let _permit = match sem.try_acquire() {
                    Ok(p) => p,
                    Err(_) => {
                        error!("Server busy: too many concurrent connections. Rejecting...");
                        let mut socket = socket;
                        let _ = socket.shutdown().await;
                        return;
                    }
                };

                if let Err(e) = handle_connection(socket, log).await {
                    error!("Connection error: {}", e);
                }
            });
        }
    }
}

/// Serves one client. Each request is a single line `COMMAND [json]`; each
/// response is `OK [json]`, `PONG`, or `ERR <code> <message>`.
pub async fn handle_connection(mut socket: TcpStream, log: Arc<dyn EventLog>) -> Result<()> {
    let (reader, mut writer) = socket.split();
    let mut reader = BufReader::new(reader);
    let mut line = String::new();

    loop {
        line.clear();
        let bytes_read = reader.read_line(&mut line).await?;
        if bytes_read == 0 {
            break;
        }

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let (command, body) = match trimmed.split_once(' ') {
            Some((c, b)) => (c.to_uppercase(), b.trim()),
            None => (trimmed.to_uppercase(), ""),
        };

        let response = match command.as_str() {
            "UNLOCK" => match parse_body::<UnlockRequest>(body) {
                Ok(req) => logs_reply(log.unlock(&req.password).await)?,
                Err(e) => err_reply(&e),
            },
            "LIST" => {
                let req = if body.is_empty() {
                    Ok(ListRequest::default())
                } else {
                    parse_body::<ListRequest>(body)
                };
                match req.and_then(|r| r.to_filter()) {
                    Ok(filter) => logs_reply(log.list(&filter).await)?,
                    Err(e) => err_reply(&e),
                }
            }
            "APPEND" => match parse_body::<AppendRequest>(body) {
                Ok(req) => logs_reply(log.append(req.event_type, req.meta, &req.preview).await)?,
                Err(e) => err_reply(&e),
            },
            "DELETE" => match parse_body::<DeleteRequest>(body) {
                Ok(req) => logs_reply(log.delete(req.id).await)?,
                Err(e) => err_reply(&e),
            },
            "LOCK" => match log.lock().await {
                Ok(()) => "OK".to_string(),
                Err(e) => err_reply(&e),
            },
            "PING" => "PONG".to_string(),
            "QUIT" => break,
            _ => "ERR invalid_input unknown command".to_string(),
        };

        writer.write_all(format!("{}\n", response).as_bytes()).await?;
    }
    Ok(())
}

fn parse_body<T: DeserializeOwned>(body: &str) -> Result<T> {
    if body.is_empty() {
        return Err(Error::InvalidInput("missing arguments".to_string()));
    }
    serde_json::from_str(body).map_err(|e| Error::InvalidInput(format!("invalid json body: {}", e)))
}

fn logs_reply(res: Result<Vec<LogRecord>>) -> Result<String> {
    Ok(match res {
        Ok(logs) => format!("OK {}", serde_json::to_string(&LogsResponse { logs })?),
        Err(e) => err_reply(&e),
    })
}

fn err_reply(e: &Error) -> String {
    format!("ERR {} {}", e.code(), e.to_string().to_lowercase())
}
