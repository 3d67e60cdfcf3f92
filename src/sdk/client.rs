use std::io;
use std::time::Duration;
use async_trait::async_trait;
use log::warn;
use tokio::net::TcpStream;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use crate::{Error, Record, RecordReader, RecordWriter, Result};
use tokio::sync::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;

const CONNECT_ATTEMPTS: u64 = 3;

/// Remote [`RecordStore`](crate::RecordStore) speaking the daemon's line protocol.
///
/// A broken connection is re-established on the next call. Reads are resent
/// if the reply is lost; mutations are not. Errors the daemon reports are
/// returned as-is and never retried.
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
        match self.send_and_receive("PING".to_string(), true).await?.as_str() {
            "PONG" => Ok(()),
            other => Err(Error::Internal(format!("unexpected reply {:?}", other))),
        }
    }

    /// Sends one request line and returns the reply line.
    ///
    /// Connecting is retried with backoff. Once the request is written, a lost
    /// reply is only resent when `idempotent` is set; mutations fail with the
    /// transport error instead, since the daemon may already have applied them.
    async fn send_and_receive(&self, cmd: String, idempotent: bool) -> Result<String> {
        let mut inner_guard = self.inner.lock().await;
        let mut last_err = None;

        for i in 0..CONNECT_ATTEMPTS {
            if inner_guard.is_none() {
                match Client::connect_inner(&self.addr).await {
                    Ok(inner) => *inner_guard = Some(inner),
                    Err(e) => {
                        if i + 1 == CONNECT_ATTEMPTS { return Err(e); }
                        tokio::time::sleep(Duration::from_millis((i + 1) * 200)).await;
                        continue;
                    }
                }
            }

            let Some(inner) = inner_guard.as_mut() else { continue };
            match Client::exchange(inner, &cmd).await {
                Ok(resp) => {
                    let resp = resp.trim();
                    if let Some(err) = resp.strip_prefix("ERR ") {
                        return Err(decode_error(err));
                    }
                    return Ok(resp.to_string());
                }
                Err(e) => {
                    *inner_guard = None;
                    if !idempotent {
                        return Err(e);
                    }
                    warn!("Connection to {} lost, resending: {}", self.addr, e);
                    last_err = Some(e);
                }
            }
        }

        Err(last_err.unwrap_or_else(|| Error::Internal(format!("failed after {} attempts", CONNECT_ATTEMPTS))))
    }

    async fn exchange(inner: &mut ClientInner, cmd: &str) -> Result<String> {
        inner.writer.write_all(format!("{}\n", cmd).as_bytes()).await?;
        let mut resp = String::new();
        if inner.reader.read_line(&mut resp).await? == 0 {
            return Err(Error::Io(io::Error::new(io::ErrorKind::UnexpectedEof, "connection closed before reply")));
        }
        Ok(resp)
    }

    async fn connect_inner(addr: &str) -> Result<ClientInner> {
        let stream = TcpStream::connect(addr).await?;
        let (reader, writer) = stream.into_split();
        Ok(ClientInner {
            reader: BufReader::new(reader),
            writer,
        })
    }

    /// Sends `cmd` and returns the JSON body of an `OK <status> <body>` reply.
    async fn request(&self, cmd: String, idempotent: bool) -> Result<String> {
        let resp = self.send_and_receive(cmd, idempotent).await?;
        resp.strip_prefix("OK ")
            .and_then(|rest| rest.split_once(' '))
            .map(|(_, body)| body.to_string())
            .ok_or_else(|| Error::Internal("Invalid response".to_string()))
    }

    /// Reads every record and deserializes it into `T`.
    pub async fn read_as<T: DeserializeOwned>(&self) -> Result<Vec<T>> {
        let records = self.read().await?;
        records
            .into_iter()
            .map(|r| serde_json::from_value(serde_json::Value::Object(r)).map_err(Error::from))
            .collect()
    }

    /// Serializes `value` and creates it as a record.
    pub async fn create_from<T: Serialize>(&self, value: &T) -> Result<Record> {
        match serde_json::to_value(value)? {
            serde_json::Value::Object(record) => self.create(record).await,
            _ => Err(Error::BadRequest("value does not serialize to an object".to_string())),
        }
    }
}

/// Rebuilds an error from the `<status> <kind> <message>` tail of an `ERR` line.
fn decode_error(line: &str) -> Error {
    let mut parts = line.splitn(3, ' ');
    let status = parts.next().and_then(|s| s.parse().ok()).unwrap_or(500);
    let kind = parts.next().unwrap_or("internal").to_string();
    let message = parts.next().unwrap_or_default().to_string();

    if kind == "denied" {
        if let Ok(ms) = message.parse() {
            return Error::Denied { retry_after: Duration::from_millis(ms) };
        }
    }
    Error::Remote { status, kind, message }
}

#[async_trait]
impl RecordReader for Client {
    async fn read(&self) -> Result<Vec<Record>> {
        let body = self.request("READ".to_string(), true).await?;
        Ok(serde_json::from_str(&body)?)
    }

    async fn get(&self, id: i64) -> Result<Record> {
        let body = self.request(format!("GET {}", id), true).await?;
        Ok(serde_json::from_str(&body)?)
    }
}

#[async_trait]
impl RecordWriter for Client {
    async fn create(&self, record: Record) -> Result<Record> {
        let body = serde_json::to_string(&record)?;
        let body = self.request(format!("CREATE {}", body), false).await?;
        Ok(serde_json::from_str(&body)?)
    }

    async fn update(&self, id: i64, partial: Record) -> Result<Record> {
        let body = serde_json::to_string(&partial)?;
        let body = self.request(format!("UPDATE {} {}", id, body), false).await?;
        Ok(serde_json::from_str(&body)?)
    }

    async fn delete(&self, id: i64) -> Result<i64> {
        let body = self.request(format!("DELETE {}", id), false).await?;
        Ok(serde_json::from_str(&body)?)
    }
}
