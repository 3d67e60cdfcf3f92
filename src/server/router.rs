use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use crate::engine::RecordService;
use crate::{Error, Record, RecordReader, RecordWriter, Result};
use log::{info, error, debug, warn};
use tokio::sync::Semaphore;

const MAX_CONNECTIONS: usize = 100;

/// Longest accepted request line, newline included.
pub const MAX_LINE_BYTES: u64 = 1024 * 1024;

pub struct Router {
    service: Arc<RecordService>,
    semaphore: Arc<Semaphore>,
}

impl Router {
    pub fn new(service: Arc<RecordService>) -> Self {
        Self {
            service,
            semaphore: Arc::new(Semaphore::new(MAX_CONNECTIONS)),
        }
    }

    pub async fn listen(&self, port: &str) -> Result<()> {
        let listener = TcpListener::bind(format!("0.0.0.0:{}", port)).await?;
        info!("Record store listening on port {}", port);

        loop {
            let (socket, _) = listener.accept().await?;
            let service = self.service.clone();
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

                if let Err(e) = handle_connection(socket, service).await {
                    error!("Connection error: {}", e);
                }
            });
        }
    }
}

/// Serves one connection: one request line in, one response line out.
///
/// The caller's identity for rate limiting is its IP address.
pub async fn handle_connection(mut socket: TcpStream, service: Arc<RecordService>) -> Result<()> {
    let client_id = socket.peer_addr()?.ip().to_string();
    let (reader, mut writer) = socket.split();
    let mut reader = BufReader::new(reader);
    let mut line = String::new();

    loop {
        line.clear();
        let bytes_read = match read_request(&mut reader, &mut line, MAX_LINE_BYTES).await {
            Ok(n) => n,
            Err(e @ Error::BadRequest(_)) => {
                warn!("{} sent an oversized request line, closing", client_id);
                writer.write_all(format!("{}\n", error_line(&e)).as_bytes()).await?;
                break;
            }
            Err(e) => return Err(e),
        };
        if bytes_read == 0 {
            break;
        }

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let (command, args) = match trimmed.split_once(char::is_whitespace) {
            Some((c, rest)) => (c, rest.trim()),
            None => (trimmed, ""),
        };
        let command = command.to_uppercase();
        debug!("{} {}", client_id, command);

        let response = match command.as_str() {
            "PING" => "PONG".to_string(),
            "QUIT" => break,
            "READ" | "GET" | "CREATE" | "UPDATE" | "DELETE" => {
                match dispatch(&service, &client_id, &command, args).await {
                    Ok((status, body)) => format!("OK {} {}", status, body),
                    Err(e) => error_line(&e),
                }
            }
            _ => "ERR 400 bad_request unknown command".to_string(),
        };

        writer.write_all(format!("{}\n", response).as_bytes()).await?;
    }
    Ok(())
}

/// Reads one line of at most `limit` bytes into `line`.
///
/// A line that reaches the limit without a newline is a `BadRequest`.
async fn read_request<R: AsyncBufRead + Unpin>(reader: &mut R, line: &mut String, limit: u64) -> Result<usize> {
    let n = (&mut *reader).take(limit).read_line(line).await?;
    if n as u64 >= limit && !line.ends_with('\n') {
        return Err(Error::BadRequest(format!("request line exceeds {} bytes", limit)));
    }
    Ok(n)
}

async fn dispatch(service: &RecordService, client_id: &str, command: &str, args: &str) -> Result<(u16, String)> {
    // quota first, so throttled callers get 429 whatever the arguments
    let store = service.admit(client_id)?;

    match command {
        "READ" => {
            let records = store.read().await?;
            Ok((200, serde_json::to_string(&records)?))
        }
        "GET" => {
            let record = store.get(parse_id(args)?).await?;
            Ok((200, serde_json::to_string(&record)?))
        }
        "CREATE" => {
            let record = store.create(parse_record(args)?).await?;
            Ok((201, serde_json::to_string(&record)?))
        }
        "UPDATE" => {
            let (id, body) = args.split_once(char::is_whitespace).unwrap_or((args, ""));
            let id = parse_id(id)?;
            let partial = parse_record(body.trim())?;
            let record = store.update(id, partial).await?;
            Ok((200, serde_json::to_string(&record)?))
        }
        "DELETE" => {
            let id = store.delete(parse_id(args)?).await?;
            Ok((200, id.to_string()))
        }
        _ => Err(Error::BadRequest(format!("unknown command {}", command))),
    }
}

fn parse_id(arg: &str) -> Result<i64> {
    arg.parse().map_err(|_| Error::BadRequest(format!("invalid id {:?}", arg)))
}

fn parse_record(arg: &str) -> Result<Record> {
    if arg.is_empty() {
        return Err(Error::BadRequest("missing json body".to_string()));
    }
    Ok(serde_json::from_str(arg)?)
}

/// Formats `ERR <status> <kind> <message>`.
pub fn error_line(e: &Error) -> String {
    let message = match e {
        Error::Remote { message, .. } | Error::BadRequest(message) => message.clone(),
        Error::Denied { retry_after } => retry_after.as_millis().to_string(),
        other => other.to_string(),
    };
    format!("ERR {} {} {}", e.status_code(), e.kind(), message.replace('\n', " "))
}
