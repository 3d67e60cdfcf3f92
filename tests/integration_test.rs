use recstore::engine::{DocumentStore, LimiterConfig, Persistence, RateLimiter, RecordService, Schema};
use recstore::sdk::Client;
use recstore::{Error, RecordReader, RecordWriter};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::net::{TcpListener, TcpStream};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use serde::{Serialize, Deserialize};
use serde_json::json;

#[derive(Serialize, Deserialize, Debug, PartialEq)]
struct Person {
    id: i64,
    name: String,
    age: i32,
}

async fn spawn_server(points: u32) -> (TempDir, SocketAddr) {
    let dir = tempfile::tempdir().unwrap();
    let persistence = Arc::new(Persistence::open(dir.path().join("records.json")).unwrap());
    let store = Arc::new(DocumentStore::new(persistence, Schema::reference()));
    let limiter = RateLimiter::new(LimiterConfig {
        points,
        window: Duration::from_secs(60),
        ..LimiterConfig::default()
    });
    let service = Arc::new(RecordService::new(store, limiter));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            let s = service.clone();
            tokio::spawn(async move {
                let _ = recstore::server::router::handle_connection(socket, s).await;
            });
        }
    });

    (dir, addr)
}

#[tokio::test]
async fn test_client_crud() {
    let (_dir, addr) = spawn_server(100).await;
    let client = Client::connect(&addr.to_string()).await.unwrap();
    client.ping().await.unwrap();

    let john = Person { id: 1, name: "John".to_string(), age: 25 };
    client.create_from(&john).await.unwrap();

    let people: Vec<Person> = client.read_as().await.unwrap();
    assert_eq!(people, vec![john]);

    let updated = client.update(1, json!({"age": 26}).as_object().cloned().unwrap()).await.unwrap();
    assert_eq!(updated["age"], json!(26));

    let res = client.update(1, json!({"age": 17}).as_object().cloned().unwrap()).await;
    match res {
        Err(Error::Remote { status, kind, .. }) => {
            assert_eq!(status, 400);
            assert_eq!(kind, "validation");
        }
        other => panic!("unexpected result: {:?}", other),
    }
    assert_eq!(client.get(1).await.unwrap()["age"], json!(26));

    assert_eq!(client.delete(1).await.unwrap(), 1);
    assert!(client.read().await.unwrap().is_empty());

    let res = client.delete(1).await;
    assert!(matches!(res, Err(Error::Remote { status: 400, .. })));
}

#[tokio::test]
async fn test_full_protocol_integration() {
    let (dir, addr) = spawn_server(100).await;

    let stream = TcpStream::connect(addr).await.unwrap();
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut response = String::new();

    writer.write_all(b"PING\n").await.unwrap();
    reader.read_line(&mut response).await.unwrap();
    assert_eq!(response.trim(), "PONG");

    writer.write_all(b"CREATE {\"id\": 1, \"name\": \"Jo\", \"age\": 25}\n").await.unwrap();
    response.clear();
    reader.read_line(&mut response).await.unwrap();
    assert!(response.starts_with("ERR 400 validation"));

    writer.write_all(b"CREATE {\"id\": 1, \"name\": \"John Smith\", \"age\": 25}\n").await.unwrap();
    response.clear();
    reader.read_line(&mut response).await.unwrap();
    assert_eq!(response.trim(), r#"OK 201 {"id":1,"name":"John Smith","age":25}"#);

    writer.write_all(b"UPDATE 1 {\"age\": 26}\n").await.unwrap();
    response.clear();
    reader.read_line(&mut response).await.unwrap();
    assert_eq!(response.trim(), r#"OK 200 {"id":1,"name":"John Smith","age":26}"#);

    writer.write_all(b"READ\n").await.unwrap();
    response.clear();
    reader.read_line(&mut response).await.unwrap();
    assert_eq!(response.trim(), r#"OK 200 [{"id":1,"name":"John Smith","age":26}]"#);

    let on_disk = std::fs::read_to_string(dir.path().join("records.json")).unwrap();
    assert!(on_disk.contains("\n  {\n    \"id\": 1,"));

    writer.write_all(b"UPDATE 7 {\"age\": 26}\n").await.unwrap();
    response.clear();
    reader.read_line(&mut response).await.unwrap();
    assert_eq!(response.trim(), "ERR 400 not_found record 7 not found");

    writer.write_all(b"DELETE abc\n").await.unwrap();
    response.clear();
    reader.read_line(&mut response).await.unwrap();
    assert!(response.starts_with("ERR 400 bad_request"));

    writer.write_all(b"DELETE 1\n").await.unwrap();
    response.clear();
    reader.read_line(&mut response).await.unwrap();
    assert_eq!(response.trim(), "OK 200 1");

    writer.write_all(b"FROB\n").await.unwrap();
    response.clear();
    reader.read_line(&mut response).await.unwrap();
    assert_eq!(response.trim(), "ERR 400 bad_request unknown command");
}

#[tokio::test]
async fn test_rate_limit_over_the_wire() {
    let (_dir, addr) = spawn_server(3).await;
    let client = Client::connect(&addr.to_string()).await.unwrap();

    for _ in 0..3 {
        client.read().await.unwrap();
    }
    let res = client.read().await;
    assert!(matches!(res, Err(Error::Denied { .. })));

    // ping is not a record operation and is never throttled
    client.ping().await.unwrap();

    // the quota is per client identity, not per connection
    let second = Client::connect(&addr.to_string()).await.unwrap();
    assert!(matches!(second.read().await, Err(Error::Denied { .. })));
}

#[tokio::test]
async fn test_limit_checked_before_parsing() {
    let (_dir, addr) = spawn_server(1).await;

    let stream = TcpStream::connect(addr).await.unwrap();
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut response = String::new();

    // a malformed request still spends a point
    writer.write_all(b"DELETE abc\n").await.unwrap();
    reader.read_line(&mut response).await.unwrap();
    assert!(response.starts_with("ERR 400 bad_request"));

    // once throttled, bad arguments are answered with 429, not 400
    writer.write_all(b"CREATE {bad\n").await.unwrap();
    response.clear();
    reader.read_line(&mut response).await.unwrap();
    assert!(response.starts_with("ERR 429 denied"), "got {:?}", response);

    writer.write_all(b"PING\n").await.unwrap();
    response.clear();
    reader.read_line(&mut response).await.unwrap();
    assert_eq!(response.trim(), "PONG");
}
