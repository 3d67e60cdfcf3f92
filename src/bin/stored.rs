use std::sync::Arc;
use std::time::Duration;
use recstore::engine::{DocumentStore, LimiterConfig, Persistence, RateLimiter, RecordService, Schema};
use recstore::server::Router;
use recstore::RecordReader;
use clap::Parser;
use std::env;
use log::info;
use tokio::signal;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path of the JSON document.
    #[arg(short, long)]
    file: Option<String>,

    #[arg(short, long)]
    port: Option<String>,

    /// JSON schema definition; the built-in record schema is used if omitted.
    #[arg(short, long)]
    schema: Option<String>,

    /// Operations allowed per client per window.
    #[arg(long)]
    points: Option<u32>,

    #[arg(long)]
    window_ms: Option<u64>,
}

fn env_or<T: std::str::FromStr>(arg: Option<T>, key: &str, default: T) -> T {
    arg.or_else(|| env::var(key).ok().and_then(|v| v.parse().ok()))
        .unwrap_or(default)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    let file = env_or(args.file, "RECSTORE_FILE", "data/records.json".to_string());
    let port = env_or(args.port, "RECSTORE_PORT", "7001".to_string());
    let points = env_or(args.points, "RECSTORE_POINTS", 10);
    let window_ms = env_or(args.window_ms, "RECSTORE_WINDOW_MS", 1000);

    let schema = match args.schema.or_else(|| env::var("RECSTORE_SCHEMA").ok()) {
        Some(path) => {
            info!("Loading schema from {}", path);
            Schema::from_file(path)?
        }
        None => Schema::reference(),
    };

    let persistence = Arc::new(Persistence::open(&file)?);
    let store = Arc::new(DocumentStore::new(persistence, schema));
    let limiter = RateLimiter::new(LimiterConfig {
        points,
        window: Duration::from_millis(window_ms),
        ..LimiterConfig::default()
    });
    let service = Arc::new(RecordService::new(store.clone(), limiter));

    let router = Router::new(service.clone());

    println!("Starting record store daemon...");
    println!("Document {} holds {} records.", file, store.read().await?.len());
    println!("Rate limit: {} operations per {}ms per client.", points, window_ms);
    println!("Listening on :{} (TCP)", port);

    let pruner = service.clone();
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(Duration::from_secs(60));
        loop {
            tick.tick().await;
            pruner.limiter().prune();
        }
    });

    tokio::select! {
        res = router.listen(&port) => {
            if let Err(e) = res {
                eprintln!("TCP Server failed: {}", e);
            }
        }
        _ = signal::ctrl_c() => {
            println!("\nShutdown signal received. Exiting.");
        }
    }

    Ok(())
}
