use recstore::engine::Schema;
use recstore::{sdk, Record};
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "data/records.json")]
    file: String,

    /// JSON schema definition used in embedded mode.
    #[arg(short, long)]
    schema: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Clone)]
enum Commands {
    Read,
    Get { id: i64 },
    Create { record: String },
    Update { id: i64, partial: String },
    Delete { id: i64 },
}

fn parse_record(raw: &str) -> anyhow::Result<Record> {
    serde_json::from_str(raw).map_err(|e| anyhow::anyhow!("record must be a JSON object: {}", e))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let schema = match &cli.schema {
        Some(path) => Schema::from_file(path)?,
        None => Schema::reference(),
    };
    let store = sdk::open(&cli.file, schema).await?;

    match cli.command {
        Commands::Read => {
            let records = store.read().await?;
            println!("{}", serde_json::to_string_pretty(&records)?);
        }
        Commands::Get { id } => {
            let record = store.get(id).await?;
            println!("{}", serde_json::to_string_pretty(&record)?);
        }
        Commands::Create { record } => {
            let record = store.create(parse_record(&record)?).await?;
            println!("{}", serde_json::to_string_pretty(&record)?);
        }
        Commands::Update { id, partial } => {
            let record = store.update(id, parse_record(&partial)?).await?;
            println!("{}", serde_json::to_string_pretty(&record)?);
        }
        Commands::Delete { id } => {
            let id = store.delete(id).await?;
            println!("Deleted {}", id);
        }
    }

    Ok(())
}
