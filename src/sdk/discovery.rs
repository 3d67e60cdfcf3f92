use std::env;
use std::path::Path;
use std::sync::Arc;
use crate::{RecordStore, Result};
use crate::engine::{DocumentStore, Persistence, Schema};
use crate::sdk::Client;

/// Opens a [`RecordStore`] based on the environment.
///
/// `open` automatically detects whether to connect to a remote daemon or
/// open the document directly:
///
/// 1. If the `RECSTORE_ADDR` environment variable is set, it attempts to
///    connect to that address in **Remote Mode**. The daemon's own schema
///    applies and `schema` is ignored.
/// 2. Otherwise, or if the daemon is unreachable, it opens a
///    [`DocumentStore`] over the file at `path` in **Embedded Mode**.
///
/// # Examples
///
/// ```no_run
/// use recstore::sdk;
/// use recstore::engine::Schema;
///
/// #[tokio::main]
/// async fn main() -> anyhow::Result<()> {
///     let store = sdk::open("./data/records.json", Schema::reference()).await?;
///     let records = store.read().await?;
///     Ok(())
/// }
/// ```
pub async fn open<P: AsRef<Path>>(path: P, schema: Schema) -> Result<Arc<dyn RecordStore>> {
    if let Ok(addr) = env::var("RECSTORE_ADDR") {
        if !addr.is_empty() {
            match Client::connect(&addr).await {
                Ok(client) => return Ok(Arc::new(client)),
                Err(e) => log::warn!("Could not reach daemon at {}: {}. Falling back to embedded mode.", addr, e),
            }
        }
    }

    let persistence = Arc::new(Persistence::open(path)?);
    Ok(Arc::new(DocumentStore::new(persistence, schema)))
}
