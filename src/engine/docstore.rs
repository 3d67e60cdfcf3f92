use std::sync::Arc;
use async_trait::async_trait;
use log::{debug, info, warn};
use tokio::sync::Mutex;
use crate::{record_id, Error, Record, RecordReader, RecordWriter, Result, ValidationError};
use crate::engine::Schema;
use crate::engine::persistence::Backend;

/// The embedded record store.
///
/// Every operation goes to disk: reads parse the whole document and every
/// mutation is a full read-modify-write. Mutations hold `write_lock` from the
/// read to the rename, so two writers on one store never lose each other's
/// changes.
pub struct DocumentStore {
    persistence: Arc<dyn Backend>,
    schema: Schema,
    write_lock: Mutex<()>,
}

impl DocumentStore {
    pub fn new(persistence: Arc<dyn Backend>, schema: Schema) -> Self {
        Self {
            persistence,
            schema,
            write_lock: Mutex::new(()),
        }
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    async fn load(&self) -> Result<Vec<Record>> {
        let p = self.persistence.clone();
        let records = tokio::task::spawn_blocking(move || p.load())
            .await
            .map_err(|e| Error::Internal(e.to_string()))??;
        Ok(records)
    }

    async fn write(&self, records: Vec<Record>) -> Result<()> {
        let p = self.persistence.clone();
        tokio::task::spawn_blocking(move || p.save(&records))
            .await
            .map_err(|e| Error::Internal(e.to_string()))??;
        Ok(())
    }

    fn validate(&self, record: &Record) -> Result<i64> {
        if let Err(e) = self.schema.validate(record) {
            warn!("Rejected record: {}", e);
            return Err(e.into());
        }
        record_id(record).ok_or_else(|| ValidationError::single("id", "\"id\" must be an integer").into())
    }
}

#[async_trait]
impl RecordReader for DocumentStore {
    async fn read(&self) -> Result<Vec<Record>> {
        self.load().await
    }

    async fn get(&self, id: i64) -> Result<Record> {
        self.load()
            .await?
            .into_iter()
            .find(|r| record_id(r) == Some(id))
            .ok_or(Error::NotFound(id))
    }
}

#[async_trait]
impl RecordWriter for DocumentStore {
    async fn create(&self, record: Record) -> Result<Record> {
        let id = self.validate(&record)?;

        let _guard = self.write_lock.lock().await;
        let mut records = self.load().await?;
        if records.iter().any(|r| record_id(r) == Some(id)) {
            return Err(ValidationError::single("id", format!("\"id\" {} already exists", id)).into());
        }

        records.push(record.clone());
        self.write(records).await?;
        info!("Created record {}", id);
        Ok(record)
    }

    async fn update(&self, id: i64, partial: Record) -> Result<Record> {
        let _guard = self.write_lock.lock().await;
        let mut records = self.load().await?;
        let pos = records
            .iter()
            .position(|r| record_id(r) == Some(id))
            .ok_or(Error::NotFound(id))?;

        let mut merged = records[pos].clone();
        merged.extend(partial);
        let new_id = self.validate(&merged)?;
        if new_id != id && records.iter().any(|r| record_id(r) == Some(new_id)) {
            return Err(ValidationError::single("id", format!("\"id\" {} already exists", new_id)).into());
        }

        records[pos] = merged.clone();
        self.write(records).await?;
        debug!("Updated record {}", id);
        Ok(merged)
    }

    async fn delete(&self, id: i64) -> Result<i64> {
        let _guard = self.write_lock.lock().await;
        let mut records = self.load().await?;
        let before = records.len();
        records.retain(|r| record_id(r) != Some(id));
        if records.len() == before {
            return Err(Error::NotFound(id));
        }

        self.write(records).await?;
        info!("Deleted record {}", id);
        Ok(id)
    }
}
