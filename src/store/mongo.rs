//! MongoDB Token Store Module
//!
//! Production store backed by a MongoDB collection. Every rotation runs inside
//! a multi-document session transaction, which needs a replica set or sharded
//! cluster on the server side.

use super::traits::{RotationTransaction, TokenStore};
use crate::config::DatabaseConfig;
use crate::error::StoreResult;
use crate::types::UNASSIGNED_BATCH;
use async_trait::async_trait;
use mongodb::{
    Client, ClientSession, Collection,
    bson::{Bson, Document, doc},
    options::ClientOptions,
};
use tracing::{debug, info};

/// Token store over `<database>.<collection>`
#[derive(Clone)]
pub struct MongoTokenStore {
    client: Client,
    collection: Collection<Document>,
    holder_field: String,
}

impl MongoTokenStore {
    /// Connect and verify the deployment answers a `ping`
    ///
    /// The driver connects lazily, so the ping is what turns a bad URI or an
    /// unreachable server into a startup error.
    pub async fn connect(config: &DatabaseConfig) -> StoreResult<Self> {
        let mut options = ClientOptions::parse(&config.uri).await?;
        options.retry_writes = Some(true);
        options.app_name = Some("token-rotator".to_string());

        let client = Client::with_options(options)?;
        let database = client.database(&config.name);
        database.run_command(doc! { "ping": 1 }).await?;

        info!(
            "Connected to MongoDB {} (collection {}.{})",
            config.masked_uri(),
            config.name,
            config.collection
        );

        Ok(Self {
            collection: database.collection(&config.collection),
            client,
            holder_field: config.holder_field.clone(),
        })
    }
}

#[async_trait]
impl TokenStore for MongoTokenStore {
    async fn begin(&self) -> StoreResult<Box<dyn RotationTransaction>> {
        let mut session = self.client.start_session().await?;
        session.start_transaction().await?;

        Ok(Box::new(MongoTransaction {
            session,
            collection: self.collection.clone(),
            holder_field: self.holder_field.clone(),
        }))
    }

    async fn find_active_batch(&self) -> StoreResult<Option<i64>> {
        let token = self.collection.find_one(doc! { "active": true }).await?;
        Ok(token.map(|doc| batch_of(&doc).unwrap_or(UNASSIGNED_BATCH)))
    }
}

/// Session transaction; the driver aborts it if dropped uncommitted
struct MongoTransaction {
    session: ClientSession,
    collection: Collection<Document>,
    holder_field: String,
}

#[async_trait]
impl RotationTransaction for MongoTransaction {
    async fn normalize_missing_batches(&mut self) -> StoreResult<u64> {
        let result = self
            .collection
            .update_many(
                doc! { "batch": { "$exists": false } },
                doc! { "$set": { "batch": UNASSIGNED_BATCH } },
            )
            .session(&mut self.session)
            .await?;
        Ok(result.modified_count)
    }

    async fn activate_batch(&mut self, batch: i64) -> StoreResult<u64> {
        let result = self
            .collection
            .update_many(doc! { "batch": batch }, doc! { "$set": { "active": true } })
            .session(&mut self.session)
            .await?;
        Ok(result.modified_count)
    }

    async fn deactivate_other_batches(&mut self, batch: i64) -> StoreResult<u64> {
        let result = self
            .collection
            .update_many(
                doc! { "batch": { "$ne": batch } },
                doc! { "$set": { "active": false } },
            )
            .session(&mut self.session)
            .await?;
        Ok(result.modified_count)
    }

    async fn active_holders(&mut self) -> StoreResult<Vec<String>> {
        let mut projection = Document::new();
        projection.insert(self.holder_field.clone(), 1);

        let mut cursor = self
            .collection
            .find(doc! { "active": true })
            .projection(projection)
            .session(&mut self.session)
            .await?;

        let mut holders = Vec::new();
        while let Some(token) = cursor.next(&mut self.session).await {
            let token = token?;
            match token.get_str(&self.holder_field) {
                Ok(holder) => holders.push(holder.to_string()),
                Err(_) => debug!(
                    "Active token {:?} has no string {} field",
                    token.get("_id"),
                    self.holder_field
                ),
            }
        }
        Ok(holders)
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        let mut this = self;
        this.session.commit_transaction().await?;
        Ok(())
    }

    async fn abort(self: Box<Self>) -> StoreResult<()> {
        let mut this = self;
        this.session.abort_transaction().await?;
        Ok(())
    }
}

/// Integer batch of a stored token, whatever numeric type it was written as
fn batch_of(token: &Document) -> Option<i64> {
    match token.get("batch")? {
        Bson::Int32(batch) => Some(i64::from(*batch)),
        Bson::Int64(batch) => Some(*batch),
        // A fractional batch could never match an integer filter.
        Bson::Double(batch) if batch.fract() == 0.0 => Some(*batch as i64),
        _ => None,
    }
}
