//! Collection setup
//!
//! Sharding is set up once per pass on a freshly dropped collection. A
//! collection that is already sharded is fine; every other refusal is fatal.

use bson::{doc, Document};
use tracing::{debug, info};

use feedcheck_core::fields::ID_FIELD;
use feedcheck_core::Result;
use feedcheck_store::Store;

/// Range shard key on `_id`
pub fn shard_key() -> Document {
    doc! { ID_FIELD: 1 }
}

/// Shard the store's collection on [`shard_key`], tolerating "already sharded".
pub async fn ensure_sharded(store: &dyn Store) -> Result<()> {
    match store.shard_collection(&shard_key()).await {
        Ok(()) => {
            info!(target: "feedcheck::store", namespace = %store.namespace(), "Collection sharded");
            Ok(())
        }
        Err(e) if e.is_already_sharded() => {
            debug!(target: "feedcheck::store", namespace = %store.namespace(), "Collection already sharded");
            Ok(())
        }
        Err(e) => Err(e),
    }
}

/// Drop the collection, then shard it again.
pub async fn reset_collection(store: &dyn Store) -> Result<()> {
    store.drop_collection().await?;
    ensure_sharded(store).await
}
