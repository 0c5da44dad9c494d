//! Pipelined bulk reads on top of [`ConfigStore`]

use std::collections::BTreeMap;

use futures_util::future::try_join_all;
use tracing::debug;

use super::errors::StoreResult;
use super::ConfigStore;
use crate::schema::TableSchema;
use crate::translate::FieldMap;

/// Reads `keys` in chunks of `batch_size`, all chunks in flight at once.
///
/// Results keep request order; absent keys are `None`.
pub async fn fetch_batched(
    store: &dyn ConfigStore,
    keys: &[String],
    batch_size: usize,
) -> StoreResult<Vec<Option<FieldMap>>> {
    if keys.is_empty() {
        return Ok(Vec::new());
    }

    let batch_size = batch_size.max(1);
    let batches = keys.chunks(batch_size).map(|chunk| store.get_rows(chunk));
    let results = try_join_all(batches).await?;

    debug!(keys = keys.len(), batches = results.len(), "bulk fetch complete");
    Ok(results.into_iter().flatten().collect())
}

/// Every row of `table` currently in the store, keyed by row key
/// (the store key without the table prefix).
pub async fn fetch_table(
    store: &dyn ConfigStore,
    table: &TableSchema,
    batch_size: usize,
) -> StoreResult<BTreeMap<String, FieldMap>> {
    let prefix = table.store_prefix();
    let keys = store.keys(&prefix).await?;
    let rows = fetch_batched(store, &keys, batch_size).await?;

    let mut table_rows = BTreeMap::new();
    for (key, fields) in keys.iter().zip(rows) {
        let (Some(row_key), Some(fields)) = (key.strip_prefix(&prefix), fields) else {
            continue;
        };
        table_rows.insert(row_key.to_string(), fields);
    }
    Ok(table_rows)
}
