//! The bulk-copy engine: a producer/batcher/upload-worker pipeline for
//! inserting a large, lazily-produced row source into a table.

use std::{
    collections::HashMap,
    sync::{atomic::AtomicBool, atomic::Ordering, Arc, LazyLock, Mutex, RwLock},
};

use bytes::{Bytes, BytesMut};
use clickhouse_types::Column;
use futures_util::{Stream, StreamExt};
use hyper::{Method, Request};
use tokio::sync::{mpsc, Mutex as AsyncMutex};
use url::Url;

use crate::{
    error::{Error, Result},
    request_body::RequestBody,
    response::Response,
    rowbinary,
    summary::Summary,
    value::Row,
    Client, Compression,
};

static TABLE_METADATA_CACHE: LazyLock<RwLock<HashMap<String, Arc<[Column]>>>> =
    LazyLock::new(|| RwLock::new(HashMap::new()));

/// Drops cached column metadata, forcing the next [`bulk_copy`] against
/// `table` (or every table, if `None`) to re-describe it.
///
/// Needed after a schema change (`ALTER TABLE ... ADD COLUMN`, etc.) made
/// during the lifetime of a process that has already resolved that table.
pub fn clear_cached_metadata(table: Option<&str>) {
    let mut cache = TABLE_METADATA_CACHE.write().unwrap();
    match table {
        Some(table) => {
            cache.remove(table);
        }
        None => cache.clear(),
    }
}

async fn table_columns(client: &Client, table: &str) -> Result<Arc<[Column]>> {
    if let Some(columns) = TABLE_METADATA_CACHE.read().unwrap().get(table) {
        return Ok(columns.clone());
    }

    let mut cursor = client
        .query(&format!("SELECT * FROM {table} LIMIT 0"))
        .reader()
        .await?;
    cursor.next().await?;
    let columns: Arc<[Column]> = cursor
        .columns()
        .ok_or_else(|| Error::Protocol(format!("no header received while describing `{table}`")))?
        .into();

    TABLE_METADATA_CACHE
        .write()
        .unwrap()
        .insert(table.to_string(), columns.clone());
    Ok(columns)
}

async fn resolve_columns(client: &Client, table: &str, requested: &[String]) -> Result<Vec<Column>> {
    let all = table_columns(client, table).await?;
    requested
        .iter()
        .map(|name| {
            let mut matches = all.iter().filter(|c| &c.name == name);
            let found = matches
                .next()
                .ok_or_else(|| Error::UnknownColumn {
                    table: table.to_string(),
                    column: name.clone(),
                })?
                .clone();
            if matches.next().is_some() {
                return Err(Error::AmbiguousColumn {
                    table: table.to_string(),
                    column: name.clone(),
                });
            }
            Ok(found)
        })
        .collect()
}

/// Tunables for [`bulk_copy`].
#[derive(Debug, Clone, Copy)]
pub struct BulkCopyOptions {
    /// Rows per sealed batch.
    pub batch_size: usize,
    /// Concurrent upload workers (at least 1).
    pub max_parallel: usize,
}

impl Default for BulkCopyOptions {
    fn default() -> Self {
        Self {
            batch_size: 100_000,
            max_parallel: 4,
        }
    }
}

/// Outcome of a completed [`bulk_copy`].
#[derive(Debug, Clone, Copy, Default)]
pub struct BulkCopyResult {
    pub rows_written: u64,
    pub batches: usize,
}

type SealedBatch = (usize, usize, usize, Bytes);
type BatchOutcome = (usize, usize, usize, Result<Summary>);

/// Copies rows from `source` into `table`'s `columns`, batching and
/// parallelizing uploads per `opts`.
///
/// On the first upload failure, row pulls stop, in-flight uploads are
/// awaited to completion (their server-side effect is not rolled back), and
/// the first error is returned annotated with the failing batch's row range.
pub async fn bulk_copy<S>(
    client: &Client,
    table: &str,
    columns: &[String],
    mut source: S,
    opts: BulkCopyOptions,
) -> Result<BulkCopyResult>
where
    S: Stream<Item = Row> + Unpin,
{
    let resolved = resolve_columns(client, table, columns).await?;
    let insert_stmt = format!("INSERT INTO {table} ({}) FORMAT RowBinary", columns.join(", "));
    let max_parallel = opts.max_parallel.max(1);

    let (batch_tx, batch_rx) = mpsc::channel::<SealedBatch>(max_parallel);
    let batch_rx = Arc::new(AsyncMutex::new(batch_rx));
    let failed = Arc::new(AtomicBool::new(false));

    let mut worker_handles = Vec::with_capacity(max_parallel);
    for _ in 0..max_parallel {
        let client = client.clone();
        let insert_stmt = insert_stmt.clone();
        let batch_rx = batch_rx.clone();
        let failed = failed.clone();
        worker_handles.push(tokio::spawn(async move {
            let mut outcomes: Vec<BatchOutcome> = Vec::new();
            loop {
                let next = batch_rx.lock().await.recv().await;
                let Some((index, first_row, last_row, payload)) = next else {
                    break;
                };
                let outcome = upload_batch(&client, &insert_stmt, payload).await;
                if outcome.is_err() {
                    failed.store(true, Ordering::Relaxed);
                }
                outcomes.push((index, first_row, last_row, outcome));
            }
            outcomes
        }));
    }

    let mut buffer = BytesMut::new();
    let mut rows_in_batch = 0usize;
    let mut batch_first_row = 0usize;
    let mut batch_index = 0usize;
    let mut producer_error = None;

    while !failed.load(Ordering::Relaxed) {
        let Some(row) = source.next().await else {
            break;
        };

        if let Err(err) = rowbinary::encode_row(&row, &resolved, &mut buffer) {
            producer_error = Some(Error::Other(
                format!("encoding row {}: {err}", batch_first_row + rows_in_batch).into(),
            ));
            break;
        }
        rows_in_batch += 1;

        if rows_in_batch == opts.batch_size {
            let last_row = batch_first_row + rows_in_batch - 1;
            let payload = buffer.split().freeze();
            if batch_tx
                .send((batch_index, batch_first_row, last_row, payload))
                .await
                .is_err()
            {
                break;
            }
            batch_index += 1;
            batch_first_row = last_row + 1;
            rows_in_batch = 0;
        }
    }

    if rows_in_batch > 0 && !failed.load(Ordering::Relaxed) {
        let last_row = batch_first_row + rows_in_batch - 1;
        let payload = buffer.split().freeze();
        let _ = batch_tx
            .send((batch_index, batch_first_row, last_row, payload))
            .await;
    }
    drop(batch_tx);

    let mut result = BulkCopyResult::default();
    let mut first_error = producer_error;

    for handle in worker_handles {
        let outcomes = handle
            .await
            .map_err(|err| Error::Other(format!("upload worker panicked: {err}").into()))?;
        for (index, first_row, last_row, outcome) in outcomes {
            match outcome {
                Ok(summary) if first_error.is_none() => {
                    result.rows_written += summary.written_rows;
                    result.batches += 1;
                }
                Ok(_) => {}
                Err(err) if first_error.is_none() => {
                    first_error = Some(Error::Other(
                        format!("batch {index} (rows {first_row}..={last_row}) failed: {err}")
                            .into(),
                    ));
                }
                Err(_) => {}
            }
        }
    }

    match first_error {
        Some(err) => Err(err),
        None => Ok(result),
    }
}

async fn upload_batch(client: &Client, insert_stmt: &str, payload: Bytes) -> Result<Summary> {
    let mut url = Url::parse(&client.url).map_err(|err| Error::Config(err.to_string()))?;
    {
        let mut pairs = url.query_pairs_mut();
        pairs.clear();
        pairs.append_pair("query", insert_stmt);
        if let Some(database) = &client.database {
            pairs.append_pair("database", database);
        }
        for (name, value) in &client.options {
            pairs.append_pair(name, value);
        }
    }

    let mut builder = Request::builder()
        .method(Method::POST)
        .uri(url.as_str())
        .header(hyper::header::CONTENT_LENGTH, payload.len().to_string());
    builder = crate::headers::with_authentication(builder, &client.authentication);

    let request = builder
        .body(RequestBody::full(payload))
        .map_err(|err| Error::Config(err.to_string()))?;

    let future = client.http.request(request);
    let summary_slot = Arc::new(Mutex::new(None));
    let mut response = Response::with_summary_slot(future, Compression::None, summary_slot.clone());
    response.finish().await?;
    let summary = summary_slot.lock().unwrap().clone().unwrap_or_default();
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clearing_one_table_leaves_others_cached() {
        TABLE_METADATA_CACHE
            .write()
            .unwrap()
            .insert("a".into(), Arc::from(vec![]));
        TABLE_METADATA_CACHE
            .write()
            .unwrap()
            .insert("b".into(), Arc::from(vec![]));

        clear_cached_metadata(Some("a"));

        let cache = TABLE_METADATA_CACHE.read().unwrap();
        assert!(!cache.contains_key("a"));
        assert!(cache.contains_key("b"));
    }
}
