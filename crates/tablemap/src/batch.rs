//! Batched reads and writes.
//!
//! Writes accumulate on the builder and are flushed in store-sized chunks
//! of 25; reads go out in chunks of 100. Unprocessed leftovers are retried
//! with backoff before the batch is declared failed.

use std::time::Duration;

use tracing::warn;

use tablemap_core::retry::RetryConfig;
use tablemap_core::{schema, Error, Model, Result};

use crate::client::{BatchGetRequest, BatchWrite, BatchWriteRequest, StoreClient};
use crate::codec::{decode_item, encode_item};
use crate::mapper::{Key, Mapper};

/// DynamoDB caps one BatchWriteItem at 25 writes.
const MAX_BATCH_WRITES: usize = 25;
/// DynamoDB caps one BatchGetItem at 100 keys.
const MAX_BATCH_GETS: usize = 100;

/// Collects unconditioned writes for chunked submission.
pub struct BatchBuilder<'a, C: StoreClient + ?Sized> {
    mapper: &'a Mapper<C>,
    writes: Vec<BatchWrite>,
    retry: RetryConfig,
}

impl<'a, C: StoreClient + ?Sized> BatchBuilder<'a, C> {
    pub(crate) fn new(mapper: &'a Mapper<C>) -> Self {
        Self {
            mapper,
            writes: Vec::new(),
            retry: RetryConfig::default(),
        }
    }

    /// Overrides the retry policy for unprocessed leftovers.
    pub fn retry_config(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Queues an unconditioned put. Batch writes carry no conditions, so
    /// version attributes are written as-is.
    pub fn put<M: Model>(mut self, record: &M) -> Result<Self> {
        let schema = schema::resolve::<M>()?;
        let item = encode_item(record, &schema, self.mapper.cipher())?;
        self.writes.push(BatchWrite::Put(item));
        Ok(self)
    }

    /// Queues an unconditioned delete.
    pub fn delete<M: Model>(mut self, key: &Key) -> Result<Self> {
        let schema = schema::resolve::<M>()?;
        let key_item = self.mapper.key_item(&schema, key)?;
        self.writes.push(BatchWrite::Delete(key_item));
        Ok(self)
    }

    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.writes.len()
    }

    /// Flushes all queued writes. Unprocessed writes are retried with
    /// backoff; anything still unprocessed after the budget fails the batch.
    pub async fn execute(self) -> Result<()> {
        let leftover = self.execute_remaining().await?;
        if leftover.is_empty() {
            Ok(())
        } else {
            Err(Error::Store(format!(
                "{} batch writes unprocessed after retries",
                leftover.len()
            )))
        }
    }

    /// Like [`execute`](Self::execute) but reports leftovers per item:
    /// writes the store still had not accepted when the retry budget ran
    /// out are returned instead of collapsed into one error.
    pub async fn execute_remaining(self) -> Result<Vec<BatchWrite>> {
        let mut pending = self.writes;
        let mut attempt: u32 = 0;

        while !pending.is_empty() {
            if self.mapper.cancellation_token().is_cancelled() {
                return Err(Error::Cancelled);
            }

            let mut unprocessed = Vec::new();
            for chunk in pending.chunks(MAX_BATCH_WRITES) {
                let request = BatchWriteRequest {
                    table: self.mapper.table().to_string(),
                    writes: chunk.to_vec(),
                };
                let output = self.mapper.client().batch_write(request).await?;
                unprocessed.extend(output.unprocessed);
            }

            if unprocessed.is_empty() {
                break;
            }

            attempt += 1;
            if attempt >= self.retry.max_attempts {
                return Ok(unprocessed);
            }
            warn!(
                unprocessed = unprocessed.len(),
                attempt, "batch write returned unprocessed items, retrying"
            );
            sleep_or_cancel(self.mapper, self.retry.delay_after(attempt)).await?;
            pending = unprocessed;
        }
        Ok(Vec::new())
    }

    /// Fetches many records by key in chunks. Order of results is not
    /// guaranteed; absent keys are simply not returned.
    pub async fn get_many<M: Model>(&self, keys: &[Key], consistent_read: bool) -> Result<Vec<M>> {
        let schema = schema::resolve::<M>()?;
        let mut key_items = Vec::with_capacity(keys.len());
        for key in keys {
            key_items.push(self.mapper.key_item(&schema, key)?);
        }

        let mut records = Vec::new();
        for chunk in key_items.chunks(MAX_BATCH_GETS) {
            let mut pending = chunk.to_vec();
            let mut attempt: u32 = 0;

            while !pending.is_empty() {
                if self.mapper.cancellation_token().is_cancelled() {
                    return Err(Error::Cancelled);
                }
                let request = BatchGetRequest {
                    table: self.mapper.table().to_string(),
                    keys: pending,
                    consistent_read,
                };
                let output = self.mapper.client().batch_get(request).await?;
                for item in &output.items {
                    records.push(decode_item::<M>(item, &schema, self.mapper.cipher())?);
                }

                if output.unprocessed_keys.is_empty() {
                    break;
                }
                attempt += 1;
                if attempt >= self.retry.max_attempts {
                    return Err(Error::Store(format!(
                        "{} batch gets unprocessed after {} attempts",
                        output.unprocessed_keys.len(),
                        attempt
                    )));
                }
                warn!(
                    unprocessed = output.unprocessed_keys.len(),
                    attempt, "batch get returned unprocessed keys, retrying"
                );
                sleep_or_cancel(self.mapper, self.retry.delay_after(attempt)).await?;
                pending = output.unprocessed_keys;
            }
        }
        Ok(records)
    }
}

async fn sleep_or_cancel<C: StoreClient + ?Sized>(
    mapper: &Mapper<C>,
    delay: Duration,
) -> Result<()> {
    tokio::select! {
        _ = mapper.cancellation_token().cancelled() => Err(Error::Cancelled),
        _ = tokio::time::sleep(delay) => Ok(()),
    }
}
