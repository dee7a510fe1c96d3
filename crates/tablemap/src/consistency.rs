//! Read-consistency strategies.
//!
//! Secondary-index reads lag table writes. Callers pick a [`ReadClass`]
//! describing what they can tolerate, and this module turns the class into
//! a concrete read plan: a strongly consistent point read, a short settle
//! delay, or bounded retry with verification.

use std::time::Duration;

use tablemap_core::retry::{retry_with_verification, RetryConfig};
use tablemap_core::{Error, Model, Result};

use crate::client::StoreClient;
use crate::mapper::{Key, Mapper};
use crate::query::Query;

/// Settle time granted to index propagation before a single eventual read.
const SETTLE_DELAY: Duration = Duration::from_millis(50);

/// How much staleness a read can tolerate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadClass {
    /// Retried eventual reads; accepts transient misses while an index
    /// catches up.
    IndexTolerant,
    /// One strongly consistent read against the base table. No retries.
    CorrectnessCritical,
    /// One eventual read after a short settle delay. Cheapest; may miss
    /// a very recent write.
    HighThroughput,
}

/// Reads one record under the chosen consistency class. Absence is an
/// error for every class; `IndexTolerant` treats it as retryable.
pub async fn read_by_key<M, C>(
    mapper: &Mapper<C>,
    key: &Key,
    class: ReadClass,
    config: &RetryConfig,
) -> Result<M>
where
    M: Model,
    C: StoreClient + ?Sized,
{
    match class {
        ReadClass::CorrectnessCritical => mapper
            .get_consistent::<M>(key)
            .await?
            .ok_or_else(|| not_found::<M>(key)),
        ReadClass::HighThroughput => {
            sleep_or_cancel(mapper, SETTLE_DELAY).await?;
            mapper.get::<M>(key).await?.ok_or_else(|| not_found::<M>(key))
        }
        ReadClass::IndexTolerant => {
            retry_with_verification(
                || async {
                    mapper
                        .get::<M>(key)
                        .await?
                        .ok_or_else(|| not_found::<M>(key))
                },
                |_| true,
                config,
                mapper.cancellation_token(),
            )
            .await
        }
    }
}

/// Creates a record, then re-reads until it is visible.
pub async fn create_then_verify<M, C>(
    mapper: &Mapper<C>,
    record: &M,
    key: &Key,
    config: &RetryConfig,
) -> Result<M>
where
    M: Model,
    C: StoreClient + ?Sized,
{
    mapper.create(record).await?;
    read_by_key(mapper, key, ReadClass::IndexTolerant, config).await
}

/// Saves a record, then re-reads until `predicate` accepts what is stored.
/// Returns the verified stored state, never the in-memory argument.
pub async fn update_then_verify<M, C, P>(
    mapper: &Mapper<C>,
    record: &M,
    key: &Key,
    predicate: P,
    config: &RetryConfig,
) -> Result<M>
where
    M: Model,
    C: StoreClient + ?Sized,
    P: Fn(&M) -> bool,
{
    mapper.save(record).await?;
    retry_with_verification(
        || async {
            mapper
                .get::<M>(key)
                .await?
                .ok_or_else(|| not_found::<M>(key))
        },
        predicate,
        config,
        mapper.cancellation_token(),
    )
    .await
}

/// Reruns a whole query until `predicate` accepts the full result set.
/// Each attempt starts the query from scratch; pages are never mixed
/// across attempts.
pub async fn query_with_retry<M, C, P>(
    mapper: &Mapper<C>,
    query: &Query<M, C>,
    predicate: P,
    config: &RetryConfig,
) -> Result<Vec<M>>
where
    M: Model,
    C: StoreClient + ?Sized,
    P: Fn(&[M]) -> bool,
{
    retry_with_verification(
        || query.all(),
        |items: &Vec<M>| predicate(items),
        config,
        mapper.cancellation_token(),
    )
    .await
}

fn not_found<M: Model>(key: &Key) -> Error {
    match tablemap_core::schema::resolve::<M>() {
        Ok(schema) => Error::ItemNotFound {
            entity_type: schema.entity(),
            id: key.display(),
        },
        Err(err) => err,
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
