//! Read-consistency strategies end to end against a scripted store.

mod support;

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use tablemap::client::PageOutput;
use tablemap::consistency::{
    create_then_verify, query_with_retry, read_by_key, update_then_verify, ReadClass,
};
use tablemap::{Error, Key, Mapper, Operator, RetryConfig, Value};

use support::{order, order_item, FakeStore, Order, Recorded};

fn fast_config() -> RetryConfig {
    RetryConfig {
        max_attempts: 3,
        initial_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(5),
        backoff_factor: 2.0,
    }
}

fn mapper_with_store() -> (Arc<FakeStore>, Mapper<FakeStore>) {
    let store = Arc::new(FakeStore::new());
    let mapper = Mapper::new(store.clone(), "orders");
    (store, mapper)
}

#[tokio::test]
async fn index_tolerant_retries_until_the_item_appears() {
    let (store, mapper) = mapper_with_store();
    let stored = order("o-1", "open", 100, 1);
    store.script_get(Ok(None));
    store.script_get(Ok(None));
    store.script_get(Ok(Some(order_item(&stored))));

    let found = read_by_key::<Order, _>(
        &mapper,
        &Key::new("o-1"),
        ReadClass::IndexTolerant,
        &fast_config(),
    )
    .await
    .unwrap();

    assert_eq!(found, stored);
    assert_eq!(store.recorded_count(), 3);
}

#[tokio::test]
async fn index_tolerant_exhaustion_reports_attempts() {
    let (store, mapper) = mapper_with_store();
    for _ in 0..3 {
        store.script_get(Ok(None));
    }

    let err = read_by_key::<Order, _>(
        &mapper,
        &Key::new("o-1"),
        ReadClass::IndexTolerant,
        &fast_config(),
    )
    .await
    .unwrap_err();

    assert_eq!(err, Error::VerificationFailed { attempts: 3 });
    assert_eq!(store.recorded_count(), 3);
}

#[tokio::test]
async fn correctness_critical_reads_consistently_and_never_retries() {
    let (store, mapper) = mapper_with_store();
    store.script_get(Ok(None));

    let err = read_by_key::<Order, _>(
        &mapper,
        &Key::new("o-1"),
        ReadClass::CorrectnessCritical,
        &fast_config(),
    )
    .await
    .unwrap_err();

    assert!(matches!(err, Error::ItemNotFound { .. }));
    assert_eq!(store.recorded_count(), 1);

    let recorded = store.recorded.lock().unwrap();
    let Recorded::Get(request) = &recorded[0] else {
        panic!("expected a get request");
    };
    assert!(request.consistent_read);
}

#[tokio::test]
async fn high_throughput_reads_once_eventually() {
    let (store, mapper) = mapper_with_store();
    let stored = order("o-1", "open", 100, 1);
    store.script_get(Ok(Some(order_item(&stored))));

    let found = read_by_key::<Order, _>(
        &mapper,
        &Key::new("o-1"),
        ReadClass::HighThroughput,
        &fast_config(),
    )
    .await
    .unwrap();

    assert_eq!(found, stored);
    assert_eq!(store.recorded_count(), 1);

    let recorded = store.recorded.lock().unwrap();
    let Recorded::Get(request) = &recorded[0] else {
        panic!("expected a get request");
    };
    assert!(!request.consistent_read);
}

#[tokio::test]
async fn non_retryable_error_surfaces_immediately() {
    let (store, mapper) = mapper_with_store();
    store.script_get(Err(Error::InvalidData("corrupt item".to_string())));

    let err = read_by_key::<Order, _>(
        &mapper,
        &Key::new("o-1"),
        ReadClass::IndexTolerant,
        &fast_config(),
    )
    .await
    .unwrap_err();

    assert!(matches!(err, Error::InvalidData(_)));
    assert_eq!(store.recorded_count(), 1);
}

#[tokio::test]
async fn transport_errors_share_the_retry_budget() {
    let (store, mapper) = mapper_with_store();
    let stored = order("o-1", "open", 100, 1);
    store.script_get(Err(Error::Store("connection reset".to_string())));
    store.script_get(Ok(Some(order_item(&stored))));

    let found = read_by_key::<Order, _>(
        &mapper,
        &Key::new("o-1"),
        ReadClass::IndexTolerant,
        &fast_config(),
    )
    .await
    .unwrap();

    assert_eq!(found, stored);
    assert_eq!(store.recorded_count(), 2);
}

#[tokio::test]
async fn cancelled_token_issues_no_reads() {
    let (store, _) = mapper_with_store();
    let cancel = CancellationToken::new();
    cancel.cancel();
    let mapper = Mapper::new(store.clone(), "orders").with_cancellation(cancel);

    let err = read_by_key::<Order, _>(
        &mapper,
        &Key::new("o-1"),
        ReadClass::IndexTolerant,
        &fast_config(),
    )
    .await
    .unwrap_err();

    assert_eq!(err, Error::Cancelled);
    assert_eq!(store.recorded_count(), 0);
}

#[tokio::test]
async fn create_then_verify_returns_the_stored_state() {
    let (store, mapper) = mapper_with_store();
    let record = order("o-1", "open", 100, 0);
    let stored = order("o-1", "open", 100, 1);
    store.script_put(Ok(()));
    store.script_get(Ok(None));
    store.script_get(Ok(Some(order_item(&stored))));

    let verified = create_then_verify(&mapper, &record, &Key::new("o-1"), &fast_config())
        .await
        .unwrap();
    assert_eq!(verified, stored);

    let recorded = store.recorded.lock().unwrap();
    let Recorded::Put(request) = &recorded[0] else {
        panic!("expected a put request");
    };
    // Creates assert absence and force the stored version to 1.
    let condition = request.condition.expression.as_deref().unwrap();
    assert!(condition.contains("attribute_not_exists"));
    assert_eq!(
        request.item.get("version"),
        Some(&aws_sdk_dynamodb::types::AttributeValue::N("1".to_string()))
    );
}

#[tokio::test]
async fn update_then_verify_rejects_stale_reads() {
    let (store, mapper) = mapper_with_store();
    let record = order("o-1", "shipped", 100, 2);
    let stale = order("o-1", "open", 100, 2);
    let fresh = order("o-1", "shipped", 100, 3);
    store.script_put(Ok(()));
    store.script_get(Ok(Some(order_item(&stale))));
    store.script_get(Ok(Some(order_item(&fresh))));

    let verified = update_then_verify(
        &mapper,
        &record,
        &Key::new("o-1"),
        |read: &Order| read.status == "shipped",
        &fast_config(),
    )
    .await
    .unwrap();

    assert_eq!(verified, fresh);
    assert_eq!(store.recorded_count(), 3);
}

#[tokio::test]
async fn save_condition_failure_surfaces_as_condition_failed_for_versioned() {
    let (store, mapper) = mapper_with_store();
    let record = order("o-1", "shipped", 100, 2);
    store.script_put(Err(Error::ConditionFailed {
        entity_type: "item",
        id: String::new(),
    }));

    let err = update_then_verify(
        &mapper,
        &record,
        &Key::new("o-1"),
        |_: &Order| true,
        &fast_config(),
    )
    .await
    .unwrap_err();

    assert_eq!(
        err,
        Error::ConditionFailed {
            entity_type: "Order",
            id: "o-1".to_string(),
        }
    );
    assert_eq!(store.recorded_count(), 1);
}

#[tokio::test]
async fn query_with_retry_reruns_the_whole_query() {
    let (store, mapper) = mapper_with_store();
    let stored = order("o-1", "open", 100, 1);
    store.script_query(Ok(PageOutput::default()));
    store.script_query(Ok(PageOutput {
        items: vec![order_item(&stored)],
        last_evaluated_key: None,
    }));

    let query = mapper
        .query::<Order>()
        .unwrap()
        .where_key("pk", Operator::Eq, [Value::from("o-1")]);

    let items = query_with_retry(
        &mapper,
        &query,
        |items: &[Order]| !items.is_empty(),
        &fast_config(),
    )
    .await
    .unwrap();

    assert_eq!(items, vec![stored]);
    assert_eq!(store.recorded_count(), 2);
}
