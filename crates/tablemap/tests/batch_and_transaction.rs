//! Batch chunking, unprocessed retries, and atomic transactions.

mod support;

use std::sync::Arc;
use std::time::Duration;

use tablemap::client::{BatchGetOutput, BatchWrite, BatchWriteOutput, TransactItem};
use tablemap::{Error, Key, Mapper, Operator, RetryConfig, Value};

use support::{fresh_order, key_of, order, order_item, FakeStore, Note, Order, Recorded};

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
async fn batch_writes_are_chunked_at_twenty_five() {
    let (store, mapper) = mapper_with_store();

    let mut batch = mapper.batch();
    for i in 0..30 {
        batch = batch
            .put(&order(&format!("o-{i}"), "open", i, 1))
            .unwrap();
    }
    assert_eq!(batch.len(), 30);
    batch.execute().await.unwrap();

    let recorded = store.recorded.lock().unwrap();
    assert_eq!(recorded.len(), 2);
    let Recorded::BatchWrite(first) = &recorded[0] else {
        panic!("expected a batch write");
    };
    let Recorded::BatchWrite(second) = &recorded[1] else {
        panic!("expected a batch write");
    };
    assert_eq!(first.writes.len(), 25);
    assert_eq!(second.writes.len(), 5);
}

#[tokio::test]
async fn batch_mixes_puts_and_deletes() {
    let (store, mapper) = mapper_with_store();

    mapper
        .batch()
        .put(&order("o-1", "open", 100, 1))
        .unwrap()
        .delete::<Order>(&Key::new("o-2"))
        .unwrap()
        .execute()
        .await
        .unwrap();

    let recorded = store.recorded.lock().unwrap();
    let Recorded::BatchWrite(request) = &recorded[0] else {
        panic!("expected a batch write");
    };
    assert!(matches!(request.writes[0], BatchWrite::Put(_)));
    assert!(matches!(request.writes[1], BatchWrite::Delete(_)));
}

#[tokio::test]
async fn unprocessed_writes_are_retried() {
    let (store, mapper) = mapper_with_store();
    let leftover = order("o-2", "open", 50, 1);
    store.script_batch_write(Ok(BatchWriteOutput {
        unprocessed: vec![BatchWrite::Put(order_item(&leftover))],
    }));
    store.script_batch_write(Ok(BatchWriteOutput::default()));

    mapper
        .batch()
        .retry_config(fast_config())
        .put(&order("o-1", "open", 100, 1))
        .unwrap()
        .put(&leftover)
        .unwrap()
        .execute()
        .await
        .unwrap();

    let recorded = store.recorded.lock().unwrap();
    assert_eq!(recorded.len(), 2);
    let Recorded::BatchWrite(retry) = &recorded[1] else {
        panic!("expected a batch write");
    };
    assert_eq!(retry.writes.len(), 1);
}

#[tokio::test]
async fn unprocessed_writes_exhaust_the_budget() {
    let (store, mapper) = mapper_with_store();
    let stuck = order("o-1", "open", 100, 1);
    for _ in 0..3 {
        store.script_batch_write(Ok(BatchWriteOutput {
            unprocessed: vec![BatchWrite::Put(order_item(&stuck))],
        }));
    }

    let err = mapper
        .batch()
        .retry_config(fast_config())
        .put(&stuck)
        .unwrap()
        .execute()
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Store(_)));
}

#[tokio::test]
async fn execute_remaining_reports_leftovers_per_item() {
    let (store, mapper) = mapper_with_store();
    let stuck = order("o-1", "open", 100, 1);
    for _ in 0..3 {
        store.script_batch_write(Ok(BatchWriteOutput {
            unprocessed: vec![BatchWrite::Put(order_item(&stuck))],
        }));
    }

    let leftover = mapper
        .batch()
        .retry_config(fast_config())
        .put(&stuck)
        .unwrap()
        .put(&order("o-2", "open", 50, 1))
        .unwrap()
        .execute_remaining()
        .await
        .unwrap();

    assert_eq!(leftover.len(), 1);
    assert!(matches!(leftover[0], BatchWrite::Put(_)));
}

#[tokio::test]
async fn get_many_decodes_and_retries_unprocessed_keys() {
    let (store, mapper) = mapper_with_store();
    let first = order("o-1", "open", 100, 1);
    let second = order("o-2", "shipped", 250, 2);
    store.script_batch_get(Ok(BatchGetOutput {
        items: vec![order_item(&first)],
        unprocessed_keys: vec![key_of(&second)],
    }));
    store.script_batch_get(Ok(BatchGetOutput {
        items: vec![order_item(&second)],
        unprocessed_keys: vec![],
    }));

    let records: Vec<Order> = mapper
        .batch()
        .retry_config(fast_config())
        .get_many(&[Key::new("o-1"), Key::new("o-2")], false)
        .await
        .unwrap();

    assert_eq!(records, vec![first, second]);
    assert_eq!(store.recorded_count(), 2);
}

#[tokio::test]
async fn cancelled_batch_issues_no_requests() {
    let (store, _) = mapper_with_store();
    let cancel = tokio_util::sync::CancellationToken::new();
    cancel.cancel();
    let mapper = Mapper::new(store.clone(), "orders").with_cancellation(cancel);

    let err = mapper
        .batch()
        .put(&order("o-1", "open", 100, 1))
        .unwrap()
        .execute()
        .await
        .unwrap_err();
    assert_eq!(err, Error::Cancelled);
    assert_eq!(store.recorded_count(), 0);
}

#[tokio::test]
async fn transaction_collects_all_operation_kinds() {
    let (store, mapper) = mapper_with_store();

    mapper
        .transact()
        .create(&order("o-1", "open", 100, 0))
        .unwrap()
        .update::<Order, _>(&Key::new("o-2"), |update| {
            update.update_set("status", &Value::from("shipped"))
        })
        .unwrap()
        .delete::<Order>(&Key::new("o-3"))
        .unwrap()
        .condition_check::<Note>(
            &Key::new("n-1"),
            "body",
            Operator::Eq,
            &[Value::from("approved")],
        )
        .unwrap()
        .execute()
        .await
        .unwrap();

    let recorded = store.recorded.lock().unwrap();
    let Recorded::Transact(request) = &recorded[0] else {
        panic!("expected a transaction");
    };
    assert_eq!(request.items.len(), 4);

    let TransactItem::Put { condition, .. } = &request.items[0] else {
        panic!("expected a put");
    };
    assert!(condition
        .expression
        .as_deref()
        .unwrap()
        .contains("attribute_not_exists"));

    let TransactItem::Update {
        update_expression,
        condition_expression,
        ..
    } = &request.items[1]
    else {
        panic!("expected an update");
    };
    // Versioned records get their version bumped inside the transaction.
    assert!(update_expression.contains("SET"));
    assert!(update_expression.contains("ADD"));
    assert!(condition_expression
        .as_deref()
        .unwrap()
        .contains("attribute_exists"));

    assert!(matches!(request.items[2], TransactItem::Delete { .. }));
    assert!(matches!(
        request.items[3],
        TransactItem::ConditionCheck { .. }
    ));
}

#[tokio::test]
async fn empty_transaction_is_rejected() {
    let (store, mapper) = mapper_with_store();
    let err = mapper.transact().execute().await.unwrap_err();
    assert!(matches!(err, Error::InvalidOperator(_)));
    assert_eq!(store.recorded_count(), 0);
}

#[tokio::test]
async fn oversized_transaction_is_rejected() {
    let (store, mapper) = mapper_with_store();
    let mut transaction = mapper.transact();
    for i in 0..101 {
        transaction = transaction
            .put(&order(&format!("o-{i}"), "open", i, 1))
            .unwrap();
    }
    let err = transaction.execute().await.unwrap_err();
    assert!(matches!(err, Error::InvalidOperator(_)));
    assert_eq!(store.recorded_count(), 0);
}

#[tokio::test]
async fn transaction_cancellation_reasons_surface() {
    let (store, mapper) = mapper_with_store();
    store.script_transact(Err(Error::TransactionCanceled(
        "ConditionalCheckFailed, None".to_string(),
    )));

    let err = mapper
        .transact()
        .create(&order("o-1", "open", 100, 0))
        .unwrap()
        .execute()
        .await
        .unwrap_err();
    assert!(matches!(err, Error::TransactionCanceled(_)));
}

#[tokio::test]
async fn crud_lifecycle_against_scripted_store() {
    let (store, mapper) = mapper_with_store();
    let record = fresh_order("open", 100);
    let key = Key::new(record.id.as_str());

    mapper.create(&record).await.unwrap();
    mapper
        .update::<Order, _>(&key, |update| {
            update.update_set("status", &Value::from("shipped"))
        })
        .await
        .unwrap();
    mapper.delete::<Order>(&key).await.unwrap();

    let recorded = store.recorded.lock().unwrap();
    assert!(matches!(recorded[0], Recorded::Put(_)));
    assert!(matches!(recorded[1], Recorded::Update(_)));
    assert!(matches!(recorded[2], Recorded::Delete(_)));
}

#[tokio::test]
async fn delete_of_missing_item_maps_to_not_found() {
    let (store, mapper) = mapper_with_store();
    store.script_delete(Err(Error::ConditionFailed {
        entity_type: "item",
        id: String::new(),
    }));

    let err = mapper.delete::<Order>(&Key::new("o-1")).await.unwrap_err();
    assert_eq!(
        err,
        Error::ItemNotFound {
            entity_type: "Order",
            id: "o-1".to_string(),
        }
    );
}

#[tokio::test]
async fn create_of_existing_item_stays_condition_failed() {
    let (store, mapper) = mapper_with_store();
    store.script_put(Err(Error::ConditionFailed {
        entity_type: "item",
        id: String::new(),
    }));

    let err = mapper.create(&order("o-1", "open", 100, 0)).await.unwrap_err();
    assert_eq!(
        err,
        Error::ConditionFailed {
            entity_type: "Order",
            id: "o-1".to_string(),
        }
    );
}
