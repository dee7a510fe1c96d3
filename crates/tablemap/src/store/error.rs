//! DynamoDB error mapping.
//!
//! Maps AWS SDK errors to `tablemap_core::Error`. Conditional-check
//! failures come back without entity context; the mapper attaches the
//! entity type and id before surfacing them.

use std::fmt::Debug;

use aws_sdk_dynamodb::error::SdkError;
use aws_sdk_dynamodb::operation::batch_get_item::BatchGetItemError;
use aws_sdk_dynamodb::operation::batch_write_item::BatchWriteItemError;
use aws_sdk_dynamodb::operation::delete_item::DeleteItemError;
use aws_sdk_dynamodb::operation::get_item::GetItemError;
use aws_sdk_dynamodb::operation::put_item::PutItemError;
use aws_sdk_dynamodb::operation::query::QueryError;
use aws_sdk_dynamodb::operation::scan::ScanError;
use aws_sdk_dynamodb::operation::transact_write_items::TransactWriteItemsError;
use aws_sdk_dynamodb::operation::update_item::UpdateItemError;
use tablemap_core::Error;

fn condition_failed() -> Error {
    Error::ConditionFailed {
        entity_type: "item",
        id: String::new(),
    }
}

/// Map a GetItem SDK error.
pub fn map_get_item_error<R: Debug + Send + Sync + 'static>(
    err: SdkError<GetItemError, R>,
) -> Error {
    match err.into_service_error() {
        GetItemError::ResourceNotFoundException(_) => Error::Store("Table not found".to_string()),
        GetItemError::ProvisionedThroughputExceededException(_) => {
            Error::Store("Throughput exceeded, please retry".to_string())
        }
        GetItemError::RequestLimitExceeded(_) => {
            Error::Store("Request limit exceeded, please retry".to_string())
        }
        GetItemError::InternalServerError(_) => {
            Error::Store("DynamoDB internal server error".to_string())
        }
        err => Error::Store(format!("GetItem failed: {:?}", err)),
    }
}

/// Map a Query SDK error.
pub fn map_query_error<R: Debug + Send + Sync + 'static>(err: SdkError<QueryError, R>) -> Error {
    match err.into_service_error() {
        QueryError::ResourceNotFoundException(_) => Error::Store("Table not found".to_string()),
        QueryError::ProvisionedThroughputExceededException(_) => {
            Error::Store("Throughput exceeded, please retry".to_string())
        }
        QueryError::RequestLimitExceeded(_) => {
            Error::Store("Request limit exceeded, please retry".to_string())
        }
        QueryError::InternalServerError(_) => {
            Error::Store("DynamoDB internal server error".to_string())
        }
        err => Error::Store(format!("Query failed: {:?}", err)),
    }
}

/// Map a Scan SDK error.
pub fn map_scan_error<R: Debug + Send + Sync + 'static>(err: SdkError<ScanError, R>) -> Error {
    match err.into_service_error() {
        ScanError::ResourceNotFoundException(_) => Error::Store("Table not found".to_string()),
        ScanError::ProvisionedThroughputExceededException(_) => {
            Error::Store("Throughput exceeded, please retry".to_string())
        }
        ScanError::RequestLimitExceeded(_) => {
            Error::Store("Request limit exceeded, please retry".to_string())
        }
        ScanError::InternalServerError(_) => {
            Error::Store("DynamoDB internal server error".to_string())
        }
        err => Error::Store(format!("Scan failed: {:?}", err)),
    }
}

/// Map a PutItem SDK error.
pub fn map_put_item_error<R: Debug + Send + Sync + 'static>(
    err: SdkError<PutItemError, R>,
) -> Error {
    match err.into_service_error() {
        PutItemError::ConditionalCheckFailedException(_) => condition_failed(),
        PutItemError::ResourceNotFoundException(_) => Error::Store("Table not found".to_string()),
        PutItemError::ProvisionedThroughputExceededException(_) => {
            Error::Store("Throughput exceeded, please retry".to_string())
        }
        PutItemError::RequestLimitExceeded(_) => {
            Error::Store("Request limit exceeded, please retry".to_string())
        }
        PutItemError::ItemCollectionSizeLimitExceededException(_) => {
            Error::Store("Item collection size limit exceeded".to_string())
        }
        PutItemError::TransactionConflictException(_) => {
            Error::Store("Transaction conflict, please retry".to_string())
        }
        PutItemError::InternalServerError(_) => {
            Error::Store("DynamoDB internal server error".to_string())
        }
        err => Error::Store(format!("PutItem failed: {:?}", err)),
    }
}

/// Map an UpdateItem SDK error.
pub fn map_update_item_error<R: Debug + Send + Sync + 'static>(
    err: SdkError<UpdateItemError, R>,
) -> Error {
    match err.into_service_error() {
        UpdateItemError::ConditionalCheckFailedException(_) => condition_failed(),
        UpdateItemError::ResourceNotFoundException(_) => {
            Error::Store("Table not found".to_string())
        }
        UpdateItemError::ProvisionedThroughputExceededException(_) => {
            Error::Store("Throughput exceeded, please retry".to_string())
        }
        UpdateItemError::RequestLimitExceeded(_) => {
            Error::Store("Request limit exceeded, please retry".to_string())
        }
        UpdateItemError::ItemCollectionSizeLimitExceededException(_) => {
            Error::Store("Item collection size limit exceeded".to_string())
        }
        UpdateItemError::TransactionConflictException(_) => {
            Error::Store("Transaction conflict, please retry".to_string())
        }
        UpdateItemError::InternalServerError(_) => {
            Error::Store("DynamoDB internal server error".to_string())
        }
        err => Error::Store(format!("UpdateItem failed: {:?}", err)),
    }
}

/// Map a DeleteItem SDK error.
pub fn map_delete_item_error<R: Debug + Send + Sync + 'static>(
    err: SdkError<DeleteItemError, R>,
) -> Error {
    match err.into_service_error() {
        DeleteItemError::ConditionalCheckFailedException(_) => condition_failed(),
        DeleteItemError::ResourceNotFoundException(_) => {
            Error::Store("Table not found".to_string())
        }
        DeleteItemError::ProvisionedThroughputExceededException(_) => {
            Error::Store("Throughput exceeded, please retry".to_string())
        }
        DeleteItemError::RequestLimitExceeded(_) => {
            Error::Store("Request limit exceeded, please retry".to_string())
        }
        DeleteItemError::ItemCollectionSizeLimitExceededException(_) => {
            Error::Store("Item collection size limit exceeded".to_string())
        }
        DeleteItemError::TransactionConflictException(_) => {
            Error::Store("Transaction conflict, please retry".to_string())
        }
        DeleteItemError::InternalServerError(_) => {
            Error::Store("DynamoDB internal server error".to_string())
        }
        err => Error::Store(format!("DeleteItem failed: {:?}", err)),
    }
}

/// Map a BatchWriteItem SDK error.
pub fn map_batch_write_error<R: Debug + Send + Sync + 'static>(
    err: SdkError<BatchWriteItemError, R>,
) -> Error {
    match err.into_service_error() {
        BatchWriteItemError::ResourceNotFoundException(_) => {
            Error::Store("Table not found".to_string())
        }
        BatchWriteItemError::ProvisionedThroughputExceededException(_) => {
            Error::Store("Throughput exceeded, please retry".to_string())
        }
        BatchWriteItemError::RequestLimitExceeded(_) => {
            Error::Store("Request limit exceeded, please retry".to_string())
        }
        BatchWriteItemError::ItemCollectionSizeLimitExceededException(_) => {
            Error::Store("Item collection size limit exceeded".to_string())
        }
        BatchWriteItemError::InternalServerError(_) => {
            Error::Store("DynamoDB internal server error".to_string())
        }
        err => Error::Store(format!("BatchWriteItem failed: {:?}", err)),
    }
}

/// Map a BatchGetItem SDK error.
pub fn map_batch_get_error<R: Debug + Send + Sync + 'static>(
    err: SdkError<BatchGetItemError, R>,
) -> Error {
    match err.into_service_error() {
        BatchGetItemError::ResourceNotFoundException(_) => {
            Error::Store("Table not found".to_string())
        }
        BatchGetItemError::ProvisionedThroughputExceededException(_) => {
            Error::Store("Throughput exceeded, please retry".to_string())
        }
        BatchGetItemError::RequestLimitExceeded(_) => {
            Error::Store("Request limit exceeded, please retry".to_string())
        }
        BatchGetItemError::InternalServerError(_) => {
            Error::Store("DynamoDB internal server error".to_string())
        }
        err => Error::Store(format!("BatchGetItem failed: {:?}", err)),
    }
}

/// Map a TransactWriteItems SDK error. Cancellation carries the per-item
/// reasons so callers can see which condition failed.
pub fn map_transact_write_error<R: Debug + Send + Sync + 'static>(
    err: SdkError<TransactWriteItemsError, R>,
) -> Error {
    match err.into_service_error() {
        TransactWriteItemsError::TransactionCanceledException(e) => {
            let reasons = e
                .cancellation_reasons()
                .iter()
                .map(|r| r.code().unwrap_or("None").to_string())
                .collect::<Vec<_>>()
                .join(", ");
            Error::TransactionCanceled(reasons)
        }
        TransactWriteItemsError::ResourceNotFoundException(_) => {
            Error::Store("Table not found".to_string())
        }
        TransactWriteItemsError::ProvisionedThroughputExceededException(_) => {
            Error::Store("Throughput exceeded, please retry".to_string())
        }
        TransactWriteItemsError::RequestLimitExceeded(_) => {
            Error::Store("Request limit exceeded, please retry".to_string())
        }
        TransactWriteItemsError::TransactionInProgressException(_) => {
            Error::Store("Transaction already in progress".to_string())
        }
        TransactWriteItemsError::IdempotentParameterMismatchException(_) => {
            Error::Store("Idempotent parameter mismatch".to_string())
        }
        TransactWriteItemsError::InternalServerError(_) => {
            Error::Store("DynamoDB internal server error".to_string())
        }
        err => Error::Store(format!("TransactWriteItems failed: {:?}", err)),
    }
}
