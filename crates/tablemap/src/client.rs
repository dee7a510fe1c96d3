//! Store client abstraction.
//!
//! Higher layers talk to the table through [`StoreClient`] rather than the
//! SDK directly, so query planning, retries, and mapping stay testable
//! against scripted fakes.

use async_trait::async_trait;
use std::collections::HashMap;

use aws_sdk_dynamodb::types::AttributeValue;
use tablemap_core::Result;

use crate::Item;

/// Compiled condition attached to a write.
#[derive(Debug, Clone, Default)]
pub struct ConditionExpr {
    pub expression: Option<String>,
    pub names: HashMap<String, String>,
    pub values: HashMap<String, AttributeValue>,
}

#[derive(Debug, Clone)]
pub struct GetRequest {
    pub table: String,
    pub key: Item,
    pub consistent_read: bool,
    pub projection_expression: Option<String>,
    pub names: HashMap<String, String>,
}

#[derive(Debug, Clone)]
pub struct PutRequest {
    pub table: String,
    pub item: Item,
    pub condition: ConditionExpr,
}

#[derive(Debug, Clone)]
pub struct UpdateRequest {
    pub table: String,
    pub key: Item,
    pub update_expression: String,
    pub condition_expression: Option<String>,
    pub names: HashMap<String, String>,
    pub values: HashMap<String, AttributeValue>,
}

#[derive(Debug, Clone)]
pub struct DeleteRequest {
    pub table: String,
    pub key: Item,
    pub condition: ConditionExpr,
}

/// A single query or scan page request. `key_condition_expression` is
/// `None` for scans.
#[derive(Debug, Clone)]
pub struct QueryRequest {
    pub table: String,
    pub index: Option<String>,
    pub key_condition_expression: Option<String>,
    pub filter_expression: Option<String>,
    pub projection_expression: Option<String>,
    pub names: HashMap<String, String>,
    pub values: HashMap<String, AttributeValue>,
    pub limit: Option<i32>,
    pub scan_forward: bool,
    pub consistent_read: bool,
    pub exclusive_start_key: Option<Item>,
}

/// One page of query or scan results.
#[derive(Debug, Clone, Default)]
pub struct PageOutput {
    pub items: Vec<Item>,
    pub last_evaluated_key: Option<Item>,
}

/// A write inside a batch. Batches carry no conditions.
#[derive(Debug, Clone)]
pub enum BatchWrite {
    Put(Item),
    Delete(Item),
}

#[derive(Debug, Clone)]
pub struct BatchWriteRequest {
    pub table: String,
    pub writes: Vec<BatchWrite>,
}

#[derive(Debug, Clone, Default)]
pub struct BatchWriteOutput {
    pub unprocessed: Vec<BatchWrite>,
}

#[derive(Debug, Clone)]
pub struct BatchGetRequest {
    pub table: String,
    pub keys: Vec<Item>,
    pub consistent_read: bool,
}

#[derive(Debug, Clone, Default)]
pub struct BatchGetOutput {
    pub items: Vec<Item>,
    pub unprocessed_keys: Vec<Item>,
}

/// One operation inside an atomic transaction.
#[derive(Debug, Clone)]
pub enum TransactItem {
    Put {
        item: Item,
        condition: ConditionExpr,
    },
    Update {
        key: Item,
        update_expression: String,
        condition_expression: Option<String>,
        names: HashMap<String, String>,
        values: HashMap<String, AttributeValue>,
    },
    Delete {
        key: Item,
        condition: ConditionExpr,
    },
    ConditionCheck {
        key: Item,
        condition: ConditionExpr,
    },
}

#[derive(Debug, Clone)]
pub struct TransactWriteRequest {
    pub table: String,
    pub items: Vec<TransactItem>,
}

/// The operations the mapper needs from a table store.
#[async_trait]
pub trait StoreClient: Send + Sync {
    async fn get_item(&self, request: GetRequest) -> Result<Option<Item>>;
    async fn put_item(&self, request: PutRequest) -> Result<()>;
    async fn update_item(&self, request: UpdateRequest) -> Result<()>;
    async fn delete_item(&self, request: DeleteRequest) -> Result<()>;
    async fn query_page(&self, request: QueryRequest) -> Result<PageOutput>;
    async fn batch_write(&self, request: BatchWriteRequest) -> Result<BatchWriteOutput>;
    async fn batch_get(&self, request: BatchGetRequest) -> Result<BatchGetOutput>;
    async fn transact_write(&self, request: TransactWriteRequest) -> Result<()>;
}
