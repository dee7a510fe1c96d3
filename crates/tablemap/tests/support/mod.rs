//! Shared fixtures: a scripted in-memory store plus test record types.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use tablemap::client::{
    BatchGetOutput, BatchGetRequest, BatchWriteOutput, BatchWriteRequest, DeleteRequest,
    GetRequest, PageOutput, PutRequest, QueryRequest, StoreClient, TransactWriteRequest,
    UpdateRequest,
};
use tablemap::{Attribute, Document, IndexDef, Item, Model, Result, Schema, Value};

/// Everything the mapper sent to the store, in order.
#[derive(Debug)]
pub enum Recorded {
    Get(GetRequest),
    Put(PutRequest),
    Update(UpdateRequest),
    Delete(DeleteRequest),
    Query(QueryRequest),
    BatchWrite(BatchWriteRequest),
    BatchGet(BatchGetRequest),
    Transact(TransactWriteRequest),
}

/// Store double driven by scripted responses. Each operation pops the next
/// scripted result; an empty script yields a benign default.
#[derive(Default)]
pub struct FakeStore {
    pub recorded: Mutex<Vec<Recorded>>,
    get_results: Mutex<VecDeque<Result<Option<Item>>>>,
    put_results: Mutex<VecDeque<Result<()>>>,
    update_results: Mutex<VecDeque<Result<()>>>,
    delete_results: Mutex<VecDeque<Result<()>>>,
    query_results: Mutex<VecDeque<Result<PageOutput>>>,
    batch_write_results: Mutex<VecDeque<Result<BatchWriteOutput>>>,
    batch_get_results: Mutex<VecDeque<Result<BatchGetOutput>>>,
    transact_results: Mutex<VecDeque<Result<()>>>,
}

impl FakeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script_get(&self, result: Result<Option<Item>>) {
        self.get_results.lock().unwrap().push_back(result);
    }

    pub fn script_put(&self, result: Result<()>) {
        self.put_results.lock().unwrap().push_back(result);
    }

    pub fn script_update(&self, result: Result<()>) {
        self.update_results.lock().unwrap().push_back(result);
    }

    pub fn script_delete(&self, result: Result<()>) {
        self.delete_results.lock().unwrap().push_back(result);
    }

    pub fn script_query(&self, result: Result<PageOutput>) {
        self.query_results.lock().unwrap().push_back(result);
    }

    pub fn script_batch_write(&self, result: Result<BatchWriteOutput>) {
        self.batch_write_results.lock().unwrap().push_back(result);
    }

    pub fn script_batch_get(&self, result: Result<BatchGetOutput>) {
        self.batch_get_results.lock().unwrap().push_back(result);
    }

    pub fn script_transact(&self, result: Result<()>) {
        self.transact_results.lock().unwrap().push_back(result);
    }

    pub fn recorded_count(&self) -> usize {
        self.recorded.lock().unwrap().len()
    }

    fn record(&self, entry: Recorded) {
        self.recorded.lock().unwrap().push(entry);
    }

    fn pop<T>(queue: &Mutex<VecDeque<Result<T>>>, default: impl FnOnce() -> T) -> Result<T> {
        queue
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(default()))
    }
}

#[async_trait]
impl StoreClient for FakeStore {
    async fn get_item(&self, request: GetRequest) -> Result<Option<Item>> {
        self.record(Recorded::Get(request));
        Self::pop(&self.get_results, || None)
    }

    async fn put_item(&self, request: PutRequest) -> Result<()> {
        self.record(Recorded::Put(request));
        Self::pop(&self.put_results, || ())
    }

    async fn update_item(&self, request: UpdateRequest) -> Result<()> {
        self.record(Recorded::Update(request));
        Self::pop(&self.update_results, || ())
    }

    async fn delete_item(&self, request: DeleteRequest) -> Result<()> {
        self.record(Recorded::Delete(request));
        Self::pop(&self.delete_results, || ())
    }

    async fn query_page(&self, request: QueryRequest) -> Result<PageOutput> {
        self.record(Recorded::Query(request));
        Self::pop(&self.query_results, PageOutput::default)
    }

    async fn batch_write(&self, request: BatchWriteRequest) -> Result<BatchWriteOutput> {
        self.record(Recorded::BatchWrite(request));
        Self::pop(&self.batch_write_results, BatchWriteOutput::default)
    }

    async fn batch_get(&self, request: BatchGetRequest) -> Result<BatchGetOutput> {
        self.record(Recorded::BatchGet(request));
        Self::pop(&self.batch_get_results, BatchGetOutput::default)
    }

    async fn transact_write(&self, request: TransactWriteRequest) -> Result<()> {
        self.record(Recorded::Transact(request));
        Self::pop(&self.transact_results, || ())
    }
}

/// Versioned record with a secondary index on status.
#[derive(Debug, Clone, PartialEq)]
pub struct Order {
    pub id: String,
    pub status: String,
    pub total: i64,
    pub created_at: String,
    pub version: i64,
}

impl Model for Order {
    fn schema() -> Result<Schema> {
        Schema::builder("Order")
            .attribute(Attribute::string("pk").field("id"))
            .attribute(Attribute::string("status"))
            .attribute(Attribute::number("total"))
            .attribute(Attribute::string("createdAt").field("created_at"))
            .attribute(Attribute::number("version"))
            .partition_key("pk")
            .version("version")
            .index(IndexDef::new("status-index", "status").sort("createdAt"))
            .build()
    }

    fn to_document(&self) -> Document {
        let mut doc = Document::new();
        doc.insert("id", Value::from(self.id.as_str()));
        doc.insert("status", Value::from(self.status.as_str()));
        doc.insert("total", Value::from_i64(self.total));
        doc.insert("created_at", Value::from(self.created_at.as_str()));
        doc.insert("version", Value::from_i64(self.version));
        doc
    }

    fn from_document(doc: &Document) -> Result<Self> {
        Ok(Order {
            id: doc.string("id")?,
            status: doc.string("status")?,
            total: doc.i64("total")?,
            created_at: doc.string("created_at")?,
            version: doc.i64("version")?,
        })
    }
}

/// Unversioned record without indexes.
#[derive(Debug, Clone, PartialEq)]
pub struct Note {
    pub id: String,
    pub body: String,
}

impl Model for Note {
    fn schema() -> Result<Schema> {
        Schema::builder("Note")
            .attribute(Attribute::string("pk").field("id"))
            .attribute(Attribute::string("body"))
            .partition_key("pk")
            .build()
    }

    fn to_document(&self) -> Document {
        let mut doc = Document::new();
        doc.insert("id", Value::from(self.id.as_str()));
        doc.insert("body", Value::from(self.body.as_str()));
        doc
    }

    fn from_document(doc: &Document) -> Result<Self> {
        Ok(Note {
            id: doc.string("id")?,
            body: doc.string("body")?,
        })
    }
}

pub fn order(id: &str, status: &str, total: i64, version: i64) -> Order {
    Order {
        id: id.to_string(),
        status: status.to_string(),
        total,
        created_at: "2024-06-01T00:00:00Z".to_string(),
        version,
    }
}

/// Order with a generated id and a current timestamp.
pub fn fresh_order(status: &str, total: i64) -> Order {
    Order {
        id: uuid::Uuid::new_v4().to_string(),
        status: status.to_string(),
        total,
        created_at: chrono::Utc::now().to_rfc3339(),
        version: 0,
    }
}

pub fn order_item(order: &Order) -> Item {
    use aws_sdk_dynamodb::types::AttributeValue;
    let mut item = Item::new();
    item.insert("pk".to_string(), AttributeValue::S(order.id.clone()));
    item.insert("status".to_string(), AttributeValue::S(order.status.clone()));
    item.insert("total".to_string(), AttributeValue::N(order.total.to_string()));
    item.insert(
        "createdAt".to_string(),
        AttributeValue::S(order.created_at.clone()),
    );
    item.insert(
        "version".to_string(),
        AttributeValue::N(order.version.to_string()),
    );
    item
}

pub fn key_of(order: &Order) -> Item {
    use aws_sdk_dynamodb::types::AttributeValue;
    let mut key = Item::new();
    key.insert("pk".to_string(), AttributeValue::S(order.id.clone()));
    key
}
