//! DynamoDB data mapper: schema-driven attribute codec, expression
//! building with opaque cursor pagination, typed CRUD with optimistic
//! versioning, batches, transactions, and read-consistency strategies.
//!
//! The store is reached through the [`client::StoreClient`] trait;
//! [`store::DynamoStore`] is the `aws-sdk-dynamodb` implementation.

pub mod batch;
pub mod client;
pub mod codec;
pub mod consistency;
pub mod crypto;
pub mod cursor;
pub mod expr;
pub mod mapper;
pub mod query;
pub mod store;
pub mod transaction;

use std::collections::HashMap;

use aws_sdk_dynamodb::types::AttributeValue;

/// Wire form of one stored item.
pub type Item = HashMap<String, AttributeValue>;

pub use batch::BatchBuilder;
pub use consistency::{read_by_key, ReadClass};
pub use crypto::FieldCipher;
pub use cursor::Cursor;
pub use expr::{ExprBuilder, Operator};
pub use mapper::{Key, Mapper};
pub use query::{Page, Query, SortOrder};
pub use store::DynamoStore;
pub use transaction::TransactionBuilder;

pub use tablemap_core::{
    retry::RetryConfig, AttrKind, Attribute, Document, Error, IndexDef, Model, Projection, Result,
    Schema, Value,
};
