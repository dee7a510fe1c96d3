//! Record-level operations over a single table.
//!
//! The [`Mapper`] owns the store client, table name, and optional field
//! cipher, and exposes typed CRUD plus entry points into queries, batches,
//! and transactions. Versioned records get optimistic concurrency: creates
//! assert absence, saves assert the stored version, and every successful
//! write bumps the version by one.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use tablemap_core::schema::{self, Schema};
use tablemap_core::value::Value;
use tablemap_core::{Error, Model, Result};

use crate::batch::BatchBuilder;
use crate::client::{ConditionExpr, DeleteRequest, GetRequest, PutRequest, StoreClient, UpdateRequest};
use crate::codec::{decode_item, encode_dynamic, encode_item};
use crate::crypto::FieldCipher;
use crate::expr::{ExprBuilder, Operator};
use crate::query::Query;
use crate::transaction::TransactionBuilder;
use crate::Item;

/// Primary key of one record.
#[derive(Debug, Clone, PartialEq)]
pub struct Key {
    pub partition: Value,
    pub sort: Option<Value>,
}

impl Key {
    pub fn new(partition: impl Into<Value>) -> Self {
        Self {
            partition: partition.into(),
            sort: None,
        }
    }

    pub fn with_sort(partition: impl Into<Value>, sort: impl Into<Value>) -> Self {
        Self {
            partition: partition.into(),
            sort: Some(sort.into()),
        }
    }

    /// Human-readable form used in error context.
    pub fn display(&self) -> String {
        let partition = value_display(&self.partition);
        match &self.sort {
            Some(sort) => format!("{partition}/{}", value_display(sort)),
            None => partition,
        }
    }
}

fn value_display(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.clone(),
        other => format!("{other:?}"),
    }
}

/// Typed mapper over one table.
pub struct Mapper<C: StoreClient + ?Sized> {
    client: Arc<C>,
    table: String,
    cipher: Option<Arc<dyn FieldCipher>>,
    cancel: CancellationToken,
}

impl<C: StoreClient + ?Sized> Mapper<C> {
    pub fn new(client: Arc<C>, table: impl Into<String>) -> Self {
        Self {
            client,
            table: table.into(),
            cipher: None,
            cancel: CancellationToken::new(),
        }
    }

    /// Installs the cipher used for attributes marked encrypted.
    pub fn with_cipher(mut self, cipher: Arc<dyn FieldCipher>) -> Self {
        self.cipher = Some(cipher);
        self
    }

    /// Ties long-running operations to an external cancellation token.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub(crate) fn client(&self) -> &Arc<C> {
        &self.client
    }

    pub(crate) fn cipher(&self) -> Option<&dyn FieldCipher> {
        self.cipher.as_deref()
    }

    /// Encodes a [`Key`] into wire form, validating arity against the schema.
    pub(crate) fn key_item(&self, schema: &Schema, key: &Key) -> Result<Item> {
        let mut item = Item::new();
        let partition = schema.partition_key();
        item.insert(partition.name.clone(), encode_dynamic(&key.partition)?);
        match (schema.sort_key(), &key.sort) {
            (Some(sort_attr), Some(sort)) => {
                item.insert(sort_attr.name.clone(), encode_dynamic(sort)?);
            }
            (Some(sort_attr), None) => {
                return Err(Error::MissingPrimaryKey {
                    attribute: sort_attr.name.clone(),
                });
            }
            (None, Some(_)) => {
                return Err(Error::InvalidData(format!(
                    "{} has no sort key",
                    schema.entity()
                )));
            }
            (None, None) => {}
        }
        Ok(item)
    }

    async fn get_with_consistency<M: Model>(
        &self,
        key: &Key,
        consistent_read: bool,
    ) -> Result<Option<M>> {
        let schema = schema::resolve::<M>()?;
        let request = GetRequest {
            table: self.table.clone(),
            key: self.key_item(&schema, key)?,
            consistent_read,
            projection_expression: None,
            names: Default::default(),
        };
        match self.client.get_item(request).await? {
            Some(item) => Ok(Some(decode_item::<M>(&item, &schema, self.cipher())?)),
            None => Ok(None),
        }
    }

    /// Eventually consistent point read.
    pub async fn get<M: Model>(&self, key: &Key) -> Result<Option<M>> {
        self.get_with_consistency(key, false).await
    }

    /// Strongly consistent point read against the base table.
    pub async fn get_consistent<M: Model>(&self, key: &Key) -> Result<Option<M>> {
        self.get_with_consistency(key, true).await
    }

    /// Point read that treats absence as an error.
    pub async fn get_required<M: Model>(&self, key: &Key) -> Result<M> {
        let schema = schema::resolve::<M>()?;
        self.get(key).await?.ok_or_else(|| Error::ItemNotFound {
            entity_type: schema.entity(),
            id: key.display(),
        })
    }

    /// Inserts a record that must not already exist. Versioned records are
    /// written at version 1 regardless of the in-memory value.
    pub async fn create<M: Model>(&self, record: &M) -> Result<()> {
        let schema = schema::resolve::<M>()?;
        let mut item = encode_item(record, &schema, self.cipher())?;
        if let Some(version) = schema.version_attribute() {
            item.insert(
                version.name.clone(),
                aws_sdk_dynamodb::types::AttributeValue::N("1".to_string()),
            );
        }

        let mut builder = ExprBuilder::new();
        builder.condition(&schema.partition_key().name, Operator::NotExists, &[])?;
        let components = builder.build();

        let id = self.item_key_display(&schema, &item);
        tracing::debug!(table = %self.table, entity = schema.entity(), id = %id, "creating record");
        let request = PutRequest {
            table: self.table.clone(),
            item,
            condition: ConditionExpr {
                expression: components.condition_expression,
                names: components.names,
                values: components.values,
            },
        };
        self.client
            .put_item(request)
            .await
            .map_err(|e| e.with_entity(schema.entity(), id))
    }

    /// Upserts a record. For versioned records a zero in-memory version
    /// behaves as a create; a nonzero version must match the stored one.
    pub async fn put<M: Model>(&self, record: &M) -> Result<()> {
        let schema = schema::resolve::<M>()?;
        let mut item = encode_item(record, &schema, self.cipher())?;
        let mut builder = ExprBuilder::new();

        if let Some(version_attr) = schema.version_attribute() {
            let current = item_version(&item, &version_attr.name)?;
            if current == 0 {
                builder.condition(&schema.partition_key().name, Operator::NotExists, &[])?;
            } else {
                builder.condition(
                    &version_attr.name,
                    Operator::Eq,
                    &[Value::from_i64(current)],
                )?;
            }
            item.insert(
                version_attr.name.clone(),
                aws_sdk_dynamodb::types::AttributeValue::N((current + 1).to_string()),
            );
        }

        let components = builder.build();
        let id = self.item_key_display(&schema, &item);
        let request = PutRequest {
            table: self.table.clone(),
            item,
            condition: ConditionExpr {
                expression: components.condition_expression,
                names: components.names,
                values: components.values,
            },
        };
        self.client
            .put_item(request)
            .await
            .map_err(|e| e.with_entity(schema.entity(), id))
    }

    /// Replaces an existing record. The item must already be present;
    /// versioned records must also carry the stored version.
    pub async fn save<M: Model>(&self, record: &M) -> Result<()> {
        let schema = schema::resolve::<M>()?;
        let mut item = encode_item(record, &schema, self.cipher())?;
        let mut builder = ExprBuilder::new();
        builder.condition(&schema.partition_key().name, Operator::Exists, &[])?;

        let versioned = match schema.version_attribute() {
            Some(version_attr) => {
                let current = item_version(&item, &version_attr.name)?;
                builder.condition(
                    &version_attr.name,
                    Operator::Eq,
                    &[Value::from_i64(current)],
                )?;
                item.insert(
                    version_attr.name.clone(),
                    aws_sdk_dynamodb::types::AttributeValue::N((current + 1).to_string()),
                );
                true
            }
            None => false,
        };

        let components = builder.build();
        let id = self.item_key_display(&schema, &item);
        let request = PutRequest {
            table: self.table.clone(),
            item,
            condition: ConditionExpr {
                expression: components.condition_expression,
                names: components.names,
                values: components.values,
            },
        };
        self.client.put_item(request).await.map_err(|e| {
            // Without a version attribute the only condition is existence,
            // so a failed check means the item is missing.
            let e = e.with_entity(schema.entity(), id);
            if !versioned {
                not_found_on_condition(e)
            } else {
                e
            }
        })
    }

    /// Applies a partial update built from SET/ADD/REMOVE/DELETE actions.
    /// The item must exist; versioned records get their version bumped.
    pub async fn update<M, F>(&self, key: &Key, build: F) -> Result<()>
    where
        M: Model,
        F: FnOnce(&mut ExprBuilder) -> Result<()>,
    {
        let schema = schema::resolve::<M>()?;
        let mut builder = ExprBuilder::new();
        build(&mut builder)?;
        if let Some(version_attr) = schema.version_attribute() {
            builder.update_add(&version_attr.name, &Value::from_i64(1))?;
        }
        builder.condition(&schema.partition_key().name, Operator::Exists, &[])?;

        let components = builder.build();
        let update_expression = components.update_expression.ok_or_else(|| {
            Error::InvalidOperator("update requires at least one action".to_string())
        })?;

        let request = UpdateRequest {
            table: self.table.clone(),
            key: self.key_item(&schema, key)?,
            update_expression,
            condition_expression: components.condition_expression,
            names: components.names,
            values: components.values,
        };
        self.client.update_item(request).await.map_err(|e| {
            not_found_on_condition(e.with_entity(schema.entity(), key.display()))
        })
    }

    /// Deletes an existing record. Deleting an absent item is an error.
    pub async fn delete<M: Model>(&self, key: &Key) -> Result<()> {
        let schema = schema::resolve::<M>()?;
        let mut builder = ExprBuilder::new();
        builder.condition(&schema.partition_key().name, Operator::Exists, &[])?;
        let components = builder.build();

        let request = DeleteRequest {
            table: self.table.clone(),
            key: self.key_item(&schema, key)?,
            condition: ConditionExpr {
                expression: components.condition_expression,
                names: components.names,
                values: components.values,
            },
        };
        tracing::debug!(table = %self.table, entity = schema.entity(), id = %key.display(), "deleting record");
        self.client.delete_item(request).await.map_err(|e| {
            not_found_on_condition(e.with_entity(schema.entity(), key.display()))
        })
    }

    /// Starts a key-driven query for `M`.
    pub fn query<M: Model>(&self) -> Result<Query<M, C>> {
        let schema = schema::resolve::<M>()?;
        Ok(Query::new(
            self.client.clone(),
            self.table.clone(),
            schema,
            self.cipher.clone(),
            false,
            self.cancel.clone(),
        ))
    }

    /// Starts a full-table scan for `M`.
    pub fn scan<M: Model>(&self) -> Result<Query<M, C>> {
        let schema = schema::resolve::<M>()?;
        Ok(Query::new(
            self.client.clone(),
            self.table.clone(),
            schema,
            self.cipher.clone(),
            true,
            self.cancel.clone(),
        ))
    }

    /// Starts a batch of unconditioned puts, deletes, and gets.
    pub fn batch(&self) -> BatchBuilder<'_, C> {
        BatchBuilder::new(self)
    }

    /// Starts an atomic transaction.
    pub fn transact(&self) -> TransactionBuilder<'_, C> {
        TransactionBuilder::new(self)
    }

    fn item_key_display(&self, schema: &Schema, item: &Item) -> String {
        use aws_sdk_dynamodb::types::AttributeValue;
        let render = |attr: &str| -> String {
            match item.get(attr) {
                Some(AttributeValue::S(s)) => s.clone(),
                Some(AttributeValue::N(n)) => n.clone(),
                Some(other) => format!("{other:?}"),
                None => String::new(),
            }
        };
        let partition = render(&schema.partition_key().name);
        match schema.sort_key() {
            Some(sort) => format!("{partition}/{}", render(&sort.name)),
            None => partition,
        }
    }
}

/// Reads the current version number out of an encoded item. A missing
/// version attribute counts as zero.
fn item_version(item: &Item, attribute: &str) -> Result<i64> {
    use aws_sdk_dynamodb::types::AttributeValue;
    match item.get(attribute) {
        None => Ok(0),
        Some(AttributeValue::N(n)) => n
            .parse::<i64>()
            .map_err(|_| Error::InvalidData(format!("version attribute {attribute} is not an integer: {n}"))),
        Some(_) => Err(Error::InvalidData(format!(
            "version attribute {attribute} is not numeric"
        ))),
    }
}

fn not_found_on_condition(error: Error) -> Error {
    match error {
        Error::ConditionFailed { entity_type, id } => Error::ItemNotFound { entity_type, id },
        other => other,
    }
}
