//! Atomic multi-item writes.
//!
//! A transaction accumulates up to 100 operations and submits them as one
//! all-or-nothing TransactWriteItems call. Any failed condition cancels the
//! whole transaction; the store layer surfaces the per-item reasons through
//! [`Error::TransactionCanceled`].

use tablemap_core::value::Value;
use tablemap_core::{schema, Error, Model, Result};

use crate::client::{ConditionExpr, StoreClient, TransactItem, TransactWriteRequest};
use crate::codec::encode_item;
use crate::expr::{ExprBuilder, Operator};
use crate::mapper::{Key, Mapper};

/// DynamoDB caps one transaction at 100 items.
const MAX_TRANSACT_ITEMS: usize = 100;

/// Collects operations for one atomic submission.
pub struct TransactionBuilder<'a, C: StoreClient + ?Sized> {
    mapper: &'a Mapper<C>,
    items: Vec<TransactItem>,
}

impl<'a, C: StoreClient + ?Sized> TransactionBuilder<'a, C> {
    pub(crate) fn new(mapper: &'a Mapper<C>) -> Self {
        Self {
            mapper,
            items: Vec::new(),
        }
    }

    /// Adds an insert that asserts the item does not already exist.
    pub fn create<M: Model>(mut self, record: &M) -> Result<Self> {
        let schema = schema::resolve::<M>()?;
        let item = encode_item(record, &schema, self.mapper.cipher())?;
        let mut builder = ExprBuilder::new();
        builder.condition(&schema.partition_key().name, Operator::NotExists, &[])?;
        let components = builder.build();
        self.items.push(TransactItem::Put {
            item,
            condition: ConditionExpr {
                expression: components.condition_expression,
                names: components.names,
                values: components.values,
            },
        });
        Ok(self)
    }

    /// Adds an unconditioned put.
    pub fn put<M: Model>(mut self, record: &M) -> Result<Self> {
        let schema = schema::resolve::<M>()?;
        let item = encode_item(record, &schema, self.mapper.cipher())?;
        self.items.push(TransactItem::Put {
            item,
            condition: ConditionExpr::default(),
        });
        Ok(self)
    }

    /// Adds a partial update of an existing item.
    pub fn update<M, F>(mut self, key: &Key, build: F) -> Result<Self>
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
            Error::InvalidOperator("transactional update requires at least one action".to_string())
        })?;

        self.items.push(TransactItem::Update {
            key: self.mapper.key_item(&schema, key)?,
            update_expression,
            condition_expression: components.condition_expression,
            names: components.names,
            values: components.values,
        });
        Ok(self)
    }

    /// Adds a delete of an existing item.
    pub fn delete<M: Model>(mut self, key: &Key) -> Result<Self> {
        let schema = schema::resolve::<M>()?;
        let mut builder = ExprBuilder::new();
        builder.condition(&schema.partition_key().name, Operator::Exists, &[])?;
        let components = builder.build();
        self.items.push(TransactItem::Delete {
            key: self.mapper.key_item(&schema, key)?,
            condition: ConditionExpr {
                expression: components.condition_expression,
                names: components.names,
                values: components.values,
            },
        });
        Ok(self)
    }

    /// Adds a pure condition check on an item the transaction does not
    /// modify. The condition failing cancels the whole transaction.
    pub fn condition_check<M: Model>(
        mut self,
        key: &Key,
        attribute: &str,
        operator: Operator,
        operands: &[Value],
    ) -> Result<Self> {
        let schema = schema::resolve::<M>()?;
        let mut builder = ExprBuilder::new();
        builder.condition(attribute, operator, operands)?;
        let components = builder.build();
        self.items.push(TransactItem::ConditionCheck {
            key: self.mapper.key_item(&schema, key)?,
            condition: ConditionExpr {
                expression: components.condition_expression,
                names: components.names,
                values: components.values,
            },
        });
        Ok(self)
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Submits the transaction. Either every operation applies or none do.
    pub async fn execute(self) -> Result<()> {
        if self.items.is_empty() {
            return Err(Error::InvalidOperator(
                "transaction has no operations".to_string(),
            ));
        }
        if self.items.len() > MAX_TRANSACT_ITEMS {
            return Err(Error::InvalidOperator(format!(
                "transaction holds {} operations, the maximum is {MAX_TRANSACT_ITEMS}",
                self.items.len()
            )));
        }
        if self.mapper.cancellation_token().is_cancelled() {
            return Err(Error::Cancelled);
        }
        self.mapper
            .client()
            .transact_write(TransactWriteRequest {
                table: self.mapper.table().to_string(),
                items: self.items,
            })
            .await
    }
}
