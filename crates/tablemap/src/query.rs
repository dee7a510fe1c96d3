//! Query and scan execution.
//!
//! A [`Query`] collects key conditions, filters, and paging options, then
//! compiles them into a single page request per `send`. Validation happens
//! up front: an invalid combination never reaches the store.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use tablemap_core::schema::Schema;
use tablemap_core::value::Value;
use tablemap_core::{Error, Model, Result};

use crate::client::{PageOutput, QueryRequest, StoreClient};
use crate::codec::decode_item;
use crate::crypto::FieldCipher;
use crate::cursor::Cursor;
use crate::expr::{ExprBuilder, Operator};

/// Largest page size a caller may request.
pub const MAX_PAGE_SIZE: i32 = 1000;

/// Result ordering along the sort key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Ascending,
    Descending,
}

impl SortOrder {
    fn as_token(&self) -> &'static str {
        match self {
            SortOrder::Ascending => "asc",
            SortOrder::Descending => "desc",
        }
    }

    fn from_token(token: &str) -> Result<Self> {
        match token {
            "asc" => Ok(SortOrder::Ascending),
            "desc" => Ok(SortOrder::Descending),
            other => Err(Error::Cursor(format!("unknown sort order: {other}"))),
        }
    }
}

/// One page of decoded records plus the token for the next page, if any.
#[derive(Debug, Clone)]
pub struct Page<M> {
    pub items: Vec<M>,
    pub cursor: Option<String>,
}

#[derive(Debug, Clone)]
struct Condition {
    attribute: String,
    operator: Operator,
    operands: Vec<Value>,
}

/// Fluent query over one record type.
pub struct Query<M: Model, C: StoreClient + ?Sized> {
    client: Arc<C>,
    table: String,
    schema: Arc<Schema>,
    cipher: Option<Arc<dyn FieldCipher>>,
    scan: bool,
    index: Option<String>,
    key_conditions: Vec<Condition>,
    filters: Vec<Condition>,
    projection: Option<Vec<String>>,
    limit: Option<i32>,
    max_items: Option<usize>,
    sort: Option<SortOrder>,
    cursor: Option<String>,
    consistent_read: bool,
    cancel: CancellationToken,
    _marker: std::marker::PhantomData<M>,
}

impl<M: Model, C: StoreClient + ?Sized> Query<M, C> {
    pub(crate) fn new(
        client: Arc<C>,
        table: String,
        schema: Arc<Schema>,
        cipher: Option<Arc<dyn FieldCipher>>,
        scan: bool,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            client,
            table,
            schema,
            cipher,
            scan,
            index: None,
            key_conditions: Vec::new(),
            filters: Vec::new(),
            projection: None,
            limit: None,
            max_items: None,
            sort: None,
            cursor: None,
            consistent_read: false,
            cancel,
            _marker: std::marker::PhantomData,
        }
    }

    /// Targets a secondary index instead of the table's own keys.
    pub fn index(mut self, name: impl Into<String>) -> Self {
        self.index = Some(name.into());
        self
    }

    /// Adds a key condition on the active partition or sort key attribute.
    pub fn where_key(
        mut self,
        attribute: impl Into<String>,
        operator: Operator,
        operands: impl IntoIterator<Item = Value>,
    ) -> Self {
        self.key_conditions.push(Condition {
            attribute: attribute.into(),
            operator,
            operands: operands.into_iter().collect(),
        });
        self
    }

    /// Adds a filter applied server-side after key matching.
    pub fn filter(
        mut self,
        attribute: impl Into<String>,
        operator: Operator,
        operands: impl IntoIterator<Item = Value>,
    ) -> Self {
        self.filters.push(Condition {
            attribute: attribute.into(),
            operator,
            operands: operands.into_iter().collect(),
        });
        self
    }

    /// Restricts returned attributes. Key attributes are always included so
    /// pagination stays possible.
    pub fn project(mut self, attributes: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.projection = Some(attributes.into_iter().map(Into::into).collect());
        self
    }

    pub fn limit(mut self, limit: i32) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Caps the total records [`Query::all`] will accumulate across pages.
    pub fn max_items(mut self, max_items: usize) -> Self {
        self.max_items = Some(max_items);
        self
    }

    pub fn sort(mut self, order: SortOrder) -> Self {
        self.sort = Some(order);
        self
    }

    /// Resumes from a cursor token returned by a previous page.
    pub fn cursor(mut self, token: impl Into<String>) -> Self {
        self.cursor = Some(token.into());
        self
    }

    pub fn consistent_read(mut self, consistent: bool) -> Self {
        self.consistent_read = consistent;
        self
    }

    /// Runs one page and returns decoded items plus the next cursor.
    pub async fn send(&self) -> Result<Page<M>> {
        if self.cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        let request = self.compile()?;
        tracing::debug!(
            table = %self.table,
            index = ?self.index,
            entity = self.schema.entity(),
            scan = self.scan,
            "running query page"
        );
        let output = self.client.query_page(request).await?;
        self.decode_page(output)
    }

    /// Drains every page into one vector, stopping early when `max_items`
    /// is reached. Fails whole: a mid-stream error discards items already
    /// collected.
    pub async fn all(&self) -> Result<Vec<M>> {
        let mut request = self.compile()?;
        let mut items = Vec::new();
        loop {
            if self.cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            let output = self.client.query_page(request.clone()).await?;
            for item in &output.items {
                items.push(decode_item::<M>(item, &self.schema, self.cipher.as_deref())?);
            }
            if let Some(max_items) = self.max_items {
                if items.len() >= max_items {
                    items.truncate(max_items);
                    return Ok(items);
                }
            }
            match output.last_evaluated_key {
                Some(key) => request.exclusive_start_key = Some(key),
                None => return Ok(items),
            }
        }
    }

    /// Returns the first matching record, if any.
    pub async fn first(&self) -> Result<Option<M>> {
        let mut request = self.compile()?;
        request.limit = Some(1);
        let output = self.client.query_page(request).await?;
        match output.items.first() {
            Some(item) => Ok(Some(decode_item::<M>(
                item,
                &self.schema,
                self.cipher.as_deref(),
            )?)),
            None => Ok(None),
        }
    }

    fn decode_page(&self, output: PageOutput) -> Result<Page<M>> {
        let mut items = Vec::with_capacity(output.items.len());
        for item in &output.items {
            items.push(decode_item::<M>(item, &self.schema, self.cipher.as_deref())?);
        }
        let cursor = match output.last_evaluated_key {
            Some(key) => Some(
                Cursor::from_last_key(
                    &key,
                    self.index.as_deref(),
                    self.sort.map(|s| s.as_token()),
                )?
                .encode()?,
            ),
            None => None,
        };
        Ok(Page { items, cursor })
    }

    /// Validates the whole query and compiles it into a page request.
    fn compile(&self) -> Result<QueryRequest> {
        let key_schema = self.schema.key_schema(self.index.as_deref())?;

        if self.consistent_read && self.index.is_some() {
            return Err(Error::InvalidOperator(
                "consistent reads are not available on secondary indexes".to_string(),
            ));
        }
        if let Some(limit) = self.limit {
            if limit <= 0 || limit > MAX_PAGE_SIZE {
                return Err(Error::InvalidOperator(format!(
                    "limit must be between 1 and {MAX_PAGE_SIZE}, got {limit}"
                )));
            }
        }
        if self.scan {
            if !self.key_conditions.is_empty() {
                return Err(Error::InvalidOperator(
                    "key conditions are not valid on a scan".to_string(),
                ));
            }
            if self.sort.is_some() {
                return Err(Error::InvalidOperator(
                    "sort order is not valid on a scan".to_string(),
                ));
            }
        }

        let mut builder = ExprBuilder::new();
        let mut partition_bound = false;

        for condition in &self.key_conditions {
            if condition.attribute == key_schema.partition.name {
                if condition.operator != Operator::Eq {
                    return Err(Error::InvalidOperator(format!(
                        "partition key {} only supports equality",
                        condition.attribute
                    )));
                }
                if partition_bound {
                    return Err(Error::InvalidOperator(format!(
                        "partition key {} bound more than once",
                        condition.attribute
                    )));
                }
                let operand = condition.operands.first().ok_or_else(|| {
                    Error::InvalidOperator("partition key condition needs a value".to_string())
                })?;
                builder.key_partition_eq(&condition.attribute, operand)?;
                partition_bound = true;
            } else if key_schema
                .sort
                .is_some_and(|sort| sort.name == condition.attribute)
            {
                builder.key_sort_condition(
                    &condition.attribute,
                    condition.operator,
                    &condition.operands,
                )?;
            } else {
                return Err(Error::InvalidOperator(format!(
                    "{} is not a key attribute of the active index",
                    condition.attribute
                )));
            }
        }

        if !self.scan && !partition_bound {
            return Err(Error::MissingPrimaryKey {
                attribute: key_schema.partition.name.clone(),
            });
        }

        for condition in &self.filters {
            builder.filter(&condition.attribute, condition.operator, &condition.operands)?;
        }

        if let Some(attributes) = &self.projection {
            // Keys ride along so last_evaluated_key stays reconstructible.
            let mut projected = attributes.clone();
            if !projected.iter().any(|a| *a == key_schema.partition.name) {
                projected.push(key_schema.partition.name.clone());
            }
            if let Some(sort) = key_schema.sort {
                if !projected.iter().any(|a| *a == sort.name) {
                    projected.push(sort.name.clone());
                }
            }
            builder.project(&projected);
        }

        let exclusive_start_key = match &self.cursor {
            Some(token) => {
                let cursor = Cursor::decode(token)?;
                if cursor.index.as_deref() != self.index.as_deref() {
                    return Err(Error::InvalidOperator(format!(
                        "cursor was issued for index {:?}, query targets {:?}",
                        cursor.index, self.index
                    )));
                }
                // An absent sort means ascending on both sides; resuming a
                // descending token with the default order would walk the key
                // range the wrong way.
                let cursor_sort = match &cursor.sort {
                    Some(token) => SortOrder::from_token(token)?,
                    None => SortOrder::Ascending,
                };
                if self.sort.unwrap_or(SortOrder::Ascending) != cursor_sort {
                    return Err(Error::InvalidOperator(
                        "cursor was issued under a different sort order".to_string(),
                    ));
                }
                Some(cursor.exclusive_start_key()?)
            }
            None => None,
        };

        let components = builder.build();
        Ok(QueryRequest {
            table: self.table.clone(),
            index: self.index.clone(),
            key_condition_expression: components.key_condition_expression,
            filter_expression: components.filter_expression,
            projection_expression: components.projection_expression,
            names: components.names,
            values: components.values,
            limit: self.limit,
            scan_forward: self.sort != Some(SortOrder::Descending),
            consistent_read: self.consistent_read,
            exclusive_start_key,
        })
    }
}
