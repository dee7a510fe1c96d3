//! DynamoDB store backend.
//!
//! Implements [`StoreClient`](crate::client::StoreClient) against
//! `aws-sdk-dynamodb`. Request structs carry already-compiled expressions;
//! this layer only translates them into SDK calls and maps SDK errors.

mod error;

use std::collections::HashMap;

use async_trait::async_trait;
use aws_sdk_dynamodb::types::{
    ConditionCheck, Delete, DeleteRequest as DeleteWriteRequest, KeysAndAttributes, Put,
    PutRequest as PutWriteRequest, TransactWriteItem, Update, WriteRequest,
};
use aws_sdk_dynamodb::Client;
use tablemap_core::{Error, Result};

use crate::client::{
    BatchGetOutput, BatchGetRequest, BatchWrite, BatchWriteOutput, BatchWriteRequest,
    DeleteRequest, GetRequest, PageOutput, PutRequest, QueryRequest, StoreClient, TransactItem,
    TransactWriteRequest, UpdateRequest,
};

use error::{
    map_batch_get_error, map_batch_write_error, map_delete_item_error, map_get_item_error,
    map_put_item_error, map_query_error, map_scan_error, map_transact_write_error,
    map_update_item_error,
};

/// DynamoDB-backed store.
pub struct DynamoStore {
    client: Client,
}

impl DynamoStore {
    /// Creates a store around an existing SDK client.
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Creates a store from environment configuration, using the SDK
    /// default credential chain.
    pub async fn from_env() -> Self {
        let config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
        Self::new(Client::new(&config))
    }
}

/// The SDK rejects empty expression attribute maps; send them as absent.
fn non_empty<V>(map: HashMap<String, V>) -> Option<HashMap<String, V>> {
    if map.is_empty() {
        None
    } else {
        Some(map)
    }
}

fn build_failed(err: impl std::fmt::Display) -> Error {
    Error::InvalidData(format!("request build failed: {err}"))
}

#[async_trait]
impl StoreClient for DynamoStore {
    async fn get_item(&self, request: GetRequest) -> Result<Option<crate::Item>> {
        let output = self
            .client
            .get_item()
            .table_name(&request.table)
            .set_key(Some(request.key))
            .consistent_read(request.consistent_read)
            .set_projection_expression(request.projection_expression)
            .set_expression_attribute_names(non_empty(request.names))
            .send()
            .await
            .map_err(map_get_item_error)?;
        Ok(output.item)
    }

    async fn put_item(&self, request: PutRequest) -> Result<()> {
        self.client
            .put_item()
            .table_name(&request.table)
            .set_item(Some(request.item))
            .set_condition_expression(request.condition.expression)
            .set_expression_attribute_names(non_empty(request.condition.names))
            .set_expression_attribute_values(non_empty(request.condition.values))
            .send()
            .await
            .map_err(map_put_item_error)?;
        Ok(())
    }

    async fn update_item(&self, request: UpdateRequest) -> Result<()> {
        self.client
            .update_item()
            .table_name(&request.table)
            .set_key(Some(request.key))
            .update_expression(request.update_expression)
            .set_condition_expression(request.condition_expression)
            .set_expression_attribute_names(non_empty(request.names))
            .set_expression_attribute_values(non_empty(request.values))
            .send()
            .await
            .map_err(map_update_item_error)?;
        Ok(())
    }

    async fn delete_item(&self, request: DeleteRequest) -> Result<()> {
        self.client
            .delete_item()
            .table_name(&request.table)
            .set_key(Some(request.key))
            .set_condition_expression(request.condition.expression)
            .set_expression_attribute_names(non_empty(request.condition.names))
            .set_expression_attribute_values(non_empty(request.condition.values))
            .send()
            .await
            .map_err(map_delete_item_error)?;
        Ok(())
    }

    async fn query_page(&self, request: QueryRequest) -> Result<PageOutput> {
        if let Some(key_condition) = request.key_condition_expression {
            let output = self
                .client
                .query()
                .table_name(&request.table)
                .set_index_name(request.index)
                .key_condition_expression(key_condition)
                .set_filter_expression(request.filter_expression)
                .set_projection_expression(request.projection_expression)
                .set_expression_attribute_names(non_empty(request.names))
                .set_expression_attribute_values(non_empty(request.values))
                .set_limit(request.limit)
                .scan_index_forward(request.scan_forward)
                .consistent_read(request.consistent_read)
                .set_exclusive_start_key(request.exclusive_start_key)
                .send()
                .await
                .map_err(map_query_error)?;
            Ok(PageOutput {
                items: output.items.unwrap_or_default(),
                last_evaluated_key: output.last_evaluated_key,
            })
        } else {
            let output = self
                .client
                .scan()
                .table_name(&request.table)
                .set_index_name(request.index)
                .set_filter_expression(request.filter_expression)
                .set_projection_expression(request.projection_expression)
                .set_expression_attribute_names(non_empty(request.names))
                .set_expression_attribute_values(non_empty(request.values))
                .set_limit(request.limit)
                .consistent_read(request.consistent_read)
                .set_exclusive_start_key(request.exclusive_start_key)
                .send()
                .await
                .map_err(map_scan_error)?;
            Ok(PageOutput {
                items: output.items.unwrap_or_default(),
                last_evaluated_key: output.last_evaluated_key,
            })
        }
    }

    async fn batch_write(&self, request: BatchWriteRequest) -> Result<BatchWriteOutput> {
        let mut writes = Vec::with_capacity(request.writes.len());
        for write in request.writes {
            let write_request = match write {
                BatchWrite::Put(item) => WriteRequest::builder()
                    .put_request(
                        PutWriteRequest::builder()
                            .set_item(Some(item))
                            .build()
                            .map_err(build_failed)?,
                    )
                    .build(),
                BatchWrite::Delete(key) => WriteRequest::builder()
                    .delete_request(
                        DeleteWriteRequest::builder()
                            .set_key(Some(key))
                            .build()
                            .map_err(build_failed)?,
                    )
                    .build(),
            };
            writes.push(write_request);
        }

        let output = self
            .client
            .batch_write_item()
            .request_items(&request.table, writes)
            .send()
            .await
            .map_err(map_batch_write_error)?;

        let unprocessed = output
            .unprocessed_items
            .and_then(|mut tables| tables.remove(&request.table))
            .unwrap_or_default()
            .into_iter()
            .filter_map(|write_request| {
                if let Some(put) = write_request.put_request {
                    Some(BatchWrite::Put(put.item))
                } else {
                    write_request
                        .delete_request
                        .map(|delete| BatchWrite::Delete(delete.key))
                }
            })
            .collect();

        Ok(BatchWriteOutput { unprocessed })
    }

    async fn batch_get(&self, request: BatchGetRequest) -> Result<BatchGetOutput> {
        let keys_and_attributes = KeysAndAttributes::builder()
            .set_keys(Some(request.keys))
            .consistent_read(request.consistent_read)
            .build()
            .map_err(build_failed)?;

        let output = self
            .client
            .batch_get_item()
            .request_items(&request.table, keys_and_attributes)
            .send()
            .await
            .map_err(map_batch_get_error)?;

        let items = output
            .responses
            .and_then(|mut tables| tables.remove(&request.table))
            .unwrap_or_default();
        let unprocessed_keys = output
            .unprocessed_keys
            .and_then(|mut tables| tables.remove(&request.table))
            .map(|ka| ka.keys)
            .unwrap_or_default();

        Ok(BatchGetOutput {
            items,
            unprocessed_keys,
        })
    }

    async fn transact_write(&self, request: TransactWriteRequest) -> Result<()> {
        let mut transact_items = Vec::with_capacity(request.items.len());
        for item in request.items {
            let transact_item = match item {
                TransactItem::Put { item, condition } => TransactWriteItem::builder()
                    .put(
                        Put::builder()
                            .table_name(&request.table)
                            .set_item(Some(item))
                            .set_condition_expression(condition.expression)
                            .set_expression_attribute_names(non_empty(condition.names))
                            .set_expression_attribute_values(non_empty(condition.values))
                            .build()
                            .map_err(build_failed)?,
                    )
                    .build(),
                TransactItem::Update {
                    key,
                    update_expression,
                    condition_expression,
                    names,
                    values,
                } => TransactWriteItem::builder()
                    .update(
                        Update::builder()
                            .table_name(&request.table)
                            .set_key(Some(key))
                            .update_expression(update_expression)
                            .set_condition_expression(condition_expression)
                            .set_expression_attribute_names(non_empty(names))
                            .set_expression_attribute_values(non_empty(values))
                            .build()
                            .map_err(build_failed)?,
                    )
                    .build(),
                TransactItem::Delete { key, condition } => TransactWriteItem::builder()
                    .delete(
                        Delete::builder()
                            .table_name(&request.table)
                            .set_key(Some(key))
                            .set_condition_expression(condition.expression)
                            .set_expression_attribute_names(non_empty(condition.names))
                            .set_expression_attribute_values(non_empty(condition.values))
                            .build()
                            .map_err(build_failed)?,
                    )
                    .build(),
                TransactItem::ConditionCheck { key, condition } => TransactWriteItem::builder()
                    .condition_check(
                        ConditionCheck::builder()
                            .table_name(&request.table)
                            .set_key(Some(key))
                            .set_condition_expression(condition.expression)
                            .set_expression_attribute_names(non_empty(condition.names))
                            .set_expression_attribute_values(non_empty(condition.values))
                            .build()
                            .map_err(build_failed)?,
                    )
                    .build(),
            };
            transact_items.push(transact_item);
        }

        self.client
            .transact_write_items()
            .set_transact_items(Some(transact_items))
            .send()
            .await
            .map_err(map_transact_write_error)?;
        Ok(())
    }
}
