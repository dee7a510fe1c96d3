//! Attribute codec between typed records and DynamoDB attribute-value maps.
//!
//! Conversion is driven exclusively by the model descriptor. Wire attribute
//! names come from the schema's `Attribute::name`; the record's field
//! identities are only used to pull values out of its `Document`. Nested
//! records recurse through their own schema, so an inner type whose wire
//! names differ in case or form from its field identifiers still round-trips
//! exactly.

use std::collections::BTreeMap;

use aws_sdk_dynamodb::primitives::Blob;
use aws_sdk_dynamodb::types::AttributeValue;
use tablemap_core::schema::{AttrKind, Attribute, Schema};
use tablemap_core::value::{Document, Value};
use tablemap_core::{Error, Model, Result};

use crate::crypto::FieldCipher;
use crate::Item;

/// Encodes a record into its wire item.
///
/// Missing or empty partition/sort key values fail with `MissingPrimaryKey`.
/// Attributes marked omit-empty are skipped when absent or empty; an empty
/// set anywhere else fails encode, since the store rejects empty sets.
pub fn encode_item<M: Model>(
    record: &M,
    schema: &Schema,
    cipher: Option<&dyn FieldCipher>,
) -> Result<Item> {
    let doc = record.to_document();
    encode_document(&doc, schema, cipher)
}

/// Encodes a field-identity-keyed document through a schema. Used directly
/// for nested records.
pub fn encode_document(
    doc: &Document,
    schema: &Schema,
    cipher: Option<&dyn FieldCipher>,
) -> Result<Item> {
    let mut item = Item::new();

    for attr in schema.attributes() {
        let is_key = attr.name == schema.partition_key().name
            || schema.sort_key().is_some_and(|sk| sk.name == attr.name);

        let value = match doc.get(&attr.field) {
            Some(Value::Null) if attr.omit_empty => continue,
            Some(value) => value,
            None if is_key => {
                return Err(Error::MissingPrimaryKey {
                    attribute: attr.name.clone(),
                })
            }
            None if attr.optional || attr.omit_empty => continue,
            None => {
                return Err(Error::InvalidData(format!(
                    "missing required field {} on {}",
                    attr.field,
                    schema.entity()
                )))
            }
        };

        if value.is_empty() {
            if is_key {
                return Err(Error::MissingPrimaryKey {
                    attribute: attr.name.clone(),
                });
            }
            if attr.omit_empty {
                continue;
            }
            if matches!(
                attr.kind,
                AttrKind::StringSet | AttrKind::NumberSet | AttrKind::BinarySet
            ) {
                return Err(Error::InvalidData(format!(
                    "attribute {} is an empty set",
                    attr.name
                )));
            }
        }

        let wire = if attr.encrypted {
            encode_encrypted(attr, value, cipher)?
        } else {
            encode_value(value, &attr.kind, attr, cipher)?
        };
        item.insert(attr.name.clone(), wire);
    }

    Ok(item)
}

/// Decodes a wire item back into a record.
pub fn decode_item<M: Model>(
    item: &Item,
    schema: &Schema,
    cipher: Option<&dyn FieldCipher>,
) -> Result<M> {
    let doc = decode_document(item, schema, cipher)?;
    M::from_document(&doc)
}

/// Decodes a wire item into a field-identity-keyed document. Lookup is by
/// wire attribute name only; attributes absent from the item are left out
/// of the document and decode to the record's zero value downstream.
pub fn decode_document(
    item: &Item,
    schema: &Schema,
    cipher: Option<&dyn FieldCipher>,
) -> Result<Document> {
    let mut doc = Document::new();

    for attr in schema.attributes() {
        let Some(wire) = item.get(&attr.name) else {
            continue;
        };
        let value = if attr.encrypted {
            decode_encrypted(attr, wire, cipher)?
        } else {
            decode_value(wire, &attr.kind, attr, cipher)?
        };
        doc.insert(attr.field.clone(), value);
    }

    Ok(doc)
}

fn encode_value(
    value: &Value,
    kind: &AttrKind,
    attr: &Attribute,
    cipher: Option<&dyn FieldCipher>,
) -> Result<AttributeValue> {
    let mismatch = || {
        Error::InvalidData(format!(
            "attribute {} has value incompatible with its declared kind",
            attr.name
        ))
    };

    match (kind, value) {
        (_, Value::Null) => Ok(AttributeValue::Null(true)),
        (AttrKind::String, Value::String(s)) => Ok(AttributeValue::S(s.clone())),
        (AttrKind::Number, Value::Number(n)) => Ok(AttributeValue::N(n.clone())),
        (AttrKind::Binary, Value::Binary(b)) => Ok(AttributeValue::B(Blob::new(b.clone()))),
        (AttrKind::Bool, Value::Bool(b)) => Ok(AttributeValue::Bool(*b)),
        (AttrKind::StringSet, Value::StringSet(set)) => {
            Ok(AttributeValue::Ss(set.iter().cloned().collect()))
        }
        (AttrKind::NumberSet, Value::NumberSet(set)) => {
            Ok(AttributeValue::Ns(set.iter().cloned().collect()))
        }
        (AttrKind::BinarySet, Value::BinarySet(set)) => Ok(AttributeValue::Bs(
            set.iter().cloned().map(Blob::new).collect(),
        )),
        (AttrKind::List, Value::List(items)) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                out.push(encode_dynamic(item)?);
            }
            Ok(AttributeValue::L(out))
        }
        (AttrKind::Map, Value::Map(map)) => {
            let mut out = Item::with_capacity(map.len());
            for (key, item) in map {
                out.insert(key.clone(), encode_dynamic(item)?);
            }
            Ok(AttributeValue::M(out))
        }
        (AttrKind::Record(schema_ref), Value::Record(doc)) => {
            let nested = schema_ref()?;
            Ok(AttributeValue::M(encode_document(doc, &nested, cipher)?))
        }
        _ => Err(mismatch()),
    }
}

fn decode_value(
    wire: &AttributeValue,
    kind: &AttrKind,
    attr: &Attribute,
    cipher: Option<&dyn FieldCipher>,
) -> Result<Value> {
    let mismatch = || {
        Error::InvalidData(format!(
            "attribute {} has wire type incompatible with its declared kind",
            attr.name
        ))
    };

    match (kind, wire) {
        (AttrKind::String, AttributeValue::S(s)) => Ok(Value::String(s.clone())),
        (AttrKind::Number, AttributeValue::N(n)) => Ok(Value::Number(n.clone())),
        (AttrKind::Binary, AttributeValue::B(b)) => Ok(Value::Binary(b.as_ref().to_vec())),
        (AttrKind::Bool, AttributeValue::Bool(b)) => Ok(Value::Bool(*b)),
        (AttrKind::StringSet, AttributeValue::Ss(values)) => {
            Ok(Value::StringSet(values.iter().cloned().collect()))
        }
        (AttrKind::NumberSet, AttributeValue::Ns(values)) => {
            Ok(Value::NumberSet(values.iter().cloned().collect()))
        }
        (AttrKind::BinarySet, AttributeValue::Bs(values)) => Ok(Value::BinarySet(
            values.iter().map(|b| b.as_ref().to_vec()).collect(),
        )),
        (AttrKind::List, AttributeValue::L(values)) => {
            let mut out = Vec::with_capacity(values.len());
            for value in values {
                out.push(decode_dynamic(value)?);
            }
            Ok(Value::List(out))
        }
        (AttrKind::Map, AttributeValue::M(map)) => {
            let mut out = BTreeMap::new();
            for (key, value) in map {
                out.insert(key.clone(), decode_dynamic(value)?);
            }
            Ok(Value::Map(out))
        }
        // A nested record field must be a wire map; anything else is a
        // type mismatch, never a silent skip.
        (AttrKind::Record(schema_ref), AttributeValue::M(map)) => {
            let nested = schema_ref()?;
            Ok(Value::Record(decode_document(map, &nested, cipher)?))
        }
        (AttrKind::Record(_), _) => Err(Error::InvalidData(format!(
            "nested record attribute {} is not a wire map",
            attr.name
        ))),
        (_, AttributeValue::Null(_)) => Ok(Value::Null),
        _ => Err(mismatch()),
    }
}

/// Encodes a schema-less value (list elements, free-form map entries,
/// expression operands) by its own shape.
pub fn encode_dynamic(value: &Value) -> Result<AttributeValue> {
    match value {
        Value::String(s) => Ok(AttributeValue::S(s.clone())),
        Value::Number(n) => Ok(AttributeValue::N(n.clone())),
        Value::Binary(b) => Ok(AttributeValue::B(Blob::new(b.clone()))),
        Value::Bool(b) => Ok(AttributeValue::Bool(*b)),
        Value::Null => Ok(AttributeValue::Null(true)),
        Value::StringSet(set) => {
            if set.is_empty() {
                return Err(Error::InvalidData("empty string set".to_string()));
            }
            Ok(AttributeValue::Ss(set.iter().cloned().collect()))
        }
        Value::NumberSet(set) => {
            if set.is_empty() {
                return Err(Error::InvalidData("empty number set".to_string()));
            }
            Ok(AttributeValue::Ns(set.iter().cloned().collect()))
        }
        Value::BinarySet(set) => {
            if set.is_empty() {
                return Err(Error::InvalidData("empty binary set".to_string()));
            }
            Ok(AttributeValue::Bs(set.iter().cloned().map(Blob::new).collect()))
        }
        Value::List(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                out.push(encode_dynamic(item)?);
            }
            Ok(AttributeValue::L(out))
        }
        Value::Map(map) => {
            let mut out = Item::with_capacity(map.len());
            for (key, item) in map {
                out.insert(key.clone(), encode_dynamic(item)?);
            }
            Ok(AttributeValue::M(out))
        }
        Value::Record(_) => Err(Error::InvalidData(
            "nested records need a schema; use a declared Record attribute".to_string(),
        )),
    }
}

fn decode_dynamic(wire: &AttributeValue) -> Result<Value> {
    match wire {
        AttributeValue::S(s) => Ok(Value::String(s.clone())),
        AttributeValue::N(n) => Ok(Value::Number(n.clone())),
        AttributeValue::B(b) => Ok(Value::Binary(b.as_ref().to_vec())),
        AttributeValue::Bool(b) => Ok(Value::Bool(*b)),
        AttributeValue::Null(_) => Ok(Value::Null),
        AttributeValue::Ss(values) => Ok(Value::StringSet(values.iter().cloned().collect())),
        AttributeValue::Ns(values) => Ok(Value::NumberSet(values.iter().cloned().collect())),
        AttributeValue::Bs(values) => Ok(Value::BinarySet(
            values.iter().map(|b| b.as_ref().to_vec()).collect(),
        )),
        AttributeValue::L(values) => {
            let mut out = Vec::with_capacity(values.len());
            for value in values {
                out.push(decode_dynamic(value)?);
            }
            Ok(Value::List(out))
        }
        AttributeValue::M(map) => {
            let mut out = BTreeMap::new();
            for (key, value) in map {
                out.insert(key.clone(), decode_dynamic(value)?);
            }
            Ok(Value::Map(out))
        }
        other => Err(Error::InvalidData(format!(
            "unsupported wire value: {other:?}"
        ))),
    }
}

fn encode_encrypted(
    attr: &Attribute,
    value: &Value,
    cipher: Option<&dyn FieldCipher>,
) -> Result<AttributeValue> {
    let cipher = cipher.ok_or_else(|| Error::EncryptionNotConfigured {
        attribute: attr.name.clone(),
    })?;

    let plaintext: Vec<u8> = match (&attr.kind, value) {
        (AttrKind::String, Value::String(s)) => s.as_bytes().to_vec(),
        (AttrKind::Number, Value::Number(n)) => n.as_bytes().to_vec(),
        (AttrKind::Binary, Value::Binary(b)) => b.clone(),
        _ => {
            return Err(Error::InvalidData(format!(
                "encrypted attribute {} must be a scalar",
                attr.name
            )))
        }
    };

    let ciphertext = cipher.encrypt_field(&plaintext)?;
    Ok(AttributeValue::B(Blob::new(ciphertext)))
}

fn decode_encrypted(
    attr: &Attribute,
    wire: &AttributeValue,
    cipher: Option<&dyn FieldCipher>,
) -> Result<Value> {
    let cipher = cipher.ok_or_else(|| Error::EncryptionNotConfigured {
        attribute: attr.name.clone(),
    })?;

    let ciphertext = match wire {
        AttributeValue::B(b) => b.as_ref(),
        _ => {
            return Err(Error::InvalidData(format!(
                "encrypted attribute {} is not binary on the wire",
                attr.name
            )))
        }
    };

    let plaintext = cipher.decrypt_field(ciphertext)?;
    match attr.kind {
        AttrKind::String => String::from_utf8(plaintext)
            .map(Value::String)
            .map_err(|_| Error::InvalidData(format!("attribute {} is not UTF-8", attr.name))),
        AttrKind::Number => String::from_utf8(plaintext)
            .map(Value::Number)
            .map_err(|_| Error::InvalidData(format!("attribute {} is not UTF-8", attr.name))),
        AttrKind::Binary => Ok(Value::Binary(plaintext)),
        _ => Err(Error::InvalidData(format!(
            "encrypted attribute {} must be a scalar",
            attr.name
        ))),
    }
}
