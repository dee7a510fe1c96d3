//! Opaque pagination cursors.
//!
//! A cursor captures the last evaluated key of a page plus the index and
//! sort direction the page was produced under, serialized as JSON and
//! wrapped in URL-safe base64. Callers treat the token as opaque; any
//! token that fails to decode is rejected as a whole.

use std::collections::HashMap;

use aws_sdk_dynamodb::primitives::Blob;
use aws_sdk_dynamodb::types::AttributeValue;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use tablemap_core::{Error, Result};

use crate::Item;

/// Wire form of a single key attribute inside a cursor token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum KeyValue {
    #[serde(rename = "S")]
    String(String),
    #[serde(rename = "N")]
    Number(String),
    #[serde(rename = "B")]
    Binary(String),
    #[serde(rename = "BOOL")]
    Bool(bool),
    #[serde(rename = "NULL")]
    Null(bool),
    #[serde(rename = "L")]
    List(Vec<KeyValue>),
    #[serde(rename = "M")]
    Map(HashMap<String, KeyValue>),
    #[serde(rename = "SS")]
    StringSet(Vec<String>),
    #[serde(rename = "NS")]
    NumberSet(Vec<String>),
    #[serde(rename = "BS")]
    BinarySet(Vec<String>),
}

impl KeyValue {
    fn from_attribute(value: &AttributeValue) -> Result<Self> {
        match value {
            AttributeValue::S(s) => Ok(KeyValue::String(s.clone())),
            AttributeValue::N(n) => Ok(KeyValue::Number(n.clone())),
            AttributeValue::B(b) => Ok(KeyValue::Binary(URL_SAFE_NO_PAD.encode(b.as_ref()))),
            AttributeValue::Bool(b) => Ok(KeyValue::Bool(*b)),
            AttributeValue::Null(n) => Ok(KeyValue::Null(*n)),
            AttributeValue::L(list) => Ok(KeyValue::List(
                list.iter()
                    .map(KeyValue::from_attribute)
                    .collect::<Result<_>>()?,
            )),
            AttributeValue::M(map) => Ok(KeyValue::Map(
                map.iter()
                    .map(|(k, v)| Ok((k.clone(), KeyValue::from_attribute(v)?)))
                    .collect::<Result<_>>()?,
            )),
            AttributeValue::Ss(set) => Ok(KeyValue::StringSet(set.clone())),
            AttributeValue::Ns(set) => Ok(KeyValue::NumberSet(set.clone())),
            AttributeValue::Bs(set) => Ok(KeyValue::BinarySet(
                set.iter().map(|b| URL_SAFE_NO_PAD.encode(b.as_ref())).collect(),
            )),
            other => Err(Error::Cursor(format!(
                "unsupported key attribute in cursor: {other:?}"
            ))),
        }
    }

    fn into_attribute(self) -> Result<AttributeValue> {
        match self {
            KeyValue::String(s) => Ok(AttributeValue::S(s)),
            KeyValue::Number(n) => Ok(AttributeValue::N(n)),
            KeyValue::Binary(b) => Ok(AttributeValue::B(Blob::new(decode_bytes(&b)?))),
            KeyValue::Bool(b) => Ok(AttributeValue::Bool(b)),
            KeyValue::Null(n) => Ok(AttributeValue::Null(n)),
            KeyValue::List(list) => Ok(AttributeValue::L(
                list.into_iter()
                    .map(KeyValue::into_attribute)
                    .collect::<Result<_>>()?,
            )),
            KeyValue::Map(map) => Ok(AttributeValue::M(
                map.into_iter()
                    .map(|(k, v)| Ok((k, v.into_attribute()?)))
                    .collect::<Result<_>>()?,
            )),
            KeyValue::StringSet(set) => Ok(AttributeValue::Ss(set)),
            KeyValue::NumberSet(set) => Ok(AttributeValue::Ns(set)),
            KeyValue::BinarySet(set) => Ok(AttributeValue::Bs(
                set.iter()
                    .map(|b| Ok(Blob::new(decode_bytes(b)?)))
                    .collect::<Result<_>>()?,
            )),
        }
    }
}

fn decode_bytes(encoded: &str) -> Result<Vec<u8>> {
    URL_SAFE_NO_PAD
        .decode(encoded)
        .map_err(|e| Error::Cursor(format!("invalid binary in cursor: {e}")))
}

/// Decoded cursor state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cursor {
    #[serde(rename = "lastKey")]
    pub last_key: HashMap<String, KeyValue>,
    #[serde(rename = "index", skip_serializing_if = "Option::is_none", default)]
    pub index: Option<String>,
    #[serde(rename = "sort", skip_serializing_if = "Option::is_none", default)]
    pub sort: Option<String>,
}

impl Cursor {
    /// Builds a cursor from a page's last evaluated key.
    pub fn from_last_key(
        last_key: &Item,
        index: Option<&str>,
        sort: Option<&str>,
    ) -> Result<Self> {
        let key = last_key
            .iter()
            .map(|(name, value)| Ok((name.clone(), KeyValue::from_attribute(value)?)))
            .collect::<Result<_>>()?;
        Ok(Cursor {
            last_key: key,
            index: index.map(str::to_string),
            sort: sort.map(str::to_string),
        })
    }

    /// Serializes into the opaque token handed to callers.
    pub fn encode(&self) -> Result<String> {
        let json =
            serde_json::to_vec(self).map_err(|e| Error::Cursor(format!("encode failed: {e}")))?;
        Ok(URL_SAFE_NO_PAD.encode(json))
    }

    /// Decodes a token. Any malformed token is rejected whole; no partial
    /// state is ever recovered from it.
    pub fn decode(token: &str) -> Result<Self> {
        let json = URL_SAFE_NO_PAD
            .decode(token)
            .map_err(|e| Error::Cursor(format!("invalid cursor token: {e}")))?;
        serde_json::from_slice(&json).map_err(|e| Error::Cursor(format!("invalid cursor token: {e}")))
    }

    /// Reconstructs the exclusive start key for the next request.
    pub fn exclusive_start_key(&self) -> Result<Item> {
        self.last_key
            .iter()
            .map(|(name, value)| Ok((name.clone(), value.clone().into_attribute()?)))
            .collect()
    }
}
