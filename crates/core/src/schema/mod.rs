//! Model descriptors: static metadata describing how a record type maps onto
//! the store's wire representation.
//!
//! A [`Schema`] is built once per record type through [`SchemaBuilder`] and
//! validated at construction. Every lookup the codec or expression builder
//! performs goes through the schema's wire attribute names; record field
//! identities are only ever an input to the mapping, never a fallback key.

mod registry;

pub use registry::resolve;

use std::sync::Arc;

use crate::error::{Error, Result};

/// Lazily resolved reference to a nested record type's schema.
///
/// Nested records recurse through their own descriptor, so an inner type
/// whose wire names differ from the outer type's fields stays correct.
pub type SchemaRef = fn() -> Result<Arc<Schema>>;

/// Store-side shape of a single attribute.
#[derive(Debug, Clone)]
pub enum AttrKind {
    String,
    Number,
    Binary,
    Bool,
    StringSet,
    NumberSet,
    BinarySet,
    List,
    Map,
    /// Nested record with its own schema.
    Record(SchemaRef),
}

impl PartialEq for AttrKind {
    fn eq(&self, other: &Self) -> bool {
        // Fn-pointer addresses are not stable across codegen units, so two
        // `Record` variants count as the same kind regardless of which
        // schema they resolve.
        std::mem::discriminant(self) == std::mem::discriminant(other)
    }
}

impl AttrKind {
    /// Scalar kinds are the only ones usable as key or encrypted attributes.
    pub fn is_key_scalar(&self) -> bool {
        matches!(self, AttrKind::String | AttrKind::Number | AttrKind::Binary)
    }
}

/// One attribute of a record type.
#[derive(Debug, Clone, PartialEq)]
pub struct Attribute {
    /// Wire attribute name.
    pub name: String,
    /// Source field identity on the record type.
    pub field: String,
    pub kind: AttrKind,
    pub optional: bool,
    pub omit_empty: bool,
    pub encrypted: bool,
}

impl Attribute {
    /// New attribute whose field identity defaults to the wire name.
    pub fn new(name: impl Into<String>, kind: AttrKind) -> Self {
        let name = name.into();
        Attribute {
            field: name.clone(),
            name,
            kind,
            optional: false,
            omit_empty: false,
            encrypted: false,
        }
    }

    pub fn string(name: impl Into<String>) -> Self {
        Attribute::new(name, AttrKind::String)
    }

    pub fn number(name: impl Into<String>) -> Self {
        Attribute::new(name, AttrKind::Number)
    }

    /// Overrides the source field identity when it differs from the wire name.
    pub fn field(mut self, field: impl Into<String>) -> Self {
        self.field = field.into();
        self
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    pub fn omit_empty(mut self) -> Self {
        self.omit_empty = true;
        self
    }

    pub fn encrypted(mut self) -> Self {
        self.encrypted = true;
        self
    }
}

/// Projection kind of a secondary index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Projection {
    All,
    KeysOnly,
    Include(Vec<String>),
}

/// A secondary index over the same data.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexDef {
    pub name: String,
    pub partition_attribute: String,
    pub sort_attribute: Option<String>,
    pub projection: Projection,
}

impl IndexDef {
    pub fn new(name: impl Into<String>, partition_attribute: impl Into<String>) -> Self {
        IndexDef {
            name: name.into(),
            partition_attribute: partition_attribute.into(),
            sort_attribute: None,
            projection: Projection::All,
        }
    }

    pub fn sort(mut self, sort_attribute: impl Into<String>) -> Self {
        self.sort_attribute = Some(sort_attribute.into());
        self
    }

    pub fn projection(mut self, projection: Projection) -> Self {
        self.projection = projection;
        self
    }
}

/// Active key attributes for a request, after index selection.
#[derive(Debug, Clone, Copy)]
pub struct KeySchema<'a> {
    pub partition: &'a Attribute,
    pub sort: Option<&'a Attribute>,
}

/// Immutable, validated metadata for one record type.
#[derive(Debug, Clone, PartialEq)]
pub struct Schema {
    entity: &'static str,
    attributes: Vec<Attribute>,
    partition_key: usize,
    sort_key: Option<usize>,
    version: Option<usize>,
    indexes: Vec<IndexDef>,
}

impl Schema {
    pub fn builder(entity: &'static str) -> SchemaBuilder {
        SchemaBuilder {
            entity,
            attributes: Vec::new(),
            partition_key: None,
            sort_key: None,
            version: None,
            indexes: Vec::new(),
        }
    }

    pub fn entity(&self) -> &'static str {
        self.entity
    }

    pub fn attributes(&self) -> &[Attribute] {
        &self.attributes
    }

    /// Looks up an attribute by wire name.
    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.attributes.iter().find(|a| a.name == name)
    }

    pub fn partition_key(&self) -> &Attribute {
        &self.attributes[self.partition_key]
    }

    pub fn sort_key(&self) -> Option<&Attribute> {
        self.sort_key.map(|i| &self.attributes[i])
    }

    pub fn version_attribute(&self) -> Option<&Attribute> {
        self.version.map(|i| &self.attributes[i])
    }

    pub fn indexes(&self) -> &[IndexDef] {
        &self.indexes
    }

    pub fn index(&self, name: &str) -> Option<&IndexDef> {
        self.indexes.iter().find(|i| i.name == name)
    }

    /// Resolves the active partition/sort attributes for a request. An index
    /// name the schema does not know is a request-validation error.
    pub fn key_schema(&self, index: Option<&str>) -> Result<KeySchema<'_>> {
        match index {
            None => Ok(KeySchema {
                partition: self.partition_key(),
                sort: self.sort_key(),
            }),
            Some(name) => {
                let index = self.index(name).ok_or_else(|| {
                    Error::InvalidOperator(format!(
                        "unknown index {name} on {}",
                        self.entity
                    ))
                })?;
                let partition = self.attribute(&index.partition_attribute).ok_or_else(|| {
                    Error::InvalidModel(format!(
                        "index {name} references missing attribute {}",
                        index.partition_attribute
                    ))
                })?;
                let sort = match &index.sort_attribute {
                    Some(attr) => Some(self.attribute(attr).ok_or_else(|| {
                        Error::InvalidModel(format!(
                            "index {name} references missing attribute {attr}"
                        ))
                    })?),
                    None => None,
                };
                Ok(KeySchema { partition, sort })
            }
        }
    }

    /// Whether any attribute carries the encryption marker.
    pub fn has_encrypted_attributes(&self) -> bool {
        self.attributes.iter().any(|a| a.encrypted)
    }
}

/// Builder with construction-time validation.
pub struct SchemaBuilder {
    entity: &'static str,
    attributes: Vec<Attribute>,
    partition_key: Option<String>,
    sort_key: Option<String>,
    version: Option<String>,
    indexes: Vec<IndexDef>,
}

impl SchemaBuilder {
    pub fn attribute(mut self, attribute: Attribute) -> Self {
        self.attributes.push(attribute);
        self
    }

    /// Marks the attribute with the given wire name as the partition key.
    pub fn partition_key(mut self, name: impl Into<String>) -> Self {
        self.partition_key = Some(name.into());
        self
    }

    pub fn sort_key(mut self, name: impl Into<String>) -> Self {
        self.sort_key = Some(name.into());
        self
    }

    /// Marks a numeric attribute for optimistic-concurrency versioning.
    pub fn version(mut self, name: impl Into<String>) -> Self {
        self.version = Some(name.into());
        self
    }

    pub fn index(mut self, index: IndexDef) -> Self {
        self.indexes.push(index);
        self
    }

    pub fn build(self) -> Result<Schema> {
        let entity = self.entity;
        if self.attributes.is_empty() {
            return Err(Error::InvalidModel(format!("{entity} has no attributes")));
        }

        for (i, attr) in self.attributes.iter().enumerate() {
            if self.attributes[..i].iter().any(|a| a.name == attr.name) {
                return Err(Error::InvalidModel(format!(
                    "{entity} declares duplicate attribute name {}",
                    attr.name
                )));
            }
            if self.attributes[..i].iter().any(|a| a.field == attr.field) {
                return Err(Error::InvalidModel(format!(
                    "{entity} declares duplicate field identity {}",
                    attr.field
                )));
            }
            if attr.encrypted && !attr.kind.is_key_scalar() {
                return Err(Error::InvalidModel(format!(
                    "{entity}.{} is encrypted but not a scalar",
                    attr.name
                )));
            }
        }

        let find = |name: &str| self.attributes.iter().position(|a| a.name == name);

        let partition_key = match &self.partition_key {
            Some(name) => find(name).ok_or_else(|| Error::MissingPrimaryKey {
                attribute: name.clone(),
            })?,
            None => {
                return Err(Error::MissingPrimaryKey {
                    attribute: format!("{entity} declares no partition key"),
                })
            }
        };
        let sort_key = match &self.sort_key {
            Some(name) => Some(find(name).ok_or_else(|| {
                Error::InvalidModel(format!("{entity} sort key {name} is not an attribute"))
            })?),
            None => None,
        };

        for idx in [Some(partition_key), sort_key].into_iter().flatten() {
            let attr = &self.attributes[idx];
            if !attr.kind.is_key_scalar() {
                return Err(Error::InvalidModel(format!(
                    "{entity} key attribute {} must be a scalar",
                    attr.name
                )));
            }
            if attr.optional {
                return Err(Error::InvalidModel(format!(
                    "{entity} key attribute {} cannot be optional",
                    attr.name
                )));
            }
            // Ciphertext keys can never match plaintext lookup operands.
            if attr.encrypted {
                return Err(Error::InvalidModel(format!(
                    "{entity} key attribute {} cannot be encrypted",
                    attr.name
                )));
            }
        }

        let version = match &self.version {
            Some(name) => {
                let idx = find(name).ok_or_else(|| {
                    Error::InvalidModel(format!(
                        "{entity} version attribute {name} is not an attribute"
                    ))
                })?;
                if self.attributes[idx].kind != AttrKind::Number {
                    return Err(Error::InvalidModel(format!(
                        "{entity} version attribute {name} must be numeric"
                    )));
                }
                Some(idx)
            }
            None => None,
        };

        for (i, index) in self.indexes.iter().enumerate() {
            if self.indexes[..i].iter().any(|other| other.name == index.name) {
                return Err(Error::InvalidModel(format!(
                    "{entity} declares duplicate index {}",
                    index.name
                )));
            }
            for attr_name in std::iter::once(&index.partition_attribute)
                .chain(index.sort_attribute.iter())
            {
                let attr = self
                    .attributes
                    .iter()
                    .find(|a| a.name == *attr_name)
                    .ok_or_else(|| {
                        Error::InvalidModel(format!(
                            "{entity} index {} references missing attribute {attr_name}",
                            index.name
                        ))
                    })?;
                if !attr.kind.is_key_scalar() {
                    return Err(Error::InvalidModel(format!(
                        "{entity} index {} key attribute {attr_name} must be a scalar",
                        index.name
                    )));
                }
                if attr.encrypted {
                    return Err(Error::InvalidModel(format!(
                        "{entity} index {} key attribute {attr_name} cannot be encrypted",
                        index.name
                    )));
                }
            }
        }

        Ok(Schema {
            entity,
            attributes: self.attributes,
            partition_key,
            sort_key,
            version,
            indexes: self.indexes,
        })
    }
}
