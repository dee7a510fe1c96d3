//! The seam between typed records and the mapping layer.

use crate::error::Result;
use crate::schema::Schema;
use crate::value::Document;

/// A record type that can be stored and queried.
///
/// `schema` describes the wire shape once; `to_document`/`from_document`
/// exchange values keyed by field identity. All wire-name resolution happens
/// in the codec through the schema, so a record never needs to know its
/// store-side attribute names.
pub trait Model: Sized + Send + Sync + 'static {
    /// Builds the model descriptor. Called once per process; the result is
    /// cached by the schema registry. Malformed descriptors fail here, before
    /// any network call.
    fn schema() -> Result<Schema>;

    /// Record state keyed by field identity.
    fn to_document(&self) -> Document;

    /// Rebuilds a record from a decoded document. Missing optional fields
    /// decode to the field's zero value.
    fn from_document(doc: &Document) -> Result<Self>;
}
