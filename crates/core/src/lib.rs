//! Store-agnostic core for the tablemap mapper: document values, model
//! descriptors, the typed error taxonomy, and the consistency-retry engine.

pub mod error;
pub mod model;
pub mod retry;
pub mod schema;
pub mod value;

pub use error::{Error, Result};
pub use model::Model;
pub use retry::{retry_with_verification, RetryConfig};
pub use schema::{AttrKind, Attribute, IndexDef, Projection, Schema};
pub use value::{Document, Value};
