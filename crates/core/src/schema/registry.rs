//! Process-wide schema cache.
//!
//! Descriptors are built lazily on first use of a record type and live for
//! the process. Concurrent first builds may race; losers discard their copy
//! and adopt the one already cached, so every caller observes the same
//! `Arc<Schema>`.

use std::any::TypeId;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock, RwLock};

use crate::error::Result;
use crate::model::Model;
use crate::schema::Schema;

static REGISTRY: OnceLock<RwLock<HashMap<TypeId, Arc<Schema>>>> = OnceLock::new();

fn registry() -> &'static RwLock<HashMap<TypeId, Arc<Schema>>> {
    REGISTRY.get_or_init(|| RwLock::new(HashMap::new()))
}

/// Resolves the cached schema for `M`, building and validating it on first
/// use. Construction errors are not cached; a later call retries the build.
pub fn resolve<M: Model>() -> Result<Arc<Schema>> {
    let key = TypeId::of::<M>();

    if let Some(schema) = registry().read().expect("schema registry poisoned").get(&key) {
        return Ok(Arc::clone(schema));
    }

    // Build outside the lock; encoding is side-effect-free so a racing
    // duplicate build is only wasted work.
    let built = Arc::new(M::schema()?);

    let mut map = registry().write().expect("schema registry poisoned");
    let cached = map.entry(key).or_insert(built);
    Ok(Arc::clone(cached))
}
