use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

/// Type-erased map where the type IS the key. Entries are shared, so a lookup
/// can outlive the lock guarding the map.
pub(crate) struct TypeMap(HashMap<TypeId, Arc<dyn Any + Send + Sync>>);

impl TypeMap {
    pub fn new() -> Self {
        Self(HashMap::new())
    }

    pub fn get<T: Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        self.0
            .get(&TypeId::of::<T>())
            .and_then(|entry| entry.clone().downcast().ok())
    }

    /// Keeps an existing entry; returns whichever entry ends up in the map.
    pub fn get_or_insert<T: Send + Sync + 'static>(&mut self, value: Arc<T>) -> Arc<T> {
        if let Some(existing) = self.get::<T>() {
            return existing;
        }
        self.0.insert(TypeId::of::<T>(), value.clone());
        value
    }
}
