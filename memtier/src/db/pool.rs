use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock, Weak};

/// Process-wide registry of live pools keyed by connection string, so two
/// adapters opened against the same endpoint share one underlying pool
/// (§4.1: "opening N adapters to the same endpoint shares one pool"). The
/// registry only ever holds weak references — the strong owner is the
/// `PoolHandle` itself, and the entry disappears once the last handle drops.
type Registry<T> = Mutex<HashMap<String, Weak<T>>>;

/// Lazily-built registry keyed by `TypeId`, so each concrete pool type `T`
/// gets its own `HashMap<String, Weak<T>>` without requiring a separate
/// static per backend.
fn type_registry<T: Send + Sync + 'static>() -> &'static Registry<T> {
    use std::any::TypeId;
    use std::sync::RwLock;

    static MAP: OnceLock<RwLock<HashMap<TypeId, &'static (dyn std::any::Any + Send + Sync)>>> =
        OnceLock::new();
    let map = MAP.get_or_init(|| RwLock::new(HashMap::new()));

    let type_id = TypeId::of::<T>();
    if let Some(existing) = map.read().unwrap().get(&type_id) {
        return existing.downcast_ref::<Registry<T>>().unwrap();
    }

    let mut write = map.write().unwrap();
    let entry = write
        .entry(type_id)
        .or_insert_with(|| Box::leak(Box::new(Registry::<T>::new(HashMap::new()))));
    entry.downcast_ref::<Registry<T>>().unwrap()
}

/// A reference-counted handle over a pooled connection object `T`. `Clone`
/// shares the same underlying `Arc<T>`; the pool is destroyed (removed from
/// the registry) only when the last handle drops, since `Weak::upgrade`
/// then fails for any later lookup and `get_or_create` builds a fresh one.
pub struct PoolHandle<T: Send + Sync + 'static> {
    inner: Arc<T>,
}

impl<T: Send + Sync + 'static> Clone for PoolHandle<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Send + Sync + 'static> PoolHandle<T> {
    /// Returns a handle sharing the pool already registered for `key`, or
    /// builds one via `build` and registers it.
    pub fn acquire<F>(key: &str, build: F) -> crate::error::Result<Self>
    where
        F: FnOnce() -> crate::error::Result<T>,
    {
        let reg = type_registry::<T>();

        if let Some(existing) = reg.lock().unwrap().get(key).and_then(Weak::upgrade) {
            return Ok(Self { inner: existing });
        }

        let built = Arc::new(build()?);
        reg.lock().unwrap().insert(key.to_string(), Arc::downgrade(&built));
        Ok(Self { inner: built })
    }

    pub fn as_ref(&self) -> &T {
        &self.inner
    }

    /// Number of live handles sharing this pool (includes this one).
    pub fn refcount(&self) -> usize {
        Arc::strong_count(&self.inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct DummyPool(u32);

    #[test]
    fn test_acquire_shares_pool_for_same_key() {
        let a = PoolHandle::<DummyPool>::acquire("conn-a", || Ok(DummyPool(1))).unwrap();
        let b = PoolHandle::<DummyPool>::acquire("conn-a", || Ok(DummyPool(2))).unwrap();
        assert_eq!(a.as_ref().0, b.as_ref().0);
        assert_eq!(a.refcount(), 2);
    }

    #[test]
    fn test_acquire_builds_separate_pool_for_different_key() {
        let a = PoolHandle::<DummyPool>::acquire("conn-b1", || Ok(DummyPool(10))).unwrap();
        let b = PoolHandle::<DummyPool>::acquire("conn-b2", || Ok(DummyPool(20))).unwrap();
        assert_ne!(a.as_ref().0, b.as_ref().0);
    }

    #[test]
    fn test_pool_rebuilt_after_all_handles_dropped() {
        {
            let _a = PoolHandle::<DummyPool>::acquire("conn-c", || Ok(DummyPool(100))).unwrap();
        }
        let b = PoolHandle::<DummyPool>::acquire("conn-c", || Ok(DummyPool(200))).unwrap();
        assert_eq!(b.as_ref().0, 200);
    }
}
