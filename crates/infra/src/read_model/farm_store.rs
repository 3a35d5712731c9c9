use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, RwLock};

use herdbook_core::FarmId;

/// Farm-isolated key/value store for disposable read models.
///
/// Every read and write names the farm; there is no cross-farm listing.
pub trait FarmStore<K, V>: Send + Sync {
    fn get(&self, farm_id: FarmId, key: &K) -> Option<V>;
    fn upsert(&self, farm_id: FarmId, key: K, value: V);
    fn remove(&self, farm_id: FarmId, key: &K) -> Option<V>;
    fn list(&self, farm_id: FarmId) -> Vec<V>;
    /// Drop every record of a farm (rebuild support).
    fn clear_farm(&self, farm_id: FarmId);
}

impl<K, V, S> FarmStore<K, V> for Arc<S>
where
    S: FarmStore<K, V> + ?Sized,
{
    fn get(&self, farm_id: FarmId, key: &K) -> Option<V> {
        (**self).get(farm_id, key)
    }

    fn upsert(&self, farm_id: FarmId, key: K, value: V) {
        (**self).upsert(farm_id, key, value)
    }

    fn remove(&self, farm_id: FarmId, key: &K) -> Option<V> {
        (**self).remove(farm_id, key)
    }

    fn list(&self, farm_id: FarmId) -> Vec<V> {
        (**self).list(farm_id)
    }

    fn clear_farm(&self, farm_id: FarmId) {
        (**self).clear_farm(farm_id)
    }
}

#[derive(Debug)]
pub struct InMemoryFarmStore<K, V> {
    inner: RwLock<HashMap<(FarmId, K), V>>,
}

impl<K, V> InMemoryFarmStore<K, V> {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
        }
    }
}

impl<K, V> Default for InMemoryFarmStore<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> FarmStore<K, V> for InMemoryFarmStore<K, V>
where
    K: Clone + Eq + Hash + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn get(&self, farm_id: FarmId, key: &K) -> Option<V> {
        let map = self.inner.read().ok()?;
        map.get(&(farm_id, key.clone())).cloned()
    }

    fn upsert(&self, farm_id: FarmId, key: K, value: V) {
        if let Ok(mut map) = self.inner.write() {
            map.insert((farm_id, key), value);
        }
    }

    fn remove(&self, farm_id: FarmId, key: &K) -> Option<V> {
        let mut map = self.inner.write().ok()?;
        map.remove(&(farm_id, key.clone()))
    }

    fn list(&self, farm_id: FarmId) -> Vec<V> {
        let map = match self.inner.read() {
            Ok(m) => m,
            Err(_) => return vec![],
        };

        map.iter()
            .filter_map(|((f, _k), v)| if *f == farm_id { Some(v.clone()) } else { None })
            .collect()
    }

    fn clear_farm(&self, farm_id: FarmId) {
        if let Ok(mut map) = self.inner.write() {
            map.retain(|(f, _k), _v| *f != farm_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn farms_do_not_see_each_other() {
        let store: InMemoryFarmStore<u32, &'static str> = InMemoryFarmStore::new();
        let a = FarmId::new();
        let b = FarmId::new();
        store.upsert(a, 1, "Зорька");
        store.upsert(b, 1, "Ночка");

        assert_eq!(store.get(a, &1), Some("Зорька"));
        assert_eq!(store.list(b), vec!["Ночка"]);

        assert_eq!(store.remove(a, &1), Some("Зорька"));
        assert!(store.get(a, &1).is_none());
        assert_eq!(store.get(b, &1), Some("Ночка"));

        store.clear_farm(b);
        assert!(store.list(b).is_empty());
    }
}
