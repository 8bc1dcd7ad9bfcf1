use std::{collections::HashMap, hash::Hash};

use tokio::sync::RwLock;

/// Async map cache handing out clones of the stored values.
/// Readers never block each other, writers take the map exclusively.
#[derive(Debug)]
pub struct CloneCache<K: PartialEq + Eq + Hash, T: Clone>(
  RwLock<HashMap<K, T>>,
);

impl<K: PartialEq + Eq + Hash, T: Clone> Default
  for CloneCache<K, T>
{
  fn default() -> Self {
    Self(RwLock::new(HashMap::new()))
  }
}

impl<K: PartialEq + Eq + Hash + Clone, T: Clone> CloneCache<K, T> {
  pub async fn get(&self, key: &K) -> Option<T> {
    self.0.read().await.get(key).cloned()
  }

  pub async fn get_keys(&self) -> Vec<K> {
    let cache = self.0.read().await;
    cache.keys().cloned().collect()
  }

  pub async fn get_values(&self) -> Vec<T> {
    let cache = self.0.read().await;
    cache.values().cloned().collect()
  }

  pub async fn get_entries(&self) -> Vec<(K, T)> {
    let cache = self.0.read().await;
    cache.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
  }

  pub async fn insert<Key>(&self, key: Key, val: T) -> Option<T>
  where
    Key: Into<K>,
  {
    self.0.write().await.insert(key.into(), val)
  }

  pub async fn remove(&self, key: &K) -> Option<T> {
    self.0.write().await.remove(key)
  }

  pub async fn retain(&self, keep: impl FnMut(&K, &mut T) -> bool) {
    self.0.write().await.retain(keep);
  }
}

impl<K: PartialEq + Eq + Hash + Clone, T: Clone> CloneCache<K, T> {
  pub async fn get_or_insert_with(
    &self,
    key: &K,
    init: impl FnOnce() -> T,
  ) -> T {
    let mut lock = self.0.write().await;
    match lock.get(key).cloned() {
      Some(item) => item,
      None => {
        let item = init();
        lock.insert(key.clone(), item.clone());
        item
      }
    }
  }
}

impl<K: PartialEq + Eq + Hash + Clone, T: Clone + Default>
  CloneCache<K, T>
{
  pub async fn get_or_insert_default(&self, key: &K) -> T {
    self.get_or_insert_with(key, Default::default).await
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[tokio::test]
  async fn insert_get_remove() {
    let cache = CloneCache::<String, i64>::default();
    assert_eq!(cache.get(&"a".to_string()).await, None);
    cache.insert("a", 1).await;
    assert_eq!(cache.get(&"a".to_string()).await, Some(1));
    assert_eq!(cache.remove(&"a".to_string()).await, Some(1));
    assert_eq!(cache.get(&"a".to_string()).await, None);
  }

  #[tokio::test]
  async fn retain_drops_filtered_entries() {
    let cache = CloneCache::<String, i64>::default();
    cache.insert("keep", 1).await;
    cache.insert("drop", 2).await;
    cache.retain(|_, val| *val < 2).await;
    assert_eq!(cache.get(&"keep".to_string()).await, Some(1));
    assert_eq!(cache.get(&"drop".to_string()).await, None);
  }

  #[tokio::test]
  async fn get_or_insert_default_inserts_once() {
    let cache = CloneCache::<String, Vec<i64>>::default();
    let first = cache.get_or_insert_default(&"k".to_string()).await;
    assert!(first.is_empty());
    cache.insert("k", vec![5]).await;
    let second = cache.get_or_insert_default(&"k".to_string()).await;
    assert_eq!(second, vec![5]);
  }
}
