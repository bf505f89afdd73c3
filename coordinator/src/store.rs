use std::{
    collections::HashMap,
    error::Error,
    fmt::{self, Display},
    sync::Arc,
};

use booster::Dataset;
use comms::specs::PartKey;
use parking_lot::RwLock;

/// Why a partition can't be served.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreErr {
    /// The partition was never stored here.
    Missing(PartKey),
    /// The partition failed to materialize.
    Poisoned { key: PartKey, msg: String },
    /// The partitions can't be concatenated into a single shard.
    Incompatible(String),
}

impl Display for StoreErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreErr::Missing(key) => write!(f, "partition {key} is not held here"),
            StoreErr::Poisoned { key, msg } => write!(f, "partition {key} failed: {msg}"),
            StoreErr::Incompatible(msg) => write!(f, "incompatible partitions: {msg}"),
        }
    }
}

impl Error for StoreErr {}

#[derive(Debug)]
enum Slot {
    Ready(Arc<Dataset>),
    Poisoned(String),
}

/// The partitions held by a single worker, shared between its tasks.
#[derive(Debug, Default)]
pub struct PartitionStore {
    parts: RwLock<HashMap<PartKey, Slot>>,
}

impl PartitionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `part` under `key`, replacing whatever was there.
    pub fn insert(&self, key: PartKey, part: Dataset) {
        self.parts.write().insert(key, Slot::Ready(Arc::new(part)));
    }

    /// Marks `key` as failed, every later read of it errors with `msg`.
    pub fn poison(&self, key: PartKey, msg: impl Into<String>) {
        self.parts.write().insert(key, Slot::Poisoned(msg.into()));
    }

    /// Drops every partition in `keys`, ready or poisoned. Tasks already
    /// reading one keep their copy until they're done.
    ///
    /// # Returns
    /// How many of `keys` were held.
    pub fn release<'a, I>(&self, keys: I) -> usize
    where
        I: IntoIterator<Item = &'a PartKey>,
    {
        let mut parts = self.parts.write();
        keys.into_iter()
            .filter(|key| parts.remove(*key).is_some())
            .count()
    }

    /// The subset of `keys` that can't be served, in the given order.
    pub fn missing<'a, I>(&self, keys: I) -> Vec<PartKey>
    where
        I: IntoIterator<Item = &'a PartKey>,
    {
        let parts = self.parts.read();
        keys.into_iter()
            .filter(|key| !matches!(parts.get(*key), Some(Slot::Ready(_))))
            .cloned()
            .collect()
    }

    /// # Errors
    /// Returns a `StoreErr` if the partition is missing or poisoned.
    pub fn get(&self, key: &PartKey) -> Result<Arc<Dataset>, StoreErr> {
        match self.parts.read().get(key) {
            Some(Slot::Ready(part)) => Ok(Arc::clone(part)),
            Some(Slot::Poisoned(msg)) => Err(StoreErr::Poisoned {
                key: key.clone(),
                msg: msg.clone(),
            }),
            None => Err(StoreErr::Missing(key.clone())),
        }
    }

    /// Concatenates the partitions named by `keys` into a single shard.
    ///
    /// A single partition is returned as is, without copying it.
    ///
    /// # Errors
    /// Returns a `StoreErr` if any partition can't be served or if their
    /// columns, labels or weights don't line up. An empty `keys` is
    /// `StoreErr::Incompatible` too.
    pub fn concat(&self, keys: &[PartKey]) -> Result<Arc<Dataset>, StoreErr> {
        let parts = keys
            .iter()
            .map(|key| self.get(key))
            .collect::<Result<Vec<_>, _>>()?;

        if let [part] = parts.as_slice() {
            return Ok(Arc::clone(part));
        }

        let refs: Vec<&Dataset> = parts.iter().map(Arc::as_ref).collect();
        Dataset::concat(&refs)
            .map(Arc::new)
            .map_err(|e| StoreErr::Incompatible(e.to_string()))
    }

    pub fn len(&self) -> usize {
        self.parts.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.parts.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use ndarray::array;

    use super::*;

    fn part(rows: &[f64]) -> Dataset {
        let x = ndarray::Array2::from_shape_vec((rows.len(), 1), rows.to_vec()).unwrap();
        Dataset::new(x, rows.to_vec().into(), None).unwrap()
    }

    #[test]
    fn insert_get_and_missing() {
        let store = PartitionStore::new();
        store.insert("a".into(), part(&[1.0]));

        assert_eq!(store.get(&"a".into()).unwrap().rows(), 1);
        assert_eq!(store.get(&"b".into()), Err(StoreErr::Missing("b".into())));

        let keys: [PartKey; 2] = ["a".into(), "b".into()];
        assert_eq!(store.missing(&keys), vec![PartKey::new("b")]);
    }

    #[test]
    fn poisoned_partitions_fail_reads() {
        let store = PartitionStore::new();
        store.insert("a".into(), part(&[1.0]));
        store.poison("a".into(), "lost worker memory");

        assert!(matches!(
            store.get(&"a".into()),
            Err(StoreErr::Poisoned { msg, .. }) if msg == "lost worker memory"
        ));
        assert_eq!(store.missing(&[PartKey::new("a")]).len(), 1);
    }

    #[test]
    fn release_drops_ready_and_poisoned_parts() {
        let store = PartitionStore::new();
        store.insert("a".into(), part(&[1.0]));
        store.insert("b".into(), part(&[2.0]));
        store.poison("c".into(), "lost");

        let held = store.get(&"a".into()).unwrap();
        let keys: [PartKey; 3] = ["a".into(), "c".into(), "z".into()];
        assert_eq!(store.release(&keys), 2);

        assert_eq!(store.len(), 1);
        assert_eq!(store.get(&"a".into()), Err(StoreErr::Missing("a".into())));
        assert_eq!(held.rows(), 1);
    }

    #[test]
    fn concat_keeps_key_order() {
        let store = PartitionStore::new();
        store.insert("a".into(), part(&[1.0, 2.0]));
        store.insert("b".into(), part(&[3.0]));

        let shard = store.concat(&["b".into(), "a".into()]).unwrap();
        assert_eq!(shard.features(), array![[3.0], [1.0], [2.0]]);
        assert_eq!(shard.labels().unwrap(), array![3.0, 1.0, 2.0]);
    }

    #[test]
    fn concat_fails_on_missing_or_nothing() {
        let store = PartitionStore::new();
        store.insert("a".into(), part(&[1.0]));

        assert!(matches!(
            store.concat(&["a".into(), "z".into()]),
            Err(StoreErr::Missing(_))
        ));
        assert!(matches!(store.concat(&[]), Err(StoreErr::Incompatible(_))));
    }
}
