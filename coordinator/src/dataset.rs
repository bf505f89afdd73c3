use comms::specs::PartKey;

use crate::WorkerAddress;

/// Where a single partition of a distributed dataset lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placement {
    pub key: PartKey,
    pub worker: WorkerAddress,
    pub rows: usize,
}

/// A dataset scattered over the workers of a cluster.
///
/// The placements are kept in partition order, which is the order of the
/// rows of the whole dataset.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DistributedDataset {
    placements: Vec<Placement>,
}

impl DistributedDataset {
    pub fn new(placements: Vec<Placement>) -> Self {
        Self { placements }
    }

    pub fn placements(&self) -> &[Placement] {
        &self.placements
    }

    /// The amount of partitions.
    pub fn len(&self) -> usize {
        self.placements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.placements.is_empty()
    }

    /// The amount of rows over every partition.
    pub fn rows(&self) -> usize {
        self.placements.iter().map(|p| p.rows).sum()
    }

    /// The partition keys held by every worker, workers in first-seen order.
    pub fn keys_per_worker(&self) -> Vec<(&WorkerAddress, Vec<PartKey>)> {
        let mut per_worker: Vec<(&WorkerAddress, Vec<PartKey>)> = Vec::new();

        for placement in &self.placements {
            match per_worker.iter_mut().find(|(w, _)| *w == &placement.worker) {
                Some((_, keys)) => keys.push(placement.key.clone()),
                None => per_worker.push((&placement.worker, vec![placement.key.clone()])),
            }
        }

        per_worker
    }
}

/// Every partition a single worker trains on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerShard {
    pub worker: WorkerAddress,
    pub parts: Vec<PartKey>,
    pub rows: usize,
}

impl WorkerShard {
    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }
}

/// The shards of a round, one per worker, in round order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkerShards {
    shards: Vec<WorkerShard>,
}

impl WorkerShards {
    /// Groups `placements` by worker. Workers keep the order in which they're
    /// first seen and their parts keep partition order.
    pub fn from_placements(placements: &[Placement]) -> Self {
        let mut shards: Vec<WorkerShard> = Vec::new();

        for placement in placements {
            match shards.iter_mut().find(|s| s.worker == placement.worker) {
                Some(shard) => {
                    shard.parts.push(placement.key.clone());
                    shard.rows += placement.rows;
                }
                None => shards.push(WorkerShard {
                    worker: placement.worker.clone(),
                    parts: vec![placement.key.clone()],
                    rows: placement.rows,
                }),
            }
        }

        Self { shards }
    }

    pub fn iter(&self) -> impl Iterator<Item = &WorkerShard> {
        self.shards.iter()
    }

    pub fn len(&self) -> usize {
        self.shards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shards.is_empty()
    }

    /// The round's workers in round order.
    pub fn addresses(&self) -> Vec<WorkerAddress> {
        self.shards.iter().map(|s| s.worker.clone()).collect()
    }

    /// The worker whose model the round returns: the first one holding rows.
    pub fn master(&self) -> Option<&WorkerAddress> {
        self.shards.iter().find(|s| !s.is_empty()).map(|s| &s.worker)
    }
}

impl FromIterator<WorkerShard> for WorkerShards {
    fn from_iter<T: IntoIterator<Item = WorkerShard>>(iter: T) -> Self {
        Self {
            shards: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn placement(key: &str, worker: &str, rows: usize) -> Placement {
        Placement {
            key: key.into(),
            worker: worker.parse().unwrap(),
            rows,
        }
    }

    #[test]
    fn groups_in_first_seen_order() {
        let placements = [
            placement("p0", "tcp://b:1", 0),
            placement("p1", "tcp://a:1", 10),
            placement("p2", "tcp://b:1", 5),
        ];

        let shards = WorkerShards::from_placements(&placements);
        let addresses: Vec<_> = shards.addresses().iter().map(ToString::to_string).collect();
        assert_eq!(addresses, ["tcp://b:1", "tcp://a:1"]);

        let first = shards.iter().next().unwrap();
        assert_eq!(first.parts, vec![PartKey::new("p0"), PartKey::new("p2")]);
        assert_eq!(first.rows, 5);
    }

    #[test]
    fn master_is_first_worker_with_rows() {
        let placements = [
            placement("p0", "tcp://a:1", 0),
            placement("p1", "tcp://b:1", 3),
            placement("p2", "tcp://c:1", 7),
        ];
        let shards = WorkerShards::from_placements(&placements);
        assert_eq!(shards.master().map(WorkerAddress::as_str), Some("tcp://b:1"));

        let empty = WorkerShards::from_placements(&[placement("p0", "tcp://a:1", 0)]);
        assert_eq!(empty.master(), None);
    }

    #[test]
    fn counts_rows() {
        let data = DistributedDataset::new(vec![
            placement("p0", "tcp://a:1", 2),
            placement("p1", "tcp://b:1", 3),
        ]);
        assert_eq!(data.rows(), 5);
        assert_eq!(data.len(), 2);
    }

    #[test]
    fn keys_grouped_per_worker() {
        let data = DistributedDataset::new(vec![
            placement("p0", "tcp://b:1", 2),
            placement("p1", "tcp://a:1", 3),
            placement("p2", "tcp://b:1", 1),
        ]);

        let per_worker: Vec<_> = data
            .keys_per_worker()
            .into_iter()
            .map(|(w, keys)| (w.to_string(), keys))
            .collect();
        assert_eq!(
            per_worker,
            vec![
                ("tcp://b:1".to_string(), vec![PartKey::new("p0"), PartKey::new("p2")]),
                ("tcp://a:1".to_string(), vec![PartKey::new("p1")]),
            ]
        );
    }
}
