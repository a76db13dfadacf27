use crate::hash::fnv1a_64;
use std::collections::{BTreeMap, HashSet};

/// Consistent-hash ring over worker nodes (spec §4.1, §4.5: "replica
/// selection"), grounded on the teacher's
/// `persist::cluster::routing::shard_hash::stable_shard_for` FNV-1a scheme,
/// generalized from a fixed-shard-count modulo lookup into a virtual-node
/// ring so worker join/leave only reshuffles a fraction of objects.
#[derive(Debug, Clone)]
pub struct HashRing {
    virtual_nodes_per_worker: usize,
    ring: BTreeMap<u64, String>,
    unhealthy: HashSet<String>,
}

impl HashRing {
    pub fn new(virtual_nodes_per_worker: usize) -> Self {
        Self {
            virtual_nodes_per_worker: virtual_nodes_per_worker.max(1),
            ring: BTreeMap::new(),
            unhealthy: HashSet::new(),
        }
    }

    pub fn add_worker(&mut self, worker_id: &str) {
        for vnode in 0..self.virtual_nodes_per_worker {
            let key = fnv1a_64(&[worker_id, &vnode.to_string()]);
            self.ring.insert(key, worker_id.to_string());
        }
    }

    pub fn remove_worker(&mut self, worker_id: &str) {
        self.ring.retain(|_, v| v != worker_id);
        self.unhealthy.remove(worker_id);
    }

    pub fn mark_unhealthy(&mut self, worker_id: &str) {
        self.unhealthy.insert(worker_id.to_string());
    }

    pub fn mark_healthy(&mut self, worker_id: &str) {
        self.unhealthy.remove(worker_id);
    }

    pub fn worker_count(&self) -> usize {
        self.ring.values().collect::<HashSet<_>>().len()
    }

    /// Returns up to `count` distinct, healthy worker ids walking clockwise
    /// from `object_id`'s ring position. The first entry is the primary.
    pub fn replicas_for(&self, object_id: &str, count: usize) -> Vec<String> {
        if self.ring.is_empty() || count == 0 {
            return Vec::new();
        }

        let start = fnv1a_64(&[object_id]);
        let mut seen = HashSet::new();
        let mut out = Vec::with_capacity(count);
        let total_workers = self.worker_count();

        let after = self.ring.range(start..).chain(self.ring.iter());
        for (_, worker_id) in after {
            if self.unhealthy.contains(worker_id) {
                continue;
            }
            if seen.insert(worker_id.clone()) {
                out.push(worker_id.clone());
                if out.len() == count {
                    break;
                }
            }
            if seen.len() >= total_workers {
                break;
            }
        }
        out
    }

    pub fn primary_for(&self, object_id: &str) -> Option<String> {
        self.replicas_for(object_id, 1).into_iter().next()
    }
}
