//! A union-find (disjoint-set) structure over record ids, with explicit
//! per-root member sets so the transitivity guard can check cross-cluster
//! negative edges before committing a union. This is "quick-find" rather
//! than the classic rank-only union-find: the spec's fan-in sizes (batch-
//! sized, not web-scale) make the O(cluster size) member-set merge cheap
//! relative to comparator evaluation, and the guard needs the member sets
//! anyway.

use std::collections::{BTreeSet, HashMap};

use mdm_core::types::RecordId;

pub struct UnionFind {
    parent: HashMap<RecordId, RecordId>,
    members: HashMap<RecordId, BTreeSet<RecordId>>,
}

impl UnionFind {
    pub fn new() -> Self {
        Self {
            parent: HashMap::new(),
            members: HashMap::new(),
        }
    }

    /// Seeds the structure so that every record in `cluster` already shares
    /// a root, used to carry forward prior batches' clusters in incremental
    /// mode.
    pub fn seed_cluster(&mut self, root: &RecordId, member_ids: &[RecordId]) {
        self.ensure(root);
        let mut set: BTreeSet<RecordId> = member_ids.iter().cloned().collect();
        set.insert(root.clone());
        for member in &set {
            self.parent.insert(member.clone(), root.clone());
        }
        self.members.insert(root.clone(), set);
    }

    fn ensure(&mut self, id: &RecordId) {
        self.parent.entry(id.clone()).or_insert_with(|| id.clone());
        self.members
            .entry(self.find_ref(id))
            .or_insert_with(|| BTreeSet::from([id.clone()]));
    }

    /// Finds the representative of `id`'s set without path compression
    /// mutation (used internally before the entry is established).
    fn find_ref(&self, id: &RecordId) -> RecordId {
        let mut current = id.clone();
        while let Some(next) = self.parent.get(&current) {
            if next == &current {
                break;
            }
            current = next.clone();
        }
        current
    }

    pub fn find(&mut self, id: &RecordId) -> RecordId {
        self.ensure(id);
        let mut path = Vec::new();
        let mut current = id.clone();
        loop {
            let next = self.parent.get(&current).cloned().unwrap_or_else(|| current.clone());
            if next == current {
                break;
            }
            path.push(current);
            current = next;
        }
        for node in path {
            self.parent.insert(node, current.clone());
        }
        current
    }

    pub fn members_of(&self, root: &RecordId) -> BTreeSet<RecordId> {
        self.members.get(root).cloned().unwrap_or_else(|| BTreeSet::from([root.clone()]))
    }

    /// Unconditionally unions the sets containing `a` and `b`, merging the
    /// smaller member set into the larger for amortized efficiency. Returns
    /// the new root, or `None` if `a` and `b` were already in the same set.
    pub fn union(&mut self, a: &RecordId, b: &RecordId) -> Option<RecordId> {
        let ra = self.find(a);
        let rb = self.find(b);
        if ra == rb {
            return None;
        }
        let members_a = self.members.remove(&ra).unwrap_or_else(|| BTreeSet::from([ra.clone()]));
        let members_b = self.members.remove(&rb).unwrap_or_else(|| BTreeSet::from([rb.clone()]));

        let (big_root, mut big_members, small_root, small_members) = if members_a.len() >= members_b.len() {
            (ra, members_a, rb, members_b)
        } else {
            (rb, members_b, ra, members_a)
        };

        for member in &small_members {
            self.parent.insert(member.clone(), big_root.clone());
        }
        big_members.extend(small_members);
        self.parent.insert(small_root, big_root.clone());
        self.members.insert(big_root.clone(), big_members);
        Some(big_root)
    }

    pub fn roots(&self) -> Vec<RecordId> {
        self.members.keys().cloned().collect()
    }
}

impl Default for UnionFind {
    fn default() -> Self {
        Self::new()
    }
}
