//! Derives CREATE/UPDATE/MERGE semantics (not full `MergeEvent` payloads —
//! that's `mdm-lineage`'s job) for each cluster produced by an incremental
//! batch, by diffing prior cluster membership against the new result.

use std::collections::{BTreeMap, HashMap};

use mdm_core::types::{Cluster, RecordId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClusterTransition {
    /// A cluster with no prior members at all.
    Create,
    /// An existing cluster whose membership changed but which absorbed no
    /// other existing cluster.
    Update,
    /// Two or more previously distinct clusters joined into one.
    Merge,
}

/// For each cluster in `new_clusters`, determines its transition kind
/// relative to `prior_clusters` (indexed by `record_id -> prior root`).
pub fn derive_transitions(
    prior_clusters: &[Cluster],
    new_clusters: &[Cluster],
) -> BTreeMap<RecordId, ClusterTransition> {
    let mut prior_root_of: HashMap<RecordId, RecordId> = HashMap::new();
    for cluster in prior_clusters {
        for member in &cluster.members {
            prior_root_of.insert(member.clone(), cluster.root.clone());
        }
    }

    let mut transitions = BTreeMap::new();
    for cluster in new_clusters {
        let mut prior_roots: std::collections::BTreeSet<RecordId> = std::collections::BTreeSet::new();
        let mut any_prior = false;
        for member in &cluster.members {
            if let Some(root) = prior_root_of.get(member) {
                prior_roots.insert(root.clone());
                any_prior = true;
            }
        }
        let transition = if !any_prior {
            ClusterTransition::Create
        } else if prior_roots.len() > 1 {
            ClusterTransition::Merge
        } else {
            ClusterTransition::Update
        };
        transitions.insert(cluster.root.clone(), transition);
    }
    transitions
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn brand_new_cluster_is_create() {
        let prior = vec![];
        let new = vec![Cluster {
            root: "a".to_string(),
            members: vec!["a".to_string()],
        }];
        let transitions = derive_transitions(&prior, &new);
        assert_eq!(transitions[&"a".to_string()], ClusterTransition::Create);
    }

    #[test]
    fn growing_an_existing_cluster_is_update() {
        let prior = vec![Cluster {
            root: "a".to_string(),
            members: vec!["a".to_string()],
        }];
        let new = vec![Cluster {
            root: "a".to_string(),
            members: vec!["a".to_string(), "b".to_string()],
        }];
        let transitions = derive_transitions(&prior, &new);
        assert_eq!(transitions[&"a".to_string()], ClusterTransition::Update);
    }

    #[test]
    fn joining_two_prior_clusters_is_merge() {
        let prior = vec![
            Cluster {
                root: "a".to_string(),
                members: vec!["a".to_string()],
            },
            Cluster {
                root: "c".to_string(),
                members: vec!["c".to_string()],
            },
        ];
        let new = vec![Cluster {
            root: "a".to_string(),
            members: vec!["a".to_string(), "c".to_string()],
        }];
        let transitions = derive_transitions(&prior, &new);
        assert_eq!(transitions[&"a".to_string()], ClusterTransition::Merge);
    }
}
