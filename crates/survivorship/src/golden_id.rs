//! Golden id assignment on MERGE: when two existing golden records' clusters
//! join, the surviving id is the one with the earlier `created_at` (ties
//! broken lexicographically by golden_id); the other is closed and mapped
//! via an xref by the lineage layer.

use uuid::Uuid;

use mdm_core::types::GoldenRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergeSurvivor {
    pub surviving_id: Uuid,
    pub closed_id: Uuid,
}

/// Determines which of two merging golden records survives. Panics if
/// passed the same golden_id twice — callers should never attempt to merge
/// a golden record with itself.
pub fn assign_merge_survivor(a: &GoldenRecord, b: &GoldenRecord) -> MergeSurvivor {
    assert_ne!(a.golden_id, b.golden_id, "cannot merge a golden record with itself");
    let a_wins = match a.created_at.cmp(&b.created_at) {
        std::cmp::Ordering::Less => true,
        std::cmp::Ordering::Greater => false,
        std::cmp::Ordering::Equal => a.golden_id.to_string() < b.golden_id.to_string(),
    };
    if a_wins {
        MergeSurvivor {
            surviving_id: a.golden_id,
            closed_id: b.golden_id,
        }
    } else {
        MergeSurvivor {
            surviving_id: b.golden_id,
            closed_id: a.golden_id,
        }
    }
}
