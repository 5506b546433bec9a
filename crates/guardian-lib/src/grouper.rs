//! Controller grouping
//!
//! Partitions the cycle's snapshots by owning-controller identity. The
//! partition is exhaustive and disjoint, and groups keep the order in which
//! their key first appeared in the pod listing.

use crate::models::{ControllerGroup, GroupKey, PodSnapshot};
use std::collections::HashMap;

/// Partition snapshots into controller groups
pub fn group(snapshots: Vec<PodSnapshot>) -> Vec<ControllerGroup> {
    let mut groups: Vec<ControllerGroup> = Vec::new();
    let mut index: HashMap<GroupKey, usize> = HashMap::new();

    for snapshot in snapshots {
        match index.get(&snapshot.group) {
            Some(&position) => groups[position].members.push(snapshot),
            None => {
                index.insert(snapshot.group.clone(), groups.len());
                groups.push(ControllerGroup {
                    key: snapshot.group.clone(),
                    members: vec![snapshot],
                });
            }
        }
    }

    groups
}
