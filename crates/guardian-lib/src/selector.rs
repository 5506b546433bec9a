//! Eviction selection
//!
//! Scans each eligible group for its first threshold violation and produces
//! at most one eviction decision per group per cycle. The scan order is
//! deterministic: members earliest-created first, containers in pod-spec
//! order. First-found wins; the selector does not rank by overage size.

use crate::models::{ControllerGroup, EvictionDecision, PodSnapshot};
use chrono::{DateTime, Utc};
use tracing::debug;

/// Produce the cycle's eviction decisions, at most one per group.
///
/// Ineligible groups (any member not ready) and groups with no known-usage
/// violation yield nothing.
pub fn select(groups: &[ControllerGroup]) -> Vec<EvictionDecision> {
    groups.iter().filter_map(select_for_group).collect()
}

fn select_for_group(group: &ControllerGroup) -> Option<EvictionDecision> {
    if !group.is_eligible() {
        debug!(group = %group.key, "Group has unready members, leaving it alone this cycle");
        return None;
    }

    let mut members: Vec<&PodSnapshot> = group.members.iter().collect();
    members.sort_by_key(|member| creation_order(member));

    for member in members {
        for sample in &member.containers {
            if sample.is_violation() {
                let decision = EvictionDecision {
                    pod: member.identity.clone(),
                    container: sample.name.clone(),
                    usage_bytes: sample.usage.unwrap_or_default(),
                    threshold_bytes: sample.threshold.unwrap_or_default(),
                    group: group.key.clone(),
                    decided_at: Utc::now(),
                };
                debug!(
                    group = %group.key,
                    pod = %decision.pod,
                    container = %decision.container,
                    usage = decision.usage_bytes,
                    threshold = decision.threshold_bytes,
                    "Selected eviction victim"
                );
                return Some(decision);
            }
        }
    }

    None
}

/// Earliest creation first; pods with no reported creation time sort last.
/// The sort is stable, so ties keep listing order.
fn creation_order(member: &PodSnapshot) -> DateTime<Utc> {
    member.created_at.unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Count every known-usage violation across the cycle's snapshots.
///
/// Observability only; selection is not affected by this count.
pub fn count_violations(snapshots: &[PodSnapshot]) -> u64 {
    snapshots
        .iter()
        .flat_map(|snapshot| &snapshot.containers)
        .filter(|sample| sample.is_violation())
        .count() as u64
}
