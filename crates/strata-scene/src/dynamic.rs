//! Reconciliation of a dynamic component against an incoming attribute list.
//!
//! Both lists are stable-sorted by ASCII-lowercased id, the same folding
//! attribute lookups use, and walked with two cursors.
//! The walk only *plans*; the scene applies the plan afterwards (see
//! [`EntityMut::reconcile_dynamic`](crate::entity::EntityMut::reconcile_dynamic))
//! so neither list is mutated while it is being iterated. All three lists of
//! the plan come out in sorted-id order.

use std::cmp::Ordering;

use crate::component::Component;
use crate::desc::AttributeDesc;

/// Outcome of the merge walk.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReconcilePlan {
    /// Existing attributes (raw slot index) receiving a new string value.
    pub updates: Vec<(usize, AttributeDesc)>,
    /// Incoming descriptions with no current counterpart.
    pub additions: Vec<AttributeDesc>,
    /// Raw slot indices of current attributes with no incoming counterpart.
    pub removals: Vec<usize>,
}

impl ReconcilePlan {
    pub fn is_empty(&self) -> bool {
        self.updates.is_empty() && self.additions.is_empty() && self.removals.is_empty()
    }
}

/// Diff `component`'s non-empty attributes against `incoming`.
pub fn plan_reconcile(component: &Component, incoming: &[AttributeDesc]) -> ReconcilePlan {
    let mut current: Vec<(String, usize)> = component
        .attribute_slots()
        .iter()
        .enumerate()
        .filter_map(|(raw, slot)| slot.as_ref().map(|a| (a.id().to_ascii_lowercase(), raw)))
        .collect();
    current.sort_by(|a, b| a.0.cmp(&b.0));

    let mut wanted: Vec<(String, &AttributeDesc)> =
        incoming.iter().map(|d| (d.id.to_ascii_lowercase(), d)).collect();
    wanted.sort_by(|a, b| a.0.cmp(&b.0));

    let mut plan = ReconcilePlan::default();
    let (mut i, mut j) = (0, 0);
    while i < current.len() && j < wanted.len() {
        match current[i].0.cmp(&wanted[j].0) {
            Ordering::Equal => {
                plan.updates.push((current[i].1, wanted[j].1.clone()));
                i += 1;
                j += 1;
            }
            Ordering::Greater => {
                plan.additions.push(wanted[j].1.clone());
                j += 1;
            }
            Ordering::Less => {
                plan.removals.push(current[i].1);
                i += 1;
            }
        }
    }
    plan.additions.extend(wanted[j..].iter().map(|(_, d)| (*d).clone()));
    plan.removals.extend(current[i..].iter().map(|(_, raw)| *raw));
    plan
}
