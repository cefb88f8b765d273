//! Plain-data descriptions of scene content.
//!
//! Both file formats are parsed into a [`SceneDesc`] first and only then
//! applied to a scene, so malformed input never leaves a half-imported scene
//! behind. Attribute values are kept in their string form; the binary
//! format also carries the decoded value so it is applied without a string
//! round trip.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::hash::Hash;

use crate::component::{ComponentType, NameComponent, Placeable};
use crate::id::EntityId;
use crate::value::{AttributeValue, EntityReference};

// ---------------------------------------------------------------------------
// Descriptions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AttributeDesc {
    pub id: String,
    pub name: String,
    pub type_name: String,
    pub value: String,
    /// Decoded value, when the source format is typed. Takes precedence
    /// over `value` on import.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub typed: Option<AttributeValue>,
}

impl AttributeDesc {
    /// A description whose display name equals its id.
    pub fn new(id: &str, type_name: &str, value: &str) -> Self {
        Self {
            id: id.to_owned(),
            name: id.to_owned(),
            type_name: type_name.to_owned(),
            value: value.to_owned(),
            typed: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ComponentDesc {
    pub type_id: u32,
    pub type_name: String,
    pub name: String,
    pub sync: bool,
    pub temporary: bool,
    pub attributes: Vec<AttributeDesc>,
}

impl ComponentDesc {
    pub fn attribute(&self, id: &str) -> Option<&AttributeDesc> {
        self.attributes.iter().find(|a| a.id.eq_ignore_ascii_case(id))
    }

    pub(crate) fn attribute_mut(&mut self, id: &str) -> Option<&mut AttributeDesc> {
        self.attributes
            .iter_mut()
            .find(|a| a.id.eq_ignore_ascii_case(id))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntityDesc {
    /// Id as stored in the source. `0` when absent.
    pub id: u32,
    pub sync: bool,
    pub temporary: bool,
    pub components: Vec<ComponentDesc>,
    /// Entities parented to this one.
    pub children: Vec<EntityDesc>,
}

impl EntityDesc {
    /// Name from the `EC_Name` component, if any.
    pub fn name(&self) -> Option<&str> {
        self.components
            .iter()
            .find(|c| c.type_id == NameComponent::TYPE_ID)
            .and_then(|c| c.attribute(NameComponent::NAME))
            .map(|a| a.value.as_str())
    }

    /// Numeric `parentRef` of the `EC_Placeable` component, if any.
    pub fn placeable_parent(&self) -> Option<EntityId> {
        self.placeable()
            .and_then(|c| c.attribute(Placeable::PARENT_REF))
            .and_then(|a| EntityReference::new(a.value.as_str()).as_id())
    }

    fn placeable(&self) -> Option<&ComponentDesc> {
        self.components.iter().find(|c| c.type_id == Placeable::TYPE_ID)
    }

    pub(crate) fn placeable_mut(&mut self) -> Option<&mut ComponentDesc> {
        self.components
            .iter_mut()
            .find(|c| c.type_id == Placeable::TYPE_ID)
    }

    /// This entity plus all descendants.
    pub fn entity_count(&self) -> usize {
        let mut count = 0;
        let mut stack = vec![self];
        while let Some(desc) = stack.pop() {
            count += 1;
            stack.extend(&desc.children);
        }
        count
    }

    /// Levels of nesting, `1` for a description without children.
    pub fn depth(&self) -> usize {
        let mut deepest = 0;
        let mut stack = vec![(self, 1usize)];
        while let Some((desc, depth)) = stack.pop() {
            deepest = deepest.max(depth);
            stack.extend(desc.children.iter().map(|c| (c, depth + 1)));
        }
        deepest
    }
}

/// Parsed content of a scene file or clipboard snippet.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SceneDesc {
    /// Source file, empty for in-memory content.
    pub filename: String,
    /// Root-level entities.
    pub entities: Vec<EntityDesc>,
}

impl SceneDesc {
    /// Number of entities, descendants included.
    pub fn entity_count(&self) -> usize {
        self.entities.iter().map(EntityDesc::entity_count).sum()
    }

    /// Deepest entity nesting, `0` when empty.
    pub fn depth(&self) -> usize {
        self.entities.iter().map(EntityDesc::depth).max().unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Reorder root-level entities so that an entity whose `EC_Placeable`
    /// refers to another root-level entity comes after it.
    pub fn sort_entities(&mut self) {
        let entities = std::mem::take(&mut self.entities);
        self.entities = parents_first(entities, |e| e.id, |e| e.placeable_parent().map(EntityId::raw));
    }
}

// ---------------------------------------------------------------------------
// Hierarchy ordering
// ---------------------------------------------------------------------------

/// Stable topological order: every item whose parent is also in `items` is
/// placed after that parent. Cycles are broken at the first revisit.
pub(crate) fn parents_first<T, K, FK, FP>(items: Vec<T>, key: FK, parent: FP) -> Vec<T>
where
    K: Eq + Hash + Copy,
    FK: Fn(&T) -> K,
    FP: Fn(&T) -> Option<K>,
{
    let index: HashMap<K, usize> = items.iter().enumerate().map(|(i, t)| (key(t), i)).collect();
    let parents: Vec<Option<usize>> = items
        .iter()
        .map(|t| parent(t).and_then(|p| index.get(&p).copied()))
        .collect();

    let mut order = Vec::with_capacity(items.len());
    let mut visited = vec![false; items.len()];
    for start in 0..items.len() {
        // Walk up to the first visited ancestor, then emit top-down.
        let mut chain = Vec::new();
        let mut seen = HashSet::new();
        let mut cur = Some(start);
        while let Some(i) = cur {
            if visited[i] || !seen.insert(i) {
                break;
            }
            chain.push(i);
            cur = parents[i];
        }
        for &i in chain.iter().rev() {
            visited[i] = true;
            order.push(i);
        }
    }

    let mut slots: Vec<Option<T>> = items.into_iter().map(Some).collect();
    order.into_iter().filter_map(|i| slots[i].take()).collect()
}

// ---------------------------------------------------------------------------
// ParentingTracker
// ---------------------------------------------------------------------------

/// Tracks entities imported with unacked ids until the host has acknowledged
/// all of them, then yields the unacked-to-acked id map so soft parent
/// references can be rewritten in one pass.
#[derive(Debug, Clone, Default)]
pub struct ParentingTracker {
    unacked: Vec<EntityId>,
    unacked_to_acked: BTreeMap<EntityId, EntityId>,
}

impl ParentingTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_tracking(&self) -> bool {
        !self.unacked.is_empty()
    }

    pub fn track(&mut self, id: EntityId) {
        tracing::debug!(entity = %id, "tracking unacked entity");
        self.unacked.push(id);
    }

    /// Record an ack. Returns the complete id map once the last tracked
    /// entity is acknowledged.
    pub fn ack(&mut self, new_id: EntityId, old_id: EntityId) -> Option<BTreeMap<EntityId, EntityId>> {
        if !self.unacked.contains(&old_id) {
            return None;
        }
        self.unacked.retain(|&id| id != old_id);
        self.unacked_to_acked.insert(old_id, new_id);
        if self.unacked.is_empty() {
            tracing::info!(
                count = self.unacked_to_acked.len(),
                "all tracked entities acked, fixing scene hierarchy"
            );
            Some(std::mem::take(&mut self.unacked_to_acked))
        } else {
            None
        }
    }

    pub fn clear(&mut self) {
        self.unacked.clear();
        self.unacked_to_acked.clear();
    }
}
