//! Structural change notifications.
//!
//! Every mutation of a scene that is not [`Disconnected`] produces a
//! [`SceneEvent`]. Observers registered with
//! [`Scene::subscribe`](crate::scene::Scene::subscribe) receive each event
//! synchronously, in registration order, together with a shared reference to
//! the scene in the state the event describes. Removal events are delivered
//! while the removed object is still attached, so observers can inspect it.
//!
//! An [`EventQueue`] is an observer that buffers events for consumers that
//! prefer to poll once per frame.
//!
//! [`Disconnected`]: crate::change::AttributeChange::Disconnected

use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use crate::change::AttributeChange;
use crate::entity::ExecType;
use crate::id::{ComponentId, EntityId};
use crate::scene::Scene;

// ---------------------------------------------------------------------------
// SceneEvent
// ---------------------------------------------------------------------------

/// A notification emitted by a scene.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SceneEvent {
    EntityCreated {
        entity: EntityId,
        change: AttributeChange,
    },
    EntityRemoved {
        entity: EntityId,
        change: AttributeChange,
    },
    /// The host confirmed `old_id` as `entity`.
    EntityAcked {
        entity: EntityId,
        old_id: EntityId,
    },
    EntityTemporaryStateToggled {
        entity: EntityId,
        temporary: bool,
        change: AttributeChange,
    },
    EntityParentChanged {
        entity: EntityId,
        parent: Option<EntityId>,
        change: AttributeChange,
    },
    ComponentAdded {
        entity: EntityId,
        component: ComponentId,
        type_id: u32,
        change: AttributeChange,
    },
    ComponentRemoved {
        entity: EntityId,
        component: ComponentId,
        type_id: u32,
        change: AttributeChange,
    },
    /// The host confirmed `old_id` as `component`.
    ComponentAcked {
        entity: EntityId,
        component: ComponentId,
        old_id: ComponentId,
    },
    AttributeAdded {
        entity: EntityId,
        component: ComponentId,
        attribute: String,
        change: AttributeChange,
    },
    AttributeChanged {
        entity: EntityId,
        component: ComponentId,
        attribute: String,
        change: AttributeChange,
    },
    AttributeRemoved {
        entity: EntityId,
        component: ComponentId,
        attribute: String,
        change: AttributeChange,
    },
    ActionTriggered {
        entity: EntityId,
        action: String,
        params: Vec<String>,
        exec_type: ExecType,
    },
    SceneCleared {
        change: AttributeChange,
    },
}

impl SceneEvent {
    /// The entity the event concerns, if any.
    pub fn entity(&self) -> Option<EntityId> {
        match self {
            SceneEvent::EntityCreated { entity, .. }
            | SceneEvent::EntityRemoved { entity, .. }
            | SceneEvent::EntityAcked { entity, .. }
            | SceneEvent::EntityTemporaryStateToggled { entity, .. }
            | SceneEvent::EntityParentChanged { entity, .. }
            | SceneEvent::ComponentAdded { entity, .. }
            | SceneEvent::ComponentRemoved { entity, .. }
            | SceneEvent::ComponentAcked { entity, .. }
            | SceneEvent::AttributeAdded { entity, .. }
            | SceneEvent::AttributeChanged { entity, .. }
            | SceneEvent::AttributeRemoved { entity, .. }
            | SceneEvent::ActionTriggered { entity, .. } => Some(*entity),
            SceneEvent::SceneCleared { .. } => None,
        }
    }

    /// The change type carried by the event, if it has one.
    pub fn change(&self) -> Option<AttributeChange> {
        match self {
            SceneEvent::EntityCreated { change, .. }
            | SceneEvent::EntityRemoved { change, .. }
            | SceneEvent::EntityTemporaryStateToggled { change, .. }
            | SceneEvent::EntityParentChanged { change, .. }
            | SceneEvent::ComponentAdded { change, .. }
            | SceneEvent::ComponentRemoved { change, .. }
            | SceneEvent::AttributeAdded { change, .. }
            | SceneEvent::AttributeChanged { change, .. }
            | SceneEvent::AttributeRemoved { change, .. }
            | SceneEvent::SceneCleared { change } => Some(*change),
            SceneEvent::EntityAcked { .. }
            | SceneEvent::ComponentAcked { .. }
            | SceneEvent::ActionTriggered { .. } => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Observers
// ---------------------------------------------------------------------------

/// Receives scene events.
pub trait SceneObserver {
    fn on_event(&mut self, scene: &Scene, event: &SceneEvent);
}

impl<F> SceneObserver for F
where
    F: FnMut(&Scene, &SceneEvent),
{
    fn on_event(&mut self, scene: &Scene, event: &SceneEvent) {
        self(scene, event)
    }
}

/// Handle returned by [`Scene::subscribe`](crate::scene::Scene::subscribe).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObserverId(pub(crate) u64);

// ---------------------------------------------------------------------------
// EventQueue
// ---------------------------------------------------------------------------

/// A cloneable observer that buffers events until drained.
///
/// Subscribe one clone and keep another to poll:
///
/// ```
/// use strata_scene::prelude::*;
///
/// let mut scene = Scene::new("main", SceneContext::default(), false, true);
/// let queue = EventQueue::new();
/// scene.subscribe(queue.clone());
///
/// let id = scene
///     .create_entity(EntityId::NONE, &[], AttributeChange::Default, true, true, false)
///     .unwrap();
/// scene.update(0.016);
///
/// assert_eq!(
///     queue.drain(),
///     vec![SceneEvent::EntityCreated { entity: id, change: AttributeChange::Replicate }]
/// );
/// ```
#[derive(Debug, Clone, Default)]
pub struct EventQueue {
    events: Rc<RefCell<VecDeque<SceneEvent>>>,
}

impl EventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take every buffered event, oldest first.
    pub fn drain(&self) -> Vec<SceneEvent> {
        self.events.borrow_mut().drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.events.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.borrow().is_empty()
    }
}

impl SceneObserver for EventQueue {
    fn on_event(&mut self, _scene: &Scene, event: &SceneEvent) {
        self.events.borrow_mut().push_back(event.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_accessors() {
        let ev = SceneEvent::ComponentAdded {
            entity: EntityId(4),
            component: ComponentId(1),
            type_id: 20,
            change: AttributeChange::LocalOnly,
        };
        assert_eq!(ev.entity(), Some(EntityId(4)));
        assert_eq!(ev.change(), Some(AttributeChange::LocalOnly));
        let cleared = SceneEvent::SceneCleared {
            change: AttributeChange::Replicate,
        };
        assert_eq!(cleared.entity(), None);
    }

    #[test]
    fn events_serialize_to_json() {
        let ev = SceneEvent::EntityParentChanged {
            entity: EntityId(2),
            parent: Some(EntityId(1)),
            change: AttributeChange::Replicate,
        };
        let json = serde_json::to_string(&ev).unwrap();
        assert!(json.contains("EntityParentChanged"));
        let back: SceneEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ev);
    }
}
