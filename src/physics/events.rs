use super::BodyHandle;
use crate::editor::commands::CommandSender;
use crate::scene::{DataModel, InstanceId};
use rapier3d::prelude as rapier;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ContactPhase {
    Started,
    Stopped,
}

/// Collision between two bodies of the same scene, as reported by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BodyContact {
    pub a: BodyHandle,
    pub b: BodyHandle,
    pub phase: ContactPhase,
}

/// A contact seen from one part. `other` is `None` when the second body no
/// longer resolves to a live part.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartContact {
    pub part: InstanceId,
    pub other: Option<InstanceId>,
    pub phase: ContactPhase,
}

/// Reacts to contacts during a simulation step.
///
/// Handlers see the graph read-only; any mutation they want goes through the
/// command sender and is applied by the editing thread after the step.
pub trait ContactHandler: Send {
    fn on_contact(&mut self, contact: &PartContact, model: &DataModel, commands: &CommandSender);
}

impl<F> ContactHandler for F
where
    F: FnMut(&PartContact, &DataModel, &CommandSender) + Send,
{
    fn on_contact(&mut self, contact: &PartContact, model: &DataModel, commands: &CommandSender) {
        self(contact, model, commands)
    }
}

/// Forwards collision events from the pipeline into a channel.
pub(crate) struct ChannelEventCollector {
    pub(crate) collision_events: crossbeam_channel::Sender<rapier::CollisionEvent>,
}

impl rapier::EventHandler for ChannelEventCollector {
    fn handle_collision_event(
        &self,
        _bodies: &rapier::RigidBodySet,
        _colliders: &rapier::ColliderSet,
        event: rapier::CollisionEvent,
        _contact_pair: Option<&rapier::ContactPair>,
    ) {
        if let Err(err) = self.collision_events.send(event) {
            log::trace!("[physics] collision receiver gone, dropping {:?}", err.0);
        }
    }

    fn handle_contact_force_event(
        &self,
        _dt: f32,
        _bodies: &rapier::RigidBodySet,
        _colliders: &rapier::ColliderSet,
        _contact_pair: &rapier::ContactPair,
        _total_force_magnitude: f32,
    ) {
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rapier3d::prelude::EventHandler;

    #[test]
    fn collector_survives_a_dropped_receiver() {
        let (collision_events, receiver) = crossbeam_channel::unbounded();
        let collector = ChannelEventCollector { collision_events };
        let event = rapier::CollisionEvent::Started(
            rapier::ColliderHandle::invalid(),
            rapier::ColliderHandle::invalid(),
            rapier::CollisionEventFlags::empty(),
        );
        let bodies = rapier::RigidBodySet::new();
        let colliders = rapier::ColliderSet::new();

        collector.handle_collision_event(&bodies, &colliders, event, None);
        assert_eq!(receiver.try_recv().ok(), Some(event));

        drop(receiver);
        collector.handle_collision_event(&bodies, &colliders, event, None);
    }
}
