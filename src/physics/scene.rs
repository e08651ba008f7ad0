use super::convert::{EngineRepr, Pose};
use super::events::{ChannelEventCollector, ContactPhase};
use crate::config::PhysicsConfig;
use glam::Vec3;
use rapier3d::prelude as rapier;

/// Shape and simulation mode of a part body.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BodyDesc {
    pub pose: Pose,
    pub size: Vec3,
    pub anchored: bool,
    pub can_collide: bool,
    pub user_data: u128,
}

/// One rapier simulation, owned by a workspace.
pub(crate) struct PhysicsScene {
    pipeline: rapier::PhysicsPipeline,
    gravity: rapier::Vector<f32>,
    integration_params: rapier::IntegrationParameters,
    islands: rapier::IslandManager,
    broad_phase: rapier::DefaultBroadPhase,
    narrow_phase: rapier::NarrowPhase,
    impulse_joints: rapier::ImpulseJointSet,
    multibody_joints: rapier::MultibodyJointSet,
    ccd_solver: rapier::CCDSolver,
    bodies: rapier::RigidBodySet,
    colliders: rapier::ColliderSet,
    timestep: f32,
    max_substeps: u32,
    accumulated_time: f32,
}

impl PhysicsScene {
    pub(crate) fn new(config: &PhysicsConfig, gravity: Vec3) -> Self {
        let mut integration_params = rapier::IntegrationParameters::default();
        integration_params.dt = config.timestep;

        Self {
            pipeline: rapier::PhysicsPipeline::new(),
            gravity: gravity.to_engine(),
            integration_params,
            islands: rapier::IslandManager::new(),
            broad_phase: rapier::DefaultBroadPhase::new(),
            narrow_phase: rapier::NarrowPhase::new(),
            impulse_joints: rapier::ImpulseJointSet::new(),
            multibody_joints: rapier::MultibodyJointSet::new(),
            ccd_solver: rapier::CCDSolver::new(),
            bodies: rapier::RigidBodySet::new(),
            colliders: rapier::ColliderSet::new(),
            timestep: config.timestep,
            max_substeps: config.max_substeps,
            accumulated_time: 0.0,
        }
    }

    pub(crate) fn set_gravity(&mut self, gravity: Vec3) {
        self.gravity = gravity.to_engine();
    }

    pub(crate) fn gravity(&self) -> Vec3 {
        Vec3::from_engine(&self.gravity)
    }

    pub(crate) fn body_count(&self) -> usize {
        self.bodies.len()
    }

    pub(crate) fn insert_body(&mut self, desc: &BodyDesc) -> rapier::RigidBodyHandle {
        let builder = if desc.anchored {
            rapier::RigidBodyBuilder::kinematic_position_based()
        } else {
            rapier::RigidBodyBuilder::dynamic()
        };
        let body = builder
            .position(desc.pose.to_engine())
            .user_data(desc.user_data)
            .build();
        let handle = self.bodies.insert(body);

        let half = (desc.size * 0.5).max(Vec3::splat(0.005));
        let collider = rapier::ColliderBuilder::cuboid(half.x, half.y, half.z)
            .sensor(!desc.can_collide)
            .active_events(rapier::ActiveEvents::COLLISION_EVENTS)
            .user_data(desc.user_data)
            .build();
        self.colliders
            .insert_with_parent(collider, handle, &mut self.bodies);
        handle
    }

    pub(crate) fn remove_body(&mut self, handle: rapier::RigidBodyHandle) -> bool {
        self.bodies
            .remove(
                handle,
                &mut self.islands,
                &mut self.colliders,
                &mut self.impulse_joints,
                &mut self.multibody_joints,
                true,
            )
            .is_some()
    }

    pub(crate) fn contains(&self, handle: rapier::RigidBodyHandle) -> bool {
        self.bodies.contains(handle)
    }

    pub(crate) fn user_data(&self, handle: rapier::RigidBodyHandle) -> Option<u128> {
        self.bodies.get(handle).map(|body| body.user_data)
    }

    pub(crate) fn pose(&self, handle: rapier::RigidBodyHandle) -> Option<Pose> {
        self.bodies
            .get(handle)
            .map(|body| Pose::from_engine(body.position()))
    }

    /// Kinematic bodies get a target for the next step; dynamic bodies are
    /// teleported and woken.
    pub(crate) fn set_pose(&mut self, handle: rapier::RigidBodyHandle, pose: Pose) -> bool {
        let Some(body) = self.bodies.get_mut(handle) else {
            return false;
        };
        let iso = pose.to_engine();
        if body.is_kinematic() {
            body.set_next_kinematic_position(iso);
        }
        body.set_position(iso, true);
        true
    }

    /// Poses of every dynamic body together with its user-data.
    pub(crate) fn dynamic_poses(&self) -> Vec<(rapier::RigidBodyHandle, u128, Pose)> {
        self.bodies
            .iter()
            .filter(|(_, body)| body.is_dynamic())
            .map(|(handle, body)| (handle, body.user_data, Pose::from_engine(body.position())))
            .collect()
    }

    /// Advances the scene by `delta_time` using fixed substeps. Returns the
    /// collision events of every substep as body pairs.
    pub(crate) fn step(
        &mut self,
        delta_time: f32,
    ) -> Vec<(rapier::RigidBodyHandle, rapier::RigidBodyHandle, ContactPhase)> {
        self.accumulated_time += delta_time;

        let mut contacts = Vec::new();
        let mut steps = 0;
        while self.accumulated_time >= self.timestep && steps < self.max_substeps {
            self.step_internal(&mut contacts);
            self.accumulated_time -= self.timestep;
            steps += 1;
        }
        if steps == self.max_substeps && self.accumulated_time >= self.timestep {
            log::debug!(
                "[physics] dropping {:.4}s of simulation time after {} substeps",
                self.accumulated_time,
                steps
            );
            self.accumulated_time = 0.0;
        }
        contacts
    }

    fn step_internal(
        &mut self,
        contacts: &mut Vec<(rapier::RigidBodyHandle, rapier::RigidBodyHandle, ContactPhase)>,
    ) {
        let (collision_send, collision_recv) = crossbeam_channel::unbounded();
        let event_handler = ChannelEventCollector {
            collision_events: collision_send,
        };

        self.pipeline.step(
            &self.gravity,
            &self.integration_params,
            &mut self.islands,
            &mut self.broad_phase,
            &mut self.narrow_phase,
            &mut self.bodies,
            &mut self.colliders,
            &mut self.impulse_joints,
            &mut self.multibody_joints,
            &mut self.ccd_solver,
            None,
            &(),
            &event_handler,
        );

        while let Ok(event) = collision_recv.try_recv() {
            let (h1, h2, phase) = match event {
                rapier::CollisionEvent::Started(h1, h2, _) => (h1, h2, ContactPhase::Started),
                rapier::CollisionEvent::Stopped(h1, h2, _) => (h1, h2, ContactPhase::Stopped),
            };
            let b1 = self.colliders.get(h1).and_then(|c| c.parent());
            let b2 = self.colliders.get(h2).and_then(|c| c.parent());
            match (b1, b2) {
                (Some(b1), Some(b2)) => contacts.push((b1, b2, phase)),
                _ => log::trace!("[physics] skipping contact with a detached collider"),
            }
        }
    }
}
