pub mod convert;
pub mod events;
mod scene;

pub use convert::{EngineRepr, Pose};
pub use events::{BodyContact, ContactHandler, ContactPhase, PartContact};
pub use scene::BodyDesc;

use crate::config::PhysicsConfig;
use crate::scene::class::PartData;
use crate::scene::{DataModel, InstanceId};
use glam::Vec3;
use rapier3d::prelude as rapier;
use scene::PhysicsScene;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

/// Identifies one simulation scene inside a [`PhysicsBridge`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct SceneId(u32);

impl SceneId {
    pub(crate) const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u32 {
        self.0
    }
}

impl fmt::Display for SceneId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "scene{}", self.0)
    }
}

/// A rapier body together with the scene that owns it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BodyHandle {
    scene: SceneId,
    raw: rapier::RigidBodyHandle,
}

impl BodyHandle {
    pub fn scene(self) -> SceneId {
        self.scene
    }

    pub fn raw(self) -> rapier::RigidBodyHandle {
        self.raw
    }
}

impl fmt::Display for BodyHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (index, generation) = self.raw.into_raw_parts();
        write!(f, "{}/body{}v{}", self.scene, index, generation)
    }
}

/// Why a body could not be traced back to a live part.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionFailure {
    SceneMissing,
    BodyMissing,
    Untagged,
    Expired,
    NotAPart,
    StaleBinding,
}

impl fmt::Display for ResolutionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            ResolutionFailure::SceneMissing => "scene no longer exists",
            ResolutionFailure::BodyMissing => "body no longer exists",
            ResolutionFailure::Untagged => "user-data carries no instance id",
            ResolutionFailure::Expired => "owning instance was destroyed",
            ResolutionFailure::NotAPart => "owning instance is not a BasePart",
            ResolutionFailure::StaleBinding => "owning part is bound to another body",
        };
        f.write_str(reason)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PhysicsError {
    #[error("cannot resolve owner of {body}: {reason}")]
    OwnerResolutionFailed {
        body: BodyHandle,
        reason: ResolutionFailure,
    },
    #[error("physics scene {0} not found")]
    SceneNotFound(SceneId),
}

/// Owns every physics scene of a data model and translates between graph
/// state and engine bodies.
pub struct PhysicsBridge {
    config: PhysicsConfig,
    scenes: HashMap<SceneId, PhysicsScene>,
    next_scene: u32,
}

impl PhysicsBridge {
    pub fn new(config: PhysicsConfig) -> Self {
        Self {
            config,
            scenes: HashMap::new(),
            next_scene: 0,
        }
    }

    pub fn config(&self) -> &PhysicsConfig {
        &self.config
    }

    pub fn scene_count(&self) -> usize {
        self.scenes.len()
    }

    pub fn has_scene(&self, scene: SceneId) -> bool {
        self.scenes.contains_key(&scene)
    }

    pub(crate) fn create_scene(&mut self, gravity: Vec3) -> SceneId {
        let id = SceneId::from_raw(self.next_scene);
        self.next_scene = self.next_scene.wrapping_add(1);
        self.scenes.insert(id, PhysicsScene::new(&self.config, gravity));
        log::debug!("[physics] created {id}");
        id
    }

    pub(crate) fn remove_scene(&mut self, scene: SceneId) -> bool {
        let removed = self.scenes.remove(&scene).is_some();
        if removed {
            log::debug!("[physics] removed {scene}");
        }
        removed
    }

    pub fn gravity(&self, scene: SceneId) -> Result<Vec3, PhysicsError> {
        self.scene(scene).map(PhysicsScene::gravity)
    }

    pub(crate) fn set_gravity(&mut self, scene: SceneId, gravity: Vec3) -> Result<(), PhysicsError> {
        self.scene_mut(scene)?.set_gravity(gravity);
        Ok(())
    }

    pub fn body_count(&self, scene: SceneId) -> Result<usize, PhysicsError> {
        self.scene(scene).map(PhysicsScene::body_count)
    }

    pub(crate) fn create_body(
        &mut self,
        scene: SceneId,
        owner: InstanceId,
        part: &PartData,
    ) -> Result<BodyHandle, PhysicsError> {
        let desc = BodyDesc {
            pose: Pose::new(part.position, part.rotation),
            size: part.size,
            anchored: part.anchored,
            can_collide: part.can_collide,
            user_data: owner.to_user_data(),
        };
        let raw = self.scene_mut(scene)?.insert_body(&desc);
        let handle = BodyHandle { scene, raw };
        log::trace!("[physics] created {handle} for {owner}");
        Ok(handle)
    }

    /// Removing a body whose scene is already gone is not an error.
    pub(crate) fn remove_body(&mut self, body: BodyHandle) -> bool {
        match self.scenes.get_mut(&body.scene) {
            Some(scene) => scene.remove_body(body.raw),
            None => false,
        }
    }

    pub fn contains_body(&self, body: BodyHandle) -> bool {
        self.scenes
            .get(&body.scene)
            .is_some_and(|scene| scene.contains(body.raw))
    }

    pub fn body_pose(&self, body: BodyHandle) -> Option<Pose> {
        self.scenes.get(&body.scene)?.pose(body.raw)
    }

    pub(crate) fn set_body_pose(&mut self, body: BodyHandle, pose: Pose) -> bool {
        self.scenes
            .get_mut(&body.scene)
            .is_some_and(|scene| scene.set_pose(body.raw, pose))
    }

    pub fn body_user_data(&self, body: BodyHandle) -> Option<u128> {
        self.scenes.get(&body.scene)?.user_data(body.raw)
    }

    pub(crate) fn dynamic_poses(&self, scene: SceneId) -> Result<Vec<(BodyHandle, u128, Pose)>, PhysicsError> {
        let poses = self
            .scene(scene)?
            .dynamic_poses()
            .into_iter()
            .map(|(raw, user_data, pose)| (BodyHandle { scene, raw }, user_data, pose))
            .collect();
        Ok(poses)
    }

    pub(crate) fn step_scene(&mut self, scene: SceneId, dt: f32) -> Result<Vec<BodyContact>, PhysicsError> {
        let contacts = self
            .scene_mut(scene)?
            .step(dt)
            .into_iter()
            .map(|(a, b, phase)| BodyContact {
                a: BodyHandle { scene, raw: a },
                b: BodyHandle { scene, raw: b },
                phase,
            })
            .collect();
        Ok(contacts)
    }

    fn scene(&self, scene: SceneId) -> Result<&PhysicsScene, PhysicsError> {
        self.scenes
            .get(&scene)
            .ok_or(PhysicsError::SceneNotFound(scene))
    }

    fn scene_mut(&mut self, scene: SceneId) -> Result<&mut PhysicsScene, PhysicsError> {
        self.scenes
            .get_mut(&scene)
            .ok_or(PhysicsError::SceneNotFound(scene))
    }
}

/// Traces a body back to the part that owns it.
///
/// The body's user-data carries the tagged owner id. The id is only trusted
/// once the arena confirms it is still alive, still a BasePart and still
/// bound to this exact body.
pub fn resolve_owner(model: &DataModel, body: BodyHandle) -> Result<InstanceId, PhysicsError> {
    let fail = |reason| PhysicsError::OwnerResolutionFailed { body, reason };
    let bridge = model.physics();
    if !bridge.has_scene(body.scene) {
        return Err(fail(ResolutionFailure::SceneMissing));
    }
    let user_data = bridge
        .body_user_data(body)
        .ok_or_else(|| fail(ResolutionFailure::BodyMissing))?;
    let owner = InstanceId::from_user_data(user_data).ok_or_else(|| fail(ResolutionFailure::Untagged))?;
    if !model.contains(owner) {
        return Err(fail(ResolutionFailure::Expired));
    }
    let part = model
        .cast::<PartData>(owner)
        .map_err(|_| fail(ResolutionFailure::NotAPart))?;
    if part.body() != Some(body) {
        return Err(fail(ResolutionFailure::StaleBinding));
    }
    Ok(owner)
}
