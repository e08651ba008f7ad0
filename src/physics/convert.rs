//! Conversions between graph-side glam math and engine-side nalgebra math.
//!
//! glam stores quaternions as `x, y, z, w`; nalgebra builds them scalar-first
//! (`Quaternion::new(w, i, j, k)`). Every crossing goes through [`EngineRepr`]
//! so the component order is decided in exactly one place.

use glam::{Quat, Vec3};
use rapier3d::na::{Quaternion, Translation3, UnitQuaternion, Vector3};
use rapier3d::prelude as rapier;

/// A graph-side value with an engine-side counterpart.
pub trait EngineRepr: Sized {
    type Engine;

    fn to_engine(self) -> Self::Engine;
    fn from_engine(engine: &Self::Engine) -> Self;
}

impl EngineRepr for Vec3 {
    type Engine = Vector3<f32>;

    fn to_engine(self) -> Vector3<f32> {
        Vector3::new(self.x, self.y, self.z)
    }

    fn from_engine(engine: &Vector3<f32>) -> Self {
        Vec3::new(engine.x, engine.y, engine.z)
    }
}

impl EngineRepr for Quat {
    type Engine = UnitQuaternion<f32>;

    fn to_engine(self) -> UnitQuaternion<f32> {
        UnitQuaternion::from_quaternion(Quaternion::new(self.w, self.x, self.y, self.z))
    }

    fn from_engine(engine: &UnitQuaternion<f32>) -> Self {
        Quat::from_xyzw(engine.i, engine.j, engine.k, engine.w)
    }
}

/// Rigid transform of a part: translation followed by rotation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pose {
    pub position: Vec3,
    pub rotation: Quat,
}

impl Pose {
    pub const IDENTITY: Pose = Pose {
        position: Vec3::ZERO,
        rotation: Quat::IDENTITY,
    };

    pub fn new(position: Vec3, rotation: Quat) -> Self {
        Self { position, rotation }
    }

    pub fn transform_point(&self, point: Vec3) -> Vec3 {
        self.rotation * point + self.position
    }

    /// `self * other`: apply `other` first, then `self`.
    pub fn mul_pose(&self, other: &Pose) -> Pose {
        Pose {
            position: self.transform_point(other.position),
            rotation: self.rotation * other.rotation,
        }
    }
}

impl EngineRepr for Pose {
    type Engine = rapier::Isometry<f32>;

    fn to_engine(self) -> rapier::Isometry<f32> {
        rapier::Isometry::from_parts(
            Translation3::from(self.position.to_engine()),
            self.rotation.to_engine(),
        )
    }

    fn from_engine(engine: &rapier::Isometry<f32>) -> Self {
        Pose {
            position: Vec3::from_engine(&engine.translation.vector),
            rotation: Quat::from_engine(&engine.rotation),
        }
    }
}
