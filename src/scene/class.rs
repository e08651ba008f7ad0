use crate::physics::BodyHandle;
use bitflags::bitflags;
use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable capability tag. Every descriptor carries the set of tags it `isA`,
/// so type tests never walk a class chain at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ClassTag {
    Instance,
    DataModel,
    Workspace,
    Folder,
    PVInstance,
    Model,
    BasePart,
    Part,
    SpawnLocation,
    LuaSourceContainer,
    Script,
}

impl ClassTag {
    pub const fn ordered() -> [ClassTag; 11] {
        [
            ClassTag::Instance,
            ClassTag::DataModel,
            ClassTag::Workspace,
            ClassTag::Folder,
            ClassTag::PVInstance,
            ClassTag::Model,
            ClassTag::BasePart,
            ClassTag::Part,
            ClassTag::SpawnLocation,
            ClassTag::LuaSourceContainer,
            ClassTag::Script,
        ]
    }

    pub fn label(self) -> &'static str {
        match self {
            ClassTag::Instance => "Instance",
            ClassTag::DataModel => "DataModel",
            ClassTag::Workspace => "Workspace",
            ClassTag::Folder => "Folder",
            ClassTag::PVInstance => "PVInstance",
            ClassTag::Model => "Model",
            ClassTag::BasePart => "BasePart",
            ClassTag::Part => "Part",
            ClassTag::SpawnLocation => "SpawnLocation",
            ClassTag::LuaSourceContainer => "LuaSourceContainer",
            ClassTag::Script => "Script",
        }
    }

    pub fn set(self) -> ClassSet {
        match self {
            ClassTag::Instance => ClassSet::INSTANCE,
            ClassTag::DataModel => ClassSet::DATA_MODEL,
            ClassTag::Workspace => ClassSet::WORKSPACE,
            ClassTag::Folder => ClassSet::FOLDER,
            ClassTag::PVInstance => ClassSet::PV_INSTANCE,
            ClassTag::Model => ClassSet::MODEL,
            ClassTag::BasePart => ClassSet::BASE_PART,
            ClassTag::Part => ClassSet::PART,
            ClassTag::SpawnLocation => ClassSet::SPAWN_LOCATION,
            ClassTag::LuaSourceContainer => ClassSet::LUA_SOURCE_CONTAINER,
            ClassTag::Script => ClassSet::SCRIPT,
        }
    }
}

impl fmt::Display for ClassTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

bitflags! {
    /// Ancestry bitset: one bit per [`ClassTag`].
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct ClassSet: u32 {
        const INSTANCE = 1 << 0;
        const DATA_MODEL = 1 << 1;
        const WORKSPACE = 1 << 2;
        const FOLDER = 1 << 3;
        const PV_INSTANCE = 1 << 4;
        const MODEL = 1 << 5;
        const BASE_PART = 1 << 6;
        const PART = 1 << 7;
        const SPAWN_LOCATION = 1 << 8;
        const LUA_SOURCE_CONTAINER = 1 << 9;
        const SCRIPT = 1 << 10;
    }
}

impl ClassSet {
    pub fn of(tags: &[ClassTag]) -> Self {
        tags.iter()
            .fold(ClassSet::INSTANCE, |set, tag| set | tag.set())
    }

    pub fn has(self, tag: ClassTag) -> bool {
        self.contains(tag.set())
    }

    pub fn tags(self) -> impl Iterator<Item = ClassTag> {
        ClassTag::ordered()
            .into_iter()
            .filter(move |tag| self.has(*tag))
    }
}

/// Closed set of instance payloads. Descriptors decide which payload a class
/// carries; the arena stores it next to the common node fields.
#[derive(Debug, Clone)]
pub enum InstanceKind {
    Container,
    Workspace(WorkspaceData),
    Part(PartData),
    Script(ScriptData),
}

impl InstanceKind {
    pub fn label(&self) -> &'static str {
        match self {
            InstanceKind::Container => "Container",
            InstanceKind::Workspace(_) => "Workspace",
            InstanceKind::Part(_) => "Part",
            InstanceKind::Script(_) => "Script",
        }
    }

    /// Copy of the payload with every runtime binding (bodies, scenes) cleared.
    pub(crate) fn detached_clone(&self) -> Self {
        match self {
            InstanceKind::Container => InstanceKind::Container,
            InstanceKind::Workspace(data) => InstanceKind::Workspace(WorkspaceData {
                gravity: data.gravity,
                scene: None,
            }),
            InstanceKind::Part(data) => InstanceKind::Part(PartData {
                body: None,
                ..data.clone()
            }),
            InstanceKind::Script(data) => InstanceKind::Script(data.clone()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct WorkspaceData {
    pub gravity: Vec3,
    pub(crate) scene: Option<crate::physics::SceneId>,
}

impl WorkspaceData {
    pub fn scene(&self) -> Option<crate::physics::SceneId> {
        self.scene
    }
}

impl Default for WorkspaceData {
    fn default() -> Self {
        Self {
            gravity: Vec3::new(0.0, -196.2, 0.0),
            scene: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PartData {
    pub position: Vec3,
    pub rotation: Quat,
    pub size: Vec3,
    pub anchored: bool,
    pub can_collide: bool,
    pub transparency: f32,
    pub(crate) body: Option<BodyHandle>,
}

impl PartData {
    pub fn body(&self) -> Option<BodyHandle> {
        self.body
    }
}

impl Default for PartData {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            size: Vec3::new(4.0, 1.0, 2.0),
            anchored: false,
            can_collide: true,
            transparency: 0.0,
            body: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptData {
    pub source: String,
    pub enabled: bool,
}

impl Default for ScriptData {
    fn default() -> Self {
        Self {
            source: String::from("print(\"Hello world!\")\n"),
            enabled: true,
        }
    }
}

/// Typed view over an [`InstanceKind`], used for checked downcasts.
pub trait InstanceClass: Sized + 'static {
    const TAG: ClassTag;

    fn from_kind(kind: &InstanceKind) -> Option<&Self>;
    fn from_kind_mut(kind: &mut InstanceKind) -> Option<&mut Self>;
}

impl InstanceClass for PartData {
    const TAG: ClassTag = ClassTag::BasePart;

    fn from_kind(kind: &InstanceKind) -> Option<&Self> {
        match kind {
            InstanceKind::Part(data) => Some(data),
            _ => None,
        }
    }

    fn from_kind_mut(kind: &mut InstanceKind) -> Option<&mut Self> {
        match kind {
            InstanceKind::Part(data) => Some(data),
            _ => None,
        }
    }
}

impl InstanceClass for WorkspaceData {
    const TAG: ClassTag = ClassTag::Workspace;

    fn from_kind(kind: &InstanceKind) -> Option<&Self> {
        match kind {
            InstanceKind::Workspace(data) => Some(data),
            _ => None,
        }
    }

    fn from_kind_mut(kind: &mut InstanceKind) -> Option<&mut Self> {
        match kind {
            InstanceKind::Workspace(data) => Some(data),
            _ => None,
        }
    }
}

impl InstanceClass for ScriptData {
    const TAG: ClassTag = ClassTag::LuaSourceContainer;

    fn from_kind(kind: &InstanceKind) -> Option<&Self> {
        match kind {
            InstanceKind::Script(data) => Some(data),
            _ => None,
        }
    }

    fn from_kind_mut(kind: &mut InstanceKind) -> Option<&mut Self> {
        match kind {
            InstanceKind::Script(data) => Some(data),
            _ => None,
        }
    }
}
