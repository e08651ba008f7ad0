pub mod class;
pub mod property;
mod traverse;

pub use property::{PropertyDescriptor, PropertyKind, PropertyValue};
pub use traverse::{Ancestors, Descendants};

use crate::config::PhysicsConfig;
use crate::physics::{self, BodyContact, BodyHandle, PhysicsBridge, PhysicsError, Pose, SceneId};
use crate::registry::{RegistryError, TypeDescriptor, TypeRegistry};
use class::{ClassTag, InstanceClass, InstanceKind};
use property::BodyEffect;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Generational handle to a node of a [`DataModel`]. Handles outlive the node
/// they point to; every access re-validates the generation.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct InstanceId {
    index: u32,
    generation: u32,
}

const USER_DATA_TAG: u128 = 1 << 127;

impl InstanceId {
    pub const fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    pub const fn index(self) -> u32 {
        self.index
    }

    pub const fn generation(self) -> u32 {
        self.generation
    }

    /// Encodes the id for a physics body's user-data slot. The top bit marks
    /// the value as an instance id so untagged user-data is never mistaken
    /// for one.
    pub const fn to_user_data(self) -> u128 {
        USER_DATA_TAG | ((self.generation as u128) << 32) | self.index as u128
    }

    pub const fn from_user_data(data: u128) -> Option<Self> {
        if data & USER_DATA_TAG == 0 || (data & !USER_DATA_TAG) >> 64 != 0 {
            return None;
        }
        Some(Self {
            index: data as u32,
            generation: (data >> 32) as u32,
        })
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}v{}", self.index, self.generation)
    }
}

/// A freshly constructed instance that is not part of any graph yet.
#[derive(Debug, Clone)]
pub struct Instance {
    descriptor: Arc<TypeDescriptor>,
    name: String,
    kind: InstanceKind,
}

impl Instance {
    pub(crate) fn new(descriptor: Arc<TypeDescriptor>, kind: InstanceKind) -> Self {
        Self {
            name: descriptor.class_name().to_string(),
            descriptor,
            kind,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn descriptor(&self) -> &Arc<TypeDescriptor> {
        &self.descriptor
    }

    pub fn kind(&self) -> &InstanceKind {
        &self.kind
    }

    pub fn kind_mut(&mut self) -> &mut InstanceKind {
        &mut self.kind
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum GraphError {
    #[error("instance {0} does not exist")]
    NoSuchInstance(InstanceId),
    #[error("cannot parent {node} under {parent}: {parent} is {node} or one of its descendants")]
    CyclicParenting { node: InstanceId, parent: InstanceId },
    #[error("cannot parent {node} under {}: {reason}", display_parent(.parent))]
    InvalidReparent {
        node: InstanceId,
        parent: Option<InstanceId>,
        reason: String,
    },
    #[error("instance {0} is protected and cannot be destroyed")]
    ProtectedInstance(InstanceId),
    #[error("expected {expected}, found {actual}")]
    TypeMismatch { expected: ClassTag, actual: String },
    #[error("{class} has no property {property}")]
    UnknownProperty { class: String, property: String },
    #[error("property {property} expects {expected}, got {actual}")]
    PropertyTypeMismatch {
        property: String,
        expected: PropertyKind,
        actual: PropertyKind,
    },
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

fn display_parent(parent: &Option<InstanceId>) -> String {
    match parent {
        Some(parent) => parent.to_string(),
        None => "nothing".to_string(),
    }
}

/// Outcome of a parent change. `old_index`/`new_index` are positions in the
/// respective parent's child list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParentChange {
    pub instance: InstanceId,
    pub old_parent: Option<InstanceId>,
    pub old_index: Option<usize>,
    pub new_parent: Option<InstanceId>,
    pub new_index: Option<usize>,
}

impl ParentChange {
    pub fn is_noop(&self) -> bool {
        self.old_parent == self.new_parent && self.old_index == self.new_index
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeSnapshot {
    pub id: InstanceId,
    pub class_name: String,
    pub name: String,
    pub parent: Option<InstanceId>,
    pub children: Vec<InstanceId>,
    pub properties: Vec<(String, PropertyValue)>,
}

/// Observable state of a subtree in pre-order. Runtime bindings (bodies,
/// scenes) and hold counts are not part of it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubtreeSnapshot {
    pub root: InstanceId,
    pub nodes: Vec<NodeSnapshot>,
}

/// Physics work left over after a property write.
enum FollowUp {
    Pose(BodyHandle, Pose),
    Rebuild(BodyHandle),
    Gravity(SceneId, glam::Vec3),
}

#[derive(Debug)]
struct Node {
    descriptor: Arc<TypeDescriptor>,
    name: String,
    parent: Option<InstanceId>,
    children: Vec<InstanceId>,
    holds: u32,
    kind: InstanceKind,
}

#[derive(Debug, Default)]
struct Slot {
    generation: u32,
    node: Option<Node>,
}

fn node_in(slots: &[Slot], id: InstanceId) -> Option<&Node> {
    slots
        .get(id.index as usize)
        .filter(|slot| slot.generation == id.generation)
        .and_then(|slot| slot.node.as_ref())
}

fn node_in_mut(slots: &mut [Slot], id: InstanceId) -> Option<&mut Node> {
    slots
        .get_mut(id.index as usize)
        .filter(|slot| slot.generation == id.generation)
        .and_then(|slot| slot.node.as_mut())
}

/// The instance tree of one editing session.
///
/// Nodes live in a generational arena. Children are owned by their parent;
/// every other relation (parent links, selection, undo records, physics
/// user-data) is a plain [`InstanceId`] that is validated on use.
pub struct DataModel {
    registry: Arc<TypeRegistry>,
    slots: Vec<Slot>,
    free_list: Vec<u32>,
    floating: Vec<InstanceId>,
    root: InstanceId,
    workspace: InstanceId,
    physics: PhysicsBridge,
}

impl DataModel {
    /// Builds a graph holding the DataModel root and one Workspace.
    pub fn new(registry: Arc<TypeRegistry>, physics: PhysicsConfig) -> Result<Self, GraphError> {
        let gravity = physics.gravity;
        let root_instance = registry.construct_service("DataModel")?;
        let workspace_instance = registry.construct_service("Workspace")?;

        let mut model = Self {
            registry,
            slots: Vec::new(),
            free_list: Vec::new(),
            floating: Vec::new(),
            root: InstanceId::new(0, 0),
            workspace: InstanceId::new(0, 0),
            physics: PhysicsBridge::new(physics),
        };

        let root = model.insert(root_instance.with_name("Game"));
        model.retain(root)?;
        model.root = root;

        let mut workspace_instance = workspace_instance;
        if let InstanceKind::Workspace(data) = workspace_instance.kind_mut() {
            data.gravity = gravity;
        }
        let workspace = model.insert(workspace_instance);
        model.set_parent(workspace, Some(root))?;
        model.workspace = workspace;

        log::debug!("[scene] data model ready (root {root}, workspace {workspace})");
        Ok(model)
    }

    /// Graph over the shared built-in registry with default physics settings.
    pub fn builtin() -> Self {
        Self::new(crate::registry::builtin(), PhysicsConfig::default())
            .expect("built-in registry provides DataModel and Workspace")
    }

    pub fn registry(&self) -> &Arc<TypeRegistry> {
        &self.registry
    }

    pub fn physics(&self) -> &PhysicsBridge {
        &self.physics
    }

    #[cfg(test)]
    pub(crate) fn physics_mut(&mut self) -> &mut PhysicsBridge {
        &mut self.physics
    }

    pub fn root(&self) -> InstanceId {
        self.root
    }

    /// The workspace created with the graph.
    pub fn workspace(&self) -> InstanceId {
        self.workspace
    }

    /// Every workspace directly under the root, i.e. every simulated world.
    pub fn workspaces(&self) -> impl Iterator<Item = InstanceId> + '_ {
        self.children(self.root)
            .iter()
            .copied()
            .filter(|child| self.is_a_tag(*child, ClassTag::Workspace))
    }

    /// Adds another simulated world under the root.
    pub fn add_workspace(&mut self, name: &str) -> Result<InstanceId, GraphError> {
        let mut instance = self.registry.construct_service("Workspace")?.with_name(name);
        if let InstanceKind::Workspace(data) = instance.kind_mut() {
            data.gravity = self.physics.config().gravity;
        }
        let workspace = self.insert(instance);
        self.set_parent(workspace, Some(self.root))?;
        Ok(workspace)
    }

    /// Constructs `class` through the registry and inserts it unparented.
    pub fn create(&mut self, class: &str) -> Result<InstanceId, GraphError> {
        let instance = self.registry.construct(class)?;
        Ok(self.insert(instance))
    }

    /// Inserts a constructed instance as a floating node.
    pub fn insert(&mut self, instance: Instance) -> InstanceId {
        let Instance {
            descriptor,
            name,
            kind,
        } = instance;
        let id = self.alloc(Node {
            descriptor,
            name,
            parent: None,
            children: Vec::new(),
            holds: 0,
            kind,
        });
        self.floating.push(id);
        log::trace!("[scene] inserted {id}");
        id
    }

    fn alloc(&mut self, mut node: Node) -> InstanceId {
        if let InstanceKind::Workspace(data) = &mut node.kind {
            data.scene = Some(self.physics.create_scene(data.gravity));
        }
        if let Some(index) = self.free_list.pop() {
            let slot = &mut self.slots[index as usize];
            slot.node = Some(node);
            InstanceId::new(index, slot.generation)
        } else {
            let index = self.slots.len() as u32;
            self.slots.push(Slot {
                generation: 0,
                node: Some(node),
            });
            InstanceId::new(index, 0)
        }
    }

    pub fn contains(&self, id: InstanceId) -> bool {
        node_in(&self.slots, id).is_some()
    }

    /// Number of live nodes, floating ones included.
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|slot| slot.node.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn node(&self, id: InstanceId) -> Result<&Node, GraphError> {
        node_in(&self.slots, id).ok_or(GraphError::NoSuchInstance(id))
    }

    fn node_mut(&mut self, id: InstanceId) -> Result<&mut Node, GraphError> {
        node_in_mut(&mut self.slots, id).ok_or(GraphError::NoSuchInstance(id))
    }

    pub fn parent(&self, id: InstanceId) -> Option<InstanceId> {
        node_in(&self.slots, id)?.parent
    }

    /// Child list in order; empty for expired ids.
    pub fn children(&self, id: InstanceId) -> &[InstanceId] {
        node_in(&self.slots, id)
            .map(|node| node.children.as_slice())
            .unwrap_or(&[])
    }

    pub fn name(&self, id: InstanceId) -> Option<&str> {
        node_in(&self.slots, id).map(|node| node.name.as_str())
    }

    pub fn class_name(&self, id: InstanceId) -> Option<&str> {
        node_in(&self.slots, id).map(|node| node.descriptor.class_name())
    }

    pub fn descriptor(&self, id: InstanceId) -> Option<&Arc<TypeDescriptor>> {
        node_in(&self.slots, id).map(|node| &node.descriptor)
    }

    pub fn holds(&self, id: InstanceId) -> u32 {
        node_in(&self.slots, id).map_or(0, |node| node.holds)
    }

    pub fn index_in_parent(&self, id: InstanceId) -> Option<usize> {
        let parent = self.parent(id)?;
        self.children(parent).iter().position(|child| *child == id)
    }

    pub fn ancestors(&self, id: InstanceId) -> Ancestors<'_> {
        Ancestors::of(self, id)
    }

    /// True when `ancestor` is a strict ancestor of `node`.
    pub fn is_ancestor_of(&self, ancestor: InstanceId, node: InstanceId) -> bool {
        self.ancestors(node).any(|current| current == ancestor)
    }

    /// True when the node hangs below the root (or is the root).
    pub fn is_rooted(&self, id: InstanceId) -> bool {
        self.contains(id) && (id == self.root || self.is_ancestor_of(self.root, id))
    }

    /// Detached, unheld and waiting for [`DataModel::collect_garbage`].
    pub fn is_floating(&self, id: InstanceId) -> bool {
        node_in(&self.slots, id)
            .is_some_and(|node| node.parent.is_none() && node.holds == 0 && id != self.root)
    }

    /// Pre-order traversal below `id`, excluding `id` itself.
    pub fn descendants(&self, id: InstanceId) -> Descendants<'_> {
        Descendants::below(self, id)
    }

    /// Pre-order traversal starting with `id` itself.
    pub fn subtree(&self, id: InstanceId) -> Descendants<'_> {
        Descendants::including(self, id)
    }

    pub fn find_descendants<'a, P>(
        &'a self,
        id: InstanceId,
        predicate: P,
    ) -> impl Iterator<Item = InstanceId> + 'a
    where
        P: FnMut(&InstanceId) -> bool + 'a,
    {
        self.descendants(id).filter(predicate)
    }

    pub fn find_first_descendant<P>(&self, id: InstanceId, predicate: P) -> Option<InstanceId>
    where
        P: FnMut(&InstanceId) -> bool,
    {
        self.descendants(id).find(predicate)
    }

    pub fn find_first_child(&self, id: InstanceId, name: &str) -> Option<InstanceId> {
        self.children(id)
            .iter()
            .copied()
            .find(|child| self.name(*child) == Some(name))
    }

    pub fn is_a<T: InstanceClass>(&self, id: InstanceId) -> bool {
        self.is_a_tag(id, T::TAG)
    }

    pub fn is_a_tag(&self, id: InstanceId, tag: ClassTag) -> bool {
        node_in(&self.slots, id).is_some_and(|node| node.descriptor.is_a(tag))
    }

    /// Checked downcast of the node's payload.
    pub fn cast<T: InstanceClass>(&self, id: InstanceId) -> Result<&T, GraphError> {
        let node = self.node(id)?;
        let mismatch = || GraphError::TypeMismatch {
            expected: T::TAG,
            actual: node.descriptor.class_name().to_string(),
        };
        if !node.descriptor.is_a(T::TAG) {
            return Err(mismatch());
        }
        T::from_kind(&node.kind).ok_or_else(mismatch)
    }

    /// Mutable downcast. Writes made here reach a physics body at the next
    /// simulation step; [`DataModel::set_property`] pushes them immediately.
    pub fn cast_mut<T: InstanceClass>(&mut self, id: InstanceId) -> Result<&mut T, GraphError> {
        let node = node_in_mut(&mut self.slots, id).ok_or(GraphError::NoSuchInstance(id))?;
        if !node.descriptor.is_a(T::TAG) {
            return Err(GraphError::TypeMismatch {
                expected: T::TAG,
                actual: node.descriptor.class_name().to_string(),
            });
        }
        let actual = node.descriptor.class_name().to_string();
        T::from_kind_mut(&mut node.kind).ok_or(GraphError::TypeMismatch {
            expected: T::TAG,
            actual,
        })
    }

    pub fn set_parent(
        &mut self,
        node: InstanceId,
        parent: Option<InstanceId>,
    ) -> Result<ParentChange, GraphError> {
        self.reparent(node, parent, None)
    }

    /// Like [`DataModel::set_parent`] but inserts at `index`. Indices past the
    /// end of the child list are clamped to the tail.
    pub fn set_parent_at(
        &mut self,
        node: InstanceId,
        parent: InstanceId,
        index: usize,
    ) -> Result<ParentChange, GraphError> {
        self.reparent(node, Some(parent), Some(index))
    }

    fn reparent(
        &mut self,
        node: InstanceId,
        new_parent: Option<InstanceId>,
        index: Option<usize>,
    ) -> Result<ParentChange, GraphError> {
        let old_parent = self.node(node)?.parent;
        let old_index = self.index_in_parent(node);

        if node == self.root {
            return Err(GraphError::InvalidReparent {
                node,
                parent: new_parent,
                reason: "the DataModel root cannot be reparented".into(),
            });
        }
        if node == self.workspace && new_parent != Some(self.root) {
            return Err(GraphError::InvalidReparent {
                node,
                parent: new_parent,
                reason: "the primary workspace must stay under the root".into(),
            });
        }

        if let Some(parent) = new_parent {
            let parent_node = self.node(parent)?;
            if parent == node || self.is_ancestor_of(node, parent) {
                return Err(GraphError::CyclicParenting { node, parent });
            }
            let child_descriptor = &self.node(node)?.descriptor;
            if !parent_node.descriptor.accepts_child(child_descriptor) {
                return Err(GraphError::InvalidReparent {
                    node,
                    parent: new_parent,
                    reason: format!(
                        "{} does not accept {} children",
                        parent_node.descriptor.class_name(),
                        child_descriptor.class_name()
                    ),
                });
            }
        }

        if old_parent == new_parent && index.is_none() {
            return Ok(ParentChange {
                instance: node,
                old_parent,
                old_index,
                new_parent,
                new_index: old_index,
            });
        }

        if let Some(old) = old_parent {
            self.node_mut(old)?.children.retain(|child| *child != node);
        }
        let new_index = match new_parent {
            Some(parent) => {
                let children = &mut self.node_mut(parent)?.children;
                let at = index.unwrap_or(children.len()).min(children.len());
                children.insert(at, node);
                Some(at)
            }
            None => None,
        };
        let moved = self.node_mut(node)?;
        moved.parent = new_parent;
        if new_parent.is_none() && moved.holds == 0 && !self.floating.contains(&node) {
            self.floating.push(node);
        }

        self.sync_subtree_bodies(node);
        log::trace!("[scene] {node}: {old_parent:?}@{old_index:?} -> {new_parent:?}@{new_index:?}");
        Ok(ParentChange {
            instance: node,
            old_parent,
            old_index,
            new_parent,
            new_index,
        })
    }

    /// Scene stepped for a workspace node; `None` unless it sits directly
    /// under the root.
    fn stepped_scene(&self, node: &Node) -> Option<SceneId> {
        match &node.kind {
            InstanceKind::Workspace(data) if node.parent == Some(self.root) => data.scene,
            _ => None,
        }
    }

    /// Scene of the nearest workspace at or above `id`, if that workspace is
    /// stepped.
    fn simulated_scene(&self, id: InstanceId) -> Option<SceneId> {
        std::iter::once(id)
            .chain(self.ancestors(id))
            .filter_map(|current| node_in(&self.slots, current))
            .find(|node| matches!(node.kind, InstanceKind::Workspace(_)))
            .and_then(|node| self.stepped_scene(node))
    }

    /// Re-binds every part below `top` whose simulated scene no longer
    /// matches the scene of its body.
    fn sync_subtree_bodies(&mut self, top: InstanceId) {
        let inherited = self.parent(top).and_then(|parent| self.simulated_scene(parent));
        let mut stack = vec![(top, inherited)];
        let mut stale = Vec::new();
        while let Some((id, scene)) = stack.pop() {
            let Some(node) = node_in(&self.slots, id) else {
                continue;
            };
            let scene_below = match &node.kind {
                InstanceKind::Workspace(_) => self.stepped_scene(node),
                InstanceKind::Part(part) => {
                    if part.body.map(BodyHandle::scene) != scene {
                        stale.push((id, scene));
                    }
                    scene
                }
                _ => scene,
            };
            stack.extend(node.children.iter().map(|child| (*child, scene_below)));
        }
        for (id, scene) in stale {
            self.rebind_body(id, scene);
        }
    }

    /// Drops the part's body and, when `scene` is set, creates a fresh one.
    fn rebind_body(&mut self, id: InstanceId, scene: Option<SceneId>) {
        let Some(node) = node_in_mut(&mut self.slots, id) else {
            return;
        };
        let InstanceKind::Part(part) = &mut node.kind else {
            return;
        };
        if let Some(body) = part.body.take() {
            self.physics.remove_body(body);
        }
        if let Some(scene) = scene {
            match self.physics.create_body(scene, id, part) {
                Ok(body) => part.body = Some(body),
                Err(err) => log::warn!("[scene] failed to create body for {id}: {err}"),
            }
        }
    }

    pub fn get_property(&self, id: InstanceId, name: &str) -> Result<PropertyValue, GraphError> {
        let node = self.node(id)?;
        if name == property::NAME {
            return Ok(PropertyValue::String(node.name.clone()));
        }
        property::read(&node.kind, name).ok_or_else(|| GraphError::UnknownProperty {
            class: node.descriptor.class_name().to_string(),
            property: name.to_string(),
        })
    }

    /// Writes a property and returns its previous value. Transform writes on
    /// simulated parts are pushed to the body; shape and mode changes rebuild
    /// it.
    pub fn set_property(
        &mut self,
        id: InstanceId,
        name: &str,
        value: PropertyValue,
    ) -> Result<PropertyValue, GraphError> {
        let node = node_in_mut(&mut self.slots, id).ok_or(GraphError::NoSuchInstance(id))?;
        let descriptor =
            property::find_property(&node.kind, name).ok_or_else(|| GraphError::UnknownProperty {
                class: node.descriptor.class_name().to_string(),
                property: name.to_string(),
            })?;
        let mismatch = |actual| GraphError::PropertyTypeMismatch {
            property: name.to_string(),
            expected: descriptor.kind,
            actual,
        };
        if descriptor.kind != value.kind() {
            return Err(mismatch(value.kind()));
        }

        let actual = value.kind();
        let (previous, effect) = match (descriptor.name, value) {
            (property::NAME, PropertyValue::String(new_name)) => (
                PropertyValue::String(std::mem::replace(&mut node.name, new_name)),
                BodyEffect::None,
            ),
            (_, value) => property::write(&mut node.kind, name, value).ok_or_else(|| mismatch(actual))?,
        };

        let follow_up = match (effect, &node.kind) {
            (BodyEffect::Pose, InstanceKind::Part(part)) => part
                .body
                .map(|body| FollowUp::Pose(body, Pose::new(part.position, part.rotation))),
            (BodyEffect::Rebuild, InstanceKind::Part(part)) => part.body.map(FollowUp::Rebuild),
            (BodyEffect::Gravity, InstanceKind::Workspace(data)) => data
                .scene
                .map(|scene| FollowUp::Gravity(scene, data.gravity)),
            _ => None,
        };
        match follow_up {
            Some(FollowUp::Pose(body, pose)) => {
                self.physics.set_body_pose(body, pose);
            }
            Some(FollowUp::Rebuild(body)) => self.rebind_body(id, Some(body.scene())),
            Some(FollowUp::Gravity(scene, gravity)) => {
                if let Err(err) = self.physics.set_gravity(scene, gravity) {
                    log::warn!("[scene] failed to update gravity of {id}: {err}");
                }
            }
            None => {}
        }
        Ok(previous)
    }

    /// Adds a strong holder to a node. Held nodes survive being detached.
    pub fn retain(&mut self, id: InstanceId) -> Result<(), GraphError> {
        self.node_mut(id)?.holds += 1;
        Ok(())
    }

    /// Drops a holder. A detached node losing its last holder is destroyed
    /// right away; returns whether that happened. Releasing an expired id is
    /// a no-op.
    pub fn release(&mut self, id: InstanceId) -> bool {
        let Some(node) = node_in_mut(&mut self.slots, id) else {
            return false;
        };
        node.holds = node.holds.saturating_sub(1);
        if node.holds == 0 && node.parent.is_none() && id != self.root {
            return self.destroy(id).is_ok();
        }
        false
    }

    /// Destroys every floating node. Returns the number of destroyed nodes,
    /// descendants included.
    pub fn collect_garbage(&mut self) -> usize {
        let pending = std::mem::take(&mut self.floating);
        let mut destroyed = 0;
        for id in pending {
            if self.is_floating(id) && id != self.workspace {
                destroyed += self.destroy(id).unwrap_or(0);
            }
        }
        if destroyed > 0 {
            log::debug!("[scene] collected {destroyed} floating instances");
        }
        destroyed
    }

    /// Destroys a node and its subtree, releasing bodies and scenes. Every id
    /// into the freed part of the subtree expires.
    ///
    /// Held nodes are never freed: a held target is only detached, and a
    /// held descendant is cut loose with its own subtree intact until its
    /// last holder releases it. Returns the number of destroyed nodes.
    pub fn destroy(&mut self, id: InstanceId) -> Result<usize, GraphError> {
        let (parent, holds) = {
            let node = self.node(id)?;
            (node.parent, node.holds)
        };
        if id == self.root || id == self.workspace {
            return Err(GraphError::ProtectedInstance(id));
        }
        if holds > 0 {
            if parent.is_some() {
                self.set_parent(id, None)?;
            }
            log::trace!("[scene] {id} is held ({holds}); detached instead of destroyed");
            return Ok(0);
        }
        if let Some(parent) = parent {
            self.node_mut(parent)?.children.retain(|child| *child != id);
        }

        let mut destroyed = 0;
        let mut survivors = Vec::new();
        let mut stack = vec![id];
        while let Some(victim) = stack.pop() {
            let slot = &mut self.slots[victim.index as usize];
            if slot.node.as_ref().is_some_and(|node| node.holds > 0) {
                survivors.push(victim);
                continue;
            }
            let Some(node) = slot.node.take() else {
                continue;
            };
            slot.generation = slot.generation.wrapping_add(1);
            self.free_list.push(victim.index);
            destroyed += 1;
            stack.extend(node.children.iter().copied());
            match node.kind {
                InstanceKind::Part(part) => {
                    if let Some(body) = part.body {
                        self.physics.remove_body(body);
                    }
                }
                InstanceKind::Workspace(data) => {
                    if let Some(scene) = data.scene {
                        self.physics.remove_scene(scene);
                    }
                }
                _ => {}
            }
        }

        for survivor in survivors {
            if let Some(node) = node_in_mut(&mut self.slots, survivor) {
                node.parent = None;
            }
            self.sync_subtree_bodies(survivor);
            log::trace!("[scene] {survivor} is held; cut loose from destroyed {id}");
        }
        log::trace!("[scene] destroyed {id} ({destroyed} nodes)");
        Ok(destroyed)
    }

    /// Deep copy of a subtree. The copy is floating; parts only get bodies
    /// once the copy is parented under a simulated world.
    pub fn clone_subtree(&mut self, id: InstanceId) -> Result<InstanceId, GraphError> {
        self.node(id)?;
        let sources: Vec<InstanceId> = self.subtree(id).collect();
        let mut mapping = std::collections::HashMap::with_capacity(sources.len());
        let mut top = None;
        for source in sources {
            let node = self.node(source)?;
            let parent = node
                .parent
                .filter(|_| source != id)
                .and_then(|parent| mapping.get(&parent).copied());
            let copy = Node {
                descriptor: Arc::clone(&node.descriptor),
                name: node.name.clone(),
                parent,
                children: Vec::new(),
                holds: 0,
                kind: node.kind.detached_clone(),
            };
            let copy_id = self.alloc(copy);
            if let Some(parent) = parent {
                self.node_mut(parent)?.children.push(copy_id);
            }
            mapping.insert(source, copy_id);
            top.get_or_insert(copy_id);
        }
        let top = top.ok_or(GraphError::NoSuchInstance(id))?;
        self.floating.push(top);
        self.sync_subtree_bodies(top);
        Ok(top)
    }

    pub fn snapshot(&self, id: InstanceId) -> Result<SubtreeSnapshot, GraphError> {
        self.node(id)?;
        let nodes = self
            .subtree(id)
            .filter_map(|current| {
                let node = node_in(&self.slots, current)?;
                let properties = property::properties_of(&node.kind)
                    .iter()
                    .filter(|descriptor| descriptor.name != property::NAME)
                    .filter_map(|descriptor| {
                        property::read(&node.kind, descriptor.name)
                            .map(|value| (descriptor.name.to_string(), value))
                    })
                    .collect();
                Some(NodeSnapshot {
                    id: current,
                    class_name: node.descriptor.class_name().to_string(),
                    name: node.name.clone(),
                    parent: node.parent,
                    children: node.children.clone(),
                    properties,
                })
            })
            .collect();
        Ok(SubtreeSnapshot { root: id, nodes })
    }

    /// Traces a body back to the part that owns it.
    pub fn resolve_owner(&self, body: BodyHandle) -> Result<InstanceId, PhysicsError> {
        physics::resolve_owner(self, body)
    }

    /// Advances every simulated world. Anchored parts are pushed to their
    /// kinematic bodies first; dynamic bodies are pulled back into their parts
    /// afterwards.
    pub fn step_simulation(&mut self, dt: f32) -> Vec<BodyContact> {
        let worlds: Vec<(InstanceId, SceneId)> = self
            .workspaces()
            .filter_map(|workspace| {
                let scene = self.cast::<class::WorkspaceData>(workspace).ok()?.scene()?;
                Some((workspace, scene))
            })
            .collect();

        let mut contacts = Vec::new();
        for (workspace, scene) in worlds {
            let anchored: Vec<(BodyHandle, Pose)> = self
                .descendants(workspace)
                .filter_map(|id| {
                    let part = self.cast::<class::PartData>(id).ok()?;
                    let body = part.body().filter(|_| part.anchored)?;
                    Some((body, Pose::new(part.position, part.rotation)))
                })
                .collect();
            for (body, pose) in anchored {
                self.physics.set_body_pose(body, pose);
            }

            match self.physics.step_scene(scene, dt) {
                Ok(step_contacts) => contacts.extend(step_contacts),
                Err(err) => {
                    log::warn!("[scene] failed to step {workspace}: {err}");
                    continue;
                }
            }

            let poses = match self.physics.dynamic_poses(scene) {
                Ok(poses) => poses,
                Err(err) => {
                    log::warn!("[scene] failed to read poses of {workspace}: {err}");
                    continue;
                }
            };
            for (body, _, pose) in poses {
                let owner = match self.resolve_owner(body) {
                    Ok(owner) => owner,
                    Err(err) => {
                        log::trace!("[scene] skipping pose pull: {err}");
                        continue;
                    }
                };
                if let Ok(part) = self.cast_mut::<class::PartData>(owner) {
                    part.position = pose.position;
                    part.rotation = pose.rotation;
                }
            }
        }
        contacts
    }
}

#[cfg(test)]
mod tests {
    use super::class::{PartData, ScriptData, WorkspaceData};
    use super::*;
    use glam::Vec3;

    fn model() -> DataModel {
        DataModel::builtin()
    }

    #[test]
    fn user_data_round_trips_and_rejects_untagged_values() {
        let id = InstanceId::new(17, 3);
        assert_eq!(InstanceId::from_user_data(id.to_user_data()), Some(id));
        assert_eq!(InstanceId::from_user_data(0), None);
        assert_eq!(InstanceId::from_user_data(u64::MAX as u128), None);
        assert_eq!(InstanceId::from_user_data(USER_DATA_TAG | (1u128 << 100)), None);
    }

    #[test]
    fn new_model_has_root_and_workspace() {
        let model = model();
        assert_eq!(model.class_name(model.root()), Some("DataModel"));
        assert_eq!(model.parent(model.workspace()), Some(model.root()));
        assert!(model.is_a::<WorkspaceData>(model.workspace()));
        assert_eq!(model.workspaces().collect::<Vec<_>>(), vec![model.workspace()]);
        assert_eq!(model.len(), 2);
    }

    #[test]
    fn set_parent_appends_and_clamps_indices() {
        let mut model = model();
        let folder = model.create("Folder").expect("folder");
        let a = model.create("Part").expect("a");
        let b = model.create("Part").expect("b");
        let c = model.create("Part").expect("c");
        model.set_parent(a, Some(folder)).expect("a");
        model.set_parent(b, Some(folder)).expect("b");
        let change = model.set_parent_at(c, folder, 99).expect("c");
        assert_eq!(change.new_index, Some(2));
        assert_eq!(model.children(folder), &[a, b, c]);
        assert_eq!(model.index_in_parent(b), Some(1));
    }

    #[test]
    fn same_parent_without_index_is_a_noop() {
        let mut model = model();
        let folder = model.create("Folder").expect("folder");
        let a = model.create("Part").expect("a");
        let b = model.create("Part").expect("b");
        model.set_parent(a, Some(folder)).expect("a");
        model.set_parent(b, Some(folder)).expect("b");
        let change = model.set_parent(a, Some(folder)).expect("noop");
        assert!(change.is_noop());
        assert_eq!(model.children(folder), &[a, b]);
    }

    #[test]
    fn cycles_and_policy_violations_are_rejected() {
        let mut model = model();
        let outer = model.create("Folder").expect("outer");
        let inner = model.create("Folder").expect("inner");
        model.set_parent(inner, Some(outer)).expect("nest");

        assert_eq!(
            model.set_parent(outer, Some(inner)),
            Err(GraphError::CyclicParenting {
                node: outer,
                parent: inner
            })
        );
        assert_eq!(
            model.set_parent(outer, Some(outer)),
            Err(GraphError::CyclicParenting {
                node: outer,
                parent: outer
            })
        );
        assert_eq!(model.parent(inner), Some(outer));
        assert_eq!(model.parent(outer), None);

        let root = model.root();
        assert!(matches!(
            model.set_parent(outer, Some(root)),
            Err(GraphError::InvalidReparent { .. })
        ));
        assert!(matches!(
            model.set_parent(root, Some(outer)),
            Err(GraphError::InvalidReparent { .. })
        ));
        let workspace = model.workspace();
        assert!(matches!(
            model.set_parent(workspace, Some(outer)),
            Err(GraphError::InvalidReparent { .. })
        ));
    }

    #[test]
    fn cast_checks_ancestry_and_payload() {
        let mut model = model();
        let spawn = model.create("SpawnLocation").expect("spawn");
        let script = model.create("Script").expect("script");

        assert!(model.cast::<PartData>(spawn).expect("spawn is a part").anchored);
        assert_eq!(
            model.cast::<PartData>(script).err(),
            Some(GraphError::TypeMismatch {
                expected: ClassTag::BasePart,
                actual: "Script".into()
            })
        );
        model.cast_mut::<ScriptData>(script).expect("script").enabled = false;
        assert_eq!(
            model.get_property(script, "Enabled"),
            Ok(PropertyValue::Bool(false))
        );
        assert!(model.is_a_tag(spawn, ClassTag::PVInstance));
        assert!(!model.is_a_tag(spawn, ClassTag::Model));
    }

    #[test]
    fn properties_validate_names_and_kinds() {
        let mut model = model();
        let part = model.create("Part").expect("part");
        let previous = model
            .set_property(part, "Name", PropertyValue::String("Brick".into()))
            .expect("rename");
        assert_eq!(previous, PropertyValue::String("Part".into()));
        assert_eq!(model.name(part), Some("Brick"));

        assert!(matches!(
            model.set_property(part, "Source", PropertyValue::String(String::new())),
            Err(GraphError::UnknownProperty { .. })
        ));
        assert_eq!(
            model.set_property(part, "Anchored", PropertyValue::Number(1.0)),
            Err(GraphError::PropertyTypeMismatch {
                property: "Anchored".into(),
                expected: PropertyKind::Bool,
                actual: PropertyKind::Number
            })
        );
    }

    #[test]
    fn floating_nodes_are_collected_unless_held() {
        let mut model = model();
        let kept = model.create("Folder").expect("kept");
        let dropped = model.create("Folder").expect("dropped");
        let child = model.create("Part").expect("child");
        model.set_parent(child, Some(dropped)).expect("nest");
        model.retain(kept).expect("retain");

        assert_eq!(model.collect_garbage(), 2);
        assert!(model.contains(kept));
        assert!(!model.contains(dropped));
        assert!(!model.contains(child));

        assert!(model.release(kept));
        assert!(!model.contains(kept));
        assert!(!model.release(kept));
    }

    #[test]
    fn destroyed_slots_are_reused_with_a_new_generation() {
        let mut model = model();
        let part = model.create("Part").expect("part");
        model.destroy(part).expect("destroy");
        let reused = model.create("Part").expect("reused");
        assert_eq!(reused.index(), part.index());
        assert_ne!(reused.generation(), part.generation());
        assert!(!model.contains(part));
        assert_eq!(model.get_property(part, "Name"), Err(GraphError::NoSuchInstance(part)));
    }

    #[test]
    fn protected_instances_cannot_be_destroyed() {
        let mut model = model();
        let root = model.root();
        let workspace = model.workspace();
        assert_eq!(model.destroy(root), Err(GraphError::ProtectedInstance(root)));
        assert_eq!(
            model.destroy(workspace),
            Err(GraphError::ProtectedInstance(workspace))
        );
    }

    #[test]
    fn clone_subtree_copies_structure_without_bodies() {
        let mut model = model();
        let workspace = model.workspace();
        let group = model.create("Model").expect("model");
        let part = model.create("Part").expect("part");
        model.set_parent(part, Some(group)).expect("nest");
        model.set_parent(group, Some(workspace)).expect("simulate");
        assert!(model.cast::<PartData>(part).expect("part").body().is_some());

        let copy = model.clone_subtree(group).expect("clone");
        assert!(model.is_floating(copy));
        let copied_part = model.children(copy)[0];
        assert_ne!(copied_part, part);
        assert!(model.cast::<PartData>(copied_part).expect("part").body().is_none());

        model.set_parent(copy, Some(workspace)).expect("paste");
        assert!(model.cast::<PartData>(copied_part).expect("part").body().is_some());
    }

    #[test]
    fn bodies_follow_membership_in_a_world() {
        let mut model = model();
        let workspace = model.workspace();
        let other = model.add_workspace("Sandbox").expect("second world");
        let part = model.create("Part").expect("part");

        model.set_parent(part, Some(workspace)).expect("first world");
        let first = model.cast::<PartData>(part).expect("part").body().expect("body");

        model.set_parent(part, Some(other)).expect("second world");
        let second = model.cast::<PartData>(part).expect("part").body().expect("body");
        assert_ne!(first.scene(), second.scene());
        assert!(!model.physics().contains_body(first));
        assert_eq!(model.resolve_owner(second), Ok(part));

        model.set_parent(part, None).expect("detach");
        assert!(model.cast::<PartData>(part).expect("part").body().is_none());
        assert!(!model.physics().contains_body(second));
    }

    #[test]
    fn transform_writes_reach_the_body() {
        let mut model = model();
        let workspace = model.workspace();
        let part = model.create("Part").expect("part");
        model.set_parent(part, Some(workspace)).expect("parent");
        model
            .set_property(part, "Position", PropertyValue::Vector3(Vec3::new(0.0, 10.0, 0.0)))
            .expect("move");
        let body = model.cast::<PartData>(part).expect("part").body().expect("body");
        let pose = model.physics().body_pose(body).expect("pose");
        assert_eq!(pose.position, Vec3::new(0.0, 10.0, 0.0));

        model
            .set_property(part, "Anchored", PropertyValue::Bool(true))
            .expect("anchor");
        let rebuilt = model.cast::<PartData>(part).expect("part").body().expect("body");
        assert_ne!(rebuilt, body);
        assert_eq!(model.resolve_owner(rebuilt), Ok(part));
    }

    #[test]
    fn unanchored_parts_fall_and_anchored_parts_stay() {
        let mut model = model();
        let workspace = model.workspace();
        let falling = model.create("Part").expect("falling");
        let fixed = model.create("SpawnLocation").expect("fixed");
        model
            .set_property(falling, "Position", PropertyValue::Vector3(Vec3::new(0.0, 100.0, 0.0)))
            .expect("lift");
        model
            .set_property(fixed, "Position", PropertyValue::Vector3(Vec3::new(500.0, 0.0, 0.0)))
            .expect("move away");
        model.set_parent(falling, Some(workspace)).expect("falling");
        model.set_parent(fixed, Some(workspace)).expect("fixed");

        for _ in 0..10 {
            model.step_simulation(1.0 / 60.0);
        }

        assert!(model.cast::<PartData>(falling).expect("part").position.y < 100.0);
        assert_eq!(
            model.cast::<PartData>(fixed).expect("part").position,
            Vec3::new(500.0, 0.0, 0.0)
        );
    }

    #[test]
    fn snapshot_is_pre_order_and_detects_changes() {
        let mut model = model();
        let folder = model.create("Folder").expect("folder");
        let part = model.create("Part").expect("part");
        let script = model.create("Script").expect("script");
        model.set_parent(part, Some(folder)).expect("part");
        model.set_parent(script, Some(part)).expect("script");

        let before = model.snapshot(folder).expect("snapshot");
        let order: Vec<_> = before.nodes.iter().map(|node| node.id).collect();
        assert_eq!(order, vec![folder, part, script]);
        assert_eq!(model.descendants(folder).collect::<Vec<_>>(), vec![part, script]);

        model
            .set_property(script, "Source", PropertyValue::String("-- empty".into()))
            .expect("edit");
        assert_ne!(model.snapshot(folder).expect("snapshot"), before);
    }

    #[test]
    fn find_descendants_filters_lazily() {
        let mut model = model();
        let workspace = model.workspace();
        let folder = model.create("Folder").expect("folder");
        let part = model.create("Part").expect("part");
        let script = model.create("Script").expect("script");
        model.set_parent(folder, Some(workspace)).expect("folder");
        model.set_parent(part, Some(folder)).expect("part");
        model.set_parent(script, Some(workspace)).expect("script");

        let parts: Vec<_> = model
            .find_descendants(workspace, |id| model.is_a::<PartData>(*id))
            .collect();
        assert_eq!(parts, vec![part]);
        assert_eq!(
            model.find_first_descendant(model.root(), |id| model.is_a::<ScriptData>(*id)),
            Some(script)
        );
        assert_eq!(model.find_first_child(workspace, "Folder"), Some(folder));
    }

    #[test]
    fn destroy_spares_held_nodes() {
        let mut model = model();
        let workspace = model.workspace();
        let folder = model.create("Folder").expect("folder");
        let held = model.create("Part").expect("held");
        let loose = model.create("Part").expect("loose");
        let nested = model.create("Script").expect("nested");
        model.set_parent(folder, Some(workspace)).expect("folder");
        model.set_parent(held, Some(folder)).expect("held");
        model.set_parent(loose, Some(folder)).expect("loose");
        model.set_parent(nested, Some(held)).expect("nested");
        model.retain(held).expect("retain");

        assert_eq!(model.destroy(folder), Ok(2));
        assert!(!model.contains(folder));
        assert!(!model.contains(loose));
        assert_eq!(model.parent(held), None);
        assert_eq!(model.parent(nested), Some(held));
        assert!(model.cast::<PartData>(held).expect("part").body().is_none());

        model.set_parent(held, Some(workspace)).expect("restore");
        assert_eq!(model.destroy(held), Ok(0));
        assert!(model.contains(held));
        assert_eq!(model.parent(held), None);

        assert!(model.release(held));
        assert!(!model.contains(held));
        assert!(!model.contains(nested));
    }

    #[test]
    fn detached_workspaces_stop_simulating() {
        let mut model = model();
        let root = model.root();
        let sandbox = model.add_workspace("Sandbox").expect("sandbox");
        let part = model.create("Part").expect("part");
        model.set_parent(part, Some(sandbox)).expect("parent");
        let body = model.cast::<PartData>(part).expect("part").body().expect("body");

        model.retain(sandbox).expect("retain");
        model.set_parent(sandbox, None).expect("detach world");
        assert!(model.cast::<PartData>(part).expect("part").body().is_none());
        assert!(!model.physics().contains_body(body));

        model.set_parent(sandbox, Some(root)).expect("re-attach world");
        let rebound = model.cast::<PartData>(part).expect("part").body().expect("body");
        assert_eq!(rebound.scene(), body.scene());
        assert_eq!(model.resolve_owner(rebound), Ok(part));
    }

    #[test]
    fn repeated_detaches_queue_a_node_once() {
        let mut model = model();
        let workspace = model.workspace();
        let folder = model.create("Folder").expect("folder");
        for _ in 0..3 {
            model.set_parent(folder, Some(workspace)).expect("attach");
            model.set_parent(folder, None).expect("detach");
        }
        assert_eq!(model.floating.iter().filter(|id| **id == folder).count(), 1);
        assert_eq!(model.collect_garbage(), 1);
    }
}
