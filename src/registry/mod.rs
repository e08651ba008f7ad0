pub mod manifest;

use crate::scene::Instance;
use crate::scene::class::{ClassSet, ClassTag, InstanceKind, PartData, ScriptData, WorkspaceData};
use bitflags::bitflags;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct ClassFlags: u32 {
        /// Cannot be constructed through the registry.
        const NOT_CREATABLE = 1 << 0;
        /// Omitted from insert menus; also not constructible.
        const HIDDEN = 1 << 1;
        /// Singleton service that lives directly under the DataModel root.
        const SERVICE = 1 << 2;
    }
}

/// Which children a class accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChildPolicy {
    Any,
    ServicesOnly,
    None,
}

pub type Constructor = fn() -> InstanceKind;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("class {0} is already registered")]
    DuplicateType(String),
    #[error("unknown class: {0}")]
    UnknownType(String),
    #[error("class {0} cannot be constructed")]
    NotConstructible(String),
}

#[derive(Debug, Clone)]
pub struct TypeDescriptor {
    class_name: String,
    tag: ClassTag,
    ancestry: ClassSet,
    flags: ClassFlags,
    child_policy: ChildPolicy,
    constructor: Option<Constructor>,
}

impl TypeDescriptor {
    pub fn builder(class_name: impl Into<String>, tag: ClassTag) -> TypeDescriptorBuilder {
        TypeDescriptorBuilder::new(class_name.into(), tag)
    }

    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    pub fn tag(&self) -> ClassTag {
        self.tag
    }

    pub fn ancestry(&self) -> ClassSet {
        self.ancestry
    }

    pub fn flags(&self) -> ClassFlags {
        self.flags
    }

    pub fn child_policy(&self) -> ChildPolicy {
        self.child_policy
    }

    pub fn is_a(&self, tag: ClassTag) -> bool {
        self.ancestry.has(tag)
    }

    pub fn is_service(&self) -> bool {
        self.flags.contains(ClassFlags::SERVICE)
    }

    /// Creatable, visible and backed by a constructor.
    pub fn is_insertable(&self) -> bool {
        self.constructor.is_some()
            && !self
                .flags
                .intersects(ClassFlags::NOT_CREATABLE | ClassFlags::HIDDEN)
    }

    pub fn accepts_child(&self, child: &TypeDescriptor) -> bool {
        match self.child_policy {
            ChildPolicy::Any => !child.is_service(),
            ChildPolicy::ServicesOnly => child.is_service(),
            ChildPolicy::None => false,
        }
    }
}

pub struct TypeDescriptorBuilder {
    class_name: String,
    tag: ClassTag,
    supertypes: Vec<ClassTag>,
    flags: ClassFlags,
    child_policy: ChildPolicy,
    constructor: Option<Constructor>,
}

impl TypeDescriptorBuilder {
    fn new(class_name: String, tag: ClassTag) -> Self {
        Self {
            class_name,
            tag,
            supertypes: Vec::new(),
            flags: ClassFlags::empty(),
            child_policy: ChildPolicy::Any,
            constructor: None,
        }
    }

    pub fn supertypes(mut self, tags: &[ClassTag]) -> Self {
        self.supertypes.extend_from_slice(tags);
        self
    }

    pub fn flags(mut self, flags: ClassFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn child_policy(mut self, policy: ChildPolicy) -> Self {
        self.child_policy = policy;
        self
    }

    pub fn constructor(mut self, constructor: Constructor) -> Self {
        self.constructor = Some(constructor);
        self
    }

    pub fn build(self) -> TypeDescriptor {
        let mut ancestry = ClassSet::of(&self.supertypes);
        ancestry |= self.tag.set();
        TypeDescriptor {
            class_name: self.class_name,
            tag: self.tag,
            ancestry,
            flags: self.flags,
            child_policy: self.child_policy,
            constructor: self.constructor,
        }
    }
}

/// Catalog of instance classes. Populated once, then shared read-only behind
/// an `Arc`.
#[derive(Debug, Default, Clone)]
pub struct TypeRegistry {
    descriptors: BTreeMap<String, Arc<TypeDescriptor>>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        for descriptor in builtin_descriptors() {
            if let Err(err) = registry.register(descriptor) {
                log::error!("[registry] failed to register built-in class: {err}");
            }
        }
        registry
    }

    pub fn register(&mut self, descriptor: TypeDescriptor) -> Result<(), RegistryError> {
        use std::collections::btree_map::Entry;

        match self.descriptors.entry(descriptor.class_name.clone()) {
            Entry::Occupied(entry) => Err(RegistryError::DuplicateType(entry.key().clone())),
            Entry::Vacant(entry) => {
                log::trace!("[registry] registered class {}", descriptor.class_name);
                entry.insert(Arc::new(descriptor));
                Ok(())
            }
        }
    }

    pub fn lookup(&self, class_name: &str) -> Result<&Arc<TypeDescriptor>, RegistryError> {
        self.descriptors
            .get(class_name)
            .ok_or_else(|| RegistryError::UnknownType(class_name.to_string()))
    }

    pub fn contains(&self, class_name: &str) -> bool {
        self.descriptors.contains_key(class_name)
    }

    pub fn construct(&self, class_name: &str) -> Result<Instance, RegistryError> {
        let descriptor = self.lookup(class_name)?;
        if descriptor
            .flags
            .intersects(ClassFlags::NOT_CREATABLE | ClassFlags::HIDDEN)
        {
            return Err(RegistryError::NotConstructible(class_name.to_string()));
        }
        Self::instantiate(descriptor)
    }

    /// Builds a service instance. Services are not creatable through
    /// [`TypeRegistry::construct`]; the data model creates them itself.
    pub fn construct_service(&self, class_name: &str) -> Result<Instance, RegistryError> {
        let descriptor = self.lookup(class_name)?;
        if !descriptor.is_service() {
            return Err(RegistryError::NotConstructible(class_name.to_string()));
        }
        Self::instantiate(descriptor)
    }

    fn instantiate(descriptor: &Arc<TypeDescriptor>) -> Result<Instance, RegistryError> {
        let constructor = descriptor
            .constructor
            .ok_or_else(|| RegistryError::NotConstructible(descriptor.class_name.clone()))?;
        Ok(Instance::new(Arc::clone(descriptor), constructor()))
    }

    /// All descriptors in class-name order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<TypeDescriptor>> {
        self.descriptors.values()
    }

    /// Descriptors an "Insert Object" menu should offer.
    pub fn insertable(&self) -> impl Iterator<Item = &Arc<TypeDescriptor>> {
        self.iter().filter(|descriptor| descriptor.is_insertable())
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}

static BUILTIN: Lazy<Arc<TypeRegistry>> = Lazy::new(|| Arc::new(TypeRegistry::with_builtins()));

/// Shared registry holding the built-in classes.
pub fn builtin() -> Arc<TypeRegistry> {
    Arc::clone(&BUILTIN)
}

fn builtin_descriptors() -> Vec<TypeDescriptor> {
    vec![
        TypeDescriptor::builder("Instance", ClassTag::Instance)
            .flags(ClassFlags::NOT_CREATABLE)
            .build(),
        TypeDescriptor::builder("DataModel", ClassTag::DataModel)
            .flags(ClassFlags::NOT_CREATABLE | ClassFlags::HIDDEN | ClassFlags::SERVICE)
            .child_policy(ChildPolicy::ServicesOnly)
            .constructor(|| InstanceKind::Container)
            .build(),
        TypeDescriptor::builder("Workspace", ClassTag::Workspace)
            .supertypes(&[ClassTag::PVInstance, ClassTag::Model])
            .flags(ClassFlags::NOT_CREATABLE | ClassFlags::SERVICE)
            .constructor(|| InstanceKind::Workspace(WorkspaceData::default()))
            .build(),
        TypeDescriptor::builder("Folder", ClassTag::Folder)
            .constructor(|| InstanceKind::Container)
            .build(),
        TypeDescriptor::builder("PVInstance", ClassTag::PVInstance)
            .flags(ClassFlags::NOT_CREATABLE)
            .build(),
        TypeDescriptor::builder("Model", ClassTag::Model)
            .supertypes(&[ClassTag::PVInstance])
            .constructor(|| InstanceKind::Container)
            .build(),
        TypeDescriptor::builder("BasePart", ClassTag::BasePart)
            .supertypes(&[ClassTag::PVInstance])
            .flags(ClassFlags::NOT_CREATABLE)
            .build(),
        TypeDescriptor::builder("Part", ClassTag::Part)
            .supertypes(&[ClassTag::PVInstance, ClassTag::BasePart])
            .constructor(|| InstanceKind::Part(PartData::default()))
            .build(),
        TypeDescriptor::builder("SpawnLocation", ClassTag::SpawnLocation)
            .supertypes(&[ClassTag::PVInstance, ClassTag::BasePart, ClassTag::Part])
            .constructor(|| {
                InstanceKind::Part(PartData {
                    anchored: true,
                    size: glam::Vec3::new(12.0, 1.0, 12.0),
                    ..PartData::default()
                })
            })
            .build(),
        TypeDescriptor::builder("LuaSourceContainer", ClassTag::LuaSourceContainer)
            .flags(ClassFlags::NOT_CREATABLE)
            .build(),
        TypeDescriptor::builder("Script", ClassTag::Script)
            .supertypes(&[ClassTag::LuaSourceContainer])
            .constructor(|| InstanceKind::Script(ScriptData::default()))
            .build(),
    ]
}
