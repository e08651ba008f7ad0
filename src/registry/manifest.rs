use super::{ChildPolicy, ClassFlags, TypeRegistry};
use crate::scene::class::ClassTag;
use serde::Serialize;
use siphasher::sip::SipHasher24;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClassManifestEntry {
    pub class_name: String,
    pub stable_hash: u64,
    pub flags: ClassFlags,
    pub child_policy: ChildPolicy,
    pub ancestry: Vec<ClassTag>,
    pub insertable: bool,
}

#[derive(Debug, Serialize)]
struct ClassManifest<'a> {
    classes: &'a [ClassManifestEntry],
}

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("stable hash collision between {first} and {second}")]
    HashCollision { first: String, second: String },
    #[error("failed to encode manifest: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("failed to write manifest: {0}")]
    Io(#[from] std::io::Error),
}

/// Snapshot of every registered class, sorted by class name.
pub fn manifest(registry: &TypeRegistry) -> Vec<ClassManifestEntry> {
    registry
        .iter()
        .map(|descriptor| ClassManifestEntry {
            class_name: descriptor.class_name().to_string(),
            stable_hash: stable_class_hash(descriptor.class_name()),
            flags: descriptor.flags(),
            child_policy: descriptor.child_policy(),
            ancestry: descriptor.ancestry().tags().collect(),
            insertable: descriptor.is_insertable(),
        })
        .collect()
}

/// Validates the manifest and writes it as pretty JSON, creating parent
/// directories as needed.
pub fn write_manifest_json(registry: &TypeRegistry, path: &Path) -> Result<usize, ManifestError> {
    let entries = manifest(registry);
    check_hash_collisions(&entries)?;
    let json = serde_json::to_vec_pretty(&ClassManifest { classes: &entries })?;
    std::fs::create_dir_all(path.parent().unwrap_or_else(|| Path::new(".")))?;
    std::fs::write(path, json)?;
    Ok(entries.len())
}

/// Computes the stable SipHash-2-4 identifier for a class name.
pub fn stable_class_hash(class_name: &str) -> u64 {
    let mut hasher = SipHasher24::new_with_keys(STABLE_HASH_KEY_0, STABLE_HASH_KEY_1);
    class_name.hash(&mut hasher);
    hasher.finish()
}

const STABLE_HASH_KEY_0: u64 = 0x0ddcc001feedface;
const STABLE_HASH_KEY_1: u64 = 0xabcdef0123456789;

pub fn check_hash_collisions(entries: &[ClassManifestEntry]) -> Result<(), ManifestError> {
    let mut seen: HashMap<u64, &str> = HashMap::with_capacity(entries.len());
    for entry in entries {
        if let Some(first) = seen.insert(entry.stable_hash, &entry.class_name) {
            return Err(ManifestError::HashCollision {
                first: first.to_string(),
                second: entry.class_name.clone(),
            });
        }
    }
    Ok(())
}
