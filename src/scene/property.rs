use super::class::{InstanceKind, PartData, ScriptData, WorkspaceData};
use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PropertyValue {
    Bool(bool),
    Number(f64),
    String(String),
    Vector3(Vec3),
    Rotation(Quat),
}

impl PropertyValue {
    pub fn kind(&self) -> PropertyKind {
        match self {
            PropertyValue::Bool(_) => PropertyKind::Bool,
            PropertyValue::Number(_) => PropertyKind::Number,
            PropertyValue::String(_) => PropertyKind::String,
            PropertyValue::Vector3(_) => PropertyKind::Vector3,
            PropertyValue::Rotation(_) => PropertyKind::Rotation,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PropertyKind {
    Bool,
    Number,
    String,
    Vector3,
    Rotation,
}

impl fmt::Display for PropertyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            PropertyKind::Bool => "bool",
            PropertyKind::Number => "number",
            PropertyKind::String => "string",
            PropertyKind::Vector3 => "Vector3",
            PropertyKind::Rotation => "Rotation",
        };
        f.write_str(label)
    }
}

/// What a property write means for an attached physics body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BodyEffect {
    None,
    Pose,
    Rebuild,
    Gravity,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PropertyDescriptor {
    pub name: &'static str,
    pub kind: PropertyKind,
}

const fn prop(name: &'static str, kind: PropertyKind) -> PropertyDescriptor {
    PropertyDescriptor { name, kind }
}

pub const NAME: &str = "Name";

const COMMON: &[PropertyDescriptor] = &[prop(NAME, PropertyKind::String)];

const PART: &[PropertyDescriptor] = &[
    prop(NAME, PropertyKind::String),
    prop("Position", PropertyKind::Vector3),
    prop("Rotation", PropertyKind::Rotation),
    prop("Size", PropertyKind::Vector3),
    prop("Anchored", PropertyKind::Bool),
    prop("CanCollide", PropertyKind::Bool),
    prop("Transparency", PropertyKind::Number),
];

const SCRIPT: &[PropertyDescriptor] = &[
    prop(NAME, PropertyKind::String),
    prop("Source", PropertyKind::String),
    prop("Enabled", PropertyKind::Bool),
];

const WORKSPACE: &[PropertyDescriptor] = &[
    prop(NAME, PropertyKind::String),
    prop("Gravity", PropertyKind::Vector3),
];

/// Properties exposed by a payload, in display order. The order is also the
/// order used by snapshots.
pub fn properties_of(kind: &InstanceKind) -> &'static [PropertyDescriptor] {
    match kind {
        InstanceKind::Container => COMMON,
        InstanceKind::Part(_) => PART,
        InstanceKind::Script(_) => SCRIPT,
        InstanceKind::Workspace(_) => WORKSPACE,
    }
}

pub(crate) fn find_property(kind: &InstanceKind, name: &str) -> Option<PropertyDescriptor> {
    properties_of(kind)
        .iter()
        .copied()
        .find(|descriptor| descriptor.name == name)
}

/// Reads a payload property. `Name` lives on the node and is handled by the
/// caller.
pub(crate) fn read(kind: &InstanceKind, name: &str) -> Option<PropertyValue> {
    match kind {
        InstanceKind::Part(part) => read_part(part, name),
        InstanceKind::Script(script) => read_script(script, name),
        InstanceKind::Workspace(workspace) => read_workspace(workspace, name),
        InstanceKind::Container => None,
    }
}

fn read_part(part: &PartData, name: &str) -> Option<PropertyValue> {
    let value = match name {
        "Position" => PropertyValue::Vector3(part.position),
        "Rotation" => PropertyValue::Rotation(part.rotation),
        "Size" => PropertyValue::Vector3(part.size),
        "Anchored" => PropertyValue::Bool(part.anchored),
        "CanCollide" => PropertyValue::Bool(part.can_collide),
        "Transparency" => PropertyValue::Number(f64::from(part.transparency)),
        _ => return None,
    };
    Some(value)
}

fn read_script(script: &ScriptData, name: &str) -> Option<PropertyValue> {
    match name {
        "Source" => Some(PropertyValue::String(script.source.clone())),
        "Enabled" => Some(PropertyValue::Bool(script.enabled)),
        _ => None,
    }
}

fn read_workspace(workspace: &WorkspaceData, name: &str) -> Option<PropertyValue> {
    match name {
        "Gravity" => Some(PropertyValue::Vector3(workspace.gravity)),
        _ => None,
    }
}

/// Writes a payload property whose name and kind were already validated.
/// Returns the previous value and the body side effect of the write.
pub(crate) fn write(
    kind: &mut InstanceKind,
    name: &str,
    value: PropertyValue,
) -> Option<(PropertyValue, BodyEffect)> {
    match (kind, value) {
        (InstanceKind::Part(part), value) => write_part(part, name, value),
        (InstanceKind::Script(script), PropertyValue::String(source)) if name == "Source" => Some((
            PropertyValue::String(std::mem::replace(&mut script.source, source)),
            BodyEffect::None,
        )),
        (InstanceKind::Script(script), PropertyValue::Bool(enabled)) if name == "Enabled" => Some((
            PropertyValue::Bool(std::mem::replace(&mut script.enabled, enabled)),
            BodyEffect::None,
        )),
        (InstanceKind::Workspace(workspace), PropertyValue::Vector3(gravity)) if name == "Gravity" => {
            Some((
                PropertyValue::Vector3(std::mem::replace(&mut workspace.gravity, gravity)),
                BodyEffect::Gravity,
            ))
        }
        _ => None,
    }
}

fn write_part(
    part: &mut PartData,
    name: &str,
    value: PropertyValue,
) -> Option<(PropertyValue, BodyEffect)> {
    let result = match (name, value) {
        ("Position", PropertyValue::Vector3(position)) => (
            PropertyValue::Vector3(std::mem::replace(&mut part.position, position)),
            BodyEffect::Pose,
        ),
        ("Rotation", PropertyValue::Rotation(rotation)) => (
            PropertyValue::Rotation(std::mem::replace(&mut part.rotation, rotation)),
            BodyEffect::Pose,
        ),
        ("Size", PropertyValue::Vector3(size)) => (
            PropertyValue::Vector3(std::mem::replace(&mut part.size, size)),
            BodyEffect::Rebuild,
        ),
        ("Anchored", PropertyValue::Bool(anchored)) => (
            PropertyValue::Bool(std::mem::replace(&mut part.anchored, anchored)),
            BodyEffect::Rebuild,
        ),
        ("CanCollide", PropertyValue::Bool(can_collide)) => (
            PropertyValue::Bool(std::mem::replace(&mut part.can_collide, can_collide)),
            BodyEffect::Rebuild,
        ),
        ("Transparency", PropertyValue::Number(transparency)) => (
            PropertyValue::Number(f64::from(std::mem::replace(
                &mut part.transparency,
                transparency as f32,
            ))),
            BodyEffect::None,
        ),
        _ => return None,
    };
    Some(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn part_properties_round_trip_through_write() {
        let mut kind = InstanceKind::Part(PartData::default());
        let (previous, effect) = write(
            &mut kind,
            "Position",
            PropertyValue::Vector3(Vec3::new(1.0, 2.0, 3.0)),
        )
        .expect("position is writable");
        assert_eq!(previous, PropertyValue::Vector3(Vec3::ZERO));
        assert_eq!(effect, BodyEffect::Pose);
        assert_eq!(
            read(&kind, "Position"),
            Some(PropertyValue::Vector3(Vec3::new(1.0, 2.0, 3.0)))
        );
    }

    #[test]
    fn mismatched_value_kind_is_not_written() {
        let mut kind = InstanceKind::Part(PartData::default());
        assert!(write(&mut kind, "Anchored", PropertyValue::Number(1.0)).is_none());
        assert_eq!(read(&kind, "Anchored"), Some(PropertyValue::Bool(false)));
    }

    #[test]
    fn every_listed_payload_property_is_readable() {
        let kinds = [
            InstanceKind::Part(PartData::default()),
            InstanceKind::Script(ScriptData::default()),
            InstanceKind::Workspace(WorkspaceData::default()),
        ];
        for kind in &kinds {
            for descriptor in properties_of(kind).iter().filter(|d| d.name != NAME) {
                let value = read(kind, descriptor.name)
                    .unwrap_or_else(|| panic!("{} unreadable on {}", descriptor.name, kind.label()));
                assert_eq!(value.kind(), descriptor.kind);
            }
        }
    }
}
