pub mod config;
pub mod editor;
pub mod physics;
pub mod registry;
pub mod scene;

pub use config::{ConfigError, EditorConfig, PhysicsConfig};
pub use editor::EditorSession;
pub use registry::{TypeDescriptor, TypeRegistry};
pub use scene::{DataModel, InstanceId};
