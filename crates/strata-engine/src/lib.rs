//! Strata Engine -- framework layer over [`strata_scene`].
//!
//! Owns a set of named scenes sharing one component registry, drives them
//! with a frame loop, and loads/saves scene files by extension.
//!
//! # Quick Start
//!
//! ```
//! use strata_engine::prelude::*;
//!
//! let config = EngineConfig::from_json_str(r#"{ "scenes": [{ "name": "main" }] }"#).unwrap();
//! let mut framework = Framework::new(config, ComponentRegistry::with_builtins()).unwrap();
//!
//! let scene = framework.scene_mut("main").unwrap();
//! scene
//!     .create_entity(EntityId::NONE, &["EC_Name"], AttributeChange::Default, true, true, false)
//!     .unwrap();
//!
//! framework.run_frames(10);
//! assert_eq!(framework.frame_count(), 10);
//! assert_eq!(framework.scene("main").unwrap().len(), 1);
//! ```

#![deny(unsafe_code)]

pub mod config;
pub mod format;
pub mod framework;
pub mod logging;

/// Re-export the scene crate for convenience.
pub use strata_scene;

use strata_scene::SceneError;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors raised by the framework layer.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    Scene(#[from] SceneError),

    #[error("invalid engine configuration: {details}")]
    Config { details: String },

    #[error("a scene named {name:?} already exists")]
    DuplicateScene { name: String },

    #[error("no scene named {name:?}")]
    UnknownScene { name: String },

    #[error("duplicate system name: {name:?}")]
    DuplicateSystem { name: String },

    #[error("cannot infer scene format from {path:?}; expected .xml, .bin or .binary")]
    UnsupportedFormat { path: String },

    #[error("failed to initialise logging: {details}")]
    Logging { details: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

// ---------------------------------------------------------------------------
// Prelude
// ---------------------------------------------------------------------------

/// Convenience re-exports for common engine usage.
pub mod prelude {
    pub use strata_scene::prelude::*;

    pub use crate::config::{EngineConfig, SceneConfig};
    pub use crate::format::SceneFormat;
    pub use crate::framework::{FrameDiagnostics, Framework, SystemFn};
    pub use crate::logging::init_tracing;
    pub use crate::EngineError;
}
