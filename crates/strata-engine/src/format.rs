//! Scene file formats, chosen by file extension.

use std::path::Path;

use strata_scene::change::AttributeChange;
use strata_scene::id::EntityId;
use strata_scene::scene::Scene;

use crate::EngineError;

/// On-disk scene encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SceneFormat {
    Xml,
    Binary,
}

impl SceneFormat {
    /// `.xml` is XML; `.bin` and `.binary` are binary. Case-insensitive.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, EngineError> {
        let path = path.as_ref();
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        match ext.as_str() {
            "xml" | "txml" => Ok(Self::Xml),
            "bin" | "binary" | "tbin" => Ok(Self::Binary),
            _ => Err(EngineError::UnsupportedFormat {
                path: path.display().to_string(),
            }),
        }
    }

    /// The other format; used by conversion.
    pub fn other(self) -> Self {
        match self {
            Self::Xml => Self::Binary,
            Self::Binary => Self::Xml,
        }
    }

    /// Replace the scene's content with the file, keeping the file's entity
    /// ids.
    pub fn load(self, scene: &mut Scene, path: impl AsRef<Path>) -> Result<Vec<EntityId>, EngineError> {
        let ids = match self {
            Self::Xml => scene.load_scene_xml(path, true, true, AttributeChange::Default)?,
            Self::Binary => scene.load_scene_binary(path, true, true, AttributeChange::Default)?,
        };
        Ok(ids)
    }

    /// Write every entity of the scene, temporary and local ones included.
    pub fn save(self, scene: &Scene, path: impl AsRef<Path>) -> Result<(), EngineError> {
        match self {
            Self::Xml => scene.save_scene_xml(path, true, true)?,
            Self::Binary => scene.save_scene_binary(path, true, true)?,
        }
        Ok(())
    }
}

impl std::fmt::Display for SceneFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Xml => "xml",
            Self::Binary => "binary",
        })
    }
}
