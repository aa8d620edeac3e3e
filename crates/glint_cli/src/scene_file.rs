//! Scene file: a scene description plus the tracer settings to render it with.

use std::path::Path;

use anyhow::{Context, Result};
use glint_core::{Scene, SceneDescription};
use glint_tracer::TracerSettings;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct SceneFile {
    #[serde(default)]
    pub settings: TracerSettings,
    #[serde(flatten)]
    pub description: SceneDescription,
}

impl SceneFile {
    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("Invalid scene file")
    }

    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read scene file {:?}", path))?;
        Self::from_json_str(&json)
    }

    /// Build the scene, resolving OBJ paths against `base_dir`.
    pub fn build(&self, base_dir: &Path) -> Result<Scene> {
        Ok(self.description.build(base_dir)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_and_scene_together() {
        let file = SceneFile::from_json_str(
            r#"{
                "name": "pair",
                "settings": { "rays_per_pixel": 4, "environment": { "sun_intensity": 20 } },
                "camera": { "position": [0, 0, 3] },
                "spheres": [ { "center": [0, 0, 0], "radius": 1 } ]
            }"#,
        )
        .unwrap();

        assert_eq!(file.settings.rays_per_pixel, 4);
        assert_eq!(file.settings.bounce_limit, 10);
        assert_eq!(file.settings.environment.sun_intensity, 20.0);

        let scene = file.build(Path::new(".")).unwrap();
        assert_eq!(scene.name, "pair");
        assert_eq!(scene.spheres.len(), 1);
        assert!(scene.active_camera().is_some());
    }

    #[test]
    fn test_settings_optional() {
        let file = SceneFile::from_json_str(r#"{ "spheres": [] }"#).unwrap();
        assert_eq!(file.settings, TracerSettings::default());
    }
}
