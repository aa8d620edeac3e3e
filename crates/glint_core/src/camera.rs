//! Cameras as seen by the tracer.
//!
//! A camera looks down its local -Z axis with +Y up. The tracer only needs
//! its identity (the name), its camera-to-world matrix, and the lens values
//! that shape the near clip plane.

use glint_math::{Mat4, Vec3};

use crate::scene::Transform;

/// Whether a camera produces the final image or an auxiliary preview.
///
/// Preview cameras (an editor's scene view, thumbnails) never accumulate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum CameraKind {
    #[default]
    Primary,
    Preview,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Camera {
    /// Identity of the camera; a different name is a different camera
    pub name: String,
    pub kind: CameraKind,
    pub transform: Transform,

    /// Vertical field of view in degrees
    pub fov_y_degrees: f32,
    /// Distance to the near clip plane
    pub near: f32,
    /// Width over height
    pub aspect: f32,
}

impl Camera {
    /// Create a camera at the origin looking down -Z.
    pub fn new(name: impl Into<String>, kind: CameraKind) -> Self {
        Self {
            name: name.into(),
            kind,
            transform: Transform::default(),
            fov_y_degrees: 60.0,
            near: 0.3,
            aspect: 16.0 / 9.0,
        }
    }

    /// Place the camera at `eye` looking at `target` with +Y up.
    pub fn looking_at(mut self, eye: Vec3, target: Vec3) -> Self {
        self.look_at(eye, target);
        self
    }

    pub fn with_fov(mut self, fov_y_degrees: f32) -> Self {
        self.fov_y_degrees = fov_y_degrees;
        self
    }

    pub fn look_at(&mut self, eye: Vec3, target: Vec3) {
        let view = Mat4::look_at_rh(eye, target, Vec3::Y);
        self.transform = Transform::from_matrix(view.inverse());
    }

    /// Update aspect ratio (e.g., on resize)
    pub fn set_aspect(&mut self, aspect: f32) {
        self.aspect = aspect;
    }

    /// Camera-to-world matrix. Scale on the camera transform is ignored.
    pub fn camera_to_world(&self) -> Mat4 {
        Mat4::from_rotation_translation(self.transform.rotation, self.transform.translation)
    }

    pub fn position(&self) -> Vec3 {
        self.transform.translation
    }

    /// World-space viewing direction.
    pub fn forward(&self) -> Vec3 {
        self.transform.rotation * Vec3::NEG_Z
    }

    pub fn is_preview(&self) -> bool {
        self.kind == CameraKind::Preview
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_camera_defaults() {
        let camera = Camera::new("main", CameraKind::Primary);

        assert_eq!(camera.position(), Vec3::ZERO);
        assert!((camera.forward() - Vec3::NEG_Z).length() < 1e-6);
        assert!(!camera.is_preview());
    }

    #[test]
    fn test_look_at() {
        let camera = Camera::new("main", CameraKind::Primary)
            .looking_at(Vec3::new(0.0, 0.0, 5.0), Vec3::new(5.0, 0.0, 5.0));

        assert!((camera.position() - Vec3::new(0.0, 0.0, 5.0)).length() < 1e-5);
        assert!((camera.forward() - Vec3::X).length() < 1e-5);
    }

    #[test]
    fn test_camera_to_world_maps_origin_to_position() {
        let eye = Vec3::new(1.0, 2.0, 3.0);
        let camera = Camera::new("main", CameraKind::Primary).looking_at(eye, Vec3::ZERO);
        let origin = camera.camera_to_world().transform_point3(Vec3::ZERO);

        assert!((origin - eye).length() < 1e-5);
    }

    #[test]
    fn test_aspect_update() {
        let mut camera = Camera::new("main", CameraKind::Preview);
        camera.set_aspect(2.0);

        assert_eq!(camera.aspect, 2.0);
        assert!(camera.is_preview());
    }
}
