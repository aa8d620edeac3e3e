//! Geometry extraction: authored scene objects into flat GPU records.
//!
//! Extraction owns no state. Every call reads the objects' current
//! transforms and produces fresh value records; the buffer manager decides
//! what to do with them.

use glint_core::{MeshObject, SphereObject};

use crate::records::{Material, MeshRecord, Sphere, Triangle};

/// Flattened triangles and the per-mesh ranges into them.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ExtractedMeshes {
    pub triangles: Vec<Triangle>,
    pub meshes: Vec<MeshRecord>,
}

/// Bake every mesh object into world space.
///
/// Objects are visited in the order given, and each one receives the next
/// contiguous range of the triangle array. An object without mesh data gets
/// an empty range at the current offset.
pub fn extract_meshes(objects: &[MeshObject]) -> ExtractedMeshes {
    let capacity = objects.iter().map(MeshObject::triangle_count).sum();
    let mut triangles = Vec::with_capacity(capacity);
    let mut meshes = Vec::with_capacity(objects.len());

    for object in objects {
        let start_index = triangles.len();

        if let Some(mesh) = &object.mesh {
            let model = object.model_matrix();
            triangles.extend(mesh.triangles().map(|[a, b, c]| {
                Triangle::new(
                    model.transform_point3(a),
                    model.transform_point3(b),
                    model.transform_point3(c),
                )
            }));
        }

        let triangle_count = triangles.len() - start_index;
        meshes.push(MeshRecord::new(
            start_index as i32,
            triangle_count as i32,
            object.world_bounds(),
            Material::from(&object.material),
        ));
    }

    log::debug!(
        "Extracted {} triangles from {} meshes",
        triangles.len(),
        meshes.len()
    );

    ExtractedMeshes { triangles, meshes }
}

/// Radius comes from the X scale only, see [`SphereObject::radius`].
pub fn extract_spheres(objects: &[SphereObject]) -> Vec<Sphere> {
    objects
        .iter()
        .map(|object| Sphere {
            position: object.center().to_array(),
            radius: object.radius(),
            material: Material::from(&object.material),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use glint_core::{Mesh, SurfaceMaterial, Transform};
    use glint_math::{Mat4, Mat4Ext, Quat, Vec3};
    use std::sync::Arc;

    fn strip(triangles: usize) -> Arc<Mesh> {
        let mut positions = Vec::new();
        let mut indices = Vec::new();
        for i in 0..triangles {
            let base = positions.len() as u32;
            let x = i as f32;
            positions.extend([
                Vec3::new(x, 0.0, 0.0),
                Vec3::new(x + 1.0, 0.0, 0.0),
                Vec3::new(x, 1.0, 0.0),
            ]);
            indices.extend([base, base + 1, base + 2]);
        }
        Arc::new(Mesh::new(positions, indices))
    }

    #[test]
    fn test_mesh_ranges_follow_order() {
        let objects: Vec<_> = [3, 0, 5]
            .into_iter()
            .enumerate()
            .map(|(i, n)| MeshObject::new(format!("m{}", i), strip(n), Transform::default()))
            .collect();

        let extracted = extract_meshes(&objects);
        let ranges: Vec<_> = extracted
            .meshes
            .iter()
            .map(|m| (m.start_index, m.triangle_count))
            .collect();

        assert_eq!(ranges, vec![(0, 3), (3, 0), (3, 5)]);
        assert_eq!(extracted.triangles.len(), 8);
        for mesh in &extracted.meshes {
            assert!(mesh.end_index() as usize <= extracted.triangles.len());
        }
    }

    #[test]
    fn test_missing_mesh_is_empty_range() {
        let objects = vec![
            MeshObject::new("a", strip(2), Transform::default()),
            MeshObject {
                name: "ghost".to_string(),
                mesh: None,
                transform: Transform::default(),
                material: SurfaceMaterial::default(),
            },
            MeshObject::new("b", strip(1), Transform::default()),
        ];

        let extracted = extract_meshes(&objects);

        assert_eq!(extracted.triangles.len(), 3);
        assert_eq!(extracted.meshes[1].start_index, 2);
        assert_eq!(extracted.meshes[1].triangle_count, 0);
        assert_eq!(extracted.meshes[1].bounds_min, [0.0; 3]);
        assert_eq!(extracted.meshes[2].start_index, 2);
    }

    #[test]
    fn test_vertices_are_world_space() {
        let transform = Transform {
            translation: Vec3::new(10.0, 0.0, 0.0),
            rotation: Quat::IDENTITY,
            scale: Vec3::splat(2.0),
        };
        let objects = vec![MeshObject::new("t", strip(1), transform)];

        let extracted = extract_meshes(&objects);
        let [v1, v2, v3] = extracted.triangles[0].vertices();

        assert!((v1 - Vec3::new(10.0, 0.0, 0.0)).length() < 1e-5);
        assert!((v2 - Vec3::new(12.0, 0.0, 0.0)).length() < 1e-5);
        assert!((v3 - Vec3::new(10.0, 2.0, 0.0)).length() < 1e-5);
    }

    #[test]
    fn test_triangle_bounds_enclose_vertices() {
        let transform = Transform {
            translation: Vec3::new(0.0, 1.0, -3.0),
            rotation: Quat::from_euler(glint_math::EulerRot::XYZ, 0.3, 1.1, -0.7),
            scale: Vec3::new(1.0, 2.0, 0.5),
        };
        let objects = vec![MeshObject::new("cube", Arc::new(Mesh::cube(1.0)), transform)];

        let extracted = extract_meshes(&objects);
        assert_eq!(extracted.triangles.len(), 12);

        for triangle in &extracted.triangles {
            let vertices = triangle.vertices();
            let bounds = triangle.bounds();
            let min = vertices[0].min(vertices[1]).min(vertices[2]);
            let max = vertices[0].max(vertices[1]).max(vertices[2]);

            assert_eq!(bounds.min, min);
            assert_eq!(bounds.max, max);
        }
    }

    #[test]
    fn test_rotated_cube_mesh_bounds() {
        let rotation = Quat::from_rotation_y(std::f32::consts::FRAC_PI_4);
        let transform = Transform {
            rotation,
            ..Default::default()
        };
        let mesh = Arc::new(Mesh::cube(1.0));
        let objects = vec![MeshObject::new("cube", mesh.clone(), transform)];

        let extracted = extract_meshes(&objects);
        let bounds = extracted.meshes[0].bounds();

        let expected = Mat4::from_quat(rotation).transform_aabb(&mesh.bounds);
        assert!((bounds.min - expected.min).length() < 1e-5);
        assert!((bounds.max - expected.max).length() < 1e-5);

        let half_diagonal = 0.5 * std::f32::consts::SQRT_2;
        assert!((bounds.max.x - half_diagonal).abs() < 1e-5);
        assert!((bounds.max.z - half_diagonal).abs() < 1e-5);
        assert!((bounds.max.y - 0.5).abs() < 1e-5);
    }

    #[test]
    fn test_mesh_material_copied() {
        let material = SurfaceMaterial::diffuse(Vec3::new(0.9, 0.1, 0.1)).with_smoothness(0.4);
        let objects =
            vec![MeshObject::new("red", strip(1), Transform::default()).with_material(material)];

        let extracted = extract_meshes(&objects);

        assert_eq!(extracted.meshes[0].material.albedo, [0.9, 0.1, 0.1]);
        assert_eq!(extracted.meshes[0].material.smoothness, 0.4);
    }

    #[test]
    fn test_extract_spheres() {
        let objects = vec![
            SphereObject::new("a", Vec3::new(1.0, 2.0, 3.0), 0.5),
            SphereObject::new("light", Vec3::new(0.0, 10.0, 0.0), 3.0)
                .with_material(SurfaceMaterial::emissive(Vec3::ONE, 5.0)),
        ];

        let spheres = extract_spheres(&objects);

        assert_eq!(spheres.len(), 2);
        assert_eq!(spheres[0].position, [1.0, 2.0, 3.0]);
        assert!((spheres[0].radius - 0.5).abs() < 1e-6);
        assert!((spheres[1].radius - 3.0).abs() < 1e-6);
        assert_eq!(spheres[1].material.emissive_strength, 5.0);
    }

    #[test]
    fn test_empty_inputs() {
        let extracted = extract_meshes(&[]);

        assert!(extracted.triangles.is_empty());
        assert!(extracted.meshes.is_empty());
        assert!(extract_spheres(&[]).is_empty());
    }
}
