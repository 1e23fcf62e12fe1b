//! HBJSON model to renderable meshes: every face is triangulated in its own
//! plane (openings cut out as holes) and extruded into a closed solid.

use std::collections::BTreeMap;

use earcutr::earcut;
use foundation::math::{Vec2, Vec3};
use tracing::{debug, warn};

use crate::glb::{GlbError, GlbMesh, PbrMaterial, encode_glb};
use crate::hbjson::{Face, FaceType, Model};
use crate::mesh::{Mesh, MeshBuilder};

/// Face thickness (model units) when the HBJSON face carries none.
pub const DEFAULT_FACE_THICKNESS: f64 = 0.3;
/// Thickness of the pane emitted for apertures and glass doors (meters).
pub const PANE_THICKNESS_M: f64 = 0.02;
/// Thickness of the leaf emitted for opaque doors (meters).
pub const DOOR_THICKNESS_M: f64 = 0.05;

const GENERATOR: &str = "csd-viewer hbjson converter";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SurfaceKind {
    Wall,
    Floor,
    Roof,
    Window,
    Door,
    Other,
}

impl SurfaceKind {
    pub fn from_face_type(face_type: FaceType) -> Self {
        match face_type {
            FaceType::Wall => SurfaceKind::Wall,
            FaceType::Floor => SurfaceKind::Floor,
            FaceType::RoofCeiling => SurfaceKind::Roof,
            FaceType::AirBoundary | FaceType::Other => SurfaceKind::Other,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            SurfaceKind::Wall => "walls",
            SurfaceKind::Floor => "floors",
            SurfaceKind::Roof => "roofs",
            SurfaceKind::Window => "windows",
            SurfaceKind::Door => "doors",
            SurfaceKind::Other => "default",
        }
    }

    pub fn material(self) -> PbrMaterial {
        let (hex, opacity, metallic, roughness) = match self {
            SurfaceKind::Wall => (0xffb400, 1.0, 0.2, 0.8),
            SurfaceKind::Window => (0x4444ff, 0.5, 0.8, 0.1),
            SurfaceKind::Roof => (0xaa4444, 1.0, 0.2, 0.8),
            SurfaceKind::Floor => (0x40b4ff, 1.0, 0.2, 0.8),
            SurfaceKind::Door => (0xff0000, 1.0, 0.2, 0.8),
            SurfaceKind::Other => (0x808080, 1.0, 0.2, 0.8),
        };
        PbrMaterial {
            name: self.name().to_string(),
            base_color: hex_to_linear_rgba(hex, opacity),
            metallic,
            roughness,
        }
    }
}

/// One mesh per surface kind, ordered by kind.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelMeshes {
    pub groups: BTreeMap<SurfaceKind, Mesh>,
    pub faces_processed: usize,
    pub faces_skipped: usize,
}

impl ModelMeshes {
    pub fn to_glb(&self) -> Result<Vec<u8>, GlbError> {
        let materials: Vec<(SurfaceKind, PbrMaterial)> = self
            .groups
            .keys()
            .map(|kind| (*kind, kind.material()))
            .collect();
        let entries: Vec<GlbMesh<'_>> = materials
            .iter()
            .filter_map(|(kind, material)| {
                self.groups.get(kind).map(|mesh| GlbMesh {
                    name: kind.name(),
                    mesh,
                    material,
                })
            })
            .collect();
        encode_glb(&entries, GENERATOR)
    }
}

#[derive(Default)]
struct GroupBuilders {
    builders: BTreeMap<SurfaceKind, MeshBuilder>,
}

impl GroupBuilders {
    fn get(&mut self, kind: SurfaceKind) -> &mut MeshBuilder {
        self.builders.entry(kind).or_default()
    }

    fn finish(self) -> BTreeMap<SurfaceKind, Mesh> {
        self.builders
            .into_iter()
            .map(|(kind, b)| (kind, b.build()))
            .filter(|(_, mesh)| !mesh.is_empty())
            .collect()
    }
}

/// Converts every face of `model` into meshes (meters, glTF Y-up).
pub fn model_to_meshes(model: &Model) -> ModelMeshes {
    let scale = model.units.to_meters();
    let mut groups = GroupBuilders::default();
    let mut processed = 0;
    let mut skipped = 0;

    for face in model.faces() {
        if add_face(face, scale, &mut groups) {
            processed += 1;
        } else {
            skipped += 1;
        }
    }

    debug!(processed, skipped, "hbjson faces converted");
    ModelMeshes {
        groups: groups.finish(),
        faces_processed: processed,
        faces_skipped: skipped,
    }
}

/// Full conversion: HBJSON model to GLB bytes.
pub fn hbjson_to_glb(model: &Model) -> Result<Vec<u8>, GlbError> {
    model_to_meshes(model).to_glb()
}

fn add_face(face: &Face, scale: f64, groups: &mut GroupBuilders) -> bool {
    let outer = to_points(&face.geometry.boundary, scale);
    if outer.len() < 3 {
        warn!(face = %face.identifier, "invalid face geometry, skipping");
        return false;
    }

    let mut holes: Vec<Vec<Vec3>> = face
        .geometry
        .holes
        .iter()
        .map(|h| to_points(h, scale))
        .collect();

    for aperture in &face.apertures {
        let pane = to_points(&aperture.geometry.boundary, scale);
        if pane.len() < 3 {
            continue;
        }
        if !extrude_polygon(&pane, &[], PANE_THICKNESS_M, groups.get(SurfaceKind::Window)) {
            warn!(aperture = %aperture.identifier, "aperture could not be triangulated, skipping");
            continue;
        }
        holes.push(pane);
    }
    for door in &face.doors {
        let leaf = to_points(&door.geometry.boundary, scale);
        if leaf.len() < 3 {
            continue;
        }
        let (kind, depth) = if door.is_glass {
            (SurfaceKind::Window, PANE_THICKNESS_M)
        } else {
            (SurfaceKind::Door, DOOR_THICKNESS_M)
        };
        if !extrude_polygon(&leaf, &[], depth, groups.get(kind)) {
            warn!(door = %door.identifier, "door could not be triangulated, skipping");
            continue;
        }
        holes.push(leaf);
    }

    let depth = face.thickness.unwrap_or(DEFAULT_FACE_THICKNESS) * scale;
    let kind = SurfaceKind::from_face_type(face.face_type);
    if !extrude_polygon(&outer, &holes, depth, groups.get(kind)) {
        warn!(face = %face.identifier, "face could not be triangulated, skipping");
        return false;
    }
    true
}

/// HBJSON is Z-up, glTF is Y-up.
fn to_points(ring: &[[f64; 3]], scale: f64) -> Vec<Vec3> {
    let mut points: Vec<Vec3> = ring
        .iter()
        .map(|p| Vec3::new(p[0] * scale, p[2] * scale, -p[1] * scale))
        .filter(|p| p.is_finite())
        .collect();
    drop_closing_duplicate(&mut points);
    points
}

fn drop_closing_duplicate(points: &mut Vec<Vec3>) {
    if points.len() >= 2 {
        let first = points[0];
        let last = points[points.len() - 1];
        if (first - last).length() < 1e-9 {
            points.pop();
        }
    }
}

/// Newell normal of a (possibly non-convex) planar ring.
fn ring_normal(ring: &[Vec3]) -> Option<Vec3> {
    let mut n = Vec3::ZERO;
    for (i, a) in ring.iter().enumerate() {
        let b = ring[(i + 1) % ring.len()];
        n = n + Vec3::new(
            (a.y - b.y) * (a.z + b.z),
            (a.z - b.z) * (a.x + b.x),
            (a.x - b.x) * (a.y + b.y),
        );
    }
    n.normalized()
}

fn signed_area(ring: &[Vec2]) -> f64 {
    let mut sum = 0.0;
    for (i, a) in ring.iter().enumerate() {
        sum += a.perp_dot(ring[(i + 1) % ring.len()]);
    }
    sum * 0.5
}

/// Extrudes the planar polygon against its normal by `depth`, producing the
/// front cap, back cap and side walls (including the walls of each hole).
fn extrude_polygon(outer: &[Vec3], holes: &[Vec<Vec3>], depth: f64, out: &mut MeshBuilder) -> bool {
    let Some(normal) = ring_normal(outer) else {
        return false;
    };
    let helper = if normal.y.abs() < 0.9 {
        Vec3::new(0.0, 1.0, 0.0)
    } else {
        Vec3::X
    };
    let Some(u) = helper.cross(normal).normalized() else {
        return false;
    };
    let v = normal.cross(u);
    let origin = outer[0];
    let project = |p: Vec3| Vec2::new((p - origin).dot(u), (p - origin).dot(v));

    let rings: Vec<&[Vec3]> = std::iter::once(outer)
        .chain(holes.iter().map(Vec::as_slice).filter(|h| h.len() >= 3))
        .collect();

    let mut vertices: Vec<Vec3> = Vec::new();
    let mut coords: Vec<f64> = Vec::new();
    let mut hole_indices: Vec<usize> = Vec::new();
    for (ring_i, ring) in rings.iter().enumerate() {
        if ring_i > 0 {
            hole_indices.push(vertices.len());
        }
        for p in ring.iter() {
            let q = project(*p);
            coords.push(q.x);
            coords.push(q.y);
            vertices.push(*p);
        }
    }

    let triangles = match earcut(&coords, &hole_indices, 2) {
        Ok(ix) if !ix.is_empty() => ix,
        _ => return false,
    };

    let back = normal * -depth;
    for tri in triangles.chunks_exact(3) {
        let (a, b, c) = (vertices[tri[0]], vertices[tri[1]], vertices[tri[2]]);
        out.triangle(a, b, c, normal);
        if depth > 0.0 {
            out.triangle(a + back, b + back, c + back, -normal);
        }
    }

    if depth <= 0.0 {
        return true;
    }

    for (ring_i, ring) in rings.iter().enumerate() {
        let projected: Vec<Vec2> = ring.iter().map(|p| project(*p)).collect();
        let ccw = signed_area(&projected) > 0.0;
        // Side walls face away from the solid: outward on the outer ring,
        // into the opening on holes.
        let sign = if ccw == (ring_i == 0) { 1.0 } else { -1.0 };
        for (i, a) in ring.iter().enumerate() {
            let b = ring[(i + 1) % ring.len()];
            let Some(side) = (b - *a).cross(normal).normalized() else {
                continue;
            };
            out.quad(*a, b, b + back, *a + back, side * sign);
        }
    }

    true
}

fn hex_to_linear_rgba(hex: u32, alpha: f32) -> [f32; 4] {
    let channel = |shift: u32| {
        let c = ((hex >> shift) & 0xff) as f32 / 255.0;
        // glTF base colour factors are linear.
        if c <= 0.04045 {
            c / 12.92
        } else {
            ((c + 0.055) / 1.055).powf(2.4)
        }
    };
    [channel(16), channel(8), channel(0), alpha]
}

#[cfg(test)]
mod tests {
    use super::{SurfaceKind, hbjson_to_glb, model_to_meshes};
    use crate::hbjson::Model;
    use pretty_assertions::assert_eq;

    fn model(json: &str) -> Model {
        Model::from_json_str(json).expect("parse model")
    }

    const WALL_WITH_WINDOW: &str = r#"{
        "identifier": "m",
        "rooms": [{
            "identifier": "r",
            "faces": [{
                "identifier": "wall",
                "face_type": "Wall",
                "geometry": { "boundary": [[0,0,0],[4,0,0],[4,0,3],[0,0,3]] },
                "apertures": [{
                    "identifier": "win",
                    "geometry": { "boundary": [[1,0,1],[2,0,1],[2,0,2],[1,0,2]] }
                }]
            }]
        }]
    }"#;

    #[test]
    fn wall_with_window_produces_two_groups() {
        let meshes = model_to_meshes(&model(WALL_WITH_WINDOW));
        assert_eq!(meshes.faces_processed, 1);
        assert_eq!(meshes.faces_skipped, 0);
        let kinds: Vec<_> = meshes.groups.keys().copied().collect();
        assert_eq!(kinds, vec![SurfaceKind::Wall, SurfaceKind::Window]);

        let window = &meshes.groups[&SurfaceKind::Window];
        // A box: 6 sides, 2 triangles each, 4 unique vertices per side.
        assert_eq!(window.triangle_count(), 12);
        assert_eq!(window.vertex_count(), 24);
    }

    #[test]
    fn wall_is_extruded_with_hole() {
        let meshes = model_to_meshes(&model(WALL_WITH_WINDOW));
        let wall = &meshes.groups[&SurfaceKind::Wall];
        // Caps: polygon with one quad hole has 8 vertices -> 8 triangles per cap.
        // Sides: 4 outer + 4 hole edges, 2 triangles each.
        assert_eq!(wall.triangle_count(), 8 * 2 + 8 * 2);

        let b = wall.position_bounds();
        // HBJSON Y (wall plane at y=0) becomes -Z; the wall is extruded by 0.3.
        assert!((b.max[0] - 4.0).abs() < 1e-6);
        assert!((b.max[1] - 3.0).abs() < 1e-6);
        assert!((b.max[2] - b.min[2] - 0.3).abs() < 1e-6);
    }

    #[test]
    fn degenerate_faces_are_skipped() {
        let meshes = model_to_meshes(&model(
            r#"{
            "rooms": [{ "faces": [
                { "face_type": "Floor", "geometry": { "boundary": [[0,0,0],[1,0,0]] } },
                { "face_type": "Floor", "geometry": { "boundary": [[0,0,0],[1,0,0],[2,0,0]] } },
                { "face_type": "Floor", "geometry": { "boundary": [[0,0,0],[0,1,0],[1,1,0],[1,0,0]] } }
            ]}]
        }"#,
        ));
        assert_eq!(meshes.faces_processed, 1);
        assert_eq!(meshes.faces_skipped, 2);
        assert!(meshes.groups.contains_key(&SurfaceKind::Floor));
    }

    #[test]
    fn units_are_scaled_to_meters() {
        let meshes = model_to_meshes(&model(
            r#"{
            "units": "Millimeters",
            "rooms": [{ "faces": [
                { "face_type": "RoofCeiling", "thickness": 200,
                  "geometry": { "boundary": [[0,0,3000],[1000,0,3000],[1000,1000,3000],[0,1000,3000]] } }
            ]}]
        }"#,
        ));
        let roof = &meshes.groups[&SurfaceKind::Roof];
        let b = roof.position_bounds();
        assert!((b.max[0] - 1.0).abs() < 1e-6);
        assert!((b.max[1] - 3.0).abs() < 1e-6);
        assert!((b.max[1] - b.min[1] - 0.2).abs() < 1e-6);
    }

    #[test]
    fn converted_model_is_valid_glb() {
        let glb = hbjson_to_glb(&model(WALL_WITH_WINDOW)).expect("glb");
        let gltf = gltf::Gltf::from_slice(&glb).expect("valid glTF");
        let names: Vec<_> = gltf.meshes().filter_map(|m| m.name().map(str::to_string)).collect();
        assert_eq!(names, vec!["walls".to_string(), "windows".to_string()]);
        assert!(gltf.blob.is_some());
    }

    #[test]
    fn only_windows_are_alpha_blended() {
        let glb = hbjson_to_glb(&model(WALL_WITH_WINDOW)).expect("glb");
        let gltf = gltf::Gltf::from_slice(&glb).expect("valid glTF");
        let modes: Vec<_> = gltf
            .materials()
            .map(|m| (m.name().map(str::to_string), m.alpha_mode()))
            .collect();
        assert_eq!(
            modes,
            vec![
                (Some("walls".to_string()), gltf::material::AlphaMode::Opaque),
                (Some("windows".to_string()), gltf::material::AlphaMode::Blend),
            ]
        );
    }

    #[test]
    fn window_material_is_translucent_glass() {
        let m = SurfaceKind::Window.material();
        assert_eq!(m.name, "windows");
        assert_eq!(m.base_color[3], 0.5);
        assert!((m.base_color[2] - 1.0).abs() < 1e-6);
        // 0x44 in linear space.
        assert!((m.base_color[0] - 0.0578).abs() < 1e-3);
        assert_eq!(m.base_color[0], m.base_color[1]);
        assert_eq!((m.metallic, m.roughness), (0.8, 0.1));
        assert!(m.is_transparent());
    }

    #[test]
    fn opaque_materials() {
        let wall = SurfaceKind::Wall.material();
        assert_eq!(wall.name, "walls");
        assert!((wall.base_color[0] - 1.0).abs() < 1e-6);
        assert!(wall.base_color[1] > 0.4 && wall.base_color[1] < 0.5);
        assert_eq!(wall.base_color[2], 0.0);
        assert_eq!(wall.base_color[3], 1.0);
        assert_eq!((wall.metallic, wall.roughness), (0.2, 0.8));

        for kind in [
            SurfaceKind::Wall,
            SurfaceKind::Floor,
            SurfaceKind::Roof,
            SurfaceKind::Door,
            SurfaceKind::Other,
        ] {
            let m = kind.material();
            assert!(!m.is_transparent(), "{} should be opaque", m.name);
            assert_eq!((m.metallic, m.roughness), (0.2, 0.8));
        }
        let door = SurfaceKind::Door.material().base_color;
        assert!((door[0] - 1.0).abs() < 1e-6);
        assert_eq!(&door[1..], &[0.0, 0.0, 1.0]);
    }

    #[test]
    fn doors_are_grouped_by_glazing() {
        let meshes = model_to_meshes(&model(
            r#"{
            "rooms": [{ "faces": [{
                "face_type": "Wall",
                "geometry": { "boundary": [[0,0,0],[4,0,0],[4,0,3],[0,0,3]] },
                "doors": [
                    { "identifier": "front",
                      "geometry": { "boundary": [[0.5,0,0.5],[1.5,0,0.5],[1.5,0,2.5],[0.5,0,2.5]] } },
                    { "identifier": "patio", "is_glass": true,
                      "geometry": { "boundary": [[2.5,0,0.5],[3.5,0,0.5],[3.5,0,2.5],[2.5,0,2.5]] } }
                ]
            }]}]
        }"#,
        ));
        let kinds: Vec<_> = meshes.groups.keys().copied().collect();
        assert_eq!(kinds, vec![SurfaceKind::Wall, SurfaceKind::Window, SurfaceKind::Door]);

        let door = &meshes.groups[&SurfaceKind::Door];
        assert_eq!(door.triangle_count(), 12);
        let b = door.position_bounds();
        assert!((b.max[2] - b.min[2] - 0.05).abs() < 1e-6);

        let glass = &meshes.groups[&SurfaceKind::Window];
        assert_eq!(glass.triangle_count(), 12);
        let b = glass.position_bounds();
        assert!((b.max[2] - b.min[2] - 0.02).abs() < 1e-6);

        // Caps: 4 outer + 2 quad holes -> 14 triangles each; 12 side edges.
        assert_eq!(meshes.groups[&SurfaceKind::Wall].triangle_count(), 14 * 2 + 12 * 2);
    }

    #[test]
    fn face_holes_are_cut_from_caps() {
        let meshes = model_to_meshes(&model(
            r#"{
            "rooms": [{ "faces": [{
                "face_type": "Floor",
                "geometry": {
                    "boundary": [[0,0,0],[0,4,0],[4,4,0],[4,0,0]],
                    "holes": [[[1,1,0],[2,1,0],[2,2,0],[1,2,0]]]
                }
            }]}]
        }"#,
        ));
        let floor = &meshes.groups[&SurfaceKind::Floor];
        assert_eq!(floor.triangle_count(), 8 * 2 + 8 * 2);

        // HBJSON (x, y) lands on glTF (x, -z); the hole spans x 1..2, z -2..-1.
        let mut caps = 0;
        for tri in floor.indices.chunks(3) {
            if floor.normals[tri[0] as usize][1].abs() < 0.99 {
                continue;
            }
            caps += 1;
            let [x, z] = tri.iter().fold([0.0f32; 2], |acc, &i| {
                let p = floor.positions[i as usize];
                [acc[0] + p[0] / 3.0, acc[1] + p[2] / 3.0]
            });
            let inside = x > 1.0 && x < 2.0 && z > -2.0 && z < -1.0;
            assert!(!inside, "cap triangle centred in the hole at ({x}, {z})");
        }
        assert_eq!(caps, 16);
    }

    #[test]
    fn face_without_geometry_is_skipped() {
        let meshes = model_to_meshes(&model(
            r#"{
            "rooms": [{ "faces": [
                { "identifier": "broken", "face_type": "Wall" },
                { "face_type": "Wall", "geometry": { "boundary": [[0,0,0],[4,0,0],[4,0,3],[0,0,3]] } }
            ]}]
        }"#,
        ));
        assert_eq!(meshes.faces_processed, 1);
        assert_eq!(meshes.faces_skipped, 1);
        assert_eq!(meshes.groups[&SurfaceKind::Wall].triangle_count(), 12);
    }

    #[test]
    fn aperture_without_geometry_is_ignored() {
        let meshes = model_to_meshes(&model(
            r#"{
            "rooms": [{ "faces": [{
                "face_type": "Wall",
                "geometry": { "boundary": [[0,0,0],[4,0,0],[4,0,3],[0,0,3]] },
                "apertures": [{ "identifier": "win" }],
                "doors": [{ "identifier": "door" }]
            }]}]
        }"#,
        ));
        assert_eq!(meshes.faces_processed, 1);
        let kinds: Vec<_> = meshes.groups.keys().copied().collect();
        assert_eq!(kinds, vec![SurfaceKind::Wall]);
        assert_eq!(meshes.groups[&SurfaceKind::Wall].triangle_count(), 12);
    }

    #[test]
    fn collinear_aperture_leaves_wall_uncut() {
        let meshes = model_to_meshes(&model(
            r#"{
            "rooms": [{ "faces": [{
                "face_type": "Wall",
                "geometry": { "boundary": [[0,0,0],[4,0,0],[4,0,3],[0,0,3]] },
                "apertures": [{
                    "identifier": "sliver",
                    "geometry": { "boundary": [[1,0,1],[2,0,1],[3,0,1]] }
                }]
            }]}]
        }"#,
        ));
        assert_eq!(meshes.faces_processed, 1);
        assert!(!meshes.groups.contains_key(&SurfaceKind::Window));
        // Two triangles per cap and four sides: no hole was cut.
        assert_eq!(meshes.groups[&SurfaceKind::Wall].triangle_count(), 12);
    }
}
