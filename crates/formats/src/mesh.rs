use std::collections::HashMap;

use foundation::Aabb3;
use foundation::math::Vec3;

// Quantization steps used when merging vertices.
const POSITION_EPS: f64 = 1e-6;
const NORMAL_EPS: f64 = 1e-4;

/// Indexed triangle list with flat per-vertex normals.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Mesh {
    pub positions: Vec<[f32; 3]>,
    pub normals: Vec<[f32; 3]>,
    pub indices: Vec<u32>,
}

impl Mesh {
    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    pub fn position_bounds(&self) -> Aabb3 {
        let mut b = Aabb3::empty();
        for p in &self.positions {
            b.extend([p[0] as f64, p[1] as f64, p[2] as f64]);
        }
        b
    }
}

/// Builds a [`Mesh`], merging vertices that share position and normal.
#[derive(Debug, Default)]
pub struct MeshBuilder {
    mesh: Mesh,
    lookup: HashMap<[i64; 6], u32>,
}

impl MeshBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn vertex(&mut self, position: Vec3, normal: Vec3) -> u32 {
        let key = [
            quantize(position.x, POSITION_EPS),
            quantize(position.y, POSITION_EPS),
            quantize(position.z, POSITION_EPS),
            quantize(normal.x, NORMAL_EPS),
            quantize(normal.y, NORMAL_EPS),
            quantize(normal.z, NORMAL_EPS),
        ];
        if let Some(&index) = self.lookup.get(&key) {
            return index;
        }
        let index = self.mesh.positions.len() as u32;
        self.mesh
            .positions
            .push([position.x as f32, position.y as f32, position.z as f32]);
        self.mesh
            .normals
            .push([normal.x as f32, normal.y as f32, normal.z as f32]);
        self.lookup.insert(key, index);
        index
    }

    /// Adds one triangle facing `normal`; the winding is flipped if needed.
    pub fn triangle(&mut self, a: Vec3, b: Vec3, c: Vec3, normal: Vec3) {
        let face = (b - a).cross(c - a);
        if face.length() <= 1e-12 {
            return;
        }
        let (b, c) = if face.dot(normal) < 0.0 { (c, b) } else { (b, c) };
        let ia = self.vertex(a, normal);
        let ib = self.vertex(b, normal);
        let ic = self.vertex(c, normal);
        self.mesh.indices.extend([ia, ib, ic]);
    }

    /// Adds the quad `a b c d` (in ring order) facing `normal`.
    pub fn quad(&mut self, a: Vec3, b: Vec3, c: Vec3, d: Vec3, normal: Vec3) {
        self.triangle(a, b, c, normal);
        self.triangle(a, c, d, normal);
    }

    pub fn build(self) -> Mesh {
        self.mesh
    }
}

fn quantize(v: f64, eps: f64) -> i64 {
    let q = (v / eps).round();
    // Collapse -0 so mirrored zeros hash alike.
    if q == 0.0 { 0 } else { q as i64 }
}
