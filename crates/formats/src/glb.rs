//! Minimal glTF 2.0 binary (GLB) writer for static, untextured meshes.
//!
//! Layout: one buffer holding, per mesh, POSITION, NORMAL and u32 indices.
//! Each mesh becomes one node of the single default scene.

use serde::Serialize;

use crate::mesh::Mesh;

const GLB_MAGIC: u32 = 0x4654_6C67; // "glTF"
const GLB_VERSION: u32 = 2;
const CHUNK_JSON: u32 = 0x4E4F_534A;
const CHUNK_BIN: u32 = 0x004E_4942;

const COMPONENT_FLOAT: u32 = 5126;
const COMPONENT_UNSIGNED_INT: u32 = 5125;
const TARGET_ARRAY_BUFFER: u32 = 34962;
const TARGET_ELEMENT_ARRAY_BUFFER: u32 = 34963;
const MODE_TRIANGLES: u32 = 4;

#[derive(Debug, Clone, PartialEq)]
pub struct PbrMaterial {
    pub name: String,
    pub base_color: [f32; 4],
    pub metallic: f32,
    pub roughness: f32,
}

impl PbrMaterial {
    pub fn is_transparent(&self) -> bool {
        self.base_color[3] < 1.0
    }
}

pub struct GlbMesh<'a> {
    pub name: &'a str,
    pub mesh: &'a Mesh,
    pub material: &'a PbrMaterial,
}

#[derive(Debug, thiserror::Error)]
pub enum GlbError {
    #[error("glTF JSON serialization failed: {0}")]
    Json(#[from] serde_json::Error),
    #[error("GLB exceeds the 4 GiB container limit")]
    TooLarge,
    #[error("mesh {name:?} has {positions} positions but {normals} normals")]
    MismatchedAttributes {
        name: String,
        positions: usize,
        normals: usize,
    },
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Document {
    asset: Asset,
    scene: u32,
    scenes: Vec<Scene>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    nodes: Vec<Node>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    meshes: Vec<MeshDef>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    materials: Vec<MaterialDef>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    accessors: Vec<Accessor>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    buffer_views: Vec<BufferView>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    buffers: Vec<Buffer>,
}

#[derive(Serialize)]
struct Asset {
    version: &'static str,
    generator: String,
}

#[derive(Serialize)]
struct Scene {
    nodes: Vec<u32>,
}

#[derive(Serialize)]
struct Node {
    name: String,
    mesh: u32,
}

#[derive(Serialize)]
struct MeshDef {
    name: String,
    primitives: Vec<Primitive>,
}

#[derive(Serialize)]
struct Primitive {
    attributes: Attributes,
    indices: u32,
    material: u32,
    mode: u32,
}

#[derive(Serialize)]
struct Attributes {
    #[serde(rename = "POSITION")]
    position: u32,
    #[serde(rename = "NORMAL")]
    normal: u32,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct MaterialDef {
    name: String,
    pbr_metallic_roughness: Pbr,
    #[serde(skip_serializing_if = "Option::is_none")]
    alpha_mode: Option<&'static str>,
    double_sided: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Pbr {
    base_color_factor: [f32; 4],
    metallic_factor: f32,
    roughness_factor: f32,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Accessor {
    buffer_view: u32,
    component_type: u32,
    count: u32,
    #[serde(rename = "type")]
    kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    min: Option<[f32; 3]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max: Option<[f32; 3]>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct BufferView {
    buffer: u32,
    byte_offset: u32,
    byte_length: u32,
    target: u32,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Buffer {
    byte_length: u32,
}

/// Encodes `meshes` into a GLB container. Empty meshes are skipped.
pub fn encode_glb(meshes: &[GlbMesh<'_>], generator: &str) -> Result<Vec<u8>, GlbError> {
    let mut doc = Document {
        asset: Asset {
            version: "2.0",
            generator: generator.to_string(),
        },
        scene: 0,
        scenes: vec![Scene { nodes: Vec::new() }],
        nodes: Vec::new(),
        meshes: Vec::new(),
        materials: Vec::new(),
        accessors: Vec::new(),
        buffer_views: Vec::new(),
        buffers: Vec::new(),
    };
    let mut bin: Vec<u8> = Vec::new();

    for entry in meshes {
        let mesh = entry.mesh;
        if mesh.is_empty() {
            continue;
        }
        if mesh.positions.len() != mesh.normals.len() {
            return Err(GlbError::MismatchedAttributes {
                name: entry.name.to_string(),
                positions: mesh.positions.len(),
                normals: mesh.normals.len(),
            });
        }

        let vertex_count = to_u32(mesh.positions.len())?;
        let bounds = mesh.position_bounds();

        let position_view = push_view(&mut doc, &mut bin, TARGET_ARRAY_BUFFER, |out| {
            for p in &mesh.positions {
                for c in p {
                    out.extend_from_slice(&c.to_le_bytes());
                }
            }
        })?;
        let normal_view = push_view(&mut doc, &mut bin, TARGET_ARRAY_BUFFER, |out| {
            for n in &mesh.normals {
                for c in n {
                    out.extend_from_slice(&c.to_le_bytes());
                }
            }
        })?;
        let index_view = push_view(&mut doc, &mut bin, TARGET_ELEMENT_ARRAY_BUFFER, |out| {
            for i in &mesh.indices {
                out.extend_from_slice(&i.to_le_bytes());
            }
        })?;

        let position = push_accessor(
            &mut doc,
            Accessor {
                buffer_view: position_view,
                component_type: COMPONENT_FLOAT,
                count: vertex_count,
                kind: "VEC3",
                min: Some(bounds.min.map(|v| v as f32)),
                max: Some(bounds.max.map(|v| v as f32)),
            },
        );
        let normal = push_accessor(
            &mut doc,
            Accessor {
                buffer_view: normal_view,
                component_type: COMPONENT_FLOAT,
                count: vertex_count,
                kind: "VEC3",
                min: None,
                max: None,
            },
        );
        let indices = push_accessor(
            &mut doc,
            Accessor {
                buffer_view: index_view,
                component_type: COMPONENT_UNSIGNED_INT,
                count: to_u32(mesh.indices.len())?,
                kind: "SCALAR",
                min: None,
                max: None,
            },
        );

        let m = entry.material;
        let material = doc.materials.len() as u32;
        doc.materials.push(MaterialDef {
            name: m.name.clone(),
            pbr_metallic_roughness: Pbr {
                base_color_factor: m.base_color,
                metallic_factor: m.metallic,
                roughness_factor: m.roughness,
            },
            alpha_mode: m.is_transparent().then_some("BLEND"),
            double_sided: true,
        });

        let mesh_index = doc.meshes.len() as u32;
        doc.meshes.push(MeshDef {
            name: entry.name.to_string(),
            primitives: vec![Primitive {
                attributes: Attributes { position, normal },
                indices,
                material,
                mode: MODE_TRIANGLES,
            }],
        });

        let node = doc.nodes.len() as u32;
        doc.nodes.push(Node {
            name: entry.name.to_string(),
            mesh: mesh_index,
        });
        doc.scenes[0].nodes.push(node);
    }

    if !bin.is_empty() {
        doc.buffers.push(Buffer {
            byte_length: to_u32(bin.len())?,
        });
    }

    let mut json = serde_json::to_vec(&doc)?;
    pad_to_4(&mut json, b' ');
    pad_to_4(&mut bin, 0);

    let mut total = 12 + 8 + json.len();
    if !bin.is_empty() {
        total += 8 + bin.len();
    }
    let total = to_u32(total)?;

    let mut out = Vec::with_capacity(total as usize);
    out.extend_from_slice(&GLB_MAGIC.to_le_bytes());
    out.extend_from_slice(&GLB_VERSION.to_le_bytes());
    out.extend_from_slice(&total.to_le_bytes());

    out.extend_from_slice(&to_u32(json.len())?.to_le_bytes());
    out.extend_from_slice(&CHUNK_JSON.to_le_bytes());
    out.extend_from_slice(&json);

    if !bin.is_empty() {
        out.extend_from_slice(&to_u32(bin.len())?.to_le_bytes());
        out.extend_from_slice(&CHUNK_BIN.to_le_bytes());
        out.extend_from_slice(&bin);
    }

    Ok(out)
}

/// True if `bytes` starts with a GLB version 2 header.
pub fn is_glb(bytes: &[u8]) -> bool {
    bytes.len() >= 12
        && bytes[0..4] == GLB_MAGIC.to_le_bytes()
        && bytes[4..8] == GLB_VERSION.to_le_bytes()
}

fn push_view(
    doc: &mut Document,
    bin: &mut Vec<u8>,
    target: u32,
    write: impl FnOnce(&mut Vec<u8>),
) -> Result<u32, GlbError> {
    // Every view holds 4-byte components, so offsets stay aligned.
    let byte_offset = to_u32(bin.len())?;
    write(bin);
    let byte_length = to_u32(bin.len())? - byte_offset;
    let index = doc.buffer_views.len() as u32;
    doc.buffer_views.push(BufferView {
        buffer: 0,
        byte_offset,
        byte_length,
        target,
    });
    Ok(index)
}

fn push_accessor(doc: &mut Document, accessor: Accessor) -> u32 {
    let index = doc.accessors.len() as u32;
    doc.accessors.push(accessor);
    index
}

fn pad_to_4(bytes: &mut Vec<u8>, fill: u8) {
    while bytes.len() % 4 != 0 {
        bytes.push(fill);
    }
}

fn to_u32(n: usize) -> Result<u32, GlbError> {
    u32::try_from(n).map_err(|_| GlbError::TooLarge)
}

#[cfg(test)]
mod tests {
    use super::{GlbMesh, PbrMaterial, encode_glb, is_glb};
    use crate::mesh::MeshBuilder;
    use foundation::math::Vec3;

    fn square() -> crate::mesh::Mesh {
        let mut b = MeshBuilder::new();
        b.quad(
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(1.0, 0.0, 0.0),
            Vec3::new(1.0, 0.0, -1.0),
            Vec3::new(0.0, 0.0, -1.0),
            Vec3::new(0.0, 1.0, 0.0),
        );
        b.build()
    }

    fn glass() -> PbrMaterial {
        PbrMaterial {
            name: "windows".to_string(),
            base_color: [0.27, 0.27, 1.0, 0.5],
            metallic: 0.8,
            roughness: 0.1,
        }
    }

    #[test]
    fn header_and_chunks_are_aligned() {
        let mesh = square();
        let material = glass();
        let glb = encode_glb(
            &[GlbMesh {
                name: "windows",
                mesh: &mesh,
                material: &material,
            }],
            "test",
        )
        .expect("encode");

        assert!(is_glb(&glb));
        let total = u32::from_le_bytes(glb[8..12].try_into().unwrap()) as usize;
        assert_eq!(total, glb.len());
        let json_len = u32::from_le_bytes(glb[12..16].try_into().unwrap()) as usize;
        assert_eq!(json_len % 4, 0);
        assert_eq!(glb.len() % 4, 0);
    }

    #[test]
    fn output_is_valid_gltf() {
        let mesh = square();
        let material = glass();
        let glb = encode_glb(
            &[GlbMesh {
                name: "windows",
                mesh: &mesh,
                material: &material,
            }],
            "test",
        )
        .expect("encode");

        let gltf = gltf::Gltf::from_slice(&glb).expect("valid glTF");
        assert_eq!(gltf.meshes().count(), 1);
        let mat = gltf.materials().next().expect("material");
        assert_eq!(mat.alpha_mode(), gltf::material::AlphaMode::Blend);
        let prim = gltf.meshes().next().unwrap().primitives().next().unwrap();
        assert_eq!(prim.indices().map(|a| a.count()), Some(6));
        assert_eq!(prim.get(&gltf::Semantic::Positions).map(|a| a.count()), Some(4));
    }

    #[test]
    fn empty_scene_has_no_buffer() {
        let glb = encode_glb(&[], "test").expect("encode");
        assert!(is_glb(&glb));
        let json_len = u32::from_le_bytes(glb[12..16].try_into().unwrap()) as usize;
        assert_eq!(glb.len(), 20 + json_len);
        let doc: serde_json::Value = serde_json::from_slice(&glb[20..]).expect("json chunk");
        assert_eq!(doc["asset"]["version"], "2.0");
        assert!(doc.get("buffers").is_none());
    }
}
