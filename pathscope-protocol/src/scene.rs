//! Scene and render-info records streamed by renderers.
//!
//! Each `encode` writes the record's opcode header followed by its body.
//! `decode_body` reads the body only; the reader has already consumed the
//! opcode to decide which record follows.

use crate::codec::{WireRead, WireWrite};
use crate::error::CodecError;
use crate::message::{MeshType, Opcode};
use crate::types::{Color4f, Point3f, Point3i, Vec3f};
use bytes::{Buf, BufMut};
use serde::{Deserialize, Serialize};

/// Scene identity, output target and current sample budget.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderInfo {
    pub scene_name: String,
    pub output_filepath: String,
    pub output_file_extension: String,
    pub sample_count: i32,
}

impl RenderInfo {
    pub fn encode<B: BufMut + ?Sized>(&self, buf: &mut B) {
        buf.put_opcode(Opcode::RenderInfoQuery);
        buf.put_string(&self.scene_name);
        buf.put_string(&self.output_filepath);
        buf.put_string(&self.output_file_extension);
        buf.put_wire(&self.sample_count);
    }

    pub fn decode_body<B: Buf + ?Sized>(buf: &mut B) -> Result<Self, CodecError> {
        Ok(Self {
            scene_name: buf.get_wire()?,
            output_filepath: buf.get_wire()?,
            output_file_extension: buf.get_wire()?,
            sample_count: buf.get_wire()?,
        })
    }

    /// Writes the set form: RENDER_INFO_SET followed by the sample count.
    pub fn encode_sample_count<B: BufMut + ?Sized>(buf: &mut B, sample_count: i32) {
        buf.put_opcode(Opcode::RenderInfoSet);
        buf.put_wire(&sample_count);
    }
}

/// Pinhole camera description.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Camera {
    pub near_clip: f32,
    pub far_clip: f32,
    pub focus_dist: f32,
    pub fov: f32,
    pub up: Vec3f,
    pub dir: Vec3f,
    pub origin: Point3f,
}

impl Camera {
    pub fn encode<B: BufMut + ?Sized>(&self, buf: &mut B) {
        buf.put_opcode(Opcode::Camera);
        buf.put_wire(&self.near_clip);
        buf.put_wire(&self.far_clip);
        buf.put_wire(&self.focus_dist);
        buf.put_wire(&self.fov);
        buf.put_wire(&self.up);
        buf.put_wire(&self.dir);
        buf.put_wire(&self.origin);
    }

    pub fn decode_body<B: Buf + ?Sized>(buf: &mut B) -> Result<Self, CodecError> {
        Ok(Self {
            near_clip: buf.get_wire()?,
            far_clip: buf.get_wire()?,
            focus_dist: buf.get_wire()?,
            fov: buf.get_wire()?,
            up: buf.get_wire()?,
            dir: buf.get_wire()?,
            origin: buf.get_wire()?,
        })
    }
}

/// Indexed triangle mesh.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Mesh {
    pub vertices: Vec<Point3f>,
    pub triangles: Vec<Point3i>,
    pub specular: Color4f,
    pub diffuse: Color4f,
}

impl Mesh {
    pub fn encode<B: BufMut + ?Sized>(&self, buf: &mut B) {
        buf.put_opcode(Opcode::SceneData);
        buf.put_u16_le(MeshType::TriangleMesh as u16);
        buf.put_u32_le(self.vertices.len() as u32);
        buf.put_array(&self.vertices);
        buf.put_u32_le(self.triangles.len() as u32);
        buf.put_array(&self.triangles);
        buf.put_wire(&self.specular);
        buf.put_wire(&self.diffuse);
    }

    /// Reads the mesh body that follows the mesh type tag.
    pub fn decode_body<B: Buf + ?Sized>(buf: &mut B) -> Result<Self, CodecError> {
        let vertex_count: u32 = buf.get_wire()?;
        let vertices = buf.get_array(vertex_count as usize)?;
        let triangle_count: u32 = buf.get_wire()?;
        let triangles = buf.get_array(triangle_count as usize)?;
        Ok(Self {
            vertices,
            triangles,
            specular: buf.get_wire()?,
            diffuse: buf.get_wire()?,
        })
    }
}

/// Analytic sphere.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sphere {
    pub radius: f32,
    pub center: Point3f,
    pub diffuse: Color4f,
    pub specular: Color4f,
}

impl Sphere {
    pub fn new(center: Point3f, radius: f32) -> Self {
        Self {
            radius,
            center,
            diffuse: Color4f::rgb(1.0, 1.0, 1.0),
            specular: Color4f::BLACK,
        }
    }

    pub fn encode<B: BufMut + ?Sized>(&self, buf: &mut B) {
        buf.put_opcode(Opcode::SceneData);
        buf.put_u16_le(MeshType::Sphere as u16);
        buf.put_wire(&self.radius);
        buf.put_wire(&self.center);
        buf.put_wire(&self.diffuse);
        buf.put_wire(&self.specular);
    }

    /// Reads the sphere body that follows the mesh type tag.
    pub fn decode_body<B: Buf + ?Sized>(buf: &mut B) -> Result<Self, CodecError> {
        Ok(Self {
            radius: buf.get_wire()?,
            center: buf.get_wire()?,
            diffuse: buf.get_wire()?,
            specular: buf.get_wire()?,
        })
    }
}

/// One SCENE_DATA record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SceneObject {
    Mesh(Mesh),
    Sphere(Sphere),
}

impl SceneObject {
    pub fn encode<B: BufMut + ?Sized>(&self, buf: &mut B) {
        match self {
            SceneObject::Mesh(mesh) => mesh.encode(buf),
            SceneObject::Sphere(sphere) => sphere.encode(buf),
        }
    }

    /// Reads the mesh type tag and the matching body.
    pub fn decode_body<B: Buf + ?Sized>(buf: &mut B) -> Result<Self, CodecError> {
        let tag: u16 = buf.get_wire()?;
        match MeshType::try_from(tag)? {
            MeshType::TriangleMesh => Mesh::decode_body(buf).map(SceneObject::Mesh),
            MeshType::Sphere => Sphere::decode_body(buf).map(SceneObject::Sphere),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;

    fn strip_opcode(buf: &BytesMut, expected: Opcode) -> &[u8] {
        let mut rd = &buf[..];
        assert_eq!(rd.get_wire::<Opcode>().unwrap(), expected);
        rd
    }

    #[test]
    fn test_render_info_layout() {
        let info = RenderInfo {
            scene_name: "cbox".to_string(),
            output_filepath: "/tmp/out".to_string(),
            output_file_extension: "exr".to_string(),
            sample_count: 64,
        };
        let mut buf = BytesMut::new();
        info.encode(&mut buf);
        assert_eq!(buf.len(), 2 + (4 + 4) + (4 + 8) + (4 + 3) + 4);

        let mut body = strip_opcode(&buf, Opcode::RenderInfoQuery);
        assert_eq!(RenderInfo::decode_body(&mut body).unwrap(), info);
    }

    #[test]
    fn test_render_info_set_form() {
        let mut buf = BytesMut::new();
        RenderInfo::encode_sample_count(&mut buf, 128);
        assert_eq!(&buf[..], &[0x0B, 0x00, 128, 0, 0, 0]);
    }

    #[test]
    fn test_camera_layout() {
        let camera = Camera {
            near_clip: 0.1,
            far_clip: 1000.0,
            focus_dist: 5.0,
            fov: 45.0,
            up: Vec3f::new(0.0, 1.0, 0.0),
            dir: Vec3f::new(0.0, 0.0, -1.0),
            origin: Point3f::new(0.0, 0.0, 5.0),
        };
        let mut buf = BytesMut::new();
        camera.encode(&mut buf);
        assert_eq!(buf.len(), 2 + 16 + 36);

        let mut body = strip_opcode(&buf, Opcode::Camera);
        assert_eq!(Camera::decode_body(&mut body).unwrap(), camera);
    }

    #[test]
    fn test_mesh_counts_points_not_floats() {
        let mesh = Mesh {
            vertices: vec![
                Point3f::new(0.0, 0.0, 0.0),
                Point3f::new(1.0, 0.0, 0.0),
                Point3f::new(0.0, 1.0, 0.0),
            ],
            triangles: vec![Point3i::new(0, 1, 2)],
            specular: Color4f::BLACK,
            diffuse: Color4f::rgb(0.8, 0.8, 0.8),
        };
        let mut buf = BytesMut::new();
        mesh.encode(&mut buf);
        assert_eq!(&buf[2..4], &[0, 0]);
        assert_eq!(&buf[4..8], &3u32.to_le_bytes());

        let mut body = strip_opcode(&buf, Opcode::SceneData);
        assert_eq!(
            SceneObject::decode_body(&mut body).unwrap(),
            SceneObject::Mesh(mesh)
        );
        assert!(body.is_empty());
    }

    #[test]
    fn test_sphere_roundtrip() {
        let sphere = Sphere::new(Point3f::new(1.0, 2.0, 3.0), 0.5);
        let object = SceneObject::Sphere(sphere);
        let mut buf = BytesMut::new();
        object.encode(&mut buf);
        assert_eq!(buf.len(), 2 + 2 + 4 + 12 + 16 + 16);

        let mut body = strip_opcode(&buf, Opcode::SceneData);
        assert_eq!(SceneObject::decode_body(&mut body).unwrap(), object);
    }

    #[test]
    fn test_unknown_mesh_type() {
        let mut rd: &[u8] = &[7, 0];
        assert_eq!(
            SceneObject::decode_body(&mut rd).unwrap_err(),
            CodecError::UnknownMeshType(7)
        );
    }
}
