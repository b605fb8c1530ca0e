//! Procedural scene meshes: boxes, spheres and ground planes.

use std::f32::consts::{PI, TAU};

use glam::Vec3;

use crate::buffer::{BufferAllocator, IndexData, MeshBuffer, Vertex};

/// CPU-side triangle mesh with counter-clockwise front faces.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MeshData {
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
}

impl MeshData {
    /// Axis-aligned box centered on the origin with edge length `size`.
    pub fn cube(size: f32) -> Self {
        let mut mesh = Self::default();
        let h = size * 0.5;
        for normal in [Vec3::X, Vec3::NEG_X, Vec3::Y, Vec3::NEG_Y, Vec3::Z, Vec3::NEG_Z] {
            // u and v span the face so that u x v == normal.
            let u = if normal.y.abs() > 0.5 {
                Vec3::X
            } else {
                normal.cross(Vec3::Y).normalize() * -1.0
            };
            let v = normal.cross(u);
            mesh.push_quad(normal * h, u * h, v * h, normal, 1.0);
        }
        mesh
    }

    /// Square in the XZ plane facing +Y, with `uv_repeat` texture tiles per side.
    pub fn plane(size: f32, uv_repeat: f32) -> Self {
        let mut mesh = Self::default();
        let h = size * 0.5;
        mesh.push_quad(Vec3::ZERO, Vec3::X * h, Vec3::NEG_Z * h, Vec3::Y, uv_repeat);
        mesh
    }

    /// UV sphere of `radius` with `sectors` longitude and `stacks` latitude bands.
    pub fn uv_sphere(radius: f32, sectors: u32, stacks: u32) -> Self {
        let sectors = sectors.max(3);
        let stacks = stacks.max(2);
        let mut mesh = Self::default();

        for stack in 0..=stacks {
            let v = stack as f32 / stacks as f32;
            let phi = v * PI;
            for sector in 0..=sectors {
                let u = sector as f32 / sectors as f32;
                let theta = u * TAU;
                let normal = Vec3::new(phi.sin() * theta.cos(), phi.cos(), -phi.sin() * theta.sin());
                mesh.vertices.push(Vertex {
                    position: (normal * radius).to_array(),
                    normal: normal.to_array(),
                    uv: [u, v],
                });
            }
        }

        let row = sectors + 1;
        for stack in 0..stacks {
            for sector in 0..sectors {
                let a = stack * row + sector;
                let b = a + row;
                if stack != 0 {
                    mesh.indices.extend_from_slice(&[a, b, a + 1]);
                }
                if stack != stacks - 1 {
                    mesh.indices.extend_from_slice(&[a + 1, b, b + 1]);
                }
            }
        }
        mesh
    }

    /// Quad centered at `center` spanning `±u` and `±v`, wound so `u x v` faces out.
    fn push_quad(&mut self, center: Vec3, u: Vec3, v: Vec3, normal: Vec3, uv_repeat: f32) {
        let base = self.vertices.len() as u32;
        let corners = [(-1.0, -1.0), (1.0, -1.0), (1.0, 1.0), (-1.0, 1.0)];
        for (su, sv) in corners {
            self.vertices.push(Vertex {
                position: (center + u * su + v * sv).to_array(),
                normal: normal.to_array(),
                uv: [
                    (su + 1.0) * 0.5 * uv_repeat,
                    (1.0 - sv) * 0.5 * uv_repeat,
                ],
            });
        }
        self.indices
            .extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
    }

    /// Upload to the GPU.
    pub fn upload(&self, device: &wgpu::Device, label: &str) -> MeshBuffer {
        BufferAllocator::new(device).create_mesh(
            label,
            bytemuck::cast_slice(&self.vertices),
            IndexData::U32(&self.indices),
        )
    }
}
