//! Display renderer for reconstructed meshes
//!
//! Three pipelines share one shader and one uniform layout: shaded faces, a
//! line-list wireframe built from the triangle edges, and points drawn
//! straight from the `pos` field of a node buffer.

use super::buffers::field_vertex_layout;
use crate::constants::field;
use crate::constants::render::{DEFAULT_DEBUG_COLOR, DEFAULT_EYE, DEFAULT_FRAME_SIZE};
use crate::error::{MorphError, Result};
use crate::mesh::{MeshData, MeshVertex};
use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3};
use std::mem;
use std::sync::{mpsc, Arc};
use wgpu::util::DeviceExt;
use wgpu::{
    BindGroup, BindGroupLayout, Buffer, BufferUsages, Device, PrimitiveTopology, Queue,
    RenderPipeline, ShaderStages, TextureView, VertexAttribute, VertexBufferLayout,
    VertexFormat, VertexStepMode,
};

/// Format of the offscreen color attachment
pub const COLOR_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;
pub const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;
const SAMPLE_COUNT: u32 = 1;

fn color_target_state() -> wgpu::ColorTargetState {
    wgpu::ColorTargetState {
        format: COLOR_FORMAT,
        blend: Some(wgpu::BlendState::REPLACE),
        write_mask: wgpu::ColorWrites::ALL,
    }
}

/// Depth test with `compare`, writing depth
fn depth_stencil_state(compare: wgpu::CompareFunction) -> wgpu::DepthStencilState {
    wgpu::DepthStencilState {
        format: DEPTH_FORMAT,
        depth_write_enabled: true,
        depth_compare: compare,
        stencil: wgpu::StencilState::default(),
        bias: wgpu::DepthBiasState::default(),
    }
}

impl MeshVertex {
    const ATTRIBUTES: [VertexAttribute; 3] = [
        VertexAttribute {
            offset: 0,
            shader_location: 0,
            format: VertexFormat::Float32x3,
        },
        VertexAttribute {
            offset: mem::size_of::<[f32; 3]>() as wgpu::BufferAddress,
            shader_location: 1,
            format: VertexFormat::Float32x3,
        },
        VertexAttribute {
            offset: mem::size_of::<[f32; 6]>() as wgpu::BufferAddress,
            shader_location: 2,
            format: VertexFormat::Float32x4,
        },
    ];

    pub fn desc<'a>() -> VertexBufferLayout<'a> {
        VertexBufferLayout {
            array_stride: mem::size_of::<MeshVertex>() as wgpu::BufferAddress,
            step_mode: VertexStepMode::Vertex,
            attributes: &Self::ATTRIBUTES,
        }
    }
}

#[repr(C)]
#[derive(Debug, Copy, Clone, Pod, Zeroable)]
pub struct RenderUniforms {
    pub mv_matrix: [[f32; 4]; 4],
    pub proj_matrix: [[f32; 4]; 4],
    pub debug_color: [f32; 4],
    pub debug_render: u32,
    pub _padding: [u32; 3],
}

/// Fixed look-at camera
#[derive(Debug, Clone)]
pub struct Camera {
    pub eye: Vec3,
    pub target: Vec3,
    pub up: Vec3,
    pub fov_y: f32,
    pub near: f32,
    pub far: f32,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            eye: Vec3::from_array(DEFAULT_EYE),
            target: Vec3::ZERO,
            up: Vec3::Y,
            fov_y: std::f32::consts::FRAC_PI_4,
            near: 1.0,
            far: 10000.0,
        }
    }
}

impl Camera {
    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_at_rh(self.eye, self.target, self.up)
    }

    pub fn projection_matrix(&self, aspect: f32) -> Mat4 {
        Mat4::perspective_rh(self.fov_y, aspect, self.near, self.far)
    }
}

/// Which passes to draw
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderFlags {
    pub faces: bool,
    pub wireframe: bool,
    pub points: bool,
}

impl Default for RenderFlags {
    fn default() -> Self {
        Self {
            faces: true,
            wireframe: true,
            points: true,
        }
    }
}

/// Color and depth attachments rendered to instead of a window surface
pub struct OffscreenTarget {
    pub size: [u32; 2],
    pub color: wgpu::Texture,
    pub color_view: TextureView,
    pub depth_view: TextureView,
}

impl OffscreenTarget {
    pub fn new(device: &Device, size: [u32; 2]) -> Self {
        let extent = wgpu::Extent3d {
            width: size[0].max(1),
            height: size[1].max(1),
            depth_or_array_layers: 1,
        };
        let color = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Offscreen Color"),
            size: extent,
            mip_level_count: 1,
            sample_count: SAMPLE_COUNT,
            dimension: wgpu::TextureDimension::D2,
            format: COLOR_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let depth = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Offscreen Depth"),
            size: extent,
            mip_level_count: 1,
            sample_count: SAMPLE_COUNT,
            dimension: wgpu::TextureDimension::D2,
            format: DEPTH_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        });
        Self {
            size: [extent.width, extent.height],
            color_view: color.create_view(&wgpu::TextureViewDescriptor::default()),
            depth_view: depth.create_view(&wgpu::TextureViewDescriptor::default()),
            color,
        }
    }

    pub fn aspect(&self) -> f32 {
        self.size[0] as f32 / self.size[1] as f32
    }

    /// Copies the color attachment back as tightly packed RGBA8 rows
    pub fn read_rgba(&self, device: &Device, queue: &Queue) -> Result<Vec<u8>> {
        let [width, height] = self.size;
        let row_bytes = width * 4;
        let padded_row_bytes = row_bytes.div_ceil(wgpu::COPY_BYTES_PER_ROW_ALIGNMENT)
            * wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;

        let staging = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Offscreen Readback"),
            size: padded_row_bytes as u64 * height as u64,
            usage: BufferUsages::MAP_READ | BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Offscreen Readback Encoder"),
        });
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture: &self.color,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &staging,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(padded_row_bytes),
                    rows_per_image: Some(height),
                },
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
        queue.submit(Some(encoder.finish()));

        let (tx, rx) = mpsc::channel();
        staging
            .slice(..)
            .map_async(wgpu::MapMode::Read, move |result| {
                let _ = tx.send(result);
            });
        device
            .poll(wgpu::PollType::Wait)
            .map_err(|e| MorphError::Readback(e.to_string()))?;
        rx.recv()
            .map_err(|e| MorphError::Readback(e.to_string()))?
            .map_err(|e| MorphError::Readback(e.to_string()))?;

        let mut pixels = Vec::with_capacity((row_bytes * height) as usize);
        {
            let data = staging.slice(..).get_mapped_range();
            for row in data.chunks_exact(padded_row_bytes as usize) {
                pixels.extend_from_slice(&row[..row_bytes as usize]);
            }
        }
        staging.unmap();
        Ok(pixels)
    }
}

struct MeshBuffers {
    vertices: Buffer,
    indices: Buffer,
    index_count: u32,
    edges: Buffer,
    edge_count: u32,
}

/// Node positions to draw as points: a node buffer's `pos` field and a count
pub struct PointSource<'a> {
    pub buffer: &'a Buffer,
    pub count: u32,
}

pub struct MeshRenderer {
    device: Arc<Device>,
    queue: Arc<Queue>,
    face_pipeline: RenderPipeline,
    wireframe_pipeline: RenderPipeline,
    point_pipeline: RenderPipeline,
    solid_uniforms: Buffer,
    debug_uniforms: Buffer,
    solid_bind_group: BindGroup,
    debug_bind_group: BindGroup,
    mesh: Option<MeshBuffers>,
    pub camera: Camera,
    pub flags: RenderFlags,
    pub debug_color: [f32; 4],
    pub clear_color: wgpu::Color,
}

impl MeshRenderer {
    pub fn new(device: Arc<Device>, queue: Arc<Queue>) -> Self {
        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Render Bind Group Layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: ShaderStages::VERTEX | ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }],
        });

        let create_uniforms = |label: &str| {
            device.create_buffer(&wgpu::BufferDescriptor {
                label: Some(label),
                size: mem::size_of::<RenderUniforms>() as u64,
                usage: BufferUsages::UNIFORM | BufferUsages::COPY_DST,
                mapped_at_creation: false,
            })
        };
        let solid_uniforms = create_uniforms("Render Uniforms");
        let debug_uniforms = create_uniforms("Debug Render Uniforms");
        let bind = |label: &str, buffer: &Buffer| {
            device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some(label),
                layout: &bind_group_layout,
                entries: &[wgpu::BindGroupEntry {
                    binding: 0,
                    resource: buffer.as_entire_binding(),
                }],
            })
        };
        let solid_bind_group = bind("Render Bind Group", &solid_uniforms);
        let debug_bind_group = bind("Debug Render Bind Group", &debug_uniforms);

        let (face_pipeline, wireframe_pipeline, point_pipeline) =
            Self::create_pipelines(&device, &bind_group_layout);

        Self {
            device,
            queue,
            face_pipeline,
            wireframe_pipeline,
            point_pipeline,
            solid_uniforms,
            debug_uniforms,
            solid_bind_group,
            debug_bind_group,
            mesh: None,
            camera: Camera::default(),
            flags: RenderFlags::default(),
            debug_color: DEFAULT_DEBUG_COLOR,
            clear_color: wgpu::Color {
                r: 0.1,
                g: 0.1,
                b: 0.1,
                a: 1.0,
            },
        }
    }

    fn create_pipelines(
        device: &Device,
        bind_group_layout: &BindGroupLayout,
    ) -> (RenderPipeline, RenderPipeline, RenderPipeline) {
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Render Shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("shaders/render.wgsl").into()),
        });
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Render Pipeline Layout"),
            bind_group_layouts: &[bind_group_layout],
            push_constant_ranges: &[],
        });

        let create = |label: &str,
                      entry_point: &str,
                      buffers: &[VertexBufferLayout],
                      topology: PrimitiveTopology,
                      depth_compare: wgpu::CompareFunction| {
            device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some(label),
                layout: Some(&pipeline_layout),
                vertex: wgpu::VertexState {
                    module: &shader,
                    entry_point: Some(entry_point),
                    buffers,
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                },
                fragment: Some(wgpu::FragmentState {
                    module: &shader,
                    entry_point: Some("fs_main"),
                    targets: &[Some(color_target_state())],
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                }),
                primitive: wgpu::PrimitiveState {
                    topology,
                    strip_index_format: None,
                    front_face: wgpu::FrontFace::Ccw,
                    // growing surfaces fold over, so both sides are drawn
                    cull_mode: None,
                    polygon_mode: wgpu::PolygonMode::Fill,
                    unclipped_depth: false,
                    conservative: false,
                },
                depth_stencil: Some(depth_stencil_state(depth_compare)),
                multisample: wgpu::MultisampleState {
                    count: SAMPLE_COUNT,
                    ..Default::default()
                },
                multiview: None,
                cache: None,
            })
        };

        let faces = create(
            "Face Pipeline",
            "vs_mesh",
            &[MeshVertex::desc()],
            PrimitiveTopology::TriangleList,
            wgpu::CompareFunction::Less,
        );
        let wireframe = create(
            "Wireframe Pipeline",
            "vs_mesh",
            &[MeshVertex::desc()],
            PrimitiveTopology::LineList,
            wgpu::CompareFunction::LessEqual,
        );
        let points = create(
            "Point Pipeline",
            "vs_points",
            &[field_vertex_layout(field::POS)],
            PrimitiveTopology::PointList,
            wgpu::CompareFunction::LessEqual,
        );
        (faces, wireframe, points)
    }

    /// Replaces the mesh drawn by the face and wireframe passes
    pub fn upload_mesh(&mut self, mesh: &MeshData) {
        if mesh.is_empty() {
            self.mesh = None;
            return;
        }
        let edges = mesh.edge_indices();
        let create = |label: &str, contents: &[u8], usage: BufferUsages| {
            self.device
                .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some(label),
                    contents,
                    usage,
                })
        };
        self.mesh = Some(MeshBuffers {
            vertices: create("Mesh Vertices", bytemuck::cast_slice(&mesh.vertices), BufferUsages::VERTEX),
            indices: create("Mesh Indices", bytemuck::cast_slice(&mesh.indices), BufferUsages::INDEX),
            index_count: mesh.indices.len() as u32,
            edges: create("Mesh Edges", bytemuck::cast_slice(&edges), BufferUsages::INDEX),
            edge_count: edges.len() as u32,
        });
    }

    fn write_uniforms(&self, aspect: f32) {
        let base = RenderUniforms {
            mv_matrix: self.camera.view_matrix().to_cols_array_2d(),
            proj_matrix: self.camera.projection_matrix(aspect).to_cols_array_2d(),
            debug_color: self.debug_color,
            debug_render: 0,
            _padding: [0; 3],
        };
        let debug = RenderUniforms {
            debug_render: 1,
            ..base
        };
        self.queue
            .write_buffer(&self.solid_uniforms, 0, bytemuck::bytes_of(&base));
        self.queue
            .write_buffer(&self.debug_uniforms, 0, bytemuck::bytes_of(&debug));
    }

    /// Draws one frame into `target`
    pub fn render(&self, target: &OffscreenTarget, points: Option<PointSource>) {
        self.write_uniforms(target.aspect());

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Render Encoder"),
            });
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Mesh Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &target.color_view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(self.clear_color),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &target.depth_view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            if let Some(mesh) = &self.mesh {
                if self.flags.faces {
                    pass.set_pipeline(&self.face_pipeline);
                    pass.set_bind_group(0, &self.solid_bind_group, &[]);
                    pass.set_vertex_buffer(0, mesh.vertices.slice(..));
                    pass.set_index_buffer(mesh.indices.slice(..), wgpu::IndexFormat::Uint32);
                    pass.draw_indexed(0..mesh.index_count, 0, 0..1);
                }
                if self.flags.wireframe {
                    pass.set_pipeline(&self.wireframe_pipeline);
                    pass.set_bind_group(0, &self.debug_bind_group, &[]);
                    pass.set_vertex_buffer(0, mesh.vertices.slice(..));
                    pass.set_index_buffer(mesh.edges.slice(..), wgpu::IndexFormat::Uint32);
                    pass.draw_indexed(0..mesh.edge_count, 0, 0..1);
                }
            }
            if let Some(points) = points.filter(|p| self.flags.points && p.count > 0) {
                pass.set_pipeline(&self.point_pipeline);
                pass.set_bind_group(0, &self.debug_bind_group, &[]);
                pass.set_vertex_buffer(0, points.buffer.slice(..));
                pass.draw(0..points.count, 0..1);
            }
        }
        self.queue.submit(Some(encoder.finish()));
    }
}
