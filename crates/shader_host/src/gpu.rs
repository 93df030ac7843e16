//! wgpu backends for the reload coordinator.
//!
//! Every hot-loaded program is a fragment shader drawn over a fullscreen triangle. All
//! programs share one bind group layout: the brick texture at binding 0, a sampler at
//! binding 1 and the frame uniform at binding 2.

use std::sync::Arc;

use brick::Brick;
use reload::{CompileError, ProgramCompiler, TextureUploader, UploadError};

use crate::wgsl::{FRAGMENT_ENTRY, FULLSCREEN_VERTEX, VERTEX_ENTRY, check_program};

#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct FrameUniform {
    pub time: f32,
    pub entropy: f32,
    pub resolution: [f32; 2],
    pub brick_side: f32,
    pub original_size: f32,
    pub _pad: [f32; 2],
}

/// Texture format matching a brick's pixel packing, if the device can sample it.
pub fn texture_format_for(bytes_per_pixel: u8) -> Option<wgpu::TextureFormat> {
    match bytes_per_pixel {
        1 => Some(wgpu::TextureFormat::R8Unorm),
        2 => Some(wgpu::TextureFormat::Rg8Unorm),
        4 => Some(wgpu::TextureFormat::Rgba8Unorm),
        _ => None,
    }
}

/// Largest grid order whose side fits the default `max_texture_dimension_2d` (8192).
pub const MAX_RENDER_ORDER: u8 = 13;

/// Device objects shared by every program generation.
#[derive(Debug, Clone)]
pub struct ProgramLayout {
    device: wgpu::Device,
    queue: wgpu::Queue,
    bind_group_layout: wgpu::BindGroupLayout,
    pipeline_layout: wgpu::PipelineLayout,
    vertex_module: wgpu::ShaderModule,
    sampler: wgpu::Sampler,
    uniform_buffer: wgpu::Buffer,
    target_format: wgpu::TextureFormat,
}

impl ProgramLayout {
    pub fn new(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        target_format: wgpu::TextureFormat,
    ) -> Self {
        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("shader_host.program.bind_group_layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
            ],
        });
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("shader_host.program.pipeline_layout"),
            bind_group_layouts: &[&bind_group_layout],
            immediate_size: 0,
        });
        let vertex_module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("shader_host.fullscreen"),
            source: wgpu::ShaderSource::Wgsl(FULLSCREEN_VERTEX.into()),
        });
        // Nearest sampling keeps individual bytes visible as pixels.
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("shader_host.brick.sampler"),
            mag_filter: wgpu::FilterMode::Nearest,
            min_filter: wgpu::FilterMode::Nearest,
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            ..Default::default()
        });
        let uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("shader_host.frame_uniform"),
            size: std::mem::size_of::<FrameUniform>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        Self {
            device: device.clone(),
            queue: queue.clone(),
            bind_group_layout,
            pipeline_layout,
            vertex_module,
            sampler,
            uniform_buffer,
            target_format,
        }
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    pub fn write_uniform(&self, uniform: &FrameUniform) {
        self.queue
            .write_buffer(&self.uniform_buffer, 0, bytemuck::bytes_of(uniform));
    }
}

pub struct WgslCompiler {
    layout: ProgramLayout,
}

impl WgslCompiler {
    pub fn new(layout: ProgramLayout) -> Self {
        Self { layout }
    }
}

impl ProgramCompiler for WgslCompiler {
    type Program = wgpu::RenderPipeline;

    fn compile(&mut self, source: &str) -> Result<wgpu::RenderPipeline, CompileError> {
        check_program(source)?;

        let device = &self.layout.device;
        let error_scope = device.push_error_scope(wgpu::ErrorFilter::Validation);
        let fragment_module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("shader_host.program"),
            source: wgpu::ShaderSource::Wgsl(source.into()),
        });
        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("shader_host.program.pipeline"),
            layout: Some(&self.layout.pipeline_layout),
            vertex: wgpu::VertexState {
                module: &self.layout.vertex_module,
                entry_point: Some(VERTEX_ENTRY),
                compilation_options: Default::default(),
                buffers: &[],
            },
            fragment: Some(wgpu::FragmentState {
                module: &fragment_module,
                entry_point: Some(FRAGMENT_ENTRY),
                compilation_options: Default::default(),
                targets: &[Some(wgpu::ColorTargetState {
                    format: self.layout.target_format,
                    blend: None,
                    write_mask: wgpu::ColorWrites::ALL,
                })],
            }),
            primitive: wgpu::PrimitiveState::default(),
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview_mask: None,
            cache: None,
        });
        if let Some(error) = pollster::block_on(error_scope.pop()) {
            return Err(CompileError::new(error.to_string()));
        }
        Ok(pipeline)
    }
}

#[derive(Debug)]
pub struct BrickTexture {
    pub texture: wgpu::Texture,
    pub bind_group: wgpu::BindGroup,
    pub side: u32,
    pub entropy: f64,
    pub original_size: u64,
}

pub struct BrickTextureUploader {
    layout: ProgramLayout,
}

impl BrickTextureUploader {
    pub fn new(layout: ProgramLayout) -> Self {
        Self { layout }
    }
}

impl TextureUploader for BrickTextureUploader {
    type Texture = BrickTexture;

    fn upload(&mut self, brick: &Brick) -> Result<BrickTexture, UploadError> {
        let bytes_per_pixel = brick.header.bytes_per_pixel;
        let format = texture_format_for(bytes_per_pixel).ok_or_else(|| {
            UploadError::new(format!(
                "no texture format for {bytes_per_pixel} bytes per pixel"
            ))
        })?;
        let side = brick
            .side()
            .ok_or_else(|| UploadError::new("brick order out of range"))?;
        let max_side = self.layout.device.limits().max_texture_dimension_2d;
        if side > max_side {
            return Err(UploadError::new(format!(
                "brick side {side} exceeds device limit {max_side}"
            )));
        }

        let device = &self.layout.device;
        let error_scope = device.push_error_scope(wgpu::ErrorFilter::Validation);
        let size = wgpu::Extent3d {
            width: side,
            height: side,
            depth_or_array_layers: 1,
        };
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("shader_host.brick"),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        self.layout.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            &brick.payload,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(side * u32::from(bytes_per_pixel)),
                rows_per_image: Some(side),
            },
            size,
        );
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("shader_host.brick.bind_group"),
            layout: &self.layout.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(&self.layout.sampler),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: self.layout.uniform_buffer.as_entire_binding(),
                },
            ],
        });
        if let Some(error) = pollster::block_on(error_scope.pop()) {
            return Err(UploadError::new(error.to_string()));
        }

        Ok(BrickTexture {
            texture,
            bind_group,
            side,
            entropy: brick.header.entropy,
            original_size: brick.header.original_size,
        })
    }
}

/// Route errors outside any error scope to the log instead of the default panic.
pub fn log_uncaptured_errors(device: &wgpu::Device) {
    device.on_uncaptured_error(Arc::new(|error| {
        tracing::error!(target: "shader_host::gpu", %error, "uncaptured wgpu error");
    }));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_device_queue() -> Option<(wgpu::Device, wgpu::Queue)> {
        pollster::block_on(async {
            let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
                backends: wgpu::Backends::all(),
                ..Default::default()
            });
            let adapter = instance
                .request_adapter(&wgpu::RequestAdapterOptions {
                    power_preference: wgpu::PowerPreference::HighPerformance,
                    compatible_surface: None,
                    force_fallback_adapter: false,
                })
                .await
                .ok()?;
            let limits = adapter.limits();
            adapter
                .request_device(&wgpu::DeviceDescriptor {
                    label: Some("shader_host tests"),
                    required_features: wgpu::Features::empty(),
                    required_limits: limits,
                    experimental_features: wgpu::ExperimentalFeatures::disabled(),
                    memory_hints: wgpu::MemoryHints::Performance,
                    trace: wgpu::Trace::Off,
                })
                .await
                .ok()
        })
    }

    fn layout() -> Option<ProgramLayout> {
        let Some((device, queue)) = create_device_queue() else {
            eprintln!("no wgpu adapter available; skipping");
            return None;
        };
        Some(ProgramLayout::new(
            &device,
            &queue,
            wgpu::TextureFormat::Rgba8UnormSrgb,
        ))
    }

    #[test]
    fn frame_uniform_matches_wgsl_layout() {
        assert_eq!(std::mem::size_of::<FrameUniform>(), 32);
    }

    #[test]
    fn packing_maps_to_texture_formats() {
        assert_eq!(texture_format_for(1), Some(wgpu::TextureFormat::R8Unorm));
        assert_eq!(texture_format_for(2), Some(wgpu::TextureFormat::Rg8Unorm));
        assert_eq!(texture_format_for(4), Some(wgpu::TextureFormat::Rgba8Unorm));
        assert_eq!(texture_format_for(3), None);
        assert_eq!(texture_format_for(16), None);
    }

    #[test]
    fn render_order_bound_matches_default_limits() {
        assert_eq!(
            1u32 << MAX_RENDER_ORDER,
            wgpu::Limits::default().max_texture_dimension_2d
        );
    }

    #[test]
    fn default_program_compiles_on_device() {
        let Some(layout) = layout() else {
            return;
        };
        let mut compiler = WgslCompiler::new(layout);
        compiler
            .compile(crate::wgsl::DEFAULT_PROGRAM)
            .unwrap_or_else(|error| panic!("{error}"));
    }

    #[test]
    fn mismatched_bindings_fail_pipeline_creation() {
        let Some(layout) = layout() else {
            return;
        };
        let mut compiler = WgslCompiler::new(layout);
        let source = "@group(0) @binding(2) var<storage, read_write> data: array<f32>;\n\
                      @fragment fn fs_main() -> @location(0) vec4<f32> { return vec4<f32>(data[0]); }";
        assert!(compiler.compile(source).is_err());
    }

    #[test]
    fn brick_uploads_as_square_texture() {
        let Some(layout) = layout() else {
            return;
        };
        let mut uploader = BrickTextureUploader::new(layout);
        let brick = brick::encode(b"Hello, Geometry!\n", 4, 4).expect("fits");
        let texture = uploader.upload(&brick).expect("upload");
        assert_eq!(texture.side, 16);
        assert_eq!(texture.texture.format(), wgpu::TextureFormat::Rgba8Unorm);
        assert_eq!(texture.original_size, 17);

        let wide = brick::encode(b"abc", 2, 8).expect("fits");
        assert!(uploader.upload(&wide).is_err());
    }
}
