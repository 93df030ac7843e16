use std::sync::Arc;
use std::time::Instant;

use pipeline_slot::{ActivePair, FrameSwapper, PipelineSlot, SwapDecision, SwapDecisionReason};
use reload::{StatusBoard, SwapReceiver};
use reload_protocol::SwapRequest;
use thiserror::Error;
use winit::dpi::PhysicalSize;
use winit::window::Window;

use crate::gpu::{BrickTexture, FrameUniform, ProgramLayout, log_uncaptured_errors};

pub type HostPair = ActivePair<wgpu::RenderPipeline, BrickTexture>;
pub type HostSwapRequest = SwapRequest<wgpu::RenderPipeline, BrickTexture>;

#[derive(Debug, Error)]
pub enum GpuInitError {
    #[error("failed to create surface: {0}")]
    CreateSurface(#[from] wgpu::CreateSurfaceError),
    #[error("no suitable adapter: {0}")]
    RequestAdapter(#[from] wgpu::RequestAdapterError),
    #[error("failed to open device: {0}")]
    RequestDevice(#[from] wgpu::RequestDeviceError),
    #[error("surface reports no supported formats")]
    NoSurfaceFormat,
}

/// Device, queue and configured surface for one window.
pub struct GpuContext {
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    surface: wgpu::Surface<'static>,
    surface_config: wgpu::SurfaceConfiguration,
}

impl GpuContext {
    pub async fn new(window: Arc<Window>) -> Result<Self, GpuInitError> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });
        let surface = instance.create_surface(window.clone())?;
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await?;

        let limits = adapter.limits();
        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("shader_host"),
                required_features: wgpu::Features::empty(),
                required_limits: limits,
                experimental_features: wgpu::ExperimentalFeatures::disabled(),
                memory_hints: wgpu::MemoryHints::Performance,
                trace: wgpu::Trace::Off,
            })
            .await?;
        log_uncaptured_errors(&device);

        let caps = surface.get_capabilities(&adapter);
        let surface_format = caps
            .formats
            .iter()
            .copied()
            .find(|format| format.is_srgb())
            .or_else(|| caps.formats.first().copied())
            .ok_or(GpuInitError::NoSurfaceFormat)?;
        let alpha_mode = caps
            .alpha_modes
            .first()
            .copied()
            .unwrap_or(wgpu::CompositeAlphaMode::Auto);

        let mut size = window.inner_size();
        size.width = size.width.max(1);
        size.height = size.height.max(1);
        let surface_config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width: size.width,
            height: size.height,
            present_mode: wgpu::PresentMode::Fifo,
            alpha_mode,
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &surface_config);
        tracing::info!(
            target: "shader_host::gpu",
            adapter = %adapter.get_info().name,
            format = ?surface_format,
            "surface configured"
        );

        Ok(Self {
            device,
            queue,
            surface,
            surface_config,
        })
    }

    pub fn surface_format(&self) -> wgpu::TextureFormat {
        self.surface_config.format
    }
}

fn into_pair(request: HostSwapRequest) -> HostPair {
    ActivePair {
        generation: request.generation,
        label: request.path.display().to_string(),
        program: request.program,
        texture: request.texture,
    }
}

/// Draws the active pair every frame and swaps in new pairs only between frames.
pub struct Renderer {
    gpu: GpuContext,
    layout: ProgramLayout,
    swapper: FrameSwapper<wgpu::RenderPipeline, BrickTexture>,
    swaps: SwapReceiver<wgpu::RenderPipeline, BrickTexture>,
    status: StatusBoard,
    started: Instant,
    next_frame_id: u64,
    /// Newest request not yet applied, kept across frames the surface refused.
    pending: Option<HostPair>,
}

impl Renderer {
    pub fn new(
        gpu: GpuContext,
        layout: ProgramLayout,
        initial: HostSwapRequest,
        swaps: SwapReceiver<wgpu::RenderPipeline, BrickTexture>,
        status: StatusBoard,
    ) -> Self {
        let initial = into_pair(initial);
        status.mark_active(initial.generation);
        tracing::info!(
            target: "shader_host::renderer",
            generation = initial.generation,
            path = %initial.label,
            "initial program active"
        );
        let (slot, _reader) = PipelineSlot::new(initial);
        Self {
            gpu,
            layout,
            swapper: FrameSwapper::new(slot),
            swaps,
            status,
            started: Instant::now(),
            next_frame_id: 0,
            pending: None,
        }
    }

    pub fn resize(&mut self, size: PhysicalSize<u32>) {
        self.gpu.surface_config.width = size.width.max(1);
        self.gpu.surface_config.height = size.height.max(1);
        self.gpu
            .surface
            .configure(&self.gpu.device, &self.gpu.surface_config);
    }

    pub fn active_generation(&self) -> u64 {
        self.swapper.active().generation
    }

    fn collect_pending(&mut self) {
        let Some(request) = self.swaps.drain_latest() else {
            return;
        };
        let candidate = into_pair(request);
        self.pending = match self.pending.take() {
            Some(held) if held.generation > candidate.generation => Some(held),
            _ => Some(candidate),
        };
    }

    pub fn render(&mut self) -> Result<SwapDecision, wgpu::SurfaceError> {
        self.collect_pending();
        let frame = self.gpu.surface.get_current_texture()?;
        let frame_view = frame
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        let frame_id = self.next_frame_id;
        self.next_frame_id += 1;
        let decision = self.swapper.begin_frame(frame_id, self.pending.take());
        match decision.reason {
            SwapDecisionReason::Applied => {
                tracing::info!(
                    target: "shader_host::renderer",
                    frame = frame_id,
                    generation = decision.active_generation,
                    "program swapped"
                );
                self.status.mark_active(decision.active_generation);
            }
            SwapDecisionReason::Stale => {
                tracing::debug!(
                    target: "shader_host::renderer",
                    frame = frame_id,
                    candidate = ?decision.candidate_generation,
                    "stale program ignored"
                );
            }
            SwapDecisionReason::NoCandidate => {}
        }

        let active = self.swapper.active();
        self.layout.write_uniform(&FrameUniform {
            time: self.started.elapsed().as_secs_f32(),
            entropy: active.texture.entropy as f32,
            resolution: [
                self.gpu.surface_config.width as f32,
                self.gpu.surface_config.height as f32,
            ],
            brick_side: active.texture.side as f32,
            original_size: active.texture.original_size as f32,
            _pad: [0.0; 2],
        });

        let mut encoder = self
            .gpu
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("shader_host.frame"),
            });
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("shader_host.program"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &frame_view,
                    resolve_target: None,
                    depth_slice: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
                multiview_mask: None,
            });
            pass.set_pipeline(&active.program);
            pass.set_bind_group(0, &active.texture.bind_group, &[]);
            pass.draw(0..3, 0..1);
        }
        self.gpu.queue.submit(Some(encoder.finish()));
        frame.present();
        drop(active);

        let released = self.swapper.end_frame(frame_id);
        if !released.is_empty() {
            tracing::debug!(
                target: "shader_host::renderer",
                frame = frame_id,
                count = released.len(),
                "retired programs released"
            );
        }
        Ok(decision)
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        self.swapper.release_all();
    }
}
