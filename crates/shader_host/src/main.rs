use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use reload::{ReloadConfig, ReloadRuntime, ReloadStart, StatusBoard};
use shader_host::cli::{Cli, Command};
use shader_host::host::{StatusMirror, ensure_entry};
use shader_host::{
    BrickTextureUploader, GpuContext, HostConfig, ProgramLayout, Renderer, WgslCompiler,
    commands,
};
use tracing_subscriber::EnvFilter;
use winit::application::ApplicationHandler;
use winit::dpi::PhysicalSize;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::window::{Window, WindowAttributes, WindowId};

struct App {
    config: HostConfig,
    reload_config: ReloadConfig,
    entry: PathBuf,
    mirror: StatusMirror,
    window: Option<Arc<Window>>,
    renderer: Option<Renderer>,
    runtime: Option<ReloadRuntime>,
    fatal: Option<anyhow::Error>,
}

impl App {
    fn new(config: HostConfig, reload_config: ReloadConfig, entry: PathBuf) -> Self {
        let mirror = StatusMirror::new(
            StatusBoard::new(),
            config.window.title.clone(),
            config.status_file.clone(),
        );
        Self {
            config,
            reload_config,
            entry,
            mirror,
            window: None,
            renderer: None,
            runtime: None,
            fatal: None,
        }
    }

    fn window_id(&self) -> Option<WindowId> {
        self.window.as_ref().map(|window| window.id())
    }

    fn start(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let window = Arc::new(
            event_loop
                .create_window(
                    WindowAttributes::default()
                        .with_title(self.config.window.title.clone())
                        .with_inner_size(PhysicalSize::new(
                            self.config.window.width,
                            self.config.window.height,
                        )),
                )
                .context("create window")?,
        );

        let gpu = pollster::block_on(GpuContext::new(window.clone()))?;
        let layout = ProgramLayout::new(&gpu.device, &gpu.queue, gpu.surface_format());
        let ReloadStart {
            runtime,
            initial,
            swaps,
        } = ReloadRuntime::start(
            self.reload_config.clone(),
            WgslCompiler::new(layout.clone()),
            BrickTextureUploader::new(layout.clone()),
            &self.entry,
            self.mirror.board().clone(),
        )
        .with_context(|| format!("load {}", self.entry.display()))?;
        tracing::info!(
            target: "shader_host",
            entry = %self.entry.display(),
            watched = ?runtime.watched_directories(),
            "hot reload running"
        );

        self.renderer = Some(Renderer::new(
            gpu,
            layout,
            initial,
            swaps,
            self.mirror.board().clone(),
        ));
        self.runtime = Some(runtime);
        window.request_redraw();
        self.window = Some(window);
        Ok(())
    }

    fn refresh_title(&mut self) {
        let Some(title) = self.mirror.refresh() else {
            return;
        };
        if let Some(window) = self.window.as_ref() {
            window.set_title(&title);
        }
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        event_loop.set_control_flow(ControlFlow::Wait);
        if self.window.is_some() || self.fatal.is_some() {
            return;
        }
        if let Err(error) = self.start(event_loop) {
            self.fatal = Some(error);
            event_loop.exit();
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        window_id: WindowId,
        event: WindowEvent,
    ) {
        if self.window_id() != Some(window_id) {
            return;
        }

        match event {
            WindowEvent::CloseRequested => {
                event_loop.exit();
            }
            WindowEvent::Resized(size) => {
                if let Some(renderer) = self.renderer.as_mut() {
                    renderer.resize(size);
                }
            }
            WindowEvent::RedrawRequested => {
                let Some(renderer) = self.renderer.as_mut() else {
                    return;
                };
                match renderer.render() {
                    Ok(_) => {}
                    Err(wgpu::SurfaceError::Outdated | wgpu::SurfaceError::Lost) => {
                        if let Some(window) = self.window.as_ref() {
                            renderer.resize(window.inner_size());
                            window.request_redraw();
                        }
                    }
                    Err(wgpu::SurfaceError::OutOfMemory) => {
                        self.fatal = Some(anyhow::anyhow!("surface out of memory"));
                        event_loop.exit();
                    }
                    Err(error) => {
                        tracing::debug!(target: "shader_host", %error, "frame skipped");
                        if let Some(window) = self.window.as_ref() {
                            window.request_redraw();
                        }
                    }
                }
                self.refresh_title();
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(window) = self.window.as_ref() {
            window.request_redraw();
        }
    }
}

fn init_tracing(default_filter: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn run(config: HostConfig, entry: Option<PathBuf>) -> Result<()> {
    let reload_config = config.runtime_reload_config()?;
    let entry = entry.unwrap_or_else(|| config.entry.clone());
    ensure_entry(&entry, &reload_config)?;

    let event_loop = EventLoop::new().context("create event loop")?;
    let mut app = App::new(config, reload_config, entry);
    event_loop.run_app(&mut app).context("run event loop")?;

    // Stop the coordinator before the device it compiles against goes away.
    app.runtime.take();
    app.renderer.take();
    match app.fatal.take() {
        Some(error) => Err(error),
        None => Ok(()),
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = HostConfig::load(cli.config.as_deref())?;
    init_tracing(&config.log_filter);

    let reload_config = config.to_reload_config();
    let tolerance = reload_config.entropy_tolerance;
    match cli.command {
        Command::Fold {
            source,
            output,
            order,
            bpp,
        } => {
            reload_config.validate()?;
            let output = commands::fold(&source, output.as_deref(), order, bpp, &reload_config)?;
            println!("{}", output.display());
        }
        Command::Unfold { brick, output } => {
            commands::unfold(&brick, output.as_deref(), tolerance)?;
        }
        Command::Inspect { brick, json } => {
            println!("{}", commands::inspect(&brick, json, tolerance)?);
        }
        Command::ExportPng { brick, output } => {
            commands::export_png(&brick, &output)?;
        }
        Command::ImportPng { brick, png, output } => {
            let output = commands::import_png(&brick, &png, output.as_deref(), tolerance)?;
            println!("{}", output.display());
        }
        Command::Run { entry } => run(config, entry)?,
    }
    Ok(())
}
