use std::sync::Arc;

use log::{error, info};
use winit::{
    application::ApplicationHandler,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop},
    window::{Window, WindowId},
};

use crate::config::{ParticleLayout, SimConfig};
use crate::error::{EngineError, GpuError};
use crate::gpu::{GpuContext, GpuPipeline, RenderTarget};
use crate::input::{KeyAction, KeyCommandMap, PointerTracker};
use crate::orchestrator::{FrameOrchestrator, FramePipeline, PipelineBuilder};
use crate::particle::{ColorParticle, TypedParticle};

type Orchestrator = FrameOrchestrator<Box<dyn FramePipeline>>;

/// Open a window and run until it is closed.
pub fn run(config: SimConfig) -> Result<(), EngineError> {
    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = App::new(config);
    event_loop.run_app(&mut app)?;
    match app.fatal.take() {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

pub struct App {
    config: SimConfig,
    window: Option<Arc<Window>>,
    orchestrator: Option<Orchestrator>,
    keys: KeyCommandMap,
    pointer: PointerTracker,
    shown_fps: f32,
    /// Error that ended the event loop.
    fatal: Option<EngineError>,
}

impl App {
    pub fn new(config: SimConfig) -> Self {
        let pointer = PointerTracker::new(config.display.width, config.display.height);
        Self {
            config,
            window: None,
            orchestrator: None,
            keys: KeyCommandMap::new(),
            pointer,
            shown_fps: 0.0,
            fatal: None,
        }
    }

    fn init(&mut self, event_loop: &ActiveEventLoop) -> Result<(), EngineError> {
        let window_attrs = Window::default_attributes()
            .with_title("textswarm")
            .with_inner_size(winit::dpi::PhysicalSize::new(
                self.config.display.width,
                self.config.display.height,
            ));
        let window = Arc::new(event_loop.create_window(window_attrs)?);
        let size = window.inner_size();

        let instance = GpuContext::new_instance();
        let surface = instance
            .create_surface(Arc::clone(&window))
            .map_err(GpuError::from)?;
        let ctx = Arc::new(pollster::block_on(GpuContext::new(instance, Some(&surface)))?);
        let surface = Arc::new(surface);

        let config = self.config.clone().with_window_size(size.width, size.height);
        let builder_config = config.clone();
        let builder: PipelineBuilder<Box<dyn FramePipeline>> = Box::new(move |request| {
            let target = RenderTarget::surface(&ctx, Arc::clone(&surface), request.width, request.height)?;
            let ctx = Arc::clone(&ctx);
            let count = request.particle_count;
            let pipeline: Box<dyn FramePipeline> = match builder_config.layout {
                ParticleLayout::Color => Box::new(GpuPipeline::<ColorParticle>::new(
                    ctx,
                    target,
                    &builder_config,
                    count,
                )?),
                ParticleLayout::Typed => Box::new(GpuPipeline::<TypedParticle>::new(
                    ctx,
                    target,
                    &builder_config,
                    count,
                )?),
            };
            Ok(pipeline)
        });

        let mut orchestrator = FrameOrchestrator::new(&config, builder);
        orchestrator.start()?;
        self.pointer.set_window_size(size.width, size.height);
        self.orchestrator = Some(orchestrator);
        self.window = Some(window);
        self.update_title();
        self.request_redraw();
        Ok(())
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, e: EngineError) {
        error!("{}", e);
        if let Some(orchestrator) = &mut self.orchestrator {
            orchestrator.stop();
        }
        self.fatal = Some(e);
        event_loop.exit();
    }

    fn request_redraw(&self) {
        let wants = self
            .orchestrator
            .as_ref()
            .is_some_and(|o| o.redraw_requested());
        if let (true, Some(window)) = (wants, &self.window) {
            window.request_redraw();
        }
    }

    fn update_title(&self) {
        let (Some(window), Some(orchestrator)) = (&self.window, &self.orchestrator) else {
            return;
        };
        let mut title = format!(
            "textswarm - {} particles - {:.0} FPS",
            orchestrator.particle_label(),
            orchestrator.fps()
        );
        if !orchestrator.is_running() {
            title.push_str(" - paused");
        }
        if !self.keys.draft().is_empty() {
            title.push_str(&format!(" - text: {}_", self.keys.draft()));
        }
        window.set_title(&title);
    }

    fn redraw(&mut self, event_loop: &ActiveEventLoop) {
        let Some(orchestrator) = &mut self.orchestrator else {
            return;
        };
        match orchestrator.frame() {
            Ok(_) => {
                if orchestrator.fps() != self.shown_fps {
                    self.shown_fps = orchestrator.fps();
                    self.update_title();
                }
                self.request_redraw();
            }
            Err(EngineError::Gpu(GpuError::Surface(wgpu::SurfaceError::OutOfMemory))) => {
                error!("Surface out of memory, exiting");
                event_loop.exit();
            }
            Err(e) => self.fail(event_loop, e),
        }
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_none() {
            if let Err(e) = self.init(event_loop) {
                self.fail(event_loop, e);
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        if self.pointer.handle_event(&event) {
            if let Some(orchestrator) = &mut self.orchestrator {
                orchestrator.set_pointer(self.pointer.state(self.config.display.view_scale));
            }
        }

        match event {
            WindowEvent::CloseRequested => {
                if let Some(orchestrator) = &mut self.orchestrator {
                    if let Err(e) = orchestrator.teardown() {
                        error!("{}", e);
                    }
                }
                info!("Window closed");
                event_loop.exit();
            }
            WindowEvent::Resized(physical_size) => {
                if let Some(orchestrator) = &mut self.orchestrator {
                    if let Err(e) = orchestrator.resize(physical_size.width, physical_size.height) {
                        self.fail(event_loop, e);
                    }
                }
            }
            WindowEvent::KeyboardInput { .. } => match self.keys.handle_event(&event) {
                Some(KeyAction::Command(command)) => {
                    if let Some(orchestrator) = &mut self.orchestrator {
                        if let Err(e) = orchestrator.apply(command) {
                            self.fail(event_loop, e);
                            return;
                        }
                    }
                    self.update_title();
                    self.request_redraw();
                }
                Some(KeyAction::DraftEdited) => self.update_title(),
                Some(KeyAction::Exit) => event_loop.exit(),
                None => {}
            },
            WindowEvent::RedrawRequested => self.redraw(event_loop),
            _ => {}
        }
    }
}
