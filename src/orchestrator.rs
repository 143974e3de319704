//! The frame loop: simulate, render, then refresh the text field.
//!
//! [`FrameOrchestrator`] is backend-agnostic. It drives anything that
//! implements [`FramePipeline`] (the wgpu pipeline in a window, the CPU
//! pipeline in tests) and owns the pieces of state that outlive a pipeline:
//! [`Controls`], the [`FrameClock`], the text sources and the pointer.
//!
//! A pipeline is built for one particle count. Changing the count drops it
//! and asks the builder for a new one.

use std::time::SystemTime;

use log::{debug, info};

use crate::buffers::BufferRoles;
use crate::config::SimConfig;
use crate::controls::{ClockSource, ControlCommand, ControlEffect, Controls, TextMode, TextRotation};
use crate::error::EngineError;
use crate::field::TextUpdate;
use crate::physics::{PointerState, StepInputs};
use crate::time::{FrameClock, Tick};

/// One simulate + render backend for a fixed particle count.
pub trait FramePipeline {
    fn particle_count(&self) -> u32;

    /// Roles the next step will use.
    fn roles(&self) -> BufferRoles;

    /// Advance every particle by one step and swap the buffer roles.
    fn simulate(&mut self, inputs: &StepInputs) -> Result<(), EngineError>;

    /// Draw the latest state. `Ok(false)` when the frame was skipped.
    fn render(&mut self) -> Result<bool, EngineError>;

    /// Regenerate the attraction field, blocking until it is ready.
    fn update_text(&mut self, text: &str) -> Result<TextUpdate, EngineError>;

    /// Block until all submitted work has finished.
    fn sync(&mut self) -> Result<(), EngineError> {
        Ok(())
    }

    fn resize(&mut self, width: u32, height: u32) -> Result<(), EngineError>;
}

impl<T: FramePipeline + ?Sized> FramePipeline for Box<T> {
    fn particle_count(&self) -> u32 {
        (**self).particle_count()
    }

    fn roles(&self) -> BufferRoles {
        (**self).roles()
    }

    fn simulate(&mut self, inputs: &StepInputs) -> Result<(), EngineError> {
        (**self).simulate(inputs)
    }

    fn render(&mut self) -> Result<bool, EngineError> {
        (**self).render()
    }

    fn update_text(&mut self, text: &str) -> Result<TextUpdate, EngineError> {
        (**self).update_text(text)
    }

    fn sync(&mut self) -> Result<(), EngineError> {
        (**self).sync()
    }

    fn resize(&mut self, width: u32, height: u32) -> Result<(), EngineError> {
        (**self).resize(width, height)
    }
}

/// What the builder is asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineRequest {
    pub particle_count: u32,
    pub width: u32,
    pub height: u32,
}

/// Creates a pipeline for a request; called again on every rebuild.
pub type PipelineBuilder<P> = Box<dyn FnMut(&PipelineRequest) -> Result<P, EngineError>>;

/// Result of one call to [`FrameOrchestrator::frame`].
#[derive(Debug, Clone, PartialEq)]
pub enum FrameOutcome {
    /// The loop is stopped; nothing ran.
    Skipped,
    Rendered {
        frame: u64,
        /// Roles used by this frame's step.
        roles: BufferRoles,
        /// False when the surface had no texture to draw into.
        presented: bool,
        /// Text the field was regenerated for during this frame.
        regenerated: Option<String>,
    },
}

pub struct FrameOrchestrator<P: FramePipeline> {
    builder: PipelineBuilder<P>,
    pipeline: Option<P>,
    controls: Controls,
    clock: FrameClock,
    rotation: TextRotation,
    clock_source: ClockSource,
    pointer: PointerState,
    attraction_strength: f32,
    size: (u32, u32),
    redraw_requested: bool,
}

impl<P: FramePipeline> FrameOrchestrator<P> {
    /// Stopped orchestrator; nothing is built until [`start`](Self::start).
    pub fn new(config: &SimConfig, builder: PipelineBuilder<P>) -> Self {
        let mut clock = FrameClock::new();
        clock.pause();
        Self {
            builder,
            pipeline: None,
            controls: Controls::new(config.particle_count, &config.text),
            clock,
            rotation: TextRotation::new(&config.rotation_words, config.rotation_interval),
            clock_source: ClockSource::default(),
            pointer: PointerState::Inactive,
            attraction_strength: config.physics.attraction_strength,
            size: (config.display.width, config.display.height),
            redraw_requested: false,
        }
    }

    pub fn controls(&self) -> &Controls {
        &self.controls
    }

    pub fn pipeline(&self) -> Option<&P> {
        self.pipeline.as_ref()
    }

    pub fn pipeline_mut(&mut self) -> Option<&mut P> {
        self.pipeline.as_mut()
    }

    #[inline]
    pub fn is_running(&self) -> bool {
        self.controls.running()
    }

    /// Whether the window should schedule another redraw.
    #[inline]
    pub fn redraw_requested(&self) -> bool {
        self.redraw_requested
    }

    pub fn fps(&self) -> f32 {
        self.clock.fps()
    }

    pub fn particle_label(&self) -> String {
        self.controls.label()
    }

    pub fn set_pointer(&mut self, pointer: PointerState) {
        self.pointer = pointer;
    }

    /// Build the pipeline if needed, then run.
    pub fn start(&mut self) -> Result<(), EngineError> {
        if self.pipeline.is_none() {
            self.build(self.controls.particle_count())?;
        }
        if !self.controls.running() {
            info!("Starting with {} particles", self.controls.label());
        }
        self.resume();
        Ok(())
    }

    /// Stop stepping. Safe to call any number of times.
    pub fn stop(&mut self) {
        if self.controls.running() {
            info!("Stopped after {} frames", self.clock.frame());
        }
        self.controls.set_running(false);
        self.clock.pause();
        self.redraw_requested = false;
    }

    /// Stop and release the pipeline.
    pub fn teardown(&mut self) -> Result<(), EngineError> {
        self.stop();
        if let Some(mut pipeline) = self.pipeline.take() {
            pipeline.sync()?;
            debug!("Released pipeline of {} particles", pipeline.particle_count());
        }
        Ok(())
    }

    fn resume(&mut self) {
        self.controls.set_running(true);
        self.clock.resume();
        self.redraw_requested = true;
    }

    fn build(&mut self, count: u32) -> Result<(), EngineError> {
        let request = PipelineRequest {
            particle_count: count,
            width: self.size.0,
            height: self.size.1,
        };
        let mut pipeline = (self.builder)(&request)?;
        pipeline.update_text(self.controls.text())?;
        info!("Built pipeline for {} particles", pipeline.particle_count());
        self.pipeline = Some(pipeline);
        Ok(())
    }

    fn rebuild(&mut self, count: u32) -> Result<(), EngineError> {
        let was_running = self.controls.running();
        self.teardown()?;
        self.build(count)?;
        if was_running {
            self.resume();
        }
        Ok(())
    }

    /// Run one frame on the wall clock.
    pub fn frame(&mut self) -> Result<FrameOutcome, EngineError> {
        if !self.controls.running() {
            return Ok(FrameOutcome::Skipped);
        }
        let tick = self.clock.tick();
        self.run_frame(tick)
    }

    /// Run one frame with an explicit raw delta in seconds.
    pub fn frame_with_delta(&mut self, raw_seconds: f32) -> Result<FrameOutcome, EngineError> {
        if !self.controls.running() {
            return Ok(FrameOutcome::Skipped);
        }
        let tick = self.clock.advance(raw_seconds);
        self.run_frame(tick)
    }

    fn run_frame(&mut self, tick: Tick) -> Result<FrameOutcome, EngineError> {
        let inputs = StepInputs::new(tick.delta.seconds(), tick.elapsed)
            .with_pointer(self.pointer)
            .with_attraction(self.controls.attraction_strength(self.attraction_strength));

        let pipeline = self.pipeline.as_mut().ok_or(EngineError::NotBuilt)?;
        let roles = pipeline.roles();
        pipeline.simulate(&inputs)?;
        let presented = pipeline.render()?;

        if let Some(fps) = tick.fps_report {
            info!("{} particles at {:.1} FPS", self.controls.label(), fps);
        }

        let regenerated = self.poll_text_source(tick.raw_seconds)?;
        self.redraw_requested = self.controls.running();

        Ok(FrameOutcome::Rendered {
            frame: tick.frame,
            roles,
            presented,
            regenerated,
        })
    }

    /// Pull the next text from the active source, if it has one.
    fn poll_text_source(&mut self, seconds: f32) -> Result<Option<String>, EngineError> {
        let next = match self.controls.text_mode() {
            TextMode::Static => None,
            TextMode::Rotate => self.rotation.advance(seconds).map(str::to_string),
            TextMode::Clock => self.clock_source.poll(SystemTime::now()),
        };
        match next {
            Some(text) => self.regenerate(text).map(Some),
            None => Ok(None),
        }
    }

    fn regenerate(&mut self, text: String) -> Result<String, EngineError> {
        if let Some(pipeline) = self.pipeline.as_mut() {
            if let TextUpdate::Regenerated { .. } = pipeline.update_text(&text)? {
                self.controls.set_source_text(text.clone());
            }
        }
        Ok(text)
    }

    /// Apply a command and carry out its effect.
    pub fn apply(&mut self, command: ControlCommand) -> Result<ControlEffect, EngineError> {
        debug!("Control command {:?}", command);
        let effect = self.controls.apply(command);
        match &effect {
            ControlEffect::None => {}
            ControlEffect::Rebuild(count) => {
                info!("Rebuilding for {} particles", count);
                self.rebuild(*count)?;
            }
            ControlEffect::Regenerate(text) => {
                self.regenerate(text.clone())?;
            }
            ControlEffect::TextSource(mode) => {
                let first = match mode {
                    TextMode::Static => None,
                    TextMode::Rotate => self.rotation.current().map(str::to_string),
                    TextMode::Clock => {
                        self.clock_source.reset();
                        self.clock_source.poll(SystemTime::now())
                    }
                };
                if let Some(text) = first {
                    self.regenerate(text)?;
                }
            }
            ControlEffect::Stop => self.stop(),
            ControlEffect::Resume => self.start()?,
        }
        Ok(effect)
    }

    pub fn resize(&mut self, width: u32, height: u32) -> Result<(), EngineError> {
        if width == 0 || height == 0 {
            return Ok(());
        }
        self.size = (width, height);
        if let Some(pipeline) = self.pipeline.as_mut() {
            pipeline.resize(width, height)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffers::PingPong;
    use std::cell::RefCell;
    use std::rc::Rc;

    /// Records calls instead of doing work.
    #[derive(Default)]
    struct Log {
        builds: Vec<u32>,
        texts: Vec<String>,
        steps: usize,
    }

    struct FakePipeline {
        count: u32,
        roles: PingPong<()>,
        log: Rc<RefCell<Log>>,
    }

    impl FramePipeline for FakePipeline {
        fn particle_count(&self) -> u32 {
            self.count
        }

        fn roles(&self) -> BufferRoles {
            self.roles.roles()
        }

        fn simulate(&mut self, _inputs: &StepInputs) -> Result<(), EngineError> {
            self.log.borrow_mut().steps += 1;
            self.roles.swap();
            Ok(())
        }

        fn render(&mut self) -> Result<bool, EngineError> {
            Ok(true)
        }

        fn update_text(&mut self, text: &str) -> Result<TextUpdate, EngineError> {
            if text.trim().is_empty() {
                return Ok(TextUpdate::Rejected);
            }
            self.log.borrow_mut().texts.push(text.to_string());
            Ok(TextUpdate::Regenerated { font_size: 10.0 })
        }

        fn resize(&mut self, _width: u32, _height: u32) -> Result<(), EngineError> {
            Ok(())
        }
    }

    fn orchestrator() -> (FrameOrchestrator<FakePipeline>, Rc<RefCell<Log>>) {
        let log = Rc::new(RefCell::new(Log::default()));
        let shared = Rc::clone(&log);
        let config = SimConfig::new().with_particle_count(10_000).with_text("hi");
        let builder: PipelineBuilder<FakePipeline> = Box::new(move |request| {
            shared.borrow_mut().builds.push(request.particle_count);
            Ok(FakePipeline {
                count: request.particle_count,
                roles: PingPong::new((), ()),
                log: Rc::clone(&shared),
            })
        });
        (FrameOrchestrator::new(&config, builder), log)
    }

    #[test]
    fn test_frames_skip_until_started() {
        let (mut orch, log) = orchestrator();
        assert_eq!(orch.frame_with_delta(0.016).unwrap(), FrameOutcome::Skipped);
        assert!(orch.pipeline().is_none());
        orch.start().unwrap();
        assert!(orch.redraw_requested());
        assert!(matches!(
            orch.frame_with_delta(0.016).unwrap(),
            FrameOutcome::Rendered { frame: 1, .. }
        ));
        let log = log.borrow();
        assert_eq!(log.builds, vec![10_000]);
        assert_eq!(log.texts, vec!["HI".to_string()]);
        assert_eq!(log.steps, 1);
    }

    #[test]
    fn test_stop_is_idempotent_and_clears_redraw() {
        let (mut orch, log) = orchestrator();
        orch.start().unwrap();
        orch.stop();
        orch.stop();
        assert!(!orch.is_running());
        assert!(!orch.redraw_requested());
        assert_eq!(orch.frame_with_delta(0.016).unwrap(), FrameOutcome::Skipped);
        assert_eq!(log.borrow().steps, 0);
    }

    #[test]
    fn test_roles_alternate_across_frames() {
        let (mut orch, _log) = orchestrator();
        orch.start().unwrap();
        let mut reads = Vec::new();
        for _ in 0..4 {
            if let FrameOutcome::Rendered { roles, .. } = orch.frame_with_delta(0.01).unwrap() {
                reads.push(roles.read);
            }
        }
        assert_eq!(reads, vec![0, 1, 0, 1]);
    }

    #[test]
    fn test_count_change_rebuilds_and_resumes() {
        let (mut orch, log) = orchestrator();
        orch.start().unwrap();
        let effect = orch.apply(ControlCommand::StepCount(1)).unwrap();
        assert_eq!(effect, ControlEffect::Rebuild(60_000));
        assert!(orch.is_running());
        assert_eq!(orch.pipeline().map(|p| p.particle_count()), Some(60_000));
        let log = log.borrow();
        assert_eq!(log.builds, vec![10_000, 60_000]);
        // The new pipeline gets the current text.
        assert_eq!(log.texts, vec!["HI".to_string(), "HI".to_string()]);
    }

    #[test]
    fn test_rebuild_while_stopped_stays_stopped() {
        let (mut orch, _log) = orchestrator();
        orch.start().unwrap();
        orch.stop();
        orch.apply(ControlCommand::SetCount(20_000)).unwrap();
        assert!(!orch.is_running());
        assert_eq!(orch.pipeline().map(|p| p.particle_count()), Some(20_000));
    }

    #[test]
    fn test_set_text_regenerates_and_blank_is_ignored() {
        let (mut orch, log) = orchestrator();
        orch.start().unwrap();
        orch.apply(ControlCommand::SetText("  swarm ".into())).unwrap();
        orch.apply(ControlCommand::SetText("   ".into())).unwrap();
        assert_eq!(orch.controls().text(), "SWARM");
        assert_eq!(log.borrow().texts, vec!["HI".to_string(), "SWARM".to_string()]);
    }

    #[test]
    fn test_rotation_advances_on_interval() {
        let (mut orch, log) = orchestrator();
        orch.start().unwrap();
        orch.apply(ControlCommand::SetTextMode(TextMode::Rotate)).unwrap();
        // Entering rotate mode shows the first word.
        assert_eq!(orch.controls().text(), "RUST");
        let mut regenerated = Vec::new();
        for _ in 0..5 {
            if let FrameOutcome::Rendered {
                regenerated: Some(text),
                ..
            } = orch.frame_with_delta(0.5).unwrap()
            {
                regenerated.push(text);
            }
        }
        assert_eq!(regenerated, vec!["WGPU".to_string()]);
        assert_eq!(log.borrow().texts.last().map(String::as_str), Some("WGPU"));
    }

    #[test]
    fn test_toggle_pause_routes_through_controls() {
        let (mut orch, _log) = orchestrator();
        orch.start().unwrap();
        assert_eq!(orch.apply(ControlCommand::TogglePause).unwrap(), ControlEffect::Stop);
        assert!(!orch.redraw_requested());
        assert_eq!(orch.apply(ControlCommand::TogglePause).unwrap(), ControlEffect::Resume);
        assert!(orch.is_running());
        assert!(orch.redraw_requested());
    }

    #[test]
    fn test_frame_after_teardown_needs_restart() {
        let (mut orch, log) = orchestrator();
        orch.start().unwrap();
        orch.teardown().unwrap();
        assert!(orch.pipeline().is_none());
        assert_eq!(orch.frame_with_delta(0.016).unwrap(), FrameOutcome::Skipped);
        orch.start().unwrap();
        assert_eq!(log.borrow().builds.len(), 2);
    }
}
