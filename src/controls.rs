//! User-facing state of a running simulation and its transition rules.
//!
//! All flags live in [`Controls`]. Every change goes through
//! [`Controls::apply`], which enforces the mode rules and reports what the
//! orchestrator has to do about it as a [`ControlEffect`].

use std::time::{SystemTime, UNIX_EPOCH};

use log::warn;

pub const MIN_PARTICLES: u32 = 10_000;
pub const MAX_PARTICLES: u32 = 2_000_000;
pub const DEFAULT_PARTICLES: u32 = 250_000;
/// Increment applied by one count step.
pub const COUNT_STEP: u32 = 50_000;

/// Seconds between rotation words.
pub const DEFAULT_ROTATION_INTERVAL: f32 = 2.0;

/// Where the displayed text comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TextMode {
    /// Text only changes on request.
    #[default]
    Static,
    /// Cycle through a word list.
    Rotate,
    /// Current UTC time, `HH:MM:SS`.
    Clock,
}

/// A request from the keyboard, the CLI or a test.
#[derive(Debug, Clone, PartialEq)]
pub enum ControlCommand {
    /// Move the particle count by this many [`COUNT_STEP`]s.
    StepCount(i32),
    /// Request an absolute particle count (clamped).
    SetCount(u32),
    SetAttraction(bool),
    ToggleAttraction,
    SetTextMode(TextMode),
    /// Display this text (normalized; ignored when blank).
    SetText(String),
    TogglePause,
}

/// What the orchestrator must do after a command was applied.
#[derive(Debug, Clone, PartialEq)]
pub enum ControlEffect {
    /// Nothing beyond the state change.
    None,
    /// Tear down and rebuild the whole pipeline with this many particles.
    Rebuild(u32),
    /// Regenerate the text field for this text.
    Regenerate(String),
    /// The text source changed; pull the first text from it.
    TextSource(TextMode),
    Stop,
    Resume,
}

/// Clamp a requested particle count into the supported range.
pub fn clamp_particle_count(count: u32) -> u32 {
    count.clamp(MIN_PARTICLES, MAX_PARTICLES)
}

/// Short display label: `"250K"`, `"1.5M"`.
pub fn particle_label(count: u32) -> String {
    if count >= 1_000_000 {
        format!("{:.1}M", count as f64 / 1_000_000.0)
    } else if count >= 1_000 {
        format!("{:.0}K", count as f64 / 1_000.0)
    } else {
        count.to_string()
    }
}

/// Trim and upper-case a text request. `None` when nothing is left.
pub fn normalize_text(text: &str) -> Option<String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_uppercase())
    }
}

/// Flags and values of a running simulation.
#[derive(Debug, Clone, PartialEq)]
pub struct Controls {
    running: bool,
    attraction_enabled: bool,
    text_mode: TextMode,
    particle_count: u32,
    text: String,
}

impl Controls {
    /// Stopped, attraction on, static text.
    pub fn new(particle_count: u32, text: &str) -> Self {
        Self {
            running: false,
            attraction_enabled: true,
            text_mode: TextMode::Static,
            particle_count: clamp_particle_count(particle_count),
            text: normalize_text(text).unwrap_or_else(|| "A".to_string()),
        }
    }

    #[inline]
    pub fn running(&self) -> bool {
        self.running
    }

    #[inline]
    pub fn attraction_enabled(&self) -> bool {
        self.attraction_enabled
    }

    #[inline]
    pub fn text_mode(&self) -> TextMode {
        self.text_mode
    }

    #[inline]
    pub fn particle_count(&self) -> u32 {
        self.particle_count
    }

    /// Text currently shown (already normalized).
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn label(&self) -> String {
        particle_label(self.particle_count)
    }

    /// Attraction gain to feed the step, zero while attraction is off.
    pub fn attraction_strength(&self, configured: f32) -> f32 {
        if self.attraction_enabled {
            configured
        } else {
            0.0
        }
    }

    pub(crate) fn set_running(&mut self, running: bool) {
        self.running = running;
    }

    /// Record text produced by a rotation or clock source.
    pub(crate) fn set_source_text(&mut self, text: String) {
        self.text = text;
    }

    /// Apply one command.
    pub fn apply(&mut self, command: ControlCommand) -> ControlEffect {
        match command {
            ControlCommand::StepCount(steps) => {
                let target = self.particle_count as i64 + steps as i64 * COUNT_STEP as i64;
                let target = target.clamp(MIN_PARTICLES as i64, MAX_PARTICLES as i64) as u32;
                self.change_count(target)
            }
            ControlCommand::SetCount(count) => self.change_count(clamp_particle_count(count)),
            ControlCommand::SetAttraction(enabled) => self.set_attraction(enabled),
            ControlCommand::ToggleAttraction => self.set_attraction(!self.attraction_enabled),
            ControlCommand::SetTextMode(mode) => {
                if mode == self.text_mode {
                    return ControlEffect::None;
                }
                self.text_mode = mode;
                if mode != TextMode::Static {
                    self.attraction_enabled = true;
                }
                ControlEffect::TextSource(mode)
            }
            ControlCommand::SetText(text) => match normalize_text(&text) {
                Some(text) => {
                    // Explicit text sticks, so any automatic source stops.
                    self.text_mode = TextMode::Static;
                    if text == self.text {
                        return ControlEffect::None;
                    }
                    self.text = text.clone();
                    ControlEffect::Regenerate(text)
                }
                None => {
                    warn!("Ignoring blank text request");
                    ControlEffect::None
                }
            },
            ControlCommand::TogglePause => {
                self.running = !self.running;
                if self.running {
                    ControlEffect::Resume
                } else {
                    ControlEffect::Stop
                }
            }
        }
    }

    fn change_count(&mut self, count: u32) -> ControlEffect {
        if count == self.particle_count {
            return ControlEffect::None;
        }
        self.particle_count = count;
        ControlEffect::Rebuild(count)
    }

    fn set_attraction(&mut self, enabled: bool) -> ControlEffect {
        self.attraction_enabled = enabled;
        if !enabled && self.text_mode != TextMode::Static {
            self.text_mode = TextMode::Static;
        }
        ControlEffect::None
    }
}

impl Default for Controls {
    fn default() -> Self {
        Self::new(DEFAULT_PARTICLES, "RUST")
    }
}

/// Cycles through a word list on a fixed interval.
#[derive(Debug, Clone)]
pub struct TextRotation {
    words: Vec<String>,
    interval: f32,
    index: usize,
    since_change: f32,
}

impl TextRotation {
    /// Blank words are dropped; the rest are normalized.
    pub fn new<I, S>(words: I, interval: f32) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            words: words
                .into_iter()
                .filter_map(|w| normalize_text(w.as_ref()))
                .collect(),
            interval: interval.max(0.1),
            index: 0,
            since_change: 0.0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    pub fn interval(&self) -> f32 {
        self.interval
    }

    /// Word shown right now; restarts the interval.
    pub fn current(&mut self) -> Option<&str> {
        self.since_change = 0.0;
        self.words.get(self.index).map(String::as_str)
    }

    /// Accumulate `seconds` and return the next word once the interval passed.
    pub fn advance(&mut self, seconds: f32) -> Option<&str> {
        if self.words.is_empty() {
            return None;
        }
        self.since_change += seconds.max(0.0);
        if self.since_change < self.interval {
            return None;
        }
        self.since_change = 0.0;
        self.index = (self.index + 1) % self.words.len();
        self.words.get(self.index).map(String::as_str)
    }
}

impl Default for TextRotation {
    fn default() -> Self {
        Self::new(["RUST", "WGPU", "SWARM", "TEXT"], DEFAULT_ROTATION_INTERVAL)
    }
}

/// `HH:MM:SS` in UTC for the given instant.
pub fn clock_text(now: SystemTime) -> String {
    let secs = now
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    let day = secs % 86_400;
    format!("{:02}:{:02}:{:02}", day / 3600, (day / 60) % 60, day % 60)
}

/// Emits the clock text whenever the displayed second changes.
#[derive(Debug, Clone, Default)]
pub struct ClockSource {
    last: Option<String>,
}

impl ClockSource {
    pub fn poll(&mut self, now: SystemTime) -> Option<String> {
        let text = clock_text(now);
        if self.last.as_deref() == Some(text.as_str()) {
            return None;
        }
        self.last = Some(text.clone());
        Some(text)
    }

    /// Forget the last emitted text so the next poll always emits.
    pub fn reset(&mut self) {
        self.last = None;
    }
}
