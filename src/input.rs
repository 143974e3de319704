//! Pointer and keyboard input.
//!
//! [`PointerTracker`] turns cursor and touch events into a simulation-space
//! [`PointerState`]. [`KeyCommandMap`] turns key presses into
//! [`ControlCommand`]s, collecting typed characters into a text draft that is
//! submitted with Enter.

use glam::Vec2;
use winit::event::{ElementState, TouchPhase, WindowEvent};
use winit::keyboard::{KeyCode as WinitKeyCode, PhysicalKey};

use crate::controls::{ControlCommand, TextMode};
use crate::physics::PointerState;

/// Longest text draft accepted from the keyboard.
pub const MAX_DRAFT_LEN: usize = 20;

/// Keys the simulation reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyCode {
    /// A letter, digit or space that goes into the text draft.
    Char(char),
    F1,
    F2,
    F3,
    Up,
    Down,
    Enter,
    Escape,
    Tab,
    Backspace,
    Other,
}

impl From<WinitKeyCode> for KeyCode {
    fn from(key: WinitKeyCode) -> Self {
        use WinitKeyCode as W;
        let letter = match key {
            W::KeyA => 'A',
            W::KeyB => 'B',
            W::KeyC => 'C',
            W::KeyD => 'D',
            W::KeyE => 'E',
            W::KeyF => 'F',
            W::KeyG => 'G',
            W::KeyH => 'H',
            W::KeyI => 'I',
            W::KeyJ => 'J',
            W::KeyK => 'K',
            W::KeyL => 'L',
            W::KeyM => 'M',
            W::KeyN => 'N',
            W::KeyO => 'O',
            W::KeyP => 'P',
            W::KeyQ => 'Q',
            W::KeyR => 'R',
            W::KeyS => 'S',
            W::KeyT => 'T',
            W::KeyU => 'U',
            W::KeyV => 'V',
            W::KeyW => 'W',
            W::KeyX => 'X',
            W::KeyY => 'Y',
            W::KeyZ => 'Z',
            W::Digit0 => '0',
            W::Digit1 => '1',
            W::Digit2 => '2',
            W::Digit3 => '3',
            W::Digit4 => '4',
            W::Digit5 => '5',
            W::Digit6 => '6',
            W::Digit7 => '7',
            W::Digit8 => '8',
            W::Digit9 => '9',
            W::Space => ' ',
            W::F1 => return KeyCode::F1,
            W::F2 => return KeyCode::F2,
            W::F3 => return KeyCode::F3,
            W::ArrowUp => return KeyCode::Up,
            W::ArrowDown => return KeyCode::Down,
            W::Enter | W::NumpadEnter => return KeyCode::Enter,
            W::Escape => return KeyCode::Escape,
            W::Tab => return KeyCode::Tab,
            W::Backspace => return KeyCode::Backspace,
            _ => return KeyCode::Other,
        };
        KeyCode::Char(letter)
    }
}

/// Result of a key press.
#[derive(Debug, Clone, PartialEq)]
pub enum KeyAction {
    Command(ControlCommand),
    /// The draft changed; nothing to apply yet.
    DraftEdited,
    Exit,
}

/// Keyboard bindings plus the pending text draft.
///
/// `P` pauses while the draft is empty and is typed as a letter otherwise.
#[derive(Debug, Default)]
pub struct KeyCommandMap {
    draft: String,
}

impl KeyCommandMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Text typed since the last submit.
    pub fn draft(&self) -> &str {
        &self.draft
    }

    pub fn handle_key(&mut self, key: KeyCode) -> Option<KeyAction> {
        let action = match key {
            KeyCode::Up => KeyAction::Command(ControlCommand::StepCount(1)),
            KeyCode::Down => KeyAction::Command(ControlCommand::StepCount(-1)),
            KeyCode::Tab => KeyAction::Command(ControlCommand::ToggleAttraction),
            KeyCode::F1 => KeyAction::Command(ControlCommand::SetTextMode(TextMode::Rotate)),
            KeyCode::F2 => KeyAction::Command(ControlCommand::SetTextMode(TextMode::Clock)),
            KeyCode::F3 => KeyAction::Command(ControlCommand::SetTextMode(TextMode::Static)),
            KeyCode::Escape => KeyAction::Exit,
            KeyCode::Char('P') if self.draft.is_empty() => {
                KeyAction::Command(ControlCommand::TogglePause)
            }
            KeyCode::Char(c) => {
                if self.draft.chars().count() >= MAX_DRAFT_LEN {
                    return None;
                }
                self.draft.push(c);
                KeyAction::DraftEdited
            }
            KeyCode::Backspace => {
                self.draft.pop()?;
                KeyAction::DraftEdited
            }
            KeyCode::Enter => {
                let text = std::mem::take(&mut self.draft);
                KeyAction::Command(ControlCommand::SetText(text))
            }
            KeyCode::Other => return None,
        };
        Some(action)
    }

    /// Map a winit event; only key presses produce actions.
    pub fn handle_event(&mut self, event: &WindowEvent) -> Option<KeyAction> {
        match event {
            WindowEvent::KeyboardInput { event, .. } if event.state == ElementState::Pressed => {
                match event.physical_key {
                    PhysicalKey::Code(code) => self.handle_key(KeyCode::from(code)),
                    PhysicalKey::Unidentified(_) => None,
                }
            }
            _ => None,
        }
    }
}

/// Convert pointer NDC to simulation space.
///
/// Inverse of the render transform `clip = (x / aspect, y) * view_scale`.
pub fn ndc_to_simulation(ndc: Vec2, aspect: f32, view_scale: f32) -> Vec2 {
    let scale = if view_scale.abs() > f32::EPSILON { view_scale } else { 1.0 };
    Vec2::new(ndc.x * aspect / scale, ndc.y / scale)
}

/// Pointer position from cursor and touch events.
#[derive(Debug)]
pub struct PointerTracker {
    ndc: Option<Vec2>,
    window_size: (u32, u32),
}

impl PointerTracker {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            ndc: None,
            window_size: (width, height),
        }
    }

    pub fn set_window_size(&mut self, width: u32, height: u32) {
        self.window_size = (width, height);
    }

    /// Pointer in normalized device coordinates, `None` when it left the window.
    pub fn ndc(&self) -> Option<Vec2> {
        self.ndc
    }

    /// Width over height of the window.
    pub fn aspect(&self) -> f32 {
        let (w, h) = self.window_size;
        if h == 0 {
            1.0
        } else {
            w as f32 / h as f32
        }
    }

    pub fn state(&self, view_scale: f32) -> PointerState {
        match self.ndc {
            Some(ndc) => PointerState::Active(ndc_to_simulation(ndc, self.aspect(), view_scale)),
            None => PointerState::Inactive,
        }
    }

    fn set_pixel(&mut self, x: f64, y: f64) {
        let (w, h) = self.window_size;
        if w > 0 && h > 0 {
            self.ndc = Some(Vec2::new(
                (x as f32 / w as f32) * 2.0 - 1.0,
                1.0 - (y as f32 / h as f32) * 2.0,
            ));
        }
    }

    /// Returns true when the event changed the pointer.
    pub fn handle_event(&mut self, event: &WindowEvent) -> bool {
        match event {
            WindowEvent::CursorMoved { position, .. } => {
                self.set_pixel(position.x, position.y);
                true
            }
            WindowEvent::CursorLeft { .. } => {
                self.ndc = None;
                true
            }
            WindowEvent::Touch(touch) => {
                match touch.phase {
                    TouchPhase::Started | TouchPhase::Moved => {
                        self.set_pixel(touch.location.x, touch.location.y)
                    }
                    TouchPhase::Ended | TouchPhase::Cancelled => self.ndc = None,
                }
                true
            }
            WindowEvent::Resized(size) => {
                self.set_window_size(size.width, size.height);
                false
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ndc_to_simulation_undoes_aspect_and_scale() {
        let p = ndc_to_simulation(Vec2::new(1.0, -0.5), 2.0, 1.0);
        assert_eq!(p, Vec2::new(2.0, -0.5));
        let q = ndc_to_simulation(Vec2::new(0.5, 0.5), 1.0, 0.5);
        assert_eq!(q, Vec2::new(1.0, 1.0));
    }

    #[test]
    fn test_pointer_center_and_leave() {
        let mut tracker = PointerTracker::new(800, 600);
        assert_eq!(tracker.state(1.0), PointerState::Inactive);
        tracker.set_pixel(400.0, 300.0);
        let ndc = tracker.ndc().unwrap();
        assert!(ndc.x.abs() < 1e-6 && ndc.y.abs() < 1e-6);
        assert!(matches!(tracker.state(1.0), PointerState::Active(_)));
        tracker.ndc = None;
        assert_eq!(tracker.state(1.0), PointerState::Inactive);
    }

    #[test]
    fn test_key_bindings() {
        let mut keys = KeyCommandMap::new();
        assert_eq!(
            keys.handle_key(KeyCode::Up),
            Some(KeyAction::Command(ControlCommand::StepCount(1)))
        );
        assert_eq!(
            keys.handle_key(KeyCode::F2),
            Some(KeyAction::Command(ControlCommand::SetTextMode(TextMode::Clock)))
        );
        assert_eq!(
            keys.handle_key(KeyCode::Char('P')),
            Some(KeyAction::Command(ControlCommand::TogglePause))
        );
        assert_eq!(keys.handle_key(KeyCode::Escape), Some(KeyAction::Exit));
        assert_eq!(keys.handle_key(KeyCode::Other), None);
    }

    #[test]
    fn test_text_draft_submit() {
        let mut keys = KeyCommandMap::new();
        for c in ['H', 'I', 'P'] {
            assert_eq!(keys.handle_key(KeyCode::Char(c)), Some(KeyAction::DraftEdited));
        }
        keys.handle_key(KeyCode::Backspace);
        assert_eq!(keys.draft(), "HI");
        assert_eq!(
            keys.handle_key(KeyCode::Enter),
            Some(KeyAction::Command(ControlCommand::SetText("HI".into())))
        );
        assert_eq!(keys.draft(), "");
        assert_eq!(keys.handle_key(KeyCode::Backspace), None);
    }

    #[test]
    fn test_draft_length_limit() {
        let mut keys = KeyCommandMap::new();
        keys.handle_key(KeyCode::Char('A'));
        for _ in 0..40 {
            keys.handle_key(KeyCode::Char('B'));
        }
        assert_eq!(keys.draft().len(), MAX_DRAFT_LEN);
    }

    #[test]
    fn test_winit_key_mapping() {
        assert_eq!(KeyCode::from(WinitKeyCode::KeyQ), KeyCode::Char('Q'));
        assert_eq!(KeyCode::from(WinitKeyCode::Digit7), KeyCode::Char('7'));
        assert_eq!(KeyCode::from(WinitKeyCode::ArrowDown), KeyCode::Down);
        assert_eq!(KeyCode::from(WinitKeyCode::Home), KeyCode::Other);
    }
}
