use crate::app::Command;
use egui::{Event, Key, TouchPhase};

/// Input that counts as the visitor being present.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activity {
    PointerDown,
    TouchStart,
    Wheel,
    KeyDown,
    MouseMove,
}

pub fn classify(event: &Event) -> Option<Activity> {
    match event {
        Event::PointerButton { pressed: true, .. } => Some(Activity::PointerDown),
        Event::Touch {
            phase: TouchPhase::Start,
            ..
        } => Some(Activity::TouchStart),
        Event::MouseWheel { .. } => Some(Activity::Wheel),
        Event::Key { pressed: true, .. } => Some(Activity::KeyDown),
        Event::PointerMoved(_) => Some(Activity::MouseMove),
        _ => None,
    }
}

/// Keyboard shortcuts for the view controls.
pub fn shortcut(event: &Event) -> Option<Command> {
    let Event::Key {
        key,
        pressed: true,
        repeat: false,
        modifiers,
        ..
    } = event
    else {
        return None;
    };
    if modifiers.ctrl || modifiers.command || modifiers.alt {
        return None;
    }
    match key {
        Key::Plus | Key::Equals => Some(Command::ZoomIn),
        Key::Minus => Some(Command::ZoomOut),
        Key::R => Some(Command::ResetView),
        Key::F => Some(Command::ToggleFullscreen),
        Key::Space => Some(Command::ToggleAutoRotate),
        Key::Escape => Some(Command::DismissNotice),
        _ => None,
    }
}
