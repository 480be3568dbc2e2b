use anyhow::{anyhow, Result};
use enigo::{Coordinate, Direction, Enigo, Keyboard, Mouse, Settings};

use crate::models::Key;

use super::InputDevice;

const MODIFIERS: [enigo::Key; 4] = [
    enigo::Key::Control,
    enigo::Key::Alt,
    enigo::Key::Shift,
    enigo::Key::Meta,
];

/// Real keyboard/mouse injection. A fresh `Enigo` per call keeps this type
/// `Send` regardless of the platform backend.
#[derive(Debug, Default)]
pub struct EnigoInput;

impl EnigoInput {
    pub fn new() -> Self {
        Self
    }

    fn enigo() -> Result<Enigo> {
        Enigo::new(&Settings::default())
            .map_err(|e| anyhow!("failed to initialize input backend: {e}"))
    }
}

fn to_enigo(key: Key) -> Result<enigo::Key> {
    let mapped = match key {
        Key::Enter => enigo::Key::Return,
        Key::Tab => enigo::Key::Tab,
        Key::Escape => enigo::Key::Escape,
        Key::Backspace => enigo::Key::Backspace,
        Key::Delete => enigo::Key::Delete,
        Key::Space => enigo::Key::Space,
        Key::Up => enigo::Key::UpArrow,
        Key::Down => enigo::Key::DownArrow,
        Key::Left => enigo::Key::LeftArrow,
        Key::Right => enigo::Key::RightArrow,
        Key::Home => enigo::Key::Home,
        Key::End => enigo::Key::End,
        Key::PageUp => enigo::Key::PageUp,
        Key::PageDown => enigo::Key::PageDown,
        Key::Control => enigo::Key::Control,
        Key::Alt => enigo::Key::Alt,
        Key::Shift => enigo::Key::Shift,
        Key::Meta => enigo::Key::Meta,
        Key::Char(c) => enigo::Key::Unicode(c),
        Key::F(n) => match n {
            1 => enigo::Key::F1,
            2 => enigo::Key::F2,
            3 => enigo::Key::F3,
            4 => enigo::Key::F4,
            5 => enigo::Key::F5,
            6 => enigo::Key::F6,
            7 => enigo::Key::F7,
            8 => enigo::Key::F8,
            9 => enigo::Key::F9,
            10 => enigo::Key::F10,
            11 => enigo::Key::F11,
            12 => enigo::Key::F12,
            other => return Err(anyhow!("unsupported function key F{other}")),
        },
    };
    Ok(mapped)
}

impl InputDevice for EnigoInput {
    fn press_key(&mut self, key: Key) -> Result<()> {
        let mut enigo = Self::enigo()?;
        enigo
            .key(to_enigo(key)?, Direction::Click)
            .map_err(|e| anyhow!("failed to press {key}: {e}"))
    }

    fn hotkey(&mut self, keys: &[Key]) -> Result<()> {
        let Some((last, held)) = keys.split_last() else {
            return Ok(());
        };
        let mut enigo = Self::enigo()?;
        let mut pressed = Vec::with_capacity(held.len());

        let result = (|| -> Result<()> {
            for key in held {
                let mapped = to_enigo(*key)?;
                enigo
                    .key(mapped, Direction::Press)
                    .map_err(|e| anyhow!("failed to hold {key}: {e}"))?;
                pressed.push(mapped);
            }
            enigo
                .key(to_enigo(*last)?, Direction::Click)
                .map_err(|e| anyhow!("failed to press {last}: {e}"))
        })();

        for key in pressed.into_iter().rev() {
            let _ = enigo.key(key, Direction::Release);
        }
        result
    }

    fn type_text(&mut self, text: &str) -> Result<()> {
        let mut enigo = Self::enigo()?;
        enigo
            .text(text)
            .map_err(|e| anyhow!("failed to type text: {e}"))
    }

    fn move_pointer(&mut self, x: i32, y: i32) -> Result<()> {
        let mut enigo = Self::enigo()?;
        enigo
            .move_mouse(x, y, Coordinate::Abs)
            .map_err(|e| anyhow!("failed to move pointer: {e}"))
    }

    fn release_all(&mut self) -> Result<()> {
        let mut enigo = Self::enigo()?;
        for key in MODIFIERS {
            let _ = enigo.key(key, Direction::Release);
        }
        Ok(())
    }
}
