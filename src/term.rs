use std::collections::VecDeque;
use std::io::{self, stdin, IsTerminal, Read, Write};

use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers as Mod},
    terminal,
};

/// Source of single keystrokes for the `sys` read call.
pub trait Keyboard {
    /// Block until one key is available and return its character code.
    fn read_key(&mut self) -> io::Result<i64>;
}

/// Controlling terminal, read raw and unbuffered.
///
/// Falls back to reading single bytes when stdin is not a terminal, i.e. piped.
#[derive(Debug, Default)]
pub struct Terminal;

impl Keyboard for Terminal {
    fn read_key(&mut self) -> io::Result<i64> {
        if !stdin().is_terminal() {
            let mut buf = [0; 1];
            stdin().read_exact(&mut buf)?;
            return Ok(buf[0] as i64);
        }

        let guard = RawMode::enable()?;
        let key = loop {
            if let Event::Key(event) = event::read()? {
                match key_code(event) {
                    Some(Key::Code(code)) => break code,
                    Some(Key::Interrupt) => {
                        // Generic cleanup, `exit` skips destructors
                        drop(guard);
                        println!();
                        io::stdout().flush()?;
                        std::process::exit(130);
                    }
                    None => continue,
                }
            }
        };
        Ok(key)
    }
}

/// Raw mode for as long as this is alive. Previous mode is restored on drop, including during
/// unwinding.
struct RawMode;

impl RawMode {
    /// Must only be called if terminal is NOT in raw mode.
    fn enable() -> io::Result<Self> {
        debug_assert!(
            !terminal::is_raw_mode_enabled().is_ok_and(|is| is),
            "terminal should not be in raw mode to enable raw mode",
        );
        terminal::enable_raw_mode()?;
        Ok(RawMode)
    }
}

impl Drop for RawMode {
    fn drop(&mut self) {
        let _ = terminal::disable_raw_mode();
    }
}

enum Key {
    Code(i64),
    /// Ctrl+C
    Interrupt,
}

/// Character code a raw terminal would deliver for this key, if any.
fn key_code(event: KeyEvent) -> Option<Key> {
    if matches!(event.kind, KeyEventKind::Release) {
        return None;
    }
    let code = match (event.modifiers, event.code) {
        (Mod::CONTROL, KeyCode::Char('c')) => return Some(Key::Interrupt),
        (_, KeyCode::Enter) => '\r' as i64,
        (_, KeyCode::Tab) => '\t' as i64,
        (_, KeyCode::Backspace) => 0x7f,
        (_, KeyCode::Esc) => 0x1b,
        (Mod::NONE | Mod::SHIFT, KeyCode::Char(ch)) => ch as i64,
        _ => return None,
    };
    Some(Key::Code(code))
}

/// Replays a fixed sequence of keys, then reports end of input.
#[derive(Debug, Default)]
pub struct ScriptedKeys {
    keys: VecDeque<i64>,
}

impl ScriptedKeys {
    pub fn new(keys: impl IntoIterator<Item = i64>) -> Self {
        ScriptedKeys {
            keys: keys.into_iter().collect(),
        }
    }

    pub fn from_text(text: &str) -> Self {
        Self::new(text.chars().map(|ch| ch as i64))
    }
}

impl Keyboard for ScriptedKeys {
    fn read_key(&mut self) -> io::Result<i64> {
        self.keys
            .pop_front()
            .ok_or_else(|| io::Error::from(io::ErrorKind::UnexpectedEof))
    }
}
