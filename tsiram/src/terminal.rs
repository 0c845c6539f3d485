use std::{
    io::{self, Write},
    time::Duration,
};

use anyhow::Result;
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};

/// Raw mode for as long as this lives: keys arrive one at a time, and Ctrl-C
/// shows up as a byte instead of a signal.
pub struct TerminalGuard;

impl TerminalGuard {
    pub fn enter() -> Result<Self> {
        crossterm::terminal::enable_raw_mode()?;
        Ok(TerminalGuard)
    }

    /// Next key already waiting, as a byte. Never blocks.
    pub fn poll_key(&self) -> io::Result<Option<u8>> {
        while event::poll(Duration::ZERO)? {
            if let Event::Key(key) = event::read()? {
                if let Some(byte) = key_byte(key) {
                    return Ok(Some(byte));
                }
            }
        }
        Ok(None)
    }
}

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        let _ = crossterm::terminal::disable_raw_mode();
    }
}

/// What a raw terminal would have sent for this key.
pub fn key_byte(key: KeyEvent) -> Option<u8> {
    if key.kind != KeyEventKind::Press {
        return None;
    }
    match key.code {
        KeyCode::Char(c) if key.modifiers.contains(KeyModifiers::CONTROL) => {
            // Ctrl-A is 0x01 ... Ctrl-C is 0x03
            c.is_ascii_alphabetic()
                .then(|| c.to_ascii_uppercase() as u8 & 0x1F)
        }
        KeyCode::Char(c) if c.is_ascii() => Some(c as u8),
        KeyCode::Enter => Some(b'\r'),
        KeyCode::Tab => Some(b'\t'),
        KeyCode::Backspace => Some(0x7F),
        KeyCode::Esc => Some(0x1B),
        _ => None,
    }
}

/// Raw mode also turns off the terminal's `\n` to `\r\n` translation, so
/// anything line-oriented we print has to do it itself.
pub struct CrLf<W: Write>(pub W);

impl<W: Write> Write for CrLf<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut lines = buf.split(|byte| *byte == b'\n');
        if let Some(first) = lines.next() {
            self.0.write_all(first)?;
        }
        for line in lines {
            self.0.write_all(b"\r\n")?;
            self.0.write_all(line)?;
        }
        Ok(buf.len())
    }
    fn flush(&mut self) -> io::Result<()> {
        self.0.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn press(code: KeyCode, modifiers: KeyModifiers) -> Option<u8> {
        key_byte(KeyEvent::new(code, modifiers))
    }

    #[test]
    fn ctrl_c_is_end_of_text() {
        assert_eq!(press(KeyCode::Char('c'), KeyModifiers::CONTROL), Some(0x03));
        assert_eq!(press(KeyCode::Char('C'), KeyModifiers::CONTROL), Some(0x03));
    }

    #[test]
    fn plain_keys_are_their_ascii_code() {
        assert_eq!(press(KeyCode::Char('d'), KeyModifiers::NONE), Some(b'd'));
        assert_eq!(press(KeyCode::Char('M'), KeyModifiers::SHIFT), Some(b'M'));
        assert_eq!(press(KeyCode::Enter, KeyModifiers::NONE), Some(b'\r'));
        assert_eq!(press(KeyCode::Char('é'), KeyModifiers::NONE), None);
        assert_eq!(press(KeyCode::Up, KeyModifiers::NONE), None);
    }

    #[test]
    fn releases_are_ignored() {
        let mut key = KeyEvent::new(KeyCode::Char('h'), KeyModifiers::NONE);
        key.kind = KeyEventKind::Release;
        assert_eq!(key_byte(key), None);
    }

    #[test]
    fn newlines_gain_a_carriage_return() {
        let mut out = CrLf(Vec::new());
        write!(out, "0x06\nDone\n").unwrap();
        assert_eq!(out.0, b"0x06\r\nDone\r\n");
    }
}
