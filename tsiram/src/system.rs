use std::{
    io::{Read, Write},
    sync::mpsc::{self, Receiver, TryRecvError},
    thread,
    time::Duration,
};

use anyhow::{Context, Result};
use log::*;
use tsiram6502::{
    clock::ClockStop, devices::keyboard::END_OF_TEXT, memory::ADDRESS_SPACE, Computer,
    Diagnostics,
};

use crate::{
    program::Program,
    terminal::{CrLf, TerminalGuard},
};

const LOG_TARGET: &str = "SYS";

/// Everything the front-end lets you switch.
pub struct Settings {
    pub interval: Duration,
    pub diagnostics: Diagnostics,
    pub device_debug: bool,
    pub init_memory_dump: Option<(usize, usize)>,
    /// Stdin is a terminal we can put in raw mode.
    pub raw_terminal: bool,
}

/// Where typed bytes come from.
enum KeySource {
    /// Raw terminal, polled between ticks. Dropping it restores the terminal.
    Terminal(TerminalGuard),
    /// Piped stdin, read on its own thread. `None` once the pipe closes.
    Pipe(Option<Receiver<u8>>),
}

impl KeySource {
    fn next_key(&mut self) -> Option<u8> {
        match self {
            KeySource::Terminal(terminal) => match terminal.poll_key() {
                Ok(key) => key,
                Err(e) => {
                    warn!(target: LOG_TARGET, "Reading the terminal failed: {e}");
                    None
                }
            },
            KeySource::Pipe(keys) => {
                let receiver = keys.as_ref()?;
                match receiver.try_recv() {
                    Ok(key) => Some(key),
                    Err(TryRecvError::Empty) => None,
                    Err(TryRecvError::Disconnected) => {
                        debug!(target: LOG_TARGET, "Input closed, no more keys");
                        *keys = None;
                        None
                    }
                }
            }
        }
    }
}

pub struct System {
    computer: Computer,
    interval: Duration,
    keys: KeySource,
}

impl System {
    pub fn new(settings: Settings, program: Program) -> Result<System> {
        // Raw mode goes on first so the startup log already lands in CRLF.
        let keys = if settings.raw_terminal {
            KeySource::Terminal(TerminalGuard::enter().context("entering raw mode")?)
        } else {
            KeySource::Pipe(Some(spawn_stdin_reader()?))
        };
        let screen: Box<dyn Write> = match keys {
            KeySource::Terminal(_) => Box::new(CrLf(std::io::stdout())),
            KeySource::Pipe(_) => Box::new(std::io::stdout()),
        };
        let mut computer = Computer::new(screen, settings.diagnostics);
        info!(target: LOG_TARGET, "Created");
        info!(
            target: LOG_TARGET,
            "Memory initialized - Addressable space : {ADDRESS_SPACE}"
        );
        info!(
            target: LOG_TARGET,
            "Welcome to the MOS 6502 Emulator! Press 'd' to toggle debug, 'h' for input test, and 'm' for memory dump."
        );
        if settings.device_debug {
            info!(target: "KBD", "Keyboard input configured");
            info!(target: "CON", "Console output configured");
        }
        computer
            .get_keyboard()
            .set_device_debug(settings.device_debug);
        computer
            .load_program(&program.bytes, program.load_address)
            .context("loading program")?;
        if let Some((start, end)) = settings.init_memory_dump {
            computer.get_mmu().memory_dump(start, end);
        }
        return Ok(System {
            computer,
            interval: settings.interval,
            keys,
        });
    }

    /// Run until the program halts or the user hits Ctrl-C.
    pub fn run(&mut self) {
        let halt = self.computer.halt_handle();
        let keys = &mut self.keys;
        let stop = self.computer.run(self.interval, None, |keyboard| {
            while let Some(key) = keys.next_key() {
                if key == END_OF_TEXT {
                    info!(target: LOG_TARGET, "Ctrl-C pressed");
                    halt.request();
                    return;
                }
                keyboard.key_pressed(key as char);
            }
        });
        debug_assert_eq!(stop, ClockStop::Halted);
        info!(target: LOG_TARGET, "Goodbye!");
    }
}

/// Blocking reads from a pipe live on their own thread; the clock only ever
/// polls the channel.
fn spawn_stdin_reader() -> Result<Receiver<u8>> {
    let (sender, receiver) = mpsc::channel();
    thread::Builder::new()
        .name("stdin".to_string())
        .spawn(move || {
            for byte in std::io::stdin().lock().bytes() {
                let Ok(byte) = byte else { break };
                if sender.send(byte).is_err() {
                    break;
                }
            }
        })
        .context("starting the stdin reader")?;
    Ok(receiver)
}
