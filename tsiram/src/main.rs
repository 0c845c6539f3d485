use std::{
    io::{stderr, stdin, IsTerminal},
    path::PathBuf,
    time::Duration,
};

use anyhow::Result;
use clap::Parser;
use tsiram6502::{image::parse_address, Diagnostics};

mod program;
use program::Program;
mod system;
use system::{Settings, System};
mod terminal;
use terminal::CrLf;

#[derive(Parser, Debug)]
#[command(name = "tsiram")]
#[command(about = "A clocked 6502-ish computer with a console and a keyboard", long_about = None)]
struct Args {
    /// Program image to run instead of the built-in greeting (raw bytes or
    /// hex text)
    program: Option<PathBuf>,

    /// Where the program image goes in memory (default 0x0000)
    #[arg(long, value_name = "ADDR", value_parser = parse_address, requires = "program")]
    load_address: Option<u16>,

    /// Milliseconds between clock ticks
    #[arg(long, default_value_t = 200)]
    interval_ms: u64,

    /// Log the CPU status line on every pulse from the start (the 'd' key
    /// toggles it either way)
    #[arg(long, default_value_t = false)]
    status_debug: bool,

    /// Every component logs every clock pulse
    #[arg(long, default_value_t = false)]
    pulse_debug: bool,

    /// Don't log interrupts or key presses
    #[arg(long, default_value_t = false)]
    quiet_interrupts: bool,

    /// Skip the memory dump at startup
    #[arg(long, default_value_t = false)]
    no_init_dump: bool,

    #[arg(long, value_name = "ADDR", default_value = "0x0000", value_parser = parse_address)]
    dump_start: u16,

    #[arg(long, value_name = "ADDR", default_value = "0x0020", value_parser = parse_address)]
    dump_end: u16,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let raw_terminal = stdin().is_terminal();
    // The interactive system talks mostly through the log, so show info by
    // default.
    let mut logger =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if raw_terminal {
        logger.target(env_logger::Target::Pipe(Box::new(CrLf(stderr()))));
    }
    logger.init();
    let program = match &args.program {
        Some(path) => Program::open(path, args.load_address.unwrap_or(0x0000))?,
        None => Program::greeting(),
    };
    let settings = Settings {
        interval: Duration::from_millis(args.interval_ms),
        diagnostics: Diagnostics {
            status: args.status_debug,
            errors: true,
            interrupts: !args.quiet_interrupts,
            pulses: args.pulse_debug,
        },
        device_debug: !args.quiet_interrupts,
        init_memory_dump: (!args.no_init_dump)
            .then_some((args.dump_start as usize, args.dump_end as usize)),
        raw_terminal,
    };
    let mut system = System::new(settings, program)?;
    system.run();
    Ok(())
}
