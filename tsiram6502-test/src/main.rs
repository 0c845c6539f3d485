use std::{fs, path::PathBuf};

use anyhow::{bail, Context, Result};
use clap::Parser;
use log::*;
use tsiram6502::{
    clock::ClockStop,
    image::{decode_image, parse_address},
    Computer, Diagnostics,
};

#[derive(Parser, Debug)]
#[command(name = "tsiram6502-test")]
#[command(about = "Run a program image on the bare machine, no timer, printing CPU state every tick", long_about = None)]
struct Args {
    /// Program image, raw bytes or hex text
    program: PathBuf,

    /// Where the image goes in memory
    #[arg(long, value_name = "ADDR", default_value = "0x0000", value_parser = parse_address)]
    load_address: u16,

    /// Initial program counter, if not the load address
    #[arg(long, value_name = "ADDR", value_parser = parse_address)]
    start: Option<u16>,

    /// Give up after this many ticks
    #[arg(long, default_value_t = 100_000)]
    max_ticks: u64,

    /// Dump memory from here when the run ends
    #[arg(long, value_name = "ADDR", value_parser = parse_address)]
    dump_start: Option<u16>,

    /// End of the final dump (inclusive)
    #[arg(long, value_name = "ADDR", default_value = "0x0020", value_parser = parse_address)]
    dump_end: u16,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();
    let contents = fs::read(&args.program)
        .with_context(|| format!("reading program image {}", args.program.display()))?;
    let program = decode_image(&contents);
    info!(
        "{} bytes from {}, loading at ${:04X}",
        program.len(),
        args.program.display(),
        args.load_address
    );

    let diagnostics = Diagnostics {
        interrupts: true,
        ..Diagnostics::default()
    };
    let mut computer = Computer::new(Box::new(std::io::stdout()), diagnostics);
    computer
        .load_program(&program, args.load_address)
        .context("loading program")?;
    computer
        .get_cpu_mut()
        .set_pc(args.start.unwrap_or(args.load_address));

    let mut stop = ClockStop::TickLimit;
    for _ in 0..args.max_ticks {
        println!("{:?}", *computer.get_cpu());
        computer.tick();
        if computer.is_halted() {
            stop = ClockStop::Halted;
            break;
        }
    }

    if let Some(dump_start) = args.dump_start {
        for line in computer
            .get_mmu()
            .dump_lines(dump_start as usize, args.dump_end as usize)
        {
            println!("{line}");
        }
    }

    let cpu = computer.get_cpu();
    match stop {
        ClockStop::Halted => {
            println!(
                "Halted at ${:04X} after {} ticks. {cpu:?}",
                cpu.get_pc().wrapping_sub(1),
                computer.get_ticks()
            );
            Ok(())
        }
        ClockStop::TickLimit => bail!(
            "no BRK within {} ticks, stopped at ${:04X}",
            args.max_ticks,
            cpu.get_pc()
        ),
    }
}
