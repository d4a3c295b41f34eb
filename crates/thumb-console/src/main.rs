//! CLI entry point for the thumb-console firmware runner.

mod board;

use std::env;
use std::ffi::OsString;
use std::fs;
use std::path::PathBuf;
use std::time::Instant;

use thumb_core::{Event, Fault, RunOutcome};

const USAGE_TEXT: &str = "\
Usage: thumb-console <command> [options]

Commands:
  run <firmware.bin> [--chunk N]         Run a firmware image until it
                                         exits via service call 0 or faults
  fork-check <firmware.bin> [--steps N]  Run the image twice through a
                                         mid-run fork and compare state

Options:
  --chunk <N>   Steps per resume slice for run (default 10000)
  --steps <N>   Total step budget per side for fork-check (default 100000)
  -h, --help    Show this help message

Service calls:
  svc #0  exit; r0 is the process exit code
  svc #1  print r0 as a decimal line
  svc #2  print the low byte of r0 as a character
  svc #3  reply with the tick count through the response buffer; r0 is
          left pointing at the response header
";

const DEFAULT_CHUNK: u64 = 10_000;
const DEFAULT_FORK_STEPS: u64 = 100_000;

#[derive(Debug, PartialEq, Eq)]
enum Command {
    Run(RunArgs),
    ForkCheck(ForkCheckArgs),
}

#[derive(Debug, PartialEq, Eq)]
struct RunArgs {
    firmware: PathBuf,
    chunk: u64,
}

#[derive(Debug, PartialEq, Eq)]
struct ForkCheckArgs {
    firmware: PathBuf,
    steps: u64,
}

#[derive(Debug)]
enum ParseResult {
    Command(Command),
    Help,
}

fn parse_args(mut args: impl Iterator<Item = OsString>) -> Result<ParseResult, String> {
    let first = args.next().ok_or_else(|| "missing command".to_string())?;

    if first == "--help" || first == "-h" {
        return Ok(ParseResult::Help);
    }

    let command_str = first.to_string_lossy().to_string();
    match command_str.as_str() {
        "run" => parse_run_args(args).map(Command::Run).map(ParseResult::Command),
        "fork-check" => parse_fork_check_args(args)
            .map(Command::ForkCheck)
            .map(ParseResult::Command),
        other => Err(format!("unknown command: {other}")),
    }
}

fn parse_count(name: &str, value: Option<OsString>) -> Result<u64, String> {
    let value = value.ok_or_else(|| format!("missing value for {name}"))?;
    value
        .to_string_lossy()
        .parse()
        .map_err(|_| format!("invalid value for {name}"))
}

#[allow(clippy::while_let_on_iterator)]
fn parse_run_args(mut args: impl Iterator<Item = OsString>) -> Result<RunArgs, String> {
    let mut firmware: Option<PathBuf> = None;
    let mut chunk = DEFAULT_CHUNK;

    while let Some(arg) = args.next() {
        if arg == "--help" || arg == "-h" {
            return Err(USAGE_TEXT.to_string());
        }
        if arg == "--chunk" {
            chunk = parse_count("--chunk", args.next())?;
            continue;
        }
        if arg.to_string_lossy().starts_with('-') {
            return Err(format!("unknown option: {}", arg.to_string_lossy()));
        }
        if firmware.is_some() {
            return Err("multiple firmware paths provided".to_string());
        }
        firmware = Some(PathBuf::from(arg));
    }

    let firmware = firmware.ok_or_else(|| "missing firmware path".to_string())?;
    Ok(RunArgs { firmware, chunk })
}

#[allow(clippy::while_let_on_iterator)]
fn parse_fork_check_args(
    mut args: impl Iterator<Item = OsString>,
) -> Result<ForkCheckArgs, String> {
    let mut firmware: Option<PathBuf> = None;
    let mut steps = DEFAULT_FORK_STEPS;

    while let Some(arg) = args.next() {
        if arg == "--help" || arg == "-h" {
            return Err(USAGE_TEXT.to_string());
        }
        if arg == "--steps" {
            steps = parse_count("--steps", args.next())?;
            continue;
        }
        if arg.to_string_lossy().starts_with('-') {
            return Err(format!("unknown option: {}", arg.to_string_lossy()));
        }
        if firmware.is_some() {
            return Err("multiple firmware paths provided".to_string());
        }
        firmware = Some(PathBuf::from(arg));
    }

    let firmware = firmware.ok_or_else(|| "missing firmware path".to_string())?;
    Ok(ForkCheckArgs { firmware, steps })
}

fn load_firmware(path: &PathBuf) -> Result<Vec<u8>, i32> {
    fs::read(path).map_err(|e| {
        eprintln!("error: failed to read {}: {e}", path.display());
        1
    })
}

fn report_fault(fault: Fault, pc: u32) {
    eprintln!("fault at {pc:#010x}: {fault}");
}

/// Services one software interrupt; `Some(code)` means exit.
fn service_call(
    cpu: &mut thumb_core::Cpu,
    peripherals: &board::Peripherals,
    request: u32,
) -> Result<Option<i32>, Fault> {
    let r0 = cpu.registers()[0];
    match request {
        0 => {
            #[allow(clippy::cast_possible_wrap)]
            return Ok(Some(r0 as i32));
        }
        1 => println!("{r0}"),
        2 => print!("{}", char::from(u8::try_from(r0 & 0xFF).unwrap_or(b'?'))),
        3 => {
            let ticks = *peripherals.ticks.borrow();
            write_response(cpu, format!("{ticks}").as_bytes())?;
        }
        other => eprintln!("warning: unknown service call {other}"),
    }
    Ok(None)
}

/// Publishes a service-call reply through the response window: word 0 of
/// the buffer points at the payload, word 1 holds its length, the payload
/// bytes follow with a trailing NUL, and `r0` is left pointing at the
/// buffer for the guest to pick up.
fn write_response(cpu: &mut thumb_core::Cpu, payload: &[u8]) -> Result<(), Fault> {
    #[allow(clippy::cast_possible_truncation)]
    let buf = board::RESPONSE_BASE as u32;
    let len =
        u32::try_from(payload.len()).map_err(|_| Fault::InvalidMemoryAccess { address: buf })?;
    let memory = cpu.memory_mut();
    memory.write_u32(buf, buf + 8)?;
    memory.write_u32(buf + 4, len)?;
    memory.write_buffer(buf + 8, payload)?;
    memory.write_u8(buf + 8 + len, 0)?;
    cpu.registers_mut()[0] = buf;
    Ok(())
}

fn run_firmware(args: &RunArgs) -> Result<(), i32> {
    let firmware = load_firmware(&args.firmware)?;
    let (mut cpu, peripherals) = board::boot(&firmware).map_err(|fault| {
        eprintln!("error: boot failed: {fault}");
        1
    })?;

    let started = Instant::now();
    let exit_code = loop {
        match cpu.run(args.chunk) {
            RunOutcome::BudgetExhausted => {}
            RunOutcome::Stopped(Event::Interrupt(request)) => {
                match service_call(&mut cpu, &peripherals, request) {
                    Ok(None) => {}
                    Ok(Some(code)) => break code,
                    Err(fault) => {
                        report_fault(fault, cpu.registers().pc());
                        break 1;
                    }
                }
            }
            RunOutcome::Stopped(Event::Fault { fault, pc }) => {
                report_fault(fault, pc);
                break 1;
            }
        }
    };

    let elapsed = started.elapsed();
    eprintln!(
        "exited with code {exit_code} after {:.3}s ({} tick reads)",
        elapsed.as_secs_f64(),
        peripherals.ticks.borrow()
    );
    if exit_code == 0 {
        Ok(())
    } else {
        Err(exit_code)
    }
}

fn run_fork_check(args: &ForkCheckArgs) -> Result<(), i32> {
    let firmware = load_firmware(&args.firmware)?;
    let (mut reference, _) = board::boot(&firmware).map_err(|fault| {
        eprintln!("error: boot failed: {fault}");
        1
    })?;

    // Split the budget so the fork happens mid-run, then let both sides
    // finish on identical remaining budgets.
    let head = args.steps / 2;
    reference.run(head);
    let mut fork = reference.fork();
    reference.run(args.steps - head);
    fork.run(args.steps - head);

    let mut diverged = false;
    for index in 0..thumb_core::REGISTER_COUNT {
        if reference.registers()[index] != fork.registers()[index] {
            eprintln!(
                "r{index}: reference {:#010x}, fork {:#010x}",
                reference.registers()[index],
                fork.registers()[index]
            );
            diverged = true;
        }
    }
    if reference.registers().apsr() != fork.registers().apsr() {
        eprintln!(
            "apsr: reference {:#010x}, fork {:#010x}",
            reference.registers().apsr(),
            fork.registers().apsr()
        );
        diverged = true;
    }

    if diverged {
        eprintln!("fork-check: DIVERGED");
        return Err(1);
    }
    println!("fork-check: identical after {} steps per side", args.steps);
    Ok(())
}

fn main() {
    let exit_code = match parse_args(env::args_os().skip(1)) {
        Ok(ParseResult::Help) => {
            println!("{USAGE_TEXT}");
            0
        }
        Ok(ParseResult::Command(Command::Run(args))) => match run_firmware(&args) {
            Ok(()) => 0,
            Err(code) => code,
        },
        Ok(ParseResult::Command(Command::ForkCheck(args))) => match run_fork_check(&args) {
            Ok(()) => 0,
            Err(code) => code,
        },
        Err(error) => {
            if error.starts_with("Usage:") {
                println!("{error}");
            } else {
                eprintln!("error: {error}");
                eprintln!("{USAGE_TEXT}");
            }
            1
        }
    };

    std::process::exit(exit_code);
}
