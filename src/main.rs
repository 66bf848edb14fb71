//! Bus Scheduler CLI
//!
//! Runs one batch of tasks over a half-duplex bus and reports what happened.
//! Each worker logs `<thread-name> acquired slot` when it boards.
//!
//! # Output Format
//!
//! Statistics are written to stderr upon completion:
//! `tasks=N capacity=N transfer_ticks=N blocked=N peak_on_bus=N elapsed_ms=N`
//!
//! With `--trace`, the recorded bus trace is checked and a second line is
//! written: `trace events=N queued=N boarded=N peak_on_bus=N ok`.
//!
//! # Logging
//!
//! `BUS_LOG` sets the log filter (default `info`), `BUS_LOG_STYLE` the
//! write style (default `auto`).
//!
//! # Exit Codes
//!
//! - `0`: Success
//! - `1`: The bus trace broke an admission property
//! - `2`: Invalid arguments or configuration error

use bus_sched::{
    batch_scheduler, check_trace, init_bus, BatchConfig, BatchCounts, BusConfig, BUS_CAPACITY,
};
use env_logger::Env;
use std::env;
use std::sync::Arc;
use std::time::Duration;

fn print_usage(exe: &std::ffi::OsStr) {
    eprintln!(
        "usage: {} [OPTIONS]

OPTIONS:
    --priority-send=<N>     Priority send tasks (default: 0)
    --priority-receive=<N>  Priority receive tasks (default: 0)
    --send=<N>              Normal send tasks (default: 0)
    --receive=<N>           Normal receive tasks (default: 0)
    --capacity=<N>          Bus slots (default: {})
    --tick-us=<N>           Microseconds per transfer tick (default: 1000)
    --seed=<N>              Duration generator seed (default: {})
    --trace                 Record and check the bus trace
    --help, -h              Show this help message",
        exe.to_string_lossy(),
        BUS_CAPACITY,
        BatchConfig::default().seed,
    );
}

fn parse_flag<T: std::str::FromStr>(flag: &str, value: &str) -> T {
    value.parse().unwrap_or_else(|_| {
        eprintln!("invalid {} value: {}", flag, value);
        std::process::exit(2);
    })
}

fn main() {
    env_logger::init_from_env(
        Env::default()
            .filter_or("BUS_LOG", "info")
            .write_style_or("BUS_LOG_STYLE", "auto"),
    );

    let mut args = env::args_os();
    let exe = args.next().unwrap_or_else(|| "bus-sched".into());
    let mut counts = BatchCounts::default();
    let mut bus_cfg = BusConfig::default();
    let mut batch_cfg = BatchConfig::default();

    for arg in args {
        let Some(flag) = arg.to_str() else {
            eprintln!("invalid argument: {}", arg.to_string_lossy());
            std::process::exit(2);
        };
        if let Some((name, value)) = flag.split_once('=') {
            match name {
                "--priority-send" => counts.priority_send = parse_flag(name, value),
                "--priority-receive" => counts.priority_receive = parse_flag(name, value),
                "--send" => counts.send = parse_flag(name, value),
                "--receive" => counts.receive = parse_flag(name, value),
                "--capacity" => {
                    bus_cfg.capacity = parse_flag(name, value);
                    if bus_cfg.capacity == 0 {
                        eprintln!("--capacity must be >= 1");
                        std::process::exit(2);
                    }
                }
                "--tick-us" => batch_cfg.tick = Duration::from_micros(parse_flag(name, value)),
                "--seed" => batch_cfg.seed = parse_flag(name, value),
                _ => {
                    eprintln!("unknown flag: {}", flag);
                    print_usage(&exe);
                    std::process::exit(2);
                }
            }
            continue;
        }
        match flag {
            "--trace" => bus_cfg.record_trace = true,
            "--help" | "-h" => {
                print_usage(&exe);
                std::process::exit(0);
            }
            _ => {
                eprintln!("unknown argument: {}", flag);
                print_usage(&exe);
                std::process::exit(2);
            }
        }
    }

    let bus = Arc::new(init_bus(bus_cfg));
    let report = match batch_scheduler(&bus, counts, &batch_cfg) {
        Ok(report) => report,
        Err(err) => {
            eprintln!("error: {}", err);
            std::process::exit(2);
        }
    };

    eprintln!(
        "tasks={} capacity={} transfer_ticks={} blocked={} peak_on_bus={} elapsed_ms={}",
        report.tasks,
        bus_cfg.capacity,
        report.total_transfer_ticks,
        report.blocked,
        report.peak_on_bus,
        report.elapsed.as_millis(),
    );

    if bus_cfg.record_trace {
        let events = bus.take_trace();
        match check_trace(bus_cfg.capacity, &events) {
            Ok(summary) => eprintln!(
                "trace events={} queued={} boarded={} peak_on_bus={} ok",
                events.len(),
                summary.queued,
                summary.boarded,
                summary.peak_on_bus,
            ),
            Err(violation) => {
                eprintln!("trace violation: {}", violation);
                std::process::exit(1);
            }
        }
    }
}
