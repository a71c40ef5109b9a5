// Copyright (c) 2025 Mesa Research Ltd. All rights reserved.

//! Simulate a link-attached memory expander.
//!
//! See `lib.rs` for the platform details. The same pointer-chase working
//! set can be driven over the protocol path (`--mode host`) or directly by
//! the co-located processing unit (`--mode bypass`), and the printed stats
//! let the two paths be compared.

use std::io;
use std::rc::Rc;

use clap::{Parser, ValueEnum};
use mesa_engine::engine::Engine;
use mesa_engine::run_simulation;
use mesa_engine::types::SimError;
use mesa_models::expander::unit::UnitKind;
use mesa_models::stats::StatsRegistry;
use mesa_track::builder::{TrackerConfig, TrackersConfig, setup_trackers};
use mesa_track::info;
use sim_expander::{Config, build_platform, drive_bypass_workload, drive_host_workload};

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum Mode {
    /// Drive the working set from the remote host over the link protocol.
    Host,

    /// Drive the working set from the co-located processing unit.
    Bypass,
}

/// Command-line arguments.
#[derive(Parser)]
#[command(about = "Memory expander simulation")]
struct Cli {
    /// Which access path drives the workload.
    #[arg(long, value_enum, default_value_t = Mode::Host)]
    mode: Mode,

    /// Enable logging to the console.
    #[arg(long, default_value = "false")]
    stdout: bool,

    /// Level of log message to display.
    #[arg(long, default_value = "Info")]
    stdout_level: log::Level,

    /// Set a regular expression for which entities should have logging
    /// level set to `--stdout-level`. Others will have level set to
    /// `Error`.
    #[arg(long, default_value = "")]
    stdout_filter_regex: String,

    /// Write a text log to the given file.
    #[arg(long)]
    log_file: Option<String>,

    /// The number of accesses in the pointer-chase working set.
    #[arg(long, default_value = "256")]
    num_accesses: usize,

    /// Size of each access in bytes.
    #[arg(long, default_value = "64")]
    access_bytes: usize,

    /// Protocol processing delay per hop, in ticks.
    #[arg(long, default_value = "2")]
    proto_delay_ticks: u64,

    /// Capacity of the request queue toward the backend.
    #[arg(long, default_value = "4")]
    request_queue_limit: usize,

    /// Number of response slots.
    #[arg(long, default_value = "4")]
    response_slot_limit: usize,

    /// In-flight accesses each backend channel may hold.
    #[arg(long, default_value = "2")]
    channel_slots: usize,

    /// Base address of the expansion memory.
    #[arg(long, default_value = "0x80000000")]
    mem_base: String,

    /// Size of the expansion memory in MiB.
    #[arg(long, default_value = "1024")]
    mem_mib: u64,

    /// Entry address of the bypass workload image.
    #[arg(long, default_value = "0x1000")]
    entry_addr: String,

    /// Seed for the pointer-chase shuffle.
    #[arg(long, default_value = "7")]
    seed: u64,

    /// Suppress the stats report when the run completes.
    #[arg(long, default_value = "false")]
    quiet: bool,
}

fn parse_addr(text: &str) -> u64 {
    match text.strip_prefix("0x") {
        Some(hex) => u64::from_str_radix(hex, 16).expect("invalid hex address"),
        None => text.parse().expect("invalid address"),
    }
}

fn setup_all_trackers(args: &Cli) -> mesa_track::Tracker {
    let config = TrackersConfig {
        stdout: TrackerConfig {
            enable: args.stdout,
            level: args.stdout_level,
            filter_regex: &args.stdout_filter_regex,
            file: None,
        },
        file: TrackerConfig {
            enable: args.log_file.is_some(),
            level: log::Level::Debug,
            filter_regex: "",
            file: args.log_file.as_deref(),
        },
    };
    setup_trackers(&config).unwrap()
}

fn main() -> Result<(), SimError> {
    let args = Cli::parse();

    let tracker = setup_all_trackers(&args);

    let mut engine = Engine::new(&tracker);
    let clock = engine.default_clock();
    let registry = Rc::new(StatsRegistry::new());

    let config = Config {
        num_accesses: args.num_accesses,
        access_bytes: args.access_bytes,
        proto_delay_ticks: args.proto_delay_ticks,
        request_queue_limit: args.request_queue_limit,
        response_slot_limit: args.response_slot_limit,
        channel_slots: args.channel_slots,
        mem_base: parse_addr(&args.mem_base),
        mem_size: args.mem_mib * 1024 * 1024,
        bypass: args.mode == Mode::Bypass,
        unit_kind: UnitKind::Sequencer,
        entry_addr: parse_addr(&args.entry_addr),
        seed: args.seed,
    };

    let platform = build_platform(&mut engine, &clock, &config, &registry);

    let top = engine.top().clone();
    info!(top ; "expander serving {} accesses of {}B over the {} path",
        config.num_accesses,
        config.access_bytes,
        match args.mode {
            Mode::Host => "host",
            Mode::Bypass => "bypass",
        }
    );

    match args.mode {
        Mode::Host => drive_host_workload(&platform, &config),
        Mode::Bypass => drive_bypass_workload(&engine, &clock, &platform, &config),
    }

    run_simulation!(engine);

    info!(top ; "run complete at {:.2}ns", clock.time_now_ns());

    if !args.quiet {
        registry
            .write_report(&mut io::stdout())
            .map_err(|e| SimError(format!("failed to write report: {e}")))?;
        println!("mem_bytes_read: {}", platform.memory.bytes_read());
        println!("mem_bytes_written: {}", platform.memory.bytes_written());
        println!("responses_received: {}", platform.response_sink.num_sunk());
    }

    Ok(())
}
