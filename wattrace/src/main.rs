//! # wattrace - Main Entry Point
//!
//! Samples a running process until Ctrl+C, a duration limit, or the process
//! exiting, printing one line (or JSON object) per sample and a summary at
//! the end.

// Display math on counts and durations
#![allow(clippy::cast_precision_loss)]

use anyhow::{Context, Result};
use clap::Parser;
use crossbeam_channel::Receiver;
use log::{info, warn};
use std::sync::Arc;
use std::time::{Duration, Instant};

use wattrace::backtrace::{
    energy_share, frame_label, sort_tree_by_energy, top_flat_entries, CallTreeNode,
};
use wattrace::cli::Args;
use wattrace::cpu_usage::CpuUsageMonitor;
use wattrace::domain::{CoreType, Energy, Pid};
use wattrace::power::PowerSample;
use wattrace::preflight::run_preflight_checks;
use wattrace::process_lookup::{find_process_by_name, resolve_exe_path};
use wattrace::sampling::topology::online_cpus;
use wattrace::sampling::{ProcfsCounterSource, SamplingEngine};
use wattrace::symbolization::{NullResolver, ProcSymbolizer, SymbolResolver};

// Exit codes
const EXIT_SUCCESS: i32 = 0;
const EXIT_ERROR: i32 = 1;
const EXIT_USAGE: i32 = 2;
const EXIT_NOPERM: i32 = 77;

const JOULES_PER_WATT_HOUR: f64 = 3600.0;
/// Depth of the call tree printed in the summary.
const SUMMARY_TREE_DEPTH: usize = 4;

fn main() {
    env_logger::init();
    std::process::exit(match run() {
        Ok(()) => EXIT_SUCCESS,
        Err(e) => {
            let code = exit_code_for(&e);
            eprintln!("error: {e:#}");
            code
        }
    });
}

fn exit_code_for(err: &anyhow::Error) -> i32 {
    let msg = format!("{err:#}").to_lowercase();
    if msg.contains("permission denied") {
        EXIT_NOPERM
    } else if msg.contains("missing required argument") {
        EXIT_USAGE
    } else {
        EXIT_ERROR
    }
}

/// Resolve the target PID from CLI arguments.
///
/// - `wattrace my-app` - find process by name
/// - `wattrace --pid 1234` - explicit PID
fn resolve_pid(args: &Args) -> Result<Pid> {
    if let Some(ref name) = args.process {
        let info = find_process_by_name(name)?;
        info!("Matched {} ({}) for '{name}'", info.pid, info.exe_path.display());
        return Ok(info.pid);
    }

    if let Some(pid) = args.pid {
        return Ok(Pid(pid));
    }

    anyhow::bail!(
        "Missing required argument: PROCESS or --pid\n\n\
         Usage:\n  \
         wattrace my-app              Find the process by name\n  \
         wattrace --pid 1234          Explicit PID\n\n\
         Run 'wattrace --help' for more options"
    )
}

fn build_resolver(pid: Pid, backtraces: bool) -> Arc<dyn SymbolResolver> {
    if !backtraces {
        return Arc::new(NullResolver);
    }
    match ProcSymbolizer::new(pid) {
        Ok(symbolizer) => Arc::new(symbolizer),
        Err(e) => {
            warn!("Symbol resolution disabled: {e:#}");
            Arc::new(NullResolver)
        }
    }
}

fn print_sample(sample: &PowerSample, since_start: Duration) {
    let power = sample.all_threads_power;
    let busiest = sample
        .thread_samples
        .iter()
        .max_by(|a, b| a.power.total().total_cmp(&b.power.total()))
        .map(|t| format!("  top: {} {:.2} W", t.display_name(), t.power.total()))
        .unwrap_or_default();
    let split: Vec<String> = CoreType::ALL
        .iter()
        .map(|&core_type| format!("{} {:.2} W", core_type.short_name(), power.of(core_type)))
        .collect();
    println!(
        "[{:>7.1}s] {:>7.2} W  ({})  {:>3} threads{busiest}",
        since_start.as_secs_f64(),
        power.total(),
        split.join(", "),
        sample.thread_samples.len(),
    );
}

fn print_json(sample: &PowerSample) {
    match serde_json::to_string(sample) {
        Ok(line) => println!("{line}"),
        Err(e) => warn!("Failed to serialize sample: {e}"),
    }
}

fn drain(samples: &Receiver<PowerSample>, json: bool, started: Instant) -> usize {
    let mut count = 0;
    for sample in samples.try_iter() {
        if json {
            print_json(&sample);
        } else {
            print_sample(&sample, started.elapsed());
        }
        count += 1;
    }
    count
}

/// Print the top of a call tree, deepest levels cut at `max_depth`.
fn print_call_tree(mut roots: Vec<CallTreeNode>, total: Energy, max_depth: usize) {
    sort_tree_by_energy(&mut roots);
    let mut stack: Vec<(&CallTreeNode, usize)> = roots.iter().rev().map(|n| (n, 0)).collect();
    while let Some((node, depth)) = stack.pop() {
        eprintln!(
            "  {:indent$}{:>5.1}%  {}",
            "",
            energy_share(node.energy, total),
            frame_label(node.address, node.symbol.as_ref()),
            indent = depth * 2
        );
        if depth + 1 < max_depth {
            stack.extend(node.children.iter().rev().map(|child| (child, depth + 1)));
        }
    }
}

fn print_summary(engine: &SamplingEngine, cpu_monitor: &mut CpuUsageMonitor, top: usize) {
    let energy = engine.lifetime_energy();
    eprintln!(
        "  max power:  {:.2} W (last {} samples)",
        engine.max_power(),
        engine.samples().len()
    );
    eprintln!("  energy:     {:.6} Wh ({:.2} J)", energy, energy * JOULES_PER_WATT_HOUR);

    match cpu_monitor.sample() {
        Ok(Some(usage)) => eprintln!(
            "  cpu usage:  {:.1}% over {} cores ({:.1}% system)",
            usage.combined().usage() * 100.0,
            usage.number_of_cores,
            usage.combined().system_usage() * 100.0
        ),
        Ok(None) => {}
        Err(e) => warn!("Failed to read CPU usage: {e:#}"),
    }

    let flat = engine.flat_entries();
    if flat.is_empty() {
        return;
    }
    let tree = engine.call_tree();
    let tree_total: Energy = tree.iter().map(|root| root.energy).sum();

    eprintln!("\n  top frames (each frame charged its stack's full energy):");
    for entry in top_flat_entries(flat, top) {
        eprintln!(
            "  {:>10.6} Wh  {}",
            entry.energy,
            frame_label(entry.address, entry.symbol.as_ref())
        );
    }

    eprintln!("\n  call tree:");
    print_call_tree(tree, tree_total, SUMMARY_TREE_DEPTH);
}

#[tokio::main]
async fn run() -> Result<()> {
    let args = Args::parse();
    let quiet = args.quiet;

    let pid = resolve_pid(&args)?;
    run_preflight_checks(pid, quiet)?;

    let config = args.sampler_config();
    let source = Arc::new(ProcfsCounterSource::new());
    if !source.has_energy_counters() {
        info!("No RAPL energy counters, power readings will stay at zero");
    }
    if args.backtraces && !quiet {
        eprintln!(
            "note: backtraces hold only the sampled program counter and need ptrace access \
             to the target"
        );
    }

    if !quiet {
        println!("wattrace v{}", env!("CARGO_PKG_VERSION"));
        if let Ok(exe) = resolve_exe_path(pid) {
            println!("target: {}", exe.display());
        }
        println!("pid: {}", pid.0);
        println!("interval: {}ms", config.sampling_interval.as_millis());
        if let Ok(cpus) = online_cpus(std::path::Path::new("/sys")) {
            let kind = if source.topology().is_hybrid() { "hybrid P/E" } else { "uniform" };
            println!("cpus: {} online ({kind})", cpus.len());
        }
    }

    let mut cpu_monitor = CpuUsageMonitor::new(config.history_capacity)?;
    if let Err(e) = cpu_monitor.sample() {
        warn!("CPU usage unavailable: {e:#}");
    }

    let resolver = build_resolver(pid, args.backtraces);
    let engine = Arc::new(SamplingEngine::new(config, source, resolver)?);
    let samples = engine.subscribe(64);
    engine.start(pid).context("Failed to start sampling")?;

    // Setup Ctrl+C handler
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let started = Instant::now();
    let duration_limit = args.duration_limit();
    let proc_path = format!("/proc/{}", pid.0);
    let mut printed = 0;

    // Track why we exited the loop
    let exit_reason = loop {
        printed += drain(&samples, args.json, started);

        if duration_limit.is_some_and(|limit| started.elapsed() >= limit) {
            break "duration limit reached";
        }
        if !std::path::Path::new(&proc_path).exists() {
            break "process exited";
        }

        tokio::select! {
            () = tokio::time::sleep(Duration::from_millis(100)) => {}
            _ = &mut ctrl_c => break "interrupted",
        }
    };

    engine.stop();
    printed += drain(&samples, args.json, started);

    if !quiet {
        eprintln!(
            "\n{exit_reason}: {:.1}s, {printed} samples, {} threads in last round",
            started.elapsed().as_secs_f64(),
            engine.current_thread_count()
        );
        print_summary(&engine, &mut cpu_monitor, args.top);
    }

    Ok(())
}
