//! # soundcheck-monitor - headless sound level meter and tuner
//!
//! Starts the capture and analysis pipeline, logs the published AudioState
//! at a fixed refresh rate and, when asked to, records a session and prints
//! its report as JSON.
//!
//! ```text
//! soundcheck-monitor [CONFIG.json] [--record] [--list-devices]
//! ```
//!
//! Logging is controlled through `RUST_LOG` (default `info`).

use anyhow::{Context, Result};
use crossbeam_channel::select;
use soundcheck_core::{Monitor, MonitorConfig, MonitorHandle, Report, TelemetrySample, audio};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

/// How often the published state is read and logged.
const REFRESH_INTERVAL: Duration = Duration::from_millis(500);

struct Args {
    config_path: Option<String>,
    record: bool,
    list_devices: bool,
}

fn parse_args() -> Args {
    let mut args = Args {
        config_path: None,
        record: false,
        list_devices: false,
    };
    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "--record" => args.record = true,
            "--list-devices" => args.list_devices = true,
            other => args.config_path = Some(other.to_string()),
        }
    }
    args
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = parse_args();

    if args.list_devices {
        for name in audio::input_device_names()? {
            println!("{name}");
        }
        return Ok(());
    }

    let config = match &args.config_path {
        Some(path) => MonitorConfig::load(path)
            .with_context(|| format!("failed to load config from {path}"))?,
        None => MonitorConfig::default(),
    };
    info!(
        sample_rate = config.sample_rate,
        block_size = config.block_size,
        pitch_window = config.pitch_window,
        "starting monitor"
    );

    let (shutdown_tx, shutdown_rx) = crossbeam_channel::bounded(1);
    ctrlc::set_handler(move || {
        let _ = shutdown_tx.try_send(());
    })
    .context("failed to install Ctrl-C handler")?;

    let mut monitor = Monitor::start(&config).context("failed to start audio capture")?;
    let handle = monitor.handle();

    if args.record {
        handle.start_recording()?;
        info!(max_secs = config.max_record_secs, "recording until Ctrl-C or the time cap");
    }

    let mut printed: Option<Arc<Report>> = None;
    loop {
        select! {
            recv(shutdown_rx) -> _ => {
                info!("shutdown requested");
                break;
            }
            default(REFRESH_INTERVAL) => {
                log_state(&handle);
                if let Some(report) = handle.latest_report() {
                    if !printed.as_ref().is_some_and(|p| Arc::ptr_eq(p, &report)) {
                        print_report(&report)?;
                        printed = Some(report);
                    }
                }
            }
        }
    }

    if handle.is_recording() {
        match handle.stop_recording() {
            Ok(report) => print_report(&report)?,
            Err(e) => warn!("could not stop recording: {e}"),
        }
    }
    monitor.stop();
    Ok(())
}

fn log_state(handle: &MonitorHandle) {
    let state = handle.audio_state();
    info!(
        db = format_args!("{:.1}", state.last_db),
        peak = format_args!("{:.1}", state.peak_db),
        pitch_hz = format_args!("{:.2}", state.pitch_hz),
        note = state.pitch_note_name.unwrap_or("--"),
        cents = format_args!("{:+.1}", state.pitch_cents),
        needle = format_args!("{:+.1}", state.smoothed_cents),
        recording = state.recording,
    );

    let sample = TelemetrySample::from_state(&state);
    if !sample.is_empty() {
        if let Ok(json) = serde_json::to_string(&sample) {
            debug!(telemetry = %json);
        }
    }
}

fn print_report(report: &Report) -> Result<()> {
    match &report.stats {
        Some(stats) => info!(
            samples = report.count,
            duration = format_args!("{:.1}s", report.duration),
            max = format_args!("{:.1} dB @ {:.1}s", stats.max.db, stats.max.elapsed),
            min = format_args!("{:.1} dB @ {:.1}s", stats.min.db, stats.min.elapsed),
            mean = format_args!("{:.1}", stats.mean_db),
            median = format_args!("{:.1}", stats.median_db),
            std = format_args!("{:.2}", stats.std_db),
            "recording report"
        ),
        None => info!("recording finished without any readings"),
    }
    println!("{}", serde_json::to_string_pretty(report)?);
    Ok(())
}
