//! # Monitor Module
//!
//! Runs the capture source and a dedicated analysis thread, and hands out a
//! narrow [`MonitorHandle`] to rendering and telemetry collaborators.
//!
//! ## Architecture
//! - **Audio thread**: owned by cpal, pushes blocks into the [`StreamBuffer`]
//! - **Analysis thread**: drains the buffer, runs the [`Analyzer`] and
//!   publishes [`AudioState`] once per tick
//! - **Commands**: crossbeam channel into the analysis thread, each with a
//!   reply channel so misuse errors reach the caller
//! - **Reads**: snapshots behind `parking_lot::RwLock`, never torn

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use parking_lot::RwLock;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use crate::AudioState;
use crate::analysis::Analyzer;
use crate::audio::AudioCapture;
use crate::config::MonitorConfig;
use crate::error::{MeterError, Result};
use crate::recording::Report;
use crate::stream_buffer::StreamBuffer;

/// Requests handled by the analysis thread.
#[derive(Debug)]
pub enum Command {
    StartRecording(Sender<Result<()>>),
    StopRecording(Sender<Result<Arc<Report>>>),
    SetCalibration(f64, Sender<Result<()>>),
    ResetPeak,
    Shutdown,
}

/// State shared between the analysis thread and its readers.
#[derive(Debug)]
struct Published {
    state: RwLock<AudioState>,
    report: RwLock<Option<Arc<Report>>>,
}

/// Cloneable, `Send` view of a running [`Monitor`].
///
/// Reads never wait on analysis work: the analysis thread only holds the
/// write lock long enough to swap in a finished snapshot.
#[derive(Debug, Clone)]
pub struct MonitorHandle {
    published: Arc<Published>,
    commands: Sender<Command>,
}

impl MonitorHandle {
    /// The latest complete AudioState.
    pub fn audio_state(&self) -> AudioState {
        self.published.state.read().clone()
    }

    /// The latest finished recording report, if any.
    pub fn latest_report(&self) -> Option<Arc<Report>> {
        self.published.report.read().clone()
    }

    pub fn is_recording(&self) -> bool {
        self.published.state.read().recording
    }

    pub fn start_recording(&self) -> Result<()> {
        self.request(Command::StartRecording)
    }

    pub fn stop_recording(&self) -> Result<Arc<Report>> {
        self.request(Command::StopRecording)
    }

    /// Changes the calibration offset. Refused while a session is recording.
    pub fn set_calibration_offset(&self, offset_db: f64) -> Result<()> {
        self.request(|reply| Command::SetCalibration(offset_db, reply))
    }

    pub fn reset_peak(&self) -> Result<()> {
        self.commands
            .send(Command::ResetPeak)
            .map_err(|_| MeterError::Disconnected)
    }

    fn request<T>(&self, make: impl FnOnce(Sender<Result<T>>) -> Command) -> Result<T> {
        let (reply_tx, reply_rx) = crossbeam_channel::bounded(1);
        self.commands
            .send(make(reply_tx))
            .map_err(|_| MeterError::Disconnected)?;
        reply_rx.recv().map_err(|_| MeterError::Disconnected)?
    }
}

/// Owns the capture source and the analysis thread.
///
/// Holds a `cpal::Stream`, so it must be stopped and dropped on the thread
/// that started it. Share a [`MonitorHandle`] with other threads instead.
pub struct Monitor {
    capture: Option<AudioCapture>,
    handle: MonitorHandle,
    buffer: Arc<StreamBuffer>,
    analysis_thread: Option<JoinHandle<()>>,
}

impl Monitor {
    /// Opens the capture device and starts the analysis thread.
    ///
    /// Device failures are returned here and are not retried.
    pub fn start(config: &MonitorConfig) -> Result<Self> {
        config.validate()?;
        let buffer = Arc::new(StreamBuffer::new(
            config.stream_capacity(),
            config.min_fill_fraction,
        ));
        let capture = AudioCapture::start(config, Arc::clone(&buffer))?;
        let mut monitor = Self::spawn_analysis(config, buffer)?;
        monitor.capture = Some(capture);
        Ok(monitor)
    }

    /// Starts only the analysis thread, reading from an externally fed
    /// buffer. Used when blocks come from somewhere other than a cpal device.
    pub fn spawn_analysis(config: &MonitorConfig, buffer: Arc<StreamBuffer>) -> Result<Self> {
        config.validate()?;
        let published = Arc::new(Published {
            state: RwLock::new(AudioState::new(config.calibration_offset_db)),
            report: RwLock::new(None),
        });
        let (command_tx, command_rx) = crossbeam_channel::unbounded();

        let worker = AnalysisWorker {
            analyzer: Analyzer::new(config),
            buffer: Arc::clone(&buffer),
            published: Arc::clone(&published),
            commands: command_rx,
            poll: config.analysis_poll(),
        };
        let analysis_thread = thread::Builder::new()
            .name("soundcheck-analysis".into())
            .spawn(move || worker.run())?;
        info!(
            capacity = buffer.capacity(),
            pitch_window = config.pitch_window,
            "analysis thread started"
        );

        Ok(Self {
            capture: None,
            handle: MonitorHandle {
                published,
                commands: command_tx,
            },
            buffer,
            analysis_thread: Some(analysis_thread),
        })
    }

    pub fn handle(&self) -> MonitorHandle {
        self.handle.clone()
    }

    pub fn buffer(&self) -> &Arc<StreamBuffer> {
        &self.buffer
    }

    /// Stops capture first, then lets the analysis thread drain and exit.
    /// Idempotent.
    pub fn stop(&mut self) {
        if let Some(mut capture) = self.capture.take() {
            capture.stop();
        }
        if let Some(thread) = self.analysis_thread.take() {
            let _ = self.handle.commands.send(Command::Shutdown);
            if thread.join().is_err() {
                error!("analysis thread panicked");
            }
            let dropped = self.buffer.dropped_blocks();
            if dropped > 0 {
                warn!(dropped, "audio blocks were dropped during the run");
            }
            info!("monitor stopped");
        }
    }
}

impl Drop for Monitor {
    fn drop(&mut self) {
        self.stop();
    }
}

struct AnalysisWorker {
    analyzer: Analyzer,
    buffer: Arc<StreamBuffer>,
    published: Arc<Published>,
    commands: Receiver<Command>,
    poll: Duration,
}

impl AnalysisWorker {
    fn run(mut self) {
        debug!("entering analysis loop");
        loop {
            match self.commands.recv_timeout(self.wait_time()) {
                Ok(Command::Shutdown) => break,
                Ok(command) => self.handle(command),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }
            self.tick();
        }
        // Capture has stopped by now; drain what is left and publish it.
        self.tick();
        debug!("analysis loop finished");
    }

    fn wait_time(&self) -> Duration {
        if self.buffer.is_empty() {
            self.poll
        } else {
            Duration::ZERO
        }
    }

    fn tick(&mut self) {
        let outcome = self.analyzer.tick(&self.buffer, Instant::now());
        if let Some(report) = outcome.finished_report {
            self.publish_report(report);
        }
        if outcome.blocks > 0 || outcome.pitch_updated {
            self.publish_state();
        }
    }

    fn handle(&mut self, command: Command) {
        match command {
            Command::StartRecording(reply) => {
                let result = self.analyzer.start_recording(Instant::now());
                self.publish_state();
                let _ = reply.send(result);
            }
            Command::StopRecording(reply) => {
                let result = self.analyzer.stop_recording();
                if let Ok(report) = &result {
                    self.publish_report(Arc::clone(report));
                }
                self.publish_state();
                let _ = reply.send(result);
            }
            Command::SetCalibration(offset_db, reply) => {
                let result = self.analyzer.set_calibration_offset(offset_db);
                self.publish_state();
                let _ = reply.send(result);
            }
            Command::ResetPeak => {
                self.analyzer.reset_peak();
                self.publish_state();
            }
            Command::Shutdown => {}
        }
    }

    fn publish_state(&self) {
        let snapshot = self.analyzer.state().clone();
        *self.published.state.write() = snapshot;
    }

    fn publish_report(&self, report: Arc<Report>) {
        *self.published.report.write() = Some(report);
    }
}
