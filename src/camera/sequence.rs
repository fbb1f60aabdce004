//
// Peakcam - Frame acquisition for IDS peak USB cameras
// Copyright (c) 2021 Filip Szczerek <ga.software@yahoo.com>
//
// This project is licensed under the terms of the MIT license
// (see the LICENSE file for details).
//

//!
//! Sequence acquisition on a background thread.
//!
//! The thread repeats trigger, wait, transfer, deliver and release until the requested number
//! of frames has been produced, a stop is requested or a frame fails. On exit it stops the
//! device acquisition if still running and notifies the host exactly once.
//!

use crate::camera::{AcquisitionLength, CameraError, DeviceError, FrameMetadata, SinkError, TriggerDevice};
use crate::camera::capture::AcquisitionContext;
use crate::camera::geometry::Roi;
use crate::camera::rate::sequence_timeout;
use crate::camera::transfer::{transfer_frame, TransferFormat};
use atomic_float::AtomicF64;
use chrono::Local;
use log::{debug, error, info, warn};
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FrameCount {
    Finite(u32),
    Unbounded
}

impl FrameCount {
    pub fn acquisition_length(self) -> AcquisitionLength {
        match self {
            FrameCount::Finite(n) => AcquisitionLength::Frames(n),
            FrameCount::Unbounded => AcquisitionLength::Infinite
        }
    }

    fn is_exhausted(self, produced: u64) -> bool {
        match self {
            FrameCount::Finite(n) => produced >= n as u64,
            FrameCount::Unbounded => false
        }
    }

    /// Acquisition length covering the frames still to be produced; `None` if there are none.
    fn remaining(self, produced: u64) -> Option<AcquisitionLength> {
        match self {
            _ if self.is_exhausted(produced) => None,
            FrameCount::Finite(n) => Some(AcquisitionLength::Frames(n - produced as u32)),
            FrameCount::Unbounded => Some(AcquisitionLength::Infinite)
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum AcquisitionState {
    Idle,
    Running,
    Suspended,
    Stopping
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct SequenceRequest {
    pub frame_count: FrameCount,
    pub interval_ms: f64,
    /// If false, a full sink is cleared and the frame inserted again.
    pub stop_on_overflow: bool
}

/// Per-run snapshot of everything the acquisition thread needs besides the shared context.
pub(crate) struct SequenceRun {
    pub request: SequenceRequest,
    pub label: String,
    pub roi: Roi,
    pub binning: u32,
    pub format: TransferFormat,
    pub frame_rate: f64,
    pub trigger: Option<Arc<dyn TriggerDevice>>,
    pub start: Instant
}

struct RunFlags {
    state: AcquisitionState,
    stop: bool,
    suspend: bool
}

struct RunControl {
    flags: Mutex<RunFlags>,
    changed: Condvar,
    produced: AtomicU64,
    /// Time between the last two delivered frames.
    last_interval_ms: AtomicF64
}

impl RunControl {
    fn flags(&self) -> MutexGuard<RunFlags> {
        self.flags.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn stop_requested(&self) -> bool {
        self.flags().stop
    }

    fn suspend_requested(&self) -> bool {
        let flags = self.flags();
        flags.suspend && !flags.stop
    }

    fn set_state(&self, state: AcquisitionState) {
        self.flags().state = state;
        self.changed.notify_all();
    }

    /// Blocks while suspended. Returns false if a stop has been requested.
    fn wait_while_suspended(&self) -> bool {
        let mut flags = self.flags();
        while flags.suspend && !flags.stop {
            flags = self.changed.wait(flags).unwrap_or_else(PoisonError::into_inner);
        }
        !flags.stop
    }
}

pub struct SequenceEngine {
    control: Arc<RunControl>,
    worker: Option<JoinHandle<()>>
}

impl SequenceEngine {
    pub fn new() -> SequenceEngine {
        SequenceEngine{
            control: Arc::new(RunControl{
                flags: Mutex::new(RunFlags{ state: AcquisitionState::Idle, stop: false, suspend: false }),
                changed: Condvar::new(),
                produced: AtomicU64::new(0),
                last_interval_ms: AtomicF64::new(0.0)
            }),
            worker: None
        }
    }

    pub fn state(&self) -> AcquisitionState {
        self.control.flags().state
    }

    pub fn is_capturing(&self) -> bool {
        self.state() != AcquisitionState::Idle
    }

    pub fn frames_produced(&self) -> u64 {
        self.control.produced.load(Ordering::SeqCst)
    }

    pub fn last_interval_ms(&self) -> f64 {
        self.control.last_interval_ms.load(Ordering::Relaxed)
    }

    pub(crate) fn start(&mut self, context: Arc<AcquisitionContext>, run: SequenceRun) -> Result<(), CameraError> {
        if self.is_capturing() {
            return Err(CameraError::CameraBusy);
        }
        self.join_worker();

        {
            let mut flags = self.control.flags();
            flags.state = AcquisitionState::Running;
            flags.stop = false;
            flags.suspend = false;
        }
        self.control.produced.store(0, Ordering::SeqCst);
        self.control.last_interval_ms.store(0.0, Ordering::Relaxed);

        let control = Arc::clone(&self.control);
        let spawned = thread::Builder::new()
            .name("sequence acquisition".to_string())
            .spawn(move || run_sequence(&context, &control, run));

        match spawned {
            Ok(handle) => {
                self.worker = Some(handle);
                Ok(())
            },
            Err(e) => {
                self.control.set_state(AcquisitionState::Idle);
                Err(CameraError::InternalInconsistency(format!("cannot start acquisition thread: {}", e)))
            }
        }
    }

    /// Requests a stop and waits for the acquisition thread to finish.
    pub fn stop(&mut self) {
        {
            let mut flags = self.control.flags();
            flags.stop = true;
            if flags.state != AcquisitionState::Idle {
                flags.state = AcquisitionState::Stopping;
            }
        }
        self.control.changed.notify_all();
        self.join_worker();
    }

    /// Pauses a running sequence. The acquisition thread stops the device acquisition once the
    /// frame in progress is delivered, and restarts it on `resume`.
    pub fn suspend(&self) {
        let mut flags = self.control.flags();
        if flags.state == AcquisitionState::Running {
            flags.suspend = true;
            flags.state = AcquisitionState::Suspended;
        }
    }

    pub fn resume(&self) {
        {
            let mut flags = self.control.flags();
            if flags.state == AcquisitionState::Suspended {
                flags.suspend = false;
                flags.state = AcquisitionState::Running;
            }
        }
        self.control.changed.notify_all();
    }

    fn join_worker(&mut self) {
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                error!("Sequence acquisition thread panicked");
            }
        }
    }
}

impl Drop for SequenceEngine {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_sequence(context: &AcquisitionContext, control: &RunControl, run: SequenceRun) {
    debug!("Sequence acquisition thread started ({:?})", run.request.frame_count);

    let result = panic::catch_unwind(AssertUnwindSafe(|| acquire_frames(context, control, &run)))
        .unwrap_or_else(|_| Err(CameraError::InternalInconsistency("acquisition thread panicked".to_string())));

    let interrupted = control.stop_requested();
    control.set_state(AcquisitionState::Stopping);

    if context.device.is_acquisition_started() {
        if let Err(e) = context.device.stop_acquisition() {
            warn!("Failed to stop acquisition: {}", e);
        }
    }
    if interrupted {
        info!("Sequence acquisition interrupted by the user");
    }

    let produced = control.produced.load(Ordering::SeqCst);
    match &result {
        Ok(()) => info!("Sequence acquisition finished, {} frame(s) delivered", produced),
        Err(e) => {
            error!("Sequence acquisition failed after {} frame(s): {}", produced, e);
            context.set_last_error(Some(e.clone()));
        }
    }

    {
        let mut flags = control.flags();
        flags.state = AcquisitionState::Idle;
        flags.stop = true;
        flags.suspend = false;
    }
    control.changed.notify_all();

    context.host.acquisition_finished(&result);
    debug!("Sequence acquisition thread exiting");
}

fn start_device_acquisition(context: &AcquisitionContext, length: AcquisitionLength) -> Result<(), CameraError> {
    context.device.start_acquisition(length).map_err(|e| {
        warn!("Failed to start acquisition: {}", e);
        CameraError::AcquisitionStart
    })
}

/// Leaves the device idle until resumed. Returns false if the sequence should end instead.
fn pause_acquisition(context: &AcquisitionContext, control: &RunControl, run: &SequenceRun) -> Result<bool, CameraError> {
    if context.device.is_acquisition_started() {
        if let Err(e) = context.device.stop_acquisition() {
            warn!("Failed to stop acquisition for pause: {}", e);
        }
    }
    debug!("Sequence acquisition suspended");

    if !control.wait_while_suspended() {
        return Ok(false);
    }
    match run.request.frame_count.remaining(control.produced.load(Ordering::SeqCst)) {
        Some(length) => {
            start_device_acquisition(context, length)?;
            debug!("Sequence acquisition resumed");
            Ok(true)
        },
        None => Ok(false)
    }
}

fn acquire_frames(context: &AcquisitionContext, control: &RunControl, run: &SequenceRun) -> Result<(), CameraError> {
    start_device_acquisition(context, run.request.frame_count.acquisition_length())?;

    let timeout = sequence_timeout(run.frame_rate);
    let mut last_delivery: Option<Instant> = None;
    loop {
        if control.suspend_requested() {
            if !pause_acquisition(context, control, run)? {
                break;
            }
            last_delivery = None;
        }
        if control.stop_requested() {
            break;
        }
        let image_number = control.produced.load(Ordering::SeqCst);
        if run.request.frame_count.is_exhausted(image_number) {
            break;
        }

        capture_sequence_frame(context, run, image_number, timeout)?;

        let now = Instant::now();
        if let Some(previous) = last_delivery {
            control.last_interval_ms.store(millis(now - previous), Ordering::Relaxed);
        }
        last_delivery = Some(now);
        control.produced.fetch_add(1, Ordering::SeqCst);
    }

    Ok(())
}

fn millis(duration: Duration) -> f64 {
    duration.as_secs_f64() * 1000.0
}

fn capture_sequence_frame(
    context: &AcquisitionContext,
    run: &SequenceRun,
    image_number: u64,
    timeout: Duration
) -> Result<(), CameraError> {
    let device = &*context.device;

    if let Some(trigger) = &run.trigger {
        debug!("Triggering frame {}", image_number);
        trigger.trigger()?;
    }

    let frame = device.wait_for_frame(timeout).map_err(|e| {
        warn!("Frame wait failed: {}", e);
        match e {
            DeviceError::Timeout => CameraError::AcquisitionTimeout,
            _ => CameraError::AcquisitionFrame
        }
    })?;

    let delivered = transfer_frame(device, &frame, &context.buffer, &run.format)
        .and_then(|()| deliver_frame(context, run, image_number));
    let released = device.release_frame(frame).map_err(|e| {
        warn!("Failed to release frame: {}", e);
        CameraError::AcquisitionRelease
    });
    delivered?;
    released?;

    context.refresh_white_balance_if_active()
}

fn deliver_frame(context: &AcquisitionContext, run: &SequenceRun, image_number: u64) -> Result<(), CameraError> {
    let metadata = FrameMetadata{
        camera: run.label.clone(),
        elapsed_ms: millis(run.start.elapsed()),
        roi_x: run.roi.x,
        roi_y: run.roi.y,
        binning: run.binning,
        image_number,
        received: Local::now()
    };

    let image = context.buffer.lock();
    match context.sink.insert_frame(&image, &metadata) {
        Err(SinkError::Overflow) if !run.request.stop_on_overflow => {
            warn!("Frame sink overflow, discarding queued frames");
            context.sink.clear_backlog();
            context.sink.insert_frame(&image, &metadata).map_err(CameraError::from)
        },
        other => other.map_err(CameraError::from)
    }
}
