//
// Peakcam - Frame acquisition for IDS peak USB cameras
// Copyright (c) 2021 Filip Szczerek <ga.software@yahoo.com>
//
// This project is licensed under the terms of the MIT license
// (see the LICENSE file for details).
//

#![allow(dead_code)]

use peakcam::camera::{CameraError, ChannelSink, Collaborators, HostCallbacks, PeakCamera, TriggerDevice};
use peakcam::camera::drivers::simulator::{SimulatedCamera, SimulatorConfig, SimulatorDriver};
use peakcam::config::CameraConfig;
use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

#[derive(Default)]
pub struct CountingTrigger {
    pub count: AtomicUsize
}

impl TriggerDevice for CountingTrigger {
    fn trigger(&self) -> Result<(), CameraError> {
        self.count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Records every host notification.
#[derive(Default)]
pub struct RecordingHost {
    pub finished: Mutex<Vec<Result<(), CameraError>>>,
    pub exposures: Mutex<Vec<f64>>,
    pub prepared: AtomicUsize,
    pub trigger: Arc<CountingTrigger>
}

impl RecordingHost {
    pub fn finished_count(&self) -> usize {
        self.finished.lock().unwrap().len()
    }

    pub fn last_finished(&self) -> Option<Result<(), CameraError>> {
        self.finished.lock().unwrap().last().cloned()
    }
}

impl HostCallbacks for RecordingHost {
    fn prepare_for_acquisition(&self) -> Result<(), CameraError> {
        self.prepared.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn exposure_changed(&self, exposure_ms: f64) {
        self.exposures.lock().unwrap().push(exposure_ms);
    }

    fn acquisition_finished(&self, result: &Result<(), CameraError>) {
        self.finished.lock().unwrap().push(result.clone());
    }

    fn trigger_device(&self, name: &str) -> Option<Arc<dyn TriggerDevice>> {
        if name == "Counter" {
            let trigger: Arc<dyn TriggerDevice> = self.trigger.clone();
            Some(trigger)
        } else {
            None
        }
    }
}

pub struct Rig {
    pub camera: PeakCamera,
    pub device: Arc<SimulatedCamera>,
    pub sink: Arc<ChannelSink>,
    pub host: Arc<RecordingHost>
}

pub fn rig_with(simulator: SimulatorConfig, config: &CameraConfig, sink_capacity: usize) -> Rig {
    let mut driver = SimulatorDriver::new(simulator);
    let sink = Arc::new(ChannelSink::new(sink_capacity));
    let host = Arc::new(RecordingHost::default());
    let camera = PeakCamera::initialize(
        &mut driver,
        Collaborators{ sink: sink.clone(), host: host.clone() },
        config
    ).unwrap();
    let device = driver.camera().unwrap();

    Rig{ camera, device, sink, host }
}

pub fn rig() -> Rig {
    rig_with(SimulatorConfig::default(), &CameraConfig::default(), 64)
}

/// Simulator that paces frames in real time.
pub fn realtime_rig(sink_capacity: usize) -> Rig {
    rig_with(SimulatorConfig{ realtime: true, ..SimulatorConfig::default() }, &CameraConfig::default(), sink_capacity)
}

pub fn wait_until<F: Fn() -> bool>(timeout: Duration, condition: F) -> bool {
    let start = Instant::now();
    while start.elapsed() < timeout {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    condition()
}
