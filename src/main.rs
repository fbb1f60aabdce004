//
// Peakcam - Frame acquisition for IDS peak USB cameras
// Copyright (c) 2021 Filip Szczerek <ga.software@yahoo.com>
//
// This project is licensed under the terms of the MIT license
// (see the LICENSE file for details).
//

//!
//! Acquires a snapshot and a short sequence from the simulated camera.
//!
//! Usage: `peakcam [CONFIG_FILE]`
//!

use log::{error, info, warn};
use peakcam::camera::{ChannelSink, Collaborators, FrameCount, NullHost, SequenceRequest};
use peakcam::camera::drivers::simulator::{SimulatorConfig, SimulatorDriver};
use peakcam::config::Config;
use peakcam::{logging, CameraError, PeakCamera};
use std::sync::Arc;
use std::time::Duration;

const SEQUENCE_LENGTH: u32 = 10;
const SINK_CAPACITY: usize = 16;

fn main() {
    let config = match std::env::args().nth(1) {
        Some(path) => Config::load(std::path::Path::new(&path)),
        None => Config::load_default()
    };
    let config = match config {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = logging::init(&config.logging) {
        eprintln!("{}", e);
    }

    if let Err(e) = run(&config) {
        error!("{}", e);
        std::process::exit(1);
    }
}

fn run(config: &Config) -> Result<(), CameraError> {
    let mut driver = SimulatorDriver::new(SimulatorConfig{ realtime: true, ..SimulatorConfig::default() });
    let sink = Arc::new(ChannelSink::new(SINK_CAPACITY));
    let mut camera = PeakCamera::initialize(
        &mut driver,
        Collaborators{ sink: sink.clone(), host: Arc::new(NullHost) },
        &config.camera
    )?;

    camera.snap_image()?;
    let image = camera.image();
    let mean = image.pixels().iter().map(|&p| p as f64).sum::<f64>() / image.byte_size().max(1) as f64;
    info!("Snapped {}x{} image, mean value {:.1}", image.width(), image.height(), mean);

    camera.start_sequence_acquisition(SequenceRequest{
        frame_count: FrameCount::Finite(SEQUENCE_LENGTH),
        interval_ms: 20.0,
        stop_on_overflow: config.camera.stop_on_overflow
    })?;
    let frames = sink.receiver();
    for _ in 0..SEQUENCE_LENGTH {
        match frames.recv_timeout(Duration::from_secs(5)) {
            Ok(frame) => info!("Frame #{} at {:.1} ms", frame.metadata.image_number, frame.metadata.elapsed_ms),
            Err(e) => {
                warn!("No frame received: {}", e);
                break;
            }
        }
    }
    camera.stop_sequence_acquisition();
    if let Some(e) = camera.last_error() {
        return Err(e);
    }

    camera.shutdown()
}
