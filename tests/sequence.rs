//
// Peakcam - Frame acquisition for IDS peak USB cameras
// Copyright (c) 2021 Filip Szczerek <ga.software@yahoo.com>
//
// This project is licensed under the terms of the MIT license
// (see the LICENSE file for details).
//

mod common;

use common::*;
use peakcam::camera::{AcquisitionState, CameraError, Device, FrameCount, GainChannel, PixelType, SequenceRequest};
use peakcam::camera::drivers::simulator::{FaultInjection, SimulatedCamera};
use std::sync::atomic::Ordering;
use std::time::Duration;

const WAIT: Duration = Duration::from_secs(5);

fn finite(frames: u32) -> SequenceRequest {
    SequenceRequest{ frame_count: FrameCount::Finite(frames), interval_ms: 5.0, stop_on_overflow: false }
}

fn unbounded(stop_on_overflow: bool) -> SequenceRequest {
    SequenceRequest{ frame_count: FrameCount::Unbounded, interval_ms: 5.0, stop_on_overflow }
}

#[test]
fn finite_sequence_delivers_all_frames() {
    let mut rig = realtime_rig(16);
    let roi = rig.camera.set_roi(8, 12, 64, 32).unwrap();

    rig.camera.start_sequence_acquisition(finite(3)).unwrap();
    let frames: Vec<_> = (0..3).map(|_| rig.sink.receiver().recv_timeout(WAIT).unwrap()).collect();
    assert!(wait_until(WAIT, || !rig.camera.is_capturing()));
    rig.camera.stop_sequence_acquisition();

    for (i, frame) in frames.iter().enumerate() {
        assert_eq!(i as u64, frame.metadata.image_number);
        assert_eq!("IDSPeak", frame.metadata.camera);
        assert_eq!((8, 12), (frame.metadata.roi_x, frame.metadata.roi_y));
        assert_eq!(1, frame.metadata.binning);
        assert_eq!(SimulatedCamera::pattern(roi), frame.image.pixels());
    }
    assert!(frames[0].metadata.elapsed_ms <= frames[2].metadata.elapsed_ms);
    assert!(rig.sink.is_empty());

    assert_eq!(3, rig.camera.frames_produced());
    assert_eq!(1, rig.host.finished_count());
    assert_eq!(Some(Ok(())), rig.host.last_finished());
    assert_eq!(None, rig.camera.last_error());
    assert_eq!(0, rig.device.outstanding_frames());
    assert!(!rig.device.is_acquisition_started());
}

#[test]
fn frame_failure_ends_sequence() {
    let mut rig = realtime_rig(16);
    rig.device.set_faults(FaultInjection{ fail_wait: Some(3), ..FaultInjection::default() });

    rig.camera.start_sequence_acquisition(finite(3)).unwrap();
    assert!(wait_until(WAIT, || rig.host.finished_count() > 0));
    rig.camera.stop_sequence_acquisition();

    assert_eq!(2, rig.sink.len());
    assert_eq!(2, rig.camera.frames_produced());
    assert_eq!(1, rig.host.finished_count());
    assert_eq!(Some(Err(CameraError::AcquisitionFrame)), rig.host.last_finished());
    assert_eq!(Some(CameraError::AcquisitionFrame), rig.camera.last_error());
    assert_eq!(1, rig.device.stats().acquisition_stops);
    assert_eq!(AcquisitionState::Idle, rig.camera.acquisition_state());
}

#[test]
fn failed_start_is_reported_once() {
    let mut rig = realtime_rig(16);
    rig.device.set_faults(FaultInjection{ fail_start: true, ..FaultInjection::default() });

    rig.camera.start_sequence_acquisition(finite(3)).unwrap();
    assert!(wait_until(WAIT, || rig.host.finished_count() > 0));
    rig.camera.stop_sequence_acquisition();

    assert_eq!(Some(Err(CameraError::AcquisitionStart)), rig.host.last_finished());
    assert_eq!(1, rig.host.finished_count());
    assert!(rig.sink.is_empty());
}

#[test]
fn second_start_is_refused_while_running() {
    let mut rig = realtime_rig(16);
    rig.camera.start_sequence_acquisition(unbounded(false)).unwrap();

    assert_eq!(Err(CameraError::CameraBusy), rig.camera.start_sequence_acquisition(finite(3)));
    assert_eq!(Err(CameraError::CameraBusy), rig.camera.start_continuous_acquisition(5.0));

    rig.camera.stop_sequence_acquisition();
    assert_eq!(1, rig.host.finished_count());
}

#[test]
fn empty_sequence_is_invalid() {
    let mut rig = realtime_rig(16);

    match rig.camera.start_sequence_acquisition(finite(0)) {
        Err(CameraError::InvalidValue(_)) => (),
        other => panic!("unexpected result: {:?}", other)
    }
    assert!(!rig.camera.is_capturing());
    assert_eq!(0, rig.host.prepared.load(Ordering::SeqCst));
}

#[test]
fn stop_interrupts_unbounded_sequence() {
    let mut rig = realtime_rig(16);
    rig.camera.start_sequence_acquisition(unbounded(false)).unwrap();
    assert_eq!(1, rig.host.prepared.load(Ordering::SeqCst));
    assert!(wait_until(WAIT, || rig.camera.frames_produced() >= 2));

    rig.camera.stop_sequence_acquisition();

    assert_eq!(AcquisitionState::Idle, rig.camera.acquisition_state());
    assert_eq!(1, rig.host.finished_count());
    assert_eq!(Some(Ok(())), rig.host.last_finished());
    let stats = rig.device.stats();
    assert_eq!(1, stats.acquisition_starts);
    assert_eq!(1, stats.acquisition_stops);
    assert_eq!(0, rig.device.outstanding_frames());

    rig.camera.stop_sequence_acquisition();
    assert_eq!(1, rig.host.finished_count());
}

#[test]
fn measured_interval_follows_frame_period() {
    let mut rig = realtime_rig(16);
    rig.camera.start_sequence_acquisition(SequenceRequest{
        frame_count: FrameCount::Finite(4),
        interval_ms: 20.0,
        stop_on_overflow: false
    }).unwrap();
    assert!(wait_until(WAIT, || rig.host.finished_count() > 0));
    rig.camera.stop_sequence_acquisition();

    assert!((rig.camera.frame_rate() - 50.0).abs() < 0.11);
    assert!(rig.camera.measured_interval_ms() >= 15.0);
}

#[test]
fn overflow_stops_sequence_when_requested() {
    let mut rig = realtime_rig(2);

    rig.camera.start_sequence_acquisition(unbounded(true)).unwrap();
    assert!(wait_until(WAIT, || rig.host.finished_count() > 0));
    rig.camera.stop_sequence_acquisition();

    assert_eq!(Some(Err(CameraError::BufferOverflow)), rig.host.last_finished());
    assert_eq!(Some(CameraError::BufferOverflow), rig.camera.last_error());
    assert_eq!(2, rig.camera.frames_produced());
    assert_eq!(0, rig.device.outstanding_frames());
}

#[test]
fn overflow_discards_backlog_otherwise() {
    let mut rig = realtime_rig(2);

    rig.camera.start_sequence_acquisition(unbounded(false)).unwrap();
    assert!(wait_until(WAIT, || rig.camera.frames_produced() >= 6));
    assert!(rig.camera.is_capturing());
    rig.camera.stop_sequence_acquisition();

    assert_eq!(Some(Ok(())), rig.host.last_finished());
    assert!(rig.sink.len() <= 2);
    let newest = rig.sink.receiver().try_iter().last().unwrap();
    assert!(newest.metadata.image_number >= 5);
}

#[test]
fn suspended_sequence_produces_nothing() {
    let mut rig = realtime_rig(64);
    rig.camera.start_sequence_acquisition(unbounded(false)).unwrap();
    assert!(wait_until(WAIT, || rig.camera.frames_produced() >= 1));

    rig.camera.suspend_sequence_acquisition();
    assert_eq!(AcquisitionState::Suspended, rig.camera.acquisition_state());
    assert!(rig.camera.is_capturing());
    assert!(wait_until(WAIT, || !rig.device.is_acquisition_started()));
    let produced = rig.camera.frames_produced();
    std::thread::sleep(Duration::from_millis(60));
    assert_eq!(produced, rig.camera.frames_produced());
    assert_eq!(1, rig.device.stats().acquisition_stops);
    assert_eq!(0, rig.device.outstanding_frames());

    rig.camera.resume_sequence_acquisition();
    assert_eq!(AcquisitionState::Running, rig.camera.acquisition_state());
    assert!(wait_until(WAIT, || rig.camera.frames_produced() > produced));
    assert_eq!(2, rig.device.stats().acquisition_starts);

    rig.camera.stop_sequence_acquisition();
    assert_eq!(1, rig.host.finished_count());
    assert_eq!(Some(Ok(())), rig.host.last_finished());
    let numbers: Vec<u64> = rig.sink.receiver().try_iter().map(|f| f.metadata.image_number).collect();
    assert!(numbers.windows(2).all(|pair| pair[1] == pair[0] + 1));
}

#[test]
fn stop_releases_suspended_sequence() {
    let mut rig = realtime_rig(64);
    rig.camera.start_sequence_acquisition(unbounded(false)).unwrap();
    rig.camera.suspend_sequence_acquisition();

    rig.camera.stop_sequence_acquisition();

    assert_eq!(AcquisitionState::Idle, rig.camera.acquisition_state());
    assert_eq!(Some(Ok(())), rig.host.last_finished());
}

#[test]
fn layout_changes_are_refused_while_running() {
    let mut rig = realtime_rig(64);
    rig.camera.start_sequence_acquisition(unbounded(false)).unwrap();

    assert_eq!(Err(CameraError::CameraBusy), rig.camera.set_roi(0, 0, 64, 64).map(|_| ()));
    assert_eq!(Err(CameraError::CameraBusy), rig.camera.clear_roi());
    assert_eq!(Err(CameraError::CameraBusy), rig.camera.set_binning(2));
    assert_eq!(Err(CameraError::CameraBusy), rig.camera.set_pixel_type(PixelType::Rgba32));
    assert_eq!(Err(CameraError::CameraBusy), rig.camera.set_gain(GainChannel::Master, 2.0));
    rig.camera.set_exposure(2.0).unwrap();
    assert!((rig.camera.exposure() - 2.0).abs() < 0.011);

    rig.camera.stop_sequence_acquisition();
    rig.camera.set_binning(2).unwrap();
}

#[test]
fn trigger_device_fires_per_frame() {
    let mut rig = realtime_rig(16);
    rig.camera.set_trigger_device("Counter");

    rig.camera.start_sequence_acquisition(finite(3)).unwrap();
    assert!(wait_until(WAIT, || rig.host.finished_count() > 0));
    rig.camera.stop_sequence_acquisition();

    assert_eq!(3, rig.host.trigger.count.load(Ordering::SeqCst));
}

#[test]
fn unknown_trigger_device_is_ignored() {
    let mut rig = realtime_rig(16);
    rig.camera.set_trigger_device("Shutter");

    rig.camera.start_sequence_acquisition(finite(2)).unwrap();
    assert!(wait_until(WAIT, || rig.host.finished_count() > 0));
    rig.camera.stop_sequence_acquisition();

    assert_eq!(Some(Ok(())), rig.host.last_finished());
    assert_eq!(0, rig.host.trigger.count.load(Ordering::SeqCst));
}

#[test]
fn camera_can_be_restarted_after_sequence() {
    let mut rig = realtime_rig(16);

    rig.camera.start_sequence_acquisition(finite(2)).unwrap();
    assert!(wait_until(WAIT, || rig.host.finished_count() == 1));
    rig.camera.start_sequence_acquisition(finite(2)).unwrap();
    assert!(wait_until(WAIT, || rig.host.finished_count() == 2));
    rig.camera.stop_sequence_acquisition();

    assert_eq!(4, rig.sink.len());
    assert_eq!(2, rig.device.stats().acquisition_starts);
    rig.camera.snap_image().unwrap();
}

#[test]
fn shutdown_stops_running_sequence() {
    let mut rig = realtime_rig(16);
    rig.camera.start_sequence_acquisition(unbounded(false)).unwrap();

    rig.camera.shutdown().unwrap();

    assert_eq!(1, rig.host.finished_count());
    assert!(rig.device.is_closed());
    assert_eq!(Err(CameraError::NotInitialized), rig.camera.snap_image());
}
