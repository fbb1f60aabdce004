//
// Peakcam - Frame acquisition for IDS peak USB cameras
// Copyright (c) 2021 Filip Szczerek <ga.software@yahoo.com>
//
// This project is licensed under the terms of the MIT license
// (see the LICENSE file for details).
//

mod common;

use common::*;
use peakcam::camera::{
    AutoWhiteBalance,
    CameraError,
    ChannelSink,
    Collaborators,
    Feature,
    GainChannel,
    NullHost,
    PeakCamera,
    PixelType,
    Roi
};
use peakcam::camera::drivers::simulator::{SimulatedCamera, SimulatorConfig, SimulatorDriver};
use peakcam::config::CameraConfig;
use std::sync::Arc;

#[test]
fn properties_can_be_read_and_written_by_name() {
    let mut rig = rig();

    rig.camera.set_property("Exposure", "25").unwrap();
    assert!((rig.camera.exposure() - 25.0).abs() < 0.011);
    let exposure: f64 = rig.camera.property("Exposure").unwrap().parse().unwrap();
    assert!((exposure - 25.0).abs() < 0.011);

    rig.camera.set_property("Gain", "2.5").unwrap();
    assert_eq!("2.5", rig.camera.property("Gain").unwrap());
    rig.camera.set_property("Gain Blue", "100").unwrap();
    assert_eq!(8.0, rig.camera.gain(GainChannel::Blue));

    rig.camera.set_property("TriggerDevice", "Counter").unwrap();
    assert_eq!("Counter", rig.camera.trigger_device());

    rig.camera.set_property("ReadoutTime", "0").unwrap();
    assert_eq!("0", rig.camera.property("ReadoutTime").unwrap());

    assert_eq!("U3-3880CP-M-GL Sim", rig.camera.property("CameraName").unwrap());
    assert_eq!("4104000001", rig.camera.property("CameraID").unwrap());
    assert_eq!("1.6.2", rig.camera.property("FirmwareVersion").unwrap());
    assert_eq!("512", rig.camera.property("OnCameraCCDXSize").unwrap());
    assert_eq!("512", rig.camera.property("OnCameraCCDYSize").unwrap());
    assert_eq!("38.5", rig.camera.property("CCDTemperature").unwrap());
}

#[test]
fn unknown_and_read_only_properties() {
    let mut rig = rig();

    assert_eq!(Err(CameraError::UnknownProperty("Shutter".to_string())), rig.camera.property("Shutter"));
    assert_eq!(Err(CameraError::UnknownProperty("Shutter".to_string())), rig.camera.set_property("Shutter", "1"));
    assert_eq!(Err(CameraError::ReadOnlyProperty("Framerate".to_string())), rig.camera.set_property("Framerate", "10"));
    assert_eq!(Err(CameraError::ReadOnlyProperty("CameraName".to_string())), rig.camera.set_property("CameraName", "x"));

    match rig.camera.set_property("Exposure", "fast") {
        Err(CameraError::InvalidValue(_)) => (),
        other => panic!("unexpected result: {:?}", other)
    }
    match rig.camera.set_property("PixelType", "16bit") {
        Err(CameraError::InvalidValue(_)) => (),
        other => panic!("unexpected result: {:?}", other)
    }
}

#[test]
fn property_names_and_allowed_values() {
    let rig = rig();

    let names = rig.camera.property_names();
    for name in &["Exposure", "Binning", "PixelType", "Auto white balance", "AllowMultiROI", "PixelSizeUm"] {
        assert!(names.contains(name), "{}", name);
    }

    assert_eq!(
        Some(vec!["1".to_string(), "2".to_string(), "4".to_string()]),
        rig.camera.allowed_property_values("Binning").unwrap()
    );
    assert_eq!(
        Some(vec!["8bit".to_string(), "32bit RGBA".to_string()]),
        rig.camera.allowed_property_values("PixelType").unwrap()
    );
    assert_eq!(
        Some(vec!["Off".to_string(), "Once".to_string(), "Continuous".to_string()]),
        rig.camera.allowed_property_values("Auto white balance").unwrap()
    );
    assert_eq!(None, rig.camera.allowed_property_values("Exposure").unwrap());
}

#[test]
fn binning_rescales_image_and_pixel_size() {
    let mut rig = rig();
    rig.camera.set_roi(64, 32, 128, 64).unwrap();

    rig.camera.set_property("Binning", "2").unwrap();

    assert_eq!(2, rig.camera.binning());
    assert_eq!(Roi::new(32, 16, 64, 32), rig.camera.roi());
    assert_eq!("2", rig.camera.property("PixelSizeUm").unwrap());
    assert_eq!(400.0, rig.camera.frame_rate_range().max);
    assert_eq!(2, rig.device.binning());

    match rig.camera.set_binning(3) {
        Err(CameraError::InvalidValue(_)) => (),
        other => panic!("unexpected result: {:?}", other)
    }
    assert_eq!(2, rig.camera.binning());
}

#[test]
fn pixel_type_changes_buffer_layout() {
    let mut rig = rig();

    rig.camera.set_property("PixelType", "32bit RGBA").unwrap();

    assert_eq!(PixelType::Rgba32, rig.camera.pixel_type());
    assert_eq!(4, rig.camera.number_of_components());
    assert_eq!(4, rig.camera.image_bytes_per_pixel());
    assert_eq!(512 * 512 * 4, rig.camera.image_buffer_size());
    assert_eq!(8, rig.camera.bit_depth());

    rig.camera.set_property("PixelType", "8bit").unwrap();
    assert_eq!(1, rig.camera.image_bytes_per_pixel());
}

#[test]
fn auto_white_balance_by_name() {
    let mut rig = rig();

    rig.camera.set_property("Auto white balance", "Continuous").unwrap();

    assert_eq!(AutoWhiteBalance::Continuous, rig.camera.auto_white_balance());
    assert_eq!("Continuous", rig.camera.property("Auto white balance").unwrap());
}

#[test]
fn read_only_feature_is_refused() {
    let mut rig = rig();
    rig.device.set_read_only(Feature::Roi, true);

    assert_eq!(Err(CameraError::NoWriteAccess(Feature::Roi)), rig.camera.set_roi(0, 0, 64, 64).map(|_| ()));
    assert_eq!(Roi::new(0, 0, 512, 512), rig.camera.roi());

    rig.device.set_read_only(Feature::Gain, true);
    assert_eq!(Err(CameraError::NoWriteAccess(Feature::Gain)), rig.camera.set_gain(GainChannel::Master, 2.0));
}

#[test]
fn frame_rate_limits_are_host_adjustable() {
    let mut rig = rig();

    rig.camera.set_property("Maximum framerate", "50").unwrap();
    rig.camera.set_property("Minimum framerate", "2").unwrap();

    assert_eq!("50", rig.camera.property("Maximum framerate").unwrap());
    assert_eq!("2", rig.camera.property("Minimum framerate").unwrap());
    assert!(rig.camera.set_property("Minimum framerate", "60").is_err());
}

#[test]
fn maximum_framerate_is_bounded_by_device() {
    let mut rig = rig();
    let device_max = rig.camera.frame_rate_range().max;

    match rig.camera.set_property("Maximum framerate", "1000") {
        Err(CameraError::InvalidValue(_)) => (),
        other => panic!("unexpected result: {:?}", other)
    }
    assert_eq!(device_max, rig.camera.frame_rate_range().max);

    rig.camera.set_exposure(0.02).unwrap();
    rig.camera.snap_image().unwrap();
    assert!(rig.camera.frame_rate() <= device_max + 1e-9);
    assert_eq!(Some(rig.camera.frame_rate()), rig.device.stats().last_frame_rate);
}

#[test]
fn non_finite_exposure_is_refused() {
    let mut rig = rig();
    rig.camera.set_exposure(5.0).unwrap();
    let exposure = rig.camera.exposure();

    for value in &["NaN", "inf", "-3"] {
        match rig.camera.set_property("Exposure", value) {
            Err(CameraError::InvalidValue(_)) => (),
            other => panic!("unexpected result for {}: {:?}", value, other)
        }
    }
    assert_eq!(exposure, rig.camera.exposure());
}

#[test]
fn multi_roi_requires_permission() {
    let mut rig = rig();
    let rois = [Roi::new(0, 0, 16, 16), Roi::new(48, 48, 16, 16)];

    assert_eq!(Err(CameraError::UnsupportedCommand), rig.camera.set_multi_roi(&rois).map(|_| ()));

    rig.camera.set_property("AllowMultiROI", "1").unwrap();
    assert_eq!("1", rig.camera.property("AllowMultiROI").unwrap());
    let bbox = rig.camera.set_multi_roi(&rois).unwrap();

    assert_eq!(Roi::new(0, 0, 64, 64), bbox);
    assert_eq!(2, rig.camera.multi_roi_count());
    assert_eq!(&rois[..], rig.camera.multi_roi());
    assert_eq!(bbox, rig.device.roi());

    let mut copy = [Roi::default(); 3];
    assert_eq!(Ok(2), rig.camera.copy_multi_roi(&mut copy));
    assert_eq!(rois[1], copy[1]);
    let mut too_small = [Roi::default(); 1];
    assert!(rig.camera.copy_multi_roi(&mut too_small).is_err());

    rig.camera.set_multi_roi(&[]).unwrap();
    assert_eq!(0, rig.camera.multi_roi_count());
    assert_eq!(Roi::new(0, 0, 512, 512), rig.camera.roi());
}

#[test]
fn multi_roi_fills_uncovered_pixels() {
    let mut rig = rig();
    rig.camera.set_allow_multi_roi(true);
    rig.camera.set_property("MultiROIFillValue", "7").unwrap();
    rig.camera.set_multi_roi_arrays(&[0, 48], &[0, 48], &[16, 16], &[16, 16]).unwrap();

    rig.camera.snap_image().unwrap();

    let image = rig.camera.image();
    assert_eq!((64, 64), (image.width(), image.height()));
    assert_eq!(SimulatedCamera::pattern_value(1, 0), image.pixels()[1]);
    assert_eq!(SimulatedCamera::pattern_value(50, 50), image.pixels()[50 * 64 + 50]);
    assert_eq!(7, image.pixels()[20 * 64 + 20]);
}

#[test]
fn multi_roi_arrays_must_match() {
    let mut rig = rig();
    rig.camera.set_allow_multi_roi(true);

    match rig.camera.set_multi_roi_arrays(&[0, 10], &[0], &[16, 16], &[16, 16]) {
        Err(CameraError::InvalidValue(_)) => (),
        other => panic!("unexpected result: {:?}", other)
    }
    assert!(rig.camera.set_multi_roi_fill_value(65_537).is_err());
}

#[test]
fn exposure_sequences_need_to_be_enabled() {
    let mut rig = rig();

    assert_eq!(Err(CameraError::UnsupportedCommand), rig.camera.add_to_exposure_sequence(5.0));
    assert_eq!(Err(CameraError::UnsupportedCommand), rig.camera.exposure_sequence_max_length());
    assert_eq!(Err(CameraError::UnsupportedCommand), rig.camera.send_exposure_sequence());

    rig.camera.set_property("UseExposureSequences", "Yes").unwrap();
    assert_eq!("Yes", rig.camera.property("UseExposureSequences").unwrap());
    assert_eq!(Ok(100), rig.camera.exposure_sequence_max_length());
    rig.camera.add_to_exposure_sequence(5.0).unwrap();
    rig.camera.send_exposure_sequence().unwrap();
    rig.camera.clear_exposure_sequence().unwrap();
    rig.camera.stop_exposure_sequence().unwrap();
}

#[test]
fn configuration_is_applied_on_initialize() {
    let config = CameraConfig{
        label: "Left".to_string(),
        binning: 2,
        pixel_type: "32bit RGBA".to_string(),
        exposure_ms: 4.0,
        allow_multi_roi: true,
        multi_roi_fill_value: 12,
        use_exposure_sequences: true,
        readout_time_ms: 3.0,
        ..CameraConfig::default()
    };

    let rig = rig_with(SimulatorConfig::default(), &config, 8);

    assert_eq!("Left", rig.camera.label());
    assert_eq!(2, rig.camera.binning());
    assert_eq!((256, 256), (rig.camera.image_width(), rig.camera.image_height()));
    assert_eq!(PixelType::Rgba32, rig.camera.pixel_type());
    assert!((rig.camera.exposure() - 4.0).abs() < 0.011);
    assert!(rig.camera.allows_multi_roi());
    assert_eq!(12, rig.camera.multi_roi_fill_value());
    assert!(rig.camera.uses_exposure_sequences());
    assert!((rig.camera.readout_time_ms() - 3.0).abs() < 1e-6);
}

#[test]
fn invalid_configuration_is_rejected() {
    let mut driver = SimulatorDriver::new(SimulatorConfig::default());
    let config = CameraConfig{ pixel_type: "12bit".to_string(), ..CameraConfig::default() };

    let result = PeakCamera::initialize(
        &mut driver,
        Collaborators{ sink: Arc::new(ChannelSink::new(1)), host: Arc::new(NullHost) },
        &config
    );

    match result {
        Err(CameraError::InvalidValue(_)) => (),
        Err(e) => panic!("unexpected error: {}", e),
        Ok(_) => panic!("configuration accepted")
    }
}

#[test]
fn missing_camera_is_reported() {
    let mut driver = SimulatorDriver::without_cameras();

    let result = PeakCamera::initialize(
        &mut driver,
        Collaborators{ sink: Arc::new(ChannelSink::new(1)), host: Arc::new(NullHost) },
        &CameraConfig::default()
    );

    match result {
        Err(CameraError::CameraNotFound) => (),
        Err(e) => panic!("unexpected error: {}", e),
        Ok(_) => panic!("camera opened")
    }
}

#[test]
fn temperature_needs_firmware_version() {
    let rig = rig_with(
        SimulatorConfig{ firmware_version: None, ..SimulatorConfig::default() },
        &CameraConfig::default(),
        8
    );

    assert_eq!(Err(CameraError::NoReadAccess(Feature::DeviceTemperature)), rig.camera.temperature());
    assert_eq!("", rig.camera.property("FirmwareVersion").unwrap());
}

#[test]
fn shutdown_closes_device() {
    let mut rig = rig();

    rig.camera.shutdown().unwrap();
    rig.camera.shutdown().unwrap();

    assert!(rig.device.is_closed());
    assert_eq!(Err(CameraError::NotInitialized), rig.camera.temperature());
}

#[test]
fn drop_closes_device() {
    let rig = rig();
    let device = rig.device.clone();

    drop(rig);

    assert!(device.is_closed());
}
