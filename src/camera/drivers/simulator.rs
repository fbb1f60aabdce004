//
// Peakcam - Frame acquisition for IDS peak USB cameras
// Copyright (c) 2021 Filip Szczerek <ga.software@yahoo.com>
//
// This project is licensed under the terms of the MIT license
// (see the LICENSE file for details).
//

//!
//! Simulated camera driver.
//!
//! Behaves like a single connected IDS peak camera: GenICam feature access, ROI and binning
//! limits, finite and infinite acquisitions, frame conversion. Faults can be injected to
//! exercise error paths.
//!

use crate::camera::*;
use crate::camera::device::genicam;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Tolerance when checking frame rates against the device limits.
const FRAME_RATE_EPSILON: f64 = 1e-6;

/// Gains the simulated auto white balance settles on.
const AWB_RED_GAIN: f64 = 1.6;
const AWB_BLUE_GAIN: f64 = 1.9;

#[derive(Clone, Debug)]
pub struct SimulatorConfig {
    pub model_name: String,
    pub serial_number: String,
    pub firmware_version: Option<String>,
    /// Unbinned sensor width.
    pub sensor_width: u32,
    /// Unbinned sensor height.
    pub sensor_height: u32,
    /// If true, `WidthMax` and `HeightMax` are not available.
    pub hide_sensor_size: bool,
    pub roi_min_width: u32,
    pub roi_min_height: u32,
    pub roi_increment: u32,
    pub binning_factors: Vec<u32>,
    pub exposure_us: f64,
    pub exposure_range_us: FloatRange,
    /// Frame rate limits without binning; the maximum scales with the binning factor.
    pub frame_rate_range: FloatRange,
    pub gain_range: FloatRange,
    pub temperature: f64,
    /// If true, frame waits take one frame period.
    pub realtime: bool
}

impl Default for SimulatorConfig {
    fn default() -> SimulatorConfig {
        SimulatorConfig{
            model_name: "U3-3880CP-M-GL Sim".to_string(),
            serial_number: "4104000001".to_string(),
            firmware_version: Some("1.6.2".to_string()),
            sensor_width: 512,
            sensor_height: 512,
            hide_sensor_size: false,
            roi_min_width: 16,
            roi_min_height: 16,
            roi_increment: 4,
            binning_factors: vec![1, 2, 4],
            exposure_us: 10_000.0,
            exposure_range_us: FloatRange{ min: 20.0, max: 2_000_000.0, inc: 10.0 },
            frame_rate_range: FloatRange{ min: 0.1, max: 200.0, inc: 0.1 },
            gain_range: FloatRange{ min: 1.0, max: 8.0, inc: 0.01 },
            temperature: 38.5,
            realtime: false
        }
    }
}

/// Faults applied to frame waits count from the most recent acquisition start.
#[derive(Clone, Debug, Default)]
pub struct FaultInjection {
    /// 1-based index of the frame wait that fails with an error.
    pub fail_wait: Option<u64>,
    /// 1-based index of the frame wait that is aborted.
    pub abort_wait: Option<u64>,
    /// Number of timeouts reported before the first frame of an acquisition.
    pub timeouts_before_frame: u32,
    pub fail_start: bool,
    pub fail_release: bool,
    pub fail_convert: bool
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct SimulatorStats {
    pub acquisition_starts: u32,
    pub acquisition_stops: u32,
    pub frame_waits: u64,
    pub frames_delivered: u64,
    pub frames_released: u64,
    pub conversions: u64,
    pub last_roi: Option<Roi>,
    pub last_frame_rate: Option<f64>,
    pub last_binning: Option<u32>
}

struct Acquisition {
    remaining: Option<u32>,
    waits: u64,
    timeouts_left: u32
}

struct State {
    exposure_us: f64,
    frame_rate: f64,
    gains: [f64; 4],
    auto_white_balance: AutoFeatureMode,
    roi: Roi,
    binning: u32,
    pixel_format: PixelFormat,
    acquisition: Option<Acquisition>,
    faults: FaultInjection,
    read_only: HashSet<Feature>,
    stats: SimulatorStats,
    next_frame_id: u64,
    outstanding: HashSet<u64>,
    closed: bool
}

fn sim_error<T>(msg: &str) -> Result<T, DeviceError> {
    Err(DeviceError::Error(msg.to_string()))
}

pub struct SimulatedCamera {
    config: SimulatorConfig,
    state: Mutex<State>
}

impl SimulatedCamera {
    pub fn new(config: SimulatorConfig) -> SimulatedCamera {
        let state = State{
            exposure_us: config.exposure_us,
            frame_rate: config.frame_rate_range.max,
            gains: [1.0; 4],
            auto_white_balance: AutoFeatureMode::Off,
            roi: Roi::new(0, 0, config.sensor_width, config.sensor_height),
            binning: 1,
            pixel_format: PixelFormat::Mono8,
            acquisition: None,
            faults: FaultInjection::default(),
            read_only: HashSet::new(),
            stats: SimulatorStats::default(),
            next_frame_id: 0,
            outstanding: HashSet::new(),
            closed: false
        };

        SimulatedCamera{ config, state: Mutex::new(state) }
    }

    /// Test pattern value of the (binned) sensor pixel at `x`, `y`.
    pub fn pattern_value(x: u32, y: u32) -> u8 {
        ((x + 3 * y) % 251) as u8
    }

    /// Mono pattern covering `roi`.
    pub fn pattern(roi: Roi) -> Vec<u8> {
        let mut pixels = Vec::with_capacity(roi.width as usize * roi.height as usize);
        for y in roi.y..roi.bottom() {
            for x in roi.x..roi.right() {
                pixels.push(SimulatedCamera::pattern_value(x, y));
            }
        }
        pixels
    }

    pub fn set_faults(&self, faults: FaultInjection) {
        self.state().faults = faults;
    }

    pub fn set_read_only(&self, feature: Feature, read_only: bool) {
        let mut state = self.state();
        if read_only {
            state.read_only.insert(feature);
        } else {
            state.read_only.remove(&feature);
        }
    }

    pub fn stats(&self) -> SimulatorStats {
        self.state().stats.clone()
    }

    pub fn outstanding_frames(&self) -> usize {
        self.state().outstanding.len()
    }

    pub fn is_closed(&self) -> bool {
        self.state().closed
    }

    pub fn roi(&self) -> Roi {
        self.state().roi
    }

    pub fn binning(&self) -> u32 {
        self.state().binning
    }

    fn state(&self) -> MutexGuard<State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn check_writable(&self, state: &State, feature: Feature) -> Result<(), DeviceError> {
        if state.closed {
            sim_error("camera closed")
        } else if state.read_only.contains(&feature) {
            sim_error(&format!("{} is not writable", <&'static str>::from(feature)))
        } else {
            Ok(())
        }
    }

    fn next_frame(&self, state: &mut State) -> RawFrame {
        let id = state.next_frame_id;
        state.next_frame_id += 1;
        state.outstanding.insert(id);
        state.stats.frames_delivered += 1;

        let roi = state.roi;
        RawFrame::new(id, roi.width, roi.height, state.pixel_format, SimulatedCamera::pattern(roi))
    }

    fn frame_period(&self, state: &State) -> Duration {
        Duration::from_secs_f64(1.0 / state.frame_rate.max(self.config.frame_rate_range.min))
    }

    fn settle_white_balance(state: &mut State) {
        match state.auto_white_balance {
            AutoFeatureMode::Off => (),
            mode => {
                state.gains[GainChannel::Red.index()] = AWB_RED_GAIN;
                state.gains[GainChannel::Blue.index()] = AWB_BLUE_GAIN;
                if mode == AutoFeatureMode::Once {
                    state.auto_white_balance = AutoFeatureMode::Off;
                }
            }
        }
    }
}

enum WaitOutcome {
    Frame(RawFrame),
    Failed(DeviceError),
    TimedOut
}

impl Device for SimulatedCamera {
    fn info(&self) -> CameraInfo {
        CameraInfo{
            id: CameraId(0),
            model_name: self.config.model_name.clone(),
            serial_number: self.config.serial_number.clone()
        }
    }

    fn close(&self) -> Result<(), DeviceError> {
        let mut state = self.state();
        state.acquisition = None;
        state.closed = true;
        Ok(())
    }

    fn access_mode(&self, feature: Feature) -> ControlAccessMode {
        let state = self.state();
        if state.closed {
            ControlAccessMode::None
        } else if feature == Feature::DeviceTemperature || state.read_only.contains(&feature) {
            ControlAccessMode::ReadOnly
        } else {
            ControlAccessMode::ReadWrite
        }
    }

    fn exposure_time_us(&self) -> Result<f64, DeviceError> {
        Ok(self.state().exposure_us)
    }

    fn set_exposure_time_us(&self, value: f64) -> Result<(), DeviceError> {
        let mut state = self.state();
        self.check_writable(&state, Feature::ExposureTime)?;
        let range = &self.config.exposure_range_us;
        state.exposure_us = range.clamp((value / range.inc).round() * range.inc);
        Ok(())
    }

    fn exposure_time_range_us(&self) -> Result<FloatRange, DeviceError> {
        Ok(self.config.exposure_range_us)
    }

    fn frame_rate(&self) -> Result<f64, DeviceError> {
        Ok(self.state().frame_rate)
    }

    fn set_frame_rate(&self, fps: f64) -> Result<(), DeviceError> {
        let mut state = self.state();
        self.check_writable(&state, Feature::FrameRate)?;
        let max = self.config.frame_rate_range.max * state.binning as f64;
        if fps < self.config.frame_rate_range.min - FRAME_RATE_EPSILON || fps > max + FRAME_RATE_EPSILON {
            return sim_error(&format!("frame rate {} out of range", fps));
        }
        state.frame_rate = fps;
        state.stats.last_frame_rate = Some(fps);
        Ok(())
    }

    fn frame_rate_range(&self) -> Result<FloatRange, DeviceError> {
        let binning = self.state().binning as f64;
        let range = self.config.frame_rate_range;
        Ok(FloatRange{ min: range.min, max: range.max * binning, inc: range.inc })
    }

    fn gain(&self, channel: GainChannel) -> Result<f64, DeviceError> {
        Ok(self.state().gains[channel.index()])
    }

    fn set_gain(&self, channel: GainChannel, value: f64) -> Result<(), DeviceError> {
        let mut state = self.state();
        self.check_writable(&state, Feature::Gain)?;
        if value < self.config.gain_range.min || value > self.config.gain_range.max {
            return sim_error(&format!("gain {} out of range", value));
        }
        state.gains[channel.index()] = value;
        Ok(())
    }

    fn gain_range(&self, _channel: GainChannel) -> Result<FloatRange, DeviceError> {
        Ok(self.config.gain_range)
    }

    fn roi_size_range(&self) -> Result<SizeRange, DeviceError> {
        let binning = self.state().binning;
        Ok(SizeRange{
            min_width: self.config.roi_min_width,
            min_height: self.config.roi_min_height,
            max_width: self.config.sensor_width / binning,
            max_height: self.config.sensor_height / binning,
            inc_width: self.config.roi_increment,
            inc_height: self.config.roi_increment
        })
    }

    fn set_roi(&self, roi: Roi) -> Result<(), DeviceError> {
        let mut state = self.state();
        self.check_writable(&state, Feature::Roi)?;
        if state.acquisition.is_some() {
            return sim_error("cannot change ROI during acquisition");
        }
        let (max_width, max_height) = (self.config.sensor_width / state.binning, self.config.sensor_height / state.binning);
        if roi.width < self.config.roi_min_width || roi.height < self.config.roi_min_height
            || roi.right() > max_width || roi.bottom() > max_height {
            return sim_error(&format!("invalid ROI {:?}", roi));
        }
        state.roi = roi;
        state.stats.last_roi = Some(roi);
        Ok(())
    }

    fn binning_factors(&self) -> Result<Vec<u32>, DeviceError> {
        Ok(self.config.binning_factors.clone())
    }

    fn set_binning(&self, x: u32, y: u32) -> Result<(), DeviceError> {
        let mut state = self.state();
        self.check_writable(&state, Feature::Binning)?;
        if x != y || !self.config.binning_factors.contains(&x) {
            return sim_error(&format!("unsupported binning {}x{}", x, y));
        }
        let old = state.binning;
        state.roi = state.roi.rescaled(old, x);
        state.binning = x;
        state.frame_rate = state.frame_rate.min(self.config.frame_rate_range.max * x as f64);
        state.stats.last_binning = Some(x);
        Ok(())
    }

    fn set_pixel_format(&self, format: PixelFormat) -> Result<(), DeviceError> {
        let mut state = self.state();
        self.check_writable(&state, Feature::PixelFormat)?;
        if format == PixelFormat::Bgra8 {
            return sim_error("sensor does not output BGRA8");
        }
        state.pixel_format = format;
        Ok(())
    }

    fn auto_white_balance(&self) -> Result<AutoFeatureMode, DeviceError> {
        Ok(self.state().auto_white_balance)
    }

    fn set_auto_white_balance(&self, mode: AutoFeatureMode) -> Result<(), DeviceError> {
        let mut state = self.state();
        self.check_writable(&state, Feature::AutoWhiteBalance)?;
        state.auto_white_balance = mode;
        Ok(())
    }

    fn start_acquisition(&self, length: AcquisitionLength) -> Result<(), DeviceError> {
        let mut state = self.state();
        if state.closed {
            return sim_error("camera closed");
        }
        if state.faults.fail_start {
            return sim_error("simulated start failure");
        }
        if state.acquisition.is_some() {
            return sim_error("acquisition already started");
        }
        let remaining = match length {
            AcquisitionLength::Frames(n) => Some(n),
            AcquisitionLength::Infinite => None
        };
        let timeouts_left = state.faults.timeouts_before_frame;
        state.acquisition = Some(Acquisition{ remaining, waits: 0, timeouts_left });
        state.stats.acquisition_starts += 1;
        Ok(())
    }

    fn stop_acquisition(&self) -> Result<(), DeviceError> {
        let mut state = self.state();
        if state.acquisition.take().is_none() {
            return sim_error("acquisition not started");
        }
        state.stats.acquisition_stops += 1;
        Ok(())
    }

    fn is_acquisition_started(&self) -> bool {
        self.state().acquisition.is_some()
    }

    fn wait_for_frame(&self, timeout: Duration) -> Result<RawFrame, DeviceError> {
        let (outcome, period) = {
            let mut guard = self.state();
            let state = &mut *guard;
            state.stats.frame_waits += 1;
            let period = self.frame_period(state);

            let acquisition = match state.acquisition.as_mut() {
                Some(acquisition) => acquisition,
                None => return sim_error("acquisition not started")
            };
            acquisition.waits += 1;

            let outcome = if state.faults.fail_wait == Some(acquisition.waits) {
                WaitOutcome::Failed(DeviceError::Error("simulated transfer failure".to_string()))
            } else if state.faults.abort_wait == Some(acquisition.waits) {
                WaitOutcome::Failed(DeviceError::Aborted)
            } else if acquisition.timeouts_left > 0 {
                acquisition.timeouts_left -= 1;
                WaitOutcome::Failed(DeviceError::Timeout)
            } else if acquisition.remaining == Some(0) {
                WaitOutcome::TimedOut
            } else {
                let finished = match acquisition.remaining.as_mut() {
                    Some(remaining) => { *remaining -= 1; *remaining == 0 },
                    None => false
                };
                if finished {
                    state.acquisition = None;
                }
                SimulatedCamera::settle_white_balance(state);
                WaitOutcome::Frame(self.next_frame(state))
            };

            (outcome, period)
        };

        match outcome {
            WaitOutcome::Frame(frame) => {
                if self.config.realtime {
                    std::thread::sleep(period.min(timeout));
                }
                Ok(frame)
            },
            WaitOutcome::Failed(error) => Err(error),
            WaitOutcome::TimedOut => {
                if self.config.realtime {
                    std::thread::sleep(timeout);
                }
                Err(DeviceError::Timeout)
            }
        }
    }

    fn release_frame(&self, frame: RawFrame) -> Result<(), DeviceError> {
        let mut state = self.state();
        if state.faults.fail_release {
            return sim_error("simulated release failure");
        }
        if !state.outstanding.remove(&frame.id()) {
            return sim_error(&format!("frame {} is not outstanding", frame.id()));
        }
        state.stats.frames_released += 1;
        Ok(())
    }

    fn convert_frame(&self, frame: &RawFrame, format: PixelFormat) -> Result<RawFrame, DeviceError> {
        if format != PixelFormat::Bgra8 {
            return sim_error("only conversion to BGRA8 is supported");
        }
        if self.state().faults.fail_convert {
            return sim_error("simulated conversion failure");
        }

        let mut data = Vec::with_capacity(frame.data().len() * 4);
        for &value in frame.data() {
            data.extend_from_slice(&[value, value, value, 0xFF]);
        }

        let mut state = self.state();
        let id = state.next_frame_id;
        state.next_frame_id += 1;
        state.outstanding.insert(id);
        state.stats.conversions += 1;

        Ok(RawFrame::new(id, frame.width(), frame.height(), PixelFormat::Bgra8, data))
    }

    fn feature_access(&self, name: &str) -> ControlAccessMode {
        let available = match name {
            genicam::DEVICE_FIRMWARE_VERSION => self.config.firmware_version.is_some(),
            genicam::WIDTH_MAX | genicam::HEIGHT_MAX => !self.config.hide_sensor_size,
            genicam::DEVICE_TEMPERATURE | genicam::DEVICE_MODEL_NAME => true,
            _ => false
        };
        if available { ControlAccessMode::ReadOnly } else { ControlAccessMode::None }
    }

    fn feature_int(&self, name: &str) -> Result<i64, DeviceError> {
        let binning = self.state().binning;
        match name {
            genicam::WIDTH_MAX if !self.config.hide_sensor_size => Ok((self.config.sensor_width / binning) as i64),
            genicam::HEIGHT_MAX if !self.config.hide_sensor_size => Ok((self.config.sensor_height / binning) as i64),
            _ => sim_error(&format!("integer feature {} not available", name))
        }
    }

    fn feature_float(&self, name: &str) -> Result<f64, DeviceError> {
        match name {
            genicam::DEVICE_TEMPERATURE => Ok(self.config.temperature),
            _ => sim_error(&format!("float feature {} not available", name))
        }
    }

    fn feature_string(&self, name: &str) -> Result<String, DeviceError> {
        match (name, &self.config.firmware_version) {
            (genicam::DEVICE_FIRMWARE_VERSION, Some(version)) => Ok(version.clone()),
            (genicam::DEVICE_MODEL_NAME, _) => Ok(self.config.model_name.clone()),
            _ => sim_error(&format!("string feature {} not available", name))
        }
    }
}

pub struct SimulatorDriver {
    config: SimulatorConfig,
    connected: bool,
    camera: Option<Arc<SimulatedCamera>>
}

impl SimulatorDriver {
    pub fn new(config: SimulatorConfig) -> SimulatorDriver {
        SimulatorDriver{ config, connected: true, camera: None }
    }

    pub fn without_cameras() -> SimulatorDriver {
        SimulatorDriver{ config: SimulatorConfig::default(), connected: false, camera: None }
    }

    /// The most recently opened camera.
    pub fn camera(&self) -> Option<Arc<SimulatedCamera>> {
        self.camera.clone()
    }
}

impl Driver for SimulatorDriver {
    fn name(&self) -> &'static str { "Simulator" }

    fn enumerate_cameras(&mut self) -> Result<Vec<CameraInfo>, CameraError> {
        if !self.connected {
            return Ok(vec![]);
        }
        Ok(vec![CameraInfo{
            id: CameraId(0),
            model_name: self.config.model_name.clone(),
            serial_number: self.config.serial_number.clone()
        }])
    }

    fn open_camera(&mut self, id: CameraId) -> Result<Arc<dyn Device>, CameraError> {
        if !self.connected || id != CameraId(0) {
            return Err(CameraError::CameraNotFound);
        }

        let camera = Arc::new(SimulatedCamera::new(self.config.clone()));
        self.camera = Some(Arc::clone(&camera));

        Ok(camera)
    }
}
