//
// Peakcam - Frame acquisition for IDS peak USB cameras
// Copyright (c) 2021 Filip Szczerek <ga.software@yahoo.com>
//
// This project is licensed under the terms of the MIT license
// (see the LICENSE file for details).
//

//!
//! Device SDK boundary.
//!
//! Everything the camera layer needs from the vendor SDK goes through `Driver` and `Device`.
//! A `Device` is shared between the control thread and the sequence acquisition thread.
//!

use crate::camera::CameraError;
use crate::camera::geometry::Roi;
use std::sync::Arc;
use std::time::Duration;
use strum_macros::IntoStaticStr;

/// GenICam node names read through the generic feature access.
pub mod genicam {
    pub const DEVICE_FIRMWARE_VERSION: &str = "DeviceFirmwareVersion";
    pub const DEVICE_MODEL_NAME: &str = "DeviceModelName";
    pub const DEVICE_TEMPERATURE: &str = "DeviceTemperature";
    pub const WIDTH_MAX: &str = "WidthMax";
    pub const HEIGHT_MAX: &str = "HeightMax";
}

/// Status of a failed device call.
#[derive(Clone, Debug, PartialEq)]
pub enum DeviceError {
    Timeout,
    Aborted,
    Error(String)
}

impl std::fmt::Display for DeviceError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            DeviceError::Timeout => write!(f, "timeout"),
            DeviceError::Aborted => write!(f, "aborted"),
            DeviceError::Error(msg) => write!(f, "{}", msg)
        }
    }
}

impl std::error::Error for DeviceError {}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ControlAccessMode {
    None,
    ReadOnly,
    WriteOnly,
    ReadWrite
}

impl ControlAccessMode {
    pub fn readable(self) -> bool {
        self == ControlAccessMode::ReadOnly || self == ControlAccessMode::ReadWrite
    }

    pub fn writable(self) -> bool {
        self == ControlAccessMode::WriteOnly || self == ControlAccessMode::ReadWrite
    }
}

/// Device features with a queryable access mode.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, IntoStaticStr)]
pub enum Feature {
    #[strum(serialize = "exposure time")]
    ExposureTime,
    #[strum(serialize = "frame rate")]
    FrameRate,
    #[strum(serialize = "gain")]
    Gain,
    #[strum(serialize = "ROI")]
    Roi,
    #[strum(serialize = "binning")]
    Binning,
    #[strum(serialize = "pixel format")]
    PixelFormat,
    #[strum(serialize = "auto white balance")]
    AutoWhiteBalance,
    #[strum(serialize = "device temperature")]
    DeviceTemperature
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct FloatRange {
    pub min: f64,
    pub max: f64,
    pub inc: f64
}

impl FloatRange {
    pub fn scaled(&self, factor: f64) -> FloatRange {
        FloatRange{ min: self.min * factor, max: self.max * factor, inc: self.inc * factor }
    }

    pub fn clamp(&self, value: f64) -> f64 {
        if value < self.min { self.min } else if value > self.max { self.max } else { value }
    }
}

/// ROI size limits reported by the device. Increments apply to both offset and size.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct SizeRange {
    pub min_width: u32,
    pub min_height: u32,
    pub max_width: u32,
    pub max_height: u32,
    pub inc_width: u32,
    pub inc_height: u32
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum GainChannel {
    Master,
    Red,
    Green,
    Blue
}

impl GainChannel {
    pub const ALL: [GainChannel; 4] = [GainChannel::Master, GainChannel::Red, GainChannel::Green, GainChannel::Blue];

    pub fn index(self) -> usize {
        match self {
            GainChannel::Master => 0,
            GainChannel::Red => 1,
            GainChannel::Green => 2,
            GainChannel::Blue => 3
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum PixelFormat {
    Mono8,
    BayerRG8,
    Bgra8
}

impl PixelFormat {
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::Mono8 | PixelFormat::BayerRG8 => 1,
            PixelFormat::Bgra8 => 4
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum AutoFeatureMode {
    Off,
    Once,
    Continuous
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum AcquisitionLength {
    Frames(u32),
    Infinite
}

/// Frame handed out by the device; must be given back with `Device::release_frame`.
#[derive(Debug)]
pub struct RawFrame {
    id: u64,
    width: u32,
    height: u32,
    format: PixelFormat,
    data: Vec<u8>
}

impl RawFrame {
    pub fn new(id: u64, width: u32, height: u32, format: PixelFormat, data: Vec<u8>) -> RawFrame {
        RawFrame{ id, width, height, format, data }
    }

    pub fn id(&self) -> u64 { self.id }

    pub fn width(&self) -> u32 { self.width }

    pub fn height(&self) -> u32 { self.height }

    pub fn pixel_format(&self) -> PixelFormat { self.format }

    pub fn data(&self) -> &[u8] { &self.data }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct CameraId(pub u64);

#[derive(Clone, Debug, PartialEq)]
pub struct CameraInfo {
    pub id: CameraId,
    pub model_name: String,
    pub serial_number: String
}

pub trait Driver {
    fn name(&self) -> &'static str;

    fn enumerate_cameras(&mut self) -> Result<Vec<CameraInfo>, CameraError>;

    fn open_camera(&mut self, id: CameraId) -> Result<Arc<dyn Device>, CameraError>;
}

/// Opened camera. Exposure times are in microseconds, frame rates in frames per second.
pub trait Device: Send + Sync {
    fn info(&self) -> CameraInfo;

    fn close(&self) -> Result<(), DeviceError>;

    fn access_mode(&self, feature: Feature) -> ControlAccessMode;

    fn exposure_time_us(&self) -> Result<f64, DeviceError>;

    fn set_exposure_time_us(&self, value: f64) -> Result<(), DeviceError>;

    fn exposure_time_range_us(&self) -> Result<FloatRange, DeviceError>;

    fn frame_rate(&self) -> Result<f64, DeviceError>;

    fn set_frame_rate(&self, fps: f64) -> Result<(), DeviceError>;

    fn frame_rate_range(&self) -> Result<FloatRange, DeviceError>;

    fn gain(&self, channel: GainChannel) -> Result<f64, DeviceError>;

    fn set_gain(&self, channel: GainChannel, value: f64) -> Result<(), DeviceError>;

    fn gain_range(&self, channel: GainChannel) -> Result<FloatRange, DeviceError>;

    fn roi_size_range(&self) -> Result<SizeRange, DeviceError>;

    fn set_roi(&self, roi: Roi) -> Result<(), DeviceError>;

    fn binning_factors(&self) -> Result<Vec<u32>, DeviceError>;

    fn set_binning(&self, x: u32, y: u32) -> Result<(), DeviceError>;

    fn set_pixel_format(&self, format: PixelFormat) -> Result<(), DeviceError>;

    fn auto_white_balance(&self) -> Result<AutoFeatureMode, DeviceError>;

    fn set_auto_white_balance(&self, mode: AutoFeatureMode) -> Result<(), DeviceError>;

    fn start_acquisition(&self, length: AcquisitionLength) -> Result<(), DeviceError>;

    fn stop_acquisition(&self) -> Result<(), DeviceError>;

    fn is_acquisition_started(&self) -> bool;

    fn wait_for_frame(&self, timeout: Duration) -> Result<RawFrame, DeviceError>;

    fn release_frame(&self, frame: RawFrame) -> Result<(), DeviceError>;

    /// Produces a converted copy of `frame`; the copy has to be released too.
    fn convert_frame(&self, frame: &RawFrame, format: PixelFormat) -> Result<RawFrame, DeviceError>;

    fn feature_access(&self, name: &str) -> ControlAccessMode;

    fn feature_int(&self, name: &str) -> Result<i64, DeviceError>;

    fn feature_float(&self, name: &str) -> Result<f64, DeviceError>;

    fn feature_string(&self, name: &str) -> Result<String, DeviceError>;
}
