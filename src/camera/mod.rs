//
// Peakcam - Frame acquisition for IDS peak USB cameras
// Copyright (c) 2021 Filip Szczerek <ga.software@yahoo.com>
//
// This project is licensed under the terms of the MIT license
// (see the LICENSE file for details).
//

//!
//! Camera control: device boundary, geometry, rate control and frame acquisition.
//!

pub mod buffer;
mod capture;
pub mod device;
pub mod drivers;
pub mod exposure_sequence;
pub mod geometry;
pub mod peak_camera;
pub mod properties;
pub mod rate;
pub mod sequence;
pub mod session;
pub mod sink;
mod transfer;

pub use buffer::{ImageBuffer, SharedImageBuffer};
pub use capture::WhiteBalance;
pub use device::{
    AcquisitionLength,
    AutoFeatureMode,
    CameraId,
    CameraInfo,
    ControlAccessMode,
    Device,
    DeviceError,
    Driver,
    Feature,
    FloatRange,
    GainChannel,
    PixelFormat,
    RawFrame,
    SizeRange
};
pub use geometry::{Roi, RoiConstraints};
pub use peak_camera::{Collaborators, PeakCamera};
pub use properties::{AutoWhiteBalance, PixelType, PropertyName};
pub use sequence::{AcquisitionState, FrameCount, SequenceRequest};
pub use sink::{ChannelSink, DeliveredFrame, FrameMetadata, FrameSink, HostCallbacks, NullHost, SinkError, TriggerDevice};

#[derive(Clone, Debug, PartialEq)]
pub enum CameraError {
    /// Feature is temporarily not writable on the device.
    NoWriteAccess(Feature),
    /// Feature is temporarily not readable on the device.
    NoReadAccess(Feature),
    /// Configuration change attempted while a sequence acquisition is running.
    CameraBusy,
    AcquisitionStart,
    AcquisitionFrame,
    AcquisitionRelease,
    AcquisitionTimeout,
    /// Frame conversion requested for an unsupported number of components.
    UnsupportedDataFormat(u32),
    DeviceNotAvailable,
    CameraNotFound,
    InternalInconsistency(String),
    InvalidValue(String),
    UnknownProperty(String),
    ReadOnlyProperty(String),
    UnsupportedCommand,
    /// The frame sink overflowed and the overflow was not recovered.
    BufferOverflow,
    Sink(String),
    NotInitialized,
    Device(DeviceError)
}

impl std::fmt::Display for CameraError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            CameraError::NoWriteAccess(feature) => write!(f, "no write access to {}", <&'static str>::from(*feature)),
            CameraError::NoReadAccess(feature) => write!(f, "no read access to {}", <&'static str>::from(*feature)),
            CameraError::CameraBusy => write!(f, "camera is busy acquiring a sequence"),
            CameraError::AcquisitionStart => write!(f, "failed to start acquisition"),
            CameraError::AcquisitionFrame => write!(f, "failed to acquire frame"),
            CameraError::AcquisitionRelease => write!(f, "failed to release frame"),
            CameraError::AcquisitionTimeout => write!(f, "timed out waiting for frame"),
            CameraError::UnsupportedDataFormat(n) => write!(f, "unsupported data format ({} components)", n),
            CameraError::DeviceNotAvailable => write!(f, "device not available"),
            CameraError::CameraNotFound => write!(f, "camera not found"),
            CameraError::InternalInconsistency(msg) => write!(f, "internal inconsistency: {}", msg),
            CameraError::InvalidValue(msg) => write!(f, "invalid value: {}", msg),
            CameraError::UnknownProperty(name) => write!(f, "unknown property \"{}\"", name),
            CameraError::ReadOnlyProperty(name) => write!(f, "property \"{}\" is read-only", name),
            CameraError::UnsupportedCommand => write!(f, "unsupported command"),
            CameraError::BufferOverflow => write!(f, "frame sink overflow"),
            CameraError::Sink(msg) => write!(f, "frame sink error: {}", msg),
            CameraError::NotInitialized => write!(f, "camera not initialized"),
            CameraError::Device(e) => write!(f, "device error: {}", e)
        }
    }
}

impl std::error::Error for CameraError {}

impl From<DeviceError> for CameraError {
    fn from(device_error: DeviceError) -> CameraError {
        CameraError::Device(device_error)
    }
}

impl From<SinkError> for CameraError {
    fn from(sink_error: SinkError) -> CameraError {
        match sink_error {
            SinkError::Overflow => CameraError::BufferOverflow,
            SinkError::Rejected(msg) => CameraError::Sink(msg)
        }
    }
}
