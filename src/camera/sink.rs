//
// Peakcam - Frame acquisition for IDS peak USB cameras
// Copyright (c) 2021 Filip Szczerek <ga.software@yahoo.com>
//
// This project is licensed under the terms of the MIT license
// (see the LICENSE file for details).
//

//!
//! Host-side collaborators: frame sink, lifecycle callbacks and trigger devices.
//!

use crate::camera::{CameraError, ImageBuffer};
use chrono::{DateTime, Local};
use crossbeam::channel::{self, Receiver, Sender, TrySendError};
use std::sync::Arc;

/// Metadata attached to every frame delivered during sequence acquisition.
#[derive(Clone, Debug, PartialEq)]
pub struct FrameMetadata {
    pub camera: String,
    /// Time since the sequence was started.
    pub elapsed_ms: f64,
    pub roi_x: u32,
    pub roi_y: u32,
    pub binning: u32,
    pub image_number: u64,
    pub received: DateTime<Local>
}

impl FrameMetadata {
    /// Key/value form as stored alongside frames by the host.
    pub fn tags(&self) -> Vec<(&'static str, String)> {
        vec![
            ("Camera", self.camera.clone()),
            ("ElapsedTime-ms", format!("{:.2}", self.elapsed_ms)),
            ("ROI-X-start", self.roi_x.to_string()),
            ("ROI-Y-start", self.roi_y.to_string()),
            ("Binning", self.binning.to_string()),
            ("ImageNumber", self.image_number.to_string()),
            ("TimeReceived", self.received.format("%Y-%m-%d %H:%M:%S%.3f").to_string())
        ]
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum SinkError {
    /// The sink has no room for another frame.
    Overflow,
    Rejected(String)
}

impl std::fmt::Display for SinkError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            SinkError::Overflow => write!(f, "overflow"),
            SinkError::Rejected(msg) => write!(f, "rejected: {}", msg)
        }
    }
}

impl std::error::Error for SinkError {}

/// Destination of frames produced by sequence acquisition.
pub trait FrameSink: Send + Sync {
    fn insert_frame(&self, image: &ImageBuffer, metadata: &FrameMetadata) -> Result<(), SinkError>;

    /// Drops all frames waiting in the sink.
    fn clear_backlog(&self);
}

pub trait TriggerDevice: Send + Sync {
    fn trigger(&self) -> Result<(), CameraError>;
}

/// Notifications sent to the host application. All methods have no-op defaults.
pub trait HostCallbacks: Send + Sync {
    fn prepare_for_acquisition(&self) -> Result<(), CameraError> { Ok(()) }

    fn exposure_changed(&self, _exposure_ms: f64) {}

    /// Called exactly once at the end of every sequence acquisition, from the acquisition thread.
    fn acquisition_finished(&self, _result: &Result<(), CameraError>) {}

    fn trigger_device(&self, _name: &str) -> Option<Arc<dyn TriggerDevice>> { None }
}

pub struct NullHost;

impl HostCallbacks for NullHost {}

#[derive(Clone, Debug)]
pub struct DeliveredFrame {
    pub image: ImageBuffer,
    pub metadata: FrameMetadata
}

/// Bounded frame queue backed by a crossbeam channel.
pub struct ChannelSink {
    sender: Sender<DeliveredFrame>,
    receiver: Receiver<DeliveredFrame>
}

impl ChannelSink {
    pub fn new(capacity: usize) -> ChannelSink {
        let (sender, receiver) = channel::bounded(capacity);
        ChannelSink{ sender, receiver }
    }

    pub fn receiver(&self) -> Receiver<DeliveredFrame> {
        self.receiver.clone()
    }

    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }
}

impl FrameSink for ChannelSink {
    fn insert_frame(&self, image: &ImageBuffer, metadata: &FrameMetadata) -> Result<(), SinkError> {
        let frame = DeliveredFrame{ image: image.clone(), metadata: metadata.clone() };
        match self.sender.try_send(frame) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(SinkError::Overflow),
            Err(TrySendError::Disconnected(_)) => Err(SinkError::Rejected("receiver disconnected".to_string()))
        }
    }

    fn clear_backlog(&self) {
        while self.receiver.try_recv().is_ok() {}
    }
}
