//
// Peakcam - Frame acquisition for IDS peak USB cameras
// Copyright (c) 2021 Filip Szczerek <ga.software@yahoo.com>
//
// This project is licensed under the terms of the MIT license
// (see the LICENSE file for details).
//

//!
//! Single-frame capture and state shared with the acquisition thread.
//!

use crate::camera::{
    AcquisitionLength,
    CameraError,
    Device,
    DeviceError,
    Feature,
    FrameSink,
    GainChannel,
    HostCallbacks,
    SharedImageBuffer
};
use crate::camera::properties::AutoWhiteBalance;
use crate::camera::rate::snap_timeout;
use crate::camera::transfer::{transfer_frame, TransferFormat};
use log::{debug, warn};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Timeouts tolerated while waiting for a single frame.
const MAX_SNAP_TIMEOUTS: u32 = 100;

/// Auto white balance mode and the per-channel gains last read from the device.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct WhiteBalance {
    pub mode: AutoWhiteBalance,
    gains: [f64; 4]
}

impl WhiteBalance {
    pub fn new(mode: AutoWhiteBalance) -> WhiteBalance {
        WhiteBalance{ mode, gains: [1.0; 4] }
    }

    pub fn gain(&self, channel: GainChannel) -> f64 {
        self.gains[channel.index()]
    }

    pub fn set_gain(&mut self, channel: GainChannel, value: f64) {
        self.gains[channel.index()] = value;
    }

    /// Reads mode and all gains; unreadable gains keep their cached value.
    pub fn query(device: &dyn Device) -> Result<WhiteBalance, CameraError> {
        let mut white_balance = WhiteBalance::new(AutoWhiteBalance::Off);
        white_balance.refresh(device)?;
        Ok(white_balance)
    }

    pub fn refresh(&mut self, device: &dyn Device) -> Result<(), CameraError> {
        if !device.access_mode(Feature::AutoWhiteBalance).readable() {
            return Err(CameraError::NoReadAccess(Feature::AutoWhiteBalance));
        }
        self.mode = device.auto_white_balance()?.into();
        for &channel in GainChannel::ALL.iter() {
            match device.gain(channel) {
                Ok(value) => self.set_gain(channel, value),
                Err(e) => debug!("Cannot read {:?} gain: {}", channel, e)
            }
        }
        Ok(())
    }
}

/// State shared by the control thread and the sequence acquisition thread.
pub struct AcquisitionContext {
    pub device: Arc<dyn Device>,
    pub buffer: SharedImageBuffer,
    pub sink: Arc<dyn FrameSink>,
    pub host: Arc<dyn HostCallbacks>,
    white_balance: Mutex<WhiteBalance>,
    last_error: Mutex<Option<CameraError>>
}

fn recover<'a, T>(result: Result<MutexGuard<'a, T>, PoisonError<MutexGuard<'a, T>>>) -> MutexGuard<'a, T> {
    result.unwrap_or_else(PoisonError::into_inner)
}

impl AcquisitionContext {
    pub fn new(
        device: Arc<dyn Device>,
        buffer: SharedImageBuffer,
        sink: Arc<dyn FrameSink>,
        host: Arc<dyn HostCallbacks>,
        white_balance: WhiteBalance
    ) -> AcquisitionContext {
        AcquisitionContext{
            device,
            buffer,
            sink,
            host,
            white_balance: Mutex::new(white_balance),
            last_error: Mutex::new(None)
        }
    }

    pub fn white_balance(&self) -> WhiteBalance {
        *recover(self.white_balance.lock())
    }

    pub fn update_white_balance<F: FnOnce(&mut WhiteBalance)>(&self, f: F) {
        let mut white_balance = recover(self.white_balance.lock());
        f(&mut *white_balance);
    }

    /// Re-reads white balance state from the device if auto white balance is active.
    pub fn refresh_white_balance_if_active(&self) -> Result<(), CameraError> {
        let mut white_balance = recover(self.white_balance.lock());
        if white_balance.mode == AutoWhiteBalance::Off {
            Ok(())
        } else {
            white_balance.refresh(&*self.device)
        }
    }

    pub fn last_error(&self) -> Option<CameraError> {
        recover(self.last_error.lock()).clone()
    }

    pub fn set_last_error(&self, error: Option<CameraError>) {
        *recover(self.last_error.lock()) = error;
    }
}

/// Captures one frame into the shared buffer.
///
/// The device is expected to be configured for `frame_rate` already.
pub fn snap_frame(context: &AcquisitionContext, format: &TransferFormat, frame_rate: f64) -> Result<(), CameraError> {
    let device = &*context.device;
    let timeout = snap_timeout(frame_rate);

    context.buffer.mark_readout_start();
    if let Err(e) = device.start_acquisition(AcquisitionLength::Frames(1)) {
        warn!("Failed to start single-frame acquisition: {}", e);
        return Err(CameraError::AcquisitionStart);
    }

    let result = wait_and_transfer(context, format, timeout);
    if device.is_acquisition_started() {
        if let Err(e) = device.stop_acquisition() {
            warn!("Failed to stop acquisition: {}", e);
        }
    }
    result?;

    context.refresh_white_balance_if_active()
}

fn wait_and_transfer(
    context: &AcquisitionContext,
    format: &TransferFormat,
    timeout: std::time::Duration
) -> Result<(), CameraError> {
    let device = &*context.device;
    let mut timeouts = 0;
    let frame = loop {
        match device.wait_for_frame(timeout) {
            Ok(frame) => break frame,

            Err(DeviceError::Timeout) => {
                timeouts += 1;
                if timeouts >= MAX_SNAP_TIMEOUTS {
                    warn!("Gave up waiting for frame after {} timeouts", timeouts);
                    return Err(CameraError::AcquisitionTimeout);
                }
                debug!("Frame wait timed out ({}), retrying", timeouts);
            },

            Err(DeviceError::Aborted) => {
                debug!("Frame wait aborted");
                return Ok(());
            },

            Err(e) => {
                warn!("Frame wait failed: {}", e);
                return Err(CameraError::AcquisitionFrame);
            }
        }
    };

    let transferred = transfer_frame(device, &frame, &context.buffer, format);
    if let Err(e) = device.release_frame(frame) {
        warn!("Failed to release frame: {}", e);
        return Err(CameraError::AcquisitionRelease);
    }

    transferred
}
