//
// Peakcam - Frame acquisition for IDS peak USB cameras
// Copyright (c) 2021 Filip Szczerek <ga.software@yahoo.com>
//
// This project is licensed under the terms of the MIT license
// (see the LICENSE file for details).
//

//!
//! Exposure and frame rate control.
//!

use crate::camera::{CameraError, Device, Feature, FloatRange};
use log::{debug, warn};
use num_traits::Float;
use std::time::Duration;

/// Minimum gap between the end of an exposure and the start of the next frame.
pub const READOUT_MARGIN_MS: f64 = 0.5;

/// Frame periods to wait for a frame before timing out.
const TIMEOUT_FRAME_PERIODS: f64 = 3.0;

/// Extra wait added to the frame timeout in sequence acquisition.
const SEQUENCE_TIMEOUT_MARGIN_MS: f64 = 10.0;

/// Returns the frame interval to use: at least `exposure_ms` plus the readout margin, and not
/// shorter than the period at `frame_rate_max` (ignored if not positive).
pub fn frame_interval_ms(requested_ms: f64, exposure_ms: f64, frame_rate_max: f64) -> f64 {
    let mut interval = requested_ms.max(exposure_ms + READOUT_MARGIN_MS);
    if frame_rate_max > 0.0 && 1000.0 / interval > frame_rate_max {
        interval = 1000.0 / frame_rate_max;
    }
    interval
}

/// Snaps `value` up to the next multiple of `step`.
fn ceil_to_multiple<T: Float>(value: T, step: T) -> T {
    if step <= T::zero() { value } else { (value / step).ceil() * step }
}

/// Returns the exposure actually requested from the device for `requested_ms`; all values in ms.
pub fn snap_exposure_ms(requested_ms: f64, range: &FloatRange) -> f64 {
    if requested_ms <= range.min {
        range.min
    } else if requested_ms >= range.max {
        range.max
    } else {
        ceil_to_multiple(requested_ms, range.inc).min(range.max)
    }
}

fn frame_period_ms(frame_rate: f64) -> f64 {
    if frame_rate > 0.0 { 1000.0 / frame_rate } else { 1000.0 }
}

/// Timeout for a single-frame wait: three frame periods, rounded to whole milliseconds.
pub fn snap_timeout(frame_rate: f64) -> Duration {
    Duration::from_millis((TIMEOUT_FRAME_PERIODS * frame_period_ms(frame_rate) + 0.5) as u64)
}

/// Timeout for a frame wait during sequence acquisition.
pub fn sequence_timeout(frame_rate: f64) -> Duration {
    Duration::from_millis((TIMEOUT_FRAME_PERIODS * frame_period_ms(frame_rate) + SEQUENCE_TIMEOUT_MARGIN_MS) as u64)
}

/// Cached exposure and frame rate state. Exposure values are in milliseconds.
#[derive(Clone, Debug, PartialEq)]
pub struct RateState {
    exposure_ms: f64,
    exposure_range: FloatRange,
    frame_rate: f64,
    frame_rate_range: FloatRange,
    /// Upper frame rate limit reported by the device.
    device_frame_rate_max: f64
}

impl RateState {
    pub fn query(device: &dyn Device) -> Result<RateState, CameraError> {
        let exposure_range = device.exposure_time_range_us()
            .map_err(|e| { warn!("Cannot read exposure range: {}", e); CameraError::DeviceNotAvailable })?
            .scaled(0.001);
        let frame_rate_range = device.frame_rate_range()
            .map_err(|e| { warn!("Cannot read frame rate range: {}", e); CameraError::DeviceNotAvailable })?;
        let exposure_ms = device.exposure_time_us().map(|us| us / 1000.0).unwrap_or(exposure_range.min);
        let frame_rate = device.frame_rate().unwrap_or(frame_rate_range.max);

        Ok(RateState{
            exposure_ms,
            exposure_range,
            frame_rate,
            frame_rate_range,
            device_frame_rate_max: frame_rate_range.max
        })
    }

    pub fn exposure_ms(&self) -> f64 { self.exposure_ms }

    pub fn exposure_range(&self) -> FloatRange { self.exposure_range }

    pub fn frame_rate(&self) -> f64 { self.frame_rate }

    pub fn frame_rate_range(&self) -> FloatRange { self.frame_rate_range }

    pub fn set_frame_rate_max(&mut self, value: f64) -> Result<(), CameraError> {
        if !(value > 0.0) || value < self.frame_rate_range.min || value > self.device_frame_rate_max {
            return Err(CameraError::InvalidValue(format!(
                "maximum frame rate {} (device limit {})", value, self.device_frame_rate_max
            )));
        }
        self.frame_rate_range.max = value;
        Ok(())
    }

    pub fn set_frame_rate_min(&mut self, value: f64) -> Result<(), CameraError> {
        if !(value > 0.0) || value > self.frame_rate_range.max {
            return Err(CameraError::InvalidValue(format!("minimum frame rate {}", value)));
        }
        self.frame_rate_range.min = value;
        Ok(())
    }

    /// Re-reads the frame rate limits; they depend on binning and ROI.
    pub fn refresh_frame_rate_range(&mut self, device: &dyn Device) -> Result<(), CameraError> {
        self.frame_rate_range = device.frame_rate_range()?;
        self.device_frame_rate_max = self.frame_rate_range.max;
        debug!("Frame rate range: {:.2} - {:.2} fps", self.frame_rate_range.min, self.frame_rate_range.max);
        Ok(())
    }

    /// Sets the device frame rate for the requested interval and returns the rate used.
    ///
    /// The cached rate only changes once the device has accepted the new one.
    pub fn apply_interval(&mut self, device: &dyn Device, requested_ms: f64) -> Result<f64, CameraError> {
        let interval = frame_interval_ms(requested_ms, self.exposure_ms, self.frame_rate_range.max);
        let frame_rate = 1000.0 / interval;

        if let Err(e) = device.set_frame_rate(frame_rate) {
            warn!("Failed to set frame rate to {:.3} fps: {}", frame_rate, e);
            return Err(CameraError::NoWriteAccess(Feature::FrameRate));
        }
        self.frame_rate = frame_rate;

        Ok(frame_rate)
    }

    /// Sets the exposure time and returns the value read back from the device (ms).
    pub fn apply_exposure(&mut self, device: &dyn Device, requested_ms: f64) -> Result<f64, CameraError> {
        if !requested_ms.is_finite() || requested_ms <= 0.0 {
            return Err(CameraError::InvalidValue(format!("exposure {} ms", requested_ms)));
        }
        if !device.access_mode(Feature::ExposureTime).writable() {
            return Err(CameraError::NoWriteAccess(Feature::ExposureTime));
        }

        let snapped = snap_exposure_ms(requested_ms, &self.exposure_range);
        device.set_exposure_time_us(snapped * 1000.0)?;
        self.exposure_ms = device.exposure_time_us()? / 1000.0;
        debug!("Exposure set to {:.3} ms (requested {:.3} ms)", self.exposure_ms, requested_ms);

        Ok(self.exposure_ms)
    }
}
