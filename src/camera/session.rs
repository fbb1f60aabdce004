//
// Peakcam - Frame acquisition for IDS peak USB cameras
// Copyright (c) 2021 Filip Szczerek <ga.software@yahoo.com>
//
// This project is licensed under the terms of the MIT license
// (see the LICENSE file for details).
//

//!
//! Opened camera and its static capabilities.
//!

use crate::camera::{CameraError, CameraId, Device, Driver, Feature, FloatRange, GainChannel, SizeRange};
use crate::camera::device::genicam;
use log::{info, warn};
use std::sync::Arc;

/// Sensor size assumed when the device does not report one.
const DEFAULT_SENSOR_SIZE: u32 = 512;

#[derive(Clone, Debug, PartialEq)]
pub struct Capabilities {
    pub camera_id: CameraId,
    pub model_name: String,
    pub serial_number: String,
    pub firmware_version: Option<String>,
    /// Unbinned sensor width.
    pub sensor_width: u32,
    /// Unbinned sensor height.
    pub sensor_height: u32,
    pub roi: SizeRange,
    pub gain: FloatRange,
    pub binning_factors: Vec<u32>
}

pub struct CameraSession {
    device: Arc<dyn Device>,
    capabilities: Capabilities
}

impl CameraSession {
    /// Opens the first camera reported by `driver`.
    pub fn open(driver: &mut dyn Driver) -> Result<CameraSession, CameraError> {
        let cameras = driver.enumerate_cameras()?;
        let first = match cameras.first() {
            Some(info) => info,
            None => return Err(CameraError::CameraNotFound)
        };
        if cameras.len() > 1 {
            info!("{} cameras found, using the first one", cameras.len());
        }

        let device = driver.open_camera(first.id)?;
        CameraSession::from_device(device)
    }

    pub fn from_device(device: Arc<dyn Device>) -> Result<CameraSession, CameraError> {
        let info = device.info();

        let firmware_version = if device.feature_access(genicam::DEVICE_FIRMWARE_VERSION).readable() {
            device.feature_string(genicam::DEVICE_FIRMWARE_VERSION).ok()
        } else {
            None
        };

        let (sensor_width, sensor_height) = match read_sensor_size(&*device) {
            Ok(size) => size,
            Err(e) => {
                warn!("Cannot read sensor size ({}), assuming {}x{}", e, DEFAULT_SENSOR_SIZE, DEFAULT_SENSOR_SIZE);
                (DEFAULT_SENSOR_SIZE, DEFAULT_SENSOR_SIZE)
            }
        };

        let roi = device.roi_size_range().map_err(|_| CameraError::DeviceNotAvailable)?;
        let gain = device.gain_range(GainChannel::Master).map_err(|_| CameraError::DeviceNotAvailable)?;

        if !device.access_mode(Feature::Binning).readable() {
            return Err(CameraError::NoReadAccess(Feature::Binning));
        }
        let binning_factors = device.binning_factors()?;

        info!("Opened camera {} (serial {}), sensor {}x{}, binning {:?}",
            info.model_name, info.serial_number, sensor_width, sensor_height, binning_factors);

        Ok(CameraSession{
            device,
            capabilities: Capabilities{
                camera_id: info.id,
                model_name: info.model_name,
                serial_number: info.serial_number,
                firmware_version,
                sensor_width,
                sensor_height,
                roi,
                gain,
                binning_factors
            }
        })
    }

    pub fn device(&self) -> &Arc<dyn Device> { &self.device }

    pub fn capabilities(&self) -> &Capabilities { &self.capabilities }

    /// Sensor temperature in °C. Only available on devices reporting a firmware version.
    pub fn temperature(&self) -> Result<f64, CameraError> {
        if !self.device.feature_access(genicam::DEVICE_FIRMWARE_VERSION).readable()
            || !self.device.feature_access(genicam::DEVICE_TEMPERATURE).readable() {
            return Err(CameraError::NoReadAccess(Feature::DeviceTemperature));
        }
        Ok(self.device.feature_float(genicam::DEVICE_TEMPERATURE)?)
    }

    pub fn close(&self) -> Result<(), CameraError> {
        self.device.close()?;
        info!("Closed camera {}", self.capabilities.model_name);
        Ok(())
    }
}

fn read_sensor_size(device: &dyn Device) -> Result<(u32, u32), CameraError> {
    let width = device.feature_int(genicam::WIDTH_MAX)?;
    let height = device.feature_int(genicam::HEIGHT_MAX)?;
    if width <= 0 || height <= 0 {
        return Err(CameraError::InvalidValue(format!("sensor size {}x{}", width, height)));
    }
    Ok((width as u32, height as u32))
}
