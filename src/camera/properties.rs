//
// Peakcam - Frame acquisition for IDS peak USB cameras
// Copyright (c) 2021 Filip Szczerek <ga.software@yahoo.com>
//
// This project is licensed under the terms of the MIT license
// (see the LICENSE file for details).
//

//!
//! Named camera properties as exposed to the host.
//!

use crate::camera::{AutoFeatureMode, CameraError, GainChannel, PeakCamera, PixelFormat};
use std::str::FromStr;
use strum::IntoEnumIterator;
use strum_macros::{Display, EnumIter, EnumString, IntoStaticStr};

#[derive(Copy, Clone, Debug, PartialEq, Eq, Display, EnumIter, EnumString, IntoStaticStr)]
pub enum PixelType {
    #[strum(serialize = "8bit")]
    Mono8,
    #[strum(serialize = "32bit RGBA")]
    Rgba32
}

impl PixelType {
    pub fn components(self) -> u32 {
        match self {
            PixelType::Mono8 => 1,
            PixelType::Rgba32 => 4
        }
    }

    /// Format the sensor is switched to; colour frames are converted on transfer.
    pub fn device_format(self) -> PixelFormat {
        match self {
            PixelType::Mono8 => PixelFormat::Mono8,
            PixelType::Rgba32 => PixelFormat::BayerRG8
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Display, EnumIter, EnumString, IntoStaticStr)]
pub enum AutoWhiteBalance {
    Off,
    Once,
    Continuous
}

impl From<AutoFeatureMode> for AutoWhiteBalance {
    fn from(mode: AutoFeatureMode) -> AutoWhiteBalance {
        match mode {
            AutoFeatureMode::Off => AutoWhiteBalance::Off,
            AutoFeatureMode::Once => AutoWhiteBalance::Once,
            AutoFeatureMode::Continuous => AutoWhiteBalance::Continuous
        }
    }
}

impl From<AutoWhiteBalance> for AutoFeatureMode {
    fn from(mode: AutoWhiteBalance) -> AutoFeatureMode {
        match mode {
            AutoWhiteBalance::Off => AutoFeatureMode::Off,
            AutoWhiteBalance::Once => AutoFeatureMode::Once,
            AutoWhiteBalance::Continuous => AutoFeatureMode::Continuous
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Display, EnumIter, EnumString, IntoStaticStr)]
pub enum PropertyName {
    #[strum(serialize = "Exposure")]
    Exposure,
    #[strum(serialize = "Binning")]
    Binning,
    #[strum(serialize = "PixelType")]
    PixelType,
    #[strum(serialize = "Gain")]
    Gain,
    #[strum(serialize = "Gain Red")]
    GainRed,
    #[strum(serialize = "Gain Green")]
    GainGreen,
    #[strum(serialize = "Gain Blue")]
    GainBlue,
    #[strum(serialize = "Auto white balance")]
    AutoWhiteBalance,
    #[strum(serialize = "Maximum framerate")]
    FrameRateMax,
    #[strum(serialize = "Minimum framerate")]
    FrameRateMin,
    #[strum(serialize = "Framerate")]
    FrameRate,
    #[strum(serialize = "Interval")]
    Interval,
    #[strum(serialize = "ReadoutTime")]
    ReadoutTime,
    #[strum(serialize = "TriggerDevice")]
    TriggerDevice,
    #[strum(serialize = "AllowMultiROI")]
    AllowMultiRoi,
    #[strum(serialize = "MultiROIFillValue")]
    MultiRoiFillValue,
    #[strum(serialize = "UseExposureSequences")]
    UseExposureSequences,
    #[strum(serialize = "CCDTemperature")]
    Temperature,
    #[strum(serialize = "CameraName")]
    CameraName,
    #[strum(serialize = "CameraID")]
    CameraId,
    #[strum(serialize = "FirmwareVersion")]
    FirmwareVersion,
    #[strum(serialize = "OnCameraCCDXSize")]
    SensorWidth,
    #[strum(serialize = "OnCameraCCDYSize")]
    SensorHeight,
    #[strum(serialize = "PixelSizeUm")]
    PixelSize
}

impl PropertyName {
    pub fn is_read_only(self) -> bool {
        match self {
            PropertyName::FrameRate
            | PropertyName::Interval
            | PropertyName::Temperature
            | PropertyName::CameraName
            | PropertyName::CameraId
            | PropertyName::FirmwareVersion
            | PropertyName::SensorWidth
            | PropertyName::SensorHeight
            | PropertyName::PixelSize => true,

            _ => false
        }
    }
}

pub fn property_names() -> Vec<&'static str> {
    PropertyName::iter().map(|p| p.into()).collect()
}

fn parse_number<T: FromStr>(name: PropertyName, value: &str) -> Result<T, CameraError> {
    value.trim().parse::<T>().map_err(|_| CameraError::InvalidValue(format!("{}: \"{}\"", name, value)))
}

fn parse_flag(name: PropertyName, value: &str, yes: &str, no: &str) -> Result<bool, CameraError> {
    if value == yes {
        Ok(true)
    } else if value == no {
        Ok(false)
    } else {
        Err(CameraError::InvalidValue(format!("{}: \"{}\"", name, value)))
    }
}

fn lookup(name: &str) -> Result<PropertyName, CameraError> {
    PropertyName::from_str(name).map_err(|_| CameraError::UnknownProperty(name.to_string()))
}

/// Values the host may choose from; `None` for free-form properties.
pub fn allowed_values(camera: &PeakCamera, name: &str) -> Result<Option<Vec<String>>, CameraError> {
    let values = match lookup(name)? {
        PropertyName::Binning => Some(camera.allowed_binnings().iter().map(|b| b.to_string()).collect()),
        PropertyName::PixelType => Some(PixelType::iter().map(|p| p.to_string()).collect()),
        PropertyName::AutoWhiteBalance => Some(AutoWhiteBalance::iter().map(|m| m.to_string()).collect()),
        PropertyName::AllowMultiRoi => Some(vec!["0".to_string(), "1".to_string()]),
        PropertyName::UseExposureSequences => Some(vec!["Yes".to_string(), "No".to_string()]),
        _ => None
    };
    Ok(values)
}

pub fn property(camera: &PeakCamera, name: &str) -> Result<String, CameraError> {
    let value = match lookup(name)? {
        PropertyName::Exposure => camera.exposure().to_string(),
        PropertyName::Binning => camera.binning().to_string(),
        PropertyName::PixelType => camera.pixel_type().to_string(),
        PropertyName::Gain => camera.gain(GainChannel::Master).to_string(),
        PropertyName::GainRed => camera.gain(GainChannel::Red).to_string(),
        PropertyName::GainGreen => camera.gain(GainChannel::Green).to_string(),
        PropertyName::GainBlue => camera.gain(GainChannel::Blue).to_string(),
        PropertyName::AutoWhiteBalance => camera.auto_white_balance().to_string(),
        PropertyName::FrameRateMax => camera.frame_rate_range().max.to_string(),
        PropertyName::FrameRateMin => camera.frame_rate_range().min.to_string(),
        PropertyName::FrameRate => camera.frame_rate().to_string(),
        PropertyName::Interval => camera.measured_interval_ms().to_string(),
        PropertyName::ReadoutTime => camera.readout_time_ms().to_string(),
        PropertyName::TriggerDevice => camera.trigger_device().to_string(),
        PropertyName::AllowMultiRoi => (if camera.allows_multi_roi() { "1" } else { "0" }).to_string(),
        PropertyName::MultiRoiFillValue => camera.multi_roi_fill_value().to_string(),
        PropertyName::UseExposureSequences => (if camera.uses_exposure_sequences() { "Yes" } else { "No" }).to_string(),
        PropertyName::Temperature => format!("{:.1}", camera.temperature()?),
        PropertyName::CameraName => camera.capabilities().model_name.clone(),
        PropertyName::CameraId => camera.capabilities().serial_number.clone(),
        PropertyName::FirmwareVersion => camera.capabilities().firmware_version.clone().unwrap_or_default(),
        PropertyName::SensorWidth => camera.capabilities().sensor_width.to_string(),
        PropertyName::SensorHeight => camera.capabilities().sensor_height.to_string(),
        PropertyName::PixelSize => camera.pixel_size_um().to_string()
    };
    Ok(value)
}

pub fn set_property(camera: &mut PeakCamera, name: &str, value: &str) -> Result<(), CameraError> {
    let property = lookup(name)?;
    if property.is_read_only() {
        return Err(CameraError::ReadOnlyProperty(name.to_string()));
    }

    match property {
        PropertyName::Exposure => camera.set_exposure(parse_number(property, value)?),
        PropertyName::Binning => camera.set_binning(parse_number(property, value)?),
        PropertyName::PixelType => {
            let pixel_type = PixelType::from_str(value)
                .map_err(|_| CameraError::InvalidValue(format!("{}: \"{}\"", property, value)))?;
            camera.set_pixel_type(pixel_type)
        },
        PropertyName::Gain => camera.set_gain(GainChannel::Master, parse_number(property, value)?),
        PropertyName::GainRed => camera.set_gain(GainChannel::Red, parse_number(property, value)?),
        PropertyName::GainGreen => camera.set_gain(GainChannel::Green, parse_number(property, value)?),
        PropertyName::GainBlue => camera.set_gain(GainChannel::Blue, parse_number(property, value)?),
        PropertyName::AutoWhiteBalance => {
            let mode = AutoWhiteBalance::from_str(value)
                .map_err(|_| CameraError::InvalidValue(format!("{}: \"{}\"", property, value)))?;
            camera.set_auto_white_balance(mode)
        },
        PropertyName::FrameRateMax => camera.set_frame_rate_max(parse_number(property, value)?),
        PropertyName::FrameRateMin => camera.set_frame_rate_min(parse_number(property, value)?),
        PropertyName::ReadoutTime => camera.set_readout_time_ms(parse_number(property, value)?),
        PropertyName::TriggerDevice => { camera.set_trigger_device(value); Ok(()) },
        PropertyName::AllowMultiRoi => { camera.set_allow_multi_roi(parse_flag(property, value, "1", "0")?); Ok(()) },
        PropertyName::MultiRoiFillValue => camera.set_multi_roi_fill_value(parse_number(property, value)?),
        PropertyName::UseExposureSequences => {
            camera.set_use_exposure_sequences(parse_flag(property, value, "Yes", "No")?);
            Ok(())
        },

        PropertyName::FrameRate
        | PropertyName::Interval
        | PropertyName::Temperature
        | PropertyName::CameraName
        | PropertyName::CameraId
        | PropertyName::FirmwareVersion
        | PropertyName::SensorWidth
        | PropertyName::SensorHeight
        | PropertyName::PixelSize => Err(CameraError::ReadOnlyProperty(name.to_string()))
    }
}
