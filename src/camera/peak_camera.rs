//
// Peakcam - Frame acquisition for IDS peak USB cameras
// Copyright (c) 2021 Filip Szczerek <ga.software@yahoo.com>
//
// This project is licensed under the terms of the MIT license
// (see the LICENSE file for details).
//

//!
//! Camera as seen by the host application.
//!
//! `PeakCamera` lives on the control thread. Configuration changes that affect the frame layout
//! are refused with `CameraError::CameraBusy` while a sequence acquisition is running.
//!

use crate::camera::{
    AutoWhiteBalance,
    CameraError,
    Driver,
    Feature,
    FloatRange,
    FrameSink,
    GainChannel,
    HostCallbacks,
    ImageBuffer,
    PixelFormat,
    PixelType,
    Roi,
    SharedImageBuffer,
    TriggerDevice
};
use crate::camera::capture::{self, AcquisitionContext, WhiteBalance};
use crate::camera::exposure_sequence::ExposureSequence;
use crate::camera::geometry::Geometry;
use crate::camera::properties;
use crate::camera::rate::RateState;
use crate::camera::sequence::{AcquisitionState, FrameCount, SequenceEngine, SequenceRequest, SequenceRun};
use crate::camera::session::{CameraSession, Capabilities};
use crate::camera::transfer::{RoiFill, TransferFormat};
use crate::config::{CameraConfig, MAX_MULTI_ROI_FILL_VALUE};
use log::{info, warn};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Pixel size at binning 1.
const NOMINAL_PIXEL_SIZE_UM: f64 = 1.0;

pub struct Collaborators {
    pub sink: Arc<dyn FrameSink>,
    pub host: Arc<dyn HostCallbacks>
}

pub struct PeakCamera {
    label: String,
    session: CameraSession,
    context: Arc<AcquisitionContext>,
    geometry: Geometry,
    rate: RateState,
    engine: SequenceEngine,
    exposure_sequence: ExposureSequence,
    trigger_device: String,
    allow_multi_roi: bool,
    multi_roi_fill_value: u32,
    stop_on_overflow: bool,
    initialized: bool
}

impl PeakCamera {
    /// Opens the first camera of `driver` and applies `config`.
    pub fn initialize(
        driver: &mut dyn Driver,
        collaborators: Collaborators,
        config: &CameraConfig
    ) -> Result<PeakCamera, CameraError> {
        config.validate().map_err(|e| CameraError::InvalidValue(e.to_string()))?;

        let session = CameraSession::open(driver)?;
        let device = Arc::clone(session.device());
        let capabilities = session.capabilities().clone();

        device.set_pixel_format(PixelFormat::Mono8)?;
        let rate = RateState::query(&*device)?;
        let white_balance = WhiteBalance::query(&*device).unwrap_or_else(|e| {
            warn!("Cannot read white balance state: {}", e);
            WhiteBalance::new(AutoWhiteBalance::Off)
        });

        let geometry = Geometry::new(capabilities.sensor_width, capabilities.sensor_height, capabilities.roi);
        let buffer = SharedImageBuffer::new(
            capabilities.sensor_width,
            capabilities.sensor_height,
            geometry.bytes_per_pixel()
        );
        let context = Arc::new(AcquisitionContext::new(
            device,
            buffer,
            collaborators.sink,
            collaborators.host,
            white_balance
        ));

        let mut camera = PeakCamera{
            label: config.label.clone(),
            session,
            context,
            geometry,
            rate,
            engine: SequenceEngine::new(),
            exposure_sequence: ExposureSequence::default(),
            trigger_device: String::new(),
            allow_multi_roi: false,
            multi_roi_fill_value: 0,
            stop_on_overflow: false,
            initialized: true
        };
        camera.clear_roi()?;
        camera.apply_config(config)?;

        info!("Camera \"{}\" initialized: {}x{}, exposure {:.3} ms",
            camera.label, camera.image_width(), camera.image_height(), camera.exposure());

        Ok(camera)
    }

    fn apply_config(&mut self, config: &CameraConfig) -> Result<(), CameraError> {
        let invalid = |e: crate::config::ConfigError| CameraError::InvalidValue(e.to_string());

        if config.binning != self.binning() {
            self.set_binning(config.binning)?;
        }
        let pixel_type = config.pixel_type().map_err(invalid)?;
        if pixel_type != self.pixel_type() {
            self.set_pixel_type(pixel_type)?;
        }
        self.set_exposure(config.exposure_ms)?;
        let auto_white_balance = config.auto_white_balance().map_err(invalid)?;
        if auto_white_balance != AutoWhiteBalance::Off {
            self.set_auto_white_balance(auto_white_balance)?;
        }

        self.set_trigger_device(&config.trigger_device);
        self.set_allow_multi_roi(config.allow_multi_roi);
        self.set_multi_roi_fill_value(config.multi_roi_fill_value)?;
        self.set_use_exposure_sequences(config.use_exposure_sequences);
        self.set_readout_time_ms(config.readout_time_ms)?;
        self.stop_on_overflow = config.stop_on_overflow;

        Ok(())
    }

    /// Stops any acquisition and closes the device. Further calls do nothing.
    pub fn shutdown(&mut self) -> Result<(), CameraError> {
        if !self.initialized {
            return Ok(());
        }
        self.engine.stop();

        let device = self.session.device();
        if device.is_acquisition_started() {
            if let Err(e) = device.stop_acquisition() {
                warn!("Failed to stop acquisition: {}", e);
            }
        }
        self.initialized = false;

        self.session.close()
    }

    fn ensure_initialized(&self) -> Result<(), CameraError> {
        if self.initialized { Ok(()) } else { Err(CameraError::NotInitialized) }
    }

    fn ensure_idle(&self) -> Result<(), CameraError> {
        self.ensure_initialized()?;
        if self.engine.is_capturing() { Err(CameraError::CameraBusy) } else { Ok(()) }
    }

    pub fn label(&self) -> &str { &self.label }

    pub fn capabilities(&self) -> &Capabilities { self.session.capabilities() }

    // ----------------------------------------------------------------------------------------
    // Single-frame capture

    /// Captures one frame into the image buffer.
    pub fn snap_image(&mut self) -> Result<(), CameraError> {
        self.ensure_idle()?;

        if let Some(exposure) = self.exposure_sequence.next_exposure() {
            self.set_exposure(exposure)?;
        }
        let exposure = self.rate.exposure_ms();
        self.rate.apply_interval(&**self.session.device(), exposure)?;

        capture::snap_frame(&self.context, &self.transfer_format(), self.rate.frame_rate())
    }

    /// Copy of the image buffer; waits for the readout time to pass since the last capture.
    pub fn image(&self) -> ImageBuffer {
        self.context.buffer.read().clone()
    }

    /// Calls `f` with the locked image buffer; waits for the readout time like `image`.
    pub fn with_image<R, F: FnOnce(&ImageBuffer) -> R>(&self, f: F) -> R {
        let image = self.context.buffer.read();
        f(&image)
    }

    pub fn image_width(&self) -> u32 { self.context.buffer.dimensions().0 }

    pub fn image_height(&self) -> u32 { self.context.buffer.dimensions().1 }

    pub fn image_bytes_per_pixel(&self) -> usize { self.context.buffer.dimensions().2 }

    pub fn image_buffer_size(&self) -> usize {
        let (width, height, bytes_per_pixel) = self.context.buffer.dimensions();
        width as usize * height as usize * bytes_per_pixel
    }

    pub fn bit_depth(&self) -> u32 { self.geometry.bit_depth() }

    pub fn number_of_components(&self) -> u32 { self.geometry.components() }

    pub fn pixel_size_um(&self) -> f64 {
        NOMINAL_PIXEL_SIZE_UM * self.geometry.binning() as f64
    }

    fn transfer_format(&self) -> TransferFormat {
        let value = self.multi_roi_fill_value.min(u8::max_value() as u32) as u8;
        TransferFormat{
            components: self.geometry.components(),
            fill: self.geometry.fill_mask().map(|regions| RoiFill{ regions, value })
        }
    }

    // ----------------------------------------------------------------------------------------
    // Exposure and frame rate

    /// Exposure time in milliseconds.
    pub fn exposure(&self) -> f64 { self.rate.exposure_ms() }

    pub fn exposure_range(&self) -> FloatRange { self.rate.exposure_range() }

    /// Allowed during sequence acquisition.
    pub fn set_exposure(&mut self, exposure_ms: f64) -> Result<(), CameraError> {
        self.ensure_initialized()?;
        let exposure = self.rate.apply_exposure(&**self.session.device(), exposure_ms)?;
        self.context.host.exposure_changed(exposure);
        Ok(())
    }

    pub fn frame_rate(&self) -> f64 { self.rate.frame_rate() }

    pub fn frame_rate_range(&self) -> FloatRange { self.rate.frame_rate_range() }

    pub fn set_frame_rate_max(&mut self, value: f64) -> Result<(), CameraError> {
        self.rate.set_frame_rate_max(value)
    }

    pub fn set_frame_rate_min(&mut self, value: f64) -> Result<(), CameraError> {
        self.rate.set_frame_rate_min(value)
    }

    /// Measured time between the last two frames of the current or last sequence.
    pub fn measured_interval_ms(&self) -> f64 { self.engine.last_interval_ms() }

    pub fn readout_time_ms(&self) -> f64 {
        self.context.buffer.readout_time().as_secs_f64() * 1000.0
    }

    pub fn set_readout_time_ms(&mut self, readout_time_ms: f64) -> Result<(), CameraError> {
        if !readout_time_ms.is_finite() || readout_time_ms < 0.0 {
            return Err(CameraError::InvalidValue(format!("readout time {} ms", readout_time_ms)));
        }
        self.context.buffer.set_readout_time(Duration::from_secs_f64(readout_time_ms / 1000.0));
        Ok(())
    }

    // ----------------------------------------------------------------------------------------
    // Region of interest

    /// Sets the ROI, fitted to the hardware constraints. A zero size selects the full frame.
    pub fn set_roi(&mut self, x: u32, y: u32, width: u32, height: u32) -> Result<Roi, CameraError> {
        self.ensure_idle()?;
        self.geometry.apply_roi(&**self.session.device(), &self.context.buffer, Roi::new(x, y, width, height))
    }

    /// Current ROI offset and image size.
    pub fn roi(&self) -> Roi {
        let roi = self.geometry.roi();
        let (width, height, _) = self.context.buffer.dimensions();
        Roi::new(roi.x, roi.y, width, height)
    }

    pub fn clear_roi(&mut self) -> Result<(), CameraError> {
        self.set_roi(0, 0, 0, 0).map(|_| ())
    }

    pub fn allows_multi_roi(&self) -> bool { self.allow_multi_roi }

    pub fn set_allow_multi_roi(&mut self, allow: bool) {
        self.allow_multi_roi = allow;
    }

    /// Sets several ROIs at once; the device captures their bounding box.
    pub fn set_multi_roi(&mut self, rois: &[Roi]) -> Result<Roi, CameraError> {
        self.ensure_idle()?;
        if !self.allow_multi_roi {
            return Err(CameraError::UnsupportedCommand);
        }
        self.geometry.apply_multi_roi(&**self.session.device(), &self.context.buffer, rois)
    }

    /// Same as `set_multi_roi`, with the ROIs given as parallel arrays.
    pub fn set_multi_roi_arrays(
        &mut self,
        xs: &[u32],
        ys: &[u32],
        widths: &[u32],
        heights: &[u32]
    ) -> Result<Roi, CameraError> {
        let n = xs.len();
        if ys.len() != n || widths.len() != n || heights.len() != n {
            return Err(CameraError::InvalidValue(format!(
                "multi-ROI arrays of different lengths ({}, {}, {}, {})", n, ys.len(), widths.len(), heights.len()
            )));
        }
        let rois: Vec<Roi> = (0..n).map(|i| Roi::new(xs[i], ys[i], widths[i], heights[i])).collect();
        self.set_multi_roi(&rois)
    }

    pub fn multi_roi(&self) -> &[Roi] { self.geometry.multi_roi() }

    pub fn multi_roi_count(&self) -> usize { self.geometry.multi_roi().len() }

    /// Copies the multi-ROI list into `destination`; returns the number copied.
    pub fn copy_multi_roi(&self, destination: &mut [Roi]) -> Result<usize, CameraError> {
        let rois = self.geometry.multi_roi();
        if rois.len() > destination.len() {
            return Err(CameraError::InternalInconsistency(format!(
                "{} ROIs do not fit in a list of {}", rois.len(), destination.len()
            )));
        }
        destination[..rois.len()].copy_from_slice(rois);
        Ok(rois.len())
    }

    pub fn multi_roi_fill_value(&self) -> u32 { self.multi_roi_fill_value }

    pub fn set_multi_roi_fill_value(&mut self, value: u32) -> Result<(), CameraError> {
        if value > MAX_MULTI_ROI_FILL_VALUE {
            return Err(CameraError::InvalidValue(format!("multi-ROI fill value {}", value)));
        }
        self.multi_roi_fill_value = value;
        Ok(())
    }

    // ----------------------------------------------------------------------------------------
    // Binning and pixel type

    pub fn binning(&self) -> u32 { self.geometry.binning() }

    pub fn allowed_binnings(&self) -> &[u32] { &self.session.capabilities().binning_factors }

    pub fn set_binning(&mut self, factor: u32) -> Result<(), CameraError> {
        self.ensure_idle()?;
        if !self.allowed_binnings().contains(&factor) {
            return Err(CameraError::InvalidValue(format!("binning {} (allowed: {:?})", factor, self.allowed_binnings())));
        }
        self.geometry.apply_binning(&**self.session.device(), &self.context.buffer, factor)?;
        self.rate.refresh_frame_rate_range(&**self.session.device())
    }

    pub fn pixel_type(&self) -> PixelType { self.geometry.pixel_type() }

    pub fn set_pixel_type(&mut self, pixel_type: PixelType) -> Result<(), CameraError> {
        self.ensure_idle()?;
        self.geometry.apply_pixel_type(&**self.session.device(), &self.context.buffer, pixel_type)
    }

    // ----------------------------------------------------------------------------------------
    // White balance and gains

    pub fn auto_white_balance(&self) -> AutoWhiteBalance {
        let device = self.session.device();
        if device.access_mode(Feature::AutoWhiteBalance).readable() {
            if let Ok(mode) = device.auto_white_balance() {
                self.context.update_white_balance(|wb| wb.mode = mode.into());
            }
        }
        self.context.white_balance().mode
    }

    pub fn set_auto_white_balance(&mut self, mode: AutoWhiteBalance) -> Result<(), CameraError> {
        self.ensure_idle()?;
        let device = self.session.device();
        if !device.access_mode(Feature::AutoWhiteBalance).writable() {
            return Err(CameraError::NoWriteAccess(Feature::AutoWhiteBalance));
        }
        device.set_auto_white_balance(mode.into())?;
        self.context.update_white_balance(|wb| wb.mode = mode);
        Ok(())
    }

    /// Last gain set or read back for `channel`.
    pub fn gain(&self, channel: GainChannel) -> f64 {
        self.context.white_balance().gain(channel)
    }

    pub fn gain_range(&self) -> FloatRange { self.session.capabilities().gain }

    /// Sets a digital gain; values outside the device range are clamped.
    pub fn set_gain(&mut self, channel: GainChannel, value: f64) -> Result<(), CameraError> {
        self.ensure_idle()?;
        let device = self.session.device();
        if !device.access_mode(Feature::Gain).writable() {
            return Err(CameraError::NoWriteAccess(Feature::Gain));
        }
        let value = self.session.capabilities().gain.clamp(value);
        device.set_gain(channel, value)?;
        self.context.update_white_balance(|wb| wb.set_gain(channel, value));
        Ok(())
    }

    // ----------------------------------------------------------------------------------------
    // Sequence acquisition

    pub fn start_sequence_acquisition(&mut self, request: SequenceRequest) -> Result<(), CameraError> {
        self.ensure_idle()?;
        if request.frame_count == FrameCount::Finite(0) {
            return Err(CameraError::InvalidValue("sequence of 0 frames".to_string()));
        }

        self.rate.apply_interval(&**self.session.device(), request.interval_ms)?;
        self.context.host.prepare_for_acquisition()?;

        let run = SequenceRun{
            request,
            label: self.label.clone(),
            roi: self.geometry.roi(),
            binning: self.geometry.binning(),
            format: self.transfer_format(),
            frame_rate: self.rate.frame_rate(),
            trigger: self.resolve_trigger_device(),
            start: Instant::now()
        };
        self.context.set_last_error(None);
        info!("Starting sequence acquisition: {:?} at {:.3} fps", request.frame_count, run.frame_rate);

        self.engine.start(Arc::clone(&self.context), run)
    }

    /// Runs until stopped, using the configured overflow policy.
    pub fn start_continuous_acquisition(&mut self, interval_ms: f64) -> Result<(), CameraError> {
        self.start_sequence_acquisition(SequenceRequest{
            frame_count: FrameCount::Unbounded,
            interval_ms,
            stop_on_overflow: self.stop_on_overflow
        })
    }

    /// Stops the sequence acquisition and waits for the acquisition thread to exit.
    pub fn stop_sequence_acquisition(&mut self) {
        self.engine.stop();
    }

    pub fn suspend_sequence_acquisition(&self) {
        self.engine.suspend();
    }

    pub fn resume_sequence_acquisition(&self) {
        self.engine.resume();
    }

    pub fn is_capturing(&self) -> bool { self.engine.is_capturing() }

    pub fn acquisition_state(&self) -> AcquisitionState { self.engine.state() }

    /// Frames delivered by the current or last sequence.
    pub fn frames_produced(&self) -> u64 { self.engine.frames_produced() }

    /// Error that ended the last sequence acquisition, if any.
    pub fn last_error(&self) -> Option<CameraError> { self.context.last_error() }

    pub fn trigger_device(&self) -> &str { &self.trigger_device }

    pub fn set_trigger_device(&mut self, name: &str) {
        self.trigger_device = name.to_string();
    }

    fn resolve_trigger_device(&self) -> Option<Arc<dyn TriggerDevice>> {
        if self.trigger_device.is_empty() {
            return None;
        }
        let trigger = self.context.host.trigger_device(&self.trigger_device);
        if trigger.is_none() {
            warn!("Trigger device \"{}\" not available", self.trigger_device);
        }
        trigger
    }

    // ----------------------------------------------------------------------------------------
    // Exposure sequences

    pub fn uses_exposure_sequences(&self) -> bool { self.exposure_sequence.is_sequenceable() }

    pub fn set_use_exposure_sequences(&mut self, enabled: bool) {
        self.exposure_sequence.set_sequenceable(enabled);
    }

    pub fn exposure_sequence_max_length(&self) -> Result<usize, CameraError> {
        self.exposure_sequence.max_length()
    }

    pub fn start_exposure_sequence(&mut self) -> Result<(), CameraError> {
        self.exposure_sequence.start()
    }

    pub fn stop_exposure_sequence(&mut self) -> Result<(), CameraError> {
        self.exposure_sequence.stop()
    }

    pub fn clear_exposure_sequence(&mut self) -> Result<(), CameraError> {
        self.exposure_sequence.clear()
    }

    pub fn add_to_exposure_sequence(&mut self, exposure_ms: f64) -> Result<(), CameraError> {
        self.exposure_sequence.add(exposure_ms)
    }

    pub fn send_exposure_sequence(&self) -> Result<(), CameraError> {
        self.exposure_sequence.send()
    }

    // ----------------------------------------------------------------------------------------
    // Misc.

    /// Sensor temperature in °C.
    pub fn temperature(&self) -> Result<f64, CameraError> {
        self.ensure_initialized()?;
        self.session.temperature()
    }

    pub fn property_names(&self) -> Vec<&'static str> {
        properties::property_names()
    }

    pub fn property(&self, name: &str) -> Result<String, CameraError> {
        properties::property(self, name)
    }

    pub fn set_property(&mut self, name: &str, value: &str) -> Result<(), CameraError> {
        properties::set_property(self, name, value)
    }

    pub fn allowed_property_values(&self, name: &str) -> Result<Option<Vec<String>>, CameraError> {
        properties::allowed_values(self, name)
    }
}

impl Drop for PeakCamera {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            warn!("Failed to shut down camera: {}", e);
        }
    }
}
