//
// Peakcam - Frame acquisition for IDS peak USB cameras
// Copyright (c) 2021 Filip Szczerek <ga.software@yahoo.com>
//
// This project is licensed under the terms of the MIT license
// (see the LICENSE file for details).
//

//!
//! Region of interest, binning and pixel layout.
//!
//! Hardware ROIs are constrained by a minimum size and a size/offset increment. Requested
//! rectangles are fitted to the nearest valid one; the image buffer always has the size of the
//! ROI currently pushed to the device.
//!

use crate::camera::{CameraError, Device, Feature, SharedImageBuffer, SizeRange};
use crate::camera::properties::PixelType;
use log::{debug, warn};
use num_traits::PrimInt;

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Roi {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32
}

impl Roi {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Roi {
        Roi{ x, y, width, height }
    }

    pub fn right(&self) -> u32 { self.x + self.width }

    pub fn bottom(&self) -> u32 { self.y + self.height }

    pub fn contains(&self, x: u32, y: u32) -> bool {
        x >= self.x && x < self.right() && y >= self.y && y < self.bottom()
    }

    /// Scales offset and size by `old_binning / new_binning`.
    pub fn rescaled(&self, old_binning: u32, new_binning: u32) -> Roi {
        let scale = |v: u32| (v as u64 * old_binning as u64 / new_binning as u64) as u32;
        Roi{ x: scale(self.x), y: scale(self.y), width: scale(self.width), height: scale(self.height) }
    }

    pub fn translated(&self, dx: i64, dy: i64) -> Roi {
        Roi{
            x: (self.x as i64 + dx).max(0) as u32,
            y: (self.y as i64 + dy).max(0) as u32,
            width: self.width,
            height: self.height
        }
    }
}

/// Returns the smallest rectangle containing all `rois`.
pub fn bounding_box(rois: &[Roi]) -> Option<Roi> {
    let first = rois.first()?;
    let (mut x0, mut y0, mut x1, mut y1) = (first.x, first.y, first.right(), first.bottom());
    for roi in &rois[1..] {
        x0 = x0.min(roi.x);
        y0 = y0.min(roi.y);
        x1 = x1.max(roi.right());
        y1 = y1.max(roi.bottom());
    }

    Some(Roi::new(x0, y0, x1 - x0, y1 - y0))
}

fn round_down_to_multiple<T: PrimInt>(value: T, step: T) -> T {
    if step.is_zero() { value } else { value - value % step }
}

fn round_up_to_multiple<T: PrimInt>(value: T, step: T) -> T {
    let down = round_down_to_multiple(value, step);
    if down == value { value } else { down + step }
}

/// Limits for ROIs at the current binning.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct RoiConstraints {
    pub sensor_width: u32,
    pub sensor_height: u32,
    pub min_width: u32,
    pub min_height: u32,
    pub increment: u32
}

impl RoiConstraints {
    pub fn full_frame(&self) -> Roi {
        Roi::new(0, 0, self.sensor_width, self.sensor_height)
    }

    /// Fits `requested` to the hardware: sizes are raised to the minimum, truncated to the
    /// increment and capped at the sensor; offsets are shifted back so the ROI stays on the sensor.
    pub fn fit(&self, requested: Roi) -> Roi {
        let width = self.fit_extent(requested.width, self.min_width, self.sensor_width);
        let height = self.fit_extent(requested.height, self.min_height, self.sensor_height);

        Roi{
            x: fit_offset(requested.x, width, self.sensor_width),
            y: fit_offset(requested.y, height, self.sensor_height),
            width,
            height
        }
    }

    fn fit_extent(&self, requested: u32, min: u32, limit: u32) -> u32 {
        let mut extent = round_down_to_multiple(requested.max(min), self.increment);
        if extent < min {
            extent = round_up_to_multiple(min, self.increment);
        }
        if extent > limit {
            extent = round_down_to_multiple(limit, self.increment);
        }
        extent
    }

    /// Grows `roi` so that its size is a multiple of the increment, moving the origin back
    /// where the grown ROI would leave the sensor.
    pub fn grow_to_increment(&self, roi: Roi) -> Roi {
        let grow = |extent: u32, limit: u32| {
            let grown = round_up_to_multiple(extent, self.increment);
            if grown > limit { round_down_to_multiple(limit, self.increment) } else { grown }
        };
        let width = grow(roi.width, self.sensor_width);
        let height = grow(roi.height, self.sensor_height);

        Roi{
            x: fit_offset(roi.x, width, self.sensor_width),
            y: fit_offset(roi.y, height, self.sensor_height),
            width,
            height
        }
    }
}

fn fit_offset(offset: u32, extent: u32, limit: u32) -> u32 {
    if offset as u64 + extent as u64 > limit as u64 { limit.saturating_sub(extent) } else { offset }
}

/// ROI, multi-ROI, binning and pixel layout currently applied to the device.
pub struct Geometry {
    sensor_width: u32,
    sensor_height: u32,
    size_range: SizeRange,
    roi: Roi,
    multi_roi: Vec<Roi>,
    binning: u32,
    pixel_type: PixelType,
    bit_depth: u32
}

impl Geometry {
    /// `sensor_width` and `sensor_height` are unbinned.
    pub fn new(sensor_width: u32, sensor_height: u32, size_range: SizeRange) -> Geometry {
        Geometry{
            sensor_width,
            sensor_height,
            size_range,
            roi: Roi::new(0, 0, sensor_width, sensor_height),
            multi_roi: vec![],
            binning: 1,
            pixel_type: PixelType::Mono8,
            bit_depth: 8
        }
    }

    pub fn constraints(&self) -> RoiConstraints {
        RoiConstraints{
            sensor_width: self.sensor_width / self.binning,
            sensor_height: self.sensor_height / self.binning,
            min_width: self.size_range.min_width,
            min_height: self.size_range.min_height,
            increment: self.size_range.inc_width.max(self.size_range.inc_height).max(1)
        }
    }

    pub fn roi(&self) -> Roi { self.roi }

    pub fn multi_roi(&self) -> &[Roi] { &self.multi_roi }

    pub fn binning(&self) -> u32 { self.binning }

    pub fn pixel_type(&self) -> PixelType { self.pixel_type }

    pub fn components(&self) -> u32 { self.pixel_type.components() }

    pub fn bit_depth(&self) -> u32 { self.bit_depth }

    pub fn bytes_per_pixel(&self) -> usize {
        (self.components() * self.bit_depth / 8) as usize
    }

    /// Sub-ROIs relative to the bounding ROI; `None` when multi-ROI is not active.
    pub fn fill_mask(&self) -> Option<Vec<Roi>> {
        if self.multi_roi.is_empty() {
            None
        } else {
            let (dx, dy) = (-(self.roi.x as i64), -(self.roi.y as i64));
            Some(self.multi_roi.iter().map(|r| r.translated(dx, dy)).collect())
        }
    }

    /// Applies a single ROI; (0, 0) size means the full frame at the current binning.
    pub fn apply_roi(
        &mut self,
        device: &dyn Device,
        buffer: &SharedImageBuffer,
        requested: Roi
    ) -> Result<Roi, CameraError> {
        if !device.access_mode(Feature::Roi).writable() {
            return Err(CameraError::NoWriteAccess(Feature::Roi));
        }
        let constraints = self.constraints();
        let roi = if requested.width == 0 && requested.height == 0 {
            constraints.full_frame()
        } else {
            constraints.fit(requested)
        };

        self.push_roi(device, buffer, roi)?;
        self.multi_roi.clear();
        debug!("ROI set to {}x{} at ({}, {})", roi.width, roi.height, roi.x, roi.y);

        Ok(roi)
    }

    /// Applies the bounding box of `rois` to the device and remembers the sub-ROIs.
    pub fn apply_multi_roi(
        &mut self,
        device: &dyn Device,
        buffer: &SharedImageBuffer,
        rois: &[Roi]
    ) -> Result<Roi, CameraError> {
        if rois.is_empty() {
            return self.apply_roi(device, buffer, Roi::default());
        }
        if !device.access_mode(Feature::Roi).writable() {
            return Err(CameraError::NoWriteAccess(Feature::Roi));
        }

        let constraints = self.constraints();
        let fitted: Vec<Roi> = rois.iter().map(|r| constraints.fit(*r)).collect();
        let bbox = match bounding_box(&fitted) {
            Some(bbox) => constraints.grow_to_increment(bbox),
            None => return Err(CameraError::InternalInconsistency("empty multi-ROI".to_string()))
        };

        self.push_roi(device, buffer, bbox)?;
        self.multi_roi = fitted;
        debug!("Multi-ROI set: {} region(s), bounding ROI {}x{} at ({}, {})",
            self.multi_roi.len(), bbox.width, bbox.height, bbox.x, bbox.y);

        Ok(bbox)
    }

    /// Resizes the buffer and pushes `roi`; a refused ROI restores the previous one and its buffer size.
    fn push_roi(&mut self, device: &dyn Device, buffer: &SharedImageBuffer, roi: Roi) -> Result<(), CameraError> {
        let previous = self.roi;
        buffer.resize(roi.width, roi.height, self.bytes_per_pixel());
        self.roi = roi;

        if let Err(e) = device.set_roi(roi) {
            warn!("Device refused ROI {}x{} at ({}, {}): {}", roi.width, roi.height, roi.x, roi.y, e);
            self.roi = previous;
            buffer.resize(previous.width, previous.height, self.bytes_per_pixel());
            return Err(e.into());
        }

        Ok(())
    }

    /// Changes the binning factor; offsets, sub-ROIs and the buffer are rescaled by old/new.
    pub fn apply_binning(
        &mut self,
        device: &dyn Device,
        buffer: &SharedImageBuffer,
        factor: u32
    ) -> Result<(), CameraError> {
        if factor == 0 {
            return Err(CameraError::InvalidValue("binning factor 0".to_string()));
        }
        if !device.access_mode(Feature::Binning).writable() {
            return Err(CameraError::NoWriteAccess(Feature::Binning));
        }

        device.set_binning(factor, factor)?;

        let old = self.binning;
        self.roi = self.roi.rescaled(old, factor);
        for sub_roi in self.multi_roi.iter_mut() {
            *sub_roi = sub_roi.rescaled(old, factor);
        }
        self.binning = factor;
        buffer.resize(self.roi.width, self.roi.height, self.bytes_per_pixel());
        debug!("Binning changed from {} to {}", old, factor);

        Ok(())
    }

    pub fn apply_pixel_type(
        &mut self,
        device: &dyn Device,
        buffer: &SharedImageBuffer,
        pixel_type: PixelType
    ) -> Result<(), CameraError> {
        if !device.access_mode(Feature::PixelFormat).writable() {
            return Err(CameraError::NoWriteAccess(Feature::PixelFormat));
        }

        device.set_pixel_format(pixel_type.device_format())?;

        self.pixel_type = pixel_type;
        self.bit_depth = 8;
        buffer.resize(self.roi.width, self.roi.height, self.bytes_per_pixel());

        Ok(())
    }
}
