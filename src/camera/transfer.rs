//
// Peakcam - Frame acquisition for IDS peak USB cameras
// Copyright (c) 2021 Filip Szczerek <ga.software@yahoo.com>
//
// This project is licensed under the terms of the MIT license
// (see the LICENSE file for details).
//

//!
//! Copying device frames into the shared image buffer.
//!

use crate::camera::{CameraError, Device, PixelFormat, RawFrame, SharedImageBuffer};
use crate::camera::geometry::Roi;
use log::warn;

/// Pixels outside the multi-ROI sub-regions are overwritten with `value`.
#[derive(Clone, Debug, PartialEq)]
pub struct RoiFill {
    pub regions: Vec<Roi>,
    pub value: u8
}

#[derive(Clone, Debug, PartialEq)]
pub struct TransferFormat {
    pub components: u32,
    pub fill: Option<RoiFill>
}

/// Copies `frame` into `buffer`. Colour frames are converted to BGRA8 first;
/// the converted copy is released here, `frame` itself is not.
pub fn transfer_frame(
    device: &dyn Device,
    frame: &RawFrame,
    buffer: &SharedImageBuffer,
    format: &TransferFormat
) -> Result<(), CameraError> {
    match format.components {
        1 => copy_into(buffer, frame.data(), format.fill.as_ref()),

        4 => {
            let converted = device.convert_frame(frame, PixelFormat::Bgra8).map_err(|e| {
                warn!("Frame conversion to BGRA8 failed: {}", e);
                CameraError::Device(e)
            })?;
            let result = copy_into(buffer, converted.data(), format.fill.as_ref());
            if let Err(e) = device.release_frame(converted) {
                warn!("Failed to release converted frame: {}", e);
            }
            result
        },

        n => Err(CameraError::UnsupportedDataFormat(n))
    }
}

fn copy_into(buffer: &SharedImageBuffer, data: &[u8], fill: Option<&RoiFill>) -> Result<(), CameraError> {
    let mut image = buffer.lock();
    if image.byte_size() != data.len() {
        return Err(CameraError::InternalInconsistency(format!(
            "frame of {} bytes does not fit {}x{}x{} image buffer",
            data.len(), image.width(), image.height(), image.bytes_per_pixel()
        )));
    }
    image.pixels_mut().copy_from_slice(data);
    if let Some(fill) = fill {
        image.fill_outside(&fill.regions, fill.value);
    }

    Ok(())
}
