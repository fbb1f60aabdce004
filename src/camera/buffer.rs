//
// Peakcam - Frame acquisition for IDS peak USB cameras
// Copyright (c) 2021 Filip Szczerek <ga.software@yahoo.com>
//
// This project is licensed under the terms of the MIT license
// (see the LICENSE file for details).
//

//!
//! Image buffer shared between the control thread and the acquisition thread.
//!

use crate::camera::geometry::Roi;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// Packed pixels, `width * height * bytes_per_pixel` bytes without row padding.
#[derive(Clone, Debug, PartialEq)]
pub struct ImageBuffer {
    width: u32,
    height: u32,
    bytes_per_pixel: usize,
    pixels: Vec<u8>
}

impl ImageBuffer {
    pub fn new(width: u32, height: u32, bytes_per_pixel: usize) -> ImageBuffer {
        ImageBuffer{
            width,
            height,
            bytes_per_pixel,
            pixels: vec![0; width as usize * height as usize * bytes_per_pixel]
        }
    }

    pub fn width(&self) -> u32 { self.width }

    pub fn height(&self) -> u32 { self.height }

    pub fn bytes_per_pixel(&self) -> usize { self.bytes_per_pixel }

    pub fn byte_size(&self) -> usize { self.pixels.len() }

    pub fn bytes_per_line(&self) -> usize { self.width as usize * self.bytes_per_pixel }

    pub fn pixels(&self) -> &[u8] { &self.pixels }

    pub fn pixels_mut(&mut self) -> &mut [u8] { &mut self.pixels }

    pub fn line(&self, y: u32) -> &[u8] {
        let stride = self.bytes_per_line();
        &self.pixels[y as usize * stride..(y as usize + 1) * stride]
    }

    /// Reallocates (zero-filled) only if the layout changes.
    pub fn resize(&mut self, width: u32, height: u32, bytes_per_pixel: usize) {
        if width == self.width && height == self.height && bytes_per_pixel == self.bytes_per_pixel {
            return;
        }
        *self = ImageBuffer::new(width, height, bytes_per_pixel);
    }

    /// Sets every byte of pixels not covered by any of `regions` to `value`.
    pub fn fill_outside(&mut self, regions: &[Roi], value: u8) {
        let bpp = self.bytes_per_pixel;
        let stride = self.bytes_per_line();
        for y in 0..self.height {
            let line = &mut self.pixels[y as usize * stride..(y as usize + 1) * stride];
            for x in 0..self.width {
                if !regions.iter().any(|r| r.contains(x, y)) {
                    for byte in &mut line[x as usize * bpp..(x as usize + 1) * bpp] {
                        *byte = value;
                    }
                }
            }
        }
    }
}

struct ReadoutGate {
    readout_time: Duration,
    started: Option<Instant>
}

/// Image buffer guarded by a mutex, plus the emulated sensor readout gate: after a capture
/// starts, readers wait until the configured readout time has elapsed.
pub struct SharedImageBuffer {
    image: Mutex<ImageBuffer>,
    gate: Mutex<ReadoutGate>
}

fn recover<'a, T>(result: Result<MutexGuard<'a, T>, PoisonError<MutexGuard<'a, T>>>) -> MutexGuard<'a, T> {
    result.unwrap_or_else(PoisonError::into_inner)
}

impl SharedImageBuffer {
    pub fn new(width: u32, height: u32, bytes_per_pixel: usize) -> SharedImageBuffer {
        SharedImageBuffer{
            image: Mutex::new(ImageBuffer::new(width, height, bytes_per_pixel)),
            gate: Mutex::new(ReadoutGate{ readout_time: Duration::from_secs(0), started: None })
        }
    }

    /// Locks the buffer without waiting for the readout gate.
    pub fn lock(&self) -> MutexGuard<ImageBuffer> {
        recover(self.image.lock())
    }

    pub fn resize(&self, width: u32, height: u32, bytes_per_pixel: usize) {
        self.lock().resize(width, height, bytes_per_pixel);
    }

    /// Returns (width, height, bytes per pixel).
    pub fn dimensions(&self) -> (u32, u32, usize) {
        let image = self.lock();
        (image.width(), image.height(), image.bytes_per_pixel())
    }

    pub fn readout_time(&self) -> Duration {
        recover(self.gate.lock()).readout_time
    }

    pub fn set_readout_time(&self, readout_time: Duration) {
        recover(self.gate.lock()).readout_time = readout_time;
    }

    pub fn mark_readout_start(&self) {
        recover(self.gate.lock()).started = Some(Instant::now());
    }

    /// Blocks until the readout time since the last capture start has elapsed.
    pub fn wait_for_readout(&self) {
        let remaining = {
            let gate = recover(self.gate.lock());
            match gate.started {
                Some(started) => gate.readout_time.checked_sub(started.elapsed()),
                None => None
            }
        };
        if let Some(remaining) = remaining {
            std::thread::sleep(remaining);
        }
    }

    /// Waits out the readout gate, then locks the buffer.
    pub fn read(&self) -> MutexGuard<ImageBuffer> {
        self.wait_for_readout();
        self.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resize_keeps_byte_size_consistent() {
        let buffer = SharedImageBuffer::new(512, 512, 1);
        buffer.resize(100, 32, 4);
        let image = buffer.lock();
        assert_eq!(100 * 32 * 4, image.byte_size());
        assert_eq!(400, image.bytes_per_line());
    }

    #[test]
    fn resize_to_same_layout_keeps_contents() {
        let mut image = ImageBuffer::new(4, 4, 1);
        image.pixels_mut()[5] = 77;
        image.resize(4, 4, 1);
        assert_eq!(77, image.pixels()[5]);
        image.resize(4, 2, 1);
        assert!(image.pixels().iter().all(|&p| p == 0));
    }

    #[test]
    fn fill_outside_keeps_regions() {
        let mut image = ImageBuffer::new(4, 3, 1);
        for p in image.pixels_mut() { *p = 9; }
        image.fill_outside(&[Roi::new(1, 1, 2, 1)], 0);
        assert_eq!(&[0, 0, 0, 0], image.line(0));
        assert_eq!(&[0, 9, 9, 0], image.line(1));
        assert_eq!(&[0, 0, 0, 0], image.line(2));
    }

    #[test]
    fn reader_waits_for_readout() {
        let buffer = SharedImageBuffer::new(8, 8, 1);
        buffer.set_readout_time(Duration::from_millis(40));
        buffer.mark_readout_start();
        let t0 = Instant::now();
        let _image = buffer.read();
        assert!(t0.elapsed() >= Duration::from_millis(35));
    }

    #[test]
    fn no_wait_without_readout_time() {
        let buffer = SharedImageBuffer::new(8, 8, 1);
        buffer.mark_readout_start();
        let t0 = Instant::now();
        let _image = buffer.read();
        assert!(t0.elapsed() < Duration::from_millis(20));
    }

    #[test]
    fn poisoned_buffer_stays_usable() {
        let buffer = std::sync::Arc::new(SharedImageBuffer::new(8, 8, 1));
        let writer = std::sync::Arc::clone(&buffer);
        let panicked = std::thread::spawn(move || {
            let mut image = writer.lock();
            image.pixels_mut()[0] = 5;
            panic!("writer failed");
        }).join();
        assert!(panicked.is_err());

        assert_eq!(5, buffer.lock().pixels()[0]);
        buffer.resize(4, 2, 1);
        assert_eq!((4, 2, 1), buffer.dimensions());
    }
}
