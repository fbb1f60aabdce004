//
// Peakcam - Frame acquisition for IDS peak USB cameras
// Copyright (c) 2021 Filip Szczerek <ga.software@yahoo.com>
//
// This project is licensed under the terms of the MIT license
// (see the LICENSE file for details).
//

//!
//! Host-driven exposure sequences: a list of exposure times applied one per snapped frame.
//!

use crate::camera::CameraError;
use log::debug;

pub const MAX_SEQUENCE_LENGTH: usize = 100;

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ExposureSequence {
    sequenceable: bool,
    running: bool,
    exposures: Vec<f64>,
    next: usize
}

impl ExposureSequence {
    pub fn is_sequenceable(&self) -> bool { self.sequenceable }

    pub fn set_sequenceable(&mut self, sequenceable: bool) {
        self.sequenceable = sequenceable;
        if !sequenceable {
            self.running = false;
        }
    }

    fn check_sequenceable(&self) -> Result<(), CameraError> {
        if self.sequenceable { Ok(()) } else { Err(CameraError::UnsupportedCommand) }
    }

    pub fn max_length(&self) -> Result<usize, CameraError> {
        self.check_sequenceable()?;
        Ok(MAX_SEQUENCE_LENGTH)
    }

    pub fn exposures(&self) -> &[f64] { &self.exposures }

    pub fn is_running(&self) -> bool { self.running }

    pub fn clear(&mut self) -> Result<(), CameraError> {
        self.check_sequenceable()?;
        self.exposures.clear();
        self.next = 0;
        Ok(())
    }

    pub fn add(&mut self, exposure_ms: f64) -> Result<(), CameraError> {
        self.check_sequenceable()?;
        if self.exposures.len() >= MAX_SEQUENCE_LENGTH {
            return Err(CameraError::InvalidValue(format!("exposure sequence longer than {}", MAX_SEQUENCE_LENGTH)));
        }
        if !(exposure_ms > 0.0) {
            return Err(CameraError::InvalidValue(format!("exposure {} ms", exposure_ms)));
        }
        self.exposures.push(exposure_ms);
        Ok(())
    }

    /// Commits the list; exposures are applied by the host-side snap loop, nothing is uploaded.
    pub fn send(&self) -> Result<(), CameraError> {
        self.check_sequenceable()?;
        debug!("Exposure sequence of {} value(s) ready", self.exposures.len());
        Ok(())
    }

    pub fn start(&mut self) -> Result<(), CameraError> {
        self.check_sequenceable()?;
        self.running = true;
        self.next = 0;
        Ok(())
    }

    pub fn stop(&mut self) -> Result<(), CameraError> {
        self.check_sequenceable()?;
        self.running = false;
        self.next = 0;
        Ok(())
    }

    /// Next exposure to apply while running; wraps around at the end of the list.
    pub fn next_exposure(&mut self) -> Option<f64> {
        if !self.running || self.exposures.is_empty() {
            return None;
        }
        let exposure = self.exposures[self.next % self.exposures.len()];
        self.next = (self.next + 1) % self.exposures.len();
        Some(exposure)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_sequence_is_unsupported() {
        let mut sequence = ExposureSequence::default();
        assert_eq!(Err(CameraError::UnsupportedCommand), sequence.max_length());
        assert_eq!(Err(CameraError::UnsupportedCommand), sequence.add(1.0));
        assert_eq!(Err(CameraError::UnsupportedCommand), sequence.start());
        assert_eq!(None, sequence.next_exposure());
    }

    #[test]
    fn exposures_cycle_while_running() {
        let mut sequence = ExposureSequence::default();
        sequence.set_sequenceable(true);
        sequence.add(1.0).unwrap();
        sequence.add(2.0).unwrap();
        assert_eq!(None, sequence.next_exposure());

        sequence.send().unwrap();
        sequence.start().unwrap();
        assert!(sequence.is_running());
        assert_eq!(Some(1.0), sequence.next_exposure());
        assert_eq!(Some(2.0), sequence.next_exposure());
        assert_eq!(Some(1.0), sequence.next_exposure());

        sequence.stop().unwrap();
        assert!(!sequence.is_running());
        assert_eq!(None, sequence.next_exposure());
    }

    #[test]
    fn length_is_limited() {
        let mut sequence = ExposureSequence::default();
        sequence.set_sequenceable(true);
        for i in 0..MAX_SEQUENCE_LENGTH {
            sequence.add(1.0 + i as f64).unwrap();
        }
        assert!(sequence.add(1.0).is_err());
        sequence.clear().unwrap();
        assert!(sequence.exposures().is_empty());
    }
}
