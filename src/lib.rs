//
// Peakcam - Frame acquisition for IDS peak USB cameras
// Copyright (c) 2021 Filip Szczerek <ga.software@yahoo.com>
//
// This project is licensed under the terms of the MIT license
// (see the LICENSE file for details).
//

//!
//! Control and frame acquisition for IDS peak USB cameras.
//!

pub mod camera;
pub mod config;
pub mod logging;

pub use camera::{CameraError, PeakCamera};
