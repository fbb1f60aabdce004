//
// Peakcam - Frame acquisition for IDS peak USB cameras
// Copyright (c) 2021 Filip Szczerek <ga.software@yahoo.com>
//
// This project is licensed under the terms of the MIT license
// (see the LICENSE file for details).
//

use crate::config::{ConfigError, LoggingConfig};
use simplelog::{ColorChoice, CombinedLogger, ConfigBuilder, SharedLogger, TermLogger, TerminalMode, WriteLogger};
use time::macros::format_description;

/// Installs the terminal logger and, if configured, the file logger.
pub fn init(config: &LoggingConfig) -> Result<(), ConfigError> {
    let level = config.level_filter()?;

    let log_config = ConfigBuilder::new()
        .set_time_format_custom(format_description!("[hour]:[minute]:[second].[subsecond digits:3]"))
        .build();

    let mut loggers: Vec<Box<dyn SharedLogger>> = vec![
        TermLogger::new(level, log_config.clone(), TerminalMode::Mixed, ColorChoice::Auto)
    ];
    if let Some(path) = &config.file {
        loggers.push(WriteLogger::new(level, log_config, std::fs::File::create(path)?));
    }

    CombinedLogger::init(loggers).map_err(|e| ConfigError::Logger(e.to_string()))?;

    log::info!("Peakcam {}, OS: {}", env!("CARGO_PKG_VERSION"), os_info::get());

    Ok(())
}
