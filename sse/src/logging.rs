// SPDX-FileCopyrightText: 2024 Rot127 <unisono@quyllur.org>
// SPDX-License-Identifier: LGPL-3.0-only

use std::path::PathBuf;

use flexi_logger::{
    Age, Cleanup, Criterion, Duplicate, FileSpec, Logger, LoggerHandle, Naming, WriteMode,
};

use crate::error::Result;

/// Where and how to log.
#[derive(Clone, Debug)]
pub struct LogConfig {
    /// Log specification, e.g. `info` or `warn, sse::encoder=trace`.
    pub spec: String,
    /// Log into files in this directory. Logs to stderr if unset.
    pub directory: Option<PathBuf>,
    /// Specification file which overrides `spec` and is watched for changes.
    pub specfile: Option<PathBuf>,
    /// Write from a background thread.
    pub async_write: bool,
    /// Rotate log files daily and keep this many compressed old ones.
    pub keep_compressed: Option<usize>,
}

impl Default for LogConfig {
    fn default() -> LogConfig {
        LogConfig {
            spec: "info".to_owned(),
            directory: None,
            specfile: None,
            async_write: false,
            keep_compressed: None,
        }
    }
}

impl LogConfig {
    pub fn new(spec: &str) -> LogConfig {
        LogConfig {
            spec: spec.to_owned(),
            ..LogConfig::default()
        }
    }
}

/// Initializes the global logger.
/// The handle must be kept alive for as long as is logged.
pub fn init_logger(config: &LogConfig) -> Result<LoggerHandle> {
    let mut logger = Logger::try_with_env_or_str(&config.spec)?;
    if let Some(dir) = &config.directory {
        logger = logger
            .log_to_file(FileSpec::default().directory(dir).basename("sse"))
            .duplicate_to_stderr(Duplicate::Warn);
        if let Some(keep) = config.keep_compressed {
            logger = logger.rotate(
                Criterion::Age(Age::Day),
                Naming::Timestamps,
                Cleanup::KeepCompressedFiles(keep),
            );
        }
    } else {
        logger = logger.log_to_stderr();
    }
    if config.async_write {
        logger = logger.write_mode(WriteMode::Async);
    }
    let handle = match &config.specfile {
        Some(specfile) => logger.start_with_specfile(specfile)?,
        None => logger.start()?,
    };
    Ok(handle)
}
