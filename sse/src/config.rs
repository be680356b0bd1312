// SPDX-FileCopyrightText: 2024 Rot127 <unisono@quyllur.org>
// SPDX-License-Identifier: LGPL-3.0-only

use std::env;
use std::str::FromStr;
use std::time::Duration;

use log::debug;
use regex::RegexSet;

use crate::error::{Result, SseError};
use crate::memory::{ADDRESS_RANGE, DEFAULT_FIELD_STRIDE};
use crate::solver::native::DEFAULT_SEARCH_BUDGET;

/// Names of the functions whose calls are checked as assertions.
pub const DEFAULT_SINKS: [&str; 3] = ["assert", "svf_assert", "sink"];
pub const DEFAULT_MAX_CALL_DEPTH: usize = 16;
pub const DEFAULT_MAX_PATHS: usize = 100_000;

/// Settings of an analysis session.
#[derive(Clone, Debug)]
pub struct Config {
    /// Exact callee names of sinks.
    pub sink_functions: Vec<String>,
    /// Additional regular expressions a callee name is matched against.
    pub sink_patterns: Vec<String>,
    /// Call edges are not followed beyond this many nested calls.
    pub max_call_depth: usize,
    /// The search stops after this many completed paths.
    pub max_paths: usize,
    /// The search stops after this time.
    pub timeout: Option<Duration>,
    /// Addresses reserved per memory object.
    pub field_stride: u32,
    /// Search nodes the native solver may visit per check.
    pub search_budget: usize,
    /// Attach a variable dump to failed assertions.
    pub dump_on_failure: bool,
}

impl Default for Config {
    fn default() -> Config {
        Config {
            sink_functions: DEFAULT_SINKS.iter().map(|s| s.to_string()).collect(),
            sink_patterns: Vec::new(),
            max_call_depth: DEFAULT_MAX_CALL_DEPTH,
            max_paths: DEFAULT_MAX_PATHS,
            timeout: None,
            field_stride: DEFAULT_FIELD_STRIDE,
            search_budget: DEFAULT_SEARCH_BUDGET,
            dump_on_failure: true,
        }
    }
}

fn parse_env<T: FromStr>(name: &str) -> Result<Option<T>> {
    let Ok(val) = env::var(name) else {
        return Ok(None);
    };
    match val.trim().parse::<T>() {
        Ok(v) => Ok(Some(v)),
        Err(_) => Err(SseError::InvalidConfig(format!(
            "{} has an invalid value: '{}'",
            name, val
        ))),
    }
}

impl Config {
    pub fn new() -> Config {
        Config::default()
    }

    /// Default configuration overwritten by the `SSE_*` environment variables.
    ///
    /// - `SSE_SINKS`: comma separated sink function names
    /// - `SSE_MAX_CALL_DEPTH`, `SSE_MAX_PATHS`, `SSE_FIELD_STRIDE`, `SSE_SEARCH_BUDGET`: numbers
    /// - `SSE_TIMEOUT`: seconds
    /// - `SSE_DUMP`: `true` or `false`
    pub fn from_env() -> Result<Config> {
        let mut config = Config::default();
        if let Ok(sinks) = env::var("SSE_SINKS") {
            config.sink_functions = sinks
                .split(',')
                .map(|s| s.trim().to_owned())
                .filter(|s| !s.is_empty())
                .collect();
        }
        if let Some(v) = parse_env("SSE_MAX_CALL_DEPTH")? {
            config.max_call_depth = v;
        }
        if let Some(v) = parse_env("SSE_MAX_PATHS")? {
            config.max_paths = v;
        }
        if let Some(v) = parse_env::<u64>("SSE_TIMEOUT")? {
            config.timeout = Some(Duration::from_secs(v));
        }
        if let Some(v) = parse_env("SSE_FIELD_STRIDE")? {
            config.field_stride = v;
        }
        if let Some(v) = parse_env("SSE_SEARCH_BUDGET")? {
            config.search_budget = v;
        }
        if let Some(v) = parse_env("SSE_DUMP")? {
            config.dump_on_failure = v;
        }
        config.validate()?;
        debug!("Configuration: {:?}", config);
        Ok(config)
    }

    pub fn with_sinks(mut self, sinks: &[&str]) -> Config {
        self.sink_functions = sinks.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn with_sink_pattern(mut self, pattern: &str) -> Config {
        self.sink_patterns.push(pattern.to_owned());
        self
    }

    pub fn with_max_call_depth(mut self, depth: usize) -> Config {
        self.max_call_depth = depth;
        self
    }

    pub fn with_max_paths(mut self, paths: usize) -> Config {
        self.max_paths = paths;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Config {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_field_stride(mut self, stride: u32) -> Config {
        self.field_stride = stride;
        self
    }

    pub fn with_search_budget(mut self, budget: usize) -> Config {
        self.search_budget = budget;
        self
    }

    pub fn with_dump_on_failure(mut self, dump: bool) -> Config {
        self.dump_on_failure = dump;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.sink_functions.is_empty() && self.sink_patterns.is_empty() {
            return Err(SseError::InvalidConfig("No sink functions given".to_owned()));
        }
        if self.field_stride == 0 || self.field_stride > ADDRESS_RANGE {
            return Err(SseError::InvalidConfig(format!(
                "Field stride must be in [1, {:#x}]. Is {}",
                ADDRESS_RANGE, self.field_stride
            )));
        }
        if self.max_paths == 0 {
            return Err(SseError::InvalidConfig(
                "max_paths must be at least 1".to_owned(),
            ));
        }
        if self.search_budget == 0 {
            return Err(SseError::InvalidConfig(
                "search_budget must be at least 1".to_owned(),
            ));
        }
        Ok(())
    }

    pub fn sink_matcher(&self) -> Result<SinkMatcher> {
        SinkMatcher::new(&self.sink_functions, &self.sink_patterns)
    }
}

/// Decides if a callee is a sink.
#[derive(Clone, Debug)]
pub struct SinkMatcher {
    set: RegexSet,
}

impl SinkMatcher {
    /// `names` match exactly, `patterns` are regular expressions.
    pub fn new(names: &[String], patterns: &[String]) -> Result<SinkMatcher> {
        let exprs = names
            .iter()
            .map(|n| format!("^{}$", regex::escape(n)))
            .chain(patterns.iter().cloned());
        Ok(SinkMatcher {
            set: RegexSet::new(exprs)?,
        })
    }

    pub fn is_match(&self, callee: &str) -> bool {
        self.set.is_match(callee)
    }
}
