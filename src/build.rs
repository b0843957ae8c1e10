// Copyright (c) 2025 Redglyph (@gmail.com). All Rights Reserved.

use std::error::Error;
use std::fmt::{Display, Formatter};
use crate::log::{BufLog, LogStatus};

// ---------------------------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum BuildErrorSource {
    Grammar,
    SanityChecker,
    LexerData,
}

#[derive(Debug)]
pub struct BuildError {
    log: BufLog,
    source: BuildErrorSource,
}

impl BuildError {
    pub fn new(log: BufLog, source: BuildErrorSource) -> Self {
        BuildError { log, source }
    }

    pub fn get_source(&self) -> BuildErrorSource {
        self.source
    }

    pub fn get_log(self) -> BufLog {
        self.log
    }
}

impl Display for BuildError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Errors have occurred in {:?}:\n{}", self.source, self.log.get_messages_str())
    }
}

impl Error for BuildError {
}

pub trait HasBuildErrorSource {
    const SOURCE: BuildErrorSource;

    fn get_build_error_source() -> BuildErrorSource {
        Self::SOURCE
    }
}
