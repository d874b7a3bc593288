//! Validated worker stack size.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Stack budget for a worker thread, in bytes.
///
/// The range is checked at construction, so a `StackSize` can always be
/// handed to the thread builder without a second validation pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "usize", into = "usize")]
pub struct StackSize(usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum StackSizeError {
    #[error("stack size {requested} is below the minimum of {min} bytes")]
    TooSmall { requested: usize, min: usize },
    #[error("stack size {requested} exceeds the maximum of {max} bytes")]
    TooLarge { requested: usize, max: usize },
}

impl StackSizeError {
    #[must_use]
    pub const fn requested(self) -> usize {
        match self {
            Self::TooSmall { requested, .. } | Self::TooLarge { requested, .. } => requested,
        }
    }
}

impl StackSize {
    /// 16 KiB, the smallest stack glibc accepts for a pthread.
    pub const MIN: usize = 16 * 1024;
    pub const MAX: usize = 1024 * 1024 * 1024;
    pub const DEFAULT: StackSize = StackSize(1024 * 1024);

    pub fn new(bytes: usize) -> Result<Self, StackSizeError> {
        if bytes < Self::MIN {
            return Err(StackSizeError::TooSmall {
                requested: bytes,
                min: Self::MIN,
            });
        }
        if bytes > Self::MAX {
            return Err(StackSizeError::TooLarge {
                requested: bytes,
                max: Self::MAX,
            });
        }
        Ok(Self(bytes))
    }

    #[must_use]
    pub const fn bytes(self) -> usize {
        self.0
    }
}

impl Default for StackSize {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl TryFrom<usize> for StackSize {
    type Error = StackSizeError;

    fn try_from(value: usize) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<StackSize> for usize {
    fn from(value: StackSize) -> Self {
        value.0
    }
}

impl fmt::Display for StackSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0 % (1024 * 1024) == 0 {
            write!(f, "{} MiB", self.0 / (1024 * 1024))
        } else if self.0 % 1024 == 0 {
            write!(f, "{} KiB", self.0 / 1024)
        } else {
            write!(f, "{} bytes", self.0)
        }
    }
}
