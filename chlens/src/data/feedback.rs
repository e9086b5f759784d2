//! Statement echo level with scoped quiet mode

use std::sync::atomic::{AtomicU8, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedbackLevel {
    /// Executed statements are only logged at debug level
    Quiet,
    /// Executed statements and their row counts are logged at info level
    Normal,
}

impl FeedbackLevel {
    fn as_u8(self) -> u8 {
        match self {
            Self::Quiet => 0,
            Self::Normal => 1,
        }
    }

    fn from_u8(value: u8) -> Self {
        if value == 0 { Self::Quiet } else { Self::Normal }
    }
}

/// Shared echo level of an executor
#[derive(Debug)]
pub struct Feedback {
    level: AtomicU8,
}

impl Default for Feedback {
    fn default() -> Self {
        Self::new(FeedbackLevel::Normal)
    }
}

impl Feedback {
    pub fn new(level: FeedbackLevel) -> Self {
        Self {
            level: AtomicU8::new(level.as_u8()),
        }
    }

    pub fn level(&self) -> FeedbackLevel {
        FeedbackLevel::from_u8(self.level.load(Ordering::Acquire))
    }

    /// Set a new level and return the previous one
    pub fn set(&self, level: FeedbackLevel) -> FeedbackLevel {
        FeedbackLevel::from_u8(self.level.swap(level.as_u8(), Ordering::AcqRel))
    }

    /// Switch to quiet mode until the returned guard is dropped.
    ///
    /// The level in effect before the call is restored on drop, whether the
    /// guarded section returns normally, bails out with `?`, or panics.
    pub fn quiet(&self) -> FeedbackGuard<'_> {
        let previous = self.set(FeedbackLevel::Quiet);
        FeedbackGuard {
            feedback: self,
            previous,
        }
    }
}

/// Restores the previous [`FeedbackLevel`] when dropped
#[must_use = "quiet mode ends as soon as the guard is dropped"]
pub struct FeedbackGuard<'a> {
    feedback: &'a Feedback,
    previous: FeedbackLevel,
}

impl Drop for FeedbackGuard<'_> {
    fn drop(&mut self) {
        self.feedback.set(self.previous);
    }
}
