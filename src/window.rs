//! Evaluation windows.
//!
//! A window is a half-open interval `[start, end)` used to bound lineage,
//! conflict and resolution history for quality scoring.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// A half-open time interval `[start, end)`.
///
/// # Examples
///
/// ```
/// use netrecon::Window;
/// use chrono::{Duration, Utc};
///
/// let window = Window::last(Duration::hours(1));
/// assert!(window.contains(Utc::now() - Duration::minutes(5)));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Window {
    /// Start of the window (inclusive).
    pub start: DateTime<Utc>,

    /// End of the window (exclusive).
    pub end: DateTime<Utc>,
}

impl Window {
    /// Creates a window from two timestamps.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::InvalidWindow` if `start >= end`.
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self, ValidationError> {
        if start >= end {
            return Err(ValidationError::InvalidWindow { start, end });
        }
        Ok(Self { start, end })
    }

    /// Window covering the trailing `length` up to now.
    #[must_use]
    pub fn last(length: Duration) -> Self {
        let end = Utc::now();
        Self {
            start: end - length,
            end,
        }
    }

    /// Returns true if `at` falls within the window.
    #[must_use]
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        at >= self.start && at < self.end
    }
}
