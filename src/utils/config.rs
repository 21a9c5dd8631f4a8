//! Limits for configuration values.

use std::cmp;

//------------ DefMinMax -----------------------------------------------------

/// The default, minimum, and maximum values for a config variable.
///
/// Setters of configuration types use [`limit`][Self::limit] so that a
/// value outside the range is capped rather than rejected.
#[derive(Clone, Copy)]
pub struct DefMinMax<T> {
    /// The default value,
    def: T,

    /// The minimum value,
    min: T,

    /// The maximum value,
    max: T,
}

impl<T> DefMinMax<T> {
    /// Creates a new value.
    pub const fn new(def: T, min: T, max: T) -> Self {
        Self { def, min, max }
    }

    /// Returns the default value.
    pub fn default(self) -> T {
        self.def
    }

    /// Trims the given value to fit into the minimum/maximum range.
    pub fn limit(self, value: T) -> T
    where
        T: Ord,
    {
        cmp::max(self.min, cmp::min(self.max, value))
    }
}

//============ Testing =======================================================

#[cfg(test)]
mod test {
    use super::*;
    use std::time::Duration;

    #[test]
    fn limit() {
        const LIMITS: DefMinMax<Duration> = DefMinMax::new(
            Duration::from_millis(5),
            Duration::from_millis(1),
            Duration::from_secs(1),
        );
        assert_eq!(LIMITS.default(), Duration::from_millis(5));
        assert_eq!(LIMITS.limit(Duration::ZERO), Duration::from_millis(1));
        assert_eq!(
            LIMITS.limit(Duration::from_millis(20)),
            Duration::from_millis(20)
        );
        assert_eq!(LIMITS.limit(Duration::from_secs(60)), Duration::from_secs(1));
    }
}
