//! Sensor and display setting types.

/// Brightness the firmware uses until one is stored.
pub const DEFAULT_BRIGHTNESS: u8 = 0x2f;

/// Readings below this value mean another bot is close by.
pub const FRIEND_THRESHOLD: u16 = 0x100;

/// A raw sample from the proximity ADC.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AdcReading(pub u16);

impl AdcReading {
    /// Returns the raw 16-bit sample.
    #[must_use]
    pub const fn raw(self) -> u16 {
        self.0
    }

    /// Returns true if the reading indicates a friend in front of the bot.
    #[must_use]
    pub const fn sees_friend(self) -> bool {
        self.0 < FRIEND_THRESHOLD
    }
}

impl From<u16> for AdcReading {
    fn from(raw: u16) -> Self {
        Self(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_friend_threshold() {
        assert!(AdcReading(0).sees_friend());
        assert!(AdcReading(0xff).sees_friend());
        assert!(!AdcReading(0x100).sees_friend());
        assert!(!AdcReading(u16::MAX).sees_friend());
    }
}
