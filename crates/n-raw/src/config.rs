// SPDX-License-Identifier: MIT
//
// Session configuration.
//
// Built in code, no files or environment. The defaults reproduce the
// classic behavior: 100ms input polls, Ctrl-X quits, `~` on every row.

use std::time::Duration;

/// Map a letter to its control code (`ctrl(b'x')` is Ctrl-X, 0x18).
///
/// Clears the top three bits, which is what the terminal does when Ctrl
/// is held.
#[inline]
#[must_use]
pub const fn ctrl(key: u8) -> u8 {
    key & 0x1f
}

/// Tunables for a terminal session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    /// How long one input poll waits before reporting "no key".
    ///
    /// Also the window in which the bytes following an ESC must arrive to
    /// count as an escape sequence, and the termios `VTIME` the raw mode
    /// installs (rounded up to whole deciseconds).
    pub poll_timeout: Duration,

    /// Control byte that ends the session. Default: Ctrl-X.
    pub quit_key: u8,

    /// Byte drawn at the start of every row.
    pub placeholder: u8,

    /// Whether `h`/`j`/`k`/`l` move the cursor like the arrow keys.
    pub vi_keys: bool,
}

impl Config {
    /// `poll_timeout` as a termios `VTIME` value (deciseconds, 1..=255).
    #[must_use]
    pub fn read_timeout_deciseconds(&self) -> u8 {
        let ds = self.poll_timeout.as_millis().div_ceil(100);
        u8::try_from(ds.clamp(1, 255)).unwrap_or(u8::MAX)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            poll_timeout: Duration::from_millis(100),
            quit_key: ctrl(b'x'),
            placeholder: b'~',
            vi_keys: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ctrl_masks_upper_bits() {
        assert_eq!(ctrl(b'x'), 0x18);
        assert_eq!(ctrl(b'q'), 0x11);
        assert_eq!(ctrl(b'X'), 0x18);
    }

    #[test]
    fn default_config() {
        let config = Config::default();
        assert_eq!(config.poll_timeout, Duration::from_millis(100));
        assert_eq!(config.quit_key, 0x18);
        assert_eq!(config.placeholder, b'~');
        assert!(config.vi_keys);
    }

    #[test]
    fn read_timeout_rounds_up() {
        let mut config = Config::default();
        assert_eq!(config.read_timeout_deciseconds(), 1);

        config.poll_timeout = Duration::from_millis(150);
        assert_eq!(config.read_timeout_deciseconds(), 2);

        config.poll_timeout = Duration::from_millis(1);
        assert_eq!(config.read_timeout_deciseconds(), 1);
    }

    #[test]
    fn read_timeout_never_zero_or_overflows() {
        let mut config = Config {
            poll_timeout: Duration::ZERO,
            ..Config::default()
        };
        assert_eq!(config.read_timeout_deciseconds(), 1);

        config.poll_timeout = Duration::from_secs(3600);
        assert_eq!(config.read_timeout_deciseconds(), 255);
    }
}
