// SPDX-License-Identifier: MIT
//
// Terminal mode lifecycle — capture, raw mode, guaranteed restore.
//
// The session captures the terminal's mode once, derives raw mode from
// that capture, and puts the capture back on every exit path. Raw mode is
// never recomputed in reverse: the flags are bit-level, and only the
// snapshot knows what the user's shell actually had.
//
// Restoration has three layers:
//
//   1. `RawModeGuard::release()` — the normal path, errors reported.
//   2. `Drop for RawModeGuard` — early returns and `?`, best-effort.
//   3. The driver's panic hook (see `tty`) — unwinding through raw mode.
//
// The session talks to the terminal through the `TerminalDriver` trait,
// so everything here runs against an in-memory fake in tests.

use bitflags::bitflags;
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::Result;

// ─── Mode Flags ─────────────────────────────────────────────────────────────
//
// Our own bit assignments, not the platform's. The driver maps them to
// termios bits; bits we do not model stay in the driver's base termios.

bitflags! {
    /// Input processing flags (termios `c_iflag`).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct InputFlags: u32 {
        /// Break condition sends SIGINT.
        const BRKINT = 1 << 0;
        /// Translate CR to NL on input (Ctrl-M arrives as Ctrl-J).
        const ICRNL  = 1 << 1;
        /// Input parity checking.
        const INPCK  = 1 << 2;
        /// Strip the eighth bit of every input byte.
        const ISTRIP = 1 << 3;
        /// XON/XOFF software flow control (Ctrl-S / Ctrl-Q).
        const IXON   = 1 << 4;
    }
}

bitflags! {
    /// Output processing flags (termios `c_oflag`).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct OutputFlags: u32 {
        /// Output post-processing (`\n` → `\r\n`).
        const OPOST = 1 << 0;
    }
}

bitflags! {
    /// Control flags (termios `c_cflag`).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ControlFlags: u32 {
        /// 8-bit characters.
        const CS8 = 1 << 0;
    }
}

bitflags! {
    /// Local flags (termios `c_lflag`).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct LocalFlags: u32 {
        /// Echo typed characters.
        const ECHO   = 1 << 0;
        /// Canonical (line-buffered) input.
        const ICANON = 1 << 1;
        /// Ctrl-C / Ctrl-Z / Ctrl-\ generate signals.
        const ISIG   = 1 << 2;
        /// Implementation-defined input processing (Ctrl-V, Ctrl-O).
        const IEXTEN = 1 << 3;
    }
}

// ─── ModeSnapshot ───────────────────────────────────────────────────────────

/// A complete, comparable picture of the terminal mode we manage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ModeSnapshot {
    pub input: InputFlags,
    pub output: OutputFlags,
    pub control: ControlFlags,
    pub local: LocalFlags,
    /// `VMIN`: bytes a non-canonical `read()` waits for.
    pub read_min: u8,
    /// `VTIME`: non-canonical `read()` timeout in deciseconds.
    pub read_timeout: u8,
}

impl ModeSnapshot {
    /// A typical cooked terminal: echo, line editing, signals, CR→NL.
    #[must_use]
    pub const fn cooked() -> Self {
        Self {
            input: InputFlags::BRKINT
                .union(InputFlags::ICRNL)
                .union(InputFlags::IXON),
            output: OutputFlags::OPOST,
            control: ControlFlags::CS8,
            local: LocalFlags::ECHO
                .union(LocalFlags::ICANON)
                .union(LocalFlags::ISIG)
                .union(LocalFlags::IEXTEN),
            read_min: 1,
            read_timeout: 0,
        }
    }

    /// Derive raw mode from this snapshot.
    ///
    /// Turns off echo, canonical input, signal keys, extended input
    /// processing, flow control, CR translation, parity/strip/break
    /// handling and output post-processing. Forces 8-bit characters. Reads
    /// return as soon as a byte is there, or empty after `read_timeout`
    /// deciseconds.
    #[must_use]
    pub fn to_raw(self, read_timeout: u8) -> Self {
        Self {
            input: self.input
                - (InputFlags::BRKINT
                    | InputFlags::ICRNL
                    | InputFlags::INPCK
                    | InputFlags::ISTRIP
                    | InputFlags::IXON),
            output: self.output - OutputFlags::OPOST,
            control: self.control | ControlFlags::CS8,
            local: self.local
                - (LocalFlags::ECHO | LocalFlags::ICANON | LocalFlags::ISIG | LocalFlags::IEXTEN),
            read_min: 0,
            read_timeout: read_timeout.max(1),
        }
    }

    /// Whether this snapshot has everything raw mode turns off turned off.
    #[must_use]
    pub const fn is_raw(&self) -> bool {
        self.local.is_empty() && !self.output.contains(OutputFlags::OPOST) && self.read_min == 0
    }
}

// ─── TerminalDriver ─────────────────────────────────────────────────────────

/// The platform's terminal-control facility.
///
/// [`tty::Tty`](crate::tty::Tty) is the real one.
pub trait TerminalDriver {
    /// Read the current terminal mode.
    ///
    /// # Errors
    ///
    /// [`Error::IoUnavailable`](crate::Error::IoUnavailable) when there is
    /// no terminal to query.
    fn get_mode(&mut self) -> Result<ModeSnapshot>;

    /// Apply a terminal mode.
    ///
    /// # Errors
    ///
    /// [`Error::IoUnavailable`](crate::Error::IoUnavailable) when the mode
    /// cannot be applied.
    fn set_mode(&mut self, mode: &ModeSnapshot) -> Result<()>;

    /// Ask the terminal for its size as `(rows, columns)`.
    ///
    /// `None` when the query fails or reports a zero dimension.
    fn query_size(&self) -> Option<(u16, u16)>;
}

impl<D: TerminalDriver + ?Sized> TerminalDriver for &mut D {
    fn get_mode(&mut self) -> Result<ModeSnapshot> {
        (**self).get_mode()
    }

    fn set_mode(&mut self, mode: &ModeSnapshot) -> Result<()> {
        (**self).set_mode(mode)
    }

    fn query_size(&self) -> Option<(u16, u16)> {
        (**self).query_size()
    }
}

// ─── TerminalSession ────────────────────────────────────────────────────────

/// Owns the terminal's mode for the lifetime of the program.
///
/// # Example
///
/// ```no_run
/// use n_raw::terminal::TerminalSession;
/// use n_raw::tty::Tty;
/// use n_raw::Config;
///
/// let mut session = TerminalSession::capture_original(Tty::open()?)?;
/// let guard = session.enter_raw(&Config::default())?;
/// // ... read keys, draw frames ...
/// guard.release()?;
/// # Ok::<(), n_raw::Error>(())
/// ```
#[derive(Debug)]
pub struct TerminalSession<D: TerminalDriver> {
    driver: D,
    /// Captured once, never modified.
    original: ModeSnapshot,
    raw_active: bool,
}

impl<D: TerminalDriver> TerminalSession<D> {
    /// Capture the terminal's current mode.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IoUnavailable`](crate::Error::IoUnavailable) if the
    /// terminal cannot be queried (stdin is not a TTY).
    pub fn capture_original(mut driver: D) -> Result<Self> {
        let original = driver.get_mode()?;
        debug!(?original, "captured terminal mode");
        Ok(Self {
            driver,
            original,
            raw_active: false,
        })
    }

    /// The mode captured at startup.
    #[inline]
    #[must_use]
    pub const fn original(&self) -> ModeSnapshot {
        self.original
    }

    /// Whether raw mode is currently installed.
    #[inline]
    #[must_use]
    pub const fn is_raw(&self) -> bool {
        self.raw_active
    }

    /// The raw mode this session installs for `config`.
    #[must_use]
    pub fn raw_mode(&self, config: &Config) -> ModeSnapshot {
        self.original.to_raw(config.read_timeout_deciseconds())
    }

    #[inline]
    #[must_use]
    pub const fn driver(&self) -> &D {
        &self.driver
    }

    /// Install raw mode and return a guard that restores the original.
    ///
    /// The guard borrows the session mutably, so raw mode cannot be
    /// installed twice at once.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IoUnavailable`](crate::Error::IoUnavailable) if the
    /// mode cannot be applied. The terminal is left as it was.
    pub fn enter_raw(&mut self, config: &Config) -> Result<RawModeGuard<'_, D>> {
        let raw = self.raw_mode(config);
        self.driver.set_mode(&raw)?;
        self.raw_active = true;
        debug!(?raw, "entered raw mode");
        Ok(RawModeGuard {
            session: self,
            released: false,
        })
    }

    /// Put the captured mode back.
    ///
    /// Idempotent: a no-op when raw mode is not installed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IoUnavailable`](crate::Error::IoUnavailable) if the
    /// driver rejects the mode. Raw mode is then still considered active, so
    /// a later call retries.
    pub fn restore(&mut self) -> Result<()> {
        if !self.raw_active {
            return Ok(());
        }
        self.driver.set_mode(&self.original)?;
        self.raw_active = false;
        debug!("restored terminal mode");
        Ok(())
    }

    /// Give the driver back, restoring first.
    ///
    /// # Errors
    ///
    /// Same as [`restore`](Self::restore).
    pub fn into_driver(mut self) -> Result<D> {
        self.restore()?;
        Ok(self.driver)
    }
}

// ─── RawModeGuard ───────────────────────────────────────────────────────────

/// Proof that raw mode is installed. Restores the original mode when
/// released or dropped.
#[derive(Debug)]
pub struct RawModeGuard<'a, D: TerminalDriver> {
    session: &'a mut TerminalSession<D>,
    released: bool,
}

impl<D: TerminalDriver> RawModeGuard<'_, D> {
    /// The driver behind the session (for size queries while raw).
    #[inline]
    #[must_use]
    pub fn driver(&self) -> &D {
        &self.session.driver
    }

    /// Restore the original mode now and report the outcome.
    ///
    /// # Errors
    ///
    /// Returns the driver's error if the original mode cannot be applied.
    pub fn release(mut self) -> Result<()> {
        self.released = true;
        self.session.restore()
    }
}

impl<D: TerminalDriver> Drop for RawModeGuard<'_, D> {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if let Err(err) = self.session.restore() {
            warn!(%err, "could not restore terminal mode");
        }
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
