// SPDX-License-Identifier: MIT
//
// The real terminal — termios, window size, stdin bytes, stdout frames.
//
// Safety: This module necessarily uses `unsafe` for termios (tcgetattr,
// tcsetattr), ioctl (TIOCGWINSZ), isatty, poll, and raw fd reads and
// writes. These are the standard POSIX interfaces for terminal control;
// there is no safe alternative. Each unsafe block is minimal.
#![allow(unsafe_code)]
//
// `Tty` implements `TerminalDriver` on stdin's termios. It maps our
// `ModeSnapshot` flags onto termios bits and keeps the first termios it
// read as a base, so everything the snapshot does not model (baud rate,
// character-size mask, the other control characters) survives a
// raw → restore cycle bit for bit.
//
// Only one `Tty` may exist at a time: the controlling terminal is
// process-wide state, and two owners would fight over it.
//
// The panic hook writes a restore sequence straight to fd 1 (no stdout
// lock, so no deadlock mid-frame), puts the original termios back, then
// lets the default hook print to a working terminal.

use std::fmt;
use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, Once};
use std::time::Duration;

use tracing::debug;

use crate::error::{Error, Result};
use crate::input::ByteSource;
use crate::terminal::{ModeSnapshot, TerminalDriver};

#[cfg(unix)]
use crate::terminal::{ControlFlags, InputFlags, LocalFlags, OutputFlags};

// ─── Process-wide State ─────────────────────────────────────────────────────

/// Set while a [`Tty`] exists.
static TTY_CLAIMED: AtomicBool = AtomicBool::new(false);

/// The termios to put back if we panic while the terminal is not in its
/// original mode. `None` whenever the original mode is applied.
#[cfg(unix)]
static TERMIOS_BACKUP: Mutex<Option<libc::termios>> = Mutex::new(None);

static PANIC_HOOK_INSTALLED: Once = Once::new();

/// Clear screen, cursor home, show cursor.
///
/// What the user sees after a panic: an empty screen with a visible
/// cursor, and the panic message printed below it.
const EMERGENCY_RESTORE: &[u8] = b"\x1b[2J\x1b[H\x1b[?25h";

/// Check whether stdin is connected to a terminal.
#[cfg(unix)]
#[must_use]
pub fn is_tty() -> bool {
    unsafe { libc::isatty(libc::STDIN_FILENO) != 0 }
}

#[cfg(not(unix))]
#[must_use]
pub fn is_tty() -> bool {
    false
}

fn install_panic_hook() {
    PANIC_HOOK_INSTALLED.call_once(|| {
        let original = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            restore_from_backup();
            original(info);
        }));
    });
}

/// Best-effort restore for the panic hook. Ignores every error.
#[cfg(unix)]
fn restore_from_backup() {
    let Ok(guard) = TERMIOS_BACKUP.lock() else {
        return;
    };
    if let Some(ref original) = *guard {
        unsafe {
            let _ = libc::write(
                libc::STDOUT_FILENO,
                EMERGENCY_RESTORE.as_ptr().cast::<libc::c_void>(),
                EMERGENCY_RESTORE.len(),
            );
            let _ = libc::tcsetattr(libc::STDIN_FILENO, libc::TCSANOW, original);
        }
    }
}

#[cfg(not(unix))]
fn restore_from_backup() {
    let _ = io::stdout().write_all(EMERGENCY_RESTORE);
    let _ = io::stdout().flush();
}

// ─── Flag Mapping ───────────────────────────────────────────────────────────

#[cfg(unix)]
const INPUT_BITS: [(InputFlags, libc::tcflag_t); 5] = [
    (InputFlags::BRKINT, libc::BRKINT),
    (InputFlags::ICRNL, libc::ICRNL),
    (InputFlags::INPCK, libc::INPCK),
    (InputFlags::ISTRIP, libc::ISTRIP),
    (InputFlags::IXON, libc::IXON),
];

#[cfg(unix)]
const OUTPUT_BITS: [(OutputFlags, libc::tcflag_t); 1] = [(OutputFlags::OPOST, libc::OPOST)];

#[cfg(unix)]
const LOCAL_BITS: [(LocalFlags, libc::tcflag_t); 4] = [
    (LocalFlags::ECHO, libc::ECHO),
    (LocalFlags::ICANON, libc::ICANON),
    (LocalFlags::ISIG, libc::ISIG),
    (LocalFlags::IEXTEN, libc::IEXTEN),
];

#[cfg(unix)]
fn read_bits<F: bitflags::Flags + Copy>(
    word: libc::tcflag_t,
    table: &[(F, libc::tcflag_t)],
) -> F {
    table
        .iter()
        .filter(|&&(_, bit)| word & bit != 0)
        .fold(F::empty(), |acc, &(flag, _)| acc.union(flag))
}

#[cfg(unix)]
fn write_bits<F: bitflags::Flags + Copy>(
    word: &mut libc::tcflag_t,
    table: &[(F, libc::tcflag_t)],
    flags: F,
) {
    for &(flag, bit) in table {
        if flags.contains(flag) {
            *word |= bit;
        } else {
            *word &= !bit;
        }
    }
}

/// Describe a termios as a snapshot.
#[cfg(unix)]
fn snapshot_of(t: &libc::termios) -> ModeSnapshot {
    let control = if t.c_cflag & libc::CSIZE == libc::CS8 {
        ControlFlags::CS8
    } else {
        ControlFlags::empty()
    };
    ModeSnapshot {
        input: read_bits(t.c_iflag, &INPUT_BITS),
        output: read_bits(t.c_oflag, &OUTPUT_BITS),
        control,
        local: read_bits(t.c_lflag, &LOCAL_BITS),
        read_min: t.c_cc[libc::VMIN],
        read_timeout: t.c_cc[libc::VTIME],
    }
}

/// Apply a snapshot on top of `base`. Bits the snapshot does not model
/// come from `base` unchanged.
#[cfg(unix)]
fn apply_snapshot(base: &libc::termios, mode: &ModeSnapshot) -> libc::termios {
    let mut t = *base;
    write_bits(&mut t.c_iflag, &INPUT_BITS, mode.input);
    write_bits(&mut t.c_oflag, &OUTPUT_BITS, mode.output);
    write_bits(&mut t.c_lflag, &LOCAL_BITS, mode.local);

    let size = if mode.control.contains(ControlFlags::CS8) {
        libc::CS8
    } else {
        base.c_cflag & libc::CSIZE
    };
    t.c_cflag = (t.c_cflag & !libc::CSIZE) | size;

    t.c_cc[libc::VMIN] = mode.read_min;
    t.c_cc[libc::VTIME] = mode.read_timeout;
    t
}

// ─── Tty ────────────────────────────────────────────────────────────────────

/// The controlling terminal, reached through stdin and stdout.
pub struct Tty {
    /// First termios read; the canvas every `set_mode` paints on.
    #[cfg(unix)]
    base: Option<libc::termios>,
    /// Snapshot of `base`. Applying it means "back to normal".
    original: Option<ModeSnapshot>,
}

impl Tty {
    /// Claim the controlling terminal.
    ///
    /// Does not touch the terminal yet; the first
    /// [`get_mode`](TerminalDriver::get_mode) does.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TerminalClaimed`] if another `Tty` is alive.
    pub fn open() -> Result<Self> {
        TTY_CLAIMED
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| Error::TerminalClaimed)?;
        Ok(Self {
            #[cfg(unix)]
            base: None,
            original: None,
        })
    }

    #[cfg(unix)]
    fn read_termios() -> Result<libc::termios> {
        if !is_tty() {
            return Err(Error::unavailable(
                "isatty",
                io::Error::other("stdin is not a terminal"),
            ));
        }
        unsafe {
            let mut termios: libc::termios = std::mem::zeroed();
            if libc::tcgetattr(libc::STDIN_FILENO, &raw mut termios) != 0 {
                return Err(Error::unavailable("tcgetattr", io::Error::last_os_error()));
            }
            Ok(termios)
        }
    }

    /// Keep the panic backup in sync with what is applied.
    #[cfg(unix)]
    fn update_backup(&self, applied: &ModeSnapshot) {
        let Ok(mut guard) = TERMIOS_BACKUP.lock() else {
            return;
        };
        *guard = if self.original.as_ref() == Some(applied) {
            None
        } else {
            self.base
        };
    }
}

#[cfg(unix)]
impl TerminalDriver for Tty {
    fn get_mode(&mut self) -> Result<ModeSnapshot> {
        let current = Self::read_termios()?;
        if self.base.is_none() {
            let original = snapshot_of(&current);
            self.base = Some(current);
            self.original = Some(original);
            install_panic_hook();
            debug!("captured base termios");
        }
        Ok(snapshot_of(&current))
    }

    fn set_mode(&mut self, mode: &ModeSnapshot) -> Result<()> {
        let base = match self.base {
            Some(base) => base,
            None => Self::read_termios()?,
        };
        let termios = apply_snapshot(&base, mode);
        // TCSAFLUSH: drop unread input so stray bytes don't leak into
        // the next program (or into us).
        let rc =
            unsafe { libc::tcsetattr(libc::STDIN_FILENO, libc::TCSAFLUSH, &raw const termios) };
        if rc != 0 {
            return Err(Error::unavailable("tcsetattr", io::Error::last_os_error()));
        }
        self.update_backup(mode);
        Ok(())
    }

    fn query_size(&self) -> Option<(u16, u16)> {
        let mut ws: libc::winsize = unsafe { std::mem::zeroed() };
        let result = unsafe { libc::ioctl(libc::STDOUT_FILENO, libc::TIOCGWINSZ, &mut ws) };
        (result == 0 && ws.ws_row > 0 && ws.ws_col > 0).then_some((ws.ws_row, ws.ws_col))
    }
}

#[cfg(not(unix))]
impl TerminalDriver for Tty {
    fn get_mode(&mut self) -> Result<ModeSnapshot> {
        Err(Error::unavailable(
            "get mode",
            io::Error::from(io::ErrorKind::Unsupported),
        ))
    }

    fn set_mode(&mut self, _mode: &ModeSnapshot) -> Result<()> {
        Err(Error::unavailable(
            "set mode",
            io::Error::from(io::ErrorKind::Unsupported),
        ))
    }

    fn query_size(&self) -> Option<(u16, u16)> {
        None
    }
}

impl Drop for Tty {
    fn drop(&mut self) {
        #[cfg(unix)]
        if let Ok(mut guard) = TERMIOS_BACKUP.lock() {
            *guard = None;
        }
        TTY_CLAIMED.store(false, Ordering::Release);
    }
}

impl fmt::Debug for Tty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tty")
            .field("original", &self.original)
            .finish_non_exhaustive()
    }
}

// ─── TtyInput ───────────────────────────────────────────────────────────────

/// Key bytes from stdin, one at a time.
///
/// Waits with `poll(2)` so the timeout holds no matter what `VTIME` says.
/// An interrupted or would-block read counts as a timeout.
#[derive(Debug, Default)]
pub struct TtyInput;

impl TtyInput {
    #[must_use]
    pub const fn stdin() -> Self {
        Self
    }
}

#[cfg(unix)]
impl ByteSource for TtyInput {
    fn poll_byte(&mut self, timeout: Duration) -> Result<Option<u8>> {
        let timeout_ms = i32::try_from(timeout.as_millis()).unwrap_or(i32::MAX);
        let mut pfd = libc::pollfd {
            fd: libc::STDIN_FILENO,
            events: libc::POLLIN,
            revents: 0,
        };

        let ready = unsafe { libc::poll(&raw mut pfd, 1, timeout_ms) };
        if ready < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                return Ok(None);
            }
            return Err(Error::failure("poll", err));
        }
        if ready == 0 {
            return Ok(None);
        }

        let mut byte = 0u8;
        let n = unsafe { libc::read(libc::STDIN_FILENO, (&raw mut byte).cast(), 1) };
        match n {
            1 => Ok(Some(byte)),
            0 if pfd.revents & libc::POLLHUP != 0 => Err(Error::failure(
                "read",
                io::Error::new(io::ErrorKind::UnexpectedEof, "terminal hung up"),
            )),
            0 => Ok(None),
            _ => {
                let err = io::Error::last_os_error();
                match err.kind() {
                    io::ErrorKind::Interrupted | io::ErrorKind::WouldBlock => Ok(None),
                    _ => Err(Error::failure("read", err)),
                }
            }
        }
    }
}

#[cfg(not(unix))]
impl ByteSource for TtyInput {
    fn poll_byte(&mut self, _timeout: Duration) -> Result<Option<u8>> {
        Err(Error::failure(
            "read",
            io::Error::from(io::ErrorKind::Unsupported),
        ))
    }
}

// ─── TtyOutput ──────────────────────────────────────────────────────────────

/// Unbuffered writes straight to fd 1.
///
/// `io::Stdout` is line-buffered and would cut a frame at its last
/// newline; this hands each `write_all` to the kernel as-is.
#[derive(Debug, Default)]
pub struct TtyOutput;

impl TtyOutput {
    #[must_use]
    pub const fn stdout() -> Self {
        Self
    }
}

#[cfg(unix)]
impl Write for TtyOutput {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = unsafe {
            libc::write(
                libc::STDOUT_FILENO,
                buf.as_ptr().cast::<libc::c_void>(),
                buf.len(),
            )
        };
        usize::try_from(n).map_err(|_| io::Error::last_os_error())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(not(unix))]
impl Write for TtyOutput {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        io::stdout().write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        io::stdout().flush()
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
