// SPDX-License-Identifier: MIT
//
// n-raw — Raw-mode terminal engine for n-tilde.
//
// Puts the controlling terminal into raw mode, decodes input bytes
// (arrow-key escape sequences included) into key events, tracks a
// clamped cursor, and draws each frame with exactly one write.
//
// This crate talks to the terminal directly: termios through libc,
// escape sequences written by hand. No TUI framework sits between us and
// the bytes.
//
// Layering, leaves first:
//
//   buffer   → AppendBuffer, the per-frame byte stage
//   terminal → ModeSnapshot, TerminalDriver, TerminalSession, RawModeGuard
//   tty      → the POSIX driver, stdin byte source, panic-time restore
//   input    → ByteSource, KeyEvent, KeyDecoder
//   screen   → ScreenModel (size probe, cursor, frame render)
//   dispatch → Dispatcher loop and the `run` session bracket

pub mod ansi;
pub mod buffer;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod input;
pub mod screen;
pub mod terminal;
pub mod tty;

#[cfg(test)]
pub(crate) mod testing;

pub use config::Config;
pub use dispatch::run;
pub use error::{Error, Result};
