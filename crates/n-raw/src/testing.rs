// SPDX-License-Identifier: MIT
//
// In-memory stand-ins for the terminal, its input, and its output.

use std::collections::VecDeque;
use std::io::{self, Write};
use std::time::Duration;

use crate::error::{Error, Result};
use crate::input::ByteSource;
use crate::terminal::{ModeSnapshot, TerminalDriver};

// ─── FakeDriver ─────────────────────────────────────────────────────────────

#[derive(Debug)]
pub struct FakeDriver {
    mode: ModeSnapshot,
    set_calls: usize,
    pub fail_get: bool,
    pub fail_set: bool,
    pub size: Option<(u16, u16)>,
}

impl FakeDriver {
    pub const fn new(mode: ModeSnapshot) -> Self {
        Self {
            mode,
            set_calls: 0,
            fail_get: false,
            fail_set: false,
            size: Some((24, 80)),
        }
    }

    pub fn not_a_tty() -> Self {
        let mut driver = Self::new(ModeSnapshot::cooked());
        driver.fail_get = true;
        driver.fail_set = true;
        driver.size = None;
        driver
    }

    pub const fn current(&self) -> ModeSnapshot {
        self.mode
    }

    pub const fn set_calls(&self) -> usize {
        self.set_calls
    }
}

impl TerminalDriver for FakeDriver {
    fn get_mode(&mut self) -> Result<ModeSnapshot> {
        if self.fail_get {
            return Err(Error::unavailable("tcgetattr", enotty()));
        }
        Ok(self.mode)
    }

    fn set_mode(&mut self, mode: &ModeSnapshot) -> Result<()> {
        if self.fail_set {
            return Err(Error::unavailable("tcsetattr", enotty()));
        }
        self.mode = *mode;
        self.set_calls += 1;
        Ok(())
    }

    fn query_size(&self) -> Option<(u16, u16)> {
        self.size
    }
}

fn enotty() -> io::Error {
    io::Error::other("inappropriate ioctl for device")
}

// ─── ScriptedInput ──────────────────────────────────────────────────────────

/// One poll's worth of scripted input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Byte(u8),
    Timeout,
    Fail,
}

/// A byte source that plays back a fixed script.
///
/// Running off the end of the script is a device error, so a loop that
/// never sees its quit key fails instead of spinning forever.
#[derive(Debug, Default)]
pub struct ScriptedInput {
    steps: VecDeque<Step>,
    pub polls: usize,
    pub consumed: usize,
}

impl ScriptedInput {
    pub fn bytes(bytes: &[u8]) -> Self {
        Self::steps(bytes.iter().map(|&b| Step::Byte(b)))
    }

    pub fn steps(steps: impl IntoIterator<Item = Step>) -> Self {
        Self {
            steps: steps.into_iter().collect(),
            ..Self::default()
        }
    }

    pub fn remaining(&self) -> usize {
        self.steps.len()
    }
}

impl ByteSource for ScriptedInput {
    fn poll_byte(&mut self, _timeout: Duration) -> Result<Option<u8>> {
        self.polls += 1;
        match self.steps.pop_front() {
            Some(Step::Byte(b)) => {
                self.consumed += 1;
                Ok(Some(b))
            }
            Some(Step::Timeout) => Ok(None),
            Some(Step::Fail) => Err(Error::failure("read", io::Error::other("device gone"))),
            None => Err(Error::failure(
                "read",
                io::Error::new(io::ErrorKind::UnexpectedEof, "script exhausted"),
            )),
        }
    }
}

// ─── RecordingSink ──────────────────────────────────────────────────────────

/// An output sink that remembers every `write` call separately.
#[derive(Debug, Default)]
pub struct RecordingSink {
    pub writes: Vec<Vec<u8>>,
    pub flushes: usize,
    pub fail: bool,
}

impl RecordingSink {
    /// Everything written, concatenated.
    pub fn bytes(&self) -> Vec<u8> {
        self.writes.concat()
    }
}

impl Write for RecordingSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.fail {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "sink closed"));
        }
        self.writes.push(buf.to_vec());
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        if self.fail {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "sink closed"));
        }
        self.flushes += 1;
        Ok(())
    }
}
