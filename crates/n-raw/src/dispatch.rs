// SPDX-License-Identifier: MIT
//
// Dispatcher — the control loop.
//
// This is where everything meets: the decoder hands over one key at a
// time, the screen model moves its cursor, a fresh frame is rendered into
// the append buffer and leaves in one write. One loop, one owner of every
// piece, no threads.
//
// # States
//
//   Running ──quit key──▶ Exiting
//
// Each `step` polls once. A timeout does nothing (no render). A movement
// key moves the cursor and redraws. The quit key flips to `Exiting`; the
// loop sees it at the top of the next iteration, clears the screen, and
// returns. Nothing interrupts a frame in flight.
//
// # Cleanup
//
// `run` brackets the loop with raw mode. Whatever happens inside (quit,
// device error, failed size probe) the screen is cleared and the original
// terminal mode is back before `run` returns.

use std::io::Write;

use tracing::{debug, trace, warn};

use crate::ansi;
use crate::buffer::AppendBuffer;
use crate::config::Config;
use crate::error::Result;
use crate::input::{ByteSource, Direction, KeyDecoder, KeyEvent};
use crate::screen::ScreenModel;
use crate::terminal::{TerminalDriver, TerminalSession};

// ─── State ──────────────────────────────────────────────────────────────────

/// Where the control loop is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Running,
    Exiting,
}

/// What a key asks the dispatcher to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Move(Direction),
    Quit,
    Ignore,
}

/// Map a key to its action under `config`.
#[must_use]
pub const fn action_for(key: KeyEvent, config: &Config) -> Action {
    if let Some(direction) = key.direction() {
        return Action::Move(direction);
    }
    match key {
        KeyEvent::Byte(b) if b == config.quit_key => Action::Quit,
        KeyEvent::Byte(b'h') if config.vi_keys => Action::Move(Direction::Left),
        KeyEvent::Byte(b'j') if config.vi_keys => Action::Move(Direction::Down),
        KeyEvent::Byte(b'k') if config.vi_keys => Action::Move(Direction::Up),
        KeyEvent::Byte(b'l') if config.vi_keys => Action::Move(Direction::Right),
        _ => Action::Ignore,
    }
}

// ─── Dispatcher ─────────────────────────────────────────────────────────────

/// Drives keys → cursor → frames until the quit key.
#[derive(Debug)]
pub struct Dispatcher<S, W> {
    keys: KeyDecoder<S>,
    screen: ScreenModel,
    output: W,
    frame: AppendBuffer,
    config: Config,
    state: State,
    frames_rendered: u64,
}

impl<S: ByteSource, W: Write> Dispatcher<S, W> {
    pub fn new(input: S, output: W, screen: ScreenModel, config: Config) -> Self {
        Self {
            keys: KeyDecoder::new(input, config.poll_timeout),
            screen,
            output,
            frame: AppendBuffer::new(),
            config,
            state: State::Running,
            frames_rendered: 0,
        }
    }

    #[inline]
    #[must_use]
    pub const fn state(&self) -> State {
        self.state
    }

    #[inline]
    #[must_use]
    pub const fn screen(&self) -> &ScreenModel {
        &self.screen
    }

    /// Frames flushed so far.
    #[inline]
    #[must_use]
    pub const fn frames_rendered(&self) -> u64 {
        self.frames_rendered
    }

    #[inline]
    #[must_use]
    pub const fn output(&self) -> &W {
        &self.output
    }

    /// Render the current model and write it out in one go.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IoFailure`](crate::Error::IoFailure) if the write
    /// fails.
    pub fn render(&mut self) -> Result<()> {
        self.frame.reset();
        self.screen.render_into(&mut self.frame, self.config.placeholder);
        self.frame.flush_to(&mut self.output)?;
        self.frames_rendered += 1;
        trace!(bytes = self.frame.len(), cursor = ?self.screen.cursor(), "frame");
        Ok(())
    }

    /// Poll once and react to whatever arrived.
    ///
    /// A no-op once the dispatcher is exiting.
    ///
    /// # Errors
    ///
    /// Propagates device errors from the byte source and output sink.
    pub fn step(&mut self) -> Result<State> {
        if self.state == State::Exiting {
            return Ok(self.state);
        }
        let Some(key) = self.keys.next_event()? else {
            return Ok(self.state);
        };

        match action_for(key, &self.config) {
            Action::Move(direction) => {
                self.screen.move_cursor(direction);
                self.render()?;
            }
            Action::Quit => {
                debug!("quit key pressed");
                self.state = State::Exiting;
            }
            Action::Ignore => {}
        }
        Ok(self.state)
    }

    /// Draw the first frame, then step until the quit key; clear the
    /// screen on the way out.
    ///
    /// # Errors
    ///
    /// Propagates the first device error. The terminal mode is the
    /// caller's to restore.
    pub fn run(&mut self) -> Result<()> {
        self.render()?;
        while self.step()? == State::Running {}
        clear_screen(&mut self.output)
    }
}

/// Erase everything and park the cursor at home, in one write.
fn clear_screen(output: &mut impl Write) -> Result<()> {
    let mut buf = AppendBuffer::with_capacity(8);
    ansi::clear_screen(&mut buf).ok();
    ansi::cursor_home(&mut buf).ok();
    buf.flush_to(output)
}

// ─── Session ────────────────────────────────────────────────────────────────

/// Run a whole session on `driver`: raw mode, size probe, the control
/// loop, and restoration.
///
/// The original terminal mode is restored on every path out, before the
/// result is returned. On error the screen is also cleared (best-effort),
/// so the message the caller prints lands on a clean terminal.
///
/// # Errors
///
/// - [`Error::IoUnavailable`](crate::Error::IoUnavailable) if the terminal
///   mode cannot be read or set.
/// - [`Error::IoFailure`](crate::Error::IoFailure) if the size probe fails
///   or the device fails mid-session.
///
/// If both the session and the restore fail, the session's error wins.
pub fn run<D, S, W>(driver: D, mut input: S, mut output: W, config: Config) -> Result<()>
where
    D: TerminalDriver,
    S: ByteSource,
    W: Write,
{
    let mut session = TerminalSession::capture_original(driver)?;
    let guard = session.enter_raw(&config)?;

    let result = ScreenModel::probe_dimensions(
        guard.driver(),
        &mut input,
        &mut output,
        config.poll_timeout,
    )
    .and_then(|screen| {
        debug!(rows = screen.rows(), columns = screen.columns(), "session start");
        Dispatcher::new(&mut input, &mut output, screen, config).run()
    });

    if result.is_err() {
        clear_screen(&mut output).ok();
    }
    let restored = guard.release();
    if let (Err(_), Err(e)) = (&result, &restored) {
        warn!(error = %e, "terminal restore failed after session error");
    }
    result.and(restored)
}

// ─── Tests ───────────────────────────────────────────────────────────────────
