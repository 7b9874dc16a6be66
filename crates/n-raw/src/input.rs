// SPDX-License-Identifier: MIT
//
// Key decoding.
//
// Turns a polled byte stream into key events, one event per call. Plain
// bytes pass straight through; `ESC [ A/B/C/D` become arrow events; an
// ESC with nothing useful after it becomes a bare Escape.
//
// # Design
//
// Each call to `next_event` runs a tiny state machine from scratch:
//
//   Idle ──ESC──▶ SawEscape ──'['──▶ SawBracket ──A/B/C/D──▶ Resolved(arrow)
//    │               │    │              │
//    │ other byte    │    │ other        │ timeout / other
//    ▼               │    ▼              ▼
//   Resolved(Byte)   │  SawOther ──any──▶ Resolved(Escape)
//                    │ timeout
//                    ▼
//                  Resolved(Escape)
//
// After ESC the decoder always wants two more bytes before it decides.
// Only a timeout cuts that short.
//
// Nothing carries over between calls, so the decoder is restartable at
// any event boundary. Bytes are never pushed back: whatever an aborted
// sequence consumed is gone. Longer sequences (`ESC [ 1 ; 5 A`, F-keys)
// are not resynchronized; their tails arrive as ordinary bytes.

use std::time::Duration;

use tracing::trace;

use crate::error::Result;

/// The escape byte (0x1B).
pub const ESC: u8 = 0x1b;

// ─── KeyEvent ───────────────────────────────────────────────────────────────

/// A decoded key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyEvent {
    /// Any byte that did not start an escape sequence, control bytes
    /// included (Ctrl-X arrives as `Byte(0x18)`).
    Byte(u8),
    Up,
    Down,
    Left,
    Right,
    /// A lone ESC, or an escape sequence we do not recognize.
    Escape,
}

impl KeyEvent {
    /// The cursor direction this key maps to, if it is an arrow.
    #[must_use]
    pub const fn direction(self) -> Option<Direction> {
        match self {
            Self::Up => Some(Direction::Up),
            Self::Down => Some(Direction::Down),
            Self::Left => Some(Direction::Left),
            Self::Right => Some(Direction::Right),
            Self::Byte(_) | Self::Escape => None,
        }
    }
}

/// One step of cursor movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
}

// ─── ByteSource ─────────────────────────────────────────────────────────────

/// Where key bytes come from.
pub trait ByteSource {
    /// Wait up to `timeout` for one byte.
    ///
    /// `Ok(None)` means nothing arrived in time. That is normal, not an
    /// error.
    ///
    /// # Errors
    ///
    /// [`Error::IoFailure`](crate::Error::IoFailure) when the device read
    /// fails.
    fn poll_byte(&mut self, timeout: Duration) -> Result<Option<u8>>;
}

impl<S: ByteSource + ?Sized> ByteSource for &mut S {
    fn poll_byte(&mut self, timeout: Duration) -> Result<Option<u8>> {
        (**self).poll_byte(timeout)
    }
}

// ─── KeyDecoder ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Idle,
    SawEscape,
    SawBracket,
    /// ESC followed by something other than `[`; one byte still owed.
    SawOther,
    Resolved(Option<KeyEvent>),
}

/// Decodes key events from a [`ByteSource`].
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use n_raw::input::{ByteSource, KeyDecoder, KeyEvent};
///
/// struct Bytes(std::vec::IntoIter<u8>);
/// impl ByteSource for Bytes {
///     fn poll_byte(&mut self, _: Duration) -> n_raw::Result<Option<u8>> {
///         Ok(self.0.next())
///     }
/// }
///
/// let source = Bytes(vec![0x1b, b'[', b'A', b'j'].into_iter());
/// let mut keys = KeyDecoder::new(source, Duration::from_millis(100));
/// assert_eq!(keys.next_event()?, Some(KeyEvent::Up));
/// assert_eq!(keys.next_event()?, Some(KeyEvent::Byte(b'j')));
/// assert_eq!(keys.next_event()?, None);
/// # Ok::<(), n_raw::Error>(())
/// ```
#[derive(Debug)]
pub struct KeyDecoder<S> {
    source: S,
    timeout: Duration,
}

impl<S: ByteSource> KeyDecoder<S> {
    /// Decode from `source`, waiting at most `timeout` per byte.
    pub const fn new(source: S, timeout: Duration) -> Self {
        Self { source, timeout }
    }

    #[inline]
    pub const fn source(&self) -> &S {
        &self.source
    }

    /// Poll for the next key.
    ///
    /// Returns `Ok(None)` when no byte arrived within the poll timeout;
    /// call again.
    ///
    /// # Errors
    ///
    /// Propagates device errors from the byte source.
    pub fn next_event(&mut self) -> Result<Option<KeyEvent>> {
        let mut state = State::Idle;
        loop {
            state = match state {
                State::Idle => match self.source.poll_byte(self.timeout)? {
                    None => State::Resolved(None),
                    Some(ESC) => State::SawEscape,
                    Some(b) => State::Resolved(Some(KeyEvent::Byte(b))),
                },
                State::SawEscape => match self.source.poll_byte(self.timeout)? {
                    Some(b'[') => State::SawBracket,
                    Some(_) => State::SawOther,
                    None => State::Resolved(Some(KeyEvent::Escape)),
                },
                State::SawOther => {
                    // Not a sequence we know; the second byte goes with it.
                    self.source.poll_byte(self.timeout)?;
                    State::Resolved(Some(KeyEvent::Escape))
                }
                State::SawBracket => {
                    let key = match self.source.poll_byte(self.timeout)? {
                        Some(b'A') => KeyEvent::Up,
                        Some(b'B') => KeyEvent::Down,
                        Some(b'C') => KeyEvent::Right,
                        Some(b'D') => KeyEvent::Left,
                        None | Some(_) => KeyEvent::Escape,
                    };
                    State::Resolved(Some(key))
                }
                State::Resolved(event) => {
                    if let Some(key) = event {
                        trace!(?key, "decoded key");
                    }
                    return Ok(event);
                }
            };
        }
    }

    /// Iterate over poll results forever.
    ///
    /// Timeouts show up as `Ok(None)` items; the iterator itself never
    /// ends. Stop on the key you care about or on the first `Err`.
    pub fn events(&mut self) -> Events<'_, S> {
        Events { decoder: self }
    }
}

/// Iterator returned by [`KeyDecoder::events`].
#[derive(Debug)]
pub struct Events<'a, S> {
    decoder: &'a mut KeyDecoder<S>,
}

impl<S: ByteSource> Iterator for Events<'_, S> {
    type Item = Result<Option<KeyEvent>>;

    fn next(&mut self) -> Option<Self::Item> {
        Some(self.decoder.next_event())
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
