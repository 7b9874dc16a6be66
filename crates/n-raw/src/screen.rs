// SPDX-License-Identifier: MIT
//
// Screen model — dimensions, cursor, and the frame it renders.
//
// The model knows how big the terminal is and where the cursor sits. It
// learns the size once at startup (`probe_dimensions`), moves the cursor
// with clamping, and renders a complete frame into an `AppendBuffer`.
//
// Frame order is hide → home → rows → position → show. Drawing with the
// cursor hidden keeps it from visibly sweeping across the screen while
// the rows go out.

use std::io::Write;
use std::time::Duration;

use tracing::debug;

use crate::ansi;
use crate::buffer::AppendBuffer;
use crate::error::{Error, Result};
use crate::input::{ByteSource, Direction, ESC};
use crate::terminal::TerminalDriver;

/// Longest cursor report we are willing to read (`ESC [ 65535 ; 65535 R`
/// is 14 bytes).
const REPORT_MAX_LEN: usize = 32;

// ─── ScreenModel ────────────────────────────────────────────────────────────

/// Terminal dimensions plus a clamped cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScreenModel {
    rows: u16,
    columns: u16,
    cursor_row: u16,
    cursor_col: u16,
}

impl ScreenModel {
    /// A model of `rows × columns` with the cursor at the origin.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IoFailure`] if either dimension is zero.
    pub fn new(rows: u16, columns: u16) -> Result<Self> {
        if rows == 0 || columns == 0 {
            return Err(Error::invalid_data(
                "screen size",
                format!("terminal reported {rows}x{columns}"),
            ));
        }
        Ok(Self {
            rows,
            columns,
            cursor_row: 0,
            cursor_col: 0,
        })
    }

    /// Learn the terminal size.
    ///
    /// Asks the driver first. If that fails, pushes the cursor into the
    /// bottom-right corner, requests a cursor position report, and reads
    /// the answer from `input`. Needs raw mode: in cooked mode the report
    /// would wait for Enter and echo onto the screen.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IoFailure`] if the fallback cannot be written, the
    /// report never arrives, or it does not parse.
    pub fn probe_dimensions(
        driver: &impl TerminalDriver,
        input: &mut impl ByteSource,
        output: &mut impl Write,
        timeout: Duration,
    ) -> Result<Self> {
        if let Some((rows, columns)) = driver.query_size() {
            debug!(rows, columns, "terminal size from driver");
            return Self::new(rows, columns);
        }

        debug!("size query failed, falling back to cursor report");
        ansi::cursor_to_far_corner(output)
            .and_then(|()| ansi::query_cursor_position(output))
            .and_then(|()| output.flush())
            .map_err(|e| Error::failure("write cursor query", e))?;

        let mut report = Vec::with_capacity(REPORT_MAX_LEN);
        while report.len() < REPORT_MAX_LEN {
            match input.poll_byte(timeout)? {
                None | Some(b'R') => break,
                Some(b) => report.push(b),
            }
        }

        let (rows, columns) = parse_cursor_report(&report).ok_or_else(|| {
            Error::invalid_data(
                "cursor report",
                format!("unreadable response {:?}", String::from_utf8_lossy(&report)),
            )
        })?;
        debug!(rows, columns, "terminal size from cursor report");
        Self::new(rows, columns)
    }

    #[inline]
    #[must_use]
    pub const fn rows(&self) -> u16 {
        self.rows
    }

    #[inline]
    #[must_use]
    pub const fn columns(&self) -> u16 {
        self.columns
    }

    /// Cursor position as `(row, col)`, zero-based.
    #[inline]
    #[must_use]
    pub const fn cursor(&self) -> (u16, u16) {
        (self.cursor_row, self.cursor_col)
    }

    /// Move the cursor one cell, stopping at the edges.
    pub fn move_cursor(&mut self, direction: Direction) {
        match direction {
            Direction::Up => self.cursor_row = self.cursor_row.saturating_sub(1),
            Direction::Down => {
                self.cursor_row = self.cursor_row.saturating_add(1).min(self.rows - 1);
            }
            Direction::Left => self.cursor_col = self.cursor_col.saturating_sub(1),
            Direction::Right => {
                self.cursor_col = self.cursor_col.saturating_add(1).min(self.columns - 1);
            }
        }
    }

    /// Place the cursor, clamped into the screen.
    pub fn set_cursor(&mut self, row: u16, col: u16) {
        self.cursor_row = row.min(self.rows - 1);
        self.cursor_col = col.min(self.columns - 1);
    }

    /// Take new dimensions and pull the cursor back inside them.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IoFailure`] if either dimension is zero; the model
    /// is unchanged.
    pub fn resize(&mut self, rows: u16, columns: u16) -> Result<()> {
        let resized = Self::new(rows, columns)?;
        let (row, col) = self.cursor();
        *self = resized;
        self.set_cursor(row, col);
        Ok(())
    }

    /// Render the full frame into `buf`.
    ///
    /// Every row is `glyph` followed by erase-to-end-of-line; rows are
    /// joined by CRLF with none after the last, so the terminal never
    /// scrolls.
    pub fn render_into(&self, buf: &mut AppendBuffer, glyph: u8) {
        ansi::cursor_hide(buf).ok();
        ansi::cursor_home(buf).ok();

        for row in 0..self.rows {
            buf.append(&[glyph]);
            ansi::clear_line_right(buf).ok();
            if row + 1 < self.rows {
                ansi::newline(buf).ok();
            }
        }

        ansi::cursor_to(buf, self.cursor_row, self.cursor_col).ok();
        ansi::cursor_show(buf).ok();
    }
}

// ─── Cursor Report ──────────────────────────────────────────────────────────

/// Parse a cursor position report, `ESC [ rows ; cols` with or without
/// the final `R`.
///
/// Returns `None` unless both numbers are present and positive.
#[must_use]
pub fn parse_cursor_report(bytes: &[u8]) -> Option<(u16, u16)> {
    let body = bytes.strip_prefix(&[ESC, b'['])?;
    let body = body.strip_suffix(b"R").unwrap_or(body);
    let split = body.iter().position(|&b| b == b';')?;
    let rows = parse_positive(&body[..split])?;
    let columns = parse_positive(&body[split + 1..])?;
    Some((rows, columns))
}

fn parse_positive(digits: &[u8]) -> Option<u16> {
    if digits.is_empty() || !digits.iter().all(u8::is_ascii_digit) {
        return None;
    }
    std::str::from_utf8(digits)
        .ok()?
        .parse::<u16>()
        .ok()
        .filter(|&n| n > 0)
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::terminal::ModeSnapshot;
    use crate::testing::{FakeDriver, RecordingSink, ScriptedInput, Step};
    use pretty_assertions::assert_eq;

    const TIMEOUT: Duration = Duration::from_millis(100);

    fn model(rows: u16, columns: u16) -> ScreenModel {
        ScreenModel::new(rows, columns).unwrap()
    }

    fn no_size_driver() -> FakeDriver {
        let mut driver = FakeDriver::new(ModeSnapshot::cooked());
        driver.size = None;
        driver
    }

    // ── Construction ────────────────────────────────────────────

    #[test]
    fn zero_dimensions_are_rejected() {
        assert!(matches!(ScreenModel::new(0, 80), Err(Error::IoFailure { .. })));
        assert!(matches!(ScreenModel::new(24, 0), Err(Error::IoFailure { .. })));
    }

    #[test]
    fn starts_at_origin() {
        let m = model(24, 80);
        assert_eq!((m.rows(), m.columns()), (24, 80));
        assert_eq!(m.cursor(), (0, 0));
    }

    // ── Cursor movement ─────────────────────────────────────────

    #[test]
    fn up_at_top_stays_at_zero() {
        let mut m = model(24, 80);
        m.move_cursor(Direction::Up);
        assert_eq!(m.cursor(), (0, 0));
    }

    #[test]
    fn left_at_left_edge_stays_at_zero() {
        let mut m = model(24, 80);
        m.move_cursor(Direction::Left);
        assert_eq!(m.cursor(), (0, 0));
    }

    #[test]
    fn down_and_right_clamp_at_far_edge() {
        let mut m = model(3, 4);
        for _ in 0..10 {
            m.move_cursor(Direction::Down);
            m.move_cursor(Direction::Right);
        }
        assert_eq!(m.cursor(), (2, 3));
    }

    #[test]
    fn moves_are_single_steps() {
        let mut m = model(24, 80);
        m.move_cursor(Direction::Down);
        m.move_cursor(Direction::Down);
        m.move_cursor(Direction::Right);
        m.move_cursor(Direction::Up);
        assert_eq!(m.cursor(), (1, 1));
    }

    #[test]
    fn one_by_one_screen_never_moves() {
        let mut m = model(1, 1);
        for dir in [Direction::Up, Direction::Down, Direction::Left, Direction::Right] {
            m.move_cursor(dir);
            assert_eq!(m.cursor(), (0, 0));
        }
    }

    #[test]
    fn set_cursor_clamps() {
        let mut m = model(24, 80);
        m.set_cursor(100, 200);
        assert_eq!(m.cursor(), (23, 79));
        m.set_cursor(5, 6);
        assert_eq!(m.cursor(), (5, 6));
    }

    #[test]
    fn resize_reclamps_cursor() {
        let mut m = model(24, 80);
        m.set_cursor(20, 70);
        m.resize(10, 40).unwrap();
        assert_eq!((m.rows(), m.columns()), (10, 40));
        assert_eq!(m.cursor(), (9, 39));
    }

    #[test]
    fn resize_to_zero_is_rejected_and_keeps_model() {
        let mut m = model(24, 80);
        m.set_cursor(3, 3);
        assert!(m.resize(0, 0).is_err());
        assert_eq!(m, {
            let mut same = model(24, 80);
            same.set_cursor(3, 3);
            same
        });
    }

    // ── Rendering ───────────────────────────────────────────────

    #[test]
    fn three_row_frame_layout() {
        let mut m = model(3, 10);
        m.set_cursor(1, 4);
        let mut buf = AppendBuffer::new();
        m.render_into(&mut buf, b'~');

        assert_eq!(
            String::from_utf8_lossy(buf.as_bytes()),
            "\x1b[?25l\x1b[H\
             ~\x1b[K\r\n\
             ~\x1b[K\r\n\
             ~\x1b[K\
             \x1b[2;5H\x1b[?25h"
        );
    }

    #[test]
    fn frame_has_no_trailing_newline() {
        let m = model(24, 80);
        let mut buf = AppendBuffer::new();
        m.render_into(&mut buf, b'~');
        let crlfs = buf.as_bytes().windows(2).filter(|w| *w == b"\r\n").count();
        assert_eq!(crlfs, 23);
        assert!(buf.as_bytes().ends_with(b"~\x1b[K\x1b[1;1H\x1b[?25h"));
    }

    #[test]
    fn single_row_frame() {
        let m = model(1, 80);
        let mut buf = AppendBuffer::new();
        m.render_into(&mut buf, b'#');
        assert_eq!(buf.as_bytes(), b"\x1b[?25l\x1b[H#\x1b[K\x1b[1;1H\x1b[?25h");
    }

    #[test]
    fn cursor_position_is_one_indexed() {
        let mut m = model(24, 80);
        m.set_cursor(23, 79);
        let mut buf = AppendBuffer::new();
        m.render_into(&mut buf, b'~');
        assert!(buf.as_bytes().ends_with(b"\x1b[24;80H\x1b[?25h"));
    }

    // ── Cursor report parsing ───────────────────────────────────

    #[test]
    fn parses_reports() {
        assert_eq!(parse_cursor_report(b"\x1b[43;170R"), Some((43, 170)));
        assert_eq!(parse_cursor_report(b"\x1b[24;80"), Some((24, 80)));
        assert_eq!(parse_cursor_report(b"\x1b[1;1"), Some((1, 1)));
    }

    #[test]
    fn rejects_malformed_reports() {
        for bad in [
            &b""[..],
            b"\x1b[",
            b"[24;80",
            b"\x1b[24",
            b"\x1b[;80",
            b"\x1b[24;",
            b"\x1b[0;80",
            b"\x1b[24;x0",
            b"\x1b[99999;80",
            b"\x1b[+4;80",
        ] {
            assert_eq!(parse_cursor_report(bad), None, "{bad:?}");
        }
    }

    // ── Probe ───────────────────────────────────────────────────

    #[test]
    fn probe_prefers_driver_size() {
        let driver = FakeDriver::new(ModeSnapshot::cooked());
        let mut input = ScriptedInput::default();
        let mut out = RecordingSink::default();
        let m = ScreenModel::probe_dimensions(&driver, &mut input, &mut out, TIMEOUT).unwrap();
        assert_eq!((m.rows(), m.columns()), (24, 80));
        assert!(out.writes.is_empty());
        assert_eq!(input.polls, 0);
    }

    #[test]
    fn probe_falls_back_to_cursor_report() {
        let driver = no_size_driver();
        let mut input = ScriptedInput::bytes(b"\x1b[43;170R");
        let mut out = RecordingSink::default();
        let m = ScreenModel::probe_dimensions(&driver, &mut input, &mut out, TIMEOUT).unwrap();

        assert_eq!((m.rows(), m.columns()), (43, 170));
        assert_eq!(out.bytes(), b"\x1b[999C\x1b[999B\x1b[6n");
        assert_eq!(input.remaining(), 0);
    }

    #[test]
    fn probe_report_cut_short_by_timeout() {
        let driver = no_size_driver();
        let mut input = ScriptedInput::steps(
            b"\x1b[30;90"
                .iter()
                .map(|&b| Step::Byte(b))
                .chain([Step::Timeout, Step::Byte(b'z')]),
        );
        let mut out = RecordingSink::default();
        let m = ScreenModel::probe_dimensions(&driver, &mut input, &mut out, TIMEOUT).unwrap();
        assert_eq!((m.rows(), m.columns()), (30, 90));
        assert_eq!(input.remaining(), 1);
    }

    #[test]
    fn probe_without_answer_is_fatal() {
        let driver = no_size_driver();
        let mut input = ScriptedInput::steps([Step::Timeout]);
        let mut out = RecordingSink::default();
        let err =
            ScreenModel::probe_dimensions(&driver, &mut input, &mut out, TIMEOUT).unwrap_err();
        assert!(matches!(err, Error::IoFailure { op: "cursor report", .. }));
    }

    #[test]
    fn probe_reads_at_most_32_bytes() {
        let driver = no_size_driver();
        let mut input = ScriptedInput::bytes(&[b'9'; 40]);
        let mut out = RecordingSink::default();
        assert!(ScreenModel::probe_dimensions(&driver, &mut input, &mut out, TIMEOUT).is_err());
        assert_eq!(input.consumed, REPORT_MAX_LEN);
    }

    #[test]
    fn probe_write_failure_is_fatal() {
        let driver = no_size_driver();
        let mut input = ScriptedInput::bytes(b"\x1b[1;1R");
        let mut out = RecordingSink {
            fail: true,
            ..RecordingSink::default()
        };
        let err =
            ScreenModel::probe_dimensions(&driver, &mut input, &mut out, TIMEOUT).unwrap_err();
        assert!(matches!(err, Error::IoFailure { op: "write cursor query", .. }));
        assert_eq!(input.polls, 0);
    }

    #[test]
    fn probe_read_error_propagates() {
        let driver = no_size_driver();
        let mut input = ScriptedInput::steps([Step::Byte(ESC), Step::Fail]);
        let mut out = RecordingSink::default();
        let err =
            ScreenModel::probe_dimensions(&driver, &mut input, &mut out, TIMEOUT).unwrap_err();
        assert!(matches!(err, Error::IoFailure { op: "read", .. }));
    }
}
