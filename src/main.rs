// SPDX-License-Identifier: MIT
//
// n-tilde — a full-screen cursor playground for the terminal.
//
// The binary only wires things up; everything interesting lives in n-raw:
//
//   Tty        → termios raw mode, window size, single-owner claim
//   TtyInput   → stdin, one byte per poll
//   TtyOutput  → stdout, one write per frame
//   n_raw::run → raw mode in, size probe, control loop, raw mode out
//
// Keys: arrows or h/j/k/l move the cursor, Ctrl-X quits. A clean quit
// leaves "exited" on the restored terminal.
//
// Logs go to stderr, filtered by RUST_LOG (default: warn). Redirect stderr
// to a file when raising the level, or the log lines land on the frame.

use std::io::{self, Write};
use std::process;

use n_raw::Config;
use n_raw::tty::{Tty, TtyInput, TtyOutput};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

fn main() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    let tty = Tty::open().unwrap_or_else(|e| {
        eprintln!("n-tilde: failed to initialize terminal: {e}");
        process::exit(1);
    });

    let result = n_raw::run(tty, TtyInput::stdin(), TtyOutput::stdout(), Config::default());
    process::exit(conclude(result, &mut io::stdout(), &mut io::stderr()));
}

/// Report how the session ended and pick the exit code. The terminal is
/// already restored by the time this runs.
fn conclude(result: n_raw::Result<()>, out: &mut impl Write, err: &mut impl Write) -> i32 {
    match result {
        Ok(()) => {
            let _ = writeln!(out, "exited");
            let _ = out.flush();
            0
        }
        Err(e) => {
            tracing::error!(error = %e, "session ended with an error");
            let _ = writeln!(err, "n-tilde: {e}");
            1
        }
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────
