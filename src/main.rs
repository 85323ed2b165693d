//! voiceboard CLI entry point
//!
//! Parses arguments and dispatches via `cli::run`. The JSON error object has
//! already been printed by then; this only sets the exit status.

use voiceboard::cli;

fn main() {
    if let Err(e) = cli::run() {
        eprintln!("{}", e);
        std::process::exit(1);
    }
}
