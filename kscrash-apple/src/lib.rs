// Copyright 2015 Ted Mielczarek. See the COPYRIGHT
// file at the top-level directory of this distribution.

//! Plumbing shared by the `ks2apple` and `stack2apple` binaries.

use std::ops::Deref;
use std::panic;
use std::path::Path;

use kscrash_json::{convert_path, RenderOptions};
use log::{error, info};
use simplelog::{ColorChoice, ConfigBuilder, Level, LevelFilter, TermLogger, TerminalMode};

/// Log to stderr, warnings and up.
pub fn init_logging() {
    let _ = TermLogger::init(
        LevelFilter::Warn,
        ConfigBuilder::new()
            .set_location_level(LevelFilter::Off)
            .set_time_level(LevelFilter::Off)
            .set_thread_level(LevelFilter::Off)
            .set_target_level(LevelFilter::Off)
            .set_level_color(Level::Trace, None)
            .build(),
        TerminalMode::Stderr,
        ColorChoice::Auto,
    );
}

/// Set a panic hook to redirect to the logger.
pub fn install_panic_hook() {
    panic::set_hook(Box::new(|panic_info| {
        let (filename, line) = panic_info
            .location()
            .map(|loc| (loc.file(), loc.line()))
            .unwrap_or(("<unknown>", 0));
        let cause = panic_info
            .payload()
            .downcast_ref::<String>()
            .map(String::deref)
            .unwrap_or_else(|| {
                panic_info
                    .payload()
                    .downcast_ref::<&str>()
                    .copied()
                    .unwrap_or("<cause unknown>")
            });
        error!(
            "Panic - A panic occurred at {}:{}: {}",
            filename, line, cause
        );
    }));
}

/// Convert `input` into `output`, returning the process exit code.
///
/// Problems inside individual reports are only logged. Failing to read the
/// input, parse it, or write the output exits with 1.
pub fn run(input: &Path, output: &Path, options: &RenderOptions) -> i32 {
    match convert_path(input, output, options) {
        Ok(summary) => {
            info!(
                "{} report(s) written to {}, {} skipped",
                summary.rendered,
                output.display(),
                summary.failed
            );
            0
        }
        Err(err) => {
            error!("{} - {}", err.name(), err);
            1
        }
    }
}
