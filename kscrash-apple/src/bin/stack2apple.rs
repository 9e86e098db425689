// Copyright 2015 Ted Mielczarek. See the COPYRIGHT
// file at the top-level directory of this distribution.

use std::path::Path;

use clap::{Arg, Command};
use kscrash_json::RenderOptions;

fn make_app() -> Command<'static> {
    Command::new("stack2apple")
        .version(clap::crate_version!())
        .about("Converts KSCrash JSON reports with a sampled stack into Apple-style crash reports.")
        .long_about(
            "Converts KSCrash JSON reports with a sampled stack into Apple-style crash reports.

The input may hold a single report or a JSON array of reports. Every report is \
written to the output file in turn.",
        )
        .arg(
            Arg::new("json_file")
                .required(true)
                .allow_invalid_utf8(true)
                .help("input json file"),
        )
        .arg(
            Arg::new("out_file")
                .required(true)
                .allow_invalid_utf8(true)
                .help("output file"),
        )
}

#[cfg_attr(test, allow(dead_code))]
fn main() {
    let matches = make_app().get_matches();

    let (input, output) = match (
        matches.value_of_os("json_file"),
        matches.value_of_os("out_file"),
    ) {
        (Some(input), Some(output)) => (Path::new(input), Path::new(output)),
        _ => std::process::exit(2),
    };

    kscrash_apple::init_logging();
    kscrash_apple::install_panic_hook();

    let status = kscrash_apple::run(input, output, &RenderOptions::sampled_stack());
    std::process::exit(status);
}
