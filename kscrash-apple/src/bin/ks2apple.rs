// Copyright 2015 Ted Mielczarek. See the COPYRIGHT
// file at the top-level directory of this distribution.

use std::path::Path;

use clap::{Arg, Command};
use kscrash_json::RenderOptions;

fn make_app() -> Command<'static> {
    Command::new("ks2apple")
        .version(clap::crate_version!())
        .about("Converts a KSCrash JSON report into an Apple-style crash report listing every thread.")
        .arg(
            Arg::new("input_file")
                .short('i')
                .long("input_file")
                .takes_value(true)
                .allow_invalid_utf8(true)
                .required(true)
                .help("input ks json file"),
        )
        .arg(
            Arg::new("output_file")
                .short('o')
                .long("output_file")
                .takes_value(true)
                .allow_invalid_utf8(true)
                .required(true)
                .help("output file"),
        )
}

#[cfg_attr(test, allow(dead_code))]
fn main() {
    let matches = make_app().get_matches();

    let (input, output) = match (
        matches.value_of_os("input_file"),
        matches.value_of_os("output_file"),
    ) {
        (Some(input), Some(output)) => (Path::new(input), Path::new(output)),
        _ => {
            // Both are required, so clap has already bailed out.
            std::process::exit(2);
        }
    };

    kscrash_apple::init_logging();
    kscrash_apple::install_panic_hook();

    let status = kscrash_apple::run(input, output, &RenderOptions::thread_list());
    std::process::exit(status);
}
