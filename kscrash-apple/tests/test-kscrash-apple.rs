// These tests run the real binaries against small reports written to disk
// and check what ends up in the output file (or doesn't, on failure).
//
// Note that `cargo test` for an application adds our binaries to
// the env as `CARGO_BIN_EXE_<name>`.

use std::path::PathBuf;
use std::process::{Command, Stdio};

use serde_json::{json, Value};

// Some tests need to write files (and read them back).
// To keep this tidy and hidden, we make a new directory
// in `target`.
const TEST_TMP: &str = "../target/testdata/";

fn test_output(file_name: &str) -> PathBuf {
    let mut res = PathBuf::from(TEST_TMP);
    // Ignore failures because we don't care if the dir already exists.
    let _ = std::fs::create_dir_all(&res);
    res.push(file_name);
    // Don't let a previous run's output satisfy this one.
    let _ = std::fs::remove_file(&res);
    res
}

fn write_input(file_name: &str, value: &Value) -> PathBuf {
    let path = test_output(file_name);
    std::fs::write(&path, serde_json::to_vec_pretty(value).unwrap()).unwrap();
    path
}

fn report(machine: &str) -> Value {
    json!({
        "system": {
            "machine": machine,
            "system_name": "iOS",
            "system_version": "12.1",
            "os_version": "16B92",
            "cpu_arch": "arm64",
            "CFBundleExecutable": "Demo",
            "CFBundleExecutablePath": "/var/Demo.app/Demo",
        },
        "crash": {
            "error": {
                "type": "nsexception",
                "reason": "<nil> isn't a 'key'",
                "nsexception": { "name": "NSInvalidArgumentException" },
            },
            "threads": [{
                "index": 0,
                "crashed": true,
                "backtrace": {
                    "contents": [
                        { "instruction_addr": 0x100004010u64, "object_name": "Demo", "symbol_name": "main" },
                    ],
                },
            }],
        },
        "binary_images": [
            { "name": "/var/Demo.app/Demo", "uuid": "AB-CD", "image_addr": 0x100000000u64, "image_size": 0x10000 },
        ],
        "stack_string": [
            {
                "instruction_address": 0x100004010u64,
                "image_name": "Demo",
                "object_name": "main (in Demo)",
                "sample": 7,
            },
        ],
        "user": { "Demo": { "log": ["first", "second"] } },
    })
}

#[test]
fn test_ks2apple() {
    let input = write_input("ks2apple-in.json", &report("iPhone10,3"));
    let output = test_output("ks2apple-out.txt");

    let bin = env!("CARGO_BIN_EXE_ks2apple");
    let status = Command::new(bin)
        .arg("--input_file")
        .arg(&input)
        .arg("--output_file")
        .arg(&output)
        .status()
        .unwrap();
    assert!(status.success());

    let text = std::fs::read_to_string(&output).unwrap();
    assert!(text.starts_with("System Info: {\n    Device:      iPhone X\n"));
    let frame = text
        .lines()
        .skip_while(|line| *line != "Thread 0 Crashed:")
        .nth(1)
        .unwrap();
    insta::assert_snapshot!(frame, @"0   Demo                            0x0000000100004010 0x100000000 + 16400            (main)");
    assert!(text.contains("\nMMLog:\nfirst\nsecond\n"));
    assert!(!text.contains("stack_info:"));
    // Everything is HTML-escaped.
    assert!(text.contains(
        "*** Terminating app due to uncaught exception &#x27;NSInvalidArgumentException&#x27;, \
         reason: &#x27;&lt;nil&gt; isn&#x27;t a &#x27;key&#x27;&#x27;"
    ));
}

#[test]
fn test_ks2apple_short_flags() {
    let input = write_input("ks2apple-short-in.json", &report("iPhone11,8"));
    let output = test_output("ks2apple-short-out.txt");

    let bin = env!("CARGO_BIN_EXE_ks2apple");
    let status = Command::new(bin)
        .arg("-i")
        .arg(&input)
        .arg("-o")
        .arg(&output)
        .status()
        .unwrap();
    assert!(status.success());

    let text = std::fs::read_to_string(&output).unwrap();
    assert!(text.contains("    Device:      iPhone XR\n"));
}

#[test]
fn test_ks2apple_requires_arguments() {
    let output = test_output("ks2apple-unused-out.txt");

    let bin = env!("CARGO_BIN_EXE_ks2apple");
    let result = Command::new(bin)
        .arg("--output_file")
        .arg(&output)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .unwrap();

    let stderr = String::from_utf8(result.stderr).unwrap();
    assert!(!result.status.success());
    assert!(stderr.contains("input_file"), "{stderr}");
    assert!(!output.exists());
}

#[test]
fn test_stack2apple_batch() {
    let input = write_input(
        "stack2apple-in.json",
        &json!([report("iPhone10,3"), report("iPad4,5")]),
    );
    let output = test_output("stack2apple-out.txt");

    let bin = env!("CARGO_BIN_EXE_stack2apple");
    let status = Command::new(bin).arg(&input).arg(&output).status().unwrap();
    assert!(status.success());

    let text = std::fs::read_to_string(&output).unwrap();
    assert_eq!(text.matches("stack_info:\n").count(), 2);
    assert!(text.contains("\n    7 main (Demo + 16400) [0x0000000100004010]\n"));
    assert!(text.contains("    Device:      iPad mini 2G\n"));
    assert!(!text.contains("Thread 0 Crashed:"));
}

#[test]
fn test_stack2apple_requires_two_arguments() {
    let input = write_input("stack2apple-lonely-in.json", &report("iPhone10,3"));

    let bin = env!("CARGO_BIN_EXE_stack2apple");
    let result = Command::new(bin)
        .arg(&input)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .unwrap();

    assert!(!result.status.success());
    assert!(!String::from_utf8(result.stderr).unwrap().is_empty());
}

#[test]
fn test_stack2apple_unreadable_input() {
    let input = test_output("stack2apple-does-not-exist.json");
    let output = test_output("stack2apple-unreadable-out.txt");

    let bin = env!("CARGO_BIN_EXE_stack2apple");
    let result = Command::new(bin)
        .arg(&input)
        .arg(&output)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .unwrap();

    let stderr = String::from_utf8(result.stderr).unwrap();
    assert_eq!(result.status.code(), Some(1));
    assert!(stderr.contains("Couldn't read input file"), "{stderr}");
    assert!(!output.exists());
}

#[test]
fn test_stack2apple_invalid_json() {
    let input = test_output("stack2apple-garbage.json");
    std::fs::write(&input, "{ \"system\": ").unwrap();
    let output = test_output("stack2apple-garbage-out.txt");

    let bin = env!("CARGO_BIN_EXE_stack2apple");
    let result = Command::new(bin)
        .arg(&input)
        .arg(&output)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .unwrap();

    assert_eq!(result.status.code(), Some(1));
    assert!(!output.exists());
}
