// Copyright 2015 Ted Mielczarek. See the COPYRIGHT
// file at the top-level directory of this distribution.

//! Typed view of a KSCrash JSON report.
//!
//! Every top-level block is decoded on its own, so a malformed `crash` block
//! does not prevent the `system` block from being rendered. Fields that a
//! collector may omit are `Option`s or empty collections; consumers never
//! have to chase defaults through the raw JSON tree.

use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};

/// The name used for the application when `CFBundleExecutable` is missing.
pub const UNKNOWN_APP_NAME: &str = "unknown";

/// How deep a call tree may nest before the rest is dropped.
pub const MAX_FRAME_DEPTH: usize = 512;

/// Errors encountered while decoding one report.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("Report is not a JSON object")]
    NotAnObject,
    #[error("Malformed `{block}` block: {source}")]
    Block {
        block: &'static str,
        source: serde_json::Error,
    },
    #[error("`{block}` is not a list")]
    NotAList { block: &'static str },
    #[error("Malformed binary image #{index}: {source}")]
    Image {
        index: usize,
        source: serde_json::Error,
    },
    #[error("Malformed thread #{index}: {source}")]
    Thread {
        index: usize,
        source: serde_json::Error,
    },
}

impl DecodeError {
    /// Returns just the name of the error, as a more human-friendly version of
    /// an error-code for error logging.
    pub fn name(&self) -> &'static str {
        match self {
            DecodeError::NotAnObject => "NotAnObject",
            DecodeError::Block { .. } => "Block",
            DecodeError::NotAList { .. } => "NotAList",
            DecodeError::Image { .. } => "Image",
            DecodeError::Thread { .. } => "Thread",
        }
    }
}

/// A decoded report along with the blocks that could not be decoded.
#[derive(Debug)]
pub struct Decoded {
    pub report: CrashReport,
    pub errors: Vec<DecodeError>,
}

/// The root of a KSCrash JSON report.
#[derive(Debug, Clone, Default)]
pub struct CrashReport {
    /// Device, OS and process metadata.
    pub system: Option<SystemInfo>,
    /// Timestamp, identifier and process details of the report itself.
    pub report: Option<ReportInfo>,
    /// Threads and the error that terminated the process.
    pub crash: Option<CrashInfo>,
    /// Loaded images, in the order the collector listed them.
    pub binary_images: Vec<BinaryImage>,
    /// Application-supplied telemetry.
    pub user: Option<UserInfo>,
    /// Sampled call tree attached by the battery/stack monitor.
    pub stack_string: Vec<StackFrame>,
}

impl CrashReport {
    /// Decode a report from a parsed JSON value.
    ///
    /// Only a non-object root is fatal. Malformed blocks are left as `None`
    /// and reported in [`Decoded::errors`]. Lists (threads, images, frames)
    /// are decoded element by element, so a bad element only loses itself.
    pub fn from_value(value: Value) -> Result<Decoded, DecodeError> {
        let mut root = match value {
            Value::Object(map) => map,
            _ => return Err(DecodeError::NotAnObject),
        };
        let mut errors = Vec::new();

        let system: Option<SystemInfo> = decode_block(&mut root, "system", &mut errors);
        let report = decode_block(&mut root, "report", &mut errors);
        let crash = decode_block::<Map<String, Value>>(&mut root, "crash", &mut errors)
            .map(|crash| CrashInfo::decode(crash, &mut errors));
        let stack_string = take_list(&mut root, "stack_string", &mut errors)
            .into_iter()
            .map(StackFrame::from_value)
            .collect();
        let binary_images = decode_list(&mut root, "binary_images", &mut errors, |index, source| {
            DecodeError::Image { index, source }
        });

        let app_name = system
            .as_ref()
            .and_then(|system| system.bundle_executable.as_deref())
            .unwrap_or(UNKNOWN_APP_NAME);
        let user = decode_block::<Map<String, Value>>(&mut root, "user", &mut errors)
            .map(|raw| UserInfo::new(raw, app_name, &mut errors));

        Ok(Decoded {
            report: CrashReport {
                system,
                report,
                crash,
                binary_images,
                user,
                stack_string,
            },
            errors,
        })
    }

    /// The executable name, used to find the app's entry in the `user` block.
    pub fn app_name(&self) -> &str {
        self.system
            .as_ref()
            .and_then(|system| system.bundle_executable.as_deref())
            .unwrap_or(UNKNOWN_APP_NAME)
    }

    /// The thread flagged as crashed, falling back to `crash.crashed_thread`.
    pub fn crashed_thread(&self) -> Option<&Thread> {
        let crash = self.crash.as_ref()?;
        crash
            .threads
            .iter()
            .find(|thread| thread.crashed)
            .or(crash.crashed_thread.as_ref())
    }

    /// The exception object that was deallocated right before the crash.
    pub fn last_exception(&self) -> Option<&LastException> {
        self.report
            .as_ref()?
            .process
            .as_ref()?
            .last_dealloced_nsexception
            .as_ref()
    }
}

/// The key of `block` in its parent: nested blocks are named by path, e.g. `crash.error`.
fn block_key(block: &str) -> &str {
    block.rsplit_once('.').map_or(block, |(_, key)| key)
}

fn decode_block<T: DeserializeOwned>(
    map: &mut Map<String, Value>,
    block: &'static str,
    errors: &mut Vec<DecodeError>,
) -> Option<T> {
    match map.remove(block_key(block)) {
        None | Some(Value::Null) => None,
        Some(value) => serde_json::from_value(value)
            .map_err(|source| errors.push(DecodeError::Block { block, source }))
            .ok(),
    }
}

/// Remove the list at `block`, leaving its elements undecoded.
fn take_list(
    map: &mut Map<String, Value>,
    block: &'static str,
    errors: &mut Vec<DecodeError>,
) -> Vec<Value> {
    match map.remove(block_key(block)) {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items,
        Some(_) => {
            errors.push(DecodeError::NotAList { block });
            Vec::new()
        }
    }
}

fn decode_list<T: DeserializeOwned>(
    map: &mut Map<String, Value>,
    block: &'static str,
    errors: &mut Vec<DecodeError>,
    malformed: fn(usize, serde_json::Error) -> DecodeError,
) -> Vec<T> {
    let items = take_list(map, block, errors);
    let mut decoded = Vec::with_capacity(items.len());
    for (index, item) in items.into_iter().enumerate() {
        match serde_json::from_value(item) {
            Ok(item) => decoded.push(item),
            Err(source) => errors.push(malformed(index, source)),
        }
    }
    decoded
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SystemInfo {
    /// Hardware model code, e.g. `iPhone10,3`.
    pub machine: Option<String>,
    pub system_name: Option<String>,
    pub system_version: Option<String>,
    /// OS build number, e.g. `16A366`.
    pub os_version: Option<String>,
    pub cpu_arch: Option<String>,
    pub binary_cpu_type: Option<i64>,
    pub binary_cpu_subtype: Option<i64>,
    #[serde(rename = "CFBundleExecutable")]
    pub bundle_executable: Option<String>,
    #[serde(rename = "CFBundleExecutablePath")]
    pub bundle_executable_path: Option<String>,
    #[serde(rename = "CFBundleShortVersionString")]
    pub bundle_short_version: Option<String>,
    #[serde(rename = "CFBundleVersion")]
    pub bundle_version: Option<String>,
    pub process_name: Option<String>,
    pub process_id: Option<i64>,
    pub memory: Option<MemoryInfo>,
    pub application_stats: Option<BTreeMap<String, Value>>,
}

/// Memory statistics, in bytes.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MemoryInfo {
    #[serde(deserialize_with = "lenient::option_u64")]
    pub usable: Option<u64>,
    #[serde(deserialize_with = "lenient::option_u64")]
    pub free: Option<u64>,
    #[serde(deserialize_with = "lenient::option_u64")]
    pub size: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ReportInfo {
    pub id: Option<String>,
    pub timestamp: Option<Timestamp>,
    pub process_name: Option<String>,
    pub process: Option<ProcessInfo>,
}

/// A report timestamp: epoch seconds, or a string the collector already formatted.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Timestamp {
    Seconds(i64),
    Fractional(f64),
    Text(String),
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ProcessInfo {
    pub last_dealloced_nsexception: Option<LastException>,
}

/// The most recently deallocated NSException, used to spot zombie crashes.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LastException {
    #[serde(deserialize_with = "lenient::option_u64")]
    pub address: Option<u64>,
    pub name: Option<String>,
    pub reason: Option<String>,
    pub referenced_object: Option<Value>,
}

#[derive(Debug, Clone, Default)]
pub struct CrashInfo {
    pub threads: Vec<Thread>,
    pub error: Option<ErrorInfo>,
    pub diagnosis: Option<String>,
    pub crashed_thread: Option<Thread>,
}

impl CrashInfo {
    fn decode(mut crash: Map<String, Value>, errors: &mut Vec<DecodeError>) -> CrashInfo {
        CrashInfo {
            threads: decode_list(&mut crash, "crash.threads", errors, |index, source| {
                DecodeError::Thread { index, source }
            }),
            error: decode_block(&mut crash, "crash.error", errors),
            diagnosis: decode_block(&mut crash, "crash.diagnosis", errors),
            crashed_thread: decode_block(&mut crash, "crash.crashed_thread", errors),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Thread {
    pub index: Option<i64>,
    #[serde(deserialize_with = "lenient::null_default")]
    pub crashed: bool,
    pub name: Option<String>,
    pub dispatch_queue: Option<String>,
    #[serde(deserialize_with = "lenient::null_default")]
    pub registers: Registers,
    pub backtrace: Option<Backtrace>,
    pub stack: Option<StackDump>,
    pub notable_addresses: Option<Map<String, Value>>,
}

impl Thread {
    /// The thread's basic register set, by register name.
    pub fn basic_registers(&self) -> &BTreeMap<String, u64> {
        &self.registers.basic
    }

    /// The frames of this thread's backtrace, if it has one.
    pub fn frames(&self) -> &[StackFrame] {
        self.backtrace
            .as_ref()
            .map(|backtrace| backtrace.contents.as_slice())
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Registers {
    #[serde(deserialize_with = "lenient::u64_map")]
    pub basic: BTreeMap<String, u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Backtrace {
    #[serde(deserialize_with = "lenient::null_default")]
    pub contents: Vec<StackFrame>,
    pub skipped: Option<u64>,
}

/// Raw stack memory captured around the crashed thread's stack pointer.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StackDump {
    #[serde(deserialize_with = "lenient::option_u64")]
    pub dump_start: Option<u64>,
    #[serde(deserialize_with = "lenient::option_u64")]
    pub dump_end: Option<u64>,
    pub contents: Option<String>,
}

/// One return address in a backtrace, possibly with nested sub-frames.
///
/// Thread backtraces put the symbol in `symbol_name` and the owning image in
/// `object_name`. Sampled stacks put the owning image in `image_name` and an
/// atos-style symbol string in `object_name`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StackFrame {
    pub instruction_address: Option<u64>,
    pub image_name: Option<String>,
    pub object_name: Option<String>,
    pub object_address: Option<u64>,
    pub symbol_name: Option<String>,
    pub symbol_address: Option<u64>,
    /// How many samples hit this frame.
    pub sample: Option<Value>,
    pub child: Vec<StackFrame>,
    /// Why the frame could not be decoded. A malformed frame carries nothing else.
    pub malformed: Option<String>,
    /// Sub-frames nested deeper than [`MAX_FRAME_DEPTH`] were dropped.
    pub truncated: bool,
}

/// Everything in a frame except its children.
#[derive(Default, Deserialize)]
#[serde(default)]
struct FrameFields {
    #[serde(alias = "instruction_addr", deserialize_with = "lenient::option_u64")]
    instruction_address: Option<u64>,
    image_name: Option<String>,
    object_name: Option<String>,
    #[serde(alias = "object_addr", deserialize_with = "lenient::option_u64")]
    object_address: Option<u64>,
    symbol_name: Option<String>,
    #[serde(alias = "symbol_addr", deserialize_with = "lenient::option_u64")]
    symbol_address: Option<u64>,
    sample: Option<Value>,
}

impl StackFrame {
    /// Decode a frame and its sub-frames.
    ///
    /// This never fails: a frame that can't be decoded comes back with
    /// [`StackFrame::malformed`] set, and its siblings are unaffected.
    pub fn from_value(value: Value) -> StackFrame {
        StackFrame::decode(value, 0)
    }

    fn decode(value: Value, depth: usize) -> StackFrame {
        let mut fields = match value {
            Value::Object(fields) => fields,
            other => {
                return StackFrame::malformed(format!(
                    "expected a frame, found {}",
                    json_kind(&other)
                ))
            }
        };
        let children = match fields.remove("child") {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(children)) => children,
            Some(other) => {
                return StackFrame::malformed(format!(
                    "`child` should be a list, found {}",
                    json_kind(&other)
                ))
            }
        };
        let parsed: FrameFields = match serde_json::from_value(Value::Object(fields)) {
            Ok(parsed) => parsed,
            Err(e) => return StackFrame::malformed(e.to_string()),
        };

        let truncated = !children.is_empty() && depth + 1 >= MAX_FRAME_DEPTH;
        let child = if truncated {
            Vec::new()
        } else {
            children
                .into_iter()
                .map(|child| StackFrame::decode(child, depth + 1))
                .collect()
        };
        StackFrame {
            instruction_address: parsed.instruction_address,
            image_name: parsed.image_name,
            object_name: parsed.object_name,
            object_address: parsed.object_address,
            symbol_name: parsed.symbol_name,
            symbol_address: parsed.symbol_address,
            sample: parsed.sample,
            child,
            malformed: None,
            truncated,
        }
    }

    fn malformed(reason: String) -> StackFrame {
        StackFrame {
            malformed: Some(reason),
            ..Default::default()
        }
    }
}

impl<'de> Deserialize<'de> for StackFrame {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        Value::deserialize(d).map(StackFrame::from_value)
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "an object",
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BinaryImage {
    /// Full path of the image.
    pub name: String,
    pub uuid: Option<String>,
    #[serde(deserialize_with = "lenient::u64")]
    pub image_addr: u64,
    #[serde(deserialize_with = "lenient::u64")]
    pub image_size: u64,
    pub cpu_type: Option<i64>,
    pub cpu_subtype: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ErrorInfo {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    #[serde(deserialize_with = "lenient::option_u64")]
    pub address: Option<u64>,
    pub reason: Option<String>,
    pub mach: Option<MachError>,
    pub signal: Option<SignalError>,
    pub nsexception: Option<NsException>,
    pub user_reported: Option<UserReported>,
    #[serde(alias = "cpp_exception")]
    pub cppexception: Option<CppException>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MachError {
    pub exception_name: Option<String>,
    pub code_name: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SignalError {
    pub name: Option<String>,
    pub signal: Option<Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct NsException {
    pub name: Option<String>,
    pub referenced_object: Option<Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct UserReported {
    pub name: Option<String>,
    pub line_of_code: Option<Value>,
    #[serde(deserialize_with = "lenient::null_default")]
    pub backtrace: Vec<Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CppException {
    pub name: Option<String>,
}

/// The `user` block: the raw map, plus the decoded entry for this app.
#[derive(Debug, Clone, Default)]
pub struct UserInfo {
    pub raw: Map<String, Value>,
    pub app: Option<AppUserInfo>,
}

impl UserInfo {
    fn new(raw: Map<String, Value>, app_name: &str, errors: &mut Vec<DecodeError>) -> Self {
        let app = match raw.get(app_name) {
            None | Some(Value::Null) => None,
            Some(entry) => serde_json::from_value(entry.clone())
                .map_err(|source| {
                    errors.push(DecodeError::Block {
                        block: "user",
                        source,
                    })
                })
                .ok(),
        };
        UserInfo { raw, app }
    }
}

/// Telemetry an app files under its own name in the `user` block.
///
/// The values are whatever the app chose to report, so they stay untyped.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppUserInfo {
    pub uin: Option<Value>,
    #[serde(rename = "UsrName")]
    pub usr_name: Option<Value>,
    #[serde(rename = "heavyUser")]
    pub heavy_user: Option<Value>,
    #[serde(rename = "heavyUserType")]
    pub heavy_user_type: Option<Value>,
    #[serde(rename = "heavyPoint")]
    pub heavy_point: Option<Value>,
    #[serde(rename = "DumpType")]
    pub dump_type: Option<Value>,
    #[serde(rename = "blockTime")]
    pub block_time: Option<Value>,
    #[serde(rename = "LastScene")]
    pub last_scene: Option<Value>,
    #[serde(rename = "SecondLastScene")]
    pub second_last_scene: Option<Value>,
    #[serde(rename = "WeAppScene")]
    pub weapp_scene: Option<Value>,
    #[serde(rename = "ExistWeAppCount")]
    pub exist_weapp_count: Option<Value>,
    pub device_uuid: Option<Value>,
    #[serde(rename = "Jailbreak")]
    pub jailbreak: Option<Value>,
    pub commit_id: Option<Value>,
    pub wcdb_commit_id: Option<Value>,
    #[serde(deserialize_with = "lenient::null_default")]
    pub log: Vec<Value>,
    #[serde(deserialize_with = "lenient::null_default")]
    pub click: Vec<Value>,
}

/// Render a JSON scalar the way it reads in a text report.
///
/// Strings lose their quotes and `null` becomes empty; containers are
/// rendered as compact JSON.
pub fn display_value(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Whether a telemetry value counts as "set": non-empty, non-zero, not false.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map_or(true, |n| n != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

/// Interpret a JSON value as an unsigned integer.
///
/// Accepts integers (negative ones are reinterpreted as two's complement),
/// non-negative floats, decimal strings and `0x`-prefixed hex strings.
pub fn value_to_u64(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_i64().map(|n| n as u64))
            .or_else(|| {
                n.as_f64()
                    .filter(|n| n.is_finite() && *n >= 0.0)
                    .map(|n| n as u64)
            }),
        Value::String(s) => {
            let s = s.trim();
            match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
                Some(hex) => u64::from_str_radix(hex, 16).ok(),
                None => s.parse().ok(),
            }
        }
        _ => None,
    }
}

mod lenient {
    use super::value_to_u64;
    use serde::de::Error;
    use serde::{Deserialize, Deserializer};
    use serde_json::Value;
    use std::collections::BTreeMap;

    /// Unparseable values decode as `None` so that one odd address doesn't
    /// take the whole block down with it.
    pub fn option_u64<'de, D: Deserializer<'de>>(d: D) -> Result<Option<u64>, D::Error> {
        let value = Option::<Value>::deserialize(d)?;
        Ok(value.as_ref().and_then(value_to_u64))
    }

    pub fn u64<'de, D: Deserializer<'de>>(d: D) -> Result<u64, D::Error> {
        let value = Value::deserialize(d)?;
        value_to_u64(&value)
            .ok_or_else(|| D::Error::custom(format!("expected an unsigned integer, found {value}")))
    }

    /// `null` reads the same as a missing key.
    pub fn null_default<'de, D, T>(d: D) -> Result<T, D::Error>
    where
        D: Deserializer<'de>,
        T: Deserialize<'de> + Default,
    {
        Ok(Option::<T>::deserialize(d)?.unwrap_or_default())
    }

    pub fn u64_map<'de, D: Deserializer<'de>>(d: D) -> Result<BTreeMap<String, u64>, D::Error> {
        let map = Option::<BTreeMap<String, Value>>::deserialize(d)?.unwrap_or_default();
        Ok(map
            .into_iter()
            .filter_map(|(name, value)| value_to_u64(&value).map(|value| (name, value)))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_value_to_u64() {
        assert_eq!(value_to_u64(&json!(42)), Some(42));
        assert_eq!(value_to_u64(&json!("0x1F")), Some(0x1f));
        assert_eq!(value_to_u64(&json!("1234")), Some(1234));
        assert_eq!(value_to_u64(&json!(2.0)), Some(2));
        assert_eq!(value_to_u64(&json!(-1)), Some(u64::MAX));
        assert_eq!(value_to_u64(&json!("nope")), None);
        assert_eq!(value_to_u64(&json!(null)), None);
    }

    #[test]
    fn test_blocks_decode_independently() {
        let decoded = CrashReport::from_value(json!({
            "system": { "machine": "iPhone10,3", "CFBundleExecutable": "Demo" },
            "crash": { "threads": "not a list" },
            "binary_images": [
                { "name": "/a/Demo", "uuid": "AB-CD", "image_addr": 4096, "image_size": 16 },
                { "name": "/a/broken" },
            ],
        }))
        .unwrap();

        let report = decoded.report;
        assert_eq!(report.system.unwrap().machine.as_deref(), Some("iPhone10,3"));
        assert!(report.crash.unwrap().threads.is_empty());
        assert_eq!(report.binary_images.len(), 1);
        assert_eq!(decoded.errors.len(), 2);
        assert_eq!(decoded.errors[0].name(), "NotAList");
        assert_eq!(decoded.errors[0].to_string(), "`crash.threads` is not a list");
        assert_eq!(decoded.errors[1].name(), "Image");
    }

    #[test]
    fn test_bad_thread_keeps_the_rest_of_the_crash() {
        let decoded = CrashReport::from_value(json!({
            "crash": {
                "error": { "type": "deadlock" },
                "threads": [
                    { "index": 0, "crashed": true },
                    { "index": "one" },
                    { "index": 2 },
                ],
            },
        }))
        .unwrap();

        let crash = decoded.report.crash.unwrap();
        assert_eq!(crash.error.unwrap().kind.as_deref(), Some("deadlock"));
        let indices: Vec<_> = crash.threads.iter().map(|t| t.index).collect();
        assert_eq!(indices, [Some(0), Some(2)]);
        assert_eq!(decoded.errors.len(), 1);
        assert_eq!(decoded.errors[0].name(), "Thread");
    }

    #[test]
    fn test_bad_frame_keeps_its_siblings() {
        let decoded = CrashReport::from_value(json!({
            "crash": {
                "threads": [{
                    "index": 0,
                    "backtrace": { "contents": [
                        { "instruction_addr": 16, "symbol_name": "main" },
                        { "instruction_addr": 32, "symbol_name": 7 },
                        { "instruction_addr": 48 },
                    ] },
                }],
            },
            "stack_string": [
                { "instruction_address": 16, "child": [{ "image_name": 42 }, "junk"] },
                { "instruction_address": 32 },
            ],
        }))
        .unwrap();
        assert!(decoded.errors.is_empty());

        let report = decoded.report;
        let frames = report.crash.as_ref().unwrap().threads[0].frames();
        assert_eq!(frames.len(), 3);
        assert_eq!(frames[0].symbol_name.as_deref(), Some("main"));
        assert!(frames[1].malformed.is_some());
        assert_eq!(frames[1].instruction_address, None);
        assert_eq!(frames[2].instruction_address, Some(48));

        let sampled = &report.stack_string;
        assert_eq!(sampled.len(), 2);
        assert!(sampled[0].malformed.is_none());
        assert!(sampled[0].child[0].malformed.is_some());
        assert_eq!(
            sampled[0].child[1].malformed.as_deref(),
            Some("expected a frame, found a string")
        );
        assert_eq!(sampled[1].instruction_address, Some(32));
    }

    #[test]
    fn test_null_reads_as_missing() {
        let decoded = CrashReport::from_value(json!({
            "system": { "CFBundleExecutable": "Demo" },
            "crash": {
                "threads": [{
                    "index": 0,
                    "crashed": null,
                    "registers": null,
                    "backtrace": { "contents": null },
                }],
                "error": { "user_reported": { "name": "x", "backtrace": null } },
            },
            "stack_string": [{ "instruction_address": 16, "child": null }],
            "binary_images": null,
            "user": { "Demo": { "log": null, "click": null } },
        }))
        .unwrap();
        assert!(decoded.errors.is_empty(), "{:?}", decoded.errors);

        let report = decoded.report;
        let thread = &report.crash.as_ref().unwrap().threads[0];
        assert!(!thread.crashed);
        assert!(thread.basic_registers().is_empty());
        assert!(thread.frames().is_empty());
        assert!(report.stack_string[0].child.is_empty());
        assert!(report.stack_string[0].malformed.is_none());
        assert!(report.user.unwrap().app.unwrap().log.is_empty());
    }

    #[test]
    fn test_deep_call_tree_is_truncated() {
        let mut value = json!({ "instruction_address": 1 });
        for _ in 0..MAX_FRAME_DEPTH + 20 {
            value = json!({ "instruction_address": 1, "child": [value] });
        }

        let mut frame = &StackFrame::from_value(value);
        let mut depth = 1;
        while let Some(child) = frame.child.first() {
            assert!(!frame.truncated);
            frame = child;
            depth += 1;
        }
        assert_eq!(depth, MAX_FRAME_DEPTH);
        assert!(frame.truncated);
    }

    #[test]
    fn test_not_an_object() {
        let err = CrashReport::from_value(json!([1, 2])).unwrap_err();
        assert_eq!(err.name(), "NotAnObject");
    }

    #[test]
    fn test_frame_aliases_and_children() {
        let frame = StackFrame::from_value(json!({
            "instruction_addr": "0x100",
            "object_name": "Demo",
            "symbol_name": "main",
            "child": [{ "instruction_address": 257 }],
        }));
        assert_eq!(frame.instruction_address, Some(0x100));
        assert_eq!(frame.symbol_name.as_deref(), Some("main"));
        assert_eq!(frame.child.len(), 1);
        assert_eq!(frame.child[0].instruction_address, Some(257));
    }

    #[test]
    fn test_app_user_info_follows_bundle_executable() {
        let decoded = CrashReport::from_value(json!({
            "system": { "CFBundleExecutable": "Demo" },
            "user": {
                "Demo": { "uin": 1234, "log": ["a", "b"] },
                "Other": { "uin": 99 },
            },
        }))
        .unwrap();
        let user = decoded.report.user.unwrap();
        let app = user.app.unwrap();
        assert_eq!(app.uin, Some(json!(1234)));
        assert_eq!(app.log.len(), 2);
        assert_eq!(user.raw.len(), 2);
    }

    #[test]
    fn test_crashed_thread_fallback() {
        let decoded = CrashReport::from_value(json!({
            "crash": {
                "threads": [{ "index": 0 }, { "index": 1 }],
                "crashed_thread": { "index": 7, "crashed": true },
            },
        }))
        .unwrap();
        assert_eq!(decoded.report.crashed_thread().unwrap().index, Some(7));
    }

    #[test]
    fn test_truthiness() {
        assert!(!is_truthy(&json!(0)));
        assert!(!is_truthy(&json!("")));
        assert!(is_truthy(&json!(-1)));
        assert!(is_truthy(&json!("x")));
    }
}
