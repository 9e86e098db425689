// Copyright 2015 Ted Mielczarek. See the COPYRIGHT
// file at the top-level directory of this distribution.

//! The individual sections of a text report.
//!
//! Every formatter returns a [`Section`] (which may be empty, in which case
//! it is left out of the output) or a [`SectionError`] when the data it
//! needs is missing altogether.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::ser::PrettyFormatter;
use serde_json::{Map, Value};
use time::macros::format_description;
use time::OffsetDateTime;

use crate::render::ReportContext;
use crate::resolver::SymbolSource;
use crate::schema::{
    display_value, is_truthy, ErrorInfo, LastException, Thread, Timestamp,
    UserReported,
};
use crate::system_info::{device_name, CpuArch};

/// Lines of one section, plus whatever went wrong producing them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Section {
    pub lines: Vec<String>,
    pub warnings: Vec<String>,
}

impl Section {
    fn line(&mut self, line: impl Into<String>) {
        self.lines.push(line.into());
    }

    fn extend<I: IntoIterator<Item = String>>(&mut self, lines: I) {
        self.lines.extend(lines);
    }

    fn warn(&mut self, warning: impl Into<String>) {
        self.warnings.push(warning.into());
    }
}

/// Why a section could not be rendered at all.
#[derive(Debug, thiserror::Error)]
pub enum SectionError {
    #[error("Report has no `{0}` block")]
    MissingBlock(&'static str),
    #[error("Crash block has no error")]
    NoError,
    #[error("Report has no crashed thread")]
    NoCrashedThread,
    #[error("Failed to serialize JSON: {0}")]
    Json(#[from] serde_json::Error),
}

impl SectionError {
    /// Returns just the name of the error, as a more human-friendly version of
    /// an error-code for error logging.
    pub fn name(&self) -> &'static str {
        match self {
            SectionError::MissingBlock(_) => "MissingBlock",
            SectionError::NoError => "NoError",
            SectionError::NoCrashedThread => "NoCrashedThread",
            SectionError::Json(_) => "Json",
        }
    }
}

/// Format epoch seconds as `YYYY-MM-DD HH:MM:SS` (UTC).
///
/// Zero means "not recorded" and formats as an empty string.
pub fn format_epoch(seconds: i64) -> String {
    if seconds == 0 {
        return String::new();
    }
    OffsetDateTime::from_unix_timestamp(seconds)
        .ok()
        .and_then(|datetime| {
            datetime
                .format(format_description!(
                    "[year]-[month]-[day] [hour]:[minute]:[second]"
                ))
                .ok()
        })
        .unwrap_or_else(|| seconds.to_string())
}

pub fn format_timestamp(timestamp: Option<&Timestamp>) -> String {
    match timestamp {
        None => String::new(),
        Some(Timestamp::Seconds(seconds)) => format_epoch(*seconds),
        Some(Timestamp::Fractional(seconds)) => format_epoch(*seconds as i64),
        Some(Timestamp::Text(text)) => text.clone(),
    }
}

/// Pretty-print JSON with 4-space indentation, one output line per line.
fn json_lines(value: &Value) -> Result<Vec<String>, SectionError> {
    let mut buf = Vec::new();
    let formatter = PrettyFormatter::with_indent(b"    ");
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
    value.serialize(&mut ser)?;
    Ok(String::from_utf8_lossy(&buf)
        .lines()
        .map(str::to_owned)
        .collect())
}

/// A `"    Label:       value"` line with the value column at 17.
fn field(label: &str, value: impl std::fmt::Display) -> String {
    format!("    {:17}{}", format!("{label}:"), value)
}

const BYTES_PER_MIB: u64 = 1024 * 1024;

pub fn system_info(ctx: &ReportContext<'_>) -> Result<Section, SectionError> {
    let system = ctx.system().ok_or(SectionError::MissingBlock("system"))?;
    let text = |value: &Option<String>| value.clone().unwrap_or_default();

    let mut section = Section::default();
    section.line("System Info: {");

    let machine = text(&system.machine);
    let device = device_name(&machine).map(str::to_owned).unwrap_or(machine);
    section.line(format!("    Device:      {device}"));
    section.line(format!("    CpuArch:     {}", text(&system.cpu_arch)));
    section.line(format!(
        "    OS Version:  {} {} ({})",
        text(&system.system_name),
        text(&system.system_version),
        text(&system.os_version)
    ));

    if let Some(jailbreak) = ctx
        .app_user()
        .and_then(|app| app.jailbreak.as_ref())
        .filter(|value| is_truthy(value))
    {
        section.line(format!("    Jailbreak:   {}", display_value(jailbreak)));
    }

    if let Some(memory) = &system.memory {
        let stats = [
            ("usable", memory.usable),
            ("free", memory.free),
            ("size", memory.size),
        ];
        for (name, bytes) in stats {
            match bytes {
                Some(bytes) => {
                    section.line(format!("    Mem {:6}:  {:4} M", name, bytes / BYTES_PER_MIB))
                }
                None => section.warn(format!("memory.{name} missing or not a number")),
            }
        }
    }

    section.line("}");
    Ok(section)
}

pub fn user_info(ctx: &ReportContext<'_>) -> Result<Section, SectionError> {
    let mut section = Section::default();
    let user = match &ctx.report.user {
        Some(user) if !user.raw.is_empty() => user,
        _ => return Ok(section),
    };

    section.line("User Info: {");
    if let Some(app) = &user.app {
        let truthy = |value: &Option<Value>| value.as_ref().filter(|v| is_truthy(v)).cloned();
        let not_unset = |value: &Option<Value>| value.as_ref().filter(|v| **v != -1i64).cloned();

        let fields = [
            ("Uin", truthy(&app.uin)),
            ("UsrName", truthy(&app.usr_name)),
            ("heavyUser", not_unset(&app.heavy_user)),
            ("heavyUserType", not_unset(&app.heavy_user_type)),
            ("heavyPoint", not_unset(&app.heavy_point)),
            ("dumpType", not_unset(&app.dump_type)),
            ("blockTime", truthy(&app.block_time)),
            ("LastScene", truthy(&app.last_scene)),
            ("SecondLastScene", truthy(&app.second_last_scene)),
            ("WeAppScene", truthy(&app.weapp_scene)),
            ("ExistWeAppCount", truthy(&app.exist_weapp_count)),
            ("device_uuid", truthy(&app.device_uuid)),
        ];
        for (label, value) in fields {
            if let Some(value) = value {
                section.line(field(label, display_value(&value)));
            }
        }
    }
    if section.lines.len() == 1 {
        section.extend(json_lines(&Value::Object(user.raw.clone()))?);
    }
    section.line("}");
    Ok(section)
}

/// The one cause reported for a crash, in order of precedence.
#[derive(Debug, Clone, Copy)]
pub enum CrashCause<'a> {
    NsException { name: &'a str },
    /// A bad access through a pointer to an NSException that was already freed.
    Zombie(&'a LastException),
    UserReported(&'a UserReported),
    CppException { name: Option<&'a str> },
    Deadlock,
    Unknown,
}

impl<'a> CrashCause<'a> {
    pub fn of(ctx: &ReportContext<'a>, error: &'a ErrorInfo) -> CrashCause<'a> {
        if let Some(nsexception) = &error.nsexception {
            return CrashCause::NsException {
                name: nsexception.name.as_deref().unwrap_or_default(),
            };
        }
        if let Some(last) = zombie_exception(ctx, error) {
            return CrashCause::Zombie(last);
        }
        if let Some(user_reported) = &error.user_reported {
            return CrashCause::UserReported(user_reported);
        }
        match error.kind.as_deref() {
            Some("cpp_exception") => CrashCause::CppException {
                name: error
                    .cppexception
                    .as_ref()
                    .and_then(|cpp| cpp.name.as_deref())
                    .filter(|name| !name.is_empty()),
            },
            Some("deadlock") => CrashCause::Deadlock,
            _ => CrashCause::Unknown,
        }
    }
}

/// The last deallocated NSException, if the crash was a dereference of it.
fn zombie_exception<'a>(
    ctx: &ReportContext<'a>,
    error: &'a ErrorInfo,
) -> Option<&'a LastException> {
    let mach = error.mach.as_ref()?;
    if mach.exception_name.as_deref() != Some("EXC_BAD_ACCESS")
        || mach.code_name.as_deref() != Some("KERN_INVALID_ADDRESS")
    {
        return None;
    }
    let last = ctx.report.last_exception()?;
    let address = last.address?;
    let thread = ctx.crashed_thread?;
    thread
        .basic_registers()
        .values()
        .any(|value| *value == address)
        .then_some(last)
}

fn uncaught_exception(name: &str, reason: &str) -> String {
    format!("*** Terminating app due to uncaught exception '{name}', reason: '{reason}'")
}

/// The "Application Specific Information" lines explaining the crash.
pub fn crash_reason(ctx: &ReportContext<'_>) -> Result<Section, SectionError> {
    ctx.report
        .crash
        .as_ref()
        .ok_or(SectionError::MissingBlock("crash"))?;
    let error = ctx.error().ok_or(SectionError::NoError)?;
    let reason = error.reason.as_deref().unwrap_or_default();

    let mut section = Section::default();
    match CrashCause::of(ctx, error) {
        CrashCause::NsException { name } => section.line(uncaught_exception(name, reason)),
        CrashCause::Zombie(last) => section.line(uncaught_exception(
            last.name.as_deref().unwrap_or_default(),
            last.reason.as_deref().unwrap_or_default(),
        )),
        CrashCause::UserReported(user_reported) => {
            section.line(uncaught_exception(
                user_reported.name.as_deref().unwrap_or_default(),
                reason,
            ));
            let line_of_code = user_reported.line_of_code.as_ref().filter(|v| is_truthy(v));
            if line_of_code.is_some() || !user_reported.backtrace.is_empty() {
                section.line("Custom Backtrace:");
            }
            if let Some(line_of_code) = line_of_code {
                section.line(format!("Line: {}", display_value(line_of_code)));
            }
            section.extend(user_reported.backtrace.iter().map(display_value));
        }
        CrashCause::CppException { name: Some(name) } => {
            section.line(uncaught_exception(name, reason))
        }
        CrashCause::CppException { name: None } => {
            section.warn("C++ exception without a name")
        }
        CrashCause::Deadlock => section.line("Application main thread deadlocked"),
        CrashCause::Unknown => {}
    }
    Ok(section)
}

/// `(label, value)` pairs summarizing the exception and the crashed thread.
pub fn error_summary(ctx: &ReportContext<'_>) -> Result<Vec<(&'static str, String)>, SectionError> {
    let crash = ctx
        .report
        .crash
        .as_ref()
        .ok_or(SectionError::MissingBlock("crash"))?;
    let error = ctx.error().ok_or(SectionError::NoError)?;

    let mach = error.mach.as_ref();
    let exception_name = mach
        .and_then(|mach| mach.exception_name.as_deref())
        .unwrap_or("0");
    let code_name = mach
        .and_then(|mach| mach.code_name.as_deref())
        .unwrap_or("0x00000000");
    let signal = error.signal.as_ref().map_or_else(String::new, |signal| {
        match (&signal.name, &signal.signal) {
            (Some(name), _) if !name.is_empty() => name.clone(),
            (_, Some(number)) => display_value(number),
            _ => String::new(),
        }
    });
    let crashed_index = ctx
        .crashed_thread
        .and_then(|thread| thread.index)
        .unwrap_or(0);

    let mut summary = vec![
        ("Exception Type", format!("{exception_name} ({signal})")),
        (
            "Exception Codes",
            format!("{code_name} at {:016x}", error.address.unwrap_or(0)),
        ),
        ("Crashed Thread", crashed_index.to_string()),
    ];
    if let Some(diagnosis) = crash.diagnosis.as_deref().filter(|d| !d.is_empty()) {
        summary.push(("CrashDoctor Diagnosis", diagnosis.to_owned()));
    }
    Ok(summary)
}

pub fn application_info(ctx: &ReportContext<'_>) -> Result<Section, SectionError> {
    let system = ctx.system().ok_or(SectionError::MissingBlock("system"))?;
    let mut section = Section::default();
    let stats = match &system.application_stats {
        Some(stats) if !stats.is_empty() => stats,
        _ => return Ok(section),
    };
    let text = |value: &Option<String>| value.clone().unwrap_or_default();

    let mut table: BTreeMap<String, String> = stats
        .iter()
        .map(|(key, value)| (key.clone(), display_value(value)))
        .collect();
    if let Some(launch) = stats.get("app_launch_time").filter(|v| is_truthy(v)) {
        let formatted = match launch.as_i64().or_else(|| launch.as_f64().map(|f| f as i64)) {
            Some(seconds) => format_epoch(seconds),
            None => display_value(launch),
        };
        table.insert("app_launch_time".to_owned(), formatted);
    }

    let report_info = ctx.report.report.as_ref();
    table.insert(
        "app_crash__time".to_owned(),
        format_timestamp(report_info.and_then(|info| info.timestamp.as_ref())),
    );
    table.insert(
        "Process".to_owned(),
        format!(
            "{} [{}]",
            text(&system.process_name),
            system.process_id.map(|pid| pid.to_string()).unwrap_or_default()
        ),
    );
    table.insert(
        "Identifier".to_owned(),
        report_info
            .and_then(|info| info.id.clone())
            .unwrap_or_default(),
    );
    table.insert(
        "Version".to_owned(),
        format!(
            "{} ({})",
            text(&system.bundle_short_version),
            text(&system.bundle_version)
        ),
    );
    if let Some(app) = ctx.app_user() {
        let commits = [
            ("Commit ID", &app.commit_id),
            ("WCDB_Commit ID", &app.wcdb_commit_id),
        ];
        for (key, value) in commits {
            if let Some(value) = value.as_ref().filter(|v| is_truthy(v)) {
                table.insert(key.to_owned(), display_value(value));
            }
        }
    }
    let code_type = system
        .cpu_arch
        .as_deref()
        .map_or(CpuArch::Unknown, CpuArch::from_name);
    table.insert("Code Type".to_owned(), code_type.code_type().to_owned());

    match crash_reason(ctx) {
        Ok(reason) => {
            section.warnings.extend(reason.warnings);
            if !reason.lines.is_empty() {
                table.insert(
                    "Application Specific Information".to_owned(),
                    reason.lines.join(" "),
                );
            }
        }
        Err(e) => section.warn(format!("no crash reason: {e}")),
    }
    match error_summary(ctx) {
        Ok(summary) => {
            for (key, value) in summary {
                table.insert(key.to_owned(), value);
            }
        }
        Err(e) => section.warn(format!("no error summary: {e}")),
    }

    section.line("Application Info:{");
    for (key, value) in &table {
        section.line(format!("    {key:36}:  {value}"));
    }
    section.line("}");
    Ok(section)
}

pub fn click(ctx: &ReportContext<'_>) -> Result<Section, SectionError> {
    let mut section = Section::default();
    if let Some(app) = ctx.app_user().filter(|app| !app.click.is_empty()) {
        section.line("Click:");
        section.extend(app.click.iter().map(display_value));
    }
    Ok(section)
}

fn thread_lines(ctx: &ReportContext<'_>, thread: &Thread, index: i64, section: &mut Section) {
    match (&thread.name, &thread.dispatch_queue) {
        (Some(name), _) if !name.is_empty() => {
            section.line(format!("Thread {index} name:  {name}"))
        }
        (_, Some(queue)) if !queue.is_empty() => {
            section.line(format!("Thread {index} name:  Dispatch queue: {queue}"))
        }
        _ => {}
    }
    if thread.crashed {
        section.line(format!("Thread {index} Crashed:"));
    } else {
        section.line(format!("Thread {index}:"));
    }

    if thread.backtrace.is_some() {
        let resolved = ctx
            .resolver(SymbolSource::ThreadBacktrace)
            .resolve(thread.frames());
        section.extend(resolved.apple_lines());
        for issue in &resolved.issues {
            section.warn(format!("thread {index}: {issue}"));
        }
    }
}

pub fn threads(ctx: &ReportContext<'_>) -> Result<Section, SectionError> {
    let crash = ctx
        .report
        .crash
        .as_ref()
        .ok_or(SectionError::MissingBlock("crash"))?;
    let mut section = Section::default();
    for thread in &crash.threads {
        let index = match thread.index {
            Some(index) if index != -1 => index,
            _ => {
                section.warn("thread without an index skipped");
                continue;
            }
        };
        if !section.lines.is_empty() {
            section.line("");
        }
        thread_lines(ctx, thread, index, &mut section);
    }
    Ok(section)
}

pub fn stack_info(ctx: &ReportContext<'_>) -> Result<Section, SectionError> {
    let mut section = Section::default();
    let frames = &ctx.report.stack_string;
    if frames.is_empty() {
        section.line("empty stack_string");
        return Ok(section);
    }
    let resolved = ctx.resolver(SymbolSource::SampledStack).resolve(frames);
    section.line("stack_info:");
    section.extend(resolved.stack_lines());
    for issue in &resolved.issues {
        section.warn(issue.to_string());
    }
    Ok(section)
}

pub fn cpu_state(ctx: &ReportContext<'_>) -> Result<Section, SectionError> {
    let thread = ctx.crashed_thread.ok_or(SectionError::NoCrashedThread)?;
    let arch = ctx.cpu_arch();
    let registers = thread.basic_registers();

    let mut section = Section::default();
    section.line(format!(
        "Thread {} crashed with {} Thread State:",
        thread.index.unwrap_or(0),
        arch
    ));
    for row in arch.register_order().chunks(4) {
        let line = row
            .iter()
            .map(|reg| format!("{:>6}: 0x{:016x}", reg, registers.get(*reg).copied().unwrap_or(0)))
            .collect::<Vec<_>>()
            .join(" ");
        section.line(line);
    }
    Ok(section)
}

pub fn binary_images(ctx: &ReportContext<'_>) -> Result<Section, SectionError> {
    let executable = ctx
        .system()
        .and_then(|system| system.bundle_executable_path.as_deref());

    let mut section = Section::default();
    section.line("Binary Images:");
    for image in ctx.images.by_addr() {
        let base = if Some(image.name.as_str()) == executable {
            '+'
        } else {
            ' '
        };
        section.line(format!(
            "{:>#18x} - {:>#18x} {}{}  <{}> {}",
            image.image_addr,
            image.end_address(),
            base,
            image.short_name(),
            image.build_id(),
            image.name
        ));
    }
    Ok(section)
}

/// A copy of the notable addresses with numeric `address` fields in hex.
fn hex_notable_addresses(notable: &Map<String, Value>) -> Value {
    let mut notable = notable.clone();
    for entry in notable.values_mut() {
        if let Some(address) = entry.get_mut("address") {
            if let Some(value) = address.as_u64().filter(|v| *v != 0) {
                *address = Value::String(format!("{value:#x}"));
            }
        }
    }
    Value::Object(notable)
}

pub fn extra_info(ctx: &ReportContext<'_>) -> Result<Section, SectionError> {
    ctx.report
        .crash
        .as_ref()
        .ok_or(SectionError::MissingBlock("crash"))?;
    let error = ctx.error().ok_or(SectionError::NoError)?;

    let mut section = Section::default();
    section.line("Extra Information:");

    if let Some(referenced) = error
        .nsexception
        .as_ref()
        .and_then(|ns| ns.referenced_object.as_ref())
        .filter(|v| is_truthy(v))
    {
        section.line("Object referenced by NSException:");
        section.extend(json_lines(referenced)?);
    }

    if let Some(thread) = ctx.crashed_thread {
        if let Some(stack) = &thread.stack {
            section.line(format!(
                "Stack Dump (0x{:08x}-0x{:08x}):",
                stack.dump_start.unwrap_or(0),
                stack.dump_end.unwrap_or(0)
            ));
            section.line("");
            section.line(stack.contents.clone().unwrap_or_default());
        }
        if let Some(notable) = thread.notable_addresses.as_ref().filter(|n| !n.is_empty()) {
            section.line("Notable Addresses:");
            section.extend(json_lines(&hex_notable_addresses(notable))?);
        }
    }

    if let Some(last) = ctx.report.last_exception() {
        section.line("");
        section.line(format!(
            "Last deallocated NSException (0x{:016x}): {}: {}",
            last.address.unwrap_or(0),
            last.name.as_deref().unwrap_or_default(),
            last.reason.as_deref().unwrap_or_default()
        ));
        if let Some(referenced) = last.referenced_object.as_ref().filter(|v| is_truthy(v)) {
            section.line("Referenced object:");
            section.extend(json_lines(referenced)?);
        }
        match ctx.crashed_thread {
            Some(thread) => {
                let resolved = ctx
                    .resolver(SymbolSource::ThreadBacktrace)
                    .resolve(thread.frames());
                section.extend(resolved.apple_lines());
            }
            None => section.warn("no crashed thread to pair with the last exception"),
        }
    }
    Ok(section)
}

pub fn log(ctx: &ReportContext<'_>) -> Result<Section, SectionError> {
    let mut section = Section::default();
    section.line("MMLog:");
    match ctx.app_user().filter(|app| !app.log.is_empty()) {
        Some(app) => section.extend(app.log.iter().map(display_value)),
        None => section.line("no log found..."),
    }
    Ok(section)
}
