// Copyright 2015 Ted Mielczarek. See the COPYRIGHT
// file at the top-level directory of this distribution.

//! Assembling sections into a complete text report.

use std::fmt;
use std::io::{self, Write};

use tracing::warn;

use crate::images::ImageTable;
use crate::resolver::{AddressMask, BacktraceResolver, SymbolSource};
use crate::schema::{AppUserInfo, CrashReport, Decoded, ErrorInfo, SystemInfo, Thread};
use crate::sections::{self, Section, SectionError};
use crate::system_info::{CpuArch, Platform};

/// Which of the two report layouts to produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flavor {
    /// Every thread with its backtrace, followed by the click trail.
    ThreadList,
    /// The sampled call tree attached as `stack_string`.
    SampledStack,
}

impl Flavor {
    /// The sections of this flavor, in output order.
    pub fn sections(self) -> &'static [SectionKind] {
        match self {
            Flavor::ThreadList => &[
                SectionKind::SystemInfo,
                SectionKind::UserInfo,
                SectionKind::ApplicationInfo,
                SectionKind::Click,
                SectionKind::Threads,
                SectionKind::CpuState,
                SectionKind::BinaryImages,
                SectionKind::ExtraInfo,
                SectionKind::Log,
            ],
            Flavor::SampledStack => &[
                SectionKind::SystemInfo,
                SectionKind::UserInfo,
                SectionKind::ApplicationInfo,
                SectionKind::StackInfo,
                SectionKind::CpuState,
                SectionKind::BinaryImages,
                SectionKind::ExtraInfo,
                SectionKind::Log,
            ],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionKind {
    SystemInfo,
    UserInfo,
    ApplicationInfo,
    Click,
    Threads,
    StackInfo,
    CpuState,
    BinaryImages,
    ExtraInfo,
    Log,
}

impl SectionKind {
    pub fn name(self) -> &'static str {
        match self {
            SectionKind::SystemInfo => "System Info",
            SectionKind::UserInfo => "User Info",
            SectionKind::ApplicationInfo => "Application Info",
            SectionKind::Click => "Click",
            SectionKind::Threads => "Threads",
            SectionKind::StackInfo => "Stack Info",
            SectionKind::CpuState => "CPU State",
            SectionKind::BinaryImages => "Binary Images",
            SectionKind::ExtraInfo => "Extra Information",
            SectionKind::Log => "MMLog",
        }
    }

    pub fn render(self, ctx: &ReportContext<'_>) -> Result<Section, SectionError> {
        match self {
            SectionKind::SystemInfo => sections::system_info(ctx),
            SectionKind::UserInfo => sections::user_info(ctx),
            SectionKind::ApplicationInfo => sections::application_info(ctx),
            SectionKind::Click => sections::click(ctx),
            SectionKind::Threads => sections::threads(ctx),
            SectionKind::StackInfo => sections::stack_info(ctx),
            SectionKind::CpuState => sections::cpu_state(ctx),
            SectionKind::BinaryImages => sections::binary_images(ctx),
            SectionKind::ExtraInfo => sections::extra_info(ctx),
            SectionKind::Log => sections::log(ctx),
        }
    }
}

/// Configuration of the rendering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderOptions {
    pub flavor: Flavor,
    /// Force instruction address masking on or off. `None` decides by platform.
    pub mask_addresses: Option<bool>,
}

impl RenderOptions {
    /// Options for the thread-listing report.
    pub fn thread_list() -> Self {
        RenderOptions {
            flavor: Flavor::ThreadList,
            mask_addresses: None,
        }
    }

    /// Options for the sampled call-tree report.
    pub fn sampled_stack() -> Self {
        RenderOptions {
            flavor: Flavor::SampledStack,
            mask_addresses: None,
        }
    }
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self::thread_list()
    }
}

/// Everything derived from a report once, before any section is rendered.
#[derive(Debug)]
pub struct ReportContext<'a> {
    pub report: &'a CrashReport,
    pub app_name: &'a str,
    pub images: ImageTable<'a>,
    pub mask: AddressMask,
    pub crashed_thread: Option<&'a Thread>,
}

impl<'a> ReportContext<'a> {
    pub fn new(report: &'a CrashReport, options: &RenderOptions) -> Self {
        let platform = Platform::from_system_name(
            report
                .system
                .as_ref()
                .and_then(|system| system.system_name.as_deref()),
        );
        let mask = match options.mask_addresses {
            Some(mask) => AddressMask::from_flag(mask),
            None => AddressMask::for_platform(platform),
        };
        ReportContext {
            report,
            app_name: report.app_name(),
            images: ImageTable::new(&report.binary_images),
            mask,
            crashed_thread: report.crashed_thread(),
        }
    }

    pub fn system(&self) -> Option<&'a SystemInfo> {
        self.report.system.as_ref()
    }

    /// The telemetry the app filed under its own name.
    pub fn app_user(&self) -> Option<&'a AppUserInfo> {
        self.report.user.as_ref()?.app.as_ref()
    }

    pub fn error(&self) -> Option<&'a ErrorInfo> {
        self.report.crash.as_ref()?.error.as_ref()
    }

    /// The architecture of the crashed binary: from its Mach-O cpu type when
    /// known, otherwise from the `cpu_arch` name.
    pub fn cpu_arch(&self) -> CpuArch {
        let system = match self.system() {
            Some(system) => system,
            None => return CpuArch::Unknown,
        };
        match system.binary_cpu_type.map(CpuArch::from_mach) {
            Some(arch) if arch != CpuArch::Unknown => arch,
            _ => system
                .cpu_arch
                .as_deref()
                .map(CpuArch::from_name)
                .unwrap_or(CpuArch::Unknown),
        }
    }

    pub fn resolver(&self, source: SymbolSource) -> BacktraceResolver<'_> {
        BacktraceResolver::new(&self.images, self.mask, source)
    }
}

/// Something that went wrong while rendering, kept apart from the output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    /// The section (or decoding stage) that produced it.
    pub origin: &'static str,
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.origin, self.message)
    }
}

/// A rendered report: unescaped text lines plus diagnostics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderedReport {
    pub lines: Vec<String>,
    pub diagnostics: Vec<Diagnostic>,
}

impl RenderedReport {
    /// Write the report, HTML-escaping every line.
    pub fn print<T: Write>(&self, f: &mut T) -> io::Result<()> {
        for line in &self.lines {
            writeln!(f, "{}", escape_html(line))?;
        }
        Ok(())
    }
}

/// Render a decoded report.
///
/// Sections that fail are left out and reported as diagnostics; the rest
/// of the report is always produced. Non-empty sections are separated by
/// a blank line.
pub fn render_report(decoded: &Decoded, options: &RenderOptions) -> RenderedReport {
    let mut rendered = RenderedReport::default();
    for error in &decoded.errors {
        rendered.diagnostics.push(Diagnostic {
            origin: "decode",
            message: error.to_string(),
        });
    }

    let ctx = ReportContext::new(&decoded.report, options);
    for kind in options.flavor.sections() {
        match kind.render(&ctx) {
            Ok(section) => {
                for warning in section.warnings {
                    rendered.diagnostics.push(Diagnostic {
                        origin: kind.name(),
                        message: warning,
                    });
                }
                if section.lines.is_empty() {
                    continue;
                }
                if !rendered.lines.is_empty() {
                    rendered.lines.push(String::new());
                }
                rendered.lines.extend(section.lines);
            }
            Err(e) => rendered.diagnostics.push(Diagnostic {
                origin: kind.name(),
                message: format!("section skipped ({}): {}", e.name(), e),
            }),
        }
    }

    for diagnostic in &rendered.diagnostics {
        warn!("{}", diagnostic);
    }
    rendered
}

/// Escape `&`, `<`, `>`, `"` and `'` for embedding in HTML.
pub fn escape_html(line: &str) -> String {
    let mut escaped = String::with_capacity(line.len());
    for c in line.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#x27;"),
            c => escaped.push(c),
        }
    }
    escaped
}
