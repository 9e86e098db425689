// Copyright 2015 Ted Mielczarek. See the COPYRIGHT
// file at the top-level directory of this distribution.

//! Attribution of backtrace frames to binary images.
//!
//! A [`BacktraceResolver`] walks a (possibly tree-shaped) list of
//! [`StackFrame`]s and pins every return address to the image that owns it,
//! producing [`ResolvedFrame`]s that know how to print themselves either as
//! an Apple-style thread backtrace line or as a sampled call-tree line.
//!
//! Nothing is symbolicated here. The only symbol information is whatever
//! the collector already attached to the frame.

use tracing::debug;

use crate::images::{basename, ImageTable};
use crate::schema::{display_value, StackFrame, MAX_FRAME_DEPTH};
use crate::system_info::Platform;

/// Low 36 bits: what remains of a return address once pointer tags are stripped.
pub const POINTER_MASK: u64 = 0x0F_FFFF_FFFF;

/// Placeholder the OS substitutes for symbols it won't disclose.
pub const REDACTED_SYMBOL: &str = "<redacted>";

/// How raw instruction addresses are cleaned up before lookup and display.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressMask {
    /// Addresses are used as reported.
    Raw,
    /// Addresses are truncated to [`POINTER_MASK`].
    Pointer36,
}

impl AddressMask {
    pub fn for_platform(platform: Platform) -> AddressMask {
        match platform {
            Platform::Desktop => AddressMask::Raw,
            Platform::Mobile => AddressMask::Pointer36,
        }
    }

    pub fn from_flag(mask: bool) -> AddressMask {
        if mask {
            AddressMask::Pointer36
        } else {
            AddressMask::Raw
        }
    }

    pub fn apply(self, address: u64) -> u64 {
        match self {
            AddressMask::Raw => address,
            AddressMask::Pointer36 => address & POINTER_MASK,
        }
    }
}

/// Where a frame list came from, which decides where its names live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolSource {
    /// `crash.threads[].backtrace`: image in `object_name`, symbol in `symbol_name`.
    ThreadBacktrace,
    /// `stack_string`: image in `image_name`, atos output in `object_name`.
    SampledStack,
}

/// Something wrong with a single frame. The rest of the backtrace is unaffected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FrameIssue {
    #[error("Frame at position {index} could not be decoded: {reason}")]
    Malformed { index: usize, reason: String },
    #[error("Frame at position {index} has no instruction address")]
    MissingAddress { index: usize },
    #[error("No binary image contains address 0x{address:016x}")]
    NoImage { address: u64 },
    #[error("Call tree nested deeper than {limit} frames, subtree dropped")]
    TooDeep { limit: usize },
}

impl FrameIssue {
    /// Returns just the name of the issue, as a more human-friendly version of
    /// an error-code for error logging.
    pub fn name(&self) -> &'static str {
        match self {
            FrameIssue::Malformed { .. } => "Malformed",
            FrameIssue::MissingAddress { .. } => "MissingAddress",
            FrameIssue::NoImage { .. } => "NoImage",
            FrameIssue::TooDeep { .. } => "TooDeep",
        }
    }
}

/// The image a frame was attributed to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameImage {
    pub short_name: String,
    pub base: u64,
    /// Lowercase uuid without hyphens.
    pub build_id: String,
}

/// A frame pinned to an image (or not), with its resolved children.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedFrame {
    /// Position among the frame's siblings that have an address.
    pub index: usize,
    /// The instruction address after masking.
    pub address: u64,
    pub image: Option<FrameImage>,
    /// Display text of the symbol. `None` for unsymbolicated frames.
    pub symbol: Option<String>,
    pub children: Vec<ResolvedFrame>,
}

impl ResolvedFrame {
    /// Distance from the image base. Negative only if an image was picked by
    /// name but loaded above the address.
    pub fn offset(&self) -> Option<i128> {
        self.image
            .as_ref()
            .map(|image| self.address as i128 - image.base as i128)
    }

    pub fn is_symbolicated(&self) -> bool {
        self.image.is_some() && self.symbol.is_some()
    }

    fn unknown_line(&self) -> String {
        format!("{:<4}{:31} 0x{:016x}", self.index, "unknown", self.address)
    }

    /// Render as a line of an Apple crash report thread backtrace.
    ///
    /// ```text
    /// 0   Demo                            0x0000000100004010 0x100000000 + 16400            (main)
    /// ```
    pub fn apple_line(&self) -> String {
        let (image, offset) = match (&self.image, self.offset()) {
            (Some(image), Some(offset)) => (image, offset),
            _ => return self.unknown_line(),
        };
        let preamble = format!(
            "{:<4}{:31} 0x{:016x}",
            self.index, image.short_name, self.address
        );
        let location = format!("0x{:04x} + {}", image.base, offset);
        match &self.symbol {
            Some(symbol) => format!("{preamble} {location:30} ({symbol})"),
            None => format!("{preamble} {location}"),
        }
    }

    /// Render as a line of a sampled call tree (without indentation).
    ///
    /// ```text
    /// 12 -[Foo bar] (Demo + 16400) [0x0000000100004010]
    /// ```
    pub fn stack_line(&self) -> String {
        let (image, offset) = match (&self.image, self.offset()) {
            (Some(image), Some(offset)) => (image, offset),
            _ => return self.unknown_line(),
        };
        match &self.symbol {
            // The symbol text already names the image and opens the paren.
            Some(symbol)
                if !image.short_name.is_empty() && symbol.contains(&image.short_name) =>
            {
                format!("{symbol} + {offset}) [0x{:016x}]", self.address)
            }
            Some(symbol) => format!(
                "{symbol} ({} + {offset}) [0x{:016x}]",
                image.short_name, self.address
            ),
            None => format!(
                "({} + {offset}) [0x{:016x}]",
                image.short_name, self.address
            ),
        }
    }
}

/// The result of resolving one frame list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedBacktrace {
    pub frames: Vec<ResolvedFrame>,
    pub issues: Vec<FrameIssue>,
}

impl ResolvedBacktrace {
    /// Apple-style lines for every frame, children following their parent.
    pub fn apple_lines(&self) -> Vec<String> {
        let mut lines = Vec::new();
        walk(&self.frames, 0, &mut |frame, _| lines.push(frame.apple_line()));
        lines
    }

    /// Call-tree lines: four spaces for top-level frames, two more per level.
    pub fn stack_lines(&self) -> Vec<String> {
        let mut lines = Vec::new();
        walk(&self.frames, 0, &mut |frame, depth| {
            let indent = 4 + 2 * depth;
            lines.push(format!("{:indent$}{}", "", frame.stack_line()));
        });
        lines
    }
}

fn walk<'a, F>(frames: &'a [ResolvedFrame], depth: usize, visit: &mut F)
where
    F: FnMut(&'a ResolvedFrame, usize),
{
    for frame in frames {
        visit(frame, depth);
        walk(&frame.children, depth + 1, visit);
    }
}

/// Strip atos decorations: `"-[Foo bar] (in Demo)"` becomes `"-[Foo bar] (Demo"`.
///
/// The trailing paren is left open for [`ResolvedFrame::stack_line`] to close.
pub fn clean_atos_symbol(symbol: &str) -> String {
    let symbol = symbol.replace("(in ", "(");
    match symbol.strip_suffix(')') {
        Some(stripped) => stripped.to_owned(),
        None => symbol,
    }
}

/// Resolves frame lists against the images of one report.
#[derive(Debug, Clone, Copy)]
pub struct BacktraceResolver<'a> {
    images: &'a ImageTable<'a>,
    mask: AddressMask,
    source: SymbolSource,
}

impl<'a> BacktraceResolver<'a> {
    pub fn new(images: &'a ImageTable<'a>, mask: AddressMask, source: SymbolSource) -> Self {
        BacktraceResolver {
            images,
            mask,
            source,
        }
    }

    pub fn resolve(&self, frames: &[StackFrame]) -> ResolvedBacktrace {
        let mut issues = Vec::new();
        let frames = self.resolve_level(frames, 0, &mut issues);
        ResolvedBacktrace { frames, issues }
    }

    fn resolve_level(
        &self,
        frames: &[StackFrame],
        depth: usize,
        issues: &mut Vec<FrameIssue>,
    ) -> Vec<ResolvedFrame> {
        let mut resolved = Vec::with_capacity(frames.len());
        for (position, frame) in frames.iter().enumerate() {
            if let Some(reason) = &frame.malformed {
                debug!("skipping frame {position}: {reason}");
                issues.push(FrameIssue::Malformed {
                    index: position,
                    reason: reason.clone(),
                });
                continue;
            }
            let address = match frame.instruction_address {
                Some(address) => self.mask.apply(address),
                None => {
                    debug!("skipping frame {position}: no instruction address");
                    issues.push(FrameIssue::MissingAddress { index: position });
                    continue;
                }
            };

            let image = self
                .images
                .lookup(self.image_hint(frame), address)
                .map(|image| FrameImage {
                    short_name: image.short_name().to_owned(),
                    base: image.image_addr,
                    build_id: image.build_id(),
                });
            if image.is_none() {
                debug!("no image found for 0x{address:016x}");
                issues.push(FrameIssue::NoImage { address });
            }

            let children = if frame.truncated {
                issues.push(FrameIssue::TooDeep {
                    limit: MAX_FRAME_DEPTH,
                });
                Vec::new()
            } else if frame.child.is_empty() {
                Vec::new()
            } else if depth + 1 >= MAX_FRAME_DEPTH {
                issues.push(FrameIssue::TooDeep {
                    limit: MAX_FRAME_DEPTH,
                });
                Vec::new()
            } else {
                self.resolve_level(&frame.child, depth + 1, issues)
            };

            resolved.push(ResolvedFrame {
                index: resolved.len(),
                address,
                image,
                symbol: self.symbol_text(frame),
                children,
            });
        }
        resolved
    }

    fn image_hint<'f>(&self, frame: &'f StackFrame) -> Option<&'f str> {
        let hint = match self.source {
            SymbolSource::ThreadBacktrace => {
                frame.image_name.as_deref().or(frame.object_name.as_deref())
            }
            SymbolSource::SampledStack => frame.image_name.as_deref(),
        };
        hint.map(basename).filter(|name| !name.is_empty())
    }

    fn symbol_text(&self, frame: &StackFrame) -> Option<String> {
        let raw = match self.source {
            SymbolSource::ThreadBacktrace => frame.symbol_name.as_deref(),
            SymbolSource::SampledStack => {
                frame.object_name.as_deref().or(frame.symbol_name.as_deref())
            }
        }?;
        if raw.is_empty() || raw == REDACTED_SYMBOL {
            return None;
        }
        match self.source {
            SymbolSource::ThreadBacktrace => Some(raw.to_owned()),
            SymbolSource::SampledStack => {
                let symbol = clean_atos_symbol(raw);
                match frame.sample.as_ref().map(display_value) {
                    Some(sample) if !sample.is_empty() => Some(format!("{sample} {symbol}")),
                    _ => Some(symbol),
                }
            }
        }
    }
}
