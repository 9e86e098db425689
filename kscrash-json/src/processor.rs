// Copyright 2015 Ted Mielczarek. See the COPYRIGHT
// file at the top-level directory of this distribution.

//! Converting whole input documents, one report or a batch of them.

use std::fs::File;
use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::render::{render_report, Diagnostic, RenderOptions};
use crate::schema::{CrashReport, MAX_FRAME_DEPTH};

/// The deepest nesting of arrays and objects accepted in an input document.
///
/// A call tree nests two levels per frame, so this leaves room for trees well
/// past [`MAX_FRAME_DEPTH`]; those are truncated rather than rejected.
pub const MAX_JSON_DEPTH: usize = 4 * MAX_FRAME_DEPTH;

/// An error that stops the conversion of an entire input.
#[derive(Debug, thiserror::Error)]
pub enum ConvertError {
    #[error("Couldn't read input file {}: {source}", .path.display())]
    Read { path: PathBuf, source: io::Error },
    #[error("Failed to read input: {0}")]
    Input(io::Error),
    #[error("Input is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Input nests {depth} levels deep, more than the {limit} allowed")]
    TooDeep { depth: usize, limit: usize },
    #[error("Couldn't create output file {}: {source}", .path.display())]
    Create { path: PathBuf, source: io::Error },
    #[error("Failed to write output: {0}")]
    Write(#[from] io::Error),
}

impl ConvertError {
    /// Returns just the name of the error, as a more human-friendly version of
    /// an error-code for error logging.
    pub fn name(&self) -> &'static str {
        match self {
            ConvertError::Read { .. } => "Read",
            ConvertError::Input(_) => "Input",
            ConvertError::Json(_) => "Json",
            ConvertError::TooDeep { .. } => "TooDeep",
            ConvertError::Create { .. } => "Create",
            ConvertError::Write(_) => "Write",
        }
    }
}

/// What happened to the reports of one input.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConversionSummary {
    /// Reports written to the output.
    pub rendered: usize,
    /// Reports that could not be decoded at all.
    pub failed: usize,
    pub diagnostics: Vec<Diagnostic>,
}

/// Convert an already parsed document: a single report, or an array of them.
///
/// Each report of a batch is rendered on its own. A report that can't be
/// decoded is skipped and counted, and the batch carries on.
pub fn convert_value<W: Write>(
    value: Value,
    options: &RenderOptions,
    out: &mut W,
) -> Result<ConversionSummary, ConvertError> {
    let reports = match value {
        Value::Array(reports) => reports,
        report => vec![report],
    };
    debug!("converting {} report(s)", reports.len());

    let mut summary = ConversionSummary::default();
    for (index, report) in reports.into_iter().enumerate() {
        let decoded = match CrashReport::from_value(report) {
            Ok(decoded) => decoded,
            Err(e) => {
                warn!("report #{index} skipped: {e}");
                summary.failed += 1;
                summary.diagnostics.push(Diagnostic {
                    origin: "decode",
                    message: format!("report #{index}: {e}"),
                });
                continue;
            }
        };

        let rendered = render_report(&decoded, options);
        if summary.rendered > 0 {
            writeln!(out)?;
        }
        rendered.print(out)?;
        summary.rendered += 1;
        summary.diagnostics.extend(rendered.diagnostics);
    }
    Ok(summary)
}

pub fn convert_str<W: Write>(
    input: &str,
    options: &RenderOptions,
    out: &mut W,
) -> Result<ConversionSummary, ConvertError> {
    convert_value(parse_document(input.as_bytes())?, options, out)
}

pub fn convert_reader<R: Read, W: Write>(
    mut input: R,
    options: &RenderOptions,
    out: &mut W,
) -> Result<ConversionSummary, ConvertError> {
    let mut bytes = Vec::new();
    input
        .read_to_end(&mut bytes)
        .map_err(ConvertError::Input)?;
    convert_value(parse_document(&bytes)?, options, out)
}

/// Parse a whole input document.
///
/// serde_json's own recursion limit would reject call trees a few dozen
/// frames deep, so it is replaced by [`MAX_JSON_DEPTH`], checked up front.
pub fn parse_document(bytes: &[u8]) -> Result<Value, ConvertError> {
    let depth = nesting_depth(bytes);
    if depth > MAX_JSON_DEPTH {
        return Err(ConvertError::TooDeep {
            depth,
            limit: MAX_JSON_DEPTH,
        });
    }
    let mut de = serde_json::Deserializer::from_slice(bytes);
    de.disable_recursion_limit();
    let value = Value::deserialize(&mut de)?;
    de.end()?;
    Ok(value)
}

/// How deeply arrays and objects nest, ignoring brackets inside strings.
fn nesting_depth(bytes: &[u8]) -> usize {
    let mut depth = 0usize;
    let mut deepest = 0;
    let mut in_string = false;
    let mut escaped = false;
    for &byte in bytes {
        if in_string {
            match byte {
                _ if escaped => escaped = false,
                b'\\' => escaped = true,
                b'"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match byte {
            b'"' => in_string = true,
            b'[' | b'{' => {
                depth += 1;
                deepest = deepest.max(depth);
            }
            b']' | b'}' => depth = depth.saturating_sub(1),
            _ => {}
        }
    }
    deepest
}

/// Convert the file at `input` into a new file at `output`.
///
/// The output file is only created once the input has been read and parsed.
pub fn convert_path(
    input: &Path,
    output: &Path,
    options: &RenderOptions,
) -> Result<ConversionSummary, ConvertError> {
    let bytes = std::fs::read(input).map_err(|source| ConvertError::Read {
        path: input.to_owned(),
        source,
    })?;
    let value = parse_document(&bytes)?;

    let file = File::create(output).map_err(|source| ConvertError::Create {
        path: output.to_owned(),
        source,
    })?;
    let mut out = BufWriter::new(file);
    let summary = convert_value(value, options, &mut out)?;
    out.flush()?;
    Ok(summary)
}
