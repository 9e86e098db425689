// Copyright 2015 Ted Mielczarek. See the COPYRIGHT
// file at the top-level directory of this distribution.

//! A library for turning KSCrash JSON crash reports into Apple-style crash text.
//!
//! Reports are decoded with [`CrashReport::from_value`], one top-level block at
//! a time, so a report with a damaged `crash` block still renders its system
//! and image information. [`render_report`] then produces the text lines of one
//! report, and [`convert_path`] does the whole job for a file, including
//! batches of reports stored as a JSON array.
//!
//! No symbolication happens here: every frame is attributed to the binary image
//! that contains it, and printed as an offset from that image's load address.
//!
//! [`CrashReport::from_value`]: struct.CrashReport.html#method.from_value
//! [`render_report`]: fn.render_report.html
//! [`convert_path`]: fn.convert_path.html

mod images;
mod processor;
mod render;
mod resolver;
mod schema;
pub mod sections;
mod system_info;

pub use images::*;
pub use processor::*;
pub use render::*;
pub use resolver::*;
pub use schema::*;
pub use system_info::*;
