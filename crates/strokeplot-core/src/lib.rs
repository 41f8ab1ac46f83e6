//! # strokeplot Core
//!
//! Core types and the error taxonomy shared by every strokeplot crate.
//! Provides the stroke font data model, the immutable plot program handed
//! from the compiler to the streamer, and scale handling.

pub mod data;
pub mod error;
pub mod units;

pub use data::{Glyph, PenState, PlotCommand, PlotProgram, ReadyMatch, Stroke};

pub use error::{ConnectionError, Error, FontError, LayoutError, ProtocolError, Result};

pub use units::{Scale, TextHeight, NATIVE_FONT_HEIGHT};
