//! # strokeplot Designer
//!
//! Turns text into plotter motion.
//!
//! - **Glyph store**: one-time load of the single-stroke font into an index
//! - **Text layout**: compiles lines of text into an ordered plot program
//! - **G-code generation**: renders plot commands into controller lines

pub mod gcode_gen;
pub mod glyph_store;
pub mod text_layout;

pub use gcode_gen::GcodeEncoder;
pub use glyph_store::GlyphStore;
pub use text_layout::{LayoutMetrics, MotionCompiler};
