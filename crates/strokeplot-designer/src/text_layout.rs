//! Text layout: compiles lines of text into a plot program.
//!
//! Characters sit on a fixed grid. Each column advances X by the scaled
//! character advance and each line moves Y down by the scaled line advance,
//! with the first line at Y=0. Commands are emitted in line, then character,
//! then stroke order and never reordered afterwards.

use crate::glyph_store::GlyphStore;
use strokeplot_core::{PlotCommand, PlotProgram, Scale};

/// Grid spacing in native font units
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayoutMetrics {
    /// Horizontal advance per character
    pub char_advance: i32,
    /// Vertical advance per line
    pub line_advance: i32,
}

impl Default for LayoutMetrics {
    fn default() -> Self {
        Self {
            char_advance: 20,
            line_advance: 25,
        }
    }
}

/// Compiles text into absolute plotter commands
pub struct MotionCompiler<'a> {
    glyphs: &'a GlyphStore,
    scale: Scale,
    metrics: LayoutMetrics,
}

impl<'a> MotionCompiler<'a> {
    /// Creates a compiler over a glyph store at the given scale.
    pub fn new(glyphs: &'a GlyphStore, scale: Scale) -> Self {
        Self {
            glyphs,
            scale,
            metrics: LayoutMetrics::default(),
        }
    }

    /// Overrides the grid spacing.
    pub fn with_metrics(mut self, metrics: LayoutMetrics) -> Self {
        self.metrics = metrics;
        self
    }

    /// Scale applied to every stroke.
    pub fn scale(&self) -> Scale {
        self.scale
    }

    /// Device units between character origins on a line.
    pub fn horizontal_advance(&self) -> i32 {
        self.scale.apply(self.metrics.char_advance)
    }

    /// Device units between line origins.
    pub fn vertical_advance(&self) -> i32 {
        self.scale.apply(self.metrics.line_advance)
    }

    /// Compiles every line into one program.
    ///
    /// Characters without a glyph produce no commands but still take up
    /// their column.
    pub fn compile<I, S>(&self, lines: I) -> PlotProgram
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut commands = Vec::new();
        let mut line_count = 0;
        let mut misses = 0;

        for (line_index, line) in lines.into_iter().enumerate() {
            misses += self.compile_line(line_index, line.as_ref(), &mut commands);
            line_count += 1;
        }

        tracing::info!(
            "Compiled {} line(s) into {} command(s) at scale {} ({} character(s) without a glyph)",
            line_count,
            commands.len(),
            self.scale,
            misses
        );

        PlotProgram::from(commands)
    }

    /// Compiles a block of text, one program line per text line.
    pub fn compile_text(&self, text: &str) -> PlotProgram {
        self.compile(text.lines())
    }

    /// Appends the commands for one line, returning the number of glyph misses.
    fn compile_line(&self, line_index: usize, text: &str, out: &mut Vec<PlotCommand>) -> usize {
        let advance_x = self.horizontal_advance();
        let origin_y = -(line_index as i32).saturating_mul(self.vertical_advance());
        let mut misses = 0;

        for (column, ch) in text.chars().enumerate() {
            let origin_x = (column as i32).saturating_mul(advance_x);

            let Some(glyph) = self.glyphs.lookup_char(ch) else {
                tracing::debug!(
                    "No glyph for {:?} (code {}) on line {}, skipping",
                    ch,
                    u32::from(ch),
                    line_index + 1
                );
                misses += 1;
                continue;
            };

            out.extend(glyph.strokes().iter().map(|stroke| {
                PlotCommand::new(
                    origin_x.saturating_add(self.scale.apply(stroke.dx)),
                    origin_y.saturating_add(self.scale.apply(stroke.dy)),
                    stroke.pen,
                )
            }));
        }

        misses
    }
}
