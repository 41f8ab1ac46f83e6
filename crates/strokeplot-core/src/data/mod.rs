//! Data models for stroke glyphs and plot programs.
//!
//! Glyph strokes are relative offsets in native font units. Plot commands are
//! absolute device positions produced by the motion compiler.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Pen state applied after a move
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PenState {
    /// Pen lifted, travel only
    Up,
    /// Pen lowered, drawing
    Down,
}

impl PenState {
    /// Map a font pen flag (0 = up, 1 = down)
    pub fn from_flag(flag: i32) -> Option<Self> {
        match flag {
            0 => Some(Self::Up),
            1 => Some(Self::Down),
            _ => None,
        }
    }

    /// Check if the pen is drawing
    pub fn is_down(self) -> bool {
        self == Self::Down
    }
}

impl fmt::Display for PenState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Up => write!(f, "up"),
            Self::Down => write!(f, "down"),
        }
    }
}

/// How a boot line is compared with the controller's ready token
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReadyMatch {
    /// The trimmed line must equal the token
    #[default]
    Exact,
    /// The line must contain the token anywhere (e.g. `Grbl 1.1h ['$' for help]`)
    Contains,
}

impl ReadyMatch {
    /// Check a received line against the token
    pub fn matches(self, line: &str, token: &str) -> bool {
        match self {
            Self::Exact => line.trim() == token,
            Self::Contains => line.contains(token),
        }
    }
}

/// A relative offset within a glyph plus the pen state to apply after moving
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Stroke {
    /// X offset in native font units
    pub dx: i32,
    /// Y offset in native font units
    pub dy: i32,
    /// Pen state after the move
    pub pen: PenState,
}

impl Stroke {
    /// Create a new stroke
    pub fn new(dx: i32, dy: i32, pen: PenState) -> Self {
        Self { dx, dy, pen }
    }
}

/// The ordered strokes that draw one character
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Glyph {
    code: u32,
    strokes: Vec<Stroke>,
}

impl Glyph {
    /// Create a glyph for a character code
    pub fn new(code: u32, strokes: Vec<Stroke>) -> Self {
        Self { code, strokes }
    }

    /// Character code this glyph draws
    pub fn code(&self) -> u32 {
        self.code
    }

    /// Strokes in drawing order
    pub fn strokes(&self) -> &[Stroke] {
        &self.strokes
    }

    /// Number of strokes
    pub fn len(&self) -> usize {
        self.strokes.len()
    }

    /// Check if the glyph draws nothing
    pub fn is_empty(&self) -> bool {
        self.strokes.is_empty()
    }
}

/// An absolute plotter position and pen state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PlotCommand {
    /// X position in device units
    pub x: i32,
    /// Y position in device units
    pub y: i32,
    /// Pen state at this position
    pub pen: PenState,
}

impl PlotCommand {
    /// Create a new command
    pub fn new(x: i32, y: i32, pen: PenState) -> Self {
        Self { x, y, pen }
    }
}

impl fmt::Display for PlotCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}) pen {}", self.x, self.y, self.pen)
    }
}

/// The full ordered sequence of absolute motion commands for one run
///
/// Insertion order is execution order. A program is built once and then
/// moved, whole, to whoever consumes it; there is no way to edit it in place.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlotProgram {
    commands: Vec<PlotCommand>,
}

impl PlotProgram {
    /// Commands in execution order
    pub fn commands(&self) -> &[PlotCommand] {
        &self.commands
    }

    /// Iterate commands in execution order
    pub fn iter(&self) -> std::slice::Iter<'_, PlotCommand> {
        self.commands.iter()
    }

    /// Number of commands
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// Check if the program is empty
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Number of pen-down commands
    pub fn drawing_moves(&self) -> usize {
        self.commands.iter().filter(|c| c.pen.is_down()).count()
    }
}

impl From<Vec<PlotCommand>> for PlotProgram {
    fn from(commands: Vec<PlotCommand>) -> Self {
        Self { commands }
    }
}

impl FromIterator<PlotCommand> for PlotProgram {
    fn from_iter<I: IntoIterator<Item = PlotCommand>>(iter: I) -> Self {
        Self {
            commands: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for PlotProgram {
    type Item = PlotCommand;
    type IntoIter = std::vec::IntoIter<PlotCommand>;

    fn into_iter(self) -> Self::IntoIter {
        self.commands.into_iter()
    }
}

impl<'a> IntoIterator for &'a PlotProgram {
    type Item = &'a PlotCommand;
    type IntoIter = std::slice::Iter<'a, PlotCommand>;

    fn into_iter(self) -> Self::IntoIter {
        self.commands.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pen_flag_mapping() {
        assert_eq!(PenState::from_flag(0), Some(PenState::Up));
        assert_eq!(PenState::from_flag(1), Some(PenState::Down));
        assert_eq!(PenState::from_flag(2), None);
        assert_eq!(PenState::from_flag(-1), None);
    }

    #[test]
    fn test_ready_match() {
        assert!(ReadyMatch::Exact.matches("$\r", "$"));
        assert!(!ReadyMatch::Exact.matches("Grbl 1.1h ['$' for help]", "$"));
        assert!(ReadyMatch::Contains.matches("Grbl 1.1h ['$' for help]", "$"));
        assert!(!ReadyMatch::Contains.matches("ok", "$"));
    }

    #[test]
    fn test_program_preserves_order() {
        let program: PlotProgram = vec![
            PlotCommand::new(5, 5, PenState::Up),
            PlotCommand::new(0, 0, PenState::Down),
            PlotCommand::new(5, 5, PenState::Up),
        ]
        .into();

        assert_eq!(program.len(), 3);
        assert_eq!(program.drawing_moves(), 1);
        let xs: Vec<i32> = program.iter().map(|c| c.x).collect();
        assert_eq!(xs, vec![5, 0, 5]);
    }

    #[test]
    fn test_program_serializes_as_array() {
        let program: PlotProgram = vec![PlotCommand::new(1, -2, PenState::Down)].into();
        let json = serde_json::to_string(&program).unwrap();
        assert_eq!(json, r#"[{"x":1,"y":-2,"pen":"down"}]"#);
    }
}
