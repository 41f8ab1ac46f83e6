//! G-code generation from plot programs.
//!
//! Every plot command becomes two lines: a spindle/laser power line that
//! raises or lowers the pen, then a move. The feed rate is modal and set
//! once by the home line, so linear moves only carry X and Y.

use strokeplot_core::{PenState, PlotCommand, PlotProgram};

/// Default feed rate for the home move (units/min)
pub const DEFAULT_FEED_RATE: u32 = 1000;

/// Default S value that lowers the pen
pub const DEFAULT_POWER_ON: u32 = 1000;

/// Renders plot commands as controller lines
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GcodeEncoder {
    feed_rate: u32,
    power_on: u32,
}

impl GcodeEncoder {
    /// Creates an encoder with a feed rate and pen-down power value.
    pub fn new(feed_rate: u32, power_on: u32) -> Self {
        Self {
            feed_rate,
            power_on,
        }
    }

    /// Move to the origin and set the feed rate.
    pub fn home_line(&self) -> String {
        format!("G1 X0 Y0 F{}", self.feed_rate)
    }

    /// Enable the pen actuator.
    pub fn tool_enable_line(&self) -> String {
        "M3".to_string()
    }

    /// Lower the pen.
    pub fn power_on_line(&self) -> String {
        format!("S{}", self.power_on)
    }

    /// Lift the pen.
    pub fn power_off_line(&self) -> String {
        "S0".to_string()
    }

    /// Non-drawing travel move.
    pub fn rapid_move_line(&self, x: i32, y: i32) -> String {
        format!("G0 X{} Y{}", x, y)
    }

    /// Drawing move at the modal feed rate.
    pub fn linear_move_line(&self, x: i32, y: i32) -> String {
        format!("G1 X{} Y{}", x, y)
    }

    /// Lines sent once the controller is ready, in order.
    pub fn startup_lines(&self) -> [String; 3] {
        [
            self.home_line(),
            self.tool_enable_line(),
            self.power_off_line(),
        ]
    }

    /// Lines for a single plot command, in order.
    pub fn encode(&self, command: &PlotCommand) -> [String; 2] {
        match command.pen {
            PenState::Down => [
                self.power_on_line(),
                self.linear_move_line(command.x, command.y),
            ],
            PenState::Up => [
                self.power_off_line(),
                self.rapid_move_line(command.x, command.y),
            ],
        }
    }

    /// Every line of a program, startup lines first.
    pub fn lines<'a>(&'a self, program: &'a PlotProgram) -> impl Iterator<Item = String> + 'a {
        self.startup_lines()
            .into_iter()
            .chain(program.iter().flat_map(move |command| self.encode(command)))
    }

    /// Renders a whole program as newline-terminated G-code.
    pub fn render_program(&self, program: &PlotProgram) -> String {
        let mut gcode = String::new();
        for line in self.lines(program) {
            gcode.push_str(&line);
            gcode.push('\n');
        }
        gcode
    }
}

impl Default for GcodeEncoder {
    fn default() -> Self {
        Self::new(DEFAULT_FEED_RATE, DEFAULT_POWER_ON)
    }
}
