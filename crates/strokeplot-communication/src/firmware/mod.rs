//! Controller firmware dialects.
//!
//! Plotters driven by this crate speak the GRBL reply vocabulary: `ok`,
//! `error:N`, `ALARM:N` and free-form status text.

pub mod response_parser;

pub use response_parser::{alarm_description, error_description, Reply};
