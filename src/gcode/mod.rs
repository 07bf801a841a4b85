// src/gcode/mod.rs
pub mod parser;
pub mod translator;

pub use parser::{GCodeError, GCodeParser, GCodeSpan, Statement, Word};
pub use translator::{GCodeTranslator, TranslateError, TranslateStats};
