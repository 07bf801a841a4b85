//! Line-oriented G-code tokenizer and statement classifier
//! Provides span tracking so translation errors can point at the offending text

use std::ops::Range;
use thiserror::Error;

/// Span in the original line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GCodeSpan {
    pub range: Range<usize>,
}

/// A single address word such as `G1` or `X10.5`
#[derive(Debug, Clone, PartialEq)]
pub struct Word {
    pub letter: char,
    pub value: f64,
    pub span: GCodeSpan,
}

/// Tokenizer error with span info
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{message} (at {span:?})")]
pub struct GCodeError {
    pub message: String,
    pub span: GCodeSpan,
}

/// Word scanner over a single line
pub struct GCodeParser<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> GCodeParser<'a> {
    pub fn new(src: &'a str) -> Self {
        Self { src, pos: 0 }
    }

    /// Parses the next word, skipping whitespace and comments
    pub fn next_word(&mut self) -> Option<Result<Word, GCodeError>> {
        let bytes = self.src.as_bytes();
        let len = bytes.len();
        loop {
            while self.pos < len && bytes[self.pos].is_ascii_whitespace() {
                self.pos += 1;
            }
            if self.pos >= len {
                return None;
            }
            let start = self.pos;
            let c = bytes[self.pos] as char;
            match c {
                // Line comment or checksum: nothing after it is motion
                ';' | '*' => {
                    self.pos = len;
                    return None;
                }
                '(' => {
                    match self.src[start..].find(')') {
                        Some(end) => self.pos = start + end + 1,
                        None => {
                            self.pos = len;
                            return Some(Err(GCodeError {
                                message: "Unclosed comment".to_string(),
                                span: GCodeSpan { range: start..len },
                            }));
                        }
                    }
                }
                // Program delimiter
                '%' => self.pos += 1,
                c if c.is_ascii_alphabetic() => {
                    let letter = c.to_ascii_uppercase();
                    self.pos += 1;
                    while self.pos < len && bytes[self.pos] == b' ' {
                        self.pos += 1;
                    }
                    let value_start = self.pos;
                    while self.pos < len
                        && (bytes[self.pos].is_ascii_digit()
                            || bytes[self.pos] == b'.'
                            || bytes[self.pos] == b'-'
                            || bytes[self.pos] == b'+')
                    {
                        self.pos += 1;
                    }
                    let raw = &self.src[value_start..self.pos];
                    let span = GCodeSpan { range: start..self.pos };
                    return Some(match raw.parse::<f64>() {
                        Ok(value) => Ok(Word { letter, value, span }),
                        Err(_) => Err(GCodeError {
                            message: format!("Invalid value for word '{}': '{}'", letter, raw),
                            span,
                        }),
                    });
                }
                _ => {
                    let err_span = GCodeSpan { range: start..start + c.len_utf8() };
                    // Skip to next whitespace to avoid looping on the same byte
                    while self.pos < len && !bytes[self.pos].is_ascii_whitespace() {
                        self.pos += 1;
                    }
                    return Some(Err(GCodeError {
                        message: format!("Unexpected character: {}", c),
                        span: err_span,
                    }));
                }
            }
        }
    }

    /// Collects every word on the line, stopping at the first error
    pub fn words(mut self) -> Result<Vec<Word>, GCodeError> {
        let mut words = Vec::new();
        while let Some(word) = self.next_word() {
            words.push(word?);
        }
        Ok(words)
    }
}

/// What a single line asks the machine to do
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    /// `G0` / `G1` with whichever axis words were present
    Positioning {
        x: Option<f64>,
        y: Option<f64>,
        z: Option<f64>,
        feed: Option<f64>,
    },
    /// `G4`, `p` in milliseconds
    Dwell { p: Option<f64> },
    /// A bare `F` word
    Feedrate(f64),
    /// Recognized syntax with no device meaning here (units, M-codes, ...)
    Other,
    /// Nothing but whitespace or comments
    Empty,
}

impl Statement {
    pub fn parse(line: &str) -> Result<Self, GCodeError> {
        let mut words = Vec::new();
        let mut parser = GCodeParser::new(line);
        while let Some(word) = parser.next_word() {
            match word {
                Ok(word) => words.push(word),
                // Free text after a non-motion command, e.g. `M117 Printing`
                Err(_) if has_command(&words) && motion_code(&words).is_none() => {
                    return Ok(Statement::Other);
                }
                Err(e) => return Err(e),
            }
        }
        if words.is_empty() {
            return Ok(Statement::Empty);
        }

        let param = |letter: char| {
            words
                .iter()
                .find(|w| w.letter == letter)
                .map(|w| w.value)
        };

        Ok(match motion_code(&words) {
            Some(code) if code == 4.0 => Statement::Dwell { p: param('P') },
            Some(_) => Statement::Positioning {
                x: param('X'),
                y: param('Y'),
                z: param('Z'),
                feed: param('F'),
            },
            None if has_command(&words) => Statement::Other,
            None => match param('F') {
                Some(feed) => Statement::Feedrate(feed),
                None => Statement::Other,
            },
        })
    }
}

fn has_command(words: &[Word]) -> bool {
    words.iter().any(|w| w.letter == 'G' || w.letter == 'M')
}

/// The line's G0, G1 or G4 word, wherever it sits among modal words like `G90`.
fn motion_code(words: &[Word]) -> Option<f64> {
    words
        .iter()
        .filter(|w| w.letter == 'G')
        .map(|w| w.value)
        .find(|&v| v == 0.0 || v == 1.0 || v == 4.0)
}
