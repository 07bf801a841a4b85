// src/gcode/translator.rs - G-code to device operation translation
use crate::config::TranslateConfig;
use crate::gcode::parser::{GCodeError, Statement};
use crate::operation::{CommandQueue, Operation};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;

#[derive(Debug, Error)]
pub enum TranslateError {
    #[error("File not found: {}", .0.display())]
    FileNotFound(PathBuf),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Line {line}: {source}")]
    Parse {
        line: usize,
        #[source]
        source: GCodeError,
    },
}

/// Counters collected while translating one input.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TranslateStats {
    pub lines: usize,
    pub ignored: usize,
    /// Positioning lines dropped for lacking X or Y.
    pub incomplete_moves: usize,
}

/// Turns G-code text into a [`CommandQueue`].
#[derive(Debug, Clone)]
pub struct GCodeTranslator {
    config: TranslateConfig,
}

impl GCodeTranslator {
    pub fn new(config: TranslateConfig) -> Self {
        Self { config }
    }

    pub async fn translate_file(&self, path: &Path) -> Result<CommandQueue, TranslateError> {
        tracing::info!("Reading G-code file: {}", path.display());
        let content = match fs::read_to_string(path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(TranslateError::FileNotFound(path.to_path_buf()));
            }
            Err(e) => return Err(e.into()),
        };
        self.translate_str(&content)
    }

    pub fn translate_str(&self, input: &str) -> Result<CommandQueue, TranslateError> {
        let (queue, stats) = self.translate_with_stats(input)?;
        tracing::info!(
            "Parsed {} lines into {} operations ({} moves)",
            stats.lines,
            queue.len(),
            queue.move_count()
        );
        if stats.incomplete_moves > 0 {
            tracing::debug!(
                "Skipped {} positioning lines without both X and Y",
                stats.incomplete_moves
            );
        }
        Ok(queue)
    }

    pub fn translate_with_stats(
        &self,
        input: &str,
    ) -> Result<(CommandQueue, TranslateStats), TranslateError> {
        let mut ops = Vec::new();
        let mut stats = TranslateStats::default();

        for (number, raw) in input.lines().enumerate() {
            stats.lines += 1;
            let line = raw.trim();

            if line.is_empty() || line.starts_with(';') {
                stats.ignored += 1;
                continue;
            }

            // Tool markers are out-of-band and win over whatever else is on the line
            if line.contains(self.config.tool_on_marker.as_str()) {
                ops.push(Operation::ToolOn);
                continue;
            }
            if line.contains(self.config.tool_off_marker.as_str()) {
                ops.push(Operation::ToolOff);
                continue;
            }
            if self.config.skip_markers.iter().any(|m| line.contains(m.as_str())) {
                stats.ignored += 1;
                continue;
            }

            let statement = Statement::parse(line).map_err(|source| TranslateError::Parse {
                line: number + 1,
                source,
            })?;

            match statement {
                Statement::Positioning { x, y, z, feed } => {
                    // Feed stands on its own; only the move needs both axes
                    if let Some(units_per_min) = feed {
                        ops.push(Operation::SetFeedrate { units_per_min });
                    }
                    let (Some(x), Some(y)) = (x, y) else {
                        stats.incomplete_moves += 1;
                        continue;
                    };
                    ops.push(self.transform(x, y, z.unwrap_or(0.0)));
                }
                Statement::Dwell { p: Some(p) } => {
                    ops.push(Operation::Wait { duration_ms: p.max(0.0).round() as u32 });
                }
                Statement::Feedrate(units_per_min) => {
                    ops.push(Operation::SetFeedrate { units_per_min });
                }
                Statement::Dwell { p: None } | Statement::Other | Statement::Empty => {
                    stats.ignored += 1;
                }
            }
        }

        Ok((CommandQueue::from_ops(ops), stats))
    }

    fn transform(&self, x: f64, y: f64, z: f64) -> Operation {
        let (x, y) = if self.config.swap_xy { (y, x) } else { (x, y) };
        let [ox, oy, oz] = self.config.offset;
        Operation::Move { x: x + ox, y: y + oy, z: z + oz }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn translator() -> GCodeTranslator {
        GCodeTranslator::new(TranslateConfig::default())
    }

    #[test]
    fn test_incomplete_moves_are_counted() {
        let (queue, stats) = translator()
            .translate_with_stats("G1 X1\nG1 Y2\nG1 Z3\n")
            .unwrap();
        assert_eq!(queue.ops(), &[Operation::ToolDisable]);
        assert_eq!(stats.incomplete_moves, 3);
    }

    #[test]
    fn test_skip_marker() {
        let queue = translator().translate_str("G28 ; Help homing\nG1 X1 Y1\n").unwrap();
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn test_parse_error_reports_line() {
        let err = translator().translate_str("G1 X1 Y1\nG1 X# Y2\n").unwrap_err();
        match err {
            TranslateError::Parse { line, .. } => assert_eq!(line, 2),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_feed_on_motion_line_precedes_move() {
        let queue = translator().translate_str("G1 X1 Y2 F1200").unwrap();
        assert_eq!(
            queue.ops(),
            &[
                Operation::SetFeedrate { units_per_min: 1200.0 },
                Operation::Move { x: 1.0, y: 2.0, z: 0.0 },
                Operation::ToolDisable,
            ]
        );
    }

    #[test]
    fn test_feed_without_axes_still_applies() {
        let (queue, stats) = translator()
            .translate_with_stats("G1 F1500\nG0 X1 F900\n")
            .unwrap();
        assert_eq!(
            queue.ops(),
            &[
                Operation::SetFeedrate { units_per_min: 1500.0 },
                Operation::SetFeedrate { units_per_min: 900.0 },
                Operation::ToolDisable,
            ]
        );
        assert_eq!(stats.incomplete_moves, 2);
    }

    #[test]
    fn test_dwell_without_p_is_ignored() {
        let (queue, stats) = translator().translate_with_stats("G4\n").unwrap();
        assert_eq!(queue.len(), 1);
        assert_eq!(stats.ignored, 1);
    }
}
