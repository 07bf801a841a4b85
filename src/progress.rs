// src/progress.rs - Job progress reporting
use crate::operation::Operation;

/// Receives the full job and the number of operations executed so far,
/// once per drained batch.
pub trait ProgressSink: Send {
    fn render(&mut self, sequence: &[Operation], progress_index: usize);
}

/// Discards progress.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn render(&mut self, _sequence: &[Operation], _progress_index: usize) {}
}

/// Logs percentage complete and pen strokes drawn.
#[derive(Debug, Default)]
pub struct LogProgress {
    total_strokes: Option<usize>,
}

impl LogProgress {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ProgressSink for LogProgress {
    fn render(&mut self, sequence: &[Operation], progress_index: usize) {
        let total = *self.total_strokes.get_or_insert_with(|| count_strokes(sequence));
        let done = count_strokes(&sequence[..progress_index.min(sequence.len())]);
        let percent = if sequence.is_empty() {
            100.0
        } else {
            progress_index as f64 / sequence.len() as f64 * 100.0
        };
        tracing::info!(
            "Progress: {}/{} operations ({:.0}%), {}/{} strokes",
            progress_index,
            sequence.len(),
            percent,
            done,
            total
        );
    }
}

/// Counts pen-down strokes: runs of moves while the tool is on.
///
/// A stroke starts at the first move after `ToolOn` and ends at the next
/// operation that lifts the pen.
pub fn count_strokes(sequence: &[Operation]) -> usize {
    let mut strokes = 0;
    let mut pen_down = false;
    let mut drawing = false;
    for op in sequence {
        match op {
            Operation::ToolOn => pen_down = true,
            Operation::Move { .. } if pen_down && !drawing => {
                drawing = true;
                strokes += 1;
            }
            op if op.lifts_pen() => {
                pen_down = false;
                drawing = false;
            }
            _ => {}
        }
    }
    strokes
}
