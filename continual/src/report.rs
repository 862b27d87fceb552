//! Serialisable run report written to `save_dir/report.json`.

use config::Params;
use serde::Serialize;

/// Metrics of one completed task.
#[derive(Debug, Clone, Serialize)]
pub struct TaskReport {
    pub step: usize,
    pub country: String,
    /// Mean training loss of the final epoch.
    pub train_loss: f32,
    /// Micro accuracy of the task's own probe on its validation split.
    pub val_accuracy: f32,
    /// Micro accuracy of the merged model on each seen country's test
    /// split, in visiting order.
    pub merged_accuracy: Vec<f32>,
}

/// The full run report.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub test_type: String,
    pub model_module: String,
    pub seed: u64,
    /// Echo of the run's parameters, so a report alone suffices to
    /// reproduce it.
    pub params: Params,
    /// Countries in visiting order.
    pub task_order: Vec<String>,
    pub tasks: Vec<TaskReport>,
    /// Row `t` holds the merged model's accuracy after task `t` on the
    /// test splits of tasks `0..=t`.
    pub accuracy_matrix: Vec<Vec<f32>>,
    /// Mean of the final row.
    pub average_accuracy: f32,
    /// Mean over earlier tasks of (final accuracy - accuracy right
    /// after the task was learned). Negative values mean forgetting.
    pub backward_transfer: f32,
}

impl RunReport {
    /// Derives the summary scores from the accuracy matrix.
    pub fn summarize(matrix: &[Vec<f32>]) -> (f32, f32) {
        let Some(last) = matrix.last() else {
            return (0.0, 0.0);
        };

        let average = last.iter().sum::<f32>() / last.len() as f32;

        let n = matrix.len();
        let backward = if n > 1 {
            (0..n - 1)
                .map(|t| last[t] - matrix[t][t])
                .sum::<f32>()
                / (n - 1) as f32
        } else {
            0.0
        };

        (average, backward)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_scores() {
        let matrix = vec![
            vec![0.9],
            vec![0.8, 0.9],
            vec![0.7, 0.8, 0.9],
        ];
        let (avg, bwt) = RunReport::summarize(&matrix);
        assert!((avg - 0.8).abs() < 1e-6);
        // (0.7 - 0.9 + 0.8 - 0.9) / 2
        assert!((bwt + 0.15).abs() < 1e-6);
    }

    #[test]
    fn empty_matrix_is_zero() {
        assert_eq!(RunReport::summarize(&[]), (0.0, 0.0));
    }
}
