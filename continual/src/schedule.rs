//! Task visiting order derived from the configured permutation.

use crate::{Result, RunError};

/// One task of the schedule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
    /// Position in the visiting order.
    pub step: usize,
    /// Index into the configured country list.
    pub country_idx: usize,
    pub country: String,
}

/// The resolved visiting order over countries.
#[derive(Debug, Clone)]
pub struct TaskSchedule {
    tasks: Vec<Task>,
}

impl TaskSchedule {
    /// Resolves `permutation` against `countries`.
    ///
    /// The configuration layer already validates the permutation; the
    /// bounds are re-checked here so the schedule is safe on its own.
    ///
    /// # Errors
    /// Returns `RunError::BadTaskIndex` on an out-of-range index.
    pub fn new(countries: &[String], permutation: &[usize]) -> Result<Self> {
        let tasks = permutation
            .iter()
            .enumerate()
            .map(|(step, &country_idx)| {
                let country = countries.get(country_idx).ok_or(RunError::BadTaskIndex {
                    index: country_idx,
                    countries: countries.len(),
                })?;
                Ok(Task {
                    step,
                    country_idx,
                    country: country.clone(),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { tasks })
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}
