use crate::utils::errors::{ForecastError, Result};

/// Elementwise mean of a batch of paths.
pub type AveragePath = Vec<f64>;

/// Running elementwise mean of equal-length paths.
///
/// Paths are folded in as they are produced and never kept. Each element is
/// updated as `mean += (x - mean) / k`, so a batch of identical paths
/// averages back to exactly that path.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchAverager {
    means: Vec<f64>,
    added: usize,
}

impl BatchAverager {
    pub fn new(step_count: usize) -> Self {
        Self {
            means: vec![0.0; step_count],
            added: 0,
        }
    }

    pub fn step_count(&self) -> usize {
        self.means.len()
    }

    pub fn added(&self) -> usize {
        self.added
    }

    pub fn add(&mut self, path: &[f64]) -> Result<()> {
        if path.len() != self.means.len() {
            return Err(ForecastError::SimulationError(format!(
                "path of length {} does not match batch length {}",
                path.len(),
                self.means.len()
            )));
        }
        self.added += 1;
        let k = self.added as f64;
        self.means
            .iter_mut()
            .zip(path)
            .for_each(|(mean, value)| *mean += (value - *mean) / k);
        Ok(())
    }

    /// `count` must equal the number of paths added.
    pub fn finish(self, count: usize) -> Result<AveragePath> {
        if count == 0 {
            return Err(ForecastError::EmptyBatchError);
        }
        if count != self.added {
            return Err(ForecastError::InvalidParameterError(format!(
                "batch count {} does not match {} paths added",
                count, self.added
            )));
        }
        Ok(self.means)
    }
}

/// Elementwise mean `result[k] = Σ paths[j][k] / count`; `count` must equal
/// `paths.len()`.
pub fn average<P: AsRef<[f64]>>(paths: &[P], count: usize) -> Result<AveragePath> {
    if count == 0 {
        return Err(ForecastError::EmptyBatchError);
    }
    if count != paths.len() {
        return Err(ForecastError::InvalidParameterError(format!(
            "batch count {} does not match {} paths",
            count,
            paths.len()
        )));
    }
    let first = paths.first().ok_or(ForecastError::EmptyBatchError)?;
    let mut averager = BatchAverager::new(first.as_ref().len());
    for path in paths {
        averager.add(path.as_ref())?;
    }
    averager.finish(count)
}
