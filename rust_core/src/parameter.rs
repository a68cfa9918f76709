use std::sync::RwLock;

use crate::error::{Error, Result};

/// A named real-valued parameter vector with a fixed dimension.
///
/// Values sit behind a lock so the model, gradient providers and the
/// integrator can share one instance through an `Arc`.
#[derive(Debug)]
pub struct Parameter {
    name: String,
    dimension: usize,
    values: RwLock<Vec<f64>>,
}

impl Parameter {
    pub fn new(name: &str, values: Vec<f64>) -> Self {
        Self {
            name: name.to_string(),
            dimension: values.len(),
            values: RwLock::new(values),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn values(&self) -> Vec<f64> {
        match self.values.read() {
            Ok(v) => v.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn value(&self, index: usize) -> f64 {
        match self.values.read() {
            Ok(v) => v[index],
            Err(poisoned) => poisoned.into_inner()[index],
        }
    }

    /// Overwrite every value; the dimension cannot change.
    pub fn set_values(&self, new_values: &[f64]) -> Result<()> {
        if new_values.len() != self.dimension {
            return Err(Error::dimension("parameter values", self.dimension, new_values.len()));
        }
        let mut guard = match self.values.write() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard.copy_from_slice(new_values);
        Ok(())
    }
}
