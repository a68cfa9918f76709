//! Gradient of the tree log-likelihood with respect to branch rates.

use std::sync::Arc;

use log::{debug, warn};

use crate::error::{Error, Result};
use crate::likelihood::{
    gradient_trait_name, BranchGradientEngine, BranchRateModel, DiscreteTraitGradient,
    TreeDataLikelihood, TreeTrait,
};
use crate::parameter::Parameter;
use crate::tree::{NodeRef, Tree};

/// Anything that can differentiate a log-density with respect to a parameter.
pub trait GradientWrtParameterProvider: Send + Sync {
    fn parameter(&self) -> &Arc<Parameter>;

    fn dimension(&self) -> usize {
        self.parameter().dimension()
    }

    /// Fresh gradient at the parameter's current values.
    fn gradient_log_density(&self) -> Result<Vec<f64>>;

    fn log_density(&self) -> Result<f64>;
}

/// d logL / d rate for every non-root branch, obtained from a single
/// whole-tree request to the likelihood's gradient trait.
pub struct BranchRateGradient {
    likelihood: Arc<dyn TreeDataLikelihood>,
    tree: Arc<dyn Tree>,
    rate_parameter: Arc<Parameter>,
    gradient_trait: Arc<dyn TreeTrait>,
    /// Destination parameter index of each non-root node, in node-index order.
    destinations: Vec<usize>,
}

impl BranchRateGradient {
    /// Attach to `likelihood`, registering a [`DiscreteTraitGradient`] backed by
    /// `engine` unless a gradient trait for `trait_name` already exists.
    pub fn new(
        trait_name: &str,
        likelihood: Arc<dyn TreeDataLikelihood>,
        engine: Arc<dyn BranchGradientEngine>,
        rate_parameter: Arc<Parameter>,
    ) -> Result<Self> {
        Self::with_trait_factory(trait_name, likelihood, rate_parameter, || {
            DiscreteTraitGradient::new(trait_name, engine).into_traits()
        })
    }

    /// Like [`BranchRateGradient::new`] but with a caller-built set of traits
    /// to register when the gradient trait is missing.
    pub fn with_trait_factory<F>(
        trait_name: &str,
        likelihood: Arc<dyn TreeDataLikelihood>,
        rate_parameter: Arc<Parameter>,
        factory: F,
    ) -> Result<Self>
    where
        F: FnOnce() -> Vec<Arc<dyn TreeTrait>>,
    {
        let count = likelihood.trait_count();
        if count != 1 {
            return Err(Error::UnsupportedTraitCount { count });
        }

        let name = gradient_trait_name(trait_name);
        let gradient_trait = likelihood
            .traits()
            .get_or_insert_with(&name, factory)
            .ok_or_else(|| {
                Error::Configuration(format!(
                    "tree trait '{name}' is unavailable after registering its delegate"
                ))
            })?;

        let tree = likelihood.tree();
        let destinations = map_destinations(
            tree.as_ref(),
            likelihood.branch_rate_model().as_deref(),
            rate_parameter.dimension(),
        )?;

        if destinations.len() < rate_parameter.dimension() {
            warn!(
                "parameter '{}' has dimension {} but the tree has {} branches; remaining entries stay zero",
                rate_parameter.name(),
                rate_parameter.dimension(),
                destinations.len()
            );
        }
        debug!(
            "branch-rate gradient for '{}' over {} branches",
            name,
            destinations.len()
        );

        Ok(Self {
            likelihood,
            tree,
            rate_parameter,
            gradient_trait,
            destinations,
        })
    }

    pub fn likelihood(&self) -> &Arc<dyn TreeDataLikelihood> {
        &self.likelihood
    }

    /// Current gradient rendered as a bracketed list.
    pub fn report(&self) -> Result<String> {
        let gradient = self.gradient_log_density()?;
        let entries = gradient
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ");
        Ok(format!("[{entries}]"))
    }
}

/// Destination index for every non-root node, checked against `dimension`.
fn map_destinations(
    tree: &dyn Tree,
    branch_rate_model: Option<&dyn BranchRateModel>,
    dimension: usize,
) -> Result<Vec<usize>> {
    let mut taken = vec![false; dimension];
    let mut destinations = Vec::with_capacity(tree.node_count().saturating_sub(1));

    for i in 0..tree.node_count() {
        let node: NodeRef = tree.node(i);
        if tree.is_root(node) {
            continue;
        }
        let index = match branch_rate_model {
            Some(brm) => brm.parameter_index_from_node(node),
            None => node.number(),
        };
        if index >= dimension {
            return Err(Error::ParameterIndexOutOfRange {
                node: node.number(),
                index,
                dimension,
            });
        }
        if taken[index] {
            return Err(Error::DuplicateParameterIndex { index });
        }
        taken[index] = true;
        destinations.push(index);
    }

    Ok(destinations)
}

impl GradientWrtParameterProvider for BranchRateGradient {
    fn parameter(&self) -> &Arc<Parameter> {
        &self.rate_parameter
    }

    fn gradient_log_density(&self) -> Result<Vec<f64>> {
        let mut result = vec![0.0; self.rate_parameter.dimension()];

        // One request for the whole tree.
        let raw = self.gradient_trait.trait_for(self.tree.as_ref(), None)?;
        if raw.len() != self.destinations.len() {
            return Err(Error::dimension(
                "tree gradient trait",
                self.destinations.len(),
                raw.len(),
            ));
        }

        for (v, &dest) in self.destinations.iter().enumerate() {
            result[dest] = raw[v];
        }
        Ok(result)
    }

    fn log_density(&self) -> Result<f64> {
        self.likelihood.log_likelihood()
    }
}
