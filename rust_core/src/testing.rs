//! Test fixtures: small trees, mock likelihood engines and a finite-difference
//! gradient used to cross-check analytic gradients.

use std::sync::Arc;

use crate::error::Result;
use crate::gradient::GradientWrtParameterProvider;
use crate::hessian::HessianWrtParameterProvider;
use crate::likelihood::{
    BranchGradientEngine, BranchRateModel, TraitRegistry, TreeDataLikelihood,
};
use crate::parameter::Parameter;
use crate::tree::{FlexibleTree, NodeRef, Tree};

/// Root with two children; the first child carries one more tip.
pub fn four_node_tree() -> FlexibleTree {
    let mut t = FlexibleTree::new(2.0);
    let root = t.root();
    let left = t.add_internal(root, 1.0);
    t.add_tip(root, 0.0, "b");
    t.add_tip(left, 0.0, "c");
    t
}

/// Central differences of `f` at `x`.
pub fn finite_difference_gradient<F>(mut f: F, x: &[f64], h: f64) -> Vec<f64>
where
    F: FnMut(&[f64]) -> f64,
{
    let mut shifted = x.to_vec();
    let mut grad = vec![0.0; x.len()];
    for i in 0..x.len() {
        shifted[i] = x[i] + h;
        let up = f(&shifted);
        shifted[i] = x[i] - h;
        let down = f(&shifted);
        shifted[i] = x[i];
        grad[i] = (up - down) / (2.0 * h);
    }
    f(x);
    grad
}

/// Engine returning a fixed per-branch array.
pub struct ConstantEngine(pub Vec<f64>);

impl BranchGradientEngine for ConstantEngine {
    fn branch_rate_gradient(&self, _tree: &dyn Tree) -> Result<Vec<f64>> {
        Ok(self.0.clone())
    }
}

/// Independent Poisson substitution counts per branch:
/// logL = Σ_b k_b ln(r_b t_b) − r_b t_b.
pub struct PoissonBranchModel {
    tree: Arc<FlexibleTree>,
    rates: Arc<Parameter>,
    brm: Arc<dyn BranchRateModel>,
    counts: Vec<f64>,
}

impl PoissonBranchModel {
    pub fn new(
        tree: Arc<FlexibleTree>,
        rates: Arc<Parameter>,
        brm: Arc<dyn BranchRateModel>,
        counts: Vec<f64>,
    ) -> Self {
        Self {
            tree,
            rates,
            brm,
            counts,
        }
    }

    fn branches(&self) -> impl Iterator<Item = (usize, NodeRef)> + '_ {
        (0..self.tree.node_count())
            .map(|i| self.tree.node(i))
            .filter(|&n| !self.tree.is_root(n))
            .enumerate()
    }

    pub fn log_likelihood(&self) -> f64 {
        let values = self.rates.values();
        self.branches()
            .map(|(b, node)| {
                let r = values[self.brm.parameter_index_from_node(node)];
                let mu = r * self.tree.branch_length(node);
                self.counts[b] * mu.ln() - mu
            })
            .sum()
    }
}

impl BranchGradientEngine for PoissonBranchModel {
    fn branch_rate_gradient(&self, _tree: &dyn Tree) -> Result<Vec<f64>> {
        let values = self.rates.values();
        Ok(self
            .branches()
            .map(|(b, node)| {
                let r = values[self.brm.parameter_index_from_node(node)];
                self.counts[b] / r - self.tree.branch_length(node)
            })
            .collect())
    }
}

/// A tree likelihood whose value is supplied by an optional Poisson model.
pub struct MockLikelihood {
    tree: Arc<FlexibleTree>,
    brm: Option<Arc<dyn BranchRateModel>>,
    registry: TraitRegistry,
    trait_count: usize,
    model: Option<Arc<PoissonBranchModel>>,
}

impl MockLikelihood {
    pub fn new(
        tree: Arc<FlexibleTree>,
        brm: Option<Arc<dyn BranchRateModel>>,
        trait_count: usize,
    ) -> Self {
        Self {
            tree,
            brm,
            registry: TraitRegistry::new(),
            trait_count,
            model: None,
        }
    }

    pub fn with_model(
        tree: Arc<FlexibleTree>,
        brm: Option<Arc<dyn BranchRateModel>>,
        model: Arc<PoissonBranchModel>,
        trait_count: usize,
    ) -> Self {
        Self {
            tree,
            brm,
            registry: TraitRegistry::new(),
            trait_count,
            model: Some(model),
        }
    }
}

impl TreeDataLikelihood for MockLikelihood {
    fn tree(&self) -> Arc<dyn Tree> {
        self.tree.clone()
    }

    fn branch_rate_model(&self) -> Option<Arc<dyn BranchRateModel>> {
        self.brm.clone()
    }

    fn traits(&self) -> &TraitRegistry {
        &self.registry
    }

    fn trait_count(&self) -> usize {
        self.trait_count
    }

    fn log_likelihood(&self) -> Result<f64> {
        Ok(self.model.as_ref().map_or(0.0, |m| m.log_likelihood()))
    }
}

/// Hessian provider returning fixed curvature and gradient.
pub struct FixedHessian {
    pub parameter: Arc<Parameter>,
    pub diagonal: Vec<f64>,
    pub gradient: Vec<f64>,
}

impl FixedHessian {
    pub fn new(diagonal: Vec<f64>) -> Self {
        let dim = diagonal.len();
        Self {
            parameter: Arc::new(Parameter::new("x", vec![0.0; dim])),
            gradient: vec![0.0; dim],
            diagonal,
        }
    }
}

impl GradientWrtParameterProvider for FixedHessian {
    fn parameter(&self) -> &Arc<Parameter> {
        &self.parameter
    }

    fn gradient_log_density(&self) -> Result<Vec<f64>> {
        Ok(self.gradient.clone())
    }

    fn log_density(&self) -> Result<f64> {
        Ok(0.0)
    }
}

impl HessianWrtParameterProvider for FixedHessian {
    fn diagonal_hessian_log_density(&self) -> Result<Vec<f64>> {
        Ok(self.diagonal.clone())
    }
}

/// Independent normals N(0, σ_i²) over the parameter's values.
pub struct GaussianTarget {
    pub parameter: Arc<Parameter>,
    pub sigma: Vec<f64>,
}

impl GaussianTarget {
    pub fn new(start: Vec<f64>, sigma: Vec<f64>) -> Self {
        Self {
            parameter: Arc::new(Parameter::new("x", start)),
            sigma,
        }
    }
}

impl GradientWrtParameterProvider for GaussianTarget {
    fn parameter(&self) -> &Arc<Parameter> {
        &self.parameter
    }

    fn gradient_log_density(&self) -> Result<Vec<f64>> {
        Ok(self
            .parameter
            .values()
            .iter()
            .zip(self.sigma.iter())
            .map(|(x, s)| -x / (s * s))
            .collect())
    }

    fn log_density(&self) -> Result<f64> {
        Ok(self
            .parameter
            .values()
            .iter()
            .zip(self.sigma.iter())
            .map(|(x, s)| -0.5 * x * x / (s * s))
            .sum())
    }
}

impl HessianWrtParameterProvider for GaussianTarget {
    fn diagonal_hessian_log_density(&self) -> Result<Vec<f64>> {
        Ok(self.sigma.iter().map(|s| -1.0 / (s * s)).collect())
    }
}
