//! Seams to the tree-likelihood engine.
//!
//! The engine itself (peeling, pre-order partials, sufficient statistics) lives
//! outside this crate. What it must offer is captured here:
//!   - a registry of named tree traits with get-or-create semantics
//!   - a likelihood object exposing its tree, branch-rate model and trait shape
//!   - a [`BranchGradientEngine`] producing d logL / d rate for every branch
//!     in one whole-tree pass

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use log::debug;

use crate::error::{Error, Result};
use crate::parameter::Parameter;
use crate::tree::{NodeRef, Tree};

/// Prefix of the derived trait name under which branch gradients are registered.
pub const GRADIENT_TRAIT_PREFIX: &str = "derivative.";

/// Derived registry name for the branch-rate gradient of `trait_name`.
pub fn gradient_trait_name(trait_name: &str) -> String {
    format!("{GRADIENT_TRAIT_PREFIX}{trait_name}")
}

/// A quantity computed over a tree.
///
/// `node == None` asks for the whole tree at once: one entry per non-root
/// node, in node-index order.
pub trait TreeTrait: Send + Sync {
    fn name(&self) -> &str;
    fn trait_for(&self, tree: &dyn Tree, node: Option<NodeRef>) -> Result<Vec<f64>>;
}

/// Named tree traits attached to a likelihood.
#[derive(Default)]
pub struct TraitRegistry {
    traits: RwLock<HashMap<String, Arc<dyn TreeTrait>>>,
}

impl TraitRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn TreeTrait>> {
        let map = match self.traits.read() {
            Ok(m) => m,
            Err(poisoned) => poisoned.into_inner(),
        };
        map.get(name).cloned()
    }

    /// Return the trait registered under `name`, registering the traits built
    /// by `create` first if it is absent. `create` runs at most once per name.
    pub fn get_or_insert_with<F>(&self, name: &str, create: F) -> Option<Arc<dyn TreeTrait>>
    where
        F: FnOnce() -> Vec<Arc<dyn TreeTrait>>,
    {
        if let Some(existing) = self.get(name) {
            return Some(existing);
        }
        let mut map = match self.traits.write() {
            Ok(m) => m,
            Err(poisoned) => poisoned.into_inner(),
        };
        if !map.contains_key(name) {
            register_all(&mut map, create());
        }
        map.get(name).cloned()
    }

    pub fn len(&self) -> usize {
        match self.traits.read() {
            Ok(m) => m.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn register_all(map: &mut HashMap<String, Arc<dyn TreeTrait>>, traits: Vec<Arc<dyn TreeTrait>>) {
    for t in traits {
        debug!("registering tree trait '{}'", t.name());
        map.insert(t.name().to_string(), t);
    }
}

/// Maps tree nodes to indices of a branch-rate parameter.
pub trait BranchRateModel: Send + Sync {
    fn parameter_index_from_node(&self, node: NodeRef) -> usize;
}

/// One free rate per branch; the root is skipped when numbering.
#[derive(Debug, Clone)]
pub struct ArbitraryBranchRates {
    root: NodeRef,
}

impl ArbitraryBranchRates {
    pub fn new(tree: &dyn Tree) -> Self {
        Self { root: tree.root() }
    }

    /// Rate applied to the branch above `node`.
    pub fn branch_rate(&self, rates: &Parameter, node: NodeRef) -> f64 {
        rates.value(self.parameter_index_from_node(node))
    }
}

impl BranchRateModel for ArbitraryBranchRates {
    fn parameter_index_from_node(&self, node: NodeRef) -> usize {
        if node.number() > self.root.number() {
            node.number() - 1
        } else {
            node.number()
        }
    }
}

/// The data likelihood a gradient provider is attached to.
pub trait TreeDataLikelihood: Send + Sync {
    fn tree(&self) -> Arc<dyn Tree>;

    /// Present only when the model assigns free per-branch rates.
    fn branch_rate_model(&self) -> Option<Arc<dyn BranchRateModel>>;

    fn traits(&self) -> &TraitRegistry;

    /// Number of independent traits (site patterns share one tree).
    fn trait_count(&self) -> usize;

    fn log_likelihood(&self) -> Result<f64>;
}

/// External engine computing branch-rate sufficient statistics.
pub trait BranchGradientEngine: Send + Sync {
    /// d logL / d rate for every non-root node, in node-index order.
    fn branch_rate_gradient(&self, tree: &dyn Tree) -> Result<Vec<f64>>;
}

/// Exposes a [`BranchGradientEngine`] as a registrable tree trait.
pub struct DiscreteTraitGradient {
    name: String,
    engine: Arc<dyn BranchGradientEngine>,
}

impl DiscreteTraitGradient {
    pub fn new(trait_name: &str, engine: Arc<dyn BranchGradientEngine>) -> Self {
        Self {
            name: gradient_trait_name(trait_name),
            engine,
        }
    }

    pub fn into_traits(self) -> Vec<Arc<dyn TreeTrait>> {
        vec![Arc::new(self)]
    }
}

impl TreeTrait for DiscreteTraitGradient {
    fn name(&self) -> &str {
        &self.name
    }

    fn trait_for(&self, tree: &dyn Tree, node: Option<NodeRef>) -> Result<Vec<f64>> {
        let full = self.engine.branch_rate_gradient(tree)?;
        let expected = tree.node_count().saturating_sub(1);
        if full.len() != expected {
            return Err(Error::dimension("branch gradient", expected, full.len()));
        }
        match node {
            None => Ok(full),
            Some(n) if tree.is_root(n) => Ok(Vec::new()),
            Some(n) => {
                let root = tree.root().number();
                let slot = if n.number() > root {
                    n.number() - 1
                } else {
                    n.number()
                };
                Ok(vec![full[slot]])
            }
        }
    }
}
