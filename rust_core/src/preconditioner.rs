//! Mass-matrix preconditioning for HMC momentum.
//!
//! Every variant answers the same three questions for the integrator:
//!   - draw a momentum p ~ N(0, M)
//!   - return component i of the velocity M⁻¹ p
//!   - absorb a (gradient, position) secant pair, if it adapts at all
//!
//! The Hessian-based variants fix M once at construction from local
//! curvature. Curvature that is non-concave or nearly flat is clamped into
//! `[lower_bound, upper_bound]` rather than reported.

use std::fmt;
use std::str::FromStr;

use log::{debug, trace};
use rand::Rng;
use rand_distr::{Distribution, StandardNormal};

use crate::distributions::MultivariateNormal;
use crate::error::{Error, Result};
use crate::hessian::HessianWrtParameterProvider;
use crate::linalg;
use crate::transform::Transform;

pub const DEFAULT_LOWER_BOUND: f64 = 1e-2;
pub const DEFAULT_UPPER_BOUND: f64 = 1e2;
pub const DEFAULT_SECANT_CAPACITY: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PreconditioningType {
    #[default]
    None,
    Diagonal,
    Full,
    Secant,
}

impl FromStr for PreconditioningType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" => Ok(Self::None),
            "diagonal" => Ok(Self::Diagonal),
            "full" => Ok(Self::Full),
            "secant" => Ok(Self::Secant),
            _ => Err(Error::UnknownPreconditioning(s.to_string())),
        }
    }
}

impl fmt::Display for PreconditioningType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::None => "none",
            Self::Diagonal => "diagonal",
            Self::Full => "full",
            Self::Secant => "secant",
        };
        f.write_str(name)
    }
}

/// Configuration for building a [`MassPreconditioner`].
#[derive(Debug, Clone)]
pub struct PreconditionerConfig {
    pub kind: PreconditioningType,
    /// Smallest admissible inverse-mass entry before rescaling.
    pub lower_bound: f64,
    /// Largest admissible inverse-mass entry before rescaling.
    pub upper_bound: f64,
    pub secant_capacity: usize,
}

impl Default for PreconditionerConfig {
    fn default() -> Self {
        Self {
            kind: PreconditioningType::None,
            lower_bound: DEFAULT_LOWER_BOUND,
            upper_bound: DEFAULT_UPPER_BOUND,
            secant_capacity: DEFAULT_SECANT_CAPACITY,
        }
    }
}

impl PreconditionerConfig {
    pub fn validate(&self) -> Result<()> {
        validate_bounds(self.lower_bound, self.upper_bound)
    }
}

/// Inverse-mass bounds must satisfy 0 < lower <= upper < inf.
pub fn validate_bounds(lower: f64, upper: f64) -> Result<()> {
    if lower.is_finite() && upper.is_finite() && lower > 0.0 && lower <= upper {
        Ok(())
    } else {
        Err(Error::Configuration(format!(
            "inverse-mass bounds [{lower}, {upper}] must be finite with 0 < lower <= upper"
        )))
    }
}

/// Momentum sampling and velocity for one HMC chain.
pub trait Preconditioning {
    fn dimension(&self) -> usize;

    /// Fresh momentum distributed as N(0, M).
    fn draw_initial_momentum<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<Vec<f64>>;

    /// Component `index` of M⁻¹ · momentum.
    fn velocity(&self, index: usize, momentum: &[f64]) -> Result<f64>;

    fn store_secant(&mut self, gradient: &[f64], position: &[f64]) -> Result<()>;

    fn velocities(&self, momentum: &[f64]) -> Result<Vec<f64>> {
        (0..self.dimension())
            .map(|i| self.velocity(i, momentum))
            .collect()
    }

    /// ½ pᵀ M⁻¹ p.
    fn kinetic_energy(&self, momentum: &[f64]) -> Result<f64> {
        let v = self.velocities(momentum)?;
        Ok(0.5 * momentum.iter().zip(v.iter()).map(|(p, v)| p * v).sum::<f64>())
    }
}

fn check_velocity_request(dim: usize, index: usize, momentum: &[f64]) -> Result<()> {
    if momentum.len() != dim {
        return Err(Error::dimension("momentum", dim, momentum.len()));
    }
    if index >= dim {
        return Err(Error::IndexOutOfRange {
            index,
            dimension: dim,
        });
    }
    Ok(())
}

// ── Identity ────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct NoPreconditioning {
    dim: usize,
}

impl NoPreconditioning {
    pub fn new(dim: usize) -> Self {
        Self { dim }
    }
}

impl Preconditioning for NoPreconditioning {
    fn dimension(&self) -> usize {
        self.dim
    }

    fn draw_initial_momentum<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<Vec<f64>> {
        Ok((0..self.dim).map(|_| StandardNormal.sample(rng)).collect())
    }

    fn velocity(&self, index: usize, momentum: &[f64]) -> Result<f64> {
        check_velocity_request(self.dim, index, momentum)?;
        Ok(momentum[index])
    }

    fn store_secant(&mut self, _gradient: &[f64], _position: &[f64]) -> Result<()> {
        Ok(())
    }
}

// ── Shared Hessian loading ──────────────────────────────────────────

/// Diagonal curvature of the log-density, corrected for `transform` when one
/// is supplied.
pub fn load_diagonal_hessian(
    hessian: &dyn HessianWrtParameterProvider,
    transform: Option<&dyn Transform>,
) -> Result<Vec<f64>> {
    let dim = hessian.dimension();
    let diagonal = hessian.diagonal_hessian_log_density()?;
    if diagonal.len() != dim {
        return Err(Error::dimension("diagonal Hessian", dim, diagonal.len()));
    }

    let Some(transform) = transform else {
        return Ok(diagonal);
    };

    let untransformed = transform.inverse(&hessian.parameter().values(), 0, dim);
    let gradient = hessian.gradient_log_density()?;
    if gradient.len() != dim {
        return Err(Error::dimension("gradient", dim, gradient.len()));
    }
    Ok(transform.update_diagonal_hessian_log_density(&diagonal, &gradient, &untransformed, 0, dim))
}

/// Per-dimension inverse mass −1/h clamped into `[lower, upper]`.
///
/// NaN curvature is treated like non-concave curvature and lands on `lower`.
pub fn clamp_inverse_mass(diagonal_hessian: &[f64], lower: f64, upper: f64) -> Result<Vec<f64>> {
    validate_bounds(lower, upper)?;
    let mut clamped = 0usize;
    let out = diagonal_hessian
        .iter()
        .map(|&h| {
            let v = -1.0 / h;
            if v.is_nan() || v < lower {
                clamped += 1;
                lower
            } else if v > upper {
                clamped += 1;
                upper
            } else {
                v
            }
        })
        .collect();
    if clamped > 0 {
        trace!("clamped {} of {} inverse-mass entries", clamped, diagonal_hessian.len());
    }
    Ok(out)
}

/// Clamp, then scale by the mean implied mass so that mean(1 / m⁻¹) = 1.
pub fn bound_inverse_mass(diagonal_hessian: &[f64], lower: f64, upper: f64) -> Result<Vec<f64>> {
    let mut inverse_mass = clamp_inverse_mass(diagonal_hessian, lower, upper)?;
    if inverse_mass.is_empty() {
        return Ok(inverse_mass);
    }
    let sum: f64 = inverse_mass.iter().map(|m| 1.0 / m).sum();
    let mean = sum / inverse_mass.len() as f64;
    for m in &mut inverse_mass {
        *m *= mean;
    }
    debug!("diagonal inverse mass rescaled by mean mass {:.6}", mean);
    Ok(inverse_mass)
}

// ── Diagonal ────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct DiagonalPreconditioning {
    inverse_mass: Vec<f64>,
    mass_sqrt: Vec<f64>,
}

impl DiagonalPreconditioning {
    pub fn new(
        hessian: &dyn HessianWrtParameterProvider,
        transform: Option<&dyn Transform>,
    ) -> Result<Self> {
        Self::with_bounds(hessian, transform, DEFAULT_LOWER_BOUND, DEFAULT_UPPER_BOUND)
    }

    pub fn with_bounds(
        hessian: &dyn HessianWrtParameterProvider,
        transform: Option<&dyn Transform>,
        lower: f64,
        upper: f64,
    ) -> Result<Self> {
        validate_bounds(lower, upper)?;
        let diagonal = load_diagonal_hessian(hessian, transform)?;
        Self::from_diagonal_hessian(&diagonal, lower, upper)
    }

    pub fn from_diagonal_hessian(diagonal_hessian: &[f64], lower: f64, upper: f64) -> Result<Self> {
        let inverse_mass = bound_inverse_mass(diagonal_hessian, lower, upper)?;
        let mass_sqrt = inverse_mass.iter().map(|m| (1.0 / m).sqrt()).collect();
        Ok(Self {
            inverse_mass,
            mass_sqrt,
        })
    }

    pub fn inverse_mass(&self) -> &[f64] {
        &self.inverse_mass
    }
}

impl Preconditioning for DiagonalPreconditioning {
    fn dimension(&self) -> usize {
        self.inverse_mass.len()
    }

    fn draw_initial_momentum<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<Vec<f64>> {
        Ok(self
            .mass_sqrt
            .iter()
            .map(|s| {
                let z: f64 = StandardNormal.sample(rng);
                z * s
            })
            .collect())
    }

    fn velocity(&self, index: usize, momentum: &[f64]) -> Result<f64> {
        check_velocity_request(self.inverse_mass.len(), index, momentum)?;
        Ok(momentum[index] * self.inverse_mass[index])
    }

    fn store_secant(&mut self, _gradient: &[f64], _position: &[f64]) -> Result<()> {
        Ok(())
    }
}

// ── Dense ───────────────────────────────────────────────────────────

/// Dense inverse mass, row-major `dim × dim`.
#[derive(Debug, Clone)]
pub struct FullPreconditioning {
    dim: usize,
    inverse_mass: Vec<f64>,
    momentum: MultivariateNormal,
}

impl FullPreconditioning {
    /// Dense curvature → inverse mass has no chosen numerical policy yet.
    pub fn from_hessian(
        hessian: &dyn HessianWrtParameterProvider,
        _transform: Option<&dyn Transform>,
    ) -> Result<Self> {
        debug!(
            "dense preconditioning requested for dimension {}",
            hessian.dimension()
        );
        Err(Error::NotImplemented("inverse mass from a dense Hessian"))
    }

    /// Use a caller-supplied symmetric positive-definite inverse mass.
    pub fn from_inverse_mass(inverse_mass: Vec<f64>, dim: usize) -> Result<Self> {
        if inverse_mass.len() != dim * dim {
            return Err(Error::dimension("inverse mass matrix", dim * dim, inverse_mass.len()));
        }
        if !linalg::is_symmetric(&inverse_mass, dim, 1e-12) {
            return Err(Error::NotPositiveDefinite);
        }
        let momentum = MultivariateNormal::from_precision(&inverse_mass, dim)?;
        Ok(Self {
            dim,
            inverse_mass,
            momentum,
        })
    }

    pub fn inverse_mass(&self) -> &[f64] {
        &self.inverse_mass
    }
}

impl Preconditioning for FullPreconditioning {
    fn dimension(&self) -> usize {
        self.dim
    }

    fn draw_initial_momentum<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<Vec<f64>> {
        Ok(self.momentum.sample(rng))
    }

    fn velocity(&self, index: usize, momentum: &[f64]) -> Result<f64> {
        check_velocity_request(self.dim, index, momentum)?;
        Ok(linalg::row_dot(&self.inverse_mass, index, momentum, self.dim))
    }

    fn store_secant(&mut self, _gradient: &[f64], _position: &[f64]) -> Result<()> {
        Ok(())
    }
}

// ── Secant history ──────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct Secant {
    pub gradient: Vec<f64>,
    pub position: Vec<f64>,
}

/// Quasi-Newton scaffold: a fixed-capacity ring of secant pairs.
///
/// Turning the history into a mass matrix has no chosen update rule yet, so
/// momentum and velocity requests fail with [`Error::NotImplemented`].
#[derive(Debug, Clone)]
pub struct SecantPreconditioning {
    dim: usize,
    queue: Vec<Option<Secant>>,
    secant_index: usize,
    secant_update_count: usize,
}

impl SecantPreconditioning {
    pub fn new(dim: usize, capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(Error::Configuration(
                "secant history needs a capacity of at least one".to_string(),
            ));
        }
        Ok(Self {
            dim,
            queue: vec![None; capacity],
            secant_index: 0,
            secant_update_count: 0,
        })
    }

    pub fn capacity(&self) -> usize {
        self.queue.len()
    }

    /// Stored pairs, at most `capacity()`.
    pub fn len(&self) -> usize {
        self.secant_update_count.min(self.queue.len())
    }

    pub fn is_empty(&self) -> bool {
        self.secant_update_count == 0
    }

    /// Total insertions, including overwritten ones.
    pub fn update_count(&self) -> usize {
        self.secant_update_count
    }

    /// Stored pairs from oldest to newest.
    pub fn secants(&self) -> impl Iterator<Item = &Secant> + '_ {
        let cap = self.queue.len();
        let start = if self.secant_update_count > cap {
            self.secant_index
        } else {
            0
        };
        (0..self.len()).filter_map(move |k| self.queue[(start + k) % cap].as_ref())
    }
}

impl Preconditioning for SecantPreconditioning {
    fn dimension(&self) -> usize {
        self.dim
    }

    fn draw_initial_momentum<R: Rng + ?Sized>(&self, _rng: &mut R) -> Result<Vec<f64>> {
        Err(Error::NotImplemented("momentum from secant history"))
    }

    fn velocity(&self, _index: usize, _momentum: &[f64]) -> Result<f64> {
        Err(Error::NotImplemented("velocity from secant history"))
    }

    fn store_secant(&mut self, gradient: &[f64], position: &[f64]) -> Result<()> {
        if gradient.len() != self.dim {
            return Err(Error::dimension("secant gradient", self.dim, gradient.len()));
        }
        if position.len() != self.dim {
            return Err(Error::dimension("secant position", self.dim, position.len()));
        }
        self.queue[self.secant_index] = Some(Secant {
            gradient: gradient.to_vec(),
            position: position.to_vec(),
        });
        self.secant_index = (self.secant_index + 1) % self.queue.len();
        self.secant_update_count += 1;
        Ok(())
    }
}

// ── Closed set ──────────────────────────────────────────────────────

/// One of the supported preconditioners, chosen at configuration time.
#[derive(Debug, Clone)]
pub enum MassPreconditioner {
    None(NoPreconditioning),
    Diagonal(DiagonalPreconditioning),
    Full(FullPreconditioning),
    Secant(SecantPreconditioning),
}

impl MassPreconditioner {
    pub fn from_config(
        config: &PreconditionerConfig,
        hessian: &dyn HessianWrtParameterProvider,
        transform: Option<&dyn Transform>,
    ) -> Result<Self> {
        config.validate()?;
        let dim = hessian.dimension();
        debug!("building {} preconditioner for dimension {}", config.kind, dim);
        Ok(match config.kind {
            PreconditioningType::None => Self::None(NoPreconditioning::new(dim)),
            PreconditioningType::Diagonal => Self::Diagonal(DiagonalPreconditioning::with_bounds(
                hessian,
                transform,
                config.lower_bound,
                config.upper_bound,
            )?),
            PreconditioningType::Full => {
                Self::Full(FullPreconditioning::from_hessian(hessian, transform)?)
            }
            PreconditioningType::Secant => {
                Self::Secant(SecantPreconditioning::new(dim, config.secant_capacity)?)
            }
        })
    }

    pub fn kind(&self) -> PreconditioningType {
        match self {
            Self::None(_) => PreconditioningType::None,
            Self::Diagonal(_) => PreconditioningType::Diagonal,
            Self::Full(_) => PreconditioningType::Full,
            Self::Secant(_) => PreconditioningType::Secant,
        }
    }
}

impl Preconditioning for MassPreconditioner {
    fn dimension(&self) -> usize {
        match self {
            Self::None(p) => p.dimension(),
            Self::Diagonal(p) => p.dimension(),
            Self::Full(p) => p.dimension(),
            Self::Secant(p) => p.dimension(),
        }
    }

    fn draw_initial_momentum<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<Vec<f64>> {
        match self {
            Self::None(p) => p.draw_initial_momentum(rng),
            Self::Diagonal(p) => p.draw_initial_momentum(rng),
            Self::Full(p) => p.draw_initial_momentum(rng),
            Self::Secant(p) => p.draw_initial_momentum(rng),
        }
    }

    fn velocity(&self, index: usize, momentum: &[f64]) -> Result<f64> {
        match self {
            Self::None(p) => p.velocity(index, momentum),
            Self::Diagonal(p) => p.velocity(index, momentum),
            Self::Full(p) => p.velocity(index, momentum),
            Self::Secant(p) => p.velocity(index, momentum),
        }
    }

    fn store_secant(&mut self, gradient: &[f64], position: &[f64]) -> Result<()> {
        match self {
            Self::None(p) => p.store_secant(gradient, position),
            Self::Diagonal(p) => p.store_secant(gradient, position),
            Self::Full(p) => p.store_secant(gradient, position),
            Self::Secant(p) => p.store_secant(gradient, position),
        }
    }
}
