use log::debug;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::error::{Error, Result};
use crate::gradient::GradientWrtParameterProvider;
use crate::preconditioner::{MassPreconditioner, Preconditioning};

/// Configuration for a single-step HMC operator.
#[derive(Debug, Clone)]
pub struct HmcConfig {
    pub step_size: f64,
    pub num_leapfrog_steps: usize,
    /// Feed (gradient, position) after every transition to the preconditioner.
    pub store_secants: bool,
    pub seed: u64,
}

impl Default for HmcConfig {
    fn default() -> Self {
        Self {
            step_size: 0.01,
            num_leapfrog_steps: 20,
            store_secants: false,
            seed: 42,
        }
    }
}

/// Leapfrog integration from `position`, with gradients taken through `provider`.
///
/// `position` and `momentum` are updated in place; the provider's parameter
/// is left at the final position. Velocities come from the preconditioner, so the
/// position update is q += ε M⁻¹ p.
pub fn leapfrog<G, P>(
    provider: &G,
    preconditioner: &P,
    position: &mut [f64],
    momentum: &mut [f64],
    step_size: f64,
    num_steps: usize,
) -> Result<()>
where
    G: GradientWrtParameterProvider + ?Sized,
    P: Preconditioning + ?Sized,
{
    let dim = position.len();
    if momentum.len() != dim {
        return Err(Error::dimension("momentum", dim, momentum.len()));
    }
    if num_steps == 0 {
        return Ok(());
    }

    let parameter = provider.parameter();
    parameter.set_values(position)?;
    let mut grad = provider.gradient_log_density()?;

    // Half step for momentum
    for i in 0..dim {
        momentum[i] += 0.5 * step_size * grad[i];
    }

    for step in 0..num_steps {
        // Full step for position
        let velocity = preconditioner.velocities(momentum)?;
        for i in 0..dim {
            position[i] += step_size * velocity[i];
        }
        parameter.set_values(position)?;
        grad = provider.gradient_log_density()?;

        // Full step for momentum (except at end)
        if step < num_steps - 1 {
            for i in 0..dim {
                momentum[i] += step_size * grad[i];
            }
        }
    }

    // Half step for momentum at end
    for i in 0..dim {
        momentum[i] += 0.5 * step_size * grad[i];
    }

    Ok(())
}

/// One HMC transition per call, with its own RNG stream and preconditioner.
pub struct HmcOperator<G> {
    provider: G,
    preconditioner: MassPreconditioner,
    config: HmcConfig,
    rng: ChaCha8Rng,
    accepted: u64,
    total: u64,
}

impl<G: GradientWrtParameterProvider> HmcOperator<G> {
    pub fn new(provider: G, preconditioner: MassPreconditioner, config: HmcConfig) -> Result<Self> {
        if preconditioner.dimension() != provider.dimension() {
            return Err(Error::dimension(
                "preconditioner",
                provider.dimension(),
                preconditioner.dimension(),
            ));
        }
        let rng = ChaCha8Rng::seed_from_u64(config.seed);
        Ok(Self {
            provider,
            preconditioner,
            config,
            rng,
            accepted: 0,
            total: 0,
        })
    }

    pub fn provider(&self) -> &G {
        &self.provider
    }

    pub fn preconditioner(&self) -> &MassPreconditioner {
        &self.preconditioner
    }

    pub fn accept_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.accepted as f64 / self.total as f64
        }
    }

    /// Propose and accept/reject one trajectory. Returns whether it moved.
    ///
    /// On error the parameter is put back where the step started.
    pub fn step(&mut self) -> Result<bool> {
        let parameter = self.provider.parameter().clone();
        let current = parameter.values();
        match self.transition(&current) {
            Ok(accept) => Ok(accept),
            Err(e) => {
                parameter.set_values(&current)?;
                Err(e)
            }
        }
    }

    fn transition(&mut self, current: &[f64]) -> Result<bool> {
        let parameter = self.provider.parameter().clone();

        let momentum = self.preconditioner.draw_initial_momentum(&mut self.rng)?;
        let logp_current = self.provider.log_density()?;
        let ke_current = self.preconditioner.kinetic_energy(&momentum)?;

        let mut position = current.to_vec();
        let mut p_prop = momentum;
        leapfrog(
            &self.provider,
            &self.preconditioner,
            &mut position,
            &mut p_prop,
            self.config.step_size,
            self.config.num_leapfrog_steps,
        )?;

        // Compute Hamiltonian
        let logp_prop = self.provider.log_density()?;
        let ke_prop = self.preconditioner.kinetic_energy(&p_prop)?;
        let log_accept_ratio = (-logp_current + ke_current) - (-logp_prop + ke_prop);

        let accept = log_accept_ratio.is_finite() && self.rng.gen::<f64>().ln() < log_accept_ratio;
        if !accept {
            parameter.set_values(current)?;
        }

        if self.config.store_secants {
            let gradient = self.provider.gradient_log_density()?;
            let state = parameter.values();
            self.preconditioner.store_secant(&gradient, &state)?;
        }

        self.total += 1;
        if accept {
            self.accepted += 1;
        }
        debug!(
            "hmc step {}: log ratio {:.4}, {}",
            self.total,
            log_accept_ratio,
            if accept { "accepted" } else { "rejected" }
        );
        Ok(accept)
    }
}
