//! Reference SEIR implementation of the model contract
//!
//! A discrete-day SEIR system over population fractions. The transmission
//! rate each day is a softplus of a learned linear combination of that
//! day's mobility row, so reduced mobility directly suppresses transmission.
//! Fitting runs finite-difference gradient descent on the mean squared
//! error between the modeled cumulative fraction and the rescaled case
//! series.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::PipelineError;
use crate::model::{CompartmentModel, FitSummary, ModelBackend};
use crate::types::{CompartmentState, InitialConditions, MobilityRow, MOBILITY_CATEGORIES};

/// Step size for finite-difference gradients
const FD_EPSILON: f64 = 1e-4;

/// Initial learning rate for gradient descent
const INITIAL_LR: f64 = 0.05;

/// Learned and fixed parameters of the SEIR dynamics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeirParams {
    /// Per-category mobility weights feeding the transmission rate
    pub weights: [f64; MOBILITY_CATEGORIES],
    /// Transmission-rate bias
    pub bias: f64,
    /// Rate of progression from exposed to infectious (1 / incubation days)
    pub sigma: f64,
    /// Rate of removal from the infectious compartment (1 / infectious days)
    pub gamma: f64,
}

/// Serialized weights artifact: parameters plus the initial conditions the
/// model was constructed with
#[derive(Debug, Clone, Serialize, Deserialize)]
struct SeirWeights {
    params: SeirParams,
    init: InitialConditions,
}

/// Backend producing fresh [`SeirModel`] instances
#[derive(Debug, Clone)]
pub struct SeirBackend {
    /// Incubation period in days
    pub incubation_days: f64,
    /// Mean infectious period in days
    pub infectious_days: f64,
}

impl Default for SeirBackend {
    fn default() -> Self {
        Self {
            incubation_days: 5.0,
            infectious_days: 14.0,
        }
    }
}

impl ModelBackend for SeirBackend {
    fn build(&self, init: InitialConditions) -> Box<dyn CompartmentModel> {
        Box::new(SeirModel::new(
            init,
            1.0 / self.incubation_days,
            1.0 / self.infectious_days,
        ))
    }
}

/// Mobility-driven SEIR model over population fractions
#[derive(Debug, Clone)]
pub struct SeirModel {
    params: SeirParams,
    init: InitialConditions,
}

impl SeirModel {
    pub fn new(init: InitialConditions, sigma: f64, gamma: f64) -> Self {
        Self {
            params: SeirParams {
                // Flat positive weights put the initial transmission rate in
                // a plausible range before fitting
                weights: [0.2; MOBILITY_CATEGORIES],
                bias: -1.0,
                sigma,
                gamma,
            },
            init,
        }
    }

    /// Construct a model from a previously saved weights artifact
    pub fn load(path: &Path) -> Result<Self, PipelineError> {
        let raw = std::fs::read_to_string(path)?;
        let weights: SeirWeights = serde_json::from_str(&raw)?;
        Ok(Self {
            params: weights.params,
            init: weights.init,
        })
    }

    pub fn params(&self) -> &SeirParams {
        &self.params
    }

    /// Transmission rate for one day's mobility row
    fn beta(params: &SeirParams, row: &MobilityRow) -> f64 {
        let linear: f64 = params
            .weights
            .iter()
            .zip(row.iter())
            .map(|(w, x)| w * x)
            .sum::<f64>()
            + params.bias;
        softplus(linear)
    }

    /// Run the SEIR recurrence over a mobility trajectory
    fn simulate(params: &SeirParams, init: &InitialConditions, mobility: &[MobilityRow]) -> Vec<CompartmentState> {
        let mut s = 1.0 - init.e0 - init.i0;
        let mut e = init.e0;
        let mut i = init.i0;
        let mut r = 0.0;

        let mut states = Vec::with_capacity(mobility.len());
        for row in mobility {
            let beta = Self::beta(params, row);
            // No flow may exceed its source compartment in a one-day step
            let new_infections = (beta * s * i).min(s);
            let progressing = (params.sigma * e).min(e);
            let removing = (params.gamma * i).min(i);

            let next_s = s - new_infections;
            let next_e = e + new_infections - progressing;
            let next_i = i + progressing - removing;
            let next_r = r + removing;

            s = next_s;
            e = next_e;
            i = next_i;
            r = next_r;

            states.push(CompartmentState {
                infectious: i,
                removed: r,
            });
        }
        states
    }

    /// Mean squared error between the modeled cumulative fraction and the
    /// rescaled case series
    fn loss(params: &SeirParams, init: &InitialConditions, mobility: &[MobilityRow], scaled_cases: &[f64]) -> f64 {
        let states = Self::simulate(params, init, mobility);
        let n = scaled_cases.len() as f64;
        states
            .iter()
            .zip(scaled_cases.iter())
            .map(|(state, observed)| {
                let modeled = state.infectious + state.removed;
                (modeled - observed).powi(2)
            })
            .sum::<f64>()
            / n
    }
}

impl CompartmentModel for SeirModel {
    fn fit(
        &mut self,
        mobility: &[MobilityRow],
        scaled_cases: &[f64],
        iters: usize,
        lr_step_size: usize,
    ) -> Result<FitSummary, PipelineError> {
        if mobility.len() != scaled_cases.len() || mobility.is_empty() {
            return Err(PipelineError::Config(format!(
                "fit inputs must be non-empty and equal length (got {} mobility rows, {} cases)",
                mobility.len(),
                scaled_cases.len()
            )));
        }

        let initial_loss = Self::loss(&self.params, &self.init, mobility, scaled_cases);
        let mut loss = initial_loss;
        let mut lr = INITIAL_LR;

        for iter in 0..iters {
            if !loss.is_finite() {
                return Err(PipelineError::Convergence(format!(
                    "loss became non-finite at iteration {iter}"
                )));
            }
            if lr_step_size != 0 && iter > 0 && iter % lr_step_size == 0 {
                lr *= 0.5;
            }

            // Central finite differences over the learnable parameters
            // (mobility weights and bias); sigma and gamma stay fixed.
            let mut gradient = [0.0; MOBILITY_CATEGORIES + 1];
            for p in 0..=MOBILITY_CATEGORIES {
                let mut plus = self.params.clone();
                let mut minus = self.params.clone();
                if p < MOBILITY_CATEGORIES {
                    plus.weights[p] += FD_EPSILON;
                    minus.weights[p] -= FD_EPSILON;
                } else {
                    plus.bias += FD_EPSILON;
                    minus.bias -= FD_EPSILON;
                }
                let loss_plus = Self::loss(&plus, &self.init, mobility, scaled_cases);
                let loss_minus = Self::loss(&minus, &self.init, mobility, scaled_cases);
                gradient[p] = (loss_plus - loss_minus) / (2.0 * FD_EPSILON);
            }

            for p in 0..MOBILITY_CATEGORIES {
                self.params.weights[p] -= lr * gradient[p];
            }
            self.params.bias -= lr * gradient[MOBILITY_CATEGORIES];

            loss = Self::loss(&self.params, &self.init, mobility, scaled_cases);
        }

        if !loss.is_finite() {
            return Err(PipelineError::Convergence(
                "final loss is non-finite".to_string(),
            ));
        }

        Ok(FitSummary {
            iterations: iters,
            initial_loss,
            final_loss: loss,
        })
    }

    fn project(&self, mobility: &[MobilityRow]) -> Vec<CompartmentState> {
        Self::simulate(&self.params, &self.init, mobility)
    }

    fn save(&self, path: &Path) -> Result<(), PipelineError> {
        let weights = SeirWeights {
            params: self.params.clone(),
            init: self.init,
        };
        let json = serde_json::to_string_pretty(&weights)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}

/// Numerically stable softplus, keeping the transmission rate positive
fn softplus(x: f64) -> f64 {
    if x > 20.0 {
        x
    } else if x < -20.0 {
        x.exp()
    } else {
        x.exp().ln_1p()
    }
}
