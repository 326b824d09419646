//! Compartmental model contract
//!
//! The pipeline treats the dynamical model and its fitting procedure as a
//! pluggable collaborator: constructible from initial conditions, fit
//! against an aligned series, projected forward over an extended mobility
//! trajectory. [`crate::seir`] ships the reference implementation.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::PipelineError;
use crate::types::{CompartmentState, InitialConditions, MobilityRow};

/// Outcome of one fitting run
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FitSummary {
    /// Iterations actually performed
    pub iterations: usize,
    /// Loss before the first update
    pub initial_loss: f64,
    /// Loss after the last update
    pub final_loss: f64,
}

/// A mobility-driven compartmental model
pub trait CompartmentModel {
    /// Fit learned parameters against an aligned mobility series and the
    /// rescaled case series, for `iters` iterations with the learning rate
    /// decayed every `lr_step_size` iterations.
    fn fit(
        &mut self,
        mobility: &[MobilityRow],
        scaled_cases: &[f64],
        iters: usize,
        lr_step_size: usize,
    ) -> Result<FitSummary, PipelineError>;

    /// Run the model forward over a mobility trajectory, returning per-day
    /// compartment values. Does not mutate the model.
    fn project(&self, mobility: &[MobilityRow]) -> Vec<CompartmentState>;

    /// Persist fitted parameters to `path`
    fn save(&self, path: &Path) -> Result<(), PipelineError>;
}

/// Factory for fresh model instances seeded with initial conditions
pub trait ModelBackend {
    fn build(&self, init: InitialConditions) -> Box<dyn CompartmentModel>;
}
