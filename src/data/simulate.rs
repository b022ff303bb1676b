//! Synthetic housing-energy data with known generating parameters.
//!
//! Each local authority gets a normal random intercept; each dwelling draws a
//! room count and a building age, and the shortfall is
//!
//! ```text
//! shortfall = intercept + beta_rooms * n_rooms + beta_age * age + u_group + ε
//! ```
//!
//! The generator is seeded so a given configuration always yields the same table.

use rand::prelude::*;
use rand::rngs::StdRng;
use rand_distr::Normal;

use crate::domain::Observation;
use crate::error::AppError;

/// Generating parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationConfig {
    pub groups: usize,
    pub per_group: usize,
    pub seed: u64,
    pub intercept: f64,
    pub beta_rooms: f64,
    pub beta_age: f64,
    /// Standard deviation of the group intercepts.
    pub group_sd: f64,
    /// Standard deviation of the observation noise.
    pub noise_sd: f64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            groups: 40,
            per_group: 25,
            seed: 42,
            intercept: 2.0,
            beta_rooms: 0.8,
            beta_age: 0.02,
            group_sd: 1.0,
            noise_sd: 0.5,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SimulatedData {
    pub observations: Vec<Observation>,
    /// True random intercept of each group, in generation order.
    pub group_effects: Vec<(String, f64)>,
}

/// Range of room counts drawn per dwelling (inclusive).
const ROOMS: (u32, u32) = (1, 8);
/// Range of building ages in years (inclusive).
const AGE_YEARS: (u32, u32) = (0, 120);

/// Local-authority style code for group `i` (`E06000001`, ...).
pub fn authority_code(i: usize) -> String {
    format!("E06{:06}", i + 1)
}

pub fn simulate(config: &SimulationConfig) -> Result<SimulatedData, AppError> {
    if config.groups == 0 || config.per_group == 0 {
        return Err(AppError::config("Simulation needs at least one group and one row per group."));
    }
    let params = [
        config.intercept,
        config.beta_rooms,
        config.beta_age,
        config.group_sd,
        config.noise_sd,
    ];
    if params.iter().any(|v| !v.is_finite()) {
        return Err(AppError::config("Simulation parameters must be finite."));
    }

    let mut rng = StdRng::seed_from_u64(config.seed);
    let group_dist = Normal::new(0.0, config.group_sd)
        .map_err(|e| AppError::config(format!("Invalid group standard deviation: {e}")))?;
    let noise_dist = Normal::new(0.0, config.noise_sd)
        .map_err(|e| AppError::config(format!("Invalid noise standard deviation: {e}")))?;

    let mut observations = Vec::with_capacity(config.groups * config.per_group);
    let mut group_effects = Vec::with_capacity(config.groups);

    for g in 0..config.groups {
        let code = authority_code(g);
        let u = group_dist.sample(&mut rng);
        group_effects.push((code.clone(), u));

        for _ in 0..config.per_group {
            let n_rooms = f64::from(rng.gen_range(ROOMS.0..=ROOMS.1));
            let age = f64::from(rng.gen_range(AGE_YEARS.0..=AGE_YEARS.1));
            let eps = noise_dist.sample(&mut rng);
            let shortfall =
                config.intercept + config.beta_rooms * n_rooms + config.beta_age * age + u + eps;
            observations.push(Observation {
                shortfall,
                n_rooms,
                age,
                group: code.clone(),
            });
        }
    }

    Ok(SimulatedData {
        observations,
        group_effects,
    })
}
