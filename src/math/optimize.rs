//! Bounded global minimization: differential evolution with a Nelder–Mead polish.
//!
//! The relaxation cost surface is a sum of four exponentials in `T1` and has
//! several shallow local minima, so a local gradient method started from a poor
//! guess routinely stalls. Differential evolution explores the whole bound box.
//!
//! Implementation notes:
//! - Everything runs in unit-cube coordinates (`u ∈ [0, 1]^d`) so parameters of
//!   wildly different scale (an amplitude of ~100 and a `T1` of ~1e6 μs) mutate
//!   at comparable rates.
//! - Strategy is `best/1/bin` with a per-generation dithered mutation factor.
//! - Trial vectors for a generation are built first and evaluated in parallel;
//!   selection happens afterwards. Combined with a seeded RNG this makes every run
//!   bit-for-bit reproducible regardless of thread count.
//! - Convergence: `std(E) ≤ atol + tol·|mean(E)|` over the population energies.

use rand::prelude::*;
use rand::rngs::StdRng;
use rayon::prelude::*;

use crate::error::AppError;

/// Differential evolution settings.
#[derive(Debug, Clone)]
pub struct DeOptions {
    /// Population size is `pop_factor × dimension`.
    pub pop_factor: usize,
    /// Mutation factor is drawn uniformly from this range every generation.
    pub mutation: (f64, f64),
    /// Crossover probability.
    pub recombination: f64,
    pub max_generations: usize,
    /// Relative convergence tolerance on the population energies.
    pub tol: f64,
    /// Absolute convergence tolerance on the population energies.
    pub atol: f64,
    pub seed: u64,
    /// Refine the best member with a bounded Nelder–Mead search afterwards.
    pub polish: bool,
}

impl Default for DeOptions {
    fn default() -> Self {
        Self {
            pop_factor: 15,
            mutation: (0.5, 1.0),
            recombination: 0.7,
            max_generations: 1000,
            tol: 0.01,
            atol: 0.0,
            seed: 42,
            polish: true,
        }
    }
}

/// Result of a differential evolution run.
#[derive(Debug, Clone)]
pub struct DeOutcome {
    /// Best parameters, in the caller's coordinates.
    pub x: Vec<f64>,
    pub energy: f64,
    pub generations: usize,
    pub evaluations: usize,
    /// Whether the population met the convergence criterion before the limit.
    pub converged: bool,
}

struct UnitBox<'a> {
    bounds: &'a [(f64, f64)],
}

impl UnitBox<'_> {
    fn to_params(&self, u: &[f64]) -> Vec<f64> {
        u.iter()
            .zip(self.bounds.iter())
            .map(|(&ui, &(lo, hi))| lo + ui * (hi - lo))
            .collect()
    }

    fn to_unit(&self, x: &[f64]) -> Vec<f64> {
        x.iter()
            .zip(self.bounds.iter())
            .map(|(&xi, &(lo, hi))| {
                if hi > lo {
                    ((xi - lo) / (hi - lo)).clamp(0.0, 1.0)
                } else {
                    0.5
                }
            })
            .collect()
    }
}

/// Minimize `objective` over the box `bounds`.
///
/// `x0`, when given, replaces one member of the initial population (clamped into
/// the box). Non-finite objective values are treated as `+∞`.
pub fn differential_evolution<F>(
    objective: F,
    bounds: &[(f64, f64)],
    x0: Option<&[f64]>,
    opts: &DeOptions,
) -> Result<DeOutcome, AppError>
where
    F: Fn(&[f64]) -> f64 + Sync,
{
    validate_bounds(bounds)?;
    if let Some(x0) = x0 {
        if x0.len() != bounds.len() {
            return Err(AppError::input(format!(
                "Initial guess has {} entries, expected {}.",
                x0.len(),
                bounds.len()
            )));
        }
    }
    if opts.max_generations == 0 {
        return Err(AppError::input("Differential evolution needs at least one generation."));
    }

    let dim = bounds.len();
    let unit = UnitBox { bounds };
    let pop_size = (opts.pop_factor * dim).max(5);
    let mut rng = StdRng::seed_from_u64(opts.seed);

    let energy_of = |u: &[f64]| -> f64 {
        let e = objective(&unit.to_params(u));
        if e.is_finite() { e } else { f64::INFINITY }
    };

    let mut population = latin_hypercube(pop_size, dim, &mut rng);
    if let Some(x0) = x0 {
        population[0] = unit.to_unit(x0);
    }
    let mut energies: Vec<f64> = population.par_iter().map(|u| energy_of(u)).collect();
    let mut evaluations = pop_size;

    let mut generations = 0;
    let mut converged = population_converged(&energies, opts.tol, opts.atol);

    while !converged && generations < opts.max_generations {
        generations += 1;
        let best = argmin(&energies);
        let scale = if opts.mutation.1 > opts.mutation.0 {
            rng.gen_range(opts.mutation.0..opts.mutation.1)
        } else {
            opts.mutation.0
        };

        let trials: Vec<Vec<f64>> = (0..pop_size)
            .map(|i| {
                let (r1, r2) = pick_two(pop_size, i, &mut rng);
                let forced = rng.gen_range(0..dim);
                (0..dim)
                    .map(|j| {
                        if j == forced || rng.gen_range(0.0..1.0) < opts.recombination {
                            let v = population[best][j] + scale * (population[r1][j] - population[r2][j]);
                            if (0.0..=1.0).contains(&v) { v } else { rng.gen_range(0.0..1.0) }
                        } else {
                            population[i][j]
                        }
                    })
                    .collect()
            })
            .collect();

        let trial_energies: Vec<f64> = trials.par_iter().map(|u| energy_of(u)).collect();
        evaluations += pop_size;

        for (i, (trial, e)) in trials.into_iter().zip(trial_energies).enumerate() {
            if e <= energies[i] {
                population[i] = trial;
                energies[i] = e;
            }
        }

        converged = population_converged(&energies, opts.tol, opts.atol);
        if generations % 100 == 0 {
            log::debug!(
                "differential evolution: generation {generations}, best energy {:.6e}",
                energies[argmin(&energies)]
            );
        }
    }

    let best = argmin(&energies);
    let mut best_u = population[best].clone();
    let mut best_e = energies[best];

    if opts.polish && best_e.is_finite() {
        let polished = nelder_mead_unit(&energy_of, &best_u, &NelderMeadOptions::default());
        evaluations += polished.evaluations;
        if polished.energy < best_e {
            best_u = polished.u;
            best_e = polished.energy;
        }
    }

    Ok(DeOutcome {
        x: unit.to_params(&best_u),
        energy: best_e,
        generations,
        evaluations,
        converged,
    })
}

fn validate_bounds(bounds: &[(f64, f64)]) -> Result<(), AppError> {
    if bounds.is_empty() {
        return Err(AppError::input("Optimizer needs at least one parameter."));
    }
    for (i, &(lo, hi)) in bounds.iter().enumerate() {
        if !(lo.is_finite() && hi.is_finite()) || hi < lo {
            return Err(AppError::input(format!(
                "Invalid bounds for parameter {i}: [{lo}, {hi}]."
            )));
        }
    }
    Ok(())
}

/// Stratified initial population: each dimension gets one sample per stratum.
fn latin_hypercube(pop_size: usize, dim: usize, rng: &mut StdRng) -> Vec<Vec<f64>> {
    let mut population = vec![vec![0.0; dim]; pop_size];
    let mut strata: Vec<usize> = (0..pop_size).collect();
    for j in 0..dim {
        strata.shuffle(rng);
        for (member, &stratum) in population.iter_mut().zip(strata.iter()) {
            member[j] = (stratum as f64 + rng.gen_range(0.0..1.0)) / pop_size as f64;
        }
    }
    population
}

/// Two distinct indices, both different from `exclude`.
fn pick_two(n: usize, exclude: usize, rng: &mut StdRng) -> (usize, usize) {
    let r1 = loop {
        let r = rng.gen_range(0..n);
        if r != exclude {
            break r;
        }
    };
    let r2 = loop {
        let r = rng.gen_range(0..n);
        if r != exclude && r != r1 {
            break r;
        }
    };
    (r1, r2)
}

fn argmin(values: &[f64]) -> usize {
    let mut best = 0;
    for (i, &v) in values.iter().enumerate().skip(1) {
        if v < values[best] {
            best = i;
        }
    }
    best
}

fn population_converged(energies: &[f64], tol: f64, atol: f64) -> bool {
    if energies.iter().any(|e| !e.is_finite()) {
        return false;
    }
    let n = energies.len() as f64;
    let mean = energies.iter().sum::<f64>() / n;
    let var = energies.iter().map(|e| (e - mean) * (e - mean)).sum::<f64>() / n;
    var.sqrt() <= atol + tol * mean.abs()
}

/// Nelder–Mead settings (unit-cube coordinates).
#[derive(Debug, Clone)]
pub struct NelderMeadOptions {
    pub initial_step: f64,
    pub max_iterations: usize,
    /// Stop when the simplex diameter drops below this.
    pub xatol: f64,
    /// ... and the energy spread across vertices drops below this.
    pub fatol: f64,
}

impl Default for NelderMeadOptions {
    fn default() -> Self {
        Self {
            initial_step: 0.01,
            max_iterations: 4000,
            xatol: 1e-12,
            fatol: 1e-300,
        }
    }
}

#[derive(Debug, Clone)]
struct NelderMeadOutcome {
    u: Vec<f64>,
    energy: f64,
    evaluations: usize,
}

/// Bounded Nelder–Mead: every vertex is clipped back into the unit cube.
fn nelder_mead_unit<F>(energy_of: &F, start: &[f64], opts: &NelderMeadOptions) -> NelderMeadOutcome
where
    F: Fn(&[f64]) -> f64,
{
    let dim = start.len();
    let clip = |v: Vec<f64>| -> Vec<f64> { v.into_iter().map(|x| x.clamp(0.0, 1.0)).collect() };

    let mut simplex: Vec<Vec<f64>> = Vec::with_capacity(dim + 1);
    simplex.push(start.to_vec());
    for j in 0..dim {
        let mut v = start.to_vec();
        // Step inward when the start sits on the upper face.
        v[j] = if v[j] + opts.initial_step <= 1.0 {
            v[j] + opts.initial_step
        } else {
            v[j] - opts.initial_step
        };
        simplex.push(v);
    }
    let mut values: Vec<f64> = simplex.iter().map(|v| energy_of(v)).collect();
    let mut evaluations = dim + 1;

    for _ in 0..opts.max_iterations {
        let mut order: Vec<usize> = (0..=dim).collect();
        order.sort_by(|&a, &b| values[a].total_cmp(&values[b]));
        simplex = order.iter().map(|&i| simplex[i].clone()).collect();
        values = order.iter().map(|&i| values[i]).collect();

        let diameter = simplex[1..]
            .iter()
            .flat_map(|v| v.iter().zip(simplex[0].iter()).map(|(a, b)| (a - b).abs()))
            .fold(0.0, f64::max);
        let spread = values[dim] - values[0];
        if diameter <= opts.xatol || spread <= opts.fatol {
            break;
        }

        let centroid: Vec<f64> = (0..dim)
            .map(|j| simplex[..dim].iter().map(|v| v[j]).sum::<f64>() / dim as f64)
            .collect();
        let along = |coef: f64| -> Vec<f64> {
            clip(
                centroid
                    .iter()
                    .zip(simplex[dim].iter())
                    .map(|(c, w)| c + coef * (c - w))
                    .collect(),
            )
        };

        let reflected = along(1.0);
        let f_reflected = energy_of(&reflected);
        evaluations += 1;

        if f_reflected < values[0] {
            let expanded = along(2.0);
            let f_expanded = energy_of(&expanded);
            evaluations += 1;
            if f_expanded < f_reflected {
                simplex[dim] = expanded;
                values[dim] = f_expanded;
            } else {
                simplex[dim] = reflected;
                values[dim] = f_reflected;
            }
            continue;
        }
        if f_reflected < values[dim - 1] {
            simplex[dim] = reflected;
            values[dim] = f_reflected;
            continue;
        }

        let contracted = if f_reflected < values[dim] { along(0.5) } else { along(-0.5) };
        let f_contracted = energy_of(&contracted);
        evaluations += 1;
        if f_contracted < values[dim].min(f_reflected) {
            simplex[dim] = contracted;
            values[dim] = f_contracted;
            continue;
        }

        // Shrink toward the best vertex.
        for i in 1..=dim {
            let shrunk: Vec<f64> = simplex[i]
                .iter()
                .zip(simplex[0].iter())
                .map(|(v, b)| b + 0.5 * (v - b))
                .collect();
            values[i] = energy_of(&shrunk);
            simplex[i] = shrunk;
        }
        evaluations += dim;
    }

    let best = argmin(&values);
    NelderMeadOutcome {
        u: simplex[best].clone(),
        energy: values[best],
        evaluations,
    }
}
