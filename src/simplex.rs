//! Nelder-Mead downhill simplex minimization.
//!
//! This is the derivative-free (`fmin`) strategy used by curve fits. It only
//! needs the scalar cost of a [`Problem`], so it copes with the flat or
//! clamped regions where finite-difference Jacobians are useless.

use ndarray::Array1;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{CurveError, Result};
use crate::problem::Problem;

/// Configuration options for the Nelder-Mead algorithm.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimplexConfig {
    /// Maximum iterations per parameter. Default: 200
    pub max_iterations_per_param: usize,

    /// Maximum function evaluations per parameter. Default: 400
    pub max_evals_per_param: usize,

    /// Absolute spread of the simplex vertices at convergence. Default: 1e-8
    pub xtol: f64,

    /// Absolute spread of the vertex costs at convergence. Default: 1e-12
    pub ftol: f64,

    /// Relative offset of the initial vertices from the seed. Default: 0.05
    pub initial_step: f64,

    /// Offset used for seed coordinates that are exactly zero. Default: 0.00025
    pub zero_step: f64,
}

impl Default for SimplexConfig {
    fn default() -> Self {
        Self {
            max_iterations_per_param: 200,
            max_evals_per_param: 400,
            xtol: 1e-8,
            ftol: 1e-12,
            initial_step: 0.05,
            zero_step: 0.00025,
        }
    }
}

/// Result of a Nelder-Mead minimization.
#[derive(Debug, Clone)]
pub struct SimplexResult {
    /// The best parameters found
    pub params: Array1<f64>,

    /// The cost at `params`
    pub cost: f64,

    /// The number of iterations performed
    pub iterations: usize,

    /// The number of function evaluations
    pub func_evals: usize,

    /// Whether the simplex collapsed within tolerance
    pub success: bool,

    /// A message describing the result
    pub message: String,
}

impl fmt::Display for SimplexResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Simplex Result:")?;
        writeln!(f, "  Success: {}", self.success)?;
        writeln!(f, "  Cost: {:.6e}", self.cost)?;
        writeln!(f, "  Iterations: {}", self.iterations)?;
        writeln!(f, "  Function evaluations: {}", self.func_evals)?;
        writeln!(f, "  Message: {}", self.message)?;
        writeln!(f, "  Parameters: {:?}", self.params)?;
        Ok(())
    }
}

/// The Nelder-Mead optimizer with the standard reflection (1), expansion (2),
/// contraction (1/2) and shrink (1/2) coefficients.
#[derive(Debug, Clone, Default)]
pub struct NelderMead {
    config: SimplexConfig,
}

impl NelderMead {
    const ALPHA: f64 = 1.0;
    const GAMMA: f64 = 2.0;
    const RHO: f64 = 0.5;
    const SIGMA: f64 = 0.5;

    /// Create a new optimizer with default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new optimizer with the given configuration.
    pub fn with_config(config: SimplexConfig) -> Self {
        Self { config }
    }

    /// The configuration in use.
    pub fn config(&self) -> &SimplexConfig {
        &self.config
    }

    /// Set the iteration budget per parameter.
    pub fn with_max_iterations_per_param(mut self, n: usize) -> Self {
        self.config.max_iterations_per_param = n;
        self
    }

    /// Minimize the cost of `problem` starting from `initial_params`.
    ///
    /// Exhausting the budget is not an error; the best vertex is returned
    /// with `success == false`.
    pub fn minimize<P: Problem>(
        &self,
        problem: &P,
        initial_params: Array1<f64>,
    ) -> Result<SimplexResult> {
        let n = problem.parameter_count();
        if initial_params.len() != n {
            return Err(CurveError::DimensionMismatch(format!(
                "Expected {} parameters, got {}",
                n,
                initial_params.len()
            )));
        }
        if n == 0 {
            return Err(CurveError::InvalidInput(
                "Simplex needs at least one parameter".to_string(),
            ));
        }

        let max_iterations = self.config.max_iterations_per_param * n.max(1);
        let max_evals = self.config.max_evals_per_param * n.max(1);

        let mut vertices = Vec::with_capacity(n + 1);
        vertices.push(initial_params.clone());
        for i in 0..n {
            let mut vertex = initial_params.clone();
            vertex[i] = if vertex[i] != 0.0 {
                vertex[i] * (1.0 + self.config.initial_step)
            } else {
                self.config.zero_step
            };
            vertices.push(vertex);
        }

        let mut costs = Vec::with_capacity(n + 1);
        for vertex in &vertices {
            costs.push(problem.eval_cost(vertex)?);
        }
        let mut func_evals = n + 1;
        let mut iterations = 0;

        loop {
            sort_simplex(&mut vertices, &mut costs);

            let best = &vertices[0];
            let x_spread = vertices[1..]
                .iter()
                .map(|v| {
                    v.iter()
                        .zip(best.iter())
                        .map(|(a, b)| (a - b).abs())
                        .fold(0.0, f64::max)
                })
                .fold(0.0, f64::max);
            let f_spread = costs[1..]
                .iter()
                .map(|c| (c - costs[0]).abs())
                .fold(0.0, f64::max);

            if costs[0].is_finite() && x_spread <= self.config.xtol && f_spread <= self.config.ftol
            {
                return Ok(SimplexResult {
                    params: vertices.swap_remove(0),
                    cost: costs[0],
                    iterations,
                    func_evals,
                    success: true,
                    message: format!(
                        "Simplex converged: spread |dx| = {:.2e}, |df| = {:.2e}",
                        x_spread, f_spread
                    ),
                });
            }

            if iterations >= max_iterations || func_evals >= max_evals {
                let message = if iterations >= max_iterations {
                    format!("Maximum iterations ({}) reached", max_iterations)
                } else {
                    format!("Maximum function evaluations ({}) reached", max_evals)
                };
                return Ok(SimplexResult {
                    params: vertices.swap_remove(0),
                    cost: costs[0],
                    iterations,
                    func_evals,
                    success: false,
                    message,
                });
            }
            iterations += 1;

            // Centroid of every vertex but the worst
            let mut centroid = Array1::<f64>::zeros(n);
            for vertex in &vertices[..n] {
                centroid += vertex;
            }
            centroid /= n as f64;

            let worst = vertices[n].clone();
            let reflected = &centroid + &((&centroid - &worst) * Self::ALPHA);
            let reflected_cost = problem.eval_cost(&reflected)?;
            func_evals += 1;

            if reflected_cost < costs[0] {
                let expanded = &centroid + &((&reflected - &centroid) * Self::GAMMA);
                let expanded_cost = problem.eval_cost(&expanded)?;
                func_evals += 1;

                if expanded_cost < reflected_cost {
                    vertices[n] = expanded;
                    costs[n] = expanded_cost;
                } else {
                    vertices[n] = reflected;
                    costs[n] = reflected_cost;
                }
                continue;
            }

            if reflected_cost < costs[n - 1] {
                vertices[n] = reflected;
                costs[n] = reflected_cost;
                continue;
            }

            // Contract towards whichever of the reflected and worst points is better
            let (contracted, contracted_cost) = if reflected_cost < costs[n] {
                let outside = &centroid + &((&reflected - &centroid) * Self::RHO);
                let cost = problem.eval_cost(&outside)?;
                (outside, cost)
            } else {
                let inside = &centroid + &((&worst - &centroid) * Self::RHO);
                let cost = problem.eval_cost(&inside)?;
                (inside, cost)
            };
            func_evals += 1;

            if contracted_cost < reflected_cost.min(costs[n]) {
                vertices[n] = contracted;
                costs[n] = contracted_cost;
                continue;
            }

            // Shrink every vertex towards the best one
            let best = vertices[0].clone();
            for i in 1..=n {
                vertices[i] = &best + &((&vertices[i] - &best) * Self::SIGMA);
                costs[i] = problem.eval_cost(&vertices[i])?;
            }
            func_evals += n;
        }
    }
}

/// Sort vertices by ascending cost; NaN-free because costs fold NaN into `+inf`.
fn sort_simplex(vertices: &mut Vec<Array1<f64>>, costs: &mut Vec<f64>) {
    let mut order: Vec<usize> = (0..costs.len()).collect();
    order.sort_by(|&a, &b| costs[a].total_cmp(&costs[b]));

    let sorted_vertices = order.iter().map(|&i| vertices[i].clone()).collect();
    let sorted_costs = order.iter().map(|&i| costs[i]).collect();
    *vertices = sorted_vertices;
    *costs = sorted_costs;
}
