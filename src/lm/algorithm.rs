//! Implementation of the Levenberg-Marquardt algorithm.
//!
//! The damped normal equations use Marquardt's diagonal scaling,
//! `(JᵀJ + λ·diag(JᵀJ)) δ = -Jᵀr`, which keeps the step well behaved when the
//! parameters live on very different scales (as the discharge model's do).

use ndarray::{Array1, Array2};
use std::fmt;

use crate::error::{CurveError, Result};
use crate::problem::{sum_of_squares, Problem};
use crate::utils::matrix_convert::{ndarray_to_faer, ndarray_vec_to_faer};

use super::config::LmConfig;

/// Result of the Levenberg-Marquardt optimization.
#[derive(Debug, Clone)]
pub struct LmResult {
    /// Optimized parameter values
    pub params: Array1<f64>,

    /// Residuals at the solution
    pub residuals: Array1<f64>,

    /// Sum of squared residuals
    pub cost: f64,

    /// Number of accepted steps
    pub iterations: usize,

    /// Number of function evaluations
    pub func_evals: usize,

    /// Whether the optimization met a convergence criterion
    pub success: bool,

    /// A message describing the result
    pub message: String,
}

impl fmt::Display for LmResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Optimization Result:")?;
        writeln!(f, "  Success: {}", self.success)?;
        writeln!(f, "  Message: {}", self.message)?;
        writeln!(f, "  Cost: {:.6e}", self.cost)?;
        writeln!(f, "  Iterations: {}", self.iterations)?;
        writeln!(f, "  Function evaluations: {}", self.func_evals)?;
        writeln!(f, "  Parameters: {:?}", self.params)?;
        Ok(())
    }
}

/// The Levenberg-Marquardt optimizer.
#[derive(Debug, Clone, Default)]
pub struct LevenbergMarquardt {
    /// Configuration options
    config: LmConfig,
}

impl LevenbergMarquardt {
    /// Create a new Levenberg-Marquardt optimizer with default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new Levenberg-Marquardt optimizer with the given configuration.
    pub fn with_config(config: LmConfig) -> Self {
        Self { config }
    }

    /// The configuration in use.
    pub fn config(&self) -> &LmConfig {
        &self.config
    }

    /// Set the maximum number of iterations.
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.config.max_iterations = max_iterations;
        self
    }

    /// Set the tolerance for change in cost.
    pub fn with_ftol(mut self, ftol: f64) -> Self {
        self.config.ftol = ftol;
        self
    }

    /// Set the tolerance for change in parameter values.
    pub fn with_xtol(mut self, xtol: f64) -> Self {
        self.config.xtol = xtol;
        self
    }

    /// Set the tolerance for gradient norm.
    pub fn with_gtol(mut self, gtol: f64) -> Self {
        self.config.gtol = gtol;
        self
    }

    /// Set the initial value for the damping parameter.
    pub fn with_lambda(mut self, lambda: f64) -> Self {
        self.config.initial_lambda = lambda;
        self
    }

    /// Minimize the sum of squared residuals for the given problem.
    ///
    /// Running out of iterations, or failing to find a downhill step before
    /// the damping saturates, is reported through `success == false` with the
    /// best parameters found so far; only evaluation errors are returned as `Err`.
    ///
    /// # Arguments
    ///
    /// * `problem` - The problem to solve
    /// * `initial_params` - Initial guess for the parameter values
    pub fn minimize<P: Problem>(
        &self,
        problem: &P,
        initial_params: Array1<f64>,
    ) -> Result<LmResult> {
        let n_params = problem.parameter_count();
        if initial_params.len() != n_params {
            return Err(CurveError::DimensionMismatch(format!(
                "Expected {} parameters, got {}",
                n_params,
                initial_params.len()
            )));
        }

        let mut params = initial_params;
        let mut lambda = self.config.initial_lambda;

        let mut residuals = problem.eval(&params)?;
        let mut cost = sum_of_squares(&residuals);
        let mut func_evals = 1;
        let mut iterations = 0;

        let finish = |params: Array1<f64>,
                      residuals: Array1<f64>,
                      cost: f64,
                      iterations: usize,
                      func_evals: usize,
                      success: bool,
                      message: String| LmResult {
            params,
            residuals,
            cost,
            iterations,
            func_evals,
            success,
            message,
        };

        if !cost.is_finite() {
            return Ok(finish(
                params,
                residuals,
                cost,
                iterations,
                func_evals,
                false,
                "Cost is not finite at the initial parameters".to_string(),
            ));
        }

        let mut jacobian = self.finite_jacobian(problem, &params)?;
        func_evals += n_params;

        loop {
            if iterations >= self.config.max_iterations {
                let message = format!(
                    "Maximum iterations ({}) reached",
                    self.config.max_iterations
                );
                return Ok(finish(
                    params, residuals, cost, iterations, func_evals, false, message,
                ));
            }

            // Gradient g = Jᵀ r
            let j = ndarray_to_faer(&jacobian)?;
            let r = ndarray_vec_to_faer(&residuals)?;
            let g = j.transpose() * &r;
            let gradient_norm = g.norm_l2();

            if gradient_norm < self.config.gtol {
                let message = format!(
                    "Gradient convergence: ||g|| = {:.2e} < {:.2e}",
                    gradient_norm, self.config.gtol
                );
                return Ok(finish(
                    params, residuals, cost, iterations, func_evals, true, message,
                ));
            }

            let step = match Self::calculate_step(&jacobian, &residuals, lambda) {
                Some(step) => step,
                None => {
                    // Singular even with damping; damp harder
                    lambda = (lambda * self.config.lambda_up_factor).min(self.config.max_lambda);
                    if lambda >= self.config.max_lambda {
                        return Ok(finish(
                            params,
                            residuals,
                            cost,
                            iterations,
                            func_evals,
                            false,
                            "Failed to calculate step, and lambda reached maximum".to_string(),
                        ));
                    }
                    continue;
                }
            };

            let new_params = &params + &step;
            let new_residuals = problem.eval(&new_params)?;
            let new_cost = sum_of_squares(&new_residuals);
            func_evals += 1;

            if new_cost < cost {
                let param_change = step.iter().map(|x| x.abs()).fold(0.0, f64::max);
                let param_scale = params.iter().map(|x| x.abs()).fold(0.0, f64::max);
                let cost_change = (cost - new_cost) / cost.max(1e-300);

                params = new_params;
                residuals = new_residuals;
                cost = new_cost;
                lambda = (lambda * self.config.lambda_down_factor).max(self.config.min_lambda);
                iterations += 1;

                if param_change < self.config.xtol * (1.0 + param_scale) {
                    let message = format!(
                        "Parameter convergence: |dx| = {:.2e} < {:.2e}",
                        param_change,
                        self.config.xtol * (1.0 + param_scale)
                    );
                    return Ok(finish(
                        params, residuals, cost, iterations, func_evals, true, message,
                    ));
                }
                if cost_change < self.config.ftol {
                    let message = format!(
                        "Cost convergence: |df|/|f| = {:.2e} < {:.2e}",
                        cost_change, self.config.ftol
                    );
                    return Ok(finish(
                        params, residuals, cost, iterations, func_evals, true, message,
                    ));
                }

                jacobian = self.finite_jacobian(problem, &params)?;
                func_evals += n_params;
            } else {
                // Step rejected - increase lambda and try again
                lambda = (lambda * self.config.lambda_up_factor).min(self.config.max_lambda);

                if lambda >= self.config.max_lambda {
                    return Ok(finish(
                        params,
                        residuals,
                        cost,
                        iterations,
                        func_evals,
                        false,
                        "Failed to decrease cost, and lambda reached maximum".to_string(),
                    ));
                }
            }
        }
    }

    /// Jacobian with non-finite entries zeroed, so a single overflowing
    /// perturbation cannot poison the normal equations.
    fn finite_jacobian<P: Problem>(&self, problem: &P, params: &Array1<f64>) -> Result<Array2<f64>> {
        let mut jacobian = problem.jacobian(params)?;
        jacobian.mapv_inplace(|v| if v.is_finite() { v } else { 0.0 });
        Ok(jacobian)
    }

    /// Calculate the Levenberg-Marquardt step.
    ///
    /// Solves `(JᵀJ + λ·D) δ = -Jᵀr` with `D = diag(JᵀJ)` floored at 1e-10.
    /// Returns `None` when the damped system is not positive definite.
    fn calculate_step(j: &Array2<f64>, r: &Array1<f64>, lambda: f64) -> Option<Array1<f64>> {
        let jt = j.t();
        let mut a = jt.dot(j);
        let jtr = jt.dot(r);

        for i in 0..a.nrows() {
            a[[i, i]] += lambda * a[[i, i]].max(1e-10);
        }

        let solution = solve_cholesky(&a, &jtr)?;
        let step = -solution;
        if step.iter().all(|v| v.is_finite()) {
            Some(step)
        } else {
            None
        }
    }
}

/// Solve `A x = b` for symmetric positive definite `A` by Cholesky factorization.
fn solve_cholesky(a: &Array2<f64>, b: &Array1<f64>) -> Option<Array1<f64>> {
    let n = a.nrows();
    let mut l = a.clone();

    for k in 0..n {
        for j in 0..k {
            l[[k, k]] -= l[[k, j]] * l[[k, j]];
        }

        // Also rejects NaN pivots
        if !(l[[k, k]] > 0.0) {
            return None;
        }

        let lkk = l[[k, k]].sqrt();
        l[[k, k]] = lkk;

        for i in k + 1..n {
            for j in 0..k {
                l[[i, k]] -= l[[i, j]] * l[[k, j]];
            }
            l[[i, k]] /= lkk;
        }
    }

    // Forward substitution (L * y = b)
    let mut y = b.clone();
    for i in 0..n {
        for j in 0..i {
            y[i] -= l[[i, j]] * y[j];
        }
        y[i] /= l[[i, i]];
    }

    // Backward substitution (Lᵀ * x = y)
    let mut x = Array1::zeros(n);
    for i in (0..n).rev() {
        x[i] = y[i];
        for j in (i + 1)..n {
            x[i] -= l[[j, i]] * x[j];
        }
        x[i] /= l[[i, i]];
    }

    Some(x)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    /// A simple linear model for testing: f(x) = a * x + b
    struct LinearModel {
        x_data: Array1<f64>,
        y_data: Array1<f64>,
    }

    impl Problem for LinearModel {
        fn eval(&self, params: &Array1<f64>) -> Result<Array1<f64>> {
            let residuals = self
                .x_data
                .iter()
                .zip(self.y_data.iter())
                .map(|(x, y)| params[0] * x + params[1] - y)
                .collect::<Vec<f64>>();

            Ok(Array1::from_vec(residuals))
        }

        fn parameter_count(&self) -> usize {
            2
        }

        fn residual_count(&self) -> usize {
            self.x_data.len()
        }
    }

    /// y = a * exp(-b * x)
    struct Decay {
        x_data: Array1<f64>,
        y_data: Array1<f64>,
    }

    impl Problem for Decay {
        fn eval(&self, params: &Array1<f64>) -> Result<Array1<f64>> {
            Ok(&self.x_data.mapv(|x| params[0] * (-params[1] * x).exp()) - &self.y_data)
        }

        fn parameter_count(&self) -> usize {
            2
        }

        fn residual_count(&self) -> usize {
            self.x_data.len()
        }
    }

    #[test]
    fn test_linear_fit() {
        let model = LinearModel {
            x_data: array![1.0, 2.0, 3.0, 4.0, 5.0],
            y_data: array![5.1, 7.0, 8.9, 11.2, 13.0],
        };

        let lm = LevenbergMarquardt::new();
        let result = lm.minimize(&model, array![1.0, 1.0]).unwrap();

        assert!(result.success, "{}", result.message);
        assert_relative_eq!(result.params[0], 2.0, epsilon = 0.1);
        assert_relative_eq!(result.params[1], 3.0, epsilon = 0.2);
        assert!(result.cost < 0.1);
    }

    #[test]
    fn test_exponential_fit() {
        let x_data = Array1::linspace(0.0, 4.0, 20);
        let y_data = x_data.mapv(|x: f64| 3.0 * (-0.7 * x).exp());
        let model = Decay { x_data, y_data };

        let result = LevenbergMarquardt::new()
            .minimize(&model, array![1.0, 0.1])
            .unwrap();

        assert!(result.success, "{}", result.message);
        assert_relative_eq!(result.params[0], 3.0, epsilon = 1e-5);
        assert_relative_eq!(result.params[1], 0.7, epsilon = 1e-5);
    }

    #[test]
    fn test_iteration_budget_keeps_best_params() {
        let x_data = Array1::linspace(0.0, 4.0, 20);
        let y_data = x_data.mapv(|x: f64| 3.0 * (-0.7 * x).exp());
        let model = Decay { x_data, y_data };
        let initial_cost = model.eval_cost(&array![1.0, 0.1]).unwrap();

        let result = LevenbergMarquardt::new()
            .with_max_iterations(1)
            .minimize(&model, array![1.0, 0.1])
            .unwrap();

        assert!(!result.success);
        assert_eq!(result.iterations, 1);
        assert!(result.cost < initial_cost);
    }

    #[test]
    fn test_wrong_parameter_count() {
        let model = LinearModel {
            x_data: array![1.0],
            y_data: array![1.0],
        };
        let result = LevenbergMarquardt::new().minimize(&model, array![1.0, 2.0, 3.0]);
        assert!(matches!(result, Err(CurveError::DimensionMismatch(_))));
    }

    #[test]
    fn test_solve_cholesky() {
        let a = array![[4.0, 2.0], [2.0, 3.0]];
        let b = array![2.0, 1.0];
        let x = solve_cholesky(&a, &b).unwrap();
        assert_relative_eq!(x[0], 0.5, epsilon = 1e-12);
        assert_relative_eq!(x[1], 0.0, epsilon = 1e-12);

        assert!(solve_cholesky(&array![[0.0, 0.0], [0.0, 1.0]], &b).is_none());
    }
}
