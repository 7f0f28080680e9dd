//! Integration tests for user-defined problems driven by both optimizers.

use approx::assert_relative_eq;
use battfit::{
    CurveError, FitMode, Fitter, LevenbergMarquardt, NelderMead, Problem, Result,
};
use ndarray::{array, Array1, Array2};

/// A simple linear model for testing: f(x) = a * x + b
struct LinearProblem {
    x_data: Array1<f64>,
    y_data: Array1<f64>,
}

impl LinearProblem {
    /// Noisy samples of y = 2x + 3
    fn noisy() -> Self {
        Self {
            x_data: array![1.0, 2.0, 3.0, 4.0, 5.0],
            y_data: array![5.1, 6.9, 9.2, 10.8, 13.1],
        }
    }
}

impl Problem for LinearProblem {
    fn eval(&self, params: &Array1<f64>) -> Result<Array1<f64>> {
        if params.len() != 2 {
            return Err(CurveError::DimensionMismatch(format!(
                "Expected 2 parameters, got {}",
                params.len()
            )));
        }

        Ok(&self.x_data.mapv(|x| params[0] * x + params[1]) - &self.y_data)
    }

    fn parameter_count(&self) -> usize {
        2
    }

    fn residual_count(&self) -> usize {
        self.x_data.len()
    }

    fn jacobian(&self, _params: &Array1<f64>) -> Result<Array2<f64>> {
        let mut jac = Array2::zeros((self.x_data.len(), 2));
        for (i, x) in self.x_data.iter().enumerate() {
            jac[[i, 0]] = *x;
            jac[[i, 1]] = 1.0;
        }
        Ok(jac)
    }
}

/// Rosenbrock as residuals: r1 = 1 - x, r2 = 10 (y - x²)
struct RosenbrockProblem;

impl Problem for RosenbrockProblem {
    fn eval(&self, params: &Array1<f64>) -> Result<Array1<f64>> {
        let (x, y) = (params[0], params[1]);
        Ok(array![1.0 - x, 10.0 * (y - x * x)])
    }

    fn parameter_count(&self) -> usize {
        2
    }

    fn residual_count(&self) -> usize {
        2
    }

    fn jacobian(&self, params: &Array1<f64>) -> Result<Array2<f64>> {
        Ok(array![[-1.0, 0.0], [-20.0 * params[0], 10.0]])
    }
}

/// Least-squares line through the noisy samples.
fn normal_equation_solution() -> (f64, f64) {
    let p = LinearProblem::noisy();
    let n = p.x_data.len() as f64;
    let sx = p.x_data.sum();
    let sy = p.y_data.sum();
    let sxx = p.x_data.dot(&p.x_data);
    let sxy = p.x_data.dot(&p.y_data);
    let a = (n * sxy - sx * sy) / (n * sxx - sx * sx);
    (a, (sy - a * sx) / n)
}

#[test]
fn test_lm_matches_normal_equations() {
    let (a, b) = normal_equation_solution();
    let result = LevenbergMarquardt::new()
        .minimize(&LinearProblem::noisy(), array![0.0, 0.0])
        .unwrap();

    assert!(result.success, "{}", result.message);
    assert_relative_eq!(result.params[0], a, epsilon = 1e-6);
    assert_relative_eq!(result.params[1], b, epsilon = 1e-6);
    assert_relative_eq!(result.cost, LinearProblem::noisy().eval_cost(&result.params).unwrap());
}

#[test]
fn test_simplex_matches_normal_equations() {
    let (a, b) = normal_equation_solution();
    let result = NelderMead::new()
        .minimize(&LinearProblem::noisy(), array![0.0, 0.0])
        .unwrap();

    assert_relative_eq!(result.params[0], a, epsilon = 1e-3);
    assert_relative_eq!(result.params[1], b, epsilon = 1e-3);
}

#[test]
fn test_lm_solves_rosenbrock() {
    let result = LevenbergMarquardt::new()
        .with_max_iterations(500)
        .minimize(&RosenbrockProblem, array![-1.2, 1.0])
        .unwrap();

    assert_relative_eq!(result.params[0], 1.0, epsilon = 1e-4);
    assert_relative_eq!(result.params[1], 1.0, epsilon = 1e-4);
}

#[test]
fn test_fitter_runs_every_mode() {
    let problem = LinearProblem::noisy();
    let fitter = Fitter::new();

    let lsq = fitter.fit(&problem, array![0.0, 0.0], FitMode::Lsq).unwrap();
    let fmin = fitter.fit(&problem, array![0.0, 0.0], FitMode::Simplex).unwrap();
    let both = fitter.fit(&problem, array![0.0, 0.0], FitMode::Both).unwrap();

    assert_eq!(lsq.mode, FitMode::Lsq);
    assert_eq!(fmin.mode, FitMode::Simplex);
    assert!(both.cost <= lsq.cost);
    assert_relative_eq!(both.rmse, (both.cost / 5.0).sqrt());
    assert!(fmin.func_evals > 0);
}

#[test]
fn test_wrong_parameter_count_propagates() {
    let err = LevenbergMarquardt::new().minimize(&LinearProblem::noisy(), array![1.0, 2.0, 3.0]);
    assert!(err.is_err());
}
