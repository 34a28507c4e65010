//! Nonlinear least squares for the calibration stages, solved with the
//! `levenberg-marquardt` crate.
//!
//! Problems only provide residuals; the Jacobian is a forward difference.
//! Parameters outside a problem's valid domain (a target point behind the
//! camera, a non-positive focal length) evaluate to a large constant residual
//! so the solver rejects the step instead of aborting.

use levenberg_marquardt::{LeastSquaresProblem, LevenbergMarquardt, TerminationReason};
use log::debug;
use nalgebra::{storage::Owned, DMatrix, DVector, Dyn};
use serde::{Deserialize, Serialize};

/// Residual assigned to every component when the parameters are invalid.
const INVALID_RESIDUAL: f64 = 1e6;

/// Stopping rule: at most `max_iters` rounds of residual evaluations, or a
/// relative change below `eps` in the cost and in the parameters.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct TermCriteria {
    pub max_iters: usize,
    pub eps: f64,
}

impl TermCriteria {
    pub fn new(max_iters: usize, eps: f64) -> Self {
        Self { max_iters, eps }
    }
}

impl Default for TermCriteria {
    fn default() -> Self {
        Self {
            max_iters: 30,
            eps: 1e-3,
        }
    }
}

/// Why a successful run stopped.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Termination {
    /// Cost or parameter change fell below the tolerance.
    Converged,
    /// Residuals are exactly zero.
    ResidualsZero,
    /// Residuals are orthogonal to the Jacobian columns.
    Orthogonal,
    /// The tolerance is below machine precision for this problem.
    Stalled,
    /// The evaluation budget derived from `max_iters` ran out.
    MaxEvaluations,
}

/// A residual function `r(x)`; the solver minimizes `0.5 * ||r(x)||^2`.
pub(crate) trait ResidualProblem {
    fn num_params(&self) -> usize;

    /// `None` when `params` is outside the valid domain.
    fn residuals(&self, params: &DVector<f64>) -> Option<DVector<f64>>;
}

#[derive(Clone, Debug)]
pub(crate) struct Solution {
    pub params: DVector<f64>,
    pub evaluations: usize,
    pub termination: Termination,
}

/// Hard failures of a solve.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum SolveError {
    #[error("initial guess has {got} parameters, problem has {expected}")]
    ParameterCount { expected: usize, got: usize },

    #[error("initial parameters are outside the valid domain")]
    InvalidStart,

    #[error("solver stopped: {0}")]
    Terminated(String),

    #[error("parameters diverged to non-finite values")]
    NonFinite,
}

struct LmWrapper<'a, P: ResidualProblem + ?Sized> {
    problem: &'a P,
    params: DVector<f64>,
    residual_count: usize,
}

impl<P: ResidualProblem + ?Sized> LmWrapper<'_, P> {
    fn residuals_at(&self, params: &DVector<f64>) -> DVector<f64> {
        match self.problem.residuals(params) {
            Some(r) if r.len() == self.residual_count && r.iter().all(|v| v.is_finite()) => r,
            _ => DVector::from_element(self.residual_count, INVALID_RESIDUAL),
        }
    }
}

impl<P: ResidualProblem + ?Sized> LeastSquaresProblem<f64, Dyn, Dyn> for LmWrapper<'_, P> {
    type ResidualStorage = Owned<f64, Dyn>;
    type JacobianStorage = Owned<f64, Dyn, Dyn>;
    type ParameterStorage = Owned<f64, Dyn>;

    fn set_params(&mut self, x: &DVector<f64>) {
        self.params.clone_from(x);
    }

    fn params(&self) -> DVector<f64> {
        self.params.clone()
    }

    fn residuals(&self) -> Option<DVector<f64>> {
        Some(self.residuals_at(&self.params))
    }

    fn jacobian(&self) -> Option<DMatrix<f64>> {
        let base = self.residuals_at(&self.params);
        let mut jac = DMatrix::zeros(self.residual_count, self.params.len());
        let mut shifted = self.params.clone();
        for j in 0..self.params.len() {
            let h = difference_step(self.params[j]);
            shifted[j] = self.params[j] + h;
            let column = (self.residuals_at(&shifted) - &base) / h;
            shifted[j] = self.params[j];
            jac.set_column(j, &column);
        }
        Some(jac)
    }
}

#[inline]
fn difference_step(x: f64) -> f64 {
    1e-7 * x.abs().max(1e-2)
}

/// Minimize `problem` starting from `initial`.
pub(crate) fn solve<P: ResidualProblem + ?Sized>(
    problem: &P,
    initial: DVector<f64>,
    criteria: TermCriteria,
) -> Result<Solution, SolveError> {
    if initial.len() != problem.num_params() {
        return Err(SolveError::ParameterCount {
            expected: problem.num_params(),
            got: initial.len(),
        });
    }
    let residual_count = match problem.residuals(&initial) {
        Some(r) if r.iter().all(|v| v.is_finite()) => r.len(),
        _ => return Err(SolveError::InvalidStart),
    };

    let lm = LevenbergMarquardt::new()
        .with_ftol(criteria.eps)
        .with_xtol(criteria.eps)
        .with_patience(criteria.max_iters.max(1));
    let wrapper = LmWrapper {
        problem,
        params: initial,
        residual_count,
    };
    let (wrapper, report) = lm.minimize(wrapper);

    let termination = match report.termination {
        TerminationReason::ResidualsZero => Termination::ResidualsZero,
        TerminationReason::Orthogonal => Termination::Orthogonal,
        TerminationReason::Converged { .. } => Termination::Converged,
        TerminationReason::NoImprovementPossible(_) => Termination::Stalled,
        TerminationReason::LostPatience => Termination::MaxEvaluations,
        other => return Err(SolveError::Terminated(format!("{other:?}"))),
    };
    let params = wrapper.params();
    if !params.iter().all(|v| v.is_finite()) {
        return Err(SolveError::NonFinite);
    }
    debug!(
        "lm: {} evaluations, cost {:.6e}, {termination:?}",
        report.number_of_evaluations, report.objective_function
    );
    Ok(Solution {
        params,
        evaluations: report.number_of_evaluations,
        termination,
    })
}
