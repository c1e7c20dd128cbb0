use crate::estimate::EstimationError;
use crate::loss::Loss;
use crate::penalty::{penalty_weights, soft_threshold, Penalty};
use ndarray::{Array1, ArrayView1, ArrayView2};
use serde::{Deserialize, Serialize};

/// Backtrack cap for the majorization search. With the default `phi0` and
/// `gamma` this allows the curvature to climb past 1e80 before the search is
/// declared divergent, far beyond any loss with finite curvature.
const MAX_MAJORIZATION_BACKTRACKS: usize = 500;

/// Optimizer configuration shared by every fit and cross-validation entry.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct IlammConfig {
    /// Floor and initial value of the isotropic curvature parameter phi.
    pub phi0: f64,
    /// Curvature inflation factor applied when majorization fails; must
    /// exceed 1.
    pub gamma: f64,
    /// Contraction-stage tolerance on the scaled step norm.
    pub epsilon_c: f64,
    /// Tightening-stage tolerance on the scaled step norm.
    pub epsilon_t: f64,
    /// Iteration bound for each contraction or tightening loop.
    pub ite_max: usize,
}

impl Default for IlammConfig {
    fn default() -> Self {
        Self {
            phi0: 1e-3,
            gamma: 1.5,
            epsilon_c: 1e-4,
            epsilon_t: 1e-4,
            ite_max: 500,
        }
    }
}

impl IlammConfig {
    pub(crate) fn validate(&self) -> Result<(), EstimationError> {
        if !(self.phi0 > 0.0) {
            return Err(EstimationError::InvalidInput(format!(
                "phi0 must be positive, got {}",
                self.phi0
            )));
        }
        if !(self.gamma > 1.0) {
            return Err(EstimationError::InvalidInput(format!(
                "gamma must exceed 1, got {}",
                self.gamma
            )));
        }
        if !(self.epsilon_c > 0.0) || !(self.epsilon_t > 0.0) {
            return Err(EstimationError::InvalidInput(format!(
                "tolerances must be positive, got epsilon_c = {}, epsilon_t = {}",
                self.epsilon_c, self.epsilon_t
            )));
        }
        Ok(())
    }
}

/// Terminal state of one I-LAMM run over an augmented design matrix.
pub(crate) struct IlammOutcome {
    pub beta: Array1<f64>,
    pub phi: f64,
    pub tightening_iterations: usize,
    pub converged: bool,
}

/// One generalized gradient update: descend along the loss gradient with
/// step `1/phi`, then soft-threshold by the scaled penalty weights.
pub(crate) fn proximal_step(
    beta: &Array1<f64>,
    gradient: &Array1<f64>,
    phi: f64,
    weights: &Array1<f64>,
) -> Array1<f64> {
    let step = beta - &gradient.mapv(|g| g / phi);
    soft_threshold(&step, &weights.mapv(|w| w / phi))
}

/// Adaptive majorization search.
///
/// Inflates `phi` until the isotropic quadratic majorizer dominates the
/// actual loss at the proximal candidate, then returns the candidate and the
/// accepted curvature. The loss value and gradient at `beta` are fixed over
/// the search, so they are computed once.
fn lamm_search(
    x: ArrayView2<f64>,
    y: ArrayView1<f64>,
    weights: &Array1<f64>,
    beta: &Array1<f64>,
    phi: f64,
    loss: Loss,
    gamma: f64,
    intercept: bool,
) -> Result<(Array1<f64>, f64), EstimationError> {
    let f_current = loss.value(y, &x.dot(beta));
    let gradient = loss.gradient(x, y, beta, intercept);
    let mut phi = phi;
    for _ in 0..MAX_MAJORIZATION_BACKTRACKS {
        let candidate = proximal_step(beta, &gradient, phi, weights);
        let f_candidate = loss.value(y, &x.dot(&candidate));
        let diff = &candidate - beta;
        let majorizer = f_current + gradient.dot(&diff) + 0.5 * phi * diff.dot(&diff);
        if f_candidate <= majorizer {
            return Ok((candidate, phi));
        }
        phi *= gamma;
    }
    Err(EstimationError::SearchDivergence { phi })
}

fn scaled_step_norm(new: &Array1<f64>, old: &Array1<f64>, scale: f64) -> f64 {
    let diff = new - old;
    diff.dot(&diff).sqrt() / scale
}

/// Two-stage I-LAMM driver.
///
/// Contraction solves one convex relaxation from the zero initialization;
/// tightening (skipped for Lasso) recomputes the penalty weights around each
/// successive estimate and re-solves until the outer estimate stabilizes.
/// Exhausting `ite_max` in either stage is recorded as `converged = false`,
/// never an error; the latest estimate is still returned.
pub(crate) fn ilamm(
    x: ArrayView2<f64>,
    y: ArrayView1<f64>,
    lambda: f64,
    penalty: Penalty,
    loss: Loss,
    config: &IlammConfig,
    intercept: bool,
) -> Result<IlammOutcome, EstimationError> {
    let p = x.ncols();
    let scale = (p as f64).sqrt();
    let mut beta = Array1::<f64>::zeros(p);
    let mut beta_new = Array1::<f64>::zeros(p);
    let mut phi = config.phi0;

    // Contraction stage. The weights are fixed at the zero initialization;
    // beta is deliberately not advanced on the breaking round.
    let weights = penalty_weights(&beta, lambda, penalty);
    let mut converged = false;
    let mut ite = 0;
    while ite <= config.ite_max {
        ite += 1;
        let (candidate, phi_used) =
            lamm_search(x, y, &weights, &beta, phi, loss, config.gamma, intercept)?;
        beta_new = candidate;
        phi = config.phi0.max(phi_used / config.gamma);
        if scaled_step_norm(&beta_new, &beta, scale) <= config.epsilon_c {
            converged = true;
            break;
        }
        beta = beta_new.clone();
    }
    if !converged {
        log::warn!(
            "I-LAMM contraction stage did not converge within {} iterations",
            config.ite_max
        );
    }

    let mut tightening_iterations = 0;
    if penalty.is_folded_concave() {
        let mut outer_converged = false;
        while tightening_iterations <= config.ite_max {
            tightening_iterations += 1;
            beta = beta_new.clone();
            let anchor = beta_new.clone();
            let weights = penalty_weights(&beta, lambda, penalty);
            phi = config.phi0;
            let mut ite = 0;
            while ite <= config.ite_max {
                ite += 1;
                let (candidate, phi_used) =
                    lamm_search(x, y, &weights, &beta, phi, loss, config.gamma, intercept)?;
                beta_new = candidate;
                phi = config.phi0.max(phi_used / config.gamma);
                if scaled_step_norm(&beta_new, &beta, scale) <= config.epsilon_t {
                    break;
                }
                beta = beta_new.clone();
            }
            if scaled_step_norm(&beta_new, &anchor, scale) <= config.epsilon_t {
                outer_converged = true;
                break;
            }
        }
        if !outer_converged {
            log::warn!(
                "I-LAMM tightening stage did not converge within {} rounds",
                config.ite_max
            );
        }
        converged = converged && outer_converged;
    }

    Ok(IlammOutcome {
        beta: beta_new,
        phi,
        tightening_iterations,
        converged,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array2};

    fn toy_problem() -> (Array2<f64>, Array1<f64>) {
        let x = Array2::from_shape_vec(
            (5, 3),
            vec![
                1.0, 0.2, -0.5, //
                1.0, 1.1, 0.3, //
                1.0, -0.7, 0.9, //
                1.0, 0.4, -1.2, //
                1.0, -0.3, 0.6,
            ],
        )
        .unwrap();
        let y = array![0.1, 2.3, -1.2, 0.9, -0.4];
        (x, y)
    }

    #[test]
    fn search_returns_curvature_satisfying_majorization() {
        let (x, y) = toy_problem();
        let beta = array![0.0, 0.5, -0.5];
        let weights = penalty_weights(&beta, 0.2, Penalty::Lasso);
        let loss = Loss::SquaredError;

        let (beta_new, phi_used) =
            lamm_search(x.view(), y.view(), &weights, &beta, 1e-3, loss, 1.5, false).unwrap();

        let f_new = loss.value(y.view(), &x.dot(&beta_new));
        let f_old = loss.value(y.view(), &x.dot(&beta));
        let grad = loss.gradient(x.view(), y.view(), &beta, false);
        let diff = &beta_new - &beta;
        let majorizer = f_old + grad.dot(&diff) + 0.5 * phi_used * diff.dot(&diff);
        assert!(f_new <= majorizer + 1e-12);
        assert!(phi_used >= 1e-3);
    }

    #[test]
    fn lasso_performs_no_tightening() {
        let (x, y) = toy_problem();
        let out = ilamm(
            x.view(),
            y.view(),
            0.1,
            Penalty::Lasso,
            Loss::SquaredError,
            &IlammConfig::default(),
            false,
        )
        .unwrap();
        assert_eq!(out.tightening_iterations, 0);
        assert!(out.converged);
        assert_eq!(out.beta[0], 0.0);
    }

    #[test]
    fn scad_runs_at_least_one_tightening_round() {
        let (x, y) = toy_problem();
        let out = ilamm(
            x.view(),
            y.view(),
            0.1,
            Penalty::Scad,
            Loss::SquaredError,
            &IlammConfig::default(),
            false,
        )
        .unwrap();
        assert!(out.tightening_iterations >= 1);
        assert!(out.phi >= IlammConfig::default().phi0);
    }

    #[test]
    fn exhausted_iteration_budget_is_reported_not_thrown() {
        let (x, y) = toy_problem();
        let config = IlammConfig {
            epsilon_c: 1e-15,
            ite_max: 2,
            ..IlammConfig::default()
        };
        let out = ilamm(
            x.view(),
            y.view(),
            0.01,
            Penalty::Lasso,
            Loss::SquaredError,
            &config,
            false,
        )
        .unwrap();
        assert!(!out.converged);
        assert_eq!(out.beta.len(), 3);
    }
}
