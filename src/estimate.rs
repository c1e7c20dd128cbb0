use crate::lamm::{ilamm, IlammConfig};
use crate::loss::Loss;
use crate::penalty::Penalty;
use ndarray::{s, Array1, Array2, ArrayView1, ArrayView2};
use thiserror::Error;

/// Normal consistency constant for the median absolute deviation,
/// `1 / qnorm(3/4)`.
const MAD_CONSISTENCY: f64 = 0.6745;

#[derive(Debug, Error)]
pub enum EstimationError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error(
        "The majorization search failed to terminate; curvature reached {phi:.3e}. \
         The supplied loss/penalty pair likely violates the Lipschitz-gradient contract."
    )]
    SearchDivergence { phi: f64 },
}

/// Terminal state of one regularized fit.
#[derive(Debug, Clone)]
pub struct FitResult {
    /// Estimated coefficients, length d+1; index 0 is the intercept
    /// (exactly 0 when the model was fit without one).
    pub beta: Array1<f64>,
    /// Final value of the isotropic curvature parameter.
    pub phi: f64,
    pub penalty: Penalty,
    pub lambda: f64,
    /// Huber robustness scale; `None` for squared-error fits.
    pub tau: Option<f64>,
    /// Number of tightening rounds performed; 0 for Lasso by construction.
    pub tightening_iterations: usize,
    /// False when the contraction or tightening loop exhausted `ite_max`.
    pub converged: bool,
}

pub(crate) fn validate_data(
    x: ArrayView2<f64>,
    y: ArrayView1<f64>,
) -> Result<(), EstimationError> {
    if y.is_empty() {
        return Err(EstimationError::InvalidInput(
            "response vector is empty".to_string(),
        ));
    }
    if x.nrows() != y.len() {
        return Err(EstimationError::InvalidInput(format!(
            "design matrix has {} rows but the response has length {}",
            x.nrows(),
            y.len()
        )));
    }
    Ok(())
}

/// Prepend a column of ones unless the caller declares it already present.
pub(crate) fn augment_design(x: ArrayView2<f64>, itcp_included: bool) -> Array2<f64> {
    if itcp_included {
        return x.to_owned();
    }
    let mut xx = Array2::<f64>::ones((x.nrows(), x.ncols() + 1));
    xx.slice_mut(s![.., 1..]).assign(&x);
    xx
}

/// `(lambda_min, lambda_max)` over the augmented design: the largest
/// absolute marginal covariance `|Y' X_j| / n` and one percent of it.
pub(crate) fn lambda_range(x: &Array2<f64>, y: ArrayView1<f64>) -> (f64, f64) {
    let n = y.len() as f64;
    let covariances = x.t().dot(&y);
    let lambda_max = covariances.iter().fold(0.0_f64, |m, c| m.max(c.abs())) / n;
    (0.01 * lambda_max, lambda_max)
}

/// Default tuning parameter: a fixed interpolation point on the log scale,
/// `exp(0.7 ln(lambda_max) + 0.3 ln(lambda_min))`.
pub(crate) fn default_lambda(x: &Array2<f64>, y: ArrayView1<f64>) -> f64 {
    let (lambda_min, lambda_max) = lambda_range(x, y);
    (0.7 * lambda_max.ln() + 0.3 * lambda_min.ln()).exp()
}

pub(crate) fn median(values: &Array1<f64>) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let n = sorted.len();
    if n % 2 == 1 {
        sorted[n / 2]
    } else {
        0.5 * (sorted[n / 2 - 1] + sorted[n / 2])
    }
}

/// Normal-consistent robust scale: `median(|r - median(r)|) / 0.6745`.
pub(crate) fn mad_scale(residual: &Array1<f64>) -> f64 {
    let center = median(residual);
    let deviations = residual.mapv(|r| (r - center).abs());
    median(&deviations) / MAD_CONSISTENCY
}

/// Sample-size rate `sqrt(n / ln(n d))` scaling the robustness parameter.
pub(crate) fn tau_rate(n: usize, d: usize) -> f64 {
    (n as f64 / (n as f64 * d as f64).ln()).sqrt()
}

/// Default Huber robustness scale: MAD of the residuals from a Lasso fit at
/// the same `lambda`, scaled by `sqrt(n / ln(n d))`.
fn default_tau(
    xx: &Array2<f64>,
    y: ArrayView1<f64>,
    lambda: f64,
    config: &IlammConfig,
    intercept: bool,
) -> Result<f64, EstimationError> {
    let pilot = ilamm(
        xx.view(),
        y,
        lambda,
        Penalty::Lasso,
        Loss::SquaredError,
        config,
        intercept,
    )?;
    let residual = y.to_owned() - xx.dot(&pilot.beta);
    let d = xx.ncols() - 1;
    Ok(mad_scale(&residual) * tau_rate(y.len(), d))
}

pub(crate) fn validate_positive(value: f64, name: &str) -> Result<(), EstimationError> {
    if !(value > 0.0) {
        return Err(EstimationError::InvalidInput(format!(
            "{name} must be positive, got {value}"
        )));
    }
    Ok(())
}

/// Fit a regularized regression with squared-error loss.
///
/// `lambda = None` selects the default log-interpolated tuning parameter.
/// With `itcp_included` the design matrix is used as-is; otherwise a column
/// of ones is prepended. The intercept coefficient is only estimated when
/// `intercept` is true.
pub fn fit_regularized(
    x: ArrayView2<f64>,
    y: ArrayView1<f64>,
    lambda: Option<f64>,
    penalty: Penalty,
    config: &IlammConfig,
    intercept: bool,
    itcp_included: bool,
) -> Result<FitResult, EstimationError> {
    validate_data(x, y)?;
    config.validate()?;
    if let Some(l) = lambda {
        validate_positive(l, "lambda")?;
    }
    let xx = augment_design(x, itcp_included);
    let lambda = match lambda {
        Some(l) => l,
        None => default_lambda(&xx, y),
    };
    let out = ilamm(
        xx.view(),
        y,
        lambda,
        penalty,
        Loss::SquaredError,
        config,
        intercept,
    )?;
    Ok(FitResult {
        beta: out.beta,
        phi: out.phi,
        penalty,
        lambda,
        tau: None,
        tightening_iterations: out.tightening_iterations,
        converged: out.converged,
    })
}

/// Fit a regularized regression with Huber loss.
///
/// `tau = None` derives the robustness scale from the median absolute
/// deviation of a pilot Lasso fit's residuals; otherwise the supplied value
/// is used unchanged.
pub fn fit_regularized_huber(
    x: ArrayView2<f64>,
    y: ArrayView1<f64>,
    lambda: Option<f64>,
    penalty: Penalty,
    tau: Option<f64>,
    config: &IlammConfig,
    intercept: bool,
    itcp_included: bool,
) -> Result<FitResult, EstimationError> {
    validate_data(x, y)?;
    config.validate()?;
    if let Some(l) = lambda {
        validate_positive(l, "lambda")?;
    }
    if let Some(t) = tau {
        validate_positive(t, "tau")?;
    }
    let xx = augment_design(x, itcp_included);
    let lambda = match lambda {
        Some(l) => l,
        None => default_lambda(&xx, y),
    };
    let tau = match tau {
        Some(t) => t,
        None => default_tau(&xx, y, lambda, config, intercept)?,
    };
    let out = ilamm(
        xx.view(),
        y,
        lambda,
        penalty,
        Loss::Huber { tau },
        config,
        intercept,
    )?;
    Ok(FitResult {
        beta: out.beta,
        phi: out.phi,
        penalty,
        lambda,
        tau: Some(tau),
        tightening_iterations: out.tightening_iterations,
        converged: out.converged,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn augmentation_prepends_ones_once() {
        let x = Array2::from_shape_vec((2, 2), vec![2.0, 3.0, 4.0, 5.0]).unwrap();
        let xx = augment_design(x.view(), false);
        assert_eq!(xx.ncols(), 3);
        assert_eq!(xx.column(0).to_vec(), vec![1.0, 1.0]);
        assert_eq!(xx[[1, 2]], 5.0);

        let same = augment_design(xx.view(), true);
        assert_eq!(same, xx);
    }

    #[test]
    fn default_lambda_lies_strictly_inside_its_range() {
        let x = Array2::from_shape_vec((4, 2), vec![0.5, 1.0, -1.0, 0.2, 2.0, -0.4, 0.1, 0.9])
            .unwrap();
        let y = array![1.0, -0.5, 2.5, 0.3];
        let xx = augment_design(x.view(), false);
        let (lambda_min, lambda_max) = lambda_range(&xx, y.view());
        let lambda = default_lambda(&xx, y.view());
        assert!(lambda > lambda_min);
        assert!(lambda < lambda_max);
    }

    #[test]
    fn median_handles_both_parities() {
        assert_eq!(median(&array![3.0, 1.0, 2.0]), 2.0);
        assert_eq!(median(&array![4.0, 1.0, 2.0, 3.0]), 2.5);
    }

    #[test]
    fn shape_mismatch_fails_fast() {
        let x = Array2::<f64>::zeros((3, 2));
        let y = array![1.0, 2.0];
        let err = fit_regularized(
            x.view(),
            y.view(),
            None,
            Penalty::Scad,
            &IlammConfig::default(),
            false,
            false,
        )
        .unwrap_err();
        assert!(matches!(err, EstimationError::InvalidInput(_)));
    }

    #[test]
    fn non_positive_parameters_fail_fast() {
        let x = Array2::<f64>::ones((4, 2));
        let y = array![1.0, 2.0, 3.0, 4.0];
        let bad_lambda = fit_regularized(
            x.view(),
            y.view(),
            Some(0.0),
            Penalty::Lasso,
            &IlammConfig::default(),
            false,
            false,
        );
        assert!(matches!(bad_lambda, Err(EstimationError::InvalidInput(_))));

        let bad_gamma = IlammConfig {
            gamma: 1.0,
            ..IlammConfig::default()
        };
        let err = fit_regularized(
            x.view(),
            y.view(),
            Some(0.1),
            Penalty::Lasso,
            &bad_gamma,
            false,
            false,
        );
        assert!(matches!(err, Err(EstimationError::InvalidInput(_))));
    }
}
