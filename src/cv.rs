use crate::estimate::{
    augment_design, lambda_range, mad_scale, tau_rate, validate_data, validate_positive,
    EstimationError,
};
use crate::lamm::{ilamm, IlammConfig};
use crate::loss::Loss;
use crate::penalty::Penalty;
use ndarray::{s, Array1, Array2, ArrayView1, ArrayView2, ShapeBuilder};
use rayon::prelude::*;

/// Result of a cross-validated squared-error fit.
#[derive(Debug, Clone)]
pub struct CvResult {
    /// Coefficients refit on the full data at `lambda_min`.
    pub beta: Array1<f64>,
    pub penalty: Penalty,
    /// Grid searched, increasing.
    pub lambda_seq: Array1<f64>,
    /// Held-out prediction error per grid point: the Euclidean norm of
    /// `Y - YPred` after every fold has populated its slice.
    pub mse: Array1<f64>,
    /// Grid value achieving the minimal error (first on ties).
    pub lambda_min: f64,
    /// Number of folds actually used after capping.
    pub nfolds: usize,
}

/// Result of a cross-validated Huber fit over a two-parameter grid.
#[derive(Debug, Clone)]
pub struct CvHuberResult {
    /// Coefficients refit on the full data at `(lambda_min, tau_min)`.
    pub beta: Array1<f64>,
    pub penalty: Penalty,
    pub lambda_seq: Array1<f64>,
    pub tau_seq: Array1<f64>,
    /// Held-out error surface, `nlambda` by `ntau`.
    pub mse: Array2<f64>,
    pub lambda_min: f64,
    pub tau_min: f64,
    pub nfolds: usize,
}

/// Row range `[start, end)` of fold `j`; the last fold absorbs the remainder.
pub(crate) fn fold_bounds(n: usize, nfolds: usize, j: usize) -> (usize, usize) {
    let size = n / nfolds;
    let start = j * size;
    let end = if j == nfolds - 1 { n } else { (j + 1) * size };
    (start, end)
}

pub(crate) fn cap_nfolds(nfolds: usize, n: usize) -> usize {
    if nfolds > 10 || nfolds > n {
        let capped = n.min(10);
        log::warn!("nfolds = {nfolds} is too large, capping at {capped}");
        capped
    } else {
        nfolds
    }
}

/// Default grid: `count` points spread uniformly on the log scale between
/// `lambda_min` and `lambda_max`, increasing.
fn default_lambda_grid(xx: &Array2<f64>, y: ArrayView1<f64>, count: usize) -> Array1<f64> {
    let (lambda_min, lambda_max) = lambda_range(xx, y);
    Array1::linspace(lambda_min.ln(), lambda_max.ln(), count).mapv(f64::exp)
}

/// Power-of-two ladder spreading the default tau grid around the MAD-based
/// rate. Length is exactly `count`: for odd `count` the ladder is symmetric
/// around 1, for even `count` it carries one extra non-negative power.
pub(crate) fn tau_grid_constants(count: usize) -> Array1<f64> {
    if count == 0 {
        return Array1::zeros(0);
    }
    let half = count / 2;
    let start = if count % 2 == 0 { half - 1 } else { half };
    let mut ladder = Vec::with_capacity(count);
    for i in (1..=start).rev() {
        ladder.push(2f64.powi(-(i as i32)));
    }
    for i in 0..=half {
        ladder.push(2f64.powi(i as i32));
    }
    Array1::from_vec(ladder)
}

fn complement_rows(
    x: &Array2<f64>,
    y: ArrayView1<f64>,
    start: usize,
    end: usize,
) -> (Array2<f64>, Array1<f64>) {
    let n = x.nrows();
    let kept = n - (end - start);
    let mut xc = Array2::<f64>::zeros((kept, x.ncols()));
    let mut yc = Array1::<f64>::zeros(kept);
    for (row, i) in (0..start).chain(end..n).enumerate() {
        xc.row_mut(row).assign(&x.row(i));
        yc[row] = y[i];
    }
    (xc, yc)
}

fn index_min(values: &[f64]) -> usize {
    let mut best = 0;
    for (i, v) in values.iter().enumerate() {
        if *v < values[best] {
            best = i;
        }
    }
    best
}

struct GridFit {
    mse: Vec<f64>,
    min_index: usize,
    beta: Array1<f64>,
    nfolds: usize,
}

/// Score every grid point by k-fold cross-validation and refit on the full
/// data at the minimizer.
///
/// Each grid point is independent given the fold split, so points are
/// evaluated in parallel; every task owns its own prediction buffer and the
/// per-point numbers match the sequential reference exactly. Within one
/// point, each fold writes `X_fold * beta_hat` into its own slice of the
/// buffer and the error norm is taken once after all folds.
fn cv_core(
    xx: &Array2<f64>,
    y: ArrayView1<f64>,
    grid: &[(f64, Loss)],
    penalty: Penalty,
    config: &IlammConfig,
    nfolds: usize,
    intercept: bool,
) -> Result<GridFit, EstimationError> {
    let n = y.len();
    let nfolds = cap_nfolds(nfolds, n);
    let mse = grid
        .par_iter()
        .map(|&(lambda, loss)| -> Result<f64, EstimationError> {
            let mut y_pred = Array1::<f64>::zeros(n);
            for j in 0..nfolds {
                let (start, end) = fold_bounds(n, nfolds, j);
                let (x_train, y_train) = complement_rows(xx, y, start, end);
                let fit = ilamm(
                    x_train.view(),
                    y_train.view(),
                    lambda,
                    penalty,
                    loss,
                    config,
                    intercept,
                )?;
                let held_out = xx.slice(s![start..end, ..]);
                y_pred
                    .slice_mut(s![start..end])
                    .assign(&held_out.dot(&fit.beta));
            }
            let diff = y.to_owned() - y_pred;
            Ok(diff.dot(&diff).sqrt())
        })
        .collect::<Result<Vec<f64>, _>>()?;

    let min_index = index_min(&mse);
    let (lambda, loss) = grid[min_index];
    let refit = ilamm(xx.view(), y, lambda, penalty, loss, config, intercept)?;
    Ok(GridFit {
        mse,
        min_index,
        beta: refit.beta,
        nfolds,
    })
}

fn resolve_lambda_grid(
    lambda_seq: Option<ArrayView1<f64>>,
    nlambda: usize,
    xx: &Array2<f64>,
    y: ArrayView1<f64>,
) -> Result<Array1<f64>, EstimationError> {
    match lambda_seq {
        Some(seq) => {
            if seq.is_empty() {
                return Err(EstimationError::InvalidInput(
                    "lambda grid is empty".to_string(),
                ));
            }
            for &l in seq.iter() {
                validate_positive(l, "every lambda grid value")?;
            }
            Ok(seq.to_owned())
        }
        None => {
            if nlambda == 0 {
                return Err(EstimationError::InvalidInput(
                    "nlambda must be at least 1".to_string(),
                ));
            }
            Ok(default_lambda_grid(xx, y, nlambda))
        }
    }
}

/// K-fold cross-validation over a lambda grid with squared-error loss.
///
/// Builds the default log-spaced grid when `lambda_seq` is `None`, caps
/// `nfolds` at `min(10, n)`, scores every grid point on held-out folds and
/// refits on the full data at the best value.
pub fn cv_regularized(
    x: ArrayView2<f64>,
    y: ArrayView1<f64>,
    lambda_seq: Option<ArrayView1<f64>>,
    nlambda: usize,
    penalty: Penalty,
    config: &IlammConfig,
    nfolds: usize,
    intercept: bool,
    itcp_included: bool,
) -> Result<CvResult, EstimationError> {
    validate_data(x, y)?;
    config.validate()?;
    if nfolds == 0 {
        return Err(EstimationError::InvalidInput(
            "nfolds must be at least 1".to_string(),
        ));
    }
    let xx = augment_design(x, itcp_included);
    let lambda_seq = resolve_lambda_grid(lambda_seq, nlambda, &xx, y)?;

    let grid: Vec<(f64, Loss)> = lambda_seq.iter().map(|&l| (l, Loss::SquaredError)).collect();
    let fit = cv_core(&xx, y, &grid, penalty, config, nfolds, intercept)?;
    let lambda_min = lambda_seq[fit.min_index];
    Ok(CvResult {
        beta: fit.beta,
        penalty,
        lambda_seq,
        mse: Array1::from_vec(fit.mse),
        lambda_min,
        nfolds: fit.nfolds,
    })
}

/// K-fold cross-validation over a two-parameter (lambda, tau) grid with
/// Huber loss.
///
/// The default tau grid spreads the power-of-two ladder around the MAD scale
/// of residuals from a Lasso cross-validated fit over the same lambda grid.
/// The flattened surface is scanned with lambda as the fast-varying index.
pub fn cv_regularized_huber(
    x: ArrayView2<f64>,
    y: ArrayView1<f64>,
    lambda_seq: Option<ArrayView1<f64>>,
    nlambda: usize,
    penalty: Penalty,
    tau_seq: Option<ArrayView1<f64>>,
    ntau: usize,
    config: &IlammConfig,
    nfolds: usize,
    intercept: bool,
    itcp_included: bool,
) -> Result<CvHuberResult, EstimationError> {
    validate_data(x, y)?;
    config.validate()?;
    if nfolds == 0 {
        return Err(EstimationError::InvalidInput(
            "nfolds must be at least 1".to_string(),
        ));
    }
    let xx = augment_design(x, itcp_included);
    let n = y.len();
    let lambda_seq = resolve_lambda_grid(lambda_seq, nlambda, &xx, y)?;
    let nlambda = lambda_seq.len();

    let tau_seq = match tau_seq {
        Some(seq) => {
            if seq.is_empty() {
                return Err(EstimationError::InvalidInput(
                    "tau grid is empty".to_string(),
                ));
            }
            for &t in seq.iter() {
                validate_positive(t, "every tau grid value")?;
            }
            seq.to_owned()
        }
        None => {
            if ntau == 0 {
                return Err(EstimationError::InvalidInput(
                    "ntau must be at least 1".to_string(),
                ));
            }
            // Pilot scale: a Lasso cross-validated fit over the same lambda
            // grid supplies the residuals for the MAD estimate.
            let lasso_grid: Vec<(f64, Loss)> =
                lambda_seq.iter().map(|&l| (l, Loss::SquaredError)).collect();
            let pilot = cv_core(
                &xx,
                y,
                &lasso_grid,
                Penalty::Lasso,
                config,
                nfolds,
                intercept,
            )?;
            let residual = y.to_owned() - xx.dot(&pilot.beta);
            let scale = mad_scale(&residual) * tau_rate(n, xx.ncols() - 1);
            tau_grid_constants(ntau).mapv(|c| c * scale)
        }
    };
    let ntau = tau_seq.len();

    // Column-major flattening: lambda is the fast-varying index.
    let mut grid = Vec::with_capacity(nlambda * ntau);
    for &tau in tau_seq.iter() {
        for &lambda in lambda_seq.iter() {
            grid.push((lambda, Loss::Huber { tau }));
        }
    }
    let fit = cv_core(&xx, y, &grid, penalty, config, nfolds, intercept)?;
    let lambda_index = fit.min_index % nlambda;
    let tau_index = fit.min_index / nlambda;

    let mse = Array2::from_shape_vec((nlambda, ntau).f(), fit.mse).map_err(|e| {
        EstimationError::InvalidInput(format!("error surface shape mismatch: {e}"))
    })?;
    Ok(CvHuberResult {
        beta: fit.beta,
        penalty,
        lambda_min: lambda_seq[lambda_index],
        tau_min: tau_seq[tau_index],
        lambda_seq,
        tau_seq,
        mse,
        nfolds: fit.nfolds,
    })
}
