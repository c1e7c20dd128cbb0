use ilamm::{cv_regularized, cv_regularized_huber, IlammConfig, Penalty};
use ndarray::{array, Array1, Array2};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};

fn synthetic_regression(n: usize, d: usize, active: usize, seed: u64) -> (Array2<f64>, Array1<f64>) {
    let mut rng = StdRng::seed_from_u64(seed);
    let normal = Normal::new(0.0, 1.0).unwrap();
    let mut x = Array2::zeros((n, d));
    for i in 0..n {
        for j in 0..d {
            x[[i, j]] = normal.sample(&mut rng);
        }
    }
    let mut beta = Array1::zeros(d);
    for j in 0..active {
        beta[j] = 2.0;
    }
    let mut y = x.dot(&beta);
    for v in y.iter_mut() {
        *v += normal.sample(&mut rng);
    }
    (x, y)
}

#[test]
fn cv_selects_a_grid_member_and_scores_every_point() {
    let (x, y) = synthetic_regression(40, 8, 2, 101);
    let nlambda = 8;
    let result = cv_regularized(
        x.view(),
        y.view(),
        None,
        nlambda,
        Penalty::Scad,
        &IlammConfig::default(),
        3,
        false,
        false,
    )
    .unwrap();

    assert_eq!(result.lambda_seq.len(), nlambda);
    assert_eq!(result.mse.len(), nlambda);
    assert!(result.mse.iter().all(|&m| m >= 0.0));
    assert!(result.lambda_seq.iter().any(|&l| l == result.lambda_min));
    assert_eq!(result.beta.len(), x.ncols() + 1);
    assert_eq!(result.nfolds, 3);

    // The grid is increasing and the selected value attains the minimum.
    for w in result.lambda_seq.windows(2) {
        assert!(w[0] < w[1]);
    }
    let best = result
        .mse
        .iter()
        .cloned()
        .fold(f64::INFINITY, f64::min);
    let selected_idx = result
        .lambda_seq
        .iter()
        .position(|&l| l == result.lambda_min)
        .unwrap();
    assert_eq!(result.mse[selected_idx], best);
}

#[test]
fn user_grid_overrides_the_default() {
    let (x, y) = synthetic_regression(30, 5, 2, 7);
    let grid = array![0.05, 0.2, 0.8];
    let result = cv_regularized(
        x.view(),
        y.view(),
        Some(grid.view()),
        30, // ignored when a grid is supplied
        Penalty::Lasso,
        &IlammConfig::default(),
        3,
        false,
        false,
    )
    .unwrap();
    assert_eq!(result.lambda_seq, grid);
    assert_eq!(result.mse.len(), 3);
}

#[test]
fn oversized_nfolds_is_capped() {
    let (x, y) = synthetic_regression(8, 3, 1, 13);
    let result = cv_regularized(
        x.view(),
        y.view(),
        Some(array![0.1, 0.5].view()),
        0,
        Penalty::Lasso,
        &IlammConfig::default(),
        50,
        false,
        false,
    )
    .unwrap();
    assert_eq!(result.nfolds, 8);
}

#[test]
fn huber_cv_searches_the_two_parameter_surface() {
    let (x, y) = synthetic_regression(36, 6, 2, 59);
    let nlambda = 6;
    let ntau = 3;
    let result = cv_regularized_huber(
        x.view(),
        y.view(),
        None,
        nlambda,
        Penalty::Mcp,
        None,
        ntau,
        &IlammConfig::default(),
        3,
        false,
        false,
    )
    .unwrap();

    assert_eq!(result.lambda_seq.len(), nlambda);
    assert_eq!(result.tau_seq.len(), ntau);
    assert_eq!(result.mse.dim(), (nlambda, ntau));
    assert!(result.mse.iter().all(|&m| m >= 0.0));
    assert!(result.lambda_seq.iter().any(|&l| l == result.lambda_min));
    assert!(result.tau_seq.iter().any(|&t| t == result.tau_min));
    assert!(result.tau_seq.iter().all(|&t| t > 0.0));

    // The selected pair attains the surface minimum.
    let best = result
        .mse
        .iter()
        .cloned()
        .fold(f64::INFINITY, f64::min);
    let li = result
        .lambda_seq
        .iter()
        .position(|&l| l == result.lambda_min)
        .unwrap();
    let ti = result
        .tau_seq
        .iter()
        .position(|&t| t == result.tau_min)
        .unwrap();
    assert_eq!(result.mse[(li, ti)], best);
}

#[test]
fn huber_cv_accepts_explicit_grids() {
    let (x, y) = synthetic_regression(30, 4, 1, 77);
    let lambdas = array![0.1, 0.4];
    let taus = array![0.5, 1.0, 2.0];
    let result = cv_regularized_huber(
        x.view(),
        y.view(),
        Some(lambdas.view()),
        0,
        Penalty::Scad,
        Some(taus.view()),
        0,
        &IlammConfig::default(),
        3,
        false,
        false,
    )
    .unwrap();
    assert_eq!(result.lambda_seq, lambdas);
    assert_eq!(result.tau_seq, taus);
    assert_eq!(result.mse.dim(), (2, 3));
}

#[test]
fn invalid_grids_fail_fast() {
    let (x, y) = synthetic_regression(20, 3, 1, 3);
    let err = cv_regularized(
        x.view(),
        y.view(),
        Some(array![0.1, -0.5].view()),
        0,
        Penalty::Lasso,
        &IlammConfig::default(),
        3,
        false,
        false,
    );
    assert!(err.is_err());

    let err = cv_regularized_huber(
        x.view(),
        y.view(),
        None,
        5,
        Penalty::Lasso,
        Some(Array1::<f64>::zeros(0).view()),
        0,
        &IlammConfig::default(),
        3,
        false,
        false,
    );
    assert!(err.is_err());
}
