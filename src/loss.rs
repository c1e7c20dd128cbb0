use ndarray::{Array1, ArrayView1, ArrayView2};
use serde::{Deserialize, Serialize};

/// Loss selector for the optimizer. `Huber` carries its robustness scale:
/// quadratic for residuals within `tau`, linear beyond it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Loss {
    SquaredError,
    Huber { tau: f64 },
}

impl Loss {
    /// Mean loss of the predictions `y_hat` against the response `y`.
    pub fn value(self, y: ArrayView1<f64>, y_hat: &Array1<f64>) -> f64 {
        let n = y.len() as f64;
        match self {
            Loss::SquaredError => {
                let mut acc = 0.0;
                for i in 0..y.len() {
                    let r = y[i] - y_hat[i];
                    acc += r * r;
                }
                acc / (2.0 * n)
            }
            Loss::Huber { tau } => {
                let mut acc = 0.0;
                for i in 0..y.len() {
                    let r = y[i] - y_hat[i];
                    acc += if r.abs() <= tau {
                        r * r / 2.0
                    } else {
                        tau * r.abs() - tau * tau / 2.0
                    };
                }
                acc / n
            }
        }
    }

    /// Gradient of the mean loss with respect to `beta`.
    ///
    /// With `intercept` false the intercept component is forced to zero, so a
    /// gradient step leaves the intercept coefficient untouched.
    pub fn gradient(
        self,
        x: ArrayView2<f64>,
        y: ArrayView1<f64>,
        beta: &Array1<f64>,
        intercept: bool,
    ) -> Array1<f64> {
        let n = y.len() as f64;
        let residual = y.to_owned() - x.dot(beta);
        let score = match self {
            Loss::SquaredError => residual,
            Loss::Huber { tau } => {
                residual.mapv(|r| if r.abs() <= tau { r } else { tau * r.signum() })
            }
        };
        let mut grad = -x.t().dot(&score);
        if !intercept {
            grad[0] = 0.0;
        }
        grad / n
    }
}
