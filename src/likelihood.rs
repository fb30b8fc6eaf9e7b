/*!
# Gaussian log-likelihood of a disk model

[`LogLikelihood`] maps a flat parameter vector to

```text
ln L = -1/2 · Σ_i [ (y_i - f(x_i))² / σ_i² + ln σ_i² ]
```

where `f` is the potential, density or force norm of the model rebuilt from
the vector. Parameter vectors describing an inadmissible model are not
errors: they score `f64::NEG_INFINITY`, which both the optimizer and the
ensemble sampler treat as "never go there".
*/

use std::sync::Arc;

use ndarray::{s, Array1, Array2, ArrayView1, ArrayView2};
use rand::distributions::Open01;
use rand::Rng;
use tracing::trace;

use crate::distributions::Target;
use crate::error::{MnnError, MnnResult};
use crate::model::{DiskModel, ModelConfig, Quantity};
use crate::params::{AxisLayout, PARAMS_PER_DISK};

/// Observed values at a set of points, with one uncertainty per point.
#[derive(Debug, Clone, PartialEq)]
pub struct Observations {
    positions: Array2<f64>,
    values: Array1<f64>,
    sigma: Array1<f64>,
}

impl Observations {
    /**
    Wraps an `N×4` table of `(x, y, z, value)` rows and their uncertainties.

    Fails with [`MnnError::Usage`] when the table is empty, does not have four
    columns, or when `sigma` does not hold one strictly positive value per row.
    */
    pub fn new(table: ArrayView2<'_, f64>, sigma: Array1<f64>) -> MnnResult<Self> {
        if table.ncols() != 4 {
            return Err(MnnError::usage(format!(
                "observation tables have 4 columns (x, y, z, value), got {}",
                table.ncols()
            )));
        }
        if table.nrows() == 0 {
            return Err(MnnError::usage("the observation table is empty"));
        }
        if sigma.len() != table.nrows() {
            return Err(MnnError::usage(format!(
                "got {} uncertainties for {} observations",
                sigma.len(),
                table.nrows()
            )));
        }
        if let Some(bad) = sigma.iter().find(|s| !(s.is_finite() && **s > 0.0)) {
            return Err(MnnError::usage(format!(
                "uncertainties must be finite and positive, got {bad}"
            )));
        }
        Ok(Self {
            positions: table.slice(s![.., 0..3]).to_owned(),
            values: table.column(3).to_owned(),
            sigma,
        })
    }

    /// Like [`Observations::new`], drawing every uncertainty as
    /// `scale · U(0, 1)`.
    pub fn with_synthetic_noise<R: Rng + ?Sized>(
        table: ArrayView2<'_, f64>,
        scale: f64,
        rng: &mut R,
    ) -> MnnResult<Self> {
        let sigma = Array1::from_shape_fn(table.nrows(), |_| scale * rng.sample::<f64, _>(Open01));
        Self::new(table, sigma)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Observation points, `N×3`.
    pub fn positions(&self) -> ArrayView2<'_, f64> {
        self.positions.view()
    }

    pub fn values(&self) -> ArrayView1<'_, f64> {
        self.values.view()
    }

    pub fn sigma(&self) -> ArrayView1<'_, f64> {
        self.sigma.view()
    }
}

/**
The log-likelihood of a fixed set of observations as a function of the disk
parameters.

Cloning is cheap: the observations are shared. Evaluation never mutates the
instance, so one likelihood can be called from every walker thread at once.
*/
#[derive(Debug, Clone)]
pub struct LogLikelihood {
    observations: Arc<Observations>,
    layout: AxisLayout,
    fit_type: Quantity,
    check_positive_definite: bool,
    model_config: ModelConfig,
}

impl LogLikelihood {
    /// A potential fit with the positive-definiteness check enabled.
    pub fn new(observations: impl Into<Arc<Observations>>, layout: AxisLayout) -> Self {
        Self {
            observations: observations.into(),
            layout,
            fit_type: Quantity::Potential,
            check_positive_definite: true,
            model_config: ModelConfig::default(),
        }
    }

    pub fn with_fit_type(mut self, fit_type: Quantity) -> Self {
        self.fit_type = fit_type;
        self
    }

    pub fn with_positive_definite_check(mut self, check: bool) -> Self {
        self.check_positive_definite = check;
        self
    }

    pub fn with_model_config(mut self, config: ModelConfig) -> Self {
        self.model_config = config;
        self
    }

    pub fn observations(&self) -> &Observations {
        &self.observations
    }

    pub fn layout(&self) -> &AxisLayout {
        &self.layout
    }

    pub fn fit_type(&self) -> Quantity {
        self.fit_type
    }

    /// Log-likelihood of `params`, or `f64::NEG_INFINITY` for a vector of the
    /// wrong length, a disk with `b < 0` or `a + b < 0`, a model failing the
    /// positive-definiteness check (when enabled), or non-finite predictions.
    pub fn evaluate(&self, params: &[f64]) -> f64 {
        if params.len() != self.layout.n_params() {
            trace!(len = params.len(), "parameter vector has the wrong length");
            return f64::NEG_INFINITY;
        }
        if params
            .chunks_exact(PARAMS_PER_DISK)
            .any(|p| p[1] < 0.0 || p[0] + p[1] < 0.0)
        {
            return f64::NEG_INFINITY;
        }

        let Ok(model) = DiskModel::from_parameters(&self.layout, params, self.model_config) else {
            return f64::NEG_INFINITY;
        };
        if self.check_positive_definite && !model.is_positive_definite(None) {
            return f64::NEG_INFINITY;
        }

        let obs = &*self.observations;
        let mut sum = 0.0;
        for ((point, &value), &sigma) in obs
            .positions
            .outer_iter()
            .zip(obs.values.iter())
            .zip(obs.sigma.iter())
        {
            let predicted = model.evaluate_scalar(self.fit_type, [point[0], point[1], point[2]]);
            if !predicted.is_finite() {
                return f64::NEG_INFINITY;
            }
            let variance = sigma * sigma;
            sum += (value - predicted).powi(2) / variance + variance.ln();
        }

        let log_l = -0.5 * sum;
        if log_l.is_nan() {
            f64::NEG_INFINITY
        } else {
            log_l
        }
    }
}

impl Target for LogLikelihood {
    fn unnorm_log_prob(&self, theta: &[f64]) -> f64 {
        self.evaluate(theta)
    }
}
