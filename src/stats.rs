//! Summary statistics and convergence diagnostics for posterior samples.

use std::fmt;

use ndarray::prelude::*;
use ndarray_stats::QuantileExt;
use rustfft::num_complex::Complex;
use rustfft::FftPlanner;

use crate::error::{MnnError, MnnResult};

/// Percentiles reported by default: lower error, median, upper error.
pub const DEFAULT_QUANTILES: [f64; 3] = [16.0, 50.0, 84.0];

/// Auto-window constant of the integrated autocorrelation time.
pub const AUTOCORR_WINDOW_C: f64 = 5.0;

/// `q`-th percentile (`0 ≤ q ≤ 100`) of already sorted data, interpolating
/// linearly between the two closest ranks. `NaN` for empty data and for a
/// `q` outside `[0, 100]`.
pub fn percentile_sorted(sorted: &[f64], q: f64) -> f64 {
    if !(0.0..=100.0).contains(&q) {
        return f64::NAN;
    }
    match sorted.len() {
        0 => f64::NAN,
        1 => sorted[0],
        n => {
            let rank = q / 100.0 * (n - 1) as f64;
            let lo = rank.floor() as usize;
            let hi = rank.ceil() as usize;
            let frac = rank - lo as f64;
            sorted[lo] + frac * (sorted[hi] - sorted[lo])
        }
    }
}

/// `q`-th percentile of unsorted data.
pub fn percentile(data: &[f64], q: f64) -> f64 {
    let mut sorted = data.to_vec();
    sorted.sort_by(f64::total_cmp);
    percentile_sorted(&sorted, q)
}

/// Median and asymmetric errors of one parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterQuantile {
    pub label: String,
    pub median: f64,
    /// Upper percentile minus the median.
    pub upper: f64,
    /// Median minus the lower percentile.
    pub lower: f64,
}

impl ParameterQuantile {
    pub fn as_tuple(&self) -> (f64, f64, f64) {
        (self.median, self.upper, self.lower)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct QuantileSummary {
    /// The three percentiles the summary was built from.
    pub quantiles: [f64; 3],
    pub parameters: Vec<ParameterQuantile>,
}

impl QuantileSummary {
    /// `(median, +err, -err)` for every parameter, in parameter order.
    pub fn as_tuples(&self) -> Vec<(f64, f64, f64)> {
        self.parameters.iter().map(ParameterQuantile::as_tuple).collect()
    }
}

impl fmt::Display for QuantileSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for p in &self.parameters {
            writeln!(
                f,
                "{:>8} = {:.6e} +{:.3e} -{:.3e}",
                p.label, p.median, p.upper, p.lower
            )?;
        }
        Ok(())
    }
}

/**
Summarizes every column of `samples` (`n_samples × n_params`) by three
percentiles `[lo, mid, hi]`: the median is the `mid` percentile, the upper
error `hi - mid`, the lower error `mid - lo`.

Fails with [`MnnError::Usage`] unless exactly three percentiles in
`[0, 100]` are given and there is one label per column. An empty sample
yields `NaN` everywhere.
*/
pub fn compute_quantiles(
    samples: ArrayView2<'_, f64>,
    quantiles: &[f64],
    labels: &[String],
) -> MnnResult<QuantileSummary> {
    let Ok(q) = <[f64; 3]>::try_from(quantiles) else {
        return Err(MnnError::usage(format!(
            "quantiles must be a triplet, got {} values",
            quantiles.len()
        )));
    };
    if q.iter().any(|v| !(0.0..=100.0).contains(v)) {
        return Err(MnnError::usage(format!(
            "quantiles must lie in [0, 100], got {q:?}"
        )));
    }
    if labels.len() != samples.ncols() {
        return Err(MnnError::usage(format!(
            "got {} labels for {} parameters",
            labels.len(),
            samples.ncols()
        )));
    }

    let parameters = samples
        .columns()
        .into_iter()
        .zip(labels)
        .map(|(column, label)| {
            let mut sorted = column.to_vec();
            sorted.sort_by(f64::total_cmp);
            let [lo, mid, hi] = q.map(|p| percentile_sorted(&sorted, p));
            ParameterQuantile {
                label: label.clone(),
                median: mid,
                upper: hi - mid,
                lower: mid - lo,
            }
        })
        .collect();

    Ok(QuantileSummary {
        quantiles: q,
        parameters,
    })
}

/// Running per-chain means and mean squares, from which the potential scale
/// reduction factor of every parameter is derived.
#[derive(Debug, Clone, PartialEq)]
pub struct RhatMulti {
    n: usize,
    mean: Array2<f64>,    // n_chains x n_params
    mean_sq: Array2<f64>, // n_chains x n_params
}

impl RhatMulti {
    pub fn new(n_chains: usize, n_params: usize) -> Self {
        Self {
            n: 0,
            mean: Array2::zeros((n_chains, n_params)),
            mean_sq: Array2::zeros((n_chains, n_params)),
        }
    }

    /// Adds one state per chain (`n_chains × n_params`).
    pub fn step(&mut self, x: ArrayView2<'_, f64>) -> MnnResult<()> {
        if x.dim() != self.mean.dim() {
            return Err(MnnError::usage(format!(
                "expected a {:?} state, got {:?}",
                self.mean.dim(),
                x.dim()
            )));
        }
        self.n += 1;
        let n = self.n as f64;
        self.mean = (&self.mean * (n - 1.0) + &x) / n;
        self.mean_sq = (&self.mean_sq * (n - 1.0) + &x.pow2()) / n;
        Ok(())
    }

    /// R-hat of every parameter.
    pub fn all(&self) -> MnnResult<Array1<f64>> {
        let n_chains = self.mean.nrows();
        if n_chains < 2 || self.n < 2 {
            return Err(MnnError::usage(
                "R-hat needs at least two chains of at least two steps",
            ));
        }
        let n = self.n as f64;
        let mean_chain = self
            .mean
            .mean_axis(Axis(0))
            .ok_or_else(|| MnnError::usage("no chains to average"))?;
        let between = (&self.mean - &mean_chain.insert_axis(Axis(0)))
            .pow2()
            .sum_axis(Axis(0))
            * (n / (n_chains as f64 - 1.0));
        let sm2 = (&self.mean_sq - &self.mean.pow2()) * (n / (n - 1.0));
        let within = sm2
            .mean_axis(Axis(0))
            .ok_or_else(|| MnnError::usage("no chains to average"))?;
        let var = &within * ((n - 1.0) / n) + between * (1.0 / n);
        Ok((var / within).sqrt())
    }

    /// Largest R-hat over all parameters.
    pub fn max(&self) -> MnnResult<f64> {
        let all = self.all()?;
        let max = *all.max().map_err(|e| MnnError::usage(e.to_string()))?;
        Ok(max)
    }
}

/// R-hat of every parameter of an ensemble chain shaped
/// `[n_walkers, n_steps, dim]`, treating each walker as one chain.
pub fn rhat(chain: ArrayView3<'_, f64>) -> MnnResult<Array1<f64>> {
    track_rhat(chain)?.all()
}

/// Worst R-hat over the parameters of an ensemble chain.
pub fn max_rhat(chain: ArrayView3<'_, f64>) -> MnnResult<f64> {
    track_rhat(chain)?.max()
}

fn track_rhat(chain: ArrayView3<'_, f64>) -> MnnResult<RhatMulti> {
    let (n_walkers, n_steps, dim) = chain.dim();
    let mut tracker = RhatMulti::new(n_walkers, dim);
    for t in 0..n_steps {
        tracker.step(chain.slice(s![.., t, ..]))?;
    }
    Ok(tracker)
}

/// Normalized autocorrelation function of a series, computed with an FFT.
/// `None` when the series has zero variance.
pub fn autocorr_function(x: ArrayView1<'_, f64>) -> Option<Array1<f64>> {
    let n = x.len();
    if n == 0 {
        return None;
    }
    let mean = x.mean()?;
    let m = 2 * n.next_power_of_two();

    let mut buffer: Vec<Complex<f64>> = x
        .iter()
        .map(|&v| Complex::new(v - mean, 0.0))
        .chain(std::iter::repeat(Complex::new(0.0, 0.0)))
        .take(m)
        .collect();

    let mut planner = FftPlanner::<f64>::new();
    planner.plan_fft_forward(m).process(&mut buffer);
    for c in buffer.iter_mut() {
        *c = Complex::new(c.norm_sqr(), 0.0);
    }
    planner.plan_fft_inverse(m).process(&mut buffer);

    let acf0 = buffer[0].re;
    if acf0.is_nan() || acf0 <= 0.0 {
        return None;
    }
    Some(buffer[..n].iter().map(|c| c.re / acf0).collect())
}

/// First lag `m` with `m ≥ c · τ(m)`, or the last lag when there is none.
fn auto_window(taus: &[f64], c: f64) -> usize {
    taus.iter()
        .enumerate()
        .position(|(m, &tau)| (m as f64) >= c * tau)
        .unwrap_or(taus.len().saturating_sub(1))
}

/**
Integrated autocorrelation time of every parameter of an ensemble chain
shaped `[n_walkers, n_steps, dim]`.

The autocorrelation function is averaged over walkers before summing, and
the sum is truncated with Sokal's adaptive window (`c = 5`). Parameters
that never move get `NaN`.
*/
pub fn integrated_autocorr_time(chain: ArrayView3<'_, f64>) -> Array1<f64> {
    let (_, n_steps, dim) = chain.dim();
    Array1::from_shape_fn(dim, |d| {
        let mut mean_acf = Array1::<f64>::zeros(n_steps);
        let mut used = 0usize;
        for walker in chain.outer_iter() {
            if let Some(acf) = autocorr_function(walker.column(d)) {
                mean_acf += &acf;
                used += 1;
            }
        }
        if used == 0 {
            return f64::NAN;
        }
        mean_acf /= used as f64;

        let mut taus = Vec::with_capacity(n_steps);
        let mut running = 0.0;
        for &rho in mean_acf.iter() {
            running += rho;
            taus.push(2.0 * running - 1.0);
        }
        taus[auto_window(&taus, AUTOCORR_WINDOW_C)]
    })
}
