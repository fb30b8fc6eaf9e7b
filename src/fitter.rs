/*!
# Fitting driver

[`MnnFitter`] ties the pieces together: it owns the observations, the disk
layout and the current parameter vector, refines the vector by maximum
likelihood, samples the posterior with the ensemble sampler and summarizes
the retained sample with percentiles.

## Example Usage

```rust,no_run
use mnn_fit::fitter::{FitConfig, MnnFitter};
use mnn_fit::stats::DEFAULT_QUANTILES;

let mut fitter = MnnFitter::new(FitConfig::default().with_n_steps(500));
fitter.set_model_type(0, 0, 1);
fitter.load_file("potential.dat").unwrap();
fitter.maximum_likelihood().unwrap();
fitter.fit_data(None).unwrap();
let summary = fitter.compute_quantiles(&DEFAULT_QUANTILES).unwrap();
println!("{summary}");
```
*/

use std::path::Path;
use std::sync::Arc;

use ndarray::{s, Array1, Array2, ArrayView1, ArrayView2, ArrayView3};
use rand::prelude::*;
use rand::rngs::SmallRng;
use rand_distr::StandardNormal;
use tracing::{error, info, warn};

use crate::ensemble::{EnsembleChain, EnsembleSampler, DEFAULT_STRETCH};
use crate::error::{MnnError, MnnResult};
use crate::io::load_observation_table;
use crate::likelihood::{LogLikelihood, Observations};
use crate::model::{DiskModel, ModelConfig, Quantity};
use crate::optimize::{NelderMead, OptimizationResult};
use crate::params::AxisLayout;
use crate::stats::{self, QuantileSummary};

/// Fraction of every walker's history dropped as burn-in when none is given.
pub const DEFAULT_BURNIN: f64 = 0.5;

/// Settings of a fit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FitConfig {
    pub n_walkers: usize,
    pub n_steps: usize,
    /// Seeds initial parameters, synthetic noise, walker offsets and the sampler.
    pub seed: u64,
    pub fit_type: Quantity,
    /// Score models with negative density as impossible.
    pub check_positive_definite: bool,
    /// Log progress and results at `info` level and show a progress bar.
    pub verbose: bool,
    /// Standard deviation of the Gaussian offsets of the initial walkers.
    pub walker_spread: f64,
    /// Scale of the synthetic uncertainties drawn by [`MnnFitter::load_data`].
    pub noise_scale: f64,
    /// Stretch scale of the ensemble moves.
    pub stretch: f64,
    pub optimizer: NelderMead,
    pub model_config: ModelConfig,
}

impl Default for FitConfig {
    fn default() -> Self {
        Self {
            n_walkers: 100,
            n_steps: 1000,
            seed: 120,
            fit_type: Quantity::Potential,
            check_positive_definite: true,
            verbose: true,
            walker_spread: 1e-4,
            noise_scale: 0.01,
            stretch: DEFAULT_STRETCH,
            optimizer: NelderMead::default(),
            model_config: ModelConfig::default(),
        }
    }
}

impl FitConfig {
    pub fn with_n_walkers(mut self, n_walkers: usize) -> Self {
        self.n_walkers = n_walkers;
        self
    }

    pub fn with_n_steps(mut self, n_steps: usize) -> Self {
        self.n_steps = n_steps;
        self
    }

    pub fn set_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_fit_type(mut self, fit_type: Quantity) -> Self {
        self.fit_type = fit_type;
        self
    }

    pub fn with_positive_definite_check(mut self, check: bool) -> Self {
        self.check_positive_definite = check;
        self
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn with_walker_spread(mut self, spread: f64) -> Self {
        self.walker_spread = spread;
        self
    }

    pub fn with_noise_scale(mut self, scale: f64) -> Self {
        self.noise_scale = scale;
        self
    }

    pub fn with_stretch(mut self, stretch: f64) -> Self {
        self.stretch = stretch;
        self
    }

    pub fn with_optimizer(mut self, optimizer: NelderMead) -> Self {
        self.optimizer = optimizer;
        self
    }

    pub fn with_model_config(mut self, config: ModelConfig) -> Self {
        self.model_config = config;
        self
    }
}

/**
Fits a fixed number of disks per plane to a set of observations.

The fitter is stateful: [`MnnFitter::set_model_type`] and one of the
`load_*` methods must be called before [`MnnFitter::maximum_likelihood`] or
[`MnnFitter::fit_data`]. Every random draw comes from one generator seeded
with [`FitConfig::seed`], so a fit is reproducible call for call.
*/
#[derive(Debug)]
pub struct MnnFitter {
    config: FitConfig,
    rng: SmallRng,
    layout: AxisLayout,
    parameters: Vec<f64>,
    observations: Option<Arc<Observations>>,
    run: Option<EnsembleChain>,
    discard: usize,
    samples: Array2<f64>,
    quantiles: Option<QuantileSummary>,
}

impl Default for MnnFitter {
    fn default() -> Self {
        Self::new(FitConfig::default())
    }
}

impl MnnFitter {
    pub fn new(config: FitConfig) -> Self {
        Self {
            rng: SmallRng::seed_from_u64(config.seed),
            config,
            layout: AxisLayout::default(),
            parameters: Vec::new(),
            observations: None,
            run: None,
            discard: 0,
            samples: Array2::zeros((0, 0)),
            quantiles: None,
        }
    }

    pub fn config(&self) -> &FitConfig {
        &self.config
    }

    /// Declares `nx`, `ny` and `nz` disks normal to x, y and z, and draws
    /// every initial parameter uniformly from `[0, 1)`.
    ///
    /// Any previous sampling result is dropped.
    pub fn set_model_type(&mut self, nx: usize, ny: usize, nz: usize) {
        self.layout = AxisLayout::from_counts(nx, ny, nz);
        let n_params = self.layout.n_params();
        self.parameters = (0..n_params).map(|_| self.rng.gen::<f64>()).collect();
        self.clear_results();
    }

    fn clear_results(&mut self) {
        self.run = None;
        self.discard = 0;
        self.samples = Array2::zeros((0, self.layout.n_params()));
        self.quantiles = None;
    }

    /// Replaces the current parameter vector.
    pub fn set_parameters(&mut self, parameters: &[f64]) -> MnnResult<()> {
        if parameters.len() != self.layout.n_params() {
            return Err(MnnError::usage(format!(
                "expected {} parameters, got {}",
                self.layout.n_params(),
                parameters.len()
            )));
        }
        self.parameters = parameters.to_vec();
        Ok(())
    }

    pub fn parameters(&self) -> &[f64] {
        &self.parameters
    }

    pub fn layout(&self) -> &AxisLayout {
        &self.layout
    }

    /// Dimension of the parameter space.
    pub fn ndim(&self) -> usize {
        self.layout.n_params()
    }

    /// Labels of the parameters, e.g. `axy1, bxy1, Mxy1`.
    pub fn parameter_labels(&self) -> Vec<String> {
        self.layout.labels()
    }

    /// The model described by the current parameters.
    pub fn model(&self) -> MnnResult<DiskModel> {
        DiskModel::from_parameters(&self.layout, &self.parameters, self.config.model_config)
    }

    /// Uses an `N×4` `(x, y, z, value)` table as observations, with
    /// uncertainties drawn as `noise_scale · U(0, 1)`.
    pub fn load_data(&mut self, table: ArrayView2<'_, f64>) -> MnnResult<()> {
        let observations =
            Observations::with_synthetic_noise(table, self.config.noise_scale, &mut self.rng)?;
        self.set_observations(observations);
        Ok(())
    }

    /// Uses an `N×4` table as observations with the given uncertainties.
    pub fn load_data_with_errors(
        &mut self,
        table: ArrayView2<'_, f64>,
        sigma: Array1<f64>,
    ) -> MnnResult<()> {
        self.set_observations(Observations::new(table, sigma)?);
        Ok(())
    }

    /// Reads a whitespace-delimited four-column file and loads it with
    /// synthetic uncertainties.
    pub fn load_file<P: AsRef<Path>>(&mut self, path: P) -> MnnResult<()> {
        let table = load_observation_table(path.as_ref())?;
        if self.config.verbose {
            info!(path = %path.as_ref().display(), rows = table.nrows(), "loaded observations");
        }
        self.load_data(table.view())
    }

    fn set_observations(&mut self, observations: Observations) {
        self.observations = Some(Arc::new(observations));
        self.clear_results();
    }

    pub fn observations(&self) -> Option<&Observations> {
        self.observations.as_deref()
    }

    /// The log-likelihood of the loaded observations under this fitter's
    /// layout and settings.
    pub fn log_likelihood(&self) -> MnnResult<LogLikelihood> {
        let observations = self
            .observations
            .clone()
            .ok_or_else(|| MnnError::usage("no observations loaded"))?;
        if self.layout.n_disks() == 0 {
            return Err(MnnError::usage("no disks declared, call set_model_type first"));
        }
        Ok(LogLikelihood::new(observations, self.layout.clone())
            .with_fit_type(self.config.fit_type)
            .with_positive_definite_check(self.config.check_positive_definite)
            .with_model_config(self.config.model_config))
    }

    /**
    Minimizes `-2 ln L` from the current parameters and keeps the best
    vector found as the new current parameters.

    The optimizer report is returned as is; a run that did not converge is
    not retried.
    */
    pub fn maximum_likelihood(&mut self) -> MnnResult<OptimizationResult> {
        let likelihood = self.log_likelihood()?;
        if self.config.verbose {
            info!("computing maximum of likelihood");
        }

        let initial = self.parameters.clone();
        let result = self
            .config
            .optimizer
            .minimize(|p| -2.0 * likelihood.evaluate(p), &initial);

        if self.config.verbose {
            info!(
                converged = result.converged,
                iterations = result.iterations,
                evaluations = result.evaluations,
                chi2 = result.fun,
                "maximum of likelihood found"
            );
            for ((label, fitted), start) in self
                .parameter_labels()
                .iter()
                .zip(&result.x)
                .zip(&initial)
            {
                info!("{label} = {fitted} (initial: {start})");
            }
        }

        self.parameters = result.x.clone();
        Ok(result)
    }

    /**
    Samples the posterior with the ensemble sampler and returns the retained
    sample.

    Walkers start at the current parameters plus independent Gaussian
    offsets of standard deviation `walker_spread`. The first
    `burnin · n_steps` steps of every walker (half by default) are dropped
    and the rest is stacked walker after walker.

    # Errors

    [`MnnError::Usage`] when no data or disks are set, when `burnin` is not
    in `[0, 1)`, or when there are fewer than `2 · ndim` walkers.
    */
    pub fn fit_data(&mut self, burnin: Option<f64>) -> MnnResult<ArrayView2<'_, f64>> {
        let burnin = burnin.unwrap_or(DEFAULT_BURNIN);
        if !(0.0..1.0).contains(&burnin) {
            return Err(MnnError::usage(format!(
                "the burn-in fraction must lie in [0, 1), got {burnin}"
            )));
        }
        let likelihood = self.log_likelihood()?;
        let ndim = self.ndim();
        let n_walkers = self.config.n_walkers;
        if n_walkers < 2 * ndim {
            return Err(MnnError::usage(format!(
                "{n_walkers} walkers are not enough for {ndim} parameters, use at least {}",
                2 * ndim
            )));
        }

        let spread = self.config.walker_spread;
        let mut start = Array2::<f64>::zeros((n_walkers, ndim));
        for mut walker in start.outer_iter_mut() {
            for (x, &p) in walker.iter_mut().zip(&self.parameters) {
                *x = p + spread * self.rng.sample::<f64, _>(StandardNormal);
            }
        }

        let mut sampler = EnsembleSampler::new(likelihood, start)?
            .set_seed(self.rng.gen())
            .with_stretch(self.config.stretch);

        let run = if self.config.verbose {
            info!(n_walkers, n_steps = self.config.n_steps, ndim, "running ensemble sampler");
            sampler.run_progress(self.config.n_steps)
        } else {
            sampler.run(self.config.n_steps)
        };

        self.discard = (burnin * self.config.n_steps as f64).floor() as usize;
        self.samples = run.flat_samples(self.discard);
        if self.config.verbose {
            let retained = run.chain().slice_move(s![.., self.discard.., ..]);
            info!(
                acceptance = run.acceptance_fraction().mean().unwrap_or(0.0),
                max_rhat = stats::max_rhat(retained).unwrap_or(f64::NAN),
                samples = self.samples.nrows(),
                "sampling done"
            );
        }
        self.run = Some(run);
        self.quantiles = None;
        Ok(self.samples.view())
    }

    /// The sample retained by the last [`MnnFitter::fit_data`] call, empty
    /// before any run.
    pub fn samples(&self) -> ArrayView2<'_, f64> {
        self.samples.view()
    }

    /// Full walker history `[n_walkers, n_steps, ndim]` of the last run.
    pub fn chain(&self) -> Option<ArrayView3<'_, f64>> {
        self.run.as_ref().map(EnsembleChain::chain)
    }

    /// Log-likelihood of every walker at every step of the last run.
    pub fn log_prob(&self) -> Option<ArrayView2<'_, f64>> {
        self.run.as_ref().map(EnsembleChain::log_prob)
    }

    pub fn acceptance_fraction(&self) -> Option<ArrayView1<'_, f64>> {
        self.run.as_ref().map(EnsembleChain::acceptance_fraction)
    }

    /// Integrated autocorrelation time of every parameter over the full run.
    pub fn autocorr_time(&self) -> MnnResult<Array1<f64>> {
        let run = self.last_run()?;
        Ok(stats::integrated_autocorr_time(run.chain()))
    }

    /// Potential scale reduction of every parameter over the retained steps,
    /// with each walker treated as a chain.
    pub fn rhat(&self) -> MnnResult<Array1<f64>> {
        let run = self.last_run()?;
        stats::rhat(run.chain().slice(s![.., self.discard.., ..]))
    }

    /// Worst [`MnnFitter::rhat`] over all parameters.
    pub fn max_rhat(&self) -> MnnResult<f64> {
        let run = self.last_run()?;
        stats::max_rhat(run.chain().slice(s![.., self.discard.., ..]))
    }

    fn last_run(&self) -> MnnResult<&EnsembleChain> {
        self.run
            .as_ref()
            .ok_or_else(|| MnnError::usage("no sampling run yet, call fit_data first"))
    }

    /**
    Summarizes the retained sample by three percentiles (e.g.
    [`stats::DEFAULT_QUANTILES`]) as `(median, +err, -err)` per parameter.

    A non-triplet is logged and reported as [`MnnError::Usage`]. Calling this
    before [`MnnFitter::fit_data`] only logs a warning; the summary of the
    empty sample is then all `NaN`.
    */
    pub fn compute_quantiles(&mut self, quantiles: &[f64]) -> MnnResult<&QuantileSummary> {
        if quantiles.len() != 3 {
            error!(
                got = quantiles.len(),
                "the quantile list should always be a triplet"
            );
        }
        if self.samples.nrows() == 0 {
            warn!("computing quantiles before fit_data, the sample is empty");
        }

        let summary =
            stats::compute_quantiles(self.samples.view(), quantiles, &self.parameter_labels())?;
        if self.config.verbose {
            info!("MCMC results:");
            for p in &summary.parameters {
                info!("{} = {} +: {} -: {}", p.label, p.median, p.upper, p.lower);
            }
        }
        Ok(self.quantiles.insert(summary))
    }

    /// The summary of the last [`MnnFitter::compute_quantiles`] call.
    pub fn quantiles(&self) -> Option<&QuantileSummary> {
        self.quantiles.as_ref()
    }
}
