/*!
# Affine-invariant ensemble sampler

This module implements the stretch-move ensemble sampler of Goodman & Weare
(2010), in the parallel "red-blue" form popularized by `emcee`. The ensemble
is split into two halves; every walker of one half proposes a move along the
line joining it to a randomly chosen walker of the other half, so all
proposals of a half can be evaluated in parallel.

## Overview

- **Target (`D`)**: any [`Target`]; it must be `Sync` because walkers of one
  half are evaluated concurrently on the rayon thread pool.
- **Walkers**: stored as the rows of an `n_walkers × dim` array.
- **Reproducibility**: every walker owns a [`SmallRng`]; [`EnsembleSampler::set_seed`]
  seeds walker `i` with `seed + i`.

## Example Usage

```rust
use mnn_fit::distributions::IsotropicGaussian;
use mnn_fit::ensemble::EnsembleSampler;
use ndarray::{arr1, Array2};

let target = IsotropicGaussian::new(arr1(&[0.0, 0.0]), 1.0);
let start = Array2::from_shape_fn((8, 2), |(i, j)| 0.1 * (i + j) as f64);
let mut sampler = EnsembleSampler::new(target, start).unwrap().set_seed(42);
let run = sampler.run(100);
assert_eq!(run.chain().dim(), (8, 100, 2));
assert_eq!(run.flat_samples(50).dim(), (8 * 50, 2));
```
*/

use std::collections::VecDeque;
use std::ops::Range;

use indicatif::{ProgressBar, ProgressStyle};
use ndarray::{s, Array1, Array2, Array3, ArrayView1, ArrayView2, ArrayView3};
use rand::prelude::*;
use rand::rngs::SmallRng;
use rayon::prelude::*;

use crate::distributions::Target;
use crate::error::{MnnError, MnnResult};

/// Default scale `a` of the stretch distribution `g(z) ∝ 1/√z` on `[1/a, a]`.
pub const DEFAULT_STRETCH: f64 = 2.0;

fn log_prob_of<D: Target>(target: &D, theta: ArrayView1<'_, f64>) -> f64 {
    let lp = match theta.as_slice() {
        Some(slice) => target.unnorm_log_prob(slice),
        None => target.unnorm_log_prob(&theta.to_vec()),
    };
    if lp.is_nan() {
        f64::NEG_INFINITY
    } else {
        lp
    }
}

/**
An ensemble of walkers exploring a [`Target`] with stretch moves.

Walker positions are only ever replaced by accepted proposals; the sampler
keeps the log-density of every walker so each step costs one target
evaluation per walker.
*/
#[derive(Debug, Clone)]
pub struct EnsembleSampler<D> {
    /// The distribution we want to sample from.
    pub target: D,
    /// Current walker positions, one row per walker.
    pub positions: Array2<f64>,
    /// Scale of the stretch move.
    pub stretch: f64,
    /// Global random seed.
    pub seed: u64,
    log_probs: Array1<f64>,
    rngs: Vec<SmallRng>,
    accepted: Array1<u64>,
    iterations: u64,
}

impl<D> EnsembleSampler<D>
where
    D: Target + Sync,
{
    /**
    Creates a sampler whose walkers start at the rows of `initial_positions`.

    Fails with [`MnnError::Usage`] when there are fewer than two walkers or
    the positions have no columns.
    */
    pub fn new(target: D, initial_positions: Array2<f64>) -> MnnResult<Self> {
        let (n_walkers, dim) = initial_positions.dim();
        if n_walkers < 2 {
            return Err(MnnError::usage(format!(
                "the ensemble needs at least 2 walkers, got {n_walkers}"
            )));
        }
        if dim == 0 {
            return Err(MnnError::usage("walker positions have zero dimensions"));
        }

        let log_probs: Vec<f64> = (0..n_walkers)
            .into_par_iter()
            .map(|i| log_prob_of(&target, initial_positions.row(i)))
            .collect();
        let seed = thread_rng().gen::<u64>();

        Ok(Self {
            target,
            positions: initial_positions,
            stretch: DEFAULT_STRETCH,
            seed,
            log_probs: Array1::from(log_probs),
            rngs: Self::seeded_rngs(seed, n_walkers),
            accepted: Array1::zeros(n_walkers),
            iterations: 0,
        })
    }

    fn seeded_rngs(seed: u64, n_walkers: usize) -> Vec<SmallRng> {
        (0..n_walkers)
            .map(|i| SmallRng::seed_from_u64(seed.wrapping_add(i as u64)))
            .collect()
    }

    /**
    Sets a new global seed; walker `i` is reseeded with `seed + i`.

    ```rust
    use mnn_fit::distributions::IsotropicGaussian;
    use mnn_fit::ensemble::EnsembleSampler;
    use ndarray::{arr1, Array2};

    let target = IsotropicGaussian::new(arr1(&[0.0]), 1.0);
    let start = Array2::from_shape_fn((4, 1), |(i, _)| i as f64);
    let sampler = EnsembleSampler::new(target, start).unwrap().set_seed(7);
    assert_eq!(sampler.seed, 7);
    ```
    */
    pub fn set_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self.rngs = Self::seeded_rngs(seed, self.n_walkers());
        self
    }

    /// Sets the stretch scale `a` (must exceed 1).
    pub fn with_stretch(mut self, stretch: f64) -> Self {
        self.stretch = stretch;
        self
    }

    pub fn n_walkers(&self) -> usize {
        self.positions.nrows()
    }

    pub fn dim(&self) -> usize {
        self.positions.ncols()
    }

    /// Log-density of every walker at its current position.
    pub fn log_probs(&self) -> ArrayView1<'_, f64> {
        self.log_probs.view()
    }

    /// Fraction of proposals each walker accepted since the sampler was built.
    pub fn acceptance_fraction(&self) -> Array1<f64> {
        if self.iterations == 0 {
            return Array1::zeros(self.n_walkers());
        }
        self.accepted.mapv(|a| a as f64 / self.iterations as f64)
    }

    /// Moves both halves of the ensemble once. Returns the number of
    /// accepted proposals.
    pub fn step(&mut self) -> usize {
        let n = self.n_walkers();
        let half = n / 2;
        let accepted = self.update_half(0..half, half..n) + self.update_half(half..n, 0..half);
        self.iterations += 1;
        accepted
    }

    fn update_half(&mut self, active: Range<usize>, complement: Range<usize>) -> usize {
        let dim = self.dim() as f64;
        let a = self.stretch;
        let target = &self.target;
        let positions = &self.positions;
        let log_probs = &self.log_probs;
        let start = active.start;

        let moves: Vec<Option<(Array1<f64>, f64)>> = self.rngs[active]
            .par_iter_mut()
            .enumerate()
            .map(|(k, rng)| {
                let i = start + k;
                let j = rng.gen_range(complement.clone());
                let u: f64 = rng.gen();
                let z = ((a - 1.0) * u + 1.0).powi(2) / a;

                let partner = positions.row(j);
                let proposal = &partner + &((&positions.row(i) - &partner) * z);
                let lp = log_prob_of(target, proposal.view());

                let log_accept_ratio = (dim - 1.0) * z.ln() + lp - log_probs[i];
                let r: f64 = rng.gen();
                (log_accept_ratio > r.ln()).then_some((proposal, lp))
            })
            .collect();

        let mut n_accepted = 0;
        for (k, accepted) in moves.into_iter().enumerate() {
            if let Some((proposal, lp)) = accepted {
                let i = start + k;
                self.positions.row_mut(i).assign(&proposal);
                self.log_probs[i] = lp;
                self.accepted[i] += 1;
                n_accepted += 1;
            }
        }
        n_accepted
    }

    /**
    Runs the ensemble for `n_steps` steps and records every position.

    # Returns

    An [`EnsembleChain`] with positions shaped `[n_walkers, n_steps, dim]`.
    */
    pub fn run(&mut self, n_steps: usize) -> EnsembleChain {
        self.run_inner(n_steps, None)
    }

    /**
    Like [`EnsembleSampler::run`], but displays a progress bar (using the
    `indicatif` crate) updated with the acceptance rate over a sliding
    window of the last 100 steps.
    */
    pub fn run_progress(&mut self, n_steps: usize) -> EnsembleChain {
        let pb = ProgressBar::new(n_steps as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{prefix:8} {bar:40.white} ETA {eta:3} | {msg}")
                .unwrap()
                .progress_chars("=>-"),
        );
        pb.set_prefix("Ensemble");
        let chain = self.run_inner(n_steps, Some(&pb));
        pb.finish_with_message(format!(
            "p(accept)≈{:.2}",
            self.acceptance_fraction().mean().unwrap_or(0.0)
        ));
        chain
    }

    fn run_inner(&mut self, n_steps: usize, pb: Option<&ProgressBar>) -> EnsembleChain {
        let (n_walkers, dim) = self.positions.dim();
        let mut chain = Array3::<f64>::zeros((n_walkers, n_steps, dim));
        let mut log_prob = Array2::<f64>::zeros((n_walkers, n_steps));

        let window_size = 100;
        let mut accept_window: VecDeque<f64> = VecDeque::with_capacity(window_size);

        for t in 0..n_steps {
            let accepted = self.step();
            chain.slice_mut(s![.., t, ..]).assign(&self.positions);
            log_prob.column_mut(t).assign(&self.log_probs);

            if let Some(pb) = pb {
                accept_window.push_front(accepted as f64 / n_walkers as f64);
                if accept_window.len() > window_size {
                    accept_window.pop_back();
                }
                let rate = accept_window.iter().sum::<f64>() / accept_window.len() as f64;
                pb.set_message(format!("p(accept)≈{rate:.2}"));
                pb.inc(1);
            }
        }

        EnsembleChain {
            chain,
            log_prob,
            acceptance_fraction: self.acceptance_fraction(),
        }
    }
}

/// The recorded history of an ensemble run.
#[derive(Debug, Clone, PartialEq)]
pub struct EnsembleChain {
    chain: Array3<f64>,
    log_prob: Array2<f64>,
    acceptance_fraction: Array1<f64>,
}

impl EnsembleChain {
    /// Positions shaped `[n_walkers, n_steps, dim]`.
    pub fn chain(&self) -> ArrayView3<'_, f64> {
        self.chain.view()
    }

    /// Log-densities shaped `[n_walkers, n_steps]`.
    pub fn log_prob(&self) -> ArrayView2<'_, f64> {
        self.log_prob.view()
    }

    /// Per-walker acceptance fraction at the end of the run.
    pub fn acceptance_fraction(&self) -> ArrayView1<'_, f64> {
        self.acceptance_fraction.view()
    }

    pub fn n_walkers(&self) -> usize {
        self.chain.dim().0
    }

    pub fn n_steps(&self) -> usize {
        self.chain.dim().1
    }

    pub fn dim(&self) -> usize {
        self.chain.dim().2
    }

    /// Drops the first `discard` steps of every walker and stacks what is
    /// left walker after walker into a `[n_walkers · kept, dim]` sample.
    pub fn flat_samples(&self, discard: usize) -> Array2<f64> {
        let discard = discard.min(self.n_steps());
        let kept = self.n_steps() - discard;
        let tail = self.chain.slice(s![.., discard.., ..]);
        let data: Vec<f64> = tail.iter().copied().collect();
        Array2::from_shape_vec((self.n_walkers() * kept, self.dim()), data)
            .expect("Expecting the retained chain to reshape into a flat sample")
    }

    /// Log-densities matching [`EnsembleChain::flat_samples`].
    pub fn flat_log_prob(&self, discard: usize) -> Array1<f64> {
        let discard = discard.min(self.n_steps());
        self.log_prob.slice(s![.., discard..]).iter().copied().collect()
    }
}
