/*!
Targets for the ensemble sampler.

A target only has to report its unnormalized log-density; returning
`f64::NEG_INFINITY` marks a state as impossible and the sampler will never
move there. The fitter's [`crate::likelihood::LogLikelihood`] is the target used in
practice; [`IsotropicGaussian`] is a reference target with known moments.

# Examples

```rust
use mnn_fit::distributions::{IsotropicGaussian, Target};
use ndarray::arr1;

let target = IsotropicGaussian::new(arr1(&[0.0, 1.0]), 2.0);
assert_eq!(target.unnorm_log_prob(&[0.0, 1.0]), 0.0);
assert_eq!(target.unnorm_log_prob(&[2.0, 1.0]), -0.5);
```
*/

use ndarray::Array1;

/// A continuous distribution known up to a constant.
///
/// Implementations must be callable from several threads at once: the
/// sampler evaluates all walkers of one half-ensemble in parallel.
pub trait Target {
    /// Log of the unnormalized density at `theta`.
    fn unnorm_log_prob(&self, theta: &[f64]) -> f64;
}

impl<F> Target for F
where
    F: Fn(&[f64]) -> f64,
{
    fn unnorm_log_prob(&self, theta: &[f64]) -> f64 {
        self(theta)
    }
}

/// An isotropic Gaussian of any dimension centred on `mean`.
#[derive(Debug, Clone, PartialEq)]
pub struct IsotropicGaussian {
    pub mean: Array1<f64>,
    pub std: f64,
}

impl IsotropicGaussian {
    pub fn new(mean: Array1<f64>, std: f64) -> Self {
        Self { mean, std }
    }
}

impl Target for IsotropicGaussian {
    fn unnorm_log_prob(&self, theta: &[f64]) -> f64 {
        let sum: f64 = theta
            .iter()
            .zip(self.mean.iter())
            .map(|(x, m)| (x - m) * (x - m))
            .sum();
        -0.5 * sum / (self.std * self.std)
    }
}
