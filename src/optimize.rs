/*!
# Derivative-free minimizers

Two small minimizers cover everything the fitter needs:

- [`minimize_bounded`]: Brent's method on a closed interval, used to look
  for the smallest density along a coordinate axis.
- [`NelderMead`]: the downhill simplex method, used for the
  maximum-likelihood point estimate. It only compares objective values, so
  infeasible parameter vectors can simply report `+∞`.

Both treat a `NaN` objective value as `+∞`.

```rust
use mnn_fit::optimize::{minimize_bounded, NelderMead};

let (x, fx) = minimize_bounded(|x| (x - 2.0) * (x - 2.0), 0.0, 5.0);
assert!((x - 2.0).abs() < 1e-4 && fx < 1e-8);

let bowl = |p: &[f64]| (p[0] - 1.0).powi(2) + (p[1] + 2.0).powi(2);
let result = NelderMead::default().minimize(bowl, &[0.0, 0.0]);
assert!(result.converged);
assert!((result.x[0] - 1.0).abs() < 1e-3);
```
*/

use std::cell::Cell;

use ndarray::{s, Array1, Array2, Axis};

/// Absolute tolerance on the abscissa for [`minimize_bounded`].
pub const BOUNDED_XTOL: f64 = 1e-5;
/// Evaluation budget for [`minimize_bounded`].
pub const BOUNDED_MAX_EVALUATIONS: usize = 500;

fn sanitize(value: f64) -> f64 {
    if value.is_nan() {
        f64::INFINITY
    } else {
        value
    }
}

fn sign(value: f64) -> f64 {
    if value >= 0.0 {
        1.0
    } else {
        -1.0
    }
}

/// Minimizes a scalar function on `[lower, upper]` with Brent's method
/// (golden-section search accelerated by parabolic interpolation).
///
/// Returns the abscissa of the best point found and the function value there.
/// Bounds given in the wrong order are swapped.
pub fn minimize_bounded<F>(f: F, lower: f64, upper: f64) -> (f64, f64)
where
    F: Fn(f64) -> f64,
{
    let (mut a, mut b) = if lower <= upper {
        (lower, upper)
    } else {
        (upper, lower)
    };
    let sqrt_eps = f64::EPSILON.sqrt();
    let golden_mean = 0.5 * (3.0 - 5.0_f64.sqrt());

    let mut fulc = a + golden_mean * (b - a);
    let mut nfc = fulc;
    let mut xf = fulc;
    let mut rat = 0.0_f64;
    let mut e = 0.0_f64;
    let mut fx = sanitize(f(xf));
    let mut n_eval = 1;
    let mut ffulc = fx;
    let mut fnfc = fx;

    let mut xm = 0.5 * (a + b);
    let mut tol1 = sqrt_eps * xf.abs() + BOUNDED_XTOL / 3.0;
    let mut tol2 = 2.0 * tol1;

    while (xf - xm).abs() > tol2 - 0.5 * (b - a) {
        let mut golden = true;

        if e.abs() > tol1 {
            golden = false;
            let mut r = (xf - nfc) * (fx - ffulc);
            let mut q = (xf - fulc) * (fx - fnfc);
            let mut p = (xf - fulc) * q - (xf - nfc) * r;
            q = 2.0 * (q - r);
            if q > 0.0 {
                p = -p;
            }
            q = q.abs();
            r = e;
            e = rat;

            if p.abs() < (0.5 * q * r).abs() && p > q * (a - xf) && p < q * (b - xf) {
                // Parabolic step.
                rat = p / q;
                let x = xf + rat;
                if (x - a) < tol2 || (b - x) < tol2 {
                    rat = tol1 * sign(xm - xf);
                }
            } else {
                golden = true;
            }
        }

        if golden {
            e = if xf >= xm { a - xf } else { b - xf };
            rat = golden_mean * e;
        }

        let x = xf + sign(rat) * rat.abs().max(tol1);
        let fu = sanitize(f(x));
        n_eval += 1;

        if fu <= fx {
            if x >= xf {
                a = xf;
            } else {
                b = xf;
            }
            fulc = nfc;
            ffulc = fnfc;
            nfc = xf;
            fnfc = fx;
            xf = x;
            fx = fu;
        } else {
            if x < xf {
                a = x;
            } else {
                b = x;
            }
            if fu <= fnfc || nfc == xf {
                fulc = nfc;
                ffulc = fnfc;
                nfc = x;
                fnfc = fu;
            } else if fu <= ffulc || fulc == xf || fulc == nfc {
                fulc = x;
                ffulc = fu;
            }
        }

        xm = 0.5 * (a + b);
        tol1 = sqrt_eps * xf.abs() + BOUNDED_XTOL / 3.0;
        tol2 = 2.0 * tol1;

        if n_eval >= BOUNDED_MAX_EVALUATIONS {
            break;
        }
    }

    (xf, fx)
}

/// Outcome of a [`NelderMead::minimize`] run.
#[derive(Debug, Clone, PartialEq)]
pub struct OptimizationResult {
    /// Best vertex of the final simplex.
    pub x: Vec<f64>,
    /// Objective value at `x`.
    pub fun: f64,
    pub iterations: usize,
    pub evaluations: usize,
    /// `false` when the iteration budget ran out before both tolerances were
    /// met.
    pub converged: bool,
}

/// Nelder-Mead downhill simplex with the standard coefficients
/// (reflection 1, expansion 2, contraction 1/2, shrink 1/2).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NelderMead {
    /// Iteration budget; `None` means `200 × dimension`.
    pub max_iterations: Option<usize>,
    /// Convergence tolerance on the simplex extent.
    pub xatol: f64,
    /// Convergence tolerance on the spread of objective values.
    pub fatol: f64,
}

impl Default for NelderMead {
    fn default() -> Self {
        Self {
            max_iterations: None,
            xatol: 1e-4,
            fatol: 1e-4,
        }
    }
}

impl NelderMead {
    pub fn with_tolerances(mut self, xatol: f64, fatol: f64) -> Self {
        self.xatol = xatol;
        self.fatol = fatol;
        self
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = Some(max_iterations);
        self
    }

    /// Minimizes `f` starting from `x0`.
    ///
    /// The initial simplex perturbs each coordinate of `x0` by 5% (or by
    /// `0.00025` when the coordinate is zero).
    pub fn minimize<F>(&self, f: F, x0: &[f64]) -> OptimizationResult
    where
        F: Fn(&[f64]) -> f64,
    {
        const RHO: f64 = 1.0;
        const CHI: f64 = 2.0;
        const PSI: f64 = 0.5;
        const SIGMA: f64 = 0.5;
        const NONZDELT: f64 = 0.05;
        const ZDELT: f64 = 0.00025;

        let n = x0.len();
        let max_iterations = self.max_iterations.unwrap_or(200 * n.max(1));

        let evaluations = Cell::new(0usize);
        let eval = |x: &Array1<f64>| {
            evaluations.set(evaluations.get() + 1);
            sanitize(f(x.as_slice().expect("Expecting simplex vertices to be contiguous")))
        };

        let mut sim = Array2::<f64>::zeros((n + 1, n));
        sim.row_mut(0).assign(&Array1::from(x0.to_vec()));
        for k in 0..n {
            let mut y = Array1::from(x0.to_vec());
            y[k] = if y[k] != 0.0 { (1.0 + NONZDELT) * y[k] } else { ZDELT };
            sim.row_mut(k + 1).assign(&y);
        }
        let mut fsim: Vec<f64> = sim.outer_iter().map(|v| eval(&v.to_owned())).collect();
        sort_simplex(&mut sim, &mut fsim);

        let mut iterations = 0usize;
        let mut converged = false;

        while iterations < max_iterations {
            let best = sim.row(0);
            let x_spread = sim
                .slice(s![1.., ..])
                .outer_iter()
                .map(|row| (&row - &best).fold(0.0_f64, |m, v| m.max(v.abs())))
                .fold(0.0_f64, f64::max);
            let f_spread = fsim[1..]
                .iter()
                .map(|fv| (fsim[0] - fv).abs())
                .fold(0.0_f64, |acc, d| if d.is_nan() { f64::INFINITY } else { acc.max(d) });
            if x_spread <= self.xatol && f_spread <= self.fatol {
                converged = true;
                break;
            }

            let xbar = sim
                .slice(s![..n, ..])
                .mean_axis(Axis(0))
                .unwrap_or_else(|| Array1::zeros(n));
            let worst = sim.row(n).to_owned();

            let xr = &xbar * (1.0 + RHO) - &worst * RHO;
            let fxr = eval(&xr);
            let mut shrink = false;

            if fxr < fsim[0] {
                let xe = &xbar * (1.0 + RHO * CHI) - &worst * (RHO * CHI);
                let fxe = eval(&xe);
                if fxe < fxr {
                    sim.row_mut(n).assign(&xe);
                    fsim[n] = fxe;
                } else {
                    sim.row_mut(n).assign(&xr);
                    fsim[n] = fxr;
                }
            } else if fxr < fsim[n - 1] {
                sim.row_mut(n).assign(&xr);
                fsim[n] = fxr;
            } else if fxr < fsim[n] {
                // Outside contraction.
                let xc = &xbar * (1.0 + PSI * RHO) - &worst * (PSI * RHO);
                let fxc = eval(&xc);
                if fxc <= fxr {
                    sim.row_mut(n).assign(&xc);
                    fsim[n] = fxc;
                } else {
                    shrink = true;
                }
            } else {
                // Inside contraction.
                let xcc = &xbar * (1.0 - PSI) + &worst * PSI;
                let fxcc = eval(&xcc);
                if fxcc < fsim[n] {
                    sim.row_mut(n).assign(&xcc);
                    fsim[n] = fxcc;
                } else {
                    shrink = true;
                }
            }

            if shrink {
                let best = sim.row(0).to_owned();
                for j in 1..=n {
                    let v = &best + &((&sim.row(j) - &best) * SIGMA);
                    fsim[j] = eval(&v);
                    sim.row_mut(j).assign(&v);
                }
            }

            sort_simplex(&mut sim, &mut fsim);
            iterations += 1;
        }

        OptimizationResult {
            x: sim.row(0).to_vec(),
            fun: fsim[0],
            iterations,
            evaluations: evaluations.get(),
            converged,
        }
    }
}

fn sort_simplex(sim: &mut Array2<f64>, fsim: &mut Vec<f64>) {
    let mut order: Vec<usize> = (0..fsim.len()).collect();
    order.sort_by(|&i, &j| fsim[i].total_cmp(&fsim[j]));
    let sorted_sim = sim.select(Axis(0), &order);
    let sorted_f: Vec<f64> = order.iter().map(|&i| fsim[i]).collect();
    *sim = sorted_sim;
    *fsim = sorted_f;
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn bounded_finds_interior_minimum() {
        let (x, fx) = minimize_bounded(|x| (x - 1.5).powi(2) + 0.25, 0.0, 10.0);
        assert_abs_diff_eq!(x, 1.5, epsilon = 1e-4);
        assert_abs_diff_eq!(fx, 0.25, epsilon = 1e-8);
    }

    #[test]
    fn bounded_stops_at_boundary() {
        let (x, _) = minimize_bounded(|x| x, 0.0, 3.0);
        assert!(x < 1e-3, "expected the left bound, got {x}");
    }

    #[test]
    fn bounded_swaps_reversed_bounds() {
        let (x, _) = minimize_bounded(|x| (x - 2.0).powi(2), 4.0, 0.0);
        assert_abs_diff_eq!(x, 2.0, epsilon = 1e-4);
    }

    #[test]
    fn bounded_handles_nan_as_infinity() {
        let (x, fx) = minimize_bounded(
            |x| if x < 0.5 { f64::NAN } else { (x - 1.0).powi(2) },
            0.0,
            2.0,
        );
        assert!(fx.is_finite());
        assert_abs_diff_eq!(x, 1.0, epsilon = 1e-3);
    }

    #[test]
    fn nelder_mead_rosenbrock() {
        let rosenbrock =
            |p: &[f64]| (1.0 - p[0]).powi(2) + 100.0 * (p[1] - p[0] * p[0]).powi(2);
        let result = NelderMead::default()
            .with_tolerances(1e-10, 1e-10)
            .with_max_iterations(5_000)
            .minimize(rosenbrock, &[-1.2, 1.0]);
        assert!(result.converged, "{result:?}");
        assert_abs_diff_eq!(result.x[0], 1.0, epsilon = 1e-4);
        assert_abs_diff_eq!(result.x[1], 1.0, epsilon = 1e-4);
        assert!(result.evaluations >= result.iterations);
    }

    #[test]
    fn nelder_mead_avoids_infeasible_region() {
        // Minimum of the unconstrained quadratic lies at x = -1, outside the
        // feasible half-line; the constrained optimum sits on the boundary.
        let f = |p: &[f64]| {
            if p[0] < 0.0 {
                f64::INFINITY
            } else {
                (p[0] + 1.0).powi(2) + (p[1] - 3.0).powi(2)
            }
        };
        let result = NelderMead::default()
            .with_tolerances(1e-8, 1e-8)
            .with_max_iterations(2_000)
            .minimize(f, &[2.0, 0.0]);
        assert!(result.x[0] >= 0.0);
        assert!(result.fun < 1.5, "{result:?}");
    }

    #[test]
    fn nelder_mead_reports_budget_exhaustion() {
        let result = NelderMead::default()
            .with_tolerances(0.0, 0.0)
            .with_max_iterations(5)
            .minimize(|p| p[0] * p[0], &[1.0]);
        assert!(!result.converged);
        assert_eq!(result.iterations, 5);
    }
}
