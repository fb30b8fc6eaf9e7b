//! Conversion between disks and the flat parameter vectors handled by the
//! optimizer and the sampler.
//!
//! A vector holds one `(a, b, M)` triple per disk, in the order of an
//! [`AxisLayout`]. The layout is fixed for a whole fit; only the numbers move.

use crate::disk::{Axis, Disk};
use crate::error::{MnnError, MnnResult};

/// Number of parameters per disk.
pub const PARAMS_PER_DISK: usize = 3;

/// The normal axis of every disk of a model, in parameter order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AxisLayout {
    axes: Vec<Axis>,
}

impl AxisLayout {
    /// `nx` disks normal to x, then `ny` normal to y, then `nz` normal to z.
    pub fn from_counts(nx: usize, ny: usize, nz: usize) -> Self {
        let axes = std::iter::repeat(Axis::X)
            .take(nx)
            .chain(std::iter::repeat(Axis::Y).take(ny))
            .chain(std::iter::repeat(Axis::Z).take(nz))
            .collect();
        Self { axes }
    }

    pub fn from_axes(axes: Vec<Axis>) -> Self {
        Self { axes }
    }

    pub fn axes(&self) -> &[Axis] {
        &self.axes
    }

    pub fn n_disks(&self) -> usize {
        self.axes.len()
    }

    /// Length of a parameter vector for this layout.
    pub fn n_params(&self) -> usize {
        PARAMS_PER_DISK * self.axes.len()
    }

    /// Labels of every parameter, e.g. `axy1, bxy1, Mxy1, ayz1, ...`.
    ///
    /// Disks are numbered from 1 within their plane.
    pub fn labels(&self) -> Vec<String> {
        let mut counters = [0usize; 3];
        let mut labels = Vec::with_capacity(self.n_params());
        for axis in &self.axes {
            counters[axis.index()] += 1;
            let suffix = format!("{}{}", axis.plane(), counters[axis.index()]);
            labels.extend(["a", "b", "M"].iter().map(|p| format!("{p}{suffix}")));
        }
        labels
    }
}

/// Flattens disks into `(a, b, M)` triples.
pub fn pack(disks: &[Disk]) -> Vec<f64> {
    disks.iter().flat_map(|d| [d.a, d.b, d.mass]).collect()
}

/// Rebuilds disks from a flat vector. No physical constraint is checked.
pub fn unpack(layout: &AxisLayout, params: &[f64]) -> MnnResult<Vec<Disk>> {
    if params.len() != layout.n_params() {
        return Err(MnnError::usage(format!(
            "expected {} parameters for {} disks, got {}",
            layout.n_params(),
            layout.n_disks(),
            params.len()
        )));
    }
    Ok(layout
        .axes()
        .iter()
        .zip(params.chunks_exact(PARAMS_PER_DISK))
        .map(|(&axis, p)| Disk::new(axis, p[0], p[1], p[2]))
        .collect())
}
