/*!
# Multi-disk model

[`DiskModel`] is an ordered superposition of Miyamoto-Nagai(-negative) disks.
Every quantity it returns is the sum of the per-disk quantities, each
evaluated in that disk's own frame (see [`crate::disk::Axis::frame`]), scaled by
the model's normalization.

## Example

```rust
use mnn_fit::disk::Axis;
use mnn_fit::model::DiskModel;

let mut model = DiskModel::new();
model.add_disks(&[(Axis::Z, 1.0, 0.1, 50.0), (Axis::X, 1.0, 0.5, 10.0)]).unwrap();
assert_eq!(model.len(), 2);

let rho = model.evaluate_density(0.5, 0.0, 0.1);
assert!(rho > 0.0);
assert!(model.is_positive_definite(None));
```
*/

use std::fmt;
use std::str::FromStr;

use ndarray::{Array1, Array2, Array3, Array4, ArrayView1, ArrayView2};
use tracing::warn;

use crate::disk::{Axis, Disk, DEFAULT_G};
use crate::error::{MnnError, MnnResult};
use crate::optimize::minimize_bounded;
use crate::params::{pack, unpack, AxisLayout};

/// How a disk with `a + b < 0` is treated when it is added to a model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScaleHeightPolicy {
    /// Log a warning and keep the disk.
    #[default]
    Warn,
    /// Refuse the disk with [`MnnError::ConstraintViolation`].
    Reject,
}

/// Model-wide settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelConfig {
    /// Gravitational constant in the caller's unit system.
    pub gravitational_constant: f64,
    /// Factor applied to every summed quantity.
    pub normalization: f64,
    pub scale_height_policy: ScaleHeightPolicy,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            gravitational_constant: DEFAULT_G,
            normalization: 1.0,
            scale_height_policy: ScaleHeightPolicy::Warn,
        }
    }
}

impl ModelConfig {
    pub fn with_gravitational_constant(mut self, g: f64) -> Self {
        self.gravitational_constant = g;
        self
    }

    pub fn with_normalization(mut self, normalization: f64) -> Self {
        self.normalization = normalization;
        self
    }

    pub fn with_scale_height_policy(mut self, policy: ScaleHeightPolicy) -> Self {
        self.scale_height_policy = policy;
        self
    }
}

/// A quantity that can be evaluated on a model, fitted, or sampled on a grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Quantity {
    Density,
    #[default]
    Potential,
    Force,
}

impl Quantity {
    pub const NAMES: [&'static str; 3] = ["density", "potential", "force"];
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Quantity::Density => "density",
            Quantity::Potential => "potential",
            Quantity::Force => "force",
        };
        f.write_str(name)
    }
}

impl FromStr for Quantity {
    type Err = MnnError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "density" => Ok(Quantity::Density),
            "potential" => Ok(Quantity::Potential),
            "force" => Ok(Quantity::Force),
            other => Err(MnnError::usage(format!(
                "unknown quantity '{other}', possible values are {:?}",
                Quantity::NAMES
            ))),
        }
    }
}

/// One coordinate of a batch of evaluation points: either the same value for
/// every point or one value per point.
#[derive(Debug, Clone)]
pub enum Coordinate<'a> {
    Uniform(f64),
    Values(ArrayView1<'a, f64>),
}

impl Coordinate<'_> {
    fn len(&self) -> Option<usize> {
        match self {
            Coordinate::Uniform(_) => None,
            Coordinate::Values(v) => Some(v.len()),
        }
    }

    fn get(&self, i: usize) -> f64 {
        match self {
            Coordinate::Uniform(v) => *v,
            Coordinate::Values(v) => v[i],
        }
    }
}

impl From<f64> for Coordinate<'_> {
    fn from(value: f64) -> Self {
        Coordinate::Uniform(value)
    }
}

impl<'a> From<ArrayView1<'a, f64>> for Coordinate<'a> {
    fn from(values: ArrayView1<'a, f64>) -> Self {
        Coordinate::Values(values)
    }
}

impl<'a> From<&'a Array1<f64>> for Coordinate<'a> {
    fn from(values: &'a Array1<f64>) -> Self {
        Coordinate::Values(values.view())
    }
}

impl<'a> From<&'a [f64]> for Coordinate<'a> {
    fn from(values: &'a [f64]) -> Self {
        Coordinate::Values(ArrayView1::from(values))
    }
}

impl<'a> From<&'a Vec<f64>> for Coordinate<'a> {
    fn from(values: &'a Vec<f64>) -> Self {
        Coordinate::Values(ArrayView1::from(values.as_slice()))
    }
}

/// Broadcasts three coordinates to a common number of points.
fn broadcast_len(coords: [&Coordinate<'_>; 3]) -> MnnResult<usize> {
    let mut n: Option<usize> = None;
    for c in coords {
        if let Some(len) = c.len() {
            match n {
                Some(m) if m != len => {
                    return Err(MnnError::usage(format!(
                        "coordinate arrays have mismatched lengths ({m} and {len})"
                    )))
                }
                _ => n = Some(len),
            }
        }
    }
    Ok(n.unwrap_or(1))
}

#[derive(Debug, Clone, Copy)]
enum ScalarQuantity {
    Density,
    Potential,
    CircularVelocity,
}

/// Values of a quantity sampled on a regular grid.
#[derive(Debug, Clone, PartialEq)]
pub enum MeshValues {
    /// Density or potential, shaped `(nx, ny, nz)`.
    Scalar(Array3<f64>),
    /// Force, shaped `(nx, ny, nz, 3)`.
    Vector(Array4<f64>),
}

/// A regular 3D grid (`ij` indexing) and the model evaluated on every node.
#[derive(Debug, Clone, PartialEq)]
pub struct Meshgrid {
    pub x: Array3<f64>,
    pub y: Array3<f64>,
    pub z: Array3<f64>,
    pub values: MeshValues,
}

/// An ordered superposition of disks.
///
/// Disks can only be appended. [`DiskModel::disks`] returns a copy, so
/// callers never alias the internal storage.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DiskModel {
    disks: Vec<Disk>,
    config: ModelConfig,
}

impl DiskModel {
    /// An empty model with the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: ModelConfig) -> Self {
        Self {
            disks: Vec::new(),
            config,
        }
    }

    /// Rebuilds a model from a flat `(a, b, M)` parameter vector.
    pub fn from_parameters(
        layout: &AxisLayout,
        params: &[f64],
        config: ModelConfig,
    ) -> MnnResult<Self> {
        let mut model = Self::with_config(config);
        for disk in unpack(layout, params)? {
            model.push_disk(disk)?;
        }
        Ok(model)
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    pub fn len(&self) -> usize {
        self.disks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.disks.is_empty()
    }

    /// Appends a disk lying in the plane normal to `axis`.
    ///
    /// Fails with [`MnnError::ConstraintViolation`] when `b < 0`. When
    /// `a + b < 0` the disk is kept with a warning, or refused under
    /// [`ScaleHeightPolicy::Reject`].
    pub fn add_disk(&mut self, axis: Axis, a: f64, b: f64, mass: f64) -> MnnResult<()> {
        self.push_disk(Disk::new(axis, a, b, mass))
    }

    /// Appends several `(axis, a, b, M)` disks.
    ///
    /// Either every disk is added or, if one of them violates a constraint,
    /// none is.
    pub fn add_disks(&mut self, disks: &[(Axis, f64, f64, f64)]) -> MnnResult<()> {
        let disks: Vec<Disk> = disks.iter().copied().map(Disk::from).collect();
        for disk in &disks {
            self.check_disk(disk)?;
        }
        self.disks.extend(disks);
        Ok(())
    }

    fn push_disk(&mut self, disk: Disk) -> MnnResult<()> {
        self.check_disk(&disk)?;
        self.disks.push(disk);
        Ok(())
    }

    fn check_disk(&self, disk: &Disk) -> MnnResult<()> {
        if disk.b < 0.0 {
            return Err(MnnError::ConstraintViolation(format!(
                "the height of a disk cannot be negative (b={})",
                disk.b
            )));
        }
        if disk.a + disk.b < 0.0 {
            match self.config.scale_height_policy {
                ScaleHeightPolicy::Warn => warn!(
                    a = disk.a,
                    b = disk.b,
                    "sum of disk scale and height is negative"
                ),
                ScaleHeightPolicy::Reject => {
                    return Err(MnnError::ConstraintViolation(format!(
                        "the sum of the scale and height of a disk cannot be negative (a={}, b={})",
                        disk.a, disk.b
                    )))
                }
            }
        }
        Ok(())
    }

    /// Snapshot of the disks as `(axis, a, b, M)` tuples, in insertion order.
    pub fn get_disks(&self) -> Vec<(Axis, f64, f64, f64)> {
        self.disks.iter().map(Disk::as_tuple).collect()
    }

    /// Snapshot of the disks.
    pub fn disks(&self) -> Vec<Disk> {
        self.disks.clone()
    }

    /// Axis of every disk, in insertion order.
    pub fn layout(&self) -> AxisLayout {
        AxisLayout::from_axes(self.disks.iter().map(|d| d.axis).collect())
    }

    /// The disks packed as a flat `(a, b, M)` vector.
    pub fn parameters(&self) -> Vec<f64> {
        pack(&self.disks)
    }

    fn sum_scalar(&self, point: [f64; 3], quantity: ScalarQuantity) -> f64 {
        let g = self.config.gravitational_constant;
        let total: f64 = self
            .disks
            .iter()
            .map(|d| match quantity {
                ScalarQuantity::Density => d.density(point),
                ScalarQuantity::Potential => d.potential(point, g),
                ScalarQuantity::CircularVelocity => d.circular_velocity(point, g),
            })
            .sum();
        self.config.normalization * total
    }

    fn sum_force(&self, point: [f64; 3]) -> [f64; 3] {
        let g = self.config.gravitational_constant;
        let mut total = [0.0; 3];
        for disk in &self.disks {
            let f = disk.force(point, g);
            for d in 0..3 {
                total[d] += f[d];
            }
        }
        total.map(|v| self.config.normalization * v)
    }

    pub fn evaluate_density(&self, x: f64, y: f64, z: f64) -> f64 {
        self.sum_scalar([x, y, z], ScalarQuantity::Density)
    }

    pub fn evaluate_potential(&self, x: f64, y: f64, z: f64) -> f64 {
        self.sum_scalar([x, y, z], ScalarQuantity::Potential)
    }

    pub fn evaluate_circular_velocity(&self, x: f64, y: f64, z: f64) -> f64 {
        self.sum_scalar([x, y, z], ScalarQuantity::CircularVelocity)
    }

    /// Summed force at a point, in Cartesian order.
    pub fn evaluate_force(&self, x: f64, y: f64, z: f64) -> [f64; 3] {
        self.sum_force([x, y, z])
    }

    /// Evaluates a quantity reduced to one scalar per point: the value itself
    /// for density and potential, the Euclidean norm for force.
    pub fn evaluate_scalar(&self, quantity: Quantity, point: [f64; 3]) -> f64 {
        match quantity {
            Quantity::Density => self.sum_scalar(point, ScalarQuantity::Density),
            Quantity::Potential => self.sum_scalar(point, ScalarQuantity::Potential),
            Quantity::Force => {
                let f = self.sum_force(point);
                (f[0] * f[0] + f[1] * f[1] + f[2] * f[2]).sqrt()
            }
        }
    }

    fn scalar_batch<'a>(
        &self,
        x: Coordinate<'a>,
        y: Coordinate<'a>,
        z: Coordinate<'a>,
        quantity: ScalarQuantity,
    ) -> MnnResult<Array1<f64>> {
        let n = broadcast_len([&x, &y, &z])?;
        Ok(Array1::from_shape_fn(n, |i| {
            self.sum_scalar([x.get(i), y.get(i), z.get(i)], quantity)
        }))
    }

    /// Element-wise density over a batch of points.
    ///
    /// Each coordinate is either a scalar broadcast to every point or an
    /// array; all arrays must share one length. Three scalars yield a single
    /// value.
    pub fn evaluate_density_at<'a>(
        &self,
        x: impl Into<Coordinate<'a>>,
        y: impl Into<Coordinate<'a>>,
        z: impl Into<Coordinate<'a>>,
    ) -> MnnResult<Array1<f64>> {
        self.scalar_batch(x.into(), y.into(), z.into(), ScalarQuantity::Density)
    }

    /// Element-wise potential over a batch of points.
    pub fn evaluate_potential_at<'a>(
        &self,
        x: impl Into<Coordinate<'a>>,
        y: impl Into<Coordinate<'a>>,
        z: impl Into<Coordinate<'a>>,
    ) -> MnnResult<Array1<f64>> {
        self.scalar_batch(x.into(), y.into(), z.into(), ScalarQuantity::Potential)
    }

    /// Element-wise circular velocity over a batch of points.
    pub fn evaluate_circular_velocity_at<'a>(
        &self,
        x: impl Into<Coordinate<'a>>,
        y: impl Into<Coordinate<'a>>,
        z: impl Into<Coordinate<'a>>,
    ) -> MnnResult<Array1<f64>> {
        self.scalar_batch(
            x.into(),
            y.into(),
            z.into(),
            ScalarQuantity::CircularVelocity,
        )
    }

    /// Element-wise force over a batch of points, shaped `N×3`.
    pub fn evaluate_force_at<'a>(
        &self,
        x: impl Into<Coordinate<'a>>,
        y: impl Into<Coordinate<'a>>,
        z: impl Into<Coordinate<'a>>,
    ) -> MnnResult<Array2<f64>> {
        let (x, y, z) = (x.into(), y.into(), z.into());
        let n = broadcast_len([&x, &y, &z])?;
        let mut out = Array2::zeros((n, 3));
        for (i, mut row) in out.outer_iter_mut().enumerate() {
            let f = self.sum_force([x.get(i), y.get(i), z.get(i)]);
            row.assign(&ArrayView1::from(&f));
        }
        Ok(out)
    }

    fn check_points(points: &ArrayView2<'_, f64>) -> MnnResult<()> {
        if points.ncols() != 3 {
            return Err(MnnError::usage(format!(
                "points must be an N×3 array, got {} columns",
                points.ncols()
            )));
        }
        Ok(())
    }

    /// Density at every row of an `N×3` array of points.
    pub fn evaluate_density_points(&self, points: ArrayView2<'_, f64>) -> MnnResult<Array1<f64>> {
        Self::check_points(&points)?;
        Ok(points
            .outer_iter()
            .map(|p| self.sum_scalar([p[0], p[1], p[2]], ScalarQuantity::Density))
            .collect())
    }

    /// Potential at every row of an `N×3` array of points.
    pub fn evaluate_potential_points(
        &self,
        points: ArrayView2<'_, f64>,
    ) -> MnnResult<Array1<f64>> {
        Self::check_points(&points)?;
        Ok(points
            .outer_iter()
            .map(|p| self.sum_scalar([p[0], p[1], p[2]], ScalarQuantity::Potential))
            .collect())
    }

    /// Force at every row of an `N×3` array of points, shaped `N×3`.
    pub fn evaluate_force_points(&self, points: ArrayView2<'_, f64>) -> MnnResult<Array2<f64>> {
        Self::check_points(&points)?;
        self.evaluate_force_at(points.column(0), points.column(1), points.column(2))
    }

    /// Summed density along a coordinate axis, the two other coordinates at zero.
    pub fn density_along(&self, axis: Axis, r: f64) -> f64 {
        self.sum_scalar(axis.point_at(r), ScalarQuantity::Density)
    }

    /// Checks that the density stays non-negative along the three coordinate axes.
    ///
    /// For each axis the density restricted to that axis is minimized over
    /// `[0, range]`. Without `max_range`, the range is ten times the largest
    /// scale `a` among the disks *not* normal to the probed axis, and the axis
    /// is skipped when that scale is zero. A negative `max_range` is read as
    /// its magnitude, so the search always runs over non-negative `r`.
    /// Returns `false` as soon as one minimum is negative. The model is left
    /// untouched.
    pub fn is_positive_definite(&self, max_range: Option<f64>) -> bool {
        for axis in Axis::ALL {
            let range = match max_range {
                Some(range) => range.abs(),
                None => {
                    let largest = self
                        .disks
                        .iter()
                        .filter(|d| d.axis != axis)
                        .map(|d| d.a)
                        .fold(0.0_f64, f64::max);
                    if largest.abs() < 1e-18 {
                        continue;
                    }
                    10.0 * largest
                }
            };

            let (r_min, density_min) =
                minimize_bounded(|r| self.density_along(axis, r), 0.0, range);
            if density_min < 0.0 {
                tracing::debug!(
                    %axis,
                    r = r_min,
                    density = density_min,
                    "density goes below zero along axis"
                );
                return false;
            }
        }
        true
    }

    /// Samples a quantity on a regular grid.
    ///
    /// `xmin`, `xmax` and `n` are the per-axis lower bounds, upper bounds and
    /// node counts and must each hold exactly three entries; `quantity` is one
    /// of `"density"`, `"potential"` or `"force"`.
    pub fn generate_dataset_meshgrid(
        &self,
        xmin: &[f64],
        xmax: &[f64],
        n: &[usize],
        quantity: &str,
    ) -> MnnResult<Meshgrid> {
        let quantity: Quantity = quantity.parse()?;
        if xmin.len() != 3 || xmax.len() != 3 || n.len() != 3 {
            return Err(MnnError::usage(
                "xmin, xmax and n must be triplets, one entry per axis",
            ));
        }

        let axes: Vec<Array1<f64>> = (0..3)
            .map(|i| Array1::linspace(xmin[i], xmax[i], n[i]))
            .collect();
        let shape = (n[0], n[1], n[2]);
        let x = Array3::from_shape_fn(shape, |(i, _, _)| axes[0][i]);
        let y = Array3::from_shape_fn(shape, |(_, j, _)| axes[1][j]);
        let z = Array3::from_shape_fn(shape, |(_, _, k)| axes[2][k]);

        let values = match quantity {
            Quantity::Density => MeshValues::Scalar(Array3::from_shape_fn(shape, |idx| {
                self.sum_scalar([x[idx], y[idx], z[idx]], ScalarQuantity::Density)
            })),
            Quantity::Potential => MeshValues::Scalar(Array3::from_shape_fn(shape, |idx| {
                self.sum_scalar([x[idx], y[idx], z[idx]], ScalarQuantity::Potential)
            })),
            Quantity::Force => {
                let mut out = Array4::zeros((n[0], n[1], n[2], 3));
                for ((i, j, k), _) in x.indexed_iter() {
                    let f = self.sum_force([x[(i, j, k)], y[(i, j, k)], z[(i, j, k)]]);
                    out.slice_mut(ndarray::s![i, j, k, ..])
                        .assign(&ArrayView1::from(&f));
                }
                MeshValues::Vector(out)
            }
        };

        Ok(Meshgrid { x, y, z, values })
    }
}

impl Meshgrid {
    /// Flattens the grid into `(x, y, z, value)` rows.
    ///
    /// Only scalar quantities can be flattened this way; force grids return
    /// `None`.
    pub fn to_table(&self) -> Option<Array2<f64>> {
        let MeshValues::Scalar(values) = &self.values else {
            return None;
        };
        let n = values.len();
        let mut table = Array2::zeros((n, 4));
        let columns = [&self.x, &self.y, &self.z, values];
        for (c, column) in columns.iter().enumerate() {
            table
                .column_mut(c)
                .assign(&column.iter().copied().collect::<Array1<f64>>());
        }
        Some(table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    fn single(axis: Axis, a: f64, b: f64, m: f64) -> DiskModel {
        let mut model = DiskModel::new();
        model.add_disk(axis, a, b, m).unwrap();
        model
    }

    #[test]
    fn rejects_negative_height_and_accepts_zero() {
        let mut model = DiskModel::new();
        let err = model.add_disk(Axis::Z, 1.0, -1.0, 1.0).unwrap_err();
        assert!(matches!(err, MnnError::ConstraintViolation(_)));
        assert!(model.is_empty());
        model.add_disk(Axis::Z, 1.0, 0.0, 1.0).unwrap();
        assert_eq!(model.len(), 1);
    }

    #[test]
    fn negative_scale_height_sum_is_policy_dependent() {
        let mut lenient = DiskModel::new();
        lenient.add_disk(Axis::Z, -1.0, 0.5, 1.0).unwrap();
        assert_eq!(lenient.len(), 1);

        let config = ModelConfig::default().with_scale_height_policy(ScaleHeightPolicy::Reject);
        let mut strict = DiskModel::with_config(config);
        let err = strict.add_disk(Axis::Z, -1.0, 0.5, 1.0).unwrap_err();
        assert!(matches!(err, MnnError::ConstraintViolation(_)));
        assert!(strict.is_empty());
    }

    #[test]
    fn add_disks_is_all_or_nothing() {
        let mut model = DiskModel::new();
        let err = model
            .add_disks(&[(Axis::Z, 1.0, 0.1, 50.0), (Axis::X, 1.0, -0.5, 10.0)])
            .unwrap_err();
        assert!(matches!(err, MnnError::ConstraintViolation(_)));
        assert!(model.is_empty());
    }

    #[test]
    fn get_disks_round_trips_insertion_order() {
        let disks = [
            (Axis::Z, 1.0, 0.1, 50.0),
            (Axis::X, 1.0, 0.5, 10.0),
            (Axis::Y, 2.0, 0.0, -3.0),
        ];
        let mut model = DiskModel::new();
        model.add_disks(&disks).unwrap();
        assert_eq!(model.get_disks(), disks.to_vec());

        // The snapshot is a copy.
        let mut snapshot = model.get_disks();
        snapshot.clear();
        assert_eq!(model.len(), 3);
    }

    #[test]
    fn potential_matches_closed_form_at_origin() {
        let model = single(Axis::Z, 1.0, 0.1, 50.0);
        assert_abs_diff_eq!(
            model.evaluate_potential(0.0, 0.0, 0.0),
            -DEFAULT_G * 50.0 / 1.1,
            epsilon = 1e-14
        );
        let rho = model.evaluate_density(0.0, 0.0, 0.0);
        assert!(rho.is_finite() && rho > 0.0);
    }

    #[test]
    fn sums_each_disk_in_its_own_frame() {
        let a = (Axis::Z, 1.0, 0.1, 50.0);
        let b = (Axis::X, 0.7, 0.4, 12.0);
        let mut both = DiskModel::new();
        both.add_disks(&[a, b]).unwrap();
        let only_a = single(a.0, a.1, a.2, a.3);
        let only_b = single(b.0, b.1, b.2, b.3);

        for p in [[0.3, -0.2, 0.9], [1.5, 0.0, 0.0], [-0.4, 2.0, -1.1]] {
            let (x, y, z) = (p[0], p[1], p[2]);
            assert_abs_diff_eq!(
                both.evaluate_density(x, y, z),
                only_a.evaluate_density(x, y, z) + only_b.evaluate_density(x, y, z),
                epsilon = 1e-12
            );
            assert_abs_diff_eq!(
                both.evaluate_potential(x, y, z),
                only_a.evaluate_potential(x, y, z) + only_b.evaluate_potential(x, y, z),
                epsilon = 1e-14
            );
            let f = both.evaluate_force(x, y, z);
            let fa = only_a.evaluate_force(x, y, z);
            let fb = only_b.evaluate_force(x, y, z);
            for d in 0..3 {
                assert_abs_diff_eq!(f[d], fa[d] + fb[d], epsilon = 1e-14);
            }
        }
    }

    #[test]
    fn potential_symmetries_of_z_disk() {
        let model = single(Axis::Z, 1.0, 0.3, 20.0);
        let (x, y, z) = (0.7, -1.3, 0.45);
        let phi = model.evaluate_potential(x, y, z);
        assert_abs_diff_eq!(phi, model.evaluate_potential(y, x, z), epsilon = 1e-15);
        assert_abs_diff_eq!(phi, model.evaluate_potential(x, y, -z), epsilon = 1e-15);
    }

    #[test]
    fn normalization_scales_every_quantity() {
        let plain = single(Axis::Y, 1.0, 0.2, 5.0);
        let mut scaled = DiskModel::with_config(ModelConfig::default().with_normalization(2.5));
        scaled.add_disk(Axis::Y, 1.0, 0.2, 5.0).unwrap();
        let (x, y, z) = (0.2, 0.4, 0.6);
        assert_abs_diff_eq!(
            scaled.evaluate_potential(x, y, z),
            2.5 * plain.evaluate_potential(x, y, z),
            epsilon = 1e-14
        );
        assert_abs_diff_eq!(
            scaled.evaluate_density(x, y, z),
            2.5 * plain.evaluate_density(x, y, z),
            epsilon = 1e-12
        );
        assert_abs_diff_eq!(
            scaled.evaluate_circular_velocity(x, y, z),
            2.5 * plain.evaluate_circular_velocity(x, y, z),
            epsilon = 1e-14
        );
        let f = scaled.evaluate_force(x, y, z);
        let f_plain = plain.evaluate_force(x, y, z);
        assert!(f_plain.iter().all(|v| v.abs() > 1e-4));
        for d in 0..3 {
            assert_abs_diff_eq!(f[d], 2.5 * f_plain[d], epsilon = 1e-14);
        }
    }

    #[test]
    fn batch_evaluation_broadcasts_scalars() {
        let model = single(Axis::Z, 1.0, 0.1, 50.0);
        let xs = array![0.0, 0.5, 1.0];
        let phi = model.evaluate_potential_at(&xs, 0.2, 0.3).unwrap();
        assert_eq!(phi.len(), 3);
        for (i, &x) in xs.iter().enumerate() {
            assert_abs_diff_eq!(phi[i], model.evaluate_potential(x, 0.2, 0.3), epsilon = 1e-15);
        }

        let one = model.evaluate_density_at(0.1, 0.2, 0.3).unwrap();
        assert_eq!(one.len(), 1);
        assert_abs_diff_eq!(one[0], model.evaluate_density(0.1, 0.2, 0.3), epsilon = 1e-15);

        let forces = model.evaluate_force_at(&xs, &xs, 0.1).unwrap();
        assert_eq!(forces.dim(), (3, 3));
        let f1 = model.evaluate_force(0.5, 0.5, 0.1);
        assert_abs_diff_eq!(forces.row(1), ArrayView1::from(&f1), epsilon = 1e-15);
    }

    #[test]
    fn circular_velocity_batch_matches_the_closed_form() {
        let model = single(Axis::Z, 1.0, 0.1, 50.0);
        let radii = [1.0, 2.0];
        let vc = model.evaluate_circular_velocity_at(&radii[..], 0.0, 0.0).unwrap();
        assert_eq!(vc.len(), 2);
        for (i, &r) in radii.iter().enumerate() {
            let expected = r * (DEFAULT_G * 50.0 / (r * r + 1.1_f64.powi(2)).powf(1.5)).sqrt();
            assert_abs_diff_eq!(vc[i], expected, epsilon = 1e-14);
            let single_point = model.evaluate_circular_velocity(r, 0.0, 0.0);
            assert_abs_diff_eq!(vc[i], single_point, epsilon = 1e-15);
        }
        // Off the plane the speed is lower.
        let lifted = model.evaluate_circular_velocity_at(&radii[..], 0.0, 0.5).unwrap();
        assert!(lifted[0] < vc[0] && lifted[1] < vc[1]);
    }

    #[test]
    fn batch_evaluation_rejects_mismatched_lengths() {
        let model = single(Axis::Z, 1.0, 0.1, 50.0);
        let xs = vec![0.0, 0.5, 1.0];
        let ys = vec![0.0, 0.5];
        let err = model.evaluate_potential_at(&xs, &ys, 0.0).unwrap_err();
        assert!(matches!(err, MnnError::Usage(_)));
    }

    #[test]
    fn point_evaluation_matches_coordinate_evaluation() {
        let mut model = DiskModel::new();
        model
            .add_disks(&[(Axis::Z, 1.0, 0.1, 50.0), (Axis::Y, 0.5, 0.2, 5.0)])
            .unwrap();
        let points = array![[0.1, 0.2, 0.3], [1.0, -1.0, 0.5]];
        let rho = model.evaluate_density_points(points.view()).unwrap();
        let phi = model.evaluate_potential_points(points.view()).unwrap();
        let force = model.evaluate_force_points(points.view()).unwrap();
        for (i, p) in points.outer_iter().enumerate() {
            let (x, y, z) = (p[0], p[1], p[2]);
            assert_abs_diff_eq!(rho[i], model.evaluate_density(x, y, z), epsilon = 1e-15);
            assert_abs_diff_eq!(phi[i], model.evaluate_potential(x, y, z), epsilon = 1e-15);
            let f = model.evaluate_force(p[0], p[1], p[2]);
            assert_abs_diff_eq!(force.row(i), ArrayView1::from(&f), epsilon = 1e-15);
        }
        assert!(model.evaluate_density_points(array![[1.0, 2.0]].view()).is_err());
    }

    #[test]
    fn ordinary_disk_is_positive_definite() {
        let model = single(Axis::Z, 1.0, 0.1, 50.0);
        assert!(model.is_positive_definite(None));
        assert!(model.is_positive_definite(Some(20.0)));
    }

    #[test]
    fn negative_scale_disk_is_not_positive_definite() {
        // a < 0 makes the in-plane density numerator a·r² + (a+3h)(a+h)²
        // negative for r larger than ~0.11.
        let model = single(Axis::Z, -0.05, 0.1, 1.0);
        assert!(!model.is_positive_definite(Some(10.0)));
    }

    #[test]
    fn negative_range_searches_its_magnitude() {
        let mnn = single(Axis::Z, -0.05, 0.1, 1.0);
        assert!(!mnn.is_positive_definite(Some(-10.0)));
        // The density only dips below zero beyond r ~ 0.11.
        assert!(mnn.is_positive_definite(Some(-0.05)));
        assert!(single(Axis::Z, 1.0, 0.1, 50.0).is_positive_definite(Some(-20.0)));
    }

    #[test]
    fn negative_mass_disk_is_not_positive_definite() {
        let model = single(Axis::Z, 1.0, 0.1, -1.0);
        assert!(!model.is_positive_definite(None));
    }

    #[test]
    fn positive_definiteness_skips_axes_without_perpendicular_scale() {
        // Default range for the z axis only looks at disks not normal to z;
        // with a single z disk that axis is skipped.
        let model = single(Axis::Z, -0.05, 0.1, 1.0);
        let before = model.clone();
        let _ = model.is_positive_definite(None);
        assert_eq!(model, before);
        assert!(DiskModel::new().is_positive_definite(None));
    }

    #[test]
    fn meshgrid_covers_the_box() {
        let model = single(Axis::Z, 1.0, 0.1, 50.0);
        let grid = model
            .generate_dataset_meshgrid(
                &[-1.0, -1.0, -0.5],
                &[1.0, 1.0, 0.5],
                &[3, 5, 2],
                "potential",
            )
            .unwrap();
        assert_eq!(grid.x.dim(), (3, 5, 2));
        assert_abs_diff_eq!(grid.x[(2, 0, 0)], 1.0);
        assert_abs_diff_eq!(grid.y[(0, 4, 0)], 1.0);
        assert_abs_diff_eq!(grid.z[(0, 0, 1)], 0.5);
        let MeshValues::Scalar(values) = &grid.values else {
            panic!("potential grids are scalar");
        };
        assert_abs_diff_eq!(
            values[(1, 2, 0)],
            model.evaluate_potential(0.0, 0.0, -0.5),
            epsilon = 1e-15
        );
        let table = grid.to_table().unwrap();
        assert_eq!(table.dim(), (30, 4));

        let force = model
            .generate_dataset_meshgrid(&[0.0; 3], &[1.0; 3], &[2, 2, 2], "force")
            .unwrap();
        match force.values {
            MeshValues::Vector(ref v) => assert_eq!(v.dim(), (2, 2, 2, 3)),
            MeshValues::Scalar(_) => panic!("force grids are vector valued"),
        }
        assert!(force.to_table().is_none());
    }

    #[test]
    fn meshgrid_rejects_bad_arguments() {
        let model = single(Axis::Z, 1.0, 0.1, 50.0);
        let err = model
            .generate_dataset_meshgrid(&[0.0; 3], &[1.0; 3], &[2, 2, 2], "pressure")
            .unwrap_err();
        assert!(matches!(err, MnnError::Usage(_)));
        let err = model
            .generate_dataset_meshgrid(&[0.0; 2], &[1.0; 3], &[2, 2, 2], "density")
            .unwrap_err();
        assert!(matches!(err, MnnError::Usage(_)));
    }

    #[test]
    fn rebuilds_from_parameters() {
        let layout = AxisLayout::from_counts(1, 0, 1);
        let params = [0.5, 0.2, 3.0, 1.0, 0.1, 50.0];
        let model = DiskModel::from_parameters(&layout, &params, ModelConfig::default()).unwrap();
        assert_eq!(
            model.get_disks(),
            vec![(Axis::X, 0.5, 0.2, 3.0), (Axis::Z, 1.0, 0.1, 50.0)]
        );
        assert_eq!(model.parameters(), params.to_vec());
        assert_eq!(model.layout(), layout);
    }
}
