/*!
# Single Miyamoto-Nagai(-negative) disks

A disk is the potential-density pair of Miyamoto & Nagai (1975) with scale `a`,
height `b` and amplitude `M`, lying in the plane normal to one of the three
Cartesian axes. Negative `a` (the "MNn" disks) is allowed as long as the model
built from them stays positive definite.

Every quantity is evaluated in the disk's own frame: two tangential
coordinates `(t1, t2)` spanning the disk plane and one normal coordinate `n`.

| axis | t1 | t2 | n |
|------|----|----|---|
| x    | y  | z  | x |
| y    | x  | z  | y |
| z    | x  | y  | z |

The table lives in [`Axis::frame`] and is shared by density, potential, force
and circular-velocity evaluation.

```rust
use mnn_fit::disk::{Axis, Disk, DEFAULT_G};

let disk = Disk::new(Axis::Z, 1.0, 0.1, 50.0);
let phi = disk.potential([0.0, 0.0, 0.0], DEFAULT_G);
assert!((phi + DEFAULT_G * 50.0 / 1.1).abs() < 1e-12);
```
*/

use std::f64::consts::PI;
use std::fmt;
use std::str::FromStr;

use crate::error::MnnError;

/// Gravitational constant in kpc·(km/s)²/M☉.
pub const DEFAULT_G: f64 = 0.0043008211;

/// Normal axis of a disk plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Axis {
    X,
    Y,
    Z,
}

impl Axis {
    pub const ALL: [Axis; 3] = [Axis::X, Axis::Y, Axis::Z];

    /// Cartesian slot of this axis (`x = 0`, `y = 1`, `z = 2`).
    pub fn index(self) -> usize {
        match self {
            Axis::X => 0,
            Axis::Y => 1,
            Axis::Z => 2,
        }
    }

    /// Cartesian slots of the tangential pair `(t1, t2)` and of the normal `n`.
    pub fn frame(self) -> ([usize; 2], usize) {
        match self {
            Axis::X => ([1, 2], 0),
            Axis::Y => ([0, 2], 1),
            Axis::Z => ([0, 1], 2),
        }
    }

    /// Projects a Cartesian point onto `(t1, t2, n)`.
    pub fn local(self, point: [f64; 3]) -> (f64, f64, f64) {
        let ([i, j], k) = self.frame();
        (point[i], point[j], point[k])
    }

    /// Name of the disk plane, as used in parameter labels.
    pub fn plane(self) -> &'static str {
        match self {
            Axis::X => "yz",
            Axis::Y => "xz",
            Axis::Z => "xy",
        }
    }

    /// Point at distance `r` along this axis, the two other coordinates at zero.
    pub fn point_at(self, r: f64) -> [f64; 3] {
        let mut p = [0.0; 3];
        p[self.index()] = r;
        p
    }
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Axis::X => "x",
            Axis::Y => "y",
            Axis::Z => "z",
        };
        f.write_str(name)
    }
}

impl FromStr for Axis {
    type Err = MnnError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "x" => Ok(Axis::X),
            "y" => Ok(Axis::Y),
            "z" => Ok(Axis::Z),
            other => Err(MnnError::usage(format!(
                "unknown axis '{other}', expected one of x, y, z"
            ))),
        }
    }
}

/// One Miyamoto-Nagai(-negative) disk.
///
/// Constructing a `Disk` directly performs no validation; the constraints
/// `b >= 0` and `a + b >= 0` are enforced when a disk is added to a
/// [`crate::model::DiskModel`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Disk {
    pub axis: Axis,
    /// Scale length.
    pub a: f64,
    /// Scale height.
    pub b: f64,
    /// Amplitude (mass).
    pub mass: f64,
}

impl Disk {
    pub fn new(axis: Axis, a: f64, b: f64, mass: f64) -> Self {
        Self { axis, a, b, mass }
    }

    /// In-plane radius and height of `point` in this disk's frame.
    pub fn cylindrical(&self, point: [f64; 3]) -> (f64, f64) {
        let (t1, t2, n) = self.axis.local(point);
        ((t1 * t1 + t2 * t2).sqrt(), n)
    }

    pub fn density(&self, point: [f64; 3]) -> f64 {
        let (r, z) = self.cylindrical(point);
        mn_density(r, z, self.a, self.b, self.mass)
    }

    pub fn potential(&self, point: [f64; 3], g: f64) -> f64 {
        let (r, z) = self.cylindrical(point);
        mn_potential(r, z, self.a, self.b, self.mass, g)
    }

    pub fn circular_velocity(&self, point: [f64; 3], g: f64) -> f64 {
        let (r, z) = self.cylindrical(point);
        mn_circular_velocity(r, z, self.a, self.b, self.mass, g)
    }

    /// Force exerted by the disk at `point`, in Cartesian order.
    pub fn force(&self, point: [f64; 3], g: f64) -> [f64; 3] {
        let (t1, t2, n) = self.axis.local(point);
        let f1 = (self.b * self.b + n * n).sqrt();
        let af = self.a + f1;
        let q1 = -g * self.mass / (t1 * t1 + t2 * t2 + af * af).powf(1.5);
        let q2 = af / f1;

        let ([i, j], k) = self.axis.frame();
        let mut out = [0.0; 3];
        out[i] = q1 * t1;
        out[j] = q1 * t2;
        out[k] = q1 * n * q2;
        out
    }

    /// The disk as an `(axis, a, b, M)` tuple.
    pub fn as_tuple(&self) -> (Axis, f64, f64, f64) {
        (self.axis, self.a, self.b, self.mass)
    }
}

impl From<(Axis, f64, f64, f64)> for Disk {
    fn from((axis, a, b, mass): (Axis, f64, f64, f64)) -> Self {
        Disk::new(axis, a, b, mass)
    }
}

/// Miyamoto-Nagai density at in-plane radius `r` and height `z`.
///
/// No constraint on `a`, `b` or `m` is checked here.
pub fn mn_density(r: f64, z: f64, a: f64, b: f64, m: f64) -> f64 {
    let h = (z * z + b * b).sqrt();
    let ah2 = (a + h) * (a + h);
    let r2 = r * r;
    let num = a * r2 + (a + 3.0 * h) * ah2;
    let den = h.powi(3) * (r2 + ah2).powf(2.5);
    b * b * m / (4.0 * PI) * num / den
}

/// Miyamoto-Nagai potential at in-plane radius `r` and height `z`.
pub fn mn_potential(r: f64, z: f64, a: f64, b: f64, m: f64, g: f64) -> f64 {
    let h = (z * z + b * b).sqrt();
    -g * m / (r * r + (a + h) * (a + h)).sqrt()
}

/// Circular velocity in the disk plane at radius `r` and height `z`.
///
/// Uses `|m|` so that a negative-amplitude disk still yields a real speed.
pub fn mn_circular_velocity(r: f64, z: f64, a: f64, b: f64, m: f64, g: f64) -> f64 {
    let h = (z * z + b * b).sqrt();
    let den = (r * r + (a + h) * (a + h)).powf(1.5);
    r * (g * m.abs() / den).sqrt()
}
