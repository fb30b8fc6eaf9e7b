//! Fits superpositions of Miyamoto-Nagai and Miyamoto-Nagai-negative disks
//! to gravitational potential, density or force data.
//!
//! [`model::DiskModel`] evaluates the summed disks; [`fitter::MnnFitter`]
//! estimates their parameters by maximum likelihood and samples the posterior
//! with the affine-invariant [`ensemble::EnsembleSampler`].

pub mod disk;
pub mod distributions;
pub mod ensemble;
pub mod error;
pub mod fitter;
pub mod io;
pub mod likelihood;
pub mod model;
pub mod optimize;
pub mod params;
pub mod stats;

pub use disk::{Axis, Disk};
pub use error::{MnnError, MnnResult};
pub use fitter::{FitConfig, MnnFitter};
pub use model::{DiskModel, ModelConfig, Quantity, ScaleHeightPolicy};
