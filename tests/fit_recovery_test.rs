//! End-to-end fits of synthetic data drawn from a known disk.
//!
//! 1. `test_maximum_likelihood_recovers_disk`: noise-free grid, optimizer
//!    started near the truth.
//! 2. `test_pipeline_from_file`: data file → maximum likelihood → sampling →
//!    quantile summary.

use mnn_fit::fitter::{FitConfig, MnnFitter};
use mnn_fit::optimize::NelderMead;
use mnn_fit::stats::DEFAULT_QUANTILES;
use mnn_fit::{Axis, DiskModel};
use ndarray::{Array1, Array2};

fn truth() -> DiskModel {
    let mut model = DiskModel::new();
    model.add_disk(Axis::Z, 1.0, 0.1, 50.0).unwrap();
    model
}

fn grid(model: &DiskModel) -> Array2<f64> {
    model
        .generate_dataset_meshgrid(&[-3.0, -3.0, -1.0], &[3.0, 3.0, 1.0], &[7, 7, 5], "potential")
        .unwrap()
        .to_table()
        .unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_maximum_likelihood_recovers_disk() {
        let model = truth();
        let table = grid(&model);

        let config = FitConfig::default().with_verbose(false).with_optimizer(
            NelderMead::default()
                .with_tolerances(1e-10, 1e-10)
                .with_max_iterations(5_000),
        );
        let mut fitter = MnnFitter::new(config);
        fitter.set_model_type(0, 0, 1);
        fitter
            .load_data_with_errors(table.view(), Array1::from_elem(table.nrows(), 1e-3))
            .unwrap();
        fitter.set_parameters(&[1.03, 0.11, 51.0]).unwrap();

        let result = fitter.maximum_likelihood().unwrap();
        assert_eq!(result.x, fitter.parameters());

        let fitted = fitter.parameters();
        assert!((fitted[0] - 1.0).abs() < 1e-2, "a = {}", fitted[0]);
        assert!((fitted[1] - 0.1).abs() < 5e-3, "b = {}", fitted[1]);
        assert!((fitted[2] - 50.0).abs() < 0.5, "M = {}", fitted[2]);
    }

    #[test]
    fn test_pipeline_from_file() {
        let table = grid(&truth());
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "# x y z potential").unwrap();
        for row in table.outer_iter() {
            writeln!(file, "{} {} {} {}", row[0], row[1], row[2], row[3]).unwrap();
        }

        let config = FitConfig::default()
            .with_verbose(false)
            .with_n_walkers(16)
            .with_n_steps(300);
        let mut fitter = MnnFitter::new(config);
        fitter.set_model_type(0, 0, 1);
        fitter.load_file(file.path()).unwrap();
        assert_eq!(fitter.observations().unwrap().len(), 245);
        fitter.set_parameters(&[1.0, 0.1, 50.0]).unwrap();

        fitter.maximum_likelihood().unwrap();
        let best = fitter.parameters().to_vec();
        let samples = fitter.fit_data(Some(0.5)).unwrap();
        assert_eq!(samples.dim(), (16 * 150, 3));

        let summary = fitter.compute_quantiles(&DEFAULT_QUANTILES).unwrap();
        let labels: Vec<&str> = summary.parameters.iter().map(|p| p.label.as_str()).collect();
        assert_eq!(labels, ["axy1", "bxy1", "Mxy1"]);
        for (p, b) in summary.parameters.iter().zip(&best) {
            assert!(
                (p.median - b).abs() < 0.05 * b.abs() + 0.01,
                "{}: median {} vs best {}",
                p.label,
                p.median,
                b
            );
        }
    }

    #[cfg(feature = "csv")]
    #[test]
    fn test_chain_export() {
        use mnn_fit::io::csv::save_chain_csv;

        let table = grid(&truth());
        let config = FitConfig::default()
            .with_verbose(false)
            .with_n_walkers(6)
            .with_n_steps(20);
        let mut fitter = MnnFitter::new(config);
        fitter.set_model_type(0, 0, 1);
        fitter.set_parameters(&[1.0, 0.1, 50.0]).unwrap();
        fitter.load_data(table.view()).unwrap();
        fitter.fit_data(None).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chain.csv");
        save_chain_csv(fitter.chain().unwrap(), &fitter.parameter_labels(), &path).unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 1 + 6 * 20);
        assert!(content.starts_with("walker,step,axy1,bxy1,Mxy1"));
    }
}
