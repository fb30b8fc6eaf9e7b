//! Benchmarks for the log-likelihood, the hot loop of both the optimizer and
//! the ensemble sampler.
//!
//!   cargo bench --bench likelihood
//!   cargo bench likelihood -- likelihood/with_positive_definite_check

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use mnn_fit::disk::Axis;
use mnn_fit::likelihood::{LogLikelihood, Observations};
use mnn_fit::model::{DiskModel, Quantity};
use ndarray::Array1;

/// Two-disk model sampled on a 10×10×5 grid, with unit uncertainties.
fn fixture() -> (LogLikelihood, Vec<f64>) {
    let mut model = DiskModel::new();
    model
        .add_disks(&[(Axis::Z, 1.0, 0.1, 50.0), (Axis::X, 0.5, 0.3, 5.0)])
        .expect("valid disks");
    let table = model
        .generate_dataset_meshgrid(&[-5.0, -5.0, -1.0], &[5.0, 5.0, 1.0], &[10, 10, 5], "potential")
        .expect("valid grid")
        .to_table()
        .expect("potential grids are scalar");
    let n = table.nrows();
    let observations =
        Observations::new(table.view(), Array1::from_elem(n, 0.01)).expect("valid observations");
    (
        LogLikelihood::new(observations, model.layout()),
        model.parameters(),
    )
}

fn bench_likelihood(c: &mut Criterion) {
    let (likelihood, params) = fixture();
    let mut group = c.benchmark_group("likelihood");

    group.bench_function("with_positive_definite_check", |b| {
        b.iter(|| black_box(likelihood.evaluate(black_box(&params))))
    });

    let unchecked = likelihood.clone().with_positive_definite_check(false);
    group.bench_function("without_positive_definite_check", |b| {
        b.iter(|| black_box(unchecked.evaluate(black_box(&params))))
    });

    let force = unchecked.clone().with_fit_type(Quantity::Force);
    group.bench_function("force_norm", |b| {
        b.iter(|| black_box(force.evaluate(black_box(&params))))
    });

    group.finish();
}

criterion_group!(benches, bench_likelihood);
criterion_main!(benches);
