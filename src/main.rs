//! Fits a disk model to an observation file, or to a synthetic grid drawn
//! from a demo disk when no file is given.
//!
//! Usage: `mnn-fit [DATA_FILE] [NX NY NZ]`. Set `MNN_LOG` to control the log
//! level (default `info`).

use std::error::Error;

use mnn_fit::disk::Axis;
use mnn_fit::fitter::{FitConfig, MnnFitter};
use mnn_fit::model::DiskModel;
use mnn_fit::stats::DEFAULT_QUANTILES;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    let filter = EnvFilter::try_from_env("MNN_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn parse_counts(args: &[String]) -> Result<(usize, usize, usize), Box<dyn Error>> {
    match args {
        [] => Ok((0, 0, 1)),
        [nx, ny, nz] => Ok((nx.parse()?, ny.parse()?, nz.parse()?)),
        _ => Err("expected three disk counts: NX NY NZ".into()),
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    init_tracing();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let (file, counts) = match args.split_first() {
        Some((first, rest)) if first.parse::<usize>().is_err() => (Some(first.clone()), rest),
        _ => (None, args.as_slice()),
    };
    let (nx, ny, nz) = parse_counts(counts)?;

    let mut fitter = MnnFitter::new(FitConfig::default());
    fitter.set_model_type(nx, ny, nz);

    match file {
        Some(path) => fitter.load_file(&path)?,
        None => {
            let mut demo = DiskModel::new();
            demo.add_disk(Axis::Z, 1.0, 0.1, 50.0)?;
            info!(disks = ?demo.get_disks(), "no data file given, fitting a synthetic grid");
            let grid = demo.generate_dataset_meshgrid(
                &[-5.0, -5.0, -1.0],
                &[5.0, 5.0, 1.0],
                &[11, 11, 5],
                "potential",
            )?;
            let table = grid.to_table().ok_or("potential grids are scalar")?;
            fitter.load_data(table.view())?;
        }
    }

    fitter.maximum_likelihood()?;
    fitter.fit_data(None)?;
    if let Ok(tau) = fitter.autocorr_time() {
        info!(?tau, "integrated autocorrelation time");
    }

    let summary = fitter.compute_quantiles(&DEFAULT_QUANTILES)?;
    println!("{summary}");
    Ok(())
}
