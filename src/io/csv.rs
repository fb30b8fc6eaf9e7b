/*!
# Saving sampler chains to CSV

Enable via the `csv` feature.
*/

use std::fs::File;
use std::path::Path;

use ::csv::Writer;
use ndarray::{ArrayView3, Axis};

use crate::error::{MnnError, MnnResult};

/**
Saves an ensemble chain shaped **walker × step × parameter** as a CSV file.

The file has a header row `walker,step,<labels...>` followed by one row per
walker and step.

# Errors

[`MnnError::Usage`] when the number of labels differs from the number of
parameters; [`MnnError::Io`] or [`MnnError::Csv`] when writing fails.

# Examples

```rust
use mnn_fit::io::csv::save_chain_csv;
use ndarray::arr3;

let chain = arr3(&[[[1.0, 0.1, 50.0], [1.1, 0.1, 49.0]]]);
let labels = ["axy1", "bxy1", "Mxy1"].map(String::from);
let path = std::env::temp_dir().join("mnn_chain_doc.csv");
save_chain_csv(chain.view(), &labels, &path).unwrap();
```
*/
pub fn save_chain_csv<P: AsRef<Path>>(
    chain: ArrayView3<'_, f64>,
    labels: &[String],
    path: P,
) -> MnnResult<()> {
    let n_params = chain.shape()[2];
    if labels.len() != n_params {
        return Err(MnnError::usage(format!(
            "got {} labels for {n_params} parameters",
            labels.len()
        )));
    }

    let mut wtr = Writer::from_writer(File::create(path)?);
    let mut header: Vec<String> = vec!["walker".to_string(), "step".to_string()];
    header.extend(labels.iter().cloned());
    wtr.write_record(&header)?;

    for (walker_idx, walker) in chain.axis_iter(Axis(0)).enumerate() {
        for (step_idx, state) in walker.axis_iter(Axis(0)).enumerate() {
            let mut row = vec![walker_idx.to_string(), step_idx.to_string()];
            row.extend(state.iter().map(|v| v.to_string()));
            wtr.write_record(&row)?;
        }
    }

    wtr.flush()?;
    Ok(())
}
