/*!
# Reading observation tables

Observation files are plain text: one point per row, four whitespace
separated numbers `x y z value`. Blank lines and lines starting with `#` are
ignored.

The `csv` submodule (feature `csv`) exports sampler chains.
*/

#[cfg(feature = "csv")]
pub mod csv;

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use ndarray::Array2;

use crate::error::{MnnError, MnnResult};

const COLUMNS: usize = 4;

/**
Parses an observation table from any buffered reader.

# Errors

[`MnnError::Parse`] with the 1-based line number when a row does not hold
exactly four numbers, [`MnnError::Io`] when reading fails.

# Examples

```rust
use mnn_fit::io::read_observation_table;

let text = "# x y z potential\n0 0 0 -0.19\n1 0 0.5 -0.12\n";
let table = read_observation_table(text.as_bytes()).unwrap();
assert_eq!(table.dim(), (2, 4));
assert_eq!(table[[1, 2]], 0.5);
```
*/
pub fn read_observation_table<R: BufRead>(reader: R) -> MnnResult<Array2<f64>> {
    let mut values = Vec::new();
    let mut rows = 0;
    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        let fields: Vec<&str> = trimmed.split_whitespace().collect();
        if fields.len() != COLUMNS {
            return Err(MnnError::Parse {
                line: idx + 1,
                message: format!("expected {COLUMNS} columns, found {}", fields.len()),
            });
        }
        for field in fields {
            let value = field.parse::<f64>().map_err(|e| MnnError::Parse {
                line: idx + 1,
                message: format!("'{field}' is not a number ({e})"),
            })?;
            values.push(value);
        }
        rows += 1;
    }
    Array2::from_shape_vec((rows, COLUMNS), values).map_err(|e| MnnError::usage(e.to_string()))
}

/// Reads an observation table from a file.
pub fn load_observation_table<P: AsRef<Path>>(path: P) -> MnnResult<Array2<f64>> {
    let file = File::open(path)?;
    read_observation_table(BufReader::new(file))
}
