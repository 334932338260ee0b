use std::{
    fs::File,
    io::{BufRead, BufReader},
    path::Path,
};

use crate::error::{PlanetoidError, Result};

/// Reads one integer per line, in file order.
pub fn parse_index_file<P: AsRef<Path>>(path: P) -> Result<Vec<i64>> {
    let path = path.as_ref();
    let reader = BufReader::new(File::open(path)?);
    let mut index = Vec::new();
    for (line, buf) in reader.lines().enumerate() {
        let content = buf?;
        let value = content
            .trim()
            .parse::<i64>()
            .map_err(|_| PlanetoidError::MalformedIndex {
                path: path.to_owned(),
                line: line + 1,
                content: content.clone(),
            })?;
        index.push(value);
    }
    Ok(index)
}
