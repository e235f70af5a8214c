use std::fs::File;
use std::io::Write;
use std::path::Path;

use tracing::info;

use crate::error::Result;
use crate::record::Dataset;

/// Writes the dataset as comma-separated text, header row first, in the
/// dataset's column order.
pub fn write_csv<W: Write>(dataset: &Dataset, writer: W) -> Result<()> {
    let mut out = csv::WriterBuilder::new().from_writer(writer);
    out.write_record(dataset.columns.iter().map(|f| f.as_str()))?;
    for record in &dataset.records {
        out.write_record(dataset.columns.iter().map(|f| record.value(*f)))?;
    }
    out.flush()?;
    Ok(())
}

pub fn export_csv(dataset: &Dataset, path: &Path) -> Result<()> {
    let file = File::create(path)?;
    write_csv(dataset, file)?;
    info!(path = %path.display(), rows = dataset.len(), "dataset exported");
    Ok(())
}
