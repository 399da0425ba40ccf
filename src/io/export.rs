//! CSV export of area tables

use crate::config::CsvHeader;
use crate::core::report::AreaTable;
use crate::types::LcResult;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Write `table` as CSV, areas rounded to two decimals
pub fn write_area_csv<W: Write>(table: &AreaTable, header: CsvHeader, writer: W) -> LcResult<()> {
    let mut out = BufWriter::new(writer);

    writeln!(out, "{}", header.columns().join(","))?;
    for row in table.rows() {
        writeln!(
            out,
            "{},{},{},{:.2}",
            row.year,
            row.class_index,
            quote(&row.class_name),
            row.area_km2
        )?;
    }
    out.flush()?;
    Ok(())
}

/// Write `table` to a CSV file at `path`
pub fn write_area_csv_file<P: AsRef<Path>>(table: &AreaTable, header: CsvHeader, path: P) -> LcResult<()> {
    log::info!("Writing {} area rows to {}", table.len(), path.as_ref().display());
    let file = File::create(path.as_ref())?;
    write_area_csv(table, header, file)
}

fn quote(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}
