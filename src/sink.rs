//! CSV output sink.
//!
//! Writes the header once per run, then appends one record per
//! document, flushing after each row so a partially-complete batch is
//! still reviewable.

use std::fs::File;
use std::path::Path;

use csv::Writer;

/// Append-per-row CSV sink with a fixed column schema.
pub struct CsvSink {
    writer: Writer<File>,
    columns: usize,
}

impl CsvSink {
    /// Create the output file and write the header.
    pub fn create(path: &Path, columns: &[String]) -> anyhow::Result<Self> {
        let mut writer = Writer::from_path(path)
            .map_err(|e| anyhow::anyhow!("cannot create {}: {}", path.display(), e))?;
        writer.write_record(columns)?;
        writer.flush()?;
        Ok(Self {
            writer,
            columns: columns.len(),
        })
    }

    /// Append one row. The row length must match the header.
    pub fn append(&mut self, row: &[String]) -> anyhow::Result<()> {
        if row.len() != self.columns {
            anyhow::bail!(
                "row has {} values but the schema has {} columns",
                row.len(),
                self.columns
            );
        }
        self.writer.write_record(row)?;
        self.writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn columns() -> Vec<String> {
        vec!["File Name".to_string(), "Start Date".to_string()]
    }

    #[test]
    fn test_header_then_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");

        let mut sink = CsvSink::create(&path, &columns()).unwrap();
        sink.append(&["a.pdf".to_string(), "2020-01-01".to_string()])
            .unwrap();
        sink.append(&["b.pdf".to_string(), String::new()]).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "File Name,Start Date");
        assert_eq!(lines[1], "a.pdf,2020-01-01");
    }

    #[test]
    fn test_row_length_mismatch_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");

        let mut sink = CsvSink::create(&path, &columns()).unwrap();
        assert!(sink.append(&["only-one".to_string()]).is_err());
    }
}
