use std::fs::File;
use std::path::Path;

use anyhow::Context;

use crate::error::SinkError;
use crate::oai::{Field, Record};

/// Destination for harvested rows. Each call receives one complete page.
pub trait RecordSink {
    fn append(&mut self, records: &[Record]) -> Result<(), SinkError>;
}

/// CSV file sink. Creating it truncates the file and writes the header row.
pub struct CsvSink {
    writer: csv::Writer<File>,
}

impl CsvSink {
    pub fn create(path: &Path) -> anyhow::Result<Self> {
        let mut writer = csv::Writer::from_path(path)
            .with_context(|| format!("Failed to create output file {}", path.display()))?;

        writer.write_record(Field::ALL.iter().map(Field::column))?;
        writer.flush()?;

        Ok(Self { writer })
    }
}

impl RecordSink for CsvSink {
    fn append(&mut self, records: &[Record]) -> Result<(), SinkError> {
        for record in records {
            self.writer
                .write_record(record.values().map(|value| value.unwrap_or_default()))?;
        }
        self.writer.flush()?;
        Ok(())
    }
}
