//! Input record loading
//!
//! One sample per line, no header:
//! `accel_x, accel_y, accel_z, gyro_x, gyro_y, gyro_z, pos_x, pos_y, pos_z, timestamp_us, sequence_number`

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use csv::{ReaderBuilder, StringRecord, Trim};
use flate2::read::GzDecoder;
use nalgebra::Vector3;

use crate::error::LoadError;
use crate::types::Sample;

pub const FIELDS_PER_RECORD: usize = 11;

/// Load every record of a data file (`.gz` is decompressed transparently).
pub fn load_datafile(path: &Path) -> Result<Vec<Sample>, LoadError> {
    let file = File::open(path)?;
    let reader: Box<dyn Read> = if path.extension().map(|e| e == "gz").unwrap_or(false) {
        Box::new(GzDecoder::new(file))
    } else {
        Box::new(file)
    };
    read_samples(BufReader::new(reader))
}

/// Parse records from any reader.
pub fn read_samples<R: Read>(reader: R) -> Result<Vec<Sample>, LoadError> {
    let mut rdr = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(Trim::All)
        .from_reader(reader);

    let mut samples = Vec::new();
    for rec in rdr.records() {
        let rec = rec?;
        let line = rec.position().map(|p| p.line()).unwrap_or(0);
        samples.push(parse_record(&rec, line)?);
    }

    if samples.is_empty() {
        return Err(LoadError::Empty);
    }
    Ok(samples)
}

fn parse_record(rec: &StringRecord, line: u64) -> Result<Sample, LoadError> {
    if rec.len() != FIELDS_PER_RECORD {
        return Err(LoadError::FieldCount {
            line,
            found: rec.len(),
        });
    }

    let float = |column: usize| -> Result<f64, LoadError> {
        rec[column].parse().map_err(|_| LoadError::ParseField {
            line,
            column,
            value: rec[column].to_string(),
        })
    };
    let counter = |column: usize| -> Result<u64, LoadError> {
        rec[column].parse().map_err(|_| LoadError::ParseField {
            line,
            column,
            value: rec[column].to_string(),
        })
    };

    // The first three columns are accel data, the next three gyro data
    let specific_force = Vector3::new(float(0)?, float(1)?, float(2)?);
    let angular_rate = Vector3::new(float(3)?, float(4)?, float(5)?);
    let position = Vector3::new(float(6)?, float(7)?, float(8)?);

    Ok(Sample {
        timestamp_us: counter(9)?,
        sequence_number: counter(10)?,
        angular_rate,
        specific_force,
        position,
    })
}
