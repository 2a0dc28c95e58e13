use thiserror::Error;

/// Rejected tuning parameter
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("Invalid parameter {name}: {value} (must be finite and positive)")]
    InvalidParameter { name: &'static str, value: f64 },
}

/// Estimator lifecycle and input-order violations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EkfError {
    #[error("Filter not initialized")]
    NotInitialized,

    #[error("Filter already initialized")]
    AlreadyInitialized,

    #[error("Timestamp went backwards: {current_us} us after {previous_us} us")]
    TimeWentBackwards { previous_us: u64, current_us: u64 },
}

/// Covariance packing shape errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PackError {
    #[error("Matrix must be 2 dimensional, got {rows}x{cols}")]
    NotTwoDimensional { rows: usize, cols: usize },

    #[error("Matrix must be square, got {rows}x{cols}")]
    NotSquare { rows: usize, cols: usize },

    #[error("Packed length {len} is not n(n+1)/2 for any n >= 2")]
    NotTriangular { len: usize },
}

/// Input record loading errors
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Line {line}: expected 11 fields, found {found}")]
    FieldCount { line: u64, found: usize },

    #[error("Line {line}, column {column}: cannot parse {value:?}")]
    ParseField {
        line: u64,
        column: usize,
        value: String,
    },

    #[error("Data file contains no records")]
    Empty,
}
