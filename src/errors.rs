//! Definitions of error related things.

use crate::las::header::Version;

/// Errors of this crate
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum LasError {
    /// The first 4 bytes of the source are not `LASF`
    #[error("Invalid file signature {0:?}, expected \"LASF\"")]
    BadSignature([u8; 4]),
    /// The version read from a header is not one we know how to parse
    #[error("File version {major}.{minor} is not supported")]
    UnsupportedVersion { major: u8, minor: u8 },
    /// A version given as text is not one of the known versions
    #[error("File version '{0}' is not supported")]
    FileVersionNotSupported(String),
    /// The point format id is unknown, or not allowed by the file version
    #[error("Point format {id} is not supported{}", by_version(.version))]
    PointFormatNotSupported { id: u8, version: Option<Version> },
    /// Points given to a writer do not have the format the writer locked in
    #[error("Points with format {got} cannot be written into a file of point format {expected}")]
    IncompatibleFormat { expected: String, got: String },
    /// A value does not fit in the bits available for a dimension
    #[error("Value {value} is too large for dimension '{dimension}', max allowed is {max}")]
    Overflow {
        dimension: String,
        value: String,
        max: String,
    },
    /// The data type code of an extra-bytes descriptor is unknown
    #[error("Unknown extra bytes data type: {0}")]
    UnknownExtraType(u8),
    /// Both the 'internal' and 'external' waveform bits are set
    #[error("Waveform data is flagged as both internal and external")]
    InconsistentWaveformFlags,
    /// The requested codec backend cannot be used in this environment
    #[error("Codec backend '{0}' is not available")]
    CodecUnavailable(String),
    /// The codec backend failed while (de)compressing
    #[error("Codec backend '{backend}' failed: {reason}")]
    CodecFailure { backend: String, reason: String },
    /// Error reported by the laz crate
    #[error("LasZip error: {0}")]
    Laz(#[from] laz::LasZipError),
    /// The dimension is not part of the point format
    #[error("Dimension '{0}' does not exist in the point format")]
    UnknownDimension(String),
    #[error("Expected at least {expected} values, got {got}")]
    LengthMismatch { expected: usize, got: usize },
    /// The payload of a VLR does not match what its kind requires
    #[error("Malformed VLR: {0}")]
    MalformedVlr(String),
    #[error("{count} points cannot be stored in a file of version {version}")]
    TooManyPoints { count: u64, version: Version },
    /// The stream is not at the position the file layout requires
    #[error("Stream is at position {actual}, expected {expected}")]
    StreamPosition { expected: u64, actual: u64 },
    /// The operation is not possible given the file version / state
    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),
    /// API misuse, eg writing after close
    #[error("Usage error: {0}")]
    Usage(&'static str),
    /// Wrapper around and io error from the std lib
    #[error("IoError: {0}")]
    Io(#[from] std::io::Error),
}

impl LasError {
    /// Returns true if the error comes from a codec backend, meaning
    /// another backend may succeed where this one failed.
    pub fn is_recoverable_codec_error(&self) -> bool {
        matches!(
            self,
            LasError::CodecUnavailable(_) | LasError::CodecFailure { .. } | LasError::Laz(_)
        )
    }
}

fn by_version(version: &Option<Version>) -> String {
    match version {
        Some(v) => format!(" by file version {}", v),
        None => String::new(),
    }
}

pub type Result<T> = std::result::Result<T, LasError>;
