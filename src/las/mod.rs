//! The LAS container: dimensions, point formats, header and VLRs.
pub mod dims;
pub mod extra_bytes;
pub mod formats;
pub mod header;
pub mod vlr;

mod utils;

pub use extra_bytes::{ExtraBytesStruct, ExtraBytesType, ExtraDimension};
pub use formats::PointFormat;
pub use header::{GlobalEncoding, Header, Version, WaveformLocation};
pub use vlr::{Vlr, VlrKind, VlrPayload};
