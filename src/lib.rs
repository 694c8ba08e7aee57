//! Reader and writer of LAS point clouds, and of their LAZ compressed variant.
//!
//! Points are kept in [`PointRecords`], a buffer of fixed size records
//! whose fields are accessed by name. The layout of the records is
//! described by a [`PointFormat`].
//!
//! - [`LasReader`] reads a file, all at once or in chunks
//! - [`LasWriter`] writes a new file, compressed or not
//! - [`LasAppender`] adds points to an existing file
//! - [`read_las`] and [`convert`] work on a whole file in memory ([`LasData`])
//!
//! # Reading
//!
//! ```
//! use lasio::{Header, LasReader, LasWriter, PointFormat, PointRecords, Version};
//!
//! # fn main() -> lasio::Result<()> {
//! # let mut file = std::io::Cursor::new(Vec::<u8>::new());
//! # {
//! #     let mut writer = LasWriter::new(&mut file, Header::new(Version::V1_2, 3)?)?;
//! #     writer.write(&PointRecords::zeros(PointFormat::new(3)?, 2_500))?;
//! #     writer.close()?;
//! # }
//! let mut reader = LasReader::new(file)?;
//! println!("{} points of format {}", reader.header().point_count, reader.point_format());
//!
//! let mut total = 0;
//! for points in reader.chunks(1_000) {
//!     let points = points?;
//!     let intensities = points.values::<u16>("intensity")?;
//!     total += intensities.len();
//! }
//! assert_eq!(total, 2_500);
//! # Ok(())
//! # }
//! ```
//!
//! # Writing
//!
//! The header given to the writer is a template, its bounds and point counts
//! are computed from the points written.
//!
//! ```
//! use lasio::{Header, LasWriter, PointFormat, PointRecords, Version, WriterOptions};
//!
//! # fn main() -> lasio::Result<()> {
//! let header = Header::new(Version::V1_4, 6)?;
//! let mut points = PointRecords::zeros(PointFormat::new(6)?, 3);
//! points.set_x(&header, &[1.0, 2.0, 3.0])?;
//! points.set_values("classification", &[2u8, 2, 6])?;
//!
//! let output = std::io::Cursor::new(Vec::<u8>::new());
//! let options = WriterOptions::default().with_compression(true);
//! let mut writer = LasWriter::with_options(output, header, vec![], options)?;
//! writer.write(&points)?;
//! writer.close()?; // don't forget to close, the header is rewritten at that moment
//! assert_eq!(writer.header().point_count, 3);
//! # Ok(())
//! # }
//! ```
//!
//! # Compression backends
//!
//! LAZ data is (de)compressed by a [`LazBackend`]: the `laz` crate, its
//! multi-threaded variant (with the 'parallel' feature), or an external
//! `laszip` program (decompression only).
//! Readers try the backends in order until one succeeds.
//!
//! # Parallelism
//!
//! This crates has an optional feature 'parallel'.
//! When using this feature, the [`LazBackend::LaszipParallel`] backend is
//! available and header bounds are computed using multiple threads.

pub mod checking;
pub mod errors;
pub mod file;
pub mod las;
pub mod laszip;
pub mod packers;
pub mod record;

pub use errors::{LasError, Result};
pub use file::{
    convert, read_las, read_las_with, LasAppender, LasData, LasReader, LasWriter, ReaderOptions,
    WriterOptions,
};
pub use las::{
    ExtraBytesStruct, ExtraBytesType, ExtraDimension, Header, PointFormat, Version, Vlr, VlrKind,
};
pub use laszip::{LazBackend, ProcessCodec};
pub use record::PointRecords;
