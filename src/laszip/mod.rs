//! Codec backends used to compress and decompress the point data of LAZ files.
//!
//! The entropy coding itself is done by the [laz] crate, this module only
//! decides *who* does it:
//!
//! - [`LazBackend::Laszip`]: the sequential compressor & decompressor of `laz`
//! - [`LazBackend::LaszipParallel`]: the multi-threaded ones (feature `parallel`)
//! - [`LazBackend::Process`]: an external `laszip` executable the point data is
//!   piped through, only able to decompress
//!
//! Every backend hands out boxed [`LazPointCompressor`] / [`LazPointDecompressor`]
//! so that readers and writers do not depend on a concrete backend.
//!
//! [laz]: https://docs.rs/laz
use std::convert::TryFrom;
use std::io::{Read, Seek, SeekFrom, Write};

use byteorder::{LittleEndian, WriteBytesExt};
use laz::{LazItemRecordBuilder, LazVlr};

use crate::errors::{LasError, Result};
use crate::las::{Header, PointFormat};

pub mod chunk_table;
mod conveyor;
#[cfg(feature = "parallel")]
mod parallel;
mod process;
mod sequential;

pub use process::ProcessCodec;

/// Number of points per chunk used when compressing, unless told otherwise
pub const DEFAULT_CHUNK_SIZE: u32 = 50_000;

/// Byte position of the chunk size in the record data of the laszip VLR
const CHUNK_SIZE_POSITION: usize = 12;

/// Decompresses point records, in file order.
pub trait LazPointDecompressor<R> {
    /// Fills `out` with as many points as it can hold.
    ///
    /// `out.len()` must be a multiple of the point size.
    fn decompress_many(&mut self, out: &mut [u8]) -> Result<()>;

    /// Moves to the point at `point_index`, the next call to
    /// `decompress_many` starts at that point.
    fn seek(&mut self, point_index: u64) -> Result<()>;

    fn get_mut(&mut self) -> &mut R;
}

/// A started decompressor, or why it could not start along with the
/// source when the backend did not keep it.
pub(crate) type Opened<'a, R> =
    std::result::Result<Box<dyn LazPointDecompressor<R> + 'a>, (LasError, Option<R>)>;

/// Runs `f` on `src`, which is put back at its position afterwards
fn borrowing<R, F>(src: &mut R, f: F) -> Result<()>
where
    R: Seek,
    F: FnOnce(&mut R) -> Result<()>,
{
    let position = src.seek(SeekFrom::Current(0))?;
    let result = f(&mut *src);
    src.seek(SeekFrom::Start(position))?;
    result
}

/// Compresses point records.
pub trait LazPointCompressor<W> {
    /// `points.len()` must be a multiple of the point size.
    fn compress_many(&mut self, points: &[u8]) -> Result<()>;

    /// Compresses the last chunk and writes the chunk table.
    fn done(&mut self) -> Result<()>;

    fn get_mut(&mut self) -> &mut W;
}

/// The implementations of LAZ compression that can be used.
#[derive(Debug, Clone, PartialEq)]
pub enum LazBackend {
    Laszip,
    #[cfg(feature = "parallel")]
    LaszipParallel,
    Process(ProcessCodec),
}

impl LazBackend {
    /// Backends in the order readers try them
    pub fn default_order() -> Vec<LazBackend> {
        let mut backends = Vec::with_capacity(3);
        #[cfg(feature = "parallel")]
        backends.push(LazBackend::LaszipParallel);
        backends.push(LazBackend::Laszip);
        backends.push(LazBackend::Process(ProcessCodec::default()));
        backends
    }

    pub fn name(&self) -> &str {
        match self {
            LazBackend::Laszip => "laz",
            #[cfg(feature = "parallel")]
            LazBackend::LaszipParallel => "laz-parallel",
            LazBackend::Process(codec) => codec.name(),
        }
    }

    /// Returns whether the backend can be used in this environment.
    pub fn is_available(&self) -> bool {
        match self {
            LazBackend::Laszip => true,
            #[cfg(feature = "parallel")]
            LazBackend::LaszipParallel => true,
            LazBackend::Process(codec) => codec.is_available(),
        }
    }

    pub fn supports_compression(&self) -> bool {
        !matches!(self, LazBackend::Process(_))
    }

    /// Creates a decompressor reading from `source`.
    ///
    /// `source` must be positioned at the start of the point data,
    /// `header` is the header of the file the data comes from.
    pub fn decompressor<'a, R>(
        &self,
        source: R,
        vlr: LazVlr,
        header: &Header,
    ) -> Result<Box<dyn LazPointDecompressor<R> + 'a>>
    where
        R: Read + Seek + Send + Sync + 'a,
    {
        self.open(source, vlr, header).map_err(|(e, _)| e)
    }

    /// Same as [`LazBackend::decompressor`], except that `source` is
    /// given back, at its initial position, when the backend fails to start.
    pub(crate) fn open<'a, R>(&self, mut source: R, vlr: LazVlr, header: &Header) -> Opened<'a, R>
    where
        R: Read + Seek + Send + Sync + 'a,
    {
        log::debug!("Decompressing points with the '{}' backend", self.name());
        if let LazBackend::Process(codec) = self {
            return match codec.start(&mut source, &vlr, header) {
                Ok(process) => Ok(Box::new(process.reading_from(source))),
                Err(e) => Err((e, Some(source))),
            };
        }
        // The laz decompressors take ownership of the source,
        // they are tried on a borrowed one first.
        let tried = borrowing(&mut source, |src| {
            self.laz_decompressor(src, vlr.clone()).map(|_| ())
        });
        if let Err(e) = tried {
            return Err((e, Some(source)));
        }
        self.laz_decompressor(source, vlr).map_err(|e| (e, None))
    }

    fn laz_decompressor<'a, R>(
        &self,
        source: R,
        vlr: LazVlr,
    ) -> Result<Box<dyn LazPointDecompressor<R> + 'a>>
    where
        R: Read + Seek + Send + Sync + 'a,
    {
        match self {
            LazBackend::Laszip => Ok(Box::new(laz::LasZipDecompressor::new(source, vlr)?)),
            #[cfg(feature = "parallel")]
            LazBackend::LaszipParallel => {
                Ok(Box::new(laz::ParLasZipDecompressor::new(source, vlr)?))
            }
            LazBackend::Process(codec) => Err(LasError::CodecUnavailable(format!(
                "{} (not a laz decompressor)",
                codec.name()
            ))),
        }
    }

    /// Creates a compressor writing to `dest`, which must be positioned
    /// where the point data starts.
    pub fn compressor<'a, W>(
        &self,
        dest: W,
        vlr: LazVlr,
    ) -> Result<Box<dyn LazPointCompressor<W> + 'a>>
    where
        W: Write + Seek + Send + Sync + 'a,
    {
        log::debug!("Compressing points with the '{}' backend", self.name());
        match self {
            LazBackend::Laszip => {
                let mut compressor = laz::LasZipCompressor::new(dest, vlr)?;
                compressor.reserve_offset_to_chunk_table()?;
                Ok(Box::new(compressor))
            }
            #[cfg(feature = "parallel")]
            LazBackend::LaszipParallel => {
                let mut compressor = laz::ParLasZipCompressor::new(dest, vlr)?;
                compressor.reserve_offset_to_chunk_table()?;
                Ok(Box::new(compressor))
            }
            LazBackend::Process(codec) => Err(LasError::CodecUnavailable(format!(
                "{} (cannot compress)",
                codec.name()
            ))),
        }
    }
}

impl Default for LazBackend {
    fn default() -> Self {
        #[cfg(feature = "parallel")]
        {
            LazBackend::LaszipParallel
        }
        #[cfg(not(feature = "parallel"))]
        {
            LazBackend::Laszip
        }
    }
}

/// Builds the laszip VLR describing how points of `format` are compressed.
pub fn laz_vlr_for(format: &PointFormat, chunk_size: u32) -> Result<LazVlr> {
    let num_extra_bytes = u16::try_from(format.num_extra_bytes())
        .map_err(|_| LasError::PointFormatNotSupported {
            id: format.id(),
            version: None,
        })?;
    let items = LazItemRecordBuilder::default_for_point_format_id(format.id(), num_extra_bytes)?;
    let vlr = LazVlr::from_laz_items(items);
    if vlr.chunk_size() == chunk_size {
        return Ok(vlr);
    }
    let mut record_data = Vec::new();
    vlr.write_to(&mut record_data)?;
    (&mut record_data[CHUNK_SIZE_POSITION..CHUNK_SIZE_POSITION + 4])
        .write_u32::<LittleEndian>(chunk_size)?;
    Ok(LazVlr::from_buffer(&record_data)?)
}
