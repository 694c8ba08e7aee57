//! Reading, writing and appending LAS & LAZ files.
//!
//! - [`LasReader`] streams points out of a file, possibly in chunks
//! - [`LasWriter`] streams points into a new file
//! - [`LasAppender`] adds points at the end of an existing file
//! - [`LasData`] is a whole file in memory, see [`read_las`] and [`convert`]
use std::io::{Read, Seek, SeekFrom, Write};

use laz::LazVlr;

use crate::errors::{LasError, Result};
use crate::las::vlr::{self, VlrPayload};
use crate::las::{Header, PointFormat, Vlr, VlrKind};

mod appender;
mod data;
mod reader;
mod writer;

pub use appender::LasAppender;
pub use data::{convert, read_las, read_las_with, LasData};
pub use reader::{LasReader, PointChunks, ReaderOptions, ReaderState};
pub use writer::{LasWriter, WriterOptions, WriterState};

/// Resolves the point format of a file from its header and VLRs.
///
/// The extra-bytes VLR names the extra dimensions. Without it, or when it
/// disagrees with the record length, the bytes trailing the standard
/// fields are undocumented.
pub(crate) fn point_format_of(header: &Header, vlrs: &[Vlr]) -> Result<PointFormat> {
    let id = header.point_format_id;
    if let Some(Vlr {
        payload: VlrPayload::ExtraBytes(structs),
        ..
    }) = vlr::find(vlrs, VlrKind::ExtraBytes)
    {
        let extra_dimensions = structs.iter().map(|s| s.to_extra_dimension()).collect();
        let format = PointFormat::with_extra_dimensions(id, extra_dimensions)?;
        if format.size() == usize::from(header.point_record_length) {
            return Ok(format);
        }
        log::warn!(
            "The extra bytes VLR describes records of {} bytes but the header says {}, ignoring it",
            format.size(),
            header.point_record_length
        );
    }
    PointFormat::from_record_length(id, header.point_record_length)
}

/// Parses the laszip VLR of a compressed file
pub(crate) fn laz_vlr_of(laszip_vlr: Option<&Vlr>) -> Result<LazVlr> {
    match laszip_vlr {
        Some(vlr) => Ok(LazVlr::from_buffer(&vlr.record_data()?)?),
        None => Err(LasError::MalformedVlr(
            "the points are compressed but the file has no laszip VLR".to_string(),
        )),
    }
}

/// Moves `src` to `expected`, warning about the bytes that are skipped
/// (or read again) to get there.
pub(crate) fn seek_to_region<R: Read + Seek>(src: &mut R, expected: u64, region: &str) -> Result<()> {
    let position = src.seek(SeekFrom::Current(0))?;
    if position != expected {
        if position < expected {
            log::warn!(
                "{} bytes of padding found before the {}",
                expected - position,
                region
            );
        } else {
            log::warn!(
                "The {} starts {} bytes before the end of the previous region",
                region,
                position - expected
            );
        }
        src.seek(SeekFrom::Start(expected))?;
    }
    Ok(())
}

/// Where the point data of a file ends: at the first EVLR or at the internal
/// waveform packets, whichever comes first, else at the end of the stream.
pub(crate) fn end_of_point_data<R: Seek>(src: &mut R, header: &Header) -> Result<u64> {
    let start = u64::from(header.offset_to_point_data);
    let evlrs = if header.version.supports_evlrs() && header.number_of_evlrs > 0 {
        Some(header.start_of_first_evlr)
    } else {
        None
    };
    let waveform = if header.global_encoding.waveform_internal() {
        Some(header.start_of_waveform_data_packet_record)
    } else {
        None
    };
    let after_points = evlrs
        .into_iter()
        .chain(waveform)
        .filter(|&position| position > start)
        .min();
    match after_points {
        Some(end) => Ok(end),
        None => {
            let position = src.seek(SeekFrom::Current(0))?;
            let end = src.seek(SeekFrom::End(0))?;
            src.seek(SeekFrom::Start(position))?;
            Ok(end)
        }
    }
}

/// Reads the EVLRs declared by the header, when the version has them
pub(crate) fn read_evlrs_of<R: Read + Seek>(src: &mut R, header: &Header) -> Result<Vec<Vlr>> {
    if !header.version.supports_evlrs() || header.number_of_evlrs == 0 {
        return Ok(vec![]);
    }
    src.seek(SeekFrom::Start(header.start_of_first_evlr))?;
    vlr::read_evlrs(src, header.number_of_evlrs)
}

/// Writes the EVLRs where `dst` is, and points `header` at them.
///
/// When the waveform packets are internal, the header also points at the
/// EVLR storing them.
pub(crate) fn write_evlrs_of<W: Write + Seek>(
    dst: &mut W,
    header: &mut Header,
    evlrs: &[Vlr],
) -> Result<()> {
    let start = dst.seek(SeekFrom::Current(0))?;
    header.start_of_first_evlr = start;
    header.number_of_evlrs = evlrs.len() as u32;
    if header.global_encoding.waveform_internal() {
        let mut position = start;
        for evlr in evlrs {
            if evlr.is_waveform_data_packets() {
                header.start_of_waveform_data_packet_record = position;
                break;
            }
            position += vlr::extended_size(evlr)?;
        }
    }
    vlr::write_evlrs(dst, evlrs)
}
