use std::convert::TryFrom;
use std::fs::File;
use std::io::{BufWriter, Read, Seek, Write};
use std::path::Path;

use super::{point_format_of, LasReader, LasWriter, ReaderOptions, WriterOptions};
use crate::errors::{LasError, Result};
use crate::las::formats::{dimensions_lost, is_point_format_supported_by, min_version_for};
use crate::las::vlr::{self, Vlr};
use crate::las::{Header, PointFormat, Version};
use crate::laszip::LazBackend;
use crate::record::PointRecords;

/// A whole LAS file in memory
#[derive(Debug, Clone, PartialEq)]
pub struct LasData {
    pub header: Header,
    /// VLRs, the laszip one excepted
    pub vlrs: Vec<Vlr>,
    pub points: PointRecords,
    pub evlrs: Vec<Vlr>,
}

impl LasData {
    /// An empty file with the point format of `header`
    pub fn new(header: Header) -> Result<Self> {
        let format = point_format_of(&header, &[])?;
        Ok(Self {
            header,
            vlrs: vec![],
            points: PointRecords::zeros(format, 0),
            evlrs: vec![],
        })
    }

    pub fn point_format(&self) -> &PointFormat {
        self.points.format()
    }

    pub fn x(&self) -> Result<Vec<f64>> {
        self.points.x(&self.header)
    }

    pub fn y(&self) -> Result<Vec<f64>> {
        self.points.y(&self.header)
    }

    pub fn z(&self) -> Result<Vec<f64>> {
        self.points.z(&self.header)
    }

    /// Recomputes the bounds and point counts of the header from the points
    pub fn update_header(&mut self) -> Result<()> {
        let format = self.points.format();
        self.header.point_format_id = format.id();
        self.header.point_record_length = record_length_of(format)?;
        self.header.partial_reset();
        self.header.update(&self.points);
        Ok(())
    }

    /// Writes the file into `dest`, the header is updated on the way
    pub fn write_to<W: Write + Seek + Send + Sync>(
        &self,
        dest: W,
        options: WriterOptions,
    ) -> Result<()> {
        let mut writer =
            LasWriter::with_options(dest, self.header.clone(), self.vlrs.clone(), options)?;
        writer.write(&self.points)?;
        if !self.evlrs.is_empty() {
            writer.write_evlrs(self.evlrs.clone())?;
        }
        writer.close()
    }

    /// Writes the file at `path`, compressed if the extension is `laz`
    pub fn write_to_path<P: AsRef<Path>>(&self, path: P, options: WriterOptions) -> Result<()> {
        let is_laz = path
            .as_ref()
            .extension()
            .map_or(false, |ext| ext.eq_ignore_ascii_case("laz"));
        let options = if is_laz {
            options.with_compression(true)
        } else {
            options
        };
        let file = BufWriter::new(File::create(path)?);
        self.write_to(file, options)
    }
}

fn record_length_of(format: &PointFormat) -> Result<u16> {
    u16::try_from(format.size()).map_err(|_| LasError::PointFormatNotSupported {
        id: format.id(),
        version: None,
    })
}

/// Reads a whole LAS or LAZ file
pub fn read_las<S: Read + Seek + Send + Sync>(src: &mut S) -> Result<LasData> {
    read_las_with(src, ReaderOptions::default())
}

/// Reads a whole file, trying the backends of `options` in order
/// until one of them succeeds.
pub fn read_las_with<S: Read + Seek + Send + Sync>(
    src: &mut S,
    options: ReaderOptions,
) -> Result<LasData> {
    let backends: Vec<LazBackend> = options
        .backends()
        .iter()
        .filter(|b| b.is_available())
        .cloned()
        .collect();
    if backends.len() <= 1 {
        return LasReader::with_options(&mut *src, options)?.read();
    }
    let mut last_error = None;
    for backend in backends {
        let single = ReaderOptions::default().with_backend(backend.clone());
        match LasReader::with_options(&mut *src, single).and_then(|mut reader| reader.read()) {
            Err(e) if e.is_recoverable_codec_error() => {
                log::warn!("Backend '{}' failed to read the points: {}", backend.name(), e);
                last_error = Some(e);
            }
            result => return result,
        }
    }
    Err(last_error.unwrap_or_else(|| LasError::CodecUnavailable("no backend given".to_string())))
}

/// Converts a file to another point format and/or version.
///
/// When no version is given, the current one is kept if it allows
/// the point format, otherwise the lowest version allowing it is used.
///
/// Dimensions that the new point format does not have are lost, extra
/// dimensions are kept. Going below 1.4, the EVLRs that fit in a VLR
/// become VLRs, the others are dropped.
pub fn convert(
    las: &LasData,
    point_format_id: Option<u8>,
    version: Option<Version>,
) -> Result<LasData> {
    let current = las.point_format();
    let id = point_format_id.unwrap_or_else(|| current.id());
    let version = match version {
        Some(version) => version,
        None if is_point_format_supported_by(id, las.header.version) => las.header.version,
        None => min_version_for(id)?,
    };
    if !is_point_format_supported_by(id, version) {
        return Err(LasError::PointFormatNotSupported {
            id,
            version: Some(version),
        });
    }

    let lost = dimensions_lost(current.id(), id)?;
    if !lost.is_empty() {
        log::warn!(
            "Converting from point format {} to {} loses: {}",
            current.id(),
            id,
            lost.iter().map(String::as_str).collect::<Vec<_>>().join(", ")
        );
    }
    let new_format = PointFormat::with_extra_dimensions(id, current.extra_dimensions().to_vec())?;
    let points = if &new_format == current {
        las.points.clone()
    } else {
        las.points.convert_format(&new_format)?
    };

    let mut header = las.header.clone();
    header.point_format_id = id;
    header.point_record_length = record_length_of(&new_format)?;
    let mut header = header.convert_to(version)?;
    if !new_format.has_waveform() {
        header.global_encoding.set_waveform_internal(false);
        header.global_encoding.set_waveform_external(false);
        header.start_of_waveform_data_packet_record = 0;
    }

    let mut vlrs = las.vlrs.clone();
    let mut evlrs = vec![];
    if version.supports_evlrs() {
        evlrs = las.evlrs.clone();
    } else {
        for evlr in &las.evlrs {
            if evlr.record_data()?.len() <= usize::from(u16::MAX) {
                log::warn!(
                    "Version {} has no EVLRs, moving EVLR ({}, {}) to the VLRs",
                    version,
                    evlr.user_id,
                    evlr.record_id
                );
                vlrs.push(evlr.clone());
            } else {
                log::warn!(
                    "Version {} has no EVLRs, EVLR ({}, {}) is too big for a VLR and is dropped",
                    version,
                    evlr.user_id,
                    evlr.record_id
                );
            }
        }
    }
    header.number_of_vlrs = vlrs.len() as u32;
    header.number_of_evlrs = evlrs.len() as u32;
    header.start_of_first_evlr = 0;
    header.offset_to_point_data =
        u32::try_from(u64::from(header.header_size) + vlr::vlrs_size(&vlrs)?).map_err(|_| {
            LasError::MalformedVlr("the VLRs do not fit before the point data".to_string())
        })?;
    header.set_wkt_flag_from(&vlrs);
    header.partial_reset();
    header.update(&points);

    Ok(LasData {
        header,
        vlrs,
        points,
        evlrs,
    })
}
