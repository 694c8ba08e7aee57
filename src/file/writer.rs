use std::convert::TryFrom;
use std::fs::File;
use std::io::{BufWriter, Seek, SeekFrom, Write};
use std::path::Path;

use super::{point_format_of, write_evlrs_of};
use crate::errors::{LasError, Result};
use crate::las::vlr::{self, Vlr, VlrKind, VlrPayload};
use crate::las::{ExtraBytesStruct, Header, PointFormat, Version};
use crate::laszip::{laz_vlr_for, LazBackend, LazPointCompressor, DEFAULT_CHUNK_SIZE};
use crate::record::PointRecords;

/// Options of a [`LasWriter`]
#[derive(Debug, Clone)]
pub struct WriterOptions {
    compress: bool,
    backend: LazBackend,
    chunk_size: u32,
}

impl Default for WriterOptions {
    fn default() -> Self {
        Self {
            compress: false,
            backend: LazBackend::default(),
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

impl WriterOptions {
    /// Whether points are written compressed (LAZ)
    pub fn with_compression(mut self, compress: bool) -> Self {
        self.compress = compress;
        self
    }

    pub fn with_backend(mut self, backend: LazBackend) -> Self {
        self.backend = backend;
        self
    }

    /// Number of points per compressed chunk
    pub fn with_chunk_size(mut self, chunk_size: u32) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    pub fn compress(&self) -> bool {
        self.compress
    }

    pub fn backend(&self) -> &LazBackend {
        &self.backend
    }

    pub fn chunk_size(&self) -> u32 {
        self.chunk_size
    }
}

/// The steps a writer goes through
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum WriterState {
    /// Nothing written yet, the point format is not locked
    Initial,
    StreamingPoints,
    Closed,
}

/// Where points go once the header and VLRs are written
pub(super) enum Sink<'a, W> {
    Raw(W),
    Compressed(Box<dyn LazPointCompressor<W> + 'a>),
    /// The stream was lost creating the compressor
    Lost,
}

impl<'a, W> Sink<'a, W> {
    pub(super) fn get_mut(&mut self) -> Result<&mut W> {
        match self {
            Sink::Raw(dest) => Ok(dest),
            Sink::Compressed(compressor) => Ok(compressor.get_mut()),
            Sink::Lost => Err(LasError::Usage("the writer failed and cannot be used anymore")),
        }
    }

    pub(super) fn write(&mut self, points: &PointRecords) -> Result<()>
    where
        W: Write,
    {
        match self {
            Sink::Raw(dest) => Ok(dest.write_all(points.as_bytes())?),
            Sink::Compressed(compressor) => compressor.compress_many(points.as_bytes()),
            Sink::Lost => Err(LasError::Usage("the writer failed and cannot be used anymore")),
        }
    }

    /// Writes what the compressor still holds, and its chunk table
    pub(super) fn finish(&mut self) -> Result<()> {
        if let Sink::Compressed(compressor) = self {
            compressor.done()?;
        }
        Ok(())
    }
}

/// Writes points into a new LAS or LAZ file.
///
/// The point format is locked by the first call to [`LasWriter::write`],
/// the header and VLRs are written at that moment. Points of another
/// format are refused.
///
/// [`LasWriter::close`] must be called to finalize the file, dropping an
/// unclosed writer closes it but errors can only be logged.
pub struct LasWriter<'a, W: Write + Seek + Send + Sync + 'a> {
    header: Header,
    vlrs: Vec<Vlr>,
    evlrs: Vec<Vlr>,
    options: WriterOptions,
    point_format: Option<PointFormat>,
    sink: Sink<'a, W>,
    state: WriterState,
}

impl LasWriter<'static, BufWriter<File>> {
    /// Creates the file at `path`
    pub fn from_path<P: AsRef<Path>>(
        path: P,
        header: Header,
        vlrs: Vec<Vlr>,
        options: WriterOptions,
    ) -> Result<Self> {
        let file = BufWriter::new(File::create(path)?);
        Self::with_options(file, header, vlrs, options)
    }
}

impl<'a, W: Write + Seek + Send + Sync + 'a> LasWriter<'a, W> {
    pub fn new(dest: W, header: Header) -> Result<Self> {
        Self::with_options(dest, header, vec![], WriterOptions::default())
    }

    /// The header is a template: its bounds and point counts are reset,
    /// and computed from the points written.
    ///
    /// The extra-bytes & laszip VLRs in `vlrs` are replaced by ones
    /// matching the points written.
    pub fn with_options(
        dest: W,
        mut header: Header,
        vlrs: Vec<Vlr>,
        options: WriterOptions,
    ) -> Result<Self> {
        if options.compress && !options.backend.supports_compression() {
            return Err(LasError::CodecUnavailable(format!(
                "{} (cannot compress)",
                options.backend.name()
            )));
        }
        header.partial_reset();
        header.header_size = header.version.header_size();
        header.is_compressed = options.compress;
        header.start_of_first_evlr = 0;
        header.number_of_evlrs = 0;
        Ok(Self {
            header,
            vlrs,
            evlrs: vec![],
            options,
            point_format: None,
            sink: Sink::Raw(dest),
            state: WriterState::Initial,
        })
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    pub fn state(&self) -> WriterState {
        self.state
    }

    /// The point format, once locked by the first write
    pub fn point_format(&self) -> Option<&PointFormat> {
        self.point_format.as_ref()
    }

    /// Writes points, which must all have the same format.
    pub fn write(&mut self, points: &PointRecords) -> Result<()> {
        if self.state == WriterState::Closed {
            return Err(LasError::Usage("cannot write points after close"));
        }
        if self.point_format.is_none() {
            self.lock_format(points.format().clone())?;
        } else if let Some(format) = self.point_format.as_ref().filter(|f| *f != points.format()) {
            return Err(LasError::IncompatibleFormat {
                expected: format.to_string(),
                got: points.format().to_string(),
            });
        }
        if points.is_empty() {
            return Ok(());
        }
        if self.header.version < Version::V1_4
            && self.header.point_count + points.len() as u64 > u64::from(u32::MAX)
        {
            return Err(LasError::TooManyPoints {
                count: self.header.point_count + points.len() as u64,
                version: self.header.version,
            });
        }
        self.sink.write(points)?;
        self.header.update(points);
        Ok(())
    }

    /// EVLRs are written after the points when closing, only version 1.4 has them.
    pub fn write_evlrs(&mut self, evlrs: Vec<Vlr>) -> Result<()> {
        if self.state == WriterState::Closed {
            return Err(LasError::Usage("cannot write EVLRs after close"));
        }
        if !self.header.version.supports_evlrs() {
            return Err(LasError::UnsupportedOperation(format!(
                "EVLRs cannot be written in a file of version {}",
                self.header.version
            )));
        }
        self.evlrs.extend(evlrs);
        Ok(())
    }

    /// Locks the point format, writes the header & VLRs and
    /// creates the compressor.
    fn lock_format(&mut self, format: PointFormat) -> Result<()> {
        if !format.is_supported_by(self.header.version) {
            return Err(LasError::PointFormatNotSupported {
                id: format.id(),
                version: Some(self.header.version),
            });
        }
        let record_length =
            u16::try_from(format.size()).map_err(|_| LasError::PointFormatNotSupported {
                id: format.id(),
                version: None,
            })?;
        self.header.point_format_id = format.id();
        self.header.point_record_length = record_length;

        self.update_extra_bytes_vlr(&format);
        while vlr::extract(&mut self.vlrs, VlrKind::CompressionParameters).is_some() {}
        let laz_vlr = if self.options.compress {
            let laz_vlr = laz_vlr_for(&format, self.options.chunk_size)?;
            self.vlrs.push(Vlr::laszip(&laz_vlr)?);
            Some(laz_vlr)
        } else {
            None
        };
        self.header.set_wkt_flag_from(&self.vlrs);

        let vlrs_size = vlr::vlrs_size(&self.vlrs)?;
        self.header.number_of_vlrs = self.vlrs.len() as u32;
        self.header.offset_to_point_data =
            u32::try_from(u64::from(self.header.header_size) + vlrs_size).map_err(|_| {
                LasError::MalformedVlr("the VLRs do not fit before the point data".to_string())
            })?;

        let dest = self.sink.get_mut()?;
        dest.seek(SeekFrom::Start(0))?;
        self.header.write_to(dest)?;
        vlr::write_vlrs(dest, &self.vlrs)?;
        let position = dest.seek(SeekFrom::Current(0))?;
        if position != u64::from(self.header.offset_to_point_data) {
            return Err(LasError::StreamPosition {
                expected: u64::from(self.header.offset_to_point_data),
                actual: position,
            });
        }

        if let Some(laz_vlr) = laz_vlr {
            match std::mem::replace(&mut self.sink, Sink::Lost) {
                Sink::Raw(dest) => {
                    self.sink = Sink::Compressed(self.options.backend.compressor(dest, laz_vlr)?);
                }
                other => self.sink = other,
            }
        }
        log::debug!(
            "Writer: {:?} -> {:?}, point format {}",
            self.state,
            WriterState::StreamingPoints,
            format
        );
        self.point_format = Some(format);
        self.state = WriterState::StreamingPoints;
        Ok(())
    }

    /// Makes the VLRs describe the extra dimensions of `format`,
    /// keeping a user given description of them if it matches.
    fn update_extra_bytes_vlr(&mut self, format: &PointFormat) {
        let existing = vlr::extract(&mut self.vlrs, VlrKind::ExtraBytes);
        if format.extra_dimensions().is_empty() {
            return;
        }
        if let Some(existing) = existing {
            if let VlrPayload::ExtraBytes(structs) = &existing.payload {
                let described: Vec<_> = structs.iter().map(|s| s.to_extra_dimension()).collect();
                if described == format.extra_dimensions() {
                    self.vlrs.push(existing);
                    return;
                }
            }
        }
        let structs = format
            .extra_dimensions()
            .iter()
            .map(|dimension| ExtraBytesStruct::new(dimension.name.clone(), dimension.data_type))
            .collect();
        self.vlrs.push(Vlr::extra_bytes(structs));
    }

    /// Finalizes the file: last compressed chunk, EVLRs, and the header
    /// which is rewritten with the bounds and counts of the points written.
    pub fn close(&mut self) -> Result<()> {
        if self.state == WriterState::Closed {
            return Err(LasError::Usage("the writer is already closed"));
        }
        if self.point_format.is_none() {
            let format = point_format_of(&self.header, &self.vlrs)?;
            self.lock_format(format)?;
        }
        self.sink.finish()?;

        let dest = self.sink.get_mut()?;
        if !self.evlrs.is_empty() {
            write_evlrs_of(dest, &mut self.header, &self.evlrs)?;
        }
        dest.seek(SeekFrom::Start(0))?;
        self.header.write_to(dest)?;
        dest.flush()?;

        log::debug!("Writer: {:?} -> {:?}", self.state, WriterState::Closed);
        self.state = WriterState::Closed;
        Ok(())
    }
}

impl<'a, W: Write + Seek + Send + Sync + 'a> Drop for LasWriter<'a, W> {
    fn drop(&mut self) {
        if self.state != WriterState::Closed {
            if let Err(e) = self.close() {
                log::error!("Failed to close the writer: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod test {
    use std::io::Cursor;

    use super::*;
    use crate::file::LasReader;
    use crate::las::dims::StorageType;
    use crate::las::{ExtraBytesType, ExtraDimension};

    #[test]
    fn test_incompatible_format_keeps_writer_usable() {
        let mut cursor = Cursor::new(Vec::new());
        {
            let header = Header::new(Version::V1_2, 3).unwrap();
            let mut writer = LasWriter::new(&mut cursor, header).unwrap();
            let format = PointFormat::new(3).unwrap();
            writer.write(&PointRecords::zeros(format.clone(), 2)).unwrap();

            let other = PointRecords::zeros(PointFormat::new(2).unwrap(), 2);
            assert!(matches!(
                writer.write(&other),
                Err(LasError::IncompatibleFormat { .. })
            ));
            writer.write(&PointRecords::zeros(format, 3)).unwrap();
            writer.close().unwrap();
            assert!(matches!(
                writer.write(&PointRecords::zeros(PointFormat::new(3).unwrap(), 1)),
                Err(LasError::Usage(_))
            ));
            assert!(matches!(writer.close(), Err(LasError::Usage(_))));
        }
        cursor.set_position(0);
        let reader = LasReader::new(cursor).unwrap();
        assert_eq!(reader.header().point_count, 5);
    }

    #[test]
    fn test_format_not_allowed_by_version() {
        let mut cursor = Cursor::new(Vec::new());
        let header = Header::new(Version::V1_2, 3).unwrap();
        let mut writer = LasWriter::new(&mut cursor, header).unwrap();
        let points = PointRecords::zeros(PointFormat::new(6).unwrap(), 1);
        assert!(matches!(
            writer.write(&points),
            Err(LasError::PointFormatNotSupported { id: 6, .. })
        ));
    }

    #[test]
    fn test_evlrs_need_version_1_4() {
        let mut cursor = Cursor::new(Vec::new());
        let mut writer = LasWriter::new(&mut cursor, Header::default()).unwrap();
        assert!(matches!(
            writer.write_evlrs(vec![Vlr::wkt("GEOGCS[]")]),
            Err(LasError::UnsupportedOperation(_))
        ));
    }

    #[test]
    fn test_close_without_points() {
        let mut cursor = Cursor::new(Vec::new());
        {
            let header = Header::new(Version::V1_4, 7).unwrap();
            let mut writer = LasWriter::new(&mut cursor, header).unwrap();
            writer.close().unwrap();
            assert_eq!(writer.point_format().map(PointFormat::id), Some(7));
        }
        let data = cursor.into_inner();
        assert_eq!(data.len(), 375);
        let header = Header::read_from(&mut Cursor::new(&data)).unwrap();
        assert_eq!(header.point_count, 0);
        assert_eq!(header.mins, [0.0; 3]);
        assert_eq!(header.maxs, [0.0; 3]);
    }

    #[test]
    fn test_drop_closes() {
        let mut cursor = Cursor::new(Vec::new());
        {
            let header = Header::new(Version::V1_2, 0).unwrap();
            let options = WriterOptions::default().with_compression(true);
            let mut writer = LasWriter::with_options(&mut cursor, header, vec![], options).unwrap();
            writer
                .write(&PointRecords::zeros(PointFormat::new(0).unwrap(), 10))
                .unwrap();
        }
        cursor.set_position(0);
        let mut reader = LasReader::new(cursor).unwrap();
        assert!(reader.header().is_compressed);
        assert_eq!(reader.read().unwrap().points.len(), 10);
    }

    #[test]
    fn test_extra_bytes_vlr_is_written() {
        let format = PointFormat::with_extra_dimensions(
            3,
            vec![
                ExtraDimension::new("height", ExtraBytesType::Scalar(StorageType::F64)),
                ExtraDimension::new("normal", ExtraBytesType::Array(StorageType::I16, 3)),
            ],
        )
        .unwrap();
        let mut points = PointRecords::zeros(format.clone(), 2);
        points.set_values("height", &[1.5f64, -2.0]).unwrap();
        points
            .set_values("normal", &[1i16, 2, 3, -4, -5, -6])
            .unwrap();

        let mut cursor = Cursor::new(Vec::new());
        {
            let header = Header::new(Version::V1_2, 3).unwrap();
            let mut writer = LasWriter::new(&mut cursor, header).unwrap();
            writer.write(&points).unwrap();
            writer.close().unwrap();
        }
        cursor.set_position(0);
        let mut reader = LasReader::new(cursor).unwrap();
        assert_eq!(reader.point_format(), &format);
        assert_eq!(reader.vlrs()[0].kind(), Some(VlrKind::ExtraBytes));
        let read = reader.read().unwrap().points;
        assert_eq!(read.values::<f64>("height").unwrap(), vec![1.5, -2.0]);
        assert_eq!(
            read.values::<i16>("normal").unwrap(),
            vec![1, 2, 3, -4, -5, -6]
        );
    }

    #[test]
    fn test_process_backend_cannot_compress() {
        use crate::laszip::ProcessCodec;
        let options = WriterOptions::default()
            .with_compression(true)
            .with_backend(LazBackend::Process(ProcessCodec::default()));
        let result = LasWriter::with_options(
            Cursor::new(Vec::new()),
            Header::default(),
            vec![],
            options,
        );
        assert!(matches!(result, Err(LasError::CodecUnavailable(_))));
    }
}
