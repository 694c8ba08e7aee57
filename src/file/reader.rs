use std::fs::File;
use std::io::{BufReader, Cursor, Read, Seek, SeekFrom};
use std::path::Path;

use laz::LazVlr;

use super::{end_of_point_data, laz_vlr_of, point_format_of, read_evlrs_of, seek_to_region};
use crate::errors::{LasError, Result};
use crate::file::LasData;
use crate::las::vlr::{self, Vlr, VlrKind};
use crate::las::{Header, PointFormat, WaveformLocation};
use crate::laszip::chunk_table::{find_chunk_table_offset, splice_empty_chunk_table};
use crate::laszip::{LazBackend, LazPointDecompressor};
use crate::record::PointRecords;

/// Number of points decompressed at once when skipping points
const SKIP_BATCH_SIZE: u64 = 10_000;

/// Options of a [`LasReader`]
#[derive(Debug, Clone)]
pub struct ReaderOptions {
    backends: Vec<LazBackend>,
}

impl Default for ReaderOptions {
    fn default() -> Self {
        Self {
            backends: LazBackend::default_order(),
        }
    }
}

impl ReaderOptions {
    /// The backends tried, in order, to decompress LAZ data
    pub fn with_backends(mut self, backends: Vec<LazBackend>) -> Self {
        self.backends = backends;
        self
    }

    pub fn with_backend(self, backend: LazBackend) -> Self {
        self.with_backends(vec![backend])
    }

    pub fn backends(&self) -> &[LazBackend] {
        &self.backends
    }
}

/// The steps a reader goes through
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum ReaderState {
    Initial,
    HeaderRead,
    VlrsRead,
    PointFormatResolved,
    StreamingPoints,
    /// All the points were read, and the EVLRs after them
    EvlrsRead,
    Closed,
}

/// Points of an uncompressed file
struct RawPointReader<R> {
    src: R,
    start: u64,
    point_size: u64,
}

impl<R: Read + Seek> LazPointDecompressor<R> for RawPointReader<R> {
    fn decompress_many(&mut self, out: &mut [u8]) -> Result<()> {
        self.src.read_exact(out)?;
        Ok(())
    }

    fn seek(&mut self, point_index: u64) -> Result<()> {
        self.src
            .seek(SeekFrom::Start(self.start + point_index * self.point_size))?;
        Ok(())
    }

    fn get_mut(&mut self) -> &mut R {
        &mut self.src
    }
}

/// Compressed points with no chunk table.
///
/// The whole compressed data is loaded in memory and given an empty chunk
/// table, which is enough to decompress it from start to end. Seeking
/// backward means decompressing again from the start.
struct BufferedLazReader<'a, R> {
    src: R,
    backend: LazBackend,
    vlr: LazVlr,
    header: Header,
    decompressor: MemoryDecompressor<'a>,
    point_size: usize,
    position: u64,
}

/// A decompressor of in-memory point data
type MemoryDecompressor<'a> = Box<dyn LazPointDecompressor<Cursor<Vec<u8>>> + 'a>;

impl<'a, R: Read + Seek> BufferedLazReader<'a, R> {
    /// Loads the point data of `src`, which is handed back on failure
    fn open(
        mut src: R,
        backend: &LazBackend,
        vlr: LazVlr,
        header: &Header,
    ) -> std::result::Result<Self, (LasError, Option<R>)> {
        match Self::load(&mut src, backend, &vlr, header) {
            Ok((backend, decompressor)) => Ok(Self {
                src,
                backend,
                point_size: vlr.items_size() as usize,
                vlr,
                header: header.clone(),
                decompressor,
                position: 0,
            }),
            Err(e) => Err((e, Some(src))),
        }
    }

    fn load(
        src: &mut R,
        backend: &LazBackend,
        vlr: &LazVlr,
        header: &Header,
    ) -> Result<(LazBackend, MemoryDecompressor<'a>)> {
        if vlr.items_size() == 0 {
            return Err(LasError::MalformedVlr(
                "the laszip VLR describes empty points".to_string(),
            ));
        }
        let start = src.seek(SeekFrom::Current(0))?;
        let end = end_of_point_data(src, header)?;
        let mut compressed = Vec::new();
        (&mut *src)
            .take(end.saturating_sub(start))
            .read_to_end(&mut compressed)?;
        src.seek(SeekFrom::Start(start))?;

        // The parallel decompressor needs the chunk table entries
        let backend = match backend {
            #[cfg(feature = "parallel")]
            LazBackend::LaszipParallel => LazBackend::Laszip,
            other => other.clone(),
        };
        let data = splice_empty_chunk_table(compressed)?;
        let decompressor = backend.decompressor(Cursor::new(data), vlr.clone(), header)?;
        Ok((backend, decompressor))
    }

    fn skip(&mut self, mut count: u64) -> Result<()> {
        let mut buffer = vec![0u8; count.min(SKIP_BATCH_SIZE) as usize * self.point_size];
        while count > 0 {
            let n = count.min(SKIP_BATCH_SIZE) as usize;
            self.decompressor
                .decompress_many(&mut buffer[..n * self.point_size])?;
            count -= n as u64;
            self.position += n as u64;
        }
        Ok(())
    }
}

impl<'a, R: Read + Seek> LazPointDecompressor<R> for BufferedLazReader<'a, R> {
    fn decompress_many(&mut self, out: &mut [u8]) -> Result<()> {
        self.decompressor.decompress_many(out)?;
        self.position += (out.len() / self.point_size) as u64;
        Ok(())
    }

    fn seek(&mut self, point_index: u64) -> Result<()> {
        if point_index < self.position {
            let data = std::mem::take(self.decompressor.get_mut().get_mut());
            self.decompressor =
                self.backend
                    .decompressor(Cursor::new(data), self.vlr.clone(), &self.header)?;
            self.position = 0;
        }
        self.skip(point_index - self.position)
    }

    fn get_mut(&mut self) -> &mut R {
        &mut self.src
    }
}

/// Reads the points of a LAS or LAZ file, all at once or in chunks.
///
/// The header and the VLRs are read when the reader is created.
/// The EVLRs are read once all the points were read, or on demand
/// with [`LasReader::read_evlrs`].
pub struct LasReader<'a, R> {
    header: Header,
    vlrs: Vec<Vlr>,
    evlrs: Vec<Vlr>,
    point_format: PointFormat,
    waveform_data: Option<Vec<u8>>,
    point_reader: Option<Box<dyn LazPointDecompressor<R> + 'a>>,
    points_read: u64,
    state: ReaderState,
}

impl LasReader<'static, BufReader<File>> {
    /// Opens the file at `path`.
    ///
    /// For LAZ files, each backend of the default order is tried
    /// until one manages to open the file.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::from_path_with_options(path, ReaderOptions::default())
    }

    pub fn from_path_with_options<P: AsRef<Path>>(path: P, options: ReaderOptions) -> Result<Self> {
        let open = || -> Result<BufReader<File>> {
            Ok(BufReader::new(File::open(path.as_ref())?))
        };
        let backends: Vec<LazBackend> = options
            .backends
            .iter()
            .filter(|b| b.is_available())
            .cloned()
            .collect();
        if backends.is_empty() {
            return Self::with_options(open()?, options);
        }
        let mut last_error = LasError::CodecUnavailable("no backend given".to_string());
        for backend in backends {
            let single = ReaderOptions::default().with_backend(backend.clone());
            match Self::with_options(open()?, single) {
                Err(e) if e.is_recoverable_codec_error() => {
                    log::warn!(
                        "Backend '{}' could not open {}: {}",
                        backend.name(),
                        path.as_ref().display(),
                        e
                    );
                    last_error = e;
                }
                result => return result,
            }
        }
        Err(last_error)
    }
}

impl<'a, R: Read + Seek + Send + Sync + 'a> LasReader<'a, R> {
    pub fn new(src: R) -> Result<Self> {
        Self::with_options(src, ReaderOptions::default())
    }

    /// Reads the header & VLRs, and prepares the reading of the points.
    ///
    /// The stream is expected to have the LAS file at its start.
    /// Backends that are not available are skipped. When one fails
    /// to start decompressing, the next one is tried.
    pub fn with_options(mut src: R, options: ReaderOptions) -> Result<Self> {
        let mut state = ReaderState::Initial;
        src.seek(SeekFrom::Start(0))?;
        let header = Header::read_from(&mut src)?;
        state = transition(state, ReaderState::HeaderRead);

        let standard_size = u64::from(header.version.header_size());
        if u64::from(header.header_size) > standard_size {
            log::warn!(
                "Skipping {} bytes of user defined header",
                u64::from(header.header_size) - standard_size
            );
            src.seek(SeekFrom::Start(u64::from(header.header_size)))?;
        }
        let mut vlrs = vlr::read_vlrs(&mut src, header.number_of_vlrs)?;
        seek_to_region(&mut src, u64::from(header.offset_to_point_data), "point data")?;
        state = transition(state, ReaderState::VlrsRead);

        let point_format = point_format_of(&header, &vlrs)?;
        if !point_format.is_supported_by(header.version) {
            return Err(LasError::PointFormatNotSupported {
                id: point_format.id(),
                version: Some(header.version),
            });
        }
        state = transition(state, ReaderState::PointFormatResolved);

        let waveform_data = read_waveform_data(&mut src, &header, &point_format)?;

        let laszip_vlr = vlr::extract(&mut vlrs, VlrKind::CompressionParameters);
        src.seek(SeekFrom::Start(u64::from(header.offset_to_point_data)))?;
        let point_reader: Box<dyn LazPointDecompressor<R> + 'a> = if header.is_compressed {
            let laz_vlr = laz_vlr_of(laszip_vlr.as_ref())?;
            open_compressed(src, &options.backends, laz_vlr, &header)?
        } else {
            Box::new(RawPointReader {
                src,
                start: u64::from(header.offset_to_point_data),
                point_size: point_format.size() as u64,
            })
        };
        state = transition(state, ReaderState::StreamingPoints);

        Ok(Self {
            header,
            vlrs,
            evlrs: vec![],
            point_format,
            waveform_data,
            point_reader: Some(point_reader),
            points_read: 0,
            state,
        })
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    /// VLRs of the file, the laszip VLR excepted
    pub fn vlrs(&self) -> &[Vlr] {
        &self.vlrs
    }

    /// EVLRs read so far
    pub fn evlrs(&self) -> &[Vlr] {
        &self.evlrs
    }

    pub fn point_format(&self) -> &PointFormat {
        &self.point_format
    }

    /// Content of the internal waveform data packets, when the
    /// point format has waveform dimensions.
    pub fn waveform_data(&self) -> Option<&[u8]> {
        self.waveform_data.as_deref()
    }

    pub fn state(&self) -> ReaderState {
        self.state
    }

    /// Number of points not yet read
    pub fn points_left(&self) -> u64 {
        self.header.point_count.saturating_sub(self.points_read)
    }

    fn point_reader(&mut self) -> Result<&mut Box<dyn LazPointDecompressor<R> + 'a>> {
        self.point_reader
            .as_mut()
            .ok_or(LasError::Usage("the reader is closed"))
    }

    /// Runs `f` on the stream, which is put back where it was afterwards
    fn with_stream<T, F>(&mut self, f: F) -> Result<T>
    where
        F: FnOnce(&mut R) -> Result<T>,
    {
        let src = self.point_reader()?.get_mut();
        let position = src.seek(SeekFrom::Current(0))?;
        let result = f(&mut *src);
        src.seek(SeekFrom::Start(position))?;
        result
    }

    /// Reads the header again, from the start of the stream
    pub fn read_header(&mut self) -> Result<Header> {
        self.with_stream(|src| {
            src.seek(SeekFrom::Start(0))?;
            Header::read_from(src)
        })
    }

    /// Reads the VLRs again, the laszip VLR included
    pub fn read_vlrs(&mut self) -> Result<Vec<Vlr>> {
        let start = u64::from(self.header.header_size);
        let count = self.header.number_of_vlrs;
        self.with_stream(|src| {
            src.seek(SeekFrom::Start(start))?;
            vlr::read_vlrs(src, count)
        })
    }

    /// Reads the EVLRs, without changing the point that is read next
    pub fn read_evlrs(&mut self) -> Result<&[Vlr]> {
        let header = self.header.clone();
        let point_data_end = if header.is_compressed {
            None
        } else {
            Some(
                u64::from(header.offset_to_point_data)
                    + header.point_count * self.point_format.size() as u64,
            )
        };
        let evlrs = self.with_stream(|src| {
            let has_evlrs = header.version.supports_evlrs() && header.number_of_evlrs > 0;
            if let (Some(end), true) = (point_data_end, has_evlrs) {
                src.seek(SeekFrom::Start(end))?;
                seek_to_region(src, header.start_of_first_evlr, "EVLRs")?;
            }
            read_evlrs_of(src, &header)
        })?;
        self.evlrs = evlrs;
        Ok(&self.evlrs)
    }

    /// Reads the next `n` points, fewer if the file does not have that many left.
    ///
    /// Once the last point is read, the EVLRs are read.
    pub fn read_points(&mut self, n: u64) -> Result<PointRecords> {
        let n = n.min(self.points_left());
        let size = self.point_format.size();
        let mut data = vec![0u8; n as usize * size];
        self.point_reader()?.decompress_many(&mut data)?;
        self.points_read += n;

        if self.points_left() == 0 && self.state == ReaderState::StreamingPoints {
            self.read_evlrs()?;
            self.state = transition(self.state, ReaderState::EvlrsRead);
        }
        PointRecords::from_bytes(self.point_format.clone(), data)
    }

    /// Moves to the point at `point_index`, the next points read start there.
    pub fn seek(&mut self, point_index: u64) -> Result<()> {
        let point_index = point_index.min(self.header.point_count);
        self.point_reader()?.seek(point_index)?;
        self.points_read = point_index;
        if self.points_left() > 0 {
            self.state = ReaderState::StreamingPoints;
        }
        Ok(())
    }

    /// Iterates over the points left, `batch_size` points at a time
    pub fn chunks(&mut self, batch_size: usize) -> PointChunks<'_, 'a, R> {
        PointChunks {
            reader: self,
            batch_size: batch_size.max(1) as u64,
        }
    }

    /// Reads the whole file, from its first point
    pub fn read(&mut self) -> Result<LasData> {
        if self.points_read != 0 {
            self.seek(0)?;
        }
        let points = self.read_points(self.header.point_count)?;
        Ok(LasData {
            header: self.header.clone(),
            vlrs: self.vlrs.clone(),
            points,
            evlrs: self.evlrs.clone(),
        })
    }

    /// Releases the stream, any later read fails
    pub fn close(&mut self) -> Result<()> {
        if self.point_reader.take().is_none() {
            return Err(LasError::Usage("the reader is already closed"));
        }
        self.state = transition(self.state, ReaderState::Closed);
        Ok(())
    }
}

/// Starts decompressing the points with the first backend that manages to.
///
/// `src` must be at the start of the point data.
fn open_compressed<'a, R>(
    mut src: R,
    backends: &[LazBackend],
    vlr: LazVlr,
    header: &Header,
) -> Result<Box<dyn LazPointDecompressor<R> + 'a>>
where
    R: Read + Seek + Send + Sync + 'a,
{
    let start = src.seek(SeekFrom::Current(0))?;
    let end = end_of_point_data(&mut src, header)?;
    let has_chunk_table = find_chunk_table_offset(&mut src, end)?.is_some();

    let mut last_error = LasError::CodecUnavailable("no available backend".to_string());
    for backend in backends.iter().filter(|b| b.is_available()) {
        src.seek(SeekFrom::Start(start))?;
        let opened = if has_chunk_table || matches!(backend, LazBackend::Process(_)) {
            backend.open(src, vlr.clone(), header)
        } else {
            log::warn!("The LAZ data has no chunk table, it will be decompressed in memory");
            BufferedLazReader::open(src, backend, vlr.clone(), header)
                .map(|reader| Box::new(reader) as Box<dyn LazPointDecompressor<R> + 'a>)
        };
        match opened {
            Ok(decompressor) => return Ok(decompressor),
            Err((e, Some(source))) if e.is_recoverable_codec_error() => {
                log::warn!(
                    "Backend '{}' could not decompress the points: {}",
                    backend.name(),
                    e
                );
                src = source;
                last_error = e;
            }
            Err((e, _)) => return Err(e),
        }
    }
    Err(last_error)
}

fn transition(from: ReaderState, to: ReaderState) -> ReaderState {
    log::debug!("Reader: {:?} -> {:?}", from, to);
    to
}

/// Reads the waveform packets stored in the file, if the format has any.
fn read_waveform_data<R: Read + Seek>(
    src: &mut R,
    header: &Header,
    point_format: &PointFormat,
) -> Result<Option<Vec<u8>>> {
    if !point_format.has_waveform() {
        return Ok(None);
    }
    match header.waveform_location()? {
        WaveformLocation::Internal if header.start_of_waveform_data_packet_record > 0 => {
            src.seek(SeekFrom::Start(header.start_of_waveform_data_packet_record))?;
            let record = Vlr::read_extended_from(src)?;
            Ok(Some(record.record_data()?))
        }
        WaveformLocation::Internal => {
            log::warn!("Waveform data is said to be internal, but its position is unknown");
            Ok(None)
        }
        WaveformLocation::External => {
            log::info!("Waveform data is in an external file, it is not read");
            Ok(None)
        }
        WaveformLocation::None => Ok(None),
    }
}

/// Iterator over the points of a [`LasReader`], see [`LasReader::chunks`]
pub struct PointChunks<'r, 'a, R> {
    reader: &'r mut LasReader<'a, R>,
    batch_size: u64,
}

impl<'r, 'a, R: Read + Seek + Send + Sync + 'a> Iterator for PointChunks<'r, 'a, R> {
    type Item = Result<PointRecords>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.reader.state == ReaderState::Closed || self.reader.points_left() == 0 {
            return None;
        }
        let result = self.reader.read_points(self.batch_size);
        if result.is_err() {
            // Stop at the first error instead of failing for every chunk left
            self.reader.points_read = self.reader.header.point_count;
        }
        Some(result)
    }
}
