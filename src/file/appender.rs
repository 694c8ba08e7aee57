use std::fs::OpenOptions;
use std::io::{Cursor, Read, Seek, SeekFrom, Write};
use std::path::Path;

use super::writer::Sink;
use super::{end_of_point_data, laz_vlr_of, point_format_of, read_evlrs_of, write_evlrs_of};
use crate::errors::{LasError, Result};
use crate::las::vlr::{self, Vlr, VlrKind};
use crate::las::{Header, PointFormat, Version};
use crate::laszip::chunk_table::{find_chunk_table_offset, splice_empty_chunk_table};
use crate::laszip::LazBackend;
use crate::record::PointRecords;

/// Adds points at the end of an existing LAS or LAZ file.
///
/// The header is updated with the new points when the appender is closed,
/// and the EVLRs of the file are moved after the new points.
pub struct LasAppender<'a, W: Read + Write + Seek + Send + Sync + 'a> {
    header: Header,
    evlrs: Vec<Vlr>,
    point_format: PointFormat,
    sink: Sink<'a, W>,
    closed: bool,
}

impl LasAppender<'static, std::fs::File> {
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        Self::new(file)
    }
}

impl<'a, W: Read + Write + Seek + Send + Sync + 'a> LasAppender<'a, W> {
    /// Reads the header, VLRs & EVLRs of the file in `dest` and moves
    /// to where the new points go.
    ///
    /// Compressed files with a chunk table are appended to in place,
    /// the ones without are decompressed and compressed again.
    pub fn new(mut dest: W) -> Result<Self> {
        dest.seek(SeekFrom::Start(0))?;
        let mut header = Header::read_from(&mut dest)?;
        if header.header_size != header.version.header_size() {
            return Err(LasError::UnsupportedOperation(
                "appending to a file with user defined header bytes".to_string(),
            ));
        }
        let vlrs = vlr::read_vlrs(&mut dest, header.number_of_vlrs)?;
        let point_format = point_format_of(&header, &vlrs)?;
        let evlrs = read_evlrs_of(&mut dest, &header)?;
        if header.point_count == 0 {
            header.partial_reset();
        }

        let start = u64::from(header.offset_to_point_data);
        let sink = if header.is_compressed {
            let laz_vlr = laz_vlr_of(vlr::find(&vlrs, VlrKind::CompressionParameters))?;
            dest.seek(SeekFrom::Start(start))?;
            let end = end_of_point_data(&mut dest, &header)?;
            if find_chunk_table_offset(&mut dest, end)?.is_some() {
                Sink::Compressed(Box::new(laz::LasZipAppender::new(dest, laz_vlr)?))
            } else {
                log::warn!("The LAZ data has no chunk table, its points are compressed again");
                let mut compressed = Vec::new();
                (&mut dest)
                    .take(end.saturating_sub(start))
                    .read_to_end(&mut compressed)?;
                let mut existing = vec![0u8; header.point_count as usize * point_format.size()];
                LazBackend::Laszip
                    .decompressor(
                        Cursor::new(splice_empty_chunk_table(compressed)?),
                        laz_vlr.clone(),
                        &header,
                    )?
                    .decompress_many(&mut existing)?;

                dest.seek(SeekFrom::Start(start))?;
                let mut compressor = LazBackend::Laszip.compressor(dest, laz_vlr)?;
                compressor.compress_many(&existing)?;
                Sink::Compressed(compressor)
            }
        } else {
            let end = start + header.point_count * point_format.size() as u64;
            dest.seek(SeekFrom::Start(end))?;
            Sink::Raw(dest)
        };
        log::debug!(
            "Appending points of format {} after {} points",
            point_format,
            header.point_count
        );

        Ok(Self {
            header,
            evlrs,
            point_format,
            sink,
            closed: false,
        })
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    pub fn point_format(&self) -> &PointFormat {
        &self.point_format
    }

    /// Appends points, they must have the format of the file
    pub fn append(&mut self, points: &PointRecords) -> Result<()> {
        if self.closed {
            return Err(LasError::Usage("cannot append points after close"));
        }
        if points.format() != &self.point_format {
            return Err(LasError::IncompatibleFormat {
                expected: self.point_format.to_string(),
                got: points.format().to_string(),
            });
        }
        let count = self.header.point_count + points.len() as u64;
        if self.header.version < Version::V1_4 && count > u64::from(u32::MAX) {
            return Err(LasError::TooManyPoints {
                count,
                version: self.header.version,
            });
        }
        self.sink.write(points)?;
        self.header.update(points);
        Ok(())
    }

    /// Writes the EVLRs back after the points and updates the header
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Err(LasError::Usage("the appender is already closed"));
        }
        self.closed = true;
        self.sink.finish()?;

        let dest = self.sink.get_mut()?;
        if !self.evlrs.is_empty() {
            write_evlrs_of(dest, &mut self.header, &self.evlrs)?;
        }
        dest.seek(SeekFrom::Start(0))?;
        self.header.write_to(dest)?;
        dest.flush()?;
        Ok(())
    }
}

impl<'a, W: Read + Write + Seek + Send + Sync + 'a> Drop for LasAppender<'a, W> {
    fn drop(&mut self) {
        if !self.closed {
            if let Err(e) = self.close() {
                log::error!("Failed to close the appender: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::file::{LasReader, LasWriter, WriterOptions};

    fn points_from(xs: std::ops::Range<i32>) -> PointRecords {
        let mut points = PointRecords::zeros(PointFormat::new(6).unwrap(), xs.len());
        points.set_values("X", &xs.collect::<Vec<i32>>()).unwrap();
        points
    }

    fn file_with(xs: std::ops::Range<i32>, compress: bool, evlrs: Vec<Vlr>) -> Cursor<Vec<u8>> {
        let mut cursor = Cursor::new(Vec::new());
        {
            let header = Header::new(Version::V1_4, 6).unwrap();
            let options = WriterOptions::default()
                .with_compression(compress)
                .with_chunk_size(50);
            let mut writer = LasWriter::with_options(&mut cursor, header, vec![], options).unwrap();
            writer.write(&points_from(xs)).unwrap();
            writer.write_evlrs(evlrs).unwrap();
            writer.close().unwrap();
        }
        cursor
    }

    fn all_xs(cursor: Cursor<Vec<u8>>) -> (Vec<i32>, LasReader<'static, Cursor<Vec<u8>>>) {
        let mut reader = LasReader::new(cursor).unwrap();
        let xs = reader.read().unwrap().points.values::<i32>("X").unwrap();
        (xs, reader)
    }

    #[test]
    fn test_append_keeps_evlrs() {
        for compress in &[false, true] {
            let mut cursor = file_with(0..100, *compress, vec![Vlr::wkt("LOCAL_CS[]")]);
            {
                let mut appender = LasAppender::new(&mut cursor).unwrap();
                appender.append(&points_from(100..180)).unwrap();
                appender.close().unwrap();
                assert_eq!(appender.header().point_count, 180);
            }
            let (xs, reader) = all_xs(cursor);
            assert_eq!(xs, (0..180).collect::<Vec<i32>>());
            assert!((reader.header().maxs[0] - 1.79).abs() < 1e-9);
            assert_eq!(reader.evlrs().len(), 1);
            assert_eq!(reader.evlrs()[0].kind(), Some(VlrKind::WktCoordinateSystem));
        }
    }

    #[test]
    fn test_append_without_chunk_table() {
        let mut cursor = file_with(0..75, true, vec![]);
        let start = Header::read_from(&mut Cursor::new(cursor.get_ref()))
            .unwrap()
            .offset_to_point_data as usize;
        cursor.get_mut()[start..start + 8].copy_from_slice(&(-1i64).to_le_bytes());

        LasAppender::new(&mut cursor)
            .unwrap()
            .append(&points_from(75..100))
            .unwrap();
        let (xs, _) = all_xs(cursor);
        assert_eq!(xs, (0..100).collect::<Vec<i32>>());
    }

    #[test]
    fn test_append_to_empty_file() {
        let mut cursor = file_with(0..0, false, vec![]);
        {
            let mut appender = LasAppender::new(&mut cursor).unwrap();
            appender.append(&points_from(5..8)).unwrap();
        }
        let (xs, reader) = all_xs(cursor);
        assert_eq!(xs, vec![5, 6, 7]);
        assert!((reader.header().mins[0] - 0.05).abs() < 1e-9);
        assert!((reader.header().maxs[0] - 0.07).abs() < 1e-9);
    }

    #[test]
    fn test_wrong_format() {
        let mut cursor = file_with(0..10, false, vec![]);
        let mut appender = LasAppender::new(&mut cursor).unwrap();
        let points = PointRecords::zeros(PointFormat::new(7).unwrap(), 1);
        assert!(matches!(
            appender.append(&points),
            Err(LasError::IncompatibleFormat { .. })
        ));
        appender.append(&points_from(10..11)).unwrap();
        appender.close().unwrap();
        assert!(matches!(
            appender.append(&points_from(11..12)),
            Err(LasError::Usage(_))
        ));
    }
}
