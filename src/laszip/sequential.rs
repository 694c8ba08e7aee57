use std::io::{Read, Seek, Write};

use laz::{LasZipAppender, LasZipCompressor, LasZipDecompressor};

use super::{LazPointCompressor, LazPointDecompressor};

impl<'a, R: Read + Seek + Send + Sync + 'a> LazPointDecompressor<R> for LasZipDecompressor<'a, R> {
    fn decompress_many(&mut self, out: &mut [u8]) -> crate::Result<()> {
        LasZipDecompressor::decompress_many(self, out)?;
        Ok(())
    }

    fn seek(&mut self, point_index: u64) -> crate::Result<()> {
        LasZipDecompressor::seek(self, point_index)?;
        Ok(())
    }

    fn get_mut(&mut self) -> &mut R {
        LasZipDecompressor::get_mut(self)
    }
}

impl<'a, W: Write + Seek + Send + 'a> LazPointCompressor<W> for LasZipCompressor<'a, W> {
    fn compress_many(&mut self, points: &[u8]) -> crate::Result<()> {
        LasZipCompressor::compress_many(self, points)?;
        Ok(())
    }

    fn done(&mut self) -> crate::Result<()> {
        LasZipCompressor::done(self)?;
        Ok(())
    }

    fn get_mut(&mut self) -> &mut W {
        LasZipCompressor::get_mut(self)
    }
}

/// Appending is compressing points after the existing ones,
/// the chunk table written by `done` covers all the chunks.
impl<'a, W: Read + Write + Seek + Send + 'a> LazPointCompressor<W> for LasZipAppender<'a, W> {
    fn compress_many(&mut self, points: &[u8]) -> crate::Result<()> {
        LasZipAppender::compress_many(self, points)?;
        Ok(())
    }

    fn done(&mut self) -> crate::Result<()> {
        LasZipAppender::done(self)?;
        Ok(())
    }

    fn get_mut(&mut self) -> &mut W {
        LasZipAppender::get_mut(self)
    }
}
