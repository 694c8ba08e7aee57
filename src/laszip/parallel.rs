use std::io::{Read, Seek, Write};

use laz::{ParLasZipCompressor, ParLasZipDecompressor};

use super::{LazPointCompressor, LazPointDecompressor};

impl<R: Read + Seek> LazPointDecompressor<R> for ParLasZipDecompressor<R> {
    fn decompress_many(&mut self, out: &mut [u8]) -> crate::Result<()> {
        ParLasZipDecompressor::decompress_many(self, out)?;
        Ok(())
    }

    fn seek(&mut self, point_index: u64) -> crate::Result<()> {
        ParLasZipDecompressor::seek(self, point_index)?;
        Ok(())
    }

    fn get_mut(&mut self) -> &mut R {
        ParLasZipDecompressor::get_mut(self)
    }
}

impl<W: Write + Seek + Send + Sync> LazPointCompressor<W> for ParLasZipCompressor<W> {
    fn compress_many(&mut self, points: &[u8]) -> crate::Result<()> {
        ParLasZipCompressor::compress_many(self, points)?;
        Ok(())
    }

    fn done(&mut self) -> crate::Result<()> {
        ParLasZipCompressor::done(self)?;
        Ok(())
    }

    fn get_mut(&mut self) -> &mut W {
        ParLasZipCompressor::get_mut(self)
    }
}
