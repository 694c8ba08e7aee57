//! Decompression done by an external `laszip` executable.
//!
//! The compressed points are wrapped into a minimal LAZ file (header, laszip VLR,
//! point data) written to the stdin of `laszip -stdin -olas -stdout`,
//! the LAS file it outputs is read back from its stdout.
use std::convert::TryFrom;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};

use byteorder::{ByteOrder, LittleEndian};
use laz::LazVlr;

use super::chunk_table::OFFSET_SIZE;
use super::conveyor::PipeConveyor;
use super::LazPointDecompressor;
use crate::errors::{LasError, Result};
use crate::file::end_of_point_data;
use crate::las::{Header, Vlr};

const DEFAULT_PROGRAM: &str = "laszip";

/// An external program that speaks the command line interface of `laszip`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessCodec {
    program: PathBuf,
}

impl Default for ProcessCodec {
    fn default() -> Self {
        Self::new(DEFAULT_PROGRAM)
    }
}

impl ProcessCodec {
    /// `program` is either a path, or a name looked up in the `PATH`
    pub fn new<P: Into<PathBuf>>(program: P) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub fn name(&self) -> &str {
        self.program.to_str().unwrap_or(DEFAULT_PROGRAM)
    }

    /// Returns whether the program can be started.
    pub fn is_available(&self) -> bool {
        Command::new(&self.program)
            .arg("-version")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .is_ok()
    }

    fn failure<E: std::fmt::Display>(&self, reason: E) -> LasError {
        LasError::CodecFailure {
            backend: self.name().to_string(),
            reason: reason.to_string(),
        }
    }

    /// Starts the program, feeds it all the point data of `source` from its
    /// current position, and checks that it outputs a LAS file.
    ///
    /// `source` is only borrowed, it is put back at its current position.
    pub(crate) fn start<R: Read + Seek>(
        &self,
        source: &mut R,
        vlr: &LazVlr,
        header: &Header,
    ) -> Result<RunningProcess> {
        let point_size = usize::try_from(vlr.items_size()).map_err(|e| self.failure(e))?;
        if point_size == 0 {
            return Err(self.failure("the laszip VLR describes empty points"));
        }

        let start = source.seek(SeekFrom::Current(0))?;
        let end = end_of_point_data(source, header)?;
        let mut point_data = Vec::new();
        (&mut *source)
            .take(end.saturating_sub(start))
            .read_to_end(&mut point_data)?;
        source.seek(SeekFrom::Start(start))?;

        let laszip_vlr = Vlr::laszip(vlr)?;
        let mut input_header = header.clone();
        input_header.header_size = input_header.version.header_size();
        input_header.number_of_vlrs = 1;
        input_header.is_compressed = true;
        input_header.start_of_first_evlr = 0;
        input_header.number_of_evlrs = 0;
        input_header.start_of_waveform_data_packet_record = 0;
        input_header.global_encoding.set_waveform_internal(false);
        let new_start = u64::from(input_header.header_size) + laszip_vlr.serialized_size()?;
        input_header.offset_to_point_data =
            u32::try_from(new_start).map_err(|e| self.failure(e))?;
        rebase_chunk_table_offset(&mut point_data, start, new_start);

        let mut child = Command::new(&self.program)
            .args(&["-stdin", "-olas", "-stdout"])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| LasError::CodecUnavailable(format!("{}: {}", self.name(), e)))?;

        let output = match child.stdout.take() {
            Some(stdout) => PipeConveyor::new(stdout, "lasio-laszip-stdout")?,
            None => return Err(self.failure("stdout of the process is not piped")),
        };
        let mut process = RunningProcess {
            child,
            output,
            backend: self.name().to_string(),
            point_size,
        };

        let fed = match process.child.stdin.take() {
            // stdin is closed when dropped at the end of this block
            Some(mut stdin) => input_header
                .write_to(&mut stdin)
                .and_then(|_| laszip_vlr.write_to(&mut stdin))
                .and_then(|_| Ok(stdin.write_all(&point_data)?)),
            None => Err(self.failure("stdin of the process is not piped")),
        };
        fed.map_err(|e| self.failure(format!("failed to send the points: {}", e)))?;

        process.skip_output_header(vlr.items_size())?;
        log::debug!(
            "'{}' started to decompress {} points",
            process.backend,
            header.point_count
        );
        Ok(process)
    }
}

/// Moves the offset to the chunk table from a point data starting at `old_start`
/// to one starting at `new_start`.
fn rebase_chunk_table_offset(point_data: &mut [u8], old_start: u64, new_start: u64) {
    let size = OFFSET_SIZE as usize;
    if point_data.len() < size {
        return;
    }
    let end = point_data.len();
    let is_valid =
        |offset: i64| offset > old_start as i64 && offset < (old_start + end as u64) as i64;
    let rebase = |offset: i64| offset - old_start as i64 + new_start as i64;
    let offset = LittleEndian::read_i64(&point_data[..size]);
    if is_valid(offset) {
        LittleEndian::write_i64(&mut point_data[..size], rebase(offset));
    } else if end >= 2 * size {
        let offset = LittleEndian::read_i64(&point_data[end - size..]);
        if is_valid(offset) {
            LittleEndian::write_i64(&mut point_data[end - size..], rebase(offset));
        }
    }
}

/// A `laszip` process that was given the compressed points
pub(crate) struct RunningProcess {
    child: Child,
    output: PipeConveyor,
    backend: String,
    point_size: usize,
}

impl RunningProcess {
    fn failure<E: std::fmt::Display>(&self, reason: E) -> LasError {
        LasError::CodecFailure {
            backend: self.backend.clone(),
            reason: reason.to_string(),
        }
    }

    /// Reads the header of the LAS file written by the process,
    /// and everything up to its point data.
    fn skip_output_header(&mut self, expected_point_size: u64) -> Result<()> {
        let header = Header::read_from(&mut self.output)
            .map_err(|e| self.failure(format!("invalid output: {}", e)))?;
        if u64::from(header.point_record_length) != expected_point_size {
            return Err(self.failure(format!(
                "output points have {} bytes, expected {}",
                header.point_record_length, expected_point_size
            )));
        }
        let header_end = u64::from(header.version.header_size());
        let to_skip = u64::from(header.offset_to_point_data).saturating_sub(header_end);
        self.discard(to_skip)
    }

    fn discard(&mut self, num_bytes: u64) -> Result<()> {
        let copied = io::copy(&mut (&mut self.output).take(num_bytes), &mut io::sink());
        let skipped = copied.map_err(|e| self.failure(e))?;
        if skipped != num_bytes {
            return Err(self.failure("the process output ended early"));
        }
        Ok(())
    }

    /// The decompressed points, `source` being the stream the points came from
    pub(crate) fn reading_from<R>(self, source: R) -> ProcessDecompressor<R> {
        ProcessDecompressor {
            source,
            process: self,
            position: 0,
        }
    }
}

impl Drop for RunningProcess {
    fn drop(&mut self) {
        self.output.cancel();
        // The process may already be gone
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

/// Decompressed points of a running `laszip` process.
///
/// Can only move forward, points that were skipped by a seek are lost.
pub struct ProcessDecompressor<R> {
    source: R,
    process: RunningProcess,
    position: u64,
}

impl<R> LazPointDecompressor<R> for ProcessDecompressor<R> {
    fn decompress_many(&mut self, out: &mut [u8]) -> Result<()> {
        if let Err(e) = self.process.output.read_exact(out) {
            return Err(self.process.failure(e));
        }
        self.position += (out.len() / self.process.point_size) as u64;
        Ok(())
    }

    fn seek(&mut self, point_index: u64) -> Result<()> {
        if point_index < self.position {
            return Err(self.process.failure(format!(
                "cannot seek back to point {} from point {}",
                point_index, self.position
            )));
        }
        let num_bytes = (point_index - self.position) * self.process.point_size as u64;
        self.process.discard(num_bytes)?;
        self.position = point_index;
        Ok(())
    }

    fn get_mut(&mut self) -> &mut R {
        &mut self.source
    }
}
