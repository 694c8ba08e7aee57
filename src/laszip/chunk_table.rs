//! Locating the chunk table of LAZ data, and working around its absence.
use std::io::{Read, Seek, SeekFrom};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

/// Size in bytes of the offset to the chunk table that starts the point data
pub const OFFSET_SIZE: u64 = 8;

/// Returns the absolute position of the chunk table, if there is one.
///
/// `src` must be at the start of the point data, it is put back there.
/// `end` is where the point data ends.
///
/// The offset is first read at the start of the point data. Writers that
/// could not seek back to update it leave `-1` there, and write the offset
/// as the last 8 bytes of the data instead.
pub fn find_chunk_table_offset<R: Read + Seek>(src: &mut R, end: u64) -> std::io::Result<Option<u64>> {
    let start = src.seek(SeekFrom::Current(0))?;
    let is_valid = |offset: i64| offset > start as i64 && (offset as u64) < end;

    let mut offset = -1i64;
    if end >= start + OFFSET_SIZE {
        src.seek(SeekFrom::Start(start))?;
        offset = src.read_i64::<LittleEndian>()?;
        if !is_valid(offset) && end >= start + 2 * OFFSET_SIZE {
            src.seek(SeekFrom::Start(end - OFFSET_SIZE))?;
            offset = src.read_i64::<LittleEndian>()?;
        }
    }
    src.seek(SeekFrom::Start(start))?;
    Ok(if is_valid(offset) {
        Some(offset as u64)
    } else {
        None
    })
}

/// Makes compressed point data that lost its chunk table decompressible
/// from start to end.
///
/// `point_data` starts with the (invalid) offset to the chunk table. The offset is
/// replaced to point to an empty table appended to the data. Chunks have a
/// fixed number of points, so a sequential decompression does not need the
/// table entries, only a table to exist.
pub fn splice_empty_chunk_table(mut point_data: Vec<u8>) -> std::io::Result<Vec<u8>> {
    if (point_data.len() as u64) < OFFSET_SIZE {
        return Err(std::io::ErrorKind::UnexpectedEof.into());
    }
    let table_position = point_data.len() as i64;
    (&mut point_data[..OFFSET_SIZE as usize]).write_i64::<LittleEndian>(table_position)?;
    // version, then number of chunks
    point_data.write_u32::<LittleEndian>(0)?;
    point_data.write_u32::<LittleEndian>(0)?;
    // The entries are read through an arithmetic decoder that reads its init bytes
    // even for an empty table.
    point_data.extend_from_slice(&[0u8; 8]);
    Ok(point_data)
}
