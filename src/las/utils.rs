use std::io::{Read, Write};

/// Reads a NUL padded string stored on `size` bytes.
pub(crate) fn read_fixed_string<R: Read>(src: &mut R, size: usize) -> std::io::Result<String> {
    let mut buffer = vec![0u8; size];
    src.read_exact(&mut buffer)?;
    Ok(fixed_bytes_to_string(&buffer))
}

pub(crate) fn fixed_bytes_to_string(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|b| *b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}

/// Writes `value` on exactly `size` bytes, truncating or NUL padding it.
pub(crate) fn write_fixed_string<W: Write>(
    dst: &mut W,
    value: &str,
    size: usize,
) -> std::io::Result<()> {
    let mut buffer = vec![0u8; size];
    let bytes = value.as_bytes();
    let n = bytes.len().min(size);
    buffer[..n].copy_from_slice(&bytes[..n]);
    dst.write_all(&buffer)
}
