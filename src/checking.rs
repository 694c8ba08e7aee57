//! Point by point comparisons, to check that points survived a trip
//! through a writer, a codec or a conversion.
//!
//! These functions panic with the first difference found.
use std::fs::File;
use std::io::{BufReader, Cursor, Read, Seek};
use std::path::Path;

use crate::file::{read_las, LasData, LasReader, WriterOptions};
use crate::record::PointRecords;

/// Name of the field covering byte `byte_index` of a record,
/// sub-fields are named after the first one in the byte.
fn field_at(points: &PointRecords, byte_index: usize) -> &str {
    points
        .format()
        .fields()
        .iter()
        .find(|f| f.offset <= byte_index && byte_index < f.offset + f.size())
        .map_or("<unknown>", |f| f.name.as_str())
}

pub fn check_same_points(expected: &PointRecords, got: &PointRecords) {
    assert_eq!(expected.format(), got.format(), "point formats differ");
    assert_eq!(expected.len(), got.len(), "numbers of points differ");

    for i in 0..expected.len() {
        let (a, b) = match (expected.record(i), got.record(i)) {
            (Some(a), Some(b)) => (a, b),
            _ => panic!("point {} is missing", i),
        };
        if let Some(byte) = a.iter().zip(b).position(|(x, y)| x != y) {
            panic!(
                "point {} differs on field '{}': expected {:?}, got {:?}",
                i,
                field_at(expected, byte),
                a,
                b
            );
        }
    }
}

/// Compares points to the ones of a file, in order
pub struct LasChecker<'a, R> {
    reader: LasReader<'a, R>,
}

impl LasChecker<'static, BufReader<File>> {
    pub fn from_path<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        Ok(Self {
            reader: LasReader::from_path(path)?,
        })
    }
}

impl<'a, R: Read + Seek + Send + Sync + 'a> LasChecker<'a, R> {
    pub fn new(src: R) -> crate::Result<Self> {
        Ok(Self {
            reader: LasReader::new(src)?,
        })
    }

    /// Checks `points` against the next points of the file
    pub fn check(&mut self, points: &PointRecords) -> crate::Result<()> {
        let expected = self.reader.read_points(points.len() as u64)?;
        check_same_points(&expected, points);
        Ok(())
    }
}

/// Writes `las` in memory, reads it back and checks that nothing changed.
///
/// Returns the data that was read.
pub fn check_write_read_trip(las: &LasData, options: WriterOptions) -> crate::Result<LasData> {
    let mut output = Cursor::new(Vec::<u8>::new());
    las.write_to(&mut output, options)?;
    output.set_position(0);
    let read = read_las(&mut output)?;

    check_same_points(&las.points, &read.points);
    assert_eq!(las.header.version, read.header.version);
    assert_eq!(las.header.point_count, read.header.point_count);
    assert_eq!(
        las.header.number_of_points_by_return,
        read.header.number_of_points_by_return
    );
    assert_eq!(las.vlrs, read.vlrs);
    assert_eq!(las.evlrs, read.evlrs);
    Ok(read)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::las::{PointFormat, Version};

    #[test]
    #[should_panic(expected = "differs on field 'intensity'")]
    fn test_names_the_differing_field() {
        let format = PointFormat::new(0).unwrap();
        let expected = PointRecords::zeros(format.clone(), 2);
        let mut got = PointRecords::zeros(format, 2);
        got.set_values("intensity", &[0u16, 12]).unwrap();
        check_same_points(&expected, &got);
    }

    #[test]
    fn test_checker() {
        let mut las = LasData::new(crate::las::Header::new(Version::V1_2, 0).unwrap()).unwrap();
        las.points = PointRecords::zeros(PointFormat::new(0).unwrap(), 4);
        las.points.set_values("Y", &[4i32, 3, 2, 1]).unwrap();
        las.update_header().unwrap();

        let mut output = Cursor::new(Vec::new());
        las.write_to(&mut output, WriterOptions::default()).unwrap();
        let mut checker = LasChecker::new(output).unwrap();
        checker.check(&las.points.slice(0..2)).unwrap();
        checker.check(&las.points.slice(2..4)).unwrap();
    }
}
