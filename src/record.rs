//! In memory storage of point records.
//!
//! Points are kept in their on-disk layout, a single buffer of fixed size
//! records. Fields are accessed through the layout table of the [`PointFormat`].
use std::fmt;
use std::io::Read;
use std::ops::Range;

use num_traits::ToPrimitive;

use crate::errors::{LasError, Result};
use crate::las::dims::{self, Scalar};
use crate::las::formats::{FieldLayout, PointFormat};
use crate::las::header::Header;

/// A buffer of points, all of the same [`PointFormat`].
///
/// The buffer length is always `len() * format().size()`.
#[derive(Debug, Clone, PartialEq)]
pub struct PointRecords {
    format: PointFormat,
    data: Vec<u8>,
}

impl PointRecords {
    /// `count` points with all their fields set to zero
    pub fn zeros(format: PointFormat, count: usize) -> Self {
        let data = vec![0u8; count * format.size()];
        Self { format, data }
    }

    /// Wraps bytes that are already in the record layout
    pub fn from_bytes(format: PointFormat, data: Vec<u8>) -> Result<Self> {
        if data.len() % format.size() != 0 {
            return Err(LasError::LengthMismatch {
                expected: (data.len() / format.size() + 1) * format.size(),
                got: data.len(),
            });
        }
        Ok(Self { format, data })
    }

    /// Reads `count` records from `src` with a single read
    pub fn from_reader<R: Read>(src: &mut R, format: PointFormat, count: usize) -> Result<Self> {
        let mut data = vec![0u8; count * format.size()];
        src.read_exact(&mut data)?;
        Ok(Self { format, data })
    }

    pub fn format(&self) -> &PointFormat {
        &self.format
    }

    /// Number of points
    pub fn len(&self) -> usize {
        self.data.len() / self.format.size()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// The records, as they are stored in a LAS file
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    /// Bytes of the `index`-th record
    pub fn record(&self, index: usize) -> Option<&[u8]> {
        let size = self.format.size();
        self.data.get(index * size..(index + 1) * size)
    }

    fn layout(&self, name: &str) -> Result<&FieldLayout> {
        self.format
            .field(name)
            .ok_or_else(|| LasError::UnknownDimension(name.to_string()))
    }

    /// Lazy view over the values of a field.
    ///
    /// Sub-fields are unpacked, array extra dimensions are flattened.
    pub fn field(&self, name: &str) -> Result<FieldView<'_>> {
        Ok(FieldView {
            data: &self.data,
            record_size: self.format.size(),
            layout: self.layout(name)?,
        })
    }

    /// Copies the values of a field, converted to `T`.
    pub fn values<T: num_traits::NumCast>(&self, name: &str) -> Result<Vec<T>> {
        self.field(name)?
            .iter()
            .map(|value| {
                <T as num_traits::NumCast>::from(value).ok_or_else(|| LasError::Overflow {
                    dimension: name.to_string(),
                    value: value.to_string(),
                    max: std::any::type_name::<T>().to_string(),
                })
            })
            .collect()
    }

    /// Sets the values of a field.
    ///
    /// When more values than points are given, the buffer grows and the
    /// new points are zero filled. Giving fewer values than points is an error.
    /// Nothing is modified if a value does not fit the field.
    pub fn set_values<T>(&mut self, name: &str, values: &[T]) -> Result<()>
    where
        T: ToPrimitive + Copy + fmt::Display,
    {
        let layout = self.layout(name)?.clone();
        let current = self.len() * layout.arity;
        if values.len() < current || values.len() % layout.arity != 0 {
            return Err(LasError::LengthMismatch {
                expected: current.max(layout.arity),
                got: values.len(),
            });
        }
        let overflow = |value: &T, max: String| LasError::Overflow {
            dimension: name.to_string(),
            value: value.to_string(),
            max,
        };

        match layout.mask {
            Some(mask) => {
                let max = layout.sub_field_max().unwrap_or(0);
                let raw = values
                    .iter()
                    .map(|v| v.to_u64().ok_or_else(|| overflow(v, max.to_string())))
                    .collect::<Result<Vec<u64>>>()?;
                dims::check_batch_fits(name, mask, &raw)?;

                self.grow_to(raw.len());
                let record_size = self.format.size();
                for (record, value) in self.data.chunks_exact_mut(record_size).zip(raw) {
                    let byte = &mut record[layout.offset];
                    *byte = dims::pack_unchecked(u64::from(*byte), value, u64::from(mask)) as u8;
                }
            }
            None => {
                let scalars = values
                    .iter()
                    .map(|v| {
                        layout
                            .storage
                            .cast(*v)
                            .ok_or_else(|| overflow(v, layout.storage.range_description()))
                    })
                    .collect::<Result<Vec<Scalar>>>()?;

                self.grow_to(scalars.len() / layout.arity);
                let record_size = self.format.size();
                let value_size = layout.storage.size();
                for (i, scalar) in scalars.iter().enumerate() {
                    let offset = (i / layout.arity) * record_size
                        + layout.offset
                        + (i % layout.arity) * value_size;
                    scalar.write_to(&mut self.data[offset..offset + value_size]);
                }
            }
        }
        Ok(())
    }

    /// Grows (never shrinks) to `count` points
    fn grow_to(&mut self, count: usize) {
        if count > self.len() {
            self.data.resize(count * self.format.size(), 0);
        }
    }

    /// Appends the points of `other`, which must have the same format
    pub fn append(&mut self, other: &PointRecords) -> Result<()> {
        if self.format != other.format {
            return Err(LasError::IncompatibleFormat {
                expected: self.format.to_string(),
                got: other.format.to_string(),
            });
        }
        self.data.extend_from_slice(&other.data);
        Ok(())
    }

    /// Copies the points in `range`
    pub fn slice(&self, range: Range<usize>) -> PointRecords {
        let size = self.format.size();
        let end = range.end.min(self.len());
        let start = range.start.min(end);
        Self {
            format: self.format.clone(),
            data: self.data[start * size..end * size].to_vec(),
        }
    }

    /// Returns the points converted to another format.
    ///
    /// Fields present in both formats are copied value by value (sub-fields are
    /// unpacked and repacked), fields missing in `new_format` are dropped, and
    /// fields new in `new_format` are zero. Fails if a value does not fit
    /// its destination field.
    pub fn convert_format(&self, new_format: &PointFormat) -> Result<PointRecords> {
        let mut converted = PointRecords::zeros(new_format.clone(), self.len());
        if self.is_empty() {
            return Ok(converted);
        }
        let names: Vec<String> = new_format.dimension_names().map(str::to_string).collect();
        for name in names {
            let (source, destination) = match (self.format.field(&name), new_format.field(&name)) {
                (Some(s), Some(d)) => (s, d),
                _ => continue,
            };
            if source.arity != destination.arity {
                continue;
            }
            let values: Vec<Scalar> = self.field(&name)?.iter().collect();
            converted.set_values(&name, &values)?;
        }
        Ok(converted)
    }

    /// Scaled `x` coordinates
    pub fn x(&self, header: &Header) -> Result<Vec<f64>> {
        self.scaled("X", 0, header)
    }

    pub fn y(&self, header: &Header) -> Result<Vec<f64>> {
        self.scaled("Y", 1, header)
    }

    pub fn z(&self, header: &Header) -> Result<Vec<f64>> {
        self.scaled("Z", 2, header)
    }

    pub fn set_x(&mut self, header: &Header, values: &[f64]) -> Result<()> {
        self.set_scaled("X", 0, header, values)
    }

    pub fn set_y(&mut self, header: &Header, values: &[f64]) -> Result<()> {
        self.set_scaled("Y", 1, header, values)
    }

    pub fn set_z(&mut self, header: &Header, values: &[f64]) -> Result<()> {
        self.set_scaled("Z", 2, header, values)
    }

    fn scaled(&self, name: &str, axis: usize, header: &Header) -> Result<Vec<f64>> {
        let (scale, offset) = (header.scales[axis], header.offsets[axis]);
        Ok(self
            .values::<i32>(name)?
            .into_iter()
            .map(|raw| f64::from(raw) * scale + offset)
            .collect())
    }

    fn set_scaled(&mut self, name: &str, axis: usize, header: &Header, values: &[f64]) -> Result<()> {
        let (scale, offset) = (header.scales[axis], header.offsets[axis]);
        let raw: Vec<f64> = values
            .iter()
            .map(|v| ((v - offset) / scale).round())
            .collect();
        self.set_values(name, &raw)
    }
}

/// Strided view over one field of a [`PointRecords`].
#[derive(Debug, Copy, Clone)]
pub struct FieldView<'a> {
    data: &'a [u8],
    record_size: usize,
    layout: &'a FieldLayout,
}

impl<'a> FieldView<'a> {
    pub fn layout(&self) -> &'a FieldLayout {
        self.layout
    }

    /// Number of values (points times arity)
    pub fn len(&self) -> usize {
        (self.data.len() / self.record_size) * self.layout.arity
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, index: usize) -> Option<Scalar> {
        if index >= self.len() {
            return None;
        }
        let record = index / self.layout.arity;
        let element = index % self.layout.arity;
        let offset = record * self.record_size
            + self.layout.offset
            + element * self.layout.storage.size();
        let value = self.layout.storage.read(&self.data[offset..]);
        Some(match self.layout.mask {
            Some(mask) => Scalar::U8(dims::unpack(u64::from(self.data[offset]), u64::from(mask)) as u8),
            None => value,
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = Scalar> + 'a {
        let view = *self;
        (0..view.len()).filter_map(move |i| view.get(i))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::las::dims::StorageType;
    use crate::las::extra_bytes::{ExtraBytesType, ExtraDimension};

    fn format(id: u8) -> PointFormat {
        PointFormat::new(id).unwrap()
    }

    #[test]
    fn test_buffer_length_invariant() {
        let points = PointRecords::zeros(format(3), 10);
        assert_eq!(points.as_bytes().len(), 340);
        assert_eq!(points.len(), 10);
        assert!(PointRecords::from_bytes(format(3), vec![0u8; 35]).is_err());
        let points = PointRecords::from_reader(&mut &[1u8; 68][..], format(3), 2).unwrap();
        assert_eq!(points.len(), 2);
    }

    #[test]
    fn test_sub_fields_are_packed_in_place() {
        let mut points = PointRecords::zeros(format(0), 3);
        points.set_values("return_number", &[1u8, 2, 3]).unwrap();
        points.set_values("number_of_returns", &[3u8, 3, 3]).unwrap();
        points.set_values("edge_of_flight_line", &[1u8, 0, 1]).unwrap();

        assert_eq!(points.values::<u8>("return_number").unwrap(), vec![1, 2, 3]);
        assert_eq!(points.values::<u8>("number_of_returns").unwrap(), vec![3, 3, 3]);
        assert_eq!(
            points.values::<u8>("bit_fields").unwrap(),
            vec![0b1001_1001, 0b0001_1010, 0b1001_1011]
        );
    }

    #[test]
    fn test_sub_field_overflow_leaves_points_untouched() {
        let mut points = PointRecords::zeros(format(6), 2);
        points.set_values("scanner_channel", &[1u8, 2]).unwrap();
        let before = points.clone();
        match points.set_values("scanner_channel", &[1u8, 2, 4]) {
            Err(LasError::Overflow { dimension, value, max }) => {
                assert_eq!(dimension, "scanner_channel");
                assert_eq!(value, "4");
                assert_eq!(max, "3");
            }
            r => panic!("unexpected {:?}", r),
        }
        assert_eq!(points, before);
    }

    #[test]
    fn test_plain_field_overflow() {
        let mut points = PointRecords::zeros(format(0), 1);
        assert!(matches!(
            points.set_values("intensity", &[70_000u32]),
            Err(LasError::Overflow { .. })
        ));
        assert!(matches!(
            points.set_values("intensity", &[-1i32]),
            Err(LasError::Overflow { .. })
        ));
    }

    #[test]
    fn test_set_values_grows_never_shrinks() {
        let mut points = PointRecords::zeros(format(1), 2);
        points.set_values("gps_time", &[1.5f64, 2.5]).unwrap();
        points.set_values("intensity", &[1u16, 2, 3, 4]).unwrap();
        assert_eq!(points.len(), 4);
        assert_eq!(
            points.values::<f64>("gps_time").unwrap(),
            vec![1.5, 2.5, 0.0, 0.0]
        );
        match points.set_values("intensity", &[1u16]) {
            Err(LasError::LengthMismatch { expected: 4, got: 1 }) => {}
            r => panic!("unexpected {:?}", r),
        }
    }

    #[test]
    fn test_unknown_dimension() {
        let points = PointRecords::zeros(format(0), 1);
        assert!(matches!(
            points.field("red"),
            Err(LasError::UnknownDimension(name)) if name == "red"
        ));
    }

    #[test]
    fn test_array_extra_dimension() {
        let format = PointFormat::with_extra_dimensions(
            0,
            vec![ExtraDimension::new(
                "normal",
                ExtraBytesType::Array(StorageType::F32, 3),
            )],
        )
        .unwrap();
        let mut points = PointRecords::zeros(format, 0);
        points
            .set_values("normal", &[0.0f32, 0.0, 1.0, 1.0, 0.0, 0.0])
            .unwrap();
        assert_eq!(points.len(), 2);
        let view = points.field("normal").unwrap();
        assert_eq!(view.len(), 6);
        assert_eq!(view.get(2), Some(Scalar::F32(1.0)));
        assert_eq!(view.get(3), Some(Scalar::F32(1.0)));
        assert!(points.set_values("normal", &[1.0f32; 7]).is_err());
    }

    #[test]
    fn test_convert_format_3_to_0_and_back() {
        let mut points = PointRecords::zeros(format(3), 2);
        points.set_values("X", &[10i32, -20]).unwrap();
        points.set_values("classification", &[2u8, 9]).unwrap();
        points.set_values("gps_time", &[42.0f64, 43.0]).unwrap();
        points.set_values("red", &[100u16, 200]).unwrap();

        let as_0 = points.convert_format(&format(0)).unwrap();
        assert_eq!(as_0.as_bytes().len(), 40);
        assert_eq!(as_0.values::<i32>("X").unwrap(), vec![10, -20]);

        let back = as_0.convert_format(&format(3)).unwrap();
        assert_eq!(back.values::<u8>("classification").unwrap(), vec![2, 9]);
        assert_eq!(back.values::<f64>("gps_time").unwrap(), vec![0.0, 0.0]);
        assert_eq!(back.values::<u16>("red").unwrap(), vec![0, 0]);
    }

    #[test]
    fn test_convert_format_repacks_sub_fields() {
        let mut points = PointRecords::zeros(format(1), 1);
        points.set_values("return_number", &[3u8]).unwrap();
        points.set_values("number_of_returns", &[5u8]).unwrap();
        points.set_values("withheld", &[1u8]).unwrap();

        let as_6 = points.convert_format(&format(6)).unwrap();
        assert_eq!(as_6.values::<u8>("bit_fields").unwrap(), vec![0x53]);
        assert_eq!(as_6.values::<u8>("withheld").unwrap(), vec![1]);

        let mut points = PointRecords::zeros(format(6), 1);
        points.set_values("number_of_returns", &[12u8]).unwrap();
        assert!(matches!(
            points.convert_format(&format(1)),
            Err(LasError::Overflow { .. })
        ));
    }

    #[test]
    fn test_scaled_coordinates() {
        let mut header = Header::default();
        header.scales = [0.01, 0.01, 0.001];
        header.offsets = [1000.0, 0.0, 0.0];
        let mut points = PointRecords::zeros(format(0), 0);
        points.set_x(&header, &[1000.5, 1001.25]).unwrap();
        assert_eq!(points.values::<i32>("X").unwrap(), vec![50, 125]);
        let x = points.x(&header).unwrap();
        assert!((x[1] - 1001.25).abs() < 1e-9);
    }

    #[test]
    fn test_append_and_slice() {
        let mut a = PointRecords::zeros(format(0), 2);
        a.set_values("intensity", &[1u16, 2]).unwrap();
        let mut b = PointRecords::zeros(format(0), 1);
        b.set_values("intensity", &[3u16]).unwrap();
        a.append(&b).unwrap();
        assert_eq!(a.values::<u16>("intensity").unwrap(), vec![1, 2, 3]);
        assert_eq!(a.slice(1..3).values::<u16>("intensity").unwrap(), vec![2, 3]);
        assert!(a.append(&PointRecords::zeros(format(1), 1)).is_err());
    }
}
