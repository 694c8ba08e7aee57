//! Catalog of the LAS point formats and of their byte layout.

use std::collections::BTreeSet;
use std::fmt;

use crate::errors::{LasError, Result};
use crate::las::dims::{self, DimensionSpec, StorageType};
use crate::las::extra_bytes::ExtraDimension;
use crate::las::header::Version;

use dims::{
    BIT_FIELDS, BLUE, CLASSIFICATION, CLASSIFICATION_FLAGS, GPS_TIME, GREEN, INTENSITY,
    LEGACY_BIT_FIELDS, LEGACY_RAW_CLASSIFICATION, NIR, POINT_SOURCE_ID, RED,
    RETURN_POINT_WAVE_LOCATION, SCAN_ANGLE, SCAN_ANGLE_RANK, USER_DATA, WAVEPACKET_INDEX,
    WAVEPACKET_OFFSET, WAVEPACKET_SIZE, X, X_T, Y, Y_T, Z, Z_T,
};

/// Greatest point format id defined by the LAS specification
pub const MAX_POINT_FORMAT_ID: u8 = 10;

const IS_COMPRESSED_MASK: u8 = 0x80;
// Some writers flag compression with bit 6 instead of bit 7
const IS_COMPRESSED_OLD_MASK: u8 = 0x40;

const POINT_0: &[DimensionSpec] = &[
    X,
    Y,
    Z,
    INTENSITY,
    LEGACY_BIT_FIELDS,
    LEGACY_RAW_CLASSIFICATION,
    SCAN_ANGLE_RANK,
    USER_DATA,
    POINT_SOURCE_ID,
];
const POINT_1: &[DimensionSpec] = &[
    X,
    Y,
    Z,
    INTENSITY,
    LEGACY_BIT_FIELDS,
    LEGACY_RAW_CLASSIFICATION,
    SCAN_ANGLE_RANK,
    USER_DATA,
    POINT_SOURCE_ID,
    GPS_TIME,
];
const POINT_2: &[DimensionSpec] = &[
    X,
    Y,
    Z,
    INTENSITY,
    LEGACY_BIT_FIELDS,
    LEGACY_RAW_CLASSIFICATION,
    SCAN_ANGLE_RANK,
    USER_DATA,
    POINT_SOURCE_ID,
    RED,
    GREEN,
    BLUE,
];
const POINT_3: &[DimensionSpec] = &[
    X,
    Y,
    Z,
    INTENSITY,
    LEGACY_BIT_FIELDS,
    LEGACY_RAW_CLASSIFICATION,
    SCAN_ANGLE_RANK,
    USER_DATA,
    POINT_SOURCE_ID,
    GPS_TIME,
    RED,
    GREEN,
    BLUE,
];
const POINT_4: &[DimensionSpec] = &[
    X,
    Y,
    Z,
    INTENSITY,
    LEGACY_BIT_FIELDS,
    LEGACY_RAW_CLASSIFICATION,
    SCAN_ANGLE_RANK,
    USER_DATA,
    POINT_SOURCE_ID,
    GPS_TIME,
    WAVEPACKET_INDEX,
    WAVEPACKET_OFFSET,
    WAVEPACKET_SIZE,
    RETURN_POINT_WAVE_LOCATION,
    X_T,
    Y_T,
    Z_T,
];
const POINT_5: &[DimensionSpec] = &[
    X,
    Y,
    Z,
    INTENSITY,
    LEGACY_BIT_FIELDS,
    LEGACY_RAW_CLASSIFICATION,
    SCAN_ANGLE_RANK,
    USER_DATA,
    POINT_SOURCE_ID,
    GPS_TIME,
    RED,
    GREEN,
    BLUE,
    WAVEPACKET_INDEX,
    WAVEPACKET_OFFSET,
    WAVEPACKET_SIZE,
    RETURN_POINT_WAVE_LOCATION,
    X_T,
    Y_T,
    Z_T,
];
const POINT_6: &[DimensionSpec] = &[
    X,
    Y,
    Z,
    INTENSITY,
    BIT_FIELDS,
    CLASSIFICATION_FLAGS,
    CLASSIFICATION,
    USER_DATA,
    SCAN_ANGLE,
    POINT_SOURCE_ID,
    GPS_TIME,
];
const POINT_7: &[DimensionSpec] = &[
    X,
    Y,
    Z,
    INTENSITY,
    BIT_FIELDS,
    CLASSIFICATION_FLAGS,
    CLASSIFICATION,
    USER_DATA,
    SCAN_ANGLE,
    POINT_SOURCE_ID,
    GPS_TIME,
    RED,
    GREEN,
    BLUE,
];
const POINT_8: &[DimensionSpec] = &[
    X,
    Y,
    Z,
    INTENSITY,
    BIT_FIELDS,
    CLASSIFICATION_FLAGS,
    CLASSIFICATION,
    USER_DATA,
    SCAN_ANGLE,
    POINT_SOURCE_ID,
    GPS_TIME,
    RED,
    GREEN,
    BLUE,
    NIR,
];
const POINT_9: &[DimensionSpec] = &[
    X,
    Y,
    Z,
    INTENSITY,
    BIT_FIELDS,
    CLASSIFICATION_FLAGS,
    CLASSIFICATION,
    USER_DATA,
    SCAN_ANGLE,
    POINT_SOURCE_ID,
    GPS_TIME,
    WAVEPACKET_INDEX,
    WAVEPACKET_OFFSET,
    WAVEPACKET_SIZE,
    RETURN_POINT_WAVE_LOCATION,
    X_T,
    Y_T,
    Z_T,
];
const POINT_10: &[DimensionSpec] = &[
    X,
    Y,
    Z,
    INTENSITY,
    BIT_FIELDS,
    CLASSIFICATION_FLAGS,
    CLASSIFICATION,
    USER_DATA,
    SCAN_ANGLE,
    POINT_SOURCE_ID,
    GPS_TIME,
    RED,
    GREEN,
    BLUE,
    NIR,
    WAVEPACKET_INDEX,
    WAVEPACKET_OFFSET,
    WAVEPACKET_SIZE,
    RETURN_POINT_WAVE_LOCATION,
    X_T,
    Y_T,
    Z_T,
];

/// Returns the standard dimensions of the point format, in record order.
pub fn standard_dimensions(point_format_id: u8) -> Result<&'static [DimensionSpec]> {
    match point_format_id {
        0 => Ok(POINT_0),
        1 => Ok(POINT_1),
        2 => Ok(POINT_2),
        3 => Ok(POINT_3),
        4 => Ok(POINT_4),
        5 => Ok(POINT_5),
        6 => Ok(POINT_6),
        7 => Ok(POINT_7),
        8 => Ok(POINT_8),
        9 => Ok(POINT_9),
        10 => Ok(POINT_10),
        _ => Err(LasError::PointFormatNotSupported {
            id: point_format_id,
            version: None,
        }),
    }
}

/// Size in bytes of a record of the point format without extra bytes.
pub fn standard_size(point_format_id: u8) -> Result<usize> {
    Ok(standard_dimensions(point_format_id)?
        .iter()
        .map(DimensionSpec::size)
        .sum())
}

/// Size in bytes of a record of the point format with the given extra dimensions.
pub fn dtype_size(point_format_id: u8, extra_dimensions: &[ExtraDimension]) -> Result<usize> {
    Ok(standard_size(point_format_id)?
        + extra_dimensions
            .iter()
            .map(ExtraDimension::size)
            .sum::<usize>())
}

/// Lowest file version able to store the point format.
pub fn min_version_for(point_format_id: u8) -> Result<Version> {
    match point_format_id {
        0 | 1 => Ok(Version::V1_1),
        2 | 3 => Ok(Version::V1_2),
        4 | 5 => Ok(Version::V1_3),
        6..=MAX_POINT_FORMAT_ID => Ok(Version::V1_4),
        _ => Err(LasError::PointFormatNotSupported {
            id: point_format_id,
            version: None,
        }),
    }
}

pub fn is_point_format_supported_by(point_format_id: u8, version: Version) -> bool {
    min_version_for(point_format_id)
        .map(|min_version| min_version <= version)
        .unwrap_or(false)
}

/// Names of the (unpacked) dimensions of `from` that do not exist in `to`.
///
/// These are the dimensions whose values are dropped when converting
/// points from one format to the other.
pub fn dimensions_lost(from: u8, to: u8) -> Result<BTreeSet<String>> {
    let from_names = unpacked_names(standard_dimensions(from)?);
    let to_names = unpacked_names(standard_dimensions(to)?);
    Ok(from_names.difference(&to_names).cloned().collect())
}

fn unpacked_names(dimensions: &[DimensionSpec]) -> BTreeSet<String> {
    let mut names = BTreeSet::new();
    for dimension in dimensions {
        match dimension {
            DimensionSpec::Plain { name, .. } => {
                names.insert(name.to_string());
            }
            DimensionSpec::Composite { sub_fields, .. } => {
                names.extend(sub_fields.iter().map(|f| f.name.to_string()));
            }
        }
    }
    names
}

pub fn is_point_format_compressed(raw_point_format_id: u8) -> bool {
    raw_point_format_id & IS_COMPRESSED_MASK == IS_COMPRESSED_MASK
        || raw_point_format_id & IS_COMPRESSED_OLD_MASK == IS_COMPRESSED_OLD_MASK
}

pub fn point_format_id_compressed_to_uncompressed(raw_point_format_id: u8) -> u8 {
    raw_point_format_id & 0x3f
}

pub fn point_format_id_uncompressed_to_compressed(point_format_id: u8) -> u8 {
    point_format_id | IS_COMPRESSED_MASK
}

/// Where a field lives inside a point record.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldLayout {
    pub name: String,
    pub storage: StorageType,
    /// Byte offset inside the record
    pub offset: usize,
    /// Number of values of `storage` type (> 1 only for array extra dimensions)
    pub arity: usize,
    /// Mask selecting the field's bits, for sub-fields of composite bytes
    pub mask: Option<u8>,
}

impl FieldLayout {
    /// Size in bytes taken in the record. Sub-fields share their byte with others.
    pub fn size(&self) -> usize {
        self.storage.size() * self.arity
    }

    pub fn is_sub_field(&self) -> bool {
        self.mask.is_some()
    }

    /// Greatest value a sub-field can hold
    pub fn sub_field_max(&self) -> Option<u64> {
        self.mask
            .map(|mask| u64::from(mask) >> mask.trailing_zeros())
    }
}

/// A point format: the standard dimensions of the format `id`
/// followed by optional extra dimensions.
///
/// The accessor table (name -> layout) is computed once at construction.
#[derive(Debug, Clone)]
pub struct PointFormat {
    id: u8,
    extra_dimensions: Vec<ExtraDimension>,
    fields: Vec<FieldLayout>,
    size: usize,
}

impl PointFormat {
    pub fn new(id: u8) -> Result<Self> {
        Self::with_extra_dimensions(id, vec![])
    }

    pub fn with_extra_dimensions(id: u8, extra_dimensions: Vec<ExtraDimension>) -> Result<Self> {
        let standard = standard_dimensions(id)?;
        let mut fields = Vec::with_capacity(standard.len() + extra_dimensions.len());
        let mut offset = 0usize;
        for dimension in standard {
            fields.push(FieldLayout {
                name: dimension.name().to_string(),
                storage: dimension.storage(),
                offset,
                arity: 1,
                mask: None,
            });
            for sub_field in dimension.sub_fields() {
                fields.push(FieldLayout {
                    name: sub_field.name.to_string(),
                    storage: StorageType::U8,
                    offset,
                    arity: 1,
                    mask: Some(sub_field.mask),
                });
            }
            offset += dimension.size();
        }
        for extra in &extra_dimensions {
            fields.push(FieldLayout {
                name: extra.name.clone(),
                storage: extra.data_type.storage(),
                offset,
                arity: extra.data_type.arity(),
                mask: None,
            });
            offset += extra.size();
        }
        Ok(Self {
            id,
            extra_dimensions,
            fields,
            size: offset,
        })
    }

    /// Builds the format of records of `record_length` bytes when
    /// no extra-bytes description is available.
    ///
    /// Bytes beyond the standard size become one undocumented extra dimension.
    pub fn from_record_length(id: u8, record_length: u16) -> Result<Self> {
        let standard_size = standard_size(id)?;
        let record_length = usize::from(record_length);
        if record_length < standard_size {
            return Err(LasError::PointFormatNotSupported { id, version: None });
        }
        let num_extra_bytes = record_length - standard_size;
        if num_extra_bytes == 0 {
            Self::new(id)
        } else {
            Self::with_extra_dimensions(id, ExtraDimension::undocumented_blocks(num_extra_bytes))
        }
    }

    pub fn id(&self) -> u8 {
        self.id
    }

    /// Size in bytes of one record
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn standard_size(&self) -> usize {
        self.size - self.num_extra_bytes()
    }

    pub fn num_extra_bytes(&self) -> usize {
        self.extra_dimensions.iter().map(ExtraDimension::size).sum()
    }

    pub fn extra_dimensions(&self) -> &[ExtraDimension] {
        &self.extra_dimensions
    }

    pub fn standard_dimensions(&self) -> &'static [DimensionSpec] {
        // The id was validated at construction.
        standard_dimensions(self.id).unwrap_or(&[])
    }

    /// All accessible fields: standard dimensions, composite bytes,
    /// their sub-fields, and extra dimensions.
    pub fn fields(&self) -> &[FieldLayout] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&FieldLayout> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Names of the dimensions as a user sees them, composite bytes excluded.
    pub fn dimension_names(&self) -> impl Iterator<Item = &str> {
        let composites: BTreeSet<&'static str> = self
            .standard_dimensions()
            .iter()
            .filter(|d| !d.sub_fields().is_empty())
            .map(DimensionSpec::name)
            .collect();
        self.fields
            .iter()
            .filter(move |f| f.mask.is_some() || !composites.contains(f.name.as_str()))
            .map(|f| f.name.as_str())
    }

    pub fn has_gps_time(&self) -> bool {
        self.id != 0 && self.id != 2
    }

    pub fn has_rgb(&self) -> bool {
        matches!(self.id, 2 | 3 | 5 | 7 | 8 | 10)
    }

    pub fn has_nir(&self) -> bool {
        matches!(self.id, 8 | 10)
    }

    pub fn has_waveform(&self) -> bool {
        matches!(self.id, 4 | 5 | 9 | 10)
    }

    /// Formats 6 to 10, introduced in LAS 1.4
    pub fn is_extended(&self) -> bool {
        self.id >= 6
    }

    pub fn min_version(&self) -> Version {
        // The id was validated at construction.
        min_version_for(self.id).unwrap_or(Version::V1_4)
    }

    pub fn is_supported_by(&self, version: Version) -> bool {
        self.min_version() <= version
    }
}

impl PartialEq for PointFormat {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && self.extra_dimensions == other.extra_dimensions
    }
}

impl Eq for PointFormat {}

impl fmt::Display for PointFormat {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.id)?;
        if !self.extra_dimensions.is_empty() {
            write!(f, " (+ {} extra bytes)", self.num_extra_bytes())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::las::extra_bytes::ExtraBytesType;

    #[test]
    fn test_standard_sizes() {
        let expected = [20, 28, 26, 34, 57, 63, 30, 36, 38, 59, 67];
        for (id, size) in expected.iter().enumerate() {
            assert_eq!(standard_size(id as u8).unwrap(), *size, "format {}", id);
            assert_eq!(PointFormat::new(id as u8).unwrap().size(), *size);
        }
        assert!(standard_size(11).is_err());
    }

    #[test]
    fn test_dtype_size_with_extra_dimensions() {
        let extras = vec![
            ExtraDimension::new("height", ExtraBytesType::Scalar(StorageType::F64)),
            ExtraDimension::new("normal", ExtraBytesType::Array(StorageType::F32, 3)),
        ];
        assert_eq!(dtype_size(3, &extras).unwrap(), 34 + 8 + 12);
    }

    #[test]
    fn test_sub_fields_share_composite_offset() {
        let format = PointFormat::new(6).unwrap();
        let bit_fields = format.field("bit_fields").unwrap();
        let return_number = format.field("return_number").unwrap();
        let number_of_returns = format.field("number_of_returns").unwrap();
        assert_eq!(bit_fields.offset, 14);
        assert_eq!(return_number.offset, 14);
        assert_eq!(number_of_returns.mask, Some(0xF0));
        assert_eq!(format.field("gps_time").unwrap().offset, 22);
    }

    #[test]
    fn test_dimensions_lost() {
        let lost = dimensions_lost(3, 0).unwrap();
        let expected: BTreeSet<String> = ["gps_time", "red", "green", "blue"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(lost, expected);
        assert!(dimensions_lost(0, 3).unwrap().is_empty());
    }

    #[test]
    fn test_min_versions() {
        assert_eq!(min_version_for(1).unwrap(), Version::V1_1);
        assert_eq!(min_version_for(3).unwrap(), Version::V1_2);
        assert_eq!(min_version_for(5).unwrap(), Version::V1_3);
        assert_eq!(min_version_for(8).unwrap(), Version::V1_4);
        assert!(!is_point_format_supported_by(6, Version::V1_2));
        assert!(is_point_format_supported_by(2, Version::V1_4));
    }

    #[test]
    fn test_equality_includes_extra_dimensions() {
        let plain = PointFormat::new(3).unwrap();
        let with_extra = PointFormat::with_extra_dimensions(
            3,
            vec![ExtraDimension::new(
                "height",
                ExtraBytesType::Scalar(StorageType::F64),
            )],
        )
        .unwrap();
        assert_ne!(plain, with_extra);
        assert_eq!(plain, PointFormat::new(3).unwrap());
    }

    #[test]
    fn test_dimension_names_exclude_composites() {
        let format = PointFormat::new(0).unwrap();
        let names: Vec<&str> = format.dimension_names().collect();
        assert!(names.contains(&"return_number"));
        assert!(names.contains(&"classification"));
        assert!(!names.contains(&"bit_fields"));
        assert!(!names.contains(&"raw_classification"));
    }

    #[test]
    fn test_compressed_ids() {
        assert!(is_point_format_compressed(0x83));
        assert!(!is_point_format_compressed(3));
        assert_eq!(point_format_id_compressed_to_uncompressed(0x83), 3);
        assert_eq!(point_format_id_uncompressed_to_compressed(3), 0x83);
    }
}
