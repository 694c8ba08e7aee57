//! Registry of the dimensions (fields) that make up LAS point records.
//!
//! Some dimensions are stored on their own (e.g. `intensity`), others are
//! *sub-fields* of a composite byte (e.g. `return_number` lives in the low bits of
//! `bit_fields`). Sub-fields are accessed with [`unpack`] and [`pack`].

use std::fmt;

use num_traits::ToPrimitive;

use crate::errors::{LasError, Result};
use crate::packers::Packable;

/// The types a dimension can be stored as.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum StorageType {
    U8,
    I8,
    U16,
    I16,
    U32,
    I32,
    U64,
    I64,
    F32,
    F64,
}

impl StorageType {
    /// Size in bytes
    pub fn size(self) -> usize {
        match self {
            StorageType::U8 | StorageType::I8 => 1,
            StorageType::U16 | StorageType::I16 => 2,
            StorageType::U32 | StorageType::I32 | StorageType::F32 => 4,
            StorageType::U64 | StorageType::I64 | StorageType::F64 => 8,
        }
    }

    pub fn is_float(self) -> bool {
        matches!(self, StorageType::F32 | StorageType::F64)
    }

    /// Reads a value of this type from the start of `input`.
    pub(crate) fn read(self, input: &[u8]) -> Scalar {
        match self {
            StorageType::U8 => Scalar::U8(u8::unpack_from(input)),
            StorageType::I8 => Scalar::I8(i8::unpack_from(input)),
            StorageType::U16 => Scalar::U16(u16::unpack_from(input)),
            StorageType::I16 => Scalar::I16(i16::unpack_from(input)),
            StorageType::U32 => Scalar::U32(u32::unpack_from(input)),
            StorageType::I32 => Scalar::I32(i32::unpack_from(input)),
            StorageType::U64 => Scalar::U64(u64::unpack_from(input)),
            StorageType::I64 => Scalar::I64(i64::unpack_from(input)),
            StorageType::F32 => Scalar::F32(f32::unpack_from(input)),
            StorageType::F64 => Scalar::F64(f64::unpack_from(input)),
        }
    }

    /// Converts `value` to this type, `None` if it is not representable.
    pub(crate) fn cast<T: ToPrimitive>(self, value: T) -> Option<Scalar> {
        Some(match self {
            StorageType::U8 => Scalar::U8(value.to_u8()?),
            StorageType::I8 => Scalar::I8(value.to_i8()?),
            StorageType::U16 => Scalar::U16(value.to_u16()?),
            StorageType::I16 => Scalar::I16(value.to_i16()?),
            StorageType::U32 => Scalar::U32(value.to_u32()?),
            StorageType::I32 => Scalar::I32(value.to_i32()?),
            StorageType::U64 => Scalar::U64(value.to_u64()?),
            StorageType::I64 => Scalar::I64(value.to_i64()?),
            StorageType::F32 => Scalar::F32(value.to_f32()?),
            StorageType::F64 => Scalar::F64(value.to_f64()?),
        })
    }

    /// Human readable range, used in error messages.
    pub(crate) fn range_description(self) -> String {
        match self {
            StorageType::U8 => format!("{}", u8::MAX),
            StorageType::I8 => format!("[{}, {}]", i8::MIN, i8::MAX),
            StorageType::U16 => format!("{}", u16::MAX),
            StorageType::I16 => format!("[{}, {}]", i16::MIN, i16::MAX),
            StorageType::U32 => format!("{}", u32::MAX),
            StorageType::I32 => format!("[{}, {}]", i32::MIN, i32::MAX),
            StorageType::U64 => format!("{}", u64::MAX),
            StorageType::I64 => format!("[{}, {}]", i64::MIN, i64::MAX),
            StorageType::F32 => format!("{}", f32::MAX),
            StorageType::F64 => format!("{}", f64::MAX),
        }
    }
}

impl fmt::Display for StorageType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            StorageType::U8 => "u8",
            StorageType::I8 => "i8",
            StorageType::U16 => "u16",
            StorageType::I16 => "i16",
            StorageType::U32 => "u32",
            StorageType::I32 => "i32",
            StorageType::U64 => "u64",
            StorageType::I64 => "i64",
            StorageType::F32 => "f32",
            StorageType::F64 => "f64",
        };
        f.write_str(name)
    }
}

/// A single value read from a point record.
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum Scalar {
    U8(u8),
    I8(i8),
    U16(u16),
    I16(i16),
    U32(u32),
    I32(i32),
    U64(u64),
    I64(i64),
    F32(f32),
    F64(f64),
}

impl Scalar {
    pub fn storage_type(&self) -> StorageType {
        match self {
            Scalar::U8(_) => StorageType::U8,
            Scalar::I8(_) => StorageType::I8,
            Scalar::U16(_) => StorageType::U16,
            Scalar::I16(_) => StorageType::I16,
            Scalar::U32(_) => StorageType::U32,
            Scalar::I32(_) => StorageType::I32,
            Scalar::U64(_) => StorageType::U64,
            Scalar::I64(_) => StorageType::I64,
            Scalar::F32(_) => StorageType::F32,
            Scalar::F64(_) => StorageType::F64,
        }
    }

    pub(crate) fn write_to(&self, output: &mut [u8]) {
        match self {
            Scalar::U8(v) => v.pack_into(output),
            Scalar::I8(v) => v.pack_into(output),
            Scalar::U16(v) => v.pack_into(output),
            Scalar::I16(v) => v.pack_into(output),
            Scalar::U32(v) => v.pack_into(output),
            Scalar::I32(v) => v.pack_into(output),
            Scalar::U64(v) => v.pack_into(output),
            Scalar::I64(v) => v.pack_into(output),
            Scalar::F32(v) => v.pack_into(output),
            Scalar::F64(v) => v.pack_into(output),
        }
    }
}

macro_rules! forward_to_primitive {
    ($($fn_name:ident -> $ret:ty),*) => {
        $(
            fn $fn_name(&self) -> Option<$ret> {
                match *self {
                    Scalar::U8(v) => v.$fn_name(),
                    Scalar::I8(v) => v.$fn_name(),
                    Scalar::U16(v) => v.$fn_name(),
                    Scalar::I16(v) => v.$fn_name(),
                    Scalar::U32(v) => v.$fn_name(),
                    Scalar::I32(v) => v.$fn_name(),
                    Scalar::U64(v) => v.$fn_name(),
                    Scalar::I64(v) => v.$fn_name(),
                    Scalar::F32(v) => v.$fn_name(),
                    Scalar::F64(v) => v.$fn_name(),
                }
            }
        )*
    };
}

impl ToPrimitive for Scalar {
    forward_to_primitive!(to_i64 -> i64, to_u64 -> u64, to_f64 -> f64, to_f32 -> f32);
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Scalar::U8(v) => write!(f, "{}", v),
            Scalar::I8(v) => write!(f, "{}", v),
            Scalar::U16(v) => write!(f, "{}", v),
            Scalar::I16(v) => write!(f, "{}", v),
            Scalar::U32(v) => write!(f, "{}", v),
            Scalar::I32(v) => write!(f, "{}", v),
            Scalar::U64(v) => write!(f, "{}", v),
            Scalar::I64(v) => write!(f, "{}", v),
            Scalar::F32(v) => write!(f, "{}", v),
            Scalar::F64(v) => write!(f, "{}", v),
        }
    }
}

/// A named group of bits inside a composite dimension.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct SubFieldSpec {
    pub name: &'static str,
    pub mask: u8,
}

impl SubFieldSpec {
    /// Greatest value the sub-field can hold.
    pub fn max_value(&self) -> u64 {
        u64::from(self.mask) >> self.mask.trailing_zeros()
    }
}

/// Description of one dimension as stored in a point record.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum DimensionSpec {
    Plain {
        name: &'static str,
        storage: StorageType,
    },
    /// A byte that packs several sub-fields.
    Composite {
        name: &'static str,
        sub_fields: &'static [SubFieldSpec],
    },
}

impl DimensionSpec {
    pub fn name(&self) -> &'static str {
        match self {
            DimensionSpec::Plain { name, .. } | DimensionSpec::Composite { name, .. } => name,
        }
    }

    pub fn storage(&self) -> StorageType {
        match self {
            DimensionSpec::Plain { storage, .. } => *storage,
            DimensionSpec::Composite { .. } => StorageType::U8,
        }
    }

    pub fn size(&self) -> usize {
        self.storage().size()
    }

    pub fn sub_fields(&self) -> &'static [SubFieldSpec] {
        match self {
            DimensionSpec::Plain { .. } => &[],
            DimensionSpec::Composite { sub_fields, .. } => sub_fields,
        }
    }
}

const fn plain(name: &'static str, storage: StorageType) -> DimensionSpec {
    DimensionSpec::Plain { name, storage }
}

const fn sub(name: &'static str, mask: u8) -> SubFieldSpec {
    SubFieldSpec { name, mask }
}

pub const X: DimensionSpec = plain("X", StorageType::I32);
pub const Y: DimensionSpec = plain("Y", StorageType::I32);
pub const Z: DimensionSpec = plain("Z", StorageType::I32);
pub const INTENSITY: DimensionSpec = plain("intensity", StorageType::U16);
pub const SCAN_ANGLE_RANK: DimensionSpec = plain("scan_angle_rank", StorageType::I8);
pub const SCAN_ANGLE: DimensionSpec = plain("scan_angle", StorageType::I16);
pub const CLASSIFICATION: DimensionSpec = plain("classification", StorageType::U8);
pub const USER_DATA: DimensionSpec = plain("user_data", StorageType::U8);
pub const POINT_SOURCE_ID: DimensionSpec = plain("point_source_id", StorageType::U16);
pub const GPS_TIME: DimensionSpec = plain("gps_time", StorageType::F64);
pub const RED: DimensionSpec = plain("red", StorageType::U16);
pub const GREEN: DimensionSpec = plain("green", StorageType::U16);
pub const BLUE: DimensionSpec = plain("blue", StorageType::U16);
pub const NIR: DimensionSpec = plain("nir", StorageType::U16);
pub const WAVEPACKET_INDEX: DimensionSpec = plain("wavepacket_index", StorageType::U8);
pub const WAVEPACKET_OFFSET: DimensionSpec = plain("wavepacket_offset", StorageType::U64);
pub const WAVEPACKET_SIZE: DimensionSpec = plain("wavepacket_size", StorageType::U32);
pub const RETURN_POINT_WAVE_LOCATION: DimensionSpec =
    plain("return_point_wave_location", StorageType::F32);
pub const X_T: DimensionSpec = plain("x_t", StorageType::F32);
pub const Y_T: DimensionSpec = plain("y_t", StorageType::F32);
pub const Z_T: DimensionSpec = plain("z_t", StorageType::F32);

/// `bit_fields` of point formats 0 to 5
pub const LEGACY_BIT_FIELDS: DimensionSpec = DimensionSpec::Composite {
    name: "bit_fields",
    sub_fields: &[
        sub("return_number", 0b0000_0111),
        sub("number_of_returns", 0b0011_1000),
        sub("scan_direction_flag", 0b0100_0000),
        sub("edge_of_flight_line", 0b1000_0000),
    ],
};

/// `raw_classification` of point formats 0 to 5
pub const LEGACY_RAW_CLASSIFICATION: DimensionSpec = DimensionSpec::Composite {
    name: "raw_classification",
    sub_fields: &[
        sub("classification", 0b0001_1111),
        sub("synthetic", 0b0010_0000),
        sub("key_point", 0b0100_0000),
        sub("withheld", 0b1000_0000),
    ],
};

/// `bit_fields` of point formats 6 to 10
pub const BIT_FIELDS: DimensionSpec = DimensionSpec::Composite {
    name: "bit_fields",
    sub_fields: &[
        sub("return_number", 0b0000_1111),
        sub("number_of_returns", 0b1111_0000),
    ],
};

/// `classification_flags` of point formats 6 to 10
pub const CLASSIFICATION_FLAGS: DimensionSpec = DimensionSpec::Composite {
    name: "classification_flags",
    sub_fields: &[
        sub("synthetic", 0b0000_0001),
        sub("key_point", 0b0000_0010),
        sub("withheld", 0b0000_0100),
        sub("overlap", 0b0000_1000),
        sub("scanner_channel", 0b0011_0000),
        sub("scan_direction_flag", 0b0100_0000),
        sub("edge_of_flight_line", 0b1000_0000),
    ],
};

pub const WAVEPACKET_DIMENSIONS: [DimensionSpec; 7] = [
    WAVEPACKET_INDEX,
    WAVEPACKET_OFFSET,
    WAVEPACKET_SIZE,
    RETURN_POINT_WAVE_LOCATION,
    X_T,
    Y_T,
    Z_T,
];

/// Extracts the sub-field selected by `mask` from `value`.
#[inline]
pub fn unpack(value: u64, mask: u64) -> u64 {
    debug_assert_ne!(mask, 0);
    (value & mask) >> mask.trailing_zeros()
}

/// Stores `sub_value` in the bits of `composite` selected by `mask`.
///
/// Fails if `sub_value` needs more bits than the mask has.
#[inline]
pub fn pack(composite: u64, sub_value: u64, mask: u64) -> Result<u64> {
    let max = mask >> mask.trailing_zeros();
    if sub_value > max {
        return Err(LasError::Overflow {
            dimension: format!("sub-field with mask {:#x}", mask),
            value: sub_value.to_string(),
            max: max.to_string(),
        });
    }
    Ok(pack_unchecked(composite, sub_value, mask))
}

/// [`pack`] for values already known to fit.
#[inline]
pub(crate) fn pack_unchecked(composite: u64, sub_value: u64, mask: u64) -> u64 {
    (composite & !mask) | ((sub_value << mask.trailing_zeros()) & mask)
}

/// Checks once for a whole batch that every value fits the sub-field.
pub(crate) fn check_batch_fits(name: &str, mask: u8, values: &[u64]) -> Result<()> {
    let max = u64::from(mask) >> mask.trailing_zeros();
    match values.iter().copied().max() {
        Some(biggest) if biggest > max => Err(LasError::Overflow {
            dimension: name.to_string(),
            value: biggest.to_string(),
            max: max.to_string(),
        }),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod test {
    use proptest::prelude::*;

    use super::*;

    const COMPOSITES: [DimensionSpec; 4] = [
        LEGACY_BIT_FIELDS,
        LEGACY_RAW_CLASSIFICATION,
        BIT_FIELDS,
        CLASSIFICATION_FLAGS,
    ];

    #[test]
    fn test_sub_field_masks_do_not_overlap() {
        for composite in &COMPOSITES {
            let mut seen = 0u8;
            for field in composite.sub_fields() {
                assert_eq!(
                    seen & field.mask,
                    0,
                    "{} overlaps in {}",
                    field.name,
                    composite.name()
                );
                seen |= field.mask;
            }
        }
    }

    #[test]
    fn test_unpack() {
        assert_eq!(unpack(0b0011_1010, 0b0011_1000), 0b111);
        assert_eq!(unpack(0b0011_1010, 0b0000_0111), 0b010);
        assert_eq!(unpack(0x80, 0x80), 1);
    }

    #[test]
    fn test_pack_keeps_other_bits() {
        let composite = 0b1100_0001;
        let packed = pack(composite, 5, 0b0011_1000).unwrap();
        assert_eq!(packed, 0b1110_1001);
        assert_eq!(unpack(packed, 0b0011_1000), 5);
        assert_eq!(unpack(packed, 0b0000_0111), 1);
    }

    #[test]
    fn test_pack_overflow() {
        let err = pack(0, 8, 0b0000_0111).unwrap_err();
        match err {
            LasError::Overflow { value, max, .. } => {
                assert_eq!(value, "8");
                assert_eq!(max, "7");
            }
            e => panic!("unexpected error {:?}", e),
        }
    }

    #[test]
    fn test_batch_check_reports_biggest_value() {
        let field = sub("scanner_channel", 0b0011_0000);
        assert!(check_batch_fits(field.name, field.mask, &[0, 1, 2, 3]).is_ok());
        let err = check_batch_fits(field.name, field.mask, &[0, 9, 4]).unwrap_err();
        assert!(err.to_string().contains("Value 9"));
        assert!(err.to_string().contains("max allowed is 3"));
    }

    proptest! {
        #[test]
        fn test_pack_unpack_inverse(
            composite in any::<u8>(),
            (width, shift) in (1u32..=8).prop_flat_map(|w| (Just(w), 0..=(8 - w))),
            value in any::<u8>(),
        ) {
            // sub-fields are runs of contiguous bits
            let mask = ((1u64 << width) - 1) << shift;
            let max = mask >> mask.trailing_zeros();
            let value = u64::from(value);
            match pack(u64::from(composite), value, mask) {
                Ok(packed) => {
                    prop_assert!(value <= max);
                    prop_assert_eq!(unpack(packed, mask), value);
                    prop_assert_eq!(packed & !mask, u64::from(composite) & !mask);
                }
                Err(_) => prop_assert!(value > max),
            }
        }
    }

    #[test]
    fn test_storage_cast() {
        assert_eq!(StorageType::U8.cast(255u32), Some(Scalar::U8(255)));
        assert_eq!(StorageType::U8.cast(256u32), None);
        assert_eq!(StorageType::I16.cast(-3i64), Some(Scalar::I16(-3)));
        assert_eq!(StorageType::U16.cast(-1i32), None);
    }
}
