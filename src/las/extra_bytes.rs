//! User defined dimensions that trail the standard fields of a point record,
//! and their description as stored in the extra-bytes VLR.

use std::io::{Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::errors::{LasError, Result};
use crate::las::dims::StorageType;
use crate::las::utils::{read_fixed_string, write_fixed_string};

/// Type of an extra dimension
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum ExtraBytesType {
    /// Opaque bytes, the number of bytes is stored in the `options` field
    Undocumented(u8),
    Scalar(StorageType),
    /// 2 or 3 values of the same type (deprecated by LAS 1.4 R14, still read)
    Array(StorageType, u8),
}

/// Storage types indexed by `(type_code - 1) % 10`
const CODE_TABLE: [StorageType; 10] = [
    StorageType::U8,
    StorageType::I8,
    StorageType::U16,
    StorageType::I16,
    StorageType::U32,
    StorageType::I32,
    StorageType::U64,
    StorageType::I64,
    StorageType::F32,
    StorageType::F64,
];

impl ExtraBytesType {
    pub fn from_code(code: u8, options: u8) -> Result<Self> {
        match code {
            0 => Ok(ExtraBytesType::Undocumented(options)),
            1..=10 => Ok(ExtraBytesType::Scalar(CODE_TABLE[usize::from(code - 1)])),
            11..=20 => Ok(ExtraBytesType::Array(CODE_TABLE[usize::from(code - 11)], 2)),
            21..=30 => Ok(ExtraBytesType::Array(CODE_TABLE[usize::from(code - 21)], 3)),
            _ => Err(LasError::UnknownExtraType(code)),
        }
    }

    pub fn code(&self) -> u8 {
        let index_of = |storage: StorageType| {
            CODE_TABLE
                .iter()
                .position(|s| *s == storage)
                .map(|i| i as u8 + 1)
                .unwrap_or(0)
        };
        match self {
            ExtraBytesType::Undocumented(_) => 0,
            ExtraBytesType::Scalar(storage) => index_of(*storage),
            ExtraBytesType::Array(storage, 2) => index_of(*storage) + 10,
            ExtraBytesType::Array(storage, _) => index_of(*storage) + 20,
        }
    }

    pub fn storage(&self) -> StorageType {
        match self {
            ExtraBytesType::Undocumented(_) => StorageType::U8,
            ExtraBytesType::Scalar(storage) | ExtraBytesType::Array(storage, _) => *storage,
        }
    }

    /// Number of values per record
    pub fn arity(&self) -> usize {
        match self {
            ExtraBytesType::Undocumented(n) => usize::from(*n),
            ExtraBytesType::Scalar(_) => 1,
            ExtraBytesType::Array(_, n) => usize::from(*n),
        }
    }

    pub fn size(&self) -> usize {
        self.storage().size() * self.arity()
    }
}

/// An extra dimension as seen by a point format.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct ExtraDimension {
    pub name: String,
    pub data_type: ExtraBytesType,
}

impl ExtraDimension {
    pub fn new<S: Into<String>>(name: S, data_type: ExtraBytesType) -> Self {
        Self {
            name: name.into(),
            data_type,
        }
    }

    pub fn size(&self) -> usize {
        self.data_type.size()
    }

    /// Describes `num_bytes` of bytes that no descriptor explains.
    ///
    /// The options byte limits one undocumented block to 255 bytes,
    /// bigger amounts are split into several blocks.
    pub(crate) fn undocumented_blocks(mut num_bytes: usize) -> Vec<Self> {
        let mut blocks = vec![];
        while num_bytes > 0 {
            let block_size = num_bytes.min(usize::from(u8::MAX));
            let name = if blocks.is_empty() {
                "extra_bytes".to_string()
            } else {
                format!("extra_bytes_{}", blocks.len())
            };
            blocks.push(Self::new(name, ExtraBytesType::Undocumented(block_size as u8)));
            num_bytes -= block_size;
        }
        blocks
    }
}

const NAME_SIZE: usize = 32;
const DESCRIPTION_SIZE: usize = 32;

mod options {
    pub const NO_DATA: u8 = 1;
    pub const MIN: u8 = 1 << 1;
    pub const MAX: u8 = 1 << 2;
    pub const SCALE: u8 = 1 << 3;
    pub const OFFSET: u8 = 1 << 4;
}

/// One entry of the extra-bytes VLR.
///
/// The statistics are stored as 3 slots of 8 bytes, only the first
/// `arity` slots are meaningful. `no_data`, `min` and `max` are typed after
/// `data_type` (u64, i64 or f64) so they are kept as raw little endian bytes.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtraBytesStruct {
    pub name: String,
    pub data_type: ExtraBytesType,
    pub no_data: Option<[[u8; 8]; 3]>,
    pub min: Option<[[u8; 8]; 3]>,
    pub max: Option<[[u8; 8]; 3]>,
    pub scale: Option<[f64; 3]>,
    pub offset: Option<[f64; 3]>,
    pub description: String,
}

impl ExtraBytesStruct {
    pub const SIZE: usize = 192;

    pub fn new<S: Into<String>>(name: S, data_type: ExtraBytesType) -> Self {
        Self {
            name: name.into(),
            data_type,
            no_data: None,
            min: None,
            max: None,
            scale: None,
            offset: None,
            description: String::new(),
        }
    }

    pub fn to_extra_dimension(&self) -> ExtraDimension {
        ExtraDimension::new(self.name.clone(), self.data_type)
    }

    fn options(&self) -> u8 {
        let mut bits = match self.data_type {
            ExtraBytesType::Undocumented(size) => return size,
            _ => 0u8,
        };
        if self.no_data.is_some() {
            bits |= options::NO_DATA;
        }
        if self.min.is_some() {
            bits |= options::MIN;
        }
        if self.max.is_some() {
            bits |= options::MAX;
        }
        if self.scale.is_some() {
            bits |= options::SCALE;
        }
        if self.offset.is_some() {
            bits |= options::OFFSET;
        }
        bits
    }

    pub fn read_from<R: Read>(src: &mut R) -> Result<Self> {
        let _reserved = src.read_u16::<LittleEndian>()?;
        let code = src.read_u8()?;
        let option_bits = src.read_u8()?;
        let data_type = ExtraBytesType::from_code(code, option_bits)?;
        let name = read_fixed_string(src, NAME_SIZE)?;
        let mut _unused = [0u8; 4];
        src.read_exact(&mut _unused)?;
        let no_data = read_raw_triplet(src)?;
        let min = read_raw_triplet(src)?;
        let max = read_raw_triplet(src)?;
        let scale = read_f64_triplet(src)?;
        let offset = read_f64_triplet(src)?;
        let description = read_fixed_string(src, DESCRIPTION_SIZE)?;

        // Undocumented extra bytes use the options byte as their size
        let has = |bit: u8| code != 0 && option_bits & bit != 0;
        Ok(Self {
            name,
            data_type,
            no_data: if has(options::NO_DATA) { Some(no_data) } else { None },
            min: if has(options::MIN) { Some(min) } else { None },
            max: if has(options::MAX) { Some(max) } else { None },
            scale: if has(options::SCALE) { Some(scale) } else { None },
            offset: if has(options::OFFSET) { Some(offset) } else { None },
            description,
        })
    }

    pub fn write_to<W: Write>(&self, dst: &mut W) -> std::io::Result<()> {
        dst.write_u16::<LittleEndian>(0)?;
        dst.write_u8(self.data_type.code())?;
        dst.write_u8(self.options())?;
        write_fixed_string(dst, &self.name, NAME_SIZE)?;
        dst.write_all(&[0u8; 4])?;
        write_raw_triplet(dst, self.no_data.as_ref())?;
        write_raw_triplet(dst, self.min.as_ref())?;
        write_raw_triplet(dst, self.max.as_ref())?;
        write_f64_triplet(dst, self.scale.as_ref())?;
        write_f64_triplet(dst, self.offset.as_ref())?;
        write_fixed_string(dst, &self.description, DESCRIPTION_SIZE)?;
        Ok(())
    }
}

fn read_raw_triplet<R: Read>(src: &mut R) -> std::io::Result<[[u8; 8]; 3]> {
    let mut triplet = [[0u8; 8]; 3];
    for slot in triplet.iter_mut() {
        src.read_exact(slot)?;
    }
    Ok(triplet)
}

fn read_f64_triplet<R: Read>(src: &mut R) -> std::io::Result<[f64; 3]> {
    Ok([
        src.read_f64::<LittleEndian>()?,
        src.read_f64::<LittleEndian>()?,
        src.read_f64::<LittleEndian>()?,
    ])
}

fn write_raw_triplet<W: Write>(dst: &mut W, triplet: Option<&[[u8; 8]; 3]>) -> std::io::Result<()> {
    match triplet {
        Some(slots) => slots.iter().try_for_each(|slot| dst.write_all(slot)),
        None => dst.write_all(&[0u8; 24]),
    }
}

fn write_f64_triplet<W: Write>(dst: &mut W, triplet: Option<&[f64; 3]>) -> std::io::Result<()> {
    match triplet {
        Some(values) => values
            .iter()
            .try_for_each(|v| dst.write_f64::<LittleEndian>(*v)),
        None => dst.write_all(&[0u8; 24]),
    }
}

/// Parses the record data of an extra-bytes VLR.
pub fn parse_extra_bytes_structs(record_data: &[u8]) -> Result<Vec<ExtraBytesStruct>> {
    if record_data.len() % ExtraBytesStruct::SIZE != 0 {
        return Err(LasError::MalformedVlr(format!(
            "extra bytes record data size ({}) is not a multiple of {}",
            record_data.len(),
            ExtraBytesStruct::SIZE
        )));
    }
    record_data
        .chunks_exact(ExtraBytesStruct::SIZE)
        .map(|mut chunk| ExtraBytesStruct::read_from(&mut chunk))
        .collect()
}

pub fn write_extra_bytes_structs<W: Write>(
    structs: &[ExtraBytesStruct],
    dst: &mut W,
) -> std::io::Result<()> {
    structs.iter().try_for_each(|s| s.write_to(dst))
}
