//! Variable Length Records (VLR) and their extended version (EVLR).
//!
//! A record is identified by its `user_id` and `record_id`. The records this crate
//! knows how to interpret have a typed [`VlrPayload`], anything else is kept as raw bytes.
use std::io::{Read, Write};
use std::ops::RangeInclusive;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::errors::{LasError, Result};
use crate::las::extra_bytes::{
    parse_extra_bytes_structs, write_extra_bytes_structs, ExtraBytesStruct,
};
use crate::las::utils::{fixed_bytes_to_string, read_fixed_string, write_fixed_string};

const USER_ID_SIZE: usize = 16;
const DESCRIPTION_SIZE: usize = 32;

/// Size of the header of a VLR
pub const VLR_HEADER_SIZE: u64 = 54;
/// Size of the header of an EVLR
pub const EVLR_HEADER_SIZE: u64 = 60;

pub const PROJECTION_USER_ID: &str = "LASF_Projection";
pub const SPEC_USER_ID: &str = "LASF_Spec";
/// Record id of the EVLR holding the waveform data packets
pub const WAVEFORM_DATA_RECORD_ID: u16 = 65535;
pub const LASZIP_USER_ID: &str = laz::LazVlr::USER_ID;
pub const LASZIP_RECORD_ID: u16 = laz::LazVlr::RECORD_ID;

/// The kinds of records that have a typed payload
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum VlrKind {
    GeoKeyDirectory,
    GeoDoubleParams,
    GeoAsciiParams,
    WktCoordinateSystem,
    ClassificationLookup,
    ExtraBytes,
    WaveformPacketDescriptor,
    /// Parameters of the LAZ codec
    CompressionParameters,
}

struct KnownVlr {
    kind: VlrKind,
    user_id: &'static str,
    record_ids: RangeInclusive<u16>,
    parse: fn(&[u8]) -> Result<VlrPayload>,
}

static KNOWN_VLRS: [KnownVlr; 8] = [
    KnownVlr {
        kind: VlrKind::GeoKeyDirectory,
        user_id: PROJECTION_USER_ID,
        record_ids: 34735..=34735,
        parse: |data| GeoKeyDirectory::parse(data).map(VlrPayload::GeoKeyDirectory),
    },
    KnownVlr {
        kind: VlrKind::GeoDoubleParams,
        user_id: PROJECTION_USER_ID,
        record_ids: 34736..=34736,
        parse: parse_geo_double_params,
    },
    KnownVlr {
        kind: VlrKind::GeoAsciiParams,
        user_id: PROJECTION_USER_ID,
        record_ids: 34737..=34737,
        parse: |data| Ok(VlrPayload::GeoAsciiParams(fixed_bytes_to_string(data))),
    },
    KnownVlr {
        kind: VlrKind::WktCoordinateSystem,
        user_id: PROJECTION_USER_ID,
        record_ids: 2112..=2112,
        parse: |data| Ok(VlrPayload::WktCoordinateSystem(fixed_bytes_to_string(data))),
    },
    KnownVlr {
        kind: VlrKind::ClassificationLookup,
        user_id: SPEC_USER_ID,
        record_ids: 0..=0,
        parse: parse_classification_lookup,
    },
    KnownVlr {
        kind: VlrKind::ExtraBytes,
        user_id: SPEC_USER_ID,
        record_ids: 4..=4,
        parse: |data| parse_extra_bytes_structs(data).map(VlrPayload::ExtraBytes),
    },
    KnownVlr {
        kind: VlrKind::WaveformPacketDescriptor,
        user_id: SPEC_USER_ID,
        record_ids: 100..=354,
        parse: |data| {
            WaveformPacketDescriptor::parse(data).map(VlrPayload::WaveformPacketDescriptor)
        },
    },
    KnownVlr {
        kind: VlrKind::CompressionParameters,
        user_id: LASZIP_USER_ID,
        record_ids: LASZIP_RECORD_ID..=LASZIP_RECORD_ID,
        parse: |data| Ok(VlrPayload::CompressionParameters(data.to_vec())),
    },
];

fn known_vlr_for(user_id: &str, record_id: u16) -> Option<&'static KnownVlr> {
    KNOWN_VLRS
        .iter()
        .find(|known| known.user_id == user_id && known.record_ids.contains(&record_id))
}

fn known_vlr_of_kind(kind: VlrKind) -> Option<&'static KnownVlr> {
    KNOWN_VLRS.iter().find(|known| known.kind == kind)
}

/// One key of the GeoTIFF key directory
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct GeoKeyEntry {
    pub id: u16,
    pub tiff_tag_location: u16,
    pub count: u16,
    pub value_offset: u16,
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct GeoKeyDirectory {
    pub key_directory_version: u16,
    pub key_revision: u16,
    pub minor_revision: u16,
    pub keys: Vec<GeoKeyEntry>,
}

impl GeoKeyDirectory {
    fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < 8 {
            return Err(LasError::MalformedVlr(format!(
                "GeoKeyDirectory needs at least 8 bytes, got {}",
                data.len()
            )));
        }
        let mut src = data;
        let key_directory_version = src.read_u16::<LittleEndian>()?;
        let key_revision = src.read_u16::<LittleEndian>()?;
        let minor_revision = src.read_u16::<LittleEndian>()?;
        let number_of_keys = src.read_u16::<LittleEndian>()?;
        if src.len() < usize::from(number_of_keys) * 8 {
            return Err(LasError::MalformedVlr(format!(
                "GeoKeyDirectory declares {} keys but only has {} bytes of keys",
                number_of_keys,
                src.len()
            )));
        }
        let mut keys = Vec::with_capacity(usize::from(number_of_keys));
        for _ in 0..number_of_keys {
            keys.push(GeoKeyEntry {
                id: src.read_u16::<LittleEndian>()?,
                tiff_tag_location: src.read_u16::<LittleEndian>()?,
                count: src.read_u16::<LittleEndian>()?,
                value_offset: src.read_u16::<LittleEndian>()?,
            });
        }
        Ok(Self {
            key_directory_version,
            key_revision,
            minor_revision,
            keys,
        })
    }

    fn write_to<W: Write>(&self, dst: &mut W) -> std::io::Result<()> {
        dst.write_u16::<LittleEndian>(self.key_directory_version)?;
        dst.write_u16::<LittleEndian>(self.key_revision)?;
        dst.write_u16::<LittleEndian>(self.minor_revision)?;
        dst.write_u16::<LittleEndian>(self.keys.len() as u16)?;
        for key in &self.keys {
            dst.write_u16::<LittleEndian>(key.id)?;
            dst.write_u16::<LittleEndian>(key.tiff_tag_location)?;
            dst.write_u16::<LittleEndian>(key.count)?;
            dst.write_u16::<LittleEndian>(key.value_offset)?;
        }
        Ok(())
    }
}

fn parse_geo_double_params(data: &[u8]) -> Result<VlrPayload> {
    if data.len() % 8 != 0 {
        return Err(LasError::MalformedVlr(format!(
            "GeoDoubleParams size ({}) is not a multiple of 8",
            data.len()
        )));
    }
    let mut values = vec![0f64; data.len() / 8];
    let mut src = data;
    src.read_f64_into::<LittleEndian>(&mut values)?;
    Ok(VlrPayload::GeoDoubleParams(values))
}

const CLASSIFICATION_ENTRY_SIZE: usize = 16;
const CLASSIFICATION_LABEL_SIZE: usize = 15;
const MAX_CLASSIFICATION_ENTRIES: usize = 256;

/// One `code -> label` entry of the classification lookup
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct ClassificationEntry {
    pub class_number: u8,
    /// At most 15 bytes are stored
    pub description: String,
}

fn parse_classification_lookup(data: &[u8]) -> Result<VlrPayload> {
    if data.len() % CLASSIFICATION_ENTRY_SIZE != 0
        || data.len() / CLASSIFICATION_ENTRY_SIZE > MAX_CLASSIFICATION_ENTRIES
    {
        return Err(LasError::MalformedVlr(format!(
            "classification lookup size ({}) is not a valid table size",
            data.len()
        )));
    }
    let entries = data
        .chunks_exact(CLASSIFICATION_ENTRY_SIZE)
        .map(|entry| ClassificationEntry {
            class_number: entry[0],
            description: fixed_bytes_to_string(&entry[1..]),
        })
        .collect();
    Ok(VlrPayload::ClassificationLookup(entries))
}

/// Describes how the waveform packets of the points referencing it are stored
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct WaveformPacketDescriptor {
    pub bits_per_sample: u8,
    pub compression_type: u8,
    pub number_of_samples: u32,
    /// In picoseconds
    pub temporal_sample_spacing: u32,
    pub digitizer_gain: f64,
    pub digitizer_offset: f64,
}

impl WaveformPacketDescriptor {
    pub const SIZE: usize = 26;

    fn parse(data: &[u8]) -> Result<Self> {
        if data.len() != Self::SIZE {
            return Err(LasError::MalformedVlr(format!(
                "waveform packet descriptor must be {} bytes, got {}",
                Self::SIZE,
                data.len()
            )));
        }
        let mut src = data;
        Ok(Self {
            bits_per_sample: src.read_u8()?,
            compression_type: src.read_u8()?,
            number_of_samples: src.read_u32::<LittleEndian>()?,
            temporal_sample_spacing: src.read_u32::<LittleEndian>()?,
            digitizer_gain: src.read_f64::<LittleEndian>()?,
            digitizer_offset: src.read_f64::<LittleEndian>()?,
        })
    }

    fn write_to<W: Write>(&self, dst: &mut W) -> std::io::Result<()> {
        dst.write_u8(self.bits_per_sample)?;
        dst.write_u8(self.compression_type)?;
        dst.write_u32::<LittleEndian>(self.number_of_samples)?;
        dst.write_u32::<LittleEndian>(self.temporal_sample_spacing)?;
        dst.write_f64::<LittleEndian>(self.digitizer_gain)?;
        dst.write_f64::<LittleEndian>(self.digitizer_offset)
    }
}

/// Content of a record
#[derive(Debug, Clone, PartialEq)]
pub enum VlrPayload {
    GeoKeyDirectory(GeoKeyDirectory),
    GeoDoubleParams(Vec<f64>),
    GeoAsciiParams(String),
    WktCoordinateSystem(String),
    ClassificationLookup(Vec<ClassificationEntry>),
    ExtraBytes(Vec<ExtraBytesStruct>),
    WaveformPacketDescriptor(WaveformPacketDescriptor),
    /// Owned by the LAZ codec, never interpreted here
    CompressionParameters(Vec<u8>),
    Raw(Vec<u8>),
}

impl VlrPayload {
    pub fn kind(&self) -> Option<VlrKind> {
        match self {
            VlrPayload::GeoKeyDirectory(_) => Some(VlrKind::GeoKeyDirectory),
            VlrPayload::GeoDoubleParams(_) => Some(VlrKind::GeoDoubleParams),
            VlrPayload::GeoAsciiParams(_) => Some(VlrKind::GeoAsciiParams),
            VlrPayload::WktCoordinateSystem(_) => Some(VlrKind::WktCoordinateSystem),
            VlrPayload::ClassificationLookup(_) => Some(VlrKind::ClassificationLookup),
            VlrPayload::ExtraBytes(_) => Some(VlrKind::ExtraBytes),
            VlrPayload::WaveformPacketDescriptor(_) => Some(VlrKind::WaveformPacketDescriptor),
            VlrPayload::CompressionParameters(_) => Some(VlrKind::CompressionParameters),
            VlrPayload::Raw(_) => None,
        }
    }

    /// Serializes the payload, this is what the length of the record is computed from.
    pub fn to_bytes(&self) -> std::io::Result<Vec<u8>> {
        let mut data = vec![];
        match self {
            VlrPayload::GeoKeyDirectory(directory) => directory.write_to(&mut data)?,
            VlrPayload::GeoDoubleParams(values) => {
                for v in values {
                    data.write_f64::<LittleEndian>(*v)?;
                }
            }
            VlrPayload::GeoAsciiParams(text) | VlrPayload::WktCoordinateSystem(text) => {
                data.extend_from_slice(text.as_bytes());
                data.push(0);
            }
            VlrPayload::ClassificationLookup(entries) => {
                for entry in entries {
                    data.write_u8(entry.class_number)?;
                    write_fixed_string(&mut data, &entry.description, CLASSIFICATION_LABEL_SIZE)?;
                }
            }
            VlrPayload::ExtraBytes(structs) => write_extra_bytes_structs(structs, &mut data)?,
            VlrPayload::WaveformPacketDescriptor(descriptor) => descriptor.write_to(&mut data)?,
            VlrPayload::CompressionParameters(bytes) | VlrPayload::Raw(bytes) => {
                data.extend_from_slice(bytes)
            }
        }
        Ok(data)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Vlr {
    pub user_id: String,
    pub record_id: u16,
    pub description: String,
    pub payload: VlrPayload,
}

impl Vlr {
    pub fn new<S1, S2>(user_id: S1, record_id: u16, description: S2, payload: VlrPayload) -> Self
    where
        S1: Into<String>,
        S2: Into<String>,
    {
        Self {
            user_id: user_id.into(),
            record_id,
            description: description.into(),
            payload,
        }
    }

    /// Builds a record of a known kind with its standard user id and record id.
    ///
    /// For kinds spanning several record ids (waveform packet descriptors),
    /// the first id is used.
    pub fn known(kind: VlrKind, payload: VlrPayload) -> Self {
        let (user_id, record_id) = known_vlr_of_kind(kind)
            .map(|known| (known.user_id, *known.record_ids.start()))
            .unwrap_or(("", 0));
        Self::new(user_id, record_id, "", payload)
    }

    pub fn extra_bytes(structs: Vec<ExtraBytesStruct>) -> Self {
        let mut vlr = Self::known(VlrKind::ExtraBytes, VlrPayload::ExtraBytes(structs));
        vlr.description = "Extra Bytes Record".to_string();
        vlr
    }

    pub fn wkt<S: Into<String>>(wkt: S) -> Self {
        Self::known(
            VlrKind::WktCoordinateSystem,
            VlrPayload::WktCoordinateSystem(wkt.into()),
        )
    }

    /// The EVLR storing the waveform data packets inside the file
    pub fn waveform_data_packets(data: Vec<u8>) -> Self {
        Self::new(
            SPEC_USER_ID,
            WAVEFORM_DATA_RECORD_ID,
            "Waveform Data Packets",
            VlrPayload::Raw(data),
        )
    }

    pub fn is_waveform_data_packets(&self) -> bool {
        self.user_id == SPEC_USER_ID && self.record_id == WAVEFORM_DATA_RECORD_ID
    }

    /// The record holding the parameters of the LAZ codec
    pub fn laszip(laz_vlr: &laz::LazVlr) -> Result<Self> {
        let mut data = vec![];
        laz_vlr.write_to(&mut data)?;
        Ok(Self::new(
            LASZIP_USER_ID,
            LASZIP_RECORD_ID,
            laz::LazVlr::DESCRIPTION,
            VlrPayload::CompressionParameters(data),
        ))
    }

    /// `None` for records kept as raw bytes
    pub fn kind(&self) -> Option<VlrKind> {
        self.payload.kind()
    }

    pub fn record_data(&self) -> std::io::Result<Vec<u8>> {
        self.payload.to_bytes()
    }

    pub fn read_from<R: Read>(src: &mut R) -> Result<Self> {
        let _reserved = src.read_u16::<LittleEndian>()?;
        let user_id = read_fixed_string(src, USER_ID_SIZE)?;
        let record_id = src.read_u16::<LittleEndian>()?;
        let record_length = src.read_u16::<LittleEndian>()?;
        let description = read_fixed_string(src, DESCRIPTION_SIZE)?;
        let data = read_record_data(src, u64::from(record_length))?;
        Self::from_parts(user_id, record_id, description, data)
    }

    pub fn read_extended_from<R: Read>(src: &mut R) -> Result<Self> {
        let _reserved = src.read_u16::<LittleEndian>()?;
        let user_id = read_fixed_string(src, USER_ID_SIZE)?;
        let record_id = src.read_u16::<LittleEndian>()?;
        let record_length = src.read_u64::<LittleEndian>()?;
        let description = read_fixed_string(src, DESCRIPTION_SIZE)?;
        let data = read_record_data(src, record_length)?;
        Self::from_parts(user_id, record_id, description, data)
    }

    fn from_parts(
        user_id: String,
        record_id: u16,
        description: String,
        data: Vec<u8>,
    ) -> Result<Self> {
        // Parsers borrow the data, keep it to fall back to raw bytes
        let payload = match known_vlr_for(&user_id, record_id) {
            None => VlrPayload::Raw(data),
            Some(known) => match (known.parse)(&data) {
                Ok(payload) => payload,
                Err(e @ LasError::UnknownExtraType(_)) => return Err(e),
                Err(e) => {
                    log::warn!(
                        "Could not parse VLR ({}, {}) as {:?}, keeping raw bytes: {}",
                        user_id,
                        record_id,
                        known.kind,
                        e
                    );
                    VlrPayload::Raw(data)
                }
            },
        };
        Ok(Self {
            user_id,
            record_id,
            description,
            payload,
        })
    }

    pub fn write_to<W: Write>(&self, dst: &mut W) -> Result<()> {
        let data = self.record_data()?;
        if data.len() > usize::from(u16::MAX) {
            return Err(LasError::MalformedVlr(format!(
                "record data of {} bytes does not fit in a VLR, it must be stored as an EVLR",
                data.len()
            )));
        }
        self.write_header(dst)?;
        dst.write_u16::<LittleEndian>(data.len() as u16)?;
        write_fixed_string(dst, &self.description, DESCRIPTION_SIZE)?;
        dst.write_all(&data)?;
        Ok(())
    }

    pub fn write_extended_to<W: Write>(&self, dst: &mut W) -> Result<()> {
        let data = self.record_data()?;
        self.write_header(dst)?;
        dst.write_u64::<LittleEndian>(data.len() as u64)?;
        write_fixed_string(dst, &self.description, DESCRIPTION_SIZE)?;
        dst.write_all(&data)?;
        Ok(())
    }

    fn write_header<W: Write>(&self, dst: &mut W) -> std::io::Result<()> {
        dst.write_u16::<LittleEndian>(0)?;
        write_fixed_string(dst, &self.user_id, USER_ID_SIZE)?;
        dst.write_u16::<LittleEndian>(self.record_id)
    }

    /// Number of bytes taken when written as a VLR
    pub fn serialized_size(&self) -> Result<u64> {
        Ok(VLR_HEADER_SIZE + self.record_data()?.len() as u64)
    }
}

fn read_record_data<R: Read>(src: &mut R, length: u64) -> std::io::Result<Vec<u8>> {
    let mut data = Vec::new();
    src.take(length).read_to_end(&mut data)?;
    if (data.len() as u64) < length {
        return Err(std::io::ErrorKind::UnexpectedEof.into());
    }
    Ok(data)
}

pub fn read_vlrs<R: Read>(src: &mut R, count: u32) -> Result<Vec<Vlr>> {
    (0..count).map(|_| Vlr::read_from(src)).collect()
}

pub fn read_evlrs<R: Read>(src: &mut R, count: u32) -> Result<Vec<Vlr>> {
    (0..count).map(|_| Vlr::read_extended_from(src)).collect()
}

pub fn write_vlrs<W: Write>(dst: &mut W, vlrs: &[Vlr]) -> Result<()> {
    vlrs.iter().try_for_each(|vlr| vlr.write_to(dst))
}

pub fn write_evlrs<W: Write>(dst: &mut W, evlrs: &[Vlr]) -> Result<()> {
    evlrs.iter().try_for_each(|vlr| vlr.write_extended_to(dst))
}

/// Number of bytes taken when written as an EVLR
pub fn extended_size(evlr: &Vlr) -> Result<u64> {
    Ok(EVLR_HEADER_SIZE + evlr.record_data()?.len() as u64)
}

/// Total size of the VLRs once written
pub fn vlrs_size(vlrs: &[Vlr]) -> Result<u64> {
    vlrs.iter().map(Vlr::serialized_size).sum()
}

/// Removes and returns the first record of the given kind
pub fn extract(vlrs: &mut Vec<Vlr>, kind: VlrKind) -> Option<Vlr> {
    let index = vlrs.iter().position(|vlr| vlr.kind() == Some(kind))?;
    Some(vlrs.remove(index))
}

pub fn find(vlrs: &[Vlr], kind: VlrKind) -> Option<&Vlr> {
    vlrs.iter().find(|vlr| vlr.kind() == Some(kind))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::las::dims::StorageType;
    use crate::las::extra_bytes::ExtraBytesType;

    fn write_read(vlr: &Vlr) -> Vlr {
        let mut out = vec![];
        vlr.write_to(&mut out).unwrap();
        assert_eq!(out.len() as u64, vlr.serialized_size().unwrap());
        Vlr::read_from(&mut out.as_slice()).unwrap()
    }

    #[test]
    fn test_vlr_header_is_54_bytes() {
        let vlr = Vlr::new("me", 42, "nothing", VlrPayload::Raw(vec![]));
        let mut out = vec![];
        vlr.write_to(&mut out).unwrap();
        assert_eq!(out.len(), 54);

        let mut out = vec![];
        vlr.write_extended_to(&mut out).unwrap();
        assert_eq!(out.len(), 60);
    }

    #[test]
    fn test_known_kinds_are_dispatched() {
        let directory = GeoKeyDirectory {
            key_directory_version: 1,
            key_revision: 1,
            minor_revision: 0,
            keys: vec![GeoKeyEntry {
                id: 1024,
                tiff_tag_location: 0,
                count: 1,
                value_offset: 1,
            }],
        };
        let vlr = Vlr::known(
            VlrKind::GeoKeyDirectory,
            VlrPayload::GeoKeyDirectory(directory),
        );
        assert_eq!(vlr.record_id, 34735);
        assert_eq!(write_read(&vlr), vlr);

        let vlr = Vlr::known(
            VlrKind::ClassificationLookup,
            VlrPayload::ClassificationLookup(vec![ClassificationEntry {
                class_number: 2,
                description: "Ground".into(),
            }]),
        );
        assert_eq!(write_read(&vlr), vlr);

        let vlr = Vlr::extra_bytes(vec![ExtraBytesStruct::new(
            "height",
            ExtraBytesType::Scalar(StorageType::F32),
        )]);
        assert_eq!(write_read(&vlr).kind(), Some(VlrKind::ExtraBytes));

        let vlr = Vlr::new(
            SPEC_USER_ID,
            120,
            "",
            VlrPayload::WaveformPacketDescriptor(WaveformPacketDescriptor {
                bits_per_sample: 8,
                compression_type: 0,
                number_of_samples: 64,
                temporal_sample_spacing: 1000,
                digitizer_gain: 1.5,
                digitizer_offset: 0.25,
            }),
        );
        assert_eq!(write_read(&vlr), vlr);

        let unknown = Vlr::new("someone", 7, "", VlrPayload::Raw(vec![1, 2, 3]));
        assert_eq!(write_read(&unknown).kind(), None);
    }

    #[test]
    fn test_malformed_payload_degrades_to_raw() {
        let vlr = Vlr::new(PROJECTION_USER_ID, 34736, "", VlrPayload::Raw(vec![0u8; 7]));
        let read = write_read(&vlr);
        assert_eq!(read.payload, VlrPayload::Raw(vec![0u8; 7]));
    }

    #[test]
    fn test_unknown_extra_type_is_fatal() {
        let mut data = vec![0u8; ExtraBytesStruct::SIZE];
        data[2] = 42;
        let vlr = Vlr::new(SPEC_USER_ID, 4, "", VlrPayload::Raw(data));
        let mut out = vec![];
        vlr.write_to(&mut out).unwrap();
        assert!(matches!(
            Vlr::read_from(&mut out.as_slice()),
            Err(LasError::UnknownExtraType(42))
        ));
    }

    #[test]
    fn test_length_is_recomputed_on_write() {
        let mut vlr = Vlr::wkt("GEOGCS[]");
        let mut out = vec![];
        vlr.write_to(&mut out).unwrap();
        assert_eq!(u16::from_le_bytes([out[20], out[21]]), 9);

        vlr.payload = VlrPayload::WktCoordinateSystem("PROJCS[\"something longer\"]".into());
        let mut out = vec![];
        vlr.write_to(&mut out).unwrap();
        assert_eq!(u16::from_le_bytes([out[20], out[21]]), 27);
    }

    #[test]
    fn test_extract_removes_first_of_kind() {
        let mut vlrs = vec![
            Vlr::wkt("first"),
            Vlr::new("a", 1, "", VlrPayload::Raw(vec![])),
            Vlr::wkt("second"),
        ];
        let extracted = extract(&mut vlrs, VlrKind::WktCoordinateSystem).unwrap();
        assert_eq!(extracted.payload, VlrPayload::WktCoordinateSystem("first".into()));
        assert_eq!(vlrs.len(), 2);
        assert!(extract(&mut vlrs, VlrKind::ExtraBytes).is_none());
    }

    #[test]
    fn test_evlr_list() {
        let evlrs = vec![
            Vlr::new("big", 1, "blob", VlrPayload::Raw(vec![7u8; 70_000])),
            Vlr::wkt("GEOGCS[]"),
        ];
        let mut out = vec![];
        write_evlrs(&mut out, &evlrs).unwrap();
        let read = read_evlrs(&mut out.as_slice(), 2).unwrap();
        assert_eq!(read, evlrs);

        let mut out = vec![];
        assert!(write_vlrs(&mut out, &evlrs[..1]).is_err());
    }
}
