//! The public header block found at the start of every LAS file.
//!
//! Each version adds trailing fields to the previous one:
//!
//! - 1.1 / 1.2: 227 bytes
//! - 1.3: + start of the waveform data packet record (235 bytes)
//! - 1.4: + EVLR location, 64-bit point counts (375 bytes)
use std::convert::TryFrom;
use std::fmt;
use std::io::{Read, Write};
use std::str::FromStr;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::errors::{LasError, Result};
use crate::las::dims;
use crate::las::formats::{
    self, is_point_format_compressed, point_format_id_compressed_to_uncompressed,
    point_format_id_uncompressed_to_compressed,
};
use crate::las::utils::{read_fixed_string, write_fixed_string};
use crate::las::vlr::{Vlr, VlrKind};
use crate::packers::Packable;
use crate::record::PointRecords;

pub const LAS_SIGNATURE: [u8; 4] = *b"LASF";

const SYSTEM_IDENTIFIER_SIZE: usize = 32;
const GENERATING_SOFTWARE_SIZE: usize = 32;
const LEGACY_NUM_RETURNS: usize = 5;
const NUM_RETURNS: usize = 15;

/// Version of a LAS file, as `major.minor`
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Version {
    pub major: u8,
    pub minor: u8,
}

impl Version {
    pub const V1_1: Version = Version::new(1, 1);
    pub const V1_2: Version = Version::new(1, 2);
    pub const V1_3: Version = Version::new(1, 3);
    pub const V1_4: Version = Version::new(1, 4);

    pub const fn new(major: u8, minor: u8) -> Self {
        Self { major, minor }
    }

    /// Validates a version read from a file
    pub fn from_raw(major: u8, minor: u8) -> Result<Self> {
        match (major, minor) {
            (1, 1..=4) => Ok(Self::new(major, minor)),
            _ => Err(LasError::UnsupportedVersion { major, minor }),
        }
    }

    /// Size in bytes of the header for this version
    pub fn header_size(self) -> u16 {
        if self >= Version::V1_4 {
            375
        } else if self >= Version::V1_3 {
            235
        } else {
            227
        }
    }

    pub fn supports_evlrs(self) -> bool {
        self >= Version::V1_4
    }

    /// Number of slots of the points-by-return histogram
    pub fn num_returns(self) -> usize {
        if self >= Version::V1_4 {
            NUM_RETURNS
        } else {
            LEGACY_NUM_RETURNS
        }
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

impl FromStr for Version {
    type Err = LasError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "1.1" => Ok(Version::V1_1),
            "1.2" => Ok(Version::V1_2),
            "1.3" => Ok(Version::V1_3),
            "1.4" => Ok(Version::V1_4),
            _ => Err(LasError::FileVersionNotSupported(s.to_string())),
        }
    }
}

/// The `global_encoding` bit field of the header
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
pub struct GlobalEncoding(pub u16);

impl GlobalEncoding {
    const GPS_STANDARD_TIME: u16 = 1;
    const WAVEFORM_INTERNAL: u16 = 1 << 1;
    const WAVEFORM_EXTERNAL: u16 = 1 << 2;
    const SYNTHETIC_RETURN_NUMBERS: u16 = 1 << 3;
    const WKT: u16 = 1 << 4;

    fn get(self, bit: u16) -> bool {
        self.0 & bit != 0
    }

    fn set(&mut self, bit: u16, value: bool) {
        if value {
            self.0 |= bit;
        } else {
            self.0 &= !bit;
        }
    }

    pub fn gps_standard_time(self) -> bool {
        self.get(Self::GPS_STANDARD_TIME)
    }

    pub fn waveform_internal(self) -> bool {
        self.get(Self::WAVEFORM_INTERNAL)
    }

    pub fn waveform_external(self) -> bool {
        self.get(Self::WAVEFORM_EXTERNAL)
    }

    pub fn synthetic_return_numbers(self) -> bool {
        self.get(Self::SYNTHETIC_RETURN_NUMBERS)
    }

    /// Coordinate system is stored as WKT instead of GeoTIFF keys
    pub fn wkt(self) -> bool {
        self.get(Self::WKT)
    }

    pub fn set_gps_standard_time(&mut self, value: bool) {
        self.set(Self::GPS_STANDARD_TIME, value);
    }

    pub fn set_waveform_internal(&mut self, value: bool) {
        self.set(Self::WAVEFORM_INTERNAL, value);
    }

    pub fn set_waveform_external(&mut self, value: bool) {
        self.set(Self::WAVEFORM_EXTERNAL, value);
    }

    pub fn set_synthetic_return_numbers(&mut self, value: bool) {
        self.set(Self::SYNTHETIC_RETURN_NUMBERS, value);
    }

    pub fn set_wkt(&mut self, value: bool) {
        self.set(Self::WKT, value);
    }
}

/// Where the waveform packets of a file are stored
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum WaveformLocation {
    None,
    Internal,
    External,
}

/// The LAS header.
///
/// `point_count` and `number_of_points_by_return` are always the 64-bit values,
/// the legacy 32-bit fields are derived from them when writing.
#[derive(Debug, Clone, PartialEq)]
pub struct Header {
    pub version: Version,
    pub file_source_id: u16,
    pub global_encoding: GlobalEncoding,
    pub guid: [u8; 16],
    pub system_identifier: String,
    pub generating_software: String,
    pub creation_day_of_year: u16,
    pub creation_year: u16,
    /// Header size as declared in the file, may be bigger than the standard one
    pub header_size: u16,
    pub offset_to_point_data: u32,
    pub number_of_vlrs: u32,
    /// Point format id, without the compression bits
    pub point_format_id: u8,
    pub is_compressed: bool,
    pub point_record_length: u16,
    pub point_count: u64,
    pub number_of_points_by_return: [u64; NUM_RETURNS],
    pub scales: [f64; 3],
    pub offsets: [f64; 3],
    pub mins: [f64; 3],
    pub maxs: [f64; 3],
    pub start_of_waveform_data_packet_record: u64,
    pub start_of_first_evlr: u64,
    pub number_of_evlrs: u32,
}

impl Default for Header {
    fn default() -> Self {
        let version = Version::V1_2;
        Self {
            version,
            file_source_id: 0,
            global_encoding: GlobalEncoding::default(),
            guid: [0u8; 16],
            system_identifier: String::new(),
            generating_software: format!("lasio {}", env!("CARGO_PKG_VERSION")),
            creation_day_of_year: 0,
            creation_year: 0,
            header_size: version.header_size(),
            offset_to_point_data: u32::from(version.header_size()),
            number_of_vlrs: 0,
            point_format_id: 3,
            is_compressed: false,
            point_record_length: 34,
            point_count: 0,
            number_of_points_by_return: [0; NUM_RETURNS],
            scales: [0.01; 3],
            offsets: [0.0; 3],
            mins: [0.0; 3],
            maxs: [0.0; 3],
            start_of_waveform_data_packet_record: 0,
            start_of_first_evlr: 0,
            number_of_evlrs: 0,
        }
    }
}

impl Header {
    /// Creates a default header for the given version and point format
    pub fn new(version: Version, point_format_id: u8) -> Result<Self> {
        if !formats::is_point_format_supported_by(point_format_id, version) {
            return Err(LasError::PointFormatNotSupported {
                id: point_format_id,
                version: Some(version),
            });
        }
        let mut header = Header {
            version,
            header_size: version.header_size(),
            offset_to_point_data: u32::from(version.header_size()),
            point_format_id,
            ..Default::default()
        };
        header.point_record_length = formats::standard_size(point_format_id)? as u16;
        Ok(header)
    }

    /// Reads the standard part of a header.
    ///
    /// The source is left at the end of the standard header, any user defined
    /// bytes (`header_size` bigger than the standard size) are not consumed.
    pub fn read_from<R: Read>(src: &mut R) -> Result<Self> {
        let mut signature = [0u8; 4];
        src.read_exact(&mut signature)?;
        if signature != LAS_SIGNATURE {
            return Err(LasError::BadSignature(signature));
        }
        let file_source_id = src.read_u16::<LittleEndian>()?;
        let global_encoding = GlobalEncoding(src.read_u16::<LittleEndian>()?);
        let mut guid = [0u8; 16];
        src.read_exact(&mut guid)?;
        let major = src.read_u8()?;
        let minor = src.read_u8()?;
        let version = Version::from_raw(major, minor)?;
        let system_identifier = read_fixed_string(src, SYSTEM_IDENTIFIER_SIZE)?;
        let generating_software = read_fixed_string(src, GENERATING_SOFTWARE_SIZE)?;
        let creation_day_of_year = src.read_u16::<LittleEndian>()?;
        let creation_year = src.read_u16::<LittleEndian>()?;
        let header_size = src.read_u16::<LittleEndian>()?;
        let offset_to_point_data = src.read_u32::<LittleEndian>()?;
        let number_of_vlrs = src.read_u32::<LittleEndian>()?;
        let raw_point_format_id = src.read_u8()?;
        let point_record_length = src.read_u16::<LittleEndian>()?;
        let legacy_point_count = src.read_u32::<LittleEndian>()?;
        let mut legacy_by_return = [0u32; LEGACY_NUM_RETURNS];
        src.read_u32_into::<LittleEndian>(&mut legacy_by_return)?;

        let mut scales = [0f64; 3];
        src.read_f64_into::<LittleEndian>(&mut scales)?;
        let mut offsets = [0f64; 3];
        src.read_f64_into::<LittleEndian>(&mut offsets)?;
        let mut mins = [0f64; 3];
        let mut maxs = [0f64; 3];
        for i in 0..3 {
            maxs[i] = src.read_f64::<LittleEndian>()?;
            mins[i] = src.read_f64::<LittleEndian>()?;
        }

        let mut header = Self {
            version,
            file_source_id,
            global_encoding,
            guid,
            system_identifier,
            generating_software,
            creation_day_of_year,
            creation_year,
            header_size,
            offset_to_point_data,
            number_of_vlrs,
            point_format_id: point_format_id_compressed_to_uncompressed(raw_point_format_id),
            is_compressed: is_point_format_compressed(raw_point_format_id),
            point_record_length,
            point_count: u64::from(legacy_point_count),
            number_of_points_by_return: [0; NUM_RETURNS],
            scales,
            offsets,
            mins,
            maxs,
            start_of_waveform_data_packet_record: 0,
            start_of_first_evlr: 0,
            number_of_evlrs: 0,
        };
        for (dst, src) in header
            .number_of_points_by_return
            .iter_mut()
            .zip(legacy_by_return.iter())
        {
            *dst = u64::from(*src);
        }

        if version >= Version::V1_3 {
            header.start_of_waveform_data_packet_record = src.read_u64::<LittleEndian>()?;
        }

        if version >= Version::V1_4 {
            header.start_of_first_evlr = src.read_u64::<LittleEndian>()?;
            header.number_of_evlrs = src.read_u32::<LittleEndian>()?;
            let point_count = src.read_u64::<LittleEndian>()?;
            let mut by_return = [0u64; NUM_RETURNS];
            src.read_u64_into::<LittleEndian>(&mut by_return)?;

            // Some writers only fill the legacy fields
            if point_count != 0 || legacy_point_count == 0 {
                header.point_count = point_count;
            }
            if by_return.iter().any(|n| *n != 0) {
                header.number_of_points_by_return = by_return;
            }
        }
        Ok(header)
    }

    /// Writes the header using exactly `version.header_size()` bytes.
    pub fn write_to<W: Write>(&self, dst: &mut W) -> Result<()> {
        if self.version < Version::V1_4 && self.point_count > u64::from(u32::MAX) {
            return Err(LasError::TooManyPoints {
                count: self.point_count,
                version: self.version,
            });
        }
        dst.write_all(&LAS_SIGNATURE)?;
        dst.write_u16::<LittleEndian>(self.file_source_id)?;
        dst.write_u16::<LittleEndian>(self.global_encoding.0)?;
        dst.write_all(&self.guid)?;
        dst.write_u8(self.version.major)?;
        dst.write_u8(self.version.minor)?;
        write_fixed_string(dst, &self.system_identifier, SYSTEM_IDENTIFIER_SIZE)?;
        write_fixed_string(dst, &self.generating_software, GENERATING_SOFTWARE_SIZE)?;
        dst.write_u16::<LittleEndian>(self.creation_day_of_year)?;
        dst.write_u16::<LittleEndian>(self.creation_year)?;
        dst.write_u16::<LittleEndian>(self.version.header_size())?;
        dst.write_u32::<LittleEndian>(self.offset_to_point_data)?;
        dst.write_u32::<LittleEndian>(self.number_of_vlrs)?;
        let raw_point_format_id = if self.is_compressed {
            point_format_id_uncompressed_to_compressed(self.point_format_id)
        } else {
            self.point_format_id
        };
        dst.write_u8(raw_point_format_id)?;
        dst.write_u16::<LittleEndian>(self.point_record_length)?;
        dst.write_u32::<LittleEndian>(saturate_u32(self.point_count))?;
        for n in &self.number_of_points_by_return[..LEGACY_NUM_RETURNS] {
            dst.write_u32::<LittleEndian>(saturate_u32(*n))?;
        }
        for scale in &self.scales {
            dst.write_f64::<LittleEndian>(*scale)?;
        }
        for offset in &self.offsets {
            dst.write_f64::<LittleEndian>(*offset)?;
        }
        let (mins, maxs) = self.bounds_to_write();
        for i in 0..3 {
            dst.write_f64::<LittleEndian>(maxs[i])?;
            dst.write_f64::<LittleEndian>(mins[i])?;
        }

        if self.version >= Version::V1_3 {
            dst.write_u64::<LittleEndian>(self.start_of_waveform_data_packet_record)?;
        }

        if self.version >= Version::V1_4 {
            dst.write_u64::<LittleEndian>(self.start_of_first_evlr)?;
            dst.write_u32::<LittleEndian>(self.number_of_evlrs)?;
            dst.write_u64::<LittleEndian>(self.point_count)?;
            for n in &self.number_of_points_by_return {
                dst.write_u64::<LittleEndian>(*n)?;
            }
        }
        Ok(())
    }

    /// A header that did not see any point (or whose bounds are still the
    /// reset sentinels) stores zero bounds.
    fn bounds_to_write(&self) -> ([f64; 3], [f64; 3]) {
        let all_finite = self
            .mins
            .iter()
            .chain(self.maxs.iter())
            .all(|v| v.is_finite());
        if self.point_count == 0 || !all_finite {
            ([0.0; 3], [0.0; 3])
        } else {
            (self.mins, self.maxs)
        }
    }

    /// Resets what `update` accumulates: bounds become `(+inf, -inf)`
    /// and all the point counts are zeroed.
    pub fn partial_reset(&mut self) {
        self.mins = [f64::INFINITY; 3];
        self.maxs = [f64::NEG_INFINITY; 3];
        self.point_count = 0;
        self.number_of_points_by_return = [0; NUM_RETURNS];
    }

    /// Accumulates the bounds, point count and return histogram of `points`.
    ///
    /// Return numbers outside of the histogram (0, or greater than the number
    /// of slots the version has) are not counted.
    pub fn update(&mut self, points: &PointRecords) {
        if points.is_empty() {
            return;
        }
        let record_size = points.format().size();
        let bytes = points.as_bytes();

        if let Some((raw_mins, raw_maxs)) = raw_bounds(bytes, record_size) {
            for axis in 0..3 {
                let a = f64::from(raw_mins[axis]) * self.scales[axis] + self.offsets[axis];
                let b = f64::from(raw_maxs[axis]) * self.scales[axis] + self.offsets[axis];
                self.mins[axis] = self.mins[axis].min(a.min(b));
                self.maxs[axis] = self.maxs[axis].max(a.max(b));
            }
        }

        if let Some(layout) = points.format().field("return_number") {
            let mask = u64::from(layout.mask.unwrap_or(u8::MAX));
            let num_slots = self.version.num_returns();
            for record in bytes.chunks_exact(record_size) {
                let return_number = dims::unpack(u64::from(record[layout.offset]), mask) as usize;
                if (1..=num_slots).contains(&return_number) {
                    self.number_of_points_by_return[return_number - 1] += 1;
                }
            }
        }
        self.point_count += points.len() as u64;
    }

    /// Returns a copy of this header laid out for another file version.
    ///
    /// Only the header changes, the point format must already be
    /// allowed by the target version.
    pub fn convert_to(&self, version: Version) -> Result<Self> {
        if !formats::is_point_format_supported_by(self.point_format_id, version) {
            return Err(LasError::PointFormatNotSupported {
                id: self.point_format_id,
                version: Some(version),
            });
        }
        if version < Version::V1_4 && self.point_count > u64::from(u32::MAX) {
            return Err(LasError::TooManyPoints {
                count: self.point_count,
                version,
            });
        }
        let mut converted = self.clone();
        converted.version = version;
        if version < Version::V1_4 {
            converted.start_of_first_evlr = 0;
            converted.number_of_evlrs = 0;
            converted.global_encoding.set_wkt(false);
            for n in &mut converted.number_of_points_by_return[LEGACY_NUM_RETURNS..] {
                *n = 0;
            }
        }
        if version < Version::V1_3 {
            converted.start_of_waveform_data_packet_record = 0;
            converted.global_encoding.set_waveform_internal(false);
            converted.global_encoding.set_waveform_external(false);
        }
        let vlrs_size = self
            .offset_to_point_data
            .saturating_sub(u32::from(self.header_size));
        converted.header_size = version.header_size();
        converted.offset_to_point_data = u32::from(converted.header_size) + vlrs_size;
        Ok(converted)
    }

    /// For 1.4 files, sets the WKT bit of the global encoding when the
    /// coordinate system is described by exactly one WKT VLR.
    pub fn set_wkt_flag_from(&mut self, vlrs: &[Vlr]) {
        if self.version < Version::V1_4 {
            return;
        }
        let num_wkt = vlrs
            .iter()
            .filter(|vlr| vlr.kind() == Some(VlrKind::WktCoordinateSystem))
            .count();
        if num_wkt == 1 {
            self.global_encoding.set_wkt(true);
        }
    }

    pub fn waveform_location(&self) -> Result<WaveformLocation> {
        match (
            self.global_encoding.waveform_internal(),
            self.global_encoding.waveform_external(),
        ) {
            (true, true) => Err(LasError::InconsistentWaveformFlags),
            (true, false) => Ok(WaveformLocation::Internal),
            (false, true) => Ok(WaveformLocation::External),
            (false, false) => Ok(WaveformLocation::None),
        }
    }

    /// Raw point format id as it is stored in the file (compression bit included)
    pub fn raw_point_format_id(&self) -> u8 {
        if self.is_compressed {
            point_format_id_uncompressed_to_compressed(self.point_format_id)
        } else {
            self.point_format_id
        }
    }
}

fn saturate_u32(value: u64) -> u32 {
    u32::try_from(value).unwrap_or(u32::MAX)
}

type RawBounds = ([i32; 3], [i32; 3]);

fn raw_xyz(record: &[u8]) -> RawBounds {
    let xyz = [
        i32::unpack_from(&record[0..4]),
        i32::unpack_from(&record[4..8]),
        i32::unpack_from(&record[8..12]),
    ];
    (xyz, xyz)
}

fn merge_bounds(a: RawBounds, b: RawBounds) -> RawBounds {
    let mut merged = a;
    for axis in 0..3 {
        merged.0[axis] = a.0[axis].min(b.0[axis]);
        merged.1[axis] = a.1[axis].max(b.1[axis]);
    }
    merged
}

// X, Y, Z are the first 3 i32 of every point format.
#[cfg(not(feature = "parallel"))]
fn raw_bounds(records: &[u8], record_size: usize) -> Option<RawBounds> {
    records
        .chunks_exact(record_size)
        .map(raw_xyz)
        .reduce(merge_bounds)
}

#[cfg(feature = "parallel")]
fn raw_bounds(records: &[u8], record_size: usize) -> Option<RawBounds> {
    use rayon::prelude::*;
    records
        .par_chunks_exact(record_size)
        .map(raw_xyz)
        .reduce_with(merge_bounds)
}
