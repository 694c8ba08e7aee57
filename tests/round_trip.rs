use std::collections::BTreeSet;
use std::io::Cursor;

use lasio::checking::{check_same_points, check_write_read_trip};
use lasio::las::dims::StorageType;
use lasio::las::formats::dimensions_lost;
use lasio::las::VlrPayload;
use lasio::{
    convert, read_las, ExtraBytesType, ExtraDimension, Header, LasData, LasReader, LasWriter,
    PointFormat, PointRecords, Version, Vlr, VlrKind, WriterOptions,
};

const ALL_VERSIONS: [Version; 4] = [Version::V1_1, Version::V1_2, Version::V1_3, Version::V1_4];

fn sample_points(format: &PointFormat, count: usize) -> PointRecords {
    let n = count as i32;
    let mut points = PointRecords::zeros(format.clone(), count);
    points
        .set_values("X", &(0..n).map(|i| i * 3 - 100).collect::<Vec<i32>>())
        .unwrap();
    points
        .set_values("Y", &(0..n).map(|i| (i * 7) % 1000).collect::<Vec<i32>>())
        .unwrap();
    points
        .set_values("Z", &(0..n).map(|i| -i).collect::<Vec<i32>>())
        .unwrap();
    points
        .set_values("intensity", &(0..n).map(|i| (i * 13) as u16).collect::<Vec<u16>>())
        .unwrap();
    points
        .set_values("return_number", &(0..n).map(|i| 1 + i % 5).collect::<Vec<i32>>())
        .unwrap();
    points
        .set_values("classification", &(0..n).map(|i| i % 20).collect::<Vec<i32>>())
        .unwrap();
    if format.has_gps_time() {
        points
            .set_values("gps_time", &(0..n).map(|i| f64::from(i) * 0.5).collect::<Vec<f64>>())
            .unwrap();
    }
    if format.has_rgb() {
        for (name, factor) in &[("red", 3), ("green", 5), ("blue", 11)] {
            points
                .set_values(name, &(0..n).map(|i| (i * factor) as u16).collect::<Vec<u16>>())
                .unwrap();
        }
    }
    if format.has_nir() {
        points
            .set_values("nir", &(0..n).map(|i| (i * 17) as u16).collect::<Vec<u16>>())
            .unwrap();
    }
    if format.has_waveform() {
        points.set_values("wavepacket_index", &vec![1u8; count]).unwrap();
        points
            .set_values("wavepacket_offset", &(0..count as u64).map(|i| i * 10).collect::<Vec<u64>>())
            .unwrap();
        points.set_values("wavepacket_size", &vec![10u32; count]).unwrap();
    }
    points
}

fn sample_las(id: u8, version: Version, count: usize) -> LasData {
    let mut las = LasData::new(Header::new(version, id).unwrap()).unwrap();
    las.points = sample_points(las.point_format(), count);
    las.update_header().unwrap();
    las
}

#[test]
fn test_every_format_and_version_uncompressed() {
    for version in &ALL_VERSIONS {
        for id in 0..=10u8 {
            if Header::new(*version, id).is_err() {
                continue;
            }
            let las = sample_las(id, *version, 200);
            let once = check_write_read_trip(&las, WriterOptions::default()).unwrap();
            let twice = check_write_read_trip(&once, WriterOptions::default()).unwrap();
            assert_eq!(once.header.mins, twice.header.mins);
            assert_eq!(once.header.maxs, twice.header.maxs);
            assert_eq!(las.header.mins, once.header.mins, "format {} {}", id, version);
            assert_eq!(las.header.maxs, once.header.maxs, "format {} {}", id, version);
        }
    }
}

#[test]
fn test_every_format_and_version_compressed() {
    let options = WriterOptions::default()
        .with_compression(true)
        .with_chunk_size(64);
    for version in &ALL_VERSIONS {
        for id in 0..=10u8 {
            let format = PointFormat::new(id).unwrap();
            // Waveform formats depend on what the codec supports
            if !format.is_supported_by(*version) || format.has_waveform() {
                continue;
            }
            let las = sample_las(id, *version, 200);
            let read = check_write_read_trip(&las, options.clone()).unwrap();
            assert!(read.header.is_compressed);
            assert_eq!(las.header.mins, read.header.mins);
            assert_eq!(las.header.maxs, read.header.maxs);
        }
    }
}

#[test]
fn test_extra_bytes_compressed() {
    let format = PointFormat::with_extra_dimensions(
        3,
        vec![
            ExtraDimension::new("amplitude", ExtraBytesType::Scalar(StorageType::F32)),
            ExtraDimension::new("flags", ExtraBytesType::Scalar(StorageType::U8)),
        ],
    )
    .unwrap();
    let mut las = LasData::new(Header::new(Version::V1_2, 3).unwrap()).unwrap();
    let mut points = sample_points(&format, 300);
    points
        .set_values("amplitude", &(0..300).map(|i| i as f32 / 4.0).collect::<Vec<f32>>())
        .unwrap();
    points
        .set_values("flags", &(0..300).map(|i| (i % 256) as u8).collect::<Vec<u8>>())
        .unwrap();
    las.points = points;
    las.vlrs.push(Vlr::extra_bytes(
        format
            .extra_dimensions()
            .iter()
            .map(|d| lasio::ExtraBytesStruct::new(d.name.clone(), d.data_type))
            .collect(),
    ));
    las.update_header().unwrap();

    let options = WriterOptions::default().with_compression(true);
    let read = check_write_read_trip(&las, options).unwrap();
    assert_eq!(read.point_format(), &format);
    assert_eq!(read.points.values::<f32>("amplitude").unwrap()[5], 1.25);
}

#[test]
fn test_1065_points_scaled_bounds() {
    let header = Header::new(Version::V1_2, 3).unwrap();
    assert_eq!(header.scales[0], 0.01);
    assert_eq!(header.offsets[0], 0.0);

    let (first, last) = (63_561_985i64, 63_898_255i64);
    let xs: Vec<i32> = (0..1065i64)
        .map(|i| (first + i * (last - first) / 1064) as i32)
        .collect();
    let mut points = PointRecords::zeros(PointFormat::new(3).unwrap(), 1065);
    points.set_values("X", &xs).unwrap();

    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = LasWriter::new(&mut cursor, header).unwrap();
        writer.write(&points).unwrap();
        writer.close().unwrap();
    }
    cursor.set_position(0);
    let las = read_las(&mut cursor).unwrap();
    assert_eq!(las.header.point_count, 1065);
    assert_eq!(las.header.version, Version::V1_2);
    assert!((las.header.mins[0] - 635_619.85).abs() < 1e-6);
    assert!((las.header.maxs[0] - 638_982.55).abs() < 1e-6);

    let x = las.x().unwrap();
    assert!((x[0] - 635_619.85).abs() < 1e-6);
    assert!((x[1064] - 638_982.55).abs() < 1e-6);
}

#[test]
fn test_chunks_are_the_whole_file() {
    let las = sample_las(3, Version::V1_2, 1065);
    for compress in &[false, true] {
        let mut cursor = Cursor::new(Vec::new());
        let options = WriterOptions::default()
            .with_compression(*compress)
            .with_chunk_size(100);
        las.write_to(&mut cursor, options).unwrap();
        let mut reader = LasReader::new(cursor).unwrap();
        let whole = reader.read().unwrap().points;

        for batch_size in &[1usize, 7, 100, 1065, 5000] {
            reader.seek(0).unwrap();
            let mut concatenated = PointRecords::zeros(las.point_format().clone(), 0);
            for chunk in reader.chunks(*batch_size) {
                let chunk = chunk.unwrap();
                assert!(chunk.len() <= *batch_size);
                concatenated.append(&chunk).unwrap();
            }
            check_same_points(&whole, &concatenated);
        }
    }
}

#[test]
fn test_convert_3_to_0_to_3() {
    let expected: BTreeSet<String> = ["gps_time", "red", "green", "blue"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    assert_eq!(dimensions_lost(3, 0).unwrap(), expected);

    let las = sample_las(3, Version::V1_2, 50);
    let point0 = convert(&las, Some(0), None).unwrap();
    assert_eq!(point0.header.point_format_id, 0);
    assert_eq!(point0.header.point_record_length, 20);
    let back = convert(&point0, Some(3), None).unwrap();
    assert_eq!(back.point_format(), las.point_format());

    for name in &["X", "Y", "Z", "intensity", "return_number", "classification"] {
        assert_eq!(
            back.points.values::<f64>(name).unwrap(),
            las.points.values::<f64>(name).unwrap(),
            "{}",
            name
        );
    }
    for name in &["gps_time", "red", "green", "blue"] {
        assert!(back.points.values::<f64>(name).unwrap().iter().all(|v| *v == 0.0));
    }
    assert_eq!(back.header.mins, las.header.mins);
    assert_eq!(
        back.header.number_of_points_by_return,
        las.header.number_of_points_by_return
    );
}

#[test]
fn test_evlrs() {
    let mut las = sample_las(6, Version::V1_4, 100);
    las.evlrs.push(Vlr::wkt("LOCAL_CS[\"test\"]"));
    las.evlrs.push(Vlr::new(
        "lasio",
        42,
        "does not fit in a VLR",
        VlrPayload::Raw(vec![7u8; 70_000]),
    ));
    for compress in &[false, true] {
        let options = WriterOptions::default().with_compression(*compress);
        let read = check_write_read_trip(&las, options).unwrap();
        assert_eq!(read.header.number_of_evlrs, 2);
        assert_eq!(read.evlrs[0].kind(), Some(VlrKind::WktCoordinateSystem));
    }

    let converted = convert(&las, Some(3), Some(Version::V1_2)).unwrap();
    assert!(converted.evlrs.is_empty());
    assert_eq!(converted.vlrs.len(), 1);
    check_write_read_trip(&converted, WriterOptions::default()).unwrap();
}
