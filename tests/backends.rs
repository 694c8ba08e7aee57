use std::io::Cursor;

use lasio::checking::check_same_points;
use lasio::{
    read_las_with, Header, LasData, LasReader, LazBackend, PointFormat, PointRecords,
    ProcessCodec, ReaderOptions, Version, WriterOptions,
};

fn sample() -> LasData {
    let mut las = LasData::new(Header::new(Version::V1_4, 7).unwrap()).unwrap();
    let mut points = PointRecords::zeros(PointFormat::new(7).unwrap(), 2_000);
    let values: Vec<i32> = (0..2_000).map(|i| (i * 37) % 5_000).collect();
    points.set_values("X", &values).unwrap();
    points.set_values("Z", &values).unwrap();
    points.set_values("red", &values).unwrap();
    las.points = points;
    las.update_header().unwrap();
    las
}

fn compressed(las: &LasData, backend: LazBackend) -> Vec<u8> {
    let mut output = Cursor::new(Vec::new());
    let options = WriterOptions::default()
        .with_compression(true)
        .with_backend(backend)
        .with_chunk_size(300);
    las.write_to(&mut output, options).unwrap();
    output.into_inner()
}

fn decompressed_with(data: Vec<u8>, backend: LazBackend) -> PointRecords {
    let options = ReaderOptions::default().with_backend(backend);
    let mut reader = LasReader::with_options(Cursor::new(data), options).unwrap();
    reader.read().unwrap().points
}

#[cfg(feature = "parallel")]
#[test]
fn test_alternate_backends_agree() {
    let las = sample();
    for (compressing, decompressing) in &[
        (LazBackend::Laszip, LazBackend::LaszipParallel),
        (LazBackend::LaszipParallel, LazBackend::Laszip),
    ] {
        let data = compressed(&las, compressing.clone());
        let points = decompressed_with(data, decompressing.clone());
        assert_eq!(points.as_bytes(), las.points.as_bytes());
    }
}

#[test]
fn test_laszip_executable() {
    let codec = ProcessCodec::default();
    if !codec.is_available() {
        return;
    }
    let las = sample();
    let data = compressed(&las, LazBackend::Laszip);
    let points = decompressed_with(data, LazBackend::Process(codec));
    check_same_points(&las.points, &points);
}

/// A program that exits without reading its input
#[cfg(unix)]
fn failing_program(dir: &std::path::Path) -> ProcessCodec {
    use std::os::unix::fs::PermissionsExt;

    let program = dir.join("broken-laszip");
    std::fs::write(&program, "#!/bin/sh\nexit 1\n").unwrap();
    std::fs::set_permissions(&program, std::fs::Permissions::from_mode(0o755)).unwrap();
    ProcessCodec::new(program)
}

#[cfg(unix)]
#[test]
fn test_failing_backend_is_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let broken = LazBackend::Process(failing_program(dir.path()));
    assert!(broken.is_available());

    let las = sample();
    let data = compressed(&las, LazBackend::Laszip);
    let options = ReaderOptions::default().with_backends(vec![broken.clone(), LazBackend::Laszip]);
    let read = read_las_with(&mut Cursor::new(data.clone()), options.clone()).unwrap();
    assert_eq!(read.points, las.points);

    // On a stream, the next backend is tried without opening it again
    let mut reader = LasReader::with_options(Cursor::new(data.clone()), options.clone()).unwrap();
    assert_eq!(reader.read().unwrap().points, las.points);

    let path = dir.path().join("sample.laz");
    std::fs::write(&path, &data).unwrap();
    let mut reader = LasReader::from_path_with_options(&path, options).unwrap();
    assert_eq!(reader.read().unwrap().points, las.points);

    let only_broken = ReaderOptions::default().with_backend(broken);
    let err = read_las_with(&mut Cursor::new(data), only_broken).unwrap_err();
    assert!(err.is_recoverable_codec_error());
}
