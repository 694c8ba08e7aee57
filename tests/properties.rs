use std::io::Cursor;

use proptest::prelude::*;

use lasio::{Header, LasReader, LasWriter, PointFormat, PointRecords, Version, WriterOptions};

fn records(format_id: u8, values: &[(i32, i32, i32, u8)]) -> PointRecords {
    let format = PointFormat::new(format_id).unwrap();
    let mut points = PointRecords::zeros(format, values.len());
    let column = |f: fn(&(i32, i32, i32, u8)) -> i32| values.iter().map(f).collect::<Vec<i32>>();
    points.set_values("X", &column(|v| v.0)).unwrap();
    points.set_values("Y", &column(|v| v.1)).unwrap();
    points.set_values("Z", &column(|v| v.2)).unwrap();
    points
        .set_values("return_number", &column(|v| i32::from(v.3)))
        .unwrap();
    points
}

prop_compose! {
    fn point_values(max_return: u8)
        (values in prop::collection::vec(
            (any::<i32>(), any::<i32>(), -1_000_000i32..1_000_000, 0..=max_return),
            1..300,
        )) -> Vec<(i32, i32, i32, u8)> {
        values
    }
}

proptest! {
    #[test]
    fn test_update_is_order_independent(
        values in point_values(15),
        split in any::<prop::sample::Index>(),
    ) {
        let points = records(6, &values);
        let split = split.index(points.len());

        let mut whole = Header::new(Version::V1_4, 6).unwrap();
        whole.partial_reset();
        whole.update(&points);

        let mut batched = Header::new(Version::V1_4, 6).unwrap();
        batched.partial_reset();
        batched.update(&points.slice(split..points.len()));
        batched.update(&points.slice(0..split));

        prop_assert_eq!(whole.mins, batched.mins);
        prop_assert_eq!(whole.maxs, batched.maxs);
        prop_assert_eq!(whole.point_count, batched.point_count);
        prop_assert_eq!(whole.number_of_points_by_return, batched.number_of_points_by_return);
        prop_assert_eq!(whole.point_count, values.len() as u64);
    }

    #[test]
    fn test_legacy_histogram_ignores_out_of_range(values in point_values(7)) {
        let points = records(1, &values);
        let mut header = Header::new(Version::V1_2, 1).unwrap();
        header.partial_reset();
        header.update(&points);

        let in_range = values.iter().filter(|v| (1..=5).contains(&v.3)).count() as u64;
        prop_assert_eq!(header.number_of_points_by_return.iter().sum::<u64>(), in_range);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn test_compressed_round_trip(
        values in point_values(7),
        chunk_size in 1u32..100,
    ) {
        let points = records(3, &values);
        let mut output = Cursor::new(Vec::new());
        {
            let options = WriterOptions::default()
                .with_compression(true)
                .with_chunk_size(chunk_size);
            let header = Header::new(Version::V1_2, 3).unwrap();
            let mut writer = LasWriter::with_options(&mut output, header, vec![], options).unwrap();
            writer.write(&points).unwrap();
            writer.close().unwrap();
        }
        output.set_position(0);
        let mut reader = LasReader::new(output).unwrap();
        prop_assert_eq!(reader.read().unwrap().points, points);
    }
}
