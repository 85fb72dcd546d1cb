//! End-to-end distance map runs: strategy equivalence, NoData handling and
//! GeoTIFF file-to-file processing.

use approx::assert_relative_eq;
use distmap_algorithms::binarize::binarize;
use distmap_algorithms::distance::{distance_map, distance_raster, DistanceParams, NoProgress};
use distmap_core::io::{BlockReader, BlockWriter, GeoTiffReader, GeoTiffWriter, MemoryReader, MemoryWriter};
use distmap_core::{GeoTransform, Raster, Region, CRS};
use ndarray::Array2;

fn lattice_raster(rows: usize, cols: usize, step: usize) -> Raster<u8> {
    let data = Array2::from_shape_fn((rows, cols), |(r, c)| u8::from(r % step == 3 && c % step == 5));
    let mut raster = Raster::from_array(data);
    raster.set_transform(GeoTransform::new(500_000.0, 6_300_000.0, 30.0, -30.0));
    raster.set_crs(Some(CRS::projected(32719)));
    raster
}

fn run(raster: &Raster<u8>, block: (usize, usize), params: &DistanceParams) -> Raster<f32> {
    let mut reader = MemoryReader::new(raster.clone()).with_block_shape(block.0, block.1);
    let mut writer = MemoryWriter::<f32>::new(reader.meta());
    distance_map(&mut reader, &mut writer, params, &mut NoProgress).unwrap();
    writer.into_raster()
}

#[test]
fn whole_grid_and_tiled_agree_on_dense_features() {
    let raster = lattice_raster(61, 77, 10);
    let whole = run(
        &raster,
        (7, 77),
        &DistanceParams {
            strip_size: 9,
            ..Default::default()
        },
    );
    let tiled = run(
        &raster,
        (7, 77),
        &DistanceParams {
            tile_size: 16,
            tile_padding: 12,
            ..Default::default()
        },
    );

    for ((r, c), a) in whole.data().indexed_iter() {
        let b = tiled.data()[[r, c]];
        assert_relative_eq!(*a, b, epsilon = 1e-3);
    }
    assert_eq!(whole.get(13, 25).unwrap(), 0.0);
    // Bottom-left corner: 7 rows below row 53, 5 columns left of column 5
    assert_relative_eq!(whole.get(60, 0).unwrap(), 30.0 * 74.0f32.sqrt(), epsilon = 1e-2);
}

#[test]
fn tiled_is_exact_near_isolated_features() {
    let margin = 6;
    let mut data = Array2::zeros((40, 40));
    data[[5, 5]] = 1u8;
    data[[30, 28]] = 1u8;
    let raster = Raster::from_array(data);

    let whole = distance_raster(&raster, &DistanceParams::default()).unwrap();
    let tiled = distance_raster(
        &raster,
        &DistanceParams {
            tile_size: 8,
            tile_padding: margin,
            ..Default::default()
        },
    )
    .unwrap();

    for ((r, c), a) in whole.data().indexed_iter() {
        let b = tiled.data()[[r, c]];
        if *a <= margin as f32 {
            assert_relative_eq!(*a, b, epsilon = 1e-6);
        } else {
            assert!(b >= *a - 1e-6, "tiled value at ({}, {}) under-estimates", r, c);
        }
    }
}

#[test]
fn strip_size_does_not_change_result() {
    let raster = lattice_raster(23, 31, 7);
    let reference = run(&raster, (23, 31), &DistanceParams::default());
    for strip_size in [1, 4, 31] {
        let out = run(
            &raster,
            (5, 6),
            &DistanceParams {
                strip_size,
                ..Default::default()
            },
        );
        assert_eq!(out.data(), reference.data());
    }
}

#[test]
fn nodata_propagates_in_both_strategies() {
    let mut data = Array2::from_elem((20, 20), 0.0f32);
    data[[2, 2]] = 1.0;
    data[[15, 17]] = 1.0;
    for c in 0..20 {
        data[[10, c]] = f32::NAN;
    }
    let mut raster = Raster::from_array(data);
    raster.set_nodata(Some(f32::NAN));

    for tile_size in [0, 6] {
        let out = distance_raster(
            &raster,
            &DistanceParams {
                tile_size,
                tile_padding: 20,
                ..Default::default()
            },
        )
        .unwrap();
        for c in 0..20 {
            assert!(out.get(10, c).unwrap().is_nan());
        }
        assert_eq!(out.get(2, 2).unwrap(), 0.0);
        assert!(out.data().iter().filter(|v| v.is_nan()).count() == 20);
        // NoData cells do not block distances
        assert_relative_eq!(out.get(9, 2).unwrap(), 7.0);
        assert_relative_eq!(out.get(11, 17).unwrap(), 4.0);
    }
}

#[test]
fn geotiff_file_to_file() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("rivers.tif");
    let output = dir.path().join("distance.tif");

    let raster = lattice_raster(45, 38, 12);
    {
        let mut reader = MemoryReader::new(raster.clone());
        let mut writer = GeoTiffWriter::<u8>::create(&input, reader.meta().clone(), Some(dir.path()))
            .unwrap()
            .with_rows_per_strip(8);
        let region = Region::full(45, 38);
        let data = reader.read_window(&region).unwrap();
        writer.write_window(&region, data.view()).unwrap();
        writer.finish().unwrap();
    }

    let mut reader = GeoTiffReader::<u8>::open(&input).unwrap();
    assert_eq!(reader.block_shape(), (8, 38));
    assert_eq!(reader.meta().transform, *raster.transform());
    assert!(reader.meta().crs.as_ref().map_or(false, |crs| crs.is_projected()));

    let mut meta = reader.meta().retyped::<f32>();
    meta.nodata = Some(f32::NAN);
    let mut writer = GeoTiffWriter::<f32>::create(&output, meta, Some(dir.path())).unwrap();
    let summary = distance_map(&mut reader, &mut writer, &DistanceParams::default(), &mut NoProgress).unwrap();
    writer.finish().unwrap();

    assert_eq!(summary.windows_read, 6);
    assert_eq!(summary.feature_cells, 4 * 3);

    let expected = distance_raster(&raster, &DistanceParams::default()).unwrap();
    let mut result = GeoTiffReader::<f32>::open(&output).unwrap();
    assert!(result.meta().nodata.map_or(false, |v| v.is_nan()));
    let values = result.read_window(&Region::full(45, 38)).unwrap();
    assert_eq!(values, expected.into_array());
}

#[test]
fn binarize_then_distance() {
    let data = Array2::from_shape_fn((12, 9), |(r, c)| if r == 4 { 7i16 } else if c == 0 { -1 } else { 0 });
    let mut source = Raster::from_array(data);
    source.set_nodata(Some(-1));

    let mut reader = MemoryReader::new(source).with_block_shape(5, 4);
    let mut binary = MemoryWriter::<u8>::new(reader.meta());
    binarize(&mut reader, &mut binary, &mut NoProgress).unwrap();
    let binary = binary.into_raster();

    // Row 4 is the only feature line; NoData column became background
    let out = distance_raster(&binary, &DistanceParams::default()).unwrap();
    assert_eq!(out.get(4, 0).unwrap(), 0.0);
    assert_relative_eq!(out.get(0, 0).unwrap(), 4.0);
    assert_relative_eq!(out.get(11, 8).unwrap(), 7.0);
}

#[test]
fn float32_nodata_from_gdal_text_becomes_nan() {
    use tiff::encoder::{colortype::Gray32Float, TiffEncoder};
    use tiff::tags::Tag;

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("rivers_f32.tif");
    {
        let file = std::fs::File::create(&path).unwrap();
        let mut encoder = TiffEncoder::new(file).unwrap();
        let mut image = encoder.new_image::<Gray32Float>(3, 1).unwrap();
        image
            .encoder()
            .write_tag(Tag::from_u16_exhaustive(42113), "-9999.9")
            .unwrap();
        image.write_data(&[1.0f32, -9999.9, 0.0]).unwrap();
    }

    for tile_size in [0, 2] {
        let mut reader = GeoTiffReader::<f64>::open(&path).unwrap();
        let mut writer = MemoryWriter::<f32>::new(reader.meta());
        let params = DistanceParams {
            tile_size,
            tile_padding: 4,
            ..Default::default()
        };
        let summary = distance_map(&mut reader, &mut writer, &params, &mut NoProgress).unwrap();
        assert_eq!(summary.valid_cells, 2);

        let out = writer.into_raster();
        assert_eq!(out.get(0, 0).unwrap(), 0.0);
        assert!(out.get(0, 1).unwrap().is_nan());
        assert_relative_eq!(out.get(0, 2).unwrap(), 2.0);
    }
}
