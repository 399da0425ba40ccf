use landcover::core::presets::mapbiomas_collection9;
use landcover::core::zonal::RegionMask;
use landcover::core::{reclassify, ZonalAggregator};
use landcover::io::{Band, GridGeometry, RegionOfInterest};
use landcover::types::{CodeGrid, Crs, GeoTransform};
use landcover::UnmappedPolicy;
use approx::assert_relative_eq;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[test]
fn test_forest_band_inside_whole_region() {
    init_logging();

    let scheme = mapbiomas_collection9(UnmappedPolicy::Reject).expect("Failed to build scheme");
    let grid = GridGeometry::new(10, 10, GeoTransform::north_up(500_000.0, 9_700_300.0, 30.0, -30.0), Crs::from_epsg(31983))
        .with_uniform_pixel_area(900.0);
    let band = Band::new(2020, CodeGrid::from_elem((10, 10), 1), grid).expect("Failed to build band");
    let region = RegionOfInterest::rectangle(500_000.0, 9_700_000.0, 500_300.0, 9_700_300.0, Crs::from_epsg(31983))
        .expect("Failed to build region");

    let remapped = reclassify(&band, &scheme).expect("Failed to reclassify");
    let classes = scheme.class_indices();
    let areas = ZonalAggregator::new()
        .compute_area_by_class(&remapped, &region, &classes)
        .expect("Failed to aggregate");

    println!("Areas: {:?}", areas);
    assert_eq!(areas.len(), 6);
    assert_relative_eq!(areas[&1], 0.09, epsilon = 1e-12);
    for class in 2..=6 {
        assert_eq!(areas[&class], 0.0, "class {} should be empty", class);
    }
}

#[test]
fn test_area_conservation_for_irregular_polygon() {
    init_logging();

    let crs = Crs::from_epsg(31983);
    let pixel = 30.0;
    let grid = GridGeometry::new(100, 100, GeoTransform::north_up(0.0, 3000.0, pixel, -pixel), crs);

    // stripes of forest, farming and water
    let codes = CodeGrid::from_shape_fn((100, 100), |(row, col)| match (row + col) % 3 {
        0 => 3,
        1 => 15,
        _ => 33,
    });
    let band = Band::new(2021, codes, grid.clone()).expect("Failed to build band");

    let outline = vec![
        (120.0, 140.0),
        (2810.0, 310.0),
        (2650.0, 2240.0),
        (1510.0, 2920.0),
        (340.0, 1880.0),
        (120.0, 140.0),
    ];
    let region = RegionOfInterest::from_polygon(vec![outline], crs).expect("Failed to build region");

    let scheme = mapbiomas_collection9(UnmappedPolicy::Reject).expect("Failed to build scheme");
    let remapped = reclassify(&band, &scheme).expect("Failed to reclassify");
    let areas = ZonalAggregator::new()
        .compute_area_by_class(&remapped, &region, &scheme.class_indices())
        .expect("Failed to aggregate");

    let total_km2: f64 = areas.values().sum();
    let true_km2 = region.area_m2() / 1e6;
    let mask = RegionMask::derive(&grid, &region).expect("Failed to derive mask");
    let tolerance_km2 = mask.boundary_pixel_count() as f64 * pixel * pixel / 1e6;

    println!(
        "Aggregated {:.4} km², polygon {:.4} km², tolerance {:.4} km²",
        total_km2, true_km2, tolerance_km2
    );
    assert!(total_km2 > 0.0);
    assert!((total_km2 - true_km2).abs() <= tolerance_km2);
    assert!(areas[&2] == 0.0 && areas[&4] == 0.0 && areas[&6] == 0.0);
}

#[test]
fn test_area_conservation_for_sliver_polygon() {
    init_logging();

    // 300 m x 4 m strip that misses every pixel centre
    let crs = Crs::from_epsg(31983);
    let pixel = 30.0;
    let grid = GridGeometry::new(10, 10, GeoTransform::north_up(0.0, 300.0, pixel, -pixel), crs);
    let band = Band::new(2021, CodeGrid::from_elem((10, 10), 3), grid.clone()).expect("Failed to build band");
    let region = RegionOfInterest::rectangle(0.0, 100.0, 300.0, 104.0, crs).expect("Failed to build region");

    let scheme = mapbiomas_collection9(UnmappedPolicy::Reject).expect("Failed to build scheme");
    let remapped = reclassify(&band, &scheme).expect("Failed to reclassify");
    let areas = ZonalAggregator::new()
        .compute_area_by_class(&remapped, &region, &scheme.class_indices())
        .expect("Failed to aggregate");

    let total_km2: f64 = areas.values().sum();
    let true_km2 = region.area_m2() / 1e6;
    let mask = RegionMask::derive(&grid, &region).expect("Failed to derive mask");
    let tolerance_km2 = mask.boundary_pixel_count() as f64 * pixel * pixel / 1e6;

    println!(
        "Aggregated {:.4} km², strip {:.4} km², tolerance {:.4} km²",
        total_km2, true_km2, tolerance_km2
    );
    assert_eq!(total_km2, 0.0);
    assert_relative_eq!(true_km2, 0.0012, epsilon = 1e-12);
    assert!(tolerance_km2 > 0.0);
    assert!((total_km2 - true_km2).abs() <= tolerance_km2);
}

#[test]
fn test_geographic_grid_matches_spherical_region_area() {
    init_logging();

    // 0.01 degree cells over a 0.3 x 0.2 degree box in Maranhão
    let grid = GridGeometry::new(20, 30, GeoTransform::north_up(-45.2, -2.4, 0.01, -0.01), Crs::SIRGAS2000);
    let band = Band::new(2019, CodeGrid::from_elem((20, 30), 26), grid).expect("Failed to build band");
    let region = RegionOfInterest::rectangle(-45.2, -2.6, -44.9, -2.4, Crs::SIRGAS2000).expect("Failed to build region");

    let scheme = mapbiomas_collection9(UnmappedPolicy::Reject).expect("Failed to build scheme");
    let remapped = reclassify(&band, &scheme).expect("Failed to reclassify");
    let areas = ZonalAggregator::new()
        .compute_area_by_class(&remapped, &region, &[5])
        .expect("Failed to aggregate");

    assert_relative_eq!(areas[&5], region.area_m2() / 1e6, max_relative = 1e-6);
}
