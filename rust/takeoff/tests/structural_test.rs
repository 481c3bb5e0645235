// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Columns, beams and footings through the full page pipeline.

mod common;

use approx::assert_relative_eq;
use common::synthetic::{beam_between_columns, PlanBuilder};
use plan_takeoff::{analyze_pages, concrete_volume, ElementCategory, TakeoffConfig, Unit};

#[test]
fn test_filled_square_column_at_1_50_and_75_dpi() {
    let page = PlanBuilder::new(200, 200).fill(80, 80, 120, 120).build(75.0);
    let report = analyze_pages(&[page], "1:50", TakeoffConfig::default()).unwrap();

    let columns: Vec<_> = report.elements.by_category(ElementCategory::Column).collect();
    assert_eq!(columns.len(), 1);
    assert_eq!(report.elements.len(), 1);

    let pixels_per_meter = 75.0 / 0.0254 / 50.0;
    let expected_area = 1600.0 / (pixels_per_meter * pixels_per_meter);
    let area = columns[0].measurements.area_m2.unwrap();
    assert_relative_eq!(area, expected_area, epsilon = 1e-9);
    assert_relative_eq!(area, 0.45878, epsilon = 1e-6);
    assert_relative_eq!(
        columns[0].measurements.volume_m3.unwrap(),
        expected_area * 2.75,
        epsilon = 1e-9
    );
    assert_relative_eq!(
        report.ledger.total(ElementCategory::Column, Unit::VolumeM3),
        expected_area * 2.75,
        epsilon = 1e-9
    );
    assert_eq!(report.ledger.total(ElementCategory::Column, Unit::Count), 1.0);
}

#[test]
fn test_beam_spanning_two_columns() {
    let page = beam_between_columns().build(75.0);
    let report = analyze_pages(&[page], "1:50", TakeoffConfig::default()).unwrap();
    let counts = report.elements.counts();

    assert_eq!(counts[&ElementCategory::Column], 2);
    assert_eq!(counts[&ElementCategory::Beam], 1);
    // Edges of the members are not reported as walls or openings
    assert_eq!(report.elements.walls().count(), 0);
    assert_eq!(counts[&ElementCategory::Window], 0);
    assert!(report.pages[0].diagnostics.walls_superseded > 0);

    let pixels_per_meter = 75.0 / 0.0254 / 50.0;
    let beam = report.elements.by_category(ElementCategory::Beam).next().unwrap();
    let length = beam.measurements.length_m.unwrap();
    let width = beam.measurements.width_m.unwrap();
    assert_relative_eq!(length, 166.0 / pixels_per_meter, epsilon = 1e-9);
    assert_relative_eq!(width, 20.0 / pixels_per_meter, epsilon = 1e-9);
    assert_relative_eq!(beam.measurements.volume_m3.unwrap(), width * 0.5 * length, epsilon = 1e-12);
    assert_relative_eq!(
        report.ledger.total(ElementCategory::Beam, Unit::LengthM),
        length,
        epsilon = 1e-12
    );
}

#[test]
fn test_foundation_page_reports_footings() {
    let page = PlanBuilder::new(500, 300)
        .fill(50, 100, 350, 140)
        .fill(400, 100, 420, 120)
        .build(127.0)
        .foundation_plan();
    let report = analyze_pages(&[page], "1:100", TakeoffConfig::default()).unwrap();
    let counts = report.elements.counts();

    assert_eq!(counts[&ElementCategory::Footing], 1);
    assert_eq!(counts[&ElementCategory::Column], 1);
    assert_eq!(counts[&ElementCategory::Slab], 0);
    assert_eq!(report.elements.walls().count(), 0);

    let footing = report.elements.by_category(ElementCategory::Footing).next().unwrap();
    // 300 × 40 px at 50 px/m
    assert_relative_eq!(footing.measurements.area_m2.unwrap(), 4.8, epsilon = 1e-6);
    assert_relative_eq!(footing.measurements.volume_m3.unwrap(), 4.8 * 0.4, epsilon = 1e-6);
    assert!(concrete_volume(&report.elements) > 1.92);
}

#[test]
fn test_thresholds_are_configurable() {
    // Same square becomes a non-column once the column threshold drops below its area
    let config = TakeoffConfig {
        column_area_threshold: 0.3,
        ..Default::default()
    };
    let page = PlanBuilder::new(200, 200).fill(80, 80, 120, 120).build(75.0);
    let report = analyze_pages(&[page], "1:50", config).unwrap();

    assert_eq!(report.elements.by_category(ElementCategory::Column).count(), 0);
}
