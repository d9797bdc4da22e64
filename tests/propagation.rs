//! End-to-end behaviour of series propagation.

use glam::DVec3;
use section_volume::{
    Anchoring, GeometryError, RawAnchoring, Section, Series, SeriesError,
};

fn anchored(nr: f64, origin: [f64; 3]) -> Section {
    Section::new(format!("s{nr:03}.png"), nr, 100.0, 50.0).with_anchoring(Anchoring::Raw(
        RawAnchoring {
            origin: DVec3::from(origin),
            u: DVec3::new(200.0, 0.0, 0.0),
            v: DVec3::new(0.0, 0.0, -100.0),
        },
    ))
}

fn unknown(nr: f64) -> Section {
    Section::new(format!("s{nr:03}.png"), nr, 100.0, 50.0)
}

fn series(slices: Vec<Section>) -> Series {
    Series {
        name: "test".into(),
        resolution: Some([256.0, 512.0, 256.0]),
        slices,
        ..Default::default()
    }
}

fn assert_close(actual: DVec3, expected: DVec3) {
    assert!((actual - expected).length() < 1e-9, "{actual:?} != {expected:?}");
}

#[test]
fn every_section_is_placed_and_sorted() {
    let resolved = series(vec![
        unknown(5.0),
        anchored(2.0, [0.0, 20.0, 100.0]),
        unknown(1.0),
        unknown(3.0),
        anchored(4.0, [0.0, 40.0, 100.0]),
        unknown(6.0),
    ])
    .propagate()
    .unwrap();

    let keys: Vec<f64> = resolved.sections.iter().map(|s| s.nr).collect();
    assert_eq!(keys, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
    for (section, nr) in resolved.sections.iter().zip(1..) {
        let y = 10.0 * f64::from(nr);
        assert_close(section.anchoring.origin, DVec3::new(0.0, y, 100.0));
        assert_close(section.anchoring.u, DVec3::new(200.0, 0.0, 0.0));
        assert_close(section.anchoring.v, DVec3::new(0.0, 0.0, -100.0));
    }
}

#[test]
fn interior_gap_is_interpolated_not_fitted() {
    // A regression over all three anchors would not pass through the middle
    // one; the gap sections must follow their two neighbours instead.
    let resolved = series(vec![
        anchored(0.0, [0.0, 0.0, 0.0]),
        unknown(1.0),
        anchored(2.0, [0.0, 20.0, 0.0]),
        unknown(3.0),
        unknown(4.0),
        anchored(5.0, [0.0, 20.0, 0.0]),
    ])
    .propagate()
    .unwrap();

    let origins: Vec<DVec3> = resolved
        .sections
        .iter()
        .map(|s| s.anchoring.origin)
        .collect();
    assert_close(origins[1], DVec3::new(0.0, 10.0, 0.0));
    assert_close(origins[3], DVec3::new(0.0, 20.0, 0.0));
    assert_close(origins[4], DVec3::new(0.0, 20.0, 0.0));
}

#[test]
fn ends_follow_the_fit_over_every_anchor() {
    // Extrapolating from the two nearest anchors would give y = -30 and 30.
    let resolved = series(vec![
        unknown(0.0),
        anchored(1.0, [0.0, 0.0, 0.0]),
        anchored(2.0, [0.0, 30.0, 0.0]),
        anchored(3.0, [0.0, 30.0, 0.0]),
        unknown(4.0),
    ])
    .propagate()
    .unwrap();

    let first = &resolved.sections[0].anchoring;
    let last = &resolved.sections[4].anchoring;
    assert_close(first.origin, DVec3::new(0.0, -10.0, 0.0));
    assert_close(last.origin, DVec3::new(0.0, 50.0, 0.0));
    assert_close(first.u, DVec3::new(200.0, 0.0, 0.0));
    assert_close(last.v, DVec3::new(0.0, 0.0, -100.0));
}

#[test]
fn scale_is_carried_per_pixel() {
    let mut wide = unknown(3.0);
    wide.width = 300.0;
    let resolved = series(vec![
        anchored(1.0, [0.0; 3]),
        anchored(2.0, [0.0; 3]),
        wide,
    ])
    .propagate()
    .unwrap();
    // 2 voxels per pixel horizontally, 2 vertically
    let last = &resolved.sections[2].anchoring;
    assert!((last.u.length() - 600.0).abs() < 1e-9);
    assert!((last.v.length() - 100.0).abs() < 1e-9);
}

#[test]
fn fully_anchored_series_round_trips() {
    let input = vec![anchored(1.0, [1.0, 2.0, 3.0]), anchored(7.0, [4.0, 5.0, 6.0])];
    let resolved = series(input.clone()).propagate().unwrap();
    for (section, original) in resolved.sections.iter().zip(&input) {
        assert_eq!(Anchoring::Raw(section.anchoring).to_vec().len(), 9);
        let Anchoring::Raw(original) = original.anchoring else {
            unreachable!()
        };
        assert_close(section.anchoring.origin, original.origin);
    }
}

#[test]
fn single_anchor_is_underdetermined() {
    let result = series(vec![anchored(1.0, [0.0; 3]), unknown(2.0), unknown(3.0)]).propagate();
    assert!(matches!(
        result,
        Err(SeriesError::Underdetermined { known: 1, total: 3 })
    ));
}

#[test]
fn single_anchored_section_alone_resolves() {
    let resolved = series(vec![anchored(1.0, [0.0; 3])]).propagate().unwrap();
    assert_eq!(resolved.sections.len(), 1);
}

#[test]
fn empty_series_resolves_to_nothing() {
    assert!(series(Vec::new()).propagate().unwrap().sections.is_empty());
}

#[test]
fn degenerate_edge_names_the_section() {
    let mut broken = anchored(2.0, [0.0; 3]);
    broken.anchoring = Anchoring::Raw(RawAnchoring {
        origin: DVec3::ZERO,
        u: DVec3::ZERO,
        v: DVec3::Y,
    });
    let result = series(vec![anchored(1.0, [0.0; 3]), broken]).propagate();
    match result {
        Err(SeriesError::Geometry { filename, source }) => {
            assert_eq!(filename, "s002.png");
            assert_eq!(source, GeometryError::DegenerateVector("horizontal edge"));
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn gap_between_equal_keys_is_reported() {
    let result = series(vec![
        anchored(1.0, [0.0; 3]),
        anchored(2.0, [0.0; 3]),
        unknown(2.0),
        anchored(2.0, [0.0, 5.0, 0.0]),
        anchored(3.0, [0.0; 3]),
    ])
    .propagate();
    assert!(matches!(
        result,
        Err(SeriesError::Geometry {
            source: GeometryError::Estimator(_),
            ..
        })
    ));
}

#[test]
fn series_loads_from_registration_json() {
    let json = r#"{
        "name": "demo",
        "target": "atlas.cutlas",
        "target-resolution": [456, 528, 320],
        "slices": [
            {"filename": "a.png", "nr": 1, "width": 100, "height": 50,
             "anchoring": [0, 0, 0, 200, 0, 0, 0, 0, -100]},
            {"filename": "b.png", "nr": 2, "width": 100, "height": 50, "anchoring": []},
            {"filename": "c.png", "nr": 3, "width": 100, "height": 50},
            {"filename": "d.png", "nr": 4, "width": 100, "height": 50,
             "anchoring": [0, 30, 0, 200, 0, 0, 0, 0, -100]}
        ]
    }"#;
    let series = Series::load_from_reader(json.as_bytes()).unwrap();
    assert_eq!(series.resolution, Some([456.0, 528.0, 320.0]));
    assert!(series.slices[1].anchoring.is_unknown());
    assert!(series.slices[2].anchoring.is_unknown());

    let resolved = series.propagate().unwrap();
    assert_eq!(resolved.dimensions(), Some([456, 528, 320]));
    assert_close(resolved.sections[1].anchoring.origin, DVec3::new(0.0, 10.0, 0.0));
    assert_close(resolved.sections[2].anchoring.origin, DVec3::new(0.0, 20.0, 0.0));
}

#[test]
fn bad_anchoring_length_fails_to_load() {
    let json = r#"{"slices": [{"nr": 1, "width": 1, "height": 1, "anchoring": [1, 2]}]}"#;
    assert!(matches!(
        Series::load_from_reader(json.as_bytes()),
        Err(SeriesError::Json(_))
    ));
}
