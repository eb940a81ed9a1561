use tagquest::dsl::{CompiledQuery, compile};
use tagquest::record::{ElementKind, ElementRecord, Tags};
use time::Date;
use time::macros::date;

const TACTILE_PAVING_BUS_STOP: &str = r#"
    nodes, ways with
    (
      (public_transport = platform and (bus = yes or trolleybus = yes or tram = yes))
      or
      (highway = bus_stop and public_transport != stop_position)
    )
    and physically_present != no and naptan:BusStopType != HAR
    and (
      !tactile_paving
      or tactile_paving = no and tactile_paving older today -4 years
      or tactile_paving older today -8 years
    )
"#;

const TODAY: Date = date!(2024 - 01 - 01);

fn query() -> CompiledQuery {
    compile(TACTILE_PAVING_BUS_STOP).unwrap()
}

fn element(kind: ElementKind, pairs: &[(&str, &str)]) -> ElementRecord {
    let tags: Tags = pairs.iter().copied().collect();
    ElementRecord::new(kind, tags)
}

fn node(pairs: &[(&str, &str)]) -> ElementRecord {
    element(ElementKind::Node, pairs)
}

#[test]
fn bus_stop_without_tactile_paving() {
    let q = query();
    assert!(q.matches(&node(&[("highway", "bus_stop")]), TODAY));
    assert!(q.matches(
        &element(ElementKind::Way, &[("highway", "bus_stop")]),
        TODAY
    ));
    assert!(!q.matches(
        &element(ElementKind::Relation, &[("highway", "bus_stop")]),
        TODAY
    ));
}

#[test]
fn platforms_need_a_served_mode() {
    let q = query();
    assert!(q.matches(
        &node(&[("public_transport", "platform"), ("tram", "yes")]),
        TODAY
    ));
    assert!(!q.matches(&node(&[("public_transport", "platform")]), TODAY));
    assert!(!q.matches(
        &node(&[("public_transport", "platform"), ("bus", "no")]),
        TODAY
    ));
}

#[test]
fn excluded_stops() {
    let q = query();
    assert!(!q.matches(
        &node(&[("highway", "bus_stop"), ("public_transport", "stop_position")]),
        TODAY
    ));
    assert!(!q.matches(
        &node(&[("highway", "bus_stop"), ("physically_present", "no")]),
        TODAY
    ));
    assert!(!q.matches(
        &node(&[("highway", "bus_stop"), ("naptan:BusStopType", "HAR")]),
        TODAY
    ));
    assert!(q.matches(
        &node(&[("highway", "bus_stop"), ("naptan:BusStopType", "MKD")]),
        TODAY
    ));
}

#[test]
fn missing_paving_is_resurveyed_after_four_years() {
    let q = query();
    let recent = node(&[
        ("highway", "bus_stop"),
        ("tactile_paving", "no"),
        ("check_date:tactile_paving", "2021-05-01"),
    ]);
    assert!(!q.matches(&recent, TODAY));

    let stale = node(&[
        ("highway", "bus_stop"),
        ("tactile_paving", "no"),
        ("check_date:tactile_paving", "2018-06-01"),
    ]);
    assert!(q.matches(&stale, TODAY));
}

#[test]
fn existing_paving_is_resurveyed_after_eight_years() {
    let q = query();
    let surveyed = node(&[
        ("highway", "bus_stop"),
        ("tactile_paving", "yes"),
        ("tactile_paving:check_date", "2018-06-01"),
    ]);
    assert!(!q.matches(&surveyed, TODAY));

    let stale = node(&[
        ("highway", "bus_stop"),
        ("tactile_paving", "yes"),
        ("tactile_paving:check_date", "2015-06-01"),
    ]);
    assert!(q.matches(&stale, TODAY));
}

#[test]
fn edit_date_counts_as_survey() {
    let q = query();
    let tags = [("highway", "bus_stop"), ("tactile_paving", "yes")];

    // no date at all: nothing to compare, not old
    assert!(!q.matches(&node(&tags), TODAY));
    assert!(q.matches(&node(&tags).edited_on(date!(2010 - 03 - 04)), TODAY));
    assert!(!q.matches(&node(&tags).edited_on(date!(2020 - 03 - 04)), TODAY));
}

#[test]
fn newest_check_date_wins() {
    let q = query();
    let record = node(&[
        ("highway", "bus_stop"),
        ("tactile_paving", "yes"),
        ("check_date:tactile_paving", "2012"),
        ("tactile_paving:lastcheck", "2019-02"),
    ])
    .edited_on(date!(2011 - 01 - 01));
    assert!(!q.matches(&record, TODAY));
}

#[test]
fn reference_date_moves_the_threshold() {
    let q = query();
    let record = node(&[
        ("highway", "bus_stop"),
        ("tactile_paving", "yes"),
        ("check_date:tactile_paving", "2018-06-01"),
    ]);
    assert!(!q.matches(&record, TODAY));
    assert!(q.matches(&record, date!(2026 - 06 - 02)));
}
