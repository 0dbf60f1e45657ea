mod common;

use std::sync::Arc;

use parking_lot::Mutex;

use blipmq_lists::lists::{
    CompareOutcome, Event, EventType, EventValue, ListError, Reason, SimpleNflHashMap, UserData,
};
use common::{init_logging, Msg};

#[test]
fn byte_capacity_hundred_keeps_only_the_first_value() {
    init_logging();
    let map: SimpleNflHashMap<String, Msg> = SimpleNflHashMap::new("consumers");
    map.set_byte_capacity(100u64);

    map.put("first".to_string(), Msg::new("first", 60), Reason::ADDED).unwrap();
    let err = map
        .put("second".to_string(), Msg::new("second", 50), Reason::ADDED)
        .unwrap_err();
    assert!(matches!(err, ListError::ByteCapacityExceeded { .. }));
    assert_eq!(map.keys(), vec!["first".to_string()]);
    assert_eq!(map.byte_size(), 60);
}

#[test]
fn map_events_carry_key_value_pairs() {
    let map: SimpleNflHashMap<u32, String> = SimpleNflHashMap::new("m");
    let log: Arc<Mutex<Vec<(EventType, EventValue<(u32, String)>)>>> =
        Arc::new(Mutex::new(Vec::new()));
    for kind in [EventType::SetChanged, EventType::Empty, EventType::BytesChanged] {
        let log = Arc::clone(&log);
        map.add_event_listener(
            Arc::new(move |e: &Event<(u32, String)>, _: Option<&UserData>| {
                log.lock().push((e.event_type, e.new_value.clone()))
            }),
            kind,
            None,
            None,
        );
    }

    map.put(7, "seven".to_string(), Reason::ADDED).unwrap();
    map.remove(&7, Reason::REMOVED);

    let seen = log.lock().clone();
    assert_eq!(
        seen,
        vec![
            (EventType::BytesChanged, EventValue::Bytes(5)),
            (EventType::SetChanged, EventValue::Element((7, "seven".to_string()))),
            (EventType::Empty, EventValue::Flag(false)),
            (EventType::BytesChanged, EventValue::Bytes(0)),
            (EventType::SetChanged, EventValue::None),
            (EventType::Empty, EventValue::Flag(true)),
        ]
    );
}

#[test]
fn compare_and_swap_by_value() {
    let map: SimpleNflHashMap<&'static str, u64> = SimpleNflHashMap::new("offsets");
    assert_eq!(
        map.put_if("c1", 10, Some(&0), Reason::ADDED).unwrap(),
        CompareOutcome::Mismatch
    );
    assert_eq!(
        map.put_if("c1", 10, None, Reason::ADDED).unwrap(),
        CompareOutcome::Applied(None)
    );
    assert!(!map.remove_with_value(&"c1", Some(&9), Reason::REMOVED).is_applied());
    assert_eq!(map.get(&"c1"), Some(10));
    assert_eq!(
        map.remove_with_value(&"c1", Some(&10), Reason::REMOVED),
        CompareOutcome::Applied(Some(10))
    );
}

#[test]
fn map_limits_and_statistics() {
    let map: SimpleNflHashMap<u32, Msg> = SimpleNflHashMap::new("m");
    map.set_capacity(2u64);
    map.put(1, Msg::new("a", 10), Reason::ADDED).unwrap();
    map.put(2, Msg::new("b", 30), Reason::ADDED).unwrap();
    assert!(map.is_full());
    assert!(matches!(
        map.put(3, Msg::new("c", 1), Reason::ADDED),
        Err(ListError::CountExceeded { attempted: 3, limit: 2 })
    ));
    map.put(2, Msg::new("b", 5), Reason::ADDED).unwrap();
    assert_eq!(map.byte_size(), 15);

    let stats = map.statistics();
    assert_eq!(stats.high_water_count(), 2);
    assert_eq!(stats.high_water_bytes(), 40);
    assert_eq!(stats.high_water_largest_element_bytes(), 30);

    let snapshot = map.snapshot();
    assert_eq!(snapshot.size, 2);
    assert!(snapshot.full);

    map.destroy();
    assert!(map.is_empty());
    assert_eq!(map.statistics().samples(), 0);
}

#[test]
fn filter_maps_are_refreshed_and_can_be_dropped() {
    let map: SimpleNflHashMap<u32, u64> = SimpleNflHashMap::new("m");
    map.put(1, 100, Reason::ADDED).unwrap();
    let even = map.sub_map(|k: &u32, _: &u64| k % 2 == 0);
    let odd = map.sub_map(|k: &u32, _: &u64| k % 2 == 1);
    assert_eq!(map.view_count(), 2);

    map.put(2, 200, Reason::ADDED).unwrap();
    map.put(3, 300, Reason::ADDED).unwrap();
    assert_eq!(even.entries(), vec![(2, 200)]);
    assert_eq!(odd.len(), 2);
    assert_eq!(odd.get(&3), Some(300));

    drop(odd);
    assert_eq!(map.view_count(), 1);
    even.destroy();
    assert_eq!(map.view_count(), 0);
    assert!(even.is_empty());
    assert_eq!(map.get_all(|_, v| *v >= 200).len(), 2);
}

#[test]
fn map_full_tracks_the_byte_bound() {
    let map: SimpleNflHashMap<u32, Msg> = SimpleNflHashMap::new("m");
    map.set_byte_capacity(100u64);
    let log: Arc<Mutex<Vec<EventValue<(u32, Msg)>>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&log);
    map.add_event_listener(
        Arc::new(move |e: &Event<(u32, Msg)>, _: Option<&UserData>| {
            sink.lock().push(e.new_value.clone())
        }),
        EventType::Full,
        None,
        None,
    );

    map.put(1, Msg::new("a", 60), Reason::ADDED).unwrap();
    assert!(log.lock().is_empty());
    map.put(2, Msg::new("b", 40), Reason::ADDED).unwrap();
    assert!(map.is_full());
    map.remove(&1, Reason::REMOVED);
    assert!(!map.is_full());

    assert_eq!(*log.lock(), vec![EventValue::Flag(true), EventValue::Flag(false)]);
}

#[test]
fn compare_mismatches_leave_statistics_alone() {
    let map: SimpleNflHashMap<u32, u64> = SimpleNflHashMap::new("m");
    map.put(1, 10, Reason::ADDED).unwrap();
    assert_eq!(map.statistics().samples(), 1);

    for _ in 0..3 {
        assert_eq!(
            map.put_if(1, 11, Some(&99), Reason::ADDED).unwrap(),
            CompareOutcome::Mismatch
        );
    }
    assert_eq!(
        map.remove_with_value(&1, Some(&99), Reason::REMOVED),
        CompareOutcome::Mismatch
    );
    assert_eq!(map.remove(&42, Reason::REMOVED), None);
    assert_eq!(map.statistics().samples(), 1);
    assert_eq!(map.get(&1), Some(10));
}
