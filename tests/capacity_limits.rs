mod common;

use blipmq_lists::lists::{EventType, Limit, ListError, NflPriorityFifoSet, Reason};
use common::{init_logging, kinds, record, Msg};

#[test]
fn count_limit_rejects_the_extra_add() {
    init_logging();
    let set: NflPriorityFifoSet<Msg> = NflPriorityFifoSet::new("q", 3);
    set.set_capacity(5u64);
    for i in 0..5 {
        set.add(1, Msg::new(&format!("m{i}"), 1), Reason::ADDED).unwrap();
    }
    assert!(set.is_full());
    assert_eq!(set.free_space(), Some(0));
    let err = set.add(1, Msg::new("m5", 1), Reason::ADDED).unwrap_err();
    assert!(err.is_out_of_limits());
    assert_eq!(set.len(), 5);

    // Replacing an element already present needs no extra room.
    set.add(0, Msg::new("m3", 1), Reason::ADDED).unwrap();
    assert_eq!(set.len(), 5);
}

#[test]
fn byte_accounting_follows_adds_and_removes() {
    let set: NflPriorityFifoSet<Msg> = NflPriorityFifoSet::new("q", 3);
    let sizes = [7u64, 13, 1, 40, 22];
    let messages: Vec<Msg> = sizes
        .iter()
        .enumerate()
        .map(|(i, size)| Msg::new(&format!("m{i}"), *size))
        .collect();
    for (i, m) in messages.iter().enumerate() {
        set.add(i % 3, m.clone(), Reason::ADDED).unwrap();
    }
    assert_eq!(set.byte_size(), 83);

    set.remove(&messages[3], Reason::REMOVED);
    set.remove_next(Reason::DELIVERED).unwrap();
    let expected: u64 = set
        .to_vec()
        .iter()
        .map(|m| sizes[m.id()[1..].parse::<usize>().unwrap()])
        .sum();
    assert_eq!(set.byte_size(), expected);

    set.clear(Reason::CLEARED);
    assert_eq!(set.byte_size(), 0);
}

#[test]
fn element_and_byte_bounds() {
    let set: NflPriorityFifoSet<Msg> = NflPriorityFifoSet::new("q", 3);
    set.set_max_element_bytes(50u64);
    set.set_byte_capacity(100u64);

    let err = set.add(1, Msg::new("huge", 51), Reason::ADDED).unwrap_err();
    assert_eq!(err, ListError::ItemSizeExceeded { attempted: 51, limit: 50 });

    set.add(1, Msg::new("a", 50), Reason::ADDED).unwrap();
    set.add(1, Msg::new("b", 40), Reason::ADDED).unwrap();
    assert_eq!(set.free_bytes(), Some(10));
    let err = set.add(1, Msg::new("c", 11), Reason::ADDED).unwrap_err();
    assert_eq!(err, ListError::ByteCapacityExceeded { attempted: 101, limit: 100 });
    assert_eq!(set.byte_size(), 90);
}

#[test]
fn unsized_elements_need_no_size_until_bytes_are_bounded() {
    let set: NflPriorityFifoSet<u32> = NflPriorityFifoSet::new("plain", 3);
    set.add(1, 1, Reason::ADDED).unwrap();
    set.set_byte_capacity(1024u64);
    let err = set.add(1, 2, Reason::ADDED).unwrap_err();
    assert_eq!(err, ListError::TypeMismatch { capability: "sized" });
    assert_eq!(set.len(), 1);

    set.set_byte_capacity(Limit::Unlimited);
    set.add(1, 2, Reason::ADDED).unwrap();
}

#[test]
fn unenforced_limits_only_notify() {
    let set: NflPriorityFifoSet<Msg> = NflPriorityFifoSet::new("q", 3);
    set.set_capacity(1u64);
    set.set_enforce_limits(false);
    let log = record(&set, &[EventType::Full]);

    set.add(1, Msg::new("a", 1), Reason::ADDED).unwrap();
    set.add(1, Msg::new("b", 1), Reason::ADDED).unwrap();
    assert_eq!(set.len(), 2);
    assert_eq!(set.free_space(), Some(0));
    assert_eq!(kinds(&log), vec![EventType::Full]);
}

#[test]
fn statistics_track_high_water_and_averages() {
    let set: NflPriorityFifoSet<Msg> = NflPriorityFifoSet::new("q", 3);
    set.add(1, Msg::new("a", 10), Reason::ADDED).unwrap();
    set.add(1, Msg::new("b", 30), Reason::ADDED).unwrap();
    set.remove_next(Reason::DELIVERED).unwrap();

    assert_eq!(set.high_water_count(), 2);
    assert_eq!(set.high_water_bytes(), 40);
    assert_eq!(set.high_water_largest_element_bytes(), 30);
    // Occupancy after each mutation: 1, 2, 1.
    assert!((set.average_count() - 4.0 / 3.0).abs() < 1e-9);
    assert!((set.average_bytes() - 80.0 / 3.0).abs() < 1e-9);
    assert!((set.average_element_bytes() - 20.0).abs() < 1e-9);

    set.destroy();
    assert_eq!(set.high_water_count(), 0);
    assert_eq!(set.statistics().samples(), 0);
}

#[test]
fn config_builds_limited_sets() {
    let cfg =
        blipmq_lists::ListsConfig::from_toml_str("levels = 2\ncapacity = 1\ndefault_priority = 0")
            .unwrap();
    let set: NflPriorityFifoSet<Msg> = NflPriorityFifoSet::from_config("cfg", &cfg).unwrap();
    assert_eq!(set.levels(), 2);
    assert_eq!(set.default_priority(), 0);
    assert_eq!(set.capacity(), Limit::AtMost(1));
    set.add_default(Msg::new("a", 1), Reason::ADDED).unwrap();
    assert!(set.add_default(Msg::new("b", 1), Reason::ADDED).is_err());
    assert!(set.is_full());
}
