mod common;

use std::sync::Arc;

use parking_lot::Mutex;

use blipmq_lists::lists::{EventType, EventValue, ListError, NflPriorityFifoSet, Reason};
use common::{ids, init_logging, msg, recorder, Msg};

fn is_x(m: &Msg) -> bool {
    m.id().starts_with('x')
}

#[test]
fn filter_view_follows_parent_without_being_told() {
    init_logging();
    let set: NflPriorityFifoSet<Msg> = NflPriorityFifoSet::new("q", 3);
    set.add(1, msg("x1"), Reason::ADDED).unwrap();
    set.add(1, msg("y1"), Reason::ADDED).unwrap();
    let view = set.sub_set(is_x);
    assert_eq!(ids(&view.to_vec()), vec!["x1"]);

    set.add(2, msg("x2"), Reason::ADDED).unwrap();
    set.add(0, msg("x0"), Reason::ADDED).unwrap();
    set.add(0, msg("y0"), Reason::ADDED).unwrap();
    assert_eq!(ids(&view.to_vec()), vec!["x0", "x1", "x2"]);
    assert_eq!(view.len(), 3);

    set.remove(&msg("x1"), Reason::REMOVED);
    set.remove(&msg("y0"), Reason::REMOVED);
    set.remove_next(Reason::DELIVERED).unwrap();
    assert_eq!(ids(&view.to_vec()), vec!["x2"]);
    assert!(view.contains(&msg("x2")));
    assert!(!view.contains(&msg("y1")));
}

#[test]
fn filter_view_cursor_tracks_the_first_match() {
    let set: NflPriorityFifoSet<Msg> = NflPriorityFifoSet::new("q", 3);
    for i in 0..5 {
        set.add(1, msg(&format!("y{i}")), Reason::ADDED).unwrap();
    }
    set.add(2, msg("x-low"), Reason::ADDED).unwrap();
    let view = set.sub_set(is_x);
    assert_eq!(view.peek_next().map(|m| m.id().to_string()), Some("x-low".to_string()));

    set.add(0, msg("x-high"), Reason::ADDED).unwrap();
    assert_eq!(view.peek_next().unwrap().id(), "x-high");

    set.add_all_to_front(vec![msg("x-front")], 0, Reason::REQUEUED).unwrap();
    assert_eq!(view.peek_next().unwrap().id(), "x-front");

    set.remove(&msg("x-front"), Reason::REMOVED);
    set.remove(&msg("x-high"), Reason::REMOVED);
    assert_eq!(view.peek_next().unwrap().id(), "x-low");
}

#[test]
fn filter_view_removes_and_adds_through_parent() {
    let set: NflPriorityFifoSet<Msg> = NflPriorityFifoSet::new("q", 3);
    set.add(0, msg("y"), Reason::ADDED).unwrap();
    set.add(1, msg("x"), Reason::ADDED).unwrap();
    let view = set.sub_set(is_x);

    assert_eq!(view.remove_next(Reason::DELIVERED).unwrap().id(), "x");
    assert_eq!(ids(&set.to_vec()), vec!["y"]);
    assert_eq!(view.remove_next(Reason::DELIVERED).unwrap_err(), ListError::NoSuchElement);

    let err = view.add(1, msg("nope"), Reason::ADDED).unwrap_err();
    assert!(matches!(err, ListError::InvalidState(_)));
    assert_eq!(set.len(), 1);

    view.add_default(msg("x2"), Reason::ADDED).unwrap();
    assert!(set.contains(&msg("x2")));
    assert!(!view.remove(&msg("y"), Reason::REMOVED));
    assert!(view.remove(&msg("x2"), Reason::REMOVED));
}

#[test]
fn comparator_view_keeps_its_own_order() {
    let set: NflPriorityFifoSet<Msg> = NflPriorityFifoSet::new("q", 3);
    set.add(0, Msg::new("big", 90), Reason::ADDED).unwrap();
    set.add(2, Msg::new("small", 5), Reason::ADDED).unwrap();
    let by_size = set.sub_set_by(|a: &Msg, b: &Msg| {
        blipmq_lists::lists::Element::reported_bytes(a)
            .cmp(&blipmq_lists::lists::Element::reported_bytes(b))
    });
    assert_eq!(ids(&by_size.to_vec()), vec!["small", "big"]);

    by_size.add(1, Msg::new("mid", 40), Reason::ADDED).unwrap();
    assert_eq!(ids(&by_size.to_vec()), vec!["small", "mid", "big"]);
    assert_eq!(ids(&set.to_vec()), vec!["big", "mid", "small"]);

    assert_eq!(by_size.remove_next(Reason::DELIVERED).unwrap().id(), "small");
    assert!(!set.contains(&msg("small")));
    set.remove(&msg("big"), Reason::REMOVED);
    assert_eq!(by_size.first().map(|m| m.id().to_string()), Some("mid".to_string()));
    assert_eq!(by_size.len(), 1);
}

#[test]
fn dropped_views_stop_being_maintained() {
    let set: NflPriorityFifoSet<Msg> = NflPriorityFifoSet::new("q", 3);
    let kept = set.sub_set(is_x);
    {
        let _filter = set.sub_set(|m: &Msg| m.id().len() > 2);
        let _sorted = set.sub_set_by(|a: &Msg, b: &Msg| a.id().cmp(b.id()));
        assert_eq!(set.view_count(), 3);
    }
    assert_eq!(set.view_count(), 1);

    set.add(1, msg("x"), Reason::ADDED).unwrap();
    assert_eq!(kept.len(), 1);
    drop(kept);
    assert_eq!(set.view_count(), 0);
}

#[test]
fn cloned_handles_keep_a_view_alive() {
    let set: NflPriorityFifoSet<Msg> = NflPriorityFifoSet::new("q", 3);
    let view = set.sub_set(is_x);
    let other = view.clone();
    drop(view);
    assert_eq!(set.view_count(), 1);
    set.add(1, msg("x"), Reason::ADDED).unwrap();
    assert_eq!(other.len(), 1);
}

#[test]
fn destroyed_view_is_unregistered_and_inert() {
    let set: NflPriorityFifoSet<Msg> = NflPriorityFifoSet::new("q", 3);
    set.add(1, msg("x"), Reason::ADDED).unwrap();
    let view = set.sub_set(is_x);
    view.destroy();
    assert!(view.is_destroyed());
    assert_eq!(set.view_count(), 0);
    assert!(view.is_empty());
    assert!(view.to_vec().is_empty());
    assert!(matches!(
        view.remove_next(Reason::DELIVERED),
        Err(ListError::InvalidState(_))
    ));
    assert_eq!(set.len(), 1);
}

#[test]
fn destroying_the_parent_detaches_views() {
    let set: NflPriorityFifoSet<Msg> = NflPriorityFifoSet::new("q", 3);
    set.add(1, msg("x"), Reason::ADDED).unwrap();
    let view = set.sub_set(is_x);
    let sorted = set.sub_set_by(|a: &Msg, b: &Msg| a.id().cmp(b.id()));
    set.destroy();
    assert!(view.is_destroyed());
    assert!(sorted.is_destroyed());
    assert!(set.is_empty());
    assert_eq!(set.view_count(), 0);
}

#[test]
fn views_announce_their_own_emptiness() {
    let set: NflPriorityFifoSet<Msg> = NflPriorityFifoSet::new("q", 3);
    let view = set.sub_set(is_x);
    let log = Arc::new(Mutex::new(Vec::new()));
    view.add_event_listener(recorder(&log), EventType::Empty, None, None);

    set.add(1, msg("y"), Reason::ADDED).unwrap();
    assert!(log.lock().is_empty());
    set.add(1, msg("x"), Reason::ADDED).unwrap();
    set.add(1, msg("x2"), Reason::ADDED).unwrap();
    set.clear(Reason::CLEARED);

    let seen = log.lock().clone();
    assert_eq!(seen.len(), 2);
    assert_eq!(seen[0].new, EventValue::Flag(false));
    assert_eq!(seen[1].new, EventValue::Flag(true));
    assert_eq!(seen[1].reason, Reason::CLEARED);
}
