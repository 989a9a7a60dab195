use dcsm::DcValue;
use dcsm::coalesce::{Coalescer, NOTIFICATION_LIFETIME};
use dcsm::diff::{Change, IgnoreSet, diff};
use pretty_assertions::assert_eq;
use std::time::{Duration, Instant};

fn scalar(path: &str, old: i64, new: i64) -> Change {
    Change::Scalar {
        path: path.to_string(),
        old: DcValue::from(old),
        new: DcValue::from(new),
    }
}

#[test]
fn burst_on_one_path_is_one_chain() {
    let mut c = Coalescer::new();
    let t0 = Instant::now();
    c.ingest(&[scalar("hp", 10, 11)], t0);
    c.ingest(&[scalar("hp", 11, 12)], t0 + Duration::from_secs(2));
    c.ingest(&[scalar("hp", 12, 13)], t0 + Duration::from_secs(4));

    assert_eq!(c.notifications().len(), 1);
    let n = &c.notifications()[0];
    assert_eq!(n.rendered_lines(), vec!["hp 10→11→12→13"]);
    assert_eq!(n.timer_resets(), 2);
    assert_eq!(
        c.chain("hp").unwrap(),
        &[
            DcValue::from(10),
            DcValue::from(11),
            DcValue::from(12),
            DcValue::from(13)
        ]
    );
}

#[test]
fn activity_keeps_a_chain_alive_past_the_lifetime() {
    let mut c = Coalescer::new();
    let t0 = Instant::now();
    let step = NOTIFICATION_LIFETIME / 2;
    for i in 0..5 {
        c.ingest(&[scalar("mp", i, i + 1)], t0 + step * i as u32);
    }
    assert_eq!(c.notifications().len(), 1);
    assert_eq!(c.chain("mp").unwrap().len(), 6);

    let last = t0 + step * 4;
    assert!(c.expire(last + NOTIFICATION_LIFETIME - Duration::from_millis(1)).is_empty());
    assert_eq!(c.expire(last + NOTIFICATION_LIFETIME).len(), 1);
    assert!(c.notifications().is_empty());
}

#[test]
fn different_paths_in_separate_diffs_stack() {
    let mut c = Coalescer::new();
    let t0 = Instant::now();
    c.ingest(&[scalar("hp", 1, 2)], t0);
    c.ingest(&[scalar("mp", 5, 4)], t0 + Duration::from_secs(1));
    c.ingest(&[scalar("hp", 2, 3)], t0 + Duration::from_secs(2));

    let rendered: Vec<Vec<String>> = c.notifications().iter().map(|n| n.rendered_lines()).collect();
    assert_eq!(rendered, vec![vec!["hp 1→2→3"], vec!["mp 5→4"]]);
}

#[test]
fn every_change_kind_renders_on_one_line() {
    let old = DcValue::parse_json(r#"{"x":7,"gone":1,"hp":1,"sticker":[1,2]}"#).unwrap();
    let new = DcValue::parse_json(r#"{"x":7.0,"hp":2,"sticker":[2,3],"name":"Mio"}"#).unwrap();
    let mut c = Coalescer::new();
    c.ingest(&diff(&old, &new, &IgnoreSet::default()), Instant::now());

    assert_eq!(c.notifications().len(), 1);
    assert_eq!(
        c.notifications()[0].rendered_lines(),
        vec![
            "x: 7 (int) → 7.0 (float)",
            "- gone",
            "hp 1→2",
            "sticker -= 1",
            "sticker += 3",
            "+ name = \"Mio\"",
        ]
    );
}
