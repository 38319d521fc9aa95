use crate::testutil::*;

#[test]
fn test_top_sort_is_idempotent() {
    let mut p = prons();
    let lat = slf(SHUFFLED_SLF, &mut p);
    let mut again = lat.clone();
    again.do_top_sort();

    let arcs = |l: &crate::lattice::Lattice| -> Vec<(usize, usize, u32)> {
        l.links().iter().map(|k| (k.start, k.end, k.word)).collect()
    };
    assert_eq!(arcs(&lat), arcs(&again));
    let words: Vec<_> = lat.nodes().iter().map(|n| n.word).collect();
    let words_again: Vec<_> = again.nodes().iter().map(|n| n.word).collect();
    assert_eq!(words, words_again);
}

#[test]
fn test_links_point_forward_after_sort() {
    let mut p = prons();
    for lat in [slf(SHUFFLED_SLF, &mut p), fsm(HELLO_WORLD_FSM, &mut p)] {
        for link in lat.links() {
            assert!(link.start < link.end, "{link}");
        }
        for w in lat.links().windows(2) {
            assert!((w[0].end, w[0].start) <= (w[1].end, w[1].start));
        }
    }
}

#[test]
fn test_less_nodes() {
    let mut p = prons();
    let lat = slf(SHUFFLED_SLF, &mut p);
    // 0 -> 1 -> 2 -> 3 -> 4
    assert!(lat.less_nodes(0, 1, 1));
    assert!(!lat.less_nodes(0, 2, 1));
    assert!(lat.less_nodes(0, 2, 2));
    assert!(lat.less_nodes(0, 4, 10));
    assert!(!lat.less_nodes(0, 4, 3));
    assert!(!lat.less_nodes(3, 1, 10));
}

#[test]
fn test_less_nodes_depth_zero_is_identity() {
    let mut p = prons();
    let lat = slf(SHUFFLED_SLF, &mut p);
    assert!(lat.less_nodes(2, 2, 0));
    assert!(!lat.less_nodes(1, 2, 0));
}

#[test]
fn test_put_max_dist() {
    let mut p = prons();
    let mut lat = slf(SHUFFLED_SLF, &mut p);
    lat.put_max_dist(&p);
    // !SENT_START=11 and !SENT_END=10 letters; HELLO=4, HI=2, WORLD=4, WORD=3 phones.
    let dist: Vec<i32> = lat.nodes().iter().map(|n| n.max_dist).collect();
    assert_eq!(dist, vec![0, 11, 15, 19, 29]);
}

#[test]
fn test_max_dist_falls_back_to_letters() {
    let text = "\
N=3 L=2
I=0
I=1
I=2
J=0 S=0 E=1 W=OK a=-1
J=1 S=1 E=2 W=THANKS a=-1
";
    let mut p = prons();
    let mut lat = slf(text, &mut p);
    lat.put_max_dist(&p);
    assert_eq!(lat.node(2).max_dist, 8);
}

#[test]
fn test_span_uses_max_dist_without_times() {
    let mut p = prons();
    let mut lat = slf(HELLO_WORLD_SLF, &mut p);
    assert_eq!(lat.span(lat.link(1)), (0.5, 1.0));
    lat.set_no_time_info();
    lat.put_max_dist(&p);
    assert!(!lat.has_time_info());
    assert_eq!(lat.span(lat.link(1)), (4.0, 8.0));
}

#[test]
fn test_no_words() {
    let mut p = prons();
    assert_eq!(slf(SHUFFLED_SLF, &mut p).no_words(), 6);
    assert_eq!(fsm(HELLO_WORLD_FSM, &mut p).no_words(), 5);
}

#[test]
fn test_display() {
    let mut p = prons();
    let lat = slf(HELLO_WORLD_SLF, &mut p);
    let dump = lat.to_string();
    assert!(dump.starts_with("#\n#nodes\n#\n"));
    assert!(dump.contains("#links"));
    assert!(dump.contains("I=2    t=1"));
    assert!(dump.contains(" J=1      S=1     E=2"));
    assert!(lat.info().to_string().contains("NODES=3"));
}
