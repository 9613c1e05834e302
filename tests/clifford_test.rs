use std::collections::HashSet;
use proptest::prelude::*;
use rand::{ SeedableRng, rngs::StdRng };
use randbench::{
    ErrorKind,
    clifford::{ Action, C1, CliffordGroup, NUM_CLIFFORDS },
    sequence::{ SequenceBank, interleaved_sequence, interleaved_sequence_named, random_sequence },
};

fn group() -> &'static CliffordGroup { CliffordGroup::global().unwrap() }

fn gate() -> impl Strategy<Value = C1> {
    (0..NUM_CLIFFORDS).prop_map(|k| C1::from_index(k).unwrap())
}

#[test]
fn signatures_are_distinct() {
    let sigs: HashSet<_> = C1::ALL.iter().map(|g| group().signature(*g)).collect();
    assert_eq!(sigs.len(), NUM_CLIFFORDS);
    assert_eq!(group().len(), NUM_CLIFFORDS);
}

#[test]
fn table_order_matches_names() {
    let names: Vec<&str> = C1::ALL.iter().map(|g| g.name()).collect();
    assert_eq!(&names[..10], &["Z", "X", "Y", "Z/2", "X/2", "Y/2", "-Z/2", "-X/2", "-Y/2", "I"]);
    assert_eq!(names[10], "X,Z/2");
    assert_eq!(names[23], "-Y/2,-Z/2");
    group().iter()
        .for_each(|(g, action)| {
            let from_pulses =
                g.playback(false).iter()
                .fold(Action::IDENTITY, |acc, p| p.action().compose(&acc));
            assert_eq!(&from_pulses, action, "{g}");
        });
}

#[test]
fn names_round_trip() {
    for g in C1::ALL {
        assert_eq!(g.name().parse::<C1>().unwrap(), g);
        assert_eq!(g.name().to_lowercase().parse::<C1>().unwrap(), g);
    }
    let err = "Q/2".parse::<C1>().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
}

#[test]
fn sequences_resolve_to_identity() {
    let mut rng = StdRng::seed_from_u64(10546);
    for depth in [0, 1, 2, 5, 20] {
        let seq = random_sequence(group(), depth, &mut rng).unwrap();
        assert_eq!(seq.names().len(), depth + 1);
        assert!(seq.resolves_to_identity(group()));
        assert_eq!(group().compose(seq.recovery(), seq.total()), C1::I);
    }
}

#[test]
fn interleaved_positions() {
    let mut rng = StdRng::seed_from_u64(1);
    for depth in [0, 1, 4, 9] {
        let seq = interleaved_sequence(group(), depth, C1::X, &mut rng).unwrap();
        let names = seq.names();
        assert_eq!(names.len(), 2 * depth + 1);
        names.iter().skip(1).step_by(2).take(depth)
            .for_each(|name| assert_eq!(*name, "X"));
        assert!(seq.resolves_to_identity(group()));
    }
    let err = interleaved_sequence_named(group(), 3, "W", &mut rng).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
}

#[test]
fn bank_replays_across_loops() {
    let mut rng = StdRng::seed_from_u64(5);
    let mut bank = SequenceBank::new(Some(C1::HalfY));
    let first: Vec<_> =
        (0..3)
        .map(|var| bank.get_or_generate(group(), 0, var, 7, &mut rng).unwrap().clone())
        .collect();
    let replay: Vec<_> =
        (0..3)
        .map(|var| bank.get_or_generate(group(), 0, var, 7, &mut rng).unwrap().clone())
        .collect();
    assert_eq!(first, replay);
    assert!(first.iter().all(|seq| seq.gates().iter().skip(1).step_by(2).all(|g| *g == C1::HalfY)));
}

proptest! {
    #[test]
    fn identity_is_neutral(g in gate()) {
        prop_assert_eq!(group().compose(g, C1::I), g);
        prop_assert_eq!(group().compose(C1::I, g), g);
        prop_assert!(group().compose(g, group().invert(g)).is_identity());
        prop_assert!(group().compose(group().invert(g), g).is_identity());
    }

    #[test]
    fn composition_is_associative(a in gate(), b in gate(), c in gate()) {
        let ab_c = group().compose(group().compose(a, b), c);
        let a_bc = group().compose(a, group().compose(b, c));
        prop_assert_eq!(ab_c, a_bc);
    }

    #[test]
    fn inverted_playback_is_inverse(g in gate()) {
        let action =
            g.playback(true).iter()
            .fold(Action::IDENTITY, |acc, p| p.action().compose(&acc));
        prop_assert_eq!(&action, group().action(group().invert(g)));
    }

    #[test]
    fn total_agrees_with_compose(gates in prop::collection::vec(gate(), 0..30)) {
        let folded = gates.iter().fold(C1::I, |acc, g| group().compose(*g, acc));
        prop_assert_eq!(group().total(gates.iter().copied()).unwrap(), folded);
    }
}
