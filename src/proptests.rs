use std::collections::BTreeMap;

use proptest::prelude::*;
use proptest_derive::Arbitrary;

use crate::{HeavyHitters, Hitter};

/// Exact reference model: keeps every inserted sequence and computes true
/// occurrence-weighted substring totals by brute force.
#[derive(Default)]
struct Model {
    strings: Vec<(Vec<u64>, u64)>,
    grand_total: u64,
}

impl Model {
    fn insert(&mut self, sequence: Vec<u64>, count: u64) {
        self.grand_total += count;
        self.strings.push((sequence, count));
    }

    /// True weight of `pattern`: inserted weight times occurrence positions.
    fn weight(&self, pattern: &[u64]) -> u64 {
        self.strings
            .iter()
            .map(|(s, count)| {
                if pattern.is_empty() || pattern.len() > s.len() {
                    0
                } else {
                    s.windows(pattern.len()).filter(|w| *w == pattern).count() as u64 * count
                }
            })
            .sum()
    }
}

#[derive(Arbitrary, Debug, Clone, Copy)]
enum ErrorLevel {
    Coarse,
    Medium,
    Fine,
    Exact,
}

impl ErrorLevel {
    fn value(self) -> f64 {
        match self {
            ErrorLevel::Coarse => 0.5,
            ErrorLevel::Medium => 0.25,
            ErrorLevel::Fine => 0.1,
            // Buckets never fill within a test stream: no compression runs.
            ErrorLevel::Exact => 1e-6,
        }
    }

    fn is_exact(self) -> bool {
        matches!(self, ErrorLevel::Exact)
    }
}

/// A backtrace body over a deliberately tiny alphabet (to force shared
/// suffixes and interior branching) plus a sample weight.
#[derive(Debug, Clone)]
struct Entry {
    body: Vec<u64>,
    count: u64,
}

fn entry_strategy() -> impl Strategy<Value = Entry> {
    (prop::collection::vec(0u64..6, 1..8), 0u64..8)
        .prop_map(|(body, count)| Entry { body, count })
}

fn stream_strategy() -> impl Strategy<Value = Vec<Entry>> {
    prop::collection::vec(entry_strategy(), 1..40)
}

fn longest_common_prefix(a: &[u64], b: &[u64]) -> usize {
    a.iter().zip(b).take_while(|(x, y)| x == y).count()
}

/// Drives the engine and the model in lockstep, streaming each sequence via
/// its true common prefix with the previous one.
struct Harness {
    engine: HeavyHitters<u64>,
    model: Model,
    previous: Vec<u64>,
    next_marker: u64,
}

impl Harness {
    fn new(error: f64) -> Self {
        Harness {
            engine: HeavyHitters::new(error),
            model: Model::default(),
            previous: Vec::new(),
            next_marker: 0,
        }
    }

    fn insert(&mut self, entry: &Entry) {
        let mut sequence = entry.body.clone();
        sequence.push((1 << 40) + self.next_marker);
        self.next_marker += 1;

        let cp = longest_common_prefix(&self.previous, &sequence);
        self.engine.insert(cp, &sequence[cp..], entry.count);
        self.model.insert(sequence.clone(), entry.count);
        self.previous = sequence;
    }
}

fn hitter_key(h: &Hitter<u64>) -> (Vec<u64>, u64, u64, u64) {
    (h.label.clone(), h.light, h.total, h.upper)
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 128,
        failure_persistence: None,
        ..ProptestConfig::default()
    })]

    #[test]
    fn bounds_bracket_exact_weights(
        level in any::<ErrorLevel>(),
        entries in stream_strategy(),
        frequency in prop_oneof![Just(0.0), Just(0.1), Just(0.4)],
    ) {
        let mut harness = Harness::new(level.value());
        for entry in &entries {
            harness.insert(entry);
            harness.engine.check_invariants();
        }

        let report = harness.engine.output(frequency);
        prop_assert_eq!(report.grand_total, harness.model.grand_total);

        for pair in report.hitters.windows(2) {
            prop_assert!(pair[0].light >= pair[1].light, "output not sorted");
        }

        for h in &report.hitters {
            let truth = harness.model.weight(&h.label);
            prop_assert!(
                h.light <= truth,
                "light {} exceeds exact weight {} for {:?}",
                h.light, truth, h.label
            );
            prop_assert!(
                truth <= h.upper,
                "upper {} below exact weight {} for {:?}",
                h.upper, truth, h.label
            );
            prop_assert!(h.light <= h.total && h.total <= h.upper);
        }
    }

    #[test]
    fn exact_mode_reports_exact_totals(
        entries in stream_strategy(),
    ) {
        // With a tiny error the bucket never fills, so nothing is squashed
        // and every reported total must be exact.
        let mut harness = Harness::new(1e-6);
        for entry in &entries {
            harness.insert(entry);
        }
        let report = harness.engine.output(0.0);
        for h in &report.hitters {
            let truth = harness.model.weight(&h.label);
            prop_assert_eq!(
                h.total, truth,
                "total for {:?} drifted without compression", &h.label
            );
            prop_assert_eq!(h.upper, truth);
        }
    }

    #[test]
    fn reoutput_is_identical(
        level in any::<ErrorLevel>(),
        entries in stream_strategy(),
    ) {
        let mut harness = Harness::new(level.value());
        for entry in &entries {
            harness.insert(entry);
        }
        let first: Vec<_> = harness.engine.output(0.2).hitters.iter().map(hitter_key).collect();
        let second: Vec<_> = harness.engine.output(0.2).hitters.iter().map(hitter_key).collect();
        prop_assert_eq!(first, second);
    }

    #[test]
    fn streaming_matches_batch_inserts(
        entries in stream_strategy(),
    ) {
        // Streamed common prefixes must be indistinguishable from always
        // restarting at the root (common_prefix = 0).
        let mut streamed = Harness::new(0.25);
        for entry in &entries {
            streamed.insert(entry);
        }

        let mut batch: HeavyHitters<u64> = HeavyHitters::new(0.25);
        for (i, entry) in entries.iter().enumerate() {
            let mut sequence = entry.body.clone();
            sequence.push((1 << 40) + i as u64);
            batch.insert(0, &sequence, entry.count);
        }

        let mut got: Vec<_> = streamed.engine.output(0.0).hitters.iter().map(hitter_key).collect();
        let mut want: Vec<_> = batch.output(0.0).hitters.iter().map(hitter_key).collect();
        got.sort();
        want.sort();
        prop_assert_eq!(got, want);
    }

    #[test]
    fn model_agrees_with_itself(
        entries in stream_strategy(),
    ) {
        // Guard the reference model: summing full-sequence weights through a
        // BTreeMap must equal its grand total.
        let mut model = Model::default();
        for (i, entry) in entries.iter().enumerate() {
            let mut sequence = entry.body.clone();
            sequence.push((1 << 40) + i as u64);
            model.insert(sequence, entry.count);
        }
        let mut by_sequence: BTreeMap<Vec<u64>, u64> = BTreeMap::new();
        for (s, c) in &model.strings {
            *by_sequence.entry(s.clone()).or_insert(0) += c;
        }
        let total: u64 = by_sequence.values().sum();
        prop_assert_eq!(total, model.grand_total);
    }
}

#[test]
fn error_level_values_are_valid() {
    for level in [
        ErrorLevel::Coarse,
        ErrorLevel::Medium,
        ErrorLevel::Fine,
        ErrorLevel::Exact,
    ] {
        let e = level.value();
        assert!(e > 0.0 && e < 1.0);
        assert_eq!(level.is_exact(), e < 1e-3);
    }
}
