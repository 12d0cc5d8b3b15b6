//! Performance benchmarks for the classification engine.
//!
//! Run with: `cargo bench`
//!
//! Performance targets:
//! - Single classification: <5us against 1000 rules
//! - Candidate narrowing: index probes, not the rule count, dominate
//! - Batch classification: amortizes the snapshot load
//! - Rule publish (add): <1ms against 1000 rules

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use rust_classifier::{
    ActionList, Classifier, ClassifierConfig, PacketHeader, PortRange, Rule, RuleFilter,
};

/// Build an engine with `rule_count` rules spread across prefixes, port
/// ranges and protocols.
fn build_classifier(rule_count: u32) -> Classifier {
    let classifier = Classifier::new(ClassifierConfig::default()).expect("valid config");
    for i in 0..rule_count {
        let third = u8::try_from((i / 256) % 256).expect("bounded");
        let fourth = u8::try_from(i % 256).expect("bounded");
        let filter = match i % 4 {
            0 => RuleFilter::any().with_src_prefix(
                format!("10.{third}.{fourth}.0/24").parse().expect("valid prefix"),
            ),
            1 => RuleFilter::any().with_dst_prefix(
                format!("172.16.{fourth}.0/24").parse().expect("valid prefix"),
            ),
            2 => {
                let base = u16::try_from((i % 600) * 100).expect("bounded");
                RuleFilter::any()
                    .with_dst_ports(PortRange::new(base, base + 99).expect("valid range"))
            }
            _ => RuleFilter::any().with_protocol(6),
        };
        classifier
            .add_rule(Rule::new(i, i32::try_from(i % 500).expect("bounded"), filter, ActionList::forward(i)))
            .expect("valid rule");
    }
    classifier
}

fn bench_classify_hit(c: &mut Criterion) {
    let mut group = c.benchmark_group("classify_hit");
    for rule_count in [10u32, 100, 1000] {
        let classifier = build_classifier(rule_count);
        // Matches the first /24 source-prefix rule
        let header = PacketHeader::new(0x0A00_0001, 0x0808_0808, 40000, 80, 6);
        assert!(classifier.classify(&header).is_match());

        group.bench_with_input(
            BenchmarkId::from_parameter(rule_count),
            &rule_count,
            |b, _| b.iter(|| classifier.classify(black_box(&header))),
        );
    }
    group.finish();
}

fn bench_classify_miss(c: &mut Criterion) {
    let mut group = c.benchmark_group("classify_miss");
    for rule_count in [10u32, 100, 1000] {
        let classifier = build_classifier(rule_count);
        // Outside every prefix, port range and protocol in the set
        let header = PacketHeader::new(0xC0A8_0001, 0xC0A8_0002, 61000, 61001, 47);
        assert!(!classifier.classify(&header).is_match());

        group.bench_with_input(
            BenchmarkId::from_parameter(rule_count),
            &rule_count,
            |b, _| b.iter(|| classifier.classify(black_box(&header))),
        );
    }
    group.finish();
}

fn bench_classify_batch(c: &mut Criterion) {
    let classifier = build_classifier(1000);
    let headers: Vec<PacketHeader> = (0..64u32)
        .map(|i| {
            PacketHeader::new(
                0x0A00_0000 | i,
                0xAC10_0000 | i,
                u16::try_from(30000 + i).expect("bounded"),
                u16::try_from(i * 97 % 60000).expect("bounded"),
                if i % 2 == 0 { 6 } else { 17 },
            )
        })
        .collect();

    c.bench_function("classify_batch_64", |b| {
        b.iter(|| classifier.classify_batch(black_box(&headers)));
    });
}

fn bench_rule_publish(c: &mut Criterion) {
    c.bench_function("add_delete_publish_1000_rules", |b| {
        let classifier = build_classifier(1000);
        let filter = RuleFilter::any().with_src_prefix("203.0.113.0/24".parse().expect("valid"));
        b.iter(|| {
            classifier
                .add_rule(Rule::new(100_000, 9999, filter.clone(), ActionList::drop()))
                .expect("fresh id");
            classifier.delete_rule(100_000).expect("present");
        });
    });
}

criterion_group!(
    benches,
    bench_classify_hit,
    bench_classify_miss,
    bench_classify_batch,
    bench_rule_publish
);
criterion_main!(benches);
