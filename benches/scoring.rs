//! Scoring hot path benchmarks
//!
//! Every fixture in a regression run and every capture in a drift sweep is
//! scored once, so these dominate run time for large corpora.
//!
//! Run with: cargo bench --bench scoring

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use gatekeep::domain::models::{OutputContract, ScoringConfig, SectionSpec};
use gatekeep::services::scoring::{DimensionSet, ScoringContext};

/// Markdown reply with a table, a code block and some emphasis, `paragraphs` long.
fn reply(paragraphs: usize) -> String {
    let mut text = String::from("## Summary\n\nHere are the **results** you asked for.\n\n");
    text.push_str("| Name | Score |\n|---|---|\n| Alice | 91 |\n| Bob | 78 |\n\n");
    for i in 0..paragraphs {
        text.push_str(&format!(
            "Paragraph {i} keeps the discussion going with a few more words about item {i}.\n\n"
        ));
    }
    text.push_str("```rust\nfn main() {}\n```\n");
    text
}

fn bench_fidelity(c: &mut Criterion) {
    let set = DimensionSet::transform_fidelity(&ScoringConfig::default()).unwrap();
    let mut group = c.benchmark_group("fidelity");

    for paragraphs in [1, 10, 50] {
        let expected = reply(paragraphs);
        let actual = expected.replace("**results**", "results").replace("| Bob | 78 |", "");
        group.throughput(Throughput::Bytes(expected.len() as u64));
        group.bench_with_input(
            BenchmarkId::new("score", paragraphs),
            &(expected, actual),
            |b, (expected, actual)| {
                let ctx = ScoringContext::for_input("show me the results table");
                b.iter(|| set.score(black_box(expected), black_box(actual), &ctx).unwrap());
            },
        );
    }
    group.finish();
}

fn bench_compliance(c: &mut Criterion) {
    let set = DimensionSet::contract_compliance().unwrap();
    let mut contract = OutputContract::new("results-digest");
    contract.required_sections = vec![
        SectionSpec::with_keywords("Summary", &["summary"]),
        SectionSpec::with_keywords("Results", &["results", "score"]),
    ];
    contract.required_markers = vec!["|".to_string()];
    contract.reference_examples = vec![reply(5)];
    let compiled = contract.compile().unwrap();

    let mut group = c.benchmark_group("compliance");
    for paragraphs in [1, 10, 50] {
        let actual = reply(paragraphs);
        group.bench_with_input(BenchmarkId::new("score", paragraphs), &actual, |b, actual| {
            let ctx = ScoringContext::for_contract("", &compiled);
            b.iter(|| set.score("", black_box(actual), &ctx).unwrap());
        });
    }
    group.finish();
}

criterion_group!(benches, bench_fidelity, bench_compliance);
criterion_main!(benches);
