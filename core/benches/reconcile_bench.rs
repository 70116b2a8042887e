use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::sync::Arc;
use treesync_core::binding::simple_diff;
use treesync_core::crdt::{apply_update, encode_diff, encode_state_vector, new_doc, Attrs, Container, Doc, YNode};
use treesync_core::local::{BasicSchema, LocalNode};
use treesync_core::{Binding, BindingConfig};
use yrs::{Text, Transact};

fn schema() -> BasicSchema {
    BasicSchema::from_json(
        r#"{
            "nodes": {
                "doc": { "content": "block" },
                "paragraph": { "content": "inline" }
            },
            "marks": ["em", "change"]
        }"#,
    )
    .unwrap()
}

fn paragraph(i: usize) -> Arc<LocalNode> {
    let text = format!("Paragraph number {} with some text in it", i);
    LocalNode::element("paragraph", Attrs::new(), vec![LocalNode::text(text, vec![])])
}

fn document(paragraphs: &[Arc<LocalNode>]) -> Arc<LocalNode> {
    LocalNode::element("doc", Attrs::new(), paragraphs.to_vec())
}

fn bound(paragraphs: &[Arc<LocalNode>]) -> (Doc, Binding<BasicSchema>) {
    let doc = new_doc(1);
    let mut binding = Binding::new(&doc, schema(), BindingConfig::default()).unwrap();
    binding.reconcile_local_to_replicated(&document(paragraphs)).unwrap();
    (doc, binding)
}

/// Initial load of a document into an empty replicated tree
fn bench_initial_reconcile(c: &mut Criterion) {
    let mut group = c.benchmark_group("initial_reconcile");

    for size in [10, 100, 1000].iter() {
        let paragraphs: Vec<_> = (0..*size).map(paragraph).collect();
        group.bench_with_input(BenchmarkId::from_parameter(size), &paragraphs, |b, paragraphs| {
            b.iter(|| black_box(bound(paragraphs)));
        });
    }

    group.finish();
}

/// Typing in the middle paragraph of a large document
fn bench_single_edit(c: &mut Criterion) {
    let mut group = c.benchmark_group("single_paragraph_edit");

    for size in [10, 100, 1000].iter() {
        let paragraphs: Vec<_> = (0..*size).map(paragraph).collect();
        group.bench_with_input(BenchmarkId::from_parameter(size), &paragraphs, |b, paragraphs| {
            b.iter_batched(
                || {
                    let (doc, binding) = bound(paragraphs);
                    let mut edited = paragraphs.clone();
                    let middle = edited.len() / 2;
                    let text = LocalNode::text("typed here", vec![]);
                    edited[middle] = LocalNode::element("paragraph", Attrs::new(), vec![text]);
                    (doc, binding, document(&edited))
                },
                |(_doc, mut binding, edited)| {
                    binding.reconcile_local_to_replicated(&edited).unwrap();
                },
                criterion::BatchSize::SmallInput,
            );
        });
    }

    group.finish();
}

/// Remote edit followed by an incremental rebuild
fn bench_remote_update(c: &mut Criterion) {
    c.bench_function("remote_update_1000_paragraphs", |b| {
        let paragraphs: Vec<_> = (0..1000).map(paragraph).collect();
        b.iter_batched(
            || {
                let (doc, mut binding) = bound(&paragraphs);
                binding.force_rerender().unwrap();

                let peer = new_doc(2);
                let root = Container::Fragment(peer.get_or_insert_xml_fragment("prosemirror"));
                let sync = |from: &Doc, to: &Doc| {
                    let update = encode_diff(from, &encode_state_vector(to)).unwrap();
                    apply_update(to, &update, None).unwrap();
                };
                sync(&doc, &peer);
                {
                    let mut txn = peer.transact_mut();
                    let paragraph = root.children(&txn)[500].as_container().unwrap();
                    if let YNode::Text(text) = &paragraph.children(&txn)[0] {
                        text.insert(&mut txn, 0, "remote ");
                    }
                }
                sync(&peer, &doc);
                (doc, binding)
            },
            |(_doc, mut binding)| {
                black_box(binding.process_remote().unwrap());
            },
            criterion::BatchSize::SmallInput,
        );
    });
}

/// Position round trip across a large document
fn bench_position_translation(c: &mut Criterion) {
    let paragraphs: Vec<_> = (0..1000).map(paragraph).collect();
    let (_doc, binding) = bound(&paragraphs);
    let end = document(&paragraphs).content_size();

    c.bench_function("position_round_trip_1000_paragraphs", |b| {
        b.iter(|| {
            let rel = binding.absolute_to_relative(black_box(end / 2)).unwrap();
            black_box(binding.relative_to_absolute(&rel));
        });
    });
}

fn bench_simple_diff(c: &mut Criterion) {
    let before = "a".repeat(5000) + &"b".repeat(5000);
    let after = "a".repeat(5000) + "inserted" + &"b".repeat(5000);

    c.bench_function("simple_diff_10k_chars", |b| {
        b.iter(|| black_box(simple_diff(&before, &after)));
    });
}

criterion_group!(
    benches,
    bench_initial_reconcile,
    bench_single_edit,
    bench_remote_update,
    bench_position_translation,
    bench_simple_diff,
);

criterion_main!(benches);
