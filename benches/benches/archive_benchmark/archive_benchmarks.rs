use std::hint::black_box;

use carbon::{
    archive::{
        archive_from_model, decode::read_archive,
        packer::{HuffmanPacker, Pack},
        ArchiveOptions, MemFile, SequentialOids,
    },
    model::{object_from_json, StringDict, SyncStringDict},
    Archive, PackerKind,
};
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rand::{rngs::SmallRng, Rng, SeedableRng};
use serde_json::{json, Value};

/// Документ с `rows` строками массива объектов и набором плоских полей.
fn document(rows: usize) -> Value {
    let mut rng = SmallRng::seed_from_u64(42);
    let items: Vec<Value> = (0..rows)
        .map(|i| {
            json!({
                "id": i,
                "name": format!("user-{}", rng.gen_range(0..1000)),
                "score": rng.gen_range(0.0f64..100.0),
                "tags": ["a", "b", if i % 2 == 0 { "even" } else { "odd" }],
                "active": rng.gen_bool(0.5),
            })
        })
        .collect();
    json!({
        "title": "benchmark",
        "version": 3,
        "ratio": 0.75,
        "items": items,
    })
}

fn encode(
    doc: &Value,
    compressor: PackerKind,
) -> Vec<u8> {
    let mut dict = SyncStringDict::new();
    let model = object_from_json(doc, &mut dict).unwrap();
    let options = ArchiveOptions {
        compressor,
        ..ArchiveOptions::default()
    };
    archive_from_model(&model, &dict, &options, &mut SequentialOids::default())
        .unwrap()
        .into_inner()
}

fn bench_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("archive build");
    for rows in [10, 100, 1000] {
        let doc = document(rows);
        for compressor in [PackerKind::None, PackerKind::Huffman] {
            group.bench_with_input(
                BenchmarkId::new(compressor.name(), rows),
                &doc,
                |b, doc| b.iter(|| black_box(encode(black_box(doc), compressor))),
            );
        }
    }
    group.finish();
}

fn bench_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("archive decode");
    for rows in [10, 100, 1000] {
        let data = encode(&document(rows), PackerKind::None);
        group.throughput(Throughput::Bytes(data.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(rows), &data, |b, data| {
            b.iter(|| black_box(read_archive(black_box(data)).unwrap()))
        });
    }
    group.finish();
}

fn bench_huffman(c: &mut Criterion) {
    let corpus: Vec<String> = (0..500).map(|i| format!("key-{i}-value-{}", i * 7)).collect();
    let refs: Vec<&str> = corpus.iter().map(String::as_str).collect();
    let packer = HuffmanPacker::from_corpus(&refs).unwrap();

    c.bench_function("huffman encode 500 strings", |b| {
        b.iter(|| {
            let mut out = MemFile::with_capacity(8 * 1024);
            for s in &refs {
                packer.encode(&mut out, black_box(s)).unwrap();
            }
            black_box(out);
        })
    });
}

fn bench_lookup(c: &mut Criterion) {
    let doc = document(1000);
    let mut dict = SyncStringDict::new();
    let model = object_from_json(&doc, &mut dict).unwrap();
    let options = ArchiveOptions {
        bake_index: true,
        ..ArchiveOptions::default()
    };
    let data = archive_from_model(&model, &dict, &options, &mut SequentialOids::default())
        .unwrap()
        .into_inner();
    let (_, sids) = dict.contents();

    let mut group = c.benchmark_group("string lookup");
    group.bench_function("cached", |b| {
        let archive = Archive::from_stream(data.clone()).unwrap();
        let query = archive.query();
        b.iter(|| {
            for sid in &sids {
                black_box(query.fetch_string(*sid).unwrap());
            }
        })
    });
    group.bench_function("uncached", |b| {
        let archive = Archive::from_stream(data.clone()).unwrap().with_cache_capacity(1);
        let query = archive.query();
        b.iter(|| {
            for sid in &sids {
                black_box(query.fetch_string(*sid).unwrap());
            }
        })
    });
    group.finish();
}

criterion_group!(benches, bench_build, bench_decode, bench_huffman, bench_lookup);
criterion_main!(benches);
