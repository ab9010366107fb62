use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use serde_json::{json, Value};
use trialgraph::graph::{GraphStore, PropertyMap, PropertyValue};
use trialgraph::ingest::{run_extraction, DocumentStream, ExtractOptions, ExtractionContext, MemorySink};

fn document(i: usize) -> Value {
    json!({
        "protocolSection": {
            "identificationModule": {"nctId": format!("NCT{:08}", i), "briefTitle": "Benchmark study"},
            "statusModule": {"overallStatus": "COMPLETED"},
            "designModule": {"phases": ["PHASE2"], "enrollmentInfo": {"count": 100}},
            "sponsorCollaboratorsModule": {
                "leadSponsor": {"name": format!("Sponsor {}", i % 50)},
                "collaborators": [{"name": "Shared Network"}]
            },
            "conditionsModule": {"conditions": ["Diabetes", format!("Condition {}", i % 200)]},
            "armsInterventionsModule": {
                "interventions": [{"type": "DRUG", "name": "Drug: Metformin"}, {"type": "OTHER", "name": "Placebo"}],
                "armGroups": [
                    {"label": "Treatment", "interventionNames": ["Drug: Metformin"]},
                    {"label": "Control", "interventionNames": ["Placebo"]}
                ]
            },
            "contactsLocationsModule": {
                "locations": [
                    {"facility": "Site A", "city": "Lyon", "country": "France"},
                    {"facility": "Site B", "city": "Porto", "country": "Portugal"}
                ]
            },
            "eligibilityModule": {
                "eligibilityCriteria": "Inclusion Criteria:\n* Age >= 18\n* Type 2 diabetes\nExclusion Criteria:\n* Pregnant"
            }
        }
    })
}

/// Benchmark document extraction throughput into an in-memory sink
fn bench_extraction(c: &mut Criterion) {
    let mut group = c.benchmark_group("extraction");
    let options = ExtractOptions {
        progress_interval: u64::MAX,
        estimate_total: false,
        ..ExtractOptions::default()
    };

    for size in [100, 1000].iter() {
        let docs: Vec<Value> = (0..*size).map(document).collect();
        group.throughput(Throughput::Elements(*size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, _| {
            b.iter(|| {
                let mut ctx = ExtractionContext::new("bench");
                let mut sink = MemorySink::new();
                let stream = DocumentStream::from_documents(docs.clone());
                run_extraction(stream, &mut ctx, &mut sink, &options)
            });
        });
    }
    group.finish();
}

/// Benchmark keyed node merges against the embedded store
fn bench_merge(c: &mut Criterion) {
    let mut group = c.benchmark_group("merge_node");

    for size in [1000, 10_000].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            b.iter(|| {
                let mut store = GraphStore::new();
                let _ = store.create_unique_constraint("Trial", "nctId");
                for i in 0..size {
                    let mut props = PropertyMap::new();
                    props.insert("nctId".to_string(), PropertyValue::from(format!("NCT{:08}", i % (size / 2))));
                    props.insert("overallStatus".to_string(), PropertyValue::from("COMPLETED"));
                    let _ = store.merge_node("Trial", "nctId", props);
                }
                store
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_extraction, bench_merge);
criterion_main!(benches);
