use criterion::{criterion_group, criterion_main, Criterion};
use std::hint::black_box;
use vantage_core::{FeatureFlag, FlagId, TeamId};
use vantage_flags::{build_local_evaluation, DependencyGraph};

const TEAM: TeamId = TeamId::from_raw(1);

/// `layers` layers of `width` flags; every flag depends on two flags of the
/// layer below.
fn layered_flags(layers: i64, width: i64) -> Vec<FeatureFlag> {
    let mut flags = Vec::new();
    for layer in 0..layers {
        for slot in 0..width {
            let id = layer * width + slot + 1;
            let mut flag = FeatureFlag::new(FlagId::from_raw(id), TEAM, format!("flag-{}", id));
            if layer > 0 {
                let below = (layer - 1) * width + 1;
                flag = flag
                    .with_dependency((below + slot).to_string())
                    .with_dependency((below + (slot + 1) % width).to_string());
            }
            flags.push(flag);
        }
    }
    flags
}

fn bench_resolve(c: &mut Criterion) {
    let flags = layered_flags(20, 50);

    c.bench_function("flags/graph_1000", |b| {
        b.iter(|| {
            let graph = DependencyGraph::new(TEAM, black_box(&flags));
            black_box(graph.dependency_chain_for_flag(FlagId::from_raw(1000)));
        });
    });

    c.bench_function("flags/local_evaluation_1000", |b| {
        b.iter(|| {
            let payload = build_local_evaluation(TEAM, black_box(&flags));
            black_box(payload.flags.len());
        });
    });
}

criterion_group!(benches, bench_resolve);
criterion_main!(benches);
