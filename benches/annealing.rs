use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use dymo::anneal::{Annealer, Schedule};
use dymo::config::PlacementConfig;
use dymo::error::NothingToDo;
use dymo::geometry::Point;
use dymo::place::{Place, PlaceSeed};
use dymo::places::Places;
use dymo::projection::Location;
use dymo::text_metrics::LabelSize;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::hint::black_box;

/// `count` anchors scattered over a square sized so most labels have a few
/// neighbours.
fn scattered_places(count: usize, seed: u64) -> Places {
    let mut rng = StdRng::seed_from_u64(seed);
    let side = (count as f64).sqrt() * 60.0;
    let config = PlacementConfig::default();
    (0..count)
        .map(|i| {
            let seed = PlaceSeed {
                name: format!("P{i}"),
                location: Location::new(0.0, 0.0),
                position: Point::new(rng.random_range(0.0..side), rng.random_range(0.0..side)),
                radius: 4.0,
                rank: rng.random_range(1..=4),
                size: LabelSize::new(rng.random_range(24.0..72.0), 12.0),
                preferred: None,
                properties: serde_json::Map::new(),
            };
            Place::new(seed, &config).expect("valid place")
        })
        .collect()
}

fn bench_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("build_places");
    for count in [100usize, 500, 2000] {
        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, &count| {
            b.iter(|| black_box(scattered_places(count, 1).energy()));
        });
    }
    group.finish();
}

fn bench_step(c: &mut Criterion) {
    let mut group = c.benchmark_group("clone_and_move");
    for count in [100usize, 2000] {
        let places = scattered_places(count, 2);
        let mut rng = StdRng::seed_from_u64(3);
        group.bench_with_input(BenchmarkId::from_parameter(count), &places, |b, places| {
            b.iter(|| {
                let mut candidate = places.clone();
                let _ = candidate.move_label(&mut rng);
                black_box(candidate.energy());
            });
        });
    }
    group.finish();
}

fn bench_anneal(c: &mut Criterion) {
    let mut group = c.benchmark_group("anneal");
    group.sample_size(10);
    let schedule = Schedule {
        tmax: 25.0,
        tmin: 0.01,
        steps: 10_000,
    };
    for count in [100usize, 500] {
        let places = scattered_places(count, 4);
        group.bench_with_input(BenchmarkId::from_parameter(count), &places, |b, places| {
            b.iter(|| {
                let mut annealer = Annealer::new(
                    |places: &Places| places.energy(),
                    |places: &mut Places, rng: &mut StdRng| -> Result<(), NothingToDo> {
                        places.move_label(rng)
                    },
                    StdRng::seed_from_u64(5),
                );
                let outcome = annealer
                    .anneal(places.clone(), schedule, 0)
                    .expect("valid schedule");
                black_box(outcome.energy);
            });
        });
    }
    group.finish();
}

criterion_group!(
    name = benches;
    config = Criterion::default();
    targets = bench_build, bench_step, bench_anneal
);
criterion_main!(benches);
