use criterion::{black_box, criterion_group, criterion_main, Criterion};
use image::{ImageBuffer, Luma};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use attiicc::analysis::fill_missing_frames;
use attiicc::preprocess::rolling_ball_background;
use attiicc::{match_points, CellRecord, Frame, MatchConfig, MatchMode};

fn make_frames(frames: usize, per_frame: usize, seed: u64) -> Vec<Vec<[f64; 2]>> {
    let mut rng = StdRng::seed_from_u64(seed);
    let anchors: Vec<[f64; 2]> = (0..per_frame)
        .map(|_| [rng.gen_range(0.0..2048.0), rng.gen_range(0.0..2048.0)])
        .collect();
    (0..frames)
        .map(|_| {
            anchors
                .iter()
                .map(|&[x, y]| [x + rng.gen_range(-8.0..8.0), y + rng.gen_range(-8.0..8.0)])
                .collect()
        })
        .collect()
}

fn bench_matching(c: &mut Criterion) {
    let frames = make_frames(10, 200, 12345);
    for mode in [MatchMode::Greedy, MatchMode::Transitive] {
        let config = MatchConfig {
            distance_threshold: 20.0,
            mode,
        };
        c.bench_function(&format!("match_10x200_{:?}", mode).to_lowercase(), |b| {
            b.iter(|| black_box(match_points(black_box(&frames), &config)))
        });
    }
}

fn bench_completion(c: &mut Criterion) {
    let mut rng = StdRng::seed_from_u64(7);
    let required: Vec<Frame> = (0..48).map(Frame).collect();
    let mut records = Vec::new();
    for field in 0..4 {
        for well in 0..250u32 {
            for frame in 0..48u32 {
                if rng.gen_bool(0.8) {
                    let mut r = CellRecord::placeholder(&format!("f{}", field), well, Frame(frame));
                    r.cell_count = 1;
                    records.push(r);
                }
            }
        }
    }
    c.bench_function("fill_missing_frames_1000w_48f", |b| {
        b.iter(|| black_box(fill_missing_frames(records.clone(), Some(&required))))
    });
}

fn bench_rolling_ball(c: &mut Criterion) {
    let mut rng = StdRng::seed_from_u64(99);
    let img: ImageBuffer<Luma<u16>, Vec<u16>> =
        ImageBuffer::from_fn(256, 256, |_, _| Luma([rng.gen_range(100..4000)]));
    c.bench_function("rolling_ball_256_r10", |b| {
        b.iter(|| black_box(rolling_ball_background(black_box(&img), 10.0)))
    });
}

criterion_group!(hotpaths, bench_matching, bench_completion, bench_rolling_ball);
criterion_main!(hotpaths);
