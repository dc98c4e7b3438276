use criterion::{black_box, criterion_group, criterion_main, Criterion};
use rand::Rng;

use rustatron::feed::{reduce_frame, Frame};
use rustatron::optimizer::AscentOptimizer;
use rustatron::track::ParameterTrack;

fn quadratic(v: [i32; 3]) -> f64 {
    let (f, d2, d3) = (f64::from(v[0]), f64::from(v[1]), f64::from(v[2]));
    -((d2 - 42.0).powi(2) + (d3 - 70.0).powi(2) + (f + 972.0).powi(2)) + 3.0e6
}

pub fn ascent(c: &mut Criterion) {
    c.bench_function("ascent 200 ticks", |b| {
        b.iter(|| {
            let mut opt = AscentOptimizer::with_directions(
                ParameterTrack::new(-1020, -1200, 0, 0.1).unwrap(),
                ParameterTrack::new(-34, -500, 500, 0.1).unwrap(),
                ParameterTrack::new(73, -500, 500, 0.1).unwrap(),
                [1, -1, 1],
                10,
            )
            .unwrap();
            for _ in 0..200 {
                let sample = quadratic(opt.current_values());
                black_box(opt.tick(sample));
            }
            black_box(opt.current_values())
        })
    });
}

pub fn frame_reduction(c: &mut Criterion) {
    let mut rng = rand::thread_rng();
    let frame = Frame {
        width: 256,
        data: (0..256 * 256).map(|_| rng.gen::<u16>()).collect(),
    };
    c.bench_function("median blur + mean 256x256", |b| {
        b.iter(|| black_box(reduce_frame(&frame)))
    });
}

criterion_group!(benches, ascent, frame_reduction);
criterion_main!(benches);
