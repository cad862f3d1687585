// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use std::sync::Arc;

use criterion::*;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use hyperflag::{
    data::Mask2D,
    simulate::{add_broadband_burst, noise_image, simulate_baseline, SimulationParams},
    strategy::{
        default_strategy, Action, ArtifactSet, BaselineData, MemoryBaselineSet, NullListener,
    },
    surface_fit::{local_fit::fit_image, FftPlanLock, LocalFitKind, LocalFitParams},
    threshold::{
        sum_threshold::sum_threshold, Direction, NoiseDistribution, SumThresholdAlgorithm,
    },
};

fn sum_threshold_algorithms(c: &mut Criterion) {
    let mut rng = ChaCha8Rng::seed_from_u64(1);
    let mut image = noise_image(1024, 256, NoiseDistribution::Gaussian, 1.0, &mut rng);
    add_broadband_burst(&mut image, 300, 10.0);

    let mut group = c.benchmark_group("sum_threshold");
    for direction in [Direction::Horizontal, Direction::Vertical] {
        for length in [1, 8, 64] {
            for algorithm in [
                SumThresholdAlgorithm::Reference,
                SumThresholdAlgorithm::Vectorized,
            ] {
                group.bench_function(
                    BenchmarkId::new(format!("{algorithm} {direction:?}"), length),
                    |b| {
                        b.iter_batched(
                            || Mask2D::unflagged(image.width(), image.height()),
                            |mut mask| {
                                sum_threshold(algorithm, direction, &image, &mut mask, length, 4.0)
                            },
                            BatchSize::LargeInput,
                        )
                    },
                );
            }
        }
    }
    group.finish();
}

fn local_fits(c: &mut Criterion) {
    let mut rng = ChaCha8Rng::seed_from_u64(2);
    let image = noise_image(512, 128, NoiseDistribution::Rayleigh, 1.0, &mut rng);
    let mask = Mask2D::unflagged(image.width(), image.height());
    let fft_lock = FftPlanLock::new();

    let mut group = c.benchmark_group("local_fit");
    group.sample_size(10);
    for method in [
        LocalFitKind::GaussianWeightedAverage,
        LocalFitKind::FastGaussianWeightedAverage,
        LocalFitKind::Median,
    ] {
        let params = LocalFitParams {
            method,
            ..Default::default()
        };
        group.bench_function(method.to_string(), |b| {
            b.iter(|| fit_image(&image, &mask, &params, &fft_lock))
        });
    }
    group.finish();
}

fn default_strategy_on_baselines(c: &mut Criterion) {
    let params = SimulationParams::default();
    let baselines: Vec<BaselineData> = (0..4)
        .map(|i| {
            let sim = simulate_baseline(&params, i, 3).unwrap();
            BaselineData {
                data: sim.data,
                metadata: sim.metadata,
            }
        })
        .collect();
    let root = Action::ForEachBaseline {
        threads: 0,
        children: vec![default_strategy().root],
    };

    let mut group = c.benchmark_group("strategy");
    group.sample_size(10);
    group.bench_function("default strategy, 4 baselines", |b| {
        b.iter_batched(
            || ArtifactSet::from_baselines(Arc::new(MemoryBaselineSet::new(baselines.clone()))),
            |mut artifacts| root.perform(&mut artifacts, &NullListener),
            BatchSize::LargeInput,
        )
    });
    group.finish();
}

criterion_group!(
    benches,
    sum_threshold_algorithms,
    local_fits,
    default_strategy_on_baselines
);
criterion_main!(benches);
