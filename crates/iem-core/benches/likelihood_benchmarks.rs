//! Benchmarks for fitting and likelihood evaluation

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::rngs::StdRng;
use rand::SeedableRng;

use iem_core::{
    simulate_responses, ChannelBasis, EncodingModel, FitConfig, MixingWeights, NoiseModel,
    StimulusLikelihood, StimulusSequence, StimulusSpace,
};

fn bench_fit(c: &mut Criterion) {
    let mut group = c.benchmark_group("encoding_fit");
    let basis = ChannelBasis::rectified_cosine(StimulusSpace::orientation(), 8, 7.0).unwrap();

    for trials_per_stimulus in [1, 5, 20].iter() {
        let mut rng = StdRng::seed_from_u64(42);
        let mixing = MixingWeights::random(8, 50, &mut rng).unwrap();
        let stimuli = StimulusSequence::repeated(basis.space(), *trials_per_stimulus).unwrap();
        let sim = simulate_responses(&basis, &stimuli, &mixing, 0.05, &mut rng).unwrap();
        let design = basis.design_matrix(stimuli.labels()).unwrap();

        group.bench_with_input(
            BenchmarkId::from_parameter(trials_per_stimulus),
            trials_per_stimulus,
            |b, _| {
                b.iter(|| {
                    let model = EncodingModel::fit(
                        black_box(&design),
                        black_box(&sim.observed),
                        &FitConfig::default(),
                    );
                    black_box(model)
                });
            },
        );
    }

    group.finish();
}

fn bench_likelihood(c: &mut Criterion) {
    let mut group = c.benchmark_group("stimulus_likelihood");
    let basis = ChannelBasis::rectified_cosine(StimulusSpace::orientation(), 8, 7.0).unwrap();

    for measurements in [20, 50, 200].iter() {
        let mut rng = StdRng::seed_from_u64(42);
        let mixing = MixingWeights::random(8, *measurements, &mut rng).unwrap();
        let stimuli = StimulusSequence::repeated(basis.space(), 2).unwrap();
        let sim = simulate_responses(&basis, &stimuli, &mixing, 0.05, &mut rng).unwrap();
        let model =
            EncodingModel::fit_basis(&basis, &stimuli, &sim.observed, &FitConfig::default())
                .unwrap();
        let noise = NoiseModel::isotropic(0.0025, *measurements).unwrap();

        group.bench_with_input(
            BenchmarkId::from_parameter(measurements),
            measurements,
            |b, _| {
                b.iter(|| {
                    let likelihood = StimulusLikelihood::compute(
                        &model,
                        &basis,
                        &noise,
                        black_box(&sim.observed),
                    );
                    black_box(likelihood)
                });
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_fit, bench_likelihood);
criterion_main!(benches);
