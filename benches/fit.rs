use criterion::{black_box, Criterion};

use specband::{AperiodicMode, BandScheme, ModelConfig, ParamSpectra};

fn synthetic_spectrum() -> (Vec<f64>, Vec<f64>) {
    let freqs: Vec<f64> = (2..=400).map(|i| i as f64 * 0.25).collect();
    let power = freqs
        .iter()
        .map(|f| {
            let aperiodic = 10f64.powf(1.0 - 1.2 * f.log10());
            let alpha = 0.6 * (-0.5 * ((f.ln() - 10f64.ln()) / 0.1).powi(2)).exp();
            let beta = 0.3 * (-0.5 * ((f.ln() - 22f64.ln()) / 0.15).powi(2)).exp();
            aperiodic * 10f64.powf(alpha + beta)
        })
        .collect();
    (freqs, power)
}

fn full_fit(config: &ModelConfig, freqs: &[f64], power: &[f64]) -> f64 {
    let mut model = ParamSpectra::new(config.clone());
    model.add_data(freqs, power).unwrap();
    model.fit().unwrap();
    black_box(model.r_squared().unwrap())
}

fn fitting(c: &mut Criterion) {
    let (freqs, power) = synthetic_spectrum();

    let fixed = ModelConfig::new()
        .freq_range(0.5, 100.0)
        .aperiodic_mode(AperiodicMode::Fixed);
    c.bench_function("full_fit_fixed", |b| {
        b.iter(|| full_fit(&fixed, &freqs, &power))
    });

    let knee = ModelConfig::new()
        .freq_range(0.5, 100.0)
        .aperiodic_mode(AperiodicMode::Knee);
    c.bench_function("full_fit_knee", |b| {
        b.iter(|| full_fit(&knee, &freqs, &power))
    });

    let subdivided = ModelConfig::new()
        .scheme(BandScheme::Log)
        .freq_range(0.5, 100.0)
        .max_n_peaks(12)
        .aperiodic_mode(AperiodicMode::Fixed);
    c.bench_function("full_fit_log_bands", |b| {
        b.iter(|| full_fit(&subdivided, &freqs, &power))
    });
}

criterion::criterion_group!(benches, fitting);
criterion::criterion_main!(benches);
