#![cfg(feature = "train")]

use digitscope::config::TrainingConfig;
use digitscope::ml::{INPUT_DIM, NUM_CLASSES};
use digitscope::services::InferenceService;
use digitscope::training::{export_artifact, fit, DigitItem, DigitSamples, TrainingBackend};

/// Separable stand-in for MNIST: each class is a bright horizontal band.
fn banded_digits(per_class: usize) -> DigitSamples {
    let band = INPUT_DIM / NUM_CLASSES;
    let items = (0..per_class * NUM_CLASSES)
        .map(|i| {
            let label = (i % NUM_CLASSES) as u8;
            let mut pixels = vec![0u8; INPUT_DIM];
            let start = usize::from(label) * band;
            for p in &mut pixels[start..start + band] {
                *p = 180 + (i % 70) as u8;
            }
            DigitItem { pixels, label }
        })
        .collect();
    DigitSamples::new(items).unwrap()
}

#[test]
fn test_trained_artifact_serves_predictions() {
    let config = TrainingConfig {
        epochs: 10,
        batch_size: 16,
        learning_rate: 5e-3,
        validation_split: 0.2,
        ..TrainingConfig::default()
    };
    let device = Default::default();
    let outcome = fit::<TrainingBackend>(banded_digits(25), &config, &device).unwrap();

    let path = std::env::temp_dir().join(format!("digitscope-train-{}.json", uuid::Uuid::new_v4()));
    export_artifact(&outcome, &path).unwrap();
    let service = InferenceService::load(&path).unwrap();
    std::fs::remove_file(&path).ok();

    let unseen = banded_digits(1);
    let correct = unseen
        .items()
        .iter()
        .filter(|item| {
            let input: Vec<f64> = item.pixels.iter().map(|&p| f64::from(p) / 255.0).collect();
            let prediction = service.predict_tensor(&input).unwrap();
            assert_eq!(prediction.activations.len(), 4);
            prediction.digit() == usize::from(item.label)
        })
        .count();

    let accuracy = correct as f64 / unseen.len() as f64;
    assert!(accuracy > 0.5, "artifact accuracy {accuracy}");
}
