//! MNIST loading and batching.
//!
//! Samples are kept as raw `u8` pixels in memory (MNIST is ~55MB decoded) and
//! only scaled to `[0, 1]` when a batch tensor is built.

use std::path::Path;

use burn::data::dataloader::batcher::Batcher;
use burn::data::dataset::vision::{MnistDataset, MnistItem};
use burn::data::dataset::Dataset;
use burn::prelude::*;
use tracing::info;

use crate::config::{DatasetSource, TrainingConfig};
use crate::error::{DigitError, Result};
use crate::ml::{IMAGE_SIDE, INPUT_DIM, NUM_CLASSES};

pub const TRAIN_IMAGES: &str = "train-images-idx3-ubyte";
pub const TRAIN_LABELS: &str = "train-labels-idx1-ubyte";
pub const TEST_IMAGES: &str = "t10k-images-idx3-ubyte";
pub const TEST_LABELS: &str = "t10k-labels-idx1-ubyte";

const IDX_IMAGES_MAGIC: u32 = 0x0000_0803;
const IDX_LABELS_MAGIC: u32 = 0x0000_0801;

/// One labeled 28×28 image, row-major.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DigitItem {
    pub pixels: Vec<u8>,
    pub label: u8,
}

#[derive(Debug, Clone, Default)]
pub struct DigitSamples {
    items: Vec<DigitItem>,
}

impl DigitSamples {
    pub fn new(items: Vec<DigitItem>) -> Result<Self> {
        for (idx, item) in items.iter().enumerate() {
            if item.pixels.len() != INPUT_DIM {
                return Err(DigitError::Training(format!(
                    "sample {idx} has {} pixels, expected {INPUT_DIM}",
                    item.pixels.len()
                )));
            }
            if usize::from(item.label) >= NUM_CLASSES {
                return Err(DigitError::Training(format!(
                    "sample {idx} has label {}, expected 0..{NUM_CLASSES}",
                    item.label
                )));
            }
        }
        Ok(Self { items })
    }

    /// Parse an IDX3 image file and its IDX1 label file.
    pub fn from_idx_bytes(images: &[u8], labels: &[u8]) -> Result<Self> {
        if read_be_u32(images, 0)? != IDX_IMAGES_MAGIC {
            return Err(DigitError::Training("bad IDX image magic number".to_string()));
        }
        if read_be_u32(labels, 0)? != IDX_LABELS_MAGIC {
            return Err(DigitError::Training("bad IDX label magic number".to_string()));
        }

        let count = read_be_u32(images, 4)? as usize;
        let rows = read_be_u32(images, 8)?;
        let cols = read_be_u32(images, 12)?;
        if rows != IMAGE_SIDE || cols != IMAGE_SIDE {
            return Err(DigitError::Training(format!(
                "unexpected image shape {rows}x{cols}"
            )));
        }

        let label_count = read_be_u32(labels, 4)? as usize;
        if label_count != count {
            return Err(DigitError::Training(format!(
                "{count} images but {label_count} labels"
            )));
        }

        let pixels = images
            .get(16..16 + count * INPUT_DIM)
            .ok_or_else(|| DigitError::Training("IDX image file is truncated".to_string()))?;
        let labels = labels
            .get(8..8 + count)
            .ok_or_else(|| DigitError::Training("IDX label file is truncated".to_string()))?;

        let items = pixels
            .chunks_exact(INPUT_DIM)
            .zip(labels)
            .map(|(pixels, &label)| DigitItem {
                pixels: pixels.to_vec(),
                label,
            })
            .collect();

        Self::new(items)
    }

    pub fn from_idx_files(images: &Path, labels: &Path) -> Result<Self> {
        let images = std::fs::read(images)?;
        let labels = std::fs::read(labels)?;
        Self::from_idx_bytes(&images, &labels)
    }

    /// Hold out the last `fraction` of the samples, preserving order.
    pub fn split_validation(mut self, fraction: f64) -> (Self, Self) {
        let holdout = (self.items.len() as f64 * fraction).round() as usize;
        let valid = self.items.split_off(self.items.len() - holdout.min(self.items.len()));
        (self, Self { items: valid })
    }

    pub fn items(&self) -> &[DigitItem] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl Dataset<DigitItem> for DigitSamples {
    fn get(&self, index: usize) -> Option<DigitItem> {
        self.items.get(index).cloned()
    }

    fn len(&self) -> usize {
        self.items.len()
    }
}

fn read_be_u32(data: &[u8], offset: usize) -> Result<u32> {
    data.get(offset..offset + 4)
        .map(|b| u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
        .ok_or_else(|| DigitError::Training("IDX header is truncated".to_string()))
}

/// Train and test splits.
#[derive(Debug, Clone)]
pub struct MnistSplits {
    pub train: DigitSamples,
    pub test: DigitSamples,
}

/// Load MNIST from the configured source.
pub fn load_mnist(config: &TrainingConfig) -> Result<MnistSplits> {
    let splits = match config.dataset {
        DatasetSource::Idx => {
            let dir = config.data_dir.as_deref().ok_or_else(|| {
                DigitError::Training("training.data_dir is required for idx datasets".to_string())
            })?;
            MnistSplits {
                train: DigitSamples::from_idx_files(&dir.join(TRAIN_IMAGES), &dir.join(TRAIN_LABELS))?,
                test: DigitSamples::from_idx_files(&dir.join(TEST_IMAGES), &dir.join(TEST_LABELS))?,
            }
        }
        DatasetSource::Download => {
            // burn's dataset panics on network or cache failures
            let train = std::panic::catch_unwind(MnistDataset::train)
                .map_err(|_| DigitError::Training("MNIST train split download failed".to_string()))?;
            let test = std::panic::catch_unwind(MnistDataset::test)
                .map_err(|_| DigitError::Training("MNIST test split download failed".to_string()))?;
            MnistSplits {
                train: from_vision_dataset(&train)?,
                test: from_vision_dataset(&test)?,
            }
        }
    };

    info!(
        train = splits.train.len(),
        test = splits.test.len(),
        "MNIST loaded"
    );
    Ok(splits)
}

fn from_vision_dataset<D: Dataset<MnistItem>>(dataset: &D) -> Result<DigitSamples> {
    let items = (0..dataset.len())
        .filter_map(|i| dataset.get(i))
        .map(|item| DigitItem {
            pixels: item
                .image
                .iter()
                .flatten()
                .map(|&v| v.clamp(0.0, 255.0) as u8)
                .collect(),
            label: item.label,
        })
        .collect();
    DigitSamples::new(items)
}

/// Normalized image batch plus class indices.
#[derive(Clone, Debug)]
pub struct DigitBatch<B: Backend> {
    pub images: Tensor<B, 2>,
    pub targets: Tensor<B, 1, Int>,
}

#[derive(Clone, Debug)]
pub struct DigitBatcher<B: Backend> {
    device: B::Device,
}

impl<B: Backend> DigitBatcher<B> {
    pub fn new(device: B::Device) -> Self {
        Self { device }
    }
}

impl<B: Backend> Batcher<DigitItem, DigitBatch<B>> for DigitBatcher<B> {
    fn batch(&self, items: Vec<DigitItem>) -> DigitBatch<B> {
        let n = items.len();
        let pixels: Vec<f32> = items
            .iter()
            .flat_map(|item| item.pixels.iter().map(|&p| f32::from(p) / 255.0))
            .collect();
        let labels: Vec<i64> = items.iter().map(|item| i64::from(item.label)).collect();

        let images = Tensor::<B, 2>::from_data(
            TensorData::new(pixels, [n, INPUT_DIM]).convert::<B::FloatElem>(),
            &self.device,
        );
        let targets = Tensor::<B, 1, Int>::from_data(
            TensorData::new(labels, [n]).convert::<B::IntElem>(),
            &self.device,
        );

        DigitBatch { images, targets }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::data::dataloader::DataLoaderBuilder;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray<f32>;

    fn idx_files(count: u32, labels: &[u8]) -> (Vec<u8>, Vec<u8>) {
        let mut images = Vec::new();
        images.extend_from_slice(&IDX_IMAGES_MAGIC.to_be_bytes());
        images.extend_from_slice(&count.to_be_bytes());
        images.extend_from_slice(&28u32.to_be_bytes());
        images.extend_from_slice(&28u32.to_be_bytes());
        for i in 0..count {
            images.extend(std::iter::repeat(i as u8).take(INPUT_DIM));
        }

        let mut label_bytes = Vec::new();
        label_bytes.extend_from_slice(&IDX_LABELS_MAGIC.to_be_bytes());
        label_bytes.extend_from_slice(&(labels.len() as u32).to_be_bytes());
        label_bytes.extend_from_slice(labels);

        (images, label_bytes)
    }

    #[test]
    fn test_parse_idx() {
        let (images, labels) = idx_files(3, &[7, 0, 9]);
        let samples = DigitSamples::from_idx_bytes(&images, &labels).unwrap();

        assert_eq!(samples.len(), 3);
        assert_eq!(samples.items()[0].label, 7);
        assert!(samples.items()[2].pixels.iter().all(|&p| p == 2));
    }

    #[test]
    fn test_rejects_bad_magic_and_truncation() {
        let (mut images, labels) = idx_files(2, &[1, 2]);
        images[3] = 0x01;
        assert!(DigitSamples::from_idx_bytes(&images, &labels).is_err());

        let (mut images, labels) = idx_files(2, &[1, 2]);
        images.truncate(images.len() - 1);
        assert!(DigitSamples::from_idx_bytes(&images, &labels).is_err());

        let (images, labels) = idx_files(2, &[1]);
        assert!(DigitSamples::from_idx_bytes(&images, &labels).is_err());
    }

    #[test]
    fn test_validation_split_takes_tail() {
        let items = (0..10u8)
            .map(|label| DigitItem {
                pixels: vec![label; INPUT_DIM],
                label,
            })
            .collect();
        let samples = DigitSamples::new(items).unwrap();

        let (train, valid) = samples.split_validation(0.2);
        assert_eq!(train.len(), 8);
        assert_eq!(valid.len(), 2);
        assert_eq!(valid.items()[0].label, 8);
        assert_eq!(valid.items()[1].label, 9);
    }

    #[test]
    fn test_batcher_normalizes() {
        let device = Default::default();
        let batcher = DigitBatcher::<TestBackend>::new(device);
        let batch = batcher.batch(vec![
            DigitItem {
                pixels: vec![255; INPUT_DIM],
                label: 3,
            },
            DigitItem {
                pixels: vec![0; INPUT_DIM],
                label: 5,
            },
        ]);

        assert_eq!(batch.images.dims(), [2, INPUT_DIM]);
        assert_eq!(batch.targets.dims(), [2]);

        let values = batch.images.into_data().to_vec::<f32>().unwrap();
        assert_eq!(values[0], 1.0);
        assert_eq!(values[INPUT_DIM], 0.0);
    }

    #[test]
    fn test_shuffled_loader_covers_every_sample() {
        let items = (0..10u8)
            .map(|label| DigitItem {
                pixels: vec![label; INPUT_DIM],
                label,
            })
            .collect();
        let samples = DigitSamples::new(items).unwrap();

        let loader = DataLoaderBuilder::new(DigitBatcher::<TestBackend>::new(Default::default()))
            .batch_size(4)
            .shuffle(7)
            .build(samples);

        let sizes: Vec<usize> = loader.iter().map(|b| b.targets.dims()[0]).collect();
        assert_eq!(sizes, vec![4, 4, 2]);

        let mut labels: Vec<i64> = loader
            .iter()
            .flat_map(|b| b.targets.into_data().convert::<i64>().to_vec::<i64>().unwrap())
            .collect();
        labels.sort();
        assert_eq!(labels, (0..10).collect::<Vec<i64>>());
    }
}
