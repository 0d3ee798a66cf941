//! Per-subject Dice evaluation and label-map prediction.

use std::path::{Path, PathBuf};

use burn::tensor::backend::Backend;
use burn::tensor::Tensor;
use mseg_core::{ImageKind, Volume};
use mseg_io::write_volume;
use mseg_model::{argmax_labels, one_hot_from_logits, DiceMetric};
use serde::Serialize;
use tracing::info;

use crate::data::SubjectLoader;
use crate::error::{Result, SegmentationError};
use crate::model::SegmentationModel;

/// Dice of one foreground class of one subject.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiceRecord {
    pub subject: String,
    pub label: String,
    pub dice: f64,
}

/// Dice statistics of one label over all subjects.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiceSummary {
    pub label: String,
    pub count: usize,
    pub mean: f64,
    pub min: f64,
    pub max: f64,
}

/// Names of the foreground classes `1..num_classes`.
pub fn foreground_names(num_classes: usize) -> Vec<String> {
    if num_classes == 3 {
        vec!["Anterior".to_string(), "Posterior".to_string()]
    } else {
        (1..num_classes).map(|k| format!("Label {}", k)).collect()
    }
}

/// Hard Dice of the arg-max prediction for every subject and foreground class.
pub fn evaluate_dice<B: Backend>(model: &SegmentationModel<B>, loader: &SubjectLoader<B>) -> Result<Vec<DiceRecord>> {
    let metric = DiceMetric::new(false);
    let mut records = Vec::with_capacity(loader.len());

    for (batch_idx, batch) in loader.iter(0).enumerate() {
        let batch = batch?;
        let (logits, labels) = model.infer_batch(&batch)?;
        let [n, k, _, _, _] = labels.dims();
        let names = foreground_names(k);
        let scores = metric
            .forward(one_hot_from_logits(logits), labels)
            .into_data()
            .convert::<f32>()
            .to_vec::<f32>()
            .map_err(|e| SegmentationError::invalid_configuration(format!("cannot read Dice scores: {:?}", e)))?;

        for (i, id) in batch.ids.iter().enumerate().take(n) {
            for (j, name) in names.iter().enumerate() {
                records.push(DiceRecord {
                    subject: id.clone(),
                    label: name.clone(),
                    dice: scores[i * names.len() + j] as f64,
                });
            }
        }
        tracing::debug!(batch_idx, "evaluated batch");
    }
    Ok(records)
}

/// Mean, minimum and maximum Dice per label, in order of first appearance.
pub fn summarize(records: &[DiceRecord]) -> Vec<DiceSummary> {
    let mut summaries: Vec<DiceSummary> = Vec::new();
    for record in records {
        match summaries.iter_mut().find(|s| s.label == record.label) {
            Some(summary) => {
                summary.mean += record.dice;
                summary.count += 1;
                summary.min = summary.min.min(record.dice);
                summary.max = summary.max.max(record.dice);
            }
            None => summaries.push(DiceSummary {
                label: record.label.clone(),
                count: 1,
                mean: record.dice,
                min: record.dice,
                max: record.dice,
            }),
        }
    }
    for summary in &mut summaries {
        summary.mean /= summary.count as f64;
    }
    summaries
}

/// Write the arg-max label map of every subject as `<id>_pred.nii.gz`.
///
/// Maps lie on the preprocessed grid of each subject.
pub fn predict<B: Backend>(
    model: &SegmentationModel<B>,
    loader: &SubjectLoader<B>,
    out_dir: &Path,
) -> Result<Vec<PathBuf>> {
    std::fs::create_dir_all(out_dir)?;
    let mut written = Vec::with_capacity(loader.len());

    for batch in loader.iter(0) {
        let batch = batch?;
        let logits = model.forward(batch.images.clone())?;
        let labels = argmax_labels(logits).float();
        let [_, _, d, h, w] = labels.dims();

        for (i, (id, metadata)) in batch.ids.iter().zip(&batch.metadata).enumerate() {
            let data: Tensor<B, 4> = labels.clone().narrow(0, i, 1).reshape([1, d, h, w]);
            let volume = Volume::new(data, ImageKind::Label, *metadata);
            let path = out_dir.join(format!("{}_pred.nii.gz", id));
            write_volume(&path, &volume)?;
            written.push(path);
        }
    }
    info!("Wrote {} predictions to {}", written.len(), out_dir.display());
    Ok(written)
}
