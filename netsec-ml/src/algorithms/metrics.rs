//! Scoring functions for binary classifiers and goodness of fit.

use crate::artifact::ClassificationMetrics;
use crate::error::{PipelineError, Result};

/// Label treated as the positive class.
pub const POSITIVE_LABEL: f64 = 1.0;

fn check_lengths(y_true: &[f64], y_pred: &[f64]) -> Result<()> {
    if y_true.len() != y_pred.len() {
        return Err(PipelineError::invalid_input(format!(
            "found {} targets and {} predictions",
            y_true.len(),
            y_pred.len()
        )));
    }
    if y_true.is_empty() {
        return Err(PipelineError::invalid_input("cannot score an empty sample"));
    }
    Ok(())
}

/// (true positives, false positives, false negatives)
fn confusion(y_true: &[f64], y_pred: &[f64]) -> (f64, f64, f64) {
    let (mut tp, mut fp, mut fneg) = (0.0, 0.0, 0.0);
    for (t, p) in y_true.iter().zip(y_pred) {
        match (*t == POSITIVE_LABEL, *p == POSITIVE_LABEL) {
            (true, true) => tp += 1.0,
            (false, true) => fp += 1.0,
            (true, false) => fneg += 1.0,
            (false, false) => {}
        }
    }
    (tp, fp, fneg)
}

fn ratio(num: f64, den: f64) -> f64 {
    if den == 0.0 { 0.0 } else { num / den }
}

pub fn accuracy_score(y_true: &[f64], y_pred: &[f64]) -> Result<f64> {
    check_lengths(y_true, y_pred)?;
    let correct = y_true.iter().zip(y_pred).filter(|(t, p)| t == p).count();
    Ok(correct as f64 / y_true.len() as f64)
}

pub fn precision_score(y_true: &[f64], y_pred: &[f64]) -> Result<f64> {
    check_lengths(y_true, y_pred)?;
    let (tp, fp, _) = confusion(y_true, y_pred);
    Ok(ratio(tp, tp + fp))
}

pub fn recall_score(y_true: &[f64], y_pred: &[f64]) -> Result<f64> {
    check_lengths(y_true, y_pred)?;
    let (tp, _, fneg) = confusion(y_true, y_pred);
    Ok(ratio(tp, tp + fneg))
}

pub fn f1_score(y_true: &[f64], y_pred: &[f64]) -> Result<f64> {
    check_lengths(y_true, y_pred)?;
    let (tp, fp, fneg) = confusion(y_true, y_pred);
    Ok(ratio(2.0 * tp, 2.0 * tp + fp + fneg))
}

/// Coefficient of determination. A constant target scores 1.0 on a perfect
/// prediction and 0.0 otherwise.
pub fn r2_score(y_true: &[f64], y_pred: &[f64]) -> Result<f64> {
    check_lengths(y_true, y_pred)?;
    let mean = y_true.iter().sum::<f64>() / y_true.len() as f64;
    let ss_res: f64 = y_true.iter().zip(y_pred).map(|(t, p)| (t - p).powi(2)).sum();
    let ss_tot: f64 = y_true.iter().map(|t| (t - mean).powi(2)).sum();
    if ss_tot == 0.0 {
        return Ok(if ss_res == 0.0 { 1.0 } else { 0.0 });
    }
    Ok(1.0 - ss_res / ss_tot)
}

pub fn classification_score(y_true: &[f64], y_pred: &[f64]) -> Result<ClassificationMetrics> {
    Ok(ClassificationMetrics {
        precision: precision_score(y_true, y_pred)?,
        recall: recall_score(y_true, y_pred)?,
        f1_score: f1_score(y_true, y_pred)?,
    })
}
