//! The final detection record and its sinks.

use crate::{ErrorReport, ScoringThresholds, SinkError};
use chrono::{DateTime, SecondsFormat, Utc};
use log::debug;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;

/// Field order of a CSV row; the header of a new file.
pub const CSV_FIELDS: [&str; 13] = [
    "timestamp",
    "is_deepfake",
    "confidence",
    "mean_error",
    "std_error",
    "min_error",
    "max_error",
    "first_mean_error",
    "second_mean_error",
    "landmark_count",
    "real_threshold",
    "deepfake_threshold",
    "human_confidence_cutoff",
];

/// Outcome of one detection event. Immutable once built.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DetectionResult {
    pub timestamp: DateTime<Utc>,
    pub is_deepfake: bool,
    /// In `[0, 100]`.
    pub confidence: f64,
    pub errors: ErrorReport,
    pub thresholds: ScoringThresholds,
    pub landmark_count: usize,
    /// Stable identifiers of the scored landmarks, in order.
    pub landmark_ids: Vec<usize>,
}

impl DetectionResult {
    /// Score `errors` against `thresholds`, stamped with the current time.
    pub fn evaluate(
        errors: ErrorReport,
        thresholds: ScoringThresholds,
        landmark_ids: Vec<usize>,
    ) -> Self {
        Self::evaluate_at(Utc::now(), errors, thresholds, landmark_ids)
    }

    pub fn evaluate_at(
        timestamp: DateTime<Utc>,
        errors: ErrorReport,
        thresholds: ScoringThresholds,
        landmark_ids: Vec<usize>,
    ) -> Self {
        let confidence = thresholds.confidence(errors.scoring_error());
        Self {
            timestamp,
            is_deepfake: thresholds.classify(confidence),
            confidence,
            landmark_count: errors.landmark_count(),
            errors,
            thresholds,
            landmark_ids,
        }
    }

    pub fn verdict(&self) -> &'static str {
        if self.is_deepfake {
            "DEEPFAKE"
        } else {
            "REAL HUMAN"
        }
    }

    fn timestamp_string(&self) -> String {
        self.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)
    }

    /// One pretty JSON document grouped as `detection`, `metrics` and
    /// `thresholds`.
    pub fn to_json(&self) -> Result<String, SinkError> {
        let doc = JsonDocument {
            detection: JsonDetection {
                timestamp: self.timestamp_string(),
                is_deepfake: self.is_deepfake,
                verdict: self.verdict(),
                confidence: self.confidence,
                landmark_count: self.landmark_count,
                landmark_ids: &self.landmark_ids,
            },
            metrics: JsonMetrics {
                mean_error: self.errors.mean,
                std_error: self.errors.std,
                min_error: self.errors.min,
                max_error: self.errors.max,
                first_mean_error: self.errors.first_mean,
                second_mean_error: self.errors.second_mean,
                degenerate: self.errors.degenerate,
                outliers: self.errors.outliers(),
                first_errors: &self.errors.first,
                second_errors: &self.errors.second,
            },
            thresholds: &self.thresholds,
        };
        Ok(serde_json::to_string_pretty(&doc)?)
    }

    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), SinkError> {
        let path = path.as_ref();
        fs::write(path, self.to_json()?)?;
        debug!("detection result written to {}", path.display());
        Ok(())
    }

    /// One CSV row in [`CSV_FIELDS`] order, without a trailing newline.
    pub fn csv_row(&self) -> String {
        let e = &self.errors;
        let t = &self.thresholds;
        format!(
            "{},{},{:.2},{:.4},{:.4},{:.4},{:.4},{:.4},{:.4},{},{},{},{}",
            self.timestamp_string(),
            self.is_deepfake,
            self.confidence,
            e.mean,
            e.std,
            e.min,
            e.max,
            e.first_mean,
            e.second_mean,
            self.landmark_count,
            t.real_threshold,
            t.deepfake_threshold,
            t.human_confidence_cutoff
        )
    }

    /// Append one row; a new or empty file gets the header first.
    pub fn append_csv(&self, path: impl AsRef<Path>) -> Result<(), SinkError> {
        let path = path.as_ref();
        let needs_header = fs::metadata(path).map(|m| m.len() == 0).unwrap_or(true);
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        if needs_header {
            writeln!(file, "{}", CSV_FIELDS.join(","))?;
        }
        writeln!(file, "{}", self.csv_row())?;
        debug!("detection row appended to {}", path.display());
        Ok(())
    }

    /// Human-readable summary block, as printed by `Display`.
    pub fn to_report(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for DetectionResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let e = &self.errors;
        let t = &self.thresholds;
        let rule = "=".repeat(60);
        writeln!(f, "{rule}")?;
        writeln!(f, "DETECTION RESULT")?;
        writeln!(f, "{rule}")?;
        writeln!(f, "Timestamp:      {}", self.timestamp_string())?;
        writeln!(f, "Classification: {}", self.verdict())?;
        writeln!(f, "Confidence:     {:.1}%", self.confidence)?;
        writeln!(f, "Landmarks:      {}", self.landmark_count)?;
        writeln!(f)?;
        writeln!(f, "Reprojection error (px)")?;
        writeln!(f, "  mean:         {:.3}", e.mean)?;
        writeln!(f, "  std:          {:.3}", e.std)?;
        writeln!(f, "  min / max:    {:.3} / {:.3}", e.min, e.max)?;
        writeln!(f, "  camera 1:     {:.3}", e.first_mean)?;
        writeln!(f, "  camera 2:     {:.3}", e.second_mean)?;
        if e.degenerate > 0 {
            writeln!(f, "  degenerate:   {}", e.degenerate)?;
        }
        let outliers = e.outliers();
        if !outliers.is_empty() {
            let ids: Vec<String> = outliers
                .iter()
                .map(|&i| {
                    self.landmark_ids
                        .get(i)
                        .map_or_else(|| format!("#{i}"), |id| id.to_string())
                })
                .collect();
            writeln!(f, "  outliers:     {}", ids.join(", "))?;
        }
        writeln!(f)?;
        writeln!(f, "Thresholds")?;
        writeln!(f, "  real below:   {:.1} px", t.real_threshold)?;
        writeln!(f, "  fake above:   {:.1} px", t.deepfake_threshold)?;
        writeln!(f, "  cutoff:       {:.1}%", t.human_confidence_cutoff)?;
        write!(f, "{rule}")
    }
}

#[derive(Serialize)]
struct JsonDocument<'a> {
    detection: JsonDetection<'a>,
    metrics: JsonMetrics<'a>,
    thresholds: &'a ScoringThresholds,
}

#[derive(Serialize)]
struct JsonDetection<'a> {
    timestamp: String,
    is_deepfake: bool,
    verdict: &'static str,
    confidence: f64,
    landmark_count: usize,
    landmark_ids: &'a [usize],
}

#[derive(Serialize)]
struct JsonMetrics<'a> {
    mean_error: f64,
    std_error: f64,
    min_error: f64,
    max_error: f64,
    first_mean_error: f64,
    second_mean_error: f64,
    degenerate: usize,
    outliers: Vec<usize>,
    first_errors: &'a [f64],
    second_errors: &'a [f64],
}
