use serde::{Deserialize, Serialize};

/// The calibration curve mapping reprojection error to confidence, and the
/// decision cutoff.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringThresholds {
    /// Error (px) at or below which confidence is 100.
    pub real_threshold: f64,
    /// Error (px) at or above which confidence is 0.
    pub deepfake_threshold: f64,
    /// Confidence strictly below this is classified as deepfake.
    pub human_confidence_cutoff: f64,
}

impl Default for ScoringThresholds {
    fn default() -> Self {
        Self {
            real_threshold: 5.0,
            deepfake_threshold: 15.0,
            human_confidence_cutoff: 70.0,
        }
    }
}

impl ScoringThresholds {
    /// Piecewise-linear, monotone non-increasing map from error to `[0, 100]`.
    ///
    /// NaN and infinite errors score 0.
    pub fn confidence(&self, error: f64) -> f64 {
        if !error.is_finite() {
            return 0.0;
        }
        if error <= self.real_threshold {
            return 100.0;
        }
        if error >= self.deepfake_threshold {
            return 0.0;
        }
        let span = self.deepfake_threshold - self.real_threshold;
        (100.0 * (1.0 - (error - self.real_threshold) / span)).clamp(0.0, 100.0)
    }

    /// `true` means deepfake. The comparison is strict: a confidence equal to
    /// the cutoff is a real human.
    pub fn classify(&self, confidence: f64) -> bool {
        confidence < self.human_confidence_cutoff
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn curve_matches_reference_points() {
        let t = ScoringThresholds::default();
        assert_eq!(t.confidence(0.0), 100.0);
        assert_eq!(t.confidence(5.0), 100.0);
        assert_relative_eq!(t.confidence(10.0), 50.0);
        assert_eq!(t.confidence(15.0), 0.0);
        assert_eq!(t.confidence(250.0), 0.0);
        assert_eq!(t.confidence(f64::INFINITY), 0.0);
        assert_eq!(t.confidence(f64::NAN), 0.0);
    }

    #[test]
    fn curve_is_monotone_and_bounded() {
        let t = ScoringThresholds::default();
        let mut prev = f64::INFINITY;
        for i in 0..=4000 {
            let c = t.confidence(i as f64 * 0.005);
            assert!((0.0..=100.0).contains(&c));
            assert!(c <= prev, "confidence rose at error {}", i as f64 * 0.005);
            prev = c;
        }
    }

    #[test]
    fn cutoff_is_strict() {
        let t = ScoringThresholds::default();
        assert!(!t.classify(70.0));
        assert!(t.classify(69.999));
        assert!(!t.classify(100.0));
        assert!(t.classify(0.0));
        // the cutoff sits above the midpoint of the error range
        assert!(t.classify(t.confidence(10.0)));
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let t: ScoringThresholds =
            serde_json::from_str(r#"{ "deepfake_threshold": 20.0 }"#).expect("json");
        assert_eq!(t.real_threshold, 5.0);
        assert_eq!(t.deepfake_threshold, 20.0);
        assert_eq!(t.human_confidence_cutoff, 70.0);
    }
}
