//! Fitted mean/variance feature scaler

use anyhow::{bail, ensure, Result};
use serde::{Deserialize, Serialize};

use crate::types::patient::FEATURE_COUNT;

/// Standard scaler fitted together with a classifier.
///
/// Stores the training-time `mean` and `scale` (standard deviation) of
/// every feature; inference only ever applies them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    pub mean: Vec<f64>,
    pub scale: Vec<f64>,
}

impl StandardScaler {
    /// Build a scaler, checking its parameters.
    pub fn new(mean: Vec<f64>, scale: Vec<f64>) -> Result<Self> {
        let scaler = Self { mean, scale };
        scaler.check()?;
        Ok(scaler)
    }

    /// Reject parameters that cannot have come from a fit on our features.
    pub fn check(&self) -> Result<()> {
        ensure!(
            self.mean.len() == FEATURE_COUNT && self.scale.len() == FEATURE_COUNT,
            "scaler has {} means and {} scales, expected {} each",
            self.mean.len(),
            self.scale.len(),
            FEATURE_COUNT
        );
        if let Some(i) = self.mean.iter().position(|m| !m.is_finite()) {
            bail!("scaler mean[{}] is not finite", i);
        }
        if let Some(i) = self.scale.iter().position(|s| !s.is_finite() || *s <= 0.0) {
            bail!(
                "scaler scale[{}] = {} must be finite and positive",
                i,
                self.scale[i]
            );
        }
        Ok(())
    }

    /// Center and scale one feature vector.
    pub fn transform(&self, features: &[f64; FEATURE_COUNT]) -> [f64; FEATURE_COUNT] {
        let mut scaled = [0.0; FEATURE_COUNT];
        for (i, out) in scaled.iter_mut().enumerate() {
            *out = (features[i] - self.mean[i]) / self.scale[i];
        }
        scaled
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transform() {
        let scaler = StandardScaler::new(vec![2.0; 8], vec![0.5; 8]).unwrap();
        let scaled = scaler.transform(&[3.0, 2.0, 1.0, 2.5, 0.0, 1.0, 2.0, 2.0]);
        assert_eq!(scaled, [2.0, 0.0, -2.0, 1.0, -4.0, -2.0, 0.0, 0.0]);
    }

    #[test]
    fn test_rejects_wrong_length() {
        assert!(StandardScaler::new(vec![0.0; 7], vec![1.0; 8]).is_err());
    }

    #[test]
    fn test_rejects_non_positive_scale() {
        let mut scale = vec![1.0; 8];
        scale[4] = 0.0;
        let err = StandardScaler::new(vec![0.0; 8], scale).unwrap_err();
        assert!(err.to_string().contains("scale[4]"));
    }
}
