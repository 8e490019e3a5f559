use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::{ConfidenceInterval, FeatureRecord, PredictionResult, ServiceError, ServiceResult};
use crate::ml::artifact::LoadedModel;
use crate::ml::regressor::{PriceModel, RawEstimate};

/// How the confidence band around a point estimate is derived.
///
/// None of these are calibrated prediction intervals.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum IntervalStrategy {
    /// `point ± |point| × fraction`
    FixedFraction { fraction: f64 },
    /// `point ± rmse` from the training metrics, floored at zero
    Rmse,
    /// `point ± z × stddev` of the per-tree predictions, floored at zero.
    /// Models without ensemble members fall back to `Rmse`.
    TreeSpread { z: f64 },
}

impl Default for IntervalStrategy {
    fn default() -> Self {
        IntervalStrategy::FixedFraction { fraction: 0.10 }
    }
}

impl IntervalStrategy {
    pub fn validate(&self) -> Result<(), String> {
        match *self {
            IntervalStrategy::FixedFraction { fraction } => {
                if !fraction.is_finite() || !(0.0..=1.0).contains(&fraction) {
                    return Err(format!("interval fraction must be within [0, 1], got {}", fraction));
                }
            }
            IntervalStrategy::TreeSpread { z } => {
                if !z.is_finite() || z < 0.0 {
                    return Err(format!("interval z must be a non-negative number, got {}", z));
                }
            }
            IntervalStrategy::Rmse => {}
        }
        Ok(())
    }

    /// Band around `estimate.point`; always contains the point.
    pub fn interval(&self, estimate: &RawEstimate, rmse: f64) -> ConfidenceInterval {
        let point = estimate.point;
        match *self {
            IntervalStrategy::FixedFraction { fraction } => {
                let half_width = point.abs() * fraction;
                ConfidenceInterval {
                    lower: point - half_width,
                    upper: point + half_width,
                }
            }
            IntervalStrategy::Rmse => floored(point, rmse),
            IntervalStrategy::TreeSpread { z } => {
                let half_width = estimate.member_std_dev.map_or(rmse, |sd| z * sd);
                floored(point, half_width)
            }
        }
    }
}

/// Prices are not negative, so the lower bound stops at zero unless the
/// estimate itself is already below it.
fn floored(point: f64, half_width: f64) -> ConfidenceInterval {
    let floor = if point >= 0.0 { 0.0 } else { f64::NEG_INFINITY };
    ConfidenceInterval {
        lower: (point - half_width).max(floor),
        upper: point + half_width,
    }
}

/// Serves price estimates from one model snapshot
pub struct Predictor<'a> {
    model: &'a LoadedModel,
    interval: IntervalStrategy,
}

impl<'a> Predictor<'a> {
    pub fn new(model: &'a LoadedModel, interval: IntervalStrategy) -> Self {
        Self { model, interval }
    }

    /// Point estimate and confidence band for a validated record
    pub fn estimate(&self, record: &FeatureRecord) -> ServiceResult<(f64, ConfidenceInterval)> {
        let row = self.model.scaled_row(record);
        let estimate = self.model.regressor().estimate(row.view())?;

        if !estimate.point.is_finite() {
            return Err(ServiceError::Prediction(format!(
                "model produced a non-finite estimate ({})",
                estimate.point
            )));
        }

        let interval = self.interval.interval(&estimate, self.model.metrics().rmse);
        debug!(
            predicted_price = estimate.point,
            lower = interval.lower,
            upper = interval.upper,
            "estimate computed"
        );
        Ok((estimate.point, interval))
    }

    pub fn predict(&self, record: &FeatureRecord) -> ServiceResult<PredictionResult> {
        let (predicted_price, confidence_interval) = self.estimate(record)?;
        Ok(PredictionResult {
            predicted_price,
            confidence_interval,
            model_version: self.model.version().to_string(),
            timestamp: Utc::now().to_rfc3339(),
        })
    }

    /// Predict every record independently, keeping input order.
    pub fn predict_batch(&self, records: &[FeatureRecord]) -> ServiceResult<Vec<PredictionResult>> {
        records.iter().map(|record| self.predict(record)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::artifact::tests::linear_artifact;
    use crate::ml::regressor::{DecisionTree, RandomForest, Regressor, TreeNode};
    use test_case::test_case;

    fn example() -> FeatureRecord {
        FeatureRecord {
            surface: 85.0,
            rooms: 4,
            age: 10.0,
            location_score: 7.5,
            garage: true,
        }
    }

    fn forest_model() -> LoadedModel {
        let stump = |feature: usize, low: f64, high: f64| DecisionTree {
            nodes: vec![
                TreeNode::Split {
                    feature,
                    threshold: 0.0,
                    left: 1,
                    right: 2,
                },
                TreeNode::Leaf { value: low },
                TreeNode::Leaf { value: high },
            ],
        };
        let mut artifact = linear_artifact();
        artifact.regressor = Regressor::RandomForest(RandomForest {
            trees: vec![
                stump(0, 200_000.0, 400_000.0),
                stump(3, 250_000.0, 350_000.0),
                stump(2, 320_000.0, 280_000.0),
            ],
        });
        artifact.validate().unwrap()
    }

    #[test]
    fn test_example_record_within_interval() {
        let model = linear_artifact().validate().unwrap();
        let predictor = Predictor::new(&model, IntervalStrategy::default());

        let result = predictor.predict(&example()).unwrap();
        let ci = result.confidence_interval;
        assert!(ci.lower < result.predicted_price);
        assert!(result.predicted_price < ci.upper);
        assert_eq!(result.model_version, "2.1.0");
    }

    #[test]
    fn test_fixed_fraction_band_is_symmetric() {
        let model = linear_artifact().validate().unwrap();
        let predictor = Predictor::new(&model, IntervalStrategy::FixedFraction { fraction: 0.1 });

        let (price, ci) = predictor.estimate(&example()).unwrap();
        assert!((ci.upper - price - price.abs() * 0.1).abs() < 1e-6);
        assert!((price - ci.lower - price.abs() * 0.1).abs() < 1e-6);
    }

    #[test]
    fn test_predictions_are_deterministic() {
        let model = forest_model();
        let predictor = Predictor::new(&model, IntervalStrategy::default());

        let first = predictor.estimate(&example()).unwrap();
        for _ in 0..10 {
            assert_eq!(predictor.estimate(&example()).unwrap(), first);
        }
    }

    #[test_case(IntervalStrategy::FixedFraction { fraction: 0.0 }; "zero fraction")]
    #[test_case(IntervalStrategy::FixedFraction { fraction: 0.25 }; "quarter fraction")]
    #[test_case(IntervalStrategy::Rmse; "rmse")]
    #[test_case(IntervalStrategy::TreeSpread { z: 1.96 }; "tree spread")]
    fn test_interval_contains_point_across_inputs(strategy: IntervalStrategy) {
        let models = [linear_artifact().validate().unwrap(), forest_model()];
        for model in &models {
            let predictor = Predictor::new(model, strategy);
            for surface in [20.0, 85.0, 250.0, 500.0] {
                for age in [0.0, 50.0, 100.0] {
                    let record = FeatureRecord {
                        surface,
                        rooms: 1,
                        age,
                        location_score: 1.0,
                        garage: false,
                    };
                    let (price, ci) = predictor.estimate(&record).unwrap();
                    assert!(ci.contains(price), "{:?} does not contain {}", ci, price);
                }
            }
        }
    }

    #[test]
    fn test_rmse_band_floors_at_zero() {
        let estimate = RawEstimate {
            point: 10_000.0,
            member_std_dev: None,
        };
        let ci = IntervalStrategy::Rmse.interval(&estimate, 40_000.0);
        assert_eq!(ci.lower, 0.0);
        assert_eq!(ci.upper, 50_000.0);

        let negative = RawEstimate {
            point: -5.0,
            member_std_dev: None,
        };
        let ci = IntervalStrategy::Rmse.interval(&negative, 10.0);
        assert_eq!(ci.lower, -15.0);
    }

    #[test]
    fn test_tree_spread_uses_member_deviation() {
        let estimate = RawEstimate {
            point: 300_000.0,
            member_std_dev: Some(10_000.0),
        };
        let ci = IntervalStrategy::TreeSpread { z: 2.0 }.interval(&estimate, 40_000.0);
        assert_eq!(ci.lower, 280_000.0);
        assert_eq!(ci.upper, 320_000.0);

        let linear = RawEstimate {
            point: 300_000.0,
            member_std_dev: None,
        };
        let ci = IntervalStrategy::TreeSpread { z: 2.0 }.interval(&linear, 40_000.0);
        assert_eq!(ci.lower, 260_000.0);
    }

    #[test]
    fn test_batch_keeps_order() {
        let model = linear_artifact().validate().unwrap();
        let predictor = Predictor::new(&model, IntervalStrategy::default());

        let small = FeatureRecord {
            surface: 30.0,
            ..example()
        };
        let large = FeatureRecord {
            surface: 400.0,
            ..example()
        };
        let results = predictor
            .predict_batch(&[small.clone(), large.clone(), small.clone()])
            .unwrap();

        assert_eq!(results.len(), 3);
        assert!(results[0].predicted_price < results[1].predicted_price);
        assert_eq!(results[0].predicted_price, results[2].predicted_price);
        assert_eq!(
            results[1].predicted_price,
            predictor.estimate(&large).unwrap().0
        );
    }

    #[test]
    fn test_strategy_validation() {
        assert!(IntervalStrategy::FixedFraction { fraction: 1.5 }.validate().is_err());
        assert!(IntervalStrategy::FixedFraction { fraction: f64::NAN }.validate().is_err());
        assert!(IntervalStrategy::TreeSpread { z: -1.0 }.validate().is_err());
        assert!(IntervalStrategy::Rmse.validate().is_ok());
        assert!(IntervalStrategy::default().validate().is_ok());
    }

    #[test]
    fn test_strategy_config_shape() {
        let strategy: IntervalStrategy =
            serde_json::from_str(r#"{"strategy": "tree_spread", "z": 1.5}"#).unwrap();
        assert_eq!(strategy, IntervalStrategy::TreeSpread { z: 1.5 });

        let strategy: IntervalStrategy = serde_json::from_str(r#"{"strategy": "rmse"}"#).unwrap();
        assert_eq!(strategy, IntervalStrategy::Rmse);
    }
}
