use ndarray::ArrayView1;
use serde::{Deserialize, Serialize};

use crate::core::{ServiceError, ServiceResult};

/// Raw regressor output for one scaled feature row
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawEstimate {
    /// Point estimate
    pub point: f64,
    /// Standard deviation across ensemble members, when the model is an ensemble
    pub member_std_dev: Option<f64>,
}

/// Trait for fitted price models
pub trait PriceModel {
    /// Predict from an already scaled feature row
    fn estimate(&self, row: ArrayView1<f64>) -> ServiceResult<RawEstimate>;

    /// Check structural consistency against the expected feature count
    fn check(&self, n_features: usize) -> Result<(), String>;
}

/// Fitted regressor, tagged by kind in the artifact file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Regressor {
    Linear(LinearModel),
    RandomForest(RandomForest),
}

impl Regressor {
    fn model(&self) -> &dyn PriceModel {
        match self {
            Regressor::Linear(model) => model,
            Regressor::RandomForest(model) => model,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Regressor::Linear(_) => "linear",
            Regressor::RandomForest(_) => "random_forest",
        }
    }
}

impl PriceModel for Regressor {
    fn estimate(&self, row: ArrayView1<f64>) -> ServiceResult<RawEstimate> {
        self.model().estimate(row)
    }

    fn check(&self, n_features: usize) -> Result<(), String> {
        self.model().check(n_features)
    }
}

/// Ordinary least squares model: `intercept + coefficients · x`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearModel {
    pub coefficients: Vec<f64>,
    pub intercept: f64,
}

impl PriceModel for LinearModel {
    fn estimate(&self, row: ArrayView1<f64>) -> ServiceResult<RawEstimate> {
        if row.len() != self.coefficients.len() {
            return Err(ServiceError::Prediction(format!(
                "expected {} features, got {}",
                self.coefficients.len(),
                row.len()
            )));
        }

        let coefficients = ArrayView1::from(self.coefficients.as_slice());
        Ok(RawEstimate {
            point: coefficients.dot(&row) + self.intercept,
            member_std_dev: None,
        })
    }

    fn check(&self, n_features: usize) -> Result<(), String> {
        if self.coefficients.len() != n_features {
            return Err(format!(
                "linear model has {} coefficients for {} features",
                self.coefficients.len(),
                n_features
            ));
        }
        if !self.intercept.is_finite() || self.coefficients.iter().any(|c| !c.is_finite()) {
            return Err("linear model contains non-finite parameters".to_string());
        }
        Ok(())
    }
}

/// Averaging ensemble of regression trees
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomForest {
    pub trees: Vec<DecisionTree>,
}

impl PriceModel for RandomForest {
    fn estimate(&self, row: ArrayView1<f64>) -> ServiceResult<RawEstimate> {
        if self.trees.is_empty() {
            return Err(ServiceError::Prediction("forest has no trees".to_string()));
        }

        let outputs = self
            .trees
            .iter()
            .enumerate()
            .map(|(index, tree)| {
                tree.predict(row).ok_or_else(|| {
                    ServiceError::Prediction(format!("tree {} could not be evaluated", index))
                })
            })
            .collect::<ServiceResult<Vec<f64>>>()?;

        let n = outputs.len() as f64;
        let mean = outputs.iter().sum::<f64>() / n;
        let variance = outputs.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;

        Ok(RawEstimate {
            point: mean,
            member_std_dev: Some(variance.sqrt()),
        })
    }

    fn check(&self, n_features: usize) -> Result<(), String> {
        if self.trees.is_empty() {
            return Err("random forest has no trees".to_string());
        }
        for (index, tree) in self.trees.iter().enumerate() {
            tree.check(n_features)
                .map_err(|e| format!("tree {}: {}", index, e))?;
        }
        Ok(())
    }
}

/// Regression tree stored as a flat node array rooted at index 0.
///
/// Child indices always point forward, so traversal terminates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionTree {
    pub nodes: Vec<TreeNode>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TreeNode {
    /// Samples with `x[feature] <= threshold` go left
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    Leaf {
        value: f64,
    },
}

impl DecisionTree {
    /// Walk the tree for one row. `None` when the tree is inconsistent.
    pub fn predict(&self, row: ArrayView1<f64>) -> Option<f64> {
        let mut index = 0;
        loop {
            match self.nodes.get(index)? {
                TreeNode::Leaf { value } => return Some(*value),
                TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    let next = if *row.get(*feature)? <= *threshold {
                        *left
                    } else {
                        *right
                    };
                    if next <= index {
                        return None;
                    }
                    index = next;
                }
            }
        }
    }

    fn check(&self, n_features: usize) -> Result<(), String> {
        if self.nodes.is_empty() {
            return Err("tree has no nodes".to_string());
        }

        let len = self.nodes.len();
        for (index, node) in self.nodes.iter().enumerate() {
            match node {
                TreeNode::Leaf { value } => {
                    if !value.is_finite() {
                        return Err(format!("node {} has a non-finite value", index));
                    }
                }
                TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    if *feature >= n_features {
                        return Err(format!(
                            "node {} splits on feature {} of {}",
                            index, feature, n_features
                        ));
                    }
                    if !threshold.is_finite() {
                        return Err(format!("node {} has a non-finite threshold", index));
                    }
                    for child in [*left, *right] {
                        if child <= index || child >= len {
                            return Err(format!(
                                "node {} has invalid child index {}",
                                index, child
                            ));
                        }
                    }
                }
            }
        }
        Ok(())
    }
}
