//! Random-forest classifier
//!
//! Bagged gini trees. Each tree is grown by `linfa-trees` on its own bootstrap
//! sample, weighted so both classes carry equal total weight, then flattened
//! into a compact node list whose leaves hold the weighted class distribution
//! of the bootstrap rows that reach them.
//!
//! Trees are fitted in parallel, each from its own seed drawn up front, so a
//! fit is fully determined by the forest seed regardless of thread scheduling.

use crate::error::ForecastError;
use crate::types::FEATURE_COUNT;
use linfa::traits::Fit;
use linfa::DatasetBase;
use linfa_trees::{DecisionTree as CartTree, SplitQuality, TreeNode};
use ndarray::{Array1, Array2};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Forest hyperparameters.
///
/// The split minima are handed to `linfa-trees` as weight minima. With
/// balanced class weights the average row weighs 1.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForestParams {
    pub n_trees: usize,
    /// Minimum samples a node needs before it may be split
    pub min_samples_split: usize,
    /// Minimum samples on each side of a split
    pub min_samples_leaf: usize,
    pub max_depth: Option<usize>,
    /// Re-weight classes inside every bootstrap sample
    pub balanced_subsample: bool,
}

impl Default for ForestParams {
    fn default() -> Self {
        Self {
            n_trees: 300,
            min_samples_split: 4,
            min_samples_leaf: 2,
            max_depth: None,
            balanced_subsample: true,
        }
    }
}

impl ForestParams {
    pub fn validate(&self) -> Result<(), ForecastError> {
        if self.n_trees == 0 {
            return Err(ForecastError::InvalidConfig(
                "n_trees must be at least 1".to_string(),
            ));
        }
        if self.min_samples_split < 2 {
            return Err(ForecastError::InvalidConfig(
                "min_samples_split must be at least 2".to_string(),
            ));
        }
        if self.min_samples_leaf == 0 {
            return Err(ForecastError::InvalidConfig(
                "min_samples_leaf must be at least 1".to_string(),
            ));
        }
        if self.max_depth == Some(0) {
            return Err(ForecastError::InvalidConfig(
                "max_depth must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
enum Node {
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    Leaf {
        proba: [f64; 2],
    },
}

/// A single fitted tree; node 0 is the root
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionTree {
    nodes: Vec<Node>,
}

impl DecisionTree {
    /// Flatten a fitted `linfa-trees` tree, keeping its split layout
    fn from_cart(cart: &CartTree<f64, usize>) -> Self {
        let mut nodes = Vec::new();
        flatten(Some(cart.root_node()), &mut nodes);
        Self { nodes }
    }

    /// Index of the leaf a row lands in. Rows below the threshold go left,
    /// the same routing `linfa-trees` uses when predicting.
    fn leaf_index(&self, row: &[f64; FEATURE_COUNT]) -> usize {
        let mut idx = 0;
        while let Node::Split {
            feature,
            threshold,
            left,
            right,
        } = &self.nodes[idx]
        {
            idx = if row[*feature] < *threshold {
                *left
            } else {
                *right
            };
        }
        idx
    }

    /// Replace leaf distributions with the weighted class totals of the
    /// rows routed into them. Leaves no row reaches keep their vote.
    fn fill_leaves<'a, I>(&mut self, rows: I)
    where
        I: Iterator<Item = (&'a [f64; FEATURE_COUNT], f64, u8)>,
    {
        let mut totals = vec![[0.0f64; 2]; self.nodes.len()];
        for (row, weight, label) in rows {
            totals[self.leaf_index(row)][usize::from(label)] += weight;
        }

        for (node, total) in self.nodes.iter_mut().zip(totals) {
            if let Node::Leaf { proba } = node {
                let sum = total[0] + total[1];
                if sum > 0.0 {
                    *proba = [total[0] / sum, total[1] / sum];
                }
            }
        }
    }

    /// Class probabilities `[low, high]` for one standardized row
    pub fn predict_proba(&self, row: &[f64; FEATURE_COUNT]) -> [f64; 2] {
        match &self.nodes[self.leaf_index(row)] {
            Node::Leaf { proba } => *proba,
            Node::Split { .. } => [0.5, 0.5],
        }
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn depth(&self) -> usize {
        fn walk(nodes: &[Node], idx: usize) -> usize {
            match &nodes[idx] {
                Node::Leaf { .. } => 0,
                Node::Split { left, right, .. } => 1 + walk(nodes, *left).max(walk(nodes, *right)),
            }
        }
        walk(&self.nodes, 0)
    }
}

/// Append `node` and its subtree in pre-order, returning its index
fn flatten(node: Option<&TreeNode<f64, usize>>, nodes: &mut Vec<Node>) -> usize {
    let id = nodes.len();
    let node = match node {
        Some(node) => node,
        None => {
            nodes.push(Node::Leaf { proba: [0.5, 0.5] });
            return id;
        }
    };

    if node.is_leaf() {
        let proba = match node.prediction() {
            Some(1) => [0.0, 1.0],
            _ => [1.0, 0.0],
        };
        nodes.push(Node::Leaf { proba });
        return id;
    }

    let (feature, threshold, _) = node.split();
    nodes.push(Node::Leaf { proba: [0.5, 0.5] });
    let children = node.children();
    let left = flatten(children.first().and_then(|child| child.as_deref()), nodes);
    let right = flatten(children.get(1).and_then(|child| child.as_deref()), nodes);
    nodes[id] = Node::Split {
        feature,
        threshold,
        left,
        right,
    };
    id
}

/// Fitted random forest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomForest {
    params: ForestParams,
    trees: Vec<DecisionTree>,
    feature_importances: [f64; FEATURE_COUNT],
}

impl RandomForest {
    /// Fit a forest on standardized rows and binary labels
    pub fn fit(
        x: &[[f64; FEATURE_COUNT]],
        y: &[u8],
        params: &ForestParams,
        seed: u64,
    ) -> Result<Self, ForecastError> {
        params.validate()?;
        if x.is_empty() {
            return Err(ForecastError::EmptyDataset);
        }
        if x.len() != y.len() {
            return Err(ForecastError::InvalidConfig(format!(
                "{} feature rows but {} labels",
                x.len(),
                y.len()
            )));
        }
        if let Some(&bad) = y.iter().find(|&&label| label > 1) {
            return Err(ForecastError::InvalidConfig(format!(
                "labels must be 0 or 1, found {bad}"
            )));
        }

        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let seeds: Vec<u64> = (0..params.n_trees).map(|_| rng.gen()).collect();

        log::debug!("fitting {} trees on {} rows", params.n_trees, x.len());

        let fitted: Vec<(DecisionTree, [f64; FEATURE_COUNT])> = seeds
            .into_par_iter()
            .map(|tree_seed| grow_tree(x, y, params, tree_seed))
            .collect::<Result<_, _>>()?;

        let mut feature_importances = [0.0; FEATURE_COUNT];
        let mut trees = Vec::with_capacity(fitted.len());
        for (tree, importances) in fitted {
            for (acc, value) in feature_importances.iter_mut().zip(importances) {
                *acc += value;
            }
            trees.push(tree);
        }
        normalize(&mut feature_importances);

        Ok(Self {
            params: params.clone(),
            trees,
            feature_importances,
        })
    }

    /// Mean class probabilities `[low, high]` across trees
    pub fn predict_proba(&self, row: &[f64; FEATURE_COUNT]) -> [f64; 2] {
        let mut sum = [0.0; 2];
        for tree in &self.trees {
            let p = tree.predict_proba(row);
            sum[0] += p[0];
            sum[1] += p[1];
        }
        let n = self.trees.len().max(1) as f64;
        [sum[0] / n, sum[1] / n]
    }

    /// High-risk probability for every row
    pub fn predict_high_risk(&self, rows: &[[f64; FEATURE_COUNT]]) -> Vec<f64> {
        rows.par_iter()
            .map(|row| self.predict_proba(row)[1])
            .collect()
    }

    /// Per-tree impurity importances averaged over the forest, summing to 1
    /// when any split exists
    pub fn feature_importances(&self) -> &[f64; FEATURE_COUNT] {
        &self.feature_importances
    }

    pub fn params(&self) -> &ForestParams {
        &self.params
    }

    pub fn trees(&self) -> &[DecisionTree] {
        &self.trees
    }
}

/// Draw a bootstrap sample, fit one tree on it and collect its importances
fn grow_tree(
    x: &[[f64; FEATURE_COUNT]],
    y: &[u8],
    params: &ForestParams,
    seed: u64,
) -> Result<(DecisionTree, [f64; FEATURE_COUNT]), ForecastError> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let n = x.len();
    let bootstrap: Vec<usize> = (0..n).map(|_| rng.gen_range(0..n)).collect();
    let labels: Vec<u8> = bootstrap.iter().map(|&i| y[i]).collect();

    let class_weight = if params.balanced_subsample {
        balanced_weights(&labels)
    } else {
        [1.0, 1.0]
    };

    let records = Array2::from_shape_fn((n, FEATURE_COUNT), |(i, j)| x[bootstrap[i]][j]);
    let targets: Array1<usize> = labels.iter().map(|&label| usize::from(label)).collect();
    let weights: Array1<f32> = labels
        .iter()
        .map(|&label| class_weight[usize::from(label)] as f32)
        .collect();
    let dataset = DatasetBase::new(records, targets).with_weights(weights);

    let cart = CartTree::<f64, usize>::params()
        .split_quality(SplitQuality::Gini)
        .max_depth(params.max_depth)
        .min_weight_split(params.min_samples_split as f32)
        .min_weight_leaf(params.min_samples_leaf as f32)
        .fit(&dataset)
        .map_err(|e| ForecastError::ModelFit(e.to_string()))?;

    let mut tree = DecisionTree::from_cart(&cart);
    tree.fill_leaves(
        bootstrap
            .iter()
            .zip(&labels)
            .map(|(&i, &label)| (&x[i], class_weight[usize::from(label)], label)),
    );

    // A tree without splits reports NaN shares
    let mut importances = [0.0; FEATURE_COUNT];
    for (slot, value) in importances.iter_mut().zip(cart.feature_importance()) {
        if value.is_finite() {
            *slot = value;
        }
    }
    normalize(&mut importances);

    Ok((tree, importances))
}

/// Class weights `n / (2 * count_c)` so both classes carry equal total weight
pub fn balanced_weights(labels: &[u8]) -> [f64; 2] {
    let mut counts = [0usize; 2];
    for &label in labels {
        counts[usize::from(label)] += 1;
    }
    let n = labels.len() as f64;
    let mut weights = [0.0; 2];
    for (w, &count) in weights.iter_mut().zip(counts.iter()) {
        if count > 0 {
            *w = n / (2.0 * count as f64);
        }
    }
    weights
}

fn normalize(values: &mut [f64; FEATURE_COUNT]) {
    let sum: f64 = values.iter().sum();
    if sum > 0.0 {
        for v in values.iter_mut() {
            *v /= sum;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    /// Feature 0 separates the classes at the midpoint; feature 1 is unrelated noise
    fn separable(n: usize) -> (Vec<[f64; FEATURE_COUNT]>, Vec<u8>) {
        let mut x = Vec::with_capacity(n);
        let mut y = Vec::with_capacity(n);
        for i in 0..n {
            let mut row = [0.0; FEATURE_COUNT];
            row[0] = i as f64;
            row[1] = ((i * 7) % 13) as f64;
            x.push(row);
            y.push(u8::from(i >= n / 2));
        }
        (x, y)
    }

    fn small_params() -> ForestParams {
        ForestParams {
            n_trees: 15,
            ..Default::default()
        }
    }

    fn row_with(feature0: f64) -> [f64; FEATURE_COUNT] {
        let mut row = [0.0; FEATURE_COUNT];
        row[0] = feature0;
        row
    }

    #[test]
    fn test_separable_data() {
        let (mut x, y) = separable(40);
        for row in &mut x {
            row[1] = 0.0;
        }
        let forest = RandomForest::fit(&x, &y, &small_params(), 7).unwrap();

        assert_eq!(forest.predict_proba(&row_with(0.0)), [1.0, 0.0]);
        assert_eq!(forest.predict_proba(&row_with(39.0)), [0.0, 1.0]);
        assert_eq!(forest.trees().len(), 15);
    }

    #[test]
    fn test_probabilities_sum_to_one() {
        let (x, y) = separable(40);
        let forest = RandomForest::fit(&x, &y, &small_params(), 7).unwrap();

        for row in &x {
            let p = forest.predict_proba(row);
            assert!((p[0] + p[1] - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_importances_favor_signal() {
        let (x, y) = separable(60);
        let forest = RandomForest::fit(&x, &y, &small_params(), 11).unwrap();
        let importances = forest.feature_importances();

        let total: f64 = importances.iter().sum();
        assert!((total - 1.0).abs() < 1e-9);
        assert!(importances[0] > importances[1]);
        // Constant features never split
        assert_eq!(importances[5], 0.0);
    }

    #[test]
    fn test_leaf_probabilities_use_class_weights() {
        // No feature varies, so every tree is a single leaf over its bootstrap
        let x = vec![[0.0; FEATURE_COUNT]; 40];
        let y: Vec<u8> = (0..40).map(|i| u8::from(i % 4 == 0)).collect();

        let balanced = RandomForest::fit(&x, &y, &small_params(), 9).unwrap();
        let p = balanced.predict_proba(&x[0]);
        assert!((p[1] - 0.5).abs() < 1e-9);

        let params = ForestParams {
            balanced_subsample: false,
            ..small_params()
        };
        let unweighted = RandomForest::fit(&x, &y, &params, 9).unwrap();
        let p = unweighted.predict_proba(&x[0]);
        assert!(p[1] > 0.1 && p[1] < 0.4);
    }

    #[test]
    fn test_same_seed_same_forest() {
        let (x, y) = separable(50);
        let a = RandomForest::fit(&x, &y, &small_params(), 3).unwrap();
        let b = RandomForest::fit(&x, &y, &small_params(), 3).unwrap();

        assert_eq!(a, b);
    }

    #[test]
    fn test_max_depth_limits_trees() {
        let (x, y) = separable(50);
        let params = ForestParams {
            n_trees: 5,
            max_depth: Some(1),
            ..Default::default()
        };
        let forest = RandomForest::fit(&x, &y, &params, 5).unwrap();

        for tree in forest.trees() {
            assert!(tree.depth() <= 1);
            assert!(tree.node_count() <= 3);
        }
    }

    #[test]
    fn test_pure_data_yields_single_leaf() {
        let (x, _) = separable(20);
        let y = vec![1u8; 20];
        let forest = RandomForest::fit(&x, &y, &small_params(), 1).unwrap();

        for tree in forest.trees() {
            assert_eq!(tree.node_count(), 1);
        }
        assert_eq!(forest.predict_proba(&row_with(3.0)), [0.0, 1.0]);
        assert_eq!(forest.feature_importances(), &[0.0; FEATURE_COUNT]);
    }

    #[test]
    fn test_balanced_weights() {
        let weights = balanced_weights(&[0, 0, 0, 1]);
        assert!((weights[0] - 4.0 / 6.0).abs() < 1e-12);
        assert_eq!(weights[1], 2.0);

        // Missing class gets no weight
        assert_eq!(balanced_weights(&[1, 1]), [0.0, 1.0]);
    }

    #[test]
    fn test_invalid_params() {
        let (x, y) = separable(10);
        for params in [
            ForestParams {
                n_trees: 0,
                ..Default::default()
            },
            ForestParams {
                min_samples_split: 1,
                ..Default::default()
            },
            ForestParams {
                min_samples_leaf: 0,
                ..Default::default()
            },
            ForestParams {
                max_depth: Some(0),
                ..Default::default()
            },
        ] {
            assert!(matches!(
                RandomForest::fit(&x, &y, &params, 0),
                Err(ForecastError::InvalidConfig(_))
            ));
        }
    }

    #[test]
    fn test_mismatched_inputs() {
        let (x, _) = separable(10);
        assert!(RandomForest::fit(&x, &[0, 1], &small_params(), 0).is_err());
        assert!(matches!(
            RandomForest::fit(&[], &[], &small_params(), 0),
            Err(ForecastError::EmptyDataset)
        ));
        assert!(RandomForest::fit(&x, &[2; 10], &small_params(), 0).is_err());
    }
}
