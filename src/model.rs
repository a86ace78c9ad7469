//! Per-venue price-improvement models.
//!
//! One ridge-regression model per venue, fit on standardized order/quote
//! features with the signed price improvement as target. The model set
//! round-trips through a JSON file consumed by the router.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::TrainingConfig;
use crate::core::{Error, Result, Side};
use crate::features::AnnotatedFill;

/// Feature order is part of the stored-model contract.
pub const FEATURE_NAMES: [&'static str; 7] = [
    "side",
    "order_qty",
    "limit_price",
    "bid_price",
    "ask_price",
    "bid_size",
    "ask_size",
];

pub const NUM_FEATURES: usize = FEATURE_NAMES.len();

/// Extract the model features from an annotated fill. Execution-time
/// columns stay out: they do not exist yet when a new order is routed.
pub fn feature_vector(row: &AnnotatedFill) -> [f64; NUM_FEATURES] {
    let side = match Side::from_order_entry(&row.side) {
        Side::Buy => 1.0,
        Side::Sell => 0.0,
    };
    [
        side,
        row.order_qty,
        row.limit_price,
        row.bid_price,
        row.ask_price,
        row.bid_size.unwrap_or(0.0),
        row.ask_size.unwrap_or(0.0),
    ]
}

/// Column-wise standardization fit on the training split.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scaler {
    pub means: Vec<f64>,
    pub stds: Vec<f64>,
}

impl Scaler {
    pub fn fit(rows: &[[f64; NUM_FEATURES]]) -> Self {
        let n = rows.len().max(1) as f64;
        let mut means = vec![0.0; NUM_FEATURES];
        for row in rows {
            for (mean, value) in means.iter_mut().zip(row) {
                *mean += value / n;
            }
        }
        let mut stds = vec![0.0; NUM_FEATURES];
        for row in rows {
            for ((std, value), mean) in stds.iter_mut().zip(row).zip(&means) {
                *std += (value - mean).powi(2) / n;
            }
        }
        for std in &mut stds {
            *std = std.sqrt();
            // A constant column scales by 1 so it contributes nothing
            // after centering instead of dividing by zero.
            if *std == 0.0 {
                *std = 1.0;
            }
        }
        Self { means, stds }
    }

    pub fn transform(&self, x: &[f64; NUM_FEATURES]) -> [f64; NUM_FEATURES] {
        let mut out = [0.0; NUM_FEATURES];
        for i in 0..NUM_FEATURES {
            out[i] = (x[i] - self.means[i]) / self.stds[i];
        }
        out
    }
}

/// Ridge regression over standardized features.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VenueModel {
    pub scaler: Scaler,
    pub weights: Vec<f64>,
    pub intercept: f64,
}

impl VenueModel {
    /// Closed-form ridge fit: standardize, center the target, solve
    /// (ZᵀZ + λI) w = Zᵀ(y − ȳ). The intercept is the target mean and is
    /// not penalized.
    pub fn fit(
        xs: &[[f64; NUM_FEATURES]],
        ys: &[f64],
        lambda: f64,
    ) -> Result<Self> {
        if xs.is_empty() || xs.len() != ys.len() {
            return Err(Error::Training(format!(
                "inconsistent training data: {} feature rows, {} targets",
                xs.len(),
                ys.len()
            )));
        }

        let scaler = Scaler::fit(xs);
        let zs: Vec<[f64; NUM_FEATURES]> = xs.iter().map(|x| scaler.transform(x)).collect();
        let intercept = ys.iter().sum::<f64>() / ys.len() as f64;

        // Normal equations on the centered problem
        let mut gram = vec![vec![0.0; NUM_FEATURES]; NUM_FEATURES];
        let mut rhs = vec![0.0; NUM_FEATURES];
        for (z, y) in zs.iter().zip(ys) {
            let resid = y - intercept;
            for i in 0..NUM_FEATURES {
                rhs[i] += z[i] * resid;
                for j in 0..NUM_FEATURES {
                    gram[i][j] += z[i] * z[j];
                }
            }
        }
        for i in 0..NUM_FEATURES {
            gram[i][i] += lambda;
        }

        let weights = solve(gram, rhs).ok_or_else(|| {
            Error::Training("singular system; increase ridge_lambda".to_string())
        })?;

        Ok(Self {
            scaler,
            weights,
            intercept,
        })
    }

    pub fn predict(&self, x: &[f64; NUM_FEATURES]) -> f64 {
        let z = self.scaler.transform(x);
        self.intercept
            + self
                .weights
                .iter()
                .zip(&z)
                .map(|(w, v)| w * v)
                .sum::<f64>()
    }
}

/// Gaussian elimination with partial pivoting.
fn solve(mut a: Vec<Vec<f64>>, mut b: Vec<f64>) -> Option<Vec<f64>> {
    let n = b.len();
    for col in 0..n {
        let pivot = (col..n).max_by(|&i, &j| {
            a[i][col]
                .abs()
                .partial_cmp(&a[j][col].abs())
                .unwrap_or(std::cmp::Ordering::Equal)
        })?;
        if a[pivot][col].abs() < 1e-12 {
            return None;
        }
        a.swap(col, pivot);
        b.swap(col, pivot);

        for row in (col + 1)..n {
            let factor = a[row][col] / a[col][col];
            for k in col..n {
                a[row][k] -= factor * a[col][k];
            }
            b[row] -= factor * b[col];
        }
    }

    let mut x = vec![0.0; n];
    for row in (0..n).rev() {
        let tail: f64 = ((row + 1)..n).map(|k| a[row][k] * x[k]).sum();
        x[row] = (b[row] - tail) / a[row][row];
    }
    Some(x)
}

/// The persisted artifact: venue id → model.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ModelSet {
    pub models: BTreeMap<String, VenueModel>,
}

impl ModelSet {
    pub fn insert(&mut self, venue: impl Into<String>, model: VenueModel) {
        self.models.insert(venue.into(), model);
    }

    pub fn get(&self, venue: &str) -> Option<&VenueModel> {
        self.models.get(venue)
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let file = File::create(path)?;
        serde_json::to_writer_pretty(BufWriter::new(file), self)?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(Error::ModelStore(format!(
                "model set not found at {}; run `fillscan train` first",
                path.display()
            )));
        }
        let file = File::open(path)?;
        let set = serde_json::from_reader(BufReader::new(file))?;
        Ok(set)
    }
}

/// Held-out evaluation of one venue model.
#[derive(Debug, Clone, Serialize)]
pub struct Evaluation {
    pub exchange: String,
    pub rmse: f64,
    pub r2: f64,
    pub n_test_samples: usize,
}

impl Evaluation {
    pub const CSV_HEADER: [&'static str; 4] = ["exchange", "rmse", "r2", "n_test_samples"];
}

fn rmse(truth: &[f64], predicted: &[f64]) -> f64 {
    let n = truth.len().max(1) as f64;
    let mse: f64 = truth
        .iter()
        .zip(predicted)
        .map(|(t, p)| (t - p).powi(2))
        .sum::<f64>()
        / n;
    mse.sqrt()
}

fn r2_score(truth: &[f64], predicted: &[f64]) -> f64 {
    let n = truth.len().max(1) as f64;
    let mean = truth.iter().sum::<f64>() / n;
    let ss_tot: f64 = truth.iter().map(|t| (t - mean).powi(2)).sum();
    let ss_res: f64 = truth
        .iter()
        .zip(predicted)
        .map(|(t, p)| (t - p).powi(2))
        .sum();
    if ss_tot == 0.0 {
        return 0.0;
    }
    1.0 - ss_res / ss_tot
}

/// Train one model per venue with enough annotated fills. Venues under the
/// sample floor are skipped with a warning, never fatal.
pub fn train_venues(
    rows: &[AnnotatedFill],
    cfg: &TrainingConfig,
) -> Result<(ModelSet, Vec<Evaluation>)> {
    let mut by_venue: BTreeMap<&str, Vec<&AnnotatedFill>> = BTreeMap::new();
    for row in rows {
        if row.exchange.is_empty() {
            continue;
        }
        by_venue.entry(&row.exchange).or_default().push(row);
    }

    let mut set = ModelSet::default();
    let mut evaluations = Vec::new();

    for (venue, venue_rows) in by_venue {
        // A split needs at least one row on each side.
        if venue_rows.len() < cfg.min_samples.max(2) {
            warn!(
                venue,
                samples = venue_rows.len(),
                floor = cfg.min_samples,
                "too few samples, skipping venue"
            );
            continue;
        }

        let xs: Vec<[f64; NUM_FEATURES]> =
            venue_rows.iter().map(|&r| feature_vector(r)).collect();
        let ys: Vec<f64> = venue_rows.iter().map(|r| r.price_improvement).collect();

        // Seeded shuffle split; every venue re-seeds so the split does not
        // depend on venue iteration order.
        let mut indices: Vec<usize> = (0..xs.len()).collect();
        let mut rng = StdRng::seed_from_u64(cfg.seed);
        indices.shuffle(&mut rng);

        let n_test = ((xs.len() as f64 * cfg.test_fraction).ceil() as usize)
            .clamp(1, xs.len() - 1);
        let (test_idx, train_idx) = indices.split_at(n_test);

        let train_xs: Vec<[f64; NUM_FEATURES]> =
            train_idx.iter().map(|&i| xs[i]).collect();
        let train_ys: Vec<f64> = train_idx.iter().map(|&i| ys[i]).collect();

        let model = VenueModel::fit(&train_xs, &train_ys, cfg.ridge_lambda)?;

        let test_truth: Vec<f64> = test_idx.iter().map(|&i| ys[i]).collect();
        let test_pred: Vec<f64> = test_idx.iter().map(|&i| model.predict(&xs[i])).collect();
        let evaluation = Evaluation {
            exchange: venue.to_string(),
            rmse: rmse(&test_truth, &test_pred),
            r2: r2_score(&test_truth, &test_pred),
            n_test_samples: test_idx.len(),
        };
        info!(
            venue,
            train = train_idx.len(),
            test = test_idx.len(),
            rmse = evaluation.rmse,
            r2 = evaluation.r2,
            "trained venue model"
        );

        evaluations.push(evaluation);
        set.insert(venue, model);
    }

    Ok((set, evaluations))
}

/// File front end: annotated CSV in; `models.json` plus
/// `evaluation_results.csv` under `output_dir`.
pub fn train_file(input: &Path, output_dir: &Path, cfg: &TrainingConfig) -> Result<ModelSet> {
    let rows = crate::features::read_annotated(input)?;
    let (set, evaluations) = train_venues(&rows, cfg)?;

    std::fs::create_dir_all(output_dir)?;
    set.save(&output_dir.join("models.json"))?;

    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_path(output_dir.join("evaluation_results.csv"))?;
    writer.write_record(Evaluation::CSV_HEADER)?;
    for evaluation in &evaluations {
        writer.serialize(evaluation)?;
    }
    writer.flush()?;

    info!(
        rows = rows.len(),
        venues = set.len(),
        "training complete"
    );
    Ok(set)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn annotated(exchange: &str, qty: f64, improvement: f64) -> AnnotatedFill {
        let t = NaiveDate::from_ymd_opt(2024, 1, 2)
            .unwrap()
            .and_hms_opt(10, 0, 0)
            .unwrap();
        AnnotatedFill {
            order_id: "X".into(),
            order_time: t,
            execution_time: t,
            symbol: "SYM".into(),
            side: "1".into(),
            order_qty: qty,
            limit_price: 10.0,
            execution_price: 10.0 - improvement,
            exchange: exchange.into(),
            bid_price: 9.9,
            ask_price: 10.1,
            bid_size: Some(100.0),
            ask_size: Some(100.0),
            price_improvement: improvement,
        }
    }

    #[test]
    fn test_scaler_standardizes() {
        let rows = vec![
            [0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 0.0],
            [0.0, 3.0, 0.0, 0.0, 0.0, 0.0, 0.0],
        ];
        let scaler = Scaler::fit(&rows);
        assert_eq!(scaler.means[1], 2.0);
        assert_eq!(scaler.stds[1], 1.0);
        // Constant columns scale by one, not zero
        assert_eq!(scaler.stds[0], 1.0);
        let z = scaler.transform(&rows[0]);
        assert_eq!(z[1], -1.0);
    }

    #[test]
    fn test_solve_known_system() {
        // 2x + y = 5, x + 3y = 10 → x = 1, y = 3
        let a = vec![
            vec![2.0, 1.0, 0.0, 0.0, 0.0, 0.0, 0.0],
            vec![1.0, 3.0, 0.0, 0.0, 0.0, 0.0, 0.0],
            vec![0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0],
            vec![0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0],
            vec![0.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0],
            vec![0.0, 0.0, 0.0, 0.0, 0.0, 1.0, 0.0],
            vec![0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 1.0],
        ];
        let b = vec![5.0, 10.0, 0.0, 0.0, 0.0, 0.0, 0.0];
        let x = solve(a, b).unwrap();
        assert!((x[0] - 1.0).abs() < 1e-9);
        assert!((x[1] - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_fit_recovers_linear_relation() {
        // y = 0.5 * qty (after the other columns stay constant)
        let xs: Vec<[f64; NUM_FEATURES]> = (0..40)
            .map(|i| [1.0, i as f64, 10.0, 9.9, 10.1, 100.0, 100.0])
            .collect();
        let ys: Vec<f64> = (0..40).map(|i| 0.5 * i as f64).collect();
        let model = VenueModel::fit(&xs, &ys, 1e-9).unwrap();

        let prediction = model.predict(&[1.0, 20.0, 10.0, 9.9, 10.1, 100.0, 100.0]);
        assert!((prediction - 10.0).abs() < 1e-6);
    }

    #[test]
    fn test_fit_rejects_empty() {
        assert!(VenueModel::fit(&[], &[], 1.0).is_err());
    }

    #[test]
    fn test_train_skips_thin_venues() {
        let mut rows = Vec::new();
        for i in 0..60 {
            rows.push(annotated("NASD", 100.0 + i as f64, 0.01 * i as f64));
        }
        rows.push(annotated("TINY", 100.0, 0.05));

        let cfg = TrainingConfig::default();
        let (set, evaluations) = train_venues(&rows, &cfg).unwrap();
        assert_eq!(set.len(), 1);
        assert!(set.get("NASD").is_some());
        assert!(set.get("TINY").is_none());
        assert_eq!(evaluations.len(), 1);
        assert_eq!(evaluations[0].exchange, "NASD");
        assert!(evaluations[0].n_test_samples >= 1);
    }

    #[test]
    fn test_model_set_roundtrip() {
        let xs: Vec<[f64; NUM_FEATURES]> = (0..10)
            .map(|i| [1.0, i as f64, 10.0, 9.9, 10.1, 1.0, 1.0])
            .collect();
        let ys: Vec<f64> = (0..10).map(|i| i as f64).collect();
        let model = VenueModel::fit(&xs, &ys, 0.001).unwrap();
        let probe = [1.0, 5.0, 10.0, 9.9, 10.1, 1.0, 1.0];
        let expected = model.predict(&probe);

        let mut set = ModelSet::default();
        set.insert("NASD", model);

        let dir = std::env::temp_dir().join("fillscan-model-roundtrip");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("models.json");
        set.save(&path).unwrap();

        let loaded = ModelSet::load(&path).unwrap();
        let reloaded = loaded.get("NASD").unwrap().predict(&probe);
        assert!((reloaded - expected).abs() < 1e-12);
    }

    #[test]
    fn test_load_missing_store_is_distinguishable() {
        let err = ModelSet::load(Path::new("/nonexistent/models.json")).unwrap_err();
        assert!(matches!(err, Error::ModelStore(_)));
    }
}
