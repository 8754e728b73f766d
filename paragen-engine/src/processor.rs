//! Parameter Processor: builds per-`(category, template, parameter,
//! dimension)` quantile tables from a training corpus and converts between
//! continuous floats and the reserved value-token range (SPEC_FULL.md
//! §4.2, §6 persisted state).

use std::collections::HashMap;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::schema::{CategoryId, ParamId, Schema, TemplateId};

/// One dimension's quantile table plus the summary statistics carried
/// alongside it in the persisted format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quantiles {
    /// `quantiles[0] = min`, `quantiles[n_bins] = max`, length `n_bins + 1`.
    pub quantiles: Vec<f64>,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub std: f64,
}

impl Quantiles {
    /// Build from a raw (already-filtered, non-finite-free) sample, taking
    /// `n_bins + 1` evenly spaced percentiles.
    fn from_samples(mut values: Vec<f64>, n_bins: u32) -> Self {
        values.sort_by(|a, b| a.partial_cmp(b).expect("non-finite values are filtered before sorting"));

        let len = values.len();
        let percentile = |p: f64| -> f64 {
            if len == 1 {
                return values[0];
            }
            let rank = p / 100.0 * (len - 1) as f64;
            let lo = rank.floor() as usize;
            let hi = rank.ceil() as usize;
            let frac = rank - lo as f64;
            values[lo] + (values[hi] - values[lo]) * frac
        };

        let quantiles = (0..=n_bins)
            .map(|k| percentile(k as f64 * 100.0 / n_bins as f64))
            .collect();

        let mean = values.iter().sum::<f64>() / len as f64;
        let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / len as f64;

        Self {
            quantiles,
            min: values[0],
            max: values[len - 1],
            mean,
            std: variance.sqrt(),
        }
    }

    fn discretize(&self, value: f64, v0: u32, n_bins: u32) -> u32 {
        // Right-insertion point: the first index whose quantile exceeds
        // `value`, so a value exactly on a bin's lower edge falls into that
        // bin rather than the one below it.
        let idx = self.quantiles.partition_point(|q| *q <= value);
        let bin = idx.saturating_sub(1).min(n_bins as usize - 1);
        v0 + bin as u32
    }

    fn recover(&self, token_id: u32, v0: u32, n_bins: u32) -> f64 {
        let bin = token_id.wrapping_sub(v0) % n_bins;
        let bin = bin.min(n_bins - 1);
        self.quantiles[bin as usize + 1]
    }
}

/// A single parameter's values, with `parameters` entries possibly scalar
/// (dim 0 only) or an array (one entry per dimension).
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Scalar(f64),
    Vector(Vec<f64>),
}

impl ParamValue {
    fn dims(&self) -> impl Iterator<Item = (u32, f64)> + '_ {
        let values: Vec<f64> = match self {
            ParamValue::Scalar(v) => vec![*v],
            ParamValue::Vector(v) => v.clone(),
        };
        values.into_iter().enumerate().map(|(d, v)| (d as u32, v))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CorpusTemplate {
    pub template: String,
    pub parameters: HashMap<String, ParamValue>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CorpusItem {
    pub category: String,
    pub conceptualization: Vec<CorpusTemplate>,
}

type TableKey = (CategoryId, TemplateId, ParamId);

/// Built from a corpus via [`ParameterProcessor::collect`] or loaded from a
/// previously persisted table via [`ParameterProcessor::load`].
#[derive(Debug, Clone, Default)]
pub struct ParameterProcessor {
    tables: HashMap<TableKey, Vec<Quantiles>>,
}

/// The on-disk shape: `category -> template -> param -> dim-index -> Quantiles`.
type PersistedTable = HashMap<String, HashMap<String, HashMap<String, Vec<Quantiles>>>>;

/// Fold one corpus record's parameter values into `acc`, keyed by
/// `(category, template, param)` with one `Vec<f64>` per dimension. Records
/// naming an unknown category/template/param are skipped.
fn accumulate_item(schema: &Schema, item: &CorpusItem, acc: &mut HashMap<TableKey, Vec<Vec<f64>>>) {
    let Some(category) = schema.category_id(&item.category) else {
        return;
    };
    for tpl in &item.conceptualization {
        let Some(template) = schema.template_id(category, &tpl.template) else {
            continue;
        };
        for (pname, value) in &tpl.parameters {
            let Some(param) = schema.param_id(category, template, pname) else {
                continue;
            };
            let key = (category, template, param);
            let slot = acc.entry(key).or_default();
            for (dim, v) in value.dims() {
                if !v.is_finite() {
                    continue;
                }
                let dim = dim as usize;
                if slot.len() <= dim {
                    slot.resize_with(dim + 1, Vec::new);
                }
                slot[dim].push(v);
            }
        }
    }
}

/// Merge one thread's accumulated samples into another's, concatenating
/// per-dimension sample vectors for any key both sides observed.
fn merge_samples(
    mut into: HashMap<TableKey, Vec<Vec<f64>>>,
    other: HashMap<TableKey, Vec<Vec<f64>>>,
) -> HashMap<TableKey, Vec<Vec<f64>>> {
    for (key, other_dims) in other {
        let slot = into.entry(key).or_default();
        if slot.len() < other_dims.len() {
            slot.resize_with(other_dims.len(), Vec::new);
        }
        for (dim, values) in other_dims.into_iter().enumerate() {
            slot[dim].extend(values);
        }
    }
    into
}

impl ParameterProcessor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ingest a corpus, accumulating every observed value per
    /// `(category, template, param, dim)`, then compute each dimension's
    /// quantile table. Non-finite values are dropped. When a parameter's
    /// dimensionality varies across the corpus, every dimension up to the
    /// maximum observed arity is kept (SPEC_FULL.md §4.2, §9(ii)).
    ///
    /// The per-record accumulation is an embarrassingly-parallel reduction
    /// (SPEC_FULL.md §5): each corpus record only ever appends to its own
    /// `(category, template, param, dim)` slots, so records are folded over
    /// chunks of the corpus on a rayon thread pool and the per-thread maps
    /// merged before the quantile tables are computed.
    pub fn collect(schema: &Schema, items: &[CorpusItem], config: &EngineConfig) -> Self {
        let samples: HashMap<TableKey, Vec<Vec<f64>>> = items
            .par_iter()
            .fold(HashMap::new, |mut acc, item| {
                accumulate_item(schema, item, &mut acc);
                acc
            })
            .reduce(HashMap::new, merge_samples);

        let tables = samples
            .into_iter()
            .map(|(key, per_dim)| {
                let quantiles = per_dim
                    .into_iter()
                    .map(|values| {
                        if values.is_empty() {
                            Quantiles::from_samples(vec![0.0], config.n_bins)
                        } else {
                            Quantiles::from_samples(values, config.n_bins)
                        }
                    })
                    .collect();
                (key, quantiles)
            })
            .collect();

        Self { tables }
    }

    /// Map a continuous value to a token id in `[v0, v0 + n_bins)`. Falls
    /// back to `v0` and logs at `warn` if `(category, template, param, dim)`
    /// was never observed during `collect` (SPEC_FULL.md §4.2, §7 `UnknownSchemaEntry`).
    pub fn discretize(
        &self,
        value: f64,
        category: CategoryId,
        template: TemplateId,
        param: ParamId,
        dim: u32,
        config: &EngineConfig,
    ) -> u32 {
        match self.quantiles_for(category, template, param, dim) {
            Some(q) => q.discretize(value, config.v0, config.n_bins),
            None => {
                warn!(?category, ?template, ?param, dim, "discretize: unknown schema entry, falling back to v0");
                config.v0
            }
        }
    }

    /// Invert [`ParameterProcessor::discretize`]. Falls back to `0.0` and
    /// logs at `warn` on an unknown `(category, template, param, dim)`.
    pub fn recover(
        &self,
        token_id: u32,
        category: CategoryId,
        template: TemplateId,
        param: ParamId,
        dim: u32,
        config: &EngineConfig,
    ) -> f64 {
        match self.quantiles_for(category, template, param, dim) {
            Some(q) => q.recover(token_id, config.v0, config.n_bins),
            None => {
                warn!(?category, ?template, ?param, dim, "recover: unknown schema entry, falling back to 0.0");
                0.0
            }
        }
    }

    /// Discretize every parameter value in one conceptualization record,
    /// elementwise across array-valued parameters.
    pub fn process_item(
        &self,
        schema: &Schema,
        category: CategoryId,
        template: TemplateId,
        param: ParamId,
        values: &[f64],
        config: &EngineConfig,
    ) -> Vec<u32> {
        let _ = schema;
        values
            .iter()
            .enumerate()
            .map(|(d, &v)| self.discretize(v, category, template, param, d as u32, config))
            .collect()
    }

    /// Invert [`ParameterProcessor::process_item`].
    pub fn recover_item(
        &self,
        category: CategoryId,
        template: TemplateId,
        param: ParamId,
        tokens: &[u32],
        config: &EngineConfig,
    ) -> Vec<f64> {
        tokens
            .iter()
            .enumerate()
            .map(|(d, &t)| self.recover(t, category, template, param, d as u32, config))
            .collect()
    }

    fn quantiles_for(&self, category: CategoryId, template: TemplateId, param: ParamId, dim: u32) -> Option<&Quantiles> {
        self.tables
            .get(&(category, template, param))
            .and_then(|dims| dims.get(dim as usize))
    }

    /// Serialize to the persisted mapping format (SPEC_FULL.md §6).
    pub fn to_json(&self, schema: &Schema) -> Result<String> {
        let mut out: PersistedTable = HashMap::new();
        for (&(category, template, param), dims) in &self.tables {
            out.entry(schema.category_name(category).to_string())
                .or_default()
                .entry(schema.template_name(category, template).to_string())
                .or_default()
                .insert(
                    schema.param_name(category, template, param).to_string(),
                    dims.clone(),
                );
        }
        serde_json::to_string_pretty(&out).map_err(|e| EngineError::InvalidStatistics(Box::new(e)))
    }

    /// Deserialize from the persisted mapping format, resolving names
    /// against `schema`. Entries naming a category/template/param absent
    /// from `schema` are skipped.
    pub fn load(json: &str, schema: &Schema) -> Result<Self> {
        let raw: PersistedTable =
            serde_json::from_str(json).map_err(|e| EngineError::InvalidStatistics(Box::new(e)))?;

        let mut tables = HashMap::new();
        for (cname, templates) in raw {
            let Some(category) = schema.category_id(&cname) else {
                continue;
            };
            for (tname, params) in templates {
                let Some(template) = schema.template_id(category, &tname) else {
                    continue;
                };
                for (pname, dims) in params {
                    let Some(param) = schema.param_id(category, template, &pname) else {
                        continue;
                    };
                    tables.insert((category, template, param), dims);
                }
            }
        }
        Ok(Self { tables })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mug_schema() -> Schema {
        Schema::from_json_str(
            r#"{
                "categories": [
                    { "name": "Mug", "templates": [
                        { "name": "Cylindrical_Body", "parameters": [
                            { "name": "size", "dims": 3 },
                            { "name": "r", "dims": 1 }
                        ] }
                    ] }
                ]
            }"#,
        )
        .unwrap()
    }

    fn linear_corpus_item(r: f64) -> CorpusItem {
        CorpusItem {
            category: "Mug".to_string(),
            conceptualization: vec![CorpusTemplate {
                template: "Cylindrical_Body".to_string(),
                parameters: HashMap::from([
                    ("size".to_string(), ParamValue::Vector(vec![r, r, r])),
                    ("r".to_string(), ParamValue::Scalar(r)),
                ]),
            }],
        }
    }

    #[test]
    fn discretize_recover_round_trip_stays_within_one_bin() {
        let schema = mug_schema();
        let config = EngineConfig::default();
        let items: Vec<CorpusItem> = (0..1000).map(|i| linear_corpus_item(i as f64)).collect();
        let processor = ParameterProcessor::collect(&schema, &items, &config);

        let category = schema.category_id("Mug").unwrap();
        let template = schema.template_id(category, "Cylindrical_Body").unwrap();
        let param = schema.param_id(category, template, "r").unwrap();

        for v in [0.0, 250.0, 500.0, 999.0] {
            let token = processor.discretize(v, category, template, param, 0, &config);
            let recovered = processor.recover(token, category, template, param, 0, &config);
            assert!((recovered - v).abs() <= 2.0, "v={v} recovered={recovered}");
        }
    }

    #[test]
    fn single_parameter_scalar_median_maps_to_middle_bin() {
        let schema = mug_schema();
        let config = EngineConfig::default();
        let items: Vec<CorpusItem> = (0..=1000).map(|i| linear_corpus_item(i as f64)).collect();
        let processor = ParameterProcessor::collect(&schema, &items, &config);

        let category = schema.category_id("Mug").unwrap();
        let template = schema.template_id(category, "Cylindrical_Body").unwrap();
        let param = schema.param_id(category, template, "r").unwrap();

        let token = processor.discretize(500.0, category, template, param, 0, &config);
        assert_eq!(token, config.v0 + config.n_bins / 2);
    }

    #[test]
    fn recover_unknown_parameter_falls_back_to_zero() {
        let schema = mug_schema();
        let config = EngineConfig::default();
        let processor = ParameterProcessor::new();

        let category = schema.category_id("Mug").unwrap();
        let template = schema.template_id(category, "Cylindrical_Body").unwrap();
        let param = schema.param_id(category, template, "r").unwrap();

        assert_eq!(processor.recover(config.v0 + 10, category, template, param, 0, &config), 0.0);
        assert_eq!(processor.discretize(42.0, category, template, param, 0, &config), config.v0);
    }

    #[test]
    fn persisted_round_trip_preserves_tables() {
        let schema = mug_schema();
        let config = EngineConfig::default();
        let items: Vec<CorpusItem> = (0..100).map(|i| linear_corpus_item(i as f64)).collect();
        let processor = ParameterProcessor::collect(&schema, &items, &config);

        let json = processor.to_json(&schema).unwrap();
        let reloaded = ParameterProcessor::load(&json, &schema).unwrap();

        let category = schema.category_id("Mug").unwrap();
        let template = schema.template_id(category, "Cylindrical_Body").unwrap();
        let param = schema.param_id(category, template, "size").unwrap();

        assert_eq!(
            processor.quantiles_for(category, template, param, 1),
            reloaded.quantiles_for(category, template, param, 1)
        );
    }

    #[test]
    fn persisted_statistics_round_trip_through_a_real_file() {
        use std::io::Write;

        let schema = mug_schema();
        let config = EngineConfig::default();
        let items: Vec<CorpusItem> = (0..100).map(|i| linear_corpus_item(i as f64)).collect();
        let processor = ParameterProcessor::collect(&schema, &items, &config);

        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(processor.to_json(&schema).unwrap().as_bytes()).unwrap();
        file.flush().unwrap();

        let text = std::fs::read_to_string(file.path()).unwrap();
        let reloaded = ParameterProcessor::load(&text, &schema).unwrap();

        let category = schema.category_id("Mug").unwrap();
        let template = schema.template_id(category, "Cylindrical_Body").unwrap();
        let param = schema.param_id(category, template, "r").unwrap();
        assert_eq!(
            processor.quantiles_for(category, template, param, 0),
            reloaded.quantiles_for(category, template, param, 0)
        );
    }

    #[test]
    fn discards_non_finite_values() {
        let schema = mug_schema();
        let config = EngineConfig::default();
        let mut item = linear_corpus_item(1.0);
        item.conceptualization[0]
            .parameters
            .insert("r".to_string(), ParamValue::Scalar(f64::NAN));
        let processor = ParameterProcessor::collect(&schema, &[item], &config);

        let category = schema.category_id("Mug").unwrap();
        let template = schema.template_id(category, "Cylindrical_Body").unwrap();
        let param = schema.param_id(category, template, "r").unwrap();
        // NaN is discarded, leaving no samples for "r" dim 0; the fallback
        // path (a synthetic single-value table) still yields a finite token.
        let token = processor.discretize(1.0, category, template, param, 0, &config);
        assert!(config.is_value_token(token));
    }
}
