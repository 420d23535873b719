use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::anneal::Schedule;
use crate::place::PlacementCosts;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnnealConfig {
    pub minutes: f64,
    pub exploration_steps: usize,
    pub updates: usize,
    pub seed: Option<u64>,
    pub schedule: Option<Schedule>,
    pub max_search_rounds: usize,
    pub max_steps: Option<usize>,
    pub keep_history: bool,
}

impl Default for AnnealConfig {
    fn default() -> Self {
        Self {
            minutes: 2.0,
            exploration_steps: 2000,
            updates: 20,
            seed: None,
            schedule: None,
            max_search_rounds: 64,
            max_steps: None,
            keep_history: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlacementConfig {
    pub buffer: f64,
    pub overlap_weight: f64,
    pub costs: PlacementCosts,
}

impl Default for PlacementConfig {
    fn default() -> Self {
        Self {
            buffer: 2.0,
            overlap_weight: 10.0,
            costs: PlacementCosts::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexConfig {
    pub cell_size: f64,
    pub min_anchor_spacing: Option<f64>,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            cell_size: 64.0,
            min_anchor_spacing: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectionConfig {
    pub zoom: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    pub anneal: AnnealConfig,
    pub placement: PlacementConfig,
    pub index: IndexConfig,
    pub projection: ProjectionConfig,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct AnnealConfigFile {
    minutes: Option<f64>,
    exploration_steps: Option<usize>,
    updates: Option<usize>,
    seed: Option<u64>,
    schedule: Option<Schedule>,
    max_search_rounds: Option<usize>,
    max_steps: Option<usize>,
    keep_history: Option<bool>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct PlacementConfigFile {
    buffer: Option<f64>,
    overlap_weight: Option<f64>,
    costs: Option<PlacementCosts>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct IndexConfigFile {
    cell_size: Option<f64>,
    min_anchor_spacing: Option<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConfigFile {
    anneal: Option<AnnealConfigFile>,
    placement: Option<PlacementConfigFile>,
    index: Option<IndexConfigFile>,
    zoom: Option<f64>,
}

pub fn load_config(path: Option<&Path>) -> anyhow::Result<Config> {
    let Some(path) = path else {
        return Ok(Config::default());
    };
    let contents = std::fs::read_to_string(path)?;
    parse_config(&contents)
}

pub fn parse_config(contents: &str) -> anyhow::Result<Config> {
    let mut config = Config::default();
    let parsed: ConfigFile = json5::from_str(contents)?;

    if let Some(anneal) = parsed.anneal {
        if let Some(v) = anneal.minutes {
            config.anneal.minutes = v;
        }
        if let Some(v) = anneal.exploration_steps {
            config.anneal.exploration_steps = v;
        }
        if let Some(v) = anneal.updates {
            config.anneal.updates = v;
        }
        if let Some(v) = anneal.seed {
            config.anneal.seed = Some(v);
        }
        if let Some(v) = anneal.schedule {
            config.anneal.schedule = Some(v);
        }
        if let Some(v) = anneal.max_search_rounds {
            config.anneal.max_search_rounds = v;
        }
        if let Some(v) = anneal.max_steps {
            config.anneal.max_steps = Some(v);
        }
        if let Some(v) = anneal.keep_history {
            config.anneal.keep_history = v;
        }
    }

    if let Some(placement) = parsed.placement {
        if let Some(v) = placement.buffer {
            config.placement.buffer = v;
        }
        if let Some(v) = placement.overlap_weight {
            config.placement.overlap_weight = v;
        }
        if let Some(v) = placement.costs {
            config.placement.costs = v;
        }
    }

    if let Some(index) = parsed.index {
        if let Some(v) = index.cell_size {
            config.index.cell_size = v;
        }
        if let Some(v) = index.min_anchor_spacing {
            config.index.min_anchor_spacing = Some(v);
        }
    }

    if let Some(zoom) = parsed.zoom {
        config.projection.zoom = Some(zoom);
    }

    Ok(config)
}
