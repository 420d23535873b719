use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::anneal::{Annealer, AutoOptions, Schedule, StopReason};
use crate::config::Config;
use crate::error::{LabelError, NothingToDo};
use crate::geometry::Point;
use crate::index::{PointIndex, resolve};
use crate::place::{Place, PlaceSeed, Placement, PreferredSide};
use crate::places::Places;
use crate::projection::{Location, Mercator};
use crate::text_metrics::{FontSpec, TextMeasure};

/// `position` is in pixels; when absent it is projected from `location`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaceInput {
    pub name: String,
    pub location: Location,
    #[serde(default)]
    pub position: Option<Point>,
    #[serde(default = "default_radius")]
    pub radius: f64,
    #[serde(default = "default_rank")]
    pub rank: u32,
    #[serde(default)]
    pub font: FontSpec,
    #[serde(default)]
    pub preferred: Option<String>,
    #[serde(default)]
    pub properties: serde_json::Map<String, serde_json::Value>,
}

fn default_radius() -> f64 {
    4.0
}

fn default_rank() -> u32 {
    1
}

impl PlaceInput {
    pub fn new(name: impl Into<String>, location: Location) -> Self {
        Self {
            name: name.into(),
            location,
            position: None,
            radius: default_radius(),
            rank: default_rank(),
            font: FontSpec::default(),
            preferred: None,
            properties: serde_json::Map::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum LabelStatus {
    Placed,
    /// Still collides with a higher-priority label after annealing.
    Blocked { by: String },
    /// Anchor too close to a higher-priority anchor; never annealed.
    Crowded { by: String },
}

#[derive(Debug, Clone)]
pub struct LabeledPlace {
    pub place: Place,
    pub status: LabelStatus,
}

impl LabeledPlace {
    pub fn is_placed(&self) -> bool {
        self.status == LabelStatus::Placed
    }

    pub fn blocked_by(&self) -> Option<&str> {
        match &self.status {
            LabelStatus::Placed => None,
            LabelStatus::Blocked { by } | LabelStatus::Crowded { by } => Some(by),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub energy: f64,
    pub placements: Vec<(String, Placement)>,
}

#[derive(Debug, Clone)]
pub struct Labeling {
    pub labels: Vec<LabeledPlace>,
    pub energy: f64,
    pub stop: StopReason,
    pub schedule: Option<Schedule>,
    /// Accepted search states, oldest first. Empty unless history is kept.
    pub history: Vec<Snapshot>,
}

impl Labeling {
    pub fn placed(&self) -> impl Iterator<Item = &LabeledPlace> {
        self.labels.iter().filter(|label| label.is_placed())
    }
}

/// Inputs are stably sorted by rank, which is also the priority order of the
/// final collision pass.
pub fn label_places<R: Rng>(
    mut inputs: Vec<PlaceInput>,
    measure: &dyn TextMeasure,
    config: &Config,
    rng: R,
) -> Result<Labeling, LabelError> {
    inputs.sort_by_key(|input| input.rank);
    let projection = config.projection.zoom.map(Mercator::new);

    let mut all = Vec::with_capacity(inputs.len());
    for input in inputs {
        all.push(build_place(input, measure, config, projection.as_ref())?);
    }

    let crowded = crowding(&all, config.index.min_anchor_spacing);
    let mut places = Places::new();
    for (place, crowd) in all.iter().zip(&crowded) {
        if crowd.is_none() {
            places.add(place.clone());
        }
    }
    log::info!(
        "annealing {} places ({} moveable, {} crowded out)",
        places.len(),
        places.moveable().len(),
        all.len() - places.len()
    );

    let keep_history = config.anneal.keep_history;
    let mut annealer = Annealer::new(
        |places: &Places| places.energy(),
        move |places: &mut Places, rng: &mut R| -> Result<(), NothingToDo> {
            if keep_history {
                places.remember();
            }
            places.move_label(rng)
        },
        rng,
    );
    let outcome = match config.anneal.schedule {
        Some(schedule) => annealer.anneal(places, schedule, config.anneal.updates)?,
        None => {
            let options = AutoOptions {
                exploration_steps: config.anneal.exploration_steps,
                updates: config.anneal.updates,
                max_search_rounds: config.anneal.max_search_rounds,
                max_steps: config.anneal.max_steps,
            };
            annealer.auto(places, config.anneal.minutes, &options)?
        }
    };
    log::info!(
        "annealing stopped ({:?}) after {} steps at energy {:.3}",
        outcome.stop,
        outcome.steps,
        outcome.energy
    );

    let annealed = &outcome.state;
    let resolutions = resolve(annealed, config.index.cell_size);
    let mut resolved = annealed.iter().zip(resolutions);

    let mut labels = Vec::with_capacity(all.len());
    for (place, crowd) in all.into_iter().zip(crowded) {
        let labeled = match crowd {
            Some(by) => LabeledPlace {
                place,
                status: LabelStatus::Crowded { by },
            },
            None => match resolved.next() {
                Some((annealed_place, resolution)) => LabeledPlace {
                    place: annealed_place.clone(),
                    status: match resolution.blocked_by {
                        Some(by) => LabelStatus::Blocked { by },
                        None => LabelStatus::Placed,
                    },
                },
                None => LabeledPlace {
                    place,
                    status: LabelStatus::Placed,
                },
            },
        };
        labels.push(labeled);
    }

    let history = if keep_history {
        let mut history: Vec<Snapshot> = outcome.last.history().map(snapshot).collect();
        history.reverse();
        history
    } else {
        Vec::new()
    };

    Ok(Labeling {
        labels,
        energy: outcome.energy,
        stop: outcome.stop,
        schedule: outcome.schedule,
        history,
    })
}

fn build_place(
    input: PlaceInput,
    measure: &dyn TextMeasure,
    config: &Config,
    projection: Option<&Mercator>,
) -> Result<Place, LabelError> {
    let position = match (input.position, projection) {
        (Some(position), _) => position,
        (None, Some(projection)) => projection.project(input.location),
        (None, None) => return Err(LabelError::MissingPosition(input.name)),
    };
    let preferred = input
        .preferred
        .as_deref()
        .map(str::parse::<PreferredSide>)
        .transpose()?;
    let size = measure.measure(&input.name, &input.font);
    let seed = PlaceSeed {
        name: input.name,
        location: input.location,
        position,
        radius: input.radius,
        rank: input.rank,
        size,
        preferred,
        properties: input.properties,
    };
    Ok(Place::new(seed, &config.placement)?)
}

/// Name of the earlier anchor crowding out each place, if any.
fn crowding(places: &[Place], spacing: Option<f64>) -> Vec<Option<String>> {
    let Some(spacing) = spacing else {
        return vec![None; places.len()];
    };
    let mut index = PointIndex::new(spacing);
    places
        .iter()
        .map(|place| match index.blocks(place.position()) {
            Some(hit) => Some(hit.name.clone()),
            None => {
                index.add(place.position(), place.name());
                None
            }
        })
        .collect()
}

fn snapshot(places: &Places) -> Snapshot {
    Snapshot {
        energy: places.energy(),
        placements: places
            .iter()
            .map(|place| (place.name().to_string(), place.placement()))
            .collect(),
    }
}
