use serde::Serialize;
use serde_json::{Map, Value, json};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::anneal::{Schedule, StopReason};
use crate::geometry::Point;
use crate::labeler::{LabelStatus, Labeling};
use crate::place::Placement;
use crate::projection::Mercator;

#[derive(Debug, Serialize)]
pub struct FeatureCollection {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub features: Vec<Feature>,
}

impl FeatureCollection {
    pub fn new(features: Vec<Feature>) -> Self {
        Self {
            kind: "FeatureCollection",
            features,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct Feature {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub geometry: Geometry,
    pub properties: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "coordinates")]
pub enum Geometry {
    Point([f64; 2]),
    Polygon(Vec<Vec<[f64; 2]>>),
}

/// Pixel coordinates, or lon/lat when a projection is given.
fn coordinates(point: Point, projection: Option<&Mercator>) -> [f64; 2] {
    match projection {
        Some(projection) => {
            let location = projection.unproject(point);
            [location.lon, location.lat]
        }
        None => [point.x, point.y],
    }
}

/// One polygon per label. Blocked and crowded labels are included only
/// when `include_dropped` is set, and are marked `dropped`.
pub fn label_features(
    labeling: &Labeling,
    projection: Option<&Mercator>,
    include_dropped: bool,
) -> FeatureCollection {
    let features = labeling
        .labels
        .iter()
        .filter(|label| include_dropped || label.is_placed())
        .map(|label| {
            let place = &label.place;
            let ring = place
                .label_rect()
                .ring()
                .map(|corner| coordinates(corner, projection))
                .to_vec();
            let (registration, justified) = place.registration();
            let location = place.location();

            let mut properties = place.properties().clone();
            properties.insert("name".into(), json!(place.name()));
            properties.insert("rank".into(), json!(place.rank()));
            properties.insert("placement".into(), json!(place.placement()));
            properties.insert("justified".into(), json!(justified));
            properties.insert(
                "registration".into(),
                json!(coordinates(registration, projection)),
            );
            properties.insert("anchor".into(), json!([location.lon, location.lat]));
            properties.insert("dropped".into(), json!(!label.is_placed()));
            properties.insert("blocked_by".into(), json!(label.blocked_by()));
            if let LabelStatus::Crowded { .. } = label.status {
                properties.insert("crowded".into(), json!(true));
            }

            Feature {
                kind: "Feature",
                geometry: Geometry::Polygon(vec![ring]),
                properties,
            }
        })
        .collect();
    FeatureCollection::new(features)
}

pub fn point_features(labeling: &Labeling, projection: Option<&Mercator>) -> FeatureCollection {
    let features = labeling
        .placed()
        .map(|label| {
            let place = &label.place;
            let coordinates = match projection {
                Some(_) => [place.location().lon, place.location().lat],
                None => [place.position().x, place.position().y],
            };
            let mut properties = place.properties().clone();
            properties.insert("name".into(), json!(place.name()));
            properties.insert("rank".into(), json!(place.rank()));
            properties.insert("radius".into(), json!(place.radius()));
            Feature {
                kind: "Feature",
                geometry: Geometry::Point(coordinates),
                properties,
            }
        })
        .collect();
    FeatureCollection::new(features)
}

#[derive(Debug, Serialize)]
pub struct HistoryDump {
    pub stop: StopReason,
    pub schedule: Option<Schedule>,
    pub final_energy: f64,
    pub states: Vec<StateDump>,
}

#[derive(Debug, Serialize)]
pub struct StateDump {
    pub energy: f64,
    pub placements: Vec<PlacementDump>,
}

#[derive(Debug, Serialize)]
pub struct PlacementDump {
    pub name: String,
    pub placement: Placement,
}

impl HistoryDump {
    pub fn from_labeling(labeling: &Labeling) -> Self {
        let states = labeling
            .history
            .iter()
            .map(|snapshot| StateDump {
                energy: snapshot.energy,
                placements: snapshot
                    .placements
                    .iter()
                    .map(|(name, placement)| PlacementDump {
                        name: name.clone(),
                        placement: *placement,
                    })
                    .collect(),
            })
            .collect();
        Self {
            stop: labeling.stop,
            schedule: labeling.schedule,
            final_energy: labeling.energy,
            states,
        }
    }
}

pub fn write_json<T: Serialize>(path: &Path, value: &T) -> anyhow::Result<()> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, value)?;
    writer.write_all(b"\n")?;
    writer.flush()?;
    Ok(())
}
