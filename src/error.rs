use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum PlaceError {
    #[error("invalid longitude {lon:.3} for \"{name}\" (expected -360..=360)")]
    InvalidLongitude { name: String, lon: f64 },
    #[error("invalid latitude {lat:.3} for \"{name}\" (expected -90..=90)")]
    InvalidLatitude { name: String, lat: f64 },
    #[error("unknown preferred placement \"{0}\"")]
    UnknownPreference(String),
    #[error("label \"{name}\" has unusable size {width}x{height}")]
    InvalidLabelSize { name: String, width: f64, height: f64 },
    #[error("anchor radius {radius} for \"{name}\" must be finite and non-negative")]
    InvalidRadius { name: String, radius: f64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum AnnealError {
    #[error("exponential cooling requires a minimum temperature greater than zero (got {0})")]
    NonPositiveMinTemperature(f64),
    #[error("maximum temperature must be greater than zero (got {0})")]
    NonPositiveMaxTemperature(f64),
}

/// No place in the search state can move.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("nothing to do: no moveable places")]
pub struct NothingToDo;

#[derive(Debug, Error)]
pub enum LabelError {
    #[error(transparent)]
    Place(#[from] PlaceError),
    #[error(transparent)]
    Anneal(#[from] AnnealError),
    #[error("\"{0}\" has no pixel position and no projection zoom is configured")]
    MissingPosition(String),
}
