pub mod anneal;
#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod error;
pub mod geometry;
pub mod index;
pub mod labeler;
pub mod output;
pub mod place;
pub mod places;
pub mod projection;
pub mod text_metrics;

#[cfg(feature = "cli")]
pub use cli::run;
pub use labeler::{Labeling, PlaceInput, label_places};
