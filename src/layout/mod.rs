//! Deterministic layout generation.
//!
//! Assigns every catalog entity a timeline, network and matrix position plus
//! a particle cloud, derived only from its id and catalog index, and persists
//! the result for renderers to share.

pub mod catalog;
pub mod job;
pub mod positions;
pub mod seed;
pub mod store;

pub use catalog::{Catalog, CatalogEntry};
pub use job::{run_layout_job, LayoutRunReport};
pub use positions::{generate_positions, EntityPosition, Point3};
pub use store::{PositionSink, SqlitePositionStore, StoredPosition};
