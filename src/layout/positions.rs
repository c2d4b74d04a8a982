use super::catalog::{Catalog, CatalogEntry};
use super::seed::{seed, seeded_random};
use serde::{Deserialize, Serialize};
use std::f64::consts::{PI, TAU};

const TIMELINE_SPAN: f64 = 40.0;
const TIMELINE_RADIUS_MIN: f64 = 8.0;
const TIMELINE_RADIUS_BAND: f64 = 7.0;

const NETWORK_RADIUS_MIN: f64 = 20.0;
const NETWORK_RADIUS_BAND: f64 = 10.0;

const MATRIX_SPACING: f64 = 5.0;
const MAX_DETECTIONS: f64 = 50.0;
const THREAT_AXIS_SPAN: f64 = 20.0;

const PARTICLES_MIN: usize = 100;
const PARTICLES_EXTRA: f64 = 101.0;

pub const THREAT_ENTITY_TYPE: &str = "Threat";

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Point3 {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }
}

/// Precomputed geometry for one catalog entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityPosition {
    pub entity_id: String,
    pub entity_type: String,
    pub name: String,
    pub timeline_position: Point3,
    pub network_position: Point3,
    pub matrix_position: Point3,
    pub change_particles: Vec<Point3>,
}

/// Discrete Y bands of the threat matrix
fn severity_band(severity: Option<&str>) -> f64 {
    match severity {
        Some("critical") => 15.0,
        Some("high") => 10.0,
        Some("medium") => 5.0,
        _ => 0.0,
    }
}

/// Evenly spread by catalog index on Y, seeded polar placement on X/Z.
pub fn timeline_position(seed: u64, index: usize, total: usize) -> Point3 {
    let y = if total > 1 {
        (index as f64 / (total - 1) as f64 - 0.5) * TIMELINE_SPAN
    } else {
        0.0
    };
    let angle = seeded_random(seed, 0) * TAU;
    let radius = TIMELINE_RADIUS_MIN + seeded_random(seed, 1) * TIMELINE_RADIUS_BAND;
    Point3::new(radius * angle.cos(), y, radius * angle.sin())
}

/// Spherical placement: azimuth by catalog index, seeded elevation and radius.
pub fn network_position(seed: u64, index: usize, total: usize) -> Point3 {
    let theta = if total > 0 {
        index as f64 / total as f64 * TAU
    } else {
        0.0
    };
    let phi = (seeded_random(seed, 0) - 0.5) * PI;
    let radius = NETWORK_RADIUS_MIN + seeded_random(seed, 1) * NETWORK_RADIUS_BAND;
    Point3::new(
        radius * phi.cos() * theta.cos(),
        radius * phi.sin(),
        radius * phi.cos() * theta.sin(),
    )
}

/// Grid cell for non-threats; severity / detections / score encoding for
/// threats.
pub fn matrix_position(entry: &CatalogEntry, seed: u64, index: usize, total: usize) -> Point3 {
    if entry.entity_type == THREAT_ENTITY_TYPE {
        let detections = 1.0 + (seeded_random(seed, 2) * 100.0).floor();
        let score = seeded_random(seed, 3);
        let half_span = THREAT_AXIS_SPAN / 2.0;
        return Point3::new(
            detections.min(MAX_DETECTIONS) / MAX_DETECTIONS * THREAT_AXIS_SPAN - half_span,
            severity_band(entry.characteristic_str("severity")),
            score * THREAT_AXIS_SPAN - half_span,
        );
    }

    let grid = grid_size(total);
    let layer = index / (grid * grid);
    let row = (index / grid) % grid;
    let col = index % grid;
    let offset = (grid as f64 - 1.0) * MATRIX_SPACING / 2.0;
    Point3::new(
        col as f64 * MATRIX_SPACING - offset,
        row as f64 * MATRIX_SPACING - offset,
        layer as f64 * MATRIX_SPACING - offset,
    )
}

/// Smallest g with g³ >= total
fn grid_size(total: usize) -> usize {
    let mut grid = ((total as f64).cbrt().round() as usize).max(1);
    while grid.pow(3) < total {
        grid += 1;
    }
    while grid > 1 && (grid - 1).pow(3) >= total {
        grid -= 1;
    }
    grid
}

/// Seeded particle cloud around the timeline position.
pub fn change_particles(seed: u64, around: Point3) -> Vec<Point3> {
    let count = PARTICLES_MIN + (seeded_random(seed, 4) * PARTICLES_EXTRA).floor() as usize;
    (0..count)
        .map(|i| {
            let s = seed + i as u64;
            let angle = seeded_random(s, 0) * TAU;
            let radius = 1.0 + seeded_random(s, 1) * 3.0;
            let jitter = (seeded_random(s, 2) - 0.5) * 4.0;
            Point3::new(
                around.x + radius * angle.cos(),
                around.y + jitter,
                around.z + radius * angle.sin(),
            )
        })
        .collect()
}

/// One `EntityPosition` per catalog entry, in catalog order.
pub fn generate_positions(catalog: &Catalog) -> Vec<EntityPosition> {
    let total = catalog.entities.len();
    catalog
        .entities
        .iter()
        .enumerate()
        .map(|(index, entry)| {
            let s = u64::from(seed(&entry.id));
            let timeline = timeline_position(s, index, total);
            EntityPosition {
                entity_id: entry.id.clone(),
                entity_type: entry.entity_type.clone(),
                name: entry.name.clone(),
                timeline_position: timeline,
                network_position: network_position(s, index, total),
                matrix_position: matrix_position(entry, s, index, total),
                change_particles: change_particles(s, timeline),
            }
        })
        .collect()
}
