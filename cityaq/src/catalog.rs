//! City boundary lookup.
//!
//! A [`CityCatalog`] names the cities the service knows about and returns
//! their boundaries. [`GeoJsonCityDirectory`] reads one GeoJSON file per
//! city from a directory; [`StaticCityCatalog`] keeps boundaries in memory.

use std::collections::BTreeMap;
use std::path::PathBuf;

use thiserror::Error;
use tracing::debug;

use crate::cache::BoxFuture;
use crate::geom::geojson::{merge_polygons, FeatureCollection};
use crate::geom::{GeometryError, Point, Polygon};

/// Half-width in degrees of the box used as the egugrid region.
pub const EGUGRID_RADIUS: f64 = 5.4;

/// Longitude limit of the egugrid region.
pub const MAX_LONGITUDE: f64 = 178.0;

/// Latitude limit of the egugrid region.
pub const MAX_LATITUDE: f64 = 89.5;

const CITY_EXTENSION: &str = "geojson";

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("unknown city {0:?}")]
    NotFound(String),

    #[error("city {0:?} has no polygon geometry")]
    NoPolygons(String),

    #[error("reading city catalog: {0}")]
    Io(#[from] std::io::Error),

    #[error("parsing city geometry: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Geometry(#[from] GeometryError),
}

/// Source of city boundaries.
pub trait CityCatalog: Send + Sync {
    /// Every known city, sorted.
    fn names(&self) -> BoxFuture<'_, Result<Vec<String>, CatalogError>>;

    /// Boundary of `name` in longitude/latitude.
    fn geometry<'a>(&'a self, name: &'a str) -> BoxFuture<'a, Result<Polygon, CatalogError>>;

    /// Region over which egugrid sources of `name` are allocated.
    ///
    /// The default is a box of ±[`EGUGRID_RADIUS`] degrees around the city
    /// centroid, clamped to the modelled domain.
    fn egugrid_region<'a>(&'a self, name: &'a str) -> BoxFuture<'a, Result<Polygon, CatalogError>> {
        Box::pin(async move {
            let city = self.geometry(name).await?;
            Ok(egugrid_box(city.centroid()?))
        })
    }
}

/// Box of ±[`EGUGRID_RADIUS`] around `center`, clamped to the domain.
pub fn egugrid_box(center: Point) -> Polygon {
    let clamp_x = |x: f64| x.clamp(-MAX_LONGITUDE, MAX_LONGITUDE);
    let clamp_y = |y: f64| y.clamp(-MAX_LATITUDE, MAX_LATITUDE);
    Polygon::rect(
        Point::new(clamp_x(center.x - EGUGRID_RADIUS), clamp_y(center.y - EGUGRID_RADIUS)),
        Point::new(clamp_x(center.x + EGUGRID_RADIUS), clamp_y(center.y + EGUGRID_RADIUS)),
    )
}

// =============================================================================
// Directory of GeoJSON files
// =============================================================================

/// Reads `<directory>/<name>.geojson` for each city.
#[derive(Debug, Clone)]
pub struct GeoJsonCityDirectory {
    directory: PathBuf,
}

impl GeoJsonCityDirectory {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    fn path_for(&self, name: &str) -> Result<PathBuf, CatalogError> {
        if name.is_empty() || name.contains(['/', '\\']) || name.starts_with('.') {
            return Err(CatalogError::NotFound(name.to_string()));
        }
        Ok(self.directory.join(format!("{name}.{CITY_EXTENSION}")))
    }
}

impl CityCatalog for GeoJsonCityDirectory {
    fn names(&self) -> BoxFuture<'_, Result<Vec<String>, CatalogError>> {
        Box::pin(async move {
            let mut names = Vec::new();
            let mut entries = tokio::fs::read_dir(&self.directory).await?;
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                if path.extension().is_some_and(|e| e == CITY_EXTENSION) {
                    if let Some(stem) = path.file_stem() {
                        names.push(stem.to_string_lossy().into_owned());
                    }
                }
            }
            names.sort();
            Ok(names)
        })
    }

    fn geometry<'a>(&'a self, name: &'a str) -> BoxFuture<'a, Result<Polygon, CatalogError>> {
        Box::pin(async move {
            let path = self.path_for(name)?;
            let data = match tokio::fs::read(&path).await {
                Ok(data) => data,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    return Err(CatalogError::NotFound(name.to_string()))
                }
                Err(e) => return Err(e.into()),
            };
            let collection: FeatureCollection = serde_json::from_slice(&data)?;
            let polygon = merge_polygons(&collection);
            if polygon.is_empty() {
                return Err(CatalogError::NoPolygons(name.to_string()));
            }
            debug!(city = name, rings = polygon.rings.len(), "Loaded city geometry");
            Ok(polygon)
        })
    }
}

// =============================================================================
// In-memory catalog
// =============================================================================

/// Fixed set of cities held in memory.
#[derive(Debug, Clone, Default)]
pub struct StaticCityCatalog {
    cities: BTreeMap<String, Polygon>,
    egugrid: BTreeMap<String, Polygon>,
}

impl StaticCityCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_city(mut self, name: impl Into<String>, boundary: Polygon) -> Self {
        self.cities.insert(name.into(), boundary);
        self
    }

    /// Override the default egugrid region for `name`.
    pub fn with_egugrid_region(mut self, name: impl Into<String>, region: Polygon) -> Self {
        self.egugrid.insert(name.into(), region);
        self
    }
}

impl CityCatalog for StaticCityCatalog {
    fn names(&self) -> BoxFuture<'_, Result<Vec<String>, CatalogError>> {
        Box::pin(async move { Ok(self.cities.keys().cloned().collect()) })
    }

    fn geometry<'a>(&'a self, name: &'a str) -> BoxFuture<'a, Result<Polygon, CatalogError>> {
        Box::pin(async move {
            self.cities
                .get(name)
                .cloned()
                .ok_or_else(|| CatalogError::NotFound(name.to_string()))
        })
    }

    fn egugrid_region<'a>(&'a self, name: &'a str) -> BoxFuture<'a, Result<Polygon, CatalogError>> {
        Box::pin(async move {
            if let Some(region) = self.egugrid.get(name) {
                return Ok(region.clone());
            }
            let city = self.geometry(name).await?;
            Ok(egugrid_box(city.centroid()?))
        })
    }
}
