//! Store and query configuration, loadable from JSON.

use std::io::Read;
use std::path::Path;

use geohist_filter::GeometryFailure;
use geohist_index::{GridConfig, IndexConfig};
use serde::{Deserialize, Serialize};

use crate::StorageResult;

/// How queries evaluate filters.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    /// Build geometry for filters with geometry predicates. When off,
    /// geometry predicates pass and results are a superset.
    pub exact_geometry: bool,
    pub geometry_failure: GeometryFailure,
    /// Drop rows whose version does not match instead of yielding them
    /// with `matches == false`.
    pub only_matches: bool,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            exact_geometry: true,
            geometry_failure: GeometryFailure::NoMatch,
            only_matches: false,
        }
    }
}

/// All configuration, as loaded from JSON. Missing sections take their
/// defaults.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeohistConfig {
    pub index: IndexConfig,
    pub grid: GridConfig,
    pub query: QueryConfig,
}

impl GeohistConfig {
    pub fn from_json(json: &str) -> StorageResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_reader(reader: impl Read) -> StorageResult<Self> {
        Ok(serde_json::from_reader(reader)?)
    }

    pub fn load(path: impl AsRef<Path>) -> StorageResult<Self> {
        let file = std::fs::File::open(path)?;
        Self::from_reader(std::io::BufReader::new(file))
    }
}

#[cfg(test)]
mod tests {
    use geohist_index::PageEncodingPolicy;

    use super::*;

    #[test]
    fn test_empty_json_is_default() {
        assert_eq!(GeohistConfig::from_json("{}").unwrap(), GeohistConfig::default());
    }

    #[test]
    fn test_partial_sections() {
        let config = GeohistConfig::from_json(
            r#"{
                "index": { "page_size": 512, "encoding": { "dense_above": 0.5 } },
                "query": { "geometry_failure": "strict", "only_matches": true }
            }"#,
        )
        .unwrap();
        assert_eq!(config.index.page_size, 512);
        assert_eq!(config.index.encoding, PageEncodingPolicy::DenseAbove(0.5));
        assert_eq!(config.index.cache_pages, IndexConfig::default().cache_pages);
        assert_eq!(config.grid, GridConfig::default());
        assert_eq!(config.query.geometry_failure, GeometryFailure::Strict);
        assert!(config.query.only_matches);
        assert!(config.query.exact_geometry);
    }

    #[test]
    fn test_roundtrip_through_json() {
        let mut config = GeohistConfig::default();
        config.grid.max_zoom = 10;
        config.query.exact_geometry = false;
        let json = serde_json::to_string(&config).unwrap();
        assert_eq!(GeohistConfig::from_json(&json).unwrap(), config);
    }

    #[test]
    fn test_rejects_malformed() {
        assert!(GeohistConfig::from_json("{\"index\": 3}").is_err());
        assert!(GeohistConfig::load("/nonexistent/geohist.json").is_err());
    }
}
