use anyhow::{Context, Result};
use std::{collections::HashSet, path::Path, sync::Arc};
use tracing::info;

use super::{DirectFetchClient, MediaSource};

const BUILTIN_STATIONS: &str = include_str!("../../assets/stations.json");

/// Pseudo-region that matches every station.
pub const ALL_REGIONS: &str = "All";

/// Static list of stations, loaded once at start-up and shared read-only.
#[derive(Debug, Clone)]
pub struct StationCatalog {
    stations: Vec<Arc<MediaSource>>,
}

impl StationCatalog {
    /// Built-in catalog, or the JSON file at `path` when given.
    pub async fn load(path: Option<&Path>) -> Result<Self> {
        let catalog = match path {
            Some(path) => {
                let json = tokio::fs::read_to_string(path)
                    .await
                    .with_context(|| format!("Could not read station catalog {}", path.display()))?;
                Self::from_json(&json)?
            }
            None => Self::builtin()?,
        };

        info!("📻 Station catalog loaded: {} stations", catalog.len());
        Ok(catalog)
    }

    pub fn builtin() -> Result<Self> {
        Self::from_json(BUILTIN_STATIONS)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let stations: Vec<MediaSource> = serde_json::from_str(json).context("Invalid station catalog")?;

        let mut seen = HashSet::new();
        for station in &stations {
            if !seen.insert(station.id().to_string()) {
                anyhow::bail!("Duplicate station id in catalog: {}", station.id());
            }
            if !DirectFetchClient::is_valid_url(station.stream_url()) {
                anyhow::bail!("Station {} has an invalid stream URL", station.id());
            }
        }

        Ok(Self {
            stations: stations.into_iter().map(Arc::new).collect(),
        })
    }

    pub fn len(&self) -> usize {
        self.stations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stations.is_empty()
    }

    pub fn all(&self) -> &[Arc<MediaSource>] {
        &self.stations
    }

    pub fn get(&self, id: &str) -> Option<Arc<MediaSource>> {
        self.stations.iter().find(|s| s.id() == id).cloned()
    }

    /// `All` followed by each region in catalog order.
    pub fn regions(&self) -> Vec<String> {
        let mut regions = vec![ALL_REGIONS.to_string()];
        for station in &self.stations {
            if !regions.iter().any(|r| r == station.region()) {
                regions.push(station.region().to_string());
            }
        }
        regions
    }

    pub fn by_region(&self, region: &str) -> Vec<Arc<MediaSource>> {
        if region == ALL_REGIONS {
            return self.stations.clone();
        }

        self.stations
            .iter()
            .filter(|s| s.region() == region)
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_builtin_catalog_loads() {
        let catalog = StationCatalog::builtin().unwrap();
        assert_eq!(catalog.len(), 18);
        assert_eq!(catalog.get("bfm-899").unwrap().name(), "BFM 89.9");
        assert!(catalog.get("nope").is_none());
    }

    #[test]
    fn test_regions_keep_catalog_order() {
        let catalog = StationCatalog::builtin().unwrap();
        let regions = catalog.regions();
        assert_eq!(&regions[..3], &["All", "Kuala Lumpur", "Selangor"]);
        assert_eq!(regions.iter().filter(|r| *r == "Sabah").count(), 1);
    }

    #[test]
    fn test_filter_by_region() {
        let catalog = StationCatalog::builtin().unwrap();
        let sarawak: Vec<_> = catalog.by_region("Sarawak").iter().map(|s| s.id().to_string()).collect();
        assert_eq!(sarawak, vec!["sarawak-fm", "cats-fm"]);
        assert_eq!(catalog.by_region(ALL_REGIONS).len(), catalog.len());
        assert!(catalog.by_region("Perak").is_empty());
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let json = r#"[
            {"id": "a", "name": "A", "frequency": "", "region": "", "category": "", "streamUrl": "http://a"},
            {"id": "a", "name": "B", "frequency": "", "region": "", "category": "", "streamUrl": "http://b"}
        ]"#;
        assert!(StationCatalog::from_json(json).is_err());
    }

    #[test]
    fn test_non_http_stream_url_rejected() {
        let json = r#"[
            {"id": "a", "name": "A", "frequency": "", "region": "", "category": "", "streamUrl": "rtmp://a/live"}
        ]"#;
        assert!(StationCatalog::from_json(json).is_err());
    }
}
