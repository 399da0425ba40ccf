//! Engine configuration

use crate::types::{LandCoverError, LcResult};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Header style used when exporting area tables
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CsvHeader {
    /// `Ano,Classe,Nome da Classe,Área (km²)`
    Portuguese,
    /// `year,class_index,class_name,area_km2`
    Generic,
}

impl CsvHeader {
    pub fn columns(&self) -> [&'static str; 4] {
        match self {
            CsvHeader::Portuguese => ["Ano", "Classe", "Nome da Classe", "Área (km²)"],
            CsvHeader::Generic => ["year", "class_index", "class_name", "area_km2"],
        }
    }
}

/// Runtime parameters for batch processing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Upper bound on concurrent band fetches from the raster collaborator
    pub max_in_flight_fetches: usize,
    /// Minimum spacing between two fetch starts, in milliseconds
    pub min_fetch_interval_ms: u64,
    /// Size of the per-year worker pool (None = number of cores)
    pub worker_threads: Option<usize>,
    /// Header written by the CSV exporter
    pub csv_header: CsvHeader,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_in_flight_fetches: 4,
            min_fetch_interval_ms: 0,
            worker_threads: None,
            csv_header: CsvHeader::Portuguese,
        }
    }
}

impl EngineConfig {
    pub fn from_json_str(json: &str) -> LcResult<Self> {
        let config: EngineConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> LcResult<Self> {
        log::info!("Loading engine configuration from: {}", path.as_ref().display());
        let contents = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&contents)
    }

    pub fn validate(&self) -> LcResult<()> {
        if self.max_in_flight_fetches == 0 {
            return Err(LandCoverError::Config(
                "max_in_flight_fetches must be at least 1".to_string(),
            ));
        }
        if self.worker_threads == Some(0) {
            return Err(LandCoverError::Config(
                "worker_threads must be at least 1 when set".to_string(),
            ));
        }
        Ok(())
    }

    /// Number of worker threads actually used
    pub fn effective_worker_threads(&self) -> usize {
        self.worker_threads.unwrap_or_else(rayon::current_num_threads)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_fill_missing_fields() {
        let config = EngineConfig::from_json_str(r#"{"max_in_flight_fetches": 2}"#).unwrap();
        assert_eq!(config.max_in_flight_fetches, 2);
        assert_eq!(config.min_fetch_interval_ms, 0);
        assert_eq!(config.csv_header, CsvHeader::Portuguese);
    }

    #[test]
    fn test_zero_in_flight_rejected() {
        let err = EngineConfig::from_json_str(r#"{"max_in_flight_fetches": 0}"#).unwrap_err();
        assert!(matches!(err, LandCoverError::Config(_)));
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"worker_threads": 3, "csv_header": "Generic"}}"#).unwrap();

        let config = EngineConfig::from_file(file.path()).unwrap();
        assert_eq!(config.effective_worker_threads(), 3);
        assert_eq!(config.csv_header.columns()[0], "year");
    }
}
