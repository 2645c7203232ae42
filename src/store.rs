/*
 *  store.rs
 *
 *  PriceRing - see the price coming
 *	(c) 2020-26 Stuart Hunter
 *
 *	Persistent daemon state: per-home totals, selection, cached prices
 *
 *	This program is free software: you can redistribute it and/or modify
 *	it under the terms of the GNU General Public License as published by
 *	the Free Software Foundation, either version 3 of the License, or
 *	(at your option) any later version.
 *
 *	This program is distributed in the hope that it will be useful,
 *	but WITHOUT ANY WARRANTY; without even the implied warranty of
 *	MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 *	GNU General Public License for more details.
 *
 *	See <http://www.gnu.org/licenses/> to get a copy of the GNU General
 *	Public License.
 *
 */
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex as TokMutex;

use crate::energy::AccumulatorState;
use crate::prices::PriceDocument;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("state file I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("state encode error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("state writer failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

pub type SharedStore = Arc<TokMutex<StateStore>>;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct StoreData {
    #[serde(default)]
    selected_home_id: Option<String>,
    #[serde(default)]
    homes: BTreeMap<String, AccumulatorState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    prices: Option<PriceDocument>,
}

/// JSON state file, rewritten whole on every save.
#[derive(Debug)]
pub struct StateStore {
    path: PathBuf,
    data: StoreData,
}

impl StateStore {
    /// Loads `path`. A missing file starts empty; an unreadable one is
    /// logged and replaced on the next save.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let data = match fs::read(&path) {
            Ok(bytes) => serde_json::from_slice(&bytes).unwrap_or_else(|e| {
                warn!("Ignoring unreadable state file {}: {}", path.display(), e);
                StoreData::default()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No state file at {}, starting fresh", path.display());
                StoreData::default()
            }
            Err(e) => {
                warn!("Cannot read state file {}: {}", path.display(), e);
                StoreData::default()
            }
        };
        Self { path, data }
    }

    pub fn shared(self) -> SharedStore {
        Arc::new(TokMutex::new(self))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn home_state(&self, home_id: &str) -> AccumulatorState {
        self.data.homes.get(home_id).cloned().unwrap_or_default()
    }

    pub fn set_home_state(&mut self, home_id: &str, state: &AccumulatorState) {
        self.data.homes.insert(home_id.to_string(), state.clone());
    }

    pub fn remove_home(&mut self, home_id: &str) -> bool {
        self.data.homes.remove(home_id).is_some()
    }

    pub fn selected_home_id(&self) -> Option<&str> {
        self.data.selected_home_id.as_deref()
    }

    pub fn set_selected_home_id(&mut self, home_id: Option<String>) {
        self.data.selected_home_id = home_id;
    }

    pub fn cached_prices(&self) -> Option<&PriceDocument> {
        self.data.prices.as_ref()
    }

    pub fn set_cached_prices(&mut self, document: PriceDocument) {
        self.data.prices = Some(document);
    }

    /// Encodes the state and writes it on the blocking pool. Callers hold
    /// the store lock across the await, so two writes never overlap.
    pub async fn save(&self) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec_pretty(&self.data)?;
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || write_atomic(&path, &bytes)).await?
    }
}

/// Writes a temp file next to `path` and renames it into place.
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let mut tmp = path.to_path_buf().into_os_string();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    fs::write(&tmp, bytes)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prices::PriceSeries;
    use crate::prices::fixtures::document_for;
    use chrono::NaiveDate;

    fn temp_path() -> PathBuf {
        std::env::temp_dir()
            .join(format!("pricering-test-{}", rand::random::<u64>()))
            .join("state.json")
    }

    #[test]
    fn test_missing_file_is_empty() {
        let store = StateStore::open(temp_path());
        assert!(store.selected_home_id().is_none());
        assert!(store.cached_prices().is_none());
        assert_eq!(store.home_state("nope"), AccumulatorState::default());
    }

    #[tokio::test]
    async fn test_round_trip() {
        let path = temp_path();
        let mut store = StateStore::open(&path);
        let state = AccumulatorState {
            last_sample_ms: Some(42),
            last_watts: 900.0,
            daily_energy_kwh: 4.25,
            last_day: Some(14),
            last_date: NaiveDate::from_ymd_opt(2024, 3, 14),
        };
        store.set_home_state("home-1", &state);
        store.set_selected_home_id(Some("home-1".into()));
        store.set_cached_prices(document_for("home-1", PriceSeries::default()));
        store.save().await.unwrap();

        let reopened = StateStore::open(&path);
        assert_eq!(reopened.selected_home_id(), Some("home-1"));
        let restored = reopened.home_state("home-1");
        assert_eq!(restored.daily_energy_kwh, 4.25);
        assert_eq!(restored.last_day, Some(14));
        assert_eq!(restored.last_date, NaiveDate::from_ymd_opt(2024, 3, 14));
        // sample fields are not persisted
        assert_eq!(restored.last_sample_ms, None);
        assert_eq!(reopened.cached_prices().unwrap().list_homes()[0].id, "home-1");

        let _ = fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn test_remove_home() {
        let mut store = StateStore::open(temp_path());
        store.set_home_state("home-1", &AccumulatorState::default());
        assert!(store.remove_home("home-1"));
        assert!(!store.remove_home("home-1"));
    }

    #[tokio::test]
    async fn test_corrupt_file_starts_fresh() {
        let path = temp_path();
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, b"{ not json").unwrap();

        let store = StateStore::open(&path);
        assert!(store.selected_home_id().is_none());
        store.save().await.unwrap();
        assert!(StateStore::open(&path).selected_home_id().is_none());

        let _ = fs::remove_dir_all(path.parent().unwrap());
    }
}
