/*
 *  home.rs
 *
 *  PriceRing - see the price coming
 *	(c) 2020-26 Stuart Hunter
 *
 *	Per-home monitors: meter -> accumulator -> readings and state file
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
use anyhow::Context;
use chrono::{DateTime, Local, NaiveDate, TimeZone};
use log::{debug, error, info, warn};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::watch;

use crate::deutils::round2;
use crate::energy::{self, AccumulatorState, Tariff};
use crate::meter::MeterSource;
use crate::prices::{PriceDocument, PriceSnapshot};
use crate::settings::Settings;
use crate::store::SharedStore;
use crate::tasks::TaskHandle;

/// Values published for a home after each successful tick
#[derive(Debug, Clone, PartialEq)]
pub struct HomeReading {
    /// Current consumption in W
    pub measure_power: f64,
    /// kWh since local midnight
    pub meter_power: f64,
    /// Cost per hour at the current net draw
    pub measure_cost: f64,
}

pub struct HomeMonitor<M: MeterSource> {
    home_id: String,
    meter: M,
    state: AccumulatorState,
    prices: watch::Receiver<PriceSnapshot>,
    settings: watch::Receiver<Settings>,
    store: SharedStore,
    readings: watch::Sender<Option<HomeReading>>,
    /// Exposed kWh and date last written to the store
    saved: Option<(f64, Option<NaiveDate>)>,
}

impl<M: MeterSource> HomeMonitor<M> {
    /// Picks up the persisted daily total for `home_id`.
    pub async fn new(
        home_id: &str,
        meter: M,
        prices: watch::Receiver<PriceSnapshot>,
        settings: watch::Receiver<Settings>,
        store: SharedStore,
    ) -> Self {
        let state = store.lock().await.home_state(home_id);
        let (readings, _) = watch::channel(None);
        Self {
            home_id: home_id.to_string(),
            meter,
            state,
            prices,
            settings,
            store,
            readings,
            saved: None,
        }
    }

    pub fn home_id(&self) -> &str {
        &self.home_id
    }

    #[cfg(test)]
    pub fn state(&self) -> &AccumulatorState {
        &self.state
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<HomeReading>> {
        self.readings.subscribe()
    }

    /// One sample. Returns `Ok(None)` when the tick was skipped: no meter
    /// reading, no base rate, or no price for `now`.
    pub async fn tick_at<Tz: TimeZone>(&mut self, now: &DateTime<Tz>) -> anyhow::Result<Option<HomeReading>> {
        let sample = self
            .meter
            .read()
            .await
            .with_context(|| format!("reading meter for home {}", self.home_id))?;
        let Some(sample) = sample else {
            debug!("Home {}: no meter reading, skipping", self.home_id);
            return Ok(None);
        };

        let Some(base_rate) = self.settings.borrow().base_rate else {
            debug!("Home {}: base rate not set, skipping", self.home_id);
            return Ok(None);
        };
        let tariff = {
            let snapshot = self.prices.borrow();
            match snapshot.price_at(&self.home_id, now) {
                Some(point) => Tariff {
                    energy: point.energy,
                    total: point.total,
                    base_rate,
                },
                None => {
                    debug!("Home {}: no price for the current hour, skipping", self.home_id);
                    return Ok(None);
                }
            }
        };

        let (next, update) = energy::update(&self.state, sample, &tariff, now);
        self.state = next;

        let reading = HomeReading {
            measure_power: round2(sample.consumed_w),
            meter_power: update.meter_power_kwh,
            measure_cost: update.instant_cost_rate,
        };
        self.readings.send_if_modified(|current| {
            if current.as_ref() == Some(&reading) {
                return false;
            }
            *current = Some(reading.clone());
            true
        });

        // the file only changes when the exposed total or the day does
        if self.saved != Some((update.meter_power_kwh, self.state.last_date)) {
            self.persist().await?;
        }
        Ok(Some(reading))
    }

    async fn persist(&mut self) -> anyhow::Result<()> {
        let mut store = self.store.lock().await;
        store.set_home_state(&self.home_id, &self.state);
        store
            .save()
            .await
            .with_context(|| format!("saving state for home {}", self.home_id))?;
        self.saved = Some((round2(self.state.daily_energy_kwh), self.state.last_date));
        Ok(())
    }

    /// Samples every `interval` until stopped, then flushes state.
    pub fn spawn(mut self, interval: Duration) -> TaskHandle {
        let name = format!("home {}", self.home_id);
        TaskHandle::spawn(name, move |mut stop_rx| async move {
            info!("Monitoring home {} every {:?}", self.home_id, interval);
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(interval) => {
                        if let Err(e) = self.tick_at(&Local::now()).await {
                            error!("Home {} tick failed: {:#}", self.home_id, e);
                        }
                    }
                    _ = stop_rx.recv() => {
                        info!("Home {} monitor received stop signal.", self.home_id);
                        break;
                    }
                }
            }
            if let Err(e) = self.persist().await {
                error!("{:#}", e);
            }
        })
    }
}

/// Logs each new reading of a home. Ends on stop or once the monitor
/// publishing the readings is gone.
pub fn report_readings(home_id: &str, mut readings: watch::Receiver<Option<HomeReading>>) -> TaskHandle {
    let home_id = home_id.to_string();
    TaskHandle::spawn(format!("readings {}", home_id), move |mut stop_rx| async move {
        loop {
            tokio::select! {
                changed = readings.changed() => {
                    if changed.is_err() {
                        debug!("Home {} readings closed", home_id);
                        break;
                    }
                    let reading = readings.borrow_and_update().clone();
                    if let Some(r) = reading {
                        info!(
                            "Home {}: {} W, {} kWh today, {}/h",
                            home_id, r.measure_power, r.meter_power, r.measure_cost
                        );
                    }
                }
                _ = stop_rx.recv() => break,
            }
        }
    })
}

/// Running monitors and their reading reporters by home id
#[derive(Default)]
pub struct HomeRegistry {
    tasks: HashMap<String, TaskHandle>,
    reporters: HashMap<String, TaskHandle>,
}

impl HomeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts `monitor`. A monitor already running for the same home is
    /// stopped first.
    pub async fn add<M: MeterSource>(&mut self, monitor: HomeMonitor<M>, interval: Duration) {
        let home_id = monitor.home_id().to_string();
        self.stop_home(&home_id).await;
        let reporter = report_readings(&home_id, monitor.subscribe());
        self.reporters.insert(home_id.clone(), reporter);
        self.tasks.insert(home_id, monitor.spawn(interval));
    }

    /// Stops the tasks of `home_id`, returns false when none ran.
    async fn stop_home(&mut self, home_id: &str) -> bool {
        if let Some(reporter) = self.reporters.remove(home_id) {
            reporter.stop().await;
        }
        match self.tasks.remove(home_id) {
            Some(task) => {
                task.stop().await;
                true
            }
            None => false,
        }
    }

    /// Stops the home's monitor and drops its persisted record.
    pub async fn remove(&mut self, home_id: &str, store: &SharedStore) -> anyhow::Result<bool> {
        if !self.stop_home(home_id).await {
            return Ok(false);
        }
        let mut store = store.lock().await;
        store.remove_home(home_id);
        store.save().await.context("saving state after removing home")?;
        info!("Home {} removed", home_id);
        Ok(true)
    }

    /// Removes every monitored home the document no longer lists with a
    /// subscription. A document without any homes removes nothing.
    /// Returns the removed ids, sorted.
    pub async fn retain_listed(&mut self, document: &PriceDocument, store: &SharedStore) -> anyhow::Result<Vec<String>> {
        if document.homes().is_empty() {
            return Ok(Vec::new());
        }
        let listed: Vec<String> = document.list_homes().into_iter().map(|h| h.id).collect();
        let mut stale: Vec<String> = self
            .tasks
            .keys()
            .filter(|id| !listed.contains(id))
            .cloned()
            .collect();
        stale.sort();
        for home_id in &stale {
            warn!("Home {} no longer has a subscription, stopping its monitor", home_id);
            self.remove(home_id, store).await?;
        }
        Ok(stale)
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub async fn stop_all(&mut self) {
        for (_, reporter) in self.reporters.drain() {
            reporter.stop().await;
        }
        for (_, task) in self.tasks.drain() {
            task.stop().await;
        }
    }
}
