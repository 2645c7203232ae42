/*
 *  prices.rs
 *
 *  PriceRing - see the price coming
 *	(c) 2020-26 Stuart Hunter
 *
 *	Price document model and the shared latest-price snapshot
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
use chrono::{DateTime, FixedOffset, Local, TimeZone};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::watch;

use crate::deutils::{deserialize_null_default, deserialize_numeric_f64};

/// One price point spans an hour.
const POINT_MILLIS: i64 = 3_600_000;

/// Categorical price bucket as published by the price API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PriceLevel {
    VeryCheap,
    Cheap,
    Normal,
    Expensive,
    VeryExpensive,
}

/// One hourly price observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PricePoint {
    pub starts_at: DateTime<FixedOffset>,
    pub level: PriceLevel,
    /// Spot (energy only) component
    #[serde(default, deserialize_with = "deserialize_numeric_f64")]
    pub energy: f64,
    /// Energy plus taxes and grid fees
    #[serde(default, deserialize_with = "deserialize_numeric_f64")]
    pub total: f64,
}

impl PricePoint {
    /// True when `now` falls inside the hour this point describes.
    pub fn covers<Tz: TimeZone>(&self, now: &DateTime<Tz>) -> bool {
        let start = self.starts_at.timestamp_millis();
        let at = now.timestamp_millis();
        start <= at && at < start + POINT_MILLIS
    }
}

/// Today's hourly prices plus tomorrow's once they are published.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PriceSeries {
    #[serde(default, deserialize_with = "deserialize_null_default")]
    pub today: Vec<PricePoint>,
    #[serde(default, deserialize_with = "deserialize_null_default")]
    pub tomorrow: Vec<PricePoint>,
}

impl PriceSeries {
    /// Checks the ordering invariant: strictly increasing start times inside
    /// each list. Length is not checked, DST days carry 23 or 25 points.
    pub fn is_well_formed(&self) -> bool {
        fn increasing(points: &[PricePoint]) -> bool {
            points.windows(2).all(|w| w[0].starts_at < w[1].starts_at)
        }
        increasing(&self.today) && increasing(&self.tomorrow)
    }

    /// The point whose hour contains `now`, searching today then tomorrow.
    pub fn point_at<Tz: TimeZone>(&self, now: &DateTime<Tz>) -> Option<&PricePoint> {
        self.today.iter().chain(self.tomorrow.iter()).find(|p| p.covers(now))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceInfo {
    #[serde(default)]
    pub current: Option<PricePoint>,
    #[serde(flatten)]
    pub series: PriceSeries,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subscription {
    #[serde(default)]
    pub price_info: Option<PriceInfo>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Address {
    #[serde(default)]
    pub address1: Option<String>,
    #[serde(default)]
    pub postal_code: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Home {
    pub id: String,
    #[serde(default)]
    pub app_nickname: Option<String>,
    #[serde(default)]
    pub address: Option<Address>,
    #[serde(default)]
    pub current_subscription: Option<Subscription>,
}

impl Home {
    pub fn price_info(&self) -> Option<&PriceInfo> {
        self.current_subscription
            .as_ref()
            .and_then(|s| s.price_info.as_ref())
    }

    /// Nickname, else street address, else the id.
    pub fn display_name(&self) -> String {
        self.app_nickname
            .clone()
            .filter(|n| !n.is_empty())
            .or_else(|| self.address.as_ref().and_then(|a| a.address1.clone()))
            .unwrap_or_else(|| self.id.clone())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Viewer {
    #[serde(default, deserialize_with = "deserialize_null_default")]
    pub homes: Vec<Home>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentData {
    #[serde(default)]
    pub viewer: Option<Viewer>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphQlError {
    pub message: String,
}

/// Parsed price API response. Only the fields the daemon reads are modelled.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PriceDocument {
    #[serde(default)]
    pub data: Option<DocumentData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<GraphQlError>>,
}

/// A home offered for monitoring (has an active subscription).
#[derive(Debug, Clone, PartialEq)]
pub struct HomeSummary {
    pub id: String,
    pub name: String,
}

impl PriceDocument {
    pub fn homes(&self) -> &[Home] {
        self.data
            .as_ref()
            .and_then(|d| d.viewer.as_ref())
            .map(|v| v.homes.as_slice())
            .unwrap_or(&[])
    }

    pub fn home(&self, id: &str) -> Option<&Home> {
        self.homes().iter().find(|h| h.id == id)
    }

    pub fn series_for(&self, id: &str) -> Option<&PriceSeries> {
        self.home(id).and_then(|h| h.price_info()).map(|p| &p.series)
    }

    /// Homes with a current subscription, in document order.
    pub fn list_homes(&self) -> Vec<HomeSummary> {
        self.homes()
            .iter()
            .filter(|h| h.current_subscription.is_some())
            .map(|h| HomeSummary {
                id: h.id.clone(),
                name: h.display_name(),
            })
            .collect()
    }
}

/// Latest fetched document. Version 0 means nothing has arrived yet.
#[derive(Debug, Clone, Default)]
pub struct PriceSnapshot {
    pub version: u64,
    pub fetched_at: Option<DateTime<Local>>,
    pub document: Option<Arc<PriceDocument>>,
}

impl PriceSnapshot {
    /// Series for the selected home; `None` when either is missing.
    pub fn series_for(&self, home_id: Option<&str>) -> Option<&PriceSeries> {
        let id = home_id?;
        self.document.as_ref()?.series_for(id)
    }

    /// Price in effect at `now` for a home. Falls back to the `current`
    /// point of the last fetch while it still covers `now`.
    pub fn price_at<Tz: TimeZone>(&self, home_id: &str, now: &DateTime<Tz>) -> Option<&PricePoint> {
        let info = self.document.as_ref()?.home(home_id)?.price_info()?;
        info.series
            .point_at(now)
            .or_else(|| info.current.as_ref().filter(|p| p.covers(now)))
    }
}

/// The only handle that can publish new snapshots.
#[derive(Debug)]
pub struct SnapshotWriter {
    tx: watch::Sender<PriceSnapshot>,
}

impl SnapshotWriter {
    pub fn publish(&self, document: PriceDocument) -> u64 {
        let mut version = 0;
        self.tx.send_modify(|snap| {
            snap.version += 1;
            snap.fetched_at = Some(Local::now());
            snap.document = Some(Arc::new(document));
            version = snap.version;
        });
        version
    }
}

/// Creates the snapshot channel, seeded with a cached document if there is one.
pub fn snapshot_channel(cached: Option<PriceDocument>) -> (SnapshotWriter, watch::Receiver<PriceSnapshot>) {
    let initial = match cached {
        Some(doc) => PriceSnapshot {
            version: 1,
            fetched_at: None,
            document: Some(Arc::new(doc)),
        },
        None => PriceSnapshot::default(),
    };
    let (tx, rx) = watch::channel(initial);
    (SnapshotWriter { tx }, rx)
}
