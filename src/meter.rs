/*
 *  meter.rs
 *
 *  PriceRing - see the price coming
 *	(c) 2020-26 Stuart Hunter
 *
 *	Live power meter sources
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
use log::debug;
use reqwest::{Client, header};
use serde::Deserialize;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;

use crate::energy::MeterSample;

#[derive(Debug, Error)]
pub enum MeterError {
    #[error("meter request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("meter report unreadable: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Where a home monitor gets its live power from.
///
/// `Ok(None)` means the meter answered but had nothing to report this time;
/// the monitor skips the tick.
pub trait MeterSource: Send + Sync + 'static {
    fn read(&self) -> impl Future<Output = Result<Option<MeterSample>, MeterError>> + Send;
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct Watt {
    #[serde(rename = "W")]
    pub w: f64,
}

/// Meter report as served by the live meter endpoint
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeterReport {
    #[serde(default)]
    pub total_consumed: Option<Watt>,
    #[serde(default)]
    pub total_generated: Option<Watt>,
}

impl MeterReport {
    /// A report without consumption is not a sample; missing generation
    /// counts as zero.
    pub fn sample(&self) -> Option<MeterSample> {
        let consumed = self.total_consumed?;
        Some(MeterSample {
            consumed_w: consumed.w,
            generated_w: self.total_generated.map(|g| g.w).unwrap_or(0.0),
        })
    }
}

/// Polls a JSON meter report over HTTP
#[derive(Debug, Clone)]
pub struct HttpMeterSource {
    url: String,
    client: Client,
}

impl HttpMeterSource {
    pub fn new(url: &str) -> Result<Self, MeterError> {
        const VERSION: &str = concat!(env!("CARGO_PKG_NAME"), " v", env!("CARGO_PKG_VERSION"));

        let mut headers = header::HeaderMap::new();
        headers.insert("User-Agent", header::HeaderValue::from_static(VERSION));
        headers.insert("Accept", header::HeaderValue::from_static("application/json"));

        let client = Client::builder()
            .connect_timeout(Duration::from_secs(2))
            .default_headers(headers)
            .timeout(Duration::from_secs(5))
            .build()?;

        Ok(Self { url: url.to_string(), client })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl MeterSource for HttpMeterSource {
    async fn read(&self) -> Result<Option<MeterSample>, MeterError> {
        let response = self.client.get(&self.url).send().await?;
        response.error_for_status_ref()?;
        let body = response.text().await?;
        let report: MeterReport = serde_json::from_str(&body)?;
        let sample = report.sample();
        if sample.is_none() {
            debug!("Meter at {} reported no consumption", self.url);
        }
        Ok(sample)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_parsing() {
        let report: MeterReport = serde_json::from_str(
            r#"{"totalConsumed":{"W":1520.5},"totalGenerated":{"W":300}}"#,
        )
        .unwrap();
        let sample = report.sample().unwrap();
        assert_eq!(sample.consumed_w, 1520.5);
        assert_eq!(sample.generated_w, 300.0);
    }

    #[test]
    fn test_missing_fields() {
        let report: MeterReport = serde_json::from_str(r#"{"totalConsumed":{"W":80}}"#).unwrap();
        assert_eq!(report.sample().unwrap().generated_w, 0.0);

        let report: MeterReport = serde_json::from_str(r#"{"totalGenerated":{"W":80}}"#).unwrap();
        assert!(report.sample().is_none());

        let report: MeterReport = serde_json::from_str("{}").unwrap();
        assert!(report.sample().is_none());
    }

    #[test]
    fn test_source_keeps_url() {
        let source = HttpMeterSource::new("http://meter.local/report").unwrap();
        assert_eq!(source.url(), "http://meter.local/report");
    }
}
