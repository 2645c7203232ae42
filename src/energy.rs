/*
 *  energy.rs
 *
 *  PriceRing - see the price coming
 *	(c) 2020-26 Stuart Hunter
 *
 *	Running daily energy and cost from live meter samples
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
use chrono::{DateTime, Datelike, NaiveDate, TimeZone};
use serde::{Deserialize, Serialize};

use crate::deutils::round2;

const MILLIS_PER_HOUR: f64 = 3_600_000.0;

/// Per-home integration state. Only the daily total and the day marker are
/// persisted; the sample fields start over after a restart.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AccumulatorState {
    #[serde(skip)]
    pub last_sample_ms: Option<i64>,

    #[serde(skip)]
    pub last_watts: f64,

    /// kWh consumed since local midnight, full precision
    #[serde(rename = "meter_power", default)]
    pub daily_energy_kwh: f64,

    /// Day of month the daily total belongs to
    #[serde(default)]
    pub last_day: Option<u32>,

    /// Full local date of the daily total. Files written before it existed
    /// only carry `last_day`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_date: Option<NaiveDate>,
}

/// One live meter reading in watts
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeterSample {
    pub consumed_w: f64,
    pub generated_w: f64,
}

impl MeterSample {
    pub fn net_kw(&self) -> f64 {
        (self.consumed_w - self.generated_w) / 1000.0
    }
}

/// Prices for the hour being integrated, per kWh
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tariff {
    /// Spot price paid back for exported energy
    pub energy: f64,
    /// Spot plus taxes and fees
    pub total: f64,
    /// Fixed per kWh surcharge from settings
    pub base_rate: f64,
}

/// Values exposed after an update, rounded to 2 decimals
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CostUpdate {
    /// Cost per hour at the current draw (negative while exporting)
    pub instant_cost_rate: f64,
    pub meter_power_kwh: f64,
}

/// Cost per hour for a net draw of `net_kw`.
///
/// Drawing from the grid pays the full tariff plus the base rate; exporting
/// earns the spot price only.
pub fn cost_rate(net_kw: f64, tariff: &Tariff) -> f64 {
    if net_kw > 0.0 {
        (tariff.base_rate + tariff.total) * net_kw
    } else {
        tariff.energy * net_kw
    }
}

/// Integrates `sample` into `state`.
///
/// The daily total resets when `now` falls on a different local date than
/// the stored one (day of month only, for state without a date), before
/// anything is added. The first sample after start
/// only seeds the trapezoid. Time running backwards adds nothing.
pub fn update<Tz: TimeZone>(
    state: &AccumulatorState,
    sample: MeterSample,
    tariff: &Tariff,
    now: &DateTime<Tz>,
) -> (AccumulatorState, CostUpdate) {
    let mut next = state.clone();
    let today = now.date_naive();

    let stale = match (next.last_date, next.last_day) {
        (Some(date), _) => date != today,
        (None, Some(day)) => day != today.day(),
        (None, None) => false,
    };
    if stale {
        next.daily_energy_kwh = 0.0;
    }
    next.last_day = Some(today.day());
    next.last_date = Some(today);

    let now_ms = now.timestamp_millis();
    if let Some(last_ms) = next.last_sample_ms {
        let elapsed_hours = (now_ms - last_ms) as f64 / MILLIS_PER_HOUR;
        if elapsed_hours >= 0.0 {
            let delta = ((sample.consumed_w + next.last_watts) / 2000.0) * elapsed_hours;
            if delta > 0.0 {
                next.daily_energy_kwh += delta;
            }
        }
    }
    next.last_watts = sample.consumed_w;
    next.last_sample_ms = Some(now_ms);

    let update = CostUpdate {
        instant_cost_rate: round2(cost_rate(sample.net_kw(), tariff)),
        meter_power_kwh: round2(next.daily_energy_kwh),
    };
    (next, update)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, FixedOffset};

    fn at(day: u32, hour: u32, min: u32) -> DateTime<FixedOffset> {
        FixedOffset::east_opt(3600)
            .unwrap()
            .with_ymd_and_hms(2024, 3, day, hour, min, 0)
            .unwrap()
    }

    fn draw(w: f64) -> MeterSample {
        MeterSample { consumed_w: w, generated_w: 0.0 }
    }

    const TARIFF: Tariff = Tariff { energy: 0.5, total: 1.5, base_rate: 0.25 };

    #[test]
    fn test_first_call_only_seeds() {
        let (state, out) = update(&AccumulatorState::default(), draw(800.0), &TARIFF, &at(14, 10, 0));
        assert_eq!(state.daily_energy_kwh, 0.0);
        assert_eq!(state.last_watts, 800.0);
        assert_eq!(state.last_day, Some(14));
        assert_eq!(out.meter_power_kwh, 0.0);
        // 0.8 kW * (0.25 + 1.5)
        assert_eq!(out.instant_cost_rate, 1.4);
    }

    #[test]
    fn test_constant_kilowatt_for_an_hour() {
        let start = at(14, 10, 0);
        let (state, _) = update(&AccumulatorState::default(), draw(1000.0), &TARIFF, &start);
        let (state, out) = update(&state, draw(1000.0), &TARIFF, &(start + Duration::hours(1)));
        assert!((state.daily_energy_kwh - 1.0).abs() < 1e-9);
        assert_eq!(out.meter_power_kwh, 1.0);
    }

    #[test]
    fn test_trapezoid_between_samples() {
        let start = at(14, 10, 0);
        let (state, _) = update(&AccumulatorState::default(), draw(0.0), &TARIFF, &start);
        let (state, _) = update(&state, draw(2000.0), &TARIFF, &(start + Duration::minutes(30)));
        // average 1 kW for half an hour
        assert!((state.daily_energy_kwh - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_midnight_resets_before_integrating() {
        let state = AccumulatorState {
            last_sample_ms: Some(at(14, 23, 30).timestamp_millis()),
            last_watts: 1000.0,
            daily_energy_kwh: 12.34,
            last_day: Some(14),
            last_date: None,
        };
        let (state, out) = update(&state, draw(1000.0), &TARIFF, &at(15, 0, 30));
        assert_eq!(state.last_day, Some(15));
        assert_eq!(state.last_date, NaiveDate::from_ymd_opt(2024, 3, 15));
        // only the hour across midnight is counted, on the new day
        assert!((state.daily_energy_kwh - 1.0).abs() < 1e-9);
        assert_eq!(out.meter_power_kwh, 1.0);
    }

    #[test]
    fn test_same_day_of_next_month_resets() {
        let state = AccumulatorState {
            daily_energy_kwh: 8.0,
            last_day: Some(14),
            last_date: NaiveDate::from_ymd_opt(2024, 2, 14),
            ..Default::default()
        };
        let (state, out) = update(&state, draw(500.0), &TARIFF, &at(14, 9, 0));
        assert_eq!(state.daily_energy_kwh, 0.0);
        assert_eq!(out.meter_power_kwh, 0.0);
        assert_eq!(state.last_date, NaiveDate::from_ymd_opt(2024, 3, 14));

        // same date carries on
        let (state, _) = update(&state, draw(500.0), &TARIFF, &at(14, 10, 0));
        assert_eq!(state.last_day, Some(14));
        assert!((state.daily_energy_kwh - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_restored_state_without_day_is_kept() {
        let state = AccumulatorState { daily_energy_kwh: 3.0, ..Default::default() };
        let (state, _) = update(&state, draw(500.0), &TARIFF, &at(14, 9, 0));
        assert_eq!(state.daily_energy_kwh, 3.0);
        assert_eq!(state.last_day, Some(14));
    }

    #[test]
    fn test_net_export_uses_energy_price() {
        let sample = MeterSample { consumed_w: 500.0, generated_w: 2500.0 };
        let (_, out) = update(&AccumulatorState::default(), sample, &TARIFF, &at(14, 12, 0));
        // -2 kW * 0.5
        assert_eq!(out.instant_cost_rate, -1.0);

        let balanced = MeterSample { consumed_w: 700.0, generated_w: 700.0 };
        assert_eq!(cost_rate(balanced.net_kw(), &TARIFF), 0.0);
    }

    #[test]
    fn test_clock_stepping_back_adds_nothing() {
        let start = at(14, 10, 0);
        let (state, _) = update(&AccumulatorState::default(), draw(1000.0), &TARIFF, &start);
        let (state, _) = update(&state, draw(1000.0), &TARIFF, &(start - Duration::minutes(10)));
        assert_eq!(state.daily_energy_kwh, 0.0);

        // integration resumes from the new clock
        let (state, _) = update(&state, draw(1000.0), &TARIFF, &start);
        assert!((state.daily_energy_kwh - 1.0 / 6.0).abs() < 1e-9);
    }

    #[test]
    fn test_exposed_values_are_rounded() {
        let start = at(14, 10, 0);
        let (state, _) = update(&AccumulatorState::default(), draw(1234.0), &TARIFF, &start);
        let (state, out) = update(&state, draw(1234.0), &TARIFF, &(start + Duration::minutes(7)));
        assert!(state.daily_energy_kwh > 0.14 && state.daily_energy_kwh < 0.15);
        assert_eq!(out.meter_power_kwh, 0.14);
    }

    #[test]
    fn test_persisted_names() {
        let state = AccumulatorState {
            last_sample_ms: Some(1),
            last_watts: 5.0,
            daily_energy_kwh: 2.5,
            last_day: Some(3),
            last_date: NaiveDate::from_ymd_opt(2024, 3, 3),
        };
        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "meter_power": 2.5, "last_day": 3, "last_date": "2024-03-03" })
        );

        let legacy: AccumulatorState =
            serde_json::from_value(serde_json::json!({ "meter_power": 1.0, "last_day": 3 })).unwrap();
        assert_eq!(legacy.last_date, None);
        assert_eq!(legacy.last_day, Some(3));
    }
}
