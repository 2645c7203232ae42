/*
 *  ring/render.rs
 *
 *  PriceRing - see the price coming
 *  (c) 2020-26 Stuart Hunter
 *
 *  Price window renderer: hourly prices to a pair of ring frames
 *
 *  This program is free software: you can redistribute it and/or modify
 *  it under the terms of the GNU General Public License as published by
 *  the Free Software Foundation, either version 3 of the License, or
 *  (at your option) any later version.
 *
 *  This program is distributed in the hope that it will be useful,
 *  but WITHOUT ANY WARRANTY; without even the implied warranty of
 *  MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 *  GNU General Public License for more details.
 *
 *  See <http://www.gnu.org/licenses/> to get a copy of the GNU General
 *  Public License.
 *
 */

use chrono::{DateTime, TimeZone};

use super::color::{Frame, RING_PIXELS, Rgb};
use crate::prices::{PricePoint, PriceSeries};

/// Past hours kept on the ring once the current hour moves past noon.
/// 11 past + current + 12 upcoming fill the 24 pixels.
pub const MAX_HISTORY: usize = 11;

/// The ring hardware puts pixel 0 two steps off the front
const FRONT_SHIFT: usize = 2;

/// Pixel index showing the current hour in a rendered frame.
/// Upcoming hours follow at FRONT_PIXEL - 1, FRONT_PIXEL - 2, ... (wrapping),
/// past hours at FRONT_PIXEL + 1, FRONT_PIXEL + 2, ...
pub const FRONT_PIXEL: usize = RING_PIXELS - 1 - FRONT_SHIFT;

/// Index into `today` of the hour containing `now`.
///
/// Scans forward only and never past the last point present, so short or
/// gappy upstream data clamps to the newest known hour instead of reading
/// out of bounds. Returns `None` for an empty day.
pub fn current_hour_index<Tz: TimeZone>(today: &[PricePoint], now: &DateTime<Tz>) -> Option<usize> {
    if today.is_empty() {
        return None;
    }
    let last = today.len().min(RING_PIXELS) - 1;
    let now_ms = now.timestamp_millis();
    let mut idx = 0;
    while idx < last && today[idx + 1].starts_at.timestamp_millis() <= now_ms {
        idx += 1;
    }
    Some(idx)
}

/// Renders `(frame, blink_frame)` for the ring.
///
/// The current hour is drawn at full brightness on `FRONT_PIXEL`, every other
/// hour at a tenth. The blink frame is identical except the current hour is
/// dimmed too, so alternating the two makes it flash.
///
/// Returns `None` when there is nothing sensible to show (no points for
/// today, or points out of order). Callers should then stop the animation.
pub fn render<Tz: TimeZone>(series: &PriceSeries, now: &DateTime<Tz>) -> Option<(Frame, Frame)> {
    if !series.is_well_formed() {
        return None;
    }
    let mut start = current_hour_index(&series.today, now)?;

    let mut pixels: Vec<Rgb> = series
        .today
        .iter()
        .enumerate()
        .map(|(i, p)| {
            let rgb = Rgb::for_level(p.level);
            if i == start { rgb } else { rgb.dimmed() }
        })
        .chain(series.tomorrow.iter().map(|p| Rgb::for_level(p.level).dimmed()))
        .collect();

    if start > MAX_HISTORY {
        pixels.drain(..start - MAX_HISTORY);
        start = MAX_HISTORY;
    }
    // pad with black or cut the far future
    pixels.resize(RING_PIXELS, Rgb::BLACK);
    pixels.rotate_left(start);

    let mut blink = pixels.clone();
    blink[0] = blink[0].dimmed();

    Some((face_front(pixels), face_front(blink)))
}

/// Moves pixel 0 to the front of the ring and flips the direction so
/// later hours run clockwise.
fn face_front(mut pixels: Vec<Rgb>) -> Frame {
    pixels.rotate_right(FRONT_SHIFT);
    pixels.reverse();
    Frame::from_pixels(&pixels)
}
