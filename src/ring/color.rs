/*
 *  ring/color.rs
 *
 *  PriceRing - see the price coming
 *  (c) 2020-26 Stuart Hunter
 *
 *  Pixel colors, price level palette and the fixed-size ring frame
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

use std::ops::Index;

use crate::prices::PriceLevel;

/// Number of pixels on the ring
pub const RING_PIXELS: usize = 24;

/// Dimmed pixels run at a tenth of full brightness
const DIM_DIVISOR: f32 = 10.0;

/// One ring pixel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const BLACK: Rgb = Rgb::new(0, 0, 0);

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Palette entry for a price level, green for very cheap through red
    /// for very expensive.
    pub fn for_level(level: PriceLevel) -> Self {
        match level {
            PriceLevel::VeryCheap => Rgb::new(0, 255, 0),
            PriceLevel::Cheap => Rgb::new(128, 255, 0),
            PriceLevel::Normal => Rgb::new(255, 255, 0),
            PriceLevel::Expensive => Rgb::new(255, 128, 0),
            PriceLevel::VeryExpensive => Rgb::new(255, 0, 0),
        }
    }

    /// Each channel divided by ten, rounded to nearest
    pub fn dimmed(self) -> Self {
        fn dim(c: u8) -> u8 {
            (c as f32 / DIM_DIVISOR).round() as u8
        }
        Rgb::new(dim(self.r), dim(self.g), dim(self.b))
    }

    /// Linear blend towards `other`, `t` in 0.0..=1.0
    pub fn blend(self, other: Rgb, t: f32) -> Self {
        let t = t.clamp(0.0, 1.0);
        let mix = |a: u8, b: u8| (a as f32 + (b as f32 - a as f32) * t).round() as u8;
        Rgb::new(mix(self.r, other.r), mix(self.g, other.g), mix(self.b, other.b))
    }
}

/// A complete ring snapshot, always exactly `RING_PIXELS` long
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame([Rgb; RING_PIXELS]);

impl Frame {
    pub const fn blank() -> Self {
        Frame([Rgb::BLACK; RING_PIXELS])
    }

    /// Pads with black or truncates so the result fits the ring.
    pub fn from_pixels(pixels: &[Rgb]) -> Self {
        let mut frame = Frame::blank();
        for (slot, px) in frame.0.iter_mut().zip(pixels) {
            *slot = *px;
        }
        frame
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Rgb> {
        self.0.iter()
    }

    /// Rotate the whole frame by `steps` pixels (clockwise)
    pub fn rotated(&self, steps: usize) -> Self {
        let mut pixels = self.0;
        pixels.rotate_right(steps % RING_PIXELS);
        Frame(pixels)
    }

    pub fn blend(&self, other: &Frame, t: f32) -> Self {
        let mut out = Frame::blank();
        for (i, slot) in out.0.iter_mut().enumerate() {
            *slot = self.0[i].blend(other.0[i], t);
        }
        out
    }
}

impl Default for Frame {
    fn default() -> Self {
        Frame::blank()
    }
}

impl Index<usize> for Frame {
    type Output = Rgb;

    fn index(&self, index: usize) -> &Rgb {
        &self.0[index]
    }
}
