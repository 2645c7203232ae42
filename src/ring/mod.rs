/*
 *  ring/mod.rs
 *
 *  PriceRing - see the price coming
 *  (c) 2020-26 Stuart Hunter
 *
 *  24 pixel LED ring: colors, rendering, targets and the animator
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

// Core trait definitions
pub mod traits;
pub mod error;
pub mod color;

// Price window to frames
pub mod render;

// Animation lifecycle and the refresh task
pub mod animator;

// Render targets
pub mod drivers;

// Re-exports for convenience
pub use animator::{RingAnimator, RingEvent, start_ring_task};
pub use traits::{AnimationOptions, Priority};
