/*
 *  ring/traits.rs
 *
 *  PriceRing - see the price coming
 *  (c) 2020-26 Stuart Hunter
 *
 *  Render target abstraction for the LED ring
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

use serde::{Deserialize, Serialize};

use super::color::Frame;
use super::error::RingError;

/// How urgently the host should show an animation over others
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    #[default]
    Informative,
    Feedback,
    Critical,
}

/// Playback settings handed to the target on create
#[derive(Debug, Clone, PartialEq)]
pub struct AnimationOptions {
    /// Real frames per second
    pub fps: u32,

    /// Target frames per second; the target interpolates between real
    /// frames up to this rate
    pub tfps: u32,

    /// Rotations per minute (0 keeps the ring still)
    pub rpm: u32,

    pub priority: Priority,
}

impl Default for AnimationOptions {
    fn default() -> Self {
        Self {
            fps: 1,
            tfps: 30,
            rpm: 0,
            priority: Priority::Informative,
        }
    }
}

impl AnimationOptions {
    pub fn validate(&self) -> Result<(), RingError> {
        if self.fps == 0 {
            return Err(RingError::InvalidOptions("fps must be > 0".into()));
        }
        if self.tfps < self.fps {
            return Err(RingError::InvalidOptions("tfps must be >= fps".into()));
        }
        Ok(())
    }
}

/// Something that can play a looping list of ring frames.
///
/// Lifecycle is create -> start -> (update_frames)* -> stop, and a stopped
/// animation may be started again. Implementations only draw; deciding what
/// to draw belongs to the animator.
pub trait RingTarget: Send {
    /// Short name used in log lines
    fn name(&self) -> &str;

    /// Register an animation with the target. Does not start playback.
    fn create(&mut self, options: &AnimationOptions, frames: &[Frame]) -> Result<(), RingError>;

    fn start(&mut self) -> Result<(), RingError>;

    fn stop(&mut self) -> Result<(), RingError>;

    /// Replace all frames of the created animation in one step.
    fn update_frames(&mut self, frames: &[Frame]) -> Result<(), RingError>;
}
