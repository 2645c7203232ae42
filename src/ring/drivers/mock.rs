/*
 *  ring/drivers/mock.rs
 *
 *  PriceRing - see the price coming
 *  (c) 2020-26 Stuart Hunter
 *
 *  Mock ring target for testing without hardware
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

use std::sync::{Arc, Mutex};

use crate::ring::color::Frame;
use crate::ring::error::RingError;
use crate::ring::traits::{AnimationOptions, RingTarget};

/// Records every call so tests can check what the animator asked for.
/// Clones share the same state.
#[derive(Debug, Clone, Default)]
pub struct MockRing {
    state: Arc<Mutex<MockRingState>>,
}

/// Internal state for the mock ring (shared for inspection in tests)
#[derive(Debug, Clone, Default)]
pub struct MockRingState {
    pub create_calls: usize,
    pub start_calls: usize,
    pub stop_calls: usize,
    pub update_calls: usize,

    /// Frames from the last create() or update_frames()
    pub last_frames: Vec<Frame>,
    pub last_options: Option<AnimationOptions>,

    pub is_created: bool,
    pub is_playing: bool,

    /// Simulate failures (for error testing)
    pub simulate_start_failure: bool,
}

impl MockRing {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the recorded state
    pub fn state(&self) -> MockRingState {
        self.state.lock().unwrap().clone()
    }

    pub fn simulate_start_failure(&self, fail: bool) {
        self.state.lock().unwrap().simulate_start_failure = fail;
    }
}

impl RingTarget for MockRing {
    fn name(&self) -> &str {
        "mock"
    }

    fn create(&mut self, options: &AnimationOptions, frames: &[Frame]) -> Result<(), RingError> {
        if frames.is_empty() {
            return Err(RingError::NoFrames);
        }
        let mut state = self.state.lock().unwrap();
        state.create_calls += 1;
        state.is_created = true;
        state.last_options = Some(options.clone());
        state.last_frames = frames.to_vec();
        Ok(())
    }

    fn start(&mut self) -> Result<(), RingError> {
        let mut state = self.state.lock().unwrap();
        if !state.is_created {
            return Err(RingError::NotCreated);
        }
        if state.simulate_start_failure {
            return Err(RingError::Other("Simulated start failure".to_string()));
        }
        state.start_calls += 1;
        state.is_playing = true;
        Ok(())
    }

    fn stop(&mut self) -> Result<(), RingError> {
        let mut state = self.state.lock().unwrap();
        if !state.is_created {
            return Err(RingError::NotCreated);
        }
        state.stop_calls += 1;
        state.is_playing = false;
        Ok(())
    }

    fn update_frames(&mut self, frames: &[Frame]) -> Result<(), RingError> {
        if frames.is_empty() {
            return Err(RingError::NoFrames);
        }
        let mut state = self.state.lock().unwrap();
        if !state.is_created {
            return Err(RingError::NotCreated);
        }
        state.update_calls += 1;
        state.last_frames = frames.to_vec();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lifecycle_order_enforced() {
        let mut ring = MockRing::new();
        assert!(matches!(ring.start(), Err(RingError::NotCreated)));
        assert!(matches!(ring.update_frames(&[Frame::blank()]), Err(RingError::NotCreated)));

        ring.create(&AnimationOptions::default(), &[Frame::blank()]).unwrap();
        ring.start().unwrap();
        assert!(ring.state().is_playing);
        ring.stop().unwrap();
        assert!(!ring.state().is_playing);
    }

    #[test]
    fn test_empty_frames_rejected() {
        let mut ring = MockRing::new();
        assert!(matches!(
            ring.create(&AnimationOptions::default(), &[]),
            Err(RingError::NoFrames)
        ));
    }
}
