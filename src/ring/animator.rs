/*
 *  ring/animator.rs
 *
 *  PriceRing - see the price coming
 *  (c) 2020-26 Stuart Hunter
 *
 *  Owns the single ring animation and keeps it in step with prices
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

use std::sync::Arc;
use std::time::Duration;

use chrono::Local;
use log::{debug, error, info};
use tokio::sync::{Mutex as TokMutex, watch};

use super::color::Frame;
use super::error::RingError;
use super::render::{FRONT_PIXEL, render};
use super::traits::{AnimationOptions, RingTarget};
use crate::prices::PriceSnapshot;
use crate::settings::Settings;
use crate::tasks::TaskHandle;

/// Lifecycle notifications for whoever mirrors the ring state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RingEvent {
    Idle,
    Started,
    Stopped,
}

/// The animation currently loaded on the target
#[derive(Debug, Clone, PartialEq)]
pub struct AnimationState {
    pub frames: (Frame, Frame),
    pub playing: bool,
}

pub struct RingAnimator {
    target: Box<dyn RingTarget>,
    options: AnimationOptions,
    active: Option<AnimationState>,
    created: bool,
    events: watch::Sender<RingEvent>,
}

impl RingAnimator {
    pub fn new(target: Box<dyn RingTarget>, options: AnimationOptions) -> Result<Self, RingError> {
        options.validate()?;
        let (events, _) = watch::channel(RingEvent::Idle);
        Ok(Self {
            target,
            options,
            active: None,
            created: false,
            events,
        })
    }

    pub fn subscribe(&self) -> watch::Receiver<RingEvent> {
        self.events.subscribe()
    }

    #[cfg(test)]
    pub fn active(&self) -> Option<&AnimationState> {
        self.active.as_ref()
    }

    /// Stops the running animation, if any. The target keeps the created
    /// animation so a later `apply` can restart it.
    pub fn teardown(&mut self) -> Result<(), RingError> {
        let Some(state) = self.active.take() else {
            return Ok(());
        };
        if state.playing {
            self.target.stop()?;
            info!("Ring animation stopped on {}", self.target.name());
            self.events.send_replace(RingEvent::Stopped);
        }
        Ok(())
    }

    /// Shows `frames`, or tears the animation down when there are none.
    ///
    /// A running animation gets its frames replaced in one call; identical
    /// frames are left alone.
    pub fn apply(&mut self, frames: Option<(Frame, Frame)>) -> Result<(), RingError> {
        let Some(frames) = frames else {
            return self.teardown();
        };

        if let Some(state) = self.active.as_mut() {
            if state.frames == frames {
                return Ok(());
            }
            self.target.update_frames(&[frames.0, frames.1])?;
            state.frames = frames;
            debug!("Ring frames replaced on {}", self.target.name());
            return Ok(());
        }

        if self.created {
            self.target.update_frames(&[frames.0, frames.1])?;
        } else {
            self.target.create(&self.options, &[frames.0, frames.1])?;
            self.created = true;
        }
        self.target.start()?;
        self.active = Some(AnimationState { frames, playing: true });
        info!("Ring animation started on {}, now {:?}", self.target.name(), frames.0[FRONT_PIXEL]);
        self.events.send_replace(RingEvent::Started);
        Ok(())
    }
}

/// Renders the selected home's prices onto the animator.
async fn refresh(
    animator: &TokMutex<RingAnimator>,
    prices: &watch::Receiver<PriceSnapshot>,
    settings: &watch::Receiver<Settings>,
) {
    // copy out of the watch borrows before awaiting the lock
    let home_id = settings.borrow().selected_home_id.clone();
    let snapshot = prices.borrow().clone();

    let frames = snapshot
        .series_for(home_id.as_deref())
        .and_then(|series| render(series, &Local::now()));
    if frames.is_none() {
        debug!("No price data for the ring (home {:?}, version {})", home_id, snapshot.version);
    }

    let mut guard = animator.lock().await;
    if let Err(e) = guard.apply(frames) {
        error!("Failed to update ring animation: {}", e);
    }
}

/// Re-renders on every interval tick and whenever prices or the selected
/// home change. The animation is torn down when the task is stopped.
pub fn start_ring_task(
    animator: Arc<TokMutex<RingAnimator>>,
    mut prices: watch::Receiver<PriceSnapshot>,
    mut settings: watch::Receiver<Settings>,
    interval: Duration,
) -> TaskHandle {
    TaskHandle::spawn("ring", move |mut stop_rx| async move {
        info!("Ring task started, refresh every {:?}", interval);
        refresh(&animator, &prices, &settings).await;
        loop {
            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                Ok(()) = prices.changed() => {
                    debug!("Price snapshot changed, refreshing ring");
                }
                Ok(()) = settings.changed() => {
                    debug!("Settings changed, refreshing ring");
                }
                _ = stop_rx.recv() => {
                    info!("Ring task received stop signal.");
                    break;
                }
            }
            refresh(&animator, &prices, &settings).await;
        }
        if let Err(e) = animator.lock().await.teardown() {
            error!("Failed to stop ring animation: {}", e);
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prices::PriceLevel::*;
    use crate::prices::PriceSeries;
    use crate::prices::fixtures::{document_for, midnight, points};
    use crate::prices::snapshot_channel;
    use crate::ring::color::Rgb;
    use crate::ring::drivers::mock::MockRing;
    use crate::ring::render::FRONT_PIXEL;
    use chrono::Duration as ChronoDuration;

    fn frames(level: crate::prices::PriceLevel, hour: i64) -> Option<(Frame, Frame)> {
        let series = PriceSeries {
            today: points(midnight(), &[level; 24]),
            tomorrow: vec![],
        };
        render(&series, &(midnight() + ChronoDuration::hours(hour)))
    }

    fn animator() -> (RingAnimator, MockRing) {
        let mock = MockRing::new();
        let animator = RingAnimator::new(Box::new(mock.clone()), AnimationOptions::default()).unwrap();
        (animator, mock)
    }

    #[test]
    fn test_rejects_bad_options() {
        let options = AnimationOptions { fps: 0, ..Default::default() };
        assert!(RingAnimator::new(Box::new(MockRing::new()), options).is_err());
    }

    #[test]
    fn test_first_apply_creates_and_starts() {
        let (mut animator, mock) = animator();
        let events = animator.subscribe();
        animator.apply(frames(Cheap, 3)).unwrap();

        let state = mock.state();
        assert_eq!(state.create_calls, 1);
        assert_eq!(state.start_calls, 1);
        assert_eq!(state.update_calls, 0);
        assert_eq!(state.last_options, Some(AnimationOptions::default()));
        assert_eq!(state.last_frames.len(), 2);
        assert_eq!(*events.borrow(), RingEvent::Started);
        assert!(animator.active().unwrap().playing);
    }

    #[test]
    fn test_frames_replaced_wholesale() {
        let (mut animator, mock) = animator();
        animator.apply(frames(Cheap, 3)).unwrap();
        animator.apply(frames(Expensive, 3)).unwrap();

        let state = mock.state();
        assert_eq!(state.create_calls, 1);
        assert_eq!(state.start_calls, 1);
        assert_eq!(state.update_calls, 1);
        assert_eq!(state.last_frames[0][FRONT_PIXEL], Rgb::for_level(Expensive));
        assert_eq!(state.last_frames[1][FRONT_PIXEL], Rgb::for_level(Expensive).dimmed());
    }

    #[test]
    fn test_same_frames_are_not_resent() {
        let (mut animator, mock) = animator();
        animator.apply(frames(Normal, 7)).unwrap();
        animator.apply(frames(Normal, 7)).unwrap();
        assert_eq!(mock.state().update_calls, 0);
    }

    #[test]
    fn test_teardown_on_no_data() {
        let (mut animator, mock) = animator();
        let events = animator.subscribe();
        animator.apply(frames(Normal, 7)).unwrap();
        animator.apply(None).unwrap();

        assert_eq!(mock.state().stop_calls, 1);
        assert!(animator.active().is_none());
        assert_eq!(*events.borrow(), RingEvent::Stopped);

        // a second teardown is a no-op
        animator.apply(None).unwrap();
        assert_eq!(mock.state().stop_calls, 1);

        // data returns: reuse the created animation
        animator.apply(frames(Cheap, 8)).unwrap();
        let state = mock.state();
        assert_eq!(state.create_calls, 1);
        assert_eq!(state.update_calls, 1);
        assert_eq!(state.start_calls, 2);
    }

    #[test]
    fn test_failed_start_leaves_no_active_animation() {
        let (mut animator, mock) = animator();
        mock.simulate_start_failure(true);
        assert!(animator.apply(frames(Cheap, 1)).is_err());
        assert!(animator.active().is_none());

        mock.simulate_start_failure(false);
        animator.apply(frames(Cheap, 1)).unwrap();
        assert!(animator.active().is_some());
    }

    #[tokio::test]
    async fn test_ring_task_follows_selection() {
        let series = PriceSeries {
            today: points(midnight(), &[Normal; 24]),
            tomorrow: vec![],
        };
        let (_writer, prices) = snapshot_channel(Some(document_for("home-1", series)));
        let (settings_tx, settings_rx) = watch::channel(Settings::default());

        let mock = MockRing::new();
        let animator = Arc::new(TokMutex::new(
            RingAnimator::new(Box::new(mock.clone()), AnimationOptions::default()).unwrap(),
        ));
        let task = start_ring_task(animator.clone(), prices, settings_rx, Duration::from_secs(3600));

        // nothing selected, nothing shown
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(mock.state().start_calls, 0);

        settings_tx.send_modify(|s| s.selected_home_id = Some("home-1".into()));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(mock.state().start_calls, 1);
        assert!(animator.lock().await.active().is_some());

        task.stop().await;
        assert_eq!(mock.state().stop_calls, 1);
        assert!(animator.lock().await.active().is_none());
    }
}
