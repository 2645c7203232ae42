/*
 *  ring/drivers/console.rs
 *
 *  PriceRing - see the price coming
 *  (c) 2020-26 Stuart Hunter
 *
 *  Terminal ring: the 24 pixels as a true-color strip on one line
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

use std::fmt::Write as _;
use std::io::Write;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use log::{debug, error};

use crate::ring::color::{Frame, RING_PIXELS};
use crate::ring::error::RingError;
use crate::ring::traits::{AnimationOptions, RingTarget};
use crate::tasks::TaskHandle;

type SharedWriter = Arc<Mutex<Box<dyn Write + Send>>>;

/// Plays the animation as a row of colored blocks, redrawn in place.
pub struct ConsoleRing {
    out: SharedWriter,
    options: Option<AnimationOptions>,
    frames: Arc<Mutex<Vec<Frame>>>,
    playback: Option<TaskHandle>,
}

impl ConsoleRing {
    pub fn new() -> Self {
        Self::with_writer(Box::new(std::io::stdout()))
    }

    pub fn with_writer(out: Box<dyn Write + Send>) -> Self {
        Self {
            out: Arc::new(Mutex::new(out)),
            options: None,
            frames: Arc::new(Mutex::new(Vec::new())),
            playback: None,
        }
    }

    fn set_frames(&self, frames: &[Frame]) -> Result<(), RingError> {
        if frames.is_empty() {
            return Err(RingError::NoFrames);
        }
        let mut guard = self
            .frames
            .lock()
            .map_err(|_| RingError::Other("frame buffer lock poisoned".into()))?;
        *guard = frames.to_vec();
        Ok(())
    }
}

/// One ANSI line for a frame, starting with a carriage return
pub fn render_line(frame: &Frame) -> String {
    let mut line = String::with_capacity(RING_PIXELS * 24);
    line.push('\r');
    for px in frame.iter() {
        let _ = write!(line, "\x1b[48;2;{};{};{}m  ", px.r, px.g, px.b);
    }
    line.push_str("\x1b[0m");
    line
}

/// Frame to show `elapsed` into playback.
///
/// Real frames advance at `fps`. With `tfps` above `fps` the in-between
/// ticks blend towards the next frame; `rpm` turns the whole ring.
fn frame_at(frames: &[Frame], options: &AnimationOptions, elapsed: Duration) -> Frame {
    if frames.is_empty() {
        return Frame::blank();
    }
    let secs = elapsed.as_secs_f64();
    let pos = secs * options.fps as f64;
    let idx = pos.floor() as usize % frames.len();
    let mut frame = frames[idx];
    if options.tfps > options.fps && frames.len() > 1 {
        let next = frames[(idx + 1) % frames.len()];
        frame = frame.blend(&next, pos.fract() as f32);
    }
    if options.rpm > 0 {
        let steps = (secs / 60.0 * options.rpm as f64 * RING_PIXELS as f64).floor() as usize;
        frame = frame.rotated(steps);
    }
    frame
}

impl RingTarget for ConsoleRing {
    fn name(&self) -> &str {
        "console"
    }

    fn create(&mut self, options: &AnimationOptions, frames: &[Frame]) -> Result<(), RingError> {
        options.validate()?;
        self.set_frames(frames)?;
        self.options = Some(options.clone());
        Ok(())
    }

    fn start(&mut self) -> Result<(), RingError> {
        let options = self.options.clone().ok_or(RingError::NotCreated)?;
        if self.playback.as_ref().is_some_and(|p| !p.is_finished()) {
            return Ok(());
        }

        let out = self.out.clone();
        let frames = self.frames.clone();
        let tick = Duration::from_secs_f64(1.0 / options.tfps.max(1) as f64);
        debug!("Console ring playback at {} fps ({} target)", options.fps, options.tfps);

        self.playback = Some(TaskHandle::spawn("console ring", move |mut stop_rx| async move {
            let started = Instant::now();
            let mut last_line = String::new();
            loop {
                let line = match frames.lock() {
                    Ok(frames) => render_line(&frame_at(&frames, &options, started.elapsed())),
                    Err(_) => break,
                };
                if line != last_line {
                    let written = match out.lock() {
                        Ok(mut out) => out.write_all(line.as_bytes()).and_then(|_| out.flush()),
                        Err(_) => break,
                    };
                    if let Err(e) = written {
                        error!("Console ring write failed: {}", e);
                        break;
                    }
                    last_line = line;
                }
                tokio::select! {
                    _ = tokio::time::sleep(tick) => {}
                    _ = stop_rx.recv() => break,
                }
            }
            if let Ok(mut out) = out.lock() {
                let _ = out.write_all(b"\r\x1b[0m\x1b[2K");
                let _ = out.flush();
            }
        }));
        Ok(())
    }

    fn stop(&mut self) -> Result<(), RingError> {
        if self.options.is_none() {
            return Err(RingError::NotCreated);
        }
        // dropping the handle signals the playback loop
        self.playback.take();
        Ok(())
    }

    fn update_frames(&mut self, frames: &[Frame]) -> Result<(), RingError> {
        if self.options.is_none() {
            return Err(RingError::NotCreated);
        }
        self.set_frames(frames)
    }
}
