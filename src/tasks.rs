/*
 *  tasks.rs
 *
 *  PriceRing - see the price coming
 *	(c) 2020-26 Stuart Hunter
 *
 *	Handles for the periodic background tasks
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
use log::{error, info};
use std::future::Future;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// A spawned polling loop plus the channel that tells it to exit.
#[derive(Debug)]
pub struct TaskHandle {
    name: String,
    stop_sender: Option<mpsc::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl TaskHandle {
    /// Spawns `task` with the receiving end of its stop channel.
    pub fn spawn<F, Fut>(name: impl Into<String>, task: F) -> Self
    where
        F: FnOnce(mpsc::Receiver<()>) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (stop_sender, stop_rx) = mpsc::channel(1);
        let handle = tokio::spawn(task(stop_rx));
        Self {
            name: name.into(),
            stop_sender: Some(stop_sender),
            handle: Some(handle),
        }
    }

    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().map(|h| h.is_finished()).unwrap_or(true)
    }

    /// Signals the task and waits for it to wind down.
    pub async fn stop(mut self) {
        if let Some(sender) = self.stop_sender.take() {
            if let Err(e) = sender.send(()).await {
                // already gone, nothing listening
                error!("Failed to send stop signal to {} task: {}", self.name, e);
            }
        }
        if let Some(handle) = self.handle.take() {
            handle.await.unwrap_or_else(|e| error!("{} task failed to join: {}", self.name, e));
        }
        info!("{} task stopped.", self.name);
    }
}

impl Drop for TaskHandle {
    fn drop(&mut self) {
        // Drop is not async, best effort only
        if let Some(sender) = self.stop_sender.take() {
            let _ = sender.try_send(());
        }
    }
}
