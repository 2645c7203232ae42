/*
 *  settings.rs
 *
 *  PriceRing - see the price coming
 *	(c) 2020-26 Stuart Hunter
 *
 *	Runtime settings shared between tasks, with change notification
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
use log::info;
use std::sync::Arc;
use tokio::sync::watch;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Settings {
    /// Home whose prices are shown on the ring
    pub selected_home_id: Option<String>,
    /// Fixed surcharge per kWh on top of the total price; cost is not
    /// computed while unset
    pub base_rate: Option<f64>,
}

/// Cloneable writer side of the settings channel
#[derive(Debug, Clone)]
pub struct SettingsHandle {
    tx: Arc<watch::Sender<Settings>>,
}

impl SettingsHandle {
    pub fn new(initial: Settings) -> Self {
        let (tx, _) = watch::channel(initial);
        Self { tx: Arc::new(tx) }
    }

    pub fn get(&self) -> Settings {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Settings> {
        self.tx.subscribe()
    }

    pub fn set_selected_home(&self, home_id: Option<String>) {
        self.tx.send_if_modified(|s| {
            if s.selected_home_id == home_id {
                return false;
            }
            info!("Ring home changed: {:?} -> {:?}", s.selected_home_id, home_id);
            s.selected_home_id = home_id;
            true
        });
    }

    #[cfg(test)]
    pub fn set_base_rate(&self, base_rate: Option<f64>) {
        self.tx.send_if_modified(|s| {
            if s.base_rate == base_rate {
                return false;
            }
            s.base_rate = base_rate;
            true
        });
    }

    /// Per-home ring toggle. Turning it on moves the ring to `home_id`;
    /// turning it off clears the selection only when `home_id` holds it.
    pub fn set_ledring(&self, home_id: &str, enabled: bool) {
        if enabled {
            self.set_selected_home(Some(home_id.to_string()));
        } else if self.get().selected_home_id.as_deref() == Some(home_id) {
            self.set_selected_home(None);
        }
    }

    /// Whether `home_id` currently owns the ring
    pub fn ledring(&self, home_id: &str) -> bool {
        self.tx.borrow().selected_home_id.as_deref() == Some(home_id)
    }
}
