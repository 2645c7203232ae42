/*
 *  main.rs
 *
 *  PriceRing - see the price coming
 *	(c) 2020-26 Stuart Hunter
 *
 *	Daemon entry: price poller, ring animator and home monitors
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

use std::sync::Arc;
use log::{debug, info, error, warn};
use env_logger::Env;
use clap::Parser;
use tokio::sync::Mutex as TokMutex;

#[cfg(unix)] // Only compile this block on Unix-like systems
use tokio::signal::unix::{signal, SignalKind}; // Import specific Unix signals

mod config;
mod deutils;
mod energy;
mod home;
mod meter;
mod prices;
mod ring;
mod settings;
mod store;
mod tasks;
mod tibber;

use config::{Cli, TargetKind};
use home::{HomeMonitor, HomeRegistry};
use meter::HttpMeterSource;
use prices::snapshot_channel;
use ring::drivers::console::ConsoleRing;
use ring::{RingAnimator, RingEvent, start_ring_task};
use settings::{Settings, SettingsHandle};
use store::StateStore;
use tibber::{PricePoller, TibberClient};

include!(concat!(env!("OUT_DIR"), "/build_info.rs"));

/// Asynchronously waits for a SIGINT, SIGTERM, or SIGHUP signal.
async fn signal_handler() -> Result<(), Box<dyn std::error::Error>> {
    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sighup = signal(SignalKind::hangup())?;

    tokio::select! {
        _ = sigint.recv() => {
            info!("SIGINT received. Initiating graceful shutdown.");
        }
        _ = sigterm.recv() => {
            info!("SIGTERM received. Initiating graceful shutdown.");
        }
        _ = sighup.recv() => {
            info!("SIGHUP received. Initiating graceful shutdown.");
        }
    }
    Ok(())
}

/// One-shot fetch for pairing: print the homes that can be monitored.
async fn list_homes(client: &TibberClient, store: &StateStore) -> Result<(), Box<dyn std::error::Error>> {
    let document = match client.fetch_prices().await {
        Ok(doc) => doc,
        Err(e) => match store.cached_prices() {
            Some(cached) => {
                warn!("Price fetch failed ({}), listing cached homes", e);
                cached.clone()
            }
            None => return Err(e.into()),
        },
    };
    let homes = document.list_homes();
    if homes.is_empty() {
        println!("No homes with an active subscription.");
    }
    for home in homes {
        println!("{}\t{}", home.id, home.name);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {

    let cli = Cli::parse();
    let cfg = config::load(&cli)?;

    // Initialize the logger with the configured level, debug flag wins
    let level = cfg.log_level.clone().unwrap_or_else(|| "info".to_string());
    env_logger::Builder::from_env(Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();

    info!("{} - see the price coming", env!("CARGO_PKG_NAME"));
    info!("v.{} built {} ({})", env!("CARGO_PKG_VERSION"), BUILD_DATE, BUILD_REV);

    let store = StateStore::open(cfg.state_file());
    info!("State file: {}", store.path().display());

    let token = cfg.api_token().unwrap_or_default();
    let client = TibberClient::new(cfg.api_url(), token)?;

    if cli.list_homes {
        return list_homes(&client, &store).await;
    }

    // selection: command line / config first, then whatever was last stored
    let selected = cfg
        .selected_home_id
        .clone()
        .or_else(|| store.selected_home_id().map(str::to_string));
    let settings = SettingsHandle::new(Settings {
        selected_home_id: selected,
        base_rate: cfg.base_rate,
    });
    for home in &cfg.homes {
        if let Some(enabled) = home.ledring {
            settings.set_ledring(&home.id, enabled);
        }
    }
    match settings.get().selected_home_id {
        Some(id) => info!("Ring shows home {}", id),
        None => warn!("No home selected for the ring; pick one with --home (see --list-homes)"),
    }
    if cfg.base_rate.is_none() {
        warn!("base_rate not set, energy cost will not be computed");
    }

    let (writer, prices_rx) = snapshot_channel(store.cached_prices().cloned());
    if prices_rx.borrow().document.is_some() {
        info!("Loaded cached price document");
    }
    let store = store.shared();

    // price poller: the only writer of the snapshot
    let poller = PricePoller::new(client, writer)
        .with_store(store.clone())
        .start(cfg.price_interval());

    // ring
    let mut ring_events = tokio::sync::watch::channel(RingEvent::Idle).1;
    let ring_task = match cfg.ring_target() {
        TargetKind::Console => {
            let animator = RingAnimator::new(Box::new(ConsoleRing::new()), cfg.animation_options())?;
            ring_events = animator.subscribe();
            let animator = Arc::new(TokMutex::new(animator));
            Some(start_ring_task(
                animator,
                prices_rx.clone(),
                settings.subscribe(),
                cfg.ring_interval(),
            ))
        }
        TargetKind::None => {
            info!("Ring output disabled");
            None
        }
    };

    // home monitors
    let mut registry = HomeRegistry::new();
    for home in &cfg.homes {
        let meter = HttpMeterSource::new(&home.meter_url)?;
        info!(
            "Home {}: meter {}, ring {}",
            home.id,
            meter.url(),
            if settings.ledring(&home.id) { "on" } else { "off" }
        );
        let monitor = HomeMonitor::new(
            &home.id,
            meter,
            prices_rx.clone(),
            settings.subscribe(),
            store.clone(),
        )
        .await;
        registry.add(monitor, cfg.meter_interval()).await;
    }
    info!("{} home monitor(s) running", registry.len());

    let mut prices_watch = prices_rx.clone();
    let mut settings_watch = settings.subscribe();
    let shutdown = signal_handler();
    tokio::pin!(shutdown);

    // Main application loop
    loop {
        tokio::select! {
            // Handle Unix signals for graceful shutdown
            result = &mut shutdown => {
                if let Err(e) = result {
                    error!("Signal handling failed: {}", e);
                }
                break;
            }
            Ok(()) = settings_watch.changed() => {
                let selected = settings_watch.borrow_and_update().selected_home_id.clone();
                let mut store = store.lock().await;
                store.set_selected_home_id(selected);
                if let Err(e) = store.save().await {
                    error!("Failed to save selection: {}", e);
                }
            }
            Ok(()) = prices_watch.changed() => {
                let document = {
                    let snapshot = prices_watch.borrow_and_update();
                    debug!("Price snapshot v{} fetched {:?}", snapshot.version, snapshot.fetched_at);
                    snapshot.document.clone()
                };
                // homes that left the account stop being monitored
                if let Some(doc) = document {
                    match registry.retain_listed(&doc, &store).await {
                        Ok(removed) if !removed.is_empty() => {
                            info!("{} home monitor(s) left", registry.len());
                        }
                        Ok(_) => {}
                        Err(e) => error!("Failed to drop vanished homes: {:#}", e),
                    }
                }
            }
            Ok(()) = ring_events.changed() => {
                let event = *ring_events.borrow_and_update();
                debug!("Ring event: {:?}", event);
            }
        }
    }

    info!("Main application exiting. Stopping ring and polling tasks.");

    if let Some(task) = ring_task {
        task.stop().await;
    }
    poller.stop().await;
    registry.stop_all().await;

    // monitors flushed their own records, this keeps the selection
    {
        let mut store = store.lock().await;
        store.set_selected_home_id(settings.get().selected_home_id);
        if let Err(e) = store.save().await {
            error!("Failed to save state on exit: {}", e);
        }
    }

    Ok(())
}
