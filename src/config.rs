use serde::{Deserialize, Serialize};
use clap::{ArgAction, Parser, ValueHint};
use dirs_next::{data_local_dir, home_dir};
use std::{fs, path::{Path, PathBuf}};
use std::time::Duration;
use thiserror::Error;

use crate::ring::{AnimationOptions, Priority};
use crate::tibber::DEFAULT_API_URL;

pub const DEFAULT_PRICE_INTERVAL_SECS: u64 = 17 * 60;
pub const DEFAULT_RING_INTERVAL_SECS: u64 = 59;
pub const DEFAULT_METER_INTERVAL_SECS: u64 = 7;

/// Error type for config loading/validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Validation error: {0}")]
    Validation(String),
}

/// Top-level app configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    pub log_level: Option<String>,     // e.g., "info" | "debug"
    pub tibber: Option<TibberConfig>,
    /// per kWh surcharge added to the total price
    pub base_rate: Option<f64>,
    /// home shown on the ring
    pub selected_home_id: Option<String>,
    pub state_file: Option<PathBuf>,
    pub schedule: Option<ScheduleConfig>,
    pub ring: Option<RingConfig>,
    #[serde(default)]
    pub homes: Vec<HomeConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TibberConfig {
    pub api_token: Option<String>,
    pub api_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ScheduleConfig {
    pub price_interval_secs: Option<u64>,
    pub ring_interval_secs: Option<u64>,
    pub meter_interval_secs: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RingConfig {
    pub fps: Option<u32>,
    pub tfps: Option<u32>,
    pub rpm: Option<u32>,
    pub priority: Option<Priority>,
    pub target: Option<TargetKind>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TargetKind {
    #[default]
    Console,
    /// monitors only, no ring output
    None,
}

/// A home to monitor and where its live meter report lives
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HomeConfig {
    pub id: String,
    pub meter_url: String,
    /// show this home on the ring (false releases it if it holds the ring)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ledring: Option<bool>,
}

/// CLI overrides. All fields are Options so we can layer them over YAML.
#[derive(Debug, Parser, Clone)]
#[command(name = "pricering", version, about = "Electricity price LED ring and energy cost monitor")]
pub struct Cli {
    /// Path to a YAML config file (overrides search)
    #[arg(long, short = 'c', value_hint = ValueHint::FilePath)]
    pub config: Option<PathBuf>,
    #[arg(long)]
    pub log_level: Option<String>,
    /// Enable debug log level
    #[arg(long, short = 'v', alias = "verbose", action = ArgAction::SetTrue)]
    pub debug: bool,
    #[arg(long, env = "TIBBER_API_TOKEN", hide_env_values = true)]
    pub api_token: Option<String>,
    /// Home id to show on the ring
    #[arg(long)]
    pub home: Option<String>,
    #[arg(long)]
    pub base_rate: Option<f64>,
    #[arg(long, value_hint = ValueHint::FilePath)]
    pub state_file: Option<PathBuf>,
    /// print subscribed homes and exit
    #[arg(long, action = ArgAction::SetTrue)]
    pub list_homes: bool,
    /// dump fully merged config (after overrides) and exit
    #[arg(long, action = ArgAction::SetTrue)]
    pub dump_config: bool,
}

/// Public entry point: read YAML, merge, apply `cli`, validate.
pub fn load(cli: &Cli) -> Result<Config, ConfigError> {
    // 1) defaults (from `Default` impl)
    let mut cfg = Config::default();

    // 2) YAML file (explicit path or search)
    if let Some(p) = cli.config.as_ref() {
        if p.exists() {
            let y = read_yaml(p)?;
            merge(&mut cfg, y);
        } else {
            return Err(ConfigError::Validation(format!(
                "Config file not found: {}",
                p.display()
            )));
        }
    } else if let Some(p) = find_config_file() {
        let y = read_yaml(&p)?;
        merge(&mut cfg, y);
    }

    // 3) CLI overrides (highest precedence)
    apply_cli_overrides(&mut cfg, cli);

    // 4) Validate
    validate(&cfg, cli.dump_config)?;

    if cli.dump_config {
        let s = serde_yaml::to_string(&cfg)?;
        println!("{s}");
        std::process::exit(0);
    }

    Ok(cfg)
}

/// Try common locations in order (first hit wins).
fn find_config_file() -> Option<PathBuf> {
    // XDG-style: ~/.config/pricering/config.yaml
    if let Some(home) = home_dir() {
        let p = home.join(".config/pricering/config.yaml");
        if p.exists() { return Some(p) }
        let p = home.join(".config/pricering.yaml");
        if p.exists() { return Some(p) }
    }
    // project local
    for candidate in &["pricering.yaml", "config.yaml"] {
        let p = PathBuf::from(candidate);
        if p.exists() { return Some(p) }
    }
    None
}

fn read_yaml(path: &Path) -> Result<Config, ConfigError> {
    let s = fs::read_to_string(path)?;
    let cfg: Config = serde_yaml::from_str(&s)?;
    Ok(cfg)
}

/// Shallow merge `src` into `dst`, Option-by-Option.
fn merge(dst: &mut Config, src: Config) {
    // top-level
    if src.log_level.is_some()        { dst.log_level = src.log_level; }
    if src.base_rate.is_some()        { dst.base_rate = src.base_rate; }
    if src.selected_home_id.is_some() { dst.selected_home_id = src.selected_home_id; }
    if src.state_file.is_some()       { dst.state_file = src.state_file; }
    if !src.homes.is_empty()          { dst.homes = src.homes; }
    // groups
    match (&mut dst.tibber, src.tibber) {
        (None, Some(c)) => dst.tibber = Some(c),
        (Some(d), Some(s)) => merge_tibber(d, s),
        _ => {}
    }
    match (&mut dst.schedule, src.schedule) {
        (None, Some(c)) => dst.schedule = Some(c),
        (Some(d), Some(s)) => merge_schedule(d, s),
        _ => {}
    }
    match (&mut dst.ring, src.ring) {
        (None, Some(c)) => dst.ring = Some(c),
        (Some(d), Some(s)) => merge_ring(d, s),
        _ => {}
    }
}

fn merge_tibber(dst: &mut TibberConfig, src: TibberConfig) {
    if src.api_token.is_some() { dst.api_token = src.api_token; }
    if src.api_url.is_some()   { dst.api_url = src.api_url; }
}

fn merge_schedule(dst: &mut ScheduleConfig, src: ScheduleConfig) {
    if src.price_interval_secs.is_some() { dst.price_interval_secs = src.price_interval_secs; }
    if src.ring_interval_secs.is_some()  { dst.ring_interval_secs = src.ring_interval_secs; }
    if src.meter_interval_secs.is_some() { dst.meter_interval_secs = src.meter_interval_secs; }
}

fn merge_ring(dst: &mut RingConfig, src: RingConfig) {
    if src.fps.is_some()      { dst.fps = src.fps; }
    if src.tfps.is_some()     { dst.tfps = src.tfps; }
    if src.rpm.is_some()      { dst.rpm = src.rpm; }
    if src.priority.is_some() { dst.priority = src.priority; }
    if src.target.is_some()   { dst.target = src.target; }
}

fn apply_cli_overrides(cfg: &mut Config, cli: &Cli) {
    if cli.log_level.is_some()  { cfg.log_level = cli.log_level.clone(); }
    if cli.debug                { cfg.log_level = Some("debug".to_string()); }
    if cli.home.is_some()       { cfg.selected_home_id = cli.home.clone(); }
    if cli.base_rate.is_some()  { cfg.base_rate = cli.base_rate; }
    if cli.state_file.is_some() { cfg.state_file = cli.state_file.clone(); }
    if cli.api_token.is_some() {
        cfg.tibber.get_or_insert_with(TibberConfig::default).api_token = cli.api_token.clone();
    }
}

/// Put any invariants here (required fields, ranges, etc.)
/// The token is not required when only dumping the config.
fn validate(cfg: &Config, dump_only: bool) -> Result<(), ConfigError> {
    if !dump_only && cfg.api_token().is_none() {
        return Err(ConfigError::Validation(
            "tibber.api_token (or --api-token / TIBBER_API_TOKEN) is required".into(),
        ));
    }
    if let Some(rate) = cfg.base_rate {
        if !rate.is_finite() || rate < 0.0 {
            return Err(ConfigError::Validation("base_rate must be a non-negative number".into()));
        }
    }
    if let Some(schedule) = cfg.schedule.as_ref() {
        for (name, v) in [
            ("price_interval_secs", schedule.price_interval_secs),
            ("ring_interval_secs", schedule.ring_interval_secs),
            ("meter_interval_secs", schedule.meter_interval_secs),
        ] {
            if v == Some(0) {
                return Err(ConfigError::Validation(format!("schedule {name} must be > 0")));
            }
        }
    }
    cfg.animation_options()
        .validate()
        .map_err(|e| ConfigError::Validation(format!("ring: {e}")))?;
    let mut seen = std::collections::HashSet::new();
    for home in &cfg.homes {
        if home.id.trim().is_empty() || home.meter_url.trim().is_empty() {
            return Err(ConfigError::Validation("homes entries need id and meter_url".into()));
        }
        if !seen.insert(home.id.as_str()) {
            return Err(ConfigError::Validation(format!("home {} listed twice", home.id)));
        }
    }
    Ok(())
}

impl Config {
    pub fn api_token(&self) -> Option<&str> {
        self.tibber
            .as_ref()
            .and_then(|t| t.api_token.as_deref())
            .filter(|t| !t.trim().is_empty())
    }

    pub fn api_url(&self) -> &str {
        self.tibber
            .as_ref()
            .and_then(|t| t.api_url.as_deref())
            .unwrap_or(DEFAULT_API_URL)
    }

    pub fn state_file(&self) -> PathBuf {
        self.state_file.clone().unwrap_or_else(|| {
            data_local_dir()
                .map(|d| d.join("pricering/state.json"))
                .unwrap_or_else(|| PathBuf::from("pricering-state.json"))
        })
    }

    pub fn price_interval(&self) -> Duration {
        let s = self.schedule.as_ref().and_then(|s| s.price_interval_secs);
        Duration::from_secs(s.unwrap_or(DEFAULT_PRICE_INTERVAL_SECS))
    }

    pub fn ring_interval(&self) -> Duration {
        let s = self.schedule.as_ref().and_then(|s| s.ring_interval_secs);
        Duration::from_secs(s.unwrap_or(DEFAULT_RING_INTERVAL_SECS))
    }

    pub fn meter_interval(&self) -> Duration {
        let s = self.schedule.as_ref().and_then(|s| s.meter_interval_secs);
        Duration::from_secs(s.unwrap_or(DEFAULT_METER_INTERVAL_SECS))
    }

    pub fn ring_target(&self) -> TargetKind {
        self.ring.as_ref().and_then(|r| r.target).unwrap_or_default()
    }

    pub fn animation_options(&self) -> AnimationOptions {
        let defaults = AnimationOptions::default();
        let Some(ring) = self.ring.as_ref() else {
            return defaults;
        };
        AnimationOptions {
            fps: ring.fps.unwrap_or(defaults.fps),
            tfps: ring.tfps.unwrap_or(defaults.tfps),
            rpm: ring.rpm.unwrap_or(defaults.rpm),
            priority: ring.priority.unwrap_or(defaults.priority),
        }
    }
}
