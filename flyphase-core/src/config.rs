//! Configuration file management for flyphase.
//!
//! Reads/writes `~/.flyphase/config.yaml` with the home airfield, dataset
//! path, decision windows, divert fuel constants and phase limits.

use std::path::PathBuf;

use chrono::Duration;

use crate::types::PhaseError;

/// Full configuration structure.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub home: HomeConfig,
    pub data: DataConfig,
    pub windows: WindowConfig,
    pub fuel: FuelConfig,
    pub limits: LimitsConfig,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HomeConfig {
    pub icao: String,
    /// Local time offset used for `--sortie-time`.
    pub utc_offset_hours: i32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DataConfig {
    pub airfields: String,
}

/// Decision window lengths, in minutes.
#[derive(Debug, Clone, PartialEq)]
pub struct WindowConfig {
    pub local_lookahead_min: i64,
    pub alternate_lookahead_min: i64,
    pub metar_staleness_min: i64,
    pub pirep_horizon_min: i64,
    pub sortie_half_width_min: i64,
}

impl WindowConfig {
    pub fn local_lookahead(&self) -> Duration {
        Duration::minutes(self.local_lookahead_min)
    }

    pub fn alternate_lookahead(&self) -> Duration {
        Duration::minutes(self.alternate_lookahead_min)
    }

    pub fn metar_staleness(&self) -> Duration {
        Duration::minutes(self.metar_staleness_min)
    }

    pub fn pirep_horizon(&self) -> Duration {
        Duration::minutes(self.pirep_horizon_min)
    }

    pub fn sortie_half_width(&self) -> Duration {
        Duration::minutes(self.sortie_half_width_min)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FuelConfig {
    /// Percent of base fuel added per 10 kt of headwind.
    pub headwind_pct_per_10kt: f64,
    pub solo_lbs: u32,
    pub opposite_side_lbs: u32,
}

/// Boundaries the phase table is built from.
#[derive(Debug, Clone, PartialEq)]
pub struct LimitsConfig {
    pub recall_wind_kt: u16,
    pub hold_temperature_c: i16,
    /// IFR minima when the airfield publishes no usable approach.
    pub default_ifr_visibility_m: u32,
    pub default_ifr_ceiling_ft: u32,
    pub cb_radius_nm: u32,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            home: HomeConfig {
                icao: "OEKF".into(),
                utc_offset_hours: 3,
            },
            data: DataConfig {
                airfields: "data/airfields.json".into(),
            },
            windows: WindowConfig {
                local_lookahead_min: 60,
                alternate_lookahead_min: 180,
                metar_staleness_min: 90,
                pirep_horizon_min: 60,
                sortie_half_width_min: 60,
            },
            fuel: FuelConfig {
                headwind_pct_per_10kt: 5.0,
                solo_lbs: 100,
                opposite_side_lbs: 30,
            },
            limits: LimitsConfig {
                recall_wind_kt: 35,
                hold_temperature_c: 50,
                default_ifr_visibility_m: 2400,
                default_ifr_ceiling_ft: 500,
                cb_radius_nm: 30,
            },
        }
    }
}

/// Get the config directory path (`~/.flyphase/`).
pub fn config_dir() -> PathBuf {
    dirs_home().join(".flyphase")
}

/// Get the config file path.
pub fn config_file() -> PathBuf {
    config_dir().join("config.yaml")
}

fn dirs_home() -> PathBuf {
    std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("."))
}

/// Load config from `~/.flyphase/config.yaml`.
///
/// Returns default config if file doesn't exist.
pub fn load_config() -> Config {
    load_config_from(&config_file())
}

/// Load config from an explicit path, falling back to defaults.
pub fn load_config_from(path: &std::path::Path) -> Config {
    if !path.exists() {
        return Config::default();
    }

    let text = match std::fs::read_to_string(path) {
        Ok(t) => t,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "unreadable config, using defaults");
            return Config::default();
        }
    };

    parse_config(&text)
}

/// Save config to `~/.flyphase/config.yaml`.
pub fn save_config(config: &Config) -> Result<PathBuf, PhaseError> {
    save_config_to(config, &config_dir())
}

pub fn save_config_to(config: &Config, dir: &std::path::Path) -> Result<PathBuf, PhaseError> {
    std::fs::create_dir_all(dir).map_err(|e| PhaseError::Config(e.to_string()))?;

    let path = dir.join("config.yaml");
    let text = serialize_config(config);
    std::fs::write(&path, text).map_err(|e| PhaseError::Config(e.to_string()))?;

    Ok(path)
}

/// Parse simple YAML-like config text. Unknown keys and unparsable values
/// keep their defaults.
fn parse_config(text: &str) -> Config {
    let mut config = Config::default();
    let mut current_section: Option<String> = None;

    for line in text.lines() {
        let stripped = line.trim();
        if stripped.is_empty() || stripped.starts_with('#') {
            continue;
        }

        let is_indented = line.starts_with("  ") || line.starts_with('\t');

        let Some((key, val)) = stripped.split_once(':') else {
            continue;
        };
        let key = key.trim();
        let val = val.trim();

        if !is_indented {
            current_section = val.is_empty().then(|| key.to_string());
            continue;
        }
        let Some(section) = current_section.as_deref() else {
            continue;
        };

        match (section, key) {
            ("home", "icao") => set_string(&mut config.home.icao, val),
            ("home", "utc_offset_hours") => set_number(&mut config.home.utc_offset_hours, val),
            ("data", "airfields") => set_string(&mut config.data.airfields, val),
            ("windows", "local_lookahead_min") => set_number(&mut config.windows.local_lookahead_min, val),
            ("windows", "alternate_lookahead_min") => set_number(&mut config.windows.alternate_lookahead_min, val),
            ("windows", "metar_staleness_min") => set_number(&mut config.windows.metar_staleness_min, val),
            ("windows", "pirep_horizon_min") => set_number(&mut config.windows.pirep_horizon_min, val),
            ("windows", "sortie_half_width_min") => set_number(&mut config.windows.sortie_half_width_min, val),
            ("fuel", "headwind_pct_per_10kt") => set_number(&mut config.fuel.headwind_pct_per_10kt, val),
            ("fuel", "solo_lbs") => set_number(&mut config.fuel.solo_lbs, val),
            ("fuel", "opposite_side_lbs") => set_number(&mut config.fuel.opposite_side_lbs, val),
            ("limits", "recall_wind_kt") => set_number(&mut config.limits.recall_wind_kt, val),
            ("limits", "hold_temperature_c") => set_number(&mut config.limits.hold_temperature_c, val),
            ("limits", "default_ifr_visibility_m") => set_number(&mut config.limits.default_ifr_visibility_m, val),
            ("limits", "default_ifr_ceiling_ft") => set_number(&mut config.limits.default_ifr_ceiling_ft, val),
            ("limits", "cb_radius_nm") => set_number(&mut config.limits.cb_radius_nm, val),
            _ => tracing::debug!(section, key, "ignoring unknown config key"),
        }
    }

    config
}

fn set_string(slot: &mut String, val: &str) {
    if let Some(v) = parse_string_value(val) {
        *slot = v;
    }
}

fn set_number<T: std::str::FromStr>(slot: &mut T, val: &str) {
    if let Some(v) = parse_string_value(val).and_then(|v| v.parse().ok()) {
        *slot = v;
    }
}

fn parse_string_value(val: &str) -> Option<String> {
    if val == "null" || val == "~" || val.is_empty() {
        return None;
    }
    // Strip quotes
    if val.len() >= 2
        && ((val.starts_with('"') && val.ends_with('"')) || (val.starts_with('\'') && val.ends_with('\'')))
    {
        return Some(val[1..val.len() - 1].to_string());
    }
    Some(val.to_string())
}

/// Serialize config to YAML-like text.
fn serialize_config(config: &Config) -> String {
    let mut lines = vec!["# flyphase configuration".to_string(), String::new()];

    lines.push("home:".into());
    lines.push(format!("  icao: \"{}\"", config.home.icao));
    lines.push(format!("  utc_offset_hours: {}", config.home.utc_offset_hours));
    lines.push(String::new());

    lines.push("data:".into());
    lines.push(format!("  airfields: \"{}\"", config.data.airfields));
    lines.push(String::new());

    let w = &config.windows;
    lines.push("windows:".into());
    lines.push(format!("  local_lookahead_min: {}", w.local_lookahead_min));
    lines.push(format!("  alternate_lookahead_min: {}", w.alternate_lookahead_min));
    lines.push(format!("  metar_staleness_min: {}", w.metar_staleness_min));
    lines.push(format!("  pirep_horizon_min: {}", w.pirep_horizon_min));
    lines.push(format!("  sortie_half_width_min: {}", w.sortie_half_width_min));
    lines.push(String::new());

    lines.push("fuel:".into());
    lines.push(format!("  headwind_pct_per_10kt: {}", config.fuel.headwind_pct_per_10kt));
    lines.push(format!("  solo_lbs: {}", config.fuel.solo_lbs));
    lines.push(format!("  opposite_side_lbs: {}", config.fuel.opposite_side_lbs));
    lines.push(String::new());

    let l = &config.limits;
    lines.push("limits:".into());
    lines.push(format!("  recall_wind_kt: {}", l.recall_wind_kt));
    lines.push(format!("  hold_temperature_c: {}", l.hold_temperature_c));
    lines.push(format!("  default_ifr_visibility_m: {}", l.default_ifr_visibility_m));
    lines.push(format!("  default_ifr_ceiling_ft: {}", l.default_ifr_ceiling_ft));
    lines.push(format!("  cb_radius_nm: {}", l.cb_radius_nm));

    lines.join("\n") + "\n"
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
