//! Persisted operator settings.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

use crate::state::ModeLimits;

// World Archery defaults.
pub const DEFAULT_TARGET_MAX_TIME: i16 = 240;
pub const DEFAULT_MATCHPLAY_MAX_TIME: i16 = 20;
pub const DEFAULT_TARGET_WARN_TIME: i16 = 30;
pub const DEFAULT_MATCHPLAY_WARN_TIME: i16 = 30;
pub const DEFAULT_AUTO_TOGGLE_DETAIL: bool = true;
pub const DEFAULT_MATCHPLAY_NUM_ENDS: u8 = 3;
pub const DEFAULT_PER_ARROW_TIME: i16 = 40;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub target_max_time: i16,
    pub matchplay_max_time: i16,
    pub target_warn_time: i16,
    pub matchplay_warn_time: i16,
    pub auto_toggle_detail: bool,
    pub matchplay_num_ends: u8,
    pub equip_fail_time: i16,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            target_max_time: DEFAULT_TARGET_MAX_TIME,
            matchplay_max_time: DEFAULT_MATCHPLAY_MAX_TIME,
            target_warn_time: DEFAULT_TARGET_WARN_TIME,
            matchplay_warn_time: DEFAULT_MATCHPLAY_WARN_TIME,
            auto_toggle_detail: DEFAULT_AUTO_TOGGLE_DETAIL,
            matchplay_num_ends: DEFAULT_MATCHPLAY_NUM_ENDS,
            equip_fail_time: DEFAULT_PER_ARROW_TIME,
        }
    }
}

impl Settings {
    /// Missing file means defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no settings file, using defaults");
            return Ok(Self::default());
        }
        let text =
            fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        let settings: Settings =
            serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        self.validate()?;
        let text = serde_json::to_string_pretty(self)?;
        fs::write(path, text).with_context(|| format!("writing {}", path.display()))?;
        tracing::info!(path = %path.display(), "settings saved");
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        for (name, v) in [
            ("target_max_time", self.target_max_time),
            ("matchplay_max_time", self.matchplay_max_time),
            ("equip_fail_time", self.equip_fail_time),
        ] {
            if v <= 0 {
                bail!("{name} must be positive, got {v}");
            }
        }
        if self.target_warn_time < 0 || self.matchplay_warn_time < 0 {
            bail!("warn times must not be negative");
        }
        Ok(())
    }

    pub fn limits(&self) -> ModeLimits {
        ModeLimits {
            target: self.target_max_time,
            matchplay: self.matchplay_max_time,
        }
    }

    /// Apply a `key=value` override as used by `settings set`.
    ///
    /// A rejected value leaves the settings unchanged.
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        let mut next = self.clone();
        next.assign(key, value)?;
        next.validate()?;
        *self = next;
        Ok(())
    }

    fn assign(&mut self, key: &str, value: &str) -> Result<()> {
        let int = || {
            value
                .parse::<i16>()
                .with_context(|| format!("invalid integer for {key}: {value}"))
        };
        match key {
            "target_max_time" => self.target_max_time = int()?,
            "matchplay_max_time" => self.matchplay_max_time = int()?,
            "target_warn_time" => self.target_warn_time = int()?,
            "matchplay_warn_time" => self.matchplay_warn_time = int()?,
            "equip_fail_time" => self.equip_fail_time = int()?,
            "matchplay_num_ends" => {
                self.matchplay_num_ends = value
                    .parse()
                    .with_context(|| format!("invalid integer for {key}: {value}"))?
            }
            "auto_toggle_detail" => {
                self.auto_toggle_detail = value
                    .parse()
                    .with_context(|| format!("invalid bool for {key}: {value}"))?
            }
            _ => bail!("unknown setting: {key}"),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::Mode;
    use std::path::PathBuf;

    fn scratch(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("range-link-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        dir.join(name)
    }

    #[test]
    fn missing_file_gives_defaults() {
        let s = Settings::load(&scratch("absent.json")).unwrap();
        assert_eq!(s, Settings::default());
        assert_eq!(s.limits().max_time(Mode::Target), 240);
        assert_eq!(s.limits().max_time(Mode::Matchplay), 20);
    }

    #[test]
    fn save_then_load() {
        let path = scratch("saved.json");
        let mut s = Settings::default();
        s.set("target_max_time", "150").unwrap();
        s.set("auto_toggle_detail", "false").unwrap();
        s.save(&path).unwrap();

        let back = Settings::load(&path).unwrap();
        assert_eq!(back, s);
        assert_eq!(back.limits().max_time(Mode::Target), 150);
        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn partial_file_fills_defaults() {
        let path = scratch("partial.json");
        fs::write(&path, r#"{ "matchplay_max_time": 30 }"#).unwrap();
        let s = Settings::load(&path).unwrap();
        assert_eq!(s.matchplay_max_time, 30);
        assert_eq!(s.target_max_time, DEFAULT_TARGET_MAX_TIME);
        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn rejects_bad_values() {
        let mut s = Settings::default();
        assert!(s.set("target_max_time", "0").is_err());
        assert!(s.set("target_max_time", "ten").is_err());
        assert!(s.set("brightness", "1").is_err());
        assert!(s.set("equip_fail_time", "-5").is_err());
        assert_eq!(s, Settings::default());
    }
}
