//! Config. One section per pipeline stage, every field defaulted.
//!
//! Resolution order: built-in defaults → `<config_dir>/snip-chat/config.json`
//! → `SNIP_*` environment variables (after `.env.local` / `.env` are loaded
//! by `run()`).

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const APP_DIR: &str = "snip-chat";

// ── Sub-configs for each pipeline stage ────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureConfig {
    /// Wait before mirroring starts, so the trigger's own animation is gone.
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,
    /// Settle delay used when a capture starts right after the permission
    /// dialog closes.
    #[serde(default = "default_post_grant_delay_ms")]
    pub post_grant_delay_ms: u64,
    /// How long to wait for the first frame before giving up.
    #[serde(default = "default_capture_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            settle_delay_ms: default_settle_delay_ms(),
            post_grant_delay_ms: default_post_grant_delay_ms(),
            timeout_ms: default_capture_timeout_ms(),
        }
    }
}

impl CaptureConfig {
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn post_grant_delay(&self) -> Duration {
        Duration::from_millis(self.post_grant_delay_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OverlayConfig {
    #[serde(default = "default_dim_alpha")]
    pub dim_alpha: u8,
    #[serde(default = "default_border_width")]
    pub border_width: u32,
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            dim_alpha: default_dim_alpha(),
            border_width: default_border_width(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandoffConfig {
    #[serde(default = "default_handoff_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_trigger_reply")]
    pub trigger_reply: bool,
}

impl Default for HandoffConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_handoff_timeout_ms(),
            trigger_reply: default_trigger_reply(),
        }
    }
}

impl HandoffConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StorageConfig {
    #[serde(default)]
    pub scratch_dir: Option<PathBuf>,
    #[serde(default)]
    pub blob_dir: Option<PathBuf>,
    #[serde(default)]
    pub outbox_path: Option<PathBuf>,
    #[serde(default)]
    pub preferences_path: Option<PathBuf>,
}

impl StorageConfig {
    /// Process-local cache for raw captures.
    pub fn scratch_dir(&self) -> PathBuf {
        self.scratch_dir.clone().unwrap_or_else(|| {
            dirs::cache_dir()
                .unwrap_or_else(std::env::temp_dir)
                .join(APP_DIR)
                .join("captures")
        })
    }

    /// Where encoded crops live once they are chat attachments.
    pub fn blob_dir(&self) -> PathBuf {
        self.blob_dir.clone().unwrap_or_else(|| data_dir().join("chat-files"))
    }

    pub fn outbox_path(&self) -> PathBuf {
        self.outbox_path
            .clone()
            .unwrap_or_else(|| data_dir().join("outbox.jsonl"))
    }

    /// Small JSON file of values remembered between snips.
    pub fn preferences_path(&self) -> PathBuf {
        self.preferences_path.clone().unwrap_or_else(|| {
            dirs::config_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(APP_DIR)
                .join("preferences.json")
        })
    }
}

// ── Top-level config ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub capture: CaptureConfig,
    #[serde(default)]
    pub overlay: OverlayConfig,
    #[serde(default)]
    pub handoff: HandoffConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

// ── Defaults ───────────────────────────────────────────────────────────────

fn default_settle_delay_ms() -> u64 {
    200
}

fn default_post_grant_delay_ms() -> u64 {
    700
}

fn default_capture_timeout_ms() -> u64 {
    1500
}

fn default_dim_alpha() -> u8 {
    0x88
}

fn default_border_width() -> u32 {
    3
}

fn default_handoff_timeout_ms() -> u64 {
    10_000
}

fn default_trigger_reply() -> bool {
    true
}

fn data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
}

// ── Load ───────────────────────────────────────────────────────────────────

/// Default location of config.json.
pub fn config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
        .join("config.json")
}

/// Load config from `path` (or the default location), then apply `SNIP_*`
/// environment overrides.
///
/// A missing file means defaults; an unparseable file is logged and ignored.
pub fn load_config(path: Option<&Path>) -> Config {
    let path = path.map(Path::to_path_buf).unwrap_or_else(config_path);
    let mut cfg = match std::fs::read_to_string(&path) {
        Ok(raw) => serde_json::from_str(&raw).unwrap_or_else(|e| {
            log::warn!("[CONFIG] Failed to parse {}: {e}. Using defaults.", path.display());
            Config::default()
        }),
        Err(_) => {
            log::info!("[CONFIG] No config at {}, using defaults", path.display());
            Config::default()
        }
    };
    apply_env_overrides(&mut cfg, |key| std::env::var(key).ok());
    cfg
}

/// Apply `SNIP_*` overrides read through `lookup`.
///
/// Unparseable numbers are logged and skipped.
pub fn apply_env_overrides(cfg: &mut Config, lookup: impl Fn(&str) -> Option<String>) {
    let millis = |key: &str, slot: &mut u64| {
        if let Some(raw) = lookup(key) {
            match raw.trim().parse::<u64>() {
                Ok(v) => *slot = v,
                Err(e) => log::warn!("[CONFIG] Ignoring {key}={raw:?}: {e}"),
            }
        }
    };
    millis("SNIP_SETTLE_DELAY_MS", &mut cfg.capture.settle_delay_ms);
    millis("SNIP_POST_GRANT_DELAY_MS", &mut cfg.capture.post_grant_delay_ms);
    millis("SNIP_CAPTURE_TIMEOUT_MS", &mut cfg.capture.timeout_ms);
    millis("SNIP_HANDOFF_TIMEOUT_MS", &mut cfg.handoff.timeout_ms);

    if let Some(dir) = lookup("SNIP_SCRATCH_DIR") {
        cfg.storage.scratch_dir = Some(PathBuf::from(dir));
    }
    if let Some(dir) = lookup("SNIP_BLOB_DIR") {
        cfg.storage.blob_dir = Some(PathBuf::from(dir));
    }
    if let Some(path) = lookup("SNIP_OUTBOX") {
        cfg.storage.outbox_path = Some(PathBuf::from(path));
    }
    if let Some(path) = lookup("SNIP_PREFERENCES") {
        cfg.storage.preferences_path = Some(PathBuf::from(path));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults_match_capture_timings() {
        let cfg = Config::default();
        assert_eq!(cfg.capture.settle_delay_ms, 200);
        assert_eq!(cfg.capture.post_grant_delay_ms, 700);
        assert_eq!(cfg.capture.timeout(), Duration::from_millis(1500));
        assert_eq!(cfg.overlay.dim_alpha, 0x88);
        assert!(cfg.handoff.trigger_reply);
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let cfg: Config = serde_json::from_str(r#"{"capture": {"timeout_ms": 3000}}"#).unwrap();
        assert_eq!(cfg.capture.timeout_ms, 3000);
        assert_eq!(cfg.capture.settle_delay_ms, 200);
        assert_eq!(cfg.overlay.border_width, 3);
    }

    #[test]
    fn env_overrides_win_and_bad_numbers_are_skipped() {
        let env: HashMap<&str, &str> = [
            ("SNIP_CAPTURE_TIMEOUT_MS", "2500"),
            ("SNIP_SETTLE_DELAY_MS", "soon"),
            ("SNIP_SCRATCH_DIR", "/tmp/snips"),
        ]
        .into_iter()
        .collect();
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg, |k| env.get(k).map(|v| v.to_string()));
        assert_eq!(cfg.capture.timeout_ms, 2500);
        assert_eq!(cfg.capture.settle_delay_ms, 200);
        assert_eq!(cfg.storage.scratch_dir(), PathBuf::from("/tmp/snips"));
    }

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = load_config(Some(&dir.path().join("nope.json")));
        assert_eq!(cfg.handoff.timeout_ms, 10_000);
    }
}
