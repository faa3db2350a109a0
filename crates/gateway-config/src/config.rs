use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// §6 "Env variables select provider strings of the form `vendor:model` per
/// task family". Kept as a string key (not an enum) so this crate doesn't
/// depend on `gateway-types::TaskType` — callers resolve
/// `task_type.provider_family()` themselves and pass the family in.
pub type TaskFamily = String;

pub const CHAT_FAMILY: &str = "chat";
pub const ASSET_COPY_FAMILY: &str = "asset-copy";
pub const CHANNEL_FAMILY: &str = "channel";
pub const IMAGE_FAMILY: &str = "image";
pub const VIDEO_FAMILY: &str = "video";

const TASK_FAMILIES: &[&str] = &[
    CHAT_FAMILY,
    ASSET_COPY_FAMILY,
    CHANNEL_FAMILY,
    IMAGE_FAMILY,
    VIDEO_FAMILY,
];

/// A parsed `"vendor:model"` provider string (§6).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderModelRef {
    pub vendor: String,
    pub model: String,
}

impl ProviderModelRef {
    pub fn parse(raw: &str) -> anyhow::Result<Self> {
        let (vendor, model) = raw
            .split_once(':')
            .ok_or_else(|| anyhow::anyhow!("provider ref '{raw}' must be 'vendor:model'"))?;
        anyhow::ensure!(!vendor.trim().is_empty(), "provider ref '{raw}' has empty vendor");
        anyhow::ensure!(!model.trim().is_empty(), "provider ref '{raw}' has empty model");
        Ok(Self {
            vendor: vendor.trim().to_string(),
            model: model.trim().to_string(),
        })
    }
}

/// Per-provider/model credit conversion ratios (§4.2 "Ratios configurable per
/// provider/model"). Missing entries fall back to the process defaults.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CreditRatios {
    pub credit_per_1000_tokens: f64,
    pub image_unit_cost_credits: f64,
    pub video_per_second_credits: f64,
}

impl Default for CreditRatios {
    fn default() -> Self {
        Self {
            credit_per_1000_tokens: 1.0,
            image_unit_cost_credits: 4.0,
            video_per_second_credits: 2.0,
        }
    }
}

/// §5 "each provider call has an upper-bound deadline (task-configurable;
/// default 90s for text, 10 min for video segment)".
#[derive(Debug, Clone, Copy)]
pub struct Deadlines {
    pub text: Duration,
    pub video_segment: Duration,
}

impl Default for Deadlines {
    fn default() -> Self {
        Self {
            text: Duration::from_secs(90),
            video_segment: Duration::from_secs(600),
        }
    }
}

/// The immutable, process-wide configuration the gateway is started with.
///
/// The task→provider map is loaded from environment at startup into an
/// immutable struct; changing it requires a process restart. This is
/// deliberate: there is no runtime `set`/`patch` API here.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: String,
    pub bind_port: u16,
    pub bearer_token: Option<String>,
    task_provider_map: HashMap<TaskFamily, ProviderModelRef>,
    credit_ratios: HashMap<String, CreditRatios>,
    pub deadlines: Deadlines,
    pub store_dir: PathBuf,
}

impl AppConfig {
    /// Loads configuration from process environment. Never touches disk except
    /// to resolve `store_dir`'s default location.
    pub fn from_env() -> anyhow::Result<Self> {
        let mut task_provider_map = HashMap::new();
        for family in TASK_FAMILIES {
            let env_key = format!("GATEWAY_PROVIDER_{}", family.to_ascii_uppercase().replace('-', "_"));
            if let Ok(raw) = std::env::var(&env_key) {
                task_provider_map.insert((*family).to_string(), ProviderModelRef::parse(&raw)?);
            }
        }
        if !task_provider_map.contains_key(CHAT_FAMILY) {
            task_provider_map.insert(
                CHAT_FAMILY.to_string(),
                ProviderModelRef {
                    vendor: "openai-compatible".to_string(),
                    model: "gpt-4o-mini".to_string(),
                },
            );
        }

        let mut credit_ratios = HashMap::new();
        for (key, value) in std::env::vars() {
            let Some(vendor_model) = key.strip_prefix("GATEWAY_CREDIT_RATIO_") else {
                continue;
            };
            if let Ok(parsed) = serde_json::from_str::<CreditRatios>(&value) {
                credit_ratios.insert(vendor_model.to_ascii_lowercase().replace('_', ":"), parsed);
            }
        }

        let bind_addr = std::env::var("GATEWAY_BIND_ADDR").unwrap_or_else(|_| "0.0.0.0".to_string());
        let bind_port = std::env::var("GATEWAY_BIND_PORT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(8080);
        let bearer_token = std::env::var("GATEWAY_BEARER_TOKEN").ok();
        let store_dir = std::env::var("GATEWAY_STORE_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| default_store_dir());

        Ok(Self {
            bind_addr,
            bind_port,
            bearer_token,
            task_provider_map,
            credit_ratios,
            deadlines: Deadlines::default(),
            store_dir,
        })
    }

    /// §6 "Any unmapped task falls back to the chat default."
    pub fn provider_for_family(&self, family: &str) -> ProviderModelRef {
        self.task_provider_map
            .get(family)
            .or_else(|| self.task_provider_map.get(CHAT_FAMILY))
            .cloned()
            .expect("chat default is always populated by from_env")
    }

    pub fn credit_ratios_for(&self, vendor: &str, model: &str) -> CreditRatios {
        self.credit_ratios
            .get(&format!("{vendor}:{model}"))
            .copied()
            .unwrap_or_default()
    }
}

fn default_store_dir() -> PathBuf {
    dirs::data_local_dir()
        .map(|p| p.join("gateway-engine").join("store"))
        .unwrap_or_else(|| Path::new(".gateway-engine/store").to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_ref_parses_vendor_model() {
        let parsed = ProviderModelRef::parse("anthropic:claude-sonnet-4-6").unwrap();
        assert_eq!(parsed.vendor, "anthropic");
        assert_eq!(parsed.model, "claude-sonnet-4-6");
    }

    #[test]
    fn provider_ref_rejects_missing_colon() {
        assert!(ProviderModelRef::parse("anthropic").is_err());
    }

    #[test]
    fn unmapped_family_falls_back_to_chat_default() {
        std::env::remove_var("GATEWAY_PROVIDER_IMAGE");
        std::env::remove_var("GATEWAY_PROVIDER_CHAT");
        let config = AppConfig::from_env().unwrap();
        let chat = config.provider_for_family(CHAT_FAMILY);
        let image = config.provider_for_family(IMAGE_FAMILY);
        assert_eq!(chat, image);
    }

    #[test]
    fn explicit_family_override_wins_over_chat_default() {
        std::env::set_var("GATEWAY_PROVIDER_VIDEO", "search-grounded:veo-3");
        let config = AppConfig::from_env().unwrap();
        let video = config.provider_for_family(VIDEO_FAMILY);
        assert_eq!(video.vendor, "search-grounded");
        assert_eq!(video.model, "veo-3");
        std::env::remove_var("GATEWAY_PROVIDER_VIDEO");
    }
}
