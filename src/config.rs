use crate::error::{GatewayError, Result};
use crate::providers::{ProviderPreset, WireFormat};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Model map key consulted when the requested model has no entry of its own.
pub const DEFAULT_MODEL_KEY: &str = "default";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    /// Upstream request timeout.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    pub provider: ProviderConfig,
    #[serde(default)]
    pub models: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,
    /// Extra key variables; every resolved key joins the pool.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub api_key_envs: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<WireFormat>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transcoder: Option<String>,
}

/// How a single request is served.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// Forward the original bytes to a Messages API provider.
    Passthrough,
    /// Convert through the named transcoder, targeting `model`.
    Transcode { transcoder: String, model: String },
}

fn default_port() -> u16 {
    4222
}

fn default_timeout_secs() -> u64 {
    300
}

impl ProxyConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            GatewayError::config(format!("Failed to read config file {}: {}", path.display(), e))
        })?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Search standard locations for a config file.
    /// Priority: CLI arg > CWD > XDG config > home dir
    pub fn find_and_load(explicit_path: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit_path {
            return Self::load(path);
        }

        let candidates = config_search_paths();
        for candidate in &candidates {
            if candidate.exists() {
                tracing::info!(path = %candidate.display(), "Loading config");
                return Self::load(candidate);
            }
        }

        Err(GatewayError::config(format!(
            "No config file found. Searched: {}",
            candidates
                .iter()
                .map(|p| p.display().to_string())
                .collect::<Vec<_>>()
                .join(", ")
        )))
    }

    /// Switch to a named preset, taking its base URL and key variable.
    pub fn apply_provider_override(&mut self, name: &str) {
        self.provider.name = name.to_string();
        if let Some(preset) = ProviderPreset::from_name(name) {
            self.provider.base_url = Some(preset.base_url.to_string());
            self.provider.api_key_env = Some(preset.default_api_key_env.to_string());
            self.provider.format = None;
            self.provider.transcoder = None;
        }
    }

    fn preset(&self) -> Option<&'static ProviderPreset> {
        ProviderPreset::from_name(&self.provider.name)
    }

    /// Config override, else the provider preset default.
    pub fn effective_base_url(&self) -> Result<String> {
        if let Some(ref url) = self.provider.base_url {
            return Ok(url.clone());
        }

        let preset = self.preset().ok_or_else(|| {
            GatewayError::config(format!(
                "Unknown provider '{}' and no base_url configured. Known providers: {}",
                self.provider.name,
                ProviderPreset::known_names()
            ))
        })?;

        Ok(preset.base_url.to_string())
    }

    /// Explicit format, else the preset's, else Chat Completions.
    pub fn wire_format(&self) -> WireFormat {
        self.provider
            .format
            .or_else(|| self.preset().map(|p| p.format))
            .unwrap_or(WireFormat::OpenAi)
    }

    pub fn api_key_env(&self) -> String {
        self.provider
            .api_key_env
            .clone()
            .or_else(|| self.preset().map(|p| p.default_api_key_env.to_string()))
            .unwrap_or_else(|| "API_KEY".to_string())
    }

    /// Read every configured key variable. Unset or empty variables are
    /// skipped; at least one key must resolve.
    pub fn resolve_api_keys(&self) -> Result<Vec<String>> {
        let mut names = vec![self.api_key_env()];
        for name in &self.provider.api_key_envs {
            if !names.contains(name) {
                names.push(name.clone());
            }
        }

        let keys: Vec<String> = names
            .iter()
            .filter_map(|name| std::env::var(name).ok())
            .filter(|key| !key.is_empty())
            .collect();

        if keys.is_empty() {
            return Err(GatewayError::config(format!(
                "Environment variable '{}' not set. Set it with your provider API key.",
                names.join("' / '")
            )));
        }
        Ok(keys)
    }

    /// Map a requested model to its target. Falls back to the `default`
    /// entry, then to the requested name itself.
    pub fn target_model(&self, requested: &str) -> String {
        self.models
            .get(requested)
            .or_else(|| self.models.get(DEFAULT_MODEL_KEY))
            .cloned()
            .unwrap_or_else(|| requested.to_string())
    }

    /// Decide pass-through vs. transcoding for a request to `requested_model`.
    pub fn resolve_route(&self, requested_model: &str) -> Result<Route> {
        if let Some(ref transcoder) = self.provider.transcoder {
            return Ok(Route::Transcode {
                transcoder: transcoder.clone(),
                model: self.target_model(requested_model),
            });
        }

        match self.wire_format().default_transcoder() {
            None => Ok(Route::Passthrough),
            Some(transcoder) => Ok(Route::Transcode {
                transcoder: transcoder.to_string(),
                model: self.target_model(requested_model),
            }),
        }
    }
}

pub fn config_search_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();

    paths.push(PathBuf::from("claude-gateway.toml"));

    if cfg!(target_os = "macos") {
        if let Some(home) = home_dir() {
            paths.push(
                home.join("Library")
                    .join("Application Support")
                    .join("claude-gateway")
                    .join("config.toml"),
            );
        }
    } else {
        if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
            paths.push(PathBuf::from(xdg).join("claude-gateway").join("config.toml"));
        }
        if let Some(home) = home_dir() {
            paths.push(home.join(".config").join("claude-gateway").join("config.toml"));
        }
    }

    if let Some(home) = home_dir() {
        paths.push(home.join(".claude-gateway.toml"));
    }

    paths
}

fn home_dir() -> Option<PathBuf> {
    std::env::var("HOME").ok().map(PathBuf::from)
}
