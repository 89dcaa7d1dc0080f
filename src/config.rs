//! Configuration management for Folio Preview

use serde::Deserialize;
use std::env;
use std::str::FromStr;

use crate::render::{
    PartialFailurePolicy, RasterSettings, RetryPolicy, ThumbnailSettings, ViewerSettings, PAGE_GAP,
};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub api: ApiConfig,
    pub render: RenderConfig,
    pub viewer: ViewerConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    /// Knowledge-base base URL
    pub base_url: String,
    pub timeout_secs: u64,
    /// Send a view-count increment upstream when a viewer opens a file
    pub record_views: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RenderConfig {
    pub thumbnail_scale: f32,
    pub thumbnail_quality: u8,
    pub page_scale: f32,
    pub page_quality: u8,
    pub timeout_secs: u64,
    /// Failed thumbnail attempts before giving up (0 = never)
    pub thumbnail_max_attempts: u32,
    /// Cached renders kept (0 = unbounded)
    pub cache_capacity: usize,
    pub partial_pages: PartialFailurePolicy,
}

/// Viewer session registry limits
#[derive(Debug, Clone, Deserialize)]
pub struct ViewerConfig {
    /// Sessions untouched for this long are closed (0 = never)
    pub idle_secs: u64,
    /// Live sessions kept; the least recently used is closed first (0 = unbounded)
    pub max_sessions: usize,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        ViewerConfig {
            idle_secs: 900,
            max_sessions: 64,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 3000,
            },
            api: ApiConfig {
                base_url: "http://localhost:8080".to_string(),
                timeout_secs: 30,
                record_views: true,
            },
            render: RenderConfig::default(),
            viewer: ViewerConfig::default(),
        }
    }
}

impl Default for RenderConfig {
    fn default() -> Self {
        RenderConfig {
            thumbnail_scale: 2.0,
            thumbnail_quality: 100,
            page_scale: 2.0,
            page_quality: 95,
            timeout_secs: 30,
            thumbnail_max_attempts: RetryPolicy::default().max_attempts,
            cache_capacity: 0,
            partial_pages: PartialFailurePolicy::AbortAll,
        }
    }
}

fn var_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn flag_or(key: &str, default: bool) -> bool {
    match env::var(key).map(|v| v.trim().to_ascii_lowercase()) {
        Ok(v) if matches!(v.as_str(), "1" | "true" | "yes" | "on") => true,
        Ok(v) if matches!(v.as_str(), "0" | "false" | "no" | "off") => false,
        _ => default,
    }
}

impl Config {
    /// Read configuration from the environment
    ///
    /// `KB_API_URL` is required; everything else falls back to its default.
    pub fn from_env() -> Result<Self, env::VarError> {
        let defaults = RenderConfig::default();
        let viewer = ViewerConfig::default();

        Ok(Config {
            server: ServerConfig {
                host: env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: var_or("SERVER_PORT", 3000),
            },
            api: ApiConfig {
                base_url: env::var("KB_API_URL")?,
                timeout_secs: var_or("KB_API_TIMEOUT_SECS", 30),
                record_views: flag_or("RECORD_VIEWS", true),
            },
            render: RenderConfig {
                thumbnail_scale: var_or("THUMBNAIL_SCALE", defaults.thumbnail_scale),
                thumbnail_quality: var_or("THUMBNAIL_QUALITY", defaults.thumbnail_quality),
                page_scale: var_or("PAGE_SCALE", defaults.page_scale),
                page_quality: var_or("PAGE_QUALITY", defaults.page_quality),
                timeout_secs: var_or("RENDER_TIMEOUT_SECS", defaults.timeout_secs),
                thumbnail_max_attempts: var_or(
                    "THUMBNAIL_MAX_ATTEMPTS",
                    defaults.thumbnail_max_attempts,
                ),
                cache_capacity: var_or("RENDER_CACHE_CAPACITY", defaults.cache_capacity),
                partial_pages: match env::var("VIEWER_PARTIAL_PAGES")
                    .unwrap_or_default()
                    .trim()
                    .to_ascii_lowercase()
                    .as_str()
                {
                    "partial" => PartialFailurePolicy::ShowPartial,
                    _ => PartialFailurePolicy::AbortAll,
                },
            },
            viewer: ViewerConfig {
                idle_secs: var_or("VIEWER_IDLE_SECS", viewer.idle_secs),
                max_sessions: var_or("VIEWER_MAX_SESSIONS", viewer.max_sessions),
            },
        })
    }
}

impl RenderConfig {
    pub fn thumbnail_settings(&self) -> ThumbnailSettings {
        ThumbnailSettings {
            raster: RasterSettings {
                scale: self.thumbnail_scale,
                quality: self.thumbnail_quality,
                timeout_secs: self.timeout_secs,
            },
            retry: RetryPolicy {
                max_attempts: self.thumbnail_max_attempts,
            },
        }
    }

    pub fn viewer_settings(&self) -> ViewerSettings {
        ViewerSettings {
            raster: RasterSettings {
                scale: self.page_scale,
                quality: self.page_quality,
                timeout_secs: self.timeout_secs,
            },
            partial: self.partial_pages,
            page_gap: PAGE_GAP,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_render_settings() {
        let render = RenderConfig::default();

        let thumbnails = render.thumbnail_settings();
        assert_eq!(thumbnails.raster.scale, 2.0);
        assert_eq!(thumbnails.raster.quality, 100);
        assert_eq!(thumbnails.retry.max_attempts, 3);

        let viewer = render.viewer_settings();
        assert_eq!(viewer.raster.scale, 2.0);
        assert_eq!(viewer.raster.quality, 95);
        assert_eq!(viewer.partial, PartialFailurePolicy::AbortAll);
    }

    #[test]
    fn test_unparseable_values_fall_back() {
        assert_eq!(var_or("FOLIO_TEST_UNSET_VARIABLE", 7u32), 7);
        assert!(flag_or("FOLIO_TEST_UNSET_FLAG", true));
    }

    #[test]
    fn test_api_url_is_required() {
        env::remove_var("KB_API_URL");
        assert_eq!(Config::from_env().unwrap_err(), env::VarError::NotPresent);

        env::set_var("KB_API_URL", "http://kb.internal:9000");
        let config = Config::from_env().unwrap();
        assert_eq!(config.api.base_url, "http://kb.internal:9000");
        env::remove_var("KB_API_URL");
    }
}
