use crate::config::EngineConfig;
use anyhow::Result;
use figment::{
    providers::{Env, Format, Json, Toml},
    Figment,
};

pub struct ConfigLoader;

impl ConfigLoader {
    /// Loads engine configuration by merging TOML, `APP_`-prefixed environment
    /// variables, and an optional JSON overlay.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration files cannot be read or parsed.
    pub fn load() -> Result<EngineConfig> {
        let config: EngineConfig = Figment::new()
            .merge(Toml::file("config/Config.toml"))
            .merge(Env::prefixed("APP_"))
            .join(Json::file("config/Config.json"))
            .extract()?;

        Ok(config)
    }

    /// Loads engine configuration with a specific profile overlay
    /// (e.g. `config/Config.production.toml`).
    ///
    /// # Errors
    ///
    /// Returns an error if configuration files cannot be read or parsed.
    pub fn load_with_profile(profile: &str) -> Result<EngineConfig> {
        let config: EngineConfig = Figment::new()
            .merge(Toml::file("config/Config.toml"))
            .merge(Toml::file(format!("config/Config.{profile}.toml")))
            .merge(Env::prefixed("APP_"))
            .join(Json::file("config/Config.json"))
            .extract()?;

        Ok(config)
    }
}
