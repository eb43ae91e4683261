use crate::config::AppConfig;
use anyhow::Result;
use figment::{
    providers::{Env, Format, Json, Toml},
    Figment,
};

pub struct ConfigLoader;

impl ConfigLoader {
    /// Loads fleet configuration by merging TOML, environment variables
    /// (prefixed `FLEET_`), and JSON, in that order of increasing precedence.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration files cannot be read or parsed.
    pub fn load() -> Result<AppConfig> {
        let config: AppConfig = Figment::new()
            .merge(Toml::file("config/Fleet.toml"))
            .merge(Env::prefixed("FLEET_").split("__"))
            .join(Json::file("config/Fleet.json"))
            .extract()?;

        Ok(config)
    }

    /// Loads fleet configuration with a specific profile layered on top of
    /// the base file (e.g. `config/Fleet.production.toml`).
    ///
    /// # Errors
    ///
    /// Returns an error if configuration files cannot be read or parsed.
    pub fn load_with_profile(profile: &str) -> Result<AppConfig> {
        let config: AppConfig = Figment::new()
            .merge(Toml::file("config/Fleet.toml"))
            .merge(Toml::file(format!("config/Fleet.{profile}.toml")))
            .merge(Env::prefixed("FLEET_").split("__"))
            .join(Json::file("config/Fleet.json"))
            .extract()?;

        Ok(config)
    }
}
