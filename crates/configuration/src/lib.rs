use crate::error::ConfigError;
use crate::settings::Settings;
use std::path::Path;

// Declare the modules that make up this crate.
pub mod error;
pub mod settings;

// Re-export the core types to provide a clean public API.
pub use settings::{ControlPlaneConfig, PoolSettings, PoolsConfig};

/// Startup arguments shared by every binary that loads gateway settings.
#[cfg(feature = "clap")]
#[derive(Debug, Clone, clap::Args)]
pub struct ConfigArgs {
    /// Path to the gateway configuration file.
    #[arg(long, short, default_value = "gateway.toml")]
    pub config: std::path::PathBuf,
}

/// Loads the gateway configuration.
///
/// Values come from the TOML file at `path` (optional) and are then overridden
/// by `GATEWAY__`-prefixed environment variables, e.g.
/// `GATEWAY__CONTROL_PLANE__HOST`. The result is validated before it is returned.
pub fn load_config(path: &Path) -> Result<Settings, ConfigError> {
    let builder = config::Config::builder()
        .add_source(config::File::from(path).required(false))
        .add_source(
            config::Environment::with_prefix("GATEWAY")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;

    let settings = builder.try_deserialize::<Settings>()?;
    settings.validate()?;

    tracing::debug!(path = %path.display(), dialect = %settings.control_plane.dialect, "Configuration loaded.");
    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_types::Dialect;
    use std::io::Write;

    #[test]
    fn loads_pool_classes_independently_from_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gateway.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            r#"
[control_plane]
dialect = "postgres"
host = "cp.internal"
username = "gateway"
password = "pw"
database = "privacy"
tracing = true

[pools.tenant]
max_connections = 16
idle_timeout_secs = 60
"#
        )
        .unwrap();

        let settings = load_config(&path).unwrap();
        assert_eq!(settings.control_plane.dialect, Dialect::Postgres);
        assert!(settings.control_plane.tracing);
        assert_eq!(settings.pools.tenant.max_connections, 16);
        assert_eq!(settings.pools.tenant.idle_timeout_secs, 60);
        assert_eq!(settings.pools.control_plane.max_connections, 8);
        assert_eq!(settings.pools.control_plane.idle_timeout_secs, 30);
    }

    #[test]
    fn unbuildable_dsn_is_rejected_at_load_time() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gateway.toml");
        std::fs::write(&path, "[control_plane]\ndialect = \"mysql\"\n").unwrap();

        assert!(matches!(load_config(&path), Err(ConfigError::ValidationError(_))));
    }
}
