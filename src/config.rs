//! Settings recognized by the cache tiers.

use std::path::PathBuf;

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("configuration parse failed: {source}")]
    Parse {
        #[from]
        source: toml::de::Error,
    },
}

/// Settings for both cache tiers.
///
/// All fields have defaults, so a partial TOML document (or
/// `Config::default()`) is enough to get a working cache. A capacity of
/// `0` means the memory tier in question is unbounded.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct Config {
    /// Master switch for the disk tier.
    pub disk_cache_enabled: bool,
    /// Root directory for the disk tier. Leaving it empty disables the
    /// disk tier.
    pub disk_cache_root_folder: PathBuf,
    /// Byte budget of the pixel memory tier, in MiB.
    pub pixel_memory_cache_capacity_mb: u64,
    /// Byte budget of the string memory tier, in MiB.
    pub string_memory_cache_capacity_mb: u64,
}

impl Default for Config {
    fn default() -> Config {
        Config {
            disk_cache_enabled: true,
            disk_cache_root_folder: PathBuf::new(),
            pixel_memory_cache_capacity_mb: 0,
            string_memory_cache_capacity_mb: 0,
        }
    }
}

impl Config {
    pub fn from_toml(document: &str) -> Result<Config, ConfigError> {
        Ok(toml::from_str(document)?)
    }

    #[inline]
    pub fn pixel_capacity_bytes(&self) -> usize {
        (self.pixel_memory_cache_capacity_mb << 20) as usize
    }

    #[inline]
    pub fn string_capacity_bytes(&self) -> usize {
        (self.string_memory_cache_capacity_mb << 20) as usize
    }
}

#[cfg(test)]
mod test {
    use super::Config;

    #[test]
    fn parse_full_document() {
        let config = Config::from_toml(
            r#"
            disk_cache_enabled = false
            disk_cache_root_folder = "/var/cache/pix"
            pixel_memory_cache_capacity_mb = 64
            string_memory_cache_capacity_mb = 8
            "#,
        )
        .unwrap();

        assert!(!config.disk_cache_enabled);
        assert_eq!(
            config.disk_cache_root_folder,
            std::path::Path::new("/var/cache/pix")
        );
        assert_eq!(config.pixel_capacity_bytes(), 64 * 1024 * 1024);
        assert_eq!(config.string_capacity_bytes(), 8 * 1024 * 1024);
    }

    #[test]
    fn missing_keys_fall_back_to_defaults() {
        let config = Config::from_toml("pixel_memory_cache_capacity_mb = 1").unwrap();

        assert!(config.disk_cache_enabled);
        assert!(config.disk_cache_root_folder.as_os_str().is_empty());
        assert_eq!(config.pixel_capacity_bytes(), 1024 * 1024);
        assert_eq!(config.string_capacity_bytes(), 0);
    }

    #[test]
    fn negative_capacity_is_rejected() {
        Config::from_toml("pixel_memory_cache_capacity_mb = -1").unwrap_err();
    }
}
