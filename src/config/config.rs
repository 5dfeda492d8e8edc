use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub connection: ConnectionConfig,
    pub export: ExportConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// Kitsu server host, with or without scheme and /api suffix
    pub host: String,

    /// Login email, saved when remember is set
    pub email: String,

    /// Login password, saved when remember is set (plaintext)
    pub password: String,

    /// Persist credentials after a successful login
    pub remember: bool,

    /// Accept invalid TLS certificates (self-signed servers)
    pub skip_ssl_verify: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    /// Where exported sheets land; defaults to the Downloads directory
    pub output_dir: Option<PathBuf>,

    /// Embed preview images in the sheet
    pub embed_thumbnails: bool,

    /// Also write the flat table as a .csv next to the .xlsx
    pub csv_sidecar: bool,

    /// Width of the thumbnail column, in Excel character units
    pub image_column_width: f64,

    /// Height of rows carrying a thumbnail, in points
    pub image_row_height: f64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            connection: ConnectionConfig::default(),
            export: ExportConfig::default(),
        }
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            email: String::new(),
            password: String::new(),
            remember: true,
            skip_ssl_verify: false,
        }
    }
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            output_dir: None,
            embed_thumbnails: true,
            csv_sidecar: false,
            image_column_width: 110.0,
            image_row_height: 360.0,
        }
    }
}

impl Config {
    /// Load config from the default location
    pub fn load() -> Result<Self> {
        let config_path = Self::get_config_path()?;

        if !config_path.exists() {
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(&config_path)?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Save config to the default location
    pub fn save(&self) -> Result<()> {
        let config_path = Self::get_config_path()?;

        // Ensure parent directory exists
        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)?;
        fs::write(&config_path, contents)?;

        Ok(())
    }

    /// Get the default config file path
    pub fn get_config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;

        Ok(config_dir.join("kitsu-exporter").join("config.toml"))
    }

    /// True when every field needed for an automatic login is present
    pub fn has_saved_login(&self) -> bool {
        !self.connection.host.is_empty()
            && !self.connection.email.is_empty()
            && !self.connection.password.is_empty()
    }

    /// Drop saved credentials and persist, used on logout and when
    /// remember is unticked
    pub fn clear_credentials(&mut self) -> Result<()> {
        self.connection.email.clear();
        self.connection.password.clear();
        self.save()
    }

    /// Create a default config file with comments
    pub fn create_default_with_comments() -> String {
        r#"# Kitsu Exporter Configuration File
# Location: ~/.config/kitsu-exporter/config.toml (Linux/macOS)
#           %APPDATA%\kitsu-exporter\config.toml (Windows)

[connection]
# Kitsu server host. Scheme and /api suffix are added automatically.
host = ""

# Credentials, stored when remember = true after a successful login.
email = ""
password = ""

# Keep credentials on disk and log in automatically on startup
remember = true

# Accept invalid TLS certificates (servers with self-signed certs)
skip_ssl_verify = false

[export]
# Output directory (leave commented to use the Downloads folder)
# output_dir = "/path/to/exports"

# Embed preview images in the sheet
embed_thumbnails = true

# Also write the flat table as a .csv next to the .xlsx
csv_sidecar = false

# Thumbnail column width in Excel character units
image_column_width = 110.0

# Height of rows carrying a thumbnail, in points
image_row_height = 360.0
"#
        .to_string()
    }
}
