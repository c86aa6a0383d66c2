use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::pipeline::{PipelineProfiles, SigningTopology};
use crate::profile::{CertificateProfile, SubjectFields};

pub const DEFAULT_CONFIG_PATH: &str = "certerator.toml";

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    #[serde(default = "default_output_directory")]
    pub output_directory: PathBuf,
    #[serde(default)]
    pub topology: SigningTopology,
    #[serde(default = "default_write_peer_configs")]
    pub write_peer_configs: bool,
    #[serde(default = "default_server_ca")]
    pub server_ca: ProfileConfig,
    #[serde(default = "default_client_ca")]
    pub client_ca: ProfileConfig,
    #[serde(default = "default_server_cert")]
    pub server_cert: ProfileConfig,
    #[serde(default = "default_client_cert")]
    pub client_cert: ProfileConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            output_directory: default_output_directory(),
            topology: SigningTopology::default(),
            write_peer_configs: default_write_peer_configs(),
            server_ca: default_server_ca(),
            client_ca: default_client_ca(),
            server_cert: default_server_cert(),
            client_cert: default_client_cert(),
        }
    }
}

/// One `[section]` of the config file, describing a single artifact.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ProfileConfig {
    pub common_name: String,
    #[serde(default)]
    pub organization: Option<String>,
    #[serde(default)]
    pub organizational_unit: Option<String>,
    #[serde(default)]
    pub locality: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    pub serial: u64,
    #[serde(default = "default_valid_from")]
    pub valid_from: String,
    #[serde(default = "default_valid_to")]
    pub valid_to: String,
    #[serde(default = "default_key_size")]
    pub key_size: u32,
    #[serde(default = "default_hash_algorithm")]
    pub hash_algorithm: String,
    pub cert_filename: PathBuf,
    pub key_filename: PathBuf,
}

impl ProfileConfig {
    fn with_defaults(common_name: &str, serial: u64, cert_filename: &str, key_filename: &str) -> Self {
        Self {
            common_name: common_name.to_string(),
            organization: None,
            organizational_unit: None,
            locality: None,
            state: None,
            country: None,
            email: None,
            serial,
            valid_from: default_valid_from(),
            valid_to: default_valid_to(),
            key_size: default_key_size(),
            hash_algorithm: default_hash_algorithm(),
            cert_filename: PathBuf::from(cert_filename),
            key_filename: PathBuf::from(key_filename),
        }
    }

    /// Validate this section and turn it into a profile whose files live in
    /// `output_directory`.
    pub fn to_profile(&self, output_directory: &Path) -> Result<CertificateProfile> {
        let subject = SubjectFields {
            common_name: self.common_name.clone(),
            organization: self.organization.clone(),
            organizational_unit: self.organizational_unit.clone(),
            locality: self.locality.clone(),
            state: self.state.clone(),
            country: self.country.clone(),
            email: self.email.clone(),
        };
        let profile = CertificateProfile::builder(self.common_name.clone())
            .subject(subject)
            .serial(self.serial)
            .valid_from(self.valid_from.clone())
            .valid_to(self.valid_to.clone())
            .key_size(self.key_size)
            .hash_algorithm(self.hash_algorithm.clone())
            .certificate_path(output_directory.join(&self.cert_filename))
            .key_path(output_directory.join(&self.key_filename))
            .build()
            .context(format!("Invalid profile for {:?}", self.common_name))?;
        Ok(profile)
    }
}

fn default_output_directory() -> PathBuf {
    PathBuf::from(".")
}

fn default_write_peer_configs() -> bool {
    true
}

fn default_valid_from() -> String {
    "20160101000000Z".to_string()
}

fn default_valid_to() -> String {
    "20170101000000Z".to_string()
}

fn default_key_size() -> u32 {
    4096
}

fn default_hash_algorithm() -> String {
    "sha512".to_string()
}

fn default_server_ca() -> ProfileConfig {
    ProfileConfig::with_defaults("Server CA", 12345999, "server_ca.pem", "server_ca.key")
}

fn default_server_cert() -> ProfileConfig {
    ProfileConfig::with_defaults("Server Cert", 12345888, "server_cert.pem", "server_cert.key")
}

fn default_client_ca() -> ProfileConfig {
    ProfileConfig::with_defaults("Client CA", 12345777, "client_ca.pem", "client_ca.key")
}

fn default_client_cert() -> ProfileConfig {
    ProfileConfig::with_defaults("Client Cert", 12345666, "client_cert.pem", "client_cert.key")
}

impl AppConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let config_str = fs::read_to_string(path)
            .context(format!("Failed to read config file: {}", path.display()))?;

        let config: AppConfig = toml::from_str(&config_str)
            .context(format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Load `path` if given, else `certerator.toml` if present, else defaults
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None if Path::new(DEFAULT_CONFIG_PATH).is_file() => {
                Self::from_file(Path::new(DEFAULT_CONFIG_PATH))
            }
            None => Ok(Self::default()),
        }
    }

    /// Build the four validated profiles, placed in the output directory
    pub fn profiles(&self) -> Result<PipelineProfiles> {
        let dir = &self.output_directory;
        let profiles = PipelineProfiles {
            server_ca: self.server_ca.to_profile(dir)?,
            client_ca: self.client_ca.to_profile(dir)?,
            server_cert: self.server_cert.to_profile(dir)?,
            client_cert: self.client_cert.to_profile(dir)?,
        };

        let all = [
            &profiles.server_ca,
            &profiles.client_ca,
            &profiles.server_cert,
            &profiles.client_cert,
        ];
        for (i, a) in all.iter().enumerate() {
            for b in &all[i + 1..] {
                anyhow::ensure!(
                    a.serial() != b.serial(),
                    "{:?} and {:?} share serial number {}",
                    a.common_name(),
                    b.common_name(),
                    a.serial()
                );
                let a_files = [a.certificate_path(), a.key_path()];
                anyhow::ensure!(
                    !a_files.contains(&b.certificate_path()) && !a_files.contains(&b.key_path()),
                    "{:?} and {:?} write to the same file",
                    a.common_name(),
                    b.common_name()
                );
            }
        }

        Ok(profiles)
    }
}
