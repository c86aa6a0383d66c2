//! Certerator - CA and certificate generator for mutual TLS
//!
//! Issues two self-signed certificate authorities and one leaf certificate for
//! each side of a mutually authenticated TLS link (for example an OpenVPN
//! server and client), and reuses anything already on disk.
//!
//! # Overview
//!
//! ```text
//! Server CA (self-signed, pathlen=0)     Client CA (self-signed, pathlen=0)
//!          │                ╲           ╱               │
//!          │                 ╲         ╱                │
//!          │                  ╲       ╱                 │
//!       (own-ca)          (cross-signed, default)    (own-ca)
//!          │                  ╱       ╲                 │
//!   Server Cert (serverAuth)             Client Cert (clientAuth)
//! ```
//!
//! - [`generate_keypair`]: RSA key pairs of a supported size
//! - [`generate_ca`]: self-signed CA certificates
//! - [`issue_certificate`]: signing requests and CA-signed leaf certificates
//! - [`storage`]: reuse-or-generate decision and PEM files on disk
//! - [`pipeline`]: the ordered four-artifact run
//! - [`peer_config`]: example OpenVPN configurations for both peers
//! - [`configs`]: TOML configuration
//!
//! # Example
//!
//! ```no_run
//! use certerator::configs::AppConfig;
//! use certerator::pipeline;
//!
//! fn main() -> anyhow::Result<()> {
//!     let config = AppConfig::default();
//!     let outcome = pipeline::run(&config.profiles()?, config.topology)?;
//!     println!("Server CA fingerprint: {}", outcome.server_ca.fingerprint());
//!     Ok(())
//! }
//! ```
//!
//! Running the same configuration twice leaves every file byte-for-byte
//! unchanged; delete a certificate or key file to have that artifact
//! regenerated.

pub mod configs;
pub mod error;
pub mod generate_ca;
pub mod generate_keypair;
pub mod issue_certificate;
pub mod peer_config;
pub mod pipeline;
pub mod profile;
pub mod storage;

pub use error::{CertError, Result};
pub use generate_ca::{build_ca, CertificateAuthority};
pub use generate_keypair::{generate_rsa_keypair, KeyPair};
pub use issue_certificate::{issue, IssuedCertificate};
pub use profile::{CertificateProfile, Role};
pub use storage::{build_or_reuse, ArtifactKind, StoredArtifact};
