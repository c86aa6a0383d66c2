//! The four-artifact issuance run
//!
//! ```text
//! Server CA ──┐                 (built first)
//! Client CA ──┤                 (independent of the server CA)
//!             ├── Server Cert   (signed per topology)
//!             └── Client Cert   (signed per topology)
//! ```
//!
//! Each step finishes, either by loading or by generating, before the next
//! starts. Leaves need the in-memory CA produced by an earlier step.

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use tracing::{info, warn};

use crate::error::{CertError, Result};
use crate::profile::{CertificateProfile, Role};
use crate::storage::{build_or_reuse, ArtifactKind, ArtifactOrigin, StoredArtifact};

/// Which CA signs each leaf certificate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SigningTopology {
    /// Server cert under the Client CA, client cert under the Server CA
    #[default]
    CrossSigned,
    /// Each leaf under the CA of its own role
    OwnCa,
}

/// The CA that signs a leaf.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Issuer {
    ServerCa,
    ClientCa,
}

impl SigningTopology {
    /// The CA that signs the leaf for `role`.
    pub fn issuer_for(self, role: Role) -> Issuer {
        match (self, role) {
            (SigningTopology::CrossSigned, Role::Server) => Issuer::ClientCa,
            (SigningTopology::CrossSigned, Role::Client) => Issuer::ServerCa,
            (SigningTopology::OwnCa, Role::Server) => Issuer::ServerCa,
            (SigningTopology::OwnCa, Role::Client) => Issuer::ClientCa,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SigningTopology::CrossSigned => "cross-signed",
            SigningTopology::OwnCa => "own-ca",
        }
    }
}

impl FromStr for SigningTopology {
    type Err = CertError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cross-signed" | "cross" => Ok(SigningTopology::CrossSigned),
            "own-ca" | "own" => Ok(SigningTopology::OwnCa),
            other => Err(CertError::profile(format!(
                "unknown signing topology {:?} (expected \"cross-signed\" or \"own-ca\")",
                other
            ))),
        }
    }
}

impl fmt::Display for SigningTopology {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One profile per artifact.
#[derive(Debug, Clone)]
pub struct PipelineProfiles {
    pub server_ca: CertificateProfile,
    pub client_ca: CertificateProfile,
    pub server_cert: CertificateProfile,
    pub client_cert: CertificateProfile,
}

/// Everything a completed run produced.
#[derive(Debug)]
pub struct PipelineOutcome {
    pub server_ca: StoredArtifact,
    pub client_ca: StoredArtifact,
    pub server_cert: StoredArtifact,
    pub client_cert: StoredArtifact,
    pub topology: SigningTopology,
}

impl PipelineOutcome {
    pub fn ca(&self, issuer: Issuer) -> &StoredArtifact {
        match issuer {
            Issuer::ServerCa => &self.server_ca,
            Issuer::ClientCa => &self.client_ca,
        }
    }

    /// The CA that signed the leaf for `role`.
    pub fn issuer_of(&self, role: Role) -> &StoredArtifact {
        self.ca(self.topology.issuer_for(role))
    }

    pub fn leaf(&self, role: Role) -> &StoredArtifact {
        match role {
            Role::Server => &self.server_cert,
            Role::Client => &self.client_cert,
        }
    }

    /// Whether the leaf for `role` verifies against the CA now on disk.
    ///
    /// A reused leaf stops verifying when its CA was regenerated underneath it.
    pub fn chain_intact(&self, role: Role) -> bool {
        let issuer = self.issuer_of(role).certificate();
        issuer
            .public_key()
            .and_then(|public| self.leaf(role).certificate().verify(&public))
            .unwrap_or(false)
    }
}

/// Build or reuse all four artifacts in order.
///
/// Fails on the first error; artifacts finished before it stay on disk.
pub fn run(profiles: &PipelineProfiles, topology: SigningTopology) -> Result<PipelineOutcome> {
    info!(%topology, "starting certificate run");

    let server_ca = build_or_reuse(&profiles.server_ca, ArtifactKind::Authority)?;
    let client_ca = build_or_reuse(&profiles.client_ca, ArtifactKind::Authority)?;

    let server_ca_authority = server_ca.to_authority();
    let client_ca_authority = client_ca.to_authority();
    let authority = |role: Role| match topology.issuer_for(role) {
        Issuer::ServerCa => &server_ca_authority,
        Issuer::ClientCa => &client_ca_authority,
    };

    let server_cert = build_or_reuse(
        &profiles.server_cert,
        ArtifactKind::Leaf {
            role: Role::Server,
            issuer: authority(Role::Server),
        },
    )?;
    let client_cert = build_or_reuse(
        &profiles.client_cert,
        ArtifactKind::Leaf {
            role: Role::Client,
            issuer: authority(Role::Client),
        },
    )?;

    let outcome = PipelineOutcome {
        server_ca,
        client_ca,
        server_cert,
        client_cert,
        topology,
    };
    for role in [Role::Server, Role::Client] {
        let leaf = outcome.leaf(role);
        if leaf.origin() == ArtifactOrigin::Loaded && !outcome.chain_intact(role) {
            warn!(
                %role,
                certificate = %leaf.paths().certificate.display(),
                issuer = %outcome.issuer_of(role).paths().certificate.display(),
                "reused certificate does not verify against its CA; delete it to reissue"
            );
        }
    }
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cross_signed_issuers() {
        let topology = SigningTopology::CrossSigned;
        assert_eq!(topology.issuer_for(Role::Server), Issuer::ClientCa);
        assert_eq!(topology.issuer_for(Role::Client), Issuer::ServerCa);
    }

    #[test]
    fn test_own_ca_issuers() {
        let topology = SigningTopology::OwnCa;
        assert_eq!(topology.issuer_for(Role::Server), Issuer::ServerCa);
        assert_eq!(topology.issuer_for(Role::Client), Issuer::ClientCa);
    }

    #[test]
    fn test_default_is_cross_signed() {
        assert_eq!(SigningTopology::default(), SigningTopology::CrossSigned);
    }

    #[test]
    fn test_topology_parsing() {
        assert_eq!(
            "own-ca".parse::<SigningTopology>().unwrap(),
            SigningTopology::OwnCa
        );
        assert_eq!(
            "Cross-Signed".parse::<SigningTopology>().unwrap(),
            SigningTopology::CrossSigned
        );
        assert!("mesh".parse::<SigningTopology>().is_err());
    }
}
