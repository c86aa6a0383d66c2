//! On-disk storage for certificate artifacts
//!
//! Each artifact is a PEM certificate file plus a PEM private key file. When
//! both files named by a profile already exist they are loaded and returned
//! unchanged; otherwise the artifact is generated and written out. The choice
//! is made by [`pair_exists`] alone, and the two outcomes are the
//! [`LoadExisting`] and [`GenerateFresh`] implementations of [`ArtifactSource`].
//!
//! A pair with only one file present counts as missing and is regenerated,
//! overwriting the stray file.

use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::Path;

use openssl::hash::MessageDigest;
use openssl::pkey::PKey;
use openssl::x509::{X509Ref, X509};
use tracing::{debug, info};

use crate::error::{CertError, Result};
use crate::generate_ca::{build_ca, CertificateAuthority};
use crate::generate_keypair::{generate_rsa_keypair, KeyPair};
use crate::issue_certificate::issue;
use crate::profile::{CertificateProfile, OutputPaths, Role};

/// What a profile describes: a self-signed CA, or a leaf for `role` signed by
/// `issuer`.
#[derive(Debug, Clone, Copy)]
pub enum ArtifactKind<'a> {
    Authority,
    Leaf {
        role: Role,
        issuer: &'a CertificateAuthority,
    },
}

impl<'a> ArtifactKind<'a> {
    /// Leaf kind from an untyped role name, as supplied on the command line.
    pub fn leaf_for_role_name(role: &str, issuer: &'a CertificateAuthority) -> Result<Self> {
        Ok(ArtifactKind::Leaf {
            role: role.parse()?,
            issuer,
        })
    }

    fn describe(&self) -> &'static str {
        match self {
            ArtifactKind::Authority => "CA",
            ArtifactKind::Leaf { role: Role::Server, .. } => "server certificate",
            ArtifactKind::Leaf { role: Role::Client, .. } => "client certificate",
        }
    }
}

/// How an artifact came to be in memory for this run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactOrigin {
    Generated,
    Loaded,
}

impl fmt::Display for ArtifactOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArtifactOrigin::Generated => f.write_str("generated"),
            ArtifactOrigin::Loaded => f.write_str("loaded"),
        }
    }
}

/// SHA-1 digest of a certificate's DER encoding.
///
/// Only for telling runs apart by eye; never used to decide trust.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fingerprint(Vec<u8>);

impl Fingerprint {
    pub fn of(certificate: &X509Ref) -> Result<Self> {
        let digest = certificate
            .digest(MessageDigest::sha1())
            .map_err(|e| CertError::signing(format!("Failed to compute fingerprint: {}", e)))?;
        Ok(Self(digest.to_vec()))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, byte) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(":")?;
            }
            write!(f, "{:02X}", byte)?;
        }
        Ok(())
    }
}

/// A certificate and key that are present on disk at the profile's paths.
#[derive(Debug, Clone)]
pub struct StoredArtifact {
    certificate: X509,
    key_pair: KeyPair,
    fingerprint: Fingerprint,
    origin: ArtifactOrigin,
    paths: OutputPaths,
}

impl StoredArtifact {
    fn new(certificate: X509, key_pair: KeyPair, origin: ArtifactOrigin, paths: &OutputPaths) -> Result<Self> {
        let fingerprint = Fingerprint::of(&certificate)?;
        Ok(Self {
            certificate,
            key_pair,
            fingerprint,
            origin,
            paths: paths.clone(),
        })
    }

    pub fn certificate(&self) -> &X509Ref {
        &self.certificate
    }

    pub fn key_pair(&self) -> &KeyPair {
        &self.key_pair
    }

    pub fn fingerprint(&self) -> &Fingerprint {
        &self.fingerprint
    }

    pub fn origin(&self) -> ArtifactOrigin {
        self.origin
    }

    pub fn paths(&self) -> &OutputPaths {
        &self.paths
    }

    /// Treat this artifact as a CA for issuing leaves.
    pub fn to_authority(&self) -> CertificateAuthority {
        CertificateAuthority::from_parts(self.certificate.clone(), self.key_pair.clone())
    }
}

/// One way of producing the certificate and key for a profile.
pub trait ArtifactSource {
    fn obtain(&self, profile: &CertificateProfile, kind: ArtifactKind<'_>) -> Result<StoredArtifact>;
}

/// Reads a previously written pair back from disk.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoadExisting;

impl ArtifactSource for LoadExisting {
    fn obtain(&self, profile: &CertificateProfile, kind: ArtifactKind<'_>) -> Result<StoredArtifact> {
        let paths = profile.paths();
        let (certificate, key_pair) = load_pair(&paths.certificate, &paths.private_key)?;
        if let ArtifactKind::Authority = kind {
            check_authority(&certificate, &paths.certificate)?;
        }
        StoredArtifact::new(certificate, key_pair, ArtifactOrigin::Loaded, paths)
    }
}

/// Generates a new pair and writes it to the profile's paths.
#[derive(Debug, Clone, Copy, Default)]
pub struct GenerateFresh;

impl ArtifactSource for GenerateFresh {
    fn obtain(&self, profile: &CertificateProfile, kind: ArtifactKind<'_>) -> Result<StoredArtifact> {
        let (certificate, key_pair) = match kind {
            ArtifactKind::Authority => {
                let key_pair = generate_rsa_keypair(profile.key_size())?;
                build_ca(profile, key_pair)?.into_parts()
            }
            ArtifactKind::Leaf { role, issuer } => {
                let (_request, certificate, key_pair) = issue(profile, role, issuer)?.into_parts();
                (certificate, key_pair)
            }
        };

        let paths = profile.paths();
        let cert_pem = certificate
            .to_pem()
            .map_err(|e| CertError::signing(format!("Failed to encode certificate: {}", e)))?;
        let key_pem = key_pair
            .private_key()
            .private_key_to_pem_pkcs8()
            .map_err(|e| CertError::signing(format!("Failed to encode private key: {}", e)))?;

        write_pem(&paths.certificate, &cert_pem, false)?;
        info!(path = %paths.certificate.display(), "wrote PEM certificate");
        write_pem(&paths.private_key, &key_pem, true)?;
        info!(path = %paths.private_key.display(), "wrote PEM private key");

        StoredArtifact::new(certificate, key_pair, ArtifactOrigin::Generated, paths)
    }
}

/// True only when both the certificate and the key file exist.
pub fn pair_exists(paths: &OutputPaths) -> bool {
    paths.certificate.is_file() && paths.private_key.is_file()
}

/// Pick the source for `paths`: reuse when the whole pair is on disk.
pub fn select_source(paths: &OutputPaths) -> &'static dyn ArtifactSource {
    if pair_exists(paths) {
        &LoadExisting
    } else {
        if paths.certificate.exists() || paths.private_key.exists() {
            debug!(
                certificate = %paths.certificate.display(),
                private_key = %paths.private_key.display(),
                "incomplete pair on disk, regenerating both files"
            );
        }
        &GenerateFresh
    }
}

/// Load the artifact described by `profile` if it is on disk, otherwise build
/// it and persist it.
pub fn build_or_reuse(profile: &CertificateProfile, kind: ArtifactKind<'_>) -> Result<StoredArtifact> {
    let artifact = select_source(profile.paths()).obtain(profile, kind)?;
    info!(
        common_name = profile.common_name(),
        kind = kind.describe(),
        origin = %artifact.origin(),
        fingerprint = %artifact.fingerprint(),
        "certificate ready"
    );
    Ok(artifact)
}

/// Load a CA certificate and key from PEM files.
pub fn load_authority(cert_path: &Path, key_path: &Path) -> Result<CertificateAuthority> {
    let (certificate, key_pair) = load_pair(cert_path, key_path)?;
    check_authority(&certificate, cert_path)?;
    Ok(CertificateAuthority::from_parts(certificate, key_pair))
}

/// A loaded CA must look like one we would have built: self-issued and
/// limited to signing leaves.
fn check_authority(certificate: &X509Ref, path: &Path) -> Result<()> {
    if certificate.pathlen() != Some(0) {
        return Err(CertError::parse(path, "not a CA certificate with pathlen 0"));
    }
    let issuer = certificate.issuer_name().to_der().map_err(|e| CertError::parse(path, e))?;
    let subject = certificate.subject_name().to_der().map_err(|e| CertError::parse(path, e))?;
    if issuer != subject {
        return Err(CertError::parse(path, "CA certificate is not self-issued"));
    }
    Ok(())
}

/// Load a PEM certificate.
pub fn load_certificate(path: &Path) -> Result<X509> {
    let pem = fs::read(path).map_err(|e| CertError::persistence(path, e))?;
    X509::from_pem(&pem).map_err(|e| CertError::parse(path, e))
}

fn load_pair(cert_path: &Path, key_path: &Path) -> Result<(X509, KeyPair)> {
    let certificate = load_certificate(cert_path)?;

    let key_pem = fs::read(key_path).map_err(|e| CertError::persistence(key_path, e))?;
    let private_key = PKey::private_key_from_pem(&key_pem).map_err(|e| CertError::parse(key_path, e))?;

    let matches = certificate
        .public_key()
        .map(|public| public.public_eq(&private_key))
        .map_err(|e| CertError::parse(cert_path, e))?;
    if !matches {
        return Err(CertError::parse(
            key_path,
            format!("private key does not match certificate {}", cert_path.display()),
        ));
    }

    Ok((certificate, KeyPair::from_private_key(private_key)))
}

fn write_pem(path: &Path, contents: &[u8], private: bool) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| CertError::persistence(parent, e))?;
    }

    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        if private {
            options.mode(0o600);
        }
    }

    let mut file: File = options.open(path).map_err(|e| CertError::persistence(path, e))?;
    #[cfg(unix)]
    {
        // mode() only applies to newly created files
        use std::os::unix::fs::PermissionsExt;
        if private {
            file.set_permissions(fs::Permissions::from_mode(0o600))
                .map_err(|e| CertError::persistence(path, e))?;
        }
    }
    #[cfg(not(unix))]
    let _ = private;

    file.write_all(contents)
        .and_then(|()| file.sync_all())
        .map_err(|e| CertError::persistence(path, e))
}
