//! Certificate profiles
//!
//! A [`CertificateProfile`] is the immutable description of one artifact: who
//! the certificate names, its serial and validity window, how strong its key is,
//! which digest signs it and where its PEM files live. Profiles are built once
//! per run and passed explicitly to the builders.
//!
//! # Example
//! ```rust
//! # use certerator::profile::CertificateProfile;
//! # fn example() -> certerator::Result<()> {
//! let profile = CertificateProfile::builder("Server CA")
//!     .serial(12345999)
//!     .valid_from("20160101000000Z")
//!     .valid_to("20170101000000Z")
//!     .key_size(4096)
//!     .hash_algorithm("sha512")
//!     .certificate_path("server_ca.pem")
//!     .key_path("server_ca.key")
//!     .build()?;
//! assert_eq!(profile.serial(), 12345999);
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use openssl::asn1::Asn1Time;
use openssl::hash::MessageDigest;
use openssl::nid::Nid;
use openssl::x509::{X509Name, X509NameBuilder};

use crate::error::{CertError, Result};

/// Length of a `YYYYMMDDHHMMSSZ` generalized time string
const GENERALIZED_TIME_LEN: usize = 15;

pub const DEFAULT_KEY_SIZE: u32 = 4096;
pub const DEFAULT_HASH_ALGORITHM: HashAlgorithm = HashAlgorithm::Sha512;

// ================= Role =================

/// Which side of the mutual TLS link a leaf certificate authenticates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Server,
    Client,
}

impl Role {
    /// extendedKeyUsage purpose granted to this role
    pub fn extended_key_usage(self) -> &'static str {
        match self {
            Role::Server => "serverAuth",
            Role::Client => "clientAuth",
        }
    }

    /// Legacy Netscape certificate type granted to this role
    pub fn ns_cert_type(self) -> &'static str {
        match self {
            Role::Server => "server",
            Role::Client => "client",
        }
    }

    pub fn as_str(self) -> &'static str {
        self.ns_cert_type()
    }
}

impl FromStr for Role {
    type Err = CertError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "server" => Ok(Role::Server),
            "client" => Ok(Role::Client),
            _ => Err(CertError::InvalidRoleError(s.to_string())),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ================= Hash algorithm =================

/// Digest used to sign a certificate or request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashAlgorithm {
    Sha256,
    Sha384,
    Sha512,
}

impl HashAlgorithm {
    pub fn message_digest(self) -> MessageDigest {
        match self {
            HashAlgorithm::Sha256 => MessageDigest::sha256(),
            HashAlgorithm::Sha384 => MessageDigest::sha384(),
            HashAlgorithm::Sha512 => MessageDigest::sha512(),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            HashAlgorithm::Sha256 => "sha256",
            HashAlgorithm::Sha384 => "sha384",
            HashAlgorithm::Sha512 => "sha512",
        }
    }
}

impl FromStr for HashAlgorithm {
    type Err = CertError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sha256" => Ok(HashAlgorithm::Sha256),
            "sha384" => Ok(HashAlgorithm::Sha384),
            "sha512" => Ok(HashAlgorithm::Sha512),
            other => Err(CertError::profile(format!(
                "unsupported hash algorithm {:?}",
                other
            ))),
        }
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ================= Subject =================

/// Distinguished name fields. Only the common name is mandatory; unset fields
/// are left out of the name entirely.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubjectFields {
    pub common_name: String,
    pub organization: Option<String>,
    pub organizational_unit: Option<String>,
    pub locality: Option<String>,
    pub state: Option<String>,
    pub country: Option<String>,
    pub email: Option<String>,
}

impl SubjectFields {
    pub fn new(common_name: impl Into<String>) -> Self {
        Self {
            common_name: common_name.into(),
            ..Self::default()
        }
    }

    /// Build the X.509 name for these fields.
    pub fn to_x509_name(&self) -> Result<X509Name> {
        let mut name_builder = X509NameBuilder::new()
            .map_err(|e| CertError::signing(format!("Failed to create name builder: {}", e)))?;

        let entries = [
            (Nid::COMMONNAME, Some(&self.common_name)),
            (Nid::STATEORPROVINCENAME, self.state.as_ref()),
            (Nid::LOCALITYNAME, self.locality.as_ref()),
            (Nid::ORGANIZATIONNAME, self.organization.as_ref()),
            (Nid::ORGANIZATIONALUNITNAME, self.organizational_unit.as_ref()),
            (Nid::PKCS9_EMAILADDRESS, self.email.as_ref()),
            (Nid::COUNTRYNAME, self.country.as_ref()),
        ];
        for (nid, value) in entries {
            if let Some(value) = value {
                name_builder.append_entry_by_nid(nid, value).map_err(|e| {
                    CertError::profile(format!(
                        "Failed to set {} to {:?}: {}",
                        nid.short_name().unwrap_or("name entry"),
                        value,
                        e
                    ))
                })?;
            }
        }

        Ok(name_builder.build())
    }
}

// ================= Validity =================

/// notBefore/notAfter pair, kept as the generalized time strings the profile
/// was given so they land in the certificate byte for byte.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Validity {
    not_before: String,
    not_after: String,
}

impl Validity {
    pub fn new(not_before: impl Into<String>, not_after: impl Into<String>) -> Result<Self> {
        let not_before = not_before.into();
        let not_after = not_after.into();
        check_generalized_time("notBefore", &not_before)?;
        check_generalized_time("notAfter", &not_after)?;
        // Fixed-width digits compare the same way the instants do
        if not_before > not_after {
            return Err(CertError::profile(format!(
                "notBefore {} is later than notAfter {}",
                not_before, not_after
            )));
        }
        Ok(Self {
            not_before,
            not_after,
        })
    }

    pub fn not_before(&self) -> &str {
        &self.not_before
    }

    pub fn not_after(&self) -> &str {
        &self.not_after
    }

    pub fn not_before_asn1(&self) -> Result<Asn1Time> {
        to_asn1_time("notBefore", &self.not_before)
    }

    pub fn not_after_asn1(&self) -> Result<Asn1Time> {
        to_asn1_time("notAfter", &self.not_after)
    }
}

fn check_generalized_time(field: &str, value: &str) -> Result<()> {
    let well_formed = value.len() == GENERALIZED_TIME_LEN
        && value.ends_with('Z')
        && value[..GENERALIZED_TIME_LEN - 1]
            .bytes()
            .all(|b| b.is_ascii_digit());
    if !well_formed {
        return Err(CertError::profile(format!(
            "{} must be formatted YYYYMMDDHHMMSSZ, got {:?}",
            field, value
        )));
    }
    // OpenSSL rejects out-of-range months, days and hours
    to_asn1_time(field, value).map(|_| ())
}

fn to_asn1_time(field: &str, value: &str) -> Result<Asn1Time> {
    Asn1Time::from_str(value)
        .map_err(|e| CertError::profile(format!("Invalid {} {:?}: {}", field, value, e)))
}

// ================= Output paths =================

/// Where an artifact's certificate and private key are stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputPaths {
    pub certificate: PathBuf,
    pub private_key: PathBuf,
}

impl OutputPaths {
    pub fn new(certificate: impl Into<PathBuf>, private_key: impl Into<PathBuf>) -> Self {
        Self {
            certificate: certificate.into(),
            private_key: private_key.into(),
        }
    }

    /// Resolve both paths against `dir`. Absolute paths are kept as they are.
    pub fn within(&self, dir: &Path) -> Self {
        Self {
            certificate: dir.join(&self.certificate),
            private_key: dir.join(&self.private_key),
        }
    }
}

// ================= Profile =================

/// Immutable configuration for one certificate artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateProfile {
    subject: SubjectFields,
    serial: u64,
    validity: Validity,
    key_size: u32,
    hash_algorithm: HashAlgorithm,
    paths: OutputPaths,
}

impl CertificateProfile {
    pub fn builder(common_name: impl Into<String>) -> CertificateProfileBuilder {
        CertificateProfileBuilder::new(common_name)
    }

    pub fn subject(&self) -> &SubjectFields {
        &self.subject
    }

    pub fn common_name(&self) -> &str {
        &self.subject.common_name
    }

    pub fn serial(&self) -> u64 {
        self.serial
    }

    pub fn validity(&self) -> &Validity {
        &self.validity
    }

    pub fn key_size(&self) -> u32 {
        self.key_size
    }

    pub fn hash_algorithm(&self) -> HashAlgorithm {
        self.hash_algorithm
    }

    pub fn paths(&self) -> &OutputPaths {
        &self.paths
    }

    pub fn certificate_path(&self) -> &Path {
        &self.paths.certificate
    }

    pub fn key_path(&self) -> &Path {
        &self.paths.private_key
    }
}

/// Builder for [`CertificateProfile`]
///
/// `build()` validates everything that can be checked without generating a
/// key: serial, both timestamps, the hash algorithm name and both file paths.
/// Key size is left to the key generator.
#[derive(Debug, Clone)]
pub struct CertificateProfileBuilder {
    subject: SubjectFields,
    serial: Option<u64>,
    valid_from: Option<String>,
    valid_to: Option<String>,
    key_size: u32,
    hash_algorithm: String,
    certificate_path: Option<PathBuf>,
    key_path: Option<PathBuf>,
}

impl CertificateProfileBuilder {
    pub fn new(common_name: impl Into<String>) -> Self {
        Self {
            subject: SubjectFields::new(common_name),
            serial: None,
            valid_from: None,
            valid_to: None,
            key_size: DEFAULT_KEY_SIZE,
            hash_algorithm: DEFAULT_HASH_ALGORITHM.name().to_string(),
            certificate_path: None,
            key_path: None,
        }
    }

    /// Set the organization (O)
    pub fn organization(mut self, org: impl Into<String>) -> Self {
        self.subject.organization = Some(org.into());
        self
    }

    /// Set the organizational unit (OU)
    pub fn organizational_unit(mut self, ou: impl Into<String>) -> Self {
        self.subject.organizational_unit = Some(ou.into());
        self
    }

    /// Set the locality (L)
    pub fn locality(mut self, locality: impl Into<String>) -> Self {
        self.subject.locality = Some(locality.into());
        self
    }

    /// Set the state/province (ST)
    pub fn state(mut self, state: impl Into<String>) -> Self {
        self.subject.state = Some(state.into());
        self
    }

    /// Set the country (C), two-letter ISO code
    pub fn country(mut self, country: impl Into<String>) -> Self {
        self.subject.country = Some(country.into());
        self
    }

    /// Set the emailAddress attribute
    pub fn email(mut self, email: impl Into<String>) -> Self {
        self.subject.email = Some(email.into());
        self
    }

    /// Replace all subject fields at once
    pub fn subject(mut self, subject: SubjectFields) -> Self {
        self.subject = subject;
        self
    }

    pub fn serial(mut self, serial: u64) -> Self {
        self.serial = Some(serial);
        self
    }

    /// notBefore as `YYYYMMDDHHMMSSZ`
    pub fn valid_from(mut self, not_before: impl Into<String>) -> Self {
        self.valid_from = Some(not_before.into());
        self
    }

    /// notAfter as `YYYYMMDDHHMMSSZ`
    pub fn valid_to(mut self, not_after: impl Into<String>) -> Self {
        self.valid_to = Some(not_after.into());
        self
    }

    pub fn key_size(mut self, bits: u32) -> Self {
        self.key_size = bits;
        self
    }

    pub fn hash_algorithm(mut self, name: impl Into<String>) -> Self {
        self.hash_algorithm = name.into();
        self
    }

    pub fn certificate_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.certificate_path = Some(path.into());
        self
    }

    pub fn key_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.key_path = Some(path.into());
        self
    }

    pub fn build(self) -> Result<CertificateProfile> {
        if self.subject.common_name.trim().is_empty() {
            return Err(CertError::profile("commonName must not be empty"));
        }
        let serial = match self.serial {
            Some(0) => return Err(CertError::profile("serial number must be positive")),
            Some(serial) => serial,
            None => return Err(CertError::profile("serial number is required")),
        };
        let (valid_from, valid_to) = match (self.valid_from, self.valid_to) {
            (Some(from), Some(to)) => (from, to),
            _ => return Err(CertError::profile("validity window requires both notBefore and notAfter")),
        };
        let validity = Validity::new(valid_from, valid_to)?;
        let hash_algorithm = self.hash_algorithm.parse()?;
        let (certificate, private_key) = match (self.certificate_path, self.key_path) {
            (Some(cert), Some(key)) => (cert, key),
            _ => return Err(CertError::profile("certificate and key paths are required")),
        };
        if certificate == private_key {
            return Err(CertError::profile(format!(
                "certificate and key must be stored in different files, both are {}",
                certificate.display()
            )));
        }

        Ok(CertificateProfile {
            subject: self.subject,
            serial,
            validity,
            key_size: self.key_size,
            hash_algorithm,
            paths: OutputPaths {
                certificate,
                private_key,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> CertificateProfileBuilder {
        CertificateProfile::builder("Server CA")
            .serial(12345999)
            .valid_from("20160101000000Z")
            .valid_to("20170101000000Z")
            .certificate_path("server_ca.pem")
            .key_path("server_ca.key")
    }

    #[test]
    fn test_builder_defaults() {
        let profile = base().build().unwrap();
        assert_eq!(profile.common_name(), "Server CA");
        assert_eq!(profile.key_size(), 4096);
        assert_eq!(profile.hash_algorithm(), HashAlgorithm::Sha512);
        assert_eq!(profile.validity().not_before(), "20160101000000Z");
        assert_eq!(profile.validity().not_after(), "20170101000000Z");
        assert_eq!(profile.subject().organization, None);
    }

    #[test]
    fn test_zero_serial_rejected() {
        let err = base().serial(0).build().unwrap_err();
        assert!(matches!(err, CertError::ProfileError(_)));
    }

    #[test]
    fn test_malformed_timestamps_rejected() {
        for bad in ["2016-01-01", "160101000000Z", "20160101000000", "2016010100000aZ", "20161301000000Z"] {
            let result = base().valid_from(bad).build();
            assert!(
                matches!(result, Err(CertError::ProfileError(_))),
                "{bad} should be rejected"
            );
        }
    }

    #[test]
    fn test_inverted_window_rejected() {
        let result = base()
            .valid_from("20170101000000Z")
            .valid_to("20160101000000Z")
            .build();
        assert!(matches!(result, Err(CertError::ProfileError(_))));
    }

    #[test]
    fn test_unknown_hash_rejected() {
        let result = base().hash_algorithm("md5").build();
        assert!(matches!(result, Err(CertError::ProfileError(_))));
        assert_eq!(
            base().hash_algorithm("SHA256").build().unwrap().hash_algorithm(),
            HashAlgorithm::Sha256
        );
    }

    #[test]
    fn test_same_cert_and_key_path_rejected() {
        let result = base().key_path("server_ca.pem").build();
        assert!(matches!(result, Err(CertError::ProfileError(_))));
    }

    #[test]
    fn test_role_parsing() {
        assert_eq!("server".parse::<Role>().unwrap(), Role::Server);
        assert_eq!(" Client ".parse::<Role>().unwrap(), Role::Client);
        let err = "admin".parse::<Role>().unwrap_err();
        assert!(matches!(err, CertError::InvalidRoleError(role) if role == "admin"));
    }

    #[test]
    fn test_role_extensions() {
        assert_eq!(Role::Server.extended_key_usage(), "serverAuth");
        assert_eq!(Role::Server.ns_cert_type(), "server");
        assert_eq!(Role::Client.extended_key_usage(), "clientAuth");
        assert_eq!(Role::Client.ns_cert_type(), "client");
    }

    #[test]
    fn test_subject_omits_unset_fields() {
        let mut subject = SubjectFields::new("Client CA");
        subject.country = Some("GB".to_string());
        let name = subject.to_x509_name().unwrap();

        assert_eq!(name.entries().count(), 2);
        assert_eq!(name.entries_by_nid(Nid::ORGANIZATIONNAME).count(), 0);
        let cn = name.entries_by_nid(Nid::COMMONNAME).next().unwrap();
        assert_eq!(cn.data().as_utf8().unwrap().to_string(), "Client CA");
    }

    #[test]
    fn test_paths_within_directory() {
        let paths = OutputPaths::new("a.pem", "a.key").within(Path::new("/tmp/out"));
        assert_eq!(paths.certificate, PathBuf::from("/tmp/out/a.pem"));
        assert_eq!(paths.private_key, PathBuf::from("/tmp/out/a.key"));
    }
}
