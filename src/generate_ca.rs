//! Self-signed CA certificate generation
//!
//! Builds the trust anchor for one side of the mutual TLS link.
//!
//! # Certificate Properties
//! - **Self-signed**: issuer and subject are the same name
//! - **Basic Constraints**: CA=true, pathlen=0, critical (may only sign leaves)
//! - **Key Usage**: keyCertSign, cRLSign
//! - **Subject Key Identifier**: hash of the CA's own public key
//! - **Authority Key Identifier**: keyid of the same certificate
//! - **Version**: X.509v3
//!
//! # Example
//! ```rust,no_run
//! # use certerator::generate_ca::build_ca;
//! # use certerator::generate_keypair::generate_rsa_keypair;
//! # use certerator::profile::CertificateProfile;
//! # fn example() -> certerator::Result<()> {
//! let profile = CertificateProfile::builder("Server CA")
//!     .serial(12345999)
//!     .valid_from("20160101000000Z")
//!     .valid_to("20170101000000Z")
//!     .certificate_path("server_ca.pem")
//!     .key_path("server_ca.key")
//!     .build()?;
//! let key_pair = generate_rsa_keypair(profile.key_size())?;
//! let ca = build_ca(&profile, key_pair)?;
//! # Ok(())
//! # }
//! ```

use openssl::asn1::Asn1Integer;
use openssl::bn::BigNum;
use openssl::x509::extension::{
    AuthorityKeyIdentifier, BasicConstraints, KeyUsage, SubjectKeyIdentifier,
};
use openssl::x509::{X509Ref, X509};
use tracing::debug;

use crate::error::{CertError, Result};
use crate::generate_keypair::KeyPair;
use crate::profile::CertificateProfile;

pub(crate) const X509_VERSION_3: i32 = 2; // X509 version 3 is represented by 2
const CA_PATH_LENGTH: u32 = 0;

/// A self-issued CA certificate and the key that signed it.
#[derive(Clone)]
pub struct CertificateAuthority {
    certificate: X509,
    key_pair: KeyPair,
}

impl CertificateAuthority {
    /// Pair an existing certificate with its key. Used on the reuse path.
    pub fn from_parts(certificate: X509, key_pair: KeyPair) -> Self {
        Self {
            certificate,
            key_pair,
        }
    }

    pub fn certificate(&self) -> &X509Ref {
        &self.certificate
    }

    pub fn key_pair(&self) -> &KeyPair {
        &self.key_pair
    }

    pub fn into_parts(self) -> (X509, KeyPair) {
        (self.certificate, self.key_pair)
    }
}

impl std::fmt::Debug for CertificateAuthority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CertificateAuthority")
            .field("subject", &self.certificate.subject_name())
            .field("key_pair", &self.key_pair)
            .finish()
    }
}

pub(crate) fn asn1_serial(serial: u64) -> Result<Asn1Integer> {
    BigNum::from_slice(&serial.to_be_bytes())
        .and_then(|bn| bn.to_asn1_integer())
        .map_err(|e| CertError::signing(format!("Failed to encode serial {}: {}", serial, e)))
}

/// Build a self-signed CA certificate for `profile` around `key_pair`.
///
/// The subject key identifier must already be on the certificate when the
/// authority key identifier is computed, so the two are added in separate
/// passes.
///
/// # Errors
/// `SigningError` if OpenSSL fails to build an extension or sign, and
/// `ProfileError` if a subject field cannot be encoded.
pub fn build_ca(profile: &CertificateProfile, key_pair: KeyPair) -> Result<CertificateAuthority> {
    let digest = profile.hash_algorithm().message_digest();

    let mut builder =
        X509::builder().map_err(|e| CertError::signing(format!("Failed to create X509 builder: {}", e)))?;

    builder
        .set_version(X509_VERSION_3)
        .map_err(|e| CertError::signing(format!("Failed to set version: {}", e)))?;

    let serial = asn1_serial(profile.serial())?;
    builder
        .set_serial_number(&serial)
        .map_err(|e| CertError::signing(format!("Failed to set serial number: {}", e)))?;

    // Build subject/issuer name
    let name = profile.subject().to_x509_name()?;
    builder
        .set_subject_name(&name)
        .map_err(|e| CertError::signing(format!("Failed to set subject: {}", e)))?;
    builder
        .set_issuer_name(&name)
        .map_err(|e| CertError::signing(format!("Failed to set issuer: {}", e)))?;

    let not_before = profile.validity().not_before_asn1()?;
    builder
        .set_not_before(&not_before)
        .map_err(|e| CertError::signing(format!("Failed to set not_before: {}", e)))?;
    let not_after = profile.validity().not_after_asn1()?;
    builder
        .set_not_after(&not_after)
        .map_err(|e| CertError::signing(format!("Failed to set not_after: {}", e)))?;

    builder
        .set_pubkey(key_pair.private_key())
        .map_err(|e| CertError::signing(format!("Failed to set public key: {}", e)))?;

    // First pass: constraints, usage and our own key identifier
    let bc = BasicConstraints::new()
        .critical()
        .ca()
        .pathlen(CA_PATH_LENGTH)
        .build()
        .map_err(|e| CertError::signing(format!("Failed to build BasicConstraints: {}", e)))?;
    builder
        .append_extension(bc)
        .map_err(|e| CertError::signing(format!("Failed to add BasicConstraints: {}", e)))?;

    let ku = KeyUsage::new()
        .key_cert_sign()
        .crl_sign()
        .build()
        .map_err(|e| CertError::signing(format!("Failed to build KeyUsage: {}", e)))?;
    builder
        .append_extension(ku)
        .map_err(|e| CertError::signing(format!("Failed to add KeyUsage: {}", e)))?;

    let ski = SubjectKeyIdentifier::new()
        .build(&builder.x509v3_context(None, None))
        .map_err(|e| CertError::signing(format!("Failed to build SubjectKeyIdentifier: {}", e)))?;
    builder
        .append_extension(ski)
        .map_err(|e| CertError::signing(format!("Failed to add SubjectKeyIdentifier: {}", e)))?;

    // Second pass: no issuer given, so the context points back at this certificate
    let aki = AuthorityKeyIdentifier::new()
        .keyid(true)
        .build(&builder.x509v3_context(None, None))
        .map_err(|e| CertError::signing(format!("Failed to build AuthorityKeyIdentifier: {}", e)))?;
    builder
        .append_extension(aki)
        .map_err(|e| CertError::signing(format!("Failed to add AuthorityKeyIdentifier: {}", e)))?;

    builder
        .sign(key_pair.private_key(), digest)
        .map_err(|e| CertError::signing(format!("Failed to sign certificate: {}", e)))?;
    let certificate = builder.build();

    debug!(
        common_name = profile.common_name(),
        serial = profile.serial(),
        hash = %profile.hash_algorithm(),
        "built self-signed CA"
    );

    Ok(CertificateAuthority {
        certificate,
        key_pair,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generate_keypair::generate_rsa_keypair;
    use crate::profile::CertificateProfileBuilder;
    use openssl::asn1::Asn1Time;
    use std::cmp::Ordering;

    fn profile() -> CertificateProfileBuilder {
        CertificateProfile::builder("Test CA")
            .serial(4242)
            .valid_from("20240101000000Z")
            .valid_to("20340101000000Z")
            .key_size(2048)
            .hash_algorithm("sha256")
            .certificate_path("ca.pem")
            .key_path("ca.key")
    }

    fn text(cert: &X509Ref) -> String {
        String::from_utf8(cert.to_text().unwrap()).unwrap()
    }

    #[test]
    fn test_self_signed() {
        let profile = profile().build().unwrap();
        let ca = build_ca(&profile, generate_rsa_keypair(2048).unwrap()).unwrap();
        let cert = ca.certificate();

        assert_eq!(
            cert.issuer_name().to_der().unwrap(),
            cert.subject_name().to_der().unwrap()
        );
        let public = ca.key_pair().public_key().unwrap();
        assert!(cert.verify(&public).unwrap());
        assert_eq!(cert.version(), X509_VERSION_3);
    }

    #[test]
    fn test_ca_extensions() {
        let profile = profile().build().unwrap();
        let ca = build_ca(&profile, generate_rsa_keypair(2048).unwrap()).unwrap();
        let text = text(ca.certificate());

        assert!(text.contains("X509v3 Basic Constraints: critical"));
        assert!(text.contains("CA:TRUE, pathlen:0"));
        assert!(text.contains("Certificate Sign, CRL Sign"));
        assert!(!text.contains("Digital Signature"));
    }

    #[test]
    fn test_key_identifiers_point_at_self() {
        let profile = profile().build().unwrap();
        let ca = build_ca(&profile, generate_rsa_keypair(2048).unwrap()).unwrap();
        let cert = ca.certificate();

        let ski = cert.subject_key_id().expect("subject key identifier");
        let aki = cert.authority_key_id().expect("authority key identifier");
        assert_eq!(ski.as_slice(), aki.as_slice());
    }

    #[test]
    fn test_serial_and_validity_verbatim() {
        let profile = profile().build().unwrap();
        let ca = build_ca(&profile, generate_rsa_keypair(2048).unwrap()).unwrap();
        let cert = ca.certificate();

        let serial = cert.serial_number().to_bn().unwrap().to_dec_str().unwrap();
        assert_eq!(serial.to_string(), "4242");

        let expected = Asn1Time::from_str("20240101000000Z").unwrap();
        assert_eq!(cert.not_before().compare(&expected).unwrap(), Ordering::Equal);
        let der = cert.to_der().unwrap();
        assert!(der.windows(15).any(|w| w == b"20240101000000Z"));
        assert!(der.windows(15).any(|w| w == b"20340101000000Z"));
    }

    #[test]
    fn test_optional_subject_fields() {
        let profile = profile()
            .organization("Example Corp")
            .country("GB")
            .build()
            .unwrap();
        let ca = build_ca(&profile, generate_rsa_keypair(2048).unwrap()).unwrap();
        let subject = ca.certificate().subject_name();

        assert_eq!(subject.entries().count(), 3);
        assert_eq!(
            subject
                .entries_by_nid(openssl::nid::Nid::LOCALITYNAME)
                .count(),
            0
        );
    }

    #[test]
    fn test_signed_with_profile_digest() {
        let profile = profile().hash_algorithm("sha384").build().unwrap();
        let ca = build_ca(&profile, generate_rsa_keypair(2048).unwrap()).unwrap();
        assert_eq!(
            ca.certificate().signature_algorithm().object().nid(),
            openssl::nid::Nid::SHA384WITHRSAENCRYPTION
        );
    }
}
