//! Leaf certificate issuance
//!
//! Issues the end-entity certificate for one peer of the mutual TLS link,
//! signed by a [`CertificateAuthority`].
//!
//! # Certificate Properties
//! - **Basic Constraints**: CA=false, critical
//! - **Key Usage**: digitalSignature, keyAgreement
//! - **Extended Key Usage**: serverAuth or clientAuth, by [`Role`]
//! - **Netscape Cert Type**: server or client, by [`Role`]
//! - **Subject Key Identifier**: hash of the leaf's own public key
//! - **Authority Key Identifier**: keyid of the signing CA, always present
//!
//! The leaf is built from a signing request. The request is self-signed with
//! the new key only so that it is well formed. It carries the subject and key
//! and is never treated as a trust assertion.

use openssl::asn1::{Asn1Object, Asn1OctetString};
use openssl::x509::extension::{
    AuthorityKeyIdentifier, BasicConstraints, ExtendedKeyUsage, KeyUsage, SubjectKeyIdentifier,
};
use openssl::x509::{X509Extension, X509Ref, X509Req, X509ReqBuilder, X509ReqRef, X509};
use tracing::debug;

use crate::error::{CertError, Result};
use crate::generate_ca::{asn1_serial, CertificateAuthority, X509_VERSION_3};
use crate::generate_keypair::{generate_rsa_keypair, KeyPair};
use crate::profile::{CertificateProfile, Role};

const X509_REQ_VERSION_1: i32 = 0;
const NETSCAPE_CERT_TYPE_OID: &str = "2.16.840.1.113730.1.1";

/// A CA-signed leaf certificate, its key and the request it was built from.
pub struct IssuedCertificate {
    request: X509Req,
    certificate: X509,
    key_pair: KeyPair,
}

impl IssuedCertificate {
    pub fn request(&self) -> &X509ReqRef {
        &self.request
    }

    pub fn certificate(&self) -> &X509Ref {
        &self.certificate
    }

    pub fn key_pair(&self) -> &KeyPair {
        &self.key_pair
    }

    pub fn into_parts(self) -> (X509Req, X509, KeyPair) {
        (self.request, self.certificate, self.key_pair)
    }
}

impl std::fmt::Debug for IssuedCertificate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IssuedCertificate")
            .field("subject", &self.certificate.subject_name())
            .field("issuer", &self.certificate.issuer_name())
            .field("key_pair", &self.key_pair)
            .finish()
    }
}

/// DER body of the nsCertType BIT STRING for `role`.
///
/// Bit 0 is SSL client and bit 1 is SSL server; the first content byte counts
/// the unused trailing bits.
fn ns_cert_type_der(role: Role) -> [u8; 4] {
    match role {
        Role::Client => [0x03, 0x02, 0x07, 0x80],
        Role::Server => [0x03, 0x02, 0x06, 0x40],
    }
}

fn ns_cert_type_extension(role: Role) -> Result<X509Extension> {
    let oid = Asn1Object::from_str(NETSCAPE_CERT_TYPE_OID)
        .map_err(|e| CertError::signing(format!("Failed to create nsCertType OID: {}", e)))?;
    let value = Asn1OctetString::new_from_bytes(&ns_cert_type_der(role))
        .map_err(|e| CertError::signing(format!("Failed to encode nsCertType: {}", e)))?;
    X509Extension::new_from_der(&oid, false, &value)
        .map_err(|e| CertError::signing(format!("Failed to build nsCertType: {}", e)))
}

fn extended_key_usage(role: Role) -> Result<X509Extension> {
    let mut eku = ExtendedKeyUsage::new();
    match role {
        Role::Server => eku.server_auth(),
        Role::Client => eku.client_auth(),
    };
    eku.build()
        .map_err(|e| CertError::signing(format!("Failed to build ExtendedKeyUsage: {}", e)))
}

/// Build a signing request carrying the profile's subject and `key_pair`'s
/// public key, signed by that same key.
pub fn build_request(profile: &CertificateProfile, key_pair: &KeyPair) -> Result<X509Req> {
    let mut builder = X509ReqBuilder::new()
        .map_err(|e| CertError::signing(format!("Failed to create X509Req builder: {}", e)))?;
    builder
        .set_version(X509_REQ_VERSION_1)
        .map_err(|e| CertError::signing(format!("Failed to set request version: {}", e)))?;

    let name = profile.subject().to_x509_name()?;
    builder
        .set_subject_name(&name)
        .map_err(|e| CertError::signing(format!("Failed to set request subject: {}", e)))?;
    builder
        .set_pubkey(key_pair.private_key())
        .map_err(|e| CertError::signing(format!("Failed to set request public key: {}", e)))?;
    builder
        .sign(
            key_pair.private_key(),
            profile.hash_algorithm().message_digest(),
        )
        .map_err(|e| CertError::signing(format!("Failed to sign request: {}", e)))?;

    Ok(builder.build())
}

/// Issue a leaf certificate for `role` under `ca`.
///
/// A fresh key of `profile.key_size()` bits backs the leaf. The certificate is
/// signed with the CA's key and the leaf profile's digest, which may differ
/// from the digest the CA used for itself.
///
/// # Errors
/// `KeySizeError` for an unsupported key size, `SigningError` if OpenSSL fails
/// while building or signing.
pub fn issue(
    profile: &CertificateProfile,
    role: Role,
    ca: &CertificateAuthority,
) -> Result<IssuedCertificate> {
    let key_pair = generate_rsa_keypair(profile.key_size())?;
    let request = build_request(profile, &key_pair)?;
    let ca_cert = ca.certificate();

    let mut builder =
        X509::builder().map_err(|e| CertError::signing(format!("Failed to create X509 builder: {}", e)))?;
    builder
        .set_version(X509_VERSION_3)
        .map_err(|e| CertError::signing(format!("Failed to set version: {}", e)))?;

    let serial = asn1_serial(profile.serial())?;
    builder
        .set_serial_number(&serial)
        .map_err(|e| CertError::signing(format!("Failed to set serial number: {}", e)))?;

    // Subject and key come from the request, issuer from the CA
    builder
        .set_subject_name(request.subject_name())
        .map_err(|e| CertError::signing(format!("Failed to set subject: {}", e)))?;
    let request_key = request
        .public_key()
        .map_err(|e| CertError::signing(format!("Failed to read request public key: {}", e)))?;
    builder
        .set_pubkey(&request_key)
        .map_err(|e| CertError::signing(format!("Failed to set public key: {}", e)))?;
    builder
        .set_issuer_name(ca_cert.subject_name())
        .map_err(|e| CertError::signing(format!("Failed to set issuer from CA: {}", e)))?;

    let not_before = profile.validity().not_before_asn1()?;
    builder
        .set_not_before(&not_before)
        .map_err(|e| CertError::signing(format!("Failed to set not_before: {}", e)))?;
    let not_after = profile.validity().not_after_asn1()?;
    builder
        .set_not_after(&not_after)
        .map_err(|e| CertError::signing(format!("Failed to set not_after: {}", e)))?;

    let bc = BasicConstraints::new()
        .critical()
        .build()
        .map_err(|e| CertError::signing(format!("Failed to build BasicConstraints: {}", e)))?;
    builder
        .append_extension(bc)
        .map_err(|e| CertError::signing(format!("Failed to add BasicConstraints: {}", e)))?;

    let ku = KeyUsage::new()
        .digital_signature()
        .key_agreement()
        .build()
        .map_err(|e| CertError::signing(format!("Failed to build KeyUsage: {}", e)))?;
    builder
        .append_extension(ku)
        .map_err(|e| CertError::signing(format!("Failed to add KeyUsage: {}", e)))?;

    builder
        .append_extension(extended_key_usage(role)?)
        .map_err(|e| CertError::signing(format!("Failed to add ExtendedKeyUsage: {}", e)))?;
    builder
        .append_extension(ns_cert_type_extension(role)?)
        .map_err(|e| CertError::signing(format!("Failed to add nsCertType: {}", e)))?;

    let ski = SubjectKeyIdentifier::new()
        .build(&builder.x509v3_context(Some(ca_cert), None))
        .map_err(|e| CertError::signing(format!("Failed to build SubjectKeyIdentifier: {}", e)))?;
    builder
        .append_extension(ski)
        .map_err(|e| CertError::signing(format!("Failed to add SubjectKeyIdentifier: {}", e)))?;

    let aki = AuthorityKeyIdentifier::new()
        .keyid(true)
        .build(&builder.x509v3_context(Some(ca_cert), None))
        .map_err(|e| CertError::signing(format!("Failed to build AuthorityKeyIdentifier: {}", e)))?;
    builder
        .append_extension(aki)
        .map_err(|e| CertError::signing(format!("Failed to add AuthorityKeyIdentifier: {}", e)))?;

    // Sign with the CA's private key
    builder
        .sign(
            ca.key_pair().private_key(),
            profile.hash_algorithm().message_digest(),
        )
        .map_err(|e| CertError::signing(format!("Failed to sign certificate: {}", e)))?;
    let certificate = builder.build();

    debug!(
        common_name = profile.common_name(),
        serial = profile.serial(),
        %role,
        "issued leaf certificate"
    );

    Ok(IssuedCertificate {
        request,
        certificate,
        key_pair,
    })
}
