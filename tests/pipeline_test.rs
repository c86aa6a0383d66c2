//! Integration tests for certerator.
//!
//! These tests run the full issuance pipeline against a temporary directory.

use std::cmp::Ordering;
use std::fs;
use std::path::Path;

use certerator::configs::AppConfig;
use certerator::generate_ca::build_ca;
use certerator::generate_keypair::generate_rsa_keypair;
use certerator::issue_certificate::issue;
use certerator::peer_config::{self, CLIENT_CONFIG_FILE, SERVER_CONFIG_FILE};
use certerator::pipeline::{self, PipelineProfiles, SigningTopology};
use certerator::profile::{CertificateProfile, Role};
use certerator::storage::ArtifactOrigin;
use openssl::asn1::Asn1Time;
use openssl::x509::X509Ref;
use tempfile::TempDir;

/// Default config shrunk to 2048-bit keys and a current validity window.
fn fast_config(dir: &Path) -> AppConfig {
    let mut config = AppConfig::default();
    config.output_directory = dir.to_path_buf();
    for section in [
        &mut config.server_ca,
        &mut config.client_ca,
        &mut config.server_cert,
        &mut config.client_cert,
    ] {
        section.key_size = 2048;
        section.valid_from = "20240101000000Z".to_string();
        section.valid_to = "20340101000000Z".to_string();
    }
    config
}

fn fast_profiles(dir: &Path) -> PipelineProfiles {
    fast_config(dir).profiles().unwrap()
}

fn issued_by(leaf: &X509Ref, ca: &X509Ref) -> bool {
    let ca_public = ca.public_key().unwrap();
    leaf.verify(&ca_public).unwrap()
        && leaf.issuer_name().to_der().unwrap() == ca.subject_name().to_der().unwrap()
}

fn text(cert: &X509Ref) -> String {
    String::from_utf8(cert.to_text().unwrap()).unwrap()
}

fn snapshot(dir: &Path) -> Vec<(String, Vec<u8>)> {
    let mut files: Vec<_> = fs::read_dir(dir)
        .unwrap()
        .map(|entry| {
            let path = entry.unwrap().path();
            (
                path.file_name().unwrap().to_string_lossy().into_owned(),
                fs::read(&path).unwrap(),
            )
        })
        .collect();
    files.sort();
    files
}

#[test]
fn test_cross_signed_pipeline() {
    let temp_dir = TempDir::new().unwrap();
    let profiles = fast_profiles(temp_dir.path());

    let outcome = pipeline::run(&profiles, SigningTopology::CrossSigned).unwrap();

    for artifact in [
        &outcome.server_ca,
        &outcome.client_ca,
        &outcome.server_cert,
        &outcome.client_cert,
    ] {
        assert_eq!(artifact.origin(), ArtifactOrigin::Generated);
        assert!(artifact.paths().certificate.is_file());
        assert!(artifact.paths().private_key.is_file());
    }

    let server_ca = outcome.server_ca.certificate();
    let client_ca = outcome.client_ca.certificate();
    assert!(issued_by(outcome.server_cert.certificate(), client_ca));
    assert!(issued_by(outcome.client_cert.certificate(), server_ca));
    assert!(!issued_by(outcome.server_cert.certificate(), server_ca));
    assert!(text(outcome.server_cert.certificate()).contains("TLS Web Server Authentication"));
    assert!(text(outcome.client_cert.certificate()).contains("TLS Web Client Authentication"));
}

#[test]
fn test_own_ca_pipeline() {
    let temp_dir = TempDir::new().unwrap();
    let profiles = fast_profiles(temp_dir.path());

    let outcome = pipeline::run(&profiles, SigningTopology::OwnCa).unwrap();

    assert!(issued_by(
        outcome.server_cert.certificate(),
        outcome.server_ca.certificate()
    ));
    assert!(issued_by(
        outcome.client_cert.certificate(),
        outcome.client_ca.certificate()
    ));
}

#[test]
fn test_second_run_reuses_everything() {
    let temp_dir = TempDir::new().unwrap();
    let profiles = fast_profiles(temp_dir.path());

    let first = pipeline::run(&profiles, SigningTopology::CrossSigned).unwrap();
    let before = snapshot(temp_dir.path());
    assert_eq!(before.len(), 8);

    let second = pipeline::run(&profiles, SigningTopology::CrossSigned).unwrap();
    assert_eq!(snapshot(temp_dir.path()), before);

    assert_eq!(second.server_ca.origin(), ArtifactOrigin::Loaded);
    assert_eq!(second.client_cert.origin(), ArtifactOrigin::Loaded);
    assert_eq!(first.server_cert.fingerprint(), second.server_cert.fingerprint());
    assert_eq!(first.client_ca.fingerprint(), second.client_ca.fingerprint());
}

#[test]
fn test_only_missing_artifact_is_regenerated() {
    let temp_dir = TempDir::new().unwrap();
    let profiles = fast_profiles(temp_dir.path());

    let first = pipeline::run(&profiles, SigningTopology::CrossSigned).unwrap();
    fs::remove_file(profiles.client_cert.key_path()).unwrap();

    let second = pipeline::run(&profiles, SigningTopology::CrossSigned).unwrap();
    assert_eq!(second.server_ca.origin(), ArtifactOrigin::Loaded);
    assert_eq!(second.client_ca.origin(), ArtifactOrigin::Loaded);
    assert_eq!(second.server_cert.origin(), ArtifactOrigin::Loaded);
    assert_eq!(second.client_cert.origin(), ArtifactOrigin::Generated);
    assert_ne!(first.client_cert.fingerprint(), second.client_cert.fingerprint());

    // The replacement is still signed by the reused Server CA
    assert!(issued_by(
        second.client_cert.certificate(),
        second.server_ca.certificate()
    ));
}

#[test]
fn test_peer_configs_follow_topology() {
    let temp_dir = TempDir::new().unwrap();
    let profiles = fast_profiles(temp_dir.path());
    let outcome = pipeline::run(&profiles, SigningTopology::CrossSigned).unwrap();

    peer_config::write_peer_configs(temp_dir.path(), &outcome).unwrap();
    let server_conf = fs::read_to_string(temp_dir.path().join(SERVER_CONFIG_FILE)).unwrap();
    let client_conf = fs::read_to_string(temp_dir.path().join(CLIENT_CONFIG_FILE)).unwrap();

    // Client certs come from the Server CA here, so that is what the server trusts
    assert!(server_conf.contains("\nca server_ca.pem\n"));
    assert!(server_conf.contains("\ncert server_cert.pem\n"));
    assert!(server_conf.contains("\nkey server_cert.key\n"));
    assert!(client_conf.contains("\nca client_ca.pem\n"));
    assert!(client_conf.contains("\ncert client_cert.pem\n"));
    assert!(client_conf.contains("\nkey client_cert.key\n"));
}

#[test]
fn test_peer_configs_name_files_in_subdirectories() {
    let temp_dir = TempDir::new().unwrap();
    let mut config = fast_config(temp_dir.path());
    config.server_ca.cert_filename = "ca/server_ca.pem".into();
    config.server_ca.key_filename = "ca/server_ca.key".into();
    let outcome = pipeline::run(&config.profiles().unwrap(), SigningTopology::CrossSigned).unwrap();

    peer_config::write_peer_configs(temp_dir.path(), &outcome).unwrap();
    let server_conf = fs::read_to_string(temp_dir.path().join(SERVER_CONFIG_FILE)).unwrap();

    assert!(server_conf.contains("\nca ca/server_ca.pem\n"));
    let ca_line = server_conf.lines().find(|line| line.starts_with("ca ")).unwrap();
    assert!(temp_dir.path().join(&ca_line[3..]).is_file());
}

#[test]
fn test_regenerated_ca_breaks_reused_chain() {
    let temp_dir = TempDir::new().unwrap();
    let profiles = fast_profiles(temp_dir.path());

    let first = pipeline::run(&profiles, SigningTopology::CrossSigned).unwrap();
    assert!(first.chain_intact(Role::Server));
    assert!(first.chain_intact(Role::Client));

    // The Server CA signs the client certificate in this topology
    fs::remove_file(profiles.server_ca.key_path()).unwrap();
    let second = pipeline::run(&profiles, SigningTopology::CrossSigned).unwrap();

    assert_eq!(second.server_ca.origin(), ArtifactOrigin::Generated);
    assert_eq!(second.client_cert.origin(), ArtifactOrigin::Loaded);
    assert!(!second.chain_intact(Role::Client));
    assert!(second.chain_intact(Role::Server));
}

#[test]
fn test_server_ca_scenario() {
    let temp_dir = TempDir::new().unwrap();
    let profile = CertificateProfile::builder("Server CA")
        .serial(12345999)
        .valid_from("20160101000000Z")
        .valid_to("20170101000000Z")
        .key_size(4096)
        .hash_algorithm("sha512")
        .certificate_path(temp_dir.path().join("server_ca.pem"))
        .key_path(temp_dir.path().join("server_ca.key"))
        .build()
        .unwrap();

    let key_pair = generate_rsa_keypair(profile.key_size()).unwrap();
    let ca = build_ca(&profile, key_pair).unwrap();
    let cert = ca.certificate();

    let serial = cert.serial_number().to_bn().unwrap().to_dec_str().unwrap();
    assert_eq!(serial.to_string(), "12345999");
    let not_before = Asn1Time::from_str("20160101000000Z").unwrap();
    let not_after = Asn1Time::from_str("20170101000000Z").unwrap();
    assert_eq!(cert.not_before().compare(&not_before).unwrap(), Ordering::Equal);
    assert_eq!(cert.not_after().compare(&not_after).unwrap(), Ordering::Equal);
    assert_eq!(cert.public_key().unwrap().bits(), 4096);
    assert_eq!(ca.key_pair().bits(), 4096);

    assert_eq!(
        cert.issuer_name().to_der().unwrap(),
        cert.subject_name().to_der().unwrap()
    );
    assert!(text(cert).contains("CA:TRUE, pathlen:0"));
}

#[test]
fn test_client_certificate_scenario() {
    let temp_dir = TempDir::new().unwrap();
    let ca_profile = CertificateProfile::builder("Client CA")
        .serial(12345777)
        .valid_from("20160101000000Z")
        .valid_to("20170101000000Z")
        .key_size(2048)
        .certificate_path(temp_dir.path().join("client_ca.pem"))
        .key_path(temp_dir.path().join("client_ca.key"))
        .build()
        .unwrap();
    let client_ca = build_ca(&ca_profile, generate_rsa_keypair(2048).unwrap()).unwrap();

    let profile = CertificateProfile::builder("Client Cert")
        .serial(12345666)
        .valid_from("20160101000000Z")
        .valid_to("20170101000000Z")
        .key_size(2048)
        .certificate_path(temp_dir.path().join("client_cert.pem"))
        .key_path(temp_dir.path().join("client_cert.key"))
        .build()
        .unwrap();
    let issued = issue(&profile, Role::Client, &client_ca).unwrap();
    let cert = issued.certificate();

    let serial = cert.serial_number().to_bn().unwrap().to_dec_str().unwrap();
    assert_eq!(serial.to_string(), "12345666");
    assert!(issued_by(cert, client_ca.certificate()));

    let text = text(cert);
    let eku = text
        .lines()
        .skip_while(|line| !line.contains("X509v3 Extended Key Usage"))
        .nth(1)
        .unwrap()
        .trim()
        .to_string();
    assert_eq!(eku, "TLS Web Client Authentication");
}
