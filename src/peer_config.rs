//! Example OpenVPN peer configurations
//!
//! Renders `example.server.conf` and `example.client.conf` next to the
//! generated material. Each peer trusts the CA that issued the *other* peer's
//! certificate, so the `ca` lines follow the signing topology.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::error::{CertError, Result};
use crate::pipeline::PipelineOutcome;
use crate::profile::{OutputPaths, Role};

pub const SERVER_CONFIG_FILE: &str = "example.server.conf";
pub const CLIENT_CONFIG_FILE: &str = "example.client.conf";

/// The three files one peer needs: whom to trust and who it is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerFiles {
    pub ca: String,
    pub cert: String,
    pub key: String,
}

impl PeerFiles {
    /// Files for `role` in a finished run, named relative to `dir` where the
    /// peer's config lives.
    pub fn for_role(outcome: &PipelineOutcome, role: Role, dir: &Path) -> Self {
        let (own, peer) = match role {
            Role::Server => (&outcome.server_cert, Role::Client),
            Role::Client => (&outcome.client_cert, Role::Server),
        };
        let anchor = outcome.issuer_of(peer).paths();
        Self::new(anchor, own.paths(), dir)
    }

    fn new(anchor: &OutputPaths, own: &OutputPaths, dir: &Path) -> Self {
        Self {
            ca: relative_name(&anchor.certificate, dir),
            cert: relative_name(&own.certificate, dir),
            key: relative_name(&own.private_key, dir),
        }
    }
}

// OpenVPN resolves relative names against the config's directory. Paths
// outside `dir` are written out in full.
fn relative_name(path: &Path, dir: &Path) -> String {
    path.strip_prefix(dir)
        .unwrap_or(path)
        .display()
        .to_string()
}

pub fn render_server_config(files: &PeerFiles) -> String {
    format!(
        "port 1194
proto udp
dev tun
ca {ca}
cert {cert}
key {key}
#run openssl dhparam -out dh2048.pem 2048
dh dh2048.pem
server 10.255.255.0 255.255.255.0
topology net30
ifconfig-pool-persist ipp.txt
push \"redirect-gateway def1 bypass-dhcp\"
dhcp-option DNS 8.8.8.8
dhcp-option DNS 8.8.4.4
keepalive 10 120
#run  openvpn --genkey --secret ta.key
tls-auth ta.key 0
cipher AES-128-CBC
comp-lzo
persist-key
persist-tun
user openvpn
group openvpn
status openvpn-status.log
",
        ca = files.ca,
        cert = files.cert,
        key = files.key,
    )
}

pub fn render_client_config(files: &PeerFiles) -> String {
    format!(
        "client
dev tun
proto udp
remote SERVER 1194
resolv-retry infinite
nobind
user openvpn
group openvpn
persist-key
persist-tun
ca {ca}
cert {cert}
key {key}
remote-cert-tls server
tls-auth ta.key 1
cipher AES-128-CBC
comp-lzo
#For HTTP proxy uncomment the below
#http-proxy-retry
#http-proxy HTTPPROXYSERVER HTTPPROXYPORT
#http-proxy-option AGENT Mozilla/5.0+(Windows;+U;+Windows+NT+5.0;+en-GB;+rv:1.7.6)+Gecko/20050226+Firefox/1.0.1
#or create a 2 line text file, username on first line, pass on second, call it userpass.txt
#http-proxy HTTPPROXYSERVER HTTPPROXYPORT userpass.txt_file basic
#http-proxy HTTPPROXYSERVER HTTPPROXYPORT userpass.txt_file ntlm
#socks-proxy SERVER PORT
",
        ca = files.ca,
        cert = files.cert,
        key = files.key,
    )
}

/// Write both example configurations into `dir` and return their paths.
pub fn write_peer_configs(dir: &Path, outcome: &PipelineOutcome) -> Result<(PathBuf, PathBuf)> {
    let server_path = dir.join(SERVER_CONFIG_FILE);
    let server = render_server_config(&PeerFiles::for_role(outcome, Role::Server, dir));
    fs::write(&server_path, server).map_err(|e| CertError::persistence(&server_path, e))?;
    info!(path = %server_path.display(), "wrote example server config");

    let client_path = dir.join(CLIENT_CONFIG_FILE);
    let client = render_client_config(&PeerFiles::for_role(outcome, Role::Client, dir));
    fs::write(&client_path, client).map_err(|e| CertError::persistence(&client_path, e))?;
    info!(path = %client_path.display(), "wrote example client config");

    Ok((server_path, client_path))
}
