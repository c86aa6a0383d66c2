//! Certerator - server/client certificate generator for mutual TLS
//!
//! Creates a Server CA, a Client CA, and a server and client certificate
//! signed by them, reusing whatever already exists on disk. Prints the SHA1
//! fingerprint of each certificate and the lines each OpenVPN peer needs.
//!
//! ```bash
//! # Generate (or reuse) everything with built-in defaults
//! certerator
//!
//! # Use a config file and put the files in ./pki
//! certerator --config certerator.toml --output-dir pki
//!
//! # Issue one more client certificate under an existing CA
//! certerator issue --role client --ca-cert pki/server_ca.pem --ca-key pki/server_ca.key \
//!     --common-name "Laptop" --serial 2001 --cert-out laptop.pem --key-out laptop.key
//! ```

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use certerator::configs::AppConfig;
use certerator::peer_config::{self, PeerFiles};
use certerator::pipeline::{self, PipelineOutcome, SigningTopology};
use certerator::profile::{CertificateProfile, Role};
use certerator::storage::{self, ArtifactKind, ArtifactOrigin, Fingerprint, StoredArtifact};
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "certerator", version)]
#[command(about = "Server/client certificate generator for mutual TLS (OpenVPN)", long_about = None)]
#[command(args_conflicts_with_subcommands = true)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    #[command(flatten)]
    generate: GenerateArgs,
}

#[derive(Subcommand)]
enum Commands {
    /// Build or reuse both CAs and both peer certificates (default)
    Generate(GenerateArgs),

    /// Build or reuse a single leaf certificate under an existing CA
    Issue(IssueArgs),

    /// Print the SHA1 fingerprint of a PEM certificate
    Fingerprint {
        /// Certificate file
        cert: PathBuf,
    },
}

#[derive(Args, Clone, Default)]
struct GenerateArgs {
    /// TOML config file (default: certerator.toml if present)
    #[arg(long, short)]
    config: Option<PathBuf>,

    /// Directory for certificates, keys and example configs
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Which CA signs each peer certificate: cross-signed or own-ca
    #[arg(long)]
    topology: Option<SigningTopology>,

    /// Do not write example.server.conf / example.client.conf
    #[arg(long)]
    no_peer_configs: bool,
}

#[derive(Args)]
struct IssueArgs {
    /// Certificate role: server or client
    #[arg(long)]
    role: String,

    /// Signing CA certificate (PEM)
    #[arg(long)]
    ca_cert: PathBuf,

    /// Signing CA private key (PEM)
    #[arg(long)]
    ca_key: PathBuf,

    /// Subject common name
    #[arg(long)]
    common_name: String,

    /// Subject organization
    #[arg(long)]
    organization: Option<String>,

    /// Subject country (two-letter code)
    #[arg(long)]
    country: Option<String>,

    /// Serial number (positive)
    #[arg(long)]
    serial: u64,

    /// notBefore, YYYYMMDDHHMMSSZ
    #[arg(long, default_value = "20160101000000Z")]
    valid_from: String,

    /// notAfter, YYYYMMDDHHMMSSZ
    #[arg(long, default_value = "20170101000000Z")]
    valid_to: String,

    /// RSA key size in bits
    #[arg(long, default_value_t = 4096)]
    key_size: u32,

    /// Signature hash algorithm
    #[arg(long, default_value = "sha512")]
    hash: String,

    /// Output certificate file
    #[arg(long)]
    cert_out: PathBuf,

    /// Output private key file
    #[arg(long)]
    key_out: PathBuf,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Some(Commands::Generate(args)) => generate(args),
        Some(Commands::Issue(args)) => issue(args),
        Some(Commands::Fingerprint { cert }) => fingerprint(&cert),
        None => generate(cli.generate),
    }
}

fn generate(args: GenerateArgs) -> Result<()> {
    let mut config = AppConfig::load(args.config.as_deref())?;
    if let Some(dir) = args.output_dir {
        config.output_directory = dir;
    }
    if let Some(topology) = args.topology {
        config.topology = topology;
    }
    if args.no_peer_configs {
        config.write_peer_configs = false;
    }

    let profiles = config.profiles()?;
    let outcome =
        pipeline::run(&profiles, config.topology).context("Certificate generation failed")?;

    report(&outcome.server_ca, "Server CA");
    report(&outcome.client_ca, "Client CA");
    report(&outcome.server_cert, "server certificate");
    report(&outcome.client_cert, "client certificate");
    print_instructions(&outcome, &config.output_directory);

    if config.write_peer_configs {
        let (server_conf, client_conf) =
            peer_config::write_peer_configs(&config.output_directory, &outcome)
                .context("Failed to write example configs")?;
        println!(
            " Example configs written to {} and {}",
            server_conf.display(),
            client_conf.display()
        );
    }
    Ok(())
}

fn issue(args: IssueArgs) -> Result<()> {
    let ca = storage::load_authority(&args.ca_cert, &args.ca_key)
        .context("Failed to load signing CA")?;
    let kind = ArtifactKind::leaf_for_role_name(&args.role, &ca)?;

    let mut builder = CertificateProfile::builder(args.common_name)
        .serial(args.serial)
        .valid_from(args.valid_from)
        .valid_to(args.valid_to)
        .key_size(args.key_size)
        .hash_algorithm(args.hash)
        .certificate_path(args.cert_out)
        .key_path(args.key_out);
    if let Some(organization) = args.organization {
        builder = builder.organization(organization);
    }
    if let Some(country) = args.country {
        builder = builder.country(country);
    }
    let profile = builder.build()?;

    let name = match kind {
        ArtifactKind::Leaf { role: Role::Server, .. } => "server certificate",
        _ => "client certificate",
    };
    let artifact = storage::build_or_reuse(&profile, kind)?;
    report(&artifact, name);
    Ok(())
}

fn fingerprint(cert: &Path) -> Result<()> {
    let certificate = storage::load_certificate(cert)?;
    println!("SHA1 Fingerprint: {}", Fingerprint::of(&certificate)?);
    Ok(())
}

fn report(artifact: &StoredArtifact, name: &str) {
    let paths = artifact.paths();
    match artifact.origin() {
        ArtifactOrigin::Loaded => {
            println!("Reusing {} as the {}", paths.certificate.display(), name);
        }
        ArtifactOrigin::Generated => {
            println!("Generated new {}", name);
            println!(" Written PEM certificate to {}", paths.certificate.display());
            println!(" Written private key to {}", paths.private_key.display());
        }
    }
    println!(" SHA1 {} Fingerprint: {}", name, artifact.fingerprint());
    println!();
}

// Names are relative to the output directory, where the example configs go
fn print_instructions(outcome: &PipelineOutcome, dir: &Path) {
    for (heading, role) in [("On the OpenVPN Server:", Role::Server), ("On the OpenVPN Client:", Role::Client)] {
        let files = PeerFiles::for_role(outcome, role, dir);
        println!("{}", heading);
        println!("ca {}", files.ca);
        println!("cert {}", files.cert);
        println!("key {}", files.key);
        println!();
    }
}
