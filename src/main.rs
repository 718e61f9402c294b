use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

use trustwalk::config::{Config, IpFamily, parse_server};
use trustwalk::dns::rdata::KeyRole;
use trustwalk::dnssec::validator::{ChainReport, DirectReport};
use trustwalk::dnssec::{DnsSecAlgorithm, TrustAnchors, TrustedKey, Validator, Verdict};
use trustwalk::keys::DirectoryKeyStore;
use trustwalk::{DomainName, Error, RecordType, UdpResolver};

/// Check DNS records against a DNSSEC chain of trust
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Domains to check; `@server` selects the upstream server
    #[arg(required = true, value_name = "[@SERVER] DOMAIN")]
    targets: Vec<String>,

    /// Record type to query
    #[arg(short = 't', long = "type", default_value = "A")]
    rtype: String,

    /// Validate through the chain of trust (the default mode)
    #[arg(long)]
    val_chain: bool,

    /// Verify the RRSIGs directly with the domain's stored ZSK, then KSK
    #[arg(long)]
    val_rr: bool,

    /// Add keys from the key store to the trust anchors
    #[arg(short = 'c')]
    from_store: bool,

    /// Owner of the trust anchor given with -K
    #[arg(short = 'k', long = "origin", requires = "key")]
    origin: Option<String>,

    /// Base64 public key of a trust anchor
    #[arg(short = 'K', long = "key", requires = "origin")]
    key: Option<String>,

    /// The key given with -K is a key-signing key
    #[arg(long)]
    ksk: bool,

    /// Algorithm of the key given with -K
    #[arg(long, default_value = "ECDSAP256SHA256")]
    algorithm: DnsSecAlgorithm,

    /// Trust anchor as `<domain> DNSKEY <flags> 3 <alg> <key>`
    #[arg(long = "trusted-key")]
    trusted_keys: Vec<String>,

    /// More diagnostics (repeat up to four times)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Key store directory
    #[arg(short = 's', long = "store")]
    store: Option<PathBuf>,

    /// Only use IPv4 upstream servers
    #[arg(short = '4', conflicts_with = "ipv6")]
    ipv4: bool,

    /// Only use IPv6 upstream servers
    #[arg(short = '6')]
    ipv6: bool,

    /// Unix time to validate signatures at
    #[arg(long)]
    now: Option<u32>,

    /// Configuration file
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    init_tracing(args.verbose);

    match run(args).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::from(2)
        }
    }
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1..=3 => "info",
        _ => "debug",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)),
        )
        .with_writer(std::io::stderr)
        .init();
}

async fn run(args: Args) -> Result<ExitCode, Error> {
    let mut config = Config::load(args.config.as_deref())?;

    let mut names = Vec::new();
    let mut servers = Vec::new();
    for target in &args.targets {
        match target.strip_prefix('@') {
            Some(server) => servers.push(server.to_string()),
            None => names.push(target.parse::<DomainName>()?),
        }
    }
    if names.is_empty() {
        return Err(Error::MalformedInput("no domain given".to_string()));
    }
    for server in &servers {
        parse_server(server)?;
    }
    if !servers.is_empty() {
        config.resolver.servers = servers;
    }
    if args.ipv4 {
        config.resolver.ip_family = IpFamily::V4;
    } else if args.ipv6 {
        config.resolver.ip_family = IpFamily::V6;
    }
    if let Some(store) = &args.store {
        config.keystore.directory = Some(store.clone());
    }

    let rtype: RecordType = args.rtype.parse()?;
    let mut options = config.validation_options();
    options.verbosity = options.verbosity.max(args.verbose);
    options.use_key_store |= args.from_store;
    options.now = args.now;

    let anchors = trust_anchors(&args, &config)?;
    let upstream = config.upstream_servers()?;
    debug!("Upstream servers: {:?}", upstream);
    let resolver = UdpResolver::new(upstream, config.timeout(), config.resolver.retries);

    let mut validator = Validator::new(Arc::new(resolver)).with_options(options);
    if let Some(dir) = &config.keystore.directory {
        validator = validator.with_key_store(Arc::new(DirectoryKeyStore::new(dir.clone())));
    }

    let run_chain = args.val_chain || !args.val_rr;
    let mut success = true;

    let mut direct = Vec::new();
    if args.val_rr {
        for name in &names {
            let report = validator.verify_direct(name, rtype).await?;
            print_direct(&report);
            success &= report.outcome.is_valid();
            direct.push(report);
        }
    }

    if run_chain {
        let reports = if names.len() == 1 {
            vec![validator.validate_chain(&names[0], rtype, &anchors).await]
        } else {
            let queries = names.iter().map(|name| (name.clone(), rtype)).collect();
            let mut items = validator.validate_batch(queries, &anchors).await;
            items.sort_by_key(|item| names.iter().position(|n| n == &item.name));
            items.into_iter().map(|item| item.result).collect()
        };

        // The chain verdict decides the exit status when both modes ran
        success = true;
        for report in reports {
            match report {
                Ok(report) => {
                    print_chain(&report);
                    if let Some(check) = direct.iter().find(|d| d.name == report.name) {
                        if check.outcome.is_valid() != report.verdict.is_secure() {
                            warn!(
                                "{}: direct verification ({}) disagrees with the chain ({})",
                                report.name, check.outcome, report.verdict
                            );
                        }
                    }
                    success &= report.verdict == Verdict::Secure;
                }
                Err(e) => {
                    eprintln!("Error: {}", e);
                    success = false;
                }
            }
        }
    }

    Ok(if success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn trust_anchors(args: &Args, config: &Config) -> Result<TrustAnchors, Error> {
    let mut anchors = config.trust_anchors()?;
    for text in &args.trusted_keys {
        anchors.insert(text.parse::<TrustedKey>()?);
    }
    if let (Some(origin), Some(key)) = (&args.origin, &args.key) {
        let role = if args.ksk { KeyRole::Ksk } else { KeyRole::Zsk };
        anchors.insert(TrustedKey::from_base64(
            origin.parse()?,
            role,
            args.algorithm.to_u8(),
            key,
        )?);
    }
    Ok(anchors)
}

fn print_chain(report: &ChainReport) {
    println!("{} {}", report.name, report.rtype);
    print!("{}", report.tree);
    println!("Verdict: {}", report.verdict);
    println!("Time taken: {} us", report.elapsed.as_micros());
}

fn print_direct(report: &DirectReport) {
    println!("{} {} RRSIG: {}", report.name, report.rtype, report.outcome);
    println!("Time taken: {} us", report.elapsed.as_micros());
}
