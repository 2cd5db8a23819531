use std::env;
use std::io::Write;
use std::path::PathBuf;

use shell_cache::{
    AppConfig, AssetManifest, CacheStore, DiskStore, FetchOutcome, HttpFetcher, LocalHost,
    MessageOutcome, Reconciler, ResponseSource,
};

fn print_usage() {
    eprintln!("Usage: shell-cache <COMMAND> [OPTIONS]");
    eprintln!();
    eprintln!("Commands:");
    eprintln!("  install                 Download the core set into the staging cache");
    eprintln!("  activate                Reconcile the content cache with the manifest");
    eprintln!("  fetch <url>             Resolve a request through the cache, body to stdout");
    eprintln!("  message <name>          Send skipWaiting or downloadOffline");
    eprintln!("  status                  List cache namespaces and the recorded manifest");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --origin <URL>          Origin the shell is served from");
    eprintln!("  --manifest <PATH>       Asset manifest JSON (default: asset-manifest.json)");
    eprintln!("  --store <DIR>           Cache store directory");
    eprintln!("  --config <PATH>         Config file");
    eprintln!("                          (default: <config dir>/shell-cache/config.toml)");
    eprintln!("  --method <METHOD>       Request method for fetch (default: GET)");
    eprintln!("  -h, --help              Show this help");
}

enum Command {
    Install,
    Activate,
    Fetch { url: String },
    Message { name: String },
    Status,
}

struct Cli {
    command: Command,
    origin: Option<String>,
    manifest: Option<PathBuf>,
    store: Option<PathBuf>,
    config: Option<PathBuf>,
    method: String,
}

fn usage_error(message: &str) -> ! {
    eprintln!("Error: {message}");
    eprintln!();
    print_usage();
    std::process::exit(2);
}

fn parse_args(args: &[String]) -> Cli {
    let mut positional = Vec::new();
    let mut origin = None;
    let mut manifest = None;
    let mut store = None;
    let mut config = None;
    let mut method = "GET".to_string();

    let mut i = 0;
    while i < args.len() {
        let flag = args[i].as_str();
        let mut value = || {
            i += 1;
            args.get(i)
                .cloned()
                .unwrap_or_else(|| usage_error(&format!("{flag} requires a value")))
        };
        match flag {
            "-h" | "--help" => {
                print_usage();
                std::process::exit(0);
            }
            "--origin" => origin = Some(value()),
            "--manifest" => manifest = Some(PathBuf::from(value())),
            "--store" => store = Some(PathBuf::from(value())),
            "--config" => config = Some(PathBuf::from(value())),
            "--method" => method = value(),
            other if other.starts_with('-') => usage_error(&format!("unknown option {other}")),
            other => positional.push(other.to_string()),
        }
        i += 1;
    }

    let mut positional = positional.into_iter();
    let command = match positional.next().as_deref() {
        Some("install") => Command::Install,
        Some("activate") => Command::Activate,
        Some("status") => Command::Status,
        Some("fetch") => Command::Fetch {
            url: positional
                .next()
                .unwrap_or_else(|| usage_error("fetch requires a URL")),
        },
        Some("message") => Command::Message {
            name: positional
                .next()
                .unwrap_or_else(|| usage_error("message requires a name")),
        },
        Some(other) => usage_error(&format!("unknown command {other}")),
        None => {
            print_usage();
            std::process::exit(0);
        }
    };
    if let Some(extra) = positional.next() {
        usage_error(&format!("unexpected argument {extra}"));
    }

    Cli {
        command,
        origin,
        manifest,
        store,
        config,
        method,
    }
}

fn load_config(cli: &Cli) -> shell_cache::Result<AppConfig> {
    let mut config = match &cli.config {
        Some(path) => AppConfig::load_from(path)?,
        None => AppConfig::load()?,
    };
    if let Some(origin) = &cli.origin {
        config.origin.clone_from(origin);
    }
    if let Some(path) = &cli.manifest {
        config.paths.manifest_path.clone_from(path);
    }
    if let Some(dir) = &cli.store {
        config.paths.store_dir.clone_from(dir);
    }
    config.validate()?;
    Ok(config)
}

async fn print_status(
    reconciler: &Reconciler<DiskStore, HttpFetcher>,
) -> shell_cache::Result<()> {
    let store = reconciler.store();
    println!("Store: {}", store.root().display());
    let namespaces = store.namespaces().await?;
    if namespaces.is_empty() {
        println!("  (no caches)");
    }
    for ns in &namespaces {
        println!("  {ns}: {} entries", store.keys(ns).await?.len());
    }
    match reconciler.recorded_manifest().await? {
        Some(manifest) => println!("Recorded manifest: {} resources", manifest.len()),
        None => println!("Recorded manifest: none"),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> shell_cache::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args: Vec<String> = env::args().skip(1).collect();
    let cli = parse_args(&args);
    let config = load_config(&cli)?;

    // Status only inspects the store, so a missing manifest file is fine there.
    let assets = match cli.command {
        Command::Status if !config.paths.manifest_path.exists() => AssetManifest::default(),
        _ => AssetManifest::load(&config.paths.manifest_path)?,
    };

    let reconciler = Reconciler::new(
        config.origin()?,
        assets,
        DiskStore::new(&config.paths.store_dir),
        HttpFetcher::with_defaults()?,
        LocalHost::new(),
    )
    .with_config(config.reconciler.clone());

    match &cli.command {
        Command::Install => {
            let staged = reconciler.install().await?;
            println!("Installed: {staged} core resources staged");
        }
        Command::Activate => {
            let report = reconciler.activate().await?;
            if report.first_install {
                println!("Activated (first install): {} resources cached", report.promoted);
            } else {
                println!(
                    "Activated: kept {}, evicted {}, refreshed {}",
                    report.kept,
                    report.evicted.len(),
                    report.promoted
                );
                for key in &report.evicted {
                    println!("  evicted {key}");
                }
            }
        }
        Command::Fetch { url } => match reconciler.handle_fetch(&cli.method, url).await? {
            FetchOutcome::Passthrough => {
                eprintln!("Not intercepted: {url}");
            }
            FetchOutcome::Respond { response, source } => {
                let from = match source {
                    ResponseSource::Cache => "cache",
                    ResponseSource::Network => "network",
                };
                eprintln!("{} from {from} ({} bytes)", response.status, response.body.len());
                std::io::stdout().write_all(&response.body)?;
            }
        },
        Command::Message { name } => match reconciler.handle_message(name).await? {
            MessageOutcome::SkippedWaiting => println!("Requested immediate activation"),
            MessageOutcome::Downloaded(report) => println!(
                "Downloaded {} resources ({} already cached)",
                report.fetched.len(),
                report.already_cached
            ),
            MessageOutcome::Ignored => eprintln!("Unknown message {name:?}, ignored"),
        },
        Command::Status => print_status(&reconciler).await?,
    }

    Ok(())
}
