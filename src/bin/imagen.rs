//! CLI for Imagen - generate images through the relay or directly.

use clap::{Args, Parser, Subcommand, ValueEnum};
use imagen::{
    AspectRatio, CredentialStore, GenerationController, GenerationRequest, ImagenConfig,
    ImageSource, TransportMode,
};
use secrecy::ExposeSecret;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "imagen")]
#[command(about = "Generate images with Imagen 4 through a relay or directly")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate images from a text prompt
    Generate(GenerateArgs),

    /// Manage the stored API key for direct mode
    #[command(subcommand)]
    Key(KeyCommand),

    /// Run the relay backend
    Serve(ServeArgs),
}

#[derive(Args)]
struct GenerateArgs {
    /// The text prompt describing the image
    prompt: String,

    /// How to reach the provider
    #[arg(short, long, value_enum, default_value = "relay")]
    mode: ModeArg,

    /// Relay endpoint (relay mode)
    #[arg(short, long, env = "IMAGEN_RELAY_URL")]
    endpoint: Option<String>,

    /// API key for direct mode; replaces the stored key for this run
    #[arg(short = 'k', long)]
    api_key: Option<String>,

    /// Remember the API key given with --api-key
    #[arg(long, requires = "api_key")]
    remember: bool,

    /// Aspect ratio
    #[arg(short, long, value_enum, default_value = "1:1")]
    aspect_ratio: AspectRatioArg,

    /// Number of images (clamped to 1-4)
    #[arg(short = 'n', long, default_value_t = 1, allow_negative_numbers = true)]
    count: i64,

    /// Directory for decoded images
    #[arg(short, long, default_value = ".")]
    output_dir: PathBuf,

    /// Per-request timeout in seconds
    #[arg(long)]
    timeout: Option<u64>,
}

#[derive(Subcommand)]
enum KeyCommand {
    /// Set the API key
    Set {
        /// The key
        key: String,

        /// Keep the key across sessions
        #[arg(long)]
        remember: bool,
    },
    /// Show whether a key is stored
    Show,
    /// Forget the key
    Clear,
}

#[derive(Args)]
struct ServeArgs {
    /// Address to bind
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Port to listen on
    #[arg(short, long, env = "PORT", default_value_t = 5001)]
    port: u16,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ModeArg {
    Relay,
    Direct,
}

impl From<ModeArg> for TransportMode {
    fn from(arg: ModeArg) -> Self {
        match arg {
            ModeArg::Relay => TransportMode::Relay,
            ModeArg::Direct => TransportMode::Direct,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum AspectRatioArg {
    #[value(name = "1:1")]
    Square,
    #[value(name = "3:4")]
    StandardPortrait,
    #[value(name = "4:3")]
    Standard,
    #[value(name = "9:16")]
    Portrait,
    #[value(name = "16:9")]
    Landscape,
}

impl From<AspectRatioArg> for AspectRatio {
    fn from(arg: AspectRatioArg) -> Self {
        match arg {
            AspectRatioArg::Square => AspectRatio::Square,
            AspectRatioArg::StandardPortrait => AspectRatio::StandardPortrait,
            AspectRatioArg::Standard => AspectRatio::Standard,
            AspectRatioArg::Portrait => AspectRatio::Portrait,
            AspectRatioArg::Landscape => AspectRatio::Landscape,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("imagen=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Generate(args) => {
            generate(args, cli.json).await?;
        }
        Commands::Key(cmd) => {
            manage_key(cmd, cli.json)?;
        }
        Commands::Serve(args) => {
            serve(args).await?;
        }
    }

    Ok(())
}

async fn generate(args: GenerateArgs, json_output: bool) -> anyhow::Result<()> {
    let mut config = ImagenConfig::from_env();
    if let Some(endpoint) = args.endpoint {
        config = config.with_relay_endpoint(endpoint);
    }
    if let Some(secs) = args.timeout {
        config = config.with_timeout(Duration::from_secs(secs));
    }

    let mut credentials = CredentialStore::open(config.credential_path.clone());
    if let Some(key) = args.api_key {
        if args.remember {
            credentials.set(key);
            let status = credentials.set_remember(true);
            if status.is_degraded() {
                eprintln!("warning: API key {status}");
            }
        } else {
            credentials.set_for_session(key);
        }
    }

    let controller = GenerationController::new(config, credentials)?;
    let request = GenerationRequest::new(&args.prompt)
        .with_aspect_ratio(args.aspect_ratio.into())
        .with_count(args.count);

    let outcome = match controller.submit(&request, args.mode.into()).await {
        Ok(outcome) => outcome,
        Err(e) => {
            if let Some(report) = controller.last_failure() {
                for cause in &report.trace {
                    eprintln!("  caused by: {cause}");
                }
            }
            return Err(e.into());
        }
    };

    let stamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default();

    let mut saved = Vec::new();
    let mut urls = Vec::new();
    for (i, source) in outcome.sources.iter().enumerate() {
        if source.is_data_uri() {
            std::fs::create_dir_all(&args.output_dir)?;
            let path = args.output_dir.join(ImageSource::file_name(i, stamp));
            source.save(&path)?;
            saved.push(path.display().to_string());
        } else {
            urls.push(source.as_str().to_string());
        }
    }

    let endpoint = match outcome.mode {
        TransportMode::Relay => controller.config().relay_endpoint.as_str(),
        TransportMode::Direct => controller.config().direct_endpoint.as_str(),
    };
    let key_status = controller.credentials().status();

    if json_output {
        let result = serde_json::json!({
            "type": "image",
            "success": true,
            "mode": outcome.mode.to_string(),
            "endpoint": endpoint,
            "key_status": key_status.to_string(),
            "count": outcome.sources.len(),
            "files": saved,
            "urls": urls,
            "elapsed_seconds": outcome.elapsed_seconds(),
        });
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        println!("{} via {} ({endpoint})", outcome.summary(), outcome.mode);
        if outcome.mode == TransportMode::Direct && key_status.is_degraded() {
            eprintln!("warning: API key {key_status}");
        }
        for path in &saved {
            println!("  saved {path}");
        }
        for url in &urls {
            println!("  {url}");
        }
        if outcome.is_empty() {
            eprintln!("warning: no images returned; check the log (RUST_LOG=imagen=debug) or switch mode");
        }
    }

    Ok(())
}

fn manage_key(cmd: KeyCommand, json_output: bool) -> anyhow::Result<()> {
    let config = ImagenConfig::from_env();
    let mut store = CredentialStore::open(config.credential_path);

    match cmd {
        KeyCommand::Set { key, remember } => {
            store.set(key);
            store.set_remember(remember);
        }
        KeyCommand::Clear => {
            store.clear();
        }
        KeyCommand::Show => {}
    }

    let masked = store.get().map(|key| mask(key.expose_secret()));
    let status = store.status();

    if json_output {
        let result = serde_json::json!({
            "has_key": store.has_key(),
            "key": masked,
            "remembered": store.remembers(),
            "status": status.to_string(),
            "degraded": status.is_degraded(),
        });
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        match masked {
            Some(masked) => println!("API key: {masked} ({status})"),
            None => println!("No API key ({status})"),
        }
    }

    Ok(())
}

fn mask(key: &str) -> String {
    let prefix: String = key.chars().take(4).collect();
    format!("{prefix}…")
}

async fn serve(args: ServeArgs) -> anyhow::Result<()> {
    let addr: SocketAddr = format!("{}:{}", args.host, args.port).parse()?;
    let config = ImagenConfig::from_env();
    let state = imagen::server::RelayState::from_config(&config);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    eprintln!("[imagen-relay] POST http://{addr}/api/imagen4");
    imagen::server::serve(listener, state).await?;
    Ok(())
}
