use chorus_bridge::config::Config;
use chorus_bridge::domains::correlation::CorrelationOutcome;
use chorus_bridge::domains::message::{new_correlation_id, Request};
use chorus_bridge::domains::resource::{ResolveMode, ResolveOutcome};
use chorus_bridge::e2e::identity_store::{encode_key, load_or_create_identity};
use chorus_bridge::error::{ChorusError, Result};
use chorus_bridge::factories::channel_factory::{key_file, DEFAULT_KEY_DIR};
use chorus_bridge::services::correlator::CancelFlag;
use chorus_bridge::ChorusClient;
use clap::Parser;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "chorus-bridge")]
#[command(about = "Request/response bridge over a shared message log")]
struct Cli {
    #[arg(long, env = "CHORUS_BRIDGE_CONFIG")]
    config: Option<String>,

    #[arg(long, env = "CHORUS_BRIDGE_TOKEN")]
    token: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Send one answer and wait for the verdict.
    Ask {
        #[arg(long)]
        value: String,
        #[arg(long)]
        context: String,
        #[arg(long)]
        correlation_id: Option<String>,
        /// Also fetch the audio the verdict points at.
        #[arg(long)]
        audio: bool,
    },
    /// Resolve a content id through the configured endpoints.
    Fetch {
        content_id: String,
        #[arg(long)]
        replay: bool,
    },
    /// Print the public key peers need for the gossip channel.
    Identity {
        #[arg(long, default_value = DEFAULT_KEY_DIR)]
        key_dir: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,chorus_bridge=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = Cli::parse();
    if let Commands::Identity { key_dir } = &cli.command {
        let identity = load_or_create_identity(&key_file(key_dir, "identity.key"))?;
        println!("{}", encode_key(&identity.public_bytes()));
        return Ok(());
    }

    let config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };
    let client = ChorusClient::from_config_with_token(config, cli.token.clone()).await?;

    match cli.command {
        Commands::Ask {
            value,
            context,
            correlation_id,
            audio,
        } => {
            let request = Request::with_correlation_id(
                correlation_id.unwrap_or_else(new_correlation_id),
                value,
                context,
            );
            let cancel = CancelFlag::new();
            if audio {
                let (outcome, resolved) = client.ask_and_prepare_audio(&request, &cancel).await?;
                print_outcome(&outcome)?;
                if let Some(resolved) = resolved {
                    print_resolve(&resolved);
                }
            } else {
                let outcome = client.ask(&request, &cancel).await?;
                print_outcome(&outcome)?;
            }
        }
        Commands::Fetch { content_id, replay } => {
            let mode = if replay {
                ResolveMode::Replay
            } else {
                ResolveMode::Once
            };
            let outcome = client.fetch_audio(&content_id, mode).await;
            print_resolve(&outcome);
            if let Some(loaded) = client.loaded_audio().await {
                println!(
                    "loaded {} bytes ({}) from {}",
                    loaded.bytes.len(),
                    loaded.content_type.as_deref().unwrap_or("unknown type"),
                    loaded.uri
                );
            }
        }
        Commands::Identity { .. } => {}
    }
    Ok(())
}

fn print_outcome(outcome: &CorrelationOutcome) -> Result<()> {
    match outcome {
        CorrelationOutcome::Resolved(response) => {
            let body = serde_json::to_string_pretty(&response.body)
                .map_err(|e| ChorusError::Serialization(e.to_string()))?;
            println!("{body}");
        }
        CorrelationOutcome::TimedOut => println!("no response before timeout"),
        CorrelationOutcome::ChannelUnavailable => println!("channel unavailable"),
    }
    Ok(())
}

fn print_resolve(outcome: &ResolveOutcome) {
    match outcome {
        ResolveOutcome::Local { uri } => println!("local resource {uri}"),
        ResolveOutcome::Succeeded { endpoint, .. } => println!("ready from {endpoint}"),
        ResolveOutcome::Exhausted { attempts } => {
            println!("unavailable after {} attempts", attempts.len())
        }
        ResolveOutcome::AlreadyPlayed => println!("already played this session"),
        ResolveOutcome::Cancelled { .. } => println!("cancelled"),
    }
}
