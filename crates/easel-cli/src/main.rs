use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio_stream::StreamExt;

use easel_agent::prompt::{designer_agent, swarm_agents};
use easel_agent::{ModelClient, ModelSettings, TurnDeps, TurnMode, TurnRequest, run_turn};
use easel_canvas::CanvasSynthesizer;
use easel_core::config::{Config, ImageModelSelection};
use easel_core::store::{FileStore, PersistenceGateway};
use easel_core::{ConversationMessage, logging};
use easel_imagegen::{JobRunner, ProviderRegistry};
use easel_providers::Credentials;
use easel_providers::openai::OpenAiProvider;
use easel_tools::{ChannelNotifier, GenerateImageTool, ToolSet, WritePlanTool};

#[derive(Parser)]
#[command(
    name = "easel",
    about = "Chat with image-generating design agents and stream the turn as JSON events",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one chat turn and print its events as JSON lines
    Chat {
        /// Message to send
        #[arg(short, long)]
        message: String,

        /// Session to continue (a new one is created when omitted)
        #[arg(long)]
        session: Option<String>,

        /// Canvas that generated images are placed on
        #[arg(long)]
        canvas: Option<String>,

        /// Use the planner/designer swarm instead of the single designer
        #[arg(long)]
        swarm: bool,

        /// Chat provider id from config (default: first configured)
        #[arg(long)]
        provider: Option<String>,

        /// Chat model override
        #[arg(long)]
        model: Option<String>,

        /// Image provider key (replicate, wavespeed, openai)
        #[arg(long, requires = "image_model")]
        image_provider: Option<String>,

        /// Image model for the chosen provider
        #[arg(long, requires = "image_provider")]
        image_model: Option<String>,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Show configured providers and storage
    Status,
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show current configuration
    Show,
    /// Check configuration for problems
    Validate,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config_path = cli
        .config
        .map(PathBuf::from)
        .unwrap_or_else(Config::config_path);
    let config = Config::load(&config_path)?;

    logging::init(&config.logging.clone().unwrap_or_default(), cli.verbose)?;

    match cli.command {
        Commands::Chat {
            message,
            session,
            canvas,
            swarm,
            provider,
            model,
            image_provider,
            image_model,
        } => {
            let image_model = match (image_provider, image_model) {
                (Some(provider), Some(model)) => Some(ImageModelSelection { provider, model }),
                _ => config.default_image_model().cloned(),
            };
            let options = ChatOptions {
                session_id: session.unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
                canvas_id: canvas,
                mode: if swarm { TurnMode::Swarm } else { TurnMode::Single },
                provider,
                model,
                image_model,
            };
            chat(&config, message, options).await?;
        }
        Commands::Config { action } => match action {
            ConfigAction::Show => {
                let json = serde_json::to_string_pretty(&config)?;
                println!("{json}");
            }
            ConfigAction::Validate => {
                let (warnings, errors) = config.validate();
                for w in &warnings {
                    println!("warning: {w}");
                }
                for e in &errors {
                    println!("error: {e}");
                }
                if !errors.is_empty() {
                    anyhow::bail!("configuration has {} error(s)", errors.len());
                }
                println!("Configuration OK ({})", config_path.display());
            }
        },
        Commands::Status => {
            println!("Easel v{}", env!("CARGO_PKG_VERSION"));
            println!("Config: {}", config_path.display());
            println!("Storage: {}", config.storage_dir().display());
            match config.first_provider() {
                Some(p) => println!("Chat provider: {} ({})", p.id, config.default_model()),
                None => println!("Chat provider: none configured"),
            }
            let registry = ProviderRegistry::from_config(&config);
            let keys = registry.keys();
            if keys.is_empty() {
                println!("Image providers: none with credentials");
            } else {
                println!("Image providers: {}", keys.join(", "));
            }
            match config.default_image_model() {
                Some(sel) => println!("Default image model: {}/{}", sel.provider, sel.model),
                None => println!("Default image model: not set"),
            }
        }
    }

    Ok(())
}

struct ChatOptions {
    session_id: String,
    canvas_id: Option<String>,
    mode: TurnMode,
    provider: Option<String>,
    model: Option<String>,
    image_model: Option<ImageModelSelection>,
}

/// Build a chat client from the provider config.
fn model_client(config: &Config, provider: Option<&str>, model: Option<String>) -> anyhow::Result<ModelClient> {
    let provider_config = match provider {
        Some(id) => config
            .provider(id)
            .with_context(|| format!("chat provider '{id}' is not configured"))?,
        None => config
            .first_provider()
            .context("no chat provider configured under models.providers")?,
    };

    let credentials = match provider_config.resolve_api_key() {
        Some(api_key) => Credentials::ApiKey { api_key },
        None if provider_config.id == "ollama" => Credentials::None,
        None => anyhow::bail!("chat provider '{}' has no API key", provider_config.id),
    };

    let mut settings = ModelSettings::from_config(config);
    if let Some(model) = model.or_else(|| provider_config.default_model.clone()) {
        settings.model = model;
    }

    let llm = OpenAiProvider::for_provider(&provider_config.id, provider_config.base_url.as_deref());
    Ok(ModelClient::new(Arc::new(llm), credentials, settings))
}

async fn chat(config: &Config, message: String, options: ChatOptions) -> anyhow::Result<()> {
    let client = model_client(config, options.provider.as_deref(), options.model)?;
    let store = Arc::new(FileStore::new(config.storage_dir()));

    let runner = Arc::new(JobRunner::from_config(config, store.clone()));
    let tools = ToolSet::new()
        .with(Arc::new(GenerateImageTool::new(
            runner,
            CanvasSynthesizer::new(store.clone()),
        )))
        .with(Arc::new(WritePlanTool));

    let mut history = store.list_messages(&options.session_id).await?;
    let user = ConversationMessage::user(message);
    store
        .create_message(&options.session_id, user.role.as_str(), &serde_json::to_string(&user)?)
        .await?;
    history.push(user);
    tracing::info!(session_id = %options.session_id, history = history.len(), "Chat turn");

    let (notifier, mut notifications) = ChannelNotifier::new();
    let printer = tokio::spawn(async move {
        while let Some(notification) = notifications.recv().await {
            match serde_json::to_string(&notification) {
                Ok(line) => println!("{line}"),
                Err(e) => tracing::warn!(%e, "Failed to encode notification"),
            }
        }
    });

    let deps = TurnDeps {
        client,
        gateway: store,
        notifier: Arc::new(notifier),
        designer: designer_agent(&tools),
        swarm: swarm_agents(config, &tools),
        default_agent: config.default_agent().map(String::from),
    };
    let request = TurnRequest {
        session_id: options.session_id,
        canvas_id: options.canvas_id,
        messages: history,
        image_model: options.image_model,
        mode: options.mode,
    };

    let mut failed = None;
    {
        let events = run_turn(request, deps);
        tokio::pin!(events);
        while let Some(event) = events.next().await {
            println!("{}", serde_json::to_string(&event)?);
            if let easel_core::ClientEvent::Error { error } = &event {
                failed = Some(error.clone());
            }
        }
    }

    // The turn's notifier clones are gone; the printer drains and exits.
    printer.await.context("notification printer panicked")?;

    match failed {
        Some(error) => anyhow::bail!("turn failed: {error}"),
        None => Ok(()),
    }
}
