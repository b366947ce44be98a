//! Gravity CLI entry point

use std::sync::Arc;

use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use colored::*;
use tracing_subscriber::EnvFilter;

use gravity::adapters::cli::CliChannel;
use gravity::adapters::websocket::WebSocketGateway;
use gravity::adapters::{truncate, ChannelRegistry};
use gravity::agent::{Agent, ModelOrchestrator};
use gravity::config::Config;
use gravity::memory::{ConversationStore, FileConversationStore};
use gravity::tools::ToolRegistry;
use gravity::ui;

#[derive(Parser)]
#[command(name = "gravity")]
#[command(about = "Gravity - autonomous AI assistant with multi-provider fallback")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize Gravity configuration
    Onboard,

    /// Chat with the agent
    Chat {
        /// Message to send to the agent
        #[arg(short, long)]
        message: Option<String>,

        /// Session ID
        #[arg(short, long, default_value = "cli:default")]
        session: String,

        /// Model to use (defaults to the configured model)
        #[arg(long)]
        model: Option<String>,

        /// Continue the stored history of this session
        #[arg(short, long)]
        resume: bool,
    },

    /// Start the WebSocket chat gateway
    Serve {
        /// Bind host
        #[arg(long)]
        host: Option<String>,

        /// Gateway port
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// List the models each provider can serve
    Models,

    /// List, search or delete stored conversations
    Conversations {
        /// Maximum entries to show
        #[arg(short, long, default_value_t = 20)]
        limit: usize,

        /// Search message content instead of listing conversations
        #[arg(long)]
        search: Option<String>,

        /// Delete the conversation with this ID
        #[arg(long)]
        delete: Option<String>,
    },

    /// Show Gravity status
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Onboard => {
            gravity::config::onboard()?;
        }

        Commands::Chat {
            message,
            session,
            model,
            resume,
        } => {
            let config = gravity::config::load()?;
            run_chat(&config, message, session, model, resume).await?;
        }

        Commands::Serve { host, port } => {
            let config = gravity::config::load()?;
            let host = host.unwrap_or_else(|| config.server.host.clone());
            let port = port.unwrap_or(config.server.port);
            run_gateway(&config, &format!("{}:{}", host, port)).await?;
        }

        Commands::Models => {
            let config = gravity::config::load()?;
            let orchestrator = ModelOrchestrator::from_config(&config)?;
            let models = orchestrator.available_models().await;

            if models.is_empty() {
                ui::print_warning("No provider is reachable");
            }
            for (provider, names) in models {
                println!("{}", provider.cyan().bold());
                for name in names {
                    let marker = if name == config.default_model { " (default)" } else { "" };
                    println!("  {} {}{}", "•".green(), name, marker.dimmed());
                }
            }
            orchestrator.close();
        }

        Commands::Conversations { limit, search, delete } => {
            let config = gravity::config::load()?;
            let store = FileConversationStore::open(config.store_path()).await?;
            run_conversations(&store, limit, search, delete).await?;
        }

        Commands::Status => {
            let config = gravity::config::load()?;
            run_status(&config).await?;
        }
    }

    Ok(())
}

fn build_shared(config: &Config) -> Result<(Arc<ModelOrchestrator>, Arc<ToolRegistry>)> {
    let orchestrator = ModelOrchestrator::from_config(config).context("Failed to set up providers")?;
    let tools = ToolRegistry::with_defaults(&config.tools).context("Failed to set up tools")?;
    Ok((Arc::new(orchestrator), Arc::new(tools)))
}

async fn run_chat(
    config: &Config,
    message: Option<String>,
    session: String,
    model: Option<String>,
    resume: bool,
) -> Result<()> {
    let (orchestrator, tools) = build_shared(config)?;
    let store: Arc<dyn ConversationStore> = Arc::new(FileConversationStore::open(config.store_path()).await?);

    let agent = Agent::new(orchestrator.clone(), tools, config.max_iterations);
    let mut channel = CliChannel::new(agent, store, session).with_model(model.clone());

    if resume {
        let restored = channel.resume().await?;
        if restored > 0 {
            ui::print_step(&format!("Resumed {} message(s)", restored));
        }
    }

    if let Some(msg) = message {
        // Single message mode; a failed turn has already been printed
        if channel.run_once(&msg).await.is_err() {
            orchestrator.close();
            std::process::exit(1);
        }
    } else {
        // Interactive mode
        let model = model.unwrap_or_else(|| config.default_model.clone());
        ui::print_header(&model, &config.providers.join(" → "));
        println!("  Type 'exit' to quit, '/clear' to reset the conversation.");
        channel.run_interactive().await?;
    }

    orchestrator.close();
    Ok(())
}

async fn run_gateway(config: &Config, addr: &str) -> Result<()> {
    let (orchestrator, tools) = build_shared(config)?;
    let store: Arc<dyn ConversationStore> = Arc::new(FileConversationStore::open(config.store_path()).await?);
    let gateway = WebSocketGateway::new(orchestrator.clone(), tools, store, config.max_iterations);

    ui::print_success(&format!("Gateway listening on ws://{}", addr));
    tokio::select! {
        result = gateway.serve(addr) => result?,
        _ = tokio::signal::ctrl_c() => {
            println!("\n👋 Bye!");
        }
    }

    orchestrator.close();
    Ok(())
}

async fn run_conversations(
    store: &FileConversationStore,
    limit: usize,
    search: Option<String>,
    delete: Option<String>,
) -> Result<()> {
    if let Some(id) = delete {
        if store.delete_conversation(&id).await? {
            ui::print_success(&format!("Deleted conversation {}", id));
        } else {
            ui::print_warning(&format!("No conversation {}", id));
        }
        return Ok(());
    }

    if let Some(query) = search {
        let hits = store.search_messages(&query, limit).await?;
        if hits.is_empty() {
            ui::print_warning(&format!("No messages match '{}'", query));
        }
        for hit in hits {
            println!(
                "  {} {} {}: {}",
                hit.timestamp.format("%Y-%m-%d %H:%M").to_string().dimmed(),
                hit.conversation_id.cyan(),
                hit.role,
                truncate(&hit.content, 120).replace('\n', " ")
            );
        }
        return Ok(());
    }

    let conversations = store.list_conversations(limit).await?;
    if conversations.is_empty() {
        ui::print_step("No conversations yet");
    }
    for c in conversations {
        let title = if c.title.is_empty() { "(untitled)" } else { c.title.as_str() };
        println!(
            "  {} {} {} {}",
            c.updated_at.format("%Y-%m-%d %H:%M").to_string().dimmed(),
            c.id.cyan(),
            title,
            format!("[{} messages]", c.message_count).dimmed()
        );
    }
    Ok(())
}

async fn run_status(config: &Config) -> Result<()> {
    println!("{}\n", "Gravity Status".magenta().bold());
    println!("Config: {:?}", gravity::config::config_path());
    println!("Data dir: {:?}", config.data_dir);
    println!("Default model: {}", config.default_model);
    println!("Max iterations: {}", config.max_iterations);
    println!(
        "Groq API key: {}",
        if config.groq_api_key.is_empty() { "not set" } else { "✓" }
    );

    let orchestrator = ModelOrchestrator::from_config(config)?;
    println!("\nProviders (in fallback order):");
    for (provider, available) in orchestrator.provider_status().await {
        let state = if available { "available".green() } else { "unavailable".red() };
        println!("  {} {}", provider, state);
    }
    orchestrator.close();

    let tools = ToolRegistry::with_defaults(&config.tools)?;
    println!("\nTools: {}", tools.tool_names().join(", "));

    println!("\nChannels:");
    for name in ChannelRegistry::available() {
        println!("  {} - {}", name, ChannelRegistry::description(name));
    }
    Ok(())
}
