#![warn(clippy::all, clippy::pedantic)]
#![allow(
    clippy::assigning_clones,
    clippy::doc_markdown,
    clippy::items_after_statements,
    clippy::map_unwrap_or,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::module_name_repetitions,
    clippy::needless_pass_by_value,
    clippy::too_many_lines,
    clippy::uninlined_format_args,
    dead_code
)]

use anyhow::{bail, Context, Result};
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use nftgate::config::Config;
use std::io::Write;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum CompletionShell {
    #[value(name = "bash")]
    Bash,
    #[value(name = "fish")]
    Fish,
    #[value(name = "zsh")]
    Zsh,
    #[value(name = "powershell")]
    PowerShell,
    #[value(name = "elvish")]
    Elvish,
}

/// `nftgate` - NFT-gated chat gateway.
#[derive(Parser, Debug)]
#[command(name = "nftgate")]
#[command(version)]
#[command(about = "Wallet-signature access gate in front of a tool-using chat agent.", long_about = None)]
struct Cli {
    /// Directory holding config.toml (default: ~/.nftgate)
    #[arg(long, global = true)]
    config_dir: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the HTTP gateway
    #[command(long_about = "\
Start the HTTP gateway.

Serves the login page, the signature-checking /auth route, the chat \
page and the /api relay. Bind address defaults to the values in your \
config file (gateway.host / gateway.port).

Examples:
  nftgate serve                  # use config defaults
  nftgate serve -p 8080          # listen on port 8080
  nftgate serve --host 0.0.0.0   # bind to all interfaces")]
    Serve {
        /// Port to listen on; defaults to config gateway.port
        #[arg(short, long)]
        port: Option<u16>,

        /// Host to bind to; defaults to config gateway.host
        #[arg(long)]
        host: Option<String>,
    },

    /// Show effective configuration and which integrations are enabled
    Status,

    /// Manage configuration
    #[command(long_about = "\
Manage nftgate configuration.

Use 'schema' to dump the full JSON Schema for the config file, which \
documents every available key, type, and default value.

Examples:
  nftgate config schema              # print JSON Schema to stdout
  nftgate config schema > schema.json")]
    Config {
        #[command(subcommand)]
        config_command: ConfigCommands,
    },

    /// Generate shell completion script to stdout
    #[command(long_about = "\
Generate shell completion scripts for `nftgate`.

Examples:
  source <(nftgate completions bash)
  nftgate completions zsh > ~/.zfunc/_nftgate")]
    Completions {
        /// Target shell
        #[arg(value_enum)]
        shell: CompletionShell,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigCommands {
    /// Dump the full configuration JSON Schema to stdout
    Schema,
}

fn configured(value: Option<&str>) -> &'static str {
    if value.is_some_and(|v| !v.trim().is_empty()) {
        "set"
    } else {
        "missing"
    }
}

fn print_status(config: &Config) {
    println!("nftgate status");
    println!();
    println!("Version:     {}", env!("CARGO_PKG_VERSION"));
    println!("Config:      {}", config.config_path.display());
    println!();
    println!("Provider:    {} ({})", config.provider.name, config.provider.model);
    println!("  API key:         {}", configured(config.provider.api_key.as_deref()));
    println!("  Temperature:     {}", config.provider.temperature);
    println!("  Max iterations:  {}", config.agent.max_iterations);
    println!();
    println!("Chain:");
    println!(
        "  RPC endpoint:    {}",
        config
            .chain
            .resolved_rpc_url()
            .map_or_else(|| "missing".to_string(), |u| nftgate::providers::scrub_secret_patterns(&u))
    );
    println!("  Contract:        {}", config.chain.contract_address);
    println!("  Challenge:       {:?}", config.chain.challenge);
    println!();
    println!("Gateway:     {}:{}", config.gateway.host, config.gateway.port);
    println!(
        "  Sessions:        {}",
        if config.session.validate_tokens {
            format!("validated (idle timeout {}s)", config.session.idle_timeout_secs)
        } else {
            "presence-only".to_string()
        }
    );
    println!("  Memory scope:    {}", config.memory.scope);
    println!();
    println!("Tools:");
    let tools = nftgate::tools::build_tools(&config.tools);
    if tools.is_empty() {
        println!("  (none enabled)");
    }
    for tool in &tools {
        println!("  {}", tool.name());
    }
    let missing = config.forum.missing_fields();
    if missing.is_empty() {
        println!("  Forum credentials: complete");
    } else {
        println!("  Forum credentials: missing {}", missing.join(", "));
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Install default crypto provider for Rustls TLS.
    if let Err(e) = rustls::crypto::ring::default_provider().install_default() {
        eprintln!("Warning: Failed to install default crypto provider: {e:?}");
    }

    let cli = Cli::parse();

    if let Some(config_dir) = &cli.config_dir {
        if config_dir.trim().is_empty() {
            bail!("--config-dir cannot be empty");
        }
        std::env::set_var("NFTGATE_CONFIG_DIR", config_dir);
    }

    // Completions must remain stdout-only and should not load config or initialize logging.
    if let Commands::Completions { shell } = &cli.command {
        let mut stdout = std::io::stdout().lock();
        write_shell_completion(*shell, &mut stdout)?;
        return Ok(());
    }

    // Initialize logging - respects RUST_LOG env var, defaults to INFO
    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("setting default subscriber failed")?;

    let config = Config::load_or_init().await?;

    match cli.command {
        Commands::Completions { .. } => Ok(()),

        Commands::Serve { port, host } => {
            let port = port.unwrap_or(config.gateway.port);
            let host = host.unwrap_or_else(|| config.gateway.host.clone());
            info!("Starting nftgate on {host}:{port}");
            nftgate::gateway::run_gateway(&host, port, config).await
        }

        Commands::Status => {
            print_status(&config);
            Ok(())
        }

        Commands::Config { config_command } => match config_command {
            ConfigCommands::Schema => {
                let schema = schemars::schema_for!(Config);
                println!(
                    "{}",
                    serde_json::to_string_pretty(&schema).context("failed to serialize JSON Schema")?
                );
                Ok(())
            }
        },
    }
}

fn write_shell_completion<W: Write>(shell: CompletionShell, writer: &mut W) -> Result<()> {
    use clap_complete::generate;
    use clap_complete::shells;

    let mut cmd = Cli::command();
    let bin_name = cmd.get_name().to_string();

    match shell {
        CompletionShell::Bash => generate(shells::Bash, &mut cmd, bin_name.clone(), writer),
        CompletionShell::Fish => generate(shells::Fish, &mut cmd, bin_name.clone(), writer),
        CompletionShell::Zsh => generate(shells::Zsh, &mut cmd, bin_name.clone(), writer),
        CompletionShell::PowerShell => {
            generate(shells::PowerShell, &mut cmd, bin_name.clone(), writer);
        }
        CompletionShell::Elvish => generate(shells::Elvish, &mut cmd, bin_name, writer),
    }

    writer.flush()?;
    Ok(())
}
