//! mcpgate - MCP client runtime and SSRF-hardened proxy
//!
#![doc = "Main entry point for the mcpgate binary."]

use std::time::Duration;

use anyhow::Result;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use mcpgate::cli::{Cli, Commands, LogFormat};
use mcpgate::config::Config;
use mcpgate::manager::{ConnectionState, ServerDescriptor};
use mcpgate::network::gate::NetworkGate;
use mcpgate::network::policy::NetworkPolicy;
use mcpgate::server::{self, AppState};
use mcpgate::vault::{self, TokenVault};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse_args();

    init_tracing(cli.verbose, cli.log_format);

    let config_path = cli.config.as_deref().unwrap_or("config/config.yaml");
    let config = Config::load(config_path, &cli)?;
    config.validate()?;

    match cli.command {
        Commands::Serve { .. } => {
            // The server vault is keyed by an external secret; missing it is fatal.
            let token_vault = TokenVault::from_env()?;
            let state = AppState::from_config(&config, token_vault, vault::local_identity())?;
            server::serve(&config, state).await
        }
        Commands::Validate { url } => {
            let gate = NetworkGate::new(NetworkPolicy::from_config(&config.network)?)?;
            match gate.validate(&url).await {
                Ok(sanitized) => {
                    println!("{}", sanitized);
                    Ok(())
                }
                Err(reason) => {
                    eprintln!("Invalid server URI: {}", reason);
                    std::process::exit(1);
                }
            }
        }
        Commands::Connect {
            url,
            uti,
            transport,
            provider,
            wait_secs,
        } => {
            // Same key and identity as `serve` when the secret is set.
            let state = AppState::from_config(
                &config,
                TokenVault::from_env_or_client(),
                vault::local_identity(),
            )?;
            let mut descriptor = ServerDescriptor::new(uti.clone(), url).with_transport(transport);
            if let Some(provider) = provider {
                descriptor = descriptor.with_auth_provider(provider);
            }

            let mut status = state.manager.connect(descriptor).await;
            println!("{}", serde_json::to_string_pretty(&status)?);

            if status.state == ConnectionState::Authenticate {
                match state.manager.authorization_url(&uti).await {
                    Ok(url) if wait_secs == 0 => println!("Authorize at: {}", url),
                    Ok(url) => {
                        // Listen before handing out the URL so the redirect cannot race us.
                        let (listener, path) =
                            server::bind_callback(&config.oauth.redirect_uri).await?;
                        println!("Authorize at: {}", url);
                        eprintln!(
                            "Waiting up to {}s for the authorization callback on {}",
                            wait_secs, config.oauth.redirect_uri
                        );
                        status = server::await_callback(
                            listener,
                            &path,
                            state.manager.clone(),
                            &uti,
                            Duration::from_secs(wait_secs),
                        )
                        .await?;
                        println!("{}", serde_json::to_string_pretty(&status)?);
                    }
                    Err(e) => tracing::warn!("Could not build authorization URL: {}", e),
                }
            }

            if status.is_success() {
                let summary = state.manager.get_structured_json(&uti).await?;
                println!("{}", serde_json::to_string_pretty(&summary)?);
            }

            state.manager.close_all().await?;
            if status.state == ConnectionState::Error {
                std::process::exit(1);
            }
            Ok(())
        }
    }
}

/// Initialize tracing subscriber with environment filter
fn init_tracing(verbose: bool, format: LogFormat) {
    let default = if verbose { "mcpgate=debug" } else { "mcpgate=info" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    let registry = tracing_subscriber::registry().with(env_filter);
    match format {
        LogFormat::Text => registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init(),
        LogFormat::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .init(),
    }
}
