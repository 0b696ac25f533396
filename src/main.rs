use anyhow::Result;
use clap::Parser;
use std::sync::Arc;

use promptgate::cli::{build_options, Cli, Commands};
use promptgate::config::Settings;
use promptgate::core::{telemetry, EnvSecretStore, Metrics};
use promptgate::llm::{DispatcherBuilder, MemoryUsageSink};
use promptgate::ui::Console;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    telemetry::init_tracing(if cli.verbose {
        "promptgate=debug"
    } else {
        "promptgate=info"
    });

    let settings = Settings::load()?;
    let secrets = EnvSecretStore::new();
    let console = Console::new();

    match cli.command {
        Commands::Ask {
            provider,
            prompt,
            model,
            temperature,
            max_tokens,
            options,
            json,
            stats,
        } => {
            let metrics = Arc::new(Metrics::new());
            let usage = Arc::new(MemoryUsageSink::new());
            let dispatcher = DispatcherBuilder::from_settings(&settings, &secrets)?
                .metrics(metrics.clone())
                .usage_sink(usage.clone())
                .build();

            if dispatcher.providers().is_empty() {
                console.warn("No providers are usable; set an API key (see `promptgate providers`)");
            }

            let options = build_options(model, temperature, max_tokens, options);
            let outcome = dispatcher.dispatch(&provider, &prompt, options).await;
            dispatcher.flush_usage();
            let response = match outcome {
                Ok(response) => response,
                Err(e) => {
                    console.error(&e.to_string());
                    std::process::exit(1);
                }
            };

            if json {
                println!("{}", serde_json::to_string_pretty(&response)?);
            } else {
                console.response(&response);
            }

            if stats {
                console.stats(&usage.summary(), &metrics.summary());
            }
        }
        Commands::Providers => {
            console.list_providers(&settings, &secrets);
        }
        Commands::Config => {
            console.show_config(&settings);
            console.success("Configuration loaded");
        }
    }

    Ok(())
}
