use clap::{Parser, Subcommand};

use crate::llm::{OptionValue, Options, MODEL_OPTION};

#[derive(Parser)]
#[command(name = "promptgate")]
#[command(author = "Promptgate Team")]
#[command(version)]
#[command(about = "Send prompts to OpenAI, Anthropic or any JSON LLM endpoint", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Dispatch a prompt to a provider
    Ask {
        /// Provider id from the configuration (e.g. openai, anthropic, deepseek)
        #[arg(required = true)]
        provider: String,

        /// The prompt to send
        #[arg(required = true)]
        prompt: String,

        /// Override the provider's default model
        #[arg(short, long)]
        model: Option<String>,

        /// Sampling temperature
        #[arg(short, long)]
        temperature: Option<f64>,

        /// Maximum completion tokens
        #[arg(long)]
        max_tokens: Option<u32>,

        /// Extra provider option as key=value (repeatable)
        #[arg(short = 'o', long = "option", value_parser = parse_key_value)]
        options: Vec<(String, String)>,

        /// Print the normalized response as JSON
        #[arg(long)]
        json: bool,

        /// Print usage and dispatch metrics afterwards
        #[arg(long)]
        stats: bool,
    },

    /// List configured providers
    Providers,

    /// Show current configuration
    Config,
}

fn parse_key_value(raw: &str) -> Result<(String, String), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{}'", raw))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty option key in '{}'", raw));
    }
    Ok((key.to_string(), value.trim().to_string()))
}

/// Collect the `ask` flags into request options. Explicit flags win over `-o`.
pub fn build_options(
    model: Option<String>,
    temperature: Option<f64>,
    max_tokens: Option<u32>,
    extra: Vec<(String, String)>,
) -> Options {
    let mut options: Options = extra
        .into_iter()
        .map(|(k, v)| (k, OptionValue::parse(&v)))
        .collect();

    if let Some(model) = model {
        options.insert(MODEL_OPTION.to_string(), OptionValue::Str(model));
    }
    if let Some(t) = temperature {
        options.insert("temperature".to_string(), OptionValue::Float(t));
    }
    if let Some(n) = max_tokens {
        options.insert("max_tokens".to_string(), OptionValue::from(n));
    }
    options
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_ask() {
        let cli = Cli::try_parse_from([
            "promptgate",
            "ask",
            "openai",
            "Explain caching",
            "--temperature",
            "0.7",
            "-o",
            "top_p=0.9",
            "--stats",
        ])
        .unwrap();

        match cli.command {
            Commands::Ask {
                provider,
                prompt,
                temperature,
                options,
                stats,
                ..
            } => {
                assert_eq!(provider, "openai");
                assert_eq!(prompt, "Explain caching");
                assert_eq!(temperature, Some(0.7));
                assert_eq!(options, vec![("top_p".to_string(), "0.9".to_string())]);
                assert!(stats);
            }
            _ => panic!("expected ask"),
        }
    }

    #[test]
    fn test_bad_option_is_rejected() {
        assert!(Cli::try_parse_from(["promptgate", "ask", "openai", "hi", "-o", "novalue"]).is_err());
    }

    #[test]
    fn test_build_options_flags_override_extras() {
        let options = build_options(
            Some("gpt-4o-mini".into()),
            Some(0.2),
            Some(256),
            vec![
                ("temperature".into(), "1.0".into()),
                ("seed".into(), "42".into()),
            ],
        );

        assert_eq!(options["model"], OptionValue::Str("gpt-4o-mini".into()));
        assert_eq!(options["temperature"], OptionValue::Float(0.2));
        assert_eq!(options["max_tokens"], OptionValue::Int(256));
        assert_eq!(options["seed"], OptionValue::Int(42));
    }
}
