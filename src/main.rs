use clap::{ArgAction, Parser, Subcommand};
use owo_colors::OwoColorize;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use sitecraft::config::{ConfigError, CoreConfig};
use sitecraft::display::FriendlyRenderer;
use sitecraft::error::{NativeError, RawError, SerializedError, StructuredError};
use sitecraft::logging::init_logging;
use sitecraft::translate::{Environment, ErrorTranslator, FriendlyError, TranslateOptions};

#[derive(Parser, Debug)]
#[command(name = "sitecraft")]
#[command(version)]
#[command(about = "Inspect error translation and retry policies of the Sitecraft core")]
struct Cli {
    /// Increase verbosity (-v, -vv)
    #[arg(long, short, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Disable colors (also respects NO_COLOR environment variable)
    #[arg(long, global = true)]
    no_color: bool,

    /// Configuration file
    #[arg(long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Translate an error message into the text a user would see
    Explain {
        /// The raw error message
        message: String,

        /// Explicit error code (otherwise inferred from the message)
        #[arg(long)]
        code: Option<String>,

        /// Channel the error came from
        #[arg(long)]
        channel: Option<String>,

        /// Include stack traces in the technical message
        #[arg(long)]
        development: bool,

        /// Print the friendly error as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show the effective retry policy of a channel as JSON
    Policy {
        /// Channel name
        channel: String,
    },

    /// Validate a serialized error file and show its translation
    Inspect {
        /// JSON file holding one serialized error
        file: PathBuf,

        /// Include stack traces in the technical message
        #[arg(long)]
        development: bool,

        /// Print the friendly error as JSON
        #[arg(long)]
        json: bool,
    },
}

/// Exit codes for the CLI
mod exit_codes {
    use std::process::ExitCode;

    /// The input could not be read or failed validation
    pub fn invalid_input() -> ExitCode {
        ExitCode::from(2)
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PolicyReport<'a> {
    channel: &'a str,
    blacklisted: bool,
    max_attempts: u32,
    base_delay_ms: u64,
    max_delay_ms: u64,
    retryable_error_codes: Vec<String>,
}

fn load_config(path: Option<&Path>) -> Result<CoreConfig, ConfigError> {
    match path {
        Some(path) => CoreConfig::load(path),
        None => Ok(CoreConfig::default()),
    }
}

fn translator(config: &CoreConfig, development: bool) -> ErrorTranslator {
    let mut translator_config = config.translator.to_translator_config();
    if development {
        translator_config.environment = Environment::Development;
    }
    ErrorTranslator::new(translator_config)
}

fn print_friendly(friendly: &FriendlyError, json: bool, use_color: bool) -> Result<(), serde_json::Error> {
    if json {
        println!("{}", serde_json::to_string_pretty(friendly)?);
    } else {
        print!("{}", FriendlyRenderer::new().with_color(use_color).render(friendly));
    }
    Ok(())
}

fn report_invalid(use_color: bool, message: &str) {
    if use_color {
        eprintln!("{}: {}", "invalid".red().bold(), message);
    } else {
        eprintln!("invalid: {}", message);
    }
}

fn report_error(use_color: bool, err: &dyn std::error::Error) {
    if use_color {
        eprintln!("{}: {}", "error".red().bold(), err);
    } else {
        eprintln!("error: {}", err);
    }
}

fn run(
    command: Commands,
    config: &CoreConfig,
    use_color: bool,
) -> Result<ExitCode, Box<dyn std::error::Error>> {
    match command {
        Commands::Explain {
            message,
            code,
            channel,
            development,
            json,
        } => {
            let mut native = NativeError::new(message);
            if let Some(code) = code {
                native = native.with_code(code);
            }
            let mut options = TranslateOptions::new();
            if let Some(channel) = channel {
                options = options.channel(channel);
            }
            let friendly =
                translator(config, development).translate_raw(RawError::Native(native), &options);
            print_friendly(&friendly, json, use_color)?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Policy { channel } => {
            let registry = config.retry.to_registry();
            let effective = registry.effective(&channel);
            let report = PolicyReport {
                channel: &channel,
                blacklisted: registry.is_blacklisted(&channel),
                max_attempts: effective.attempt_limit(),
                base_delay_ms: effective.base_delay.as_millis() as u64,
                max_delay_ms: effective.max_delay.as_millis() as u64,
                retryable_error_codes: effective.retryable_error_codes.into_iter().collect(),
            };
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(ExitCode::SUCCESS)
        }
        Commands::Inspect {
            file,
            development,
            json,
        } => {
            let text = std::fs::read_to_string(&file)?;
            let value: serde_json::Value = match serde_json::from_str(&text) {
                Ok(value) => value,
                Err(err) => {
                    report_invalid(use_color, &format!("{} is not valid JSON: {}", file.display(), err));
                    return Ok(exit_codes::invalid_input());
                }
            };
            let record = match SerializedError::validate(&value) {
                Ok(record) => record,
                Err(err) => {
                    report_invalid(use_color, &format!("{}: {}", file.display(), err));
                    return Ok(exit_codes::invalid_input());
                }
            };
            tracing::debug!(code = %record.code, "serialized error is valid");
            let error = StructuredError::from_serialized(record);
            let friendly =
                translator(config, development).translate(&error, &TranslateOptions::new());
            print_friendly(&friendly, json, use_color)?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let use_color = !cli.no_color && std::env::var("NO_COLOR").is_err();

    let config = match load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(err) => {
            report_error(use_color, &err);
            return ExitCode::FAILURE;
        }
    };

    if let Err(err) = init_logging(&config.logging.clone().with_verbosity(cli.verbose)) {
        report_error(use_color, &err);
    }

    match run(cli.command, &config, use_color) {
        Ok(code) => code,
        Err(err) => {
            report_error(use_color, err.as_ref());
            ExitCode::FAILURE
        }
    }
}
