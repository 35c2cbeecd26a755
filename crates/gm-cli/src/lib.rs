#![forbid(unsafe_code)]

//! Command-line front end over the request handlers.

use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use gm_expr::ValidationResult;
use gm_io::write_csv_string;
use gm_runtime::AppConfig;
use gm_web::{AppState, RenderParams, ValidateParams, filtered_view, render, validate};
use tracing::debug;

/// Exit status of `validate` for a rejected expression.
pub const EXIT_INVALID: u8 = 2;

#[derive(Debug, Parser)]
#[command(name = "gmview-cli")]
#[command(about = "Explore ground-motion readings with filter expressions", long_about = None)]
pub struct Cli {
    /// YAML configuration file. Relative paths inside it resolve against its directory.
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// Measurement data (.csv or .parquet), overriding the configuration.
    #[arg(long)]
    pub dataset: Option<PathBuf>,
    /// Whitespace-delimited station location file, overriding the configuration.
    #[arg(long)]
    pub locations: Option<PathBuf>,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Select an intensity measure, apply a query, and print the result.
    Render {
        #[arg(long)]
        measure: Option<String>,
        #[arg(long)]
        query: Option<String>,
        #[arg(long, value_enum, default_value_t = Format::Html)]
        format: Format,
    },
    /// Check a query against the dataset schema. Exits 2 when it is rejected.
    Validate {
        #[arg(long)]
        query: String,
    },
    /// List columns and their types.
    Schema,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Format {
    /// Page body fragment.
    Html,
    /// Filtered rows.
    Csv,
    /// The render result as JSON.
    Json,
}

impl Cli {
    /// Configuration from the file (or instance defaults), then `GMVIEW_*`
    /// variables, then command-line paths.
    pub fn app_config(&self) -> anyhow::Result<AppConfig> {
        let config = match &self.config {
            Some(path) => AppConfig::load(path)
                .with_context(|| format!("loading configuration {}", path.display()))?,
            None => AppConfig::default(),
        };
        let mut config = config.with_env_overrides()?;
        if let Some(path) = &self.dataset {
            config = config.with_dataset_path(path);
        }
        if let Some(path) = &self.locations {
            config = config.with_locations_path(path);
        }
        config.validate()?;
        Ok(config)
    }
}

pub fn run(cli: Cli, out: &mut impl Write) -> anyhow::Result<ExitCode> {
    let config = cli.app_config()?;
    debug!(?config, "configuration resolved");
    let state = AppState::open(config).context("loading dataset")?;

    match cli.command {
        Command::Render {
            measure,
            query,
            format,
        } => {
            let params = RenderParams {
                intensity_measure: measure,
                query,
            };
            match format {
                Format::Html => writeln!(out, "{}", render(&state, params).to_html())?,
                Format::Json => {
                    let page = render(&state, params);
                    writeln!(out, "{}", serde_json::to_string_pretty(&page)?)?;
                }
                Format::Csv => {
                    let view = filtered_view(&state, &params);
                    if let Some(err) = &view.filter_error {
                        eprintln!("filter ignored: {err}");
                    }
                    write!(out, "{}", write_csv_string(&view.table)?)?;
                }
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::Validate { query } => {
            let response = validate(&state, ValidateParams { query: Some(query) });
            match response.result {
                ValidationResult::Valid => Ok(ExitCode::SUCCESS),
                ValidationResult::Invalid { .. } => {
                    writeln!(out, "{}", response.body)?;
                    Ok(ExitCode::from(EXIT_INVALID))
                }
            }
        }
        Command::Schema => {
            let schema = state.schema();
            for (name, column_type) in schema.columns() {
                match schema.categories(name) {
                    Some(categories) => {
                        writeln!(out, "{name}\t{column_type}\t{}", categories.join(", "))?;
                    }
                    None => writeln!(out, "{name}\t{column_type}")?,
                }
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}
