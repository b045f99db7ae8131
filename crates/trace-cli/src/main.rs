use std::{
    fs,
    path::{Path, PathBuf},
    sync::OnceLock,
};

use anyhow::{bail, Context, Result};
use bruno_trace_core::{
    config::Config,
    environment::{self, Environment, ExportDocument, ExportOptions},
};
use bruno_trace_plugin_sdk::{RequestDescriptor, ResponseDescriptor};
use clap::{Parser, Subcommand};
use regex::Regex;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "bruno-trace", author, version, about = "Trace plugin and environment tooling")]
struct Cli {
    /// Sets the log level (error, warn, info, debug, trace).
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    /// Configuration file; built-in defaults are used when omitted.
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Inspect registered trace plugins.
    Plugins {
        #[command(subcommand)]
        command: PluginCommands,
    },
    /// Print a request with a plugin's trace configuration applied.
    Apply {
        /// Plugin id; defaults to `trace.default_plugin`.
        #[arg(short, long, value_name = "ID")]
        plugin: Option<String>,
        #[arg(long, value_name = "URL")]
        url: String,
        /// Existing request header, repeatable.
        #[arg(long = "header", value_name = "NAME:VALUE")]
        headers: Vec<String>,
    },
    /// Run a plugin's response transformer over a captured response file.
    Transform {
        #[arg(short, long, value_name = "ID")]
        plugin: Option<String>,
        #[arg(value_name = "RESPONSE_JSON")]
        response: PathBuf,
    },
    /// Export and import environment files.
    Env {
        #[command(subcommand)]
        command: EnvCommands,
    },
    /// Interact with configuration files.
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand, Debug)]
enum PluginCommands {
    /// Lists plugins in registration order.
    List,
    /// Prints one plugin's manifest as JSON.
    Show {
        #[arg(value_name = "ID")]
        id: String,
    },
}

#[derive(Subcommand, Debug)]
enum EnvCommands {
    /// Writes a portable export of one environment or a list of environments.
    Export {
        #[arg(value_name = "ENVIRONMENTS_JSON")]
        input: PathBuf,
        #[arg(short, long, value_name = "FILE")]
        output: PathBuf,
        /// Keep secret values in the export.
        #[arg(long)]
        include_secrets: bool,
    },
    /// Normalizes an environment file and prints the result.
    Import {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigCommands {
    /// Validates the provided configuration file.
    Validate {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
    /// Prints the bundled example configuration.
    Example,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level)?;
    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => Config::default(),
    };
    match cli.command {
        Commands::Plugins { command } => handle_plugins(&config, command),
        Commands::Apply {
            plugin,
            url,
            headers,
        } => handle_apply(&config, plugin, url, headers),
        Commands::Transform { plugin, response } => handle_transform(&config, plugin, &response),
        Commands::Env { command } => handle_env(&config, command),
        Commands::Config { command } => handle_config(command),
    }
}

fn init_tracing(level: &str) -> Result<()> {
    let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));
    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .ok();
    Ok(())
}

fn handle_plugins(config: &Config, command: PluginCommands) -> Result<()> {
    let registry = config.build_registry()?;
    tracing::info!(plugins = registry.len(), "registry ready");
    match command {
        PluginCommands::List => {
            if registry.is_empty() {
                println!("no trace plugins registered");
            }
            for plugin in registry.all() {
                let manifest = &plugin.manifest;
                println!(
                    "- {} ({}){}{}",
                    manifest.name,
                    manifest.id,
                    manifest
                        .version
                        .as_ref()
                        .map(|v| format!(" v{v}"))
                        .unwrap_or_default(),
                    manifest
                        .description
                        .as_ref()
                        .map(|d| format!(": {d}"))
                        .unwrap_or_default()
                );
            }
        }
        PluginCommands::Show { id } => {
            let plugin = registry
                .get(&id)
                .with_context(|| format!("no trace plugin registered as `{id}`"))?;
            println!("{}", serde_json::to_string_pretty(&plugin.manifest)?);
        }
    }
    Ok(())
}

fn handle_apply(
    config: &Config,
    plugin: Option<String>,
    url: String,
    headers: Vec<String>,
) -> Result<()> {
    let plugin = resolve_plugin(config, plugin)?;
    let mut request = RequestDescriptor::new(url);
    for raw in &headers {
        let (name, value) = parse_header(raw)?;
        request = request.with_header(name, value);
    }
    let registry = config.build_registry()?;
    let augmented = registry.apply_trace_config(&plugin, &request);
    println!("{}", serde_json::to_string_pretty(&augmented)?);
    Ok(())
}

fn handle_transform(config: &Config, plugin: Option<String>, path: &Path) -> Result<()> {
    let plugin = resolve_plugin(config, plugin)?;
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read response file {}", path.display()))?;
    let response: ResponseDescriptor = serde_json::from_str(&raw)
        .with_context(|| format!("failed to parse {}", path.display()))?;
    let registry = config.build_registry()?;
    let display = registry.transform_response(&plugin, &response).into_response();
    println!("{}", serde_json::to_string_pretty(&display)?);
    Ok(())
}

fn handle_env(config: &Config, command: EnvCommands) -> Result<()> {
    match command {
        EnvCommands::Export {
            input,
            output,
            include_secrets,
        } => {
            let environments = read_environments(&input)?;
            let mut options = config.export_options();
            options.include_secrets |= include_secrets;
            let document = export_document(&environments, options);
            environment::write_export(&output, &document)?;
            tracing::info!(
                environments = environments.len(),
                output = %output.display(),
                include_secrets = options.include_secrets,
                "environment export written"
            );
            println!(
                "exported {} environment(s) to {}",
                environments.len(),
                output.display()
            );
        }
        EnvCommands::Import { file } => {
            let report = environment::read_import(&file)?;
            for rejected in &report.rejected {
                eprintln!("skipped entry {}: {}", rejected.index, rejected.reason);
            }
            println!("{}", serde_json::to_string_pretty(&report.environments)?);
        }
    }
    Ok(())
}

fn handle_config(command: ConfigCommands) -> Result<()> {
    match command {
        ConfigCommands::Validate { file } => {
            let cfg = load_config(&file)?;
            cfg.validate()?;
            println!("configuration OK: {}", file.display());
        }
        ConfigCommands::Example => {
            println!(
                "{}",
                include_str!("../../../config/bruno-trace.example.toml")
            );
        }
    }
    Ok(())
}

fn resolve_plugin(config: &Config, plugin: Option<String>) -> Result<String> {
    match plugin.or_else(|| config.trace.default_plugin.clone()) {
        Some(id) => Ok(id),
        None => bail!("no plugin given; pass --plugin or set trace.default_plugin"),
    }
}

fn parse_header(raw: &str) -> Result<(&str, &str)> {
    let (name, value) = raw
        .split_once(':')
        .with_context(|| format!("header `{raw}` must look like NAME:VALUE"))?;
    let name = name.trim();
    if name.is_empty() {
        bail!("header `{raw}` has an empty name");
    }
    Ok((name, value.trim()))
}

fn read_environments(path: &Path) -> Result<Vec<Environment>> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read environments file {}", path.display()))?;
    let value: serde_json::Value = serde_json::from_str(&raw)
        .with_context(|| format!("failed to parse {}", path.display()))?;
    let environments: Vec<Environment> = if value.is_array() {
        serde_json::from_value(value)?
    } else {
        vec![serde_json::from_value(value)?]
    };
    Ok(environments)
}

fn export_document(environments: &[Environment], options: ExportOptions) -> ExportDocument {
    match environments {
        [single] => environment::export_environment(single, options),
        many => environment::export_environments(many, options),
    }
}

fn load_config(path: &Path) -> Result<Config> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    let expanded = interpolate_env(&raw)?;
    let cfg = toml::from_str::<Config>(&expanded)
        .with_context(|| format!("failed to parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("invalid configuration in {}", path.display()))?;
    Ok(cfg)
}

fn interpolate_env(input: &str) -> Result<String> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let regex = RE.get_or_init(|| Regex::new(r"\$\{([A-Z0-9_]+)(?::([^}]+))?\}").unwrap());
    let result = regex.replace_all(input, |caps: &regex::Captures| {
        let key = &caps[1];
        let default = caps.get(2).map(|m| m.as_str()).unwrap_or("");
        std::env::var(key).unwrap_or_else(|_| default.to_string())
    });
    Ok(result.into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn headers_split_on_first_colon() {
        assert_eq!(parse_header("Accept: text/plain").unwrap(), ("Accept", "text/plain"));
        assert_eq!(parse_header("X-Time:12:30").unwrap(), ("X-Time", "12:30"));
        assert!(parse_header("novalue").is_err());
        assert!(parse_header(" :v").is_err());
    }

    #[test]
    fn interpolation_falls_back_to_default() {
        let out = interpolate_env("dir = \"${BRUNO_TRACE_TEST_UNSET_VAR:plugins}\"").unwrap();
        assert_eq!(out, "dir = \"plugins\"");
    }

    #[test]
    fn example_config_parses_and_validates() {
        let expanded = interpolate_env(include_str!("../../../config/bruno-trace.example.toml")).unwrap();
        let cfg: Config = toml::from_str(&expanded).unwrap();
        cfg.validate().unwrap();
        assert_eq!(cfg.trace.default_plugin.as_deref(), Some("BFF_debug"));
    }

    #[test]
    fn environments_without_uids_can_be_exported() {
        let dir = tempfile::TempDir::new().unwrap();
        let input = dir.path().join("env.json");
        fs::write(&input, r#"{"name":"A","variables":[{"name":"x","value":"1"}]}"#).unwrap();

        let environments = read_environments(&input).unwrap();
        assert_eq!(environments.len(), 1);
        assert!(!environments[0].variables[0].uid.is_empty());

        let output = dir.path().join("out.json");
        let document = export_document(&environments, ExportOptions::default());
        environment::write_export(&output, &document).unwrap();
        let written: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&output).unwrap()).unwrap();
        assert_eq!(written["type"], "environment");
        assert_eq!(written["variables"][0]["value"], "1");

        fs::write(&input, r#"[{"name":"A"},{"name":"B","variables":[]}]"#).unwrap();
        let many = read_environments(&input).unwrap();
        let document = export_document(&many, ExportOptions::default());
        assert!(matches!(document, ExportDocument::Environments { .. }));
    }

    #[test]
    fn default_plugin_is_used_when_flag_missing() {
        let mut cfg = Config::default();
        assert!(resolve_plugin(&cfg, None).is_err());
        cfg.trace.default_plugin = Some("BFF_debug".into());
        assert_eq!(resolve_plugin(&cfg, None).unwrap(), "BFF_debug");
        assert_eq!(resolve_plugin(&cfg, Some("other".into())).unwrap(), "other");
    }
}
