// Copyright 2026 BadCompany
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

// Operator CLI for lilith-scan
use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

use lilith_scan::config::Config;
use lilith_scan::policy::diff::ConfigDiff;
use lilith_scan::policy::raw::RawDocument;
use lilith_scan::policy::store::{build_configuration, read_user_document};
use lilith_scan::policy::{ConfigStore, Configuration, DEFAULT_POLICY_YAML};
use lilith_scan::{Operations, OperationError, SecurityCore};

#[derive(Parser, Debug)]
#[command(version, about = "Content and access security policy engine", long_about = None)]
struct Cli {
    /// User policy file (defaults to $LILITH_SCAN_CONFIG_PATH or ~/.lilith-scan/security.yaml)
    #[arg(long, global = true)]
    config_path: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Load the policy and report errors and a summary
    Validate,

    /// Compare the user policy with the embedded default
    Diff {
        /// Write the merged policy back, keeping a timestamped backup
        #[arg(long)]
        update: bool,
    },

    /// Read a file through the engine and print the decision
    Scan {
        path: PathBuf,

        /// Tool name to attribute the scan to
        #[arg(long, default_value = "lilith-scan-cli")]
        tool: String,

        /// Print the decision as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the embedded default policy
    DefaultConfig,

    /// Print the JSON schema of the policy document
    #[cfg(feature = "schema")]
    Schema,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    install_panic_hook();

    let mut config = Config::from_env();
    if let Some(p) = &cli.config_path {
        config.policy_path = Some(p.clone());
    }

    if let Err(e) = init_tracing(&config) {
        eprintln!("Failed to init tracing: {}", e);
    }

    match cli.command {
        Command::Validate => validate(&config, cli.config_path.is_some()),
        Command::Diff { update } => diff(&config, update),
        Command::Scan { path, tool, json } => scan(&config, &path, &tool, json).await,
        Command::DefaultConfig => {
            print!("{}", DEFAULT_POLICY_YAML);
            Ok(())
        }
        #[cfg(feature = "schema")]
        Command::Schema => {
            println!("{}", lilith_scan::policy::raw::schema_json());
            Ok(())
        }
    }
}

fn user_path(config: &Config) -> Result<PathBuf> {
    config
        .policy_path
        .clone()
        .context("no configuration path: set --config-path or LILITH_SCAN_CONFIG_PATH")
}

fn validate(config: &Config, explicit: bool) -> Result<()> {
    let path = user_path(config)?;

    if path.exists() {
        let text = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let tabs: Vec<usize> = text
            .lines()
            .enumerate()
            .filter(|(_, l)| l.contains('\t'))
            .map(|(i, _)| i + 1)
            .collect();
        for line in &tabs {
            println!("Warning: line {} contains a tab; YAML indentation must use spaces", line);
        }
    } else if explicit {
        bail!("configuration file {} does not exist", path.display());
    } else {
        println!("No user configuration at {}; validating the default policy only.", path.display());
    }

    let cfg = build_configuration(DEFAULT_POLICY_YAML, Some(&path), 1)
        .with_context(|| format!("configuration {} is invalid", path.display()))?;

    print_summary(&path, &cfg);
    println!("Configuration is valid.");
    Ok(())
}

fn print_summary(path: &Path, cfg: &Configuration) {
    let s = &cfg.settings;
    println!("Configuration: {}", path.display());
    println!("Version: {}", cfg.version);
    println!("Settings:");
    println!("  enabled: {}", s.enabled);
    println!("  default_action: {}", s.default_action);
    println!("  auto_reload: {}", s.auto_reload);
    println!("  case_sensitive: {}", s.case_sensitive);
    println!("  max_content_size: {}", s.max_content_size);
    println!("  max_scan_size: {}", s.max_scan_size);
    println!("  size_exceeded_behaviour: {}", s.size_exceeded_behaviour.as_str());
    println!("  enable_base64_scanning: {}", s.enable_base64_scanning);
    println!("  scan_trusted_domains: {}", s.scan_trusted_domains);

    println!(
        "Rules: {} total, {} enabled",
        cfg.rules.len(),
        cfg.enabled_rule_count()
    );
    for rule in &cfg.rules {
        let state = if rule.enabled { "" } else { " [disabled]" };
        println!("  - {} ({}, {} patterns){}", rule.name, rule.action, rule.patterns.len(), state);
    }

    let trusted: Vec<&str> = cfg.access.trusted_domains.patterns().collect();
    println!("Trusted domains ({}): {}", trusted.len(), trusted.join(", "));
    println!(
        "Denied paths ({}): {}",
        cfg.access.denied_paths.patterns().len(),
        cfg.access.denied_paths.patterns().join(", ")
    );
    let denied: Vec<&str> = cfg.access.denied_domains.patterns().collect();
    println!("Denied domains ({}): {}", denied.len(), denied.join(", "));
}

fn diff(config: &Config, update: bool) -> Result<()> {
    let path = user_path(config)?;
    let default = RawDocument::from_yaml(DEFAULT_POLICY_YAML, "embedded default policy")?;
    let user = read_user_document(&path)?
        .with_context(|| format!("configuration file {} does not exist", path.display()))?;

    let changes = ConfigDiff::between(&default, &user);
    print!("{}", changes);

    if !update {
        return Ok(());
    }

    let merged = default.layer(&user);
    // Refuse to write something that would not load
    Configuration::build(&merged, 0).context("merged configuration is invalid")?;

    let backup = PathBuf::from(format!(
        "{}.backup.{}",
        path.display(),
        lilith_scan::utils::time::unix_seconds()
    ));
    std::fs::copy(&path, &backup)
        .with_context(|| format!("failed to back up {} to {}", path.display(), backup.display()))?;

    write_private(&path, merged.to_yaml()?.as_bytes())?;
    println!("Updated {} (backup at {})", path.display(), backup.display());
    info!(path = %path.display(), backup = %backup.display(), "configuration updated");
    Ok(())
}

fn write_private(path: &Path, content: &[u8]) -> Result<()> {
    let mut options = std::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options
        .open(path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.set_permissions(std::fs::Permissions::from_mode(0o600))?;
    }
    file.write_all(content)?;
    Ok(())
}

async fn scan(config: &Config, path: &Path, tool: &str, json: bool) -> Result<()> {
    let store = ConfigStore::from_env(config)?;
    let core = Arc::new(SecurityCore::new(Arc::new(store), config.enabled));
    let ops = Operations::new(core, tool)?.with_timeout(config.http_timeout);

    match ops.safe_file_read(path).await {
        Ok(result) => {
            if json {
                println!("{}", serde_json::to_string_pretty(&result.decision)?);
            } else {
                match &result.decision {
                    Some(d) => {
                        println!("{}: {} [ID: {}]", path.display(), d.action, d.id);
                        if !d.message.is_empty() {
                            println!("{}", d.message);
                        }
                    }
                    None => println!("{}: not scanned ({} bytes)", path.display(), result.size),
                }
            }
            Ok(())
        }
        Err(OperationError::Security(e)) => {
            if json {
                println!(
                    "{}",
                    serde_json::json!({ "action": "block", "id": e.id(), "message": e.message() })
                );
            } else {
                println!("{}: block [ID: {}]", path.display(), e.id());
                println!("{}", e.message());
            }
            std::process::exit(2);
        }
        Err(e) => Err(e.into()),
    }
}

fn install_panic_hook() {
    std::panic::set_hook(Box::new(|panic_info| {
        let location = panic_info
            .location()
            .map(|l| format!("{}:{}:{}", l.file(), l.line(), l.column()))
            .unwrap_or_else(|| "unknown".to_string());

        let message = if let Some(s) = panic_info.payload().downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = panic_info.payload().downcast_ref::<String>() {
            s.clone()
        } else {
            "Unknown panic".to_string()
        };

        eprintln!("PANIC: {} at {}", message, location);
    }));
}

fn init_tracing(config: &Config) -> Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .unwrap_or_else(|_| EnvFilter::new("lilith_scan=info,warn"));

    let subscriber = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    if config.log_format == "json" {
        subscriber.json().try_init().map_err(|e| anyhow::anyhow!("{}", e))?;
    } else {
        subscriber.try_init().map_err(|e| anyhow::anyhow!("{}", e))?;
    }
    Ok(())
}
