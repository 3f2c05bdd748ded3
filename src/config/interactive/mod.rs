
use anyhow::{Context, Result};
use console::style;
use dialoguer::{Confirm, Input, Password, Select};
use std::path::Path;

use super::{
    Config, ConfigError, ProviderConfig, ProviderKind, RetrievalConfig, StoreConfig, StoreKind,
};

#[inline]
pub fn run_interactive_config(config_dir: &Path) -> Result<()> {
    eprintln!("{}", style("🔧 Docs Retriever Configuration Setup").bold().cyan());
    eprintln!();

    let mut config = load_existing_config(config_dir)?;

    eprintln!("{}", style("Embedding Provider").bold().yellow());
    configure_provider(&mut config.provider)?;

    eprintln!();
    eprintln!("{}", style("Vector Store").bold().yellow());
    configure_store(&mut config.store)?;

    eprintln!();
    eprintln!("{}", style("Retrieval").bold().yellow());
    configure_retrieval(&mut config.retrieval)?;

    eprintln!();
    if let Err(e) = config.validate() {
        eprintln!("{} {}", style("⚠ Configuration is incomplete:").yellow(), e);
        eprintln!("Missing values can also be supplied through environment variables.");
    }

    if Confirm::new()
        .with_prompt("Save configuration?")
        .default(true)
        .interact()?
    {
        // may still lack credentials that come from the environment
        std::fs::create_dir_all(config.get_base_dir()).with_context(|| {
            format!(
                "Failed to create config directory: {}",
                config.get_base_dir().display()
            )
        })?;
        let content =
            toml::to_string_pretty(&config).context("Failed to serialize config to TOML")?;
        std::fs::write(config.config_file_path(), content).with_context(|| {
            format!(
                "Failed to write config file: {}",
                config.config_file_path().display()
            )
        })?;

        eprintln!("{}", style("✓ Configuration saved successfully!").green());
        eprintln!(
            "Configuration saved to: {}",
            style(config.config_file_path().display()).cyan()
        );
    } else {
        eprintln!("Configuration not saved.");
    }

    Ok(())
}

#[inline]
pub fn show_config(config_dir: &Path) -> Result<()> {
    let config = Config::read(config_dir).context("Failed to read configuration")?;

    eprintln!("{}", style("📋 Current Configuration").bold().cyan());
    eprintln!();

    eprintln!("{}", style("Embedding Provider:").bold().yellow());
    eprintln!("  Kind: {}", style(format!("{:?}", config.provider.kind)).cyan());
    match config.provider.endpoint_url() {
        Ok(url) => eprintln!("  Endpoint: {}", style(url).cyan()),
        Err(e) => eprintln!("  Endpoint: {} ({})", style("Invalid").red(), e),
    }
    eprintln!("  Model: {}", style(config.provider.model_name()).cyan());
    eprintln!(
        "  API Key: {}",
        style(mask_secret(config.provider.api_key.as_deref())).cyan()
    );
    eprintln!("  Dimension: {}", style(config.provider.dimension).cyan());
    eprintln!("  Concurrency: {}", style(config.provider.concurrency).cyan());

    eprintln!();
    eprintln!("{}", style("Vector Store:").bold().yellow());
    eprintln!("  Kind: {}", style(format!("{:?}", config.store.kind)).cyan());
    match config.store.kind {
        StoreKind::Astra => {
            eprintln!(
                "  Endpoint: {}",
                style(config.store.endpoint.as_deref().unwrap_or("(not set)")).cyan()
            );
            eprintln!(
                "  Token: {}",
                style(mask_secret(config.store.token.as_deref())).cyan()
            );
            eprintln!("  Keyspace: {}", style(&config.store.keyspace).cyan());
            eprintln!(
                "  Collection: {}",
                style(config.store.collection.as_deref().unwrap_or("(not set)")).cyan()
            );
        }
        StoreKind::Lancedb => {
            eprintln!(
                "  Path: {}",
                style(config.vector_database_path().display()).cyan()
            );
            eprintln!("  Table: {}", style(config.store.collection_name()).cyan());
        }
    }

    eprintln!();
    eprintln!("{}", style("Retrieval:").bold().yellow());
    eprintln!("  Threshold: {}", style(config.retrieval.threshold).cyan());
    eprintln!(
        "  Candidate Limit: {}",
        style(config.retrieval.candidate_limit).cyan()
    );
    eprintln!(
        "  Top K: {}",
        style(
            config
                .retrieval
                .top_k
                .map_or_else(|| "unlimited".to_string(), |k| k.to_string())
        )
        .cyan()
    );

    eprintln!();
    match config.validate() {
        Ok(()) => eprintln!("{}", style("✓ Configuration is complete").green()),
        Err(e) => eprintln!("{} {}", style("✗").red(), e),
    }
    eprintln!("Config file: {}", style(config.config_file_path().display()).dim());

    Ok(())
}

fn load_existing_config(config_dir: &Path) -> Result<Config> {
    if config_dir.join(super::settings::CONFIG_FILE_NAME).exists() {
        eprintln!("{}", style("Found existing configuration.").green());
    } else {
        eprintln!(
            "{}",
            style("No existing configuration found. Using defaults.").yellow()
        );
    }

    Config::read_file(config_dir).context("Failed to read existing configuration")
}

fn configure_provider(provider: &mut ProviderConfig) -> Result<()> {
    let kinds = &["gemini", "ollama"];
    let kind_index = Select::new()
        .with_prompt("Embedding provider")
        .default(usize::from(provider.kind == ProviderKind::Ollama))
        .items(kinds)
        .interact()?;

    let kind = if kind_index == 0 {
        ProviderKind::Gemini
    } else {
        ProviderKind::Ollama
    };
    if kind != provider.kind {
        // endpoint and model defaults differ per provider
        provider.endpoint = None;
        provider.model = None;
    }
    provider.kind = kind;

    let endpoint: String = Input::new()
        .with_prompt("Provider endpoint")
        .default(provider.endpoint_url()?.to_string())
        .validate_with(|input: &String| -> Result<(), ConfigError> {
            let candidate = ProviderConfig {
                endpoint: Some(input.clone()),
                ..provider.clone()
            };
            candidate.endpoint_url().map(|_| ())
        })
        .interact_text()?;
    provider.endpoint = Some(endpoint);

    let model: String = Input::new()
        .with_prompt("Embedding model")
        .default(provider.model_name().to_string())
        .validate_with(|input: &String| -> Result<(), &str> {
            if input.trim().is_empty() {
                Err("Model name cannot be empty")
            } else {
                Ok(())
            }
        })
        .interact_text()?;
    provider.model = Some(model);

    if kind == ProviderKind::Gemini {
        let api_key = Password::new()
            .with_prompt("API key (leave empty to use GOOGLE_API_KEY)")
            .allow_empty_password(true)
            .interact()?;
        if !api_key.trim().is_empty() {
            provider.api_key = Some(api_key);
        }
    }

    let dimension: u32 = Input::new()
        .with_prompt("Embedding dimension")
        .default(provider.dimension)
        .validate_with(|input: &u32| -> Result<(), &str> {
            if (1..=4096).contains(input) {
                Ok(())
            } else {
                Err("Dimension must be between 1 and 4096")
            }
        })
        .interact_text()?;
    provider.set_dimension(dimension)?;

    Ok(())
}

fn configure_store(store: &mut StoreConfig) -> Result<()> {
    let kinds = &["astra", "lancedb"];
    let kind_index = Select::new()
        .with_prompt("Vector store")
        .default(usize::from(store.kind == StoreKind::Lancedb))
        .items(kinds)
        .interact()?;
    store.kind = if kind_index == 0 {
        StoreKind::Astra
    } else {
        StoreKind::Lancedb
    };

    let collection: String = Input::new()
        .with_prompt("Collection name")
        .default(store.collection_name().to_string())
        .interact_text()?;
    store.collection = Some(collection);

    if store.kind == StoreKind::Astra {
        let endpoint: String = Input::new()
            .with_prompt("Data API endpoint (leave empty to use ASTRA_DB_ENDPOINT)")
            .default(store.endpoint.clone().unwrap_or_default())
            .allow_empty(true)
            .interact_text()?;
        store.endpoint = Some(endpoint).filter(|e| !e.trim().is_empty());

        let token = Password::new()
            .with_prompt("Application token (leave empty to use ASTRA_DB_APPLICATION_TOKEN)")
            .allow_empty_password(true)
            .interact()?;
        if !token.trim().is_empty() {
            store.token = Some(token);
        }
    }

    Ok(())
}

fn configure_retrieval(retrieval: &mut RetrievalConfig) -> Result<()> {
    let threshold: f32 = Input::new()
        .with_prompt("Similarity threshold (-1 to 1)")
        .default(retrieval.threshold)
        .validate_with(|input: &f32| -> Result<(), &str> {
            if (-1.0..=1.0).contains(input) {
                Ok(())
            } else {
                Err("Threshold must be between -1 and 1")
            }
        })
        .interact_text()?;
    retrieval.set_threshold(threshold)?;

    let limit: usize = Input::new()
        .with_prompt("Candidates fetched per query")
        .default(retrieval.candidate_limit)
        .validate_with(|input: &usize| -> Result<(), &str> {
            if (1..=100).contains(input) {
                Ok(())
            } else {
                Err("Candidate limit must be between 1 and 100")
            }
        })
        .interact_text()?;
    retrieval.set_candidate_limit(limit)?;

    Ok(())
}

/// Render a credential for display, keeping only its last four characters
fn mask_secret(secret: Option<&str>) -> String {
    match secret {
        None => "(not set)".to_string(),
        Some(value) if value.chars().count() <= 4 => "****".to_string(),
        Some(value) => {
            let tail: String = value
                .chars()
                .rev()
                .take(4)
                .collect::<Vec<_>>()
                .into_iter()
                .rev()
                .collect();
            format!("****{}", tail)
        }
    }
}
