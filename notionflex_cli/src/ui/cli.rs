use clap::{Parser, Subcommand};
use log::{info, warn};
use notionflex_core::{ApiConfig, ConnectionManager, NotionError, ProfileStore};
use serde_json::Value;

/// One-off credential used when no stored profile can be restored.
const KEY_ENV: &str = "NOTION_INTEGRATION_KEY";

/// Command-line arguments.
#[derive(Parser, Debug)]
#[command(name = "notionflex", version = "0.1.0", subcommand_required = true)]
pub struct Args {
    /// Keep profiles in the OS keyring instead of the config directory
    #[arg(long, global = true)]
    pub keyring: bool,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Manage stored integration profiles
    Profile {
        #[command(subcommand)]
        action: ProfileAction,
    },
    /// Disconnect and forget the last selected profile
    Logout,
    /// List the workspaces visible to the active profile
    Workspaces,
    /// Search pages, most recently edited first
    Pages {
        #[arg(long, default_value = "")]
        query: String,
    },
    /// Create a page under a page (id with dashes) or a database
    CreatePage {
        #[arg(long)]
        title: String,
        #[arg(long)]
        parent: Option<String>,
        /// JSON file holding the initial blocks
        #[arg(long)]
        file: Option<String>,
    },
    /// Replace a page's content with the blocks in a JSON file
    Export {
        #[arg(long)]
        page: String,
        #[arg(long)]
        file: String,
    },
}

#[derive(Subcommand, Debug)]
pub enum ProfileAction {
    /// Connect with a key and store it under `name`
    Add {
        name: String,
        /// Integration key; falls back to NOTION_INTEGRATION_KEY
        #[arg(long)]
        key: Option<String>,
    },
    List,
    /// Connect with a stored profile
    Use { name: String },
    Delete { name: String },
}

pub async fn run_cli(args: Args) -> Result<(), NotionError> {
    let profiles = if args.keyring {
        ProfileStore::open_keyring()
    } else {
        ProfileStore::open_default()
            .map_err(|e| NotionError::configuration(format!("Cannot open profile storage: {e}")))?
    };
    let manager = ConnectionManager::from_config(&ApiConfig::from_env(), profiles);

    if let Err(e) = manager.restore_last_session().await {
        warn!("Could not restore the last session: {e}");
    }

    match args.command {
        Command::Profile { action } => run_profile(&manager, action).await,
        Command::Logout => {
            manager.disconnect().await;
            println!("Logged out.");
            Ok(())
        }
        Command::Workspaces => {
            ensure_connected(&manager).await?;
            for workspace in manager.fetch_workspaces().await? {
                println!("{}\t{}", workspace.id, workspace.title);
            }
            Ok(())
        }
        Command::Pages { query } => {
            ensure_connected(&manager).await?;
            for page in manager.fetch_pages(&query).await? {
                println!("{}\t{}", page.id, page.title);
            }
            Ok(())
        }
        Command::CreatePage {
            title,
            parent,
            file,
        } => {
            ensure_connected(&manager).await?;
            let blocks = match file {
                Some(path) => read_blocks(&path).await?,
                None => Vec::new(),
            };
            let page = manager
                .create_page(&title, parent.as_deref(), blocks)
                .await?;
            println!("{}\t{}", page.id, page.title);
            Ok(())
        }
        Command::Export { page, file } => {
            ensure_connected(&manager).await?;
            let blocks = read_blocks(&file).await?;
            manager.open_page(&page).await?;
            manager.export_to_page(blocks).await?;
            println!("Exported to {page}.");
            Ok(())
        }
    }
}

async fn run_profile(manager: &ConnectionManager, action: ProfileAction) -> Result<(), NotionError> {
    match action {
        ProfileAction::Add { name, key } => {
            let key = key
                .or_else(|| std::env::var(KEY_ENV).ok())
                .unwrap_or_default();
            manager.add_or_update_profile(&name, &key).await?;
            println!("Profile '{name}' connected and saved.");
        }
        ProfileAction::List => {
            let active = manager.session().await.active_profile_name;
            for profile in manager.profiles() {
                let marker = if active.as_deref() == Some(profile.name()) {
                    "*"
                } else {
                    " "
                };
                println!("{marker} {}", profile.name());
            }
        }
        ProfileAction::Use { name } => {
            manager.select_profile(&name).await?;
            println!("Using profile '{name}'.");
        }
        ProfileAction::Delete { name } => {
            manager.delete_profile(&name).await;
            println!("Deleted profile '{name}'.");
        }
    }
    Ok(())
}

/// Falls back to the key in the environment when nothing was restored.
async fn ensure_connected(manager: &ConnectionManager) -> Result<(), NotionError> {
    if manager.session().await.is_connected() {
        return Ok(());
    }
    match std::env::var(KEY_ENV) {
        Ok(key) if !key.trim().is_empty() => {
            info!("Connecting with the key from {KEY_ENV}");
            manager.connect_with_key(&key).await
        }
        _ => Err(NotionError::configuration(format!(
            "Not connected. Run `notionflex profile add <name>` or set {KEY_ENV}."
        ))),
    }
}

/// Reads blocks from `path`: either a JSON array or an object with `children`.
async fn read_blocks(path: &str) -> Result<Vec<Value>, NotionError> {
    let text = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| NotionError::validation(format!("Cannot read {path}: {e}")))?;
    let value: Value = serde_json::from_str(&text)
        .map_err(|e| NotionError::validation(format!("{path} is not valid JSON: {e}")))?;
    match value {
        Value::Array(blocks) => Ok(blocks),
        Value::Object(mut object) => match object.remove("children") {
            Some(Value::Array(blocks)) => Ok(blocks),
            _ => Err(NotionError::validation(format!(
                "{path} has no `children` array"
            ))),
        },
        _ => Err(NotionError::validation(format!(
            "{path} must hold an array of blocks"
        ))),
    }
}
