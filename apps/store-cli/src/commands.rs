//! Command-line surface and its execution against the stores.

use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use domain::service::{InstallationStore, TagStore, UpgradeStore};
use domain::{
    Attributes, InstallationRepository, NewTag, NewUpgradeRecord, TagRepository,
    UpgradeRecordRepository,
};
use futures::TryStreamExt;
use serde_json::Value;
use tracing::info;

use crate::output::{installation_json, parse_rfc3339, tag_json, upgrade_json};

/// store-cli - manage installation, tag and upgrade records
#[derive(Parser, Debug)]
#[command(name = "store-cli")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable debug logging (RUST_LOG still wins when set)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Work with the deployment's installation record
    #[command(subcommand)]
    Installation(InstallationCmd),
    /// Work with organization tags
    #[command(subcommand)]
    Tag(TagCmd),
    /// Work with the upgrade ledger
    #[command(subcommand)]
    Upgrade(UpgradeCmd),
}

#[derive(Subcommand, Debug)]
pub enum InstallationCmd {
    /// Print the installation
    Show,
    /// Create the installation if none exists
    Init,
    /// Replace all additional information with the given KEY=VALUE pairs
    Set {
        #[arg(value_parser = parse_pair)]
        pairs: Vec<(String, String)>,
    },
    /// Add or overwrite the given KEY=VALUE pairs, keeping other keys
    Merge {
        #[arg(value_parser = parse_pair, required = true)]
        pairs: Vec<(String, String)>,
    },
    /// Delete the installation (no-op when absent)
    Delete,
}

#[derive(Subcommand, Debug)]
pub enum TagCmd {
    /// Create a tag
    Create {
        #[arg(long)]
        org: String,
        #[arg(long)]
        name: String,
        #[arg(long)]
        description: Option<String>,
        /// Explicit id; generated when omitted
        #[arg(long)]
        id: Option<String>,
    },
    /// Print one tag
    Get {
        id: String,
        /// Only match a tag of this organization
        #[arg(long)]
        org: Option<String>,
    },
    /// List the tags of an organization
    List {
        #[arg(long)]
        org: String,
    },
    /// Replace a tag's fields (an omitted description is cleared)
    Update {
        id: String,
        #[arg(long)]
        org: String,
        #[arg(long)]
        name: String,
        #[arg(long)]
        description: Option<String>,
    },
    /// Delete a tag (no-op when absent)
    Delete { id: String },
}

#[derive(Subcommand, Debug)]
pub enum UpgradeCmd {
    /// Record an upgrade as applied (idempotent unless --at is given)
    Apply {
        name: String,
        /// RFC 3339 timestamp to record instead of now
        #[arg(long)]
        at: Option<String>,
    },
    /// Print one upgrade record
    Show { name: String },
    /// List applied upgrades, oldest first
    List,
    /// Delete an upgrade record (no-op when absent)
    Delete { name: String },
}

fn parse_pair(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((k, v)) if !k.trim().is_empty() => Ok((k.to_string(), v.to_string())),
        _ => Err(format!("expected KEY=VALUE, got '{s}'")),
    }
}

/// The three stores wired to whichever backend the config selected.
pub struct Stores<I, T, U>
where
    I: InstallationRepository,
    T: TagRepository,
    U: UpgradeRecordRepository,
{
    pub installations: InstallationStore<I>,
    pub tags: TagStore<T>,
    pub upgrades: UpgradeStore<U>,
}

impl<I, T, U> Stores<I, T, U>
where
    I: InstallationRepository,
    T: TagRepository,
    U: UpgradeRecordRepository,
{
    pub fn new(installations: I, tags: T, upgrades: U, op_timeout: Duration) -> Self {
        Self {
            installations: InstallationStore::with_defaults(installations).with_timeout(op_timeout),
            tags: TagStore::with_defaults(tags).with_timeout(op_timeout),
            upgrades: UpgradeStore::with_defaults(upgrades).with_timeout(op_timeout),
        }
    }
}

/// Run one command and return its JSON result.
pub async fn execute<I, T, U>(command: Command, stores: &Stores<I, T, U>) -> Result<Value>
where
    I: InstallationRepository,
    T: TagRepository,
    U: UpgradeRecordRepository,
{
    match command {
        Command::Installation(cmd) => installation(cmd, &stores.installations).await,
        Command::Tag(cmd) => tag(cmd, &stores.tags).await,
        Command::Upgrade(cmd) => upgrade(cmd, &stores.upgrades).await,
    }
}

async fn installation<I: InstallationRepository>(
    cmd: InstallationCmd,
    store: &InstallationStore<I>,
) -> Result<Value> {
    match cmd {
        InstallationCmd::Show => Ok(installation_json(&store.get().await?)?),
        InstallationCmd::Init => {
            Ok(installation_json(&store.get_or_initialize().await?)?)
        }
        InstallationCmd::Set { pairs } => {
            let mut current = store.get_or_initialize().await?;
            current.additional_information = pairs.into_iter().collect::<Attributes>();
            let updated = store.update(current).await?;
            Ok(installation_json(&updated)?)
        }
        InstallationCmd::Merge { pairs } => {
            let merged = store
                .add_additional_information(pairs.into_iter().collect())
                .await?;
            Ok(installation_json(&merged)?)
        }
        InstallationCmd::Delete => {
            match store.find_current().await? {
                Some(current) => {
                    store.delete(&current.id).await?;
                    info!(id = %current.id, "installation removed");
                }
                None => info!("no installation to remove"),
            }
            Ok(Value::Null)
        }
    }
}

async fn tag<T: TagRepository>(cmd: TagCmd, store: &TagStore<T>) -> Result<Value> {
    match cmd {
        TagCmd::Create {
            org,
            name,
            description,
            id,
        } => {
            let created = store
                .create(NewTag {
                    id,
                    name,
                    description,
                    organization_id: org,
                })
                .await?;
            Ok(tag_json(&created)?)
        }
        TagCmd::Get { id, org } => {
            let found = match org {
                Some(org) => store.find_by_id_in_organization(&id, &org).await?,
                None => store.find_by_id(&id).await?,
            };
            let found = found.ok_or_else(|| anyhow!("tag {id} not found"))?;
            Ok(tag_json(&found)?)
        }
        TagCmd::List { org } => {
            let tags: Vec<_> = store.find_all(&org).try_collect().await?;
            let out: Vec<Value> = tags.iter().map(tag_json).collect::<serde_json::Result<_>>()?;
            Ok(Value::Array(out))
        }
        TagCmd::Update {
            id,
            org,
            name,
            description,
        } => {
            let mut current = store
                .find_by_id(&id)
                .await?
                .ok_or_else(|| anyhow!("tag {id} not found"))?;
            current.name = name;
            current.description = description;
            current.organization_id = org;
            Ok(tag_json(&store.update(current).await?)?)
        }
        TagCmd::Delete { id } => {
            store.delete(&id).await?;
            Ok(Value::Null)
        }
    }
}

async fn upgrade<U: UpgradeRecordRepository>(
    cmd: UpgradeCmd,
    store: &UpgradeStore<U>,
) -> Result<Value> {
    match cmd {
        UpgradeCmd::Apply { name, at: None } => {
            let (record, created) = store.mark_applied(&name).await?;
            if !created {
                info!(name = %record.name, "upgrade already applied");
            }
            Ok(upgrade_json(&record)?)
        }
        UpgradeCmd::Apply { name, at: Some(at) } => {
            let applied_at =
                parse_rfc3339(&at).with_context(|| format!("invalid --at timestamp '{at}'"))?;
            let record = store
                .create(NewUpgradeRecord {
                    name,
                    applied_at: Some(applied_at),
                })
                .await?;
            Ok(upgrade_json(&record)?)
        }
        UpgradeCmd::Show { name } => {
            let record = store
                .find_by_id(&name)
                .await?
                .ok_or_else(|| anyhow!("upgrade {name} not found"))?;
            Ok(upgrade_json(&record)?)
        }
        UpgradeCmd::List => {
            let records = store.find_all().await?;
            let out: Vec<Value> = records
                .iter()
                .map(upgrade_json)
                .collect::<serde_json::Result<_>>()?;
            Ok(Value::Array(out))
        }
        UpgradeCmd::Delete { name } => {
            store.delete(&name).await?;
            Ok(Value::Null)
        }
    }
}
