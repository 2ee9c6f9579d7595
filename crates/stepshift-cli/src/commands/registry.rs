use std::path::Path;

use anyhow::Context;
use stepshift_core::ResourceId;
use stepshift_rollout::VersionManager;

use super::open_store;

pub async fn upload(data_dir: &Path, resource: &str, file: &Path) -> anyhow::Result<()> {
    let content = std::fs::read_to_string(file)
        .with_context(|| format!("reading definition {}", file.display()))?;
    let manager = VersionManager::new(open_store(data_dir)?, ResourceId::new(resource));
    manager.upload_revision(&content).await?;
    println!("✓ Uploaded {} as latest revision of {resource}", file.display());
    Ok(())
}

pub fn publish(data_dir: &Path, resource: &str) -> anyhow::Result<()> {
    let store = open_store(data_dir)?;
    let version = store.publish(&ResourceId::new(resource))?;
    println!("{}", version.id);
    Ok(())
}

pub fn versions(data_dir: &Path, resource: &str, format: &str) -> anyhow::Result<()> {
    let store = open_store(data_dir)?;
    let versions = store.list_versions_of(&ResourceId::new(resource))?;

    match format {
        "json" => {
            let infos: Vec<_> = versions.iter().map(|v| v.info()).collect();
            println!("{}", serde_json::to_string_pretty(&infos)?);
        }
        _ => {
            if versions.is_empty() {
                println!("{resource} has no published versions");
            }
            for version in &versions {
                println!("{}\t{}", version.id, version.created_at);
            }
        }
    }
    Ok(())
}

pub fn show_alias(data_dir: &Path, resource: &str, alias: &str, format: &str) -> anyhow::Result<()> {
    let store = open_store(data_dir)?;
    let alias = ResourceId::new(resource).alias(alias);
    let record = store
        .get_alias_record(&alias)?
        .with_context(|| format!("alias {alias} not found"))?;

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&record)?),
        _ => {
            println!("{alias}");
            for entry in record.routing.entries() {
                println!("  {:>3}%  {}", entry.weight, entry.version);
            }
        }
    }
    Ok(())
}
