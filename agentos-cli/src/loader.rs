//! Minimal YAML loaders for `agents/*.yaml`, `skills/{core,custom}/*.yaml`,
//! `tools/{cli,api,mcp,function}/*.yaml`. Parsing YAML is an external
//! collaborator's job, kept out of `agentos-core`; this is the CLI's own
//! concrete implementation of the `AgentLoader`/`SkillLoader`/`ToolLoader`
//! traits.

use std::path::{Path, PathBuf};

use agentos_core::collaborators::{AgentLoader, SkillLoader, ToolLoader};
use agentos_core::error::StoreError;
use agentos_types::{AgentDefinition, SkillDefinition, ToolDefinition};

fn read_yaml_dir<T: serde::de::DeserializeOwned>(dir: &Path) -> Result<Vec<T>, StoreError> {
    let mut out = Vec::new();
    if !dir.is_dir() {
        return Ok(out);
    }
    let entries = walk_yaml_files(dir)?;
    for path in entries {
        let content = std::fs::read_to_string(&path).map_err(|e| {
            StoreError::Serde(serde::de::Error::custom(format!("read {}: {e}", path.display())))
        })?;
        let item: T = serde_yaml::from_str(&content).map_err(|e| {
            StoreError::Serde(serde::de::Error::custom(format!("parse {}: {e}", path.display())))
        })?;
        out.push(item);
    }
    Ok(out)
}

fn walk_yaml_files(dir: &Path) -> Result<Vec<PathBuf>, StoreError> {
    let mut out = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(|e| {
        StoreError::Serde(serde::de::Error::custom(format!("read_dir {}: {e}", dir.display())))
    })? {
        let entry = entry.map_err(|e| StoreError::Serde(serde::de::Error::custom(e.to_string())))?;
        let path = entry.path();
        if path.is_dir() {
            out.extend(walk_yaml_files(&path)?);
        } else if path.extension().map(|e| e == "yaml" || e == "yml").unwrap_or(false) {
            out.push(path);
        }
    }
    Ok(out)
}

pub struct YamlAgentLoader {
    pub dir: PathBuf,
}

impl AgentLoader for YamlAgentLoader {
    fn load_all(&self) -> Result<Vec<AgentDefinition>, StoreError> {
        read_yaml_dir(&self.dir)
    }
}

pub struct YamlSkillLoader {
    pub dir: PathBuf,
}

impl SkillLoader for YamlSkillLoader {
    fn load_all(&self) -> Result<Vec<SkillDefinition>, StoreError> {
        read_yaml_dir(&self.dir)
    }
}

pub struct YamlToolLoader {
    pub dir: PathBuf,
}

impl ToolLoader for YamlToolLoader {
    fn load_all(&self) -> Result<Vec<ToolDefinition>, StoreError> {
        read_yaml_dir(&self.dir)
    }
}
