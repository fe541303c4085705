//! Human-readable label names, persisted as a flat JSON object keyed by label value.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, ErrorKind};
use std::path::Path;

use log::{info, warn};

use crate::error::{EngineError, Result};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelNames {
    names: BTreeMap<u16, String>,
}

impl LabelNames {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads a `{ "1": "Name", ... }` document.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let reader = BufReader::new(File::open(path.as_ref())?);
        let raw: BTreeMap<String, String> = serde_json::from_reader(reader)?;
        let mut names = BTreeMap::new();
        for (key, name) in raw {
            let value = key.trim().parse::<u16>().map_err(|_| {
                EngineError::InvalidParameter(format!("label key {key:?} is not an integer"))
            })?;
            names.insert(value, name);
        }
        info!("loaded {} label names from {}", names.len(), path.as_ref().display());
        Ok(Self { names })
    }

    /// Like [`LabelNames::load`], but a missing file yields an empty mapping.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        match Self::load(path.as_ref()) {
            Err(EngineError::Io(err)) if err.kind() == ErrorKind::NotFound => {
                warn!(
                    "label config {} not found, using empty mapping",
                    path.as_ref().display()
                );
                Ok(Self::new())
            }
            other => other,
        }
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let raw: BTreeMap<String, &String> = self
            .names
            .iter()
            .map(|(value, name)| (value.to_string(), name))
            .collect();
        let writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(writer, &raw)?;
        Ok(())
    }

    pub fn insert(&mut self, label: u16, name: impl Into<String>) {
        self.names.insert(label, name.into());
    }

    pub fn remove(&mut self, label: u16) -> Option<String> {
        self.names.remove(&label)
    }

    pub fn get(&self, label: u16) -> Option<&str> {
        self.names.get(&label).map(String::as_str)
    }

    /// Registered name, or `Label_<value> (UNMAPPED)`.
    pub fn name_for(&self, label: u16) -> String {
        self.get(label)
            .map(str::to_owned)
            .unwrap_or_else(|| format!("Label_{label} (UNMAPPED)"))
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}
