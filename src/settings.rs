// SPDX-FileCopyrightText: 2025 Joost van der Laan <joost@fashionunited.com>
//
// SPDX-License-Identifier: AGPL-3.0-only

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

const APP_NAME: &str = "currency-converter";
const SETTINGS_NAME: &str = "settings";

/// Last-used state of the converter screen.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upper_currency: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lower_currency: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lower_amount: Option<f64>,
}

pub trait SettingsStore {
    fn load(&self) -> Result<Settings>;
    fn save(&mut self, settings: &Settings) -> Result<()>;
}

/// TOML file store backed by `confy`.
pub struct FileSettingsStore {
    path: PathBuf,
}

impl FileSettingsStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Store at the platform configuration directory.
    pub fn default_location() -> Result<Self> {
        let path = confy::get_configuration_file_path(APP_NAME, SETTINGS_NAME)
            .context("Failed to resolve settings path")?;
        Ok(Self::new(path))
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }
}

impl SettingsStore for FileSettingsStore {
    fn load(&self) -> Result<Settings> {
        confy::load_path(&self.path)
            .with_context(|| format!("Failed to load settings from {}", self.path.display()))
    }

    fn save(&mut self, settings: &Settings) -> Result<()> {
        confy::store_path(&self.path, settings)
            .with_context(|| format!("Failed to store settings at {}", self.path.display()))
    }
}

/// In-memory store, counts saves.
#[derive(Debug, Default)]
pub struct MemorySettingsStore {
    settings: Settings,
    saves: usize,
}

impl MemorySettingsStore {
    pub fn new(settings: Settings) -> Self {
        Self { settings, saves: 0 }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn saves(&self) -> usize {
        self.saves
    }
}

impl SettingsStore for MemorySettingsStore {
    fn load(&self) -> Result<Settings> {
        Ok(self.settings.clone())
    }

    fn save(&mut self, settings: &Settings) -> Result<()> {
        self.settings = settings.clone();
        self.saves += 1;
        Ok(())
    }
}
