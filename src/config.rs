// Copyright 2025 Mikael Lund
//
// Licensed under the Apache license, version 2.0 (the "license");
// you may not use this file except in compliance with the license.
// You may obtain a copy of the license at
//
//     http://www.apache.org/licenses/license-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the license is distributed on an "as is" basis,
// without warranties or conditions of any kind, either express or implied.
// See the license for the specific language governing permissions and
// limitations under the license.

//! Optional YAML configuration of external tools and template lookup.
//!
//! ~~~ yaml
//! numbering:
//!   executable: ANARCI
//!   scheme: imgt
//! engine:
//!   python: python
//!   script: run_alphafold_tcrmodel2.3.py
//! template_db: data/databases/templates
//! peptide_length_tolerance: 0
//! ~~~

use crate::numbering::DEFAULT_SCHEME;
use anyhow::Context;
use derive_getters::Getters;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use validator::Validate;

/// Catalog directory below the template database when not configured
pub const TEMPLATE_SUBDIR: &str = "templates";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Getters, Validate)]
#[serde(deny_unknown_fields, default)]
pub struct NumberingConfig {
    /// Numbering program, looked up in `PATH` unless absolute
    #[validate(length(min = 1))]
    executable: String,
    #[validate(length(min = 1))]
    scheme: String,
}

impl Default for NumberingConfig {
    fn default() -> Self {
        Self {
            executable: "ANARCI".to_string(),
            scheme: DEFAULT_SCHEME.to_string(),
        }
    }
}

/// Python interpreter and structure prediction script
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Getters, Validate)]
#[serde(deny_unknown_fields, default)]
pub struct EngineConfig {
    #[validate(length(min = 1))]
    python: String,
    #[validate(length(min = 1))]
    script: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            python: "python".to_string(),
            script: "run_alphafold_tcrmodel2.3.py".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, Getters, Validate)]
#[serde(deny_unknown_fields, default)]
pub struct ModelingConfig {
    #[validate(nested)]
    numbering: NumberingConfig,
    #[validate(nested)]
    engine: EngineConfig,
    /// Template catalog directory; defaults to `<tp_db>/templates`
    template_db: Option<PathBuf>,
    /// Allowed difference between query and template peptide lengths
    peptide_length_tolerance: usize,
}

impl ModelingConfig {
    /// Load and validate a YAML file. `None` gives the defaults.
    pub fn from_file(path: Option<&Path>) -> anyhow::Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let file = std::fs::File::open(path)
            .with_context(|| format!("Could not open config file {}", path.display()))?;
        let config: Self = serde_yaml::from_reader(file)
            .with_context(|| format!("Could not parse config file {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Catalog directory, falling back to `<tp_db>/templates`
    pub fn template_dir(&self, tp_db: &Path) -> PathBuf {
        self.template_db
            .clone()
            .unwrap_or_else(|| tp_db.join(TEMPLATE_SUBDIR))
    }
}
