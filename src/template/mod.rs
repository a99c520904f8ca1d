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

//! # Homology templates
//!
//! The [`TemplateCatalog`] lists solved pMHC structures; the [`TemplateSelector`]
//! filters it for a target and writes the [`AlignmentFile`] that guides the
//! prediction engine.

mod catalog;
mod selector;

pub use catalog::{TemplateCatalog, TemplateComplex, TemplateRecord, CATALOG_FILE};
pub use selector::{no_cutoff_date, parse_max_date, TemplateSelector, MAX_DATE_SENTINEL};

use anyhow::{Context, Result};
use itertools::Itertools;
use std::path::{Path, PathBuf};

/// File name of the alignment file in the job directory
pub const ALIGNMENT_FILE: &str = "pmhc_alignment.tsv";

const HEADER: &str =
    "template_pdbfile\ttarget_to_template_alignstring\tidentities\ttarget_len\ttemplate_len";

/// One accepted template with its residue correspondence to the target.
#[derive(Debug, Clone, PartialEq)]
pub struct AlignmentRow {
    pub template_file: PathBuf,
    /// `(target index, template index)` pairs, 0-based into the concatenated chains
    pub mapping: Vec<(usize, usize)>,
    /// Identical residues among mapped pairs
    pub identities: usize,
    pub target_len: usize,
    pub template_len: usize,
}

impl AlignmentRow {
    fn alignstring(&self) -> String {
        self.mapping.iter().map(|(q, t)| format!("{q}:{t}")).join(";")
    }

    fn parse(line: &str) -> Result<Self> {
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() != 5 {
            anyhow::bail!("expected 5 columns, found {}", fields.len());
        }
        let mapping = fields[1]
            .split(';')
            .filter(|pair| !pair.is_empty())
            .map(|pair| {
                let (q, t) = pair
                    .split_once(':')
                    .ok_or_else(|| anyhow::anyhow!("invalid pair '{pair}'"))?;
                Ok((q.parse()?, t.parse()?))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            template_file: PathBuf::from(fields[0]),
            mapping,
            identities: fields[2].parse()?,
            target_len: fields[3].parse()?,
            template_len: fields[4].parse()?,
        })
    }
}

/// Tab-separated template correspondence consumed by the prediction engine.
///
/// Zero rows is valid and means that no structural template guidance is given.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AlignmentFile {
    rows: Vec<AlignmentRow>,
}

impl AlignmentFile {
    pub fn new(rows: Vec<AlignmentRow>) -> Self {
        Self { rows }
    }

    pub fn rows(&self) -> &[AlignmentRow] {
        &self.rows
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Header line followed by one line per row.
    pub fn to_tsv(&self) -> String {
        let mut text = format!("{HEADER}\n");
        for row in &self.rows {
            text.push_str(&format!(
                "{}\t{}\t{}\t{}\t{}\n",
                row.template_file.display(),
                row.alignstring(),
                row.identities,
                row.target_len,
                row.template_len
            ));
        }
        text
    }

    pub fn from_tsv(text: &str) -> Result<Self> {
        let mut lines = text.lines();
        match lines.next() {
            Some(header) if header == HEADER => {}
            _ => anyhow::bail!("missing alignment file header"),
        }
        let rows = lines
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(i, line)| AlignmentRow::parse(line).with_context(|| format!("row {}", i + 1)))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { rows })
    }

    pub fn write(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        std::fs::write(path, self.to_tsv())
            .with_context(|| format!("Cannot write alignment file '{}'", path.display()))
    }
}
