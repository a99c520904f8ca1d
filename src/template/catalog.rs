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

//! Read-only catalog of solved pMHC structures usable as templates.

use crate::mhc::{ChainRole, MhcClass};
use crate::sequence::Sequence;
use anyhow::{Context, Result};
use chrono::NaiveDate;
use derive_getters::Getters;
use itertools::Itertools;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// File holding the catalog index inside the template database directory
pub const CATALOG_FILE: &str = "templates.tsv";

const COLUMNS: [&str; 8] = [
    "pdb_id",
    "chain_id",
    "mhc_class",
    "domain",
    "peptide",
    "deposition_date",
    "sequence",
    "structure",
];

/// One MHC chain of a deposited structure, identified by `(pdb_id, chain_id)`.
#[derive(Debug, Clone, PartialEq, Getters)]
pub struct TemplateRecord {
    /// Four character PDB identifier, as written in the catalog
    pdb_id: String,
    chain_id: String,
    mhc_class: MhcClass,
    /// [`ChainRole::MhcAlpha`] or [`ChainRole::MhcBeta`]
    role: ChainRole,
    /// Peptide bound in this structure
    peptide: Sequence,
    deposition_date: NaiveDate,
    /// MHC chain sequence, trimmed to the presenting domain(s)
    sequence: Sequence,
    /// Template model file
    structure: PathBuf,
}

impl TemplateRecord {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        pdb_id: &str,
        chain_id: &str,
        mhc_class: MhcClass,
        role: ChainRole,
        peptide: &str,
        deposition_date: NaiveDate,
        sequence: &str,
        structure: impl Into<PathBuf>,
    ) -> Self {
        Self {
            pdb_id: pdb_id.to_string(),
            chain_id: chain_id.to_string(),
            mhc_class,
            role,
            peptide: Sequence::new(peptide),
            deposition_date,
            sequence: Sequence::new(sequence),
            structure: structure.into(),
        }
    }

    pub fn peptide_length(&self) -> usize {
        self.peptide.len()
    }

    /// Case-insensitive match against a PDB identifier
    pub fn is_pdb(&self, pdb_id: &str) -> bool {
        self.pdb_id.eq_ignore_ascii_case(pdb_id.trim())
    }

    fn from_row(row: &str, dir: &Path) -> Result<Self> {
        let fields: Vec<&str> = row.split('\t').map(str::trim).collect();
        if fields.len() != COLUMNS.len() {
            anyhow::bail!("expected {} columns, found {}", COLUMNS.len(), fields.len());
        }
        let mhc_class = fields[2]
            .parse::<u8>()
            .ok()
            .and_then(MhcClass::from_number)
            .ok_or_else(|| anyhow::anyhow!("invalid MHC class '{}'", fields[2]))?;
        let role = match fields[3].to_lowercase().as_str() {
            "alpha" => ChainRole::MhcAlpha,
            "beta" if mhc_class == MhcClass::ClassII => ChainRole::MhcBeta,
            other => anyhow::bail!("invalid domain '{}' for class {} MHC", other, mhc_class),
        };
        let deposition_date = NaiveDate::parse_from_str(fields[5], "%Y-%m-%d")
            .with_context(|| format!("invalid deposition date '{}'", fields[5]))?;
        if fields[0].len() != 4 {
            anyhow::bail!("invalid PDB identifier '{}'", fields[0]);
        }
        Ok(Self::new(
            fields[0],
            fields[1],
            mhc_class,
            role,
            fields[4],
            deposition_date,
            fields[6],
            dir.join(fields[7]),
        ))
    }
}

/// Template database indexed by MHC class and peptide length.
///
/// Loaded once per job and never mutated, so it may be shared between jobs.
#[derive(Debug, Clone, Default)]
pub struct TemplateCatalog {
    records: Vec<TemplateRecord>,
    by_class: HashMap<MhcClass, Vec<usize>>,
    by_class_and_length: HashMap<(MhcClass, usize), Vec<usize>>,
}

impl TemplateCatalog {
    /// Build from records, keeping their order for iteration.
    pub fn from_records(records: Vec<TemplateRecord>) -> Self {
        let mut by_class: HashMap<_, Vec<usize>> = HashMap::new();
        let mut by_class_and_length: HashMap<_, Vec<usize>> = HashMap::new();
        for (i, record) in records.iter().enumerate() {
            by_class.entry(record.mhc_class).or_default().push(i);
            by_class_and_length
                .entry((record.mhc_class, record.peptide_length()))
                .or_default()
                .push(i);
        }
        Self {
            records,
            by_class,
            by_class_and_length,
        }
    }

    /// Load `templates.tsv` from a template database directory.
    ///
    /// Structure paths are resolved relative to `dir`.
    pub fn load(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        let path = dir.join(CATALOG_FILE);
        let text = std::fs::read_to_string(&path)
            .with_context(|| format!("Cannot read template catalog '{}'", path.display()))?;
        let mut records = Vec::new();
        let mut header_seen = false;
        for (i, line) in text.lines().enumerate() {
            if line.trim().is_empty() || line.starts_with('#') {
                continue;
            }
            if !header_seen && line.starts_with(COLUMNS[0]) {
                header_seen = true;
                continue;
            }
            let record = TemplateRecord::from_row(line, dir)
                .with_context(|| format!("{}:{}", path.display(), i + 1))?;
            records.push(record);
        }
        log::info!(
            "Loaded {} template chains from {}",
            records.len(),
            path.display()
        );
        Ok(Self::from_records(records))
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// All records in catalog order
    pub fn records(&self) -> &[TemplateRecord] {
        &self.records
    }

    /// Records of a class, in catalog order.
    pub fn iter_class(&self, class: MhcClass) -> impl Iterator<Item = &TemplateRecord> {
        self.by_class
            .get(&class)
            .into_iter()
            .flatten()
            .map(move |&i| &self.records[i])
    }

    /// Records of a class whose peptide length lies in `lengths`, in catalog order.
    pub fn iter_peptide_lengths(
        &self,
        class: MhcClass,
        lengths: std::ops::RangeInclusive<usize>,
    ) -> impl Iterator<Item = &TemplateRecord> {
        let indices: Vec<usize> = lengths
            .flat_map(|len| self.by_class_and_length.get(&(class, len)).into_iter().flatten())
            .copied()
            .sorted_unstable()
            .collect();
        indices.into_iter().map(move |i| &self.records[i])
    }

    /// Class II complexes: an alpha and a beta chain from the same deposition.
    ///
    /// Depositions lacking either chain are skipped. With several copies of a chain
    /// in one entry, the first of each is used. Order follows the first record of
    /// each entry in the catalog.
    pub fn class_ii_complexes(&self) -> Vec<TemplateComplex<'_>> {
        self.iter_class(MhcClass::ClassII)
            .into_group_map_by(|r| r.pdb_id.to_lowercase())
            .into_iter()
            .filter_map(|(_, chains)| {
                let alpha = chains.iter().find(|r| r.role == ChainRole::MhcAlpha)?;
                let beta = chains.iter().find(|r| r.role == ChainRole::MhcBeta)?;
                Some(TemplateComplex {
                    chains: vec![*alpha, *beta],
                })
            })
            .sorted_by_key(|complex| self.position(complex.chains[0]))
            .collect()
    }

    /// Index of the first record of the same PDB entry
    fn position(&self, record: &TemplateRecord) -> usize {
        self.records
            .iter()
            .position(|r| r.is_pdb(&record.pdb_id))
            .unwrap_or(usize::MAX)
    }
}

/// MHC chains of one deposited structure, in canonical order (alpha, then beta).
#[derive(Debug, Clone, PartialEq)]
pub struct TemplateComplex<'a> {
    pub chains: Vec<&'a TemplateRecord>,
}

impl<'a> TemplateComplex<'a> {
    pub fn single(record: &'a TemplateRecord) -> Self {
        Self {
            chains: vec![record],
        }
    }

    pub fn pdb_id(&self) -> &str {
        &self.chains[0].pdb_id
    }

    /// Latest deposition date among the chains
    pub fn deposition_date(&self) -> NaiveDate {
        self.chains
            .iter()
            .map(|r| r.deposition_date)
            .max()
            .unwrap_or(NaiveDate::MIN)
    }

    pub fn peptide(&self) -> &Sequence {
        &self.chains[0].peptide
    }

    pub fn structure(&self) -> &Path {
        &self.chains[0].structure
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn load_catalog() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(CATALOG_FILE),
            "pdb_id\tchain_id\tmhc_class\tdomain\tpeptide\tdeposition_date\tsequence\tstructure\n\
             # comment\n\
             1AO7\tA\t1\talpha\tLLFGYPVYV\t1997-03-06\tGSHSMRYF\tpdb/1ao7.pdb\n\
             \n\
             1FYT\tD\t2\talpha\tPKYVKQNTLKLAT\t2000-09-25\tIKEEHVII\tpdb/1fyt.pdb\n\
             1FYT\tE\t2\tbeta\tPKYVKQNTLKLAT\t2000-09-25\tGDTRPRFL\tpdb/1fyt.pdb\n",
        )
        .unwrap();
        let catalog = TemplateCatalog::load(dir.path()).unwrap();
        assert_eq!(catalog.len(), 3);
        let first = &catalog.records()[0];
        assert_eq!(first.pdb_id(), "1AO7");
        assert_eq!(first.peptide_length(), 9);
        assert_eq!(*first.deposition_date(), date("1997-03-06"));
        assert_eq!(first.structure(), &dir.path().join("pdb/1ao7.pdb"));
        assert!(first.is_pdb("1ao7"));
        assert_eq!(catalog.iter_class(MhcClass::ClassII).count(), 2);
        assert_eq!(catalog.class_ii_complexes().len(), 1);
    }

    #[test]
    fn malformed_row_reports_line() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(CATALOG_FILE),
            "1AO7\tA\t3\talpha\tLLFGYPVYV\t1997-03-06\tGSHS\tx.pdb\n",
        )
        .unwrap();
        let err = TemplateCatalog::load(dir.path()).unwrap_err();
        assert!(format!("{err:#}").contains(":1"));
        assert!(format!("{err:#}").contains("invalid MHC class"));
    }

    #[test]
    fn peptide_length_index() {
        let class_i = |pdb: &str, peptide: &str| {
            let date = date("2000-01-01");
            let structure = format!("{pdb}.pdb");
            TemplateRecord::new(
                pdb,
                "A",
                MhcClass::ClassI,
                ChainRole::MhcAlpha,
                peptide,
                date,
                "GSH",
                structure,
            )
        };
        let catalog = TemplateCatalog::from_records(vec![
            class_i("1AAA", "SIINFEKL"),
            class_i("2BBB", "LLFGYPVYV"),
            class_i("3CCC", "SIINFEKA"),
        ]);
        let ids: Vec<&str> = catalog
            .iter_peptide_lengths(MhcClass::ClassI, 8..=8)
            .map(|r| r.pdb_id().as_str())
            .collect();
        assert_eq!(ids, ["1AAA", "3CCC"]);
        let ids: Vec<&str> = catalog
            .iter_peptide_lengths(MhcClass::ClassI, 8..=9)
            .map(|r| r.pdb_id().as_str())
            .collect();
        assert_eq!(ids, ["1AAA", "2BBB", "3CCC"]);
    }

    #[test]
    fn class_ii_requires_both_chains_from_one_entry() {
        let class_ii = |pdb: &str, chain: &str, role: ChainRole, deposited: &str| {
            let sequence = if role == ChainRole::MhcAlpha { "IKEE" } else { "GDTR" };
            let structure = format!("{}.pdb", pdb.to_lowercase());
            TemplateRecord::new(
                pdb,
                chain,
                MhcClass::ClassII,
                role,
                "PKYVKQNTLKL",
                date(deposited),
                sequence,
                structure,
            )
        };
        let catalog = TemplateCatalog::from_records(vec![
            class_ii("4AAA", "A", ChainRole::MhcAlpha, "2001-01-01"),
            class_ii("5BBB", "B", ChainRole::MhcBeta, "2001-01-01"),
            class_ii("6CCC", "A", ChainRole::MhcAlpha, "2002-01-01"),
            class_ii("6ccc", "B", ChainRole::MhcBeta, "2002-01-01"),
        ]);
        let complexes = catalog.class_ii_complexes();
        assert_eq!(complexes.len(), 1);
        assert_eq!(complexes[0].pdb_id(), "6CCC");
        assert_eq!(*complexes[0].chains[0].role(), ChainRole::MhcAlpha);
        assert_eq!(*complexes[0].chains[1].role(), ChainRole::MhcBeta);
    }
}
