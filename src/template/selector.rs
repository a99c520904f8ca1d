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

//! Eligibility filtering of templates and target-to-template correspondence.

use super::{AlignmentFile, AlignmentRow, TemplateCatalog, TemplateComplex};
use crate::mhc::MhcClass;
use crate::sequence::Sequence;
use crate::{ModelingError, Result};
use bio::alignment::pairwise::Aligner;
use bio::alignment::AlignmentOperation;
use bio::scores::blosum62;
use chrono::NaiveDate;

/// Cutoff used when no valid maximum template date is given
pub const MAX_DATE_SENTINEL: &str = "2100-01-01";

/// The [`MAX_DATE_SENTINEL`] date
pub fn no_cutoff_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2100, 1, 1).unwrap_or(NaiveDate::MAX)
}

const GAP_OPEN: i32 = -11;
const GAP_EXTEND: i32 = -1;

/// Parse a `YYYY-MM-DD` cutoff date; empty or malformed input means no cutoff.
pub fn parse_max_date(date: &str) -> NaiveDate {
    NaiveDate::parse_from_str(date.trim(), "%Y-%m-%d").unwrap_or_else(|_| {
        if !date.trim().is_empty() {
            log::warn!(
                "Ignoring malformed max template date '{}', using {}",
                date,
                MAX_DATE_SENTINEL
            );
        }
        no_cutoff_date()
    })
}

/// Selects templates for a target and builds their residue correspondence.
///
/// Eligible templates are emitted in catalog order without ranking.
#[derive(Debug, Clone)]
pub struct TemplateSelector<'a> {
    catalog: &'a TemplateCatalog,
    /// Largest accepted difference between target and template peptide lengths
    peptide_length_tolerance: usize,
}

impl<'a> TemplateSelector<'a> {
    pub fn new(catalog: &'a TemplateCatalog) -> Self {
        Self {
            catalog,
            peptide_length_tolerance: 0,
        }
    }

    pub fn with_peptide_length_tolerance(mut self, tolerance: usize) -> Self {
        self.peptide_length_tolerance = tolerance;
        self
    }

    /// Build the alignment file for a target.
    ///
    /// A template is eligible iff it was deposited on or before `max_date`, its PDB
    /// identifier is not in `exclude_ids` (case-insensitive) and its peptide length
    /// is compatible. Class II templates must provide both MHC chains from a single
    /// deposition. `mhc_chains` are the trimmed chains in canonical order.
    pub fn select(
        &self,
        peptide: &Sequence,
        mhc_chains: &[Sequence],
        mhc_class: MhcClass,
        exclude_ids: &[String],
        max_date: NaiveDate,
    ) -> Result<AlignmentFile> {
        if mhc_chains.len() != mhc_class.num_mhc_chains() {
            return Err(ModelingError::InputValidation(format!(
                "class {} targets need {} MHC chain(s), got {}",
                mhc_class,
                mhc_class.num_mhc_chains(),
                mhc_chains.len()
            )));
        }
        let lengths = peptide.len().saturating_sub(self.peptide_length_tolerance)
            ..=peptide.len() + self.peptide_length_tolerance;

        let candidates: Vec<TemplateComplex> = match mhc_class {
            MhcClass::ClassI => self
                .catalog
                .iter_peptide_lengths(MhcClass::ClassI, lengths)
                .map(TemplateComplex::single)
                .collect(),
            MhcClass::ClassII => self
                .catalog
                .class_ii_complexes()
                .into_iter()
                .filter(|complex| lengths.contains(&complex.peptide().len()))
                .collect(),
        };

        let is_excluded = |complex: &TemplateComplex| {
            exclude_ids
                .iter()
                .any(|id| complex.pdb_id().eq_ignore_ascii_case(id.trim()))
        };

        let rows: Vec<AlignmentRow> = candidates
            .iter()
            .filter(|complex| complex.deposition_date() <= max_date)
            .filter(|complex| !is_excluded(complex))
            .map(|complex| align_to_template(peptide, mhc_chains, complex))
            .collect();

        log::info!(
            "Selected {} class {} template(s) out of {} candidate(s)",
            rows.len(),
            mhc_class,
            candidates.len()
        );
        if rows.is_empty() {
            log::warn!("No eligible pMHC templates; prediction runs without template guidance");
        }
        Ok(AlignmentFile::new(rows))
    }
}

/// Residue correspondence between the concatenated target and template chains.
fn align_to_template(
    peptide: &Sequence,
    mhc_chains: &[Sequence],
    complex: &TemplateComplex,
) -> AlignmentRow {
    let template_peptide = complex.peptide();
    let mut mapping = peptide_mapping(peptide.len(), template_peptide.len());

    let mut target_offset = peptide.len();
    let mut template_offset = template_peptide.len();
    for (target, template) in mhc_chains.iter().zip(&complex.chains) {
        let template = template.sequence();
        mapping.extend(
            global_mapping(target.as_bytes(), template.as_bytes())
                .into_iter()
                .map(|(q, t)| (q + target_offset, t + template_offset)),
        );
        target_offset += target.len();
        template_offset += template.len();
    }

    let target: Vec<u8> = std::iter::once(peptide)
        .chain(mhc_chains)
        .flat_map(|s| s.as_bytes().iter().copied())
        .collect();
    let template: Vec<u8> = std::iter::once(template_peptide)
        .chain(complex.chains.iter().map(|r| r.sequence()))
        .flat_map(|s| s.as_bytes().iter().copied())
        .collect();
    let identities = mapping
        .iter()
        .filter(|(q, t)| target[*q] == template[*t])
        .count();

    AlignmentRow {
        template_file: complex.structure().to_path_buf(),
        mapping,
        identities,
        target_len: target_offset,
        template_len: template_offset,
    }
}

/// Peptide correspondence anchored at both termini.
///
/// Equal lengths map 1:1. Otherwise the N-terminal half of the shorter peptide is
/// mapped from the N terminus and the remainder from the C terminus, keeping the
/// anchor residues of both ends in register.
pub(crate) fn peptide_mapping(target_len: usize, template_len: usize) -> Vec<(usize, usize)> {
    let shortest = target_len.min(template_len);
    let n_terminal = shortest.div_ceil(2);
    let c_terminal = shortest - n_terminal;
    (0..n_terminal)
        .map(|i| (i, i))
        .chain((0..c_terminal).map(|k| {
            (
                target_len - c_terminal + k,
                template_len - c_terminal + k,
            )
        }))
        .collect()
}

/// Aligned (match or substitution) column pairs of a global BLOSUM62 alignment.
pub(crate) fn global_mapping(target: &[u8], template: &[u8]) -> Vec<(usize, usize)> {
    if target.is_empty() || template.is_empty() {
        return Vec::new();
    }
    let mut aligner =
        Aligner::with_capacity(target.len(), template.len(), GAP_OPEN, GAP_EXTEND, blosum62);
    let alignment = aligner.global(target, template);
    let (mut x, mut y) = (alignment.xstart, alignment.ystart);
    let mut pairs = Vec::with_capacity(target.len().min(template.len()));
    for op in &alignment.operations {
        match op {
            AlignmentOperation::Match | AlignmentOperation::Subst => {
                pairs.push((x, y));
                x += 1;
                y += 1;
            }
            AlignmentOperation::Ins => x += 1,
            AlignmentOperation::Del => y += 1,
            AlignmentOperation::Xclip(n) => x += n,
            AlignmentOperation::Yclip(n) => y += n,
        }
    }
    pairs
}
