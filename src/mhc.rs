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

//! MHC class, chain roles and peptide length rules.

use crate::numbering::DomainLabel;
use crate::{ModelingError, Result};
use serde::{Deserialize, Serialize};
use std::ops::RangeInclusive;

/// Peptide lengths accepted for class I targets
pub const CLASS_I_PEPTIDE_LENGTHS: RangeInclusive<usize> = 8..=15;
/// Class II peptides are a 9 aa core with one flanking residue on each side
pub const CLASS_II_PEPTIDE_LENGTH: usize = 11;

/// MHC presentation architecture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, derive_more::Display)]
pub enum MhcClass {
    #[display("I")]
    ClassI,
    #[display("II")]
    ClassII,
}

impl MhcClass {
    /// Class II iff a non-empty beta chain is supplied.
    pub fn from_inputs(mhcb_seq: Option<&str>) -> Self {
        match mhcb_seq.map(str::trim) {
            Some(seq) if !seq.is_empty() => Self::ClassII,
            _ => Self::ClassI,
        }
    }

    /// Numeric class as stored in template catalogs.
    pub fn number(&self) -> u8 {
        match self {
            Self::ClassI => 1,
            Self::ClassII => 2,
        }
    }

    pub fn from_number(number: u8) -> Option<Self> {
        match number {
            1 => Some(Self::ClassI),
            2 => Some(Self::ClassII),
            _ => None,
        }
    }

    /// Number of MHC chains in the complex
    pub fn num_mhc_chains(&self) -> usize {
        match self {
            Self::ClassI => 1,
            Self::ClassII => 2,
        }
    }

    /// Reject peptides whose length does not fit the groove of this class.
    pub fn validate_peptide(&self, peptide: &str) -> Result<()> {
        let len = peptide.chars().count();
        match self {
            Self::ClassI if !CLASS_I_PEPTIDE_LENGTHS.contains(&len) => {
                Err(ModelingError::InputValidation(format!(
                    "It looks like your input peptide is {len} amino acids long. For class I \
                     TCR-pMHC complexes, kindly ensure the peptide length is between {}-{}.",
                    CLASS_I_PEPTIDE_LENGTHS.start(),
                    CLASS_I_PEPTIDE_LENGTHS.end()
                )))
            }
            Self::ClassII if len != CLASS_II_PEPTIDE_LENGTH => {
                Err(ModelingError::InputValidation(format!(
                    "It looks like your input peptide is {len} amino acids (aa) long. For class II \
                     TCR-pMHC complexes, kindly ensure that the peptide input is \
                     {CLASS_II_PEPTIDE_LENGTH} aa in length. Specifically, it should consist of a \
                     9 aa core with an additional 1 aa at both the N-terminal and C-terminal of \
                     the core peptide."
                )))
            }
            _ => Ok(()),
        }
    }

    /// Trimming roles of the MHC chains, in canonical chain order.
    pub fn chain_kinds(&self) -> &'static [MhcChainKind] {
        match self {
            Self::ClassI => &[MhcChainKind::ClassIAlpha],
            Self::ClassII => &[MhcChainKind::ClassIIAlpha, MhcChainKind::ClassIIBeta],
        }
    }
}

/// Which MHC chain a sequence is, which decides the domains kept by trimming.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MhcChainKind {
    /// Class I heavy chain; alpha 1 and alpha 2 are kept
    ClassIAlpha,
    /// Class II alpha chain; alpha 1 is kept
    ClassIIAlpha,
    /// Class II beta chain; beta 1 is kept
    ClassIIBeta,
}

impl MhcChainKind {
    /// Domain labels retained for this chain, in sequence order.
    pub fn domains(&self) -> &'static [DomainLabel] {
        match self {
            Self::ClassIAlpha => &[DomainLabel::Alpha1, DomainLabel::Alpha2],
            Self::ClassIIAlpha => &[DomainLabel::Alpha1],
            Self::ClassIIBeta => &[DomainLabel::Beta1],
        }
    }

    pub fn role(&self) -> ChainRole {
        match self {
            Self::ClassIAlpha | Self::ClassIIAlpha => ChainRole::MhcAlpha,
            Self::ClassIIBeta => ChainRole::MhcBeta,
        }
    }

    /// Command line input holding this chain
    pub fn input_field(&self) -> &'static str {
        match self {
            Self::ClassIAlpha | Self::ClassIIAlpha => "mhca_seq",
            Self::ClassIIBeta => "mhcb_seq",
        }
    }

    pub(crate) fn domain_not_found_message(&self) -> String {
        const CLASS_II_HINT: &str = "If your input target is a class I TCR-pMHC complex, then \
             mhcb_seq variable should be left empty or left out completely.";
        match self {
            Self::ClassIAlpha => "Fail to identify alpha 1 and alpha 2 domain sequence in the \
                 'mhca_seq' input of your class I MHC target."
                .to_string(),
            Self::ClassIIAlpha => format!(
                "Fail to identify alpha 1 domain sequence in the 'mhca_seq' input of your \
                 class II MHC target. {CLASS_II_HINT}"
            ),
            Self::ClassIIBeta => format!(
                "Fail to identify beta 1 domain sequence in the 'mhcb_seq' input of your \
                 class II MHC target. {CLASS_II_HINT}"
            ),
        }
    }
}

/// Role of a chain in a predicted complex.
///
/// Chains are emitted by the engine in input order: peptide, MHC alpha, MHC beta
/// (class II only). Any chain after those is a TCR chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ChainRole {
    Peptide,
    MhcAlpha,
    MhcBeta,
    Tcr,
}

impl ChainRole {
    pub fn for_index(index: usize, class: MhcClass) -> Self {
        match (index, class) {
            (0, _) => Self::Peptide,
            (1, _) => Self::MhcAlpha,
            (2, MhcClass::ClassII) => Self::MhcBeta,
            _ => Self::Tcr,
        }
    }

    /// Part of the peptide-MHC substructure
    pub fn is_pmhc(&self) -> bool {
        !matches!(self, Self::Tcr)
    }

    /// Trimming role of an MHC chain, `None` for peptide and TCR.
    pub fn mhc_kind(&self, class: MhcClass) -> Option<MhcChainKind> {
        match (self, class) {
            (Self::MhcAlpha, MhcClass::ClassI) => Some(MhcChainKind::ClassIAlpha),
            (Self::MhcAlpha, MhcClass::ClassII) => Some(MhcChainKind::ClassIIAlpha),
            (Self::MhcBeta, MhcClass::ClassII) => Some(MhcChainKind::ClassIIBeta),
            _ => None,
        }
    }
}
