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

//! Trimming of MHC sequences to their peptide-presenting domains.

use crate::mhc::MhcChainKind;
use crate::numbering::{Numbering, NumberingResult};
use crate::sequence::Sequence;
use crate::{ModelingError, Result};
use std::ops::Range;

/// Cuts MHC chains down to the domains that form the peptide groove.
///
/// Signal peptides, transmembrane regions and membrane-proximal domains are
/// removed so that the result matches the domain extent of catalog templates.
#[derive(Debug)]
pub struct DomainTrimmer<N: Numbering> {
    numbering: N,
    scheme: String,
}

impl<N: Numbering> DomainTrimmer<N> {
    pub fn new(numbering: N, scheme: impl Into<String>) -> Self {
        Self {
            numbering,
            scheme: scheme.into(),
        }
    }

    /// Keep only the domains required for `kind`, concatenated in residue order.
    ///
    /// Numbering failures are reported as [`ModelingError::DomainNotFound`] so
    /// that the user sees a diagnostic specific to the offending chain.
    pub fn trim(&self, sequence: &Sequence, kind: MhcChainKind) -> Result<Sequence> {
        sequence.check_residues(kind.input_field())?;
        let numbering = self
            .numbering
            .annotate(sequence.as_str(), &self.scheme)
            .map_err(|err| {
                log::debug!("Numbering of {:?} chain failed: {}", kind, err);
                ModelingError::DomainNotFound { kind }
            })?;
        if numbering.len() != sequence.len() {
            log::debug!(
                "Numbering covers {} of {} residues",
                numbering.len(),
                sequence.len()
            );
            return Err(ModelingError::DomainNotFound { kind });
        }
        let ranges = domain_ranges(&numbering, kind)?;
        let trimmed: Sequence = ranges
            .iter()
            .flat_map(|range| sequence.as_str()[range.clone()].chars())
            .collect();
        log::info!(
            "Trimmed {:?} chain from {} to {} residues",
            kind,
            sequence.len(),
            trimmed.len()
        );
        Ok(trimmed)
    }
}

/// Index ranges of the domains retained for `kind`, sorted by position.
///
/// Each required domain contributes its longest contiguous run; a missing domain is an error.
pub(crate) fn domain_ranges(
    numbering: &NumberingResult,
    kind: MhcChainKind,
) -> Result<Vec<Range<usize>>> {
    let mut ranges = kind
        .domains()
        .iter()
        .map(|domain| {
            numbering
                .longest_run(domain)
                .ok_or(ModelingError::DomainNotFound { kind })
        })
        .collect::<Result<Vec<_>>>()?;
    ranges.sort_by_key(|range| range.start);
    Ok(ranges)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::numbering::{DomainLabel, PositionLabel};

    /// Numbering engine that labels fixed motifs found in the query.
    ///
    /// Each motif is located by substring search and labeled with its domain;
    /// positions count from 1 within the motif.
    pub(crate) struct MotifNumbering(pub Vec<(&'static str, DomainLabel)>);

    impl Numbering for MotifNumbering {
        fn annotate(&self, sequence: &str, _scheme: &str) -> Result<NumberingResult> {
            let mut result = NumberingResult::unlabeled(sequence.len());
            let mut found = false;
            for (motif, label) in &self.0 {
                if let Some(start) = sequence.find(motif) {
                    let positions =
                        (1..=motif.len() as i32).map(|n| Some(PositionLabel::new(n, None)));
                    result.label_domain(start..start + motif.len(), label.clone(), positions);
                    found = true;
                }
            }
            if !found {
                return Err(ModelingError::NumberingFailure("no motif".into()));
            }
            Ok(result)
        }
    }

    pub(crate) const ALPHA1: &str = "GSHSMRYFFTSVSRPGRGEPRFIAVGYVDDTQFVRFDSDAASQRMEPRAPWIEQEGPEYWDGETRKVKAHSQTHRVDLGTLRGYYNQSEA";
    pub(crate) const ALPHA2: &str = "GSHTVQRMYGCDVGSDWRFLRGYHQYAYDGKDYIALKEDLRSWTAADMAAQTTKHKWEAAHVAEQLRAYLEGTCVEWLRRYLENGKETLQRT";

    pub(crate) fn class_i_numbering() -> MotifNumbering {
        MotifNumbering(vec![(ALPHA1, DomainLabel::Alpha1), (ALPHA2, DomainLabel::Alpha2)])
    }

    #[test]
    fn class_i_keeps_alpha1_and_alpha2() {
        let raw = format!(
            "MAVMAPRTLLLLLSGALALTQTWA{ALPHA1}{ALPHA2}DAPKTHMTHHAVSDHEATLRCWALSFYPAEITLTWQ"
        );
        let trimmer = DomainTrimmer::new(class_i_numbering(), "imgt");
        let trimmed = trimmer
            .trim(&Sequence::new(&raw), MhcChainKind::ClassIAlpha)
            .unwrap();
        assert!(trimmed.len() < raw.len());
        assert_eq!(trimmed.as_str(), format!("{ALPHA1}{ALPHA2}"));
    }

    #[test]
    fn class_ii_alpha_keeps_alpha1_only() {
        let numbering = MotifNumbering(vec![
            ("IKEEHVIIQAEF", DomainLabel::Alpha1),
            ("TVPPEV", DomainLabel::Other("C1".into())),
        ]);
        let trimmer = DomainTrimmer::new(numbering, "imgt");
        let trimmed = trimmer
            .trim(&Sequence::new("MMILNIKEEHVIIQAEFTVPPEVTVL"), MhcChainKind::ClassIIAlpha)
            .unwrap();
        assert_eq!(trimmed.as_str(), "IKEEHVIIQAEF");
    }

    #[test]
    fn missing_domain_is_role_specific() {
        let trimmer = DomainTrimmer::new(class_i_numbering(), "imgt");
        let err = trimmer
            .trim(&Sequence::new(ALPHA1), MhcChainKind::ClassIIBeta)
            .unwrap_err();
        assert!(matches!(
            err,
            ModelingError::DomainNotFound {
                kind: MhcChainKind::ClassIIBeta
            }
        ));
    }

    #[test]
    fn numbering_failure_becomes_domain_not_found() {
        let trimmer = DomainTrimmer::new(class_i_numbering(), "imgt");
        let err = trimmer
            .trim(&Sequence::new("PEPTIDE"), MhcChainKind::ClassIAlpha)
            .unwrap_err();
        assert!(err.to_string().contains("'mhca_seq'"));
    }

    #[test]
    fn non_amino_acid_input_is_rejected_before_numbering() {
        let trimmer = DomainTrimmer::new(class_i_numbering(), "imgt");
        let err = trimmer
            .trim(&Sequence::new(&format!("MÉ{ALPHA1}{ALPHA2}")), MhcChainKind::ClassIAlpha)
            .unwrap_err();
        assert!(matches!(err, ModelingError::InputValidation(_)));
        assert!(err.to_string().contains("'mhca_seq' input contains 'É'"));
    }

    #[test]
    fn numbering_of_wrong_length_is_rejected() {
        struct OverlongNumbering;
        impl Numbering for OverlongNumbering {
            fn annotate(&self, sequence: &str, _scheme: &str) -> Result<NumberingResult> {
                let mut result = NumberingResult::unlabeled(sequence.len() + 5);
                let positions = (1..=5).map(|n| Some(PositionLabel::new(n, None)));
                let beyond = sequence.len()..sequence.len() + 5;
                result.label_domain(beyond, DomainLabel::Beta1, positions);
                Ok(result)
            }
        }
        let err = DomainTrimmer::new(OverlongNumbering, "imgt")
            .trim(&Sequence::new("GDTRPRF"), MhcChainKind::ClassIIBeta)
            .unwrap_err();
        assert!(matches!(err, ModelingError::DomainNotFound { .. }));
    }
}
