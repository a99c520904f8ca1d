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

//! Chain and residue renumbering conventions.

use super::StructureRecord;
use crate::mhc::{ChainRole, MhcClass};
use crate::numbering::{DomainLabel, Numbering};
use crate::{ModelingError, Result};
use itertools::Itertools;

/// Added to alpha 2 positions of class I heavy chains so that both domains
/// occupy disjoint residue number ranges.
pub const MHC_ALPHA2_OFFSET: i32 = 1000;

/// Chain identifiers assigned in file order
const CHAIN_IDS: &str = "ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

fn domain_offset(domain: &DomainLabel, class: MhcClass) -> i32 {
    match (class, domain) {
        (MhcClass::ClassI, DomainLabel::Alpha2) => MHC_ALPHA2_OFFSET,
        _ => 0,
    }
}

/// Residue numbers from numbering positions. Unnumbered residues before the
/// first numbered one count down towards it, later ones continue from the
/// previous residue.
fn residue_numbers(positions: &[Option<(i32, Option<char>)>]) -> Vec<(i32, Option<char>)> {
    let first = positions
        .iter()
        .enumerate()
        .find_map(|(i, position)| position.map(|(number, _)| number - i as i32))
        .unwrap_or(1);
    let mut previous = first - 1;
    positions
        .iter()
        .map(|position| {
            let (number, insertion) = position.unwrap_or((previous + 1, None));
            previous = number;
            (number, insertion)
        })
        .collect()
}

impl StructureRecord {
    /// Relabel chains `A`, `B`, ... in file order and number residues from 1 within
    /// each chain. Insertion codes are dropped.
    ///
    /// # Errors
    /// [`ModelingError::MalformedStructure`] if there are more chains than identifiers.
    pub fn renumber_canonical(&self) -> Result<StructureRecord> {
        if self.chains.len() > CHAIN_IDS.len() {
            return Err(ModelingError::MalformedStructure(format!(
                "{} chains exceed available chain identifiers",
                self.chains.len()
            )));
        }
        let mut record = self.clone();
        for (chain, id) in record.chains.iter_mut().zip(CHAIN_IDS.chars()) {
            chain.id = id;
            for (number, residue) in (1..).zip(chain.residues.iter_mut()) {
                residue.set_number(number, None);
            }
        }
        Ok(record)
    }

    /// Renumber MHC chain residues by their domain numbering positions.
    ///
    /// MHC chains are found by role. Numbered residues take their scheme position
    /// (plus [`MHC_ALPHA2_OFFSET`] for class I alpha 2); residues outside a domain
    /// are numbered sequentially around them. Numbers strictly increase along
    /// each chain.
    ///
    /// # Errors
    /// Numbering failures, including numbers that would not increase, or
    /// [`ModelingError::DomainNotFound`] if a required domain is missing. Callers
    /// decide whether to keep the original numbering.
    pub fn renumber_mhc_domains(
        &self,
        class: MhcClass,
        numbering: &impl Numbering,
        scheme: &str,
    ) -> Result<StructureRecord> {
        let mut record = self.clone();
        for (index, chain) in record.chains.iter_mut().enumerate() {
            let Some(kind) = ChainRole::for_index(index, class).mhc_kind(class) else {
                continue;
            };
            let annotation = numbering.annotate(chain.sequence().as_str(), scheme)?;
            if annotation.len() != chain.residues.len() {
                return Err(ModelingError::NumberingFailure(format!(
                    "numbered {} residues of a {} residue chain",
                    annotation.len(),
                    chain.residues.len()
                )));
            }
            crate::trim::domain_ranges(&annotation, kind)?;

            let positions: Vec<_> = annotation
                .residues()
                .iter()
                .map(|label| match (&label.domain, label.position) {
                    (Some(domain), Some(position)) => Some((
                        position.number + domain_offset(domain, class),
                        position.insertion,
                    )),
                    _ => None,
                })
                .collect();
            let numbers = residue_numbers(&positions);
            if let Some((i, _)) = numbers.iter().tuple_windows().find_position(|(a, b)| a >= b) {
                return Err(ModelingError::NumberingFailure(format!(
                    "residue numbers of chain {} do not increase after residue {}",
                    chain.id,
                    i + 1
                )));
            }
            for (residue, (number, insertion)) in chain.residues.iter_mut().zip(numbers) {
                residue.set_number(number, insertion);
            }
            log::debug!("Renumbered MHC chain {} as {:?}", chain.id, kind);
        }
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::numbering::{NumberingResult, PositionLabel};
    use crate::structure::tests::chain;
    use crate::Point;

    fn record() -> StructureRecord {
        StructureRecord::new(vec![
            chain('P', &["SER", "ILE", "ILE"], 5, Point::zeros()),
            chain('M', &["GLY", "SER", "HIS", "SER", "MET", "ARG"], 24, Point::new(0.0, 10.0, 0.0)),
            chain('T', &["ALA", "ALA"], 100, Point::new(0.0, 20.0, 0.0)),
        ])
    }

    fn positions(numbers: impl IntoIterator<Item = i32>) -> Vec<Option<PositionLabel>> {
        numbers
            .into_iter()
            .map(|n| Some(PositionLabel::new(n, None)))
            .collect()
    }

    /// Labels residues 0..3 as alpha 1 and 3..5 as alpha 2; short chains stay unlabeled.
    struct FixedNumbering;

    impl Numbering for FixedNumbering {
        fn annotate(&self, sequence: &str, _scheme: &str) -> Result<NumberingResult> {
            let mut result = NumberingResult::unlabeled(sequence.len());
            if sequence.len() < 5 {
                return Ok(result);
            }
            result.label_domain(
                0..3,
                DomainLabel::Alpha1,
                [(1, None), (2, None), (2, Some('A'))]
                    .map(|(n, i)| Some(PositionLabel::new(n, i))),
            );
            result.label_domain(3..5, DomainLabel::Alpha2, positions(1..=2));
            Ok(result)
        }
    }

    struct FailingNumbering;

    impl Numbering for FailingNumbering {
        fn annotate(&self, _sequence: &str, _scheme: &str) -> Result<NumberingResult> {
            Err(ModelingError::NumberingFailure("diverged".into()))
        }
    }

    fn numbers(record: &StructureRecord, chain: usize) -> Vec<(i32, Option<char>)> {
        record.chains()[chain]
            .residues()
            .iter()
            .map(|r| (*r.number(), *r.insertion()))
            .collect()
    }

    #[test]
    fn canonical_chain_ids_and_numbers() {
        let renumbered = record().renumber_canonical().unwrap();
        let ids: String = renumbered.chains().iter().map(|c| *c.id()).collect();
        assert_eq!(ids, "ABC");
        assert_eq!(numbers(&renumbered, 0), vec![(1, None), (2, None), (3, None)]);
        assert_eq!(numbers(&renumbered, 2), vec![(1, None), (2, None)]);
        let first = renumbered.atoms().next().unwrap();
        assert_eq!(*first.serial(), 1);
        // coordinates are untouched
        assert_eq!(
            renumbered.atoms().map(|a| *a.pos()).collect::<Vec<_>>(),
            record().atoms().map(|a| *a.pos()).collect::<Vec<_>>()
        );
    }

    #[test]
    fn canonical_is_idempotent() {
        let once = record().renumber_canonical().unwrap();
        let twice = once.renumber_canonical().unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn class_i_domain_numbers() {
        let renumbered = record()
            .renumber_mhc_domains(MhcClass::ClassI, &FixedNumbering, "imgt")
            .unwrap();
        assert_eq!(
            numbers(&renumbered, 1),
            vec![
                (1, None),
                (2, None),
                (2, Some('A')),
                (1001, None),
                (1002, None),
                (1003, None)
            ]
        );
        // peptide and TCR keep their numbering
        assert_eq!(numbers(&renumbered, 0), numbers(&record(), 0));
        assert_eq!(numbers(&renumbered, 2), numbers(&record(), 2));
    }

    #[test]
    fn class_ii_requires_beta_domain() {
        // FixedNumbering never labels beta 1, so the beta chain cannot be renumbered
        let err = record()
            .renumber_mhc_domains(MhcClass::ClassII, &FixedNumbering, "imgt")
            .unwrap_err();
        assert!(matches!(err, ModelingError::DomainNotFound { .. }));
    }

    #[test]
    fn numbering_failure_propagates() {
        let err = record()
            .renumber_mhc_domains(MhcClass::ClassI, &FailingNumbering, "imgt")
            .unwrap_err();
        assert!(matches!(err, ModelingError::NumberingFailure(_)));
    }

    /// Alpha 1 starts at the second residue and alpha 2 restarts at position 1.
    struct LateStartNumbering;

    impl Numbering for LateStartNumbering {
        fn annotate(&self, sequence: &str, _scheme: &str) -> Result<NumberingResult> {
            let mut result = NumberingResult::unlabeled(sequence.len());
            if sequence.len() < 5 {
                return Ok(result);
            }
            result.label_domain(1..4, DomainLabel::Alpha1, positions(1..=3));
            result.label_domain(4..6, DomainLabel::Alpha2, positions(1..=2));
            Ok(result)
        }
    }

    #[test]
    fn leading_residues_number_down_to_domain() {
        let renumbered = record()
            .renumber_mhc_domains(MhcClass::ClassI, &LateStartNumbering, "imgt")
            .unwrap();
        let mhc: Vec<i32> = numbers(&renumbered, 1).into_iter().map(|(n, _)| n).collect();
        assert_eq!(mhc, vec![0, 1, 2, 3, 1001, 1002]);

        // distinct numbers keep every residue through a write and read
        let written = StructureRecord::parse(&renumbered.to_pdb().unwrap()).unwrap();
        assert_eq!(written.chains()[1].residues().len(), 6);
        assert_eq!(numbers(&written, 1), numbers(&renumbered, 1));
    }

    /// Alpha 1 positions run backwards.
    struct OverlappingNumbering;

    impl Numbering for OverlappingNumbering {
        fn annotate(&self, sequence: &str, _scheme: &str) -> Result<NumberingResult> {
            let mut result = NumberingResult::unlabeled(sequence.len());
            if sequence.len() < 5 {
                return Ok(result);
            }
            result.label_domain(0..3, DomainLabel::Alpha1, positions([12, 11, 10]));
            result.label_domain(3..6, DomainLabel::Alpha2, positions(1..=3));
            Ok(result)
        }
    }

    #[test]
    fn non_increasing_numbers_are_rejected() {
        let err = record()
            .renumber_mhc_domains(MhcClass::ClassI, &OverlappingNumbering, "imgt")
            .unwrap_err();
        assert!(matches!(err, ModelingError::NumberingFailure(_)), "{err}");
        assert_eq!(
            residue_numbers(&[None, Some((5, None)), None]),
            vec![(4, None), (5, None), (6, None)]
        );
    }
}
