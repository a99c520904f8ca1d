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

//! Per-residue domain numbering.
//!
//! A [`Numbering`] engine assigns each residue of a sequence a domain label and a
//! position label following a numbering scheme. The engine itself is external;
//! [`AnarciNumbering`] drives an ANARCI-compatible executable.

mod anarci;
pub use anarci::AnarciNumbering;

use crate::Result;
use serde::{Deserialize, Serialize};
use std::ops::Range;

/// Default scheme identifier handed to the numbering engine
pub const DEFAULT_SCHEME: &str = "imgt";

/// Domain of an MHC chain as labeled by the numbering engine.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DomainLabel {
    /// G-alpha 1 domain
    Alpha1,
    /// G-alpha 2 domain
    Alpha2,
    /// G-beta 1 domain
    Beta1,
    Other(String),
}

impl DomainLabel {
    /// Parse an engine chain-type label. `A1`, `A2` and `B1` are recognized.
    pub fn parse(label: &str) -> Self {
        match label.trim().to_uppercase().as_str() {
            "A1" => Self::Alpha1,
            "A2" => Self::Alpha2,
            "B1" => Self::Beta1,
            other => Self::Other(other.to_string()),
        }
    }
}

impl std::fmt::Display for DomainLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Alpha1 => write!(f, "A1"),
            Self::Alpha2 => write!(f, "A2"),
            Self::Beta1 => write!(f, "B1"),
            Self::Other(s) => write!(f, "{s}"),
        }
    }
}

/// Scheme position of a residue, e.g. `49` or `49A`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PositionLabel {
    pub number: i32,
    pub insertion: Option<char>,
}

impl PositionLabel {
    pub fn new(number: i32, insertion: Option<char>) -> Self {
        Self { number, insertion }
    }
}

impl std::str::FromStr for PositionLabel {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let s = s.trim();
        let split = s
            .find(|c: char| c.is_ascii_alphabetic())
            .unwrap_or(s.len());
        let number = s[..split]
            .parse()
            .map_err(|_| format!("invalid position label '{s}'"))?;
        let insertion = s[split..].chars().next();
        Ok(Self { number, insertion })
    }
}

impl std::fmt::Display for PositionLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.insertion {
            Some(c) => write!(f, "{}{}", self.number, c),
            None => write!(f, "{}", self.number),
        }
    }
}

/// Annotation of a single residue. Residues outside any numbered domain carry no labels.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResidueAnnotation {
    pub index: usize,
    pub domain: Option<DomainLabel>,
    pub position: Option<PositionLabel>,
}

/// Annotations aligned 1:1 with the numbered sequence.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct NumberingResult {
    residues: Vec<ResidueAnnotation>,
}

impl NumberingResult {
    /// Build from annotations; indices must run `0..len` in order.
    pub fn new(residues: Vec<ResidueAnnotation>) -> Self {
        debug_assert!(residues.iter().enumerate().all(|(i, r)| r.index == i));
        Self { residues }
    }

    /// Unannotated result for a sequence of length `len`.
    pub fn unlabeled(len: usize) -> Self {
        Self::new(
            (0..len)
                .map(|index| ResidueAnnotation {
                    index,
                    domain: None,
                    position: None,
                })
                .collect(),
        )
    }

    /// Label residues `range` with `domain` and the given positions (`None`
    /// entries keep no position).
    pub fn label_domain(
        &mut self,
        range: Range<usize>,
        domain: DomainLabel,
        positions: impl IntoIterator<Item = Option<PositionLabel>>,
    ) {
        let mut positions = positions.into_iter();
        for residue in &mut self.residues[range] {
            residue.domain = Some(domain.clone());
            residue.position = positions.next().flatten();
        }
    }

    pub fn len(&self) -> usize {
        self.residues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.residues.is_empty()
    }

    pub fn residues(&self) -> &[ResidueAnnotation] {
        &self.residues
    }

    /// Contiguous runs of identical domain labels as `(label, index range)`.
    pub fn domain_runs(&self) -> Vec<(DomainLabel, Range<usize>)> {
        let mut runs: Vec<(DomainLabel, Range<usize>)> = Vec::new();
        for residue in &self.residues {
            let Some(domain) = &residue.domain else {
                continue;
            };
            match runs.last_mut() {
                Some((label, range)) if label == domain && range.end == residue.index => {
                    range.end += 1;
                }
                _ => runs.push((domain.clone(), residue.index..residue.index + 1)),
            }
        }
        runs
    }

    /// Longest contiguous run carrying `domain`, if any.
    pub fn longest_run(&self, domain: &DomainLabel) -> Option<Range<usize>> {
        self.domain_runs()
            .into_iter()
            .filter(|(label, _)| label == domain)
            .map(|(_, range)| range)
            .reduce(|best, range| if range.len() > best.len() { range } else { best })
    }
}

/// Capability to number a sequence according to a scheme.
pub trait Numbering {
    /// Annotate every residue of `sequence`.
    ///
    /// # Errors
    /// [`crate::ModelingError::NumberingFailure`] if no consistent domain numbering exists.
    fn annotate(&self, sequence: &str, scheme: &str) -> Result<NumberingResult>;
}

impl<T: Numbering + ?Sized> Numbering for &T {
    fn annotate(&self, sequence: &str, scheme: &str) -> Result<NumberingResult> {
        (**self).annotate(sequence, scheme)
    }
}

impl<T: Numbering + ?Sized> Numbering for Box<T> {
    fn annotate(&self, sequence: &str, scheme: &str) -> Result<NumberingResult> {
        (**self).annotate(sequence, scheme)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn position_labels() {
        let p: PositionLabel = "49A".parse().unwrap();
        assert_eq!(p, PositionLabel::new(49, Some('A')));
        assert_eq!(p.to_string(), "49A");
        let p: PositionLabel = " 7 ".parse().unwrap();
        assert_eq!(p, PositionLabel::new(7, None));
        assert!("A".parse::<PositionLabel>().is_err());
    }

    #[test]
    fn domain_runs_are_contiguous() {
        let mut result = NumberingResult::unlabeled(10);
        result.label_domain(1..4, DomainLabel::Alpha1, std::iter::repeat(None));
        result.label_domain(4..7, DomainLabel::Alpha2, std::iter::repeat(None));
        let runs = result.domain_runs();
        assert_eq!(
            runs,
            vec![(DomainLabel::Alpha1, 1..4), (DomainLabel::Alpha2, 4..7)]
        );
        assert_eq!(result.longest_run(&DomainLabel::Alpha2), Some(4..7));
        assert_eq!(result.longest_run(&DomainLabel::Beta1), None);
    }

    #[test]
    fn longest_of_split_runs() {
        let mut result = NumberingResult::unlabeled(12);
        result.label_domain(0..2, DomainLabel::Beta1, std::iter::repeat(None));
        result.label_domain(5..11, DomainLabel::Beta1, std::iter::repeat(None));
        assert_eq!(result.longest_run(&DomainLabel::Beta1), Some(5..11));
    }

    #[test]
    fn domain_label_parsing() {
        assert_eq!(DomainLabel::parse("a1"), DomainLabel::Alpha1);
        assert_eq!(DomainLabel::parse("B1"), DomainLabel::Beta1);
        assert_eq!(DomainLabel::parse("H"), DomainLabel::Other("H".into()));
    }
}
