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

//! Amino acid sequences and FASTA output.

use crate::{ModelingError, Result};
use bio::io::fasta;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Immutable amino acid sequence in one-letter codes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct Sequence(String);

impl Sequence {
    /// Normalizes to upper case and drops whitespace.
    pub fn new(residues: &str) -> Self {
        Self(
            residues
                .chars()
                .filter(|c| !c.is_whitespace())
                .map(|c| c.to_ascii_uppercase())
                .collect(),
        )
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Require one-letter amino acid codes only; `field` names the input in the
    /// error message.
    pub fn check_residues(&self, field: &str) -> Result<()> {
        match self.0.chars().find(|c| !c.is_ascii_uppercase()) {
            Some(c) => Err(ModelingError::InputValidation(format!(
                "The '{field}' input contains '{c}', which is not a one-letter amino acid code."
            ))),
            None => Ok(()),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Display for Sequence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Sequence {
    fn from(residues: &str) -> Self {
        Self::new(residues)
    }
}

impl FromIterator<char> for Sequence {
    fn from_iter<I: IntoIterator<Item = char>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Write named sequences to a FASTA file, one record per entry.
pub fn write_fasta<'a>(
    path: impl AsRef<Path>,
    records: impl IntoIterator<Item = (&'a str, &'a str)>,
) -> std::io::Result<()> {
    let mut writer = fasta::Writer::to_file(path)?;
    for (id, residues) in records {
        writer.write(id, None, residues.as_bytes())?;
    }
    writer.flush()
}

/// Convert a PDB residue name to its one-letter amino acid code.
///
/// Handles the 20 standard amino acids plus selenomethionine; anything else is `X`.
pub fn residue_name_to_letter(name: &str) -> char {
    match name.trim().to_uppercase().as_str() {
        "ALA" => 'A',
        "ARG" => 'R',
        "LYS" => 'K',
        "ASP" => 'D',
        "GLU" => 'E',
        "GLN" => 'Q',
        "ASN" => 'N',
        "HIS" => 'H',
        "TRP" => 'W',
        "PHE" => 'F',
        "TYR" => 'Y',
        "THR" => 'T',
        "SER" => 'S',
        "GLY" => 'G',
        "PRO" => 'P',
        "CYS" => 'C',
        "MET" | "MSE" => 'M',
        "VAL" => 'V',
        "LEU" => 'L',
        "ILE" => 'I',
        _ => 'X',
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_input() {
        let seq = Sequence::new(" siin fekl\n");
        assert_eq!(seq.as_str(), "SIINFEKL");
        assert_eq!(seq.len(), 8);
    }

    #[test]
    fn non_letters_are_rejected() {
        assert!(Sequence::new("GSHSMRYF").check_residues("mhca_seq").is_ok());
        let err = Sequence::new("GSHSµRYF").check_residues("mhca_seq").unwrap_err();
        assert!(matches!(err, ModelingError::InputValidation(_)));
        assert!(err.to_string().contains("'mhca_seq' input contains 'µ'"));
        assert!(Sequence::new("SIIN-FEKL").check_residues("pep_seq").is_err());
    }

    #[test]
    fn residue_letters() {
        assert_eq!(residue_name_to_letter("GLY"), 'G');
        assert_eq!(residue_name_to_letter("mse"), 'M');
        assert_eq!(residue_name_to_letter("HOH"), 'X');
    }

    #[test]
    fn fasta_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("job.fasta");
        write_fasta(&path, [("Peptide", "SIINFEKL"), ("MHCa", "GSHSMRY")]).unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content, ">Peptide\nSIINFEKL\n>MHCa\nGSHSMRY\n");
    }
}
