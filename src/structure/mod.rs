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

//! In-memory protein structures read from and written to PDB format.
//!
//! A [`StructureRecord`] owns its chains, residues and atoms. Renumbering returns
//! a new record, so a parsed model can be renumbered and aligned independently.

mod pdb;
mod renumber;

pub use renumber::MHC_ALPHA2_OFFSET;

use crate::mhc::{ChainRole, MhcClass};
use crate::sequence::{residue_name_to_letter, Sequence};
use crate::transform::RigidTransform;
use crate::Point;
use derive_getters::Getters;

/// Backbone atom names
pub const BACKBONE_ATOMS: [&str; 4] = ["N", "CA", "C", "O"];

#[derive(Debug, Clone, PartialEq, Getters)]
pub struct Atom {
    /// Atom name without padding, e.g. `CA`
    name: String,
    alt_loc: Option<char>,
    pos: Point,
    occupancy: f64,
    temperature_factor: f64,
    element: String,
    charge: isize,
}

impl Atom {
    pub fn new(name: &str, element: &str, pos: Point) -> Self {
        Self {
            name: name.to_string(),
            alt_loc: None,
            pos,
            occupancy: 1.0,
            temperature_factor: 0.0,
            element: element.to_string(),
            charge: 0,
        }
    }

    pub fn is_backbone(&self) -> bool {
        BACKBONE_ATOMS.contains(&self.name.as_str())
    }

    pub fn set_pos(&mut self, pos: Point) {
        self.pos = pos;
    }
}

#[derive(Debug, Clone, PartialEq, Getters)]
pub struct Residue {
    /// Three letter residue name
    name: String,
    number: i32,
    insertion: Option<char>,
    /// Atoms in file order
    atoms: Vec<Atom>,
}

impl Residue {
    pub fn new(name: &str, number: i32, insertion: Option<char>, atoms: Vec<Atom>) -> Self {
        Self {
            name: name.to_string(),
            number,
            insertion,
            atoms,
        }
    }

    /// One-letter amino acid code
    pub fn letter(&self) -> char {
        residue_name_to_letter(&self.name)
    }

    pub fn set_number(&mut self, number: i32, insertion: Option<char>) {
        self.number = number;
        self.insertion = insertion;
    }

    pub fn atom(&self, name: &str) -> Option<&Atom> {
        self.atoms.iter().find(|a| a.name() == name)
    }

    pub fn atoms_mut(&mut self) -> &mut [Atom] {
        &mut self.atoms
    }
}

#[derive(Debug, Clone, PartialEq, Getters)]
pub struct Chain {
    id: char,
    /// Residues in file order
    residues: Vec<Residue>,
}

impl Chain {
    pub fn new(id: char, residues: Vec<Residue>) -> Self {
        Self { id, residues }
    }

    pub fn sequence(&self) -> Sequence {
        self.residues.iter().map(Residue::letter).collect()
    }

    pub fn residues_mut(&mut self) -> &mut [Residue] {
        &mut self.residues
    }

    pub fn set_id(&mut self, id: char) {
        self.id = id;
    }

    pub fn atoms(&self) -> impl Iterator<Item = &Atom> {
        self.residues.iter().flat_map(|r| r.atoms.iter())
    }

    pub fn num_atoms(&self) -> usize {
        self.residues.iter().map(|r| r.atoms.len()).sum()
    }
}

/// Parsed PDB model: ordered chains plus records passed through unexamined.
#[derive(Debug, Clone, PartialEq, Default, Getters)]
pub struct StructureRecord {
    chains: Vec<Chain>,
    /// Header records preceding the first atom
    header: Vec<String>,
    /// HETATM records, written after the polymer chains
    hetero: Vec<String>,
}

impl StructureRecord {
    pub fn new(chains: Vec<Chain>) -> Self {
        Self {
            chains,
            ..Default::default()
        }
    }

    pub fn chains_mut(&mut self) -> &mut [Chain] {
        &mut self.chains
    }

    pub fn num_atoms(&self) -> usize {
        self.chains.iter().map(Chain::num_atoms).sum()
    }

    pub fn atoms(&self) -> impl Iterator<Item = &Atom> {
        self.chains.iter().flat_map(Chain::atoms)
    }

    /// Chains paired with their role, assigned from chain order.
    pub fn chains_with_roles(&self, class: MhcClass) -> impl Iterator<Item = (ChainRole, &Chain)> {
        self.chains
            .iter()
            .enumerate()
            .map(move |(i, chain)| (ChainRole::for_index(i, class), chain))
    }

    /// The chain playing `role`. TCR chains are not unique, the first is returned.
    pub fn chain_by_role(&self, role: ChainRole, class: MhcClass) -> Option<&Chain> {
        self.chains_with_roles(class)
            .find(|(r, _)| *r == role)
            .map(|(_, chain)| chain)
    }

    /// Peptide and MHC chains in canonical order, excluding any TCR chain.
    pub fn pmhc_chains(&self, class: MhcClass) -> Vec<(ChainRole, &Chain)> {
        self.chains_with_roles(class)
            .filter(|(role, _)| role.is_pmhc())
            .collect()
    }

    /// Apply a rigid transform to every atom of every chain.
    pub fn transform(&mut self, transform: &RigidTransform) {
        self.chains
            .iter_mut()
            .flat_map(|c| c.residues.iter_mut())
            .flat_map(|r| r.atoms.iter_mut())
            .for_each(|atom| atom.pos = transform.apply(&atom.pos));
    }
}
