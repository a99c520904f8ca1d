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

//! Superposition of models by their peptide-MHC substructure.
//!
//! Chains are matched by role rather than by identifier, and the fitted transform
//! is applied to the whole target so that any TCR chains follow the pMHC frame.

use crate::mhc::MhcClass;
use crate::structure::{Atom, Chain, Residue, StructureRecord, BACKBONE_ATOMS};
use crate::transform::{rmsd, RigidTransform, MIN_SUPERPOSITION_POINTS};
use crate::{ModelingError, Point, Result};

/// Outcome of aligning one model onto a reference
#[derive(Debug, Clone)]
pub struct Superposition {
    pub transform: RigidTransform,
    /// RMSD over the fitted atoms after superposition
    pub rmsd: f64,
    /// Number of atom pairs used in the fit
    pub num_atoms: usize,
    /// The transformed target
    pub structure: StructureRecord,
}

/// Rigid pMHC superposition for a given MHC class.
#[derive(Debug, Clone, Copy)]
pub struct StructuralAligner {
    class: MhcClass,
}

impl StructuralAligner {
    pub fn new(class: MhcClass) -> Self {
        Self { class }
    }

    /// Superpose `target` onto `reference` using their pMHC chains.
    ///
    /// # Errors
    /// [`ModelingError::AlignmentMismatch`] if the pMHC substructures differ in chain
    /// or residue count, or share fewer than three atoms.
    pub fn align(
        &self,
        reference: &StructureRecord,
        target: &StructureRecord,
    ) -> Result<Superposition> {
        let (fixed, mobile) = self.matched_positions(reference, target)?;
        let transform = RigidTransform::superpose(&fixed, &mobile)?;
        let moved: Vec<Point> = mobile.iter().map(|p| transform.apply(p)).collect();
        let mut structure = target.clone();
        structure.transform(&transform);
        Ok(Superposition {
            transform,
            rmsd: rmsd(&fixed, &moved),
            num_atoms: fixed.len(),
            structure,
        })
    }

    /// Corresponding atom positions of the pMHC substructures.
    ///
    /// Backbone atoms are preferred; all commonly named atoms are used only when no
    /// backbone atom pairs up.
    fn matched_positions(
        &self,
        reference: &StructureRecord,
        target: &StructureRecord,
    ) -> Result<(Vec<Point>, Vec<Point>)> {
        let expected = self.class.num_mhc_chains() + 1;
        let reference_chains = reference.pmhc_chains(self.class);
        let target_chains = target.pmhc_chains(self.class);
        if reference_chains.len() != expected || target_chains.len() != expected {
            return Err(ModelingError::AlignmentMismatch(format!(
                "class {} pMHC needs {} chains, reference has {} and target has {}",
                self.class,
                expected,
                reference_chains.len(),
                target_chains.len()
            )));
        }

        let mut residue_pairs: Vec<(&Residue, &Residue)> = Vec::new();
        for ((role, fixed), (_, mobile)) in reference_chains.iter().zip(&target_chains) {
            if fixed.residues().len() != mobile.residues().len() {
                return Err(ModelingError::AlignmentMismatch(format!(
                    "{:?} chain has {} residues in the reference but {} in the target",
                    role,
                    fixed.residues().len(),
                    mobile.residues().len()
                )));
            }
            residue_pairs.extend(residue_pairs_of(fixed, mobile));
        }

        let mut pairs = atom_pairs(&residue_pairs, Atom::is_backbone);
        if pairs.is_empty() {
            log::debug!("No backbone atoms in common, using all matching atoms");
            pairs = atom_pairs(&residue_pairs, |_| true);
        }
        if pairs.len() < MIN_SUPERPOSITION_POINTS {
            return Err(ModelingError::AlignmentMismatch(format!(
                "only {} matching pMHC atoms (backbone names {:?})",
                pairs.len(),
                BACKBONE_ATOMS
            )));
        }
        Ok(pairs.into_iter().unzip())
    }
}

fn residue_pairs_of<'a>(
    fixed: &'a Chain,
    mobile: &'a Chain,
) -> impl Iterator<Item = (&'a Residue, &'a Residue)> {
    fixed.residues().iter().zip(mobile.residues())
}

/// Positions of same-named atoms in paired residues, in reference atom order.
fn atom_pairs(
    residues: &[(&Residue, &Residue)],
    include: impl Fn(&Atom) -> bool,
) -> Vec<(Point, Point)> {
    residues
        .iter()
        .flat_map(|(fixed, mobile)| {
            fixed
                .atoms()
                .iter()
                .filter(|atom| include(atom))
                .filter_map(|atom| {
                    mobile
                        .atom(atom.name())
                        .map(|other| (*atom.pos(), *other.pos()))
                })
        })
        .collect()
}
