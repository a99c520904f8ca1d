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

//! PDB reading and writing on top of `pdbtbx`.
//!
//! Only ATOM records of the first model are interpreted. HETATM and header
//! records are kept verbatim and written back unchanged.

use super::{Atom, Chain, Residue, StructureRecord};
use crate::{ModelingError, Point, Result};
use itertools::Itertools;
use pdbtbx::{Format, ReadOptions, StrictnessLevel, PDB};
use std::io::{BufReader, BufWriter};
use std::path::Path;

/// Record name in columns 1-6
fn record_name(line: &str) -> &str {
    line.get(..6).unwrap_or(line).trim_end()
}

fn malformed(reason: impl Into<String>) -> ModelingError {
    ModelingError::MalformedStructure(reason.into())
}

/// Lines `pdbtbx` does not keep: header records before the first coordinate
/// record, and HETATM records of the first model.
fn passthrough_records(text: &str) -> (Vec<String>, Vec<String>) {
    let mut header = Vec::new();
    let mut hetero = Vec::new();
    let mut in_coordinates = false;
    for line in text.lines() {
        match record_name(line) {
            "ATOM" | "MODEL" | "TER" => in_coordinates = true,
            "HETATM" => {
                in_coordinates = true;
                hetero.push(line.to_string());
            }
            "ENDMDL" => break,
            "" | "END" | "MASTER" | "CONECT" => {}
            _ if !in_coordinates => header.push(line.to_string()),
            _ => {}
        }
    }
    (header, hetero)
}

fn single_char(text: Option<&str>) -> Option<char> {
    text.and_then(|t| t.trim().chars().next())
}

fn read_chain(chain: &pdbtbx::Chain) -> Result<Option<Chain>> {
    let id = chain.id().chars().next().unwrap_or(' ');
    let mut residues = Vec::new();
    for residue in chain.residues() {
        let Some(name) = residue.name() else {
            continue;
        };
        let atoms: Vec<Atom> = residue
            .conformers()
            .flat_map(|conformer| {
                let alt_loc = single_char(conformer.alternative_location());
                conformer.atoms().filter(|atom| !atom.hetero()).map(move |atom| {
                    Atom {
                        name: atom.name().to_string(),
                        alt_loc,
                        pos: Point::new(atom.x(), atom.y(), atom.z()),
                        occupancy: atom.occupancy(),
                        temperature_factor: atom.b_factor(),
                        element: atom.element().map(|e| e.symbol().to_string()).unwrap_or_default(),
                        charge: atom.charge(),
                    }
                })
            })
            .collect();
        if atoms.is_empty() {
            continue;
        }
        let number = i32::try_from(residue.serial_number()).map_err(|_| {
            malformed(format!(
                "residue number {} out of range",
                residue.serial_number()
            ))
        })?;
        residues.push(Residue::new(
            name,
            number,
            single_char(residue.insertion_code()),
            atoms,
        ));
    }
    Ok((!residues.is_empty()).then(|| Chain::new(id, residues)))
}

impl StructureRecord {
    /// Parse PDB text.
    ///
    /// # Errors
    /// [`ModelingError::MalformedStructure`] when `pdbtbx` rejects the text or no
    /// ATOM record is present.
    pub fn parse(text: &str) -> Result<Self> {
        let (pdb, warnings) = ReadOptions::new()
            .set_format(Format::Pdb)
            .set_level(StrictnessLevel::Loose)
            .read_raw(BufReader::new(text.as_bytes()))
            .map_err(|errors| malformed(errors.iter().map(|e| e.to_string()).join("; ")))?;
        for warning in &warnings {
            log::debug!("PDB: {}", warning);
        }

        let mut chains = Vec::new();
        if let Some(model) = pdb.models().next() {
            for chain in model.chains() {
                if let Some(chain) = read_chain(chain)? {
                    chains.push(chain);
                }
            }
        }
        if chains.is_empty() {
            return Err(malformed("no ATOM records found"));
        }
        let (header, hetero) = passthrough_records(text);
        Ok(Self {
            chains,
            header,
            hetero,
        })
    }

    /// Read and parse a PDB file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        Self::parse(&std::fs::read_to_string(path)?)
    }

    /// Polymer chains as a single-model `pdbtbx` structure. Atom serials are
    /// assigned in file order.
    fn to_pdbtbx(&self) -> Result<PDB> {
        let mut model = pdbtbx::Model::new(1);
        let mut serial = 0;
        for chain in &self.chains {
            let mut pdb_chain = pdbtbx::Chain::new(chain.id.to_string().as_str())
                .ok_or_else(|| malformed(format!("invalid chain identifier '{}'", chain.id)))?;
            for residue in &chain.residues {
                let insertion = residue.insertion.map(String::from);
                for atom in &residue.atoms {
                    serial += 1;
                    let pdb_atom = pdbtbx::Atom::new(
                        false,
                        serial,
                        atom.name.as_str(),
                        atom.pos.x,
                        atom.pos.y,
                        atom.pos.z,
                        atom.occupancy,
                        atom.temperature_factor,
                        atom.element.as_str(),
                        atom.charge,
                    )
                    .ok_or_else(|| {
                        malformed(format!(
                            "cannot write atom {} of residue {}{}",
                            atom.name, residue.name, residue.number
                        ))
                    })?;
                    let alt_loc = atom.alt_loc.map(String::from);
                    pdb_chain.add_atom(
                        pdb_atom,
                        (residue.number as isize, insertion.as_deref()),
                        (residue.name.as_str(), alt_loc.as_deref()),
                    );
                }
            }
            // TER record consumes a serial
            serial += 1;
            model.add_chain(pdb_chain);
        }
        let mut pdb = PDB::new();
        pdb.add_model(model);
        Ok(pdb)
    }

    /// Serialize to PDB text with a TER record after each chain.
    pub fn to_pdb(&self) -> Result<String> {
        let mut buffer = Vec::new();
        pdbtbx::save_pdb_raw(
            &self.to_pdbtbx()?,
            BufWriter::new(&mut buffer),
            StrictnessLevel::Loose,
        );
        let coordinates = String::from_utf8_lossy(&buffer);

        let mut text = String::new();
        let polymer = coordinates
            .lines()
            .filter(|line| !matches!(record_name(line), "END" | "MASTER"));
        for line in self
            .header
            .iter()
            .map(String::as_str)
            .chain(polymer)
            .chain(self.hetero.iter().map(String::as_str))
        {
            text.push_str(line);
            text.push('\n');
        }
        text.push_str("END\n");
        Ok(text)
    }

    /// Write PDB text to a file, replacing it.
    pub fn write(&self, path: impl AsRef<Path>) -> Result<()> {
        std::fs::write(path, self.to_pdb()?)?;
        Ok(())
    }
}
