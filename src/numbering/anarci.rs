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

//! Numbering through an ANARCI-compatible executable.

use super::{DomainLabel, Numbering, NumberingResult, PositionLabel};
use crate::{ModelingError, Result};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::process::Command;

/// Runs `<executable> --sequence <fasta> --scheme <scheme> --outfile <out>` and
/// parses the numbered domains from the output file.
///
/// Query and output files are left in the work directory for inspection.
#[derive(Debug, Clone)]
pub struct AnarciNumbering {
    executable: PathBuf,
    workdir: PathBuf,
}

impl AnarciNumbering {
    pub fn new(executable: impl Into<PathBuf>, workdir: impl Into<PathBuf>) -> Self {
        Self {
            executable: executable.into(),
            workdir: workdir.into(),
        }
    }

    fn file_stem(sequence: &str) -> String {
        let mut hasher = DefaultHasher::new();
        sequence.hash(&mut hasher);
        format!("numbering_{:016x}", hasher.finish())
    }
}

impl Numbering for AnarciNumbering {
    fn annotate(&self, sequence: &str, scheme: &str) -> Result<NumberingResult> {
        let stem = Self::file_stem(sequence);
        let query = self.workdir.join(format!("{stem}.fasta"));
        let output = self.workdir.join(format!("{stem}.anarci"));
        crate::sequence::write_fasta(&query, [("query", sequence)])?;

        log::debug!(
            "Numbering {} residues with {} (scheme {})",
            sequence.len(),
            self.executable.display(),
            scheme
        );
        let result = Command::new(&self.executable)
            .arg("--sequence")
            .arg(&query)
            .arg("--scheme")
            .arg(scheme)
            .arg("--outfile")
            .arg(&output)
            .output()
            .map_err(|e| {
                ModelingError::NumberingFailure(format!(
                    "cannot run '{}': {}",
                    self.executable.display(),
                    e
                ))
            })?;

        if !result.status.success() {
            let log = self.workdir.join(format!("{stem}.log"));
            std::fs::write(&log, &result.stderr)?;
            return Err(ModelingError::NumberingFailure(format!(
                "'{}' exited with {}: {}",
                self.executable.display(),
                result.status,
                String::from_utf8_lossy(&result.stderr).trim()
            )));
        }
        let text = read_output(&output)?;
        parse_output(&text, sequence.len())
    }
}

fn read_output(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).map_err(|e| {
        ModelingError::NumberingFailure(format!("cannot read '{}': {}", path.display(), e))
    })
}

/// A numbered domain found in the engine output.
#[derive(Debug, Default)]
struct DomainBlock {
    label: Option<DomainLabel>,
    start: Option<usize>,
    end: Option<usize>,
    positions: Vec<PositionLabel>,
}

impl DomainBlock {
    fn is_empty(&self) -> bool {
        self.label.is_none() && self.positions.is_empty()
    }
}

/// Parse engine output into annotations for a sequence of length `len`.
pub(crate) fn parse_output(text: &str, len: usize) -> Result<NumberingResult> {
    let failure = |msg: String| ModelingError::NumberingFailure(msg);
    let mut blocks = Vec::new();
    let mut block = DomainBlock::default();

    for (i, line) in text.lines().enumerate() {
        let line = line.trim_end();
        if line.starts_with("//") {
            if !block.is_empty() {
                blocks.push(std::mem::take(&mut block));
            }
        } else if line.starts_with("# Domain") {
            if !block.is_empty() {
                blocks.push(std::mem::take(&mut block));
            }
        } else if let Some(row) = line.strip_prefix("#|") {
            let fields: Vec<&str> = row.split('|').map(str::trim).collect();
            if fields.len() < 6 || fields[0] == "species" {
                continue;
            }
            let parse_index = |s: &str| {
                s.parse::<usize>()
                    .map_err(|_| failure(format!("bad sequence index '{s}' on line {}", i + 1)))
            };
            block.label = Some(DomainLabel::parse(fields[1]));
            block.start = Some(parse_index(fields[4])?);
            block.end = Some(parse_index(fields[5])?);
        } else if line.starts_with('#') || line.is_empty() {
            continue;
        } else {
            let fields: Vec<&str> = line.split_whitespace().collect();
            let (number, insertion, residue) = match fields.as_slice() {
                [_, number, residue] => (*number, None, *residue),
                [_, number, insertion, residue] => (*number, insertion.chars().next(), *residue),
                _ => return Err(failure(format!("unexpected line {}: '{}'", i + 1, line))),
            };
            if residue == "-" {
                continue;
            }
            let number = number
                .parse()
                .map_err(|_| failure(format!("bad position '{number}' on line {}", i + 1)))?;
            block.positions.push(PositionLabel::new(number, insertion));
        }
    }
    if !block.is_empty() {
        blocks.push(block);
    }

    let mut result = NumberingResult::unlabeled(len);
    let mut numbered = 0;
    for block in blocks {
        let (Some(label), Some(start), Some(end)) = (block.label, block.start, block.end) else {
            return Err(failure("domain block without hit table".to_string()));
        };
        if start > end || end >= len {
            return Err(failure(format!(
                "domain {label} spans {start}..={end} outside sequence of length {len}"
            )));
        }
        if block.positions.len() != end - start + 1 {
            return Err(failure(format!(
                "domain {label} numbers {} residues but spans {}",
                block.positions.len(),
                end - start + 1
            )));
        }
        result.label_domain(start..end + 1, label, block.positions.into_iter().map(Some));
        numbered += 1;
    }
    if numbered == 0 {
        return Err(failure("no domain could be numbered".to_string()));
    }
    Ok(result)
}
