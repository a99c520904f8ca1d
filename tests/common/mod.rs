//! Shared utilities for integration tests.
//!
//! Provides in-process stand-ins for the numbering and prediction engines, and
//! builders for small but realistic pMHC models.

#![allow(dead_code)]

use pmhcfold::engine::{EngineJob, PredictionEngine, PredictionOutput};
use pmhcfold::numbering::{DomainLabel, Numbering, NumberingResult, PositionLabel};
use pmhcfold::structure::{Atom, Chain, Residue, StructureRecord};
use pmhcfold::template::AlignmentFile;
use pmhcfold::transform::RigidTransform;
use pmhcfold::{ModelingError, Point, Result};
use std::cell::RefCell;
use std::path::PathBuf;
use std::process::Command;

pub const ALPHA1: &str = "GSHSMRYFFTSVSRPGRGEPRFIAVGYVDDTQFVRFDSDAASQRMEPRAPWIEQEGPEYWDGETRKVKAHSQTHRVDLGTLRGYYNQSEA";
pub const ALPHA2: &str = "GSHTVQRMYGCDVGSDWRFLRGYHQYAYDGKDYIALKEDLRSWTAADMAAQTTKHKWEAAHVAEQLRAYLEGTCVEWLRRYLENGKETLQRT";
pub const CLASS_II_ALPHA1: &str = "IKEEHVIIQAEFYLNPDQSGEFMFDFDGDEIFHVDMAKKETVWRLEEFGRFASFEAQGALANIAVDKANLEIMTKRSNYTPITN";
pub const BETA1: &str = "GDTRPRFLWQLKFECHFFNGTERVRLLERCIYNQEESVRFDSDVGEYRAVTELGRPDAEYWNSQKDLLEQRRAAVDTYCRHNYGVGESFTVQRR";

/// Signal peptide and membrane-proximal flanks found in full-length MHC chains
pub const LEADER: &str = "MAVMAPRTLLLLLSGALALTQTWA";
pub const TAIL: &str = "DAPKTHMTHHAVSDHEATLRCWALSFYPAEITLTWQ";

/// Template catalog directory shipped with the tests
pub fn catalog_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/files/templates")
}

/// Path to the compiled `pmhcfold` binary.
pub fn pmhcfold_binary() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_pmhcfold"))
}

pub fn pmhcfold() -> Command {
    Command::new(pmhcfold_binary())
}

/// Numbering engine labeling known domain motifs, positions counted from 1.
pub struct MotifNumbering;

impl Numbering for MotifNumbering {
    fn annotate(&self, sequence: &str, _scheme: &str) -> Result<NumberingResult> {
        let motifs = [
            (ALPHA1, DomainLabel::Alpha1),
            (ALPHA2, DomainLabel::Alpha2),
            (CLASS_II_ALPHA1, DomainLabel::Alpha1),
            (BETA1, DomainLabel::Beta1),
        ];
        let mut result = NumberingResult::unlabeled(sequence.len());
        let mut found = false;
        for (motif, label) in motifs {
            if let Some(start) = sequence.find(motif) {
                let positions = (1..=motif.len() as i32).map(|n| Some(PositionLabel::new(n, None)));
                result.label_domain(start..start + motif.len(), label, positions);
                found = true;
            }
        }
        if !found {
            return Err(ModelingError::NumberingFailure("no domain recognized".into()));
        }
        Ok(result)
    }
}

fn residue_name(letter: char) -> &'static str {
    match letter {
        'A' => "ALA",
        'R' => "ARG",
        'N' => "ASN",
        'D' => "ASP",
        'C' => "CYS",
        'Q' => "GLN",
        'E' => "GLU",
        'G' => "GLY",
        'H' => "HIS",
        'I' => "ILE",
        'L' => "LEU",
        'K' => "LYS",
        'M' => "MET",
        'F' => "PHE",
        'P' => "PRO",
        'S' => "SER",
        'T' => "THR",
        'W' => "TRP",
        'Y' => "TYR",
        'V' => "VAL",
        _ => "UNK",
    }
}

/// Chain of backbone-only residues along a twisted path.
pub fn chain(id: char, sequence: &str, origin: Point) -> Chain {
    let residues = sequence
        .chars()
        .enumerate()
        .map(|(i, letter)| {
            let t = i as f64;
            let center =
                origin + Point::new(1.5 * t, 4.0 * (0.35 * t).sin(), 4.0 * (0.35 * t).cos());
            let atoms = vec![
                Atom::new("N", "N", center),
                Atom::new("CA", "C", center + Point::new(1.46, 0.0, 0.0)),
                Atom::new("C", "C", center + Point::new(2.0, 1.42, 0.0)),
                Atom::new("O", "O", center + Point::new(1.3, 2.4, 0.3)),
            ];
            Residue::new(residue_name(letter), 200 + i as i32, None, atoms)
        })
        .collect();
    Chain::new(id, residues)
}

/// Engine output model: peptide, MHC chains and one TCR chain, with engine-style
/// chain identifiers.
pub fn model(peptide: &str, mhc_chains: &[&str]) -> StructureRecord {
    let mut chains = vec![chain('P', peptide, Point::new(0.0, 0.0, 12.0))];
    for (i, sequence) in mhc_chains.iter().enumerate() {
        chains.push(chain(
            (b'Q' + i as u8) as char,
            sequence,
            Point::new(-20.0, 10.0 * i as f64, 0.0),
        ));
    }
    chains.push(chain('T', "QVQLVESGGGVVQ", Point::new(5.0, -8.0, 30.0)));
    StructureRecord::new(chains)
}

/// Prediction engine writing fixed models and scores instead of predicting.
///
/// Model `n` is the first model moved by the `n`th transform.
pub struct FakeEngine {
    pub model: StructureRecord,
    pub motions: Vec<RigidTransform>,
    pub template_names: Option<Vec<String>>,
    /// Rank of a model whose last MHC alpha residue is missing
    pub truncated_rank: Option<usize>,
    /// Rank of a model file holding no structure at all
    pub garbage_rank: Option<usize>,
    /// Alignment file as seen by the structure pass
    pub alignment: RefCell<Option<AlignmentFile>>,
    pub calls: RefCell<Vec<&'static str>>,
}

impl FakeEngine {
    pub fn new(model: StructureRecord, motions: Vec<RigidTransform>) -> Self {
        Self {
            model,
            motions,
            template_names: Some(vec!["1vac_A".into(), "3p9l_A".into()]),
            truncated_rank: None,
            garbage_rank: None,
            alignment: RefCell::new(None),
            calls: RefCell::new(Vec::new()),
        }
    }
}

impl PredictionEngine for FakeEngine {
    fn build_features(&self, job: &EngineJob) -> Result<()> {
        self.calls.borrow_mut().push("features");
        assert!(job.fasta_path().is_file());
        std::fs::create_dir_all(job.feature_dir().join("msas"))?;
        std::fs::write(job.msa_features_path(), b"features")?;
        Ok(())
    }

    fn predict(&self, job: &EngineJob) -> Result<PredictionOutput> {
        self.calls.borrow_mut().push("predict");
        assert!(job.msa_features_path().is_file());
        let text = std::fs::read_to_string(job.alignment_path())?;
        let alignment = AlignmentFile::from_tsv(&text).expect("alignment file");
        *self.alignment.borrow_mut() = Some(alignment);

        let dir = job.prediction_dir();
        std::fs::create_dir_all(&dir)?;
        let mut scores = String::new();
        for (rank, motion) in self.motions.iter().enumerate() {
            let mut model = self.model.clone();
            if self.truncated_rank == Some(rank) {
                let mhc = model.chains()[1].clone();
                let last = mhc.residues().len() - 1;
                model.chains_mut()[1] = Chain::new(*mhc.id(), mhc.residues()[..last].to_vec());
            }
            model.transform(motion);
            let path = dir.join(format!("ranked_{rank}.pdb"));
            if self.garbage_rank == Some(rank) {
                std::fs::write(&path, "prediction diverged\n")?;
            } else {
                model.write(&path)?;
            }
            scores.push_str(&format!("0.{}\t{}.5\t0.8\t0.7\n", 9 - rank, 90 - rank));
        }
        std::fs::write(job.score_path(), scores)?;
        if let Some(names) = &self.template_names {
            let path = job.template_names_path();
            std::fs::create_dir_all(path.parent().expect("parent directory"))?;
            std::fs::write(path, names.join("\n") + "\n")?;
        }
        PredictionOutput::collect(job)
    }
}
