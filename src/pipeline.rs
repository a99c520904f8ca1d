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

//! Modeling job from user input to aligned, renumbered models.
//!
//! Steps run strictly in order within the job directory:
//!
//! 1. validate the peptide and trim MHC chains to their presenting domains
//! 2. select templates and write the alignment and FASTA inputs
//! 3. run the feature and structure passes of the prediction engine
//! 4. read scores, move ranked models into the job directory and clean up
//! 5. renumber each model and superpose it onto `ranked_0` by its pMHC part
//!
//! Failures up to and including the engine abort the job. Post-processing
//! failures are confined to the model concerned.

use crate::engine::{EngineJob, EngineJobBuilder, PredictionEngine, PredictionOutput};
use crate::mhc::MhcClass;
use crate::numbering::{Numbering, DEFAULT_SCHEME};
use crate::report::{JobStatistics, StatusLog};
use crate::sequence::{write_fasta, Sequence};
use crate::structure::StructureRecord;
use crate::superpose::StructuralAligner;
use crate::template::{parse_max_date, AlignmentFile, TemplateCatalog, TemplateSelector};
use crate::trim::DomainTrimmer;
use crate::{ModelingError, Result};
use anyhow::Context;
use chrono::NaiveDate;
use itertools::Itertools;
use std::path::{Path, PathBuf};

/// FASTA record names, in chain order
const CHAIN_NAMES: [&str; 3] = ["Peptide", "MHCa", "MHCb"];

/// User input of one modeling job
#[derive(Debug, Clone)]
pub struct JobInput {
    pub job_id: String,
    /// Parent directory of the job directory
    pub output_dir: PathBuf,
    pub peptide: Sequence,
    pub mhca: Sequence,
    /// Present for class II targets only
    pub mhcb: Option<Sequence>,
    /// PDB identifiers never used as templates
    pub ignore_pdbs: Vec<String>,
    /// `YYYY-MM-DD`; empty or malformed means no cutoff
    pub max_template_date: String,
    pub relax: bool,
    pub tp_db: PathBuf,
    pub ori_db: Option<PathBuf>,
    pub cuda_device: u32,
}

impl JobInput {
    pub fn job_dir(&self) -> PathBuf {
        self.output_dir.join(&self.job_id)
    }

    pub fn mhc_class(&self) -> MhcClass {
        MhcClass::from_inputs(self.mhcb.as_ref().map(Sequence::as_str))
    }

    /// Checks needing neither the template catalog nor any external tool.
    ///
    /// # Errors
    /// [`ModelingError::InputValidation`] for a peptide of the wrong length or
    /// sequences with characters other than one-letter amino acid codes.
    pub fn validate(&self) -> Result<()> {
        self.peptide.check_residues("pep_seq")?;
        self.mhc_class().validate_peptide(self.peptide.as_str())?;
        self.mhca.check_residues("mhca_seq")?;
        if let Some(mhcb) = &self.mhcb {
            mhcb.check_residues("mhcb_seq")?;
        }
        Ok(())
    }
}

/// Validated target with MHC chains trimmed to their presenting domains
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedTarget {
    pub class: MhcClass,
    pub peptide: Sequence,
    /// Alpha, then beta for class II
    pub mhc_chains: Vec<Sequence>,
}

impl PreparedTarget {
    fn chains(&self) -> impl Iterator<Item = &Sequence> {
        std::iter::once(&self.peptide).chain(&self.mhc_chains)
    }

    /// Write the per-chain FASTA and the single-record complex FASTA.
    fn write_fasta_files(&self, job: &EngineJob) -> std::io::Result<()> {
        write_fasta(
            job.fasta_path(),
            CHAIN_NAMES.into_iter().zip(self.chains().map(Sequence::as_str)),
        )?;
        let complex = self.chains().map(Sequence::as_str).join(":");
        write_fasta(job.complex_fasta_path(), [("pMHC", complex.as_str())])
    }
}

/// Post-processing outcome of one ranked model
#[derive(Debug, Clone, PartialEq)]
pub struct ModelReport {
    pub path: PathBuf,
    /// MHC residues carry domain numbering
    pub mhc_renumbered: bool,
    /// pMHC RMSD to `ranked_0` after superposition; `None` if left unaligned
    pub rmsd: Option<f64>,
}

/// Result of a finished job
#[derive(Debug, Clone)]
pub struct JobSummary {
    pub job_dir: PathBuf,
    pub target: PreparedTarget,
    /// Number of templates offered to the engine
    pub num_templates: usize,
    pub statistics: JobStatistics,
    pub models: Vec<ModelReport>,
}

/// Runs modeling jobs against a template catalog, a numbering engine and a
/// prediction engine.
pub struct Pipeline<'a, N: Numbering, E: PredictionEngine> {
    catalog: &'a TemplateCatalog,
    numbering: N,
    engine: E,
    scheme: String,
    peptide_length_tolerance: usize,
}

impl<'a, N: Numbering, E: PredictionEngine> Pipeline<'a, N, E> {
    pub fn new(catalog: &'a TemplateCatalog, numbering: N, engine: E) -> Self {
        Self {
            catalog,
            numbering,
            engine,
            scheme: DEFAULT_SCHEME.to_string(),
            peptide_length_tolerance: 0,
        }
    }

    pub fn with_scheme(mut self, scheme: impl Into<String>) -> Self {
        self.scheme = scheme.into();
        self
    }

    pub fn with_peptide_length_tolerance(mut self, tolerance: usize) -> Self {
        self.peptide_length_tolerance = tolerance;
        self
    }

    /// Validate the peptide length and trim MHC chains.
    ///
    /// # Errors
    /// [`ModelingError::InputValidation`] or [`ModelingError::DomainNotFound`];
    /// both are raised before any engine runs.
    pub fn prepare(&self, input: &JobInput) -> Result<PreparedTarget> {
        input.validate()?;
        let class = input.mhc_class();
        log::info!("Class {} target with {} residue peptide", class, input.peptide.len());

        let trimmer = DomainTrimmer::new(&self.numbering, self.scheme.as_str());
        let raw_chains = std::iter::once(&input.mhca).chain(input.mhcb.as_ref());
        let mhc_chains = raw_chains
            .zip(class.chain_kinds())
            .map(|(sequence, kind)| trimmer.trim(sequence, *kind))
            .collect::<Result<Vec<_>>>()?;
        Ok(PreparedTarget {
            class,
            peptide: input.peptide.clone(),
            mhc_chains,
        })
    }

    /// Select templates for a prepared target.
    pub fn select_templates(
        &self,
        target: &PreparedTarget,
        exclude_ids: &[String],
        max_date: NaiveDate,
    ) -> Result<AlignmentFile> {
        let alignment = TemplateSelector::new(self.catalog)
            .with_peptide_length_tolerance(self.peptide_length_tolerance)
            .select(&target.peptide, &target.mhc_chains, target.class, exclude_ids, max_date)?;
        if alignment.is_empty() {
            log::warn!("No eligible templates, the engine runs without template guidance");
        } else {
            log::info!("Selected {} templates", alignment.len());
        }
        Ok(alignment)
    }

    /// Run a complete job.
    pub fn run(&self, input: &JobInput) -> anyhow::Result<JobSummary> {
        let job_dir = input.job_dir();
        std::fs::create_dir_all(&job_dir)
            .with_context(|| format!("Cannot create job directory {}", job_dir.display()))?;

        let target = self.prepare(input)?;
        let max_date = parse_max_date(&input.max_template_date);
        let alignment = self.select_templates(&target, &input.ignore_pdbs, max_date)?;

        let job = EngineJobBuilder::default()
            .job_id(input.job_id.as_str())
            .job_dir(job_dir.clone())
            .class(target.class)
            .max_template_date(max_date.format("%Y-%m-%d").to_string())
            .relax(input.relax)
            .tp_db(input.tp_db.clone())
            .ori_db(input.ori_db.clone())
            .cuda_device(input.cuda_device)
            .build()?;

        alignment.write(job.alignment_path())?;
        target
            .write_fasta_files(&job)
            .context("Cannot write FASTA input")?;

        let status = StatusLog::new(&job_dir);
        status.append("Building MSAs...")?;
        self.engine.build_features(&job)?;
        status.append("Building Structures...")?;
        let output = self.engine.predict(&job)?;

        let statistics = JobStatistics::from_engine_files(&output.scores, &output.template_names)?;
        let models = move_models(&output, &job_dir)?;
        remove_intermediates(&job).context("Cannot remove intermediate files")?;
        statistics.write(&job_dir)?;

        let models = self.postprocess(&models, target.class, input.relax, &status)?;
        log::info!("Job {} finished with {} models", input.job_id, models.len());
        Ok(JobSummary {
            job_dir,
            target,
            num_templates: alignment.len(),
            statistics,
            models,
        })
    }

    /// Parse and renumber one model.
    ///
    /// A failed domain renumbering leaves the numbering as it was.
    fn renumber_model(
        &self,
        path: &Path,
        class: MhcClass,
        relax: bool,
        status: &StatusLog,
    ) -> Result<(StructureRecord, bool)> {
        let mut structure = StructureRecord::from_file(path)?;
        if !relax {
            structure = structure.renumber_canonical()?;
        }
        match structure.renumber_mhc_domains(class, &self.numbering, &self.scheme) {
            Ok(renumbered) => Ok((renumbered, true)),
            Err(err) => {
                report_model_issue(status, path, "keeps its MHC residue numbering", &err)?;
                Ok((structure, false))
            }
        }
    }

    /// Renumber all models and superpose them onto the first one.
    fn postprocess(
        &self,
        models: &[PathBuf],
        class: MhcClass,
        relax: bool,
        status: &StatusLog,
    ) -> Result<Vec<ModelReport>> {
        let mut reports = Vec::with_capacity(models.len());
        let mut structures = Vec::with_capacity(models.len());
        for path in models {
            let renumbered = self.renumber_model(path, class, relax, status);
            let (structure, mhc_renumbered) = match renumbered {
                Ok((structure, renumbered)) => (Some(structure), renumbered),
                Err(err) if err.is_per_model() => {
                    report_model_issue(status, path, "was not post-processed", &err)?;
                    (None, false)
                }
                Err(err) => return Err(err),
            };
            structures.push(structure);
            reports.push(ModelReport {
                path: path.clone(),
                mhc_renumbered,
                rmsd: None,
            });
        }

        let Some(Some(reference)) = structures.first().cloned() else {
            log::warn!("No reference model, models are left unaligned");
            status.append("Warning: no reference model, models are left unaligned")?;
            return write_models(&structures, reports);
        };
        let aligner = StructuralAligner::new(class);
        for (i, structure) in structures.iter_mut().enumerate() {
            let Some(model) = structure.as_mut() else {
                continue;
            };
            if i == 0 {
                reports[i].rmsd = Some(0.0);
                continue;
            }
            match aligner.align(&reference, model) {
                Ok(superposition) => {
                    log::debug!(
                        "Aligned {} on {} atoms, RMSD {:.3}",
                        reports[i].path.display(),
                        superposition.num_atoms,
                        superposition.rmsd
                    );
                    reports[i].rmsd = Some(superposition.rmsd);
                    *model = superposition.structure;
                }
                Err(err) if err.is_per_model() => {
                    report_model_issue(status, &reports[i].path, "is left unaligned", &err)?;
                }
                Err(err) => return Err(err),
            }
        }
        write_models(&structures, reports)
    }
}

/// Log a non-fatal model problem and note it in the status file.
fn report_model_issue(
    status: &StatusLog,
    path: &Path,
    outcome: &str,
    err: &ModelingError,
) -> Result<()> {
    let name = path.file_name().unwrap_or_default().to_string_lossy();
    log::warn!("Model {} {}: {}", name, outcome, err);
    status.append(&format!("Warning: model {name} {outcome}: {err}"))
}

fn write_models(
    structures: &[Option<StructureRecord>],
    reports: Vec<ModelReport>,
) -> Result<Vec<ModelReport>> {
    for (structure, report) in structures.iter().zip(&reports) {
        if let Some(structure) = structure {
            structure.write(&report.path)?;
        }
    }
    Ok(reports)
}

/// Move ranked models from the engine output into the job directory.
fn move_models(output: &PredictionOutput, job_dir: &Path) -> anyhow::Result<Vec<PathBuf>> {
    output
        .models
        .iter()
        .map(|source| {
            let name = source
                .file_name()
                .with_context(|| format!("Model path {} has no file name", source.display()))?;
            let target = job_dir.join(name);
            std::fs::rename(source, &target).with_context(|| {
                format!("Cannot move {} to {}", source.display(), target.display())
            })?;
            Ok(target)
        })
        .collect()
}

/// Remove engine work directories and input files.
fn remove_intermediates(job: &EngineJob) -> std::io::Result<()> {
    for dir in [job.feature_dir(), job.prediction_dir()] {
        if dir.is_dir() {
            std::fs::remove_dir_all(dir)?;
        }
    }
    for file in [job.fasta_path(), job.complex_fasta_path(), job.alignment_path()] {
        if file.is_file() {
            std::fs::remove_file(file)?;
        }
    }
    Ok(())
}
