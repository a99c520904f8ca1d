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

//! Boundary to the external structure prediction engine.
//!
//! The engine is driven through files in the job directory: it reads the FASTA
//! and alignment files written by the pipeline and leaves ranked PDB models, a
//! score table and the names of the templates it used.

use crate::mhc::MhcClass;
use crate::template::ALIGNMENT_FILE;
use crate::{ModelingError, Result};
use derive_builder::Builder;
use derive_getters::Getters;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::OnceLock;

/// Score table written next to the ranked models
pub const SCORE_FILE: &str = "model_scores.txt";

/// Feature pickle produced by the MSA pass
const MSA_FEATURES_FILE: &str = "msa_features.pkl";

/// File layout and settings of one prediction job.
#[derive(Debug, Clone, Builder, Getters)]
#[builder(setter(into))]
pub struct EngineJob {
    job_id: String,
    /// Output directory of this job, `<output_dir>/<job_id>`
    job_dir: PathBuf,
    class: MhcClass,
    /// Template cutoff as `YYYY-MM-DD`
    max_template_date: String,
    #[builder(default)]
    relax: bool,
    /// Customized TCR-pMHC sequence databases
    tp_db: PathBuf,
    /// Engine database with `pdb_mmcif` and model parameters
    #[builder(default)]
    ori_db: Option<PathBuf>,
    #[builder(default = "1")]
    cuda_device: u32,
}

impl EngineJob {
    /// Input FASTA with one record per chain
    pub fn fasta_path(&self) -> PathBuf {
        self.job_dir.join(format!("{}.fasta", self.job_id))
    }

    /// Input FASTA with all chains joined into a single complex record
    pub fn complex_fasta_path(&self) -> PathBuf {
        self.job_dir.join(format!("{}_pmhc_oc.fasta", self.job_id))
    }

    pub fn alignment_path(&self) -> PathBuf {
        self.job_dir.join(ALIGNMENT_FILE)
    }

    pub fn status_path(&self) -> PathBuf {
        self.job_dir.join(crate::report::STATUS_FILE)
    }

    /// Output directory of the feature pass
    pub fn feature_dir(&self) -> PathBuf {
        self.job_dir.join(&self.job_id)
    }

    pub fn msa_features_path(&self) -> PathBuf {
        self.feature_dir().join(MSA_FEATURES_FILE)
    }

    /// Output directory of the structure pass
    pub fn prediction_dir(&self) -> PathBuf {
        self.job_dir.join(format!("{}_pmhc_oc", self.job_id))
    }

    pub fn score_path(&self) -> PathBuf {
        self.prediction_dir().join(SCORE_FILE)
    }

    pub fn template_names_path(&self) -> PathBuf {
        self.prediction_dir()
            .join("msas")
            .join("A")
            .join("template_names.txt")
    }

    fn ori_db_str(&self) -> String {
        self.ori_db
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_default()
    }
}

/// Files left by a successful structure pass
#[derive(Debug, Clone, PartialEq)]
pub struct PredictionOutput {
    /// `ranked_<n>.pdb` files ordered by `n`
    pub models: Vec<PathBuf>,
    pub scores: PathBuf,
    /// May be absent if the engine used no templates
    pub template_names: PathBuf,
}

impl PredictionOutput {
    /// Collect the ranked models and score file of a finished job.
    ///
    /// # Errors
    /// [`ModelingError::Engine`] if no ranked model or no score file exists.
    pub fn collect(job: &EngineJob) -> Result<Self> {
        let dir = job.prediction_dir();
        let models = ranked_models(&dir)?;
        if models.is_empty() {
            return Err(ModelingError::Engine(format!(
                "no ranked models in {}",
                dir.display()
            )));
        }
        let scores = job.score_path();
        if !scores.is_file() {
            return Err(ModelingError::Engine(format!(
                "missing score file {}",
                scores.display()
            )));
        }
        Ok(Self {
            models,
            scores,
            template_names: job.template_names_path(),
        })
    }
}

/// Rank of a `ranked_<n>.pdb` file name
pub fn model_rank(file_name: &str) -> Option<usize> {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    let pattern =
        PATTERN.get_or_init(|| Regex::new(r"^ranked_(\d+)\.pdb$").expect("valid pattern"));
    pattern.captures(file_name)?.get(1)?.as_str().parse().ok()
}

/// `ranked_<n>.pdb` files in `dir`, sorted by rank.
pub fn ranked_models(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut models: Vec<(usize, PathBuf)> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| {
            let rank = model_rank(entry.file_name().to_str()?)?;
            Some((rank, entry.path()))
        })
        .collect();
    models.sort_by_key(|(rank, _)| *rank);
    Ok(models.into_iter().map(|(_, path)| path).collect())
}

/// Two-pass prediction engine contract.
pub trait PredictionEngine {
    /// Build alignment features from the per-chain FASTA.
    fn build_features(&self, job: &EngineJob) -> Result<()>;
    /// Predict ranked structures of the joined complex using the template alignment.
    fn predict(&self, job: &EngineJob) -> Result<PredictionOutput>;
}

impl<T: PredictionEngine + ?Sized> PredictionEngine for &T {
    fn build_features(&self, job: &EngineJob) -> Result<()> {
        (**self).build_features(job)
    }
    fn predict(&self, job: &EngineJob) -> Result<PredictionOutput> {
        (**self).predict(job)
    }
}

/// Runs the customized AlphaFold multimer script as a subprocess.
#[derive(Debug, Clone)]
pub struct AlphaFoldCommand {
    python: String,
    script: String,
}

impl AlphaFoldCommand {
    pub fn new(python: impl Into<String>, script: impl Into<String>) -> Self {
        Self {
            python: python.into(),
            script: script.into(),
        }
    }

    fn database_args(job: &EngineJob) -> Vec<String> {
        let tp_db = job.tp_db.display();
        let ori_db = job.ori_db_str();
        vec![
            format!("--uniref90_database_path={tp_db}/uniref90.tcrmhc.fasta"),
            format!("--mgnify_database_path={tp_db}/mgnify.fasta"),
            format!("--template_mmcif_dir={ori_db}/pdb_mmcif/mmcif_files/"),
            format!("--obsolete_pdbs_path={ori_db}/pdb_mmcif/obsolete.dat"),
            format!("--small_bfd_database_path={tp_db}/small_bfd.tcrmhc.fasta"),
            format!("--pdb_seqres_database_path={tp_db}/pdb_seqres.txt"),
            format!("--uniprot_database_path={tp_db}/uniprot.tcrmhc.fasta"),
            format!("--data_dir={ori_db}"),
        ]
    }

    fn common_args(job: &EngineJob, fasta: &Path) -> Vec<String> {
        let mut args = vec![
            "--db_preset=reduced_dbs".to_string(),
            format!("--fasta_paths={}", fasta.display()),
            "--model_preset=multimer".to_string(),
            format!("--output_dir={}", job.job_dir.display()),
        ];
        args.extend(Self::database_args(job));
        args.push(format!("--max_template_date={}", job.max_template_date));
        args
    }

    /// Arguments of the feature-only pass
    pub fn feature_args(job: &EngineJob) -> Vec<String> {
        // one empty alignment slot per chain
        let empty_alignments = ",".repeat(job.class.num_mhc_chains() + 2);
        let mut args = Self::common_args(job, &job.fasta_path());
        args.extend([
            "--use_gpu_relax=False".to_string(),
            "--save_msa_features_only".to_string(),
            "--gen_feats_only".to_string(),
            "--models_to_relax=none".to_string(),
            "--feature_prefix=msa".to_string(),
            "--save_template_names".to_string(),
            "--use_custom_templates".to_string(),
            format!("--template_alignfile={empty_alignments}"),
        ]);
        args
    }

    /// Arguments of the structure pass
    pub fn structure_args(job: &EngineJob) -> Vec<String> {
        let relax = if job.relax { "True" } else { "False" };
        let models_to_relax = if job.relax { "all" } else { "none" };
        let mut args = Self::common_args(job, &job.complex_fasta_path());
        args.extend([
            "--use_custom_templates".to_string(),
            format!("--template_alignfile={}", job.alignment_path().display()),
            format!("--use_gpu_relax={relax}"),
            format!("--models_to_relax={models_to_relax}"),
            "--use_precomputed_msas=True".to_string(),
            "--num_multimer_predictions_per_model=1".to_string(),
            "--save_template_names".to_string(),
            "--has_gap_chn_brk".to_string(),
            "--msa_mode=single_sequence".to_string(),
            "--iptm_interface=1:1:2".to_string(),
            format!("--substitute_msa={}", job.msa_features_path().display()),
            format!("--status_file={}", job.status_path().display()),
        ]);
        args
    }

    fn run(&self, job: &EngineJob, args: &[String], pass: &str) -> Result<()> {
        log::debug!("{} {} {}", self.python, self.script, args.join(" "));
        let output = Command::new(&self.python)
            .arg(&self.script)
            .args(args)
            .env("CUDA_VISIBLE_DEVICES", job.cuda_device.to_string())
            .output()
            .map_err(|err| {
                ModelingError::Engine(format!("cannot start {} for the {pass}: {err}", self.python))
            })?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let tail: Vec<&str> = stderr.lines().rev().take(20).collect();
            return Err(ModelingError::Engine(format!(
                "{pass} exited with {}: {}",
                output.status,
                tail.into_iter().rev().collect::<Vec<_>>().join("\n")
            )));
        }
        Ok(())
    }
}

impl PredictionEngine for AlphaFoldCommand {
    fn build_features(&self, job: &EngineJob) -> Result<()> {
        self.run(job, &Self::feature_args(job), "feature pass")?;
        if !job.msa_features_path().is_file() {
            return Err(ModelingError::Engine(format!(
                "feature pass produced no {}",
                job.msa_features_path().display()
            )));
        }
        // raw alignments are not needed once features are saved
        let msas = job.feature_dir().join("msas");
        if msas.is_dir() {
            std::fs::remove_dir_all(msas)?;
        }
        Ok(())
    }

    fn predict(&self, job: &EngineJob) -> Result<PredictionOutput> {
        self.run(job, &Self::structure_args(job), "structure pass")?;
        PredictionOutput::collect(job)
    }
}
