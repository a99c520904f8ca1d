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

use crate::{
    config::ModelingConfig,
    engine::AlphaFoldCommand,
    numbering::AnarciNumbering,
    pipeline::{JobInput, Pipeline},
    sequence::Sequence,
    template::{TemplateCatalog, MAX_DATE_SENTINEL},
};
use anyhow::{Context, Result};
use clap::Parser;
use pretty_env_logger::env_logger::DEFAULT_FILTER_ENV;
use std::path::PathBuf;

/// Model a peptide-MHC complex with template guided structure prediction
#[derive(Debug, Parser)]
#[clap(version, about, long_about = None)]
pub struct Args {
    /// Path to output directory
    #[clap(long, default_value = "experiments/")]
    pub output_dir: PathBuf,
    /// Peptide sequence
    #[clap(long)]
    pub pep_seq: String,
    /// MHC alpha sequence; alpha 1 and alpha 2 for class I, alpha 1 for class II.
    /// Longer input is trimmed to these domains.
    #[clap(long)]
    pub mhca_seq: String,
    /// MHC beta sequence containing beta 1. Leave out for class I targets.
    #[clap(long)]
    pub mhcb_seq: Option<String>,
    #[clap(long, default_value = "test001")]
    pub job_id: String,
    /// PDB entries never used as templates, comma separated, any case
    #[clap(long, value_delimiter = ',')]
    pub ignore_pdbs: Vec<String>,
    /// Latest template deposition date, YYYY-MM-DD
    #[clap(long, default_value = MAX_DATE_SENTINEL)]
    pub max_template_date: String,
    /// Run Amber minimization on the structures
    #[clap(long, action)]
    pub relax_structures: bool,
    /// Customized TCR-pMHC database path
    #[clap(long, default_value = "data/databases")]
    pub tp_db: PathBuf,
    /// AlphaFold database with pdb_mmcif and params
    #[clap(long)]
    pub ori_db: Option<PathBuf>,
    /// Visible CUDA device number
    #[clap(long, default_value_t = 1)]
    pub cuda_device: u32,
    /// Tool configuration in YAML format
    #[clap(long, short = 'c')]
    pub config: Option<PathBuf>,
    /// Verbose output. See more with e.g. RUST_LOG=Trace
    #[clap(long, short = 'v', action)]
    pub verbose: bool,
}

impl Args {
    /// Job input from the command line; an empty date means no cutoff.
    pub fn job_input(&self) -> JobInput {
        let max_template_date = if self.max_template_date.trim().is_empty() {
            MAX_DATE_SENTINEL.to_string()
        } else {
            self.max_template_date.clone()
        };
        JobInput {
            job_id: self.job_id.clone(),
            output_dir: self.output_dir.clone(),
            peptide: Sequence::new(&self.pep_seq),
            mhca: Sequence::new(&self.mhca_seq),
            mhcb: self
                .mhcb_seq
                .as_deref()
                .map(Sequence::new)
                .filter(|s| !s.is_empty()),
            ignore_pdbs: self
                .ignore_pdbs
                .iter()
                .map(|id| id.trim().to_lowercase())
                .filter(|id| !id.is_empty())
                .collect(),
            max_template_date,
            relax: self.relax_structures,
            tp_db: self.tp_db.clone(),
            ori_db: self.ori_db.clone(),
            cuda_device: self.cuda_device,
        }
    }
}

pub fn do_main() -> Result<()> {
    let args = Args::parse();
    if std::env::var(DEFAULT_FILTER_ENV).is_err() {
        std::env::set_var(
            DEFAULT_FILTER_ENV,
            if args.verbose { "Debug" } else { "Info" },
        );
    }
    pretty_env_logger::init();
    run(&args)
}

fn run(args: &Args) -> Result<()> {
    let input = args.job_input();
    input.validate()?;
    let config = ModelingConfig::from_file(args.config.as_deref())?;

    let catalog = TemplateCatalog::load(config.template_dir(&args.tp_db))?;
    std::fs::create_dir_all(input.job_dir())
        .with_context(|| format!("Cannot create job directory {}", input.job_dir().display()))?;
    let numbering = AnarciNumbering::new(config.numbering().executable(), input.job_dir());
    let engine = AlphaFoldCommand::new(config.engine().python(), config.engine().script());

    let summary = Pipeline::new(&catalog, numbering, engine)
        .with_scheme(config.numbering().scheme())
        .with_peptide_length_tolerance(*config.peptide_length_tolerance())
        .run(&input)?;

    for model in &summary.models {
        match model.rmsd {
            Some(rmsd) => log::info!("{}: pMHC RMSD {:.2}", model.path.display(), rmsd),
            None => log::info!("{}: unaligned", model.path.display()),
        }
    }
    log::info!("Results written to {}", summary.job_dir.display());
    Ok(())
}
