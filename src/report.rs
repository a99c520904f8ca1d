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

//! Job progress and result files.

use crate::{ModelingError, Result};
use serde::ser::{Serialize, SerializeMap, Serializer};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

/// Progress file in the job directory
pub const STATUS_FILE: &str = "modeling_status.txt";
/// Result file in the job directory
pub const STATISTICS_FILE: &str = "statistics.json";
/// Number of used templates reported in the statistics
pub const MAX_REPORTED_TEMPLATES: usize = 4;

/// Append-only progress log read by whoever watches the job.
#[derive(Debug, Clone)]
pub struct StatusLog {
    path: PathBuf,
}

impl StatusLog {
    pub fn new(job_dir: &Path) -> Self {
        Self {
            path: job_dir.join(STATUS_FILE),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, message: &str) -> Result<()> {
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{message}")?;
        Ok(())
    }
}

/// Confidence scores of one ranked model, kept as written by the engine.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ModelScores {
    pub ranking_confidence: String,
    pub plddt: String,
    pub ptm: String,
    pub iptm: String,
}

impl ModelScores {
    /// Parse one tab separated score line.
    fn from_line(line: &str) -> Option<Self> {
        let mut fields = line.split('\t').map(str::to_string);
        Some(Self {
            ranking_confidence: fields.next()?,
            plddt: fields.next()?,
            ptm: fields.next()?,
            iptm: fields.next()?,
        })
    }
}

/// Content of `statistics.json`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobStatistics {
    /// Scores indexed by model rank
    pub models: Vec<ModelScores>,
    /// Templates the engine actually used
    pub templates: Vec<String>,
}

impl JobStatistics {
    /// Read engine score and template files.
    ///
    /// Score line `n` belongs to `ranked_<n>`. A missing template file gives no
    /// templates.
    ///
    /// # Errors
    /// [`ModelingError::Engine`] if the score file is missing or a line has
    /// fewer than four fields.
    pub fn from_engine_files(scores: &Path, template_names: &Path) -> Result<Self> {
        let file = std::fs::File::open(scores).map_err(|err| {
            ModelingError::Engine(format!("cannot read score file {}: {err}", scores.display()))
        })?;
        let mut models = Vec::new();
        for (i, line) in BufReader::new(file).lines().enumerate() {
            let line = line?;
            let line = line.trim_end();
            let model = ModelScores::from_line(line).ok_or_else(|| {
                ModelingError::Engine(format!(
                    "score file {} line {} has fewer than four fields",
                    scores.display(),
                    i + 1
                ))
            })?;
            models.push(model);
        }

        let templates = match std::fs::File::open(template_names) {
            Ok(file) => BufReader::new(file)
                .lines()
                .take(MAX_REPORTED_TEMPLATES)
                .map(|line| line.map(|l| l.trim_end().to_string()))
                .collect::<std::io::Result<_>>()?,
            Err(_) => {
                log::warn!("No template names at {}", template_names.display());
                Vec::new()
            }
        };
        Ok(Self { models, templates })
    }

    pub fn to_json(&self) -> Result<String> {
        let mut buffer = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut serializer = serde_json::Serializer::with_formatter(&mut buffer, formatter);
        self.serialize(&mut serializer)
            .map_err(|err| ModelingError::Io(err.into()))?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }

    pub fn write(&self, job_dir: &Path) -> Result<()> {
        std::fs::write(job_dir.join(STATISTICS_FILE), self.to_json()?)?;
        Ok(())
    }
}

impl Serialize for JobStatistics {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.models.len() + 1))?;
        for (rank, scores) in self.models.iter().enumerate() {
            map.serialize_entry(&format!("ranked_{rank}"), scores)?;
        }
        map.serialize_entry("pmhc_tmplts", &self.templates)?;
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statistics_from_engine_files() {
        let dir = tempfile::tempdir().unwrap();
        let scores = dir.path().join("model_scores.txt");
        let names = dir.path().join("template_names.txt");
        std::fs::write(&scores, "0.83\t88.1\t0.86\t0.79\n0.80\t85.0\t0.84\t0.75\n").unwrap();
        std::fs::write(&names, "1ao7_A\n3hg1_A\n5men_A\n2bnr_A\n4ftv_A\n").unwrap();

        let stats = JobStatistics::from_engine_files(&scores, &names).unwrap();
        assert_eq!(stats.models.len(), 2);
        assert_eq!(stats.models[1].iptm, "0.75");
        assert_eq!(stats.templates, vec!["1ao7_A", "3hg1_A", "5men_A", "2bnr_A"]);

        let json: serde_json::Value = serde_json::from_str(&stats.to_json().unwrap()).unwrap();
        assert_eq!(json["ranked_0"]["plddt"], "88.1");
        assert_eq!(json["ranked_1"]["ranking_confidence"], "0.80");
        assert_eq!(json["pmhc_tmplts"].as_array().unwrap().len(), 4);
    }

    #[test]
    fn missing_template_names() {
        let dir = tempfile::tempdir().unwrap();
        let scores = dir.path().join("model_scores.txt");
        std::fs::write(&scores, "0.5\t60\t0.4\t0.3\n").unwrap();
        let stats = JobStatistics::from_engine_files(&scores, &dir.path().join("absent")).unwrap();
        assert!(stats.templates.is_empty());
        assert!(stats.to_json().unwrap().contains("\"pmhc_tmplts\": []"));
    }

    #[test]
    fn missing_or_short_score_file() {
        let dir = tempfile::tempdir().unwrap();
        let scores = dir.path().join("model_scores.txt");
        let names = dir.path().join("names");
        assert!(matches!(
            JobStatistics::from_engine_files(&scores, &names),
            Err(ModelingError::Engine(_))
        ));
        std::fs::write(&scores, "0.5\t60\n").unwrap();
        assert!(matches!(
            JobStatistics::from_engine_files(&scores, &names),
            Err(ModelingError::Engine(_))
        ));
    }

    #[test]
    fn status_lines_are_appended() {
        let dir = tempfile::tempdir().unwrap();
        let status = StatusLog::new(dir.path());
        status.append("Building MSAs...").unwrap();
        status.append("Building Structures...").unwrap();
        assert_eq!(
            std::fs::read_to_string(status.path()).unwrap(),
            "Building MSAs...\nBuilding Structures...\n"
        );
    }
}
