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

//! Error taxonomy for the modeling core.

use crate::mhc::MhcChainKind;
use thiserror::Error;

/// Errors raised while preparing or post-processing a modeling job.
///
/// Input validation and domain trimming errors are fatal and raised before any
/// external engine is started. Structural errors raised after prediction are
/// isolated to the model they concern.
#[derive(Debug, Error)]
pub enum ModelingError {
    /// User input rejected before any expensive work, e.g. a bad peptide length
    #[error("{0}")]
    InputValidation(String),

    /// The numbering engine found no residues of the required domain(s)
    #[error("{}", .kind.domain_not_found_message())]
    DomainNotFound { kind: MhcChainKind },

    /// The numbering engine could not number the sequence at all
    #[error("numbering failed: {0}")]
    NumberingFailure(String),

    /// Structure text that cannot be read as a PDB model
    #[error("malformed structure: {0}")]
    MalformedStructure(String),

    /// pMHC substructures of reference and target are not comparable
    #[error("pMHC substructures differ: {0}")]
    AlignmentMismatch(String),

    /// The external prediction engine failed or produced incomplete output
    #[error("prediction engine: {0}")]
    Engine(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ModelingError {
    /// True for errors that only affect a single predicted model.
    pub fn is_per_model(&self) -> bool {
        matches!(
            self,
            Self::MalformedStructure(_) | Self::AlignmentMismatch(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, ModelingError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_not_found_is_role_specific() {
        let msg = ModelingError::DomainNotFound {
            kind: MhcChainKind::ClassIAlpha,
        }
        .to_string();
        assert!(msg.contains("alpha 1 and alpha 2"));
        assert!(msg.contains("class I MHC"));

        let msg = ModelingError::DomainNotFound {
            kind: MhcChainKind::ClassIIBeta,
        }
        .to_string();
        assert!(msg.contains("beta 1 domain"));
        assert!(msg.contains("'mhcb_seq'"));
    }

    #[test]
    fn per_model_errors() {
        assert!(ModelingError::AlignmentMismatch("x".into()).is_per_model());
        assert!(!ModelingError::Engine("x".into()).is_per_model());
    }
}
