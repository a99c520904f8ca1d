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

//! # Structural modeling of TCR-pMHC complexes
//!
//! Prepares template guidance for an external multimer structure-prediction
//! engine and canonicalizes the structures it produces:
//!
//! - [`trim`] cuts raw MHC sequences down to their peptide-presenting domains
//!   using a [`numbering::Numbering`] engine.
//! - [`template`] selects homology templates from a catalog and writes the
//!   alignment file consumed by the engine.
//! - [`structure`] parses, renumbers and writes PDB models.
//! - [`superpose`] superposes models onto a reference by their pMHC part.
//! - [`pipeline`] runs a modeling job end to end around a [`engine::PredictionEngine`].

use nalgebra::Vector3;

pub type Point = Vector3<f64>;

pub mod cli;
pub mod config;
pub mod engine;
mod error;
pub use error::{ModelingError, Result};
pub mod mhc;
pub use mhc::{ChainRole, MhcChainKind, MhcClass};
pub mod numbering;
pub mod pipeline;
pub mod report;
pub mod sequence;
pub mod structure;
pub mod superpose;
pub mod template;
pub mod transform;
pub mod trim;
