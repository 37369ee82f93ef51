//
// Copyright (C) 2023 Ariel Abreu
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.
//

//! Compiles line-oriented instruction descriptions into Rust decode, disassembly and dispatch
//! code.
//!
//! The pipeline runs in one forward pass: [`record`] splits lines into columns, [`layout`] and
//! [`operand`] resolve bit patterns and register fields, [`table`] orders the result and adds the
//! sentinel opcodes, [`classify`] assigns attribute bit positions, and [`emit`] renders the four
//! artifacts.

#[macro_use]
extern crate pest_derive;

pub mod classify;
pub mod config;
pub mod emit;
pub mod error;
pub mod layout;
pub mod operand;
pub mod output;
pub mod record;
pub mod table;
mod util;

use serde::Serialize;

pub use crate::{
	classify::{Classification, Classifier},
	config::CrunchConfig,
	emit::{ArtifactTokens, Artifacts},
	error::{CrunchError, Result},
	table::InstructionTable,
};

/// A resolved description: the ordered table and its attribute classification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Compilation {
	pub table: InstructionTable,
	pub classification: Classification,
}

impl Compilation {
	pub fn new(source: &str, config: &CrunchConfig) -> Result<Self> {
		let _span = tracing::info_span!("compile").entered();

		config.validate()?;

		let records = record::parse_source(source)?;
		tracing::debug!(records = records.len(), "parsed description");

		let table = InstructionTable::from_records(records, &config.control_flow)?;

		// every token has to be seen before any position is handed out
		let mut classifier = Classifier::new();
		for spec in table.instructions() {
			classifier.observe(&spec.tokens);
		}
		let classification = classifier.finalize()?;

		tracing::info!(
			instructions = table.instructions().len(),
			compressed = table.compressed().len(),
			"compiled description"
		);

		Ok(Self {
			table,
			classification,
		})
	}

	pub fn emit(&self, config: &CrunchConfig) -> Result<ArtifactTokens> {
		emit::emit(&self.table, &self.classification, config)
	}
}

/// Compiles `source` and renders all artifacts. Nothing is written anywhere.
pub fn compile(source: &str, config: &CrunchConfig) -> Result<(Compilation, Artifacts)> {
	let compilation = Compilation::new(source, config)?;
	let artifacts = compilation.emit(config)?.render();
	Ok((compilation, artifacts))
}
