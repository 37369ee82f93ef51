//
// Copyright (C) 2023 Ariel Abreu
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.
//

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::{CrunchError, Result};

const GPR_ABI_NAMES: [&str; 32] = [
	"zero", "ra", "sp", "gp", "tp", "t0", "t1", "t2", "s0", "s1", "a0", "a1", "a2", "a3", "a4", "a5",
	"a6", "a7", "s2", "s3", "s4", "s5", "s6", "s7", "s8", "s9", "s10", "s11", "t3", "t4", "t5", "t6",
];

const FPR_ABI_NAMES: [&str; 32] = [
	"ft0", "ft1", "ft2", "ft3", "ft4", "ft5", "ft6", "ft7", "fs0", "fs1", "fa0", "fa1", "fa2", "fa3",
	"fa4", "fa5", "fa6", "fa7", "fs2", "fs3", "fs4", "fs5", "fs6", "fs7", "fs8", "fs9", "fs10",
	"fs11", "ft8", "ft9", "ft10", "ft11",
];

/// File names of the four generated artifacts inside the output directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ArtifactNames {
	pub opcodes: String,
	pub decode: String,
	pub disasm: String,
	pub execute: String,
}

impl Default for ArtifactNames {
	fn default() -> Self {
		Self {
			opcodes: "opcodes.rs".into(),
			decode: "decode.rs".into(),
			disasm: "disasm.rs".into(),
			execute: "execute.rs".into(),
		}
	}
}

impl ArtifactNames {
	pub fn iter(&self) -> impl Iterator<Item = &str> {
		[&self.opcodes, &self.decode, &self.disasm, &self.execute]
			.into_iter()
			.map(String::as_str)
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CrunchConfig {
	/// Path of the simulator state type the dispatcher receives as `state`.
	pub state_type: String,
	pub gpr_names: Vec<String>,
	pub fpr_names: Vec<String>,
	/// Behavior tokens that mark an instruction as transferring control.
	pub control_flow: Vec<String>,
	pub files: ArtifactNames,
}

impl Default for CrunchConfig {
	fn default() -> Self {
		Self {
			state_type: "State".into(),
			gpr_names: GPR_ABI_NAMES.iter().map(|name| name.to_string()).collect(),
			fpr_names: FPR_ABI_NAMES.iter().map(|name| name.to_string()).collect(),
			control_flow: vec!["cj".into(), "uj".into()],
			files: ArtifactNames::default(),
		}
	}
}

impl CrunchConfig {
	pub fn from_json(text: &str) -> Result<Self> {
		let config: Self =
			serde_json::from_str(text).map_err(|e| CrunchError::InvalidConfig(e.to_string()))?;
		config.validate()?;
		Ok(config)
	}

	pub fn state_type(&self) -> Result<syn::Type> {
		syn::parse_str(&self.state_type).map_err(|e| {
			CrunchError::InvalidConfig(format!(
				"state type \"{}\" is not a Rust type: {}",
				self.state_type, e
			))
		})
	}

	pub fn validate(&self) -> Result<()> {
		self.state_type()?;

		for (what, names) in [("general-purpose", &self.gpr_names), ("floating-point", &self.fpr_names)] {
			if names.is_empty() || names.len() >= usize::from(u8::MAX) {
				return Err(CrunchError::InvalidConfig(format!(
					"{} register name table must have between 1 and 254 entries, got {}",
					what,
					names.len()
				)));
			}
		}

		let mut seen = HashSet::new();
		for name in self.files.iter() {
			if name.is_empty() || name.contains(['/', '\\']) {
				return Err(CrunchError::InvalidConfig(format!(
					"artifact name \"{}\" must be a plain file name",
					name
				)));
			}
			if !seen.insert(name) {
				return Err(CrunchError::InvalidConfig(format!(
					"artifact name \"{}\" is used twice",
					name
				)));
			}
		}

		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use pretty_assertions::assert_eq;

	#[test]
	fn defaults_are_valid() {
		let config = CrunchConfig::default();
		config.validate().unwrap();
		assert_eq!(config.gpr_names[10], "a0");
		assert_eq!(config.fpr_names[10], "fa0");
	}

	#[test]
	fn partial_json_keeps_defaults() {
		let config = CrunchConfig::from_json(
			r#"{ "state_type": "crate::cpu::Hart", "files": { "execute": "dispatch.rs" } }"#,
		)
		.unwrap();

		assert_eq!(config.state_type, "crate::cpu::Hart");
		assert_eq!(config.files.execute, "dispatch.rs");
		assert_eq!(config.files.opcodes, "opcodes.rs");
		assert_eq!(config.control_flow, vec!["cj", "uj"]);
	}

	#[test]
	fn rejects_bad_values() {
		for json in [
			r#"{ "state_type": "not a type" }"#,
			r#"{ "gpr_names": [] }"#,
			r#"{ "files": { "decode": "opcodes.rs" } }"#,
			r#"{ "files": { "decode": "../decode.rs" } }"#,
			r#"{ "register_names": [] }"#,
			r#"{ "state_type": 3 }"#,
		] {
			assert!(
				matches!(CrunchConfig::from_json(json), Err(CrunchError::InvalidConfig(_))),
				"{json}"
			);
		}
	}
}
