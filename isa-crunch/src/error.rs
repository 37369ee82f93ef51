//
// Copyright (C) 2023 Ariel Abreu
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.
//

use std::fmt::Display;

use serde::Serialize;

/// The column of a description record an error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RecordField {
	Kind,
	Opcode,
	Assembly,
	Attributes,
	BitPattern,
	Operands,
	Action,
}

/// The classification axis an attribute token belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Axis {
	Isa,
	Behavior,
}

impl Display for RecordField {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(
			f,
			"{}",
			match self {
				Self::Kind => "kind",
				Self::Opcode => "opcode",
				Self::Assembly => "assembly template",
				Self::Attributes => "attributes",
				Self::BitPattern => "bit pattern",
				Self::Operands => "operand list",
				Self::Action => "action",
			}
		)
	}
}

impl Display for Axis {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			Self::Isa => write!(f, "ISA"),
			Self::Behavior => write!(f, "behavior"),
		}
	}
}

/// Every failure is fatal to a compilation run; nothing is written once one of these is produced.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum CrunchError {
	#[error("line {line}: malformed record ({field}): {message}")]
	MalformedRecord {
		line: usize,
		field: RecordField,
		message: String,
	},

	#[error("line {line}: illegal instruction width {bits} bits in \"{pattern}\" (expected 16 or 32)")]
	IllegalInstructionWidth { line: usize, bits: u32, pattern: String },

	#[error("line {line}: field `{name}` redefined as [{hi}:{lo}], previously [{previous_hi}:{previous_lo}] on line {previous_line}")]
	FieldRedefinition {
		line: usize,
		name: String,
		hi: u32,
		lo: u32,
		previous_line: usize,
		previous_hi: u32,
		previous_lo: u32,
	},

	#[error("line {line}: opcode `{opcode}` already defined on line {previous_line}")]
	DuplicateOpcode {
		line: usize,
		opcode: String,
		previous_line: usize,
	},

	#[error("line {line}: opcode `{opcode}` names the reserved opcode `{reserved}`")]
	ReservedOpcode {
		line: usize,
		opcode: String,
		reserved: &'static str,
	},

	#[error("line {line}: illegal operand specifier \"{specifier}\": {reason}")]
	IllegalOperandSpecifier {
		line: usize,
		specifier: String,
		reason: String,
	},

	#[error("too many {axis} attributes: {count} distinct tokens, at most 64 fit a bitvector")]
	TooManyAttributes { axis: Axis, count: usize },

	#[error("line {line}: `{opcode}` {field} uses placeholder `{placeholder}` but the instruction has no such operand")]
	UnknownPlaceholder {
		line: usize,
		opcode: String,
		field: RecordField,
		placeholder: String,
	},

	#[error("line {line}: action for `{opcode}` is not a valid token stream: {message}")]
	InvalidAction {
		line: usize,
		opcode: String,
		message: String,
	},

	#[error("invalid configuration: {0}")]
	InvalidConfig(String),
}

impl CrunchError {
	/// The description line the error was found on, if it is tied to one.
	pub fn line(&self) -> Option<usize> {
		match self {
			Self::MalformedRecord { line, .. }
			| Self::IllegalInstructionWidth { line, .. }
			| Self::FieldRedefinition { line, .. }
			| Self::DuplicateOpcode { line, .. }
			| Self::ReservedOpcode { line, .. }
			| Self::IllegalOperandSpecifier { line, .. }
			| Self::UnknownPlaceholder { line, .. }
			| Self::InvalidAction { line, .. } => Some(*line),
			Self::TooManyAttributes { .. } | Self::InvalidConfig(_) => None,
		}
	}
}

pub type Result<T> = std::result::Result<T, CrunchError>;
