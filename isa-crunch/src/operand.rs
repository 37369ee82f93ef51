//
// Copyright (C) 2023 Ariel Abreu
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.
//

use pest::{iterators::Pair, Parser};
use serde::Serialize;

use crate::{
	error::{CrunchError, Result},
	layout::{FieldRegistry, Width},
	record::{describe_pest_error, DescriptionParser, Rule},
	util::{zero_extend_field, PadIntoArray},
};

/// Register number used for an unused operand slot.
pub const NOREG: u8 = u8::MAX;

/// Number of register slots every instruction carries: the destination, then three sources.
pub const SLOTS: usize = 4;

/// Placeholder names for each slot, in slot order.
pub const SLOT_NAMES: [&str; SLOTS] = ["rd", "rs1", "rs2", "rs3"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum RegisterClass {
	GeneralPurpose,
	FloatingPoint,
}

impl RegisterClass {
	fn from_letter(letter: &str) -> Option<Self> {
		match letter {
			"x" => Some(Self::GeneralPurpose),
			"f" | "d" => Some(Self::FloatingPoint),
			_ => None,
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FieldSpec {
	None,
	Literal(u8),
	Field {
		class: RegisterClass,
		hi: u32,
		lo: u32,
		offset: u8,
	},
}

impl FieldSpec {
	pub const fn is_none(&self) -> bool {
		matches!(self, FieldSpec::None)
	}

	/// The register class a placeholder for this slot should be rendered with.
	pub const fn class(&self) -> RegisterClass {
		match self {
			FieldSpec::Field { class, .. } => *class,
			_ => RegisterClass::GeneralPurpose,
		}
	}

	pub fn extract(&self, word: u32) -> u8 {
		match *self {
			FieldSpec::None => NOREG,
			FieldSpec::Literal(value) => value,
			FieldSpec::Field { hi, lo, offset, .. } => {
				let raw = zero_extend_field(u64::from(word) >> lo, hi - lo + 1);
				// `resolve` guarantees the biased value stays below NOREG
				raw as u8 + offset
			},
		}
	}
}

fn illegal(line: usize, specifier: &str, reason: impl Into<String>) -> CrunchError {
	CrunchError::IllegalOperandSpecifier {
		line,
		specifier: specifier.to_owned(),
		reason: reason.into(),
	}
}

fn parse_u32(line: usize, specifier: &str, text: &str) -> Result<u32> {
	text.parse()
		.map_err(|_| illegal(line, specifier, format!("{} is out of range", text)))
}

fn resolve_field(
	line: usize,
	pair: Pair<Rule>,
	width: Width,
	registry: &FieldRegistry,
) -> Result<FieldSpec> {
	let specifier = pair.as_str();
	let mut inner = pair.into_inner();

	let letter = inner.next().unwrap().as_str();
	let class = RegisterClass::from_letter(letter)
		.ok_or_else(|| illegal(line, specifier, format!("unknown register class `{}`", letter)))?;

	let selector = inner.next().unwrap();
	let (hi, lo) = match selector.as_rule() {
		Rule::bit_range => {
			let mut bits = selector.into_inner();
			let hi = parse_u32(line, specifier, bits.next().unwrap().as_str())?;
			let lo = match bits.next() {
				Some(lo) => parse_u32(line, specifier, lo.as_str())?,
				None => hi,
			};
			(hi, lo)
		},
		Rule::identifier => {
			let field = registry.get(selector.as_str()).ok_or_else(|| {
				illegal(
					line,
					specifier,
					format!("no bit pattern declares a field named `{}`", selector.as_str()),
				)
			})?;
			(field.hi, field.lo)
		},
		_ => unreachable!(),
	};

	if lo > hi {
		return Err(illegal(line, specifier, "low bit is above high bit"));
	}
	if hi >= width.bits() {
		return Err(illegal(
			line,
			specifier,
			format!("bit {} is outside a {}-bit instruction", hi, width.bits()),
		));
	}

	let offset = match inner.next() {
		Some(bias) => parse_u32(line, specifier, bias.into_inner().next().unwrap().as_str())?,
		None => 0,
	};

	let largest = zero_extend_field(!0, hi - lo + 1) + u64::from(offset);
	if largest >= u64::from(NOREG) {
		return Err(illegal(
			line,
			specifier,
			format!("largest register number {} does not fit below {}", largest, NOREG),
		));
	}

	Ok(FieldSpec::Field {
		class,
		hi,
		lo,
		offset: offset as u8,
	})
}

/// Resolves an operand list into exactly four slots, padding with `FieldSpec::None`.
pub fn resolve(
	line: usize,
	list: &str,
	width: Width,
	registry: &FieldRegistry,
) -> Result<[FieldSpec; SLOTS]> {
	let parsed = DescriptionParser::parse(Rule::operand_list, list)
		.map_err(|e| illegal(line, list, describe_pest_error(&e)))?
		.next()
		.unwrap();

	let specs = parsed
		.into_inner()
		.filter(|pair| pair.as_rule() != Rule::EOI)
		.map(|pair| match pair.as_rule() {
			Rule::no_operand => Ok(FieldSpec::None),
			Rule::constant => {
				let value = parse_u32(line, pair.as_str(), pair.as_str())?;
				u8::try_from(value)
					.ok()
					.filter(|value| *value != NOREG)
					.map(FieldSpec::Literal)
					.ok_or_else(|| illegal(line, pair.as_str(), "literal does not fit a register number"))
			},
			Rule::register_field => resolve_field(line, pair, width, registry),
			_ => unreachable!(),
		})
		.collect::<Result<Vec<_>>>()?;

	specs
		.into_iter()
		.pad_into_array(FieldSpec::None)
		.map_err(|count| illegal(line, list, format!("{} operands given, at most {} allowed", count, SLOTS)))
}
