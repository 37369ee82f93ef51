//
// Copyright (C) 2023 Ariel Abreu
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.
//

use std::collections::BTreeMap;

use pest::{iterators::Pair, Parser};
use serde::Serialize;

use crate::{
	error::{CrunchError, RecordField, Result},
	record::{describe_pest_error, DescriptionParser, Rule},
	util::{field_mask, sign_extend_field, zero_extend_field},
};

/// Encoded size of an instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum Width {
	Compressed,
	Standard,
}

impl Width {
	pub const fn bytes(&self) -> u32 {
		match self {
			Width::Compressed => 2,
			Width::Standard => 4,
		}
	}

	pub const fn bits(&self) -> u32 {
		self.bytes() * 8
	}

	pub const fn from_bits(bits: u32) -> Option<Self> {
		match bits {
			16 => Some(Width::Compressed),
			32 => Some(Width::Standard),
			_ => None,
		}
	}
}

/// One contiguous slice of the instruction word that lands somewhere in a logical immediate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ImmediateTerm {
	/// Lowest bit of the slice in the raw word.
	pub position: u32,
	pub width: u32,
	/// Where the slice's low bit ends up in the immediate.
	pub shift: u32,
	pub sign_extend: bool,
}

impl ImmediateTerm {
	pub const fn source_hi(&self) -> u32 {
		self.position + self.width - 1
	}

	pub const fn source_lo(&self) -> u32 {
		self.position
	}

	pub fn extract(&self, word: u32) -> i64 {
		let raw = u64::from(word) >> self.position;
		let value = if self.sign_extend {
			sign_extend_field(raw, self.width)
		} else {
			zero_extend_field(raw, self.width)
		};
		(value << self.shift) as i64
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImmediateSpec {
	/// Ordered by ascending `position`; a signed descriptor's sign term is last.
	pub terms: Vec<ImmediateTerm>,
	pub signed: bool,
}

impl ImmediateSpec {
	pub fn reconstruct(&self, word: u32) -> i64 {
		self.terms
			.iter()
			.fold(0i64, |acc, term| acc | term.extract(word))
	}
}

/// A `name[width]` reservation inside a bit pattern.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NamedField {
	pub name: String,
	pub position: u32,
	pub width: u32,
}

impl NamedField {
	pub const fn hi(&self) -> u32 {
		self.position + self.width - 1
	}

	pub const fn lo(&self) -> u32 {
		self.position
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BitLayout {
	pub match_value: u32,
	pub mask: u32,
	pub width: Width,
	pub immediate: Option<ImmediateSpec>,
	pub fields: Vec<NamedField>,
}

/// Where a named field was first declared.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegisteredField {
	pub hi: u32,
	pub lo: u32,
	pub line: usize,
}

/// Named fields are global to a description: every declaration must agree on the bit range.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FieldRegistry {
	fields: BTreeMap<String, RegisteredField>,
}

impl FieldRegistry {
	pub fn register(&mut self, line: usize, field: &NamedField) -> Result<()> {
		match self.fields.get(&field.name) {
			Some(previous) if previous.hi != field.hi() || previous.lo != field.lo() => {
				Err(CrunchError::FieldRedefinition {
					line,
					name: field.name.clone(),
					hi: field.hi(),
					lo: field.lo(),
					previous_line: previous.line,
					previous_hi: previous.hi,
					previous_lo: previous.lo,
				})
			},
			Some(_) => Ok(()),
			None => {
				self.fields.insert(
					field.name.clone(),
					RegisteredField {
						hi: field.hi(),
						lo: field.lo(),
						line,
					},
				);
				Ok(())
			},
		}
	}

	pub fn get(&self, name: &str) -> Option<&RegisteredField> {
		self.fields.get(name)
	}

	/// Fields in name order.
	pub fn iter(&self) -> impl Iterator<Item = (&str, &RegisteredField)> {
		self.fields.iter().map(|(name, field)| (name.as_str(), field))
	}

	pub fn is_empty(&self) -> bool {
		self.fields.is_empty()
	}
}

fn malformed(line: usize, message: String) -> CrunchError {
	CrunchError::MalformedRecord {
		line,
		field: RecordField::BitPattern,
		message,
	}
}

fn parse_number(line: usize, pair: Pair<Rule>) -> Result<u32> {
	pair.as_str()
		.parse()
		.map_err(|_| malformed(line, format!("bit index {} is out of range", pair.as_str())))
}

/// Returns `(hi, lo)` for a `hi[:lo]` immediate component.
fn parse_component(line: usize, pair: Pair<Rule>) -> Result<(u32, u32)> {
	let text = pair.as_str();
	let mut numbers = pair.into_inner();
	let hi = parse_number(line, numbers.next().unwrap())?;
	let lo = match numbers.next() {
		Some(lo) => parse_number(line, lo)?,
		None => hi,
	};

	if lo > hi {
		return Err(malformed(
			line,
			format!("immediate component {} has its low bit above its high bit", text),
		));
	}
	// disassembly renders the immediate as a 32-bit word
	if hi > 31 {
		return Err(malformed(
			line,
			format!("immediate component {} does not fit a 32-bit immediate", text),
		));
	}

	Ok((hi, lo))
}

#[derive(Default)]
struct Accumulator {
	position: u32,
	match_value: u64,
	mask: u64,
	terms: Vec<ImmediateTerm>,
	fields: Vec<NamedField>,
}

impl Accumulator {
	fn literal(&mut self, bits: &str) {
		let width = bits.len() as u32;
		// anything past 32 bits is reported as a width error once the whole pattern is counted
		if self.position.checked_add(width).map_or(false, |end| end <= 32) {
			for (index, bit) in bits.bytes().rev().enumerate() {
				let offset = self.position + index as u32;
				self.mask |= 1 << offset;
				if bit == b'1' {
					self.match_value |= 1 << offset;
				}
			}
		}
		self.position = self.position.saturating_add(width);
	}

	fn term(&mut self, (hi, lo): (u32, u32), sign_extend: bool) {
		let width = hi - lo + 1;
		self.terms.push(ImmediateTerm {
			position: self.position,
			width,
			shift: lo,
			sign_extend,
		});
		self.position = self.position.saturating_add(width);
	}
}

/// Resolves a bit pattern into its match/mask pair, width, immediate plan and named fields.
pub fn resolve(line: usize, pattern: &str) -> Result<BitLayout> {
	let parsed = DescriptionParser::parse(Rule::pattern, pattern)
		.map_err(|e| malformed(line, format!("\"{}\" {}", pattern, describe_pest_error(&e))))?
		.next()
		.unwrap();

	let tokens: Vec<_> = parsed
		.into_inner()
		.filter(|pair| pair.as_rule() != Rule::EOI)
		.collect();

	let mut acc = Accumulator::default();

	// the least significant token is declared last
	for token in tokens.into_iter().rev() {
		match token.as_rule() {
			Rule::literal_bits => acc.literal(token.as_str()),
			Rule::filler => {
				acc.position = acc.position.saturating_add(token.as_str().len() as u32)
			},
			Rule::immediate => {
				let mut inner = token.into_inner().peekable();
				let signed = matches!(inner.peek().map(|pair| pair.as_rule()), Some(Rule::sign));
				if signed {
					inner.next();
				}

				let components = inner
					.map(|component| parse_component(line, component))
					.collect::<Result<Vec<_>>>()?;

				// everything after the leading component sits below it in the word, lowest first
				for &component in components[1..].iter().rev() {
					acc.term(component, false);
				}
				acc.term(components[0], signed);
			},
			Rule::named_field => {
				let mut inner = token.into_inner();
				let name = inner.next().unwrap().as_str().to_owned();
				let width = parse_number(line, inner.next().unwrap())?;
				if width == 0 {
					return Err(malformed(line, format!("field `{}` has zero width", name)));
				}

				acc.fields.push(NamedField {
					name,
					position: acc.position,
					width,
				});
				acc.position = acc.position.saturating_add(width);
			},
			_ => unreachable!(),
		}
	}

	let width = Width::from_bits(acc.position).ok_or_else(|| CrunchError::IllegalInstructionWidth {
		line,
		bits: acc.position,
		pattern: pattern.to_owned(),
	})?;

	debug_assert_eq!(acc.mask & !field_mask(0, width.bits()), 0);

	let immediate = if acc.terms.is_empty() {
		None
	} else {
		Some(ImmediateSpec {
			signed: acc.terms.iter().any(|term| term.sign_extend),
			terms: acc.terms,
		})
	};

	Ok(BitLayout {
		match_value: acc.match_value as u32,
		mask: acc.mask as u32,
		width,
		immediate,
		fields: acc.fields,
	})
}
