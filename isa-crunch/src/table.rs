//
// Copyright (C) 2023 Ariel Abreu
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.
//

use std::{collections::HashMap, fmt::Display};

use serde::Serialize;

use crate::{
	classify::TokenSet,
	error::{CrunchError, Result},
	layout::{self, FieldRegistry, ImmediateSpec, Width},
	operand::{self, FieldSpec, NOREG, SLOTS, SLOT_NAMES},
	record::{Provenance, RawRecord},
};

/// One fully resolved instruction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstructionSpec {
	pub opcode: String,
	pub line: usize,
	pub provenance: Provenance,
	pub assembly: String,
	pub attributes: Vec<String>,
	pub tokens: TokenSet,
	pub match_value: u32,
	pub mask: u32,
	pub width: Width,
	pub fields: [FieldSpec; SLOTS],
	pub immediate: Option<ImmediateSpec>,
	pub action: String,
}

impl InstructionSpec {
	/// The opcode as an identifier: dots become underscores.
	pub fn ident(&self) -> String {
		self.opcode.replace('.', "_")
	}

	pub fn matches(&self, word: u32) -> bool {
		(word & self.mask) == self.match_value
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Sentinel {
	Zero,
	Illegal,
	Unknown,
}

impl Sentinel {
	pub const ALL: [Sentinel; 3] = [Sentinel::Zero, Sentinel::Illegal, Sentinel::Unknown];

	pub const fn name(&self) -> &'static str {
		match self {
			Sentinel::Zero => "ZERO",
			Sentinel::Illegal => "ILLEGAL",
			Sentinel::Unknown => "UNKNOWN",
		}
	}
}

/// A slot in the final opcode numbering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entry<'a> {
	Sentinel(Sentinel),
	Instruction(&'a InstructionSpec),
}

impl<'a> Entry<'a> {
	pub fn ident(&self) -> String {
		match self {
			Entry::Sentinel(sentinel) => sentinel.name().to_owned(),
			Entry::Instruction(spec) => spec.ident(),
		}
	}

	pub fn mnemonic(&self) -> &'a str {
		match self {
			Entry::Sentinel(sentinel) => sentinel.name(),
			Entry::Instruction(spec) => spec.opcode.as_str(),
		}
	}

	pub fn instruction(&self) -> Option<&'a InstructionSpec> {
		match self {
			Entry::Sentinel(_) => None,
			Entry::Instruction(spec) => Some(spec),
		}
	}
}

/// The result of running the reference decoder over one word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decoded<'a> {
	pub entry: Entry<'a>,
	pub registers: [u8; SLOTS],
	pub immediate: i64,
}

impl<'a> Display for Decoded<'a> {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}", self.entry.mnemonic())?;

		for (name, register) in SLOT_NAMES.iter().zip(self.registers) {
			if register != NOREG {
				write!(f, " {}={}", name, register)?;
			}
		}

		let has_immediate = self
			.entry
			.instruction()
			.map_or(false, |spec| spec.immediate.is_some());
		if has_immediate {
			write!(f, " immed={} ({:#x})", self.immediate, self.immediate as u32)?;
		}

		Ok(())
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum OverlapKind {
	/// Every word the later rule accepts is taken by the earlier one first.
	Shadowed,
	/// Some words match both rules and neither mask refines the other.
	Ambiguous,
	/// A compressed rule matches the low half of words the later standard rule accepts.
	LowHalf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Overlap<'a> {
	pub earlier: &'a InstructionSpec,
	pub later: &'a InstructionSpec,
	pub kind: OverlapKind,
}

impl<'a> Display for Overlap<'a> {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self.kind {
			OverlapKind::Shadowed => write!(
				f,
				"`{}` (line {}) is unreachable: `{}` (line {}) matches every word it does",
				self.later.opcode, self.later.line, self.earlier.opcode, self.earlier.line
			),
			OverlapKind::Ambiguous => write!(
				f,
				"`{}` (line {}) and `{}` (line {}) overlap; the first one wins",
				self.earlier.opcode, self.earlier.line, self.later.opcode, self.later.line
			),
			OverlapKind::LowHalf => write!(
				f,
				"`{}` (line {}) matches the low half of some `{}` (line {}) words and decodes them first",
				self.earlier.opcode, self.earlier.line, self.later.opcode, self.later.line
			),
		}
	}
}

/// All instructions in emission order: compressed first, source order within each width.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstructionTable {
	instructions: Vec<InstructionSpec>,
	compressed: usize,
	fields: FieldRegistry,
}

fn resolve_record(
	record: RawRecord,
	registry: &mut FieldRegistry,
	control_flow: &[String],
) -> Result<InstructionSpec> {
	let layout = layout::resolve(record.line, &record.bit_pattern)?;
	for field in &layout.fields {
		registry.register(record.line, field)?;
	}
	let fields = operand::resolve(record.line, &record.operands, layout.width, registry)?;
	let tokens = TokenSet::new(&record.attributes, record.provenance, control_flow);

	tracing::debug!(
		line = record.line,
		opcode = %record.opcode,
		match_value = format_args!("{:#010x}", layout.match_value),
		mask = format_args!("{:#010x}", layout.mask),
		bytes = layout.width.bytes(),
		"resolved instruction"
	);

	Ok(InstructionSpec {
		opcode: record.opcode,
		line: record.line,
		provenance: record.provenance,
		assembly: record.assembly,
		attributes: record.attributes,
		tokens,
		match_value: layout.match_value,
		mask: layout.mask,
		width: layout.width,
		fields,
		immediate: layout.immediate,
		action: record.action,
	})
}

impl InstructionTable {
	pub fn from_records(records: Vec<RawRecord>, control_flow: &[String]) -> Result<Self> {
		let mut registry = FieldRegistry::default();
		let mut seen: HashMap<String, usize> = HashMap::new();
		let mut instructions = Vec::with_capacity(records.len());

		for record in records {
			// `c.add` and `c_add` would both become the variant `c_add`
			let ident = record.opcode.replace('.', "_");

			if let Some(sentinel) = Sentinel::ALL.iter().find(|sentinel| sentinel.name() == ident) {
				return Err(CrunchError::ReservedOpcode {
					line: record.line,
					opcode: record.opcode,
					reserved: sentinel.name(),
				});
			}
			if let Some(&previous_line) = seen.get(&ident) {
				return Err(CrunchError::DuplicateOpcode {
					line: record.line,
					opcode: record.opcode,
					previous_line,
				});
			}
			seen.insert(ident, record.line);

			instructions.push(resolve_record(record, &mut registry, control_flow)?);
		}

		// a stable sort keeps source order within each width
		instructions.sort_by_key(|spec| spec.width);
		let compressed = instructions
			.iter()
			.take_while(|spec| spec.width == Width::Compressed)
			.count();

		Ok(Self {
			instructions,
			compressed,
			fields: registry,
		})
	}

	pub fn instructions(&self) -> &[InstructionSpec] {
		&self.instructions
	}

	pub fn compressed(&self) -> &[InstructionSpec] {
		&self.instructions[..self.compressed]
	}

	pub fn standard(&self) -> &[InstructionSpec] {
		&self.instructions[self.compressed..]
	}

	pub fn fields(&self) -> &FieldRegistry {
		&self.fields
	}

	/// Every opcode in numbering order, sentinels included.
	pub fn entries(&self) -> impl Iterator<Item = Entry<'_>> {
		std::iter::once(Entry::Sentinel(Sentinel::Zero))
			.chain(self.instructions.iter().map(Entry::Instruction))
			.chain([
				Entry::Sentinel(Sentinel::Illegal),
				Entry::Sentinel(Sentinel::Unknown),
			])
	}

	pub fn number_of_opcodes(&self) -> usize {
		self.instructions.len() + 3
	}

	/// The last compressed opcode, or `ZERO` if there is none.
	pub fn last_compressed(&self) -> Entry<'_> {
		match self.compressed() {
			[] => Entry::Sentinel(Sentinel::Zero),
			[.., last] => Entry::Instruction(last),
		}
	}

	pub fn find(&self, opcode: &str) -> Option<&InstructionSpec> {
		self.instructions.iter().find(|spec| spec.opcode == opcode)
	}

	/// Decodes `word` the same way the emitted `decode` routine does.
	pub fn decode(&self, word: u32, available: usize) -> Decoded<'_> {
		let hit = self
			.instructions
			.iter()
			.filter(|spec| spec.width.bytes() as usize <= available)
			.find(|spec| spec.matches(word));

		match hit {
			Some(spec) => Decoded {
				entry: Entry::Instruction(spec),
				registers: spec.fields.map(|field| field.extract(word)),
				immediate: spec
					.immediate
					.as_ref()
					.map_or(0, |immediate| immediate.reconstruct(word)),
			},
			None => Decoded {
				entry: Entry::Sentinel(if available < 4 {
					Sentinel::Illegal
				} else {
					Sentinel::Unknown
				}),
				registers: [NOREG; SLOTS],
				immediate: 0,
			},
		}
	}

	/// Pairs of rules that can both match one word.
	///
	/// Compressed rules are tried first even on a full word, so a compressed rule whose
	/// fixed bits agree with the low half of a standard rule is reported as well.
	pub fn overlaps(&self) -> Vec<Overlap<'_>> {
		let mut found = Vec::new();

		for (index, earlier) in self.instructions.iter().enumerate() {
			for later in &self.instructions[index + 1..] {
				// compressed masks only cover the low 16 bits
				let shared = earlier.mask & later.mask;
				if (earlier.match_value ^ later.match_value) & shared != 0 {
					continue;
				}

				let kind = if earlier.width != later.width {
					OverlapKind::LowHalf
				} else if earlier.mask & !later.mask == 0 {
					OverlapKind::Shadowed
				} else if later.mask & !earlier.mask == 0 {
					// the earlier rule is a special case of the later one
					continue;
				} else {
					OverlapKind::Ambiguous
				};

				found.push(Overlap {
					earlier,
					later,
					kind,
				});
			}
		}

		found
	}

	/// Bitmask words over the opcode numbering, one bit per opcode whose behavior tokens contain `token`.
	pub fn membership_words(&self, token: &str) -> Vec<u64> {
		let mut words = vec![0u64; (self.number_of_opcodes() + 63) / 64];

		for (index, entry) in self.entries().enumerate() {
			let member = entry
				.instruction()
				.map_or(false, |spec| spec.tokens.behavior.contains(token));
			if member {
				words[index / 64] |= 1 << (index % 64);
			}
		}

		words
	}
}
