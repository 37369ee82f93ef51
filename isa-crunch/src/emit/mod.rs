//
// Copyright (C) 2023 Ariel Abreu
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.
//

//! Rust source generation for the four artifacts.
//!
//! Every emitter is a pure function of the table, the classification and the configuration, and
//! returns the artifact as a list of items so it can be both spliced by the procedural macros and
//! rendered to a file.

mod decode;
mod disasm;
mod execute;
mod opcodes;

use std::collections::HashMap;

use lazy_static::lazy_static;
use proc_macro2::{Ident, Literal, Span, TokenStream};
use quote::{format_ident, quote};
use syn::LitInt;

use crate::{
	classify::Classification,
	config::CrunchConfig,
	error::Result,
	operand::{RegisterClass, SLOTS},
	table::InstructionTable,
};

/// What a placeholder word in an assembly template or action snippet stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Placeholder {
	/// A register slot; `class` overrides the slot's own class when the name says so.
	Slot {
		index: usize,
		class: Option<RegisterClass>,
	},
	Immediate,
}

impl Placeholder {
	/// The `Insn` field the placeholder reads.
	pub(crate) fn field(&self) -> Ident {
		match self {
			Placeholder::Slot { index, .. } => format_ident!("{}", crate::operand::SLOT_NAMES[*index]),
			Placeholder::Immediate => format_ident!("immed"),
		}
	}
}

lazy_static! {
	pub(crate) static ref PLACEHOLDERS: HashMap<&'static str, Placeholder> = {
		let mut table = HashMap::new();

		for (index, name) in crate::operand::SLOT_NAMES.iter().enumerate() {
			table.insert(*name, Placeholder::Slot { index, class: None });
		}
		for (index, name) in ["fd", "fs1", "fs2", "fs3"].into_iter().enumerate() {
			table.insert(
				name,
				Placeholder::Slot {
					index,
					class: Some(RegisterClass::FloatingPoint),
				},
			);
		}
		table.insert("immed", Placeholder::Immediate);
		table.insert("constant", Placeholder::Immediate);

		debug_assert_eq!(table.len(), 2 * SLOTS + 2);
		table
	};
}

/// Generated artifacts as token streams, one entry per item.
#[derive(Debug, Clone)]
pub struct ArtifactTokens {
	pub opcodes: Vec<TokenStream>,
	pub decode: Vec<TokenStream>,
	pub disasm: Vec<TokenStream>,
	pub execute: Vec<TokenStream>,
}

impl ArtifactTokens {
	/// All four artifacts as one stream, for splicing into a single module.
	pub fn into_token_stream(self) -> TokenStream {
		self.opcodes
			.into_iter()
			.chain(self.decode)
			.chain(self.disasm)
			.chain(self.execute)
			.collect()
	}

	pub fn render(&self) -> Artifacts {
		Artifacts {
			opcodes: render(&self.opcodes),
			decode: render(&self.decode),
			disasm: render(&self.disasm),
			execute: render(&self.execute),
		}
	}
}

/// Generated artifacts as source text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifacts {
	pub opcodes: String,
	pub decode: String,
	pub disasm: String,
	pub execute: String,
}

const HEADER: &str = "// @generated by isa-crunch; edit the instruction description instead.\n";

fn render(items: &[TokenStream]) -> String {
	let mut text = String::from(HEADER);
	for item in items {
		text.push('\n');
		text.push_str(&item.to_string());
		text.push('\n');
	}
	text
}

pub fn emit(
	table: &InstructionTable,
	classification: &Classification,
	config: &CrunchConfig,
) -> Result<ArtifactTokens> {
	let tokens = ArtifactTokens {
		opcodes: opcodes::emit(table, classification),
		decode: decode::emit(table),
		disasm: disasm::emit(table, config)?,
		execute: execute::emit(table, config)?,
	};

	tracing::debug!(
		opcodes = tokens.opcodes.len(),
		decode = tokens.decode.len(),
		disasm = tokens.disasm.len(),
		execute = tokens.execute.len(),
		"emitted artifact items"
	);

	Ok(tokens)
}

/// An identifier for `name`, falling back to a raw identifier for keywords.
pub(crate) fn ident(name: &str) -> Ident {
	match syn::parse_str::<Ident>(name) {
		Ok(ident) => ident,
		// these cannot be raw identifiers
		Err(_) if matches!(name, "_" | "crate" | "self" | "Self" | "super") => {
			format_ident!("{}_", name)
		},
		Err(_) => Ident::new_raw(name, Span::call_site()),
	}
}

/// A hexadecimal literal zero-padded to `digits`.
pub(crate) fn hex(value: u64, digits: usize) -> LitInt {
	LitInt::new(
		&format!("{:#0width$x}", value, width = digits + 2),
		Span::call_site(),
	)
}

pub(crate) fn number(value: u32) -> Literal {
	Literal::u32_unsuffixed(value)
}

pub(crate) fn opcode_path(name: &str) -> TokenStream {
	let variant = ident(name);
	quote!(Opcode::#variant)
}
