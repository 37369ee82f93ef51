//
// Copyright (C) 2023 Ariel Abreu
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.
//

use std::collections::HashSet;

use proc_macro2::{Ident, Literal, TokenStream};
use quote::{format_ident, quote};

use super::{hex, ident, number, opcode_path};
use crate::{
	classify::{AxisClassification, Classification, STOP_AFTER_TOKEN, STOP_BEFORE_TOKEN},
	table::{Entry, InstructionSpec, InstructionTable},
	util::field_mask,
};

/// Flag constant names for an axis, in position order.
fn flag_names(axis: &AxisClassification) -> Vec<Ident> {
	let mut used = HashSet::new();

	axis.tokens()
		.map(|(token, position)| {
			let base = match token {
				STOP_BEFORE_TOKEN => "STOP_BEFORE".to_owned(),
				STOP_AFTER_TOKEN => "STOP_AFTER".to_owned(),
				_ => token.to_ascii_uppercase(),
			};
			// `ld` and `Ld` both want `LD`
			let name = if used.insert(base.clone()) {
				base
			} else {
				format!("{}_{}", base, position)
			};
			used.insert(name.clone());
			ident(&name)
		})
		.collect()
}

fn flags_type(name: &Ident, axis: &AxisClassification) -> TokenStream {
	let repr = format_ident!("{}", axis.storage.type_name());
	let digits = axis.storage.bits() as usize / 4;
	let flags = flag_names(axis)
		.into_iter()
		.zip(axis.tokens())
		.map(|(flag, (token, position))| {
			let doc = format!("`{}`", token);
			let bit = hex(1 << position, digits);
			quote! {
				#[doc = #doc]
				const #flag = #bit;
			}
		});

	quote! {
		bitflags::bitflags! {
			#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
			pub struct #name: #repr {
				#(#flags)*
			}
		}
	}
}

fn flags_table(
	table: &InstructionTable,
	name: &Ident,
	type_name: &Ident,
	axis: &AxisClassification,
	bits_of: impl Fn(&InstructionSpec) -> u64,
) -> TokenStream {
	let digits = axis.storage.bits() as usize / 4;
	let values = table.entries().map(|entry| {
		let bits = entry.instruction().map_or(0, &bits_of);
		let bits = hex(bits, digits);
		quote!(#type_name::from_bits_retain(#bits))
	});

	quote! {
		pub const #name: [#type_name; NUMBER_OF_OPCODES] = [#(#values),*];
	}
}

fn membership_array(table: &InstructionTable, name: &Ident, token: &str) -> TokenStream {
	let words = table.membership_words(token);
	let len = Literal::usize_unsuffixed(words.len());
	let words = words.into_iter().map(|word| hex(word, 16));

	quote! {
		pub const #name: [u64; #len] = [#(#words),*];
	}
}

fn field_helpers(table: &InstructionTable) -> Option<TokenStream> {
	if table.fields().is_empty() {
		return None;
	}

	let helpers = table.fields().iter().map(|(name, field)| {
		let name = ident(name);
		let doc = format!("Bits {}..={} of an instruction word.", field.lo, field.hi);
		let lo = number(field.lo);
		let mask = hex(field_mask(0, field.hi - field.lo + 1), 8);
		quote! {
			#[doc = #doc]
			#[inline]
			pub const fn #name(word: u32) -> u32 {
				(word >> #lo) & #mask
			}
		}
	});

	Some(quote! {
		/// Extractors for the named fields of the instruction description.
		#[allow(dead_code)]
		pub mod fields {
			#(#helpers)*
		}
	})
}

pub(super) fn emit(table: &InstructionTable, classification: &Classification) -> Vec<TokenStream> {
	let entries: Vec<Entry> = table.entries().collect();
	let variants = entries.iter().enumerate().map(|(index, entry)| {
		let variant = ident(&entry.ident());
		let discriminant = number(index as u32);
		match entry.instruction() {
			Some(spec) => {
				let doc = format!("`{}` (line {})", spec.opcode, spec.line);
				quote! {
					#[doc = #doc]
					#variant = #discriminant
				}
			},
			None => quote!(#variant = #discriminant),
		}
	});
	let paths: Vec<_> = entries.iter().map(|entry| opcode_path(&entry.ident())).collect();
	let mnemonics = entries.iter().map(|entry| entry.mnemonic());
	let count = Literal::usize_unsuffixed(table.number_of_opcodes());
	let last_compressed = opcode_path(&table.last_compressed().ident());

	let isa = format_ident!("Isa");
	let attr = format_ident!("Attr");

	let mut items = vec![
		quote! {
			#[allow(non_camel_case_types)]
			#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
			#[repr(u16)]
			pub enum Opcode {
				#(#variants),*
			}
		},
		quote! {
			pub const LAST_COMPRESSED_OPCODE: Opcode = #last_compressed;
		},
		quote! {
			pub const NUMBER_OF_OPCODES: usize = #count;
		},
		quote! {
			pub const OP_NAME: [&str; NUMBER_OF_OPCODES] = [#(#mnemonics),*];
		},
		flags_type(&isa, &classification.isa),
		flags_type(&attr, &classification.behavior),
		flags_table(
			table,
			&format_ident!("REQUIRED_ISA"),
			&isa,
			&classification.isa,
			|spec| classification.isa_bits(&spec.tokens),
		),
		flags_table(
			table,
			&format_ident!("ATTRIBUTES"),
			&attr,
			&classification.behavior,
			|spec| classification.behavior_bits(&spec.tokens),
		),
		membership_array(table, &format_ident!("STOP_BEFORE"), STOP_BEFORE_TOKEN),
		membership_array(table, &format_ident!("STOP_AFTER"), STOP_AFTER_TOKEN),
		quote! {
			impl Opcode {
				pub const ALL: [Opcode; NUMBER_OF_OPCODES] = [#(#paths),*];

				pub const fn name(self) -> &'static str {
					OP_NAME[self as usize]
				}

				pub const fn is_compressed(self) -> bool {
					let index = self as usize;
					index != 0 && index <= LAST_COMPRESSED_OPCODE as usize
				}

				pub const fn required_isa(self) -> Isa {
					REQUIRED_ISA[self as usize]
				}

				pub const fn attributes(self) -> Attr {
					ATTRIBUTES[self as usize]
				}

				/// Whether a pipeline boundary is required before executing this opcode.
				pub const fn stop_before(self) -> bool {
					let index = self as usize;
					(STOP_BEFORE[index / 64] >> (index % 64)) & 1 != 0
				}

				/// Whether a pipeline boundary is required after executing this opcode.
				pub const fn stop_after(self) -> bool {
					let index = self as usize;
					(STOP_AFTER[index / 64] >> (index % 64)) & 1 != 0
				}
			}
		},
	];

	items.extend(field_helpers(table));
	items
}
