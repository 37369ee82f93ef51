//
// Copyright (C) 2023 Ariel Abreu
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.
//

use proc_macro2::TokenStream;
use quote::quote;

use super::{hex, number, opcode_path};
use crate::{
	layout::{ImmediateSpec, ImmediateTerm},
	operand::FieldSpec,
	table::{InstructionSpec, InstructionTable},
	util::field_mask,
};

fn register(field: &FieldSpec) -> TokenStream {
	match *field {
		FieldSpec::None => quote!(NOREG),
		FieldSpec::Literal(value) => {
			let value = number(u32::from(value));
			quote!(#value)
		},
		FieldSpec::Field { hi, lo, offset, .. } => {
			let lo_bits = number(lo);
			let mask = hex(field_mask(0, hi - lo + 1), 2);
			if offset == 0 {
				quote!((((word >> #lo_bits) & #mask) as u8))
			} else {
				let offset = number(u32::from(offset));
				quote!((((word >> #lo_bits) & #mask) as u8 + #offset))
			}
		},
	}
}

fn term(term: &ImmediateTerm) -> TokenStream {
	let shift = number(term.shift);
	let extracted = if term.sign_extend {
		// park the slice at the top of the word so the arithmetic shift drags its sign bit down
		let up = number(32 - term.position - term.width);
		let down = number(32 - term.width);
		quote!((((word << #up) as i32) >> #down) as i64)
	} else {
		let position = number(term.position);
		let mask = hex(field_mask(0, term.width), 8);
		quote!(((word >> #position) & #mask) as i64)
	};

	if term.shift == 0 {
		quote!((#extracted))
	} else {
		quote!(((#extracted) << #shift))
	}
}

fn immediate(spec: Option<&ImmediateSpec>) -> TokenStream {
	match spec {
		None => quote!(0),
		Some(spec) => {
			let terms = spec.terms.iter().map(term);
			quote!(#(#terms)|*)
		},
	}
}

fn rule(spec: &InstructionSpec) -> TokenStream {
	let digits = spec.width.bytes() as usize * 2;
	let mask = hex(u64::from(spec.mask), digits);
	let match_value = hex(u64::from(spec.match_value), digits);
	let opcode = opcode_path(&spec.ident());
	let [rd, rs1, rs2, rs3] = spec.fields.map(|field| register(&field));
	let immed = immediate(spec.immediate.as_ref());

	quote! {
		if word & #mask == #match_value {
			return Insn {
				opcode: #opcode,
				rd: #rd,
				rs1: #rs1,
				rs2: #rs2,
				rs3: #rs3,
				immed: #immed,
			};
		}
	}
}

pub(super) fn emit(table: &InstructionTable) -> Vec<TokenStream> {
	let compressed = table.compressed().iter().map(rule);
	let standard = table.standard().iter().map(rule);

	vec![
		quote! {
			/// Register number of an operand slot the instruction does not use.
			pub const NOREG: u8 = u8::MAX;
		},
		quote! {
			/// A decoded instruction: opcode, the four register slots and the reconstructed immediate.
			#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
			pub struct Insn {
				pub opcode: Opcode,
				pub rd: u8,
				pub rs1: u8,
				pub rs2: u8,
				pub rs3: u8,
				pub immed: i64,
			}
		},
		quote! {
			impl Insn {
				pub const fn sentinel(opcode: Opcode) -> Self {
					Self {
						opcode,
						rd: NOREG,
						rs1: NOREG,
						rs2: NOREG,
						rs3: NOREG,
						immed: 0,
					}
				}

				/// Encoded size in bytes.
				pub const fn bytes(&self) -> u64 {
					if self.opcode.is_compressed() {
						2
					} else {
						4
					}
				}
			}
		},
		quote! {
			impl Default for Insn {
				fn default() -> Self {
					Self::sentinel(Opcode::ZERO)
				}
			}
		},
		quote! {
			/// Decodes the instruction at the start of `word`, of which `available` bytes are valid.
			///
			/// Rules are tried in description order and the first match wins.
			#[allow(unused_parens, clippy::identity_op)]
			pub fn decode(word: u32, available: usize) -> Insn {
				if available >= 2 {
					#(#compressed)*
				}

				if available >= 4 {
					#(#standard)*
				}

				if available < 4 {
					Insn::sentinel(Opcode::ILLEGAL)
				} else {
					Insn::sentinel(Opcode::UNKNOWN)
				}
			}
		},
	]
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::{layout, operand::RegisterClass};
	use pretty_assertions::assert_eq;

	#[test]
	fn register_extraction() {
		let field = FieldSpec::Field {
			class: RegisterClass::GeneralPurpose,
			hi: 4,
			lo: 2,
			offset: 8,
		};

		assert_eq!(
			register(&field).to_string(),
			quote!((((word >> 2) & 0x07) as u8 + 8)).to_string()
		);
		assert_eq!(register(&FieldSpec::None).to_string(), "NOREG");
	}

	#[test]
	fn signed_term_uses_arithmetic_shift() {
		let spec = layout::resolve(1, "{-11:0} ..... 000 ..... 0010011")
			.unwrap()
			.immediate
			.unwrap();

		assert_eq!(
			immediate(Some(&spec)).to_string(),
			quote!(((((word << 0) as i32) >> 20) as i64)).to_string()
		);
	}

	#[test]
	fn split_terms_are_or_ed() {
		let spec = layout::resolve(1, "000 {-5} ..... {4:0} 01").unwrap().immediate.unwrap();

		assert_eq!(
			immediate(Some(&spec)).to_string(),
			quote!(
				(((word >> 2) & 0x0000001f) as i64)
					| (((((word << 19) as i32) >> 31) as i64) << 5)
			)
			.to_string()
		);
	}
}
