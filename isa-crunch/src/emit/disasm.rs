//
// Copyright (C) 2023 Ariel Abreu
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.
//

use proc_macro2::{Literal, TokenStream};
use quote::{format_ident, quote};

use super::{opcode_path, Placeholder, PLACEHOLDERS};
use crate::{
	config::CrunchConfig,
	error::{CrunchError, RecordField, Result},
	operand::RegisterClass,
	table::{InstructionSpec, InstructionTable, Sentinel},
};

/// A template split into words and the punctuation between them.
fn split_words(template: &str) -> Vec<(bool, &str)> {
	let mut pieces = Vec::new();
	let mut start = 0;
	let mut in_word = false;

	for (index, c) in template.char_indices() {
		let is_word = c.is_ascii_alphanumeric() || c == '_';
		if index > start && is_word != in_word {
			pieces.push((in_word, &template[start..index]));
			start = index;
		}
		in_word = is_word;
	}
	if start < template.len() {
		pieces.push((in_word, &template[start..]));
	}

	pieces
}

fn escape(text: &str) -> String {
	text.replace('{', "{{").replace('}', "}}")
}

/// The format string and its arguments for one instruction.
fn format_template(spec: &InstructionSpec) -> Result<(String, Vec<TokenStream>)> {
	let mut format = escape(&spec.opcode);
	let mut args = Vec::new();

	let template = spec.assembly.as_str();
	if !template.is_empty() && template != "-" {
		format.push(' ');

		for (is_word, piece) in split_words(template) {
			let placeholder = if is_word { PLACEHOLDERS.get(piece) } else { None };
			let unknown = || CrunchError::UnknownPlaceholder {
				line: spec.line,
				opcode: spec.opcode.clone(),
				field: RecordField::Assembly,
				placeholder: piece.to_owned(),
			};

			match placeholder.copied() {
				None => format.push_str(&escape(piece)),
				Some(found @ Placeholder::Slot { index, class }) => {
					let slot = &spec.fields[index];
					if slot.is_none() {
						return Err(unknown());
					}

					let names = match class.unwrap_or(slot.class()) {
						RegisterClass::GeneralPurpose => format_ident!("GPR_NAMES"),
						RegisterClass::FloatingPoint => format_ident!("FPR_NAMES"),
					};
					let field = found.field();
					format.push_str("{}");
					args.push(quote!(register_name(&#names, insn.#field)));
				},
				Some(Placeholder::Immediate) => {
					if spec.immediate.is_none() {
						return Err(unknown());
					}
					format.push_str("{}");
					args.push(quote!(insn.immed));
				},
			}
		}
	}

	if spec.immediate.is_some() {
		format.push_str(" ({:#x})");
		args.push(quote!(insn.immed as u32));
	}

	Ok((format, args))
}

fn name_table(name: &str, names: &[String]) -> TokenStream {
	let name = format_ident!("{}", name);
	let len = Literal::usize_unsuffixed(names.len());
	quote! {
		pub const #name: [&str; #len] = [#(#names),*];
	}
}

pub(super) fn emit(table: &InstructionTable, config: &CrunchConfig) -> Result<Vec<TokenStream>> {
	let mut arms = Vec::with_capacity(table.instructions().len());

	for spec in table.instructions() {
		let opcode = opcode_path(&spec.ident());
		let (format, args) = format_template(spec)?;
		arms.push(if args.is_empty() {
			let text = format.replace("{{", "{").replace("}}", "}");
			quote!(#opcode => String::from(#text),)
		} else {
			quote!(#opcode => format!(#format, #(#args),*),)
		});
	}

	let sentinels: Vec<_> = [Sentinel::Zero, Sentinel::Illegal, Sentinel::Unknown]
		.into_iter()
		.map(|sentinel| opcode_path(sentinel.name()))
		.collect();

	Ok(vec![
		name_table("GPR_NAMES", &config.gpr_names),
		name_table("FPR_NAMES", &config.fpr_names),
		quote! {
			fn register_name(names: &[&'static str], register: u8) -> &'static str {
				names.get(register as usize).copied().unwrap_or("?")
			}
		},
		quote! {
			/// Renders `insn` in assembly syntax.
			pub fn disasm(insn: &Insn) -> String {
				match insn.opcode {
					#(#arms)*
					#(#sentinels)|* => String::from(insn.opcode.name()),
				}
			}
		},
	])
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::record::parse_source;
	use pretty_assertions::assert_eq;

	fn spec(line: &str) -> InstructionSpec {
		let table = InstructionTable::from_records(parse_source(line).unwrap(), &[]).unwrap();
		table.instructions()[0].clone()
	}

	#[test]
	fn splits_on_word_boundaries() {
		assert_eq!(
			split_words("rd,immed(rs1)"),
			vec![
				(true, "rd"),
				(false, ","),
				(true, "immed"),
				(false, "("),
				(true, "rs1"),
				(false, ")"),
			]
		);
		assert_eq!(split_words("x0"), vec![(true, "x0")]);
	}

	#[test]
	fn load_template() {
		let (format, args) = format_template(&spec(
			r#"lw rd,immed(rs1) I "{-11:0} ..... 010 ..... 0000011" x[11:7],x[19:15] """#,
		))
		.unwrap();

		assert_eq!(format, "lw {},{}({}) ({:#x})");
		assert_eq!(
			args.iter().map(|arg| arg.to_string()).collect::<Vec<_>>(),
			vec![
				quote!(register_name(&GPR_NAMES, insn.rd)).to_string(),
				quote!(insn.immed).to_string(),
				quote!(register_name(&GPR_NAMES, insn.rs1)).to_string(),
				quote!(insn.immed as u32).to_string(),
			]
		);
	}

	#[test]
	fn floating_point_synonyms_and_classes() {
		let (format, args) = format_template(&spec(
			r#"fmv.x.d rd,fs1 D "1110001 00000 ..... 000 ..... 1010011" x[11:7],x[19:15] """#,
		))
		.unwrap();

		assert_eq!(format, "fmv.x.d {},{}");
		assert_eq!(args[1].to_string(), quote!(register_name(&FPR_NAMES, insn.rs1)).to_string());

		let (_, args) = format_template(&spec(
			r#"fadd.d rd,rs1,rs2 D "0000001 ..... ..... ... ..... 1010011" f[11:7],f[19:15],f[24:20] """#,
		))
		.unwrap();
		assert_eq!(args[2].to_string(), quote!(register_name(&FPR_NAMES, insn.rs2)).to_string());
	}

	#[test]
	fn no_operands_and_braces() {
		let (format, args) = format_template(&spec(r#"ecall - I "00000000000000000000000001110011" - """#))
			.unwrap();
		assert_eq!(format, "ecall");
		assert!(args.is_empty());

		let (format, _) = format_template(&spec(r#"odd {x0} I "00000000000000000000000001110011" - """#))
			.unwrap();
		assert_eq!(format, "odd {{x0}}");
	}

	#[test]
	fn absent_operand_is_fatal() {
		let err = format_template(&spec(
			r#"jr rs1,rd I "000000000000 ..... 000 00000 1100111" -,x[19:15] """#,
		))
		.unwrap_err();
		assert_eq!(
			err,
			CrunchError::UnknownPlaceholder {
				line: 1,
				opcode: "jr".into(),
				field: RecordField::Assembly,
				placeholder: "rd".into(),
			}
		);

		let err = format_template(&spec(
			r#"li rd,immed I "000000000000 00000 000 ..... 0010011" x[11:7] """#,
		))
		.unwrap_err();
		assert!(matches!(err, CrunchError::UnknownPlaceholder { ref placeholder, .. } if placeholder == "immed"));
	}
}
