//
// Copyright (C) 2023 Ariel Abreu
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.
//

use std::str::FromStr;

use proc_macro2::{Group, Literal, TokenStream, TokenTree};
use quote::quote;

use super::{opcode_path, Placeholder, PLACEHOLDERS};
use crate::{
	config::CrunchConfig,
	error::{CrunchError, RecordField, Result},
	table::{InstructionSpec, InstructionTable, Sentinel},
};

fn is_dot(tree: Option<&TokenTree>) -> bool {
	matches!(tree, Some(TokenTree::Punct(punct)) if punct.as_char() == '.')
}

/// Rewrites placeholder identifiers into reads of the decoded instruction.
fn substitute(spec: &InstructionSpec, stream: TokenStream) -> Result<TokenStream> {
	let trees: Vec<TokenTree> = stream.into_iter().collect();
	let mut out = Vec::with_capacity(trees.len());

	for (index, tree) in trees.iter().enumerate() {
		// `state.rd` is a field access, `0..rd` is not
		let field_access = index > 0
			&& is_dot(trees.get(index - 1))
			&& !(index > 1 && is_dot(trees.get(index - 2)));

		match tree {
			TokenTree::Group(group) => {
				let mut replaced = Group::new(group.delimiter(), substitute(spec, group.stream())?);
				replaced.set_span(group.span());
				out.push(TokenTree::Group(replaced));
			},
			TokenTree::Ident(ident) if !field_access => {
				let name = ident.to_string();
				match PLACEHOLDERS.get(name.as_str()) {
					None => out.push(tree.clone()),
					Some(placeholder) => {
						let present = match placeholder {
							Placeholder::Slot { index, .. } => !spec.fields[*index].is_none(),
							Placeholder::Immediate => spec.immediate.is_some(),
						};
						if !present {
							return Err(CrunchError::UnknownPlaceholder {
								line: spec.line,
								opcode: spec.opcode.clone(),
								field: RecordField::Action,
								placeholder: name,
							});
						}

						let field = placeholder.field();
						out.extend(quote!((insn.#field)));
					},
				}
			},
			_ => out.push(tree.clone()),
		}
	}

	Ok(out.into_iter().collect())
}

/// Lexes and rewrites an action snippet, without its trailing semicolon.
fn action(spec: &InstructionSpec) -> Result<TokenStream> {
	let invalid = |message: String| CrunchError::InvalidAction {
		line: spec.line,
		opcode: spec.opcode.clone(),
		message,
	};

	let lexed = TokenStream::from_str(&spec.action).map_err(|e| invalid(e.to_string()))?;
	let mut trees: Vec<TokenTree> = substitute(spec, lexed)?.into_iter().collect();
	if matches!(trees.last(), Some(TokenTree::Punct(punct)) if punct.as_char() == ';') {
		trees.pop();
	}
	let body: TokenStream = trees.into_iter().collect();

	syn::parse2::<syn::Block>(quote!({ #body })).map_err(|e| invalid(e.to_string()))?;

	Ok(body)
}

fn arm(spec: &InstructionSpec, control_flow: &[String]) -> Result<TokenStream> {
	let opcode = opcode_path(&spec.ident());
	let body = action(spec)?;
	let body = if body.is_empty() { quote!() } else { quote!(#body;) };

	Ok(if spec.tokens.is_control_transfer(control_flow) {
		quote! {
			#opcode => {
				#body
				Step::Transfer(pc)
			},
		}
	} else {
		let bytes = Literal::u32_unsuffixed(spec.width.bytes());
		quote! {
			#opcode => {
				#body
				pc = pc.wrapping_add(#bytes);
				Step::Next(pc)
			},
		}
	})
}

pub(super) fn emit(table: &InstructionTable, config: &CrunchConfig) -> Result<Vec<TokenStream>> {
	let state = config.state_type()?;
	let arms = table
		.instructions()
		.iter()
		.map(|spec| arm(spec, &config.control_flow))
		.collect::<Result<Vec<_>>>()?;
	let sentinels: Vec<_> = [Sentinel::Zero, Sentinel::Illegal, Sentinel::Unknown]
		.into_iter()
		.map(|sentinel| opcode_path(sentinel.name()))
		.collect();

	Ok(vec![
		quote! {
			/// What the dispatcher did with an instruction.
			#[derive(Debug, Clone, Copy, PartialEq, Eq)]
			pub enum Step {
				/// Executed; continue at the contained address.
				Next(u64),
				/// A reference-model control transfer; the contained address is the new pc.
				Transfer(u64),
				/// Sentinel opcode; nothing was executed.
				Illegal,
			}
		},
		quote! {
			/// Runs the action of `insn`, which was fetched from `pc`.
			#[allow(unused_mut, unused_variables, unused_parens, unreachable_code, clippy::all)]
			pub fn execute(state: &mut #state, insn: &Insn, mut pc: u64) -> Step {
				match insn.opcode {
					#(#arms)*
					#(#sentinels)|* => Step::Illegal,
				}
			}
		},
	])
}
