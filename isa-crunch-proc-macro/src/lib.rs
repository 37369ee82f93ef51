//
// Copyright (C) 2023 Ariel Abreu
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.
//

//! Runs the instruction description compiler at build time and splices the generated opcode,
//! decode, disassembly and dispatch items into the calling module.
//!
//! ```ignore
//! mod rv {
//!     use super::Hart as State;
//!     isa_crunch_proc_macro::include_isa!(state = State, "isa/riscv.isa");
//! }
//! ```
//!
//! The calling crate must depend on `bitflags`.

use std::path::PathBuf;

use proc_macro2::{Span, TokenStream};
use quote::{quote, ToTokens};
use syn::{
	parse::{Parse, ParseStream},
	parse_macro_input, LitStr, Token,
};

use isa_crunch::{Compilation, CrunchConfig};

mod kw {
	use syn::custom_keyword;

	custom_keyword!(state);
}

/// `[state = Type,] "text"`
struct MacroInput {
	state: Option<syn::Type>,
	source: LitStr,
}

impl Parse for MacroInput {
	fn parse(input: ParseStream) -> syn::Result<Self> {
		let mut state = None;

		if input.peek(kw::state) {
			input.parse::<kw::state>()?;
			input.parse::<Token![=]>()?;
			state = Some(input.parse()?);
			input.parse::<Token![,]>()?;
		}

		let source = input.parse()?;

		if input.peek(Token![,]) {
			input.parse::<Token![,]>()?;
		}

		Ok(Self { state, source })
	}
}

impl MacroInput {
	fn config(&self) -> CrunchConfig {
		let mut config = CrunchConfig::default();
		if let Some(state) = &self.state {
			config.state_type = state.to_token_stream().to_string();
		}
		config
	}
}

fn expand(text: &str, config: &CrunchConfig, span: Span) -> syn::Result<TokenStream> {
	let to_error = |e: isa_crunch::CrunchError| syn::Error::new(span, e.to_string());

	let compilation = Compilation::new(text, config).map_err(to_error)?;
	let tokens = compilation.emit(config).map_err(to_error)?;

	Ok(tokens.into_token_stream())
}

/// Expands an inline instruction description.
#[proc_macro]
pub fn isa(item: proc_macro::TokenStream) -> proc_macro::TokenStream {
	let input = parse_macro_input!(item as MacroInput);

	match expand(&input.source.value(), &input.config(), input.source.span()) {
		Ok(tokens) => tokens.into(),
		Err(e) => e.to_compile_error().into(),
	}
}

/// Expands an instruction description file, given relative to the calling crate's manifest.
#[proc_macro]
pub fn include_isa(item: proc_macro::TokenStream) -> proc_macro::TokenStream {
	let input = parse_macro_input!(item as MacroInput);
	let span = input.source.span();

	let root = match std::env::var_os("CARGO_MANIFEST_DIR") {
		Some(dir) => PathBuf::from(dir),
		None => PathBuf::from("."),
	};
	let path = root.join(input.source.value());

	let text = match std::fs::read_to_string(&path) {
		Ok(text) => text,
		Err(e) => {
			return syn::Error::new(span, format!("Failed to read \"{}\": {}", path.display(), e))
				.to_compile_error()
				.into()
		},
	};

	match expand(&text, &input.config(), span) {
		Ok(tokens) => {
			// ties the expansion to the file so edits trigger a rebuild
			let path = path.to_string_lossy().into_owned();
			quote! {
				const _: &[u8] = include_bytes!(#path);
				#tokens
			}
			.into()
		},
		Err(e) => e.to_compile_error().into(),
	}
}
