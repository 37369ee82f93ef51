//
// Copyright (C) 2023 Ariel Abreu
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.
//

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use crate::{
	error::{Axis, CrunchError, Result},
	record::Provenance,
};

pub const CUSTOM_TOKEN: &str = "custom";
pub const REFERENCE_TOKEN: &str = "reference";
pub const STOP_BEFORE_TOKEN: &str = "<";
pub const STOP_AFTER_TOKEN: &str = ">";

/// Narrowest unsigned integer that holds one bit per token of an axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum StorageWidth {
	U8,
	U16,
	U32,
	U64,
}

impl StorageWidth {
	pub const fn bits(&self) -> u32 {
		match self {
			StorageWidth::U8 => 8,
			StorageWidth::U16 => 16,
			StorageWidth::U32 => 32,
			StorageWidth::U64 => 64,
		}
	}

	pub const fn type_name(&self) -> &'static str {
		match self {
			StorageWidth::U8 => "u8",
			StorageWidth::U16 => "u16",
			StorageWidth::U32 => "u32",
			StorageWidth::U64 => "u64",
		}
	}

	fn for_population(count: usize) -> Option<Self> {
		[Self::U8, Self::U16, Self::U32, Self::U64]
			.into_iter()
			.find(|width| count <= width.bits() as usize)
	}
}

fn is_isa_token(token: &str) -> bool {
	!token.is_empty() && token.chars().all(|c| c.is_ascii_uppercase())
}

/// One instruction's attribute tokens, split by axis, synthesized tags included.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TokenSet {
	pub isa: BTreeSet<String>,
	pub behavior: BTreeSet<String>,
}

impl TokenSet {
	pub fn new<S: AsRef<str>>(tokens: &[S], provenance: Provenance, control_flow: &[String]) -> Self {
		let mut set = Self::default();

		for token in tokens {
			let token = token.as_ref();
			if is_isa_token(token) {
				set.isa.insert(token.to_owned());
			} else {
				set.behavior.insert(token.to_owned());
			}
		}

		if provenance.contains(Provenance::CUSTOM) {
			set.behavior.insert(CUSTOM_TOKEN.to_owned());
		}
		if provenance.contains(Provenance::REFERENCE) {
			set.behavior.insert(REFERENCE_TOKEN.to_owned());

			if control_flow.iter().any(|token| set.behavior.contains(token)) {
				set.behavior.insert(STOP_AFTER_TOKEN.to_owned());
			}
		}

		set
	}

	pub fn is_control_transfer(&self, control_flow: &[String]) -> bool {
		self.behavior.contains(REFERENCE_TOKEN)
			&& control_flow.iter().any(|token| self.behavior.contains(token))
	}
}

/// First phase: collects the token population of both axes.
#[derive(Debug, Default)]
pub struct Classifier {
	isa: BTreeSet<String>,
	behavior: BTreeSet<String>,
}

impl Classifier {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn observe(&mut self, tokens: &TokenSet) {
		self.isa.extend(tokens.isa.iter().cloned());
		self.behavior.extend(tokens.behavior.iter().cloned());
	}

	pub fn finalize(self) -> Result<Classification> {
		let classification = Classification {
			isa: AxisClassification::assign(Axis::Isa, self.isa)?,
			behavior: AxisClassification::assign(Axis::Behavior, self.behavior)?,
		};

		tracing::debug!(
			isa = classification.isa.len(),
			isa_storage = classification.isa.storage.type_name(),
			behavior = classification.behavior.len(),
			behavior_storage = classification.behavior.storage.type_name(),
			"classified attributes"
		);

		Ok(classification)
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AxisClassification {
	positions: BTreeMap<String, u32>,
	pub storage: StorageWidth,
}

impl AxisClassification {
	fn assign(axis: Axis, tokens: BTreeSet<String>) -> Result<Self> {
		let count = tokens.len();
		let storage = StorageWidth::for_population(count)
			.ok_or(CrunchError::TooManyAttributes { axis, count })?;

		// set iteration is sorted, so the rank is the position
		let positions = tokens
			.into_iter()
			.enumerate()
			.map(|(rank, token)| (token, rank as u32))
			.collect();

		Ok(Self { positions, storage })
	}

	pub fn position(&self, token: &str) -> Option<u32> {
		self.positions.get(token).copied()
	}

	pub fn len(&self) -> usize {
		self.positions.len()
	}

	pub fn is_empty(&self) -> bool {
		self.positions.is_empty()
	}

	/// Tokens in position order.
	pub fn tokens(&self) -> impl Iterator<Item = (&str, u32)> {
		self.positions.iter().map(|(token, position)| (token.as_str(), *position))
	}

	pub fn bits<'a>(&self, tokens: impl IntoIterator<Item = &'a String>) -> u64 {
		tokens
			.into_iter()
			.filter_map(|token| self.position(token))
			.fold(0, |acc, position| acc | (1u64 << position))
	}
}

/// Second phase: bit positions are only reachable from here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Classification {
	pub isa: AxisClassification,
	pub behavior: AxisClassification,
}

impl Classification {
	pub fn isa_bits(&self, tokens: &TokenSet) -> u64 {
		self.isa.bits(&tokens.isa)
	}

	pub fn behavior_bits(&self, tokens: &TokenSet) -> u64 {
		self.behavior.bits(&tokens.behavior)
	}
}
