//
// Copyright (C) 2023 Ariel Abreu
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.
//

use bitflags::bitflags;
use pest::{error::LineColLocation, iterators::Pair, Parser};
use serde::Serialize;

use crate::error::{CrunchError, RecordField, Result};

#[derive(Parser)]
#[grammar = "grammar.pest"]
pub(crate) struct DescriptionParser;

bitflags! {
	/// Where an instruction definition came from, as encoded by the leading kind marker.
	#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
	pub struct Provenance: u8 {
		/// `+`: a user-defined custom extension.
		const CUSTOM = 1 << 0;
		/// `!`: semantics are taken from a reference model.
		const REFERENCE = 1 << 1;
	}
}

/// One description line split into its columns. Nothing in here is interpreted yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRecord {
	pub line: usize,
	pub provenance: Provenance,
	pub opcode: String,
	pub assembly: String,
	pub attributes: Vec<String>,
	pub bit_pattern: String,
	pub operands: String,
	pub action: String,
}

/// Renders a pest failure as "at column N: message" so it can be attached to a domain error.
pub(crate) fn describe_pest_error(err: &pest::error::Error<Rule>) -> String {
	let column = match err.line_col {
		LineColLocation::Pos((_, col)) => col,
		LineColLocation::Span((_, col), _) => col,
	};

	format!("at column {}: {}", column, err.variant.message())
}

/// Picks the column a failed record parse was stuck on from the rules pest expected there.
fn failing_field(err: &pest::error::Error<Rule>) -> RecordField {
	let positives = match &err.variant {
		pest::error::ErrorVariant::ParsingError { positives, .. } => positives.as_slice(),
		pest::error::ErrorVariant::CustomError { .. } => &[],
	};

	positives
		.iter()
		.find_map(|rule| match rule {
			Rule::opcode => Some(RecordField::Opcode),
			Rule::assembly => Some(RecordField::Assembly),
			Rule::attributes => Some(RecordField::Attributes),
			Rule::bit_pattern => Some(RecordField::BitPattern),
			Rule::operands => Some(RecordField::Operands),
			Rule::action => Some(RecordField::Action),
			_ => None,
		})
		.unwrap_or(RecordField::Kind)
}

fn parse_provenance(kind: &str) -> Provenance {
	kind.chars().fold(Provenance::empty(), |acc, marker| match marker {
		'+' => acc | Provenance::CUSTOM,
		'!' => acc | Provenance::REFERENCE,
		// the grammar only lets the two markers through
		_ => unreachable!(),
	})
}

fn parse_attributes(line: usize, text: &str) -> Result<Vec<String>> {
	let list = DescriptionParser::parse(Rule::attribute_list, text)
		.map_err(|e| CrunchError::MalformedRecord {
			line,
			field: RecordField::Attributes,
			message: format!("\"{}\" {}", text, describe_pest_error(&e)),
		})?
		.next()
		.unwrap();

	Ok(list
		.into_inner()
		.filter(|pair| pair.as_rule() == Rule::attribute)
		.map(|pair| pair.as_str().to_owned())
		.collect())
}

fn inner_text(pair: Pair<Rule>) -> String {
	// quoted columns wrap a single text pair
	pair.into_inner()
		.next()
		.map(|text| text.as_str().to_owned())
		.unwrap_or_default()
}

/// Parses one description line.
///
/// Blank lines and `#` comments yield `Ok(None)`. Anything else must be a complete record.
pub fn parse_line(line: usize, text: &str) -> Result<Option<RawRecord>> {
	let trimmed = text.trim();
	if trimmed.is_empty() || trimmed.starts_with('#') {
		return Ok(None);
	}

	let record = DescriptionParser::parse(Rule::record, trimmed)
		.map_err(|e| CrunchError::MalformedRecord {
			line,
			field: failing_field(&e),
			message: describe_pest_error(&e),
		})?
		.next()
		.unwrap();

	let mut provenance = Provenance::empty();
	let mut opcode = String::new();
	let mut assembly = String::new();
	let mut attributes = Vec::new();
	let mut bit_pattern = String::new();
	let mut operands = String::new();
	let mut action = String::new();

	for pair in record.into_inner() {
		match pair.as_rule() {
			Rule::kind => provenance = parse_provenance(pair.as_str()),
			Rule::opcode => opcode = pair.as_str().to_owned(),
			Rule::assembly => assembly = pair.as_str().to_owned(),
			Rule::attributes => attributes = parse_attributes(line, pair.as_str())?,
			Rule::bit_pattern => bit_pattern = inner_text(pair),
			Rule::operands => operands = pair.as_str().to_owned(),
			Rule::action => action = inner_text(pair),
			Rule::EOI => {},
			_ => unreachable!(),
		}
	}

	tracing::trace!(line, %opcode, ?provenance, "parsed record");

	Ok(Some(RawRecord {
		line,
		provenance,
		opcode,
		assembly,
		attributes,
		bit_pattern: bit_pattern.trim().to_owned(),
		operands,
		action: action.trim().to_owned(),
	}))
}

/// Parses a whole description, stopping at the first malformed line.
pub fn parse_source(source: &str) -> Result<Vec<RawRecord>> {
	let mut records = Vec::new();

	for (index, text) in source.lines().enumerate() {
		if let Some(record) = parse_line(index + 1, text)? {
			records.push(record);
		}
	}

	Ok(records)
}

#[cfg(test)]
mod tests {
	use super::*;
	use pretty_assertions::assert_eq;

	#[test]
	fn parses_plain_record() {
		let record = parse_line(
			3,
			r#"add  rd,rs1,rs2  I  "0000000 ..... ..... 000 ..... 0110011"  x[11:7],x[19:15],x[24:20]  "state.x[rd as usize] = 0""#,
		)
		.unwrap()
		.unwrap();

		assert_eq!(
			record,
			RawRecord {
				line: 3,
				provenance: Provenance::empty(),
				opcode: "add".into(),
				assembly: "rd,rs1,rs2".into(),
				attributes: vec!["I".into()],
				bit_pattern: "0000000 ..... ..... 000 ..... 0110011".into(),
				operands: "x[11:7],x[19:15],x[24:20]".into(),
				action: "state.x[rd as usize] = 0".into(),
			}
		);
	}

	#[test]
	fn kind_marker_as_column_or_prefix() {
		let column = parse_line(1, r#"+!  cust.op  -  I,uj  "0000000000000000"  -  """#)
			.unwrap()
			.unwrap();
		let glued = parse_line(1, r#"!cust.op  -  I,uj  "0000000000000000"  -  """#)
			.unwrap()
			.unwrap();

		assert_eq!(column.provenance, Provenance::CUSTOM | Provenance::REFERENCE);
		assert_eq!(column.opcode, "cust.op");
		assert_eq!(glued.provenance, Provenance::REFERENCE);
		assert_eq!(glued.opcode, "cust.op");
		assert_eq!(glued.action, "");
	}

	#[test]
	fn skips_comments_and_blank_lines() {
		assert_eq!(parse_line(1, "   ").unwrap(), None);
		assert_eq!(parse_line(2, "# c.nop  -  C ...").unwrap(), None);
		assert_eq!(parse_line(3, "\t  # indented comment").unwrap(), None);
	}

	#[test]
	fn action_runs_to_last_quote() {
		let record = parse_line(1, r#"ecall  -  I,<,>  "00000000000000000000000001110011"  -  "state.trap("ecall")""#)
			.unwrap()
			.unwrap();

		assert_eq!(record.attributes, vec!["I", "<", ">"]);
		assert_eq!(record.action, r#"state.trap("ecall")"#);
	}

	#[test]
	fn dash_means_no_attributes() {
		let record = parse_line(1, r#"nop  -  -  "0000000000000001"  -  """#).unwrap().unwrap();
		assert!(record.attributes.is_empty());
	}

	#[test]
	fn missing_action_is_malformed() {
		let err = parse_line(7, r#"add  rd,rs1,rs2  I  "0000000 ..... ..... 000 ..... 0110011"  x[11:7]"#)
			.unwrap_err();

		assert!(
			matches!(
				err,
				CrunchError::MalformedRecord {
					line: 7,
					field: RecordField::Action,
					..
				}
			),
			"{err}"
		);
	}

	#[test]
	fn bad_attribute_token_is_malformed() {
		let err = parse_line(2, r#"add  -  I,ld+st  "0000000000000001"  -  """#).unwrap_err();

		assert!(matches!(
			err,
			CrunchError::MalformedRecord {
				line: 2,
				field: RecordField::Attributes,
				..
			}
		));
	}

	#[test]
	fn source_keeps_line_numbers() {
		let source = "# header\n\nadd - I \"0000000000000001\" - \"\"\nsub - I \"0000000000000011\" - \"\"\n";
		let records = parse_source(source).unwrap();

		assert_eq!(records.iter().map(|r| r.line).collect::<Vec<_>>(), vec![3, 4]);
	}
}
