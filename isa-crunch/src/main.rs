//
// Copyright (C) 2023 Ariel Abreu
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.
//

use std::{
	fs,
	path::{Path, PathBuf},
	process::exit,
};

use anyhow::{Context, Result};
use clap::Parser as ClapParser;
use tracing_subscriber::EnvFilter;

use isa_crunch::{output::write_if_changed, Compilation, CrunchConfig};

#[derive(ClapParser)]
#[command(author, version, about, long_about = None)]
struct Args {
	/// Instruction description to compile.
	source: PathBuf,

	/// Directory the generated artifacts are written to; defaults to the source's directory.
	#[arg(short, long)]
	output: Option<PathBuf>,

	/// JSON configuration file.
	#[arg(long)]
	config: Option<PathBuf>,

	/// Type the dispatcher receives as `state`; overrides the configuration.
	#[arg(long)]
	state_type: Option<String>,

	/// Warn about rules that shadow or overlap each other.
	#[arg(long)]
	check_overlaps: bool,

	/// Also write the resolved table and classification as JSON.
	#[arg(long)]
	dump_table: Option<PathBuf>,

	/// Decode these words with the resolved table instead of writing artifacts.
	#[arg(long, value_parser = parse_word)]
	decode: Vec<u32>,
}

fn parse_word(text: &str) -> Result<u32, String> {
	let parsed = match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
		Some(hex) => u32::from_str_radix(&hex.replace('_', ""), 16),
		None => text.replace('_', "").parse(),
	};
	parsed.map_err(|e| format!("\"{}\" is not a 32-bit word: {}", text, e))
}

fn load_config(args: &Args) -> Result<CrunchConfig> {
	let mut config = match &args.config {
		Some(path) => {
			let text = fs::read_to_string(path)
				.with_context(|| format!("Failed to read \"{}\"", path.display()))?;
			CrunchConfig::from_json(&text)
				.with_context(|| format!("Invalid configuration in \"{}\"", path.display()))?
		},
		None => CrunchConfig::default(),
	};

	if let Some(state_type) = &args.state_type {
		config.state_type = state_type.clone();
	}
	config.validate()?;

	Ok(config)
}

fn write(path: &Path, contents: &[u8]) -> Result<()> {
	write_if_changed(path, contents)
		.with_context(|| format!("Failed to write \"{}\"", path.display()))?;
	Ok(())
}

fn run(args: Args) -> Result<()> {
	let config = load_config(&args)?;

	let source = fs::read_to_string(&args.source)
		.with_context(|| format!("Failed to read \"{}\"", args.source.display()))?;
	let compilation = Compilation::new(&source, &config)
		.with_context(|| format!("Failed to compile \"{}\"", args.source.display()))?;

	if args.check_overlaps {
		for overlap in compilation.table.overlaps() {
			tracing::warn!("{}", overlap);
		}
	}

	if !args.decode.is_empty() {
		for word in &args.decode {
			println!("{:#010x}: {}", word, compilation.table.decode(*word, 4));
		}
		return Ok(());
	}

	// render everything before touching the output directory
	let artifacts = compilation
		.emit(&config)
		.with_context(|| format!("Failed to generate code for \"{}\"", args.source.display()))?
		.render();
	let dump = match &args.dump_table {
		Some(path) => Some((path, serde_json::to_string_pretty(&compilation)?)),
		None => None,
	};

	let output = match args.output {
		Some(dir) => dir,
		None => args
			.source
			.parent()
			.map(Path::to_path_buf)
			.unwrap_or_default(),
	};

	for (name, contents) in [
		(&config.files.opcodes, &artifacts.opcodes),
		(&config.files.decode, &artifacts.decode),
		(&config.files.disasm, &artifacts.disasm),
		(&config.files.execute, &artifacts.execute),
	] {
		write(&output.join(name), contents.as_bytes())?;
	}

	if let Some((path, json)) = dump {
		write(path, json.as_bytes())?;
	}

	Ok(())
}

fn main() {
	tracing_subscriber::fmt()
		.with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
		.with_writer(std::io::stderr)
		.init();

	let args = Args::parse();

	if let Err(e) = run(args) {
		eprintln!("{:#}", e);
		exit(1);
	}
}
