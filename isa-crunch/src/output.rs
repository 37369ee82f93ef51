//
// Copyright (C) 2023 Ariel Abreu
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.
//

use std::{
	fs,
	io::{self, Write},
	path::Path,
};

use tempfile::NamedTempFile;

/// Writes `contents` to `path` unless the file already holds exactly those bytes.
///
/// The new contents go to a temporary file next to `path` first and are renamed over it, so a
/// reader never sees a half-written artifact. Returns whether the file was (re)written.
pub fn write_if_changed(path: &Path, contents: &[u8]) -> io::Result<bool> {
	match fs::read(path) {
		Ok(existing) if existing == contents => {
			tracing::info!(path = %path.display(), "unchanged");
			return Ok(false);
		},
		Ok(_) => {},
		Err(e) if e.kind() == io::ErrorKind::NotFound => {},
		Err(e) => return Err(e),
	}

	let dir = match path.parent() {
		Some(parent) if !parent.as_os_str().is_empty() => parent,
		_ => Path::new("."),
	};

	let mut temp = NamedTempFile::new_in(dir)?;
	temp.write_all(contents)?;
	temp.flush()?;
	temp.persist(path).map_err(|e| e.error)?;

	tracing::info!(path = %path.display(), bytes = contents.len(), "wrote");
	Ok(true)
}
