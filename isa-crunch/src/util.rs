//
// Copyright (C) 2023 Ariel Abreu
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.
//

pub(crate) fn zero_extend_field(value: u64, width: u32) -> u64 {
	const ALL_BITS: u64 = !0u64;
	let mask = ALL_BITS.checked_shr(64 - width).unwrap_or(0);
	value & mask
}

pub(crate) fn sign_extend_field(value: u64, width: u32) -> u64 {
	const ALL_BITS: u64 = !0u64;
	if width == 0 {
		return 0;
	}
	let masked = zero_extend_field(value, width);
	let msb = 1u64 << (width - 1);
	if (masked & msb) != 0 {
		masked | ALL_BITS.checked_shl(width).unwrap_or(0)
	} else {
		masked
	}
}

/// A mask of `width` ones starting at bit `position`.
pub(crate) fn field_mask(position: u32, width: u32) -> u64 {
	zero_extend_field(!0u64, width)
		.checked_shl(position)
		.unwrap_or(0)
}

pub(crate) trait PadIntoArray<const LEN: usize>: Iterator + Sized {
	/// Fills an array from the iterator, padding missing trailing slots with `filler`.
	///
	/// Returns `Err(count)` with the number of items seen if the iterator is longer than `LEN`.
	fn pad_into_array(self, filler: Self::Item) -> Result<[Self::Item; LEN], usize>;
}

impl<const LEN: usize, T> PadIntoArray<LEN> for T
where
	T: Iterator,
	T::Item: Clone,
{
	fn pad_into_array(mut self, filler: Self::Item) -> Result<[Self::Item; LEN], usize> {
		let mut arr: [Self::Item; LEN] = std::array::from_fn(|_| filler.clone());

		for slot in arr.iter_mut() {
			match self.next() {
				Some(item) => *slot = item,
				None => return Ok(arr),
			}
		}

		let extra = self.count();
		if extra > 0 {
			Err(LEN + extra)
		} else {
			Ok(arr)
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use pretty_assertions::assert_eq;

	#[test]
	fn sign_extension() {
		assert_eq!(sign_extend_field(0x800, 12) as i64, -2048);
		assert_eq!(sign_extend_field(0x7ff, 12) as i64, 2047);
		assert_eq!(sign_extend_field(0x1, 1) as i64, -1);
		assert_eq!(zero_extend_field(0xfff, 8), 0xff);
		assert_eq!(zero_extend_field(u64::MAX, 64), u64::MAX);
	}

	#[test]
	fn masks() {
		assert_eq!(field_mask(7, 5), 0xf80);
		assert_eq!(field_mask(0, 32), 0xffff_ffff);
		assert_eq!(field_mask(3, 0), 0);
	}

	#[test]
	fn padding() {
		let short: [u8; 4] = [1u8, 2].into_iter().pad_into_array(0).unwrap();
		assert_eq!(short, [1, 2, 0, 0]);

		let exact: [u8; 2] = [1u8, 2].into_iter().pad_into_array(0).unwrap();
		assert_eq!(exact, [1, 2]);

		let long: Result<[u8; 2], usize> = [1u8, 2, 3, 4].into_iter().pad_into_array(0);
		assert_eq!(long, Err(4));
	}
}
