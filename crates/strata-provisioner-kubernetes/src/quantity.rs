// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Parsing of Kubernetes resource quantities.

/// (suffix, multiplier, divisor)
const SUFFIXES: &[(&str, u128, u128)] = &[
	("Ki", 1 << 10, 1),
	("Mi", 1 << 20, 1),
	("Gi", 1 << 30, 1),
	("Ti", 1 << 40, 1),
	("Pi", 1 << 50, 1),
	("Ei", 1 << 60, 1),
	("k", 1_000, 1),
	("M", 1_000_000, 1),
	("G", 1_000_000_000, 1),
	("T", 1_000_000_000_000, 1),
	("P", 1_000_000_000_000_000, 1),
	("E", 1_000_000_000_000_000_000, 1),
	("m", 1, 1_000),
];

/// Parse a quantity such as `40Gi`, `1.5G`, `1e12` or `42949672960` into
/// whole units, rounding fractions up.
pub fn parse_quantity(s: &str) -> Option<u128> {
	let s = s.trim();
	let (number, multiplier, divisor) = match SUFFIXES
		.iter()
		.find_map(|(suffix, mul, div)| s.strip_suffix(suffix).map(|n| (n, *mul, *div)))
	{
		Some(found) => found,
		None => split_exponent(s)?,
	};

	let number = number.strip_prefix('+').unwrap_or(number);
	let (int_part, frac_part) = match number.split_once('.') {
		Some((i, f)) => (i, f),
		None => (number, ""),
	};
	if int_part.is_empty() && frac_part.is_empty() {
		return None;
	}
	if !int_part.chars().all(|c| c.is_ascii_digit()) || !frac_part.chars().all(|c| c.is_ascii_digit())
	{
		return None;
	}

	let int_value: u128 = if int_part.is_empty() {
		0
	} else {
		int_part.parse().ok()?
	};
	let frac_value: u128 = if frac_part.is_empty() {
		0
	} else {
		frac_part.parse().ok()?
	};
	let frac_scale = 10u128.checked_pow(u32::try_from(frac_part.len()).ok()?)?;

	// value = (int + frac / frac_scale) * multiplier / divisor
	let numerator = int_value
		.checked_mul(frac_scale)?
		.checked_add(frac_value)?
		.checked_mul(multiplier)?;
	let denominator = frac_scale.checked_mul(divisor)?;
	Some(numerator.div_ceil(denominator))
}

/// Split a decimal exponent (`1e3`, `15E-1`) off the number.
fn split_exponent(s: &str) -> Option<(&str, u128, u128)> {
	let Some(at) = s.find(|c: char| c == 'e' || c == 'E') else {
		return Some((s, 1, 1));
	};
	let exponent: i32 = s[at + 1..].parse().ok()?;
	let scale = 10u128.checked_pow(exponent.unsigned_abs())?;
	if exponent >= 0 {
		Some((&s[..at], scale, 1))
	} else {
		Some((&s[..at], 1, scale))
	}
}
