use std::io::{Cursor, ErrorKind, Read};

/// Cursor-based little-endian reader.
///
/// `Deps` carries whatever sizing context a type needs to know its own
/// physical width; plain integers need none, metadata indices need the
/// per-image [`IndexSizes`](crate::raw::indices::sizes::IndexSizes).
pub trait FromByteStream: Sized {
	type Deps: ?Sized;
	fn read(stream: &mut Cursor<&[u8]>, deps: &Self::Deps) -> std::io::Result<Self>;
}

impl FromByteStream for u8 {
	type Deps = ();
	#[inline]
	fn read(stream: &mut Cursor<&[u8]>, _: &Self::Deps) -> std::io::Result<Self> {
		let mut byte = 0u8;
		stream.read_exact(std::slice::from_mut(&mut byte))?;
		Ok(byte)
	}
}

macro_rules! impl_from_le_byte_stream {
	($($ty: ty),*) => {$(
		impl FromByteStream for $ty {
			type Deps = ();
			#[inline]
			fn read(stream: &mut Cursor<&[u8]>, _: &Self::Deps) -> std::io::Result<Self> {
				let bytes = <[u8; std::mem::size_of::<Self>()]>::read(stream, &())?;
				Ok(Self::from_le_bytes(bytes))
			}
		}
	)*};
}

impl_from_le_byte_stream!(u16, u32, u64);

impl<const SIZE: usize> FromByteStream for [u8; SIZE] {
	type Deps = ();
	#[inline]
	fn read(stream: &mut Cursor<&[u8]>, _: &Self::Deps) -> std::io::Result<Self> {
		let mut bytes = [0u8; SIZE];
		stream.read_exact(&mut bytes)?;
		Ok(bytes)
	}
}

/// Wires a bitflags type into the reader machinery; unknown bits are
/// retained, never an error.
macro_rules! impl_from_byte_stream {
	($ty: ty, $repr: ty) => {
		impl crate::utilities::FromByteStream for $ty {
			type Deps = ();
			#[inline]
			fn read(stream: &mut std::io::Cursor<&[u8]>, _: &Self::Deps) -> std::io::Result<Self> {
				Ok(Self::from_bits_retain(<$repr as crate::utilities::FromByteStream>::read(stream, &())?))
			}
		}

		impl crate::raw::indices::sizes::SizeOf<$ty> for crate::raw::indices::sizes::IndexSizes {
			#[inline]
			fn size_of(&self) -> usize {
				std::mem::size_of::<$repr>()
			}
		}
	};
}

pub(crate) use impl_from_byte_stream;

/// Reads an ECMA-335 CompressedInt (II.23.2): 1, 2 or 4 bytes, MSB-tagged.
pub(crate) fn read_compressed_u32(stream: &mut Cursor<&[u8]>) -> std::io::Result<u32> {
	let first = u8::read(stream, &())?;
	if first & 0x80 == 0 {
		Ok(first as u32)
	} else if first & 0xC0 == 0x80 {
		let next = u8::read(stream, &())?;
		Ok((((first & 0x3F) as u32) << 8) | next as u32)
	} else if first & 0xE0 == 0xC0 {
		let rest = <[u8; 3]>::read(stream, &())?;
		Ok((((first & 0x1F) as u32) << 24)
			| ((rest[0] as u32) << 16)
			| ((rest[1] as u32) << 8)
			| rest[2] as u32)
	} else {
		Err(ErrorKind::InvalidData.into())
	}
}

/// Inverse of [`read_compressed_u32`]; `value` must fit in 29 bits.
#[cfg(test)]
pub(crate) fn write_compressed_u32(out: &mut Vec<u8>, value: u32) {
	debug_assert!(value < 1 << 29);
	match value {
		0..=0x7F => out.push(value as u8),
		0x80..=0x3FFF => out.extend_from_slice(&[0x80 | (value >> 8) as u8, value as u8]),
		_ => out.extend_from_slice(&[
			0xC0 | (value >> 24) as u8,
			(value >> 16) as u8,
			(value >> 8) as u8,
			value as u8,
		]),
	}
}

/// The encoded width of a CompressedInt whose first byte is `first`.
pub(crate) fn compressed_u32_width(first: u8) -> Option<usize> {
	if first & 0x80 == 0 {
		Some(1)
	} else if first & 0xC0 == 0x80 {
		Some(2)
	} else if first & 0xE0 == 0xC0 {
		Some(4)
	} else {
		None
	}
}

/// Reads a NUL-terminated name of at most `max_len` bytes, advancing the
/// cursor to the next 4-byte boundary past the terminator.
pub(crate) fn read_padded_name(stream: &mut Cursor<&[u8]>, max_len: usize) -> std::io::Result<String> {
	let start = stream.position() as usize;
	let data = *stream.get_ref();
	if start >= data.len() {
		return Err(ErrorKind::UnexpectedEof.into());
	}
	let window = &data[start..data.len().min(start + max_len)];
	let (name, advance) = match window.iter().position(|b| *b == 0) {
		Some(len) => (&window[..len], round_to_multiple_of(len + 1, 4)),
		None => (window, window.len()),
	};
	stream.set_position((start + advance.min(data.len() - start)) as u64);
	Ok(String::from_utf8_lossy(name).into_owned())
}

#[inline]
pub(crate) const fn round_to_multiple_of(value: usize, multiple: usize) -> usize {
	((value + (multiple - 1)) / multiple) * multiple
}

pub(crate) fn enumerate_set_bits(mut value: u64) -> impl Iterator<Item = usize> {
	std::iter::from_fn(move || match value.trailing_zeros() {
		64 => None,
		idx => {
			value &= !(1u64 << idx);
			Some(idx as usize)
		},
	})
}

#[cfg(test)]
mod tests {
	use super::*;

	fn roundtrip(value: u32) -> u32 {
		let mut bytes = Vec::new();
		write_compressed_u32(&mut bytes, value);
		let mut stream = Cursor::new(bytes.as_slice());
		read_compressed_u32(&mut stream).unwrap()
	}

	#[test]
	fn compressed_u32_roundtrips_across_width_boundaries() {
		for value in [0, 1, 0x7F, 0x80, 0x3FFF, 0x4000, 0x12345, 0x1FFF_FFFF] {
			assert_eq!(roundtrip(value), value);
		}
	}

	#[test]
	fn compressed_u32_rejects_invalid_prefix() {
		let mut stream = Cursor::new([0xE0u8, 0, 0, 0].as_slice());
		assert!(read_compressed_u32(&mut stream).is_err());
	}

	#[test]
	fn padded_names_advance_to_alignment() {
		let data = b"#US\0#Blob\0\0\0rest";
		let mut stream = Cursor::new(data.as_slice());
		assert_eq!(read_padded_name(&mut stream, 32).unwrap(), "#US");
		assert_eq!(stream.position(), 4);
		assert_eq!(read_padded_name(&mut stream, 32).unwrap(), "#Blob");
		assert_eq!(stream.position(), 12);
	}

	#[test]
	fn set_bits_enumerate_in_ascending_order() {
		let bits: Vec<_> = enumerate_set_bits(0x8000_0000_0000_0005).collect();
		assert_eq!(bits, [0, 2, 63]);
	}
}
