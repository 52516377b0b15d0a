//! Avro encoding of data item tags.
//!
//! Tags are an Avro array of `{name: bytes, value: bytes}` records. The array
//! is written as blocks, each prefixed by a zigzag varint item count, and
//! terminated by an empty block. An empty tag list is written as no bytes.

use crate::CodecError;
use serde::{Deserialize, Serialize};

pub const MAX_TAGS: usize = 128;
pub const MAX_NAME_BYTES: usize = 1024;
pub const MAX_VALUE_BYTES: usize = 3072;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
	pub name: String,
	pub value: String,
}

impl Tag {
	pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
		Self {
			name: name.into(),
			value: value.into(),
		}
	}
}

pub fn encode_tags(tags: &[Tag]) -> Vec<u8> {
	if tags.is_empty() {
		return Vec::new();
	}

	let mut out = Vec::new();
	write_long(&mut out, tags.len() as i64);
	for tag in tags {
		write_bytes(&mut out, tag.name.as_bytes());
		write_bytes(&mut out, tag.value.as_bytes());
	}
	write_long(&mut out, 0);
	out
}

pub fn decode_tags(raw: &[u8]) -> Result<Vec<Tag>, CodecError> {
	let mut reader = Reader { buf: raw, pos: 0 };
	let mut tags = Vec::new();
	if raw.is_empty() {
		return Ok(tags);
	}

	loop {
		let mut count = reader.long()?;
		if count == 0 {
			break;
		}
		if count < 0 {
			// Negative counts are followed by the block size in bytes.
			count = count
				.checked_neg()
				.ok_or_else(|| CodecError::InvalidTags("block count overflow".into()))?;
			reader.long()?;
		}
		for _ in 0..count {
			let name = reader.bytes()?;
			let value = reader.bytes()?;
			tags.push(Tag {
				name: String::from_utf8_lossy(name).into_owned(),
				value: String::from_utf8_lossy(value).into_owned(),
			});
			if tags.len() > MAX_TAGS {
				return Err(CodecError::InvalidTags(format!(
					"more than {} tags",
					MAX_TAGS
				)));
			}
		}
	}

	if reader.pos != raw.len() {
		return Err(CodecError::InvalidTags("trailing bytes after tags".into()));
	}

	Ok(tags)
}

/// Checks the ANS-104 limits on tag count and tag sizes.
pub fn validate_tags(tags: &[Tag]) -> Result<(), CodecError> {
	if tags.len() > MAX_TAGS {
		return Err(CodecError::InvalidTags(format!("more than {} tags", MAX_TAGS)));
	}
	for tag in tags {
		if tag.name.is_empty() || tag.name.len() > MAX_NAME_BYTES {
			return Err(CodecError::InvalidTags(format!(
				"tag name must be 1-{} bytes",
				MAX_NAME_BYTES
			)));
		}
		if tag.value.is_empty() || tag.value.len() > MAX_VALUE_BYTES {
			return Err(CodecError::InvalidTags(format!(
				"tag value must be 1-{} bytes",
				MAX_VALUE_BYTES
			)));
		}
	}
	Ok(())
}

fn write_long(out: &mut Vec<u8>, n: i64) {
	let mut z = ((n << 1) ^ (n >> 63)) as u64;
	loop {
		let byte = (z & 0x7f) as u8;
		z >>= 7;
		if z == 0 {
			out.push(byte);
			break;
		}
		out.push(byte | 0x80);
	}
}

fn write_bytes(out: &mut Vec<u8>, bytes: &[u8]) {
	write_long(out, bytes.len() as i64);
	out.extend_from_slice(bytes);
}

struct Reader<'a> {
	buf: &'a [u8],
	pos: usize,
}

impl<'a> Reader<'a> {
	fn long(&mut self) -> Result<i64, CodecError> {
		let mut z: u64 = 0;
		let mut shift = 0;
		loop {
			let byte = *self
				.buf
				.get(self.pos)
				.ok_or(CodecError::Truncated("tag varint"))?;
			self.pos += 1;
			if shift >= 64 {
				return Err(CodecError::InvalidTags("varint too long".into()));
			}
			z |= u64::from(byte & 0x7f) << shift;
			if byte & 0x80 == 0 {
				break;
			}
			shift += 7;
		}
		Ok(((z >> 1) as i64) ^ -((z & 1) as i64))
	}

	fn bytes(&mut self) -> Result<&'a [u8], CodecError> {
		let len = self.long()?;
		let len = usize::try_from(len)
			.map_err(|_| CodecError::InvalidTags(format!("negative length {}", len)))?;
		let end = self
			.pos
			.checked_add(len)
			.filter(|end| *end <= self.buf.len())
			.ok_or(CodecError::Truncated("tag bytes"))?;
		let out = &self.buf[self.pos..end];
		self.pos = end;
		Ok(out)
	}
}
