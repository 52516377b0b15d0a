use sha2::{Digest, Sha384};

/// A node in a deep hash tree.
#[derive(Debug, Clone)]
pub enum DeepHashChunk<'a> {
	Blob(&'a [u8]),
	List(Vec<DeepHashChunk<'a>>),
}

/// Hashes a tree of byte strings into a single SHA-384 digest.
///
/// Blobs hash as `H(H("blob" || len) || H(bytes))`. Lists start from
/// `H("list" || len)` and fold every child in as `acc = H(acc || child)`.
/// Lengths are written as ASCII decimal.
pub fn deep_hash(chunk: &DeepHashChunk<'_>) -> [u8; 48] {
	match chunk {
		DeepHashChunk::Blob(data) => {
			let data: &[u8] = data;
			let tag = sha384(&[b"blob".as_slice(), data.len().to_string().as_bytes()]);
			let body = sha384(&[data]);
			sha384(&[&tag, &body])
		}
		DeepHashChunk::List(items) => {
			let tag = format!("list{}", items.len());
			items
				.iter()
				.fold(sha384(&[tag.as_bytes()]), |acc, item| {
					sha384(&[&acc, &deep_hash(item)])
				})
		}
	}
}

fn sha384(parts: &[&[u8]]) -> [u8; 48] {
	let mut hasher = Sha384::new();
	for part in parts {
		hasher.update(part);
	}
	hasher.finalize().into()
}
