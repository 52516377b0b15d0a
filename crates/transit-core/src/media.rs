//! Content type selection for `GET /tx/{id}/data`.

pub const OCTET_STREAM: &str = "application/octet-stream";

const SIGNATURES: &[(&[u8], &str)] = &[
	(b"\x89PNG\r\n\x1a\n", "image/png"),
	(b"\xff\xd8\xff", "image/jpeg"),
	(b"GIF87a", "image/gif"),
	(b"GIF89a", "image/gif"),
	(b"%PDF-", "application/pdf"),
	(b"PK\x03\x04", "application/zip"),
	(b"\x1f\x8b", "application/gzip"),
	(b"\0asm", "application/wasm"),
	(b"OggS", "audio/ogg"),
	(b"ID3", "audio/mpeg"),
	(b"\x1a\x45\xdf\xa3", "video/webm"),
];

/// Picks the response content type.
///
/// First usable value wins: the `mime-type` query parameter, the `accept`
/// header, the item's `Content-Type` tag, a sniff of the payload, and
/// finally `application/octet-stream`. Wildcards and malformed values are
/// skipped.
pub fn resolve(
	query: Option<&str>,
	accept: Option<&str>,
	tag: Option<&str>,
	payload: &[u8],
) -> String {
	query
		.and_then(usable)
		.or_else(|| accept.and_then(first_accepted).and_then(usable))
		.or_else(|| tag.and_then(usable))
		.map(str::to_string)
		.or_else(|| sniff(payload).map(str::to_string))
		.unwrap_or_else(|| OCTET_STREAM.to_string())
}

fn first_accepted(accept: &str) -> Option<&str> {
	accept.split(',').next().map(|entry| entry.split(';').next().unwrap_or(entry))
}

fn usable(value: &str) -> Option<&str> {
	let value = value.trim();
	let essence = value.split(';').next().unwrap_or(value).trim();
	let (kind, subtype) = essence.split_once('/')?;
	let token = |s: &str| {
		!s.is_empty()
			&& s.bytes()
				.all(|b| b.is_ascii_alphanumeric() || b"!#$&-^_.+".contains(&b))
	};
	(token(kind) && token(subtype)).then_some(value)
}

/// Guesses a content type from leading magic bytes.
pub fn sniff(payload: &[u8]) -> Option<&'static str> {
	if let Some((_, media)) = SIGNATURES.iter().find(|(magic, _)| payload.starts_with(magic)) {
		return Some(*media);
	}
	if payload.len() >= 12 && &payload[..4] == b"RIFF" && &payload[8..12] == b"WEBP" {
		return Some("image/webp");
	}
	if payload.len() >= 12 && &payload[4..8] == b"ftyp" {
		return Some("video/mp4");
	}
	sniff_text(payload)
}

fn sniff_text(payload: &[u8]) -> Option<&'static str> {
	let text = std::str::from_utf8(payload).ok()?;
	if text.is_empty()
		|| text
			.chars()
			.any(|c| c.is_control() && !matches!(c, '\n' | '\r' | '\t'))
	{
		return None;
	}
	let head = text.trim_start();
	let lower = head.get(..head.len().min(15)).unwrap_or(head).to_ascii_lowercase();
	if lower.starts_with("<!doctype html") || lower.starts_with("<html") {
		Some("text/html; charset=utf-8")
	} else if lower.starts_with("<svg") {
		Some("image/svg+xml")
	} else if (head.starts_with('{') || head.starts_with('['))
		&& serde_json::from_str::<serde_json::Value>(text).is_ok()
	{
		Some("application/json")
	} else {
		Some("text/plain; charset=utf-8")
	}
}
