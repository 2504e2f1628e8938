#![forbid(unsafe_code)]

use herald_domain::{AnnotationSource, Span, TextAnnotation};

use crate::EmoteDef;

/// Scan message text for occurrences of each definition's trigger code.
///
/// Spans are code-point indices: the scan runs over the collected `char`
/// sequence, so a multi-unit symbol occupies exactly one index position and
/// provider indices stay aligned with native ones. A trigger matches only
/// as a whole whitespace-delimited token; every occurrence yields one
/// candidate. Candidates come out in definition order, occurrences in
/// position order, so a priority-ordered definition list produces a
/// priority-ordered candidate list.
pub fn scan_triggers(text: &str, defs: &[EmoteDef]) -> Vec<TextAnnotation> {
	let chars: Vec<char> = text.chars().collect();
	let mut candidates = Vec::new();

	for def in defs {
		if def.code.is_empty() {
			continue;
		}

		let code: Vec<char> = def.code.chars().collect();
		let mut i = 0usize;

		while i + code.len() <= chars.len() {
			let bounded_left = i == 0 || chars[i - 1].is_whitespace();
			if bounded_left && chars[i..i + code.len()] == code[..] {
				let after = i + code.len();
				let bounded_right = after == chars.len() || chars[after].is_whitespace();

				if bounded_right {
					candidates.push(TextAnnotation {
						span: Span::new(i as u32, after as u32),
						source: AnnotationSource::External {
							provider: def.provider.as_str().to_string(),
							emote_id: def.id.clone(),
							code: def.code.clone(),
							image_url: def.image_url.clone(),
							animated: def.animated,
						},
					});
					i = after;
					continue;
				}
			}

			i += 1;
		}
	}

	candidates
}

/// Merge native ranges with external candidates into one conflict-free,
/// start-sorted set.
///
/// Native ranges are accepted first (trusted, non-overlapping by
/// construction at the origin protocol). Candidates are then considered in
/// the order given and rejected when they overlap anything already
/// accepted; zero-length and out-of-bounds candidate spans are dropped. A
/// message with no candidates yields an empty vector.
pub fn merge_annotations(
	native: Vec<TextAnnotation>,
	candidates: Vec<TextAnnotation>,
	text_len: u32,
) -> Vec<TextAnnotation> {
	let mut accepted = native;

	for candidate in candidates {
		if candidate.span.is_empty() || candidate.span.end > text_len {
			continue;
		}

		if accepted.iter().any(|a| a.span.overlaps(candidate.span)) {
			continue;
		}

		accepted.push(candidate);
	}

	accepted.sort_by_key(|a| a.span.start);
	accepted
}

/// Produce the final annotation set for one message: scan the provider
/// definitions for trigger occurrences, then merge them under the native
/// ranges.
pub fn generate_annotations(text: &str, defs: &[EmoteDef], native: Vec<TextAnnotation>) -> Vec<TextAnnotation> {
	let candidates = scan_triggers(text, defs);
	let text_len = text.chars().count() as u32;

	merge_annotations(native, candidates, text_len)
}
