#![forbid(unsafe_code)]

use herald_domain::{AnnotationSource, Span, TextAnnotation};

/// Parse the protocol emote-tag syntax `id:start-end,start-end/id:start-end`
/// into native annotations.
///
/// Wire indices are inclusive of the final character; they are converted to
/// half-open `[start, end)` spans here so one span convention holds
/// everywhere downstream. Malformed fragments are skipped rather than
/// failing the whole tag.
pub fn parse_native_emote_tag(tag: &str) -> Vec<TextAnnotation> {
	let mut out = Vec::new();

	for group in tag.split('/') {
		let Some((emote_id, ranges)) = group.split_once(':') else {
			continue;
		};

		if emote_id.is_empty() {
			continue;
		}

		for range in ranges.split(',') {
			let Some((start, end)) = range.split_once('-') else {
				continue;
			};

			let (Ok(start), Ok(end)) = (start.trim().parse::<u32>(), end.trim().parse::<u32>()) else {
				continue;
			};

			if end < start {
				continue;
			}

			out.push(TextAnnotation {
				span: Span::new(start, end + 1),
				source: AnnotationSource::Native {
					emote_id: emote_id.to_string(),
				},
			});
		}
	}

	out
}
