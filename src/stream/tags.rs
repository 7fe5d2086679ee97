//! Incremental splitter for inline reasoning spans.
//!
//! Some agents inline their reasoning in plain assistant text between a pair
//! of markers (`<think>` / `</think>` by default). Markers can straddle chunk
//! boundaries, so the tail of the buffer that could still grow into a marker
//! is held back until the next chunk (or [`TagSplitter::finish`]) decides it.

use tracing::warn;

const DEFAULT_OPEN: &str = "<think>";
const DEFAULT_CLOSE: &str = "</think>";

/// One piece of re-emitted text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TagSegment {
    Text(String),
    ReasoningStart,
    Reasoning(String),
    ReasoningEnd,
}

#[derive(Debug, Clone)]
pub struct TagSplitter {
    open: String,
    close: String,
    buffer: String,
    in_reasoning: bool,
}

impl Default for TagSplitter {
    fn default() -> Self {
        Self::new(DEFAULT_OPEN, DEFAULT_CLOSE)
    }
}

impl TagSplitter {
    /// An empty marker would match everywhere, so it is replaced by the default.
    pub fn new(open: impl Into<String>, close: impl Into<String>) -> Self {
        Self {
            open: non_empty_marker(open.into(), DEFAULT_OPEN),
            close: non_empty_marker(close.into(), DEFAULT_CLOSE),
            buffer: String::new(),
            in_reasoning: false,
        }
    }

    /// Drop any held-back text and leave the reasoning span.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.in_reasoning = false;
    }

    pub fn in_reasoning(&self) -> bool {
        self.in_reasoning
    }

    /// Feed one chunk and return every segment that is now certain.
    pub fn parse(&mut self, chunk: &str) -> Vec<TagSegment> {
        self.buffer.push_str(chunk);
        let mut out = Vec::new();

        loop {
            let marker = if self.in_reasoning {
                self.close.as_str()
            } else {
                self.open.as_str()
            };

            if let Some(pos) = self.buffer.find(marker) {
                let consumed = pos + marker.len();
                let before = self.buffer[..pos].to_string();
                self.push_content(&mut out, before);
                out.push(if self.in_reasoning {
                    TagSegment::ReasoningEnd
                } else {
                    TagSegment::ReasoningStart
                });
                self.in_reasoning = !self.in_reasoning;
                self.buffer.drain(..consumed);
                continue;
            }

            let held = partial_marker_len(&self.buffer, marker);
            let emit_end = self.buffer.len() - held;
            let ready: String = self.buffer.drain(..emit_end).collect();
            self.push_content(&mut out, ready);
            return out;
        }
    }

    /// Flush held-back text and close an unterminated reasoning span.
    pub fn finish(&mut self) -> Vec<TagSegment> {
        let mut out = Vec::new();
        let rest = std::mem::take(&mut self.buffer);
        self.push_content(&mut out, rest);
        if self.in_reasoning {
            out.push(TagSegment::ReasoningEnd);
            self.in_reasoning = false;
        }
        out
    }

    fn push_content(&self, out: &mut Vec<TagSegment>, content: String) {
        if content.is_empty() {
            return;
        }
        out.push(if self.in_reasoning {
            TagSegment::Reasoning(content)
        } else {
            TagSegment::Text(content)
        });
    }
}

/// Length of the longest buffer suffix that is a strict prefix of `marker`.
fn partial_marker_len(buffer: &str, marker: &str) -> usize {
    let max = marker.len().saturating_sub(1).min(buffer.len());
    (1..=max)
        .rev()
        .find(|&len| {
            let start = buffer.len() - len;
            buffer.is_char_boundary(start) && marker.starts_with(&buffer[start..])
        })
        .unwrap_or(0)
}

fn non_empty_marker(marker: String, fallback: &str) -> String {
    if marker.is_empty() {
        warn!(fallback, "empty reasoning marker, using default");
        fallback.to_string()
    } else {
        marker
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(chunks: &[&str]) -> Vec<TagSegment> {
        let mut splitter = TagSplitter::default();
        let mut out = Vec::new();
        for chunk in chunks {
            out.extend(splitter.parse(chunk));
        }
        out.extend(splitter.finish());
        out
    }

    #[test]
    fn empty_markers_fall_back_to_defaults() {
        let mut splitter = TagSplitter::new("", "");
        let mut out = splitter.parse("a<think>b</think>c");
        out.extend(splitter.finish());
        assert_eq!(
            out,
            vec![
                TagSegment::Text("a".into()),
                TagSegment::ReasoningStart,
                TagSegment::Reasoning("b".into()),
                TagSegment::ReasoningEnd,
                TagSegment::Text("c".into()),
            ]
        );
    }

    #[test]
    fn marker_split_across_chunks_is_reassembled() {
        let mut splitter = TagSplitter::default();
        assert!(splitter.parse("<thi").is_empty());
        assert_eq!(
            splitter.parse("nk>hello</think> world"),
            vec![
                TagSegment::ReasoningStart,
                TagSegment::Reasoning("hello".into()),
                TagSegment::ReasoningEnd,
                TagSegment::Text(" world".into()),
            ]
        );
    }

    #[test]
    fn plain_text_passes_through() {
        assert_eq!(
            feed(&["hello ", "world"]),
            vec![
                TagSegment::Text("hello ".into()),
                TagSegment::Text("world".into())
            ]
        );
    }

    #[test]
    fn partial_close_marker_is_held_back() {
        let mut splitter = TagSplitter::default();
        let first = splitter.parse("<think>abc</th");
        assert_eq!(
            first,
            vec![
                TagSegment::ReasoningStart,
                TagSegment::Reasoning("abc".into())
            ]
        );
        assert_eq!(
            splitter.parse("ink>done"),
            vec![TagSegment::ReasoningEnd, TagSegment::Text("done".into())]
        );
    }

    #[test]
    fn false_partial_marker_is_released_as_text() {
        let mut splitter = TagSplitter::default();
        assert_eq!(splitter.parse("a <"), vec![TagSegment::Text("a ".into())]);
        assert_eq!(splitter.parse("b"), vec![TagSegment::Text("<b".into())]);
    }

    #[test]
    fn finish_flushes_held_tail_and_closes_span() {
        let mut splitter = TagSplitter::default();
        splitter.parse("<think>still thinking <");
        assert_eq!(
            splitter.finish(),
            vec![TagSegment::Reasoning("<".into()), TagSegment::ReasoningEnd]
        );
        assert!(!splitter.in_reasoning());
    }

    #[test]
    fn multibyte_text_near_marker_is_safe() {
        let out = feed(&["héllo <thi", "nk>ü</think>🙂"]);
        assert_eq!(
            out,
            vec![
                TagSegment::Text("héllo ".into()),
                TagSegment::ReasoningStart,
                TagSegment::Reasoning("ü".into()),
                TagSegment::ReasoningEnd,
                TagSegment::Text("🙂".into()),
            ]
        );
    }

    #[test]
    fn custom_markers() {
        let mut splitter = TagSplitter::new("[[r]]", "[[/r]]");
        let out = splitter.parse("x[[r]]y[[/r]]z");
        assert_eq!(
            out,
            vec![
                TagSegment::Text("x".into()),
                TagSegment::ReasoningStart,
                TagSegment::Reasoning("y".into()),
                TagSegment::ReasoningEnd,
                TagSegment::Text("z".into()),
            ]
        );
    }

    #[cfg(feature = "fuzz-tests")]
    mod prop_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn any_chunking_reassembles_inside_and_outside(
                before in "[a-z <>/]{0,12}",
                inside in "[a-z <>/]{0,12}",
                after in "[a-z <>/]{0,12}",
                cuts in proptest::collection::vec(0usize..64, 0..6)
            ) {
                prop_assume!(!before.contains("<think>"));
                prop_assume!(!inside.contains("</think>"));
                let full = format!("{before}<think>{inside}</think>{after}");
                // The first occurrence of the open marker must be ours.
                prop_assume!(full.find("<think>") == Some(before.len()));
                // After the close marker, `after` must not open a new span.
                prop_assume!(!after.contains("<think>"));

                let mut points: Vec<usize> = cuts.into_iter().map(|c| c % (full.len() + 1)).collect();
                points.sort_unstable();
                points.dedup();
                let mut chunks = Vec::new();
                let mut last = 0;
                for p in points {
                    chunks.push(&full[last..p]);
                    last = p;
                }
                chunks.push(&full[last..]);

                let mut splitter = TagSplitter::default();
                let mut segments = Vec::new();
                for chunk in chunks {
                    segments.extend(splitter.parse(chunk));
                }
                segments.extend(splitter.finish());

                let mut text = String::new();
                let mut reasoning = String::new();
                for segment in segments {
                    match segment {
                        TagSegment::Text(t) => text.push_str(&t),
                        TagSegment::Reasoning(r) => reasoning.push_str(&r),
                        _ => {}
                    }
                }
                prop_assert_eq!(reasoning, inside);
                prop_assert_eq!(text, format!("{before}{after}"));
            }
        }
    }
}
