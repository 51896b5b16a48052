//! Inline `<think>` tag splitting.
//!
//! Local OpenAI-compatible servers (Ollama, LM Studio, llama.cpp) often
//! inline the model's reasoning into the text channel wrapped in
//! `<think>...</think>` tags. This incremental parser splits a delta stream
//! into text and thinking fragments, holding back only as many characters as
//! could be the start of a tag split across chunks.

const OPEN_THINK_TAG: &str = "<think>";
const CLOSE_THINK_TAG: &str = "</think>";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ThinkFragment {
    Text(String),
    Thinking(String),
}

#[derive(Debug, Default)]
pub struct ThinkTagParser {
    buffer: String,
    in_thinking_block: bool,
}

impl ThinkTagParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a delta, returning the fragments that are safe to emit.
    pub fn feed(&mut self, chunk: &str) -> Vec<ThinkFragment> {
        self.buffer.push_str(chunk);

        let mut fragments = Vec::new();
        loop {
            let boundary = if self.in_thinking_block {
                CLOSE_THINK_TAG
            } else {
                OPEN_THINK_TAG
            };

            if let Some(tag_index) = self.buffer.find(boundary) {
                self.emit(&self.buffer[..tag_index].to_string(), &mut fragments);
                self.buffer.drain(..tag_index + boundary.len());
                self.in_thinking_block = !self.in_thinking_block;
                continue;
            }

            // Hold back a suffix that could be the start of the boundary tag.
            let held = partial_tag_suffix_len(&self.buffer, boundary);
            let safe_len = self.buffer.len().saturating_sub(held);
            if safe_len > 0 {
                let safe: String = self.buffer.drain(..safe_len).collect();
                self.emit(&safe, &mut fragments);
            }
            break;
        }

        fragments
    }

    /// Emit whatever is still buffered at end of stream.
    pub fn flush(&mut self) -> Vec<ThinkFragment> {
        let mut fragments = Vec::new();
        let pending = std::mem::take(&mut self.buffer);
        self.emit(&pending, &mut fragments);
        self.in_thinking_block = false;
        fragments
    }

    fn emit(&self, text: &str, fragments: &mut Vec<ThinkFragment>) {
        if text.is_empty() {
            return;
        }
        let fragment = if self.in_thinking_block {
            ThinkFragment::Thinking(text.to_string())
        } else {
            ThinkFragment::Text(text.to_string())
        };
        fragments.push(fragment);
    }
}

/// Length of the longest buffer suffix that is a proper prefix of `tag`.
fn partial_tag_suffix_len(buffer: &str, tag: &str) -> usize {
    let max = tag.len().saturating_sub(1).min(buffer.len());
    for len in (1..=max).rev() {
        if buffer.is_char_boundary(buffer.len() - len) && tag.starts_with(&buffer[buffer.len() - len..])
        {
            return len;
        }
    }
    0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_passes_through() {
        let mut parser = ThinkTagParser::new();
        let fragments = parser.feed("hello world");
        assert_eq!(fragments, vec![ThinkFragment::Text("hello world".into())]);
    }

    #[test]
    fn whole_tag_in_one_chunk() {
        let mut parser = ThinkTagParser::new();
        let fragments = parser.feed("before<think>reasoning</think>after");
        assert_eq!(
            fragments,
            vec![
                ThinkFragment::Text("before".into()),
                ThinkFragment::Thinking("reasoning".into()),
                ThinkFragment::Text("after".into()),
            ]
        );
    }

    #[test]
    fn tag_split_across_chunks() {
        let mut parser = ThinkTagParser::new();
        let mut fragments = parser.feed("abc<th");
        fragments.extend(parser.feed("ink>deep"));
        fragments.extend(parser.feed(" thought</t"));
        fragments.extend(parser.feed("hink>done"));

        assert_eq!(
            fragments,
            vec![
                ThinkFragment::Text("abc".into()),
                ThinkFragment::Thinking("deep".into()),
                ThinkFragment::Thinking(" thought".into()),
                ThinkFragment::Text("done".into()),
            ]
        );
    }

    #[test]
    fn lone_angle_bracket_is_eventually_emitted() {
        let mut parser = ThinkTagParser::new();
        let mut fragments = parser.feed("a < b");
        fragments.extend(parser.feed(" and more"));
        fragments.extend(parser.flush());

        let text: String = fragments
            .iter()
            .map(|f| match f {
                ThinkFragment::Text(t) => t.as_str(),
                ThinkFragment::Thinking(_) => panic!("unexpected thinking fragment"),
            })
            .collect();
        assert_eq!(text, "a < b and more");
    }

    #[test]
    fn unterminated_thinking_flushes_as_thinking() {
        let mut parser = ThinkTagParser::new();
        let mut fragments = parser.feed("<think>never closed");
        fragments.extend(parser.flush());
        assert_eq!(
            fragments,
            vec![ThinkFragment::Thinking("never closed".into())]
        );
    }
}
