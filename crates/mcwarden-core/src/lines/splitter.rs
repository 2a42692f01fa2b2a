//! Incremental newline splitter.

/// Turns arbitrarily chunked output into complete lines.
///
/// The undelimited tail of the input is carried across calls to
/// [`feed`](Self::feed). It is kept as bytes so a multi-byte UTF-8 sequence
/// split across two chunks decodes correctly once the line completes.
#[derive(Debug, Default)]
pub struct LineSplitter {
    partial: Vec<u8>,
}

impl LineSplitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `chunk` and return every line it completed, in order.
    ///
    /// Delimiters are not included in the returned lines. Invalid UTF-8 is
    /// replaced rather than rejected.
    pub fn feed(&mut self, chunk: impl AsRef<[u8]>) -> Vec<String> {
        self.partial.extend_from_slice(chunk.as_ref());

        let Some(last_newline) = self.partial.iter().rposition(|&b| b == b'\n') else {
            return Vec::new();
        };

        let tail = self.partial.split_off(last_newline + 1);
        let complete = std::mem::replace(&mut self.partial, tail);

        complete[..last_newline]
            .split(|&b| b == b'\n')
            .map(|line| String::from_utf8_lossy(line).into_owned())
            .collect()
    }

    /// The buffered fragment that has not been terminated yet.
    pub fn pending(&self) -> &[u8] {
        &self.partial
    }

    /// Take the unterminated fragment, leaving the splitter empty.
    ///
    /// Used at end of stream; the fragment is never reported as a line.
    pub fn take_pending(&mut self) -> Option<String> {
        if self.partial.is_empty() {
            return None;
        }
        let rest = std::mem::take(&mut self.partial);
        Some(String::from_utf8_lossy(&rest).into_owned())
    }
}

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    const TEXT: &str = "[Server] starting\nsteve joined the game\n<steve> hi there\nalex left the game\n";

    fn feed_all(chunks: &[&[u8]]) -> Vec<String> {
        let mut splitter = LineSplitter::new();
        let mut lines = Vec::new();
        for chunk in chunks {
            lines.extend(splitter.feed(chunk));
        }
        assert!(!splitter.pending().contains(&b'\n'));
        lines
    }

    fn expected() -> Vec<String> {
        TEXT.lines().map(String::from).collect()
    }

    #[test]
    fn whole_text_in_one_chunk() {
        assert_eq!(feed_all(&[TEXT.as_bytes()]), expected());
    }

    #[test]
    fn every_two_way_split_yields_the_same_lines() {
        let bytes = TEXT.as_bytes();
        for at in 0..=bytes.len() {
            let (a, b) = bytes.split_at(at);
            assert_eq!(feed_all(&[a, b]), expected(), "split at {at}");
        }
    }

    #[test]
    fn byte_at_a_time() {
        let chunks: Vec<&[u8]> = TEXT.as_bytes().chunks(1).collect();
        assert_eq!(feed_all(&chunks), expected());
    }

    #[test]
    fn chunk_without_delimiter_is_buffered() {
        let mut splitter = LineSplitter::new();
        assert!(splitter.feed("partial").is_empty());
        assert_eq!(splitter.pending(), b"partial");
        assert_eq!(splitter.feed(" line\n"), vec!["partial line"]);
        assert!(splitter.pending().is_empty());
    }

    #[test]
    fn empty_segments_are_real_lines() {
        let mut splitter = LineSplitter::new();
        assert_eq!(splitter.feed("a\n\nb\n"), vec!["a", "", "b"]);
    }

    #[test]
    fn no_spurious_trailing_line() {
        let mut splitter = LineSplitter::new();
        assert_eq!(splitter.feed("a\nb"), vec!["a"]);
        assert_eq!(splitter.take_pending().as_deref(), Some("b"));
        assert_eq!(splitter.take_pending(), None);
    }

    #[test]
    fn multibyte_char_split_across_chunks() {
        let text = "caf\u{e9} ok\n";
        let bytes = text.as_bytes();
        // split inside the two-byte encoding of 'é'
        let (a, b) = bytes.split_at(4);
        assert_eq!(feed_all(&[a, b]), vec!["caf\u{e9} ok"]);
    }

    #[test]
    fn empty_chunk_is_a_noop() {
        let mut splitter = LineSplitter::new();
        assert!(splitter.feed("").is_empty());
        assert!(splitter.pending().is_empty());
    }
}
