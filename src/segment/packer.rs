//! Greedy packing of text units into size-bounded chunks with overlap seeding

use super::{char_len, ChunkKind, Segment};

/// Split on blank lines; each paragraph is trimmed and non-empty
pub(crate) fn split_paragraphs(text: &str) -> Vec<String> {
    let mut paragraphs = Vec::new();
    let mut lines: Vec<&str> = Vec::new();

    for line in text.lines() {
        if line.trim().is_empty() {
            if !lines.is_empty() {
                paragraphs.push(lines.join("\n").trim().to_string());
                lines.clear();
            }
        } else {
            lines.push(line);
        }
    }
    if !lines.is_empty() {
        paragraphs.push(lines.join("\n").trim().to_string());
    }

    paragraphs.retain(|p| !p.is_empty());
    paragraphs
}

/// Split after `.`, `!` or `?` when followed by whitespace; punctuation stays with its sentence
pub(crate) fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();

    while let Some((idx, c)) = chars.next() {
        if matches!(c, '.' | '!' | '?') {
            if let Some(&(next_idx, next)) = chars.peek() {
                if next.is_whitespace() {
                    let sentence = text[start..next_idx].trim();
                    if !sentence.is_empty() {
                        sentences.push(sentence);
                    }
                    start = next_idx;
                }
            } else {
                let end = idx + c.len_utf8();
                let sentence = text[start..end].trim();
                if !sentence.is_empty() {
                    sentences.push(sentence);
                }
                start = end;
            }
        }
    }

    let rest = text[start..].trim();
    if !rest.is_empty() {
        sentences.push(rest);
    }
    sentences
}

/// Trailing window of at most `overlap` characters, starting at a sentence
/// boundary if the window contains one, else at a word boundary, else a raw cut.
pub(crate) fn overlap_tail(text: &str, overlap: usize) -> &str {
    if overlap == 0 {
        return "";
    }
    let total = char_len(text);
    if total <= overlap {
        return text.trim();
    }

    let start = text
        .char_indices()
        .nth(total - overlap)
        .map(|(i, _)| i)
        .unwrap_or(0);
    let before = &text[..start];
    let window = &text[start..];

    if before.ends_with(char::is_whitespace) {
        let prev = before.trim_end();
        if prev.ends_with(&['.', '!', '?'][..]) {
            return window.trim_start();
        }
    }

    let mut chars = window.char_indices().peekable();
    while let Some((_, c)) = chars.next() {
        if matches!(c, '.' | '!' | '?') {
            if let Some(&(next_idx, next)) = chars.peek() {
                if next.is_whitespace() {
                    let tail = window[next_idx..].trim_start();
                    if !tail.is_empty() {
                        return tail;
                    }
                }
            }
        }
    }

    if before.ends_with(char::is_whitespace) {
        return window.trim_start();
    }
    if let Some(pos) = window.find(char::is_whitespace) {
        let tail = window[pos..].trim_start();
        if !tail.is_empty() {
            return tail;
        }
    }

    window
}

/// Greedy accumulator. When a unit overflows, the current chunk is flushed and
/// its overlap tail seeds the next one (if tail plus unit still fits).
pub(crate) struct Packer<'a> {
    max: usize,
    overlap: usize,
    joiner: &'a str,
    current: String,
    current_len: usize,
    kind: ChunkKind,
    out: Vec<Segment>,
}

impl<'a> Packer<'a> {
    pub(crate) fn new(max: usize, overlap: usize, joiner: &'a str) -> Self {
        Self {
            max,
            overlap,
            joiner,
            current: String::new(),
            current_len: 0,
            kind: ChunkKind::Prose,
            out: Vec::new(),
        }
    }

    pub(crate) fn push(&mut self, unit: &str, kind: ChunkKind) {
        let limit = self.max;
        let unit_len = char_len(unit);
        let joiner_len = char_len(self.joiner);

        if self.current.is_empty() {
            self.start_with(unit.to_string(), unit_len, kind);
            return;
        }

        if self.current_len + joiner_len + unit_len <= limit {
            self.current.push_str(self.joiner);
            self.current.push_str(unit);
            self.current_len += joiner_len + unit_len;
            self.kind = self.kind.merge(kind);
            return;
        }

        let tail = overlap_tail(&self.current, self.overlap).to_string();
        let tail_len = char_len(&tail);
        self.flush();

        if !tail.is_empty() && tail_len + joiner_len + unit_len <= limit {
            let seeded = format!("{}{}{}", tail, self.joiner, unit);
            self.start_with(seeded, tail_len + joiner_len + unit_len, kind);
        } else {
            self.start_with(unit.to_string(), unit_len, kind);
        }
    }

    /// Emit a unit as a chunk of its own
    pub(crate) fn push_alone(&mut self, unit: &str, kind: ChunkKind) {
        self.flush();
        self.out.push(Segment {
            text: unit.to_string(),
            kind,
        });
    }

    /// Emit pre-split pieces; the last one stays open so following small units can join it
    pub(crate) fn push_pieces(&mut self, mut pieces: Vec<String>, kind: ChunkKind) {
        self.flush();
        let last = pieces.pop();
        self.out
            .extend(pieces.into_iter().map(|text| Segment { text, kind }));
        if let Some(last) = last {
            let len = char_len(&last);
            self.start_with(last, len, kind);
        }
    }

    pub(crate) fn flush(&mut self) {
        if !self.current.trim().is_empty() {
            self.out.push(Segment {
                text: std::mem::take(&mut self.current),
                kind: self.kind,
            });
        }
        self.current.clear();
        self.current_len = 0;
        self.kind = ChunkKind::Prose;
    }

    pub(crate) fn finish(mut self) -> Vec<Segment> {
        self.flush();
        self.out
    }

    fn start_with(&mut self, text: String, len: usize, kind: ChunkKind) {
        self.current = text;
        self.current_len = len;
        self.kind = kind;
    }
}

/// Split text that exceeds `max`: by sentence, degrading to a word packer for
/// oversized sentences and to raw character cuts for oversized words.
pub(crate) fn split_oversized(text: &str, max: usize, overlap: usize) -> Vec<String> {
    let mut packer = Packer::new(max, overlap, " ");
    for sentence in split_sentences(text) {
        if char_len(sentence) <= max {
            packer.push(sentence, ChunkKind::Prose);
        } else {
            packer.push_pieces(pack_words(sentence, max, overlap), ChunkKind::Prose);
        }
    }
    packer.finish().into_iter().map(|s| s.text).collect()
}

fn pack_words(text: &str, max: usize, overlap: usize) -> Vec<String> {
    let mut packer = Packer::new(max, overlap, " ");
    for word in text.split_whitespace() {
        if char_len(word) <= max {
            packer.push(word, ChunkKind::Prose);
        } else {
            packer.push_pieces(hard_cut(word, max), ChunkKind::Prose);
        }
    }
    packer.finish().into_iter().map(|s| s.text).collect()
}

fn hard_cut(word: &str, max: usize) -> Vec<String> {
    let chars: Vec<char> = word.chars().collect();
    chars
        .chunks(max.max(1))
        .map(|c| c.iter().collect())
        .collect()
}
