//! Splits long-form agent text into speakable chunks.
//!
//! Chunks end on sentence boundaries. A sentence longer than the chunk limit
//! is split at the last pause point (comma, colon, semicolon, dash) that fits,
//! falling back to word boundaries, and finally to a hard character split for
//! a single over-long word.

/// Sentence-boundary chunker with word-boundary fallback.
#[derive(Debug, Clone)]
pub struct TextChunker {
    max_chars: usize,
}

impl Default for TextChunker {
    fn default() -> Self {
        Self::new(250)
    }
}

impl TextChunker {
    pub fn new(max_chars: usize) -> Self {
        Self {
            max_chars: max_chars.max(1),
        }
    }

    pub fn max_chars(&self) -> usize {
        self.max_chars
    }

    /// Split text into ordered chunks. Whitespace-only input yields no chunks.
    pub fn split(&self, text: &str) -> Vec<String> {
        let mut chunks = Vec::new();
        for sentence in split_sentences(text) {
            if char_len(&sentence) <= self.max_chars {
                chunks.push(sentence);
            } else {
                self.split_long(&sentence, &mut chunks);
            }
        }
        chunks
    }

    fn split_long(&self, sentence: &str, chunks: &mut Vec<String>) {
        let mut current: Vec<&str> = Vec::new();
        let mut current_len = 0;
        // Index into `current` just after the last pause-point word
        let mut last_pause: Option<usize> = None;

        for word in sentence.split_whitespace() {
            let word_len = char_len(word);

            if word_len > self.max_chars {
                if !current.is_empty() {
                    chunks.push(current.join(" "));
                    current.clear();
                    current_len = 0;
                    last_pause = None;
                }
                hard_split(word, self.max_chars, chunks);
                continue;
            }

            let added = if current.is_empty() { word_len } else { word_len + 1 };
            if current_len + added > self.max_chars {
                // Prefer breaking at the last pause point
                let split_at = match last_pause {
                    Some(i) if i < current.len() => i,
                    _ => current.len(),
                };
                let rest: Vec<&str> = current.split_off(split_at);
                chunks.push(current.join(" "));
                current = rest;
                current_len = joined_len(&current);

                if !current.is_empty() && current_len + 1 + word_len > self.max_chars {
                    chunks.push(current.join(" "));
                    current.clear();
                    current_len = 0;
                }
                last_pause = current
                    .iter()
                    .rposition(|w| is_pause_point(w))
                    .map(|i| i + 1);
            }

            current_len += if current.is_empty() { word_len } else { word_len + 1 };
            current.push(word);
            if is_pause_point(word) {
                last_pause = Some(current.len());
            }
        }

        if !current.is_empty() {
            chunks.push(current.join(" "));
        }
    }
}

/// Split into trimmed sentences, keeping terminal punctuation.
fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut current = String::new();
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        current.push(c);
        let boundary = is_sentence_terminal(c)
            && chars
                .peek()
                .is_none_or(|next| next.is_whitespace() || is_closing(*next));
        if boundary {
            // Absorb closing quotes/brackets
            while let Some(&next) = chars.peek() {
                if is_closing(next) {
                    current.push(next);
                    chars.next();
                } else {
                    break;
                }
            }
            push_trimmed(&mut sentences, &mut current);
        }
    }
    push_trimmed(&mut sentences, &mut current);
    sentences
}

fn push_trimmed(sentences: &mut Vec<String>, current: &mut String) {
    let normalized = current.split_whitespace().collect::<Vec<_>>().join(" ");
    if !normalized.is_empty() {
        sentences.push(normalized);
    }
    current.clear();
}

fn hard_split(word: &str, max_chars: usize, chunks: &mut Vec<String>) {
    let chars: Vec<char> = word.chars().collect();
    for piece in chars.chunks(max_chars) {
        chunks.push(piece.iter().collect());
    }
}

fn is_sentence_terminal(c: char) -> bool {
    matches!(c, '.' | '!' | '?' | '。' | '！' | '？')
}

fn is_closing(c: char) -> bool {
    matches!(c, '"' | '\'' | ')' | ']' | '”' | '’')
}

fn is_pause_point(word: &str) -> bool {
    word.ends_with(',')
        || word.ends_with(';')
        || word.ends_with(':')
        || word.ends_with('-')
        || word.ends_with('—')
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

fn joined_len(words: &[&str]) -> usize {
    if words.is_empty() {
        return 0;
    }
    words.iter().map(|w| char_len(w)).sum::<usize>() + words.len() - 1
}
