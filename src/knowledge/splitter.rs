//! Recursive character text splitter
//!
//! Splits on the coarsest separator present (paragraph, line, sentence, word,
//! character), recursing into pieces that are still too long, then greedily
//! merges neighbouring pieces up to `chunk_size` characters with
//! `chunk_overlap` characters carried over between consecutive chunks.

const SEPARATORS: [&str; 5] = ["\n\n", "\n", ". ", " ", ""];

#[derive(Debug, Clone, Copy)]
pub struct TextSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

impl TextSplitter {
    /// `chunk_overlap` is clamped below `chunk_size`
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        let chunk_size = chunk_size.max(1);
        Self {
            chunk_size,
            chunk_overlap: chunk_overlap.min(chunk_size - 1),
        }
    }

    pub fn split(&self, text: &str) -> Vec<String> {
        self.split_with(text, &SEPARATORS)
    }

    fn split_with(&self, text: &str, separators: &[&str]) -> Vec<String> {
        let mut separator = "";
        let mut remaining: &[&str] = &[];
        for (i, candidate) in separators.iter().enumerate() {
            if candidate.is_empty() {
                break;
            }
            if text.contains(candidate) {
                separator = candidate;
                remaining = &separators[i + 1..];
                break;
            }
        }

        let splits: Vec<String> = if separator.is_empty() {
            text.chars().map(String::from).collect()
        } else {
            text.split(separator)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect()
        };

        let mut chunks = Vec::new();
        let mut short_splits: Vec<String> = Vec::new();

        for piece in splits {
            if char_len(&piece) < self.chunk_size {
                short_splits.push(piece);
                continue;
            }

            if !short_splits.is_empty() {
                chunks.extend(self.merge(&short_splits, separator));
                short_splits.clear();
            }

            if remaining.is_empty() {
                chunks.push(piece);
            } else {
                chunks.extend(self.split_with(&piece, remaining));
            }
        }

        if !short_splits.is_empty() {
            chunks.extend(self.merge(&short_splits, separator));
        }

        chunks
    }

    fn merge(&self, splits: &[String], separator: &str) -> Vec<String> {
        let separator_len = char_len(separator);
        let mut chunks = Vec::new();
        let mut current: Vec<&str> = Vec::new();
        let mut total = 0usize;

        for split in splits {
            let len = char_len(split);
            let joiner = if current.is_empty() { 0 } else { separator_len };

            if total + len + joiner > self.chunk_size && !current.is_empty() {
                if let Some(chunk) = join(&current, separator) {
                    chunks.push(chunk);
                }

                // Drop from the front until only the overlap remains and the next piece fits
                while total > self.chunk_overlap
                    || (total > 0
                        && total + len + if current.is_empty() { 0 } else { separator_len }
                            > self.chunk_size)
                {
                    if current.is_empty() {
                        break;
                    }
                    let first_len = char_len(current[0]);
                    let first_joiner = if current.len() > 1 { separator_len } else { 0 };
                    total = total.saturating_sub(first_len + first_joiner);
                    current.remove(0);
                }
            }

            current.push(split);
            total += len + if current.len() > 1 { separator_len } else { 0 };
        }

        if let Some(chunk) = join(&current, separator) {
            chunks.push(chunk);
        }

        chunks
    }
}

fn join(pieces: &[&str], separator: &str) -> Option<String> {
    let text = pieces.join(separator);
    let text = text.trim();
    if text.is_empty() {
        None
    } else {
        Some(text.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_text_is_single_chunk() {
        let splitter = TextSplitter::new(100, 10);
        let chunks = splitter.split("Article 1. Taxes are paid on time.");
        assert_eq!(chunks, vec!["Article 1. Taxes are paid on time."]);
    }

    #[test]
    fn test_chunks_respect_size() {
        let splitter = TextSplitter::new(40, 10);
        let text = "The taxpayer must file the return. The deadline is the 25th. \
                    Late filing is fined. The fine is five percent per month.\n\n\
                    Second paragraph about property tax which is paid annually by owners.";

        let chunks = splitter.split(text);
        assert!(chunks.len() > 2);
        for chunk in &chunks {
            assert!(chunk.chars().count() <= 40, "chunk too long: {:?}", chunk);
        }
    }

    #[test]
    fn test_overlap_carries_words() {
        let splitter = TextSplitter::new(20, 8);
        let chunks = splitter.split("one two three four five six seven eight nine ten");

        assert!(chunks.len() >= 2);
        let first_last_word = chunks[0].split(' ').last().unwrap();
        assert!(chunks[1].starts_with(first_last_word));
    }

    #[test]
    fn test_long_word_falls_back_to_characters() {
        let splitter = TextSplitter::new(5, 0);
        let chunks = splitter.split("abcdefghijkl");
        assert_eq!(chunks, vec!["abcde", "fghij", "kl"]);
    }

    #[test]
    fn test_counts_characters_not_bytes() {
        let splitter = TextSplitter::new(10, 0);
        let chunks = splitter.split("Налог на добавленную стоимость");
        for chunk in &chunks {
            assert!(chunk.chars().count() <= 10);
        }
    }

    #[test]
    fn test_blank_text() {
        let splitter = TextSplitter::new(10, 2);
        assert!(splitter.split("   \n\n  ").is_empty());
    }
}
