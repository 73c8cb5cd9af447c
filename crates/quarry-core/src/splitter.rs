//! Paragraph-preserving sliding-window splitter.
//!
//! Used by the indexing pipeline to cut extracted pages into chunks and
//! by the embedding service to cut over-limit inputs before averaging.
//! Paragraphs are accumulated until the target size would be exceeded;
//! the emitted chunk's trailing `overlap` characters are carried into the
//! next chunk so context survives the boundary.

#[derive(Debug, Clone)]
pub struct SplitterConfig {
    /// Soft upper bound on chunk size, in characters.
    pub target_size: usize,
    /// Suffix of each emitted chunk carried into the next one.
    pub overlap: usize,
    /// Fragments shorter than this fold into the previous chunk.
    pub min_chunk_len: usize,
}

impl Default for SplitterConfig {
    fn default() -> Self {
        Self { target_size: 1000, overlap: 200, min_chunk_len: 50 }
    }
}

impl SplitterConfig {
    pub fn new(target_size: usize, overlap: usize) -> Self {
        Self { target_size, overlap, ..Self::default() }
    }
}

/// Split `text` into overlapping, paragraph-aware chunks.
///
/// Never returns empty strings; whitespace-only input yields no chunks.
pub fn split_text(text: &str, cfg: &SplitterConfig) -> Vec<String> {
    let target = cfg.target_size.max(1);
    // An overlap at or above the target would never make progress.
    let overlap = cfg.overlap.min(target / 2);

    let units: Vec<String> = text
        .split("\n\n")
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .flat_map(|p| {
            if p.chars().count() <= target {
                vec![p.to_string()]
            } else {
                hard_split(p, target, overlap)
            }
        })
        .collect();

    let mut chunks: Vec<String> = Vec::new();
    let mut current = String::new();
    for unit in units {
        let unit_len = unit.chars().count();
        if !current.is_empty() && current.chars().count() + unit_len + 2 > target {
            let carry = char_suffix(&current, overlap);
            chunks.push(std::mem::take(&mut current));
            current = carry;
        }
        if !current.is_empty() {
            current.push_str("\n\n");
        }
        current.push_str(&unit);
    }

    if !current.is_empty() {
        if current.chars().count() < cfg.min_chunk_len {
            if let Some(last) = chunks.last_mut() {
                last.push_str("\n\n");
                last.push_str(&current);
            } else {
                chunks.push(current);
            }
        } else {
            chunks.push(current);
        }
    }
    chunks
}

/// Fixed windows of `target` characters with `overlap` carry, for a
/// single paragraph that exceeds the target on its own.
fn hard_split(paragraph: &str, target: usize, overlap: usize) -> Vec<String> {
    let chars: Vec<char> = paragraph.chars().collect();
    let mut out = Vec::new();
    let mut start = 0usize;
    loop {
        let end = (start + target).min(chars.len());
        out.push(chars[start..end].iter().collect());
        if end >= chars.len() {
            break;
        }
        start = end - overlap;
    }
    out
}

/// Last `n` characters of `s`, on a char boundary.
fn char_suffix(s: &str, n: usize) -> String {
    let chars: Vec<char> = s.chars().collect();
    let start = chars.len().saturating_sub(n);
    chars[start..].iter().collect()
}
