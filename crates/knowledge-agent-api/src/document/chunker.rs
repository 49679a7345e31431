/// Splits normalized text into overlapping chunks, preferring natural
/// boundaries (paragraph, line, sentence, word) near the target size. All
/// sizes and offsets are in characters.
#[derive(Debug, Clone)]
pub struct ChunkOptions {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub min_chunk_size: usize,
}

impl Default for ChunkOptions {
    fn default() -> Self {
        Self {
            chunk_size: 1500,
            chunk_overlap: 200,
            min_chunk_size: 100,
        }
    }
}

/// A bounded span of the source text. Offsets cover the raw span the chunk
/// was cut from; `text` is the span with boundary whitespace trimmed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextChunk {
    pub index: usize,
    pub text: String,
    pub start_offset: usize,
    pub end_offset: usize,
}

/// How far ahead the cursor may move to land on a sentence/paragraph/line
/// start after the overlap step.
const SNAP_WINDOW: usize = 100;

pub fn chunk_text(text: &str, options: &ChunkOptions) -> Vec<TextChunk> {
    if text.trim().is_empty() {
        return Vec::new();
    }

    let chars: Vec<char> = text.chars().collect();
    let total = chars.len();

    if total < options.min_chunk_size {
        return vec![TextChunk {
            index: 0,
            text: text.trim().to_string(),
            start_offset: 0,
            end_offset: total,
        }];
    }

    // Break-point search window, and also the tail length below which the
    // remainder is absorbed into the current chunk instead of becoming a
    // fragment of its own.
    let window = (options.chunk_size as f64 * 0.3) as usize;

    let mut chunks = Vec::new();
    let mut cursor = 0usize;

    while cursor < total {
        let tentative_end = (cursor + options.chunk_size).min(total);
        let end = if tentative_end >= total || total - tentative_end <= window {
            total
        } else {
            find_break(&chars, cursor, tentative_end, window)
        };

        let trimmed: String = chars[cursor..end]
            .iter()
            .collect::<String>()
            .trim()
            .to_string();
        if trimmed.chars().count() >= options.min_chunk_size {
            chunks.push(TextChunk {
                index: chunks.len(),
                text: trimmed,
                start_offset: cursor,
                end_offset: end,
            });
        }

        if end >= total {
            break;
        }

        let stepped = end
            .saturating_sub(options.chunk_overlap)
            .max(cursor + 1);
        cursor = snap_to_boundary(&chars, stepped, total);
    }

    chunks
}

/// Find the best break position in `(cursor, tentative_end]`, searching the
/// trailing window and preferring, in order: paragraph break, line break,
/// sentence end followed by an uppercase letter, period+space, word
/// boundary. Falls back to a hard cut.
fn find_break(chars: &[char], cursor: usize, tentative_end: usize, window: usize) -> usize {
    let window_start = cursor.max(tentative_end.saturating_sub(window));

    for i in (window_start..tentative_end.saturating_sub(1)).rev() {
        if chars[i] == '\n' && chars[i + 1] == '\n' {
            return i + 2;
        }
    }

    for i in (window_start..tentative_end).rev() {
        if chars[i] == '\n' {
            return i + 1;
        }
    }

    for i in (window_start..tentative_end).rev() {
        if matches!(chars[i], '.' | '!' | '?') {
            let mut j = i + 1;
            while j < chars.len() && chars[j].is_whitespace() {
                j += 1;
            }
            if j > i + 1 && j <= tentative_end && j < chars.len() && chars[j].is_uppercase() {
                return j;
            }
        }
    }

    for i in (window_start..tentative_end.saturating_sub(1)).rev() {
        if chars[i] == '.' && chars[i + 1] == ' ' {
            return i + 2;
        }
    }

    for i in (window_start..tentative_end).rev() {
        if chars[i] == ' ' {
            return i + 1;
        }
    }

    tentative_end
}

/// Move forward at most `SNAP_WINDOW` characters to the nearest position
/// that starts a line or a sentence, when one exists.
fn snap_to_boundary(chars: &[char], from: usize, total: usize) -> usize {
    let limit = (from + SNAP_WINDOW).min(total);
    for j in from..limit {
        if j == 0 {
            continue;
        }
        if chars[j - 1] == '\n' {
            return j;
        }
        if j >= 2
            && chars[j].is_uppercase()
            && chars[j - 1].is_whitespace()
            && matches!(chars[j - 2], '.' | '!' | '?')
        {
            return j;
        }
    }
    from
}
