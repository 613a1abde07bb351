/// Maximum number of characters sent to the completion endpoint per request.
pub const MAX_BLOCK_CHARS: usize = 3000;

/// Split file content into left-to-right, non-overlapping blocks of at most
/// [`MAX_BLOCK_CHARS`] characters. The last block may be shorter. Empty input
/// yields no blocks; empty files are never sent to the endpoint.
///
/// Blocks are counted in characters, not bytes, so multi-byte content is
/// never split inside a code point. Concatenating the returned slices in
/// order reproduces the input exactly.
pub fn blocks(content: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut rest = content;

    while !rest.is_empty() {
        let split_at = rest
            .char_indices()
            .nth(MAX_BLOCK_CHARS)
            .map(|(idx, _)| idx)
            .unwrap_or(rest.len());
        let (block, tail) = rest.split_at(split_at);
        out.push(block);
        rest = tail;
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_concatenation_reproduces_input() {
        let content: String = (0..7345).map(|i| ((i % 26) as u8 + b'a') as char).collect();
        let joined: String = blocks(&content).concat();
        assert_eq!(joined, content);
    }

    #[test]
    fn test_exact_limit_is_one_block() {
        let content = "x".repeat(MAX_BLOCK_CHARS);
        let split = blocks(&content);
        assert_eq!(split.len(), 1);
        assert_eq!(split[0].len(), MAX_BLOCK_CHARS);
    }

    #[test]
    fn test_one_past_limit_is_two_blocks() {
        let content = "x".repeat(MAX_BLOCK_CHARS + 1);
        let split = blocks(&content);
        assert_eq!(split.len(), 2);
        assert_eq!(split[0].len(), MAX_BLOCK_CHARS);
        assert_eq!(split[1].len(), 1);
    }

    #[test]
    fn test_empty_input_yields_no_blocks() {
        assert!(blocks("").is_empty());
    }

    #[test]
    fn test_multibyte_content_splits_on_char_boundaries() {
        let content = "é".repeat(MAX_BLOCK_CHARS + 10);
        let split = blocks(&content);
        assert_eq!(split.len(), 2);
        assert_eq!(split[0].chars().count(), MAX_BLOCK_CHARS);
        assert_eq!(split[1].chars().count(), 10);
        assert_eq!(split.concat(), content);
    }
}
