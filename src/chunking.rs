pub const DEFAULT_CHUNK_SIZE: usize = 1000;
pub const DEFAULT_CHUNK_OVERLAP: usize = 200;

#[derive(Debug)]
pub struct Chunk {
    pub content: String,
    pub embedding: Option<Vec<f32>>,
}

impl Chunk {
    pub fn from_content(content: String) -> Self {
        Self {
            content,
            embedding: None,
        }
    }
}

/// Split `text` on newline boundaries and reassemble the pieces into windows
/// of at most `size` characters, with the tail of each window (up to
/// `overlap` characters worth of pieces) repeated at the start of the next
/// one. A single line longer than `size` becomes an oversized window of its
/// own. Document order is preserved.
pub fn chunk_text(text: &str, size: usize, overlap: usize) -> Vec<Chunk> {
    let pieces: Vec<&str> = text
        .split('\n')
        .map(|p| p.trim_end_matches('\r'))
        .filter(|p| !p.trim().is_empty())
        .collect();

    let mut windows: Vec<String> = vec![];
    let mut window: Vec<&str> = vec![];
    let mut window_len = 0usize;

    for piece in pieces {
        let piece_len = piece.chars().count();
        let sep = if window.is_empty() { 0 } else { 1 };
        if window_len + sep + piece_len > size && !window.is_empty() {
            windows.push(window.join("\n"));
            // carry the tail of the emitted window forward as overlap
            while window_len > overlap
                || (!window.is_empty() && window_len + 1 + piece_len > size)
            {
                let dropped = window.remove(0);
                window_len -= dropped.chars().count();
                if !window.is_empty() {
                    window_len -= 1;
                }
            }
        }
        if !window.is_empty() {
            window_len += 1;
        }
        window.push(piece);
        window_len += piece_len;
    }
    if !window.is_empty() {
        windows.push(window.join("\n"));
    }

    let chunks: Vec<Chunk> = windows.into_iter().map(Chunk::from_content).collect();
    println!("Created {:?} chunks", chunks.len());
    chunks
}

#[cfg(test)]
mod test {
    use super::*;

    fn lines(n: usize, line_len: usize) -> String {
        (0..n)
            .map(|i| format!("{i:04}").repeat(line_len / 4))
            .collect::<Vec<_>>()
            .join("\n")
    }

    #[test]
    fn test_empty_input_yields_no_chunks() {
        assert!(chunk_text("", 1000, 200).is_empty());
        assert!(chunk_text("\n\n\n", 1000, 200).is_empty());
    }

    #[test]
    fn test_short_input_is_a_single_chunk() {
        let chunks = chunk_text("hello\nworld", 1000, 200);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].content, "hello\nworld");
    }

    #[test]
    fn test_windows_respect_size_limit() {
        let text = lines(50, 100);
        let chunks = chunk_text(&text, 1000, 200);
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.content.chars().count() <= 1000);
        }
    }

    #[test]
    fn test_consecutive_windows_overlap() {
        let text = lines(50, 100);
        let chunks = chunk_text(&text, 1000, 200);
        for pair in chunks.windows(2) {
            let first_tail = pair[0].content.lines().last().unwrap();
            assert!(
                pair[1].content.lines().any(|l| l == first_tail),
                "tail of one window should reappear in the next"
            );
        }
    }

    #[test]
    fn test_document_order_is_preserved() {
        let text = lines(30, 100);
        let chunks = chunk_text(&text, 1000, 200);
        let firsts: Vec<i64> = chunks
            .iter()
            .map(|c| c.content.lines().next().unwrap()[..4].parse().unwrap())
            .collect();
        let mut sorted = firsts.clone();
        sorted.sort();
        assert_eq!(firsts, sorted);
    }

    #[test]
    fn test_oversized_line_becomes_its_own_window() {
        let long_line = "x".repeat(2500);
        let text = format!("short one\n{long_line}\nshort two");
        let chunks = chunk_text(&text, 1000, 200);
        assert!(chunks.iter().any(|c| c.content.len() >= 2500));
    }

    #[test]
    fn test_no_overlap_when_disabled() {
        let text = lines(50, 100);
        let chunks = chunk_text(&text, 1000, 0);
        let total: usize = chunks.iter().map(|c| c.content.lines().count()).sum();
        assert_eq!(total, 50);
    }
}
