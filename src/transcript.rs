/// Process-wide conversation transcript: an unbounded, append-only list of
/// alternating user and assistant turns, replayed in full on every
/// transcript-based completion call.
#[derive(Debug, Default)]
pub struct Transcript {
    turns: Vec<Turn>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Speaker {
    User,
    Assistant,
}

#[derive(Debug, Clone)]
pub struct Turn {
    pub speaker: Speaker,
    pub content: String,
}

impl Transcript {
    pub fn new() -> Self {
        Self { turns: vec![] }
    }

    pub fn push_user(&mut self, content: String) {
        self.turns.push(Turn {
            speaker: Speaker::User,
            content: content.trim().to_string(),
        });
    }

    pub fn push_assistant(&mut self, content: String) {
        self.turns.push(Turn {
            speaker: Speaker::Assistant,
            content,
        });
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// All turn contents joined with single spaces, the unit the token cost
    /// is computed over.
    pub fn joined(&self) -> String {
        self.turns
            .iter()
            .map(|t| t.content.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_turns_alternate_in_insertion_order() {
        let mut transcript = Transcript::new();
        transcript.push_user("first question".to_string());
        transcript.push_assistant("first answer".to_string());
        transcript.push_user("second question".to_string());
        assert_eq!(transcript.len(), 3);
        assert_eq!(transcript.turns()[0].speaker, Speaker::User);
        assert_eq!(transcript.turns()[1].speaker, Speaker::Assistant);
        assert_eq!(transcript.turns()[2].speaker, Speaker::User);
    }

    #[test]
    fn test_user_input_is_trimmed() {
        let mut transcript = Transcript::new();
        transcript.push_user("  padded question \n".to_string());
        assert_eq!(transcript.turns()[0].content, "padded question");
    }

    #[test]
    fn test_joined_concatenates_with_spaces() {
        let mut transcript = Transcript::new();
        transcript.push_user("hello".to_string());
        transcript.push_assistant("hi there".to_string());
        assert_eq!(transcript.joined(), "hello hi there");
    }

    #[test]
    fn test_empty_transcript() {
        let transcript = Transcript::new();
        assert!(transcript.is_empty());
        assert_eq!(transcript.joined(), "");
    }
}
