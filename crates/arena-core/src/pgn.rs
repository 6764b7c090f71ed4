/// Minimal game-record model: ordered tag pairs plus long-form movetext.
/// Rendering is the only operation the core needs; richer PGN handling lives
/// outside.
#[derive(Clone, Debug, Default)]
pub struct PgnGame {
    pub tags: Vec<(String, String)>,
    pub moves: Vec<String>,
    pub result: String,
    pub termination_comment: String,
}

impl PgnGame {
    pub fn new() -> Self {
        Self { result: "*".to_string(), ..Self::default() }
    }

    /// Insert or update a tag, keeping first-seen order.
    pub fn set_tag(&mut self, key: &str, value: &str) {
        for (k, v) in &mut self.tags {
            if k == key {
                *v = value.to_string();
                return;
            }
        }
        self.tags.push((key.to_string(), value.to_string()));
    }

    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        for (key, value) in &self.tags {
            out.push_str(&format!("[{key} \"{value}\"]\n"));
        }
        out.push('\n');
        for (i, mv) in self.moves.iter().enumerate() {
            if i % 2 == 0 {
                out.push_str(&format!("{}. ", i / 2 + 1));
            }
            out.push_str(mv);
            out.push(' ');
        }
        if !self.termination_comment.is_empty() {
            out.push_str(&format!("{{{}}} ", self.termination_comment));
        }
        out.push_str(&self.result);
        out.push('\n');
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_tag_upserts_in_place() {
        let mut game = PgnGame::new();
        game.set_tag("Event", "test");
        game.set_tag("White", "a");
        game.set_tag("Event", "final");
        assert_eq!(game.tag("Event"), Some("final"));
        assert_eq!(game.tags[0].0, "Event");
    }

    #[test]
    fn render_numbers_move_pairs() {
        let mut game = PgnGame::new();
        game.set_tag("Event", "arena");
        game.moves = vec!["e2e4".into(), "e7e5".into(), "g1f3".into()];
        game.result = "1-0".to_string();
        let text = game.render();
        assert_eq!(text, "[Event \"arena\"]\n\n1. e2e4 e7e5 2. g1f3 1-0\n");
    }

    #[test]
    fn render_includes_termination_comment() {
        let mut game = PgnGame::new();
        game.moves = vec!["e2e4".into()];
        game.result = "1/2-1/2".to_string();
        game.termination_comment = "ScoreAdjudication: score draw".to_string();
        assert!(game.render().ends_with("1. e2e4 {ScoreAdjudication: score draw} 1/2-1/2\n"));
    }
}
