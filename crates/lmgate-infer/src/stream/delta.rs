use tracing::warn;

/// Tracks the last cumulative snapshot and yields what each new one adds.
#[derive(Debug, Default)]
pub struct DeltaEncoder {
    previous: String,
}

impl DeltaEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the suffix of `current` beyond the previous snapshot, or `None`
    /// when nothing new was produced.
    pub fn push(&mut self, current: &str) -> Option<String> {
        let delta = if current.starts_with(self.previous.as_str()) {
            &current[self.previous.len()..]
        } else {
            // Engines only ever extend their output; a rewrite means the
            // concatenated deltas will no longer match the final text.
            warn!(
                previous_len = self.previous.len(),
                current_len = current.len(),
                "cumulative text does not extend the previous snapshot"
            );
            current.get(self.previous.len()..).unwrap_or_default()
        };

        if delta.is_empty() {
            self.previous.clear();
            self.previous.push_str(current);
            return None;
        }

        let delta = delta.to_string();
        self.previous.clear();
        self.previous.push_str(current);
        Some(delta)
    }

    pub fn text(&self) -> &str {
        &self.previous
    }

    pub fn into_text(self) -> String {
        self.previous
    }
}

#[cfg(test)]
mod tests {
    use super::DeltaEncoder;

    #[test]
    fn emits_suffixes_of_growing_text() {
        let mut enc = DeltaEncoder::new();
        assert_eq!(enc.push("Hi").as_deref(), Some("Hi"));
        assert_eq!(enc.push("Hi there").as_deref(), Some(" there"));
        assert_eq!(enc.text(), "Hi there");
    }

    #[test]
    fn repeated_or_empty_snapshots_emit_nothing() {
        let mut enc = DeltaEncoder::new();
        assert_eq!(enc.push(""), None);
        assert_eq!(enc.push("a"), Some("a".to_string()));
        assert_eq!(enc.push("a"), None);
    }

    #[test]
    fn concatenated_deltas_rebuild_the_text() {
        let snapshots = ["Le", "Le ch", "Le chat", "Le chat", "Le chat é", "Le chat était là"];
        let mut enc = DeltaEncoder::new();
        let joined: String = snapshots.iter().filter_map(|s| enc.push(s)).collect();
        assert_eq!(joined, "Le chat était là");
    }

    #[test]
    fn rewrite_off_a_char_boundary_does_not_panic() {
        let mut enc = DeltaEncoder::new();
        enc.push("ab");
        assert_eq!(enc.push("xé"), None);
        assert_eq!(enc.push("xyz!"), Some("!".to_string()));
        assert_eq!(enc.push("a"), None);
    }
}
