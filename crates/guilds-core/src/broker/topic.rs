//! Topic routing-key pattern matching.
//!
//! AMQP topic semantics over dot-separated words: `*` matches exactly one
//! word, `#` matches zero or more words. The memory broker uses this to
//! honor topic-exchange bindings; real brokers match server-side.

/// Does the binding `pattern` match the concrete `routing_key`?
pub fn topic_matches(pattern: &str, routing_key: &str) -> bool {
    let pattern: Vec<&str> = pattern.split('.').collect();
    let key: Vec<&str> = routing_key.split('.').collect();
    matches_words(&pattern, &key)
}

fn matches_words(pattern: &[&str], key: &[&str]) -> bool {
    match pattern.split_first() {
        None => key.is_empty(),
        Some((&"#", rest)) => {
            // `#` absorbs zero or more words.
            (0..=key.len()).any(|taken| matches_words(rest, &key[taken..]))
        }
        Some((&"*", rest)) => !key.is_empty() && matches_words(rest, &key[1..]),
        Some((word, rest)) => {
            key.first() == Some(word) && matches_words(rest, &key[1..])
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
