//! Sentence composer for bots that riff on the wall's own conversation.

use super::traits::{FlavorError, FlavorSource};
use crate::scheduler::BotId;
use async_trait::async_trait;
use parking_lot::Mutex;
use rand::Rng;
use rand::rngs::StdRng;
use rand::seq::IndexedRandom;
use regex::Regex;

const COMMON_VERBS: &[&str] = &[
    "is", "are", "has", "have", "runs", "jumps", "says", "goes", "feels", "seems", "loves",
    "hates", "wants",
];

pub struct SentenceComposer {
    speaker: Regex,
    /// `Name:` for every known bot, matched anywhere in a line.
    mentions: Option<Regex>,
    object: Regex,
}

impl SentenceComposer {
    pub fn new(speakers: &[String]) -> anyhow::Result<Self> {
        let names: Vec<String> = speakers
            .iter()
            .filter(|name| !name.trim().is_empty())
            .map(|name| regex::escape(name.trim()))
            .collect();
        let mentions = if names.is_empty() {
            None
        } else {
            Some(Regex::new(&format!(r"\b(?:{}):", names.join("|")))?)
        };
        Ok(Self {
            speaker: Regex::new(r"^\s*[^\s:]+:\s*")?,
            mentions,
            object: Regex::new(r"^[A-Za-z]+$")?,
        })
    }

    fn strip_speakers(&self, line: &str) -> String {
        let line = self.speaker.replace(line, "");
        match &self.mentions {
            Some(mentions) => mentions.replace_all(&line, "").into_owned(),
            None => line.into_owned(),
        }
    }

    /// Build "Subject verb object." from words in `context`.
    ///
    /// Returns `None` when the context has no words at all.
    pub fn compose<R: Rng + ?Sized>(&self, context: &[String], rng: &mut R) -> Option<String> {
        let stripped: Vec<String> = context
            .iter()
            .map(|line| self.strip_speakers(line))
            .collect();
        let words: Vec<&str> = stripped.iter().flat_map(|l| l.split_whitespace()).collect();
        if words.is_empty() {
            return None;
        }

        let subjects: Vec<&str> = words
            .iter()
            .copied()
            .filter(|w| w.starts_with(|c: char| c.is_ascii_uppercase()))
            .collect();
        let verbs: Vec<&str> = words
            .iter()
            .copied()
            .filter(|w| COMMON_VERBS.contains(&w.to_ascii_lowercase().as_str()))
            .collect();
        let objects: Vec<&str> = words
            .iter()
            .copied()
            .filter(|w| self.object.is_match(w))
            .collect();

        let subject = subjects.choose(rng).copied().unwrap_or("Someone");
        let verb = verbs.choose(rng).copied().unwrap_or("seems");
        let object = objects.choose(rng).copied().unwrap_or("something");

        let mut sentence = capitalize(&format!("{subject} {verb} {object}"));
        if !sentence.ends_with(['.', '!', '?']) {
            sentence.push('.');
        }
        Some(sentence)
    }
}

fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Source that composes from the wall context; empty context is a failure.
pub struct ContextSource {
    composer: SentenceComposer,
    rng: Mutex<StdRng>,
}

impl ContextSource {
    pub fn new(speakers: &[String], rng: StdRng) -> anyhow::Result<Self> {
        Ok(Self {
            composer: SentenceComposer::new(speakers)?,
            rng: Mutex::new(rng),
        })
    }
}

#[async_trait]
impl FlavorSource for ContextSource {
    fn name(&self) -> &str {
        "context"
    }

    async fn fetch(&self, _bot: &BotId, context: &[String]) -> anyhow::Result<String> {
        let sentence = self.composer.compose(context, &mut *self.rng.lock());
        sentence.ok_or_else(|| FlavorError::Empty.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn compose(lines: &[&str]) -> Option<String> {
        let context: Vec<String> = lines.iter().map(|l| (*l).to_string()).collect();
        let mut rng = StdRng::seed_from_u64(2);
        SentenceComposer::new(&speakers())
            .unwrap()
            .compose(&context, &mut rng)
    }

    fn speakers() -> Vec<String> {
        ["Pi", "Moti", "Sol", "Math"].map(String::from).to_vec()
    }

    #[test]
    fn empty_context_composes_nothing() {
        assert!(compose(&[]).is_none());
        assert!(compose(&["User:   "]).is_none());
    }

    #[test]
    fn speaker_prefixes_are_not_subjects() {
        let sentence = compose(&["Pi: pizza is great", "User: pizza is great"]).unwrap();
        assert!(sentence.starts_with("Someone is "), "{sentence}");
    }

    #[test]
    fn quoted_bot_names_are_not_subjects() {
        let sentence = compose(&["User: pizza is what Moti: said and Sol: agreed"]).unwrap();
        assert!(sentence.starts_with("Someone is "), "{sentence}");

        // Plain mentions without a colon are still words.
        let sentence = compose(&["User: Moti is fun"]).unwrap();
        assert!(sentence.starts_with("Moti is "), "{sentence}");
    }

    #[test]
    fn picks_subject_verb_and_object_from_words() {
        let sentence = compose(&["User: Alice loves chess"]).unwrap();
        assert!(sentence.starts_with("Alice loves "), "{sentence}");
        assert!(sentence.ends_with('.'));
    }

    #[test]
    fn falls_back_to_defaults_and_capitalises() {
        let sentence = compose(&["User: 42 + 7 = 49"]).unwrap();
        assert_eq!(sentence, "Someone seems something.");
    }

    #[test]
    fn non_alphabetic_words_are_not_objects() {
        let sentence = compose(&["User: Wow!"]).unwrap();
        assert_eq!(sentence, "Wow! seems something.");
        assert_eq!(capitalize("éclair is tasty"), "Éclair is tasty");
    }

    #[tokio::test]
    async fn context_source_fails_on_empty_context() {
        let source = ContextSource::new(&speakers(), StdRng::seed_from_u64(1)).unwrap();
        assert!(source.fetch(&"Math".into(), &[]).await.is_err());
        let text = source
            .fetch(&"Math".into(), &["User: Bob has apples".into()])
            .await
            .unwrap();
        assert!(text.starts_with("Bob has "));
    }
}
