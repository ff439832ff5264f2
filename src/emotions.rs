//! Closed emotion vocabulary and the negative → positive translation.
//!
//! The model is told to answer with labels from this list only. Trail scores
//! exist for the positive half; a negative feeling is answered with the
//! positive one that counters it.

use once_cell::sync::Lazy;
use serde::{Serialize, Serializer};
use std::collections::HashMap;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PositiveEmotion {
    Joy,
    Freedom,
    Achievement,
    Comfort,
    Love,
    Gratitude,
    Interest,
    Fun,
    Hope,
    Pride,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NegativeEmotion {
    Loneliness,
    Depression,
    Anger,
    Anxiety,
    Sadness,
    Guilt,
    Jealousy,
    Fatigue,
    Disgust,
    Disappointment,
}

/// A recognized label from either half of the vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Emotion {
    Positive(PositiveEmotion),
    Negative(NegativeEmotion),
}

impl PositiveEmotion {
    pub const ALL: [PositiveEmotion; 10] = [
        PositiveEmotion::Joy,
        PositiveEmotion::Freedom,
        PositiveEmotion::Achievement,
        PositiveEmotion::Comfort,
        PositiveEmotion::Love,
        PositiveEmotion::Gratitude,
        PositiveEmotion::Interest,
        PositiveEmotion::Fun,
        PositiveEmotion::Hope,
        PositiveEmotion::Pride,
    ];

    /// Label as used in the model prompt and as the dataset column name.
    pub fn label(&self) -> &'static str {
        match self {
            PositiveEmotion::Joy => "기쁨",
            PositiveEmotion::Freedom => "자유로움",
            PositiveEmotion::Achievement => "성취감",
            PositiveEmotion::Comfort => "편안함",
            PositiveEmotion::Love => "사랑",
            PositiveEmotion::Gratitude => "감사",
            PositiveEmotion::Interest => "흥미",
            PositiveEmotion::Fun => "재미",
            PositiveEmotion::Hope => "희망",
            PositiveEmotion::Pride => "자부심",
        }
    }
}

impl NegativeEmotion {
    pub const ALL: [NegativeEmotion; 10] = [
        NegativeEmotion::Loneliness,
        NegativeEmotion::Depression,
        NegativeEmotion::Anger,
        NegativeEmotion::Anxiety,
        NegativeEmotion::Sadness,
        NegativeEmotion::Guilt,
        NegativeEmotion::Jealousy,
        NegativeEmotion::Fatigue,
        NegativeEmotion::Disgust,
        NegativeEmotion::Disappointment,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            NegativeEmotion::Loneliness => "외로움",
            NegativeEmotion::Depression => "우울감",
            NegativeEmotion::Anger => "분노",
            NegativeEmotion::Anxiety => "불안",
            NegativeEmotion::Sadness => "슬픔",
            NegativeEmotion::Guilt => "죄책감",
            NegativeEmotion::Jealousy => "질투",
            NegativeEmotion::Fatigue => "피로",
            NegativeEmotion::Disgust => "혐오",
            NegativeEmotion::Disappointment => "실망",
        }
    }

    /// The positive emotion recommended against this one.
    pub fn counterpart(&self) -> PositiveEmotion {
        match self {
            NegativeEmotion::Loneliness => PositiveEmotion::Love,
            NegativeEmotion::Depression => PositiveEmotion::Hope,
            NegativeEmotion::Anger => PositiveEmotion::Comfort,
            NegativeEmotion::Anxiety => PositiveEmotion::Pride,
            NegativeEmotion::Sadness => PositiveEmotion::Joy,
            NegativeEmotion::Guilt => PositiveEmotion::Pride,
            NegativeEmotion::Jealousy => PositiveEmotion::Gratitude,
            NegativeEmotion::Fatigue => PositiveEmotion::Interest,
            NegativeEmotion::Disgust => PositiveEmotion::Fun,
            NegativeEmotion::Disappointment => PositiveEmotion::Achievement,
        }
    }
}

impl Serialize for PositiveEmotion {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.label())
    }
}

static VOCABULARY: Lazy<HashMap<&'static str, Emotion>> = Lazy::new(|| {
    let positives = PositiveEmotion::ALL
        .iter()
        .map(|p| (p.label(), Emotion::Positive(*p)));
    let negatives = NegativeEmotion::ALL
        .iter()
        .map(|n| (n.label(), Emotion::Negative(*n)));
    positives.chain(negatives).collect()
});

impl Emotion {
    pub fn from_label(label: &str) -> Option<Emotion> {
        VOCABULARY.get(label.trim()).copied()
    }

    pub fn to_positive(&self) -> PositiveEmotion {
        match self {
            Emotion::Positive(p) => *p,
            Emotion::Negative(n) => n.counterpart(),
        }
    }
}

pub fn positive_labels() -> Vec<&'static str> {
    PositiveEmotion::ALL.iter().map(|p| p.label()).collect()
}

pub fn negative_labels() -> Vec<&'static str> {
    NegativeEmotion::ALL.iter().map(|n| n.label()).collect()
}

/// Split a comma-delimited label string such as `"기쁨, 감사"`.
pub fn parse_labels(joined: &str) -> Vec<&str> {
    joined
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect()
}

/// Translate labels into the positive emotions used for scoring.
///
/// Input order is kept and repeats are dropped, so two negatives sharing a
/// counterpart (불안, 죄책감 → 자부심) score that column once. Unknown labels
/// are skipped; an empty result means no recommendation is possible.
pub fn map_to_positive<I, S>(labels: I) -> Vec<PositiveEmotion>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut targets = Vec::new();
    for label in labels {
        let label = label.as_ref().trim();
        match Emotion::from_label(label) {
            Some(emotion) => {
                let positive = emotion.to_positive();
                if let Emotion::Negative(n) = emotion {
                    debug!("Mapped negative emotion '{}' -> '{}'", n.label(), positive.label());
                }
                if !targets.contains(&positive) {
                    targets.push(positive);
                }
            }
            None => debug!("Unknown emotion label '{}' ignored", label),
        }
    }
    targets
}
