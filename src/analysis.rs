//! Emotion analysis results and tolerant parsing of model replies.
//!
//! The model is asked for a bare JSON object but does not always comply:
//! replies arrive wrapped in Markdown fences, with chatter around the
//! object, or in the older `emotion` shape. Everything is folded into a
//! single [`AnalysisResult`] here, once, before the rest of the pipeline
//! looks at it.

use crate::emotions::{negative_labels, positive_labels};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;
use thiserror::Error;
use utoipa::ToSchema;

/// At most this many emotions are kept from a reply.
pub const MAX_EMOTIONS: usize = 2;

/// Instruction sent with every request, fixed for the life of the process.
pub static SYSTEM_INSTRUCTION: Lazy<String> = Lazy::new(|| {
    format!(
        r#"너는 공감 능력이 뛰어난 심리 분석가이자, 상대의 감정을 음악으로 어루만지는 큐레이터야. 사용자가 쓴 글에서 지금의 감정 상태를 읽어내고 아래 지침대로 답해줘.

[지침]
1. 글을 깊이 읽고 사용자가 느끼는 핵심 감정을 정확히 1~2개 골라.
2. 감정은 반드시 아래 20개 중에서만 골라야 해:
   - 긍정 감정: {positive}
   - 부정 감정: {negative}
3. 고른 감정을 바탕으로 사용자를 따뜻하게 위로하고 격려하는 '공감의 한마디'를 써.
4. 감정과 글의 분위기에 어울리는 음악 3곡을 추천해.
5. 곡마다 추천 이유를 1~2문장으로 짧게 설명해.
6. 결과는 반드시 아래 JSON 형식으로만 출력하고 다른 설명은 붙이지 마.

[JSON 출력 형식]
{{
  "emotions": ["감정1", "감정2"],
  "keywords": ["글에서 뽑은 주요 키워드 1", "키워드 2"],
  "comfort_message": "사용자를 위로하고 격려하는 공감의 한마디",
  "recommendations": [
    {{"artist": "가수명", "title": "노래 제목", "reason": "추천 이유"}},
    {{"artist": "가수명", "title": "노래 제목", "reason": "추천 이유"}},
    {{"artist": "가수명", "title": "노래 제목", "reason": "추천 이유"}}
  ]
}}"#,
        positive = positive_labels().join(", "),
        negative = negative_labels().join(", "),
    )
});

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("GEMINI_API_KEY is not configured; set it in backend/.env or the root .env")]
    ConfigurationMissing,
    #[error("model response exceeded {:.1} seconds", .limit.as_secs_f64())]
    Timeout { limit: Duration },
    #[error("{0}")]
    CallFailed(String),
    #[error("model returned an empty result")]
    EmptyResult,
}

impl AnalysisError {
    /// Stable short code surfaced to clients.
    pub fn code(&self) -> &'static str {
        match self {
            AnalysisError::ConfigurationMissing => "configuration_missing",
            AnalysisError::Timeout { .. } => "gemini_timeout",
            AnalysisError::CallFailed(_) => "gemini_call_failed",
            AnalysisError::EmptyResult => "empty_result",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct MusicRecommendation {
    #[serde(default)]
    pub artist: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, ToSchema)]
pub struct AnalysisResult {
    /// `emotions` joined with `", "`, kept for older clients.
    pub emotion: Option<String>,
    pub emotions: Vec<String>,
    pub keywords: Vec<String>,
    pub comfort_message: Option<String>,
    pub recommendations: Vec<MusicRecommendation>,
}

impl AnalysisResult {
    pub fn is_empty(&self) -> bool {
        self.emotion.is_none()
            && self.emotions.is_empty()
            && self.keywords.is_empty()
            && self.comfort_message.as_deref().map_or(true, str::is_empty)
            && self.recommendations.is_empty()
    }
}

/// Either shape an emotion field has been seen in. Anything else fails to
/// deserialize and is read as no emotions.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum EmotionField {
    Many(Vec<Value>),
    Joined(String),
}

impl EmotionField {
    fn labels(self) -> Vec<String> {
        let raw: Vec<String> = match self {
            EmotionField::Many(items) => items
                .into_iter()
                .map(|v| match v {
                    Value::String(s) => s,
                    other => other.to_string(),
                })
                .collect(),
            EmotionField::Joined(s) => s.split(',').map(str::to_string).collect(),
        };
        raw.into_iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    }
}

fn emotion_field(obj: &Map<String, Value>, key: &str) -> Vec<String> {
    obj.get(key)
        .cloned()
        .and_then(|v| serde_json::from_value::<EmotionField>(v).ok())
        .map(EmotionField::labels)
        .unwrap_or_default()
}

/// Extract the JSON object from a raw model reply.
///
/// Strips a Markdown fence and anything outside the outermost braces.
/// Unparseable text yields an empty object.
pub fn parse_json_response(text: &str) -> Value {
    let empty = Value::Object(Map::new());
    let mut cleaned = text.trim();
    if cleaned.is_empty() {
        return empty;
    }

    if cleaned.starts_with("```") {
        cleaned = cleaned.trim_matches('`');
        if cleaned
            .get(..4)
            .map_or(false, |tag| tag.eq_ignore_ascii_case("json"))
        {
            cleaned = cleaned[4..].trim();
        }
    }

    if let (Some(first), Some(last)) = (cleaned.find('{'), cleaned.rfind('}')) {
        if last > first {
            cleaned = &cleaned[first..=last];
        }
    }

    match serde_json::from_str::<Value>(cleaned) {
        Ok(v @ Value::Object(_)) => v,
        _ => empty,
    }
}

/// Fold a parsed reply into the canonical result.
///
/// `emotions` wins when it has labels; otherwise the legacy `emotion`
/// field is read, as a list or a comma-separated string.
pub fn normalize(parsed: &Value) -> AnalysisResult {
    let obj = match parsed.as_object() {
        Some(obj) => obj,
        None => return AnalysisResult::default(),
    };

    let mut emotions = emotion_field(obj, "emotions");
    if emotions.is_empty() {
        emotions = emotion_field(obj, "emotion");
    }
    emotions.truncate(MAX_EMOTIONS);

    let keywords = obj
        .get("keywords")
        .and_then(Value::as_array)
        .map(|arr| {
            arr.iter()
                .filter_map(|v| v.as_str().map(String::from))
                .collect()
        })
        .unwrap_or_default();

    let comfort_message = obj
        .get("comfort_message")
        .and_then(Value::as_str)
        .map(String::from);

    let recommendations = obj
        .get("recommendations")
        .and_then(Value::as_array)
        .map(|arr| {
            arr.iter()
                .filter_map(|v| serde_json::from_value::<MusicRecommendation>(v.clone()).ok())
                .collect()
        })
        .unwrap_or_default();

    AnalysisResult {
        emotion: (!emotions.is_empty()).then(|| emotions.join(", ")),
        emotions,
        keywords,
        comfort_message,
        recommendations,
    }
}

/// User text, prefixed with the stored music taste when there is one.
pub fn build_prompt(text: &str, music_taste: Option<&str>) -> String {
    match music_taste.map(str::trim).filter(|t| !t.is_empty()) {
        Some(taste) => format!("사용자의 음악 취향: {}\n\n{}", taste, text),
        None => text.to_string(),
    }
}
