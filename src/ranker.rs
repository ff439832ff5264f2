//! Emotion-based trail ranking.
//!
//! Each trail carries one score per positive emotion. A request's emotions
//! are translated to positive targets, every trail gets the mean of its
//! target scores, and the best thirteen are split into `top` (3) and
//! `more` (10). Returned trails are then decorated with map data from the
//! document store when it has any.

use crate::dataset::{ScoreTable, TrailRow};
use crate::db::TrailDocuments;
use crate::emotions::{map_to_positive, parse_labels, PositiveEmotion};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;
use std::sync::Arc;
use tracing::{debug, info};
use utoipa::ToSchema;

/// Trails sorting after this name are outside the supported area and never
/// recommended.
pub const CUTOFF_NAME: &str = "장이소공원";

pub const TOP_COUNT: usize = 3;
pub const MORE_COUNT: usize = 10;

const UNKNOWN_ADDRESS: &str = "주소 정보 없음";
const DEFAULT_ROUTE_TYPE: &str = "LineString";

#[derive(Debug, Clone, Copy)]
pub struct ScoredRow<'a> {
    pub row: &'a TrailRow,
    pub score: f64,
}

#[derive(Debug, Default)]
pub struct RankedRows<'a> {
    pub top: Vec<ScoredRow<'a>>,
    pub more: Vec<ScoredRow<'a>>,
}

/// Rank the table for the given positive targets.
///
/// Sorting is stable: trails with equal averages keep their dataset order.
/// A trail without a value in one of the target columns is left out of
/// this ranking.
pub fn rank<'a>(table: &'a ScoreTable, targets: &[PositiveEmotion]) -> RankedRows<'a> {
    let columns: Vec<PositiveEmotion> = targets
        .iter()
        .copied()
        .filter(|e| table.has_column(*e))
        .collect();
    if columns.is_empty() {
        debug!("None of the target emotions exist as dataset columns");
        return RankedRows::default();
    }

    let mut scored: Vec<ScoredRow<'a>> = table
        .rows
        .iter()
        .filter(|row| row.name.trim() <= CUTOFF_NAME)
        .filter_map(|row| {
            let values: Option<Vec<f64>> = columns.iter().map(|e| row.score(*e)).collect();
            let values = values?;
            let score = values.iter().sum::<f64>() / values.len() as f64;
            Some(ScoredRow { row, score })
        })
        .collect();

    scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));

    let more = scored
        .iter()
        .skip(TOP_COUNT)
        .take(MORE_COUNT)
        .copied()
        .collect();
    scored.truncate(TOP_COUNT);

    RankedRows { top: scored, more }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Coordinates {
    #[serde(alias = "lat")]
    pub latitude: f64,
    #[serde(alias = "lng")]
    pub longitude: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct Route {
    #[serde(rename = "type")]
    pub route_type: String,
    /// `[lng, lat]` pairs in drawing order.
    #[schema(value_type = Vec<Vec<f64>>)]
    pub coordinates: Vec<Value>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RankedTrail {
    pub name: String,
    pub address: String,
    pub score: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub coordinates: Option<Coordinates>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub route: Option<Route>,
}

impl From<&ScoredRow<'_>> for RankedTrail {
    fn from(scored: &ScoredRow<'_>) -> Self {
        RankedTrail {
            name: scored.row.name.clone(),
            address: scored
                .row
                .address
                .clone()
                .unwrap_or_else(|| UNKNOWN_ADDRESS.to_string()),
            score: (scored.score * 100.0).round() / 100.0,
            coordinates: None,
            route: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, ToSchema)]
pub struct TrailRecommendation {
    #[schema(value_type = Vec<String>)]
    pub positive_emotions_used: Vec<PositiveEmotion>,
    pub top: Vec<RankedTrail>,
    pub more: Vec<RankedTrail>,
}

/// Stored route point, newer documents keep the polyline as objects.
#[derive(Debug, Deserialize)]
struct RoutePoint {
    lng: f64,
    lat: f64,
    #[serde(default)]
    order: f64,
}

/// Turn a stored `route_coordinates` value into `[lng, lat]` pairs.
///
/// Object points are reordered by `order` and flattened. Older documents
/// already hold plain pairs and are passed through untouched.
fn normalize_route(stored: &Value, route_type: Option<&str>) -> Result<Option<Route>, String> {
    let items = match stored.as_array() {
        Some(items) if !items.is_empty() => items,
        _ => return Ok(None),
    };
    let route_type = route_type.unwrap_or(DEFAULT_ROUTE_TYPE).to_string();

    if items[0].is_object() {
        let mut points: Vec<RoutePoint> =
            serde_json::from_value(stored.clone()).map_err(|e| e.to_string())?;
        points.sort_by(|a, b| a.order.partial_cmp(&b.order).unwrap_or(Ordering::Equal));
        let coordinates = points
            .iter()
            .map(|p| Value::from(vec![p.lng, p.lat]))
            .collect();
        Ok(Some(Route { route_type, coordinates }))
    } else {
        Ok(Some(Route {
            route_type,
            coordinates: items.clone(),
        }))
    }
}

fn apply_document(trail: &mut RankedTrail, doc: &Value) {
    if let Some(coords) = doc.get("coordinates") {
        match serde_json::from_value::<Coordinates>(coords.clone()) {
            Ok(c) => trail.coordinates = Some(c),
            Err(e) => debug!("Unreadable coordinates for {}: {}", trail.name, e),
        }
    }

    if let Some(stored) = doc.get("route_coordinates") {
        let route_type = doc.get("route_type").and_then(Value::as_str);
        match normalize_route(stored, route_type) {
            Ok(route) => trail.route = route,
            Err(e) => debug!("Unreadable route for {}: {}", trail.name, e),
        }
    }
}

/// Ranks trails from the loaded table and decorates them from the store.
pub struct Ranker {
    table: Option<Arc<ScoreTable>>,
    store: Arc<dyn TrailDocuments>,
}

impl Ranker {
    pub fn new(table: Option<Arc<ScoreTable>>, store: Arc<dyn TrailDocuments>) -> Self {
        Self { table, store }
    }

    pub fn table(&self) -> Option<&ScoreTable> {
        self.table.as_deref()
    }

    /// Recommend trails for a comma-delimited emotion string.
    ///
    /// Never fails: an unavailable dataset or unrecognized emotions give an
    /// empty recommendation.
    pub async fn recommend(&self, emotion: &str) -> TrailRecommendation {
        let table = match self.table.as_deref() {
            Some(t) if !t.is_empty() => t,
            _ => {
                debug!("Score dataset unavailable, no trail recommendation");
                return TrailRecommendation::default();
            }
        };

        let targets = map_to_positive(parse_labels(emotion));
        if targets.is_empty() {
            debug!("No recognized emotion in '{}'", emotion);
            return TrailRecommendation::default();
        }

        let ranked = rank(table, &targets);
        info!(
            "🌲 Ranked trails for {:?}: {} top, {} more",
            targets.iter().map(|t| t.label()).collect::<Vec<_>>(),
            ranked.top.len(),
            ranked.more.len()
        );

        let mut top = Vec::with_capacity(ranked.top.len());
        for scored in &ranked.top {
            top.push(self.enrich(scored).await);
        }
        let mut more = Vec::with_capacity(ranked.more.len());
        for scored in &ranked.more {
            more.push(self.enrich(scored).await);
        }

        TrailRecommendation {
            positive_emotions_used: targets,
            top,
            more,
        }
    }

    async fn enrich(&self, scored: &ScoredRow<'_>) -> RankedTrail {
        let mut trail = RankedTrail::from(scored);
        match self.store.trail(&trail.name).await {
            Ok(Some(doc)) => apply_document(&mut trail, &doc),
            Ok(None) => debug!("No trail document for {}", trail.name),
            Err(e) => debug!("Failed to fetch trail document for {}: {}", trail.name, e),
        }
        trail
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::memory::MemoryDocumentStore;
    use crate::db::NoopDocumentStore;
    use serde_json::json;
    use std::collections::HashMap;

    fn row(name: &str, scores: &[(PositiveEmotion, f64)]) -> TrailRow {
        let scores: HashMap<PositiveEmotion, f64> = scores.iter().copied().collect();
        TrailRow::new(name, Some(format!("{} 주소", name)), scores)
    }

    fn uniform(name: &str, value: f64) -> TrailRow {
        let scores: Vec<(PositiveEmotion, f64)> =
            PositiveEmotion::ALL.iter().map(|e| (*e, value)).collect();
        row(name, &scores)
    }

    fn table(rows: Vec<TrailRow>) -> ScoreTable {
        ScoreTable::new("utf-8-sig", vec![], PositiveEmotion::ALL.to_vec(), rows)
    }

    fn names(rows: &[ScoredRow<'_>]) -> Vec<String> {
        rows.iter().map(|r| r.row.name.clone()).collect()
    }

    use PositiveEmotion::*;

    #[test]
    fn test_single_target_uses_only_that_column() {
        let t = table(vec![
            row("가공원", &[(Hope, 1.0), (Joy, 5.0)]),
            row("나공원", &[(Hope, 4.0), (Joy, 1.0)]),
            row("다공원", &[(Hope, 3.0), (Joy, 2.0)]),
        ]);
        let targets = map_to_positive(["우울감"]);
        assert_eq!(targets, vec![Hope]);

        let ranked = rank(&t, &targets);
        assert_eq!(names(&ranked.top), vec!["나공원", "다공원", "가공원"]);
        assert_eq!(ranked.top[0].score, 4.0);
    }

    #[test]
    fn test_two_targets_are_averaged() {
        let t = table(vec![
            row("가공원", &[(Joy, 4.0), (Gratitude, 2.0)]),
            row("나공원", &[(Joy, 1.0), (Gratitude, 4.0)]),
        ]);
        let ranked = rank(&t, &map_to_positive(parse_labels("기쁨, 감사")));
        assert_eq!(names(&ranked.top), vec!["가공원", "나공원"]);
        assert_eq!(ranked.top[0].score, 3.0);
        assert_eq!(ranked.top[1].score, 2.5);
    }

    #[test]
    fn test_ties_keep_dataset_order() {
        let t = table(vec![
            uniform("다공원", 3.0),
            uniform("가공원", 3.0),
            uniform("나공원", 4.0),
            uniform("라공원", 3.0),
            uniform("마공원", 3.0),
        ]);
        let ranked = rank(&t, &[Joy]);
        assert_eq!(names(&ranked.top), vec!["나공원", "다공원", "가공원"]);
        assert_eq!(names(&ranked.more), vec!["라공원", "마공원"]);
    }

    #[test]
    fn test_rows_past_cutoff_never_ranked() {
        let t = table(vec![
            uniform("하늘공원", 5.0),
            uniform("장이소공원", 1.0),
            uniform("장이소공원2", 5.0),
            uniform("가람길", 2.0),
        ]);
        for emotion in PositiveEmotion::ALL {
            let ranked = rank(&t, &[emotion]);
            let all: Vec<String> = names(&ranked.top)
                .into_iter()
                .chain(names(&ranked.more))
                .collect();
            assert_eq!(all, vec!["가람길", "장이소공원"]);
        }
    }

    #[test]
    fn test_top_and_more_limits() {
        let rows = (0..20)
            .map(|i| uniform(&format!("가{:02}", i), (i % 7) as f64))
            .collect();
        let t = table(rows);
        let ranked = rank(&t, &[Joy, Love]);
        assert_eq!(ranked.top.len(), TOP_COUNT);
        assert_eq!(ranked.more.len(), MORE_COUNT);

        let min_top = ranked.top.iter().map(|r| r.score).fold(f64::INFINITY, f64::min);
        assert!(ranked.more.iter().all(|r| r.score <= min_top));
    }

    #[test]
    fn test_rows_missing_a_target_value_are_skipped() {
        let t = table(vec![
            row("가공원", &[(Joy, 5.0)]),
            row("나공원", &[(Joy, 1.0), (Love, 1.0)]),
        ]);
        let ranked = rank(&t, &[Joy, Love]);
        assert_eq!(names(&ranked.top), vec!["나공원"]);
        assert_eq!(names(&rank(&t, &[Joy]).top), vec!["가공원", "나공원"]);
    }

    #[test]
    fn test_absent_columns_give_empty_ranking() {
        let t = ScoreTable::new("utf-8-sig", vec![], vec![Joy], vec![uniform("가공원", 3.0)]);
        let ranked = rank(&t, &[Hope]);
        assert!(ranked.top.is_empty() && ranked.more.is_empty());
    }

    #[test]
    fn test_object_route_is_sorted_and_flattened() {
        let stored = json!([
            {"lng": 127.2, "lat": 37.2, "order": 2},
            {"lng": 127.0, "lat": 37.0, "order": 0},
            {"lng": 127.1, "lat": 37.1, "order": 1}
        ]);
        let route = normalize_route(&stored, None).unwrap().unwrap();
        assert_eq!(route.route_type, "LineString");
        assert_eq!(
            route.coordinates,
            vec![json!([127.0, 37.0]), json!([127.1, 37.1]), json!([127.2, 37.2])]
        );
    }

    #[test]
    fn test_flat_route_passes_through() {
        let stored = json!([[127.0, 37.0], [127.1, 37.1]]);
        let route = normalize_route(&stored, Some("MultiLineString")).unwrap().unwrap();
        assert_eq!(route.route_type, "MultiLineString");
        assert_eq!(route.coordinates, vec![json!([127.0, 37.0]), json!([127.1, 37.1])]);
        assert!(normalize_route(&json!([]), None).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_recommend_enriches_and_swallows_failures() {
        let t = table(vec![
            uniform("가공원", 5.0),
            uniform("나공원", 4.0),
            uniform("다공원", 3.0),
        ]);
        let mut store = MemoryDocumentStore::default();
        store.trails.insert(
            "가공원".to_string(),
            json!({
                "coordinates": {"latitude": 37.5, "longitude": 127.0},
                "route_coordinates": [{"lng": 127.0, "lat": 37.5, "order": 0}]
            }),
        );
        store.trails.insert(
            "나공원".to_string(),
            json!({"coordinates": "not-a-point", "route_coordinates": [{"lat": 1.0}]}),
        );
        store.failing.push("다공원".to_string());

        let ranker = Ranker::new(Some(Arc::new(t)), Arc::new(store));
        let rec = ranker.recommend("슬픔").await;

        assert_eq!(rec.positive_emotions_used, vec![Joy]);
        assert_eq!(rec.top.len(), 3);
        assert_eq!(
            rec.top[0].coordinates,
            Some(Coordinates { latitude: 37.5, longitude: 127.0 })
        );
        assert_eq!(rec.top[0].route.as_ref().unwrap().coordinates.len(), 1);
        assert!(rec.top[1].coordinates.is_none() && rec.top[1].route.is_none());
        assert_eq!(rec.top[2].name, "다공원");
        assert!(rec.top[2].coordinates.is_none());
    }

    #[tokio::test]
    async fn test_unknown_emotions_give_empty_recommendation() {
        let t = table(vec![uniform("가공원", 5.0)]);
        let ranker = Ranker::new(Some(Arc::new(t)), Arc::new(NoopDocumentStore));
        let rec = ranker.recommend("행복, bored").await;
        assert!(rec.positive_emotions_used.is_empty());
        assert!(rec.top.is_empty() && rec.more.is_empty());
    }

    #[tokio::test]
    async fn test_unavailable_dataset_gives_empty_recommendation() {
        let ranker = Ranker::new(None, Arc::new(NoopDocumentStore));
        let rec = ranker.recommend("기쁨").await;
        assert!(rec.top.is_empty() && rec.more.is_empty());
    }

    #[test]
    fn test_score_is_rounded() {
        let r = uniform("가공원", 0.0);
        let trail = RankedTrail::from(&ScoredRow { row: &r, score: 4.56789 });
        assert_eq!(trail.score, 4.57);
        assert_eq!(trail.address, "가공원 주소");
    }
}
