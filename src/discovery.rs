// The discovery pipeline: nearby search, semantic search, and the
// recommendation blender that ties user signals to the external scorer.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::database::Database;
use crate::embedding::{cosine_similarity, EmbeddingProvider};
use crate::error::{AppError, AppResult};
use crate::geo::{days_left_label, days_until, haversine_km};
use crate::models::Event;
use crate::scorer::{EventFeatures, RecommendationScorer, UserProfile};

pub const DEFAULT_RADIUS_KM: f64 = 50.0;
pub const SEARCH_LIMIT: usize = 20;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NearbyEvent {
    pub id: Uuid,
    pub title: String,
    pub latitude: f64,
    pub longitude: f64,
    pub start_time: Option<DateTime<Utc>>,
    pub distance: f64,
    pub live: bool,
    pub days: i64,
    pub days_left: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub city: Option<String>,
    pub venue: Option<String>,
    pub similarity: f32,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecommendedEvent {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub city: Option<String>,
    pub venue: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub start_time: Option<DateTime<Utc>>,
    pub score: f64,
    pub days: i64,
    pub days_left: String,
}

/// Eligible events within `radius_km` of the caller, nearest first. The
/// boundary is inclusive: an event exactly at the radius is returned.
pub async fn nearby(
    db: &Database,
    lat: f64,
    lng: f64,
    radius_km: f64,
    now: DateTime<Utc>,
) -> AppResult<Vec<NearbyEvent>> {
    let events = db.eligible_events_with_coords(now).await?;

    let mut hits = Vec::new();
    for event in events {
        let (Some(elat), Some(elng)) = (event.latitude, event.longitude) else {
            continue;
        };
        let distance = haversine_km(lat, lng, elat, elng);
        if distance > radius_km {
            continue;
        }

        let live = match (event.start_time, event.end_time) {
            (Some(start), Some(end)) => start <= now && now <= end,
            _ => false,
        };
        let days = event.start_time.map(|s| days_until(s, now)).unwrap_or(0);

        hits.push(NearbyEvent {
            id: event.id,
            title: event.title,
            latitude: elat,
            longitude: elng,
            start_time: event.start_time,
            distance,
            live,
            days,
            days_left: days_left_label(days),
        });
    }

    // Single explicit sort key: distance ascending.
    hits.sort_by(|a, b| {
        a.distance
            .partial_cmp(&b.distance)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    Ok(hits)
}

/// Free-text search over published event embeddings: embed the query with
/// the publish-time pipeline, rank by cosine similarity, return the top 20.
pub async fn semantic_search(
    db: &Database,
    embedder: &dyn EmbeddingProvider,
    query: &str,
) -> AppResult<Vec<SearchHit>> {
    let query_vector = embedder.embed(query).await?;

    let events = db.events_with_embedding().await?;
    let mut hits: Vec<SearchHit> = events
        .into_iter()
        .filter_map(|event| {
            let vector = event.embedding.as_ref()?;
            let similarity = cosine_similarity(&query_vector, vector);
            Some(SearchHit {
                id: event.id,
                title: event.title,
                description: event.description,
                city: event.city,
                venue: event.venue,
                similarity,
            })
        })
        .collect();

    hits.sort_by(|a, b| {
        b.similarity
            .partial_cmp(&a.similarity)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    hits.truncate(SEARCH_LIMIT);
    Ok(hits)
}

/// Personalized ranking: ships the user profile and per-event signals to the
/// external scorer, then re-hydrates its ordered ids against the event store.
/// The scorer's order is authoritative and is never re-derived locally. When
/// the scorer stays unreachable after retries the request degrades to
/// nearby-only ranking from the caller's location instead of failing.
pub async fn recommend(
    db: &Database,
    scorer: &dyn RecommendationScorer,
    user_id: Uuid,
    lat: f64,
    lng: f64,
    size: usize,
) -> AppResult<Vec<RecommendedEvent>> {
    let user = db
        .get_user(user_id)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;
    let interests = db.user_interest_names(user_id).await?;

    let profile = UserProfile {
        user_id: user.id.to_string(),
        latitude: lat,
        longitude: lng,
        interests,
        engagement_score: user.engagement_score,
    };

    let signals = db.events_with_signals().await?;
    let features: Vec<EventFeatures> = signals
        .iter()
        .map(|s| EventFeatures {
            event_id: s.event.id.to_string(),
            latitude: s.event.latitude,
            longitude: s.event.longitude,
            category: s.categories.clone(),
            start_time: s.event.start_time.map(|t| t.to_rfc3339()),
            host_score: s.host_score,
            trust_score: s.trust_score,
        })
        .collect();

    let now = Utc::now();
    match scorer.score(&profile, &features).await {
        Ok(results) => {
            let mut ordered_ids = Vec::new();
            let mut scores = HashMap::new();
            for result in &results {
                if let Ok(id) = Uuid::parse_str(&result.event_id) {
                    ordered_ids.push(id);
                    scores.insert(id, result.score);
                }
            }

            let events = db.events_by_ids(&ordered_ids).await?;
            let by_id: HashMap<Uuid, Event> =
                events.into_iter().map(|e| (e.id, e)).collect();

            Ok(ordered_ids
                .iter()
                .filter_map(|id| by_id.get(id))
                .take(size)
                .map(|event| decorate(event, scores.get(&event.id).copied().unwrap_or(0.0), now))
                .collect())
        }
        Err(err) => {
            tracing::warn!(
                "Recommendation scorer unavailable, degrading to nearby ranking: {}",
                err
            );
            // Degraded mode ranks every eligible event by distance; the
            // default radius cut only applies to explicit nearby queries.
            let fallback = nearby(db, lat, lng, f64::INFINITY, now).await?;
            let ids: Vec<Uuid> = fallback.iter().take(size).map(|e| e.id).collect();
            let events = db.events_by_ids(&ids).await?;
            let by_id: HashMap<Uuid, Event> =
                events.into_iter().map(|e| (e.id, e)).collect();
            Ok(ids
                .iter()
                .filter_map(|id| by_id.get(id))
                .map(|event| decorate(event, 0.0, now))
                .collect())
        }
    }
}

fn decorate(event: &Event, score: f64, now: DateTime<Utc>) -> RecommendedEvent {
    let days = event.start_time.map(|s| days_until(s, now)).unwrap_or(0);
    RecommendedEvent {
        id: event.id,
        title: event.title.clone(),
        description: event.description.clone(),
        city: event.city.clone(),
        venue: event.venue.clone(),
        latitude: event.latitude,
        longitude: event.longitude,
        start_time: event.start_time,
        score,
        days,
        days_left: days_left_label(days),
    }
}
