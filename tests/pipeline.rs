// End-to-end coverage of the discovery pipeline over an in-memory database
// with deterministic collaborator fakes.

use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::{Json, Query, State};
use axum::http::{header, HeaderMap, HeaderValue};
use chrono::{Duration, Utc};
use uuid::Uuid;

use blockbuzz::api::{self, NearbyParams};
use blockbuzz::app_state::AppState;
use blockbuzz::auth;
use blockbuzz::config::{Config, DatabaseConfig, EmbeddingConfig, ScorerConfig, ServerConfig};
use blockbuzz::database::Database;
use blockbuzz::discovery;
use blockbuzz::embedding::{self, EmbeddingProvider};
use blockbuzz::error::{AppError, AppResult};
use blockbuzz::models::{Event, EventDetails, EventDraft, InteractionType, Organizer, VolunteerRequirement};
use blockbuzz::scorer::{EventFeatures, RecommendationScorer, ScoredEvent, UserProfile};

const MUMBAI: (f64, f64) = (19.0760, 72.8777);
const PUNE: (f64, f64) = (18.5204, 73.8567);
const THANE: (f64, f64) = (19.2183, 72.9781);
const DELHI: (f64, f64) = (28.6139, 77.2090);

async fn test_db() -> Database {
    let config = DatabaseConfig {
        url: "sqlite::memory:".to_string(),
        max_connections: 1,
        idle_timeout_secs: 600,
        acquire_timeout_secs: 10,
    };
    let db = Database::new(&config).await.unwrap();
    db.init().await.unwrap();
    db
}

fn test_state(db: Database) -> AppState {
    AppState {
        db: Arc::new(db),
        embedder: Arc::new(KeywordEmbedder),
        scorer: Arc::new(DownScorer),
        config: Config {
            database: DatabaseConfig {
                url: "sqlite::memory:".to_string(),
                max_connections: 1,
                idle_timeout_secs: 600,
                acquire_timeout_secs: 10,
            },
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 0,
            },
            embedding: EmbeddingConfig {
                url: "http://localhost/embed".to_string(),
                api_key: String::new(),
                timeout_secs: 1,
                max_retries: 0,
            },
            scorer: ScorerConfig {
                url: "http://localhost/score".to_string(),
                timeout_secs: 1,
                max_retries: 0,
            },
        },
    }
}

async fn seed_organizer(db: &Database) -> Organizer {
    let user = db.create_user("Organizer").await.unwrap();
    db.create_organizer(user.id, true).await.unwrap()
}

fn event_details(
    title: &str,
    description: &str,
    coords: (f64, f64),
    start_in_hours: i64,
    duration_hours: i64,
    interest_id: Uuid,
) -> EventDetails {
    let start = Utc::now() + Duration::hours(start_in_hours);
    EventDetails {
        title: title.to_string(),
        description: description.to_string(),
        city: "Mumbai".to_string(),
        venue: "Community Hall".to_string(),
        latitude: coords.0,
        longitude: coords.1,
        start_time: start,
        end_time: start + Duration::hours(duration_hours),
        capacity: 100,
        interest_ids: vec![interest_id],
        volunteer_requirements: Vec::new(),
    }
}

/// Deterministic stand-in for the hosted embedding model: one dimension per
/// tracked keyword, normalized like the real pipeline output.
struct KeywordEmbedder;

#[async_trait]
impl EmbeddingProvider for KeywordEmbedder {
    async fn embed(&self, text: &str) -> AppResult<Vec<f32>> {
        let lower = text.to_lowercase();
        let music = lower.matches("music").count() as f32;
        let garden = lower.matches("garden").count() as f32;
        Ok(embedding::normalize(vec![music + 0.01, garden + 0.01, 0.1]))
    }
}

struct FailingEmbedder;

#[async_trait]
impl EmbeddingProvider for FailingEmbedder {
    async fn embed(&self, _text: &str) -> AppResult<Vec<f32>> {
        Err(AppError::Upstream("Embedding provider offline".to_string()))
    }
}

/// Scorer fake that returns a fixed ordering regardless of input.
struct FixedScorer {
    results: Vec<ScoredEvent>,
}

#[async_trait]
impl RecommendationScorer for FixedScorer {
    async fn score(
        &self,
        _user: &UserProfile,
        _events: &[EventFeatures],
    ) -> AppResult<Vec<ScoredEvent>> {
        Ok(self.results.clone())
    }
}

struct DownScorer;

#[async_trait]
impl RecommendationScorer for DownScorer {
    async fn score(
        &self,
        _user: &UserProfile,
        _events: &[EventFeatures],
    ) -> AppResult<Vec<ScoredEvent>> {
        Err(AppError::Upstream("Scorer offline".to_string()))
    }
}

async fn publish(
    db: &Database,
    organizer: &Organizer,
    embedder: &dyn EmbeddingProvider,
    details: &EventDetails,
) -> Event {
    let names = db.interest_names(&details.interest_ids).await.unwrap();
    let text = details.embedding_text(&names);
    let vector = embedder.embed(&text).await.unwrap();
    db.publish_event(None, organizer.id, details, &vector)
        .await
        .unwrap()
}

fn scored(event_id: Uuid, score: f64) -> ScoredEvent {
    ScoredEvent {
        event_id: event_id.to_string(),
        score,
        explanation: Vec::new(),
        debug: Vec::new(),
    }
}

// ---- interaction ledger ----

#[tokio::test]
async fn repeated_interactions_increment_count_not_rows() {
    let db = test_db().await;
    let organizer = seed_organizer(&db).await;
    let user = db.create_user("Asha").await.unwrap();
    let event = db
        .save_draft(
            organizer.id,
            &EventDraft {
                title: "Street Food Walk".to_string(),
                description: None,
                city: None,
                venue: None,
                latitude: None,
                longitude: None,
                start_time: None,
                end_time: None,
                capacity: None,
            },
        )
        .await
        .unwrap();

    let first = db
        .record_interaction(user.id, event.id, InteractionType::View)
        .await
        .unwrap();
    assert_eq!(first.cnt, 1);

    let second = db
        .record_interaction(user.id, event.id, InteractionType::View)
        .await
        .unwrap();
    assert_eq!(second.cnt, 2);

    // Two calls, two increments of the fixed VIEW weight.
    let user = db.get_user(user.id).await.unwrap().unwrap();
    assert!((user.engagement_score - 0.2).abs() < 1e-9);
}

#[tokio::test]
async fn engagement_score_sums_type_weights() {
    let db = test_db().await;
    let organizer = seed_organizer(&db).await;
    let user = db.create_user("Ravi").await.unwrap();
    let event = db
        .save_draft(
            organizer.id,
            &EventDraft {
                title: "Beach Cleanup".to_string(),
                description: None,
                city: None,
                venue: None,
                latitude: None,
                longitude: None,
                start_time: None,
                end_time: None,
                capacity: None,
            },
        )
        .await
        .unwrap();

    for kind in [
        InteractionType::View,
        InteractionType::Save,
        InteractionType::Register,
        InteractionType::Attended,
    ] {
        db.record_interaction(user.id, event.id, kind).await.unwrap();
    }

    let user = db.get_user(user.id).await.unwrap().unwrap();
    assert!((user.engagement_score - 2.2).abs() < 1e-9);
}

#[tokio::test]
async fn interaction_against_unknown_user_is_rejected() {
    let db = test_db().await;
    let organizer = seed_organizer(&db).await;
    let event = db
        .save_draft(
            organizer.id,
            &EventDraft {
                title: "Pottery Workshop".to_string(),
                description: None,
                city: None,
                venue: None,
                latitude: None,
                longitude: None,
                start_time: None,
                end_time: None,
                capacity: None,
            },
        )
        .await
        .unwrap();

    let result = db
        .record_interaction(Uuid::new_v4(), event.id, InteractionType::Save)
        .await;
    assert!(result.is_err());
}

// ---- nearby search ----

#[tokio::test]
async fn nearby_returns_eligible_events_nearest_first() {
    let db = test_db().await;
    let organizer = seed_organizer(&db).await;
    let interest = db.create_interest("community").await.unwrap();
    let embedder = KeywordEmbedder;

    let thane = publish(
        &db,
        &organizer,
        &embedder,
        &event_details("Thane Fair", "local fair", THANE, 48, 4, interest),
    )
    .await;
    let pune = publish(
        &db,
        &organizer,
        &embedder,
        &event_details("Pune Meetup", "tech meetup", PUNE, 48, 4, interest),
    )
    .await;
    publish(
        &db,
        &organizer,
        &embedder,
        &event_details("Delhi Conf", "far away", DELHI, 48, 4, interest),
    )
    .await;

    // Cancelled and already-ended events are ineligible even when close.
    let cancelled = publish(
        &db,
        &organizer,
        &embedder,
        &event_details("Cancelled Gig", "near", THANE, 48, 4, interest),
    )
    .await;
    db.cancel_event(cancelled.id, organizer.id).await.unwrap();
    publish(
        &db,
        &organizer,
        &embedder,
        &event_details("Finished Gig", "near", THANE, -48, 4, interest),
    )
    .await;

    let hits = discovery::nearby(&db, MUMBAI.0, MUMBAI.1, 200.0, Utc::now())
        .await
        .unwrap();
    let ids: Vec<Uuid> = hits.iter().map(|h| h.id).collect();
    assert_eq!(ids, vec![thane.id, pune.id]);
    assert!(hits[0].distance < hits[1].distance);
}

#[tokio::test]
async fn nearby_radius_boundary_is_inclusive() {
    let db = test_db().await;
    let organizer = seed_organizer(&db).await;
    let interest = db.create_interest("music").await.unwrap();
    publish(
        &db,
        &organizer,
        &KeywordEmbedder,
        &event_details("Pune Concert", "music night", PUNE, 24, 4, interest),
    )
    .await;

    let exact = blockbuzz::geo::haversine_km(MUMBAI.0, MUMBAI.1, PUNE.0, PUNE.1);

    let at_radius = discovery::nearby(&db, MUMBAI.0, MUMBAI.1, exact, Utc::now())
        .await
        .unwrap();
    assert_eq!(at_radius.len(), 1);

    let below_radius = discovery::nearby(&db, MUMBAI.0, MUMBAI.1, exact - 0.001, Utc::now())
        .await
        .unwrap();
    assert!(below_radius.is_empty());
}

#[tokio::test]
async fn nearby_flags_live_events_and_labels_start_days() {
    let db = test_db().await;
    let organizer = seed_organizer(&db).await;
    let interest = db.create_interest("sports").await.unwrap();
    let embedder = KeywordEmbedder;

    let live = publish(
        &db,
        &organizer,
        &embedder,
        &event_details("Live Now", "ongoing", THANE, -1, 2, interest),
    )
    .await;
    let tomorrow = publish(
        &db,
        &organizer,
        &embedder,
        &event_details("Tomorrow Run", "early run", PUNE, 25, 2, interest),
    )
    .await;
    let next_week = publish(
        &db,
        &organizer,
        &embedder,
        // One hour past the five-day mark so the floor stays at 5 even
        // after elapsed test time.
        &event_details("Next Week", "later", PUNE, 5 * 24 + 1, 2, interest),
    )
    .await;

    let hits = discovery::nearby(&db, MUMBAI.0, MUMBAI.1, 200.0, Utc::now())
        .await
        .unwrap();
    let find = |id: Uuid| hits.iter().find(|h| h.id == id).unwrap();

    let live_hit = find(live.id);
    assert!(live_hit.live);
    assert_eq!(live_hit.days, 0);
    assert_eq!(live_hit.days_left, "Today");

    let tomorrow_hit = find(tomorrow.id);
    assert!(!tomorrow_hit.live);
    assert_eq!(tomorrow_hit.days, 1);
    assert_eq!(tomorrow_hit.days_left, "Tomorrow");

    let next_week_hit = find(next_week.id);
    assert_eq!(next_week_hit.days, 5);
    assert_eq!(next_week_hit.days_left, "5 days left");
}

#[tokio::test]
async fn nearby_handler_rejects_missing_or_malformed_coords() {
    let state = test_state(test_db().await);

    let params = NearbyParams {
        lat: None,
        lng: Some(MUMBAI.1.to_string()),
        radius: None,
    };
    let err = api::nearby_handler(State(state.clone()), Query(params))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));

    let params = NearbyParams {
        lat: Some("north".to_string()),
        lng: Some(MUMBAI.1.to_string()),
        radius: None,
    };
    let err = api::nearby_handler(State(state), Query(params))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));
}

#[tokio::test]
async fn nearby_handler_defaults_radius_when_absent_or_invalid() {
    let db = test_db().await;
    let organizer = seed_organizer(&db).await;
    let interest = db.create_interest("street").await.unwrap();
    let embedder = KeywordEmbedder;
    publish(
        &db,
        &organizer,
        &embedder,
        &event_details("Thane Fete", "near", THANE, 24, 4, interest),
    )
    .await;
    publish(
        &db,
        &organizer,
        &embedder,
        &event_details("Pune Fete", "far", PUNE, 24, 4, interest),
    )
    .await;
    let state = test_state(db);

    let count = |body: &serde_json::Value| body["events"].as_array().unwrap().len();
    let params = |radius: Option<&str>| NearbyParams {
        lat: Some(MUMBAI.0.to_string()),
        lng: Some(MUMBAI.1.to_string()),
        radius: radius.map(str::to_string),
    };

    // Pune sits past the 50 km default, Thane within it.
    let Json(body) = api::nearby_handler(State(state.clone()), Query(params(None)))
        .await
        .unwrap();
    assert_eq!(count(&body), 1);

    let Json(body) = api::nearby_handler(State(state.clone()), Query(params(Some("oops"))))
        .await
        .unwrap();
    assert_eq!(count(&body), 1);

    let Json(body) = api::nearby_handler(State(state), Query(params(Some("200"))))
        .await
        .unwrap();
    assert_eq!(count(&body), 2);
}

// ---- semantic search ----

#[tokio::test]
async fn semantic_search_ranks_closest_text_first() {
    let db = test_db().await;
    let organizer = seed_organizer(&db).await;
    let interest = db.create_interest("culture").await.unwrap();
    let embedder = KeywordEmbedder;

    let music = publish(
        &db,
        &organizer,
        &embedder,
        &event_details("Music Night", "music music music", PUNE, 24, 4, interest),
    )
    .await;
    let garden = publish(
        &db,
        &organizer,
        &embedder,
        &event_details("Garden Party", "garden garden garden", PUNE, 24, 4, interest),
    )
    .await;

    let hits = discovery::semantic_search(&db, &embedder, "music").await.unwrap();
    assert_eq!(hits[0].id, music.id);
    assert!(hits[0].similarity > hits[1].similarity);
    assert!(hits.iter().any(|h| h.id == garden.id));

    let hits = discovery::semantic_search(&db, &embedder, "garden").await.unwrap();
    assert_eq!(hits[0].id, garden.id);
}

#[tokio::test]
async fn semantic_search_caps_results_at_twenty() {
    let db = test_db().await;
    let organizer = seed_organizer(&db).await;
    let interest = db.create_interest("gardening").await.unwrap();
    let embedder = KeywordEmbedder;

    for i in 0..25 {
        publish(
            &db,
            &organizer,
            &embedder,
            &event_details(
                &format!("Garden Walk {}", i),
                "a walk in the garden",
                PUNE,
                24,
                4,
                interest,
            ),
        )
        .await;
    }

    let hits = discovery::semantic_search(&db, &embedder, "garden").await.unwrap();
    assert_eq!(hits.len(), 20);
}

// ---- recommendation blender ----

#[tokio::test]
async fn recommend_preserves_scorer_order() {
    let db = test_db().await;
    let organizer = seed_organizer(&db).await;
    let interest = db.create_interest("tech").await.unwrap();
    let embedder = KeywordEmbedder;
    let user = db.create_user("Maya").await.unwrap();

    let e1 = publish(&db, &organizer, &embedder, &event_details("One", "a", PUNE, 24, 4, interest)).await;
    let e2 = publish(&db, &organizer, &embedder, &event_details("Two", "b", THANE, 24, 4, interest)).await;
    let e3 = publish(&db, &organizer, &embedder, &event_details("Three", "c", DELHI, 24, 4, interest)).await;

    let scorer = FixedScorer {
        results: vec![scored(e3.id, 0.9), scored(e1.id, 0.5), scored(e2.id, 0.2)],
    };

    let events = discovery::recommend(&db, &scorer, user.id, MUMBAI.0, MUMBAI.1, 10)
        .await
        .unwrap();
    let ids: Vec<Uuid> = events.iter().map(|e| e.id).collect();
    assert_eq!(ids, vec![e3.id, e1.id, e2.id]);
    assert_eq!(events[0].score, 0.9);

    let truncated = discovery::recommend(&db, &scorer, user.id, MUMBAI.0, MUMBAI.1, 2)
        .await
        .unwrap();
    let ids: Vec<Uuid> = truncated.iter().map(|e| e.id).collect();
    assert_eq!(ids, vec![e3.id, e1.id]);
}

#[tokio::test]
async fn recommend_rejects_unknown_user() {
    let db = test_db().await;
    let scorer = FixedScorer { results: Vec::new() };

    let err = discovery::recommend(&db, &scorer, Uuid::new_v4(), MUMBAI.0, MUMBAI.1, 10)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}

#[tokio::test]
async fn recommend_degrades_to_nearby_ranking_when_scorer_is_down() {
    let db = test_db().await;
    let organizer = seed_organizer(&db).await;
    let interest = db.create_interest("food").await.unwrap();
    let embedder = KeywordEmbedder;
    let user = db.create_user("Dev").await.unwrap();

    let pune = publish(&db, &organizer, &embedder, &event_details("Pune Eats", "a", PUNE, 24, 4, interest)).await;
    let thane = publish(&db, &organizer, &embedder, &event_details("Thane Eats", "b", THANE, 24, 4, interest)).await;
    let delhi = publish(&db, &organizer, &embedder, &event_details("Delhi Eats", "c", DELHI, 24, 4, interest)).await;

    // Degraded mode ranks every eligible event by distance, including ones
    // well beyond the default nearby radius.
    let events = discovery::recommend(&db, &DownScorer, user.id, MUMBAI.0, MUMBAI.1, 10)
        .await
        .unwrap();
    let ids: Vec<Uuid> = events.iter().map(|e| e.id).collect();
    assert_eq!(ids, vec![thane.id, pune.id, delhi.id]);
    assert!(events.iter().all(|e| e.score == 0.0));
}

// ---- publish flow ----

#[tokio::test]
async fn publish_stores_embedding_with_published_flag() {
    let db = test_db().await;
    let organizer = seed_organizer(&db).await;
    let interest = db.create_interest("art").await.unwrap();

    let event = publish(
        &db,
        &organizer,
        &KeywordEmbedder,
        &event_details("Gallery Opening", "art show", PUNE, 24, 4, interest),
    )
    .await;

    let stored = db.get_event(event.id).await.unwrap().unwrap();
    assert!(stored.published);
    assert!(stored.published_at.is_some());
    let vector = stored.embedding.unwrap();
    let norm: f32 = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    assert!((norm - 1.0).abs() < 1e-5);
}

#[tokio::test]
async fn failed_embedding_aborts_publish() {
    let db = test_db().await;
    let organizer = seed_organizer(&db).await;
    let interest = db.create_interest("theatre").await.unwrap();
    let draft = db
        .save_draft(
            organizer.id,
            &EventDraft {
                title: "Open Mic".to_string(),
                description: None,
                city: None,
                venue: None,
                latitude: None,
                longitude: None,
                start_time: None,
                end_time: None,
                capacity: None,
            },
        )
        .await
        .unwrap();
    let details = event_details("Open Mic", "comedy night", PUNE, 24, 4, interest);

    // Same order as the publish handler: embed first, write second.
    let result = async {
        let names = db.interest_names(&details.interest_ids).await?;
        let vector = FailingEmbedder.embed(&details.embedding_text(&names)).await?;
        db.publish_event(Some(draft.id), organizer.id, &details, &vector)
            .await
    }
    .await;
    assert!(result.is_err());

    // Never published=true with a null embedding, and never half-embedded.
    let stored = db.get_event(draft.id).await.unwrap().unwrap();
    assert!(!stored.published);
    assert!(stored.embedding.is_none());
}

#[tokio::test]
async fn publish_upserts_requirements_and_bumps_organizer_counter() {
    let db = test_db().await;
    let organizer = seed_organizer(&db).await;
    let interest = db.create_interest("charity").await.unwrap();
    let mut details = event_details("Fundraiser", "annual drive", PUNE, 24, 4, interest);
    details.volunteer_requirements = vec![VolunteerRequirement {
        role: "USHER".to_string(),
        other_role: None,
        required_count: 2,
        skills: vec!["crowd management".to_string()],
        description: None,
    }];

    let event = publish(&db, &organizer, &KeywordEmbedder, &details).await;

    let requirements = db.volunteer_requirements(event.id).await.unwrap();
    assert_eq!(requirements.len(), 1);
    assert_eq!(requirements[0].role, "USHER");
    assert_eq!(requirements[0].required_count, 2);

    let organizer = db.get_organizer(organizer.id).await.unwrap().unwrap();
    assert_eq!(organizer.total_events, 1);
}

#[tokio::test]
async fn republish_is_rejected() {
    let db = test_db().await;
    let organizer = seed_organizer(&db).await;
    let interest = db.create_interest("dance").await.unwrap();
    let details = event_details("Dance Off", "crew battle", PUNE, 24, 4, interest);
    let event = publish(&db, &organizer, &KeywordEmbedder, &details).await;

    let err = db
        .publish_event(Some(event.id), organizer.id, &details, &[0.0; 3])
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::BadRequest(_)));
}

#[tokio::test]
async fn cancel_reverses_publish_accounting() {
    let db = test_db().await;
    let organizer = seed_organizer(&db).await;
    let interest = db.create_interest("markets").await.unwrap();
    let event = publish(
        &db,
        &organizer,
        &KeywordEmbedder,
        &event_details("Night Market", "stalls", PUNE, 24, 4, interest),
    )
    .await;
    assert_eq!(db.get_organizer(organizer.id).await.unwrap().unwrap().total_events, 1);
    let score_before = db.get_organizer(organizer.id).await.unwrap().unwrap().host_score;

    db.cancel_event(event.id, organizer.id).await.unwrap();

    let stored = db.get_event(event.id).await.unwrap().unwrap();
    assert!(stored.cancelled);
    let after = db.get_organizer(organizer.id).await.unwrap().unwrap();
    assert_eq!(after.total_events, 0);
    // No milestone crossed, so the host score stays put.
    assert!((after.host_score - score_before).abs() < 1e-9);
}

#[tokio::test]
async fn cancel_below_milestone_claws_back_host_score() {
    let db = test_db().await;
    let organizer = seed_organizer(&db).await;
    let interest = db.create_interest("festivals").await.unwrap();
    let embedder = KeywordEmbedder;

    let mut last = None;
    for i in 0..20 {
        let event = publish(
            &db,
            &organizer,
            &embedder,
            &event_details(&format!("Fest {}", i), "annual", PUNE, 24, 4, interest),
        )
        .await;
        last = Some(event);
    }
    let at_twenty = db.get_organizer(organizer.id).await.unwrap().unwrap();
    assert_eq!(at_twenty.total_events, 20);

    db.cancel_event(last.unwrap().id, organizer.id).await.unwrap();

    let after = db.get_organizer(organizer.id).await.unwrap().unwrap();
    assert_eq!(after.total_events, 19);
    assert!((after.host_score - (at_twenty.host_score - 0.25)).abs() < 1e-9);
}

#[tokio::test]
async fn cancel_guards_drafts_and_repeat_cancellation() {
    let db = test_db().await;
    let organizer = seed_organizer(&db).await;
    let interest = db.create_interest("trivia").await.unwrap();
    let draft = db
        .save_draft(
            organizer.id,
            &EventDraft {
                title: "Quiz Night".to_string(),
                description: None,
                city: None,
                venue: None,
                latitude: None,
                longitude: None,
                start_time: None,
                end_time: None,
                capacity: None,
            },
        )
        .await
        .unwrap();
    assert!(matches!(
        db.cancel_event(draft.id, organizer.id).await.unwrap_err(),
        AppError::BadRequest(_)
    ));

    let event = publish(
        &db,
        &organizer,
        &KeywordEmbedder,
        &event_details("Quiz Night", "pub quiz", PUNE, 24, 4, interest),
    )
    .await;

    let other = seed_organizer(&db).await;
    assert!(matches!(
        db.cancel_event(event.id, other.id).await.unwrap_err(),
        AppError::Forbidden(_)
    ));

    db.cancel_event(event.id, organizer.id).await.unwrap();
    assert!(matches!(
        db.cancel_event(event.id, organizer.id).await.unwrap_err(),
        AppError::BadRequest(_)
    ));
}

#[tokio::test]
async fn delete_requires_unpublished_or_cancelled() {
    let db = test_db().await;
    let organizer = seed_organizer(&db).await;
    let interest = db.create_interest("games").await.unwrap();
    let event = publish(
        &db,
        &organizer,
        &KeywordEmbedder,
        &event_details("Chess Meet", "blitz games", PUNE, 24, 4, interest),
    )
    .await;

    let err = db.delete_event(event.id, organizer.id).await.unwrap_err();
    assert!(matches!(err, AppError::BadRequest(_)));

    db.cancel_event(event.id, organizer.id).await.unwrap();
    db.delete_event(event.id, organizer.id).await.unwrap();
    assert!(db.get_event(event.id).await.unwrap().is_none());
}

// ---- sessions & registrations ----

#[tokio::test]
async fn session_cookie_resolves_to_user() {
    let db = test_db().await;
    let user = db.create_user("Nina").await.unwrap();
    let token = db.create_session(user.id).await.unwrap();

    let mut headers = HeaderMap::new();
    headers.insert(
        header::COOKIE,
        HeaderValue::from_str(&format!("session={}", token)).unwrap(),
    );
    assert_eq!(auth::require_user(&db, &headers).await.unwrap(), user.id);

    let mut bad = HeaderMap::new();
    bad.insert(header::COOKIE, HeaderValue::from_static("session=nope"));
    assert!(matches!(
        auth::require_user(&db, &bad).await.unwrap_err(),
        AppError::Unauthorized(_)
    ));

    assert!(matches!(
        auth::require_user(&db, &HeaderMap::new()).await.unwrap_err(),
        AppError::Unauthorized(_)
    ));
}

#[tokio::test]
async fn registration_flow_enforces_single_registration() {
    let db = test_db().await;
    let organizer = seed_organizer(&db).await;
    let interest = db.create_interest("books").await.unwrap();
    let user = db.create_user("Ira").await.unwrap();
    let event = publish(
        &db,
        &organizer,
        &KeywordEmbedder,
        &event_details("Book Swap", "bring a book", PUNE, 24, 4, interest),
    )
    .await;

    // Attending before registering has nothing to flip.
    assert!(matches!(
        db.mark_attended(user.id, event.id).await.unwrap_err(),
        AppError::NotFound(_)
    ));

    db.create_registration(user.id, event.id).await.unwrap();
    assert!(matches!(
        db.create_registration(user.id, event.id).await.unwrap_err(),
        AppError::BadRequest(_)
    ));

    db.mark_attended(user.id, event.id).await.unwrap();
    assert_eq!(db.registration_count(event.id).await.unwrap(), 1);
}
