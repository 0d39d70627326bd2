// SQLx-backed storage for events, users, organizers and the interaction
// ledger. Handlers receive this through AppState; there is no global handle.

use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use uuid::Uuid;

use crate::config::DatabaseConfig;
use crate::embedding;
use crate::error::{AppError, AppResult};
use crate::models::{
    Event, EventDetails, EventDraft, Interaction, InteractionType, Organizer, User,
    VolunteerRequirement,
};

/// Wall-clock budget for the multi-statement publish transaction; a slow
/// transaction fails closed instead of holding a connection indefinitely.
const PUBLISH_TXN_BUDGET: Duration = Duration::from_secs(20);

const EVENT_COLUMNS: &str = "id, organizer_id, title, description, city, venue, latitude, longitude, \
     start_time, end_time, capacity, published, published_at, cancelled, embedding";

/// Event joined with the per-event signals the recommendation scorer needs.
#[derive(Debug, Clone)]
pub struct EventSignals {
    pub event: Event,
    pub categories: Vec<String>,
    pub host_score: f64,
    pub trust_score: f64,
}

pub struct Database {
    pool: SqlitePool,
}

impl Database {
    pub async fn new(config: &DatabaseConfig) -> anyhow::Result<Self> {
        let options = SqliteConnectOptions::from_str(&config.url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .idle_timeout(Some(config.idle_timeout()))
            .acquire_timeout(config.acquire_timeout())
            .after_connect(|conn, _meta| {
                Box::pin(async move {
                    sqlx::query("PRAGMA foreign_keys = ON")
                        .execute(&mut *conn)
                        .await?;
                    Ok(())
                })
            })
            .connect_with(options)
            .await?;

        Ok(Database { pool })
    }

    pub async fn init(&self) -> AppResult<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                engagement_score REAL NOT NULL DEFAULT 0
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS organizers (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL UNIQUE REFERENCES users(id),
                verified INTEGER NOT NULL DEFAULT 0,
                total_events INTEGER NOT NULL DEFAULT 0,
                host_score REAL NOT NULL DEFAULT 0,
                trust_score REAL NOT NULL DEFAULT 0
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS interests (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL UNIQUE
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS user_interests (
                user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                interest_id TEXT NOT NULL REFERENCES interests(id) ON DELETE CASCADE,
                PRIMARY KEY (user_id, interest_id)
            )",
        )
        .execute(&self.pool)
        .await?;

        // Embedding is a little-endian f32 blob, written only inside the
        // publish transaction so it is never half-stored.
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS events (
                id TEXT PRIMARY KEY,
                organizer_id TEXT NOT NULL REFERENCES organizers(id),
                title TEXT NOT NULL,
                description TEXT,
                city TEXT,
                venue TEXT,
                latitude REAL,
                longitude REAL,
                start_time INTEGER,
                end_time INTEGER,
                capacity INTEGER,
                published INTEGER NOT NULL DEFAULT 0,
                published_at INTEGER,
                cancelled INTEGER NOT NULL DEFAULT 0,
                embedding BLOB
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS event_interests (
                event_id TEXT NOT NULL REFERENCES events(id) ON DELETE CASCADE,
                interest_id TEXT NOT NULL REFERENCES interests(id) ON DELETE CASCADE,
                PRIMARY KEY (event_id, interest_id)
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS interactions (
                user_id TEXT NOT NULL REFERENCES users(id),
                event_id TEXT NOT NULL REFERENCES events(id),
                type TEXT NOT NULL,
                cnt INTEGER NOT NULL DEFAULT 1,
                PRIMARY KEY (user_id, event_id, type)
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS registrations (
                user_id TEXT NOT NULL REFERENCES users(id),
                event_id TEXT NOT NULL REFERENCES events(id),
                status TEXT NOT NULL DEFAULT 'REGISTERED',
                created INTEGER NOT NULL,
                PRIMARY KEY (user_id, event_id)
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS volunteer_requirements (
                event_id TEXT NOT NULL REFERENCES events(id) ON DELETE CASCADE,
                role TEXT NOT NULL,
                other_role TEXT,
                required_count INTEGER NOT NULL,
                skills TEXT NOT NULL DEFAULT '[]',
                description TEXT,
                PRIMARY KEY (event_id, role)
            )",
        )
        .execute(&self.pool)
        .await?;

        // Sessions are minted by the out-of-scope auth system; this service
        // only resolves cookies against them.
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS sessions (
                token TEXT PRIMARY KEY,
                user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                created INTEGER NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_events_discovery ON events(published, cancelled, end_time)",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_events_organizer ON events(organizer_id)")
            .execute(&self.pool)
            .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_interactions_user ON interactions(user_id)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    // ---- users & organizers ----

    pub async fn create_user(&self, name: &str) -> AppResult<User> {
        let id = Uuid::new_v4();
        sqlx::query("INSERT INTO users (id, name, engagement_score) VALUES (?, ?, 0)")
            .bind(id.to_string())
            .bind(name)
            .execute(&self.pool)
            .await?;
        Ok(User {
            id,
            name: name.to_string(),
            engagement_score: 0.0,
        })
    }

    pub async fn get_user(&self, id: Uuid) -> AppResult<Option<User>> {
        let row = sqlx::query("SELECT id, name, engagement_score FROM users WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.map(|row| {
            Ok(User {
                id: parse_uuid(&row.get::<String, _>("id"))?,
                name: row.get("name"),
                engagement_score: row.get("engagement_score"),
            })
        })
        .transpose()
    }

    pub async fn create_organizer(&self, user_id: Uuid, verified: bool) -> AppResult<Organizer> {
        let id = Uuid::new_v4();
        sqlx::query(
            "INSERT INTO organizers (id, user_id, verified, total_events, host_score, trust_score)
             VALUES (?, ?, ?, 0, 0, 0)",
        )
        .bind(id.to_string())
        .bind(user_id.to_string())
        .bind(verified)
        .execute(&self.pool)
        .await?;
        Ok(Organizer {
            id,
            user_id,
            verified,
            total_events: 0,
            host_score: 0.0,
            trust_score: 0.0,
        })
    }

    pub async fn organizer_for_user(&self, user_id: Uuid) -> AppResult<Option<Organizer>> {
        let row = sqlx::query(
            "SELECT id, user_id, verified, total_events, host_score, trust_score
             FROM organizers WHERE user_id = ?",
        )
        .bind(user_id.to_string())
        .fetch_optional(&self.pool)
        .await?;
        row.map(row_to_organizer).transpose()
    }

    pub async fn get_organizer(&self, id: Uuid) -> AppResult<Option<Organizer>> {
        let row = sqlx::query(
            "SELECT id, user_id, verified, total_events, host_score, trust_score
             FROM organizers WHERE id = ?",
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;
        row.map(row_to_organizer).transpose()
    }

    // ---- interests ----

    pub async fn create_interest(&self, name: &str) -> AppResult<Uuid> {
        let id = Uuid::new_v4();
        sqlx::query("INSERT INTO interests (id, name) VALUES (?, ?)")
            .bind(id.to_string())
            .bind(name)
            .execute(&self.pool)
            .await?;
        Ok(id)
    }

    pub async fn add_user_interest(&self, user_id: Uuid, interest_id: Uuid) -> AppResult<()> {
        sqlx::query("INSERT OR IGNORE INTO user_interests (user_id, interest_id) VALUES (?, ?)")
            .bind(user_id.to_string())
            .bind(interest_id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn user_interest_names(&self, user_id: Uuid) -> AppResult<Vec<String>> {
        let rows = sqlx::query(
            "SELECT i.name FROM user_interests ui
             JOIN interests i ON i.id = ui.interest_id
             WHERE ui.user_id = ? ORDER BY i.name",
        )
        .bind(user_id.to_string())
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|row| row.get("name")).collect())
    }

    pub async fn interest_names(&self, ids: &[Uuid]) -> AppResult<Vec<String>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let placeholders = vec!["?"; ids.len()].join(", ");
        let sql = format!(
            "SELECT name FROM interests WHERE id IN ({}) ORDER BY name",
            placeholders
        );
        let mut query = sqlx::query(&sql);
        for id in ids {
            query = query.bind(id.to_string());
        }
        let rows = query.fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(|row| row.get("name")).collect())
    }

    // ---- events ----

    pub async fn save_draft(&self, organizer_id: Uuid, draft: &EventDraft) -> AppResult<Event> {
        let id = Uuid::new_v4();
        sqlx::query(
            "INSERT INTO events (id, organizer_id, title, description, city, venue, latitude,
                                 longitude, start_time, end_time, capacity, published, cancelled)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 0, 0)",
        )
        .bind(id.to_string())
        .bind(organizer_id.to_string())
        .bind(&draft.title)
        .bind(&draft.description)
        .bind(&draft.city)
        .bind(&draft.venue)
        .bind(draft.latitude)
        .bind(draft.longitude)
        .bind(draft.start_time.map(|t| t.timestamp()))
        .bind(draft.end_time.map(|t| t.timestamp()))
        .bind(draft.capacity)
        .execute(&self.pool)
        .await?;

        self.get_event(id)
            .await?
            .ok_or_else(|| AppError::Internal("Draft vanished after insert".to_string()))
    }

    pub async fn get_event(&self, id: Uuid) -> AppResult<Option<Event>> {
        let sql = format!("SELECT {} FROM events WHERE id = ?", EVENT_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.map(|row| row_to_event(&row)).transpose()
    }

    /// Publishes an event inside one transaction: field update + embedding
    /// write + volunteer-requirement upsert + organizer counters. With no
    /// `event_id` a new event is created already published.
    pub async fn publish_event(
        &self,
        event_id: Option<Uuid>,
        organizer_id: Uuid,
        details: &EventDetails,
        vector: &[f32],
    ) -> AppResult<Event> {
        match tokio::time::timeout(
            PUBLISH_TXN_BUDGET,
            self.publish_event_inner(event_id, organizer_id, details, vector),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(AppError::TimeoutError(
                "Publish transaction exceeded its budget".to_string(),
            )),
        }
    }

    async fn publish_event_inner(
        &self,
        event_id: Option<Uuid>,
        organizer_id: Uuid,
        details: &EventDetails,
        vector: &[f32],
    ) -> AppResult<Event> {
        let now = Utc::now().timestamp();
        let blob = embedding::to_blob(vector);

        let mut tx = self.pool.begin().await?;

        let id = match event_id {
            Some(id) => {
                let row = sqlx::query("SELECT organizer_id, published FROM events WHERE id = ?")
                    .bind(id.to_string())
                    .fetch_optional(&mut *tx)
                    .await?
                    .ok_or_else(|| AppError::NotFound("Event not found".to_string()))?;
                let owner: String = row.get("organizer_id");
                if owner != organizer_id.to_string() {
                    return Err(AppError::Forbidden(
                        "You do not have permission to publish this event".to_string(),
                    ));
                }
                if row.get::<bool, _>("published") {
                    return Err(AppError::BadRequest(
                        "This event is already published".to_string(),
                    ));
                }

                sqlx::query(
                    "UPDATE events SET title = ?, description = ?, city = ?, venue = ?,
                                       latitude = ?, longitude = ?, start_time = ?, end_time = ?,
                                       capacity = ?, published = 1, published_at = ?, embedding = ?
                     WHERE id = ?",
                )
                .bind(&details.title)
                .bind(&details.description)
                .bind(&details.city)
                .bind(&details.venue)
                .bind(details.latitude)
                .bind(details.longitude)
                .bind(details.start_time.timestamp())
                .bind(details.end_time.timestamp())
                .bind(details.capacity)
                .bind(now)
                .bind(&blob)
                .bind(id.to_string())
                .execute(&mut *tx)
                .await?;
                id
            }
            None => {
                let id = Uuid::new_v4();
                sqlx::query(
                    "INSERT INTO events (id, organizer_id, title, description, city, venue,
                                         latitude, longitude, start_time, end_time, capacity,
                                         published, published_at, cancelled, embedding)
                     VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 1, ?, 0, ?)",
                )
                .bind(id.to_string())
                .bind(organizer_id.to_string())
                .bind(&details.title)
                .bind(&details.description)
                .bind(&details.city)
                .bind(&details.venue)
                .bind(details.latitude)
                .bind(details.longitude)
                .bind(details.start_time.timestamp())
                .bind(details.end_time.timestamp())
                .bind(details.capacity)
                .bind(now)
                .bind(&blob)
                .execute(&mut *tx)
                .await?;
                id
            }
        };

        sqlx::query("DELETE FROM event_interests WHERE event_id = ?")
            .bind(id.to_string())
            .execute(&mut *tx)
            .await?;
        for interest_id in &details.interest_ids {
            sqlx::query("INSERT INTO event_interests (event_id, interest_id) VALUES (?, ?)")
                .bind(id.to_string())
                .bind(interest_id.to_string())
                .execute(&mut *tx)
                .await?;
        }

        for req in &details.volunteer_requirements {
            sqlx::query(
                "INSERT INTO volunteer_requirements
                     (event_id, role, other_role, required_count, skills, description)
                 VALUES (?, ?, ?, ?, ?, ?)
                 ON CONFLICT(event_id, role) DO UPDATE SET
                     other_role = excluded.other_role,
                     required_count = excluded.required_count,
                     skills = excluded.skills,
                     description = excluded.description",
            )
            .bind(id.to_string())
            .bind(&req.role)
            .bind(&req.other_role)
            .bind(req.required_count)
            .bind(serde_json::to_string(&req.skills).map_err(|e| {
                AppError::Internal(format!("Failed to encode requirement skills: {}", e))
            })?)
            .bind(&req.description)
            .execute(&mut *tx)
            .await?;
        }

        sqlx::query("UPDATE organizers SET total_events = total_events + 1 WHERE id = ?")
            .bind(organizer_id.to_string())
            .execute(&mut *tx)
            .await?;
        let total: i64 = sqlx::query("SELECT total_events FROM organizers WHERE id = ?")
            .bind(organizer_id.to_string())
            .fetch_one(&mut *tx)
            .await?
            .get("total_events");
        // Milestone bumps to the organizer's host score.
        let bump = match total {
            20 => Some(0.15),
            50 => Some(0.25),
            _ => None,
        };
        if let Some(bump) = bump {
            sqlx::query("UPDATE organizers SET host_score = host_score + ? WHERE id = ?")
                .bind(bump)
                .bind(organizer_id.to_string())
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;

        self.get_event(id)
            .await?
            .ok_or_else(|| AppError::Internal("Event vanished after publish".to_string()))
    }

    /// Cancelling reverses the publish-side accounting: the organizer's
    /// `total_events` drops by one, and falling back below a milestone
    /// claws back part of the host score.
    pub async fn cancel_event(&self, event_id: Uuid, organizer_id: Uuid) -> AppResult<()> {
        let event = self
            .get_event(event_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Event not found".to_string()))?;
        if event.organizer_id != organizer_id {
            return Err(AppError::Forbidden(
                "You do not have permission to cancel this event".to_string(),
            ));
        }
        if event.cancelled {
            return Err(AppError::BadRequest(
                "This event has already been cancelled".to_string(),
            ));
        }
        if !event.published {
            return Err(AppError::BadRequest(
                "Only published events can be cancelled. You can delete unpublished events instead."
                    .to_string(),
            ));
        }

        let mut tx = self.pool.begin().await?;
        sqlx::query("UPDATE events SET cancelled = 1 WHERE id = ?")
            .bind(event_id.to_string())
            .execute(&mut *tx)
            .await?;
        sqlx::query("UPDATE organizers SET total_events = total_events - 1 WHERE id = ?")
            .bind(organizer_id.to_string())
            .execute(&mut *tx)
            .await?;
        let total: i64 = sqlx::query("SELECT total_events FROM organizers WHERE id = ?")
            .bind(organizer_id.to_string())
            .fetch_one(&mut *tx)
            .await?
            .get("total_events");
        // Host-score clawback when the count falls back below a milestone.
        let clawback = match total {
            19 => Some(0.25),
            4 => Some(0.5),
            _ => None,
        };
        if let Some(clawback) = clawback {
            sqlx::query("UPDATE organizers SET host_score = host_score - ? WHERE id = ?")
                .bind(clawback)
                .bind(organizer_id.to_string())
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// Deletion is only allowed while the event is unpublished or cancelled.
    pub async fn delete_event(&self, event_id: Uuid, organizer_id: Uuid) -> AppResult<()> {
        let event = self
            .get_event(event_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Event not found".to_string()))?;
        if event.organizer_id != organizer_id {
            return Err(AppError::Forbidden(
                "You do not have permission to delete this event".to_string(),
            ));
        }
        if event.published && !event.cancelled {
            return Err(AppError::BadRequest(
                "Published events must be cancelled before deletion".to_string(),
            ));
        }

        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM event_interests WHERE event_id = ?")
            .bind(event_id.to_string())
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM volunteer_requirements WHERE event_id = ?")
            .bind(event_id.to_string())
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM interactions WHERE event_id = ?")
            .bind(event_id.to_string())
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM registrations WHERE event_id = ?")
            .bind(event_id.to_string())
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM events WHERE id = ?")
            .bind(event_id.to_string())
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    /// Published, non-cancelled events with coordinates that have not yet
    /// ended; the candidate pool for nearby search.
    pub async fn eligible_events_with_coords(&self, now: DateTime<Utc>) -> AppResult<Vec<Event>> {
        let sql = format!(
            "SELECT {} FROM events
             WHERE published = 1 AND cancelled = 0
               AND latitude IS NOT NULL AND longitude IS NOT NULL
               AND end_time IS NOT NULL AND end_time > ?",
            EVENT_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(now.timestamp())
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_event).collect()
    }

    /// Published, non-cancelled events carrying an embedding; the candidate
    /// pool for semantic search.
    pub async fn events_with_embedding(&self) -> AppResult<Vec<Event>> {
        let sql = format!(
            "SELECT {} FROM events
             WHERE published = 1 AND cancelled = 0 AND embedding IS NOT NULL",
            EVENT_COLUMNS
        );
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        rows.iter().map(row_to_event).collect()
    }

    /// Every event joined with its categories and organizer trust signals,
    /// the full feature set shipped to the recommendation scorer.
    pub async fn events_with_signals(&self) -> AppResult<Vec<EventSignals>> {
        let sql = format!(
            "SELECT {}, o.host_score AS host_score, o.trust_score AS trust_score
             FROM events e JOIN organizers o ON o.id = e.organizer_id",
            EVENT_COLUMNS
                .split(", ")
                .map(|c| format!("e.{}", c))
                .collect::<Vec<_>>()
                .join(", ")
        );
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;

        let mut categories: HashMap<String, Vec<String>> = HashMap::new();
        let category_rows = sqlx::query(
            "SELECT ei.event_id, i.name FROM event_interests ei
             JOIN interests i ON i.id = ei.interest_id",
        )
        .fetch_all(&self.pool)
        .await?;
        for row in category_rows {
            categories
                .entry(row.get("event_id"))
                .or_default()
                .push(row.get("name"));
        }

        rows.iter()
            .map(|row| {
                let event = row_to_event(row)?;
                let cats = categories
                    .get(&event.id.to_string())
                    .cloned()
                    .unwrap_or_default();
                Ok(EventSignals {
                    categories: cats,
                    host_score: row.get("host_score"),
                    trust_score: row.get("trust_score"),
                    event,
                })
            })
            .collect()
    }

    /// Fetch events by id; callers re-order against their own id list, so no
    /// ordering is promised here.
    pub async fn events_by_ids(&self, ids: &[Uuid]) -> AppResult<Vec<Event>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let placeholders = vec!["?"; ids.len()].join(", ");
        let sql = format!(
            "SELECT {} FROM events WHERE id IN ({})",
            EVENT_COLUMNS, placeholders
        );
        let mut query = sqlx::query(&sql);
        for id in ids {
            query = query.bind(id.to_string());
        }
        let rows = query.fetch_all(&self.pool).await?;
        rows.iter().map(row_to_event).collect()
    }

    pub async fn volunteer_requirements(
        &self,
        event_id: Uuid,
    ) -> AppResult<Vec<VolunteerRequirement>> {
        let rows = sqlx::query(
            "SELECT role, other_role, required_count, skills, description
             FROM volunteer_requirements WHERE event_id = ? ORDER BY role",
        )
        .bind(event_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                let skills: Vec<String> = serde_json::from_str(&row.get::<String, _>("skills"))
                    .map_err(|e| {
                        AppError::Internal(format!("Corrupt requirement skills: {}", e))
                    })?;
                Ok(VolunteerRequirement {
                    role: row.get("role"),
                    other_role: row.get("other_role"),
                    required_count: row.get("required_count"),
                    skills,
                    description: row.get("description"),
                })
            })
            .collect()
    }

    // ---- interaction ledger ----

    /// Upserts the (user, event, type) ledger row and bumps the user's
    /// engagement score by the type weight, atomically. The weight applies
    /// once per call regardless of the resulting count.
    pub async fn record_interaction(
        &self,
        user_id: Uuid,
        event_id: Uuid,
        kind: InteractionType,
    ) -> AppResult<Interaction> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO interactions (user_id, event_id, type, cnt) VALUES (?, ?, ?, 1)
             ON CONFLICT(user_id, event_id, type) DO UPDATE SET cnt = cnt + 1",
        )
        .bind(user_id.to_string())
        .bind(event_id.to_string())
        .bind(kind.as_str())
        .execute(&mut *tx)
        .await?;

        let updated = sqlx::query(
            "UPDATE users SET engagement_score = engagement_score + ? WHERE id = ?",
        )
        .bind(kind.weight())
        .bind(user_id.to_string())
        .execute(&mut *tx)
        .await?;
        if updated.rows_affected() == 0 {
            return Err(AppError::NotFound("User not found".to_string()));
        }

        let cnt: i64 = sqlx::query(
            "SELECT cnt FROM interactions WHERE user_id = ? AND event_id = ? AND type = ?",
        )
        .bind(user_id.to_string())
        .bind(event_id.to_string())
        .bind(kind.as_str())
        .fetch_one(&mut *tx)
        .await?
        .get("cnt");

        tx.commit().await?;

        Ok(Interaction {
            user_id,
            event_id,
            kind,
            cnt,
        })
    }

    // ---- registrations ----

    pub async fn create_registration(&self, user_id: Uuid, event_id: Uuid) -> AppResult<()> {
        let existing = sqlx::query(
            "SELECT 1 FROM registrations WHERE user_id = ? AND event_id = ?",
        )
        .bind(user_id.to_string())
        .bind(event_id.to_string())
        .fetch_optional(&self.pool)
        .await?;
        if existing.is_some() {
            return Err(AppError::BadRequest(
                "User already registered for this event".to_string(),
            ));
        }

        sqlx::query(
            "INSERT INTO registrations (user_id, event_id, status, created)
             VALUES (?, ?, 'REGISTERED', ?)",
        )
        .bind(user_id.to_string())
        .bind(event_id.to_string())
        .bind(Utc::now().timestamp())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn mark_attended(&self, user_id: Uuid, event_id: Uuid) -> AppResult<()> {
        let updated = sqlx::query(
            "UPDATE registrations SET status = 'ATTENDED' WHERE user_id = ? AND event_id = ?",
        )
        .bind(user_id.to_string())
        .bind(event_id.to_string())
        .execute(&self.pool)
        .await?;
        if updated.rows_affected() == 0 {
            return Err(AppError::NotFound(
                "No registration found for this event".to_string(),
            ));
        }
        Ok(())
    }

    pub async fn registration_count(&self, event_id: Uuid) -> AppResult<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS cnt FROM registrations WHERE event_id = ?")
            .bind(event_id.to_string())
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get("cnt"))
    }

    // ---- sessions ----

    pub async fn create_session(&self, user_id: Uuid) -> AppResult<String> {
        let token = Uuid::new_v4().to_string();
        sqlx::query("INSERT INTO sessions (token, user_id, created) VALUES (?, ?, ?)")
            .bind(&token)
            .bind(user_id.to_string())
            .bind(Utc::now().timestamp())
            .execute(&self.pool)
            .await?;
        Ok(token)
    }

    pub async fn session_user(&self, token: &str) -> AppResult<Option<Uuid>> {
        let row = sqlx::query("SELECT user_id FROM sessions WHERE token = ?")
            .bind(token)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|row| parse_uuid(&row.get::<String, _>("user_id")))
            .transpose()
    }
}

fn parse_uuid(value: &str) -> AppResult<Uuid> {
    Uuid::parse_str(value)
        .map_err(|e| AppError::Internal(format!("Corrupt id in storage: {}", e)))
}

fn from_ts(secs: i64) -> AppResult<DateTime<Utc>> {
    DateTime::from_timestamp(secs, 0)
        .ok_or_else(|| AppError::Internal(format!("Corrupt timestamp in storage: {}", secs)))
}

fn row_to_event(row: &SqliteRow) -> AppResult<Event> {
    let embedding = row
        .get::<Option<Vec<u8>>, _>("embedding")
        .map(|blob| embedding::from_blob(&blob))
        .transpose()?;

    Ok(Event {
        id: parse_uuid(&row.get::<String, _>("id"))?,
        organizer_id: parse_uuid(&row.get::<String, _>("organizer_id"))?,
        title: row.get("title"),
        description: row.get("description"),
        city: row.get("city"),
        venue: row.get("venue"),
        latitude: row.get("latitude"),
        longitude: row.get("longitude"),
        start_time: row
            .get::<Option<i64>, _>("start_time")
            .map(from_ts)
            .transpose()?,
        end_time: row
            .get::<Option<i64>, _>("end_time")
            .map(from_ts)
            .transpose()?,
        capacity: row.get("capacity"),
        published: row.get("published"),
        published_at: row
            .get::<Option<i64>, _>("published_at")
            .map(from_ts)
            .transpose()?,
        cancelled: row.get("cancelled"),
        embedding,
    })
}

fn row_to_organizer(row: SqliteRow) -> AppResult<Organizer> {
    Ok(Organizer {
        id: parse_uuid(&row.get::<String, _>("id"))?,
        user_id: parse_uuid(&row.get::<String, _>("user_id"))?,
        verified: row.get("verified"),
        total_events: row.get("total_events"),
        host_score: row.get("host_score"),
        trust_score: row.get("trust_score"),
    })
}
