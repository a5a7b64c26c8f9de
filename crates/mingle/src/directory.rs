#![forbid(unsafe_code)]

//! The attendee directory: persons, events, attendance, meetings and their
//! embeddings in one SQLite file under `.mingle/`.
//!
//! The connection sits behind a mutex and every call runs on the blocking
//! pool, so async callers never stall the runtime on disk I/O.

use std::io;
use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::Connection;
use tracing::debug;

use crate::db;
use crate::error::Result;
use crate::store::{ProfileStore, VectorIndex};
use crate::types::{
    Attendance, Event, Meeting, MetContact, OwnerType, Person, PersonStatus, ProfileInput,
    VectorHit,
};
use crate::utils::{join_token_for, new_id, now_millis};
use crate::vectors;

#[derive(Clone)]
pub struct Directory {
    conn: Arc<Mutex<Connection>>,
    dimensions: usize,
}

impl Directory {
    /// Create the schema if needed and open it.
    pub fn initialize(project_root: &Path, dimensions: usize) -> io::Result<Self> {
        db::initialize_database(project_root)?;
        Self::open(project_root, dimensions)
    }

    pub fn open(project_root: &Path, dimensions: usize) -> io::Result<Self> {
        let conn = db::open_database(project_root)?;
        Ok(Self::from_connection(conn, dimensions))
    }

    pub fn from_connection(conn: Connection, dimensions: usize) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
            dimensions,
        }
    }

    /// Embedding length every stored vector must have.
    pub const fn dimensions(&self) -> usize {
        self.dimensions
    }

    /// Run `f` against the connection on the blocking pool.
    pub async fn with_conn<T, F>(&self, f: F) -> io::Result<T>
    where
        F: FnOnce(&mut Connection) -> io::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn
                .lock()
                .map_err(|_| io::Error::other("directory connection lock poisoned"))?;
            f(&mut *guard)
        })
        .await
        .map_err(io::Error::other)?
    }

    /// Insert a person, or update the one already registered under the same
    /// e-mail. People without an e-mail always get a fresh record.
    pub async fn upsert_person(&self, profile: ProfileInput) -> io::Result<Person> {
        self.with_conn(move |conn| {
            let now = now_millis();
            if let Some(mut existing) = db::find_person_by_email(conn, &profile.email)? {
                apply_profile(&mut existing, profile);
                existing.status = PersonStatus::Active;
                db::update_person(conn, &existing, now)?;
                return Ok(existing);
            }

            let mut person = Person {
                id: new_id(),
                ..Person::default()
            };
            apply_profile(&mut person, profile);
            db::insert_person(conn, &person, now)?;
            Ok(person)
        })
        .await
    }

    /// Overwrite the editable fields of an existing person. `None` if unknown.
    pub async fn update_person(&self, person_id: &str, profile: ProfileInput) -> io::Result<Option<Person>> {
        let person_id = person_id.to_string();
        self.with_conn(move |conn| {
            let Some(mut person) = db::get_person(conn, &person_id)? else {
                return Ok(None);
            };
            apply_profile(&mut person, profile);
            db::update_person(conn, &person, now_millis())?;
            Ok(Some(person))
        })
        .await
    }

    pub async fn get_person(&self, person_id: &str) -> io::Result<Option<Person>> {
        let person_id = person_id.to_string();
        self.with_conn(move |conn| db::get_person(conn, &person_id)).await
    }

    /// Soft-deactivate or reactivate a person. `false` if the id is unknown.
    pub async fn set_status(&self, person_id: &str, status: PersonStatus) -> io::Result<bool> {
        let person_id = person_id.to_string();
        self.with_conn(move |conn| db::set_person_status(conn, &person_id, status, now_millis()))
            .await
    }

    pub async fn create_event(
        &self,
        name: &str,
        date: Option<String>,
        location: &str,
        capacity: Option<u32>,
    ) -> io::Result<Event> {
        let id = new_id();
        let created_at = now_millis();
        let event = Event {
            join_token: join_token_for(&id, name, created_at),
            id,
            name: name.to_string(),
            date,
            location: location.to_string(),
            capacity,
            created_at,
        };

        let stored = event.clone();
        self.with_conn(move |conn| db::insert_event(conn, &stored)).await?;
        debug!(event = %event.id, "created event");
        Ok(event)
    }

    pub async fn get_event(&self, event_id: &str) -> io::Result<Option<Event>> {
        let event_id = event_id.to_string();
        self.with_conn(move |conn| db::get_event(conn, &event_id)).await
    }

    pub async fn event_by_token(&self, token: &str) -> io::Result<Option<Event>> {
        let token = token.to_string();
        self.with_conn(move |conn| db::get_event_by_token(conn, &token)).await
    }

    /// Record attendance. `false` when the person was already checked in.
    pub async fn add_attendance(&self, attendance: Attendance) -> io::Result<bool> {
        self.with_conn(move |conn| db::insert_attendance(conn, &attendance)).await
    }

    pub async fn attendance_count(&self, person_id: &str, event_id: &str) -> io::Result<i64> {
        let (person_id, event_id) = (person_id.to_string(), event_id.to_string());
        self.with_conn(move |conn| db::attendance_count(conn, &person_id, &event_id))
            .await
    }

    pub async fn person_history(&self, person_id: &str) -> io::Result<Vec<Event>> {
        let person_id = person_id.to_string();
        self.with_conn(move |conn| db::events_for_person(conn, &person_id)).await
    }

    /// Store both directions of a meeting in one transaction.
    pub async fn save_meeting(&self, meeting: Meeting) -> io::Result<()> {
        self.with_conn(move |conn| db::upsert_meeting_pair(conn, &meeting)).await
    }

    pub async fn list_met(&self, person_id: &str) -> io::Result<Vec<MetContact>> {
        let person_id = person_id.to_string();
        self.with_conn(move |conn| db::list_met(conn, &person_id)).await
    }

    pub async fn store_embedding(
        &self,
        owner_type: OwnerType,
        owner_id: &str,
        embedding: Vec<f32>,
        text: String,
    ) -> io::Result<i64> {
        let owner_id = owner_id.to_string();
        let dims = self.dimensions;
        self.with_conn(move |conn| {
            vectors::store_embedding(conn, owner_type, &owner_id, &embedding, &text, dims, now_millis())
        })
        .await
    }

    /// Swap a person's profile embedding for a fresh one in a single transaction.
    pub async fn replace_profile_embedding(
        &self,
        person_id: &str,
        embedding: Vec<f32>,
        text: String,
    ) -> io::Result<()> {
        let person_id = person_id.to_string();
        let dims = self.dimensions;
        self.with_conn(move |conn| {
            let tx = conn.transaction().map_err(io::Error::other)?;
            let removed = vectors::delete_embeddings(&tx, OwnerType::Person, &person_id)?;
            vectors::store_embedding(
                &tx,
                OwnerType::Person,
                &person_id,
                &embedding,
                &text,
                dims,
                now_millis(),
            )?;
            tx.commit().map_err(io::Error::other)?;
            debug!(person = %person_id, removed, "replaced profile embedding");
            Ok(())
        })
        .await
    }

    pub async fn persons_without_profile_vector(&self) -> io::Result<Vec<Person>> {
        self.with_conn(|conn| db::persons_without_profile_vector(conn)).await
    }

    pub async fn count_embeddings(&self) -> io::Result<i64> {
        self.with_conn(|conn| vectors::count_embeddings(conn)).await
    }
}

fn apply_profile(person: &mut Person, profile: ProfileInput) {
    person.name = profile.name;
    person.email = profile.email;
    person.company = profile.company;
    person.job_title = profile.job_title;
    person.bio = profile.bio;
    person.interests = profile.interests;
}

#[async_trait]
impl VectorIndex for Directory {
    async fn search(
        &self,
        vector: &[f32],
        min_similarity: Option<f32>,
        limit: usize,
    ) -> Result<Vec<VectorHit>> {
        let vector = vector.to_vec();
        let hits = self
            .with_conn(move |conn| vectors::search_similar(conn, &vector, limit, min_similarity))
            .await?;
        Ok(hits)
    }
}

#[async_trait]
impl ProfileStore for Directory {
    async fn resolve_persons(&self, ids: &[String]) -> Result<Vec<Person>> {
        let ids = ids.to_vec();
        Ok(self.with_conn(move |conn| db::get_active_persons(conn, &ids)).await?)
    }

    async fn attendance_history(&self, person_id: &str) -> Result<Vec<Event>> {
        Ok(self.person_history(person_id).await?)
    }
}
