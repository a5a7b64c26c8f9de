#![forbid(unsafe_code)]

//! Writes that feed retrieval: event check-in, meetings, profile edits and
//! vector backfill.
//!
//! SQLite is the source of truth. Embedding and graph mirroring are best
//! effort: a failure there is logged and the directory write still stands.

use std::sync::Arc;

use tracing::{info, instrument, warn};

use crate::directory::Directory;
use crate::error::{EngineError, Result};
use crate::graph::GraphWriter;
use crate::providers::EmbeddingProvider;
use crate::types::{Attendance, Event, Meeting, OwnerType, Person, ProfileInput};
use crate::utils::now_millis;

/// Profile text that gets embedded: name, role, bio and interests joined by `. `.
pub fn profile_text(person: &Person) -> String {
    let role = match (person.job_title.is_empty(), person.company.is_empty()) {
        (false, false) => format!("{} at {}", person.job_title, person.company),
        (false, true) => person.job_title.clone(),
        (true, false) => person.company.clone(),
        (true, true) => String::new(),
    };
    let interests = if person.interests.is_empty() {
        String::new()
    } else {
        format!("Interests: {}", person.interests)
    };

    [person.name.clone(), role, person.bio.clone(), interests]
        .into_iter()
        .filter(|part| !part.trim().is_empty())
        .collect::<Vec<_>>()
        .join(". ")
}

pub fn meeting_text(a: &Person, b: &Person, note: &str) -> String {
    format!(
        "Meeting between {} ({} at {}) and {} ({} at {}): {}",
        a.name, a.job_title, a.company, b.name, b.job_title, b.company, note
    )
}

#[derive(Debug, Clone)]
pub struct JoinOutcome {
    pub person: Person,
    pub event: Event,
    /// `false` when the person had already joined this event.
    pub newly_joined: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BackfillReport {
    pub embedded: usize,
    pub skipped: usize,
    pub failed: usize,
}

pub struct Ingestor {
    directory: Directory,
    embedder: Arc<dyn EmbeddingProvider>,
    graph: Option<Arc<dyn GraphWriter>>,
}

impl Ingestor {
    pub fn new(
        directory: Directory,
        embedder: Arc<dyn EmbeddingProvider>,
        graph: Option<Arc<dyn GraphWriter>>,
    ) -> Self {
        Self {
            directory,
            embedder,
            graph,
        }
    }

    pub fn directory(&self) -> &Directory {
        &self.directory
    }

    pub async fn create_event(
        &self,
        name: &str,
        date: Option<String>,
        location: &str,
        capacity: Option<u32>,
    ) -> Result<Event> {
        if name.trim().is_empty() {
            return Err(EngineError::InvalidInput("event name is required".to_string()));
        }
        Ok(self
            .directory
            .create_event(name.trim(), date, location, capacity)
            .await?)
    }

    /// Check a person into the event behind `token`. Joining twice keeps a
    /// single attendance row.
    #[instrument(skip(self, profile), fields(name = %profile.name))]
    pub async fn join_event(&self, token: &str, profile: ProfileInput) -> Result<JoinOutcome> {
        if token.trim().is_empty() || profile.name.trim().is_empty() {
            return Err(EngineError::InvalidInput(
                "token and name are required".to_string(),
            ));
        }

        let event = self
            .directory
            .event_by_token(token.trim())
            .await?
            .ok_or_else(|| EngineError::NotFound("invalid token or event not found".to_string()))?;

        let person = self.directory.upsert_person(profile).await?;
        let joined_at = now_millis();
        let newly_joined = self
            .directory
            .add_attendance(Attendance {
                person_id: person.id.clone(),
                event_id: event.id.clone(),
                joined_at,
            })
            .await?;

        self.embed_profile(&person).await;

        if let Some(graph) = &self.graph {
            if let Err(err) = graph.upsert_attendance(&person, &event, joined_at).await {
                warn!(error = %err, person = %person.id, "failed to mirror attendance into graph");
            }
        }

        info!(person = %person.id, event = %event.id, newly_joined, "joined event");
        Ok(JoinOutcome {
            person,
            event,
            newly_joined,
        })
    }

    /// Record that `from` and `to` met. Both directions carry the same note
    /// and timestamp.
    #[instrument(skip(self, note))]
    pub async fn record_meeting(
        &self,
        from: &str,
        to: &str,
        note: &str,
        event_id: Option<String>,
    ) -> Result<Meeting> {
        if from.is_empty() || to.is_empty() {
            return Err(EngineError::InvalidInput(
                "both participants are required".to_string(),
            ));
        }
        if from == to {
            return Err(EngineError::InvalidInput(
                "cannot create meeting with yourself".to_string(),
            ));
        }

        let a = self.require_person(from).await?;
        let b = self.require_person(to).await?;

        let meeting = Meeting {
            from: a.id.clone(),
            to: b.id.clone(),
            note: note.trim().to_string(),
            at: now_millis(),
            event_id,
        };
        self.directory.save_meeting(meeting.clone()).await?;

        if !meeting.note.is_empty() {
            let text = meeting_text(&a, &b, &meeting.note);
            match self.embedder.embed(&text).await {
                Ok(vector) => {
                    for owner in [&a.id, &b.id] {
                        if let Err(err) = self
                            .directory
                            .store_embedding(OwnerType::Note, owner, vector.clone(), text.clone())
                            .await
                        {
                            warn!(error = %err, person = %owner, "failed to store meeting embedding");
                        }
                    }
                }
                Err(err) => warn!(error = %err, "failed to embed meeting note"),
            }
        }

        if let Some(graph) = &self.graph {
            if let Err(err) = graph.record_meeting(&meeting).await {
                warn!(error = %err, "failed to mirror meeting into graph");
            }
        }

        Ok(meeting)
    }

    /// Replace the editable fields and the profile embedding.
    pub async fn update_profile(&self, person_id: &str, profile: ProfileInput) -> Result<Person> {
        if profile.name.trim().is_empty() {
            return Err(EngineError::InvalidInput("name is required".to_string()));
        }
        let person = self
            .directory
            .update_person(person_id, profile)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("person {person_id}")))?;

        self.embed_profile(&person).await;
        Ok(person)
    }

    /// Embed every person that has no profile vector yet. Persons with
    /// nothing beyond a name are skipped. `progress` is called once per person.
    pub async fn backfill_vectors(&self, mut progress: impl FnMut(&Person)) -> Result<BackfillReport> {
        let pending = self.directory.persons_without_profile_vector().await?;
        let mut report = BackfillReport::default();

        for person in &pending {
            let text = profile_text(person);
            if text.trim().is_empty() || text == person.name {
                report.skipped += 1;
            } else {
                match self.embed_and_store(person, text).await {
                    Ok(()) => report.embedded += 1,
                    Err(err) => {
                        warn!(error = %err, person = %person.id, "backfill failed for person");
                        report.failed += 1;
                    }
                }
            }
            progress(person);
        }

        info!(
            embedded = report.embedded,
            skipped = report.skipped,
            failed = report.failed,
            "vector backfill complete"
        );
        Ok(report)
    }

    async fn require_person(&self, person_id: &str) -> Result<Person> {
        self.directory
            .get_person(person_id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("person {person_id}")))
    }

    async fn embed_profile(&self, person: &Person) {
        let text = profile_text(person);
        if text.trim().is_empty() {
            return;
        }
        if let Err(err) = self.embed_and_store(person, text).await {
            warn!(error = %err, person = %person.id, "failed to embed profile");
        }
    }

    async fn embed_and_store(&self, person: &Person, text: String) -> Result<()> {
        let vector = self.embedder.embed(&text).await?;
        self.directory
            .replace_profile_embedding(&person.id, vector, text)
            .await?;
        Ok(())
    }
}
