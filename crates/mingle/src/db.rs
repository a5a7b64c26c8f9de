#![forbid(unsafe_code)]

use std::path::{Path, PathBuf};

use rusqlite::{Connection, OptionalExtension, params};

use crate::types::{Attendance, Event, Meeting, MetContact, Person, PersonStatus};

pub const DATA_DIR: &str = ".mingle";
pub const DATABASE_FILENAME: &str = "directory.db";
pub const SCHEMA_SQL: &str = include_str!("db/schema.sql");

const PERSON_COLUMNS: &str = "id, name, email, company, job_title, bio, interests, status";
const EVENT_COLUMNS: &str = "id, name, date, location, capacity, join_token, created_at";

fn io_other(err: impl std::error::Error + Send + Sync + 'static) -> std::io::Error {
    std::io::Error::other(err)
}

pub fn data_dir(project_root: &Path) -> PathBuf {
    project_root.join(DATA_DIR)
}

pub fn database_path(project_root: &Path) -> PathBuf {
    data_dir(project_root).join(DATABASE_FILENAME)
}

pub fn initialize_database(project_root: &Path) -> std::io::Result<PathBuf> {
    let db_path = database_path(project_root);

    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let conn = Connection::open(&db_path).map_err(io_other)?;
    conn.execute_batch("PRAGMA foreign_keys = ON; PRAGMA journal_mode = WAL;")
        .map_err(io_other)?;
    conn.execute_batch(SCHEMA_SQL).map_err(io_other)?;
    Ok(db_path)
}

pub fn open_database(project_root: &Path) -> std::io::Result<Connection> {
    let db_path = database_path(project_root);
    if !db_path.exists() {
        return Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("no directory database at {}", db_path.display()),
        ));
    }
    let conn = Connection::open(&db_path).map_err(io_other)?;
    conn.execute_batch("PRAGMA foreign_keys = ON; PRAGMA journal_mode = WAL;")
        .map_err(io_other)?;
    Ok(conn)
}

pub fn insert_person(conn: &Connection, person: &Person, now: i64) -> std::io::Result<()> {
    conn.execute(
        "INSERT INTO persons (id, name, email, company, job_title, bio, interests, status, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        params![
            person.id,
            person.name,
            person.email,
            person.company,
            person.job_title,
            person.bio,
            person.interests,
            status_to_str(person.status),
            now,
            now,
        ],
    )
    .map_err(io_other)?;
    Ok(())
}

pub fn update_person(conn: &Connection, person: &Person, now: i64) -> std::io::Result<bool> {
    let changed = conn
        .execute(
            "UPDATE persons SET name = ?, email = ?, company = ?, job_title = ?, bio = ?,
                    interests = ?, status = ?, updated_at = ?
             WHERE id = ?",
            params![
                person.name,
                person.email,
                person.company,
                person.job_title,
                person.bio,
                person.interests,
                status_to_str(person.status),
                now,
                person.id,
            ],
        )
        .map_err(io_other)?;
    Ok(changed == 1)
}

pub fn set_person_status(
    conn: &Connection,
    person_id: &str,
    status: PersonStatus,
    now: i64,
) -> std::io::Result<bool> {
    let changed = conn
        .execute(
            "UPDATE persons SET status = ?, updated_at = ? WHERE id = ?",
            params![status_to_str(status), now, person_id],
        )
        .map_err(io_other)?;
    Ok(changed == 1)
}

pub fn get_person(conn: &Connection, person_id: &str) -> std::io::Result<Option<Person>> {
    conn.query_row(
        &format!("SELECT {PERSON_COLUMNS} FROM persons WHERE id = ?"),
        params![person_id],
        row_to_person,
    )
    .optional()
    .map_err(io_other)
}

pub fn find_person_by_email(conn: &Connection, email: &str) -> std::io::Result<Option<Person>> {
    if email.trim().is_empty() {
        return Ok(None);
    }
    conn.query_row(
        &format!("SELECT {PERSON_COLUMNS} FROM persons WHERE email = ? LIMIT 1"),
        params![email],
        row_to_person,
    )
    .optional()
    .map_err(io_other)
}

/// Resolve ids to active persons, skipping unknown, inactive and duplicate
/// ids, in input order.
pub fn get_active_persons(conn: &Connection, ids: &[String]) -> std::io::Result<Vec<Person>> {
    let mut stmt = conn
        .prepare(&format!(
            "SELECT {PERSON_COLUMNS} FROM persons WHERE id = ? AND status = ?"
        ))
        .map_err(io_other)?;
    let active = status_to_str(PersonStatus::Active);

    let mut seen = std::collections::HashSet::new();
    let mut results = Vec::new();
    for id in ids {
        if !seen.insert(id.as_str()) {
            continue;
        }
        if let Some(person) = stmt
            .query_row(params![id, active], row_to_person)
            .optional()
            .map_err(io_other)?
        {
            results.push(person);
        }
    }
    Ok(results)
}

/// Persons that have no `person` embedding yet.
pub fn persons_without_profile_vector(conn: &Connection) -> std::io::Result<Vec<Person>> {
    let mut stmt = conn
        .prepare(
            "SELECT p.id, p.name, p.email, p.company, p.job_title, p.bio, p.interests, p.status
             FROM persons p
             WHERE NOT EXISTS (
                 SELECT 1 FROM vectors v WHERE v.owner_type = 'person' AND v.owner_id = p.id
             )
             ORDER BY p.created_at ASC",
        )
        .map_err(io_other)?;
    let rows = stmt.query_map([], row_to_person).map_err(io_other)?;

    let mut results = Vec::new();
    for row in rows {
        results.push(row.map_err(io_other)?);
    }
    Ok(results)
}

pub fn insert_event(conn: &Connection, event: &Event) -> std::io::Result<()> {
    conn.execute(
        "INSERT INTO events (id, name, date, location, capacity, join_token, created_at)
         VALUES (?, ?, ?, ?, ?, ?, ?)",
        params![
            event.id,
            event.name,
            event.date,
            event.location,
            event.capacity,
            event.join_token,
            event.created_at,
        ],
    )
    .map_err(io_other)?;
    Ok(())
}

pub fn get_event(conn: &Connection, event_id: &str) -> std::io::Result<Option<Event>> {
    conn.query_row(
        &format!("SELECT {EVENT_COLUMNS} FROM events WHERE id = ?"),
        params![event_id],
        row_to_event,
    )
    .optional()
    .map_err(io_other)
}

pub fn get_event_by_token(conn: &Connection, token: &str) -> std::io::Result<Option<Event>> {
    conn.query_row(
        &format!("SELECT {EVENT_COLUMNS} FROM events WHERE join_token = ?"),
        params![token],
        row_to_event,
    )
    .optional()
    .map_err(io_other)
}

/// Record attendance. Returns `false` when the pair was already present.
pub fn insert_attendance(conn: &Connection, attendance: &Attendance) -> std::io::Result<bool> {
    let inserted = conn
        .execute(
            "INSERT INTO attendance (person_id, event_id, joined_at) VALUES (?, ?, ?)
             ON CONFLICT(person_id, event_id) DO NOTHING",
            params![
                attendance.person_id,
                attendance.event_id,
                attendance.joined_at
            ],
        )
        .map_err(io_other)?;
    Ok(inserted == 1)
}

pub fn attendance_count(conn: &Connection, person_id: &str, event_id: &str) -> std::io::Result<i64> {
    conn.query_row(
        "SELECT COUNT(*) FROM attendance WHERE person_id = ? AND event_id = ?",
        params![person_id, event_id],
        |row| row.get(0),
    )
    .map_err(io_other)
}

/// Events a person attended, most recent join first.
pub fn events_for_person(conn: &Connection, person_id: &str) -> std::io::Result<Vec<Event>> {
    let mut stmt = conn
        .prepare(
            "SELECT e.id, e.name, e.date, e.location, e.capacity, e.join_token, e.created_at
             FROM attendance a
             JOIN events e ON e.id = a.event_id
             WHERE a.person_id = ?
             ORDER BY a.joined_at DESC",
        )
        .map_err(io_other)?;
    let rows = stmt
        .query_map(params![person_id], row_to_event)
        .map_err(io_other)?;

    let mut results = Vec::new();
    for row in rows {
        results.push(row.map_err(io_other)?);
    }
    Ok(results)
}

/// Write both directions of a meeting in one transaction. Re-recording the
/// same pair overwrites note, time and event on both edges.
pub fn upsert_meeting_pair(conn: &mut Connection, meeting: &Meeting) -> std::io::Result<()> {
    let tx = conn.transaction().map_err(io_other)?;
    {
        let mut stmt = tx
            .prepare(
                "INSERT INTO meetings (source, target, note, at, event_id)
                 VALUES (?, ?, ?, ?, ?)
                 ON CONFLICT(source, target) DO UPDATE SET
                    note = excluded.note,
                    at = excluded.at,
                    event_id = excluded.event_id",
            )
            .map_err(io_other)?;

        for edge in [meeting.clone(), meeting.reversed()] {
            stmt.execute(params![
                edge.from,
                edge.to,
                edge.note,
                edge.at,
                edge.event_id,
            ])
            .map_err(io_other)?;
        }
    }
    tx.commit().map_err(io_other)
}

pub fn get_meeting(conn: &Connection, from: &str, to: &str) -> std::io::Result<Option<Meeting>> {
    conn.query_row(
        "SELECT source, target, note, at, event_id FROM meetings WHERE source = ? AND target = ?",
        params![from, to],
        |row| {
            Ok(Meeting {
                from: row.get(0)?,
                to: row.get(1)?,
                note: row.get(2)?,
                at: row.get(3)?,
                event_id: row.get(4)?,
            })
        },
    )
    .optional()
    .map_err(io_other)
}

/// Everyone `person_id` has met, newest meeting first.
pub fn list_met(conn: &Connection, person_id: &str) -> std::io::Result<Vec<MetContact>> {
    let mut stmt = conn
        .prepare(
            "SELECT p.id, p.name, p.email, p.company, p.job_title, p.bio, p.interests, p.status,
                    m.note, m.at, m.event_id
             FROM meetings m
             JOIN persons p ON p.id = m.target
             WHERE m.source = ?
             ORDER BY m.at DESC",
        )
        .map_err(io_other)?;
    let rows = stmt
        .query_map(params![person_id], |row| {
            Ok(MetContact {
                person: row_to_person(row)?,
                note: row.get(8)?,
                met_at: row.get(9)?,
                event_id: row.get(10)?,
            })
        })
        .map_err(io_other)?;

    let mut results = Vec::new();
    for row in rows {
        results.push(row.map_err(io_other)?);
    }
    Ok(results)
}

const fn status_to_str(status: PersonStatus) -> &'static str {
    match status {
        PersonStatus::Active => "active",
        PersonStatus::Inactive => "inactive",
    }
}

fn parse_status(raw: &str) -> PersonStatus {
    serde_json::from_str::<PersonStatus>(&format!("\"{raw}\"")).unwrap_or_default()
}

fn row_to_person(row: &rusqlite::Row<'_>) -> rusqlite::Result<Person> {
    let status_raw: String = row.get(7)?;
    Ok(Person {
        id: row.get(0)?,
        name: row.get(1)?,
        email: row.get(2)?,
        company: row.get(3)?,
        job_title: row.get(4)?,
        bio: row.get(5)?,
        interests: row.get(6)?,
        status: parse_status(&status_raw),
    })
}

fn row_to_event(row: &rusqlite::Row<'_>) -> rusqlite::Result<Event> {
    Ok(Event {
        id: row.get(0)?,
        name: row.get(1)?,
        date: row.get(2)?,
        location: row.get(3)?,
        capacity: row.get(4)?,
        join_token: row.get(5)?,
        created_at: row.get(6)?,
    })
}
