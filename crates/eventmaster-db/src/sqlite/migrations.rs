use rusqlite::Connection;
use tracing::info;

use crate::error::Result;

pub const LATEST_VERSION: i64 = 2;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |r| r.get(0),
    )?;

    if version > LATEST_VERSION {
        return Err(anyhow::anyhow!(
            "database schema v{version} is newer than this build supports (v{LATEST_VERSION})"
        )
        .into());
    }

    if version < 1 {
        info!("Running migration v1 (initial schema)");
        conn.execute_batch(
            "
            BEGIN;

            CREATE TABLE users (
                id              TEXT PRIMARY KEY,
                username        TEXT NOT NULL COLLATE NOCASE UNIQUE,
                email           TEXT NOT NULL COLLATE NOCASE UNIQUE,
                password_hash   TEXT NOT NULL,
                full_name       TEXT,
                role            TEXT NOT NULL DEFAULT 'user',
                created_at      TEXT NOT NULL
            );

            CREATE TABLE events (
                id                  TEXT PRIMARY KEY,
                title               TEXT NOT NULL,
                description         TEXT NOT NULL DEFAULT '',
                category            TEXT NOT NULL,
                location            TEXT NOT NULL,
                starts_at           TEXT NOT NULL,
                ends_at             TEXT,
                price_cents         INTEGER NOT NULL DEFAULT 0,
                capacity            INTEGER NOT NULL,
                current_attendees   INTEGER NOT NULL DEFAULT 0,
                image_url           TEXT,
                featured            INTEGER NOT NULL DEFAULT 0,
                status              TEXT NOT NULL DEFAULT 'published',
                created_at          TEXT NOT NULL,
                updated_at          TEXT NOT NULL
            );

            CREATE INDEX idx_events_starts_at ON events(starts_at);
            CREATE INDEX idx_events_category ON events(category);

            CREATE TABLE bookings (
                id                  TEXT PRIMARY KEY,
                reference           TEXT NOT NULL UNIQUE,
                user_id             TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                event_id            TEXT NOT NULL REFERENCES events(id) ON DELETE CASCADE,
                quantity            INTEGER NOT NULL,
                total_cents         INTEGER NOT NULL,
                status              TEXT NOT NULL DEFAULT 'pending',
                payment_status      TEXT NOT NULL DEFAULT 'unpaid',
                payment_intent_id   TEXT,
                created_at          TEXT NOT NULL,
                updated_at          TEXT NOT NULL
            );

            CREATE INDEX idx_bookings_event ON bookings(event_id, status);
            CREATE INDEX idx_bookings_user ON bookings(user_id);

            CREATE TABLE notifications (
                id          TEXT PRIMARY KEY,
                user_id     TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                kind        TEXT NOT NULL,
                title       TEXT NOT NULL,
                message     TEXT NOT NULL,
                is_read     INTEGER NOT NULL DEFAULT 0,
                created_at  TEXT NOT NULL
            );

            CREATE INDEX idx_notifications_user ON notifications(user_id, is_read);

            INSERT INTO schema_version (version) VALUES (1);

            COMMIT;
            ",
        )?;
    }

    if version < 2 {
        info!("Running migration v2 (contact messages)");
        conn.execute_batch(
            "
            BEGIN;

            CREATE TABLE contact_messages (
                id          TEXT PRIMARY KEY,
                name        TEXT NOT NULL,
                email       TEXT NOT NULL,
                subject     TEXT NOT NULL,
                message     TEXT NOT NULL,
                status      TEXT NOT NULL DEFAULT 'new',
                created_at  TEXT NOT NULL
            );

            INSERT INTO schema_version (version) VALUES (2);

            COMMIT;
            ",
        )?;
    }

    Ok(())
}
