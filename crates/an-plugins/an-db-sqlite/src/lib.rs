//! # an-db-sqlite Implementation
//!
//! Maps the annotation tables onto `an-core` models. One [`SqliteStore`] serves
//! as the annotation store, the user directory and the notification inbox.

use an_core::{
    ActorKey, ActorKind, AnnotationStore, CollaboratorRecord, Comment, NewComment, NewThread,
    NotificationInbox, Tag, Thread, UserActor, UserDirectory,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use std::str::FromStr;
use tracing::{debug, info};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS threads (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    page_url        TEXT    NOT NULL,
    selector        TEXT    NOT NULL,
    is_closed       INTEGER NOT NULL DEFAULT 0,
    created_by_kind TEXT    NOT NULL,
    created_by_id   INTEGER NOT NULL,
    created_at      TEXT    NOT NULL,
    last_activity   TEXT    NOT NULL
);
CREATE INDEX IF NOT EXISTS threads_page_url ON threads (page_url);

CREATE TABLE IF NOT EXISTS comments (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    thread_id   INTEGER NOT NULL,
    parent_id   INTEGER,
    author_kind TEXT    NOT NULL,
    author_id   INTEGER NOT NULL,
    body        TEXT    NOT NULL,
    created_at  TEXT    NOT NULL,
    is_deleted  INTEGER NOT NULL DEFAULT 0
);
CREATE INDEX IF NOT EXISTS comments_thread ON comments (thread_id);

CREATE TABLE IF NOT EXISTS tags (
    comment_id  INTEGER NOT NULL,
    target_kind TEXT    NOT NULL,
    target_id   INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS tags_target ON tags (target_kind, target_id);

CREATE TABLE IF NOT EXISTS collaborators (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    email_encrypted TEXT    NOT NULL UNIQUE,
    display_name    TEXT    NOT NULL,
    last_activity   TEXT    NOT NULL,
    created_at      TEXT    NOT NULL
);

CREATE TABLE IF NOT EXISTS users (
    id           INTEGER PRIMARY KEY,
    display_name TEXT    NOT NULL,
    email        TEXT    NOT NULL,
    login        TEXT    NOT NULL UNIQUE,
    is_admin     INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS notifications (
    id         INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id    INTEGER NOT NULL,
    note       TEXT    NOT NULL,
    created_at TEXT    NOT NULL
);
"#;

const THREAD_COLUMNS: &str =
    "id, page_url, selector, is_closed, created_by_kind, created_by_id, created_at, last_activity";
const COMMENT_COLUMNS: &str = "id, thread_id, parent_id, author_kind, author_id, body, created_at, is_deleted";
const COLLABORATOR_COLUMNS: &str = "id, email_encrypted, display_name, last_activity, created_at";

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Connects to `url` (e.g. `sqlite:annotator.db` or `sqlite::memory:`),
    /// creating the database file and schema when missing.
    pub async fn new(url: &str) -> anyhow::Result<Self> {
        let in_memory = url.contains(":memory:");
        let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
        // Every pooled connection to `:memory:` would be its own empty database.
        let pool = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .connect_with(options)
                .await?
        } else {
            SqlitePoolOptions::new().max_connections(5).connect_with(options).await?
        };
        sqlx::raw_sql(SCHEMA).execute(&pool).await?;
        info!(url, "sqlite store ready");
        Ok(Self { pool })
    }

    /// Adds or replaces a registered account.
    pub async fn upsert_user(&self, user: &UserActor) -> anyhow::Result<()> {
        sqlx::query(
            "INSERT INTO users (id, display_name, email, login, is_admin) VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET display_name = excluded.display_name,
                 email = excluded.email, login = excluded.login, is_admin = excluded.is_admin",
        )
        .bind(user.id)
        .bind(&user.display_name)
        .bind(&user.email)
        .bind(&user.login)
        .bind(user.is_admin)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

fn kind_from_db(value: &str) -> anyhow::Result<ActorKind> {
    match value {
        "user" => Ok(ActorKind::User),
        "collaborator" => Ok(ActorKind::Collaborator),
        other => Err(anyhow::anyhow!("unknown actor kind {other:?}")),
    }
}

fn actor_key(row: &SqliteRow, kind_col: &str, id_col: &str) -> anyhow::Result<ActorKey> {
    Ok(ActorKey {
        kind: kind_from_db(&row.get::<String, _>(kind_col))?,
        id: row.get(id_col),
    })
}

fn thread_from_row(row: &SqliteRow) -> anyhow::Result<Thread> {
    Ok(Thread {
        id: row.get("id"),
        page_url: row.get("page_url"),
        selector: row.get("selector"),
        is_closed: row.get("is_closed"),
        created_by: actor_key(row, "created_by_kind", "created_by_id")?,
        created_at: row.get("created_at"),
        last_activity: row.get("last_activity"),
    })
}

fn comment_from_row(row: &SqliteRow) -> anyhow::Result<Comment> {
    Ok(Comment {
        id: row.get("id"),
        thread_id: row.get("thread_id"),
        parent_id: row.get("parent_id"),
        author: actor_key(row, "author_kind", "author_id")?,
        body: row.get("body"),
        created_at: row.get("created_at"),
        is_deleted: row.get("is_deleted"),
    })
}

fn collaborator_from_row(row: &SqliteRow) -> CollaboratorRecord {
    CollaboratorRecord {
        id: row.get("id"),
        email_encrypted: row.get("email_encrypted"),
        display_name: row.get("display_name"),
        last_activity: row.get("last_activity"),
        created_at: row.get("created_at"),
    }
}

fn user_from_row(row: &SqliteRow) -> UserActor {
    UserActor {
        id: row.get("id"),
        display_name: row.get("display_name"),
        email: row.get("email"),
        login: row.get("login"),
        is_admin: row.get("is_admin"),
    }
}

/// `%fragment%` for a case-insensitive `LIKE ... ESCAPE '\'`.
fn contains_pattern(fragment: &str) -> String {
    let mut out = String::from("%");
    for ch in fragment.to_lowercase().chars() {
        if matches!(ch, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(ch);
    }
    out.push('%');
    out
}

#[async_trait]
impl AnnotationStore for SqliteStore {
    async fn threads_for_url(&self, page_url: &str) -> anyhow::Result<Vec<Thread>> {
        let rows = sqlx::query(&format!(
            "SELECT {THREAD_COLUMNS} FROM threads WHERE page_url = ? ORDER BY id"
        ))
        .bind(page_url)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(thread_from_row).collect()
    }

    async fn get_thread(&self, id: i64) -> anyhow::Result<Option<Thread>> {
        let row = sqlx::query(&format!("SELECT {THREAD_COLUMNS} FROM threads WHERE id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(thread_from_row).transpose()
    }

    async fn insert_thread(&self, thread: NewThread) -> anyhow::Result<Thread> {
        let now = Utc::now();
        let id = sqlx::query(
            "INSERT INTO threads (page_url, selector, is_closed, created_by_kind, created_by_id, created_at, last_activity)
             VALUES (?, ?, 0, ?, ?, ?, ?)",
        )
        .bind(&thread.page_url)
        .bind(&thread.selector)
        .bind(thread.created_by.kind.as_str())
        .bind(thread.created_by.id)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?
        .last_insert_rowid();
        Ok(Thread {
            id,
            page_url: thread.page_url,
            selector: thread.selector,
            is_closed: false,
            created_by: thread.created_by,
            created_at: now,
            last_activity: now,
        })
    }

    async fn close_thread(&self, id: i64) -> anyhow::Result<()> {
        sqlx::query("UPDATE threads SET is_closed = 1 WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn delete_thread_cascade(&self, id: i64) -> anyhow::Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM tags WHERE comment_id IN (SELECT id FROM comments WHERE thread_id = ?)")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM comments WHERE thread_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM threads WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn touch_thread(&self, id: i64, at: DateTime<Utc>) -> anyhow::Result<()> {
        sqlx::query("UPDATE threads SET last_activity = ? WHERE id = ?")
            .bind(at)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn comments_for_thread(&self, thread_id: i64) -> anyhow::Result<Vec<Comment>> {
        let rows = sqlx::query(&format!(
            "SELECT {COMMENT_COLUMNS} FROM comments
             WHERE thread_id = ? AND is_deleted = 0 ORDER BY created_at ASC, id ASC"
        ))
        .bind(thread_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(comment_from_row).collect()
    }

    async fn latest_comment(&self, thread_id: i64) -> anyhow::Result<Option<Comment>> {
        let row = sqlx::query(&format!(
            "SELECT {COMMENT_COLUMNS} FROM comments
             WHERE thread_id = ? AND is_deleted = 0 ORDER BY created_at DESC, id DESC LIMIT 1"
        ))
        .bind(thread_id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(comment_from_row).transpose()
    }

    async fn insert_comment(&self, comment: NewComment) -> anyhow::Result<Comment> {
        let now = Utc::now();
        let id = sqlx::query(
            "INSERT INTO comments (thread_id, parent_id, author_kind, author_id, body, created_at, is_deleted)
             VALUES (?, ?, ?, ?, ?, ?, 0)",
        )
        .bind(comment.thread_id)
        .bind(comment.parent_id)
        .bind(comment.author.kind.as_str())
        .bind(comment.author.id)
        .bind(&comment.body)
        .bind(now)
        .execute(&self.pool)
        .await?
        .last_insert_rowid();
        Ok(Comment {
            id,
            thread_id: comment.thread_id,
            parent_id: comment.parent_id,
            author: comment.author,
            body: comment.body,
            created_at: now,
            is_deleted: false,
        })
    }

    async fn insert_tag(&self, tag: Tag) -> anyhow::Result<()> {
        sqlx::query("INSERT INTO tags (comment_id, target_kind, target_id) VALUES (?, ?, ?)")
            .bind(tag.comment_id)
            .bind(tag.target.kind.as_str())
            .bind(tag.target.id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn tags_for_comment(&self, comment_id: i64) -> anyhow::Result<Vec<ActorKey>> {
        let rows = sqlx::query("SELECT target_kind, target_id FROM tags WHERE comment_id = ? ORDER BY rowid")
            .bind(comment_id)
            .fetch_all(&self.pool)
            .await?;
        rows.iter()
            .map(|row| actor_key(row, "target_kind", "target_id"))
            .collect()
    }

    async fn collaborator_thread_ids(&self, collaborator_id: i64) -> anyhow::Result<Vec<i64>> {
        let kind = ActorKind::Collaborator.as_str();
        let rows = sqlx::query(
            "SELECT id FROM threads WHERE created_by_kind = ? AND created_by_id = ?
             UNION
             SELECT c.thread_id FROM tags t JOIN comments c ON c.id = t.comment_id
             WHERE t.target_kind = ? AND t.target_id = ?
             ORDER BY 1",
        )
        .bind(kind)
        .bind(collaborator_id)
        .bind(kind)
        .bind(collaborator_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(|row| row.get::<i64, _>(0)).collect())
    }

    async fn get_collaborator(&self, id: i64) -> anyhow::Result<Option<CollaboratorRecord>> {
        let row = sqlx::query(&format!("SELECT {COLLABORATOR_COLUMNS} FROM collaborators WHERE id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(collaborator_from_row))
    }

    async fn find_collaborator_by_ciphertext(
        &self,
        email_encrypted: &str,
    ) -> anyhow::Result<Option<CollaboratorRecord>> {
        let row = sqlx::query(&format!(
            "SELECT {COLLABORATOR_COLUMNS} FROM collaborators WHERE email_encrypted = ?"
        ))
        .bind(email_encrypted)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.as_ref().map(collaborator_from_row))
    }

    async fn list_collaborators(&self, limit: Option<usize>) -> anyhow::Result<Vec<CollaboratorRecord>> {
        // SQLite treats a negative LIMIT as "no limit".
        let limit = limit.map_or(-1, |l| i64::try_from(l).unwrap_or(i64::MAX));
        let rows = sqlx::query(&format!(
            "SELECT {COLLABORATOR_COLUMNS} FROM collaborators ORDER BY created_at DESC, id DESC LIMIT ?"
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(collaborator_from_row).collect())
    }

    async fn insert_collaborator(
        &self,
        email_encrypted: &str,
        display_name: &str,
    ) -> anyhow::Result<CollaboratorRecord> {
        let now = Utc::now();
        let id = sqlx::query(
            "INSERT INTO collaborators (email_encrypted, display_name, last_activity, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(email_encrypted)
        .bind(display_name)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?
        .last_insert_rowid();
        debug!(collaborator_id = id, "collaborator stored");
        Ok(CollaboratorRecord {
            id,
            email_encrypted: email_encrypted.to_string(),
            display_name: display_name.to_string(),
            last_activity: now,
            created_at: now,
        })
    }

    async fn touch_collaborator(&self, id: i64, at: DateTime<Utc>) -> anyhow::Result<()> {
        sqlx::query("UPDATE collaborators SET last_activity = ? WHERE id = ?")
            .bind(at)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn purge_threads_inactive_since(&self, cutoff: DateTime<Utc>) -> anyhow::Result<u64> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "DELETE FROM tags WHERE comment_id IN (
                 SELECT c.id FROM comments c JOIN threads t ON t.id = c.thread_id WHERE t.last_activity < ?)",
        )
        .bind(cutoff)
        .execute(&mut *tx)
        .await?;
        sqlx::query("DELETE FROM comments WHERE thread_id IN (SELECT id FROM threads WHERE last_activity < ?)")
            .bind(cutoff)
            .execute(&mut *tx)
            .await?;
        let removed = sqlx::query("DELETE FROM threads WHERE last_activity < ?")
            .bind(cutoff)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        tx.commit().await?;
        Ok(removed)
    }

    async fn purge_collaborators_inactive_since(&self, cutoff: DateTime<Utc>) -> anyhow::Result<u64> {
        let removed = sqlx::query("DELETE FROM collaborators WHERE last_activity < ?")
            .bind(cutoff)
            .execute(&self.pool)
            .await?
            .rows_affected();
        Ok(removed)
    }
}

#[async_trait]
impl UserDirectory for SqliteStore {
    async fn get_user(&self, id: i64) -> anyhow::Result<Option<UserActor>> {
        let row = sqlx::query("SELECT id, display_name, email, login, is_admin FROM users WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(user_from_row))
    }

    async fn find_by_email(&self, email: &str) -> anyhow::Result<Option<UserActor>> {
        let row = sqlx::query(
            "SELECT id, display_name, email, login, is_admin FROM users WHERE lower(email) = lower(?) LIMIT 1",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.as_ref().map(user_from_row))
    }

    async fn find_by_login(&self, login: &str) -> anyhow::Result<Option<UserActor>> {
        let row = sqlx::query(
            "SELECT id, display_name, email, login, is_admin FROM users WHERE lower(login) = lower(?) LIMIT 1",
        )
        .bind(login)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.as_ref().map(user_from_row))
    }

    async fn search_display_name(&self, fragment: &str) -> anyhow::Result<Vec<UserActor>> {
        let rows = sqlx::query(
            "SELECT id, display_name, email, login, is_admin FROM users
             WHERE lower(display_name) LIKE ? ESCAPE '\\' ORDER BY id",
        )
        .bind(contains_pattern(fragment))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(user_from_row).collect())
    }

    async fn search(&self, term: &str, limit: usize) -> anyhow::Result<Vec<UserActor>> {
        let pattern = contains_pattern(term);
        let rows = sqlx::query(
            "SELECT id, display_name, email, login, is_admin FROM users
             WHERE lower(email) LIKE ?1 ESCAPE '\\'
                OR lower(login) LIKE ?1 ESCAPE '\\'
                OR lower(display_name) LIKE ?1 ESCAPE '\\'
             ORDER BY id LIMIT ?2",
        )
        .bind(pattern)
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(user_from_row).collect())
    }
}

#[async_trait]
impl NotificationInbox for SqliteStore {
    async fn push(&self, user_id: i64, note: &str) -> anyhow::Result<()> {
        sqlx::query("INSERT INTO notifications (user_id, note, created_at) VALUES (?, ?, ?)")
            .bind(user_id)
            .bind(note)
            .bind(Utc::now())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn drain(&self, user_id: i64) -> anyhow::Result<Vec<String>> {
        let mut tx = self.pool.begin().await?;

        let notes = sqlx::query("SELECT note FROM notifications WHERE user_id = ? ORDER BY id")
            .bind(user_id)
            .fetch_all(&mut *tx)
            .await?
            .iter()
            .map(|row| row.get::<String, _>("note"))
            .collect();
        sqlx::query("DELETE FROM notifications WHERE user_id = ?")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(notes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    async fn store() -> SqliteStore {
        SqliteStore::new("sqlite::memory:").await.unwrap()
    }

    fn new_thread(url: &str, by: ActorKey) -> NewThread {
        NewThread {
            page_url: url.into(),
            selector: "#intro".into(),
            created_by: by,
        }
    }

    fn new_comment(thread_id: i64, author: ActorKey, body: &str) -> NewComment {
        NewComment {
            thread_id,
            parent_id: None,
            author,
            body: body.into(),
        }
    }

    #[tokio::test]
    async fn threads_round_trip_by_url() {
        let store = store().await;
        let a = store.insert_thread(new_thread("https://x.org/a", ActorKey::user(1))).await.unwrap();
        store.insert_thread(new_thread("https://x.org/b", ActorKey::user(1))).await.unwrap();
        let c = store
            .insert_thread(new_thread("https://x.org/a", ActorKey::collaborator(4)))
            .await
            .unwrap();

        let found = store.threads_for_url("https://x.org/a").await.unwrap();
        assert_eq!(found.iter().map(|t| t.id).collect::<Vec<_>>(), vec![a.id, c.id]);
        assert_eq!(found[1].created_by, ActorKey::collaborator(4));

        store.close_thread(a.id).await.unwrap();
        assert!(store.get_thread(a.id).await.unwrap().unwrap().is_closed);
    }

    #[tokio::test]
    async fn comments_are_ordered_and_cascade_on_delete() {
        let store = store().await;
        let thread = store.insert_thread(new_thread("https://x.org/a", ActorKey::user(1))).await.unwrap();
        let first = store
            .insert_comment(new_comment(thread.id, ActorKey::user(1), "one"))
            .await
            .unwrap();
        let second = store
            .insert_comment(new_comment(thread.id, ActorKey::collaborator(2), "two"))
            .await
            .unwrap();
        store
            .insert_tag(Tag {
                comment_id: second.id,
                target: ActorKey::user(1),
            })
            .await
            .unwrap();

        let comments = store.comments_for_thread(thread.id).await.unwrap();
        assert_eq!(comments.iter().map(|c| c.id).collect::<Vec<_>>(), vec![first.id, second.id]);
        assert_eq!(store.latest_comment(thread.id).await.unwrap().unwrap().id, second.id);
        assert_eq!(store.tags_for_comment(second.id).await.unwrap(), vec![ActorKey::user(1)]);

        store.delete_thread_cascade(thread.id).await.unwrap();
        assert!(store.get_thread(thread.id).await.unwrap().is_none());
        assert!(store.comments_for_thread(thread.id).await.unwrap().is_empty());
        assert!(store.tags_for_comment(second.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn collaborator_grants_cover_created_and_tagged_threads() {
        let store = store().await;
        let own = store
            .insert_thread(new_thread("https://x.org/a", ActorKey::collaborator(3)))
            .await
            .unwrap();
        let tagged = store.insert_thread(new_thread("https://x.org/a", ActorKey::user(1))).await.unwrap();
        store.insert_thread(new_thread("https://x.org/a", ActorKey::user(1))).await.unwrap();
        let comment = store
            .insert_comment(new_comment(tagged.id, ActorKey::user(1), "hi tag://c3"))
            .await
            .unwrap();
        store
            .insert_tag(Tag {
                comment_id: comment.id,
                target: ActorKey::collaborator(3),
            })
            .await
            .unwrap();
        // User 3 is somebody else entirely.
        store
            .insert_thread(new_thread("https://x.org/a", ActorKey::user(3)))
            .await
            .unwrap();

        assert_eq!(store.collaborator_thread_ids(3).await.unwrap(), vec![own.id, tagged.id]);
    }

    #[tokio::test]
    async fn collaborators_are_listed_newest_first() {
        let store = store().await;
        let a = store.insert_collaborator("enc-a", "a").await.unwrap();
        let b = store.insert_collaborator("enc-b", "b").await.unwrap();
        let all = store.list_collaborators(None).await.unwrap();
        assert_eq!(all.iter().map(|c| c.id).collect::<Vec<_>>(), vec![b.id, a.id]);
        assert_eq!(store.list_collaborators(Some(1)).await.unwrap().len(), 1);
        assert_eq!(
            store.find_collaborator_by_ciphertext("enc-a").await.unwrap().unwrap().id,
            a.id
        );
        assert!(store.insert_collaborator("enc-a", "dup").await.is_err());
    }

    #[tokio::test]
    async fn purge_removes_only_stale_rows() {
        let store = store().await;
        let now = Utc::now();
        let old = store.insert_thread(new_thread("https://x.org/a", ActorKey::user(1))).await.unwrap();
        let fresh = store.insert_thread(new_thread("https://x.org/a", ActorKey::user(1))).await.unwrap();
        let comment = store.insert_comment(new_comment(old.id, ActorKey::user(1), "x")).await.unwrap();
        store.touch_thread(old.id, now - Duration::days(400)).await.unwrap();

        let idle = store.insert_collaborator("enc-idle", "idle").await.unwrap();
        store.insert_collaborator("enc-active", "active").await.unwrap();
        store.touch_collaborator(idle.id, now - Duration::days(400)).await.unwrap();

        let cutoff = now - Duration::days(360);
        assert_eq!(store.purge_threads_inactive_since(cutoff).await.unwrap(), 1);
        assert_eq!(store.purge_collaborators_inactive_since(cutoff).await.unwrap(), 1);
        assert!(store.get_thread(old.id).await.unwrap().is_none());
        assert!(store.get_thread(fresh.id).await.unwrap().is_some());
        assert!(store.comments_for_thread(comment.thread_id).await.unwrap().is_empty());
        assert!(store.get_collaborator(idle.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn user_directory_matches_case_insensitively() {
        let store = store().await;
        for (id, name, email, login) in [
            (1, "Ana Lee", "ana@example.org", "ana"),
            (2, "Bob 100%", "bob@example.org", "bob_b"),
        ] {
            store
                .upsert_user(&UserActor {
                    id,
                    display_name: name.into(),
                    email: email.into(),
                    login: login.into(),
                    is_admin: false,
                })
                .await
                .unwrap();
        }
        assert_eq!(store.find_by_email("ANA@example.org").await.unwrap().unwrap().id, 1);
        assert_eq!(store.find_by_login("BOB_B").await.unwrap().unwrap().id, 2);
        assert_eq!(store.search_display_name("lee").await.unwrap().len(), 1);
        assert_eq!(store.search("example", 10).await.unwrap().len(), 2);
        assert_eq!(store.search("example", 1).await.unwrap().len(), 1);
        let percent: Vec<i64> = store.search("0%", 10).await.unwrap().iter().map(|u| u.id).collect();
        assert_eq!(percent, vec![2]);
        assert!(store.search("_", 10).await.unwrap().iter().all(|u| u.id == 2));
    }

    #[tokio::test]
    async fn inbox_drains_once() {
        let store = store().await;
        store.push(1, "first").await.unwrap();
        store.push(1, "second").await.unwrap();
        store.push(2, "other").await.unwrap();
        assert_eq!(store.drain(1).await.unwrap(), vec!["first".to_string(), "second".to_string()]);
        assert!(store.drain(1).await.unwrap().is_empty());
        assert_eq!(store.drain(2).await.unwrap().len(), 1);
    }
}
