use cryptopoll::*;
use serde::de::DeserializeOwned;
use serde::Serialize;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::ConnectOptions;
use std::fs;
use std::future::Future;
use std::path::Path;
use std::time::Duration;
use tokio::runtime::Runtime;

pub type Db = sqlx::SqlitePool;

// How long a write waits on another process holding the database lock
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

// Insert, or replace and bump the revision. No row comes back when the poll does not exist.
const UPSERT_BALLOT: &str = "INSERT INTO ballot (poll_id, voter_id, value) \
     SELECT ?1, ?2, ?3 WHERE EXISTS (SELECT 1 FROM poll WHERE id = ?1) \
     ON CONFLICT (poll_id, voter_id) DO UPDATE SET value = excluded.value, revision = revision + 1 \
     RETURNING revision";

/// A [`Store`] backed by a SQLite database file.
///
/// Each record is kept as JSON next to the columns it is looked up by. The `(poll_id, voter_id)`
/// uniqueness of ballots is enforced by the database, so several processes may share one file.
pub struct SqliteStore {
    db: Db,
    runtime: Runtime,
}

impl SqliteStore {
    /// Open the database at `path`, creating and migrating it if needed
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;

        let opts = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .foreign_keys(true)
            .busy_timeout(BUSY_TIMEOUT)
            .disable_statement_logging();

        let db = runtime.block_on(async {
            let db = SqlitePoolOptions::new()
                .max_connections(1)
                .connect_with(opts)
                .await
                .map_err(db_error)?;

            sqlx::migrate!("./migrations")
                .run(&db)
                .await
                .map_err(|e| Error::Store(format!("unable to initialize database: {}", e)))?;

            Ok::<_, Error>(db)
        })?;

        log::debug!("opened store {}", path.display());
        Ok(SqliteStore { db, runtime })
    }

    fn run<T, F>(&self, query: F) -> Result<T, Error>
    where
        F: Future<Output = Result<T, sqlx::Error>>,
    {
        self.runtime.block_on(query).map_err(db_error)
    }

    fn insert(&self, sql: &str, kind: &str, id: String, value: String) -> Result<(), Error> {
        let query = sqlx::query(sql).bind(id.clone()).bind(value);
        match self.runtime.block_on(query.execute(&self.db)) {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                Err(Error::Store(format!("{} {} already exists", kind, id)))
            }
            Err(e) => Err(db_error(e)),
        }
    }

    fn fetch_value(&self, sql: &str, binds: &[String]) -> Result<Option<String>, Error> {
        let mut query = sqlx::query_scalar::<_, String>(sql);
        for bind in binds {
            query = query.bind(bind.clone());
        }
        self.run(query.fetch_optional(&self.db))
    }

    fn fetch_values(&self, sql: &str, binds: &[String]) -> Result<Vec<String>, Error> {
        let mut query = sqlx::query_scalar::<_, String>(sql);
        for bind in binds {
            query = query.bind(bind.clone());
        }
        self.run(query.fetch_all(&self.db))
    }
}

impl Drop for SqliteStore {
    fn drop(&mut self) {
        self.runtime.block_on(self.db.close());
    }
}

impl Store for SqliteStore {
    fn get_poll(&self, poll_id: PollId) -> Result<Option<Poll>, Error> {
        self.fetch_value("SELECT value FROM poll WHERE id = ?", &[poll_id.to_string()])?
            .as_deref()
            .map(from_json)
            .transpose()
    }

    fn put_poll(&self, poll: &Poll) -> Result<(), Error> {
        self.insert(
            "INSERT INTO poll (id, value) VALUES (?, ?)",
            "poll",
            poll.id.to_string(),
            to_json(poll)?,
        )
    }

    fn list_polls(&self) -> Result<Vec<Poll>, Error> {
        self.fetch_values("SELECT value FROM poll", &[])?
            .iter()
            .map(|value| from_json(value))
            .collect()
    }

    fn delete_poll(&self, poll_id: PollId) -> Result<bool, Error> {
        // Ballots go with the poll through ON DELETE CASCADE
        let query = sqlx::query("DELETE FROM poll WHERE id = ?").bind(poll_id.to_string());
        let result = self.run(query.execute(&self.db))?;
        Ok(result.rows_affected() > 0)
    }

    fn get_voter(&self, voter_id: VoterId) -> Result<Option<VoterIdentity>, Error> {
        self.fetch_value("SELECT value FROM voter WHERE id = ?", &[voter_id.to_string()])?
            .as_deref()
            .map(from_json)
            .transpose()
    }

    fn put_voter(&self, voter: &VoterIdentity) -> Result<(), Error> {
        self.insert(
            "INSERT INTO voter (id, value) VALUES (?, ?)",
            "voter",
            voter.id.to_string(),
            to_json(voter)?,
        )
    }

    fn upsert_ballot(&self, ballot: Ballot) -> Result<Ack, Error> {
        let query = sqlx::query_scalar::<_, i64>(UPSERT_BALLOT)
            .bind(ballot.poll_id.to_string())
            .bind(ballot.voter_id.to_string())
            .bind(to_json(&ballot)?);

        match self.run(query.fetch_optional(&self.db))? {
            None => Err(NotFound::Poll(ballot.poll_id).into()),
            Some(0) => Ok(Ack::Inserted),
            Some(_) => Ok(Ack::Replaced),
        }
    }

    fn get_ballot(&self, poll_id: PollId, voter_id: VoterId) -> Result<Option<Ballot>, Error> {
        self.fetch_value(
            "SELECT value FROM ballot WHERE poll_id = ? AND voter_id = ?",
            &[poll_id.to_string(), voter_id.to_string()],
        )?
        .as_deref()
        .map(from_json)
        .transpose()
    }

    fn list_ballots(&self, poll_id: PollId) -> Result<Vec<Ballot>, Error> {
        self.fetch_values(
            "SELECT value FROM ballot WHERE poll_id = ? ORDER BY voter_id",
            &[poll_id.to_string()],
        )?
        .iter()
        .map(|value| from_json(value))
        .collect()
    }
}

fn db_error(e: sqlx::Error) -> Error {
    Error::Store(format!("database error: {}", e))
}

fn to_json<T: Serialize>(value: &T) -> Result<String, Error> {
    serde_json::to_string(value).map_err(|e| Error::Store(format!("unable to encode record: {}", e)))
}

fn from_json<T: DeserializeOwned>(value: &str) -> Result<T, Error> {
    serde_json::from_str(value).map_err(|e| Error::Store(format!("unable to decode record: {}", e)))
}
