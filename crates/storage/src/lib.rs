use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    Pool, Row, Sqlite, Transaction,
};
use std::{
    fs,
    path::{Path, PathBuf},
    str::FromStr,
};

use shared::{
    domain::{FormState, Network, OrganizationId, RegistrationDraft, StepKey, StepScope},
    protocol::SubmissionRecord,
};

#[derive(Clone)]
pub struct Storage {
    pool: Pool<Sqlite>,
}

#[derive(Debug, Clone)]
pub struct StoredDraftSummary {
    pub org_id: OrganizationId,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredSubmission {
    pub org_id: OrganizationId,
    pub record: SubmissionRecord,
}

impl Storage {
    pub async fn new(database_url: &str) -> Result<Self> {
        ensure_sqlite_parent_dir_exists(database_url)?;

        let connect_options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(connect_options)
            .await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    pub async fn health_check(&self) -> Result<()> {
        let _: i64 = sqlx::query_scalar("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .context("sqlite ping failed")?;
        Ok(())
    }

    pub async fn load_draft(&self, org_id: &OrganizationId) -> Result<Option<RegistrationDraft>> {
        let row = sqlx::query("SELECT document FROM registration_drafts WHERE org_id = ?")
            .bind(org_id.as_str())
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| decode_document(org_id, &r.get::<String, _>(0)))
            .transpose()
    }

    /// Stored draft, or a fresh form when the organization has not saved anything yet.
    pub async fn load_draft_or_default(&self, org_id: &OrganizationId) -> Result<RegistrationDraft> {
        Ok(self
            .load_draft(org_id)
            .await?
            .unwrap_or_else(RegistrationDraft::new_form))
    }

    /// Replaces the fields owned by `step` with the ones from `section` and returns the
    /// stored document. Writing the same section twice leaves the same document behind.
    pub async fn upsert_section(
        &self,
        org_id: &OrganizationId,
        step: StepKey,
        section: &RegistrationDraft,
        state: Option<FormState>,
    ) -> Result<RegistrationDraft> {
        let mut tx = self.pool.begin().await?;

        let mut draft = load_in_tx(&mut tx, org_id)
            .await?
            .unwrap_or_else(RegistrationDraft::new_form);
        draft.merge_section(step, section);
        if state.is_some() {
            draft.state = state;
        }
        write_in_tx(&mut tx, org_id, &draft).await?;

        tx.commit().await?;
        Ok(draft)
    }

    /// Swaps the whole document in one transaction.
    pub async fn replace_draft(
        &self,
        org_id: &OrganizationId,
        draft: &RegistrationDraft,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        write_in_tx(&mut tx, org_id, draft).await?;
        tx.commit().await?;
        Ok(())
    }

    /// Drops the whole draft, or puts a single section back to its wizard defaults.
    /// Returns whether a stored draft existed.
    pub async fn reset_draft(&self, org_id: &OrganizationId, scope: StepScope) -> Result<bool> {
        match scope {
            StepScope::All => {
                let result = sqlx::query("DELETE FROM registration_drafts WHERE org_id = ?")
                    .bind(org_id.as_str())
                    .execute(&self.pool)
                    .await?;
                Ok(result.rows_affected() > 0)
            }
            StepScope::Step(step) => {
                let mut tx = self.pool.begin().await?;
                let Some(mut draft) = load_in_tx(&mut tx, org_id).await? else {
                    return Ok(false);
                };
                draft.merge_section(step, &RegistrationDraft::default_for_wizard());
                write_in_tx(&mut tx, org_id, &draft).await?;
                tx.commit().await?;
                Ok(true)
            }
        }
    }

    pub async fn list_drafts(&self) -> Result<Vec<StoredDraftSummary>> {
        let rows = sqlx::query(
            "SELECT org_id, updated_at FROM registration_drafts ORDER BY updated_at DESC, org_id",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|r| StoredDraftSummary {
                org_id: OrganizationId(r.get::<String, _>(0)),
                updated_at: r.get::<DateTime<Utc>, _>(1),
            })
            .collect())
    }

    /// Records a submission. Returns `false` without touching the existing row when the
    /// organization already submitted to that network.
    pub async fn insert_submission(
        &self,
        org_id: &OrganizationId,
        record: &SubmissionRecord,
    ) -> Result<bool> {
        let result = sqlx::query(
            "INSERT INTO registration_submissions (org_id, network, request_id, status, message, submitted_at)
             VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT(org_id, network) DO NOTHING",
        )
        .bind(org_id.as_str())
        .bind(record.network.as_str())
        .bind(&record.id)
        .bind(&record.status)
        .bind(&record.message)
        .bind(record.submitted_at)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    pub async fn load_submission(
        &self,
        org_id: &OrganizationId,
        network: Network,
    ) -> Result<Option<SubmissionRecord>> {
        let row = sqlx::query(
            "SELECT org_id, network, request_id, status, message, submitted_at
             FROM registration_submissions
             WHERE org_id = ? AND network = ?",
        )
        .bind(org_id.as_str())
        .bind(network.as_str())
        .fetch_optional(&self.pool)
        .await?;
        row.map(|r| submission_from_row(&r).map(|stored| stored.record))
            .transpose()
    }

    /// Submission records, optionally for one organization, oldest first.
    pub async fn list_submissions(
        &self,
        org_id: Option<&OrganizationId>,
    ) -> Result<Vec<StoredSubmission>> {
        let rows = match org_id {
            Some(org_id) => {
                sqlx::query(
                    "SELECT org_id, network, request_id, status, message, submitted_at
                     FROM registration_submissions
                     WHERE org_id = ?
                     ORDER BY submitted_at ASC, network ASC",
                )
                .bind(org_id.as_str())
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query(
                    "SELECT org_id, network, request_id, status, message, submitted_at
                     FROM registration_submissions
                     ORDER BY submitted_at ASC, org_id ASC, network ASC",
                )
                .fetch_all(&self.pool)
                .await?
            }
        };
        rows.iter().map(submission_from_row).collect()
    }
}

async fn load_in_tx(
    tx: &mut Transaction<'_, Sqlite>,
    org_id: &OrganizationId,
) -> Result<Option<RegistrationDraft>> {
    let row = sqlx::query("SELECT document FROM registration_drafts WHERE org_id = ?")
        .bind(org_id.as_str())
        .fetch_optional(&mut **tx)
        .await?;
    row.map(|r| decode_document(org_id, &r.get::<String, _>(0)))
        .transpose()
}

async fn write_in_tx(
    tx: &mut Transaction<'_, Sqlite>,
    org_id: &OrganizationId,
    draft: &RegistrationDraft,
) -> Result<()> {
    let document = serde_json::to_string(draft).context("failed to encode registration draft")?;
    sqlx::query(
        "INSERT INTO registration_drafts (org_id, document, created_at, updated_at) VALUES (?, ?, ?, ?)
         ON CONFLICT(org_id) DO UPDATE SET document = excluded.document, updated_at = excluded.updated_at",
    )
    .bind(org_id.as_str())
    .bind(document)
    .bind(Utc::now())
    .bind(Utc::now())
    .execute(&mut **tx)
    .await?;
    Ok(())
}

fn decode_document(org_id: &OrganizationId, document: &str) -> Result<RegistrationDraft> {
    serde_json::from_str(document)
        .with_context(|| format!("stored draft for organization '{org_id}' is not valid json"))
}

fn submission_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<StoredSubmission> {
    let network: String = row.get(1);
    let network = network
        .parse::<Network>()
        .with_context(|| format!("unknown network '{network}' in submission record"))?;
    Ok(StoredSubmission {
        org_id: OrganizationId(row.get::<String, _>(0)),
        record: SubmissionRecord {
            network,
            id: row.get::<String, _>(2),
            status: row.get::<String, _>(3),
            message: row.get::<String, _>(4),
            submitted_at: row.get::<DateTime<Utc>, _>(5),
        },
    })
}

fn ensure_sqlite_parent_dir_exists(database_url: &str) -> Result<()> {
    let Some(path) = sqlite_path(database_url) else {
        return Ok(());
    };

    let Some(parent) = path.parent() else {
        return Ok(());
    };

    fs::create_dir_all(parent).with_context(|| {
        format!(
            "failed to create parent directory '{}' for database url '{database_url}'",
            parent.display()
        )
    })?;

    Ok(())
}

fn sqlite_path(database_url: &str) -> Option<PathBuf> {
    if database_url == "sqlite::memory:" || !database_url.starts_with("sqlite:") {
        return None;
    }

    let path = database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .split('?')
        .next()
        .unwrap_or_default();

    if path.is_empty() {
        return None;
    }

    Some(Path::new(path).to_path_buf())
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
