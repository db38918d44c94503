//! Job settings row access (SPEC §3 "Settings record", §4.1).

use sqlx::Row;
use transcriptord_core::{JobSettings, SettingsId, UserId};

use super::PgDurableStore;
use crate::error::StorageResult;

fn row_to_settings(row: &sqlx::postgres::PgRow) -> Result<JobSettings, sqlx::Error> {
    let id: i64 = row.try_get("id")?;
    let user_id: i64 = row.try_get("user_id")?;
    let is_default: bool = row.try_get("is_default")?;
    let body: serde_json::Value = row.try_get("settings")?;
    let mut settings: JobSettings = serde_json::from_value(body).unwrap_or(JobSettings {
        id: SettingsId::new(id),
        user_id: UserId::new(user_id),
        is_default,
        model: "base".into(),
        language: None,
        align_words: false,
        diarisation: false,
        min_speakers: None,
        max_speakers: None,
        vad_filter: true,
        decoder: Default::default(),
    });
    settings.id = SettingsId::new(id);
    settings.user_id = UserId::new(user_id);
    settings.is_default = is_default;
    Ok(settings)
}

impl PgDurableStore {
    pub(crate) async fn get_or_create_default_settings_impl(
        &self,
        user_id: UserId,
    ) -> StorageResult<JobSettings> {
        let schema = self.schema();
        let existing = sqlx::query(&format!(
            "SELECT * FROM {schema}.job_settings WHERE user_id = $1 AND is_default"
        ))
        .bind(user_id.get())
        .fetch_optional(&self.pool)
        .await?;

        if let Some(row) = existing {
            return row_to_settings(&row).map_err(Into::into);
        }

        let defaults = JobSettings {
            id: SettingsId::new(0),
            user_id,
            is_default: true,
            model: "base".into(),
            language: None,
            align_words: false,
            diarisation: false,
            min_speakers: None,
            max_speakers: None,
            vad_filter: true,
            decoder: Default::default(),
        };
        self.upsert_settings_impl(defaults).await
    }

    pub(crate) async fn upsert_settings_impl(
        &self,
        settings: JobSettings,
    ) -> StorageResult<JobSettings> {
        settings.validate()?;
        let schema = self.schema();
        let body = serde_json::to_value(&settings).unwrap_or_default();

        let mut tx = self.pool.begin().await?;

        // Partial unique index enforces "at most one default per user"; a
        // new default must first demote any existing one (SPEC §3, §8.5).
        if settings.is_default {
            sqlx::query(&format!(
                "UPDATE {schema}.job_settings SET is_default = false \
                 WHERE user_id = $1 AND is_default"
            ))
            .bind(settings.user_id.get())
            .execute(&mut *tx)
            .await?;
        }

        let row = if settings.id.get() == 0 {
            sqlx::query(&format!(
                "INSERT INTO {schema}.job_settings (user_id, is_default, settings) \
                 VALUES ($1, $2, $3) RETURNING *"
            ))
            .bind(settings.user_id.get())
            .bind(settings.is_default)
            .bind(&body)
            .fetch_one(&mut *tx)
            .await?
        } else {
            sqlx::query(&format!(
                "UPDATE {schema}.job_settings SET is_default = $2, settings = $3 \
                 WHERE id = $1 RETURNING *"
            ))
            .bind(settings.id.get())
            .bind(settings.is_default)
            .bind(&body)
            .fetch_one(&mut *tx)
            .await?
        };

        tx.commit().await?;
        row_to_settings(&row).map_err(Into::into)
    }

    pub(crate) async fn list_settings_impl(
        &self,
        user_id: UserId,
    ) -> StorageResult<Vec<JobSettings>> {
        let schema = self.schema();
        let rows = sqlx::query(&format!(
            "SELECT * FROM {schema}.job_settings WHERE user_id = $1 ORDER BY id"
        ))
        .bind(user_id.get())
        .fetch_all(&self.pool)
        .await?;
        rows.iter()
            .map(row_to_settings)
            .collect::<Result<Vec<_>, sqlx::Error>>()
            .map_err(Into::into)
    }
}
