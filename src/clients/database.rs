use anyhow::{Error, Result, anyhow};
use sqlx::{PgPool, postgres::PgPoolOptions};
use tracing::{debug, error, info};

use crate::models::audit::CreateAuditLog;

pub struct DatabaseClient {
    pool: PgPool,
}

impl DatabaseClient {
    pub async fn connect(database_url: &str) -> Result<Self, Error> {
        info!("Connecting to PostgreSQL database");

        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await
            .map_err(|e| anyhow!("Failed to connect to database: {}", e))?;

        info!("PostgreSQL connection established");

        Ok(Self { pool })
    }

    pub async fn log_delivery(&self, log: CreateAuditLog) -> Result<(), Error> {
        let delivery_status = log.delivery_status.to_string();

        sqlx::query(
            r#"
            INSERT INTO delivery_audit (
                request_id,
                patient_id,
                pharmacy_id,
                update_status,
                delivery_status,
                message_reference,
                batch_reference,
                provider_message_id,
                error_message
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(&log.request_id)
        .bind(&log.patient_id)
        .bind(&log.pharmacy_id)
        .bind(&log.update_status)
        .bind(&delivery_status)
        .bind(log.message_reference)
        .bind(log.batch_reference)
        .bind(&log.provider_message_id)
        .bind(&log.error_message)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            error!(
                error = %e,
                request_id = %log.request_id,
                "Failed to write audit log to database"
            );
            anyhow!("Database write failed: {}", e)
        })?;

        debug!(
            request_id = %log.request_id,
            status = %delivery_status,
            "Audit log written to database"
        );

        Ok(())
    }
}
