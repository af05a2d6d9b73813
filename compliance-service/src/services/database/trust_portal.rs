//! Trust portal settings, links, domains, resources and documents.

use service_core::error::AppError;
use uuid::Uuid;

use super::Database;
use crate::models::{
    Framework, FrameworkStatus, Trust, TrustCustomLink, TrustDocument, TrustFrameworkSetting,
    TrustResource, TrustStatus,
};

#[derive(Debug, Default)]
pub struct TrustSettingsUpdate<'a> {
    pub status: Option<TrustStatus>,
    pub friendly_url: Option<&'a str>,
    pub contact_email: Option<&'a str>,
}

fn friendly_url_conflict(err: sqlx::Error) -> AppError {
    match &err {
        sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
            AppError::conflict("Friendly URL is already taken")
        }
        _ => AppError::from(err),
    }
}

impl Database {
    // ==================== Settings ====================

    pub async fn find_trust(&self, org_id: Uuid) -> Result<Option<Trust>, AppError> {
        let trust = sqlx::query_as::<_, Trust>("SELECT * FROM trusts WHERE org_id = $1")
            .bind(org_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(trust)
    }

    pub async fn find_trust_by_friendly_url(&self, friendly_url: &str) -> Result<Option<Trust>, AppError> {
        let trust = sqlx::query_as::<_, Trust>("SELECT * FROM trusts WHERE friendly_url = $1")
            .bind(friendly_url)
            .fetch_optional(&self.pool)
            .await?;
        Ok(trust)
    }

    pub async fn update_trust_settings(
        &self,
        org_id: Uuid,
        update: &TrustSettingsUpdate<'_>,
    ) -> Result<Trust, AppError> {
        sqlx::query_as::<_, Trust>(
            r#"
            UPDATE trusts SET
                status = COALESCE($2, status),
                friendly_url = COALESCE($3, friendly_url),
                contact_email = COALESCE($4, contact_email),
                updated_at = NOW()
            WHERE org_id = $1
            RETURNING *
            "#,
        )
        .bind(org_id)
        .bind(update.status)
        .bind(update.friendly_url)
        .bind(update.contact_email)
        .fetch_optional(&self.pool)
        .await
        .map_err(friendly_url_conflict)?
        .ok_or_else(|| AppError::not_found("Trust portal not found"))
    }

    pub async fn update_trust_overview(
        &self,
        org_id: Uuid,
        title: Option<&str>,
        content: Option<&str>,
        show: bool,
    ) -> Result<Trust, AppError> {
        sqlx::query_as::<_, Trust>(
            r#"
            UPDATE trusts SET
                overview_title = $2, overview_content = $3, show_overview = $4, updated_at = NOW()
            WHERE org_id = $1
            RETURNING *
            "#,
        )
        .bind(org_id)
        .bind(title)
        .bind(content)
        .bind(show)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::not_found("Trust portal not found"))
    }

    // ==================== Frameworks ====================

    pub async fn list_trust_frameworks(&self, org_id: Uuid) -> Result<Vec<TrustFrameworkSetting>, AppError> {
        let frameworks = sqlx::query_as::<_, TrustFrameworkSetting>(
            "SELECT * FROM trust_frameworks WHERE org_id = $1 ORDER BY framework",
        )
        .bind(org_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(frameworks)
    }

    pub async fn upsert_trust_framework(
        &self,
        org_id: Uuid,
        framework: Framework,
        enabled: bool,
        status: Option<FrameworkStatus>,
    ) -> Result<TrustFrameworkSetting, AppError> {
        let setting = sqlx::query_as::<_, TrustFrameworkSetting>(
            r#"
            INSERT INTO trust_frameworks (org_id, framework, enabled, status)
            VALUES ($1, $2, $3, COALESCE($4, 'started'))
            ON CONFLICT (org_id, framework)
            DO UPDATE SET
                enabled = EXCLUDED.enabled,
                status = COALESCE($4, trust_frameworks.status),
                updated_at = NOW()
            RETURNING *
            "#,
        )
        .bind(org_id)
        .bind(framework)
        .bind(enabled)
        .bind(status)
        .fetch_one(&self.pool)
        .await?;
        Ok(setting)
    }

    // ==================== Custom links ====================

    pub async fn list_trust_links(&self, org_id: Uuid, active_only: bool) -> Result<Vec<TrustCustomLink>, AppError> {
        let links = sqlx::query_as::<_, TrustCustomLink>(
            r#"
            SELECT * FROM trust_custom_links
            WHERE org_id = $1 AND (NOT $2 OR is_active)
            ORDER BY order_index, created_at
            "#,
        )
        .bind(org_id)
        .bind(active_only)
        .fetch_all(&self.pool)
        .await?;
        Ok(links)
    }

    /// New links go to the end of the list.
    pub async fn insert_trust_link(
        &self,
        org_id: Uuid,
        title: &str,
        url: &str,
        description: Option<&str>,
    ) -> Result<TrustCustomLink, AppError> {
        let link = sqlx::query_as::<_, TrustCustomLink>(
            r#"
            INSERT INTO trust_custom_links (id, org_id, title, url, description, order_index)
            VALUES (
                $1, $2, $3, $4, $5,
                (SELECT COALESCE(MAX(order_index) + 1, 0) FROM trust_custom_links WHERE org_id = $2)
            )
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(org_id)
        .bind(title)
        .bind(url)
        .bind(description)
        .fetch_one(&self.pool)
        .await?;
        Ok(link)
    }

    pub async fn update_trust_link(
        &self,
        org_id: Uuid,
        link_id: Uuid,
        title: Option<&str>,
        url: Option<&str>,
        description: Option<&str>,
        is_active: Option<bool>,
    ) -> Result<TrustCustomLink, AppError> {
        sqlx::query_as::<_, TrustCustomLink>(
            r#"
            UPDATE trust_custom_links SET
                title = COALESCE($3, title),
                url = COALESCE($4, url),
                description = COALESCE($5, description),
                is_active = COALESCE($6, is_active)
            WHERE org_id = $1 AND id = $2
            RETURNING *
            "#,
        )
        .bind(org_id)
        .bind(link_id)
        .bind(title)
        .bind(url)
        .bind(description)
        .bind(is_active)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::not_found("Link not found"))
    }

    pub async fn delete_trust_link(&self, org_id: Uuid, link_id: Uuid) -> Result<(), AppError> {
        let result = sqlx::query("DELETE FROM trust_custom_links WHERE org_id = $1 AND id = $2")
            .bind(org_id)
            .bind(link_id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::not_found("Link not found"));
        }
        Ok(())
    }

    /// `ids` must name every link of the organization exactly once.
    pub async fn reorder_trust_links(&self, org_id: Uuid, ids: &[Uuid]) -> Result<Vec<TrustCustomLink>, AppError> {
        let mut tx = self.begin().await?;

        let existing: Vec<Uuid> = sqlx::query_scalar(
            "SELECT id FROM trust_custom_links WHERE org_id = $1 FOR UPDATE",
        )
        .bind(org_id)
        .fetch_all(&mut *tx)
        .await?;

        let mut requested = ids.to_vec();
        requested.sort();
        requested.dedup();
        let mut current = existing;
        current.sort();
        if requested.len() != ids.len() || requested != current {
            return Err(AppError::bad_request(
                "Reorder must list every link of the organization exactly once",
            ));
        }

        for (index, id) in ids.iter().enumerate() {
            sqlx::query("UPDATE trust_custom_links SET order_index = $3 WHERE org_id = $1 AND id = $2")
                .bind(org_id)
                .bind(id)
                .bind(index as i32)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;

        self.list_trust_links(org_id, false).await
    }

    // ==================== Domain ====================

    pub async fn set_trust_domain(&self, org_id: Uuid, domain: &str) -> Result<Trust, AppError> {
        sqlx::query_as::<_, Trust>(
            r#"
            UPDATE trusts SET domain = $2, domain_verified = FALSE, updated_at = NOW()
            WHERE org_id = $1
            RETURNING *
            "#,
        )
        .bind(org_id)
        .bind(domain)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                AppError::conflict("Domain is already used by another trust portal")
            }
            _ => AppError::from(e),
        })?
        .ok_or_else(|| AppError::not_found("Trust portal not found"))
    }

    pub async fn clear_trust_domain(&self, org_id: Uuid) -> Result<Trust, AppError> {
        sqlx::query_as::<_, Trust>(
            r#"
            UPDATE trusts SET domain = NULL, domain_verified = FALSE, updated_at = NOW()
            WHERE org_id = $1
            RETURNING *
            "#,
        )
        .bind(org_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::not_found("Trust portal not found"))
    }

    /// Only applies while `domain` is still the configured one.
    pub async fn set_trust_domain_verified(
        &self,
        org_id: Uuid,
        domain: &str,
        verified: bool,
    ) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE trusts SET domain_verified = $3, updated_at = NOW()
            WHERE org_id = $1 AND domain = $2
            "#,
        )
        .bind(org_id)
        .bind(domain)
        .bind(verified)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    // ==================== Compliance resources ====================

    /// Insert or replace the certificate for a framework. Returns the storage
    /// key of the replaced object, if any.
    pub async fn upsert_trust_resource(
        &self,
        org_id: Uuid,
        framework: Framework,
        file_name: &str,
        file_size: i64,
        s3_key: &str,
    ) -> Result<(TrustResource, Option<String>), AppError> {
        let mut tx = self.begin().await?;

        let previous: Option<String> = sqlx::query_scalar(
            "SELECT s3_key FROM trust_resources WHERE org_id = $1 AND framework = $2 FOR UPDATE",
        )
        .bind(org_id)
        .bind(framework)
        .fetch_optional(&mut *tx)
        .await?;

        let resource = sqlx::query_as::<_, TrustResource>(
            r#"
            INSERT INTO trust_resources (id, org_id, framework, file_name, file_size, s3_key)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (org_id, framework)
            DO UPDATE SET
                file_name = EXCLUDED.file_name,
                file_size = EXCLUDED.file_size,
                s3_key = EXCLUDED.s3_key,
                updated_at = NOW()
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(org_id)
        .bind(framework)
        .bind(file_name)
        .bind(file_size)
        .bind(s3_key)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok((resource, previous.filter(|key| key != s3_key)))
    }

    pub async fn list_trust_resources(&self, org_id: Uuid) -> Result<Vec<TrustResource>, AppError> {
        let resources = sqlx::query_as::<_, TrustResource>(
            "SELECT * FROM trust_resources WHERE org_id = $1 ORDER BY framework",
        )
        .bind(org_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(resources)
    }

    pub async fn find_trust_resource(
        &self,
        org_id: Uuid,
        framework: Framework,
    ) -> Result<Option<TrustResource>, AppError> {
        let resource = sqlx::query_as::<_, TrustResource>(
            "SELECT * FROM trust_resources WHERE org_id = $1 AND framework = $2",
        )
        .bind(org_id)
        .bind(framework)
        .fetch_optional(&self.pool)
        .await?;
        Ok(resource)
    }

    pub async fn delete_trust_resource(&self, org_id: Uuid, framework: Framework) -> Result<TrustResource, AppError> {
        sqlx::query_as::<_, TrustResource>(
            "DELETE FROM trust_resources WHERE org_id = $1 AND framework = $2 RETURNING *",
        )
        .bind(org_id)
        .bind(framework)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::not_found("Compliance resource not found"))
    }

    // ==================== Documents ====================

    pub async fn insert_trust_document(
        &self,
        id: Uuid,
        org_id: Uuid,
        name: &str,
        description: Option<&str>,
        file_name: &str,
        file_size: i64,
        s3_key: &str,
    ) -> Result<TrustDocument, AppError> {
        let document = sqlx::query_as::<_, TrustDocument>(
            r#"
            INSERT INTO trust_documents (id, org_id, name, description, file_name, file_size, s3_key)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(org_id)
        .bind(name)
        .bind(description)
        .bind(file_name)
        .bind(file_size)
        .bind(s3_key)
        .fetch_one(&self.pool)
        .await?;
        Ok(document)
    }

    pub async fn list_trust_documents(&self, org_id: Uuid) -> Result<Vec<TrustDocument>, AppError> {
        let documents = sqlx::query_as::<_, TrustDocument>(
            "SELECT * FROM trust_documents WHERE org_id = $1 AND is_active ORDER BY created_at DESC",
        )
        .bind(org_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(documents)
    }

    pub async fn find_trust_document(&self, org_id: Uuid, id: Uuid) -> Result<Option<TrustDocument>, AppError> {
        let document = sqlx::query_as::<_, TrustDocument>(
            "SELECT * FROM trust_documents WHERE org_id = $1 AND id = $2 AND is_active",
        )
        .bind(org_id)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(document)
    }

    pub async fn deactivate_trust_document(&self, org_id: Uuid, id: Uuid) -> Result<TrustDocument, AppError> {
        sqlx::query_as::<_, TrustDocument>(
            r#"
            UPDATE trust_documents SET is_active = FALSE
            WHERE org_id = $1 AND id = $2 AND is_active
            RETURNING *
            "#,
        )
        .bind(org_id)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::not_found("Document not found"))
    }
}
