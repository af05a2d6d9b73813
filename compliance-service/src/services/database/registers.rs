//! Risk, vendor, task and policy registers.

use service_core::error::AppError;
use uuid::Uuid;

use super::Database;
use crate::dtos::{
    CreatePolicyRequest, CreateRiskRequest, CreateTaskRequest, CreateVendorRequest,
    UpdatePolicyRequest, UpdateRiskRequest, UpdateTaskRequest, UpdateVendorRequest,
};
use crate::models::{
    Policy, PolicyStatus, Risk, RiskCategory, RiskStatus, Task, TaskStatus, TreatmentStrategy,
    Vendor, VendorCategory, VendorStatus,
};

const EMPTY_DOC: &str = r#"{"type":"doc","content":[]}"#;

impl Database {
    // ==================== Risks ====================

    pub async fn list_risks(
        &self,
        org_id: Uuid,
        status: Option<RiskStatus>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Risk>, AppError> {
        let risks = sqlx::query_as::<_, Risk>(
            r#"
            SELECT * FROM risks
            WHERE org_id = $1 AND ($2::TEXT IS NULL OR status = $2)
            ORDER BY created_at DESC
            LIMIT $3 OFFSET $4
            "#,
        )
        .bind(org_id)
        .bind(status)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        Ok(risks)
    }

    pub async fn find_risk(&self, org_id: Uuid, id: Uuid) -> Result<Option<Risk>, AppError> {
        let risk = sqlx::query_as::<_, Risk>("SELECT * FROM risks WHERE org_id = $1 AND id = $2")
            .bind(org_id)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(risk)
    }

    pub async fn insert_risk(&self, org_id: Uuid, req: &CreateRiskRequest) -> Result<Risk, AppError> {
        let risk = sqlx::query_as::<_, Risk>(
            r#"
            INSERT INTO risks (
                id, org_id, title, description, category, department, status,
                likelihood, impact, residual_likelihood, residual_impact,
                treatment_strategy, treatment_description, assignee_id
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(org_id)
        .bind(&req.title)
        .bind(&req.description)
        .bind(req.category.unwrap_or(RiskCategory::Other))
        .bind(&req.department)
        .bind(req.status.unwrap_or(RiskStatus::Open))
        .bind(req.likelihood.unwrap_or(1))
        .bind(req.impact.unwrap_or(1))
        .bind(req.residual_likelihood.unwrap_or(1))
        .bind(req.residual_impact.unwrap_or(1))
        .bind(req.treatment_strategy.unwrap_or(TreatmentStrategy::Accept))
        .bind(&req.treatment_description)
        .bind(req.assignee_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(risk)
    }

    pub async fn update_risk(&self, org_id: Uuid, id: Uuid, req: &UpdateRiskRequest) -> Result<Risk, AppError> {
        sqlx::query_as::<_, Risk>(
            r#"
            UPDATE risks SET
                title = COALESCE($3, title),
                description = COALESCE($4, description),
                category = COALESCE($5, category),
                department = COALESCE($6, department),
                status = COALESCE($7, status),
                likelihood = COALESCE($8, likelihood),
                impact = COALESCE($9, impact),
                residual_likelihood = COALESCE($10, residual_likelihood),
                residual_impact = COALESCE($11, residual_impact),
                treatment_strategy = COALESCE($12, treatment_strategy),
                treatment_description = COALESCE($13, treatment_description),
                assignee_id = COALESCE($14, assignee_id),
                updated_at = NOW()
            WHERE org_id = $1 AND id = $2
            RETURNING *
            "#,
        )
        .bind(org_id)
        .bind(id)
        .bind(&req.title)
        .bind(&req.description)
        .bind(req.category)
        .bind(&req.department)
        .bind(req.status)
        .bind(req.likelihood)
        .bind(req.impact)
        .bind(req.residual_likelihood)
        .bind(req.residual_impact)
        .bind(req.treatment_strategy)
        .bind(&req.treatment_description)
        .bind(req.assignee_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::not_found("Risk not found"))
    }

    pub async fn delete_risk(&self, org_id: Uuid, id: Uuid) -> Result<(), AppError> {
        delete_scoped(self, "risks", org_id, id, "Risk not found").await
    }

    // ==================== Vendors ====================

    pub async fn list_vendors(
        &self,
        org_id: Uuid,
        status: Option<VendorStatus>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Vendor>, AppError> {
        let vendors = sqlx::query_as::<_, Vendor>(
            r#"
            SELECT * FROM vendors
            WHERE org_id = $1 AND ($2::TEXT IS NULL OR status = $2)
            ORDER BY name
            LIMIT $3 OFFSET $4
            "#,
        )
        .bind(org_id)
        .bind(status)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        Ok(vendors)
    }

    pub async fn list_public_vendors(&self, org_id: Uuid) -> Result<Vec<Vendor>, AppError> {
        let vendors = sqlx::query_as::<_, Vendor>(
            "SELECT * FROM vendors WHERE org_id = $1 AND show_on_trust_portal ORDER BY name",
        )
        .bind(org_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(vendors)
    }

    pub async fn find_vendor(&self, org_id: Uuid, id: Uuid) -> Result<Option<Vendor>, AppError> {
        let vendor = sqlx::query_as::<_, Vendor>("SELECT * FROM vendors WHERE org_id = $1 AND id = $2")
            .bind(org_id)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(vendor)
    }

    pub async fn insert_vendor(&self, org_id: Uuid, req: &CreateVendorRequest) -> Result<Vendor, AppError> {
        let vendor = sqlx::query_as::<_, Vendor>(
            r#"
            INSERT INTO vendors (
                id, org_id, name, description, category, status, website,
                inherent_probability, inherent_impact, residual_probability, residual_impact,
                assignee_id, show_on_trust_portal
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(org_id)
        .bind(&req.name)
        .bind(&req.description)
        .bind(req.category.unwrap_or(VendorCategory::Other))
        .bind(req.status.unwrap_or(VendorStatus::NotAssessed))
        .bind(&req.website)
        .bind(req.inherent_probability.unwrap_or(1))
        .bind(req.inherent_impact.unwrap_or(1))
        .bind(req.residual_probability.unwrap_or(1))
        .bind(req.residual_impact.unwrap_or(1))
        .bind(req.assignee_id)
        .bind(req.show_on_trust_portal)
        .fetch_one(&self.pool)
        .await?;
        Ok(vendor)
    }

    pub async fn update_vendor(
        &self,
        org_id: Uuid,
        id: Uuid,
        req: &UpdateVendorRequest,
    ) -> Result<Vendor, AppError> {
        sqlx::query_as::<_, Vendor>(
            r#"
            UPDATE vendors SET
                name = COALESCE($3, name),
                description = COALESCE($4, description),
                category = COALESCE($5, category),
                status = COALESCE($6, status),
                website = COALESCE($7, website),
                inherent_probability = COALESCE($8, inherent_probability),
                inherent_impact = COALESCE($9, inherent_impact),
                residual_probability = COALESCE($10, residual_probability),
                residual_impact = COALESCE($11, residual_impact),
                assignee_id = COALESCE($12, assignee_id),
                show_on_trust_portal = COALESCE($13, show_on_trust_portal),
                updated_at = NOW()
            WHERE org_id = $1 AND id = $2
            RETURNING *
            "#,
        )
        .bind(org_id)
        .bind(id)
        .bind(&req.name)
        .bind(&req.description)
        .bind(req.category)
        .bind(req.status)
        .bind(&req.website)
        .bind(req.inherent_probability)
        .bind(req.inherent_impact)
        .bind(req.residual_probability)
        .bind(req.residual_impact)
        .bind(req.assignee_id)
        .bind(req.show_on_trust_portal)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::not_found("Vendor not found"))
    }

    pub async fn delete_vendor(&self, org_id: Uuid, id: Uuid) -> Result<(), AppError> {
        delete_scoped(self, "vendors", org_id, id, "Vendor not found").await
    }

    // ==================== Tasks ====================

    pub async fn list_tasks(
        &self,
        org_id: Uuid,
        status: Option<TaskStatus>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Task>, AppError> {
        let tasks = sqlx::query_as::<_, Task>(
            r#"
            SELECT * FROM tasks
            WHERE org_id = $1 AND ($2::TEXT IS NULL OR status = $2)
            ORDER BY due_date NULLS LAST, created_at DESC
            LIMIT $3 OFFSET $4
            "#,
        )
        .bind(org_id)
        .bind(status)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        Ok(tasks)
    }

    pub async fn find_task(&self, org_id: Uuid, id: Uuid) -> Result<Option<Task>, AppError> {
        let task = sqlx::query_as::<_, Task>("SELECT * FROM tasks WHERE org_id = $1 AND id = $2")
            .bind(org_id)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(task)
    }

    pub async fn insert_task(&self, org_id: Uuid, req: &CreateTaskRequest) -> Result<Task, AppError> {
        let task = sqlx::query_as::<_, Task>(
            r#"
            INSERT INTO tasks (id, org_id, title, description, status, frequency, department, assignee_id, due_date)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(org_id)
        .bind(&req.title)
        .bind(&req.description)
        .bind(req.status.unwrap_or(TaskStatus::Todo))
        .bind(req.frequency)
        .bind(&req.department)
        .bind(req.assignee_id)
        .bind(req.due_date)
        .fetch_one(&self.pool)
        .await?;
        Ok(task)
    }

    pub async fn update_task(&self, org_id: Uuid, id: Uuid, req: &UpdateTaskRequest) -> Result<Task, AppError> {
        sqlx::query_as::<_, Task>(
            r#"
            UPDATE tasks SET
                title = COALESCE($3, title),
                description = COALESCE($4, description),
                status = COALESCE($5, status),
                frequency = COALESCE($6, frequency),
                department = COALESCE($7, department),
                assignee_id = COALESCE($8, assignee_id),
                due_date = COALESCE($9, due_date),
                updated_at = NOW()
            WHERE org_id = $1 AND id = $2
            RETURNING *
            "#,
        )
        .bind(org_id)
        .bind(id)
        .bind(&req.title)
        .bind(&req.description)
        .bind(req.status)
        .bind(req.frequency)
        .bind(&req.department)
        .bind(req.assignee_id)
        .bind(req.due_date)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::not_found("Task not found"))
    }

    pub async fn delete_task(&self, org_id: Uuid, id: Uuid) -> Result<(), AppError> {
        delete_scoped(self, "tasks", org_id, id, "Task not found").await
    }

    // ==================== Policies ====================

    pub async fn list_policies(
        &self,
        org_id: Uuid,
        status: Option<PolicyStatus>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Policy>, AppError> {
        let policies = sqlx::query_as::<_, Policy>(
            r#"
            SELECT * FROM policies
            WHERE org_id = $1 AND ($2::TEXT IS NULL OR status = $2)
            ORDER BY name
            LIMIT $3 OFFSET $4
            "#,
        )
        .bind(org_id)
        .bind(status)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        Ok(policies)
    }

    /// Published, non-archived policies visible to trust portal grantees.
    pub async fn list_shareable_policies(&self, org_id: Uuid) -> Result<Vec<Policy>, AppError> {
        let policies = sqlx::query_as::<_, Policy>(
            r#"
            SELECT * FROM policies
            WHERE org_id = $1 AND status = 'published' AND NOT is_archived
            ORDER BY name
            "#,
        )
        .bind(org_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(policies)
    }

    pub async fn find_policy(&self, org_id: Uuid, id: Uuid) -> Result<Option<Policy>, AppError> {
        let policy = sqlx::query_as::<_, Policy>("SELECT * FROM policies WHERE org_id = $1 AND id = $2")
            .bind(org_id)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(policy)
    }

    pub async fn insert_policy(&self, org_id: Uuid, req: &CreatePolicyRequest) -> Result<Policy, AppError> {
        let content = match &req.content {
            Some(content) => content.clone(),
            None => serde_json::from_str(EMPTY_DOC)
                .map_err(|e| AppError::InternalError(anyhow::anyhow!(e)))?,
        };
        let policy = sqlx::query_as::<_, Policy>(
            r#"
            INSERT INTO policies (id, org_id, name, description, content)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(org_id)
        .bind(&req.name)
        .bind(&req.description)
        .bind(content)
        .fetch_one(&self.pool)
        .await?;
        Ok(policy)
    }

    /// Editing a published policy's content sends it back to draft.
    pub async fn update_policy(
        &self,
        org_id: Uuid,
        id: Uuid,
        req: &UpdatePolicyRequest,
    ) -> Result<Policy, AppError> {
        sqlx::query_as::<_, Policy>(
            r#"
            UPDATE policies SET
                name = COALESCE($3, name),
                description = COALESCE($4, description),
                content = COALESCE($5, content),
                is_archived = COALESCE($6, is_archived),
                status = CASE WHEN $5::JSONB IS NOT NULL THEN 'draft' ELSE status END,
                updated_at = NOW()
            WHERE org_id = $1 AND id = $2
            RETURNING *
            "#,
        )
        .bind(org_id)
        .bind(id)
        .bind(&req.name)
        .bind(&req.description)
        .bind(&req.content)
        .bind(req.is_archived)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::not_found("Policy not found"))
    }

    pub async fn publish_policy(&self, org_id: Uuid, id: Uuid) -> Result<Policy, AppError> {
        sqlx::query_as::<_, Policy>(
            r#"
            UPDATE policies SET status = 'published', updated_at = NOW()
            WHERE org_id = $1 AND id = $2 AND NOT is_archived
            RETURNING *
            "#,
        )
        .bind(org_id)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::not_found("Policy not found or archived"))
    }

    pub async fn delete_policy(&self, org_id: Uuid, id: Uuid) -> Result<(), AppError> {
        delete_scoped(self, "policies", org_id, id, "Policy not found").await
    }
}

/// `table` is always one of the register tables named in this module.
async fn delete_scoped(
    db: &Database,
    table: &'static str,
    org_id: Uuid,
    id: Uuid,
    missing: &str,
) -> Result<(), AppError> {
    let result = sqlx::query(&format!("DELETE FROM {} WHERE org_id = $1 AND id = $2", table))
        .bind(org_id)
        .bind(id)
        .execute(&db.pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(AppError::not_found(missing));
    }
    Ok(())
}
