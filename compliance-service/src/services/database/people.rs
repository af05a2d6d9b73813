//! Organizations, users, members, invitations and API keys.

use chrono::{DateTime, Utc};
use service_core::error::AppError;
use sqlx::postgres::PgConnection;
use uuid::Uuid;

use super::{first_free, insert_audit_log, Database};
use crate::models::{
    friendly_url_base, ApiKey, AuditAction, Invitation, InvitationRow, Member, MemberRow,
    NewAuditLog, Organization, Role, RoleSet, User,
};

const MEMBER_SELECT: &str = r#"
    SELECT m.id, m.org_id, m.user_id, u.email, u.name, m.roles, m.department, m.is_active, m.created_at
    FROM members m
    JOIN users u ON u.id = m.user_id
"#;

impl Database {
    // ==================== Users ====================

    /// Upsert the user behind a verified session.
    pub async fn upsert_user(
        &self,
        user_id: Uuid,
        email: &str,
        name: Option<&str>,
    ) -> Result<User, AppError> {
        let mut conn = self.pool.acquire().await?;
        upsert_user(&mut conn, user_id, email, name).await
    }

    // ==================== Organizations ====================

    /// Create an organization, its first owner, and an unpublished trust portal.
    #[tracing::instrument(skip(self, website))]
    pub async fn create_organization(
        &self,
        user_id: Uuid,
        email: &str,
        user_name: Option<&str>,
        name: &str,
        website: Option<&str>,
    ) -> Result<(Organization, Member), AppError> {
        let base = Organization::slugify(name);
        let mut tx = self.begin().await?;

        upsert_user(&mut tx, user_id, email, user_name).await?;

        let taken: Vec<String> = sqlx::query_scalar(
            "SELECT slug FROM organizations WHERE slug = $1 OR slug LIKE $1 || '-%'",
        )
        .bind(&base)
        .fetch_all(&mut *tx)
        .await?;
        let slug = first_free(&base, &taken);

        let org = sqlx::query_as::<_, Organization>(
            r#"
            INSERT INTO organizations (id, name, slug, website)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(name)
        .bind(&slug)
        .bind(website)
        .fetch_one(&mut *tx)
        .await?;

        let member_id: Uuid = sqlx::query_scalar(
            "INSERT INTO members (id, org_id, user_id, roles) VALUES ($1, $2, $3, $4) RETURNING id",
        )
        .bind(Uuid::new_v4())
        .bind(org.id)
        .bind(user_id)
        .bind(RoleSet::single(Role::Owner).to_db())
        .fetch_one(&mut *tx)
        .await?;

        let friendly_base = friendly_url_base(&slug);
        let taken: Vec<String> = sqlx::query_scalar(
            "SELECT friendly_url FROM trusts WHERE friendly_url = $1 OR friendly_url LIKE $1 || '-%'",
        )
        .bind(&friendly_base)
        .fetch_all(&mut *tx)
        .await?;
        sqlx::query("INSERT INTO trusts (org_id, friendly_url) VALUES ($1, $2)")
            .bind(org.id)
            .bind(first_free(&friendly_base, &taken))
            .execute(&mut *tx)
            .await?;

        insert_audit_log(
            &mut tx,
            &NewAuditLog::new(
                org.id,
                "organization",
                org.id,
                AuditAction::Created,
                format!("Organization {} created", org.name),
            )
            .by(Some(member_id)),
        )
        .await?;

        let member = fetch_member(&mut tx, org.id, member_id).await?;
        tx.commit().await?;

        tracing::info!(org_id = %org.id, slug = %org.slug, "Organization created");
        Ok((org, member))
    }

    pub async fn find_organization(&self, org_id: Uuid) -> Result<Option<Organization>, AppError> {
        let org = sqlx::query_as::<_, Organization>("SELECT * FROM organizations WHERE id = $1")
            .bind(org_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(org)
    }

    pub async fn update_organization(
        &self,
        org_id: Uuid,
        name: Option<&str>,
        website: Option<&str>,
    ) -> Result<Organization, AppError> {
        sqlx::query_as::<_, Organization>(
            r#"
            UPDATE organizations
            SET name = COALESCE($2, name), website = COALESCE($3, website), updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(org_id)
        .bind(name)
        .bind(website)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::not_found("Organization not found"))
    }

    // ==================== Members ====================

    pub async fn list_members(&self, org_id: Uuid) -> Result<Vec<Member>, AppError> {
        let rows = sqlx::query_as::<_, MemberRow>(&format!(
            "{} WHERE m.org_id = $1 AND m.is_active ORDER BY m.created_at",
            MEMBER_SELECT
        ))
        .bind(org_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Member::from).collect())
    }

    pub async fn find_member(&self, org_id: Uuid, member_id: Uuid) -> Result<Option<Member>, AppError> {
        let row = sqlx::query_as::<_, MemberRow>(&format!(
            "{} WHERE m.org_id = $1 AND m.id = $2",
            MEMBER_SELECT
        ))
        .bind(org_id)
        .bind(member_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Member::from))
    }

    pub async fn find_active_member_by_user(
        &self,
        org_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<Member>, AppError> {
        let row = sqlx::query_as::<_, MemberRow>(&format!(
            "{} WHERE m.org_id = $1 AND m.user_id = $2 AND m.is_active",
            MEMBER_SELECT
        ))
        .bind(org_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Member::from))
    }

    pub async fn find_active_member_by_email(
        &self,
        org_id: Uuid,
        email: &str,
    ) -> Result<Option<Member>, AppError> {
        let row = sqlx::query_as::<_, MemberRow>(&format!(
            "{} WHERE m.org_id = $1 AND LOWER(u.email) = LOWER($2) AND m.is_active",
            MEMBER_SELECT
        ))
        .bind(org_id)
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Member::from))
    }

    /// Owners and admins who should hear about new access requests.
    pub async fn list_privileged_members(&self, org_id: Uuid) -> Result<Vec<Member>, AppError> {
        let rows = sqlx::query_as::<_, MemberRow>(&format!(
            "{} WHERE m.org_id = $1 AND m.is_active AND m.roles && ARRAY['owner', 'admin']::TEXT[]",
            MEMBER_SELECT
        ))
        .bind(org_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Member::from).collect())
    }

    /// Change roles and/or department. The last active owner keeps the owner role.
    #[tracing::instrument(skip(self, roles, department))]
    pub async fn update_member(
        &self,
        org_id: Uuid,
        member_id: Uuid,
        roles: Option<&RoleSet>,
        department: Option<&str>,
        actor: Option<Uuid>,
    ) -> Result<Member, AppError> {
        let mut tx = self.begin().await?;
        let current = lock_member(&mut tx, org_id, member_id).await?;

        if let Some(roles) = roles {
            if roles.is_empty() {
                return Err(AppError::bad_request("A member needs at least one role"));
            }
            if current.roles.contains(Role::Owner) && !roles.contains(Role::Owner) {
                ensure_other_owner(&mut tx, org_id, member_id).await?;
            }
        }

        sqlx::query(
            r#"
            UPDATE members
            SET roles = COALESCE($3, roles), department = COALESCE($4, department)
            WHERE org_id = $1 AND id = $2
            "#,
        )
        .bind(org_id)
        .bind(member_id)
        .bind(roles.map(RoleSet::to_db))
        .bind(department)
        .execute(&mut *tx)
        .await?;

        let updated = fetch_member(&mut tx, org_id, member_id).await?;
        insert_audit_log(
            &mut tx,
            &NewAuditLog::new(
                org_id,
                "member",
                member_id,
                AuditAction::Updated,
                format!("Member {} updated", updated.email),
            )
            .by(actor)
            .with_data(serde_json::json!({ "roles": updated.roles, "department": updated.department })),
        )
        .await?;
        tx.commit().await?;
        Ok(updated)
    }

    /// Soft-remove a member. Refuses to remove the last active owner.
    #[tracing::instrument(skip(self))]
    pub async fn deactivate_member(
        &self,
        org_id: Uuid,
        member_id: Uuid,
        actor: Option<Uuid>,
    ) -> Result<Member, AppError> {
        let mut tx = self.begin().await?;
        let current = lock_member(&mut tx, org_id, member_id).await?;
        if !current.is_active {
            return Err(AppError::bad_request("Member is already inactive"));
        }
        if current.roles.contains(Role::Owner) {
            ensure_other_owner(&mut tx, org_id, member_id).await?;
        }

        sqlx::query("UPDATE members SET is_active = FALSE WHERE org_id = $1 AND id = $2")
            .bind(org_id)
            .bind(member_id)
            .execute(&mut *tx)
            .await?;

        insert_audit_log(
            &mut tx,
            &NewAuditLog::new(
                org_id,
                "member",
                member_id,
                AuditAction::Deleted,
                format!("Member {} removed", current.email),
            )
            .by(actor),
        )
        .await?;
        let member = fetch_member(&mut tx, org_id, member_id).await?;
        tx.commit().await?;
        Ok(member)
    }

    // ==================== Invitations ====================

    /// Store a new invitation, replacing any pending one for the same email.
    pub async fn create_invitation(
        &self,
        org_id: Uuid,
        email: &str,
        roles: &RoleSet,
        token_hash: &str,
        expires_at: DateTime<Utc>,
        invited_by: Option<Uuid>,
    ) -> Result<Invitation, AppError> {
        let mut tx = self.begin().await?;

        sqlx::query(
            r#"
            UPDATE invitations SET status = 'revoked'
            WHERE org_id = $1 AND LOWER(email) = LOWER($2) AND status = 'pending'
            "#,
        )
        .bind(org_id)
        .bind(email)
        .execute(&mut *tx)
        .await?;

        let row = sqlx::query_as::<_, InvitationRow>(
            r#"
            INSERT INTO invitations (id, org_id, email, roles, token_hash, expires_at, invited_by)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(org_id)
        .bind(email)
        .bind(roles.to_db())
        .bind(token_hash)
        .bind(expires_at)
        .bind(invited_by)
        .fetch_one(&mut *tx)
        .await?;

        insert_audit_log(
            &mut tx,
            &NewAuditLog::new(
                org_id,
                "invitation",
                row.id,
                AuditAction::Created,
                format!("Invited {} as {}", email, roles),
            )
            .by(invited_by),
        )
        .await?;
        tx.commit().await?;
        Ok(row.into())
    }

    pub async fn list_pending_invitations(&self, org_id: Uuid) -> Result<Vec<Invitation>, AppError> {
        let rows = sqlx::query_as::<_, InvitationRow>(
            r#"
            SELECT * FROM invitations
            WHERE org_id = $1 AND status = 'pending' AND expires_at > NOW()
            ORDER BY created_at DESC
            "#,
        )
        .bind(org_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Invitation::from).collect())
    }

    pub async fn revoke_invitation(&self, org_id: Uuid, invitation_id: Uuid) -> Result<Invitation, AppError> {
        let row = sqlx::query_as::<_, InvitationRow>(
            r#"
            UPDATE invitations SET status = 'revoked'
            WHERE org_id = $1 AND id = $2 AND status = 'pending'
            RETURNING *
            "#,
        )
        .bind(org_id)
        .bind(invitation_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Invitation::from)
            .ok_or_else(|| AppError::not_found("Pending invitation not found"))
    }

    pub async fn find_invitation_by_token_hash(&self, token_hash: &str) -> Result<Option<Invitation>, AppError> {
        let row = sqlx::query_as::<_, InvitationRow>("SELECT * FROM invitations WHERE token_hash = $1")
            .bind(token_hash)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Invitation::from))
    }

    /// Create or reactivate the membership and mark the invitation accepted.
    #[tracing::instrument(skip(self, email, name))]
    pub async fn accept_invitation(
        &self,
        invitation_id: Uuid,
        user_id: Uuid,
        email: &str,
        name: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Member, AppError> {
        let mut tx = self.begin().await?;

        let invitation: Invitation = sqlx::query_as::<_, InvitationRow>(
            "SELECT * FROM invitations WHERE id = $1 FOR UPDATE",
        )
        .bind(invitation_id)
        .fetch_optional(&mut *tx)
        .await?
        .map(Invitation::from)
        .ok_or_else(|| AppError::not_found("Invitation not found"))?;

        if !invitation.is_acceptable(now) {
            return Err(AppError::bad_request("Invitation is no longer valid"));
        }

        upsert_user(&mut tx, user_id, email, name).await?;

        let member_id: Uuid = sqlx::query_scalar(
            r#"
            INSERT INTO members (id, org_id, user_id, roles)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (org_id, user_id)
            DO UPDATE SET roles = EXCLUDED.roles, is_active = TRUE
            RETURNING id
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(invitation.org_id)
        .bind(user_id)
        .bind(invitation.roles.to_db())
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query("UPDATE invitations SET status = 'accepted', accepted_at = $2 WHERE id = $1")
            .bind(invitation.id)
            .bind(now)
            .execute(&mut *tx)
            .await?;

        insert_audit_log(
            &mut tx,
            &NewAuditLog::new(
                invitation.org_id,
                "invitation",
                invitation.id,
                AuditAction::Approved,
                format!("{} accepted the invitation", email),
            )
            .by(Some(member_id)),
        )
        .await?;

        let member = fetch_member(&mut tx, invitation.org_id, member_id).await?;
        tx.commit().await?;
        Ok(member)
    }

    // ==================== API keys ====================

    pub async fn insert_api_key(
        &self,
        org_id: Uuid,
        name: &str,
        key_prefix: &str,
        key_hash: &str,
        created_by: Option<Uuid>,
    ) -> Result<ApiKey, AppError> {
        let key = sqlx::query_as::<_, ApiKey>(
            r#"
            INSERT INTO api_keys (id, org_id, name, key_prefix, key_hash, created_by)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(org_id)
        .bind(name)
        .bind(key_prefix)
        .bind(key_hash)
        .bind(created_by)
        .fetch_one(&self.pool)
        .await?;
        Ok(key)
    }

    pub async fn list_api_keys(&self, org_id: Uuid) -> Result<Vec<ApiKey>, AppError> {
        let keys = sqlx::query_as::<_, ApiKey>(
            "SELECT * FROM api_keys WHERE org_id = $1 AND revoked_at IS NULL ORDER BY created_at DESC",
        )
        .bind(org_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(keys)
    }

    pub async fn revoke_api_key(&self, org_id: Uuid, key_id: Uuid) -> Result<ApiKey, AppError> {
        sqlx::query_as::<_, ApiKey>(
            r#"
            UPDATE api_keys SET revoked_at = NOW()
            WHERE org_id = $1 AND id = $2 AND revoked_at IS NULL
            RETURNING *
            "#,
        )
        .bind(org_id)
        .bind(key_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::not_found("API key not found"))
    }

    pub async fn find_active_api_key(&self, key_hash: &str) -> Result<Option<ApiKey>, AppError> {
        let key = sqlx::query_as::<_, ApiKey>(
            "SELECT * FROM api_keys WHERE key_hash = $1 AND revoked_at IS NULL",
        )
        .bind(key_hash)
        .fetch_optional(&self.pool)
        .await?;
        Ok(key)
    }

    pub async fn touch_api_key(&self, key_id: Uuid) -> Result<(), AppError> {
        sqlx::query("UPDATE api_keys SET last_used_at = NOW() WHERE id = $1")
            .bind(key_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

async fn upsert_user(
    conn: &mut PgConnection,
    user_id: Uuid,
    email: &str,
    name: Option<&str>,
) -> Result<User, AppError> {
    let user = sqlx::query_as::<_, User>(
        r#"
        INSERT INTO users (id, email, name)
        VALUES ($1, $2, $3)
        ON CONFLICT (id)
        DO UPDATE SET email = EXCLUDED.email, name = COALESCE(EXCLUDED.name, users.name)
        RETURNING *
        "#,
    )
    .bind(user_id)
    .bind(email)
    .bind(name)
    .fetch_one(conn)
    .await?;
    Ok(user)
}

async fn fetch_member(conn: &mut PgConnection, org_id: Uuid, member_id: Uuid) -> Result<Member, AppError> {
    sqlx::query_as::<_, MemberRow>(&format!("{} WHERE m.org_id = $1 AND m.id = $2", MEMBER_SELECT))
        .bind(org_id)
        .bind(member_id)
        .fetch_optional(conn)
        .await?
        .map(Member::from)
        .ok_or_else(|| AppError::not_found("Member not found"))
}

async fn lock_member(conn: &mut PgConnection, org_id: Uuid, member_id: Uuid) -> Result<Member, AppError> {
    sqlx::query("SELECT id FROM members WHERE org_id = $1 AND id = $2 FOR UPDATE")
        .bind(org_id)
        .bind(member_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| AppError::not_found("Member not found"))?;
    fetch_member(conn, org_id, member_id).await
}

/// Fails unless some other active member holds the owner role.
async fn ensure_other_owner(conn: &mut PgConnection, org_id: Uuid, member_id: Uuid) -> Result<(), AppError> {
    let others: Vec<Uuid> = sqlx::query_scalar(
        r#"
        SELECT id FROM members
        WHERE org_id = $1 AND id <> $2 AND is_active AND 'owner' = ANY(roles)
        FOR UPDATE
        "#,
    )
    .bind(org_id)
    .bind(member_id)
    .fetch_all(conn)
    .await?;
    if others.is_empty() {
        return Err(AppError::bad_request(
            "An organization must keep at least one owner",
        ));
    }
    Ok(())
}
