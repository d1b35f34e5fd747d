//! 用户资料与设备配对服务
//!
//! A sync code bundles the profile identity with the remote endpoint so a
//! second device can join the same replica in one step.

use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};

use crate::error::{CoreError, CoreResult};
use crate::traits::{select_as, DatabaseClient};
use crate::types::{SyncCode, SyncReport, UpdateProfileRequest, UserProfile};

use super::timesheet_service::{optional_text, NOW};
use super::{ServiceContext, SyncService};

const PROFILE_COLUMNS: &str = "id, uuid, displayName, email, createdAt, updatedAt";

/// 用户资料服务
pub struct ProfileService {
    ctx: Arc<ServiceContext>,
    sync_service: Arc<SyncService>,
}

impl ProfileService {
    #[must_use]
    pub fn new(ctx: Arc<ServiceContext>, sync_service: Arc<SyncService>) -> Self {
        Self { ctx, sync_service }
    }

    fn db(&self) -> &dyn DatabaseClient {
        self.ctx.database().as_ref()
    }

    /// 获取本机用户资料，首次调用时创建
    pub async fn get_profile(&self) -> CoreResult<UserProfile> {
        if let Some(profile) = self.find_profile().await? {
            return Ok(profile);
        }

        let uuid = uuid::Uuid::new_v4().to_string();
        self.db()
            .execute(
                "INSERT INTO user_profile (uuid)
                 SELECT ? WHERE NOT EXISTS (SELECT 1 FROM user_profile)",
                vec![uuid.into()],
            )
            .await?;
        log::info!("User profile created");

        self.find_profile()
            .await?
            .ok_or_else(|| CoreError::StorageError("User profile was not created".to_string()))
    }

    /// 更新显示名称和邮箱
    pub async fn update_profile(&self, request: UpdateProfileRequest) -> CoreResult<UserProfile> {
        let existing = self.get_profile().await?;
        self.db()
            .execute(
                &format!(
                    "UPDATE user_profile SET displayName = ?, email = ?, updatedAt = {NOW}
                     WHERE id = ?"
                ),
                vec![
                    optional_text(request.display_name).into(),
                    optional_text(request.email).into(),
                    existing.id.into(),
                ],
            )
            .await?;
        self.get_profile().await
    }

    /// 生成配对码：base64(JSON { uuid, syncUrl, authToken })
    ///
    /// # Errors
    /// `SyncNotConfigured` when the sync URL or auth token is missing.
    pub async fn generate_sync_code(&self) -> CoreResult<String> {
        let profile = self.get_profile().await?;
        let config = self.sync_service.get_config();
        let (Some(sync_url), Some(auth_token)) = (
            config.sync_url.filter(|s| !s.trim().is_empty()),
            config.auth_token.filter(|s| !s.trim().is_empty()),
        ) else {
            return Err(CoreError::SyncNotConfigured(
                "set up sync before generating a sync code".to_string(),
            ));
        };

        let code = SyncCode {
            uuid: profile.uuid,
            sync_url,
            auth_token,
        };
        Ok(BASE64.encode(serde_json::to_vec(&code)?))
    }

    /// 应用配对码：采用其身份与同步端点，并立即同步一次
    pub async fn apply_sync_code(&self, code: &str) -> CoreResult<SyncReport> {
        let code = decode_sync_code(code)?;
        let existing = self.get_profile().await?;

        self.db()
            .execute(
                &format!("UPDATE user_profile SET uuid = ?, updatedAt = {NOW} WHERE id = ?"),
                vec![code.uuid.as_str().into(), existing.id.into()],
            )
            .await?;
        self.sync_service
            .configure_remote(&code.sync_url, &code.auth_token)
            .await?;
        log::info!("Sync code applied, running initial sync");

        self.sync_service.sync_now().await
    }

    async fn find_profile(&self) -> CoreResult<Option<UserProfile>> {
        Ok(select_as::<UserProfile>(
            self.db(),
            &format!("SELECT {PROFILE_COLUMNS} FROM user_profile ORDER BY id ASC LIMIT 1"),
            Vec::new(),
        )
        .await?
        .into_iter()
        .next())
    }
}

fn decode_sync_code(code: &str) -> CoreResult<SyncCode> {
    let invalid = || CoreError::ValidationError("Invalid sync code".to_string());

    let bytes = BASE64.decode(code.trim()).map_err(|_| invalid())?;
    let code: SyncCode = serde_json::from_slice(&bytes).map_err(|_| invalid())?;
    if [&code.uuid, &code.sync_url, &code.auth_token]
        .iter()
        .any(|field| field.trim().is_empty())
    {
        return Err(invalid());
    }
    Ok(code)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{create_test_context, MockDatabaseClient, MockKeyValueStore};
    use crate::services::SYNC_CONFIG_KEY;
    use crate::traits::KeyValueStore;
    use crate::types::SqlValue;
    use serde_json::json;
    use std::sync::atomic::Ordering;

    fn profile_row() -> serde_json::Value {
        json!({
            "id": 1, "uuid": "7d5c0a4e-0000-4000-8000-000000000001",
            "displayName": null, "email": null,
            "createdAt": 1_700_000_000, "updatedAt": 1_700_000_000
        })
    }

    fn service() -> (ProfileService, Arc<MockDatabaseClient>, Arc<MockKeyValueStore>) {
        let (ctx, db, store) = create_test_context();
        let sync_service = Arc::new(SyncService::new(&ctx));
        (ProfileService::new(ctx, sync_service), db, store)
    }

    fn encode(value: &serde_json::Value) -> String {
        BASE64.encode(value.to_string())
    }

    #[tokio::test]
    async fn first_read_creates_profile_with_fresh_uuid() {
        let (service, db, _) = service();

        // The mock never returns the inserted row
        let result = service.get_profile().await;
        assert!(matches!(result, Err(CoreError::StorageError(_))));

        let params = db.params_of("INSERT INTO user_profile").unwrap();
        let SqlValue::Text(uuid) = &params[0] else {
            panic!("uuid should be bound as text: {params:?}");
        };
        assert!(uuid::Uuid::parse_str(uuid).is_ok());
    }

    #[tokio::test]
    async fn existing_profile_is_not_recreated() {
        let (service, db, _) = service();
        db.on_select("FROM user_profile", vec![profile_row()]);

        let profile = service.get_profile().await.unwrap();
        assert_eq!(profile.id, 1);
        assert!(db.params_of("INSERT INTO user_profile").is_none());
    }

    #[tokio::test]
    async fn sync_code_requires_configured_remote() {
        let (service, db, _) = service();
        db.on_select("FROM user_profile", vec![profile_row()]);

        let result = service.generate_sync_code().await;
        assert!(matches!(result, Err(CoreError::SyncNotConfigured(_))));
    }

    #[tokio::test]
    async fn sync_code_carries_identity_and_endpoint() {
        let (service, db, store) = service();
        db.on_select("FROM user_profile", vec![profile_row()]);
        store
            .set_item(
                SYNC_CONFIG_KEY,
                r#"{"syncUrl":"libsql://books.example","authToken":"tok","enableSync":true}"#,
            )
            .unwrap();

        let code = service.generate_sync_code().await.unwrap();
        assert_eq!(
            decode_sync_code(&code).unwrap(),
            SyncCode {
                uuid: "7d5c0a4e-0000-4000-8000-000000000001".into(),
                sync_url: "libsql://books.example".into(),
                auth_token: "tok".into(),
            }
        );
    }

    #[test]
    fn malformed_codes_are_rejected() {
        let codes = vec![
            "not base64!".to_string(),
            BASE64.encode("{}"),
            BASE64.encode("[1,2]"),
            encode(&json!({ "uuid": "u", "syncUrl": "libsql://x", "authToken": "" })),
        ];
        for code in &codes {
            assert!(
                matches!(decode_sync_code(code), Err(CoreError::ValidationError(_))),
                "{code}"
            );
        }
    }

    #[tokio::test]
    async fn applying_a_code_adopts_identity_and_syncs() {
        let (service, db, store) = service();
        db.on_select("FROM user_profile", vec![profile_row()]);
        let code = encode(&json!({
            "uuid": "shared-uuid", "syncUrl": "libsql://books.example", "authToken": "tok"
        }));

        service.apply_sync_code(&code).await.unwrap();

        assert_eq!(
            db.params_of("UPDATE user_profile SET uuid").unwrap(),
            vec![SqlValue::Text("shared-uuid".into()), SqlValue::Integer(1)]
        );
        let raw = store.raw(SYNC_CONFIG_KEY).unwrap();
        assert!(raw.contains("libsql://books.example"));
        assert_eq!(db.sync_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn invalid_code_changes_nothing() {
        let (service, db, store) = service();

        let result = service.apply_sync_code("garbage").await;
        assert!(matches!(result, Err(CoreError::ValidationError(_))));
        assert!(db.executed().is_empty());
        assert!(store.raw(SYNC_CONFIG_KEY).is_none());
    }
}
