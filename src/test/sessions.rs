#[cfg(test)]
mod tests {
    use crate::auth::UserSession;
    use crate::db::{
        clean_expired_sessions, create_user_session, get_session_by_token, invalidate_session,
    };
    use crate::error::AppError;
    use crate::test::test_utils::{TestDbBuilder, test_pool};
    use chrono::{Duration, Utc};
    use rocket::tokio;
    use sqlx::{Pool, Sqlite};

    struct Fixture {
        pool: Pool<Sqlite>,
        patient_id: i64,
    }

    impl Fixture {
        async fn new() -> Self {
            let db = TestDbBuilder::new()
                .patient("Session Patient", "session@example.com")
                .build()
                .await
                .expect("Failed to build test database");
            let patient_id = db.user_id("session@example.com").unwrap();

            Self {
                pool: db.pool,
                patient_id,
            }
        }

        /// Stores a fresh token expiring `offset` from now.
        async fn session(&self, offset: Duration) -> String {
            let token = UserSession::generate_token();
            create_user_session(&self.pool, self.patient_id, &token, Utc::now() + offset)
                .await
                .expect("Failed to create session");
            token
        }
    }

    #[tokio::test]
    async fn test_stored_session_round_trips() {
        let fixture = Fixture::new().await;
        let expires_at = Utc::now() + Duration::hours(24);
        let token = UserSession::generate_token();

        let id = create_user_session(&fixture.pool, fixture.patient_id, &token, expires_at)
            .await
            .unwrap();
        let session = get_session_by_token(&fixture.pool, &token).await.unwrap();

        assert!(id > 0);
        assert_eq!(session.user_id, fixture.patient_id);
        assert_eq!(session.token, token);
        assert!((session.expires_at - expires_at).num_seconds().abs() <= 1);
        assert!(session.is_valid());
    }

    #[tokio::test]
    async fn test_unknown_token_is_authentication_error() {
        let pool = test_pool().await.unwrap();

        let result = get_session_by_token(&pool, "not-a-real-token").await;
        assert!(matches!(
            result,
            Err(AppError::Authentication(msg)) if msg == "Invalid session token"
        ));
    }

    #[tokio::test]
    async fn test_logout_removes_only_that_session() {
        let fixture = Fixture::new().await;
        let phone = fixture.session(Duration::hours(1)).await;
        let laptop = fixture.session(Duration::hours(1)).await;

        invalidate_session(&fixture.pool, &phone).await.unwrap();

        assert!(get_session_by_token(&fixture.pool, &phone).await.is_err());
        assert!(get_session_by_token(&fixture.pool, &laptop).await.is_ok());
    }

    #[tokio::test]
    async fn test_cleanup_deletes_only_expired() {
        let fixture = Fixture::new().await;
        let stale = fixture.session(Duration::hours(-1)).await;
        let expiring = fixture.session(Duration::minutes(1)).await;
        let fresh = fixture.session(Duration::days(1)).await;

        let removed = clean_expired_sessions(&fixture.pool).await.unwrap();
        assert_eq!(removed, 1);

        assert!(get_session_by_token(&fixture.pool, &stale).await.is_err());
        assert!(get_session_by_token(&fixture.pool, &expiring).await.is_ok());
        assert!(get_session_by_token(&fixture.pool, &fresh).await.is_ok());

        // A second sweep has nothing left to do.
        assert_eq!(clean_expired_sessions(&fixture.pool).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_expired_session_still_loads_but_is_invalid() {
        let fixture = Fixture::new().await;
        let token = fixture.session(Duration::minutes(-5)).await;

        let session = get_session_by_token(&fixture.pool, &token).await.unwrap();
        assert!(!session.is_valid());
    }

    #[test]
    fn test_generated_tokens() {
        let tokens: Vec<String> = (0..20).map(|_| UserSession::generate_token()).collect();

        assert!(tokens.iter().all(|t| t.len() == 48));
        assert!(tokens.iter().all(|t| t.chars().all(|c| c.is_ascii_alphanumeric())));

        let mut unique = tokens.clone();
        unique.sort();
        unique.dedup();
        assert_eq!(unique.len(), tokens.len());
    }
}
