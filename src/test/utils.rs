#[cfg(test)]
pub mod test_utils {
    use crate::api::LoginResponse;
    use crate::auth::Role;
    use crate::db::{create_progress_log, create_therapist, create_user};
    use crate::error::AppError;
    use crate::init_rocket_with;
    use chrono::{DateTime, Duration, Utc};
    use rocket::figment::Figment;
    use rocket::http::{ContentType, Status};
    use rocket::local::asynchronous::Client;
    use serde_json::json;
    use sqlx::{Pool, Sqlite, sqlite::SqlitePoolOptions};
    use std::collections::HashMap;
    use std::sync::Once;

    static INIT: Once = Once::new();
    pub static STANDARD_PASSWORD: &str = "password123";

    #[derive(Default)]
    pub struct TestDbBuilder {
        users: Vec<TestUser>,
        trainers: Vec<TestTrainer>,
        progress: Vec<TestProgress>,
    }

    pub struct TestUser {
        pub name: String,
        pub email: String,
        pub role: Role,
        pub password: String,
    }

    pub struct TestTrainer {
        pub name: String,
        pub specialty: String,
        pub rating: i64,
        pub account_email: Option<String>,
    }

    pub struct TestProgress {
        pub email: String,
        pub days_ago: i64,
        pub pain_level: i64,
        pub mobility: i64,
    }

    impl TestDbBuilder {
        pub fn new() -> Self {
            Self::default()
        }

        fn user(mut self, name: &str, email: &str, role: Role) -> Self {
            self.users.push(TestUser {
                name: name.to_string(),
                email: email.to_string(),
                role,
                password: STANDARD_PASSWORD.to_string(),
            });
            self
        }

        pub fn patient(self, name: &str, email: &str) -> Self {
            self.user(name, email, Role::Patient)
        }

        pub fn admin(self, name: &str, email: &str) -> Self {
            self.user(name, email, Role::Admin)
        }

        /// A therapist account together with its public trainer profile.
        pub fn therapist(mut self, name: &str, email: &str, specialty: &str, rating: i64) -> Self {
            self = self.user(name, email, Role::Therapist);
            self.trainers.push(TestTrainer {
                name: name.to_string(),
                specialty: specialty.to_string(),
                rating,
                account_email: Some(email.to_string()),
            });
            self
        }

        /// A trainer profile with no login behind it.
        pub fn trainer(mut self, name: &str, specialty: &str, rating: i64) -> Self {
            self.trainers.push(TestTrainer {
                name: name.to_string(),
                specialty: specialty.to_string(),
                rating,
                account_email: None,
            });
            self
        }

        pub fn progress(mut self, email: &str, days_ago: i64, pain_level: i64, mobility: i64) -> Self {
            self.progress.push(TestProgress {
                email: email.to_string(),
                days_ago,
                pain_level,
                mobility,
            });
            self
        }

        pub async fn build(self) -> Result<TestDb, AppError> {
            INIT.call_once(|| {
                let _ = env_logger::builder()
                    .parse_filters("debug")
                    .is_test(true)
                    .try_init();
            });

            let pool = test_pool().await?;

            let mut user_id_map: HashMap<String, i64> = HashMap::new();
            let mut therapist_id_map: HashMap<String, i64> = HashMap::new();

            for user in &self.users {
                let user_id =
                    create_user(&pool, &user.name, &user.email, &user.password, user.role).await?;
                user_id_map.insert(user.email.clone(), user_id);
            }

            for trainer in &self.trainers {
                let account_id = trainer
                    .account_email
                    .as_ref()
                    .and_then(|email| user_id_map.get(email).copied());

                let therapist_id = create_therapist(
                    &pool,
                    &trainer.name,
                    &trainer.specialty,
                    trainer.rating,
                    None,
                    account_id,
                )
                .await?;
                therapist_id_map.insert(trainer.name.clone(), therapist_id);
            }

            for entry in &self.progress {
                let user_id = user_id_map.get(&entry.email).copied().ok_or_else(|| {
                    AppError::NotFound(format!("No test user {}", entry.email))
                })?;

                create_progress_log(
                    &pool,
                    user_id,
                    Utc::now() - Duration::days(entry.days_ago),
                    entry.pain_level,
                    entry.mobility,
                    None,
                )
                .await?;
            }

            Ok(TestDb {
                pool,
                user_id_map,
                therapist_id_map,
            })
        }
    }

    pub struct TestDb {
        pub pool: Pool<Sqlite>,
        pub user_id_map: HashMap<String, i64>,
        pub therapist_id_map: HashMap<String, i64>,
    }

    impl TestDb {
        pub fn user_id(&self, email: &str) -> Option<i64> {
            self.user_id_map.get(email).copied()
        }

        pub fn therapist_id(&self, name: &str) -> Option<i64> {
            self.therapist_id_map.get(name).copied()
        }
    }

    /// A single connection keeps every query on the same in-memory database.
    pub async fn test_pool() -> Result<Pool<Sqlite>, AppError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;

        sqlx::migrate!("./migrations").run(&pool).await?;

        Ok(pool)
    }

    pub async fn create_standard_test_db() -> TestDb {
        TestDbBuilder::new()
            .patient("Pat Patient", "patient@example.com")
            .patient("Sara Second", "sara@example.com")
            .therapist("Dr Therapist", "therapist@example.com", "Sports", 5)
            .trainer("Dr Knee", "Orthopaedics", 4)
            .admin("Ada Admin", "admin@example.com")
            .build()
            .await
            .expect("Failed to build standard test database")
    }

    pub async fn setup_test_client(test_db: TestDb) -> (Client, TestDb) {
        let figment = rocket::Config::figment().merge(("chat_auto_reply", false));
        setup_test_client_with(test_db, figment).await
    }

    pub async fn setup_test_client_with(test_db: TestDb, figment: Figment) -> (Client, TestDb) {
        let rocket = init_rocket_with(figment, test_db.pool.clone());
        let client = Client::tracked(rocket)
            .await
            .expect("Failed to build rocket client");

        (client, test_db)
    }

    pub async fn login_test_user(client: &Client, email: &str, password: &str) -> LoginResponse {
        let response = client
            .post("/api/login")
            .header(ContentType::JSON)
            .body(json!({ "email": email, "password": password }).to_string())
            .dispatch()
            .await;

        assert_eq!(response.status(), Status::Ok);

        let body = response.into_string().await.expect("Empty login response");
        let login: LoginResponse = serde_json::from_str(&body).expect("Invalid login response");
        assert!(login.success, "Login failed for {}", email);
        login
    }

    /// Midnight UTC `days` days from today.
    pub fn days_from_today(days: u64) -> DateTime<Utc> {
        let today = Utc::now().date_naive();
        (today + chrono::Days::new(days))
            .and_hms_opt(0, 0, 0)
            .expect("midnight is always valid")
            .and_utc()
    }
}
