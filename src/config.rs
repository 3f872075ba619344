use serde::Deserialize;

pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.5-flash";
pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_FIRESTORE_BASE_URL: &str = "https://firestore.googleapis.com/v1";

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub ttl_minutes: i64,
    pub refresh_ttl_minutes: i64,
}

/// Object storage for draft and history slots. `None` endpoint means in-memory.
#[derive(Debug, Clone, Deserialize)]
pub struct MinioConfig {
    pub endpoint: Option<String>,
    pub bucket: String,
    pub access_key: String,
    pub secret_key: String,
    pub region: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GeminiConfig {
    pub api_key: Option<String>,
    pub model: String,
    pub base_url: String,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct FirestoreConfig {
    pub project_id: String,
    pub api_key: Option<String>,
    pub base_url: String,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub enum PlanStoreConfig {
    Postgres,
    Firestore(FirestoreConfig),
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    pub jwt: JwtConfig,
    pub minio: MinioConfig,
    pub gemini: GeminiConfig,
    pub plan_store: PlanStoreConfig,
}

fn var_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.into())
}

fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL")?;
        let jwt = JwtConfig {
            secret: std::env::var("JWT_SECRET")?,
            issuer: var_or("JWT_ISSUER", "mealplanner"),
            audience: var_or("JWT_AUDIENCE", "mealplanner-users"),
            ttl_minutes: std::env::var("JWT_TTL_MINUTES")
                .ok()
                .and_then(|v| v.parse::<i64>().ok())
                .unwrap_or(60),
            refresh_ttl_minutes: std::env::var("JWT_REFRESH_TTL_MINUTES")
                .ok()
                .and_then(|v| v.parse::<i64>().ok())
                .unwrap_or(60 * 24 * 14),
        };
        let minio = MinioConfig {
            endpoint: non_empty_var("MINIO_ENDPOINT"),
            bucket: var_or("MINIO_BUCKET", "mealplanner"),
            access_key: var_or("MINIO_ACCESS_KEY", "minioadmin"),
            secret_key: var_or("MINIO_SECRET_KEY", "minioadmin"),
            region: var_or("MINIO_REGION", "us-east-1"),
        };
        let gemini = GeminiConfig {
            api_key: non_empty_var("GEMINI_API_KEY"),
            model: var_or("GEMINI_MODEL", DEFAULT_GEMINI_MODEL),
            base_url: var_or("GEMINI_BASE_URL", DEFAULT_GEMINI_BASE_URL),
        };
        let plan_store = parse_plan_store(
            std::env::var("PLAN_STORE").ok().as_deref(),
            non_empty_var("FIRESTORE_PROJECT_ID"),
            non_empty_var("FIRESTORE_API_KEY"),
        )?;
        Ok(Self {
            database_url,
            jwt,
            minio,
            gemini,
            plan_store,
        })
    }
}

fn parse_plan_store(
    kind: Option<&str>,
    project_id: Option<String>,
    api_key: Option<String>,
) -> anyhow::Result<PlanStoreConfig> {
    match kind.map(|k| k.trim().to_ascii_lowercase()).as_deref() {
        None | Some("") | Some("postgres") => Ok(PlanStoreConfig::Postgres),
        Some("firestore") => {
            let project_id = project_id
                .ok_or_else(|| anyhow::anyhow!("PLAN_STORE=firestore requires FIRESTORE_PROJECT_ID"))?;
            Ok(PlanStoreConfig::Firestore(FirestoreConfig {
                project_id,
                api_key,
                base_url: var_or("FIRESTORE_BASE_URL", DEFAULT_FIRESTORE_BASE_URL),
            }))
        }
        Some(other) => anyhow::bail!("unknown PLAN_STORE backend: {}", other),
    }
}

#[cfg(test)]
mod config_tests {
    use super::*;

    #[test]
    fn plan_store_defaults_to_postgres() {
        assert_eq!(parse_plan_store(None, None, None).unwrap(), PlanStoreConfig::Postgres);
        assert_eq!(
            parse_plan_store(Some("Postgres"), None, None).unwrap(),
            PlanStoreConfig::Postgres
        );
    }

    #[test]
    fn firestore_requires_project() {
        assert!(parse_plan_store(Some("firestore"), None, None).is_err());
        match parse_plan_store(Some("firestore"), Some("demo".into()), None).unwrap() {
            PlanStoreConfig::Firestore(cfg) => assert_eq!(cfg.project_id, "demo"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn unknown_backend_is_rejected() {
        assert!(parse_plan_store(Some("mongo"), None, None).is_err());
    }
}
