// src/config.rs

use std::{env, sync::Arc, sync::Once, time::Duration};

use sqlx::{postgres::PgPoolOptions, PgPool};

use crate::{
    common::error::AppError,
    db::{LedgerStore, PgLedgerStore, UserDirectory, UserRepository},
    services::{
        auth::AuthService,
        inventory_service::InventoryService,
        rate_limit::{LoginRateLimiter, RateLimitPolicy},
        scope::ScopeResolver,
        token::TokenCodec,
    },
};

// Segredo usado apenas fora de produção quando JWT_SECRET não existe.
const DEV_JWT_SECRET: &str = "dev-insecure-jwt-secret-change-me";
const DEFAULT_JWT_TTL: &str = "12h";

static DEV_SECRET_WARNING: Once = Once::new();

// Tudo o que vem do ambiente, já validado.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub db_max_connections: u32,
    pub bind_addr: String,
    pub production: bool,
    pub jwt_secret: String,
    pub jwt_ttl: chrono::Duration,
    pub allow_legacy_headers: bool,
    pub allow_public_catalog: bool,
    pub login: RateLimitPolicy,
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Monta a configuração a partir de qualquer fonte chave → valor.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let production = lookup("APP_ENV")
            .map(|v| v.trim().eq_ignore_ascii_case("production"))
            .unwrap_or(false);

        let database_url = lookup("DATABASE_URL")
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| AppError::Fatal("DATABASE_URL deve ser definida".into()))?;

        let jwt_secret = resolve_jwt_secret(production, lookup("JWT_SECRET"))?;

        let ttl_raw = lookup("JWT_EXPIRES_IN").unwrap_or_else(|| DEFAULT_JWT_TTL.to_string());
        let jwt_ttl = parse_ttl(&ttl_raw)
            .ok_or_else(|| AppError::Fatal(format!("JWT_EXPIRES_IN inválido: {ttl_raw}")))?;

        let defaults = RateLimitPolicy::default();
        let login = RateLimitPolicy {
            max_failures: parse_number(&lookup, "LOGIN_MAX_ATTEMPTS", defaults.max_failures)
                .and_then(|n| match n {
                    0 => Err(AppError::Fatal("LOGIN_MAX_ATTEMPTS deve ser maior que zero".into())),
                    n => Ok(n),
                })?,
            window: parse_minutes(&lookup, "LOGIN_WINDOW_MINUTES", defaults.window)?,
            lockout: parse_minutes(&lookup, "LOGIN_LOCKOUT_MINUTES", defaults.lockout)?,
        };

        Ok(Self {
            database_url,
            db_max_connections: parse_number(&lookup, "DB_MAX_CONNECTIONS", 5)?,
            bind_addr: lookup("BIND_ADDR").unwrap_or_else(|| "0.0.0.0:3000".to_string()),
            production,
            jwt_secret,
            jwt_ttl,
            allow_legacy_headers: parse_flag(lookup("ALLOW_LEGACY_HEADERS").as_deref()),
            allow_public_catalog: parse_flag(lookup("ALLOW_PUBLIC_CATALOG").as_deref()),
            login,
        })
    }
}

/// Em produção a ausência do segredo impede o arranque; fora dela usa-se
/// um segredo fixo de desenvolvimento, com um único aviso no log.
pub fn resolve_jwt_secret(production: bool, configured: Option<String>) -> Result<String, AppError> {
    match configured.filter(|s| !s.trim().is_empty()) {
        Some(secret) => Ok(secret),
        None if production => Err(AppError::Fatal(
            "JWT_SECRET deve ser definido em produção".into(),
        )),
        None => {
            DEV_SECRET_WARNING.call_once(|| {
                tracing::warn!("⚠️ JWT_SECRET ausente: usando segredo de desenvolvimento");
            });
            Ok(DEV_JWT_SECRET.to_string())
        }
    }
}

/// "45s", "30m", "12h", "7d" ou segundos puros.
pub fn parse_ttl(raw: &str) -> Option<chrono::Duration> {
    let raw = raw.trim();
    let (digits, unit) = match raw.char_indices().last()? {
        (idx, c) if c.is_ascii_alphabetic() => (&raw[..idx], c.to_ascii_lowercase()),
        _ => (raw, 's'),
    };
    let amount: i64 = digits.trim().parse().ok().filter(|n| *n > 0)?;
    match unit {
        's' => chrono::Duration::try_seconds(amount),
        'm' => chrono::Duration::try_minutes(amount),
        'h' => chrono::Duration::try_hours(amount),
        'd' => chrono::Duration::try_days(amount),
        _ => None,
    }
}

fn parse_flag(raw: Option<&str>) -> bool {
    matches!(
        raw.map(|v| v.trim().to_ascii_lowercase()).as_deref(),
        Some("1" | "true" | "yes" | "on")
    )
}

fn parse_number<F, T>(lookup: &F, key: &str, default: T) -> Result<T, AppError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| AppError::Fatal(format!("{key} inválido: {raw}"))),
    }
}

// Um ano. Acima disso `agora + duração` pode estourar o DateTime.
const MAX_POLICY_MINUTES: i64 = 60 * 24 * 366;

// Minutos positivos e limitados.
fn parse_minutes<F>(lookup: &F, key: &str, default: chrono::Duration) -> Result<chrono::Duration, AppError>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = lookup(key) else {
        return Ok(default);
    };
    raw.trim()
        .parse::<i64>()
        .ok()
        .filter(|n| (1..=MAX_POLICY_MINUTES).contains(n))
        .and_then(chrono::Duration::try_minutes)
        .ok_or_else(|| AppError::Fatal(format!("{key} inválido: {raw}")))
}

// O estado compartilhado que será acessível em toda a aplicação
#[derive(Clone)]
pub struct AppState {
    pub token_codec: TokenCodec,
    pub scope_resolver: ScopeResolver,
    pub auth_service: AuthService,
    pub inventory_service: InventoryService,
}

impl AppState {
    /// Conecta ao Postgres e monta o gráfico de dependências.
    pub async fn connect(config: &Config) -> Result<(Self, PgPool), AppError> {
        let db_pool = PgPoolOptions::new()
            .max_connections(config.db_max_connections)
            .acquire_timeout(Duration::from_secs(3))
            .connect(&config.database_url)
            .await?;

        tracing::info!("✅ Conexão com o banco de dados estabelecida com sucesso!");

        let ledger: Arc<dyn LedgerStore> = Arc::new(PgLedgerStore::new(db_pool.clone()));
        let users: Arc<dyn UserDirectory> = Arc::new(UserRepository::new(db_pool.clone()));

        Ok((Self::from_parts(config, ledger, users), db_pool))
    }

    /// Monta o estado com armazenamentos arbitrários (Postgres ou memória).
    pub fn from_parts(
        config: &Config,
        ledger: Arc<dyn LedgerStore>,
        users: Arc<dyn UserDirectory>,
    ) -> Self {
        let token_codec = TokenCodec::new(&config.jwt_secret, config.jwt_ttl);
        let limiter = Arc::new(LoginRateLimiter::new(config.login.clone()));

        Self {
            scope_resolver: ScopeResolver::new(
                config.allow_legacy_headers,
                config.allow_public_catalog,
            ),
            auth_service: AuthService::new(users, token_codec.clone(), limiter),
            inventory_service: InventoryService::new(ledger),
            token_codec,
        }
    }
}
