// src/services/auth.rs

use std::{net::IpAddr, sync::Arc};

use bcrypt::verify;
use chrono::Utc;

use crate::{
    common::error::AppError,
    db::UserDirectory,
    models::auth::{AuthResponse, UserSummary},
    services::{
        rate_limit::{AttemptKey, AttemptPermit, LoginRateLimiter},
        token::TokenCodec,
    },
};

#[derive(Clone)]
pub struct AuthService {
    users: Arc<dyn UserDirectory>,
    codec: TokenCodec,
    limiter: Arc<LoginRateLimiter>,
}

impl AuthService {
    pub fn new(users: Arc<dyn UserDirectory>, codec: TokenCodec, limiter: Arc<LoginRateLimiter>) -> Self {
        Self {
            users,
            codec,
            limiter,
        }
    }

    pub async fn login(&self, ip: IpAddr, email: &str, password: &str) -> Result<AuthResponse, AppError> {
        let key = AttemptKey::new(ip, email);

        // A reserva vale até o fim da verificação; erro de infraestrutura a devolve no drop.
        let permit = self.limiter.try_begin(&key).map_err(|rejection| AppError::RateLimited {
            retry_after_secs: rejection.retry_after_secs(Utc::now()),
        })?;

        // E-mail desconhecido, usuário inativo e senha errada: mesma resposta.
        let user = match self.users.find_by_email(email.trim()).await? {
            Some(user) if user.activo => user,
            _ => return Err(Self::fail(permit)),
        };

        let password_clone = password.to_owned();
        let password_hash_clone = user.password_hash.clone();

        // Executa a verificação em um thread separado
        let is_password_valid = tokio::task::spawn_blocking(move || {
            verify(&password_clone, &password_hash_clone)
        })
        .await
        .map_err(|e| anyhow::anyhow!("Falha na task de verificação de senha: {}", e))??;

        if !is_password_valid {
            return Err(Self::fail(permit));
        }

        permit.succeed();
        let token = self.codec.sign(&user)?;
        tracing::info!(usuario = %user.id, rol = %user.rol, "login efetuado");

        Ok(AuthResponse {
            token,
            usuario: UserSummary::from(&user),
        })
    }

    // O próprio limitador avisa no log quando a chave bloqueia.
    fn fail(permit: AttemptPermit<'_>) -> AppError {
        permit.fail();
        AppError::InvalidCredentials
    }
}
