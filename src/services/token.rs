// src/services/token.rs

use chrono::Utc;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};

use crate::{
    common::error::AppError,
    models::auth::{Claims, User},
};

/// Assina e verifica o token de identidade `{id, rol, localId}`.
#[derive(Clone)]
pub struct TokenCodec {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    ttl: chrono::Duration,
}

impl TokenCodec {
    pub fn new(secret: &str, ttl: chrono::Duration) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            ttl,
        }
    }

    pub fn sign(&self, user: &User) -> Result<String, AppError> {
        let now = Utc::now();
        let expires_at = now + self.ttl;

        let claims = Claims {
            id: user.id.to_string(),
            rol: user.rol,
            local_id: user.local_id.map(|id| id.to_string()),
            exp: expires_at.timestamp() as usize,
            iat: now.timestamp() as usize,
        };

        Ok(encode(&Header::default(), &claims, &self.encoding_key)?)
    }

    /// Nunca falha para o chamador: token malformado, expirado ou com
    /// assinatura errada vira `None`, igual a "sem token".
    pub fn verify(&self, token: &str) -> Option<Claims> {
        decode::<Claims>(token.trim(), &self.decoding_key, &Validation::default())
            .map(|data| data.claims)
            .map_err(|e| tracing::debug!("token descartado: {}", e))
            .ok()
    }
}
