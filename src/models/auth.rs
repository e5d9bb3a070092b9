// src/models/auth.rs

use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

// ---
// Rol do usuário
// ---
// Único lugar onde os papéis existem como tipo. As permissões ficam aqui
// também, para não espalhar listas de strings pelos handlers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "user_role", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Superadmin,
    Admin,
    Cajero,
    Mesero,
    Repartidor,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Superadmin => "superadmin",
            Role::Admin => "admin",
            Role::Cajero => "cajero",
            Role::Mesero => "mesero",
            Role::Repartidor => "repartidor",
        }
    }

    /// Pode escolher qualquer local via cabeçalho.
    pub fn is_superadmin(&self) -> bool {
        matches!(self, Role::Superadmin)
    }

    /// Pode escolher o local via cabeçalho quando o token não traz nenhum.
    pub fn can_self_assign_tenant(&self) -> bool {
        matches!(self, Role::Admin)
    }

    pub fn can_view_inventory(&self) -> bool {
        matches!(self, Role::Superadmin | Role::Admin | Role::Cajero)
    }

    pub fn can_post_movements(&self) -> bool {
        matches!(self, Role::Superadmin | Role::Admin | Role::Cajero)
    }

    /// Criar, editar e excluir insumos.
    pub fn can_manage_inventory(&self) -> bool {
        matches!(self, Role::Superadmin | Role::Admin)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = ();

    // Aceita o valor como vem do cabeçalho: sem diferenciar maiúsculas e com espaços.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "superadmin" => Ok(Role::Superadmin),
            "admin" => Ok(Role::Admin),
            "cajero" => Ok(Role::Cajero),
            "mesero" => Ok(Role::Mesero),
            "repartidor" => Ok(Role::Repartidor),
            _ => Err(()),
        }
    }
}

// Representa um usuário vindo do banco de dados
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    pub email: String,

    #[serde(skip_serializing)] // IMPORTANTE para segurança
    pub password_hash: String,

    pub rol: Role,
    pub local_id: Option<Uuid>,
    pub activo: bool,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// Dados para login
#[derive(Debug, Deserialize, Validate)]
pub struct LoginUserPayload {
    #[validate(email(message = "O e-mail fornecido é inválido."))]
    pub email: String,
    #[validate(length(min = 1, message = "A senha é obrigatória."))]
    pub password: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    pub id: Uuid,
    pub email: String,
    pub rol: Role,
    pub local_id: Option<Uuid>,
}

impl From<&User> for UserSummary {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            email: user.email.clone(),
            rol: user.rol,
            local_id: user.local_id,
        }
    }
}

// Resposta de autenticação com o token
#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub token: String,
    pub usuario: UserSummary,
}

// Estrutura de dados ("claims") dentro do JWT.
// `id` e `localId` ficam como texto: quem valida o formato é o resolvedor
// de escopo, que precisa distinguir "token inválido" de "sem token".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub id: String,
    pub rol: Role,
    #[serde(rename = "localId")]
    pub local_id: Option<String>,
    pub exp: usize, // Expiration time (quando o token expira)
    pub iat: usize, // Issued At (quando o token foi criado)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_parsing_is_case_insensitive_and_trimmed() {
        assert_eq!("  Admin ".parse::<Role>(), Ok(Role::Admin));
        assert_eq!("MESERO".parse::<Role>(), Ok(Role::Mesero));
        assert!("gerente".parse::<Role>().is_err());
        assert!("".parse::<Role>().is_err());
    }

    #[test]
    fn capabilities_are_centralised() {
        assert!(Role::Cajero.can_post_movements());
        assert!(!Role::Cajero.can_manage_inventory());
        assert!(!Role::Mesero.can_view_inventory());
        assert!(!Role::Repartidor.can_post_movements());
        assert!(Role::Admin.can_self_assign_tenant());
        assert!(!Role::Cajero.can_self_assign_tenant());
        assert!(Role::Superadmin.can_manage_inventory());
    }

    #[test]
    fn claims_use_camel_case_local_id() {
        let claims = Claims {
            id: Uuid::nil().to_string(),
            rol: Role::Cajero,
            local_id: None,
            exp: 10,
            iat: 1,
        };
        let value = serde_json::to_value(&claims).unwrap();
        assert!(value.get("localId").unwrap().is_null());
        assert_eq!(value["rol"], "cajero");
    }
}
