// src/models/scope.rs

use serde::Serialize;
use uuid::Uuid;

use super::auth::Role;

/// De onde veio a identidade do pedido.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScopeSource {
    Token,
    LegacyHeaders,
    PublicCatalog,
}

/// Escopo resolvido uma única vez por pedido: (local, usuário, rol).
/// Imutável; os handlers recebem por extrator, nunca alteram.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestScope {
    pub local_id: Option<Uuid>,
    pub usuario_id: Option<Uuid>,
    /// `None` = sem rol reconhecido (cabeçalho vazio/desconhecido ou público).
    pub rol: Option<Role>,
    pub origen: ScopeSource,
}

impl RequestScope {
    pub fn public(local_id: Uuid) -> Self {
        Self {
            local_id: Some(local_id),
            usuario_id: None,
            rol: None,
            origen: ScopeSource::PublicCatalog,
        }
    }

    /// Nome do rol como o resto do sistema o vê ("public" no catálogo aberto).
    pub fn role_name(&self) -> &'static str {
        match (self.rol, self.origen) {
            (Some(role), _) => role.as_str(),
            (None, ScopeSource::PublicCatalog) => "public",
            (None, _) => "",
        }
    }
}
