// src/services/scope.rs

use axum::http::{HeaderMap, Method};
use uuid::Uuid;

use crate::{
    common::error::AppError,
    models::{
        auth::{Claims, Role},
        scope::{RequestScope, ScopeSource},
    },
};

pub const LOCAL_ID_HEADER: &str = "x-local-id";
pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_ROLE_HEADER: &str = "x-user-role";

// Rotas GET abertas ao catálogo público (quando habilitado).
// `*` casa exatamente um segmento.
const PUBLIC_CATALOG_ROUTES: &[&str] = &[
    "/api/productos",
    "/api/productos/*",
    "/api/agregados",
    "/api/config/social",
];

/// Resolve (local, usuário, rol) de cada pedido. Função pura: pode ser
/// chamada quantas vezes for preciso.
#[derive(Debug, Clone, Copy)]
pub struct ScopeResolver {
    allow_legacy_headers: bool,
    allow_public_catalog: bool,
}

impl ScopeResolver {
    pub fn new(allow_legacy_headers: bool, allow_public_catalog: bool) -> Self {
        Self {
            allow_legacy_headers,
            allow_public_catalog,
        }
    }

    pub fn legacy_headers_enabled(&self) -> bool {
        self.allow_legacy_headers
    }

    pub fn resolve(
        &self,
        claims: Option<&Claims>,
        headers: &HeaderMap,
        method: &Method,
        path: &str,
    ) -> Result<RequestScope, AppError> {
        let header_local = header_id(headers, LOCAL_ID_HEADER, || AppError::InvalidTenantId)?;

        // 1. Token válido: é a única fonte de verdade.
        if let Some(claims) = claims {
            return scope_from_claims(claims, header_local);
        }

        // 2. Sem token, cabeçalhos legados habilitados.
        if self.allow_legacy_headers {
            return scope_from_legacy_headers(headers, header_local);
        }

        // 3. Sem token: só o catálogo público, e com local obrigatório.
        if self.allow_public_catalog && is_public_catalog_route(method, path) {
            let local_id = header_local.ok_or(AppError::TenantRequired)?;
            return Ok(RequestScope::public(local_id));
        }

        Err(AppError::Unauthenticated)
    }
}

fn scope_from_claims(claims: &Claims, header_local: Option<Uuid>) -> Result<RequestScope, AppError> {
    let usuario_id = parse_id(&claims.id).ok_or(AppError::InvalidCredentialPayload)?;
    let bound_local = match claims.local_id.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(raw) => Some(parse_id(raw).ok_or(AppError::InvalidCredentialPayload)?),
    };

    let role = claims.rol;
    let local_id = match (bound_local, header_local) {
        // Superadmin escolhe qualquer local pelo cabeçalho.
        (bound, header) if role.is_superadmin() => header.or(bound),
        (Some(bound), Some(header)) if header != bound => {
            return Err(AppError::Forbidden(
                "o local informado não corresponde ao do token".into(),
            ));
        }
        (Some(bound), _) => Some(bound),
        (None, header) if role.can_self_assign_tenant() => header,
        (None, Some(_)) => {
            return Err(AppError::Forbidden(
                "este rol não pode escolher o local".into(),
            ));
        }
        (None, None) => None,
    };

    tracing::debug!(usuario = %usuario_id, rol = %role, local = ?local_id, "escopo via token");

    Ok(RequestScope {
        local_id,
        usuario_id: Some(usuario_id),
        rol: Some(role),
        origen: ScopeSource::Token,
    })
}

fn scope_from_legacy_headers(
    headers: &HeaderMap,
    header_local: Option<Uuid>,
) -> Result<RequestScope, AppError> {
    let usuario_id = header_id(headers, USER_ID_HEADER, || AppError::InvalidUserId)?;
    let rol = header_role(headers);

    tracing::debug!(usuario = ?usuario_id, rol = ?rol, local = ?header_local, "escopo via cabeçalhos legados");

    Ok(RequestScope {
        local_id: header_local,
        usuario_id,
        rol,
        origen: ScopeSource::LegacyHeaders,
    })
}

/// Rol do cabeçalho `x-user-role`; vazio ou desconhecido vira `None`.
pub fn header_role(headers: &HeaderMap) -> Option<Role> {
    headers
        .get(USER_ROLE_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
}

fn header_id(
    headers: &HeaderMap,
    name: &str,
    invalid: fn() -> AppError,
) -> Result<Option<Uuid>, AppError> {
    let Some(value) = headers.get(name) else {
        return Ok(None);
    };
    let raw = value.to_str().map_err(|_| invalid())?.trim();
    if raw.is_empty() {
        return Ok(None);
    }
    parse_id(raw).map(Some).ok_or_else(invalid)
}

fn parse_id(raw: &str) -> Option<Uuid> {
    Uuid::parse_str(raw.trim()).ok()
}

pub fn is_public_catalog_route(method: &Method, path: &str) -> bool {
    if method != Method::GET {
        return false;
    }
    let path = path.trim_end_matches('/');
    PUBLIC_CATALOG_ROUTES.iter().any(|pattern| route_matches(pattern, path))
}

fn route_matches(pattern: &str, path: &str) -> bool {
    let mut pattern_segments = pattern.split('/');
    let mut path_segments = path.split('/');
    loop {
        match (pattern_segments.next(), path_segments.next()) {
            (None, None) => return true,
            (Some("*"), Some(segment)) if !segment.is_empty() => continue,
            (Some(p), Some(s)) if p == s => continue,
            _ => return false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn claims(rol: Role, local: Option<Uuid>) -> Claims {
        Claims {
            id: Uuid::new_v4().to_string(),
            rol,
            local_id: local.map(|l| l.to_string()),
            exp: usize::MAX,
            iat: 0,
        }
    }

    fn headers(pairs: &[(&'static str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(*name, HeaderValue::from_str(value).unwrap());
        }
        map
    }

    fn strict() -> ScopeResolver {
        ScopeResolver::new(false, false)
    }

    #[test]
    fn token_tenant_is_used_when_no_header() {
        let local = Uuid::new_v4();
        let c = claims(Role::Cajero, Some(local));
        let scope = strict()
            .resolve(Some(&c), &HeaderMap::new(), &Method::GET, "/api/insumos")
            .unwrap();

        assert_eq!(scope.local_id, Some(local));
        assert_eq!(scope.usuario_id, Some(c.id.parse().unwrap()));
        assert_eq!(scope.rol, Some(Role::Cajero));
        assert_eq!(scope.origen, ScopeSource::Token);
    }

    #[test]
    fn matching_header_confirms_token_tenant() {
        let local = Uuid::new_v4();
        let scope = strict()
            .resolve(
                Some(&claims(Role::Admin, Some(local))),
                &headers(&[(LOCAL_ID_HEADER, local.to_string().as_str())]),
                &Method::GET,
                "/api/insumos",
            )
            .unwrap();
        assert_eq!(scope.local_id, Some(local));
    }

    #[test]
    fn contradicting_header_is_forbidden() {
        let result = strict().resolve(
            Some(&claims(Role::Admin, Some(Uuid::new_v4()))),
            &headers(&[(LOCAL_ID_HEADER, Uuid::new_v4().to_string().as_str())]),
            &Method::GET,
            "/api/insumos",
        );
        assert!(matches!(result, Err(AppError::Forbidden(_))));
    }

    #[test]
    fn superadmin_selects_any_tenant() {
        let other = Uuid::new_v4();
        let scope = strict()
            .resolve(
                Some(&claims(Role::Superadmin, Some(Uuid::new_v4()))),
                &headers(&[(LOCAL_ID_HEADER, other.to_string().as_str())]),
                &Method::GET,
                "/api/insumos",
            )
            .unwrap();
        assert_eq!(scope.local_id, Some(other));
    }

    #[test]
    fn admin_without_tenant_self_assigns_but_cajero_cannot() {
        let chosen = Uuid::new_v4();
        let h = headers(&[(LOCAL_ID_HEADER, chosen.to_string().as_str())]);

        let admin = strict()
            .resolve(Some(&claims(Role::Admin, None)), &h, &Method::GET, "/api/insumos")
            .unwrap();
        assert_eq!(admin.local_id, Some(chosen));

        let cajero = strict().resolve(Some(&claims(Role::Cajero, None)), &h, &Method::GET, "/api/insumos");
        assert!(matches!(cajero, Err(AppError::Forbidden(_))));

        let no_header = strict()
            .resolve(Some(&claims(Role::Cajero, None)), &HeaderMap::new(), &Method::GET, "/")
            .unwrap();
        assert_eq!(no_header.local_id, None);
    }

    #[test]
    fn token_ignores_legacy_identity_headers() {
        let local = Uuid::new_v4();
        let c = claims(Role::Mesero, Some(local));
        let scope = ScopeResolver::new(true, true)
            .resolve(
                Some(&c),
                &headers(&[
                    (USER_ROLE_HEADER, "superadmin"),
                    (USER_ID_HEADER, Uuid::new_v4().to_string().as_str()),
                ]),
                &Method::GET,
                "/api/restaurante/mesas",
            )
            .unwrap();
        assert_eq!(scope.rol, Some(Role::Mesero));
        assert_eq!(scope.usuario_id, Some(c.id.parse().unwrap()));
    }

    #[test]
    fn token_bound_tenant_never_escapes_without_legacy_headers() {
        let bound = Uuid::new_v4();
        let foreign = Uuid::new_v4().to_string();
        let header_sets: Vec<HeaderMap> = vec![
            HeaderMap::new(),
            headers(&[(LOCAL_ID_HEADER, foreign.as_str())]),
            headers(&[(LOCAL_ID_HEADER, foreign.as_str()), (USER_ROLE_HEADER, "superadmin")]),
            headers(&[(USER_ID_HEADER, foreign.as_str()), (USER_ROLE_HEADER, "admin")]),
            headers(&[(LOCAL_ID_HEADER, "")]),
        ];

        for role in [Role::Admin, Role::Cajero, Role::Mesero, Role::Repartidor] {
            for h in &header_sets {
                let c = claims(role, Some(bound));
                match ScopeResolver::new(false, true).resolve(Some(&c), h, &Method::GET, "/api/productos") {
                    Ok(scope) => assert_eq!(scope.local_id, Some(bound)),
                    Err(e) => assert!(matches!(e, AppError::Forbidden(_))),
                }
            }
        }
    }

    #[test]
    fn malformed_identifiers_are_distinguished() {
        let bad_local = strict().resolve(
            Some(&claims(Role::Admin, None)),
            &headers(&[(LOCAL_ID_HEADER, "not-a-uuid")]),
            &Method::GET,
            "/api/insumos",
        );
        assert!(matches!(bad_local, Err(AppError::InvalidTenantId)));

        let mut bad_claims = claims(Role::Admin, None);
        bad_claims.id = "42".into();
        let bad_token = strict().resolve(Some(&bad_claims), &HeaderMap::new(), &Method::GET, "/");
        assert!(matches!(bad_token, Err(AppError::InvalidCredentialPayload)));

        let mut bad_token_local = claims(Role::Admin, None);
        bad_token_local.local_id = Some("loja-1".into());
        let result = strict().resolve(Some(&bad_token_local), &HeaderMap::new(), &Method::GET, "/");
        assert!(matches!(result, Err(AppError::InvalidCredentialPayload)));

        let bad_user = ScopeResolver::new(true, false).resolve(
            None,
            &headers(&[(USER_ID_HEADER, "xyz")]),
            &Method::GET,
            "/api/insumos",
        );
        assert!(matches!(bad_user, Err(AppError::InvalidUserId)));
    }

    #[test]
    fn no_token_and_no_legacy_headers_is_unauthenticated() {
        let result = strict().resolve(None, &HeaderMap::new(), &Method::GET, "/api/insumos");
        assert!(matches!(result, Err(AppError::Unauthenticated)));

        // Catálogo desabilitado: mesmo a rota pública exige autenticação.
        let local = Uuid::new_v4().to_string();
        let result = strict().resolve(
            None,
            &headers(&[(LOCAL_ID_HEADER, local.as_str())]),
            &Method::GET,
            "/api/productos",
        );
        assert!(matches!(result, Err(AppError::Unauthenticated)));
    }

    #[test]
    fn public_catalog_requires_valid_tenant_header() {
        let resolver = ScopeResolver::new(false, true);
        let local = Uuid::new_v4();

        let scope = resolver
            .resolve(
                None,
                &headers(&[(LOCAL_ID_HEADER, local.to_string().as_str())]),
                &Method::GET,
                "/api/productos/abc123",
            )
            .unwrap();
        assert_eq!(scope.local_id, Some(local));
        assert_eq!(scope.usuario_id, None);
        assert_eq!(scope.role_name(), "public");

        let missing = resolver.resolve(None, &HeaderMap::new(), &Method::GET, "/api/agregados");
        assert!(matches!(missing, Err(AppError::TenantRequired)));

        let invalid = resolver.resolve(
            None,
            &headers(&[(LOCAL_ID_HEADER, "loja")]),
            &Method::GET,
            "/api/config/social",
        );
        assert!(matches!(invalid, Err(AppError::InvalidTenantId)));

        // Fora da lista, ou com outro método, continua fechado.
        let post = resolver.resolve(
            None,
            &headers(&[(LOCAL_ID_HEADER, local.to_string().as_str())]),
            &Method::POST,
            "/api/productos",
        );
        assert!(matches!(post, Err(AppError::Unauthenticated)));
        let other = resolver.resolve(
            None,
            &headers(&[(LOCAL_ID_HEADER, local.to_string().as_str())]),
            &Method::GET,
            "/api/insumos",
        );
        assert!(matches!(other, Err(AppError::Unauthenticated)));
    }

    #[test]
    fn legacy_headers_are_trusted_when_enabled() {
        let local = Uuid::new_v4();
        let user = Uuid::new_v4();
        let scope = ScopeResolver::new(true, false)
            .resolve(
                None,
                &headers(&[
                    (LOCAL_ID_HEADER, local.to_string().as_str()),
                    (USER_ID_HEADER, user.to_string().as_str()),
                    (USER_ROLE_HEADER, "  CAJERO "),
                ]),
                &Method::POST,
                "/api/insumos",
            )
            .unwrap();

        assert_eq!(scope.local_id, Some(local));
        assert_eq!(scope.usuario_id, Some(user));
        assert_eq!(scope.rol, Some(Role::Cajero));
        assert_eq!(scope.origen, ScopeSource::LegacyHeaders);

        let anonymous = ScopeResolver::new(true, false)
            .resolve(None, &HeaderMap::new(), &Method::GET, "/api/insumos")
            .unwrap();
        assert_eq!(anonymous.rol, None);
        assert_eq!(anonymous.role_name(), "");
    }

    #[test]
    fn resolution_is_idempotent() {
        let c = claims(Role::Admin, Some(Uuid::new_v4()));
        let h = HeaderMap::new();
        let first = strict().resolve(Some(&c), &h, &Method::GET, "/api/insumos").unwrap();
        let second = strict().resolve(Some(&c), &h, &Method::GET, "/api/insumos").unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn public_route_matching() {
        assert!(is_public_catalog_route(&Method::GET, "/api/productos/"));
        assert!(is_public_catalog_route(&Method::GET, "/api/productos/42"));
        assert!(!is_public_catalog_route(&Method::GET, "/api/productos/42/precio"));
        assert!(!is_public_catalog_route(&Method::GET, "/api/productosx"));
        assert!(!is_public_catalog_route(&Method::DELETE, "/api/productos/42"));
    }
}
