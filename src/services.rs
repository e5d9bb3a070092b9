pub mod auth;
pub mod inventory_service;
pub mod rate_limit;
pub mod scope;
pub mod token;
