pub mod check;
pub mod health;
pub mod roles;
pub mod tenants;
