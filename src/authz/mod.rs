//! Authorization module - the scoped RBAC policy engine.
//!
//! This module implements the decision side of the engine:
//! - Principal and target facts for scope resolution
//! - The pure `can_perform` evaluator over a registry snapshot
//! - Super admin bypass (recorded, never invisible)
//! - The bounded LRU decision cache keyed on registry version

mod cache;
mod evaluator;
mod principal;
mod resolver;

pub use cache::{DecisionCache, DecisionKey, DEFAULT_CACHE_CAPACITY};
pub use evaluator::can_perform;
pub use principal::{Principal, Target};
pub use resolver::{resolve_principal, Identity, Membership, MembershipSource, StaticDirectory};
