//! # Tenancy RBAC
//!
//! Single allow/deny decisions for organization-scoped actions.
//!
//! ## Overview
//!
//! The tenancy-rbac crate handles:
//! - **Actions**: The catalogue of organization-scoped actions
//! - **Feature gates**: Which license feature each gated action requires
//! - **Role defaults**: What owner, admin, member and viewer may do
//! - **Resolver**: Composes membership, license and role into one decision
//!
//! ## Evaluation order
//!
//! ```text
//! 1. active membership?            no  → deny
//! 2. valid license?                no  → basic actions only
//!    action feature-gated?         yes → license must carry the feature
//! 3. owner / admin / member / viewer role defaults
//! 4. custom role                       → explicit permission set
//! ```
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tenancy_core::CacheStore;
//! use tenancy_license::LicenseEngine;
//! use tenancy_org::HierarchyManager;
//! use tenancy_rbac::AccessResolver;
//! use uuid::Uuid;
//!
//! # async fn example(
//! #     hierarchy: Arc<HierarchyManager>,
//! #     licenses: Arc<LicenseEngine>,
//! #     cache: Arc<dyn CacheStore>,
//! # ) {
//! let resolver = AccessResolver::new(hierarchy, licenses, cache);
//! let (user, org) = (Uuid::now_v7(), Uuid::now_v7());
//! if resolver.can_perform(user, org, "deploy_applications", Some("app-42")).await {
//!     // deploy
//! }
//! # }
//! ```

pub mod actions;
pub mod policy;
pub mod resolver;

// Re-export main types for convenience
pub use actions::{Action, BASIC_ACTIONS};
pub use resolver::{AccessResolver, Decision};
