// src/policy.rs

//! Authorization decisions for parts.
//!
//! Every handler asks [`authorize`] with the caller, the action, and the part
//! together with its ancestors and the caller's role on the part's module.
//! Nothing else decides access, so the rules below are the whole policy.

use sqlx::SqlitePool;

use crate::error::AppError;
use crate::models::part::{Ancestor, Part, PartStatus, PartType};
use crate::models::user::PartRole;
use crate::repositories::PartRepo;
use crate::utils::jwt::Claims;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    View,
    Edit,
    Delete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny,
}

/// The authenticated caller.
#[derive(Debug, Clone, Copy)]
pub struct Subject {
    pub user_id: i64,
    pub is_admin: bool,
}

impl TryFrom<&Claims> for Subject {
    type Error = AppError;

    fn try_from(claims: &Claims) -> Result<Self, Self::Error> {
        Ok(Self {
            user_id: claims.user_id()?,
            is_admin: claims.is_admin(),
        })
    }
}

/// A part plus the subject's role on the module it belongs to.
#[derive(Debug, Clone, Copy)]
pub struct PartResource<'a> {
    pub part: &'a Part,
    /// Nearest first, ending with the module.
    pub ancestors: &'a [Ancestor],
    pub role: Option<PartRole>,
}

pub fn authorize(subject: &Subject, action: Action, resource: &PartResource<'_>) -> Decision {
    if subject.is_admin || resource.role == Some(PartRole::Owner) {
        return Decision::Allow;
    }

    let allowed = match action {
        // A part is only as visible as everything above it.
        Action::View => {
            visible(resource.part.part_type, resource.part.status, resource.role)
                && resource
                    .ancestors
                    .iter()
                    .all(|a| visible(a.part_type, a.status, resource.role))
        }
        Action::Edit | Action::Delete => false,
    };

    if allowed { Decision::Allow } else { Decision::Deny }
}

fn visible(part_type: PartType, status: PartStatus, role: Option<PartRole>) -> bool {
    match (part_type, status) {
        (PartType::Module, PartStatus::Available) => true,
        (PartType::Module, PartStatus::Archived) => role.is_some(),
        (_, PartStatus::Available) => role == Some(PartRole::Student),
        _ => false,
    }
}

/// What [`authorize`] needs beyond the part itself.
#[derive(Debug, Clone, Default)]
pub struct PartContext {
    pub ancestors: Vec<Ancestor>,
    pub role: Option<PartRole>,
}

impl PartContext {
    pub fn resource<'a>(&'a self, part: &'a Part) -> PartResource<'a> {
        PartResource { part, ancestors: &self.ancestors, role: self.role }
    }
}

/// Loads the part's ancestors and the subject's role on its module.
pub async fn load_context(
    pool: &SqlitePool,
    subject: &Subject,
    part: &Part,
) -> Result<PartContext, AppError> {
    let ancestors = match part.parent_id {
        Some(_) => PartRepo::ancestors(pool, part.id).await?,
        None => Vec::new(),
    };
    let module_id = match part.part_type {
        PartType::Module => Some(part.id),
        _ => ancestors
            .iter()
            .find(|a| a.part_type == PartType::Module)
            .map(|a| a.id),
    };
    let role = match module_id {
        Some(module_id) => PartRepo::role_for(pool, subject.user_id, module_id).await?,
        None => None,
    };
    Ok(PartContext { ancestors, role })
}

/// Evaluates the policy and turns a denial into `403 Forbidden`.
pub async fn require(
    pool: &SqlitePool,
    subject: &Subject,
    action: Action,
    part: &Part,
) -> Result<(), AppError> {
    let context = load_context(pool, subject, part).await?;
    match authorize(subject, action, &context.resource(part)) {
        Decision::Allow => Ok(()),
        Decision::Deny => {
            tracing::debug!(user_id = subject.user_id, part_id = part.id, ?action, "Access denied");
            Err(AppError::Forbidden(format!("Not allowed to {:?} this part", action).to_lowercase()))
        }
    }
}
