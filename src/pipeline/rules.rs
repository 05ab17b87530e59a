//! Rule engine — maps a classification onto a moderation decision.

use std::sync::Arc;

use tracing::debug;

use crate::error::StorageError;
use crate::model::{AutoAction, Category, ContentStatus, ModerationRule};
use crate::store::Storage;

/// Outcome of a rule decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    pub status: ContentStatus,
    pub flagged: bool,
}

impl Decision {
    const APPROVED: Self = Self {
        status: ContentStatus::Approved,
        flagged: false,
    };
}

/// Pure decision core. At most one rule is consulted per category: the
/// first active rule matching it.
///
/// Policy when no active rule exists for a non-safe category: approved and
/// unflagged, unless the classifier itself signalled `flagged_hint` — then
/// the content goes to review (pending, flagged). An active rule's own
/// threshold always overrides the hint.
///
/// Edge case: a triggered rule whose action is `none` is contradictory
/// (flagged content with no action); it resolves to pending.
pub fn decide_with_rules(
    rules: &[ModerationRule],
    category: Category,
    confidence: u8,
    flagged_hint: bool,
) -> Decision {
    if category == Category::Safe {
        return Decision::APPROVED;
    }

    let Some(rule) = rules.iter().find(|r| r.category == category && r.active) else {
        if flagged_hint {
            return Decision {
                status: ContentStatus::Pending,
                flagged: true,
            };
        }
        return Decision::APPROVED;
    };

    let flagged = confidence >= rule.sensitivity;
    if !flagged {
        return Decision::APPROVED;
    }

    let status = match rule.auto_action {
        AutoAction::AutoRemove => ContentStatus::Removed,
        AutoAction::FlagForReview | AutoAction::None => ContentStatus::Pending,
    };
    Decision { status, flagged }
}

/// Rule engine reading the active rule set from storage at decision time,
/// so rule edits take effect for subsequent decisions immediately.
pub struct RuleEngine {
    store: Arc<dyn Storage>,
}

impl RuleEngine {
    pub fn new(store: Arc<dyn Storage>) -> Self {
        Self { store }
    }

    pub async fn decide(
        &self,
        category: Category,
        confidence: u8,
        flagged_hint: bool,
    ) -> Result<Decision, StorageError> {
        let rules = self.store.list_rules().await?;
        let decision = decide_with_rules(&rules, category, confidence, flagged_hint);
        debug!(
            category = %category,
            confidence,
            flagged = decision.flagged,
            status = %decision.status,
            "Rule decision"
        );
        Ok(decision)
    }
}
