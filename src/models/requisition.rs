use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Staff;
use crate::config::StockCreditPolicy;
use crate::error::{AppError, AppResult};

/// Lifecycle of a requisition.
///
/// `pending → approved → in_fulfillment → complete`, with `cancelled`
/// reachable from `pending` and `approved` only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "requisition_state", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum RequisitionState {
    Pending,
    Approved,
    InFulfillment,
    Complete,
    Cancelled,
}

impl RequisitionState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::InFulfillment => "in_fulfillment",
            Self::Complete => "complete",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn can_transition_to(self, next: RequisitionState) -> bool {
        use RequisitionState::*;
        matches!(
            (self, next),
            (Pending, Approved)
                | (Approved, InFulfillment)
                | (InFulfillment, Complete)
                | (Pending, Cancelled)
                | (Approved, Cancelled)
        )
    }

    pub fn ensure_transition(self, next: RequisitionState) -> AppResult<()> {
        if self.can_transition_to(next) {
            Ok(())
        } else {
            Err(AppError::InvalidTransition(format!(
                "cannot move requisition from {} to {}",
                self, next
            )))
        }
    }

    /// Terminal states mark the requisition as completed.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Complete | Self::Cancelled)
    }

    /// Entering this state needs the administrator capability.
    pub fn requires_administrator(self) -> bool {
        matches!(self, Self::Approved | Self::Cancelled)
    }
}

impl fmt::Display for RequisitionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "requisition_origin", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum RequisitionOrigin {
    /// Filed by staff through the API.
    Manual,
    /// Filed by the replenishment filer after a rebalancing shortfall.
    Automatic,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Requisition {
    pub id: Uuid,
    pub state: RequisitionState,
    pub origin: RequisitionOrigin,
    pub requester_id: Option<Uuid>,
    pub approver_id: Option<Uuid>,
    pub receiving_service_id: Uuid,
    /// Set for inter-service requisitions; the units leave this service.
    pub source_service_id: Option<Uuid>,
    /// Set for external orders.
    pub supplier_id: Option<Uuid>,
    pub completed: bool,
    pub stock_credited: bool,
    pub created_at: DateTime<Utc>,
    pub expected_delivery_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

/// Everything a state change writes, decided before the database is touched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionPlan {
    pub next: RequisitionState,
    /// Apply the line quantities to stock in this transition.
    pub credit_stock: bool,
    /// Service debited alongside the credit (inter-service requisitions).
    pub debit_source: Option<Uuid>,
    pub approver_id: Option<Uuid>,
    pub completed: bool,
    pub delivered_at: Option<DateTime<Utc>>,
}

impl Requisition {
    /// Checks `actor` may move this requisition to `next` and works out the
    /// resulting columns. Stock is credited at most once, when `policy`
    /// says so, and a credited requisition can no longer be cancelled.
    pub fn plan_transition(
        &self,
        next: RequisitionState,
        actor: &Staff,
        policy: StockCreditPolicy,
        now: DateTime<Utc>,
    ) -> AppResult<TransitionPlan> {
        if next.requires_administrator() && !actor.is_administrator {
            return Err(AppError::Forbidden(format!(
                "only administrators may move a requisition to {}",
                next
            )));
        }
        self.state.ensure_transition(next)?;
        if next == RequisitionState::Cancelled && self.stock_credited {
            return Err(AppError::Conflict(format!(
                "requisition {} already credited stock and cannot be cancelled",
                self.id
            )));
        }

        let credit_stock = !self.stock_credited && policy.credits_on(next);
        Ok(TransitionPlan {
            next,
            credit_stock,
            debit_source: self.source_service_id.filter(|_| credit_stock),
            approver_id: if next == RequisitionState::Approved {
                Some(actor.id)
            } else {
                self.approver_id
            },
            completed: next.is_terminal(),
            delivered_at: if next == RequisitionState::Complete {
                Some(now)
            } else {
                self.delivered_at
            },
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct RequisitionLine {
    pub requisition_id: Uuid,
    pub medication_id: Uuid,
    pub medication_name: String,
    pub quantity: i32,
}

/// Requisition header with its line items, as returned by the API.
#[derive(Debug, Serialize)]
pub struct RequisitionDetail {
    #[serde(flatten)]
    pub requisition: Requisition,
    pub lines: Vec<RequisitionLine>,
}

// ── Request payloads ─────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct NewRequisitionLine {
    pub medication_id: Uuid,
    pub quantity: i32,
}

#[derive(Debug, Deserialize)]
pub struct CreateRequisition {
    pub requester_id: Uuid,
    pub receiving_service_id: Uuid,
    pub source_service_id: Option<Uuid>,
    pub supplier_id: Option<Uuid>,
    pub expected_delivery_at: Option<DateTime<Utc>>,
    pub lines: Vec<NewRequisitionLine>,
}

impl CreateRequisition {
    pub fn validate(&self) -> AppResult<()> {
        if self.lines.is_empty() {
            return Err(AppError::BadRequest(
                "a requisition needs at least one line".to_string(),
            ));
        }
        if self.lines.iter().any(|line| line.quantity <= 0) {
            return Err(AppError::BadRequest("line quantity must be > 0".to_string()));
        }
        let mut seen = std::collections::HashSet::new();
        if !self.lines.iter().all(|line| seen.insert(line.medication_id)) {
            return Err(AppError::BadRequest(
                "each medication may appear only once per requisition".to_string(),
            ));
        }
        if self.source_service_id.is_some() && self.supplier_id.is_some() {
            return Err(AppError::BadRequest(
                "a requisition comes from either a service or a supplier, not both".to_string(),
            ));
        }
        if self.source_service_id == Some(self.receiving_service_id) {
            return Err(AppError::BadRequest(
                "source and receiving service must differ".to_string(),
            ));
        }
        Ok(())
    }
}

/// Staff member performing a state change.
#[derive(Debug, Deserialize)]
pub struct ActorPayload {
    pub actor_id: Uuid,
}

#[derive(Debug, Deserialize, Default)]
pub struct RequisitionFilters {
    pub state: Option<RequisitionState>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use RequisitionState::*;

    const ALL: [RequisitionState; 5] = [Pending, Approved, InFulfillment, Complete, Cancelled];

    #[test]
    fn happy_path_is_allowed() {
        assert!(Pending.can_transition_to(Approved));
        assert!(Approved.can_transition_to(InFulfillment));
        assert!(InFulfillment.can_transition_to(Complete));
    }

    #[test]
    fn cancel_only_from_pending_or_approved() {
        let cancellable: Vec<_> = ALL
            .iter()
            .copied()
            .filter(|s| s.can_transition_to(Cancelled))
            .collect();
        assert_eq!(cancellable, vec![Pending, Approved]);
    }

    #[test]
    fn skipping_and_going_back_are_rejected() {
        assert!(!Pending.can_transition_to(InFulfillment));
        assert!(!Pending.can_transition_to(Complete));
        assert!(!Approved.can_transition_to(Pending));
        assert!(!Complete.can_transition_to(Cancelled));
        assert!(matches!(
            Pending.ensure_transition(Complete),
            Err(AppError::InvalidTransition(_))
        ));
    }

    #[test]
    fn terminal_states_have_no_exits() {
        for from in [Complete, Cancelled] {
            assert!(from.is_terminal());
            assert!(ALL.iter().all(|to| !from.can_transition_to(*to)));
        }
    }

    #[test]
    fn approval_and_cancellation_need_an_administrator() {
        assert!(Approved.requires_administrator());
        assert!(Cancelled.requires_administrator());
        assert!(!InFulfillment.requires_administrator());
        assert!(!Complete.requires_administrator());
    }

    #[test]
    fn state_serializes_snake_case() {
        assert_eq!(serde_json::to_string(&InFulfillment).unwrap(), "\"in_fulfillment\"");
        let parsed: RequisitionState = serde_json::from_str("\"cancelled\"").unwrap();
        assert_eq!(parsed, Cancelled);
    }

    fn line(quantity: i32) -> NewRequisitionLine {
        NewRequisitionLine {
            medication_id: Uuid::new_v4(),
            quantity,
        }
    }

    fn payload(lines: Vec<NewRequisitionLine>) -> CreateRequisition {
        CreateRequisition {
            requester_id: Uuid::new_v4(),
            receiving_service_id: Uuid::new_v4(),
            source_service_id: None,
            supplier_id: None,
            expected_delivery_at: None,
            lines,
        }
    }

    #[test]
    fn requisition_without_lines_is_rejected() {
        assert!(payload(vec![]).validate().is_err());
        assert!(payload(vec![line(0)]).validate().is_err());
        assert!(payload(vec![line(4)]).validate().is_ok());
    }

    #[test]
    fn duplicate_medication_lines_are_rejected() {
        let first = line(3);
        let dup = NewRequisitionLine {
            medication_id: first.medication_id,
            quantity: 1,
        };
        assert!(payload(vec![first, dup]).validate().is_err());
    }

    #[test]
    fn source_and_supplier_are_exclusive() {
        let mut req = payload(vec![line(2)]);
        req.source_service_id = Some(Uuid::new_v4());
        req.supplier_id = Some(Uuid::new_v4());
        assert!(req.validate().is_err());

        req.supplier_id = None;
        req.source_service_id = Some(req.receiving_service_id);
        assert!(req.validate().is_err());
    }

    // ── Transition planning ───────────────────────────────────────────────────

    fn staff(is_administrator: bool) -> Staff {
        Staff {
            id: Uuid::new_v4(),
            name: "Ana Ribeiro".to_string(),
            service_id: None,
            is_administrator,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn requisition(state: RequisitionState, source_service_id: Option<Uuid>) -> Requisition {
        let now = Utc::now();
        Requisition {
            id: Uuid::new_v4(),
            state,
            origin: RequisitionOrigin::Manual,
            requester_id: None,
            approver_id: None,
            receiving_service_id: Uuid::new_v4(),
            source_service_id,
            supplier_id: None,
            completed: false,
            stock_credited: false,
            created_at: now,
            expected_delivery_at: None,
            delivered_at: None,
            updated_at: now,
        }
    }

    const ON_COMPLETION: StockCreditPolicy = StockCreditPolicy::OnCompletion;
    const ON_APPROVAL: StockCreditPolicy = StockCreditPolicy::OnApproval;

    #[test]
    fn non_administrators_cannot_approve_or_cancel() {
        let nurse = staff(false);
        for next in [Approved, Cancelled] {
            let result = requisition(Pending, None).plan_transition(next, &nurse, ON_COMPLETION, Utc::now());
            assert!(matches!(result, Err(AppError::Forbidden(_))));
        }

        let plan = requisition(Approved, None)
            .plan_transition(InFulfillment, &nurse, ON_COMPLETION, Utc::now())
            .unwrap();
        assert!(!plan.credit_stock);
    }

    #[test]
    fn approval_records_the_approver() {
        let admin = staff(true);
        let plan = requisition(Pending, None)
            .plan_transition(Approved, &admin, ON_COMPLETION, Utc::now())
            .unwrap();
        assert_eq!(plan.approver_id, Some(admin.id));
        assert!(!plan.completed);
        assert!(!plan.credit_stock);
    }

    #[test]
    fn completion_credits_stock_and_stamps_delivery() {
        let now = Utc::now();
        let plan = requisition(InFulfillment, None)
            .plan_transition(Complete, &staff(false), ON_COMPLETION, now)
            .unwrap();
        assert!(plan.credit_stock);
        assert!(plan.completed);
        assert_eq!(plan.delivered_at, Some(now));
        assert_eq!(plan.debit_source, None);
    }

    #[test]
    fn stock_is_credited_only_once() {
        let mut req = requisition(InFulfillment, None);
        req.stock_credited = true;
        let plan = req
            .plan_transition(Complete, &staff(false), ON_APPROVAL, Utc::now())
            .unwrap();
        assert!(!plan.credit_stock);

        let plan = requisition(InFulfillment, None)
            .plan_transition(Complete, &staff(false), ON_APPROVAL, Utc::now())
            .unwrap();
        assert!(!plan.credit_stock);
    }

    #[test]
    fn credited_requisition_cannot_be_cancelled() {
        let admin = staff(true);
        let approved = requisition(Pending, None)
            .plan_transition(Approved, &admin, ON_APPROVAL, Utc::now())
            .unwrap();
        assert!(approved.credit_stock);

        let mut req = requisition(Approved, None);
        req.stock_credited = true;
        let result = req.plan_transition(Cancelled, &admin, ON_APPROVAL, Utc::now());
        assert!(matches!(result, Err(AppError::Conflict(_))));

        let plan = requisition(Approved, None)
            .plan_transition(Cancelled, &admin, ON_COMPLETION, Utc::now())
            .unwrap();
        assert!(plan.completed);
        assert!(!plan.credit_stock);
    }

    #[test]
    fn inter_service_requisition_debits_its_source_when_credited() {
        let pharmacy = Uuid::new_v4();
        let plan = requisition(InFulfillment, Some(pharmacy))
            .plan_transition(Complete, &staff(false), ON_COMPLETION, Utc::now())
            .unwrap();
        assert_eq!(plan.debit_source, Some(pharmacy));

        let plan = requisition(Pending, Some(pharmacy))
            .plan_transition(Approved, &staff(true), ON_COMPLETION, Utc::now())
            .unwrap();
        assert_eq!(plan.debit_source, None);
    }

    #[test]
    fn invalid_transition_is_rejected_before_crediting() {
        let result = requisition(Pending, None).plan_transition(Complete, &staff(true), ON_COMPLETION, Utc::now());
        assert!(matches!(result, Err(AppError::InvalidTransition(_))));
    }
}
