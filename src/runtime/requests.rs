//! Interactive request correlation and approval policy.
//!
//! Each interactive request the agent sends is registered under its numeric
//! id with a one-slot completion channel. A detached task waits on that
//! channel and, once a decision arrives, formats it into the response envelope
//! the agent expects and sends it keyed by the original id. The run loop never
//! blocks on a pending request; it keeps draining frames.
//!
//! Resolution is safe from any thread at any time. Resolving an unknown or
//! already-resolved id is a logged no-op.

use super::schema::{now_unix_millis, ApprovalPolicy, Decision};
use crate::protocol;
use crate::stream::enrich::{describe_tool_call, enrich_tool_input};
use crate::stream::{InteractiveRequest, PermissionOption, PermissionOptionKind, RequestKind, StreamEvent};
use crate::transport::Transport;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

/// One outstanding interactive request.
struct PendingRequest {
    run_id: u64,
    kind: RequestKind,
    resolve: oneshot::Sender<Decision>,
}

struct CorrelatorState {
    pending: HashMap<u64, PendingRequest>,
    policy: ApprovalPolicy,
}

/// Tracks interactive requests by id until a decision is supplied.
///
/// Cloning yields another handle to the same pending map, so the run loop and
/// any number of decision sources can share it.
#[derive(Clone)]
pub struct RequestCorrelator {
    state: Arc<Mutex<CorrelatorState>>,
    transport: Arc<dyn Transport>,
}

impl RequestCorrelator {
    pub fn new(transport: Arc<dyn Transport>, policy: ApprovalPolicy) -> Self {
        Self {
            state: Arc::new(Mutex::new(CorrelatorState {
                pending: HashMap::new(),
                policy,
            })),
            transport,
        }
    }

    fn lock(&self) -> MutexGuard<'_, CorrelatorState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Register request `id` and describe it for the presentation layer.
    ///
    /// No response is sent here. When the approval policy answers the request
    /// on its own, the decision is sent right away and a warning describing it
    /// is returned instead of a `*Needed` event.
    pub fn intercept(
        &self,
        run_id: u64,
        id: u64,
        request: &InteractiveRequest,
        tool_name: &str,
    ) -> StreamEvent {
        let kind = request.kind();
        let options = request.options().to_vec();

        let mut state = self.lock();
        if state.pending.contains_key(&id) {
            drop(state);
            warn!(request_id = id, kind = kind.as_str(), "duplicate interactive request id");
            self.send_detached(protocol::error_response(
                Value::from(id),
                protocol::INVALID_REQUEST,
                "duplicate request id",
            ));
            return StreamEvent::warning(format!(
                "ignored duplicate {} request {id}",
                kind.as_str()
            ));
        }

        if let Some(decision) = policy_decision(&mut state.policy, kind) {
            drop(state);
            info!(request_id = id, kind = kind.as_str(), decision = decision.label(), "resolved by approval policy");
            self.send_detached(protocol::response(
                Value::from(id),
                response_payload(kind, &options, &decision),
            ));
            return StreamEvent::warning(format!(
                "{} request {id} for `{tool_name}` answered by policy: {}",
                kind.as_str(),
                decision.label()
            ));
        }

        let (tx, rx) = oneshot::channel();
        state.pending.insert(
            id,
            PendingRequest {
                run_id,
                kind,
                resolve: tx,
            },
        );
        drop(state);
        debug!(request_id = id, run_id, kind = kind.as_str(), "interactive request registered");

        let transport = Arc::clone(&self.transport);
        tokio::spawn(async move {
            // A dropped sender means the entry was discarded without a decision.
            let decision = rx.await.unwrap_or(Decision::Cancel);
            let envelope = protocol::response(
                Value::from(id),
                response_payload(kind, &options, &decision),
            );
            if let Err(err) = transport.send(envelope).await {
                warn!(request_id = id, error = %err, "failed to send interactive response");
            }
        });

        needed_event(id, request, tool_name)
    }

    /// Supply the decision for request `id`.
    ///
    /// Returns `false` when the id is unknown, already resolved, or the
    /// decision does not fit the request kind (the request stays pending).
    pub fn resolve(&self, id: u64, decision: Decision) -> bool {
        let mut state = self.lock();
        let Some(kind) = state.pending.get(&id).map(|pending| pending.kind) else {
            debug!(request_id = id, "resolve for unknown or already resolved request");
            return false;
        };
        if !decision_fits(kind, &decision) {
            warn!(
                request_id = id,
                kind = kind.as_str(),
                decision = decision.label(),
                "decision does not match request kind"
            );
            return false;
        }
        let Some(pending) = state.pending.remove(&id) else {
            return false;
        };
        drop(state);
        info!(request_id = id, kind = kind.as_str(), decision = decision.label(), "interactive request resolved");
        // The waiter only disappears if the runtime is shutting down.
        let _ = pending.resolve.send(decision);
        true
    }

    /// Cancel every pending request owned by `run_id`.
    pub fn cancel_run(&self, run_id: u64) -> usize {
        let drained: Vec<(u64, PendingRequest)> = {
            let mut state = self.lock();
            let ids: Vec<u64> = state
                .pending
                .iter()
                .filter_map(|(id, pending)| (pending.run_id == run_id).then_some(*id))
                .collect();
            let mut drained = Vec::with_capacity(ids.len());
            for id in ids {
                if let Some(pending) = state.pending.remove(&id) {
                    drained.push((id, pending));
                }
            }
            drained
        };
        let count = drained.len();
        for (id, pending) in drained {
            debug!(request_id = id, run_id, "cancelling pending request");
            let _ = pending.resolve.send(Decision::Cancel);
        }
        if count > 0 {
            info!(run_id, count, "cancelled pending interactive requests");
        }
        count
    }

    /// Cancel every pending request regardless of run.
    pub fn cancel_all(&self) -> usize {
        let drained: Vec<PendingRequest> = self.lock().pending.drain().map(|(_, p)| p).collect();
        let count = drained.len();
        for pending in drained {
            let _ = pending.resolve.send(Decision::Cancel);
        }
        if count > 0 {
            info!(count, "cancelled all pending interactive requests");
        }
        count
    }

    /// Replace the approval policy.
    ///
    /// When the new policy answers requests on its own, every pending request
    /// it covers is resolved immediately. Returns how many were resolved.
    pub fn set_policy(&self, policy: ApprovalPolicy) -> usize {
        let resolved: Vec<(u64, PendingRequest, Decision)> = {
            let mut state = self.lock();
            state.policy = policy;
            let mut ids: Vec<(u64, RequestKind)> = state
                .pending
                .iter()
                .map(|(id, pending)| (*id, pending.kind))
                .collect();
            ids.sort_unstable_by_key(|(id, _)| *id);
            let mut resolved = Vec::new();
            for (id, kind) in ids {
                let Some(decision) = policy_decision(&mut state.policy, kind) else {
                    continue;
                };
                if let Some(pending) = state.pending.remove(&id) {
                    resolved.push((id, pending, decision));
                }
            }
            resolved
        };
        let count = resolved.len();
        for (id, pending, decision) in resolved {
            info!(request_id = id, decision = decision.label(), "resolved by approval policy change");
            let _ = pending.resolve.send(decision);
        }
        count
    }

    pub fn policy(&self) -> ApprovalPolicy {
        self.lock().policy
    }

    /// Ids of requests still waiting, ascending.
    pub fn pending_ids(&self) -> Vec<u64> {
        let mut ids: Vec<u64> = self.lock().pending.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    fn send_detached(&self, envelope: Value) {
        let transport = Arc::clone(&self.transport);
        tokio::spawn(async move {
            if let Err(err) = transport.send(envelope).await {
                warn!(error = %err, "failed to send interactive response");
            }
        });
    }
}

/// Decision implied by the policy for `kind`, if the policy answers it.
///
/// Expired `Until` windows self-reset to `Ask`.
fn policy_decision(policy: &mut ApprovalPolicy, kind: RequestKind) -> Option<Decision> {
    if kind == RequestKind::Question {
        return None;
    }
    let approve = match *policy {
        ApprovalPolicy::Ask => return None,
        ApprovalPolicy::All => true,
        ApprovalPolicy::None => false,
        ApprovalPolicy::Until { expires_at_unix_ms } => {
            if now_unix_millis() < expires_at_unix_ms {
                true
            } else {
                *policy = ApprovalPolicy::Ask;
                return None;
            }
        }
    };
    Some(match (kind, approve) {
        (RequestKind::PlanApproval, approved) => Decision::Plan { approved },
        (_, true) => Decision::Allow { option_id: None },
        (_, false) => Decision::Reject,
    })
}

fn decision_fits(kind: RequestKind, decision: &Decision) -> bool {
    match decision {
        Decision::Reject | Decision::Cancel => true,
        Decision::Allow { .. } => kind == RequestKind::Permission,
        Decision::Answers(_) => kind == RequestKind::Question,
        Decision::Plan { .. } => kind == RequestKind::PlanApproval,
    }
}

/// Result payload for a decided request.
///
/// Permission: `{outcome: {outcome: "selected", optionId}}` or
/// `{outcome: {outcome: "cancelled"}}`. Question: `{outcome, answers}`.
/// Plan: `{approved}`.
fn response_payload(kind: RequestKind, options: &[PermissionOption], decision: &Decision) -> Value {
    match kind {
        RequestKind::Permission => {
            let chosen = match decision {
                Decision::Allow { option_id: Some(id) } => Some(id.clone()),
                Decision::Allow { option_id: None } => Some(
                    first_option(options, PermissionOptionKind::is_allow)
                        .unwrap_or_else(|| "allow".to_string()),
                ),
                Decision::Reject => first_option(options, |kind| !kind.is_allow()),
                _ => None,
            };
            match chosen {
                Some(option_id) => json!({"outcome": {"outcome": "selected", "optionId": option_id}}),
                None => json!({"outcome": {"outcome": "cancelled"}}),
            }
        }
        RequestKind::Question => match decision {
            Decision::Answers(answers) => json!({"outcome": "answered", "answers": answers}),
            _ => json!({"outcome": "cancelled", "answers": {}}),
        },
        RequestKind::PlanApproval => {
            let approved = matches!(decision, Decision::Plan { approved: true });
            json!({ "approved": approved })
        }
    }
}

fn first_option(
    options: &[PermissionOption],
    wanted: impl Fn(PermissionOptionKind) -> bool,
) -> Option<String> {
    options
        .iter()
        .find(|option| wanted(option.kind))
        .map(|option| option.option_id.clone())
}

fn needed_event(id: u64, request: &InteractiveRequest, tool_name: &str) -> StreamEvent {
    match request {
        InteractiveRequest::Permission { tool_call, options } => StreamEvent::ConfirmationNeeded {
            request_id: id,
            tool_name: tool_name.to_string(),
            description: describe_tool_call(tool_name, tool_call, &enrich_tool_input(tool_call)),
            options: options.clone(),
        },
        InteractiveRequest::Question { questions, .. } => StreamEvent::QuestionNeeded {
            request_id: id,
            questions: questions.clone(),
        },
        InteractiveRequest::PlanApproval { plan, .. } => StreamEvent::PlanApprovalNeeded {
            request_id: id,
            plan: plan.clone(),
        },
    }
}
