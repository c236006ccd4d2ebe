//! Property-based tests for the state machine
//!
//! These tests verify key invariants hold across all possible inputs.

use super::*;
use crate::broker::OutboundTopic;
use crate::events::{
    Assertion, AssertionEvent, AssertionType, Classification, ConversationCommand,
    ConversationRef, ConversationUpdate, DecisionEvent, DecisionRecord, DecisionType,
    Evaluation, EvaluationEvent, EventMetadata, PipelineEvent, UpdateEvent, UpdateType,
};
use chrono::{Duration, Utc};
use proptest::prelude::*;

// ============================================================================
// Test Helpers
// ============================================================================

fn conv() -> ConversationRef {
    ConversationRef::new("conv-1", "cust-1", "org-1")
}

fn evaluation_for(command: &ConversationCommand) -> EvaluationEvent {
    EvaluationEvent::for_command(
        command,
        Evaluation {
            classification: Classification::NoAction,
            reason: "test".to_string(),
            reasoning: "test".to_string(),
            suggested_actions: vec![],
            agents: vec![],
            message: command.message_text().map(String::from),
            source_event_id: command.id(),
        },
    )
}

fn outcome_for(assertion: &AssertionEvent, respond: bool) -> (Option<UpdateEvent>, DecisionEvent) {
    let update = respond.then(|| {
        UpdateEvent::new(
            assertion.conversation.clone(),
            assertion.metadata.follow_on(),
            ConversationUpdate {
                update_type: UpdateType::AiResponse,
                content: "reply".to_string(),
                assertion_id: assertion.id(),
            },
        )
    });
    let decision = DecisionEvent::new(
        assertion.conversation.clone(),
        assertion.metadata.follow_on(),
        DecisionRecord {
            decision_type: if respond {
                DecisionType::RespondToCustomer
            } else {
                DecisionType::WaitForMoreInfo
            },
            should_respond: respond,
            reasoning: "test".to_string(),
            assertion_id: assertion.id(),
            next_actions: vec![],
        },
    );
    (update, decision)
}

// ============================================================================
// Arbitrary Generators
// ============================================================================

fn arb_status() -> impl Strategy<Value = ConversationStatus> {
    prop_oneof![
        Just(ConversationStatus::Waiting),
        Just(ConversationStatus::Active),
        Just(ConversationStatus::Closed),
    ]
}

fn arb_command() -> impl Strategy<Value = ConversationCommand> {
    prop_oneof![
        proptest::option::of("[a-z ]{0,20}")
            .prop_map(|text| ConversationCommand::initiated(conv(), "corr", text.as_deref())),
        "[a-z ]{1,20}".prop_map(|text| ConversationCommand::message_received(conv(), "corr", &text)),
        Just(ConversationCommand::closed(conv(), "corr", None)),
    ]
}

fn arb_assertion_type() -> impl Strategy<Value = AssertionType> {
    prop_oneof![
        Just(AssertionType::ResponseRecommendation),
        Just(AssertionType::ActionRequired),
        Just(AssertionType::CustomerSpendAnalysis),
        Just(AssertionType::NoActionNeeded),
        "[A-Z_]{3,12}".prop_map(AssertionType::from),
    ]
}

fn arb_assertion() -> impl Strategy<Value = AssertionEvent> {
    (arb_assertion_type(), 0.0f64..=1.0).prop_map(|(assertion_type, confidence)| {
        AssertionEvent::new(
            conv(),
            EventMetadata::new("corr"),
            Assertion {
                assertion_type,
                confidence,
                reasoning: "generated".to_string(),
                recommendation: None,
                agent_id: "response-recommendation-agent".to_string(),
            },
        )
    })
}

#[derive(Debug, Clone)]
enum Step {
    Command(ConversationCommand),
    Assertion { event: AssertionEvent, respond: bool },
    /// Redeliver the most recent assertion, if any
    Replay,
}

fn arb_step() -> impl Strategy<Value = Step> {
    prop_oneof![
        arb_command().prop_map(Step::Command),
        (arb_assertion(), any::<bool>()).prop_map(|(event, respond)| Step::Assertion { event, respond }),
        Just(Step::Replay),
    ]
}

fn arb_state() -> impl Strategy<Value = ConversationState> {
    (arb_status(), 0u64..10, 0u64..10).prop_map(|(status, messages, responses)| {
        let mut state = ConversationState::new(conv(), status, "corr", Utc::now());
        state.message_count = messages;
        state.responses_sent = responses;
        state
    })
}

// ============================================================================
// State Validity Checkers
// ============================================================================

fn check_valid(state: &ConversationState) -> Result<(), TestCaseError> {
    prop_assert!(state.updated_at >= state.created_at, "updatedAt before createdAt");
    prop_assert_eq!(
        state.closed_at.is_some(),
        state.status == ConversationStatus::Closed,
        "closedAt must be set exactly when closed"
    );
    let mut ids: Vec<_> = state.assertions.iter().map(|a| a.id).collect();
    ids.sort();
    ids.dedup();
    prop_assert_eq!(ids.len(), state.assertions.len(), "duplicate assertion in log");
    Ok(())
}

/// State writes close the effect list, so a failed publish leaves the row
/// untouched: one patch last, optionally preceded by the baseline put
fn check_write_last(effects: &[Effect]) -> Result<(), TestCaseError> {
    let last = effects.last();
    prop_assert!(
        matches!(last, Some(Effect::PatchState { .. })),
        "last effect should patch state, got {:?}",
        last
    );
    let writes: Vec<usize> = effects
        .iter()
        .enumerate()
        .filter(|(_, e)| matches!(e, Effect::PutState(_) | Effect::PatchState { .. }))
        .map(|(i, _)| i)
        .collect();
    prop_assert!(matches!(writes.len(), 1 | 2), "expected one or two writes, got {}", writes.len());
    if writes.len() == 2 {
        prop_assert_eq!(writes[0], effects.len() - 2);
        prop_assert!(
            matches!(effects[writes[0]], Effect::PutState(_)),
            "baseline write should be a put, got {:?}",
            effects[writes[0]]
        );
    }
    Ok(())
}

fn published_to(effects: &[Effect], topic: OutboundTopic) -> usize {
    effects
        .iter()
        .filter(|e| matches!(e, Effect::Publish { topic: t, .. } if *t == topic))
        .count()
}

// ============================================================================
// Property Tests
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    // Invariant 1: status never moves backward and the record stays valid
    // across any interleaving of commands, assertions and redeliveries
    #[test]
    fn prop_sequences_preserve_invariants(steps in proptest::collection::vec(arb_step(), 1..25)) {
        let mut state: Option<ConversationState> = None;
        let mut last_assertion: Option<(AssertionEvent, bool)> = None;
        let mut distinct_assertions = Vec::new();
        let mut messages = 0u64;
        let mut now = Utc::now();

        for step in steps {
            now += Duration::milliseconds(5);
            let before = state.clone();
            let result = match step {
                Step::Command(command) => {
                    if command.message_text().is_some() {
                        messages += 1;
                    }
                    let evaluation = evaluation_for(&command);
                    on_command(state.as_ref(), &command, &evaluation, now)
                }
                Step::Assertion { event, respond } => {
                    distinct_assertions.push(event.id());
                    let (update, decision) = outcome_for(&event, respond);
                    last_assertion = Some((event.clone(), respond));
                    on_assertion(state.as_ref(), &event, update.as_ref(), &decision, now)
                }
                Step::Replay => match &last_assertion {
                    Some((event, respond)) => {
                        let (update, decision) = outcome_for(event, *respond);
                        on_assertion(state.as_ref(), event, update.as_ref(), &decision, now)
                    }
                    None => continue,
                },
            };
            let result = result.unwrap();
            check_write_last(&result.effects)?;
            let next = result.new_state;
            check_valid(&next)?;

            if let Some(prev) = &before {
                prop_assert!(next.status.rank() >= prev.status.rank(), "status moved backward");
                prop_assert!(next.assertions.len() >= prev.assertions.len());
                prop_assert_eq!(&next.assertions[..prev.assertions.len()], &prev.assertions[..]);
                prop_assert_eq!(next.created_at, prev.created_at);
            }
            state = Some(next);
        }

        // Nothing to check when every step replayed before any assertion
        let Some(state) = state else { return Ok(()); };
        let logged: Vec<_> = state.assertions.iter().map(|a| a.id).collect();
        prop_assert_eq!(logged, distinct_assertions);
        prop_assert_eq!(state.message_count, messages);
    }

    // Invariant 2: every command yields exactly one evaluation publish
    #[test]
    fn prop_command_publishes_one_evaluation(
        existing in proptest::option::of(arb_state()),
        command in arb_command(),
    ) {
        let evaluation = evaluation_for(&command);
        let result = on_command(existing.as_ref(), &command, &evaluation, Utc::now()).unwrap();
        prop_assert_eq!(published_to(&result.effects, OutboundTopic::Evaluations), 1);
        prop_assert_eq!(published_to(&result.effects, OutboundTopic::Decisions), 0);
        prop_assert!(
            matches!(result.effects.first(), Some(Effect::AppendLog { .. })),
            "first effect should log the command, got {:?}",
            result.effects.first()
        );
    }

    // Invariant 3: first command creates WAITING, or CLOSED for a close command
    #[test]
    fn prop_first_command_creates_state(command in arb_command()) {
        let evaluation = evaluation_for(&command);
        let result = on_command(None, &command, &evaluation, Utc::now()).unwrap();
        let expected = if command.is_closure() {
            ConversationStatus::Closed
        } else {
            ConversationStatus::Waiting
        };
        prop_assert_eq!(result.new_state.status, expected);
        prop_assert_eq!(result.new_state.message_count, u64::from(command.message_text().is_some()));
        let writes = &result.effects[result.effects.len() - 2..];
        prop_assert!(
            matches!(writes, [Effect::PutState(_), Effect::PatchState { .. }]),
            "new conversation should be put then patched, got {:?}",
            writes
        );
    }

    // Invariant 4: an assertion always yields one decision and an update
    // exactly when one was derived
    #[test]
    fn prop_assertion_publishes_decision(
        existing in proptest::option::of(arb_state()),
        event in arb_assertion(),
        respond in any::<bool>(),
    ) {
        let (update, decision) = outcome_for(&event, respond);
        let result = on_assertion(existing.as_ref(), &event, update.as_ref(), &decision, Utc::now()).unwrap();
        prop_assert_eq!(published_to(&result.effects, OutboundTopic::Decisions), 1);
        prop_assert_eq!(published_to(&result.effects, OutboundTopic::Updates), usize::from(respond));
        prop_assert_eq!(
            result.new_state.last_decision.map(|d| d.decision_type),
            Some(decision.decision.decision_type)
        );
    }

    // Invariant 5: assertions activate waiting conversations and never reopen closed ones
    #[test]
    fn prop_assertion_status(existing in arb_state(), event in arb_assertion()) {
        let (update, decision) = outcome_for(&event, false);
        let result = on_assertion(Some(&existing), &event, update.as_ref(), &decision, Utc::now()).unwrap();
        let expected = match existing.status {
            ConversationStatus::Closed => ConversationStatus::Closed,
            _ => ConversationStatus::Active,
        };
        prop_assert_eq!(result.new_state.status, expected);
    }

    // Invariant 6: a conversation's identity cannot change
    #[test]
    fn prop_identity_mismatch_rejected(customer in "[a-z]{3,8}", event in arb_assertion()) {
        prop_assume!(customer != "cust-1");
        let mut existing = ConversationState::new(conv(), ConversationStatus::Active, "corr", Utc::now());
        existing.conversation.customer_id = customer;
        let (update, decision) = outcome_for(&event, false);
        let result = on_assertion(Some(&existing), &event, update.as_ref(), &decision, Utc::now());
        prop_assert!(
            matches!(result, Err(TransitionError::IdentityMismatch { .. })),
            "expected identity mismatch, got {:?}",
            result
        );
    }

    // Invariant 7: status advance is monotone and idempotent
    #[test]
    fn prop_advance_never_regresses(from in arb_status(), to in arb_status()) {
        let next = from.advance(to);
        prop_assert_eq!(next.rank(), from.rank().max(to.rank()));
        prop_assert_eq!(next.advance(to), next);
    }
}

// ============================================================================
// Unit Tests for Edge Cases
// ============================================================================

#[test]
fn test_redelivered_assertion_does_not_count_twice() {
    let event = AssertionEvent::new(
        conv(),
        EventMetadata::new("corr"),
        Assertion {
            assertion_type: AssertionType::ResponseRecommendation,
            confidence: 0.9,
            reasoning: "r".to_string(),
            recommendation: Some("reply".to_string()),
            agent_id: "response-recommendation-agent".to_string(),
        },
    );
    let (update, decision) = outcome_for(&event, true);
    let first = on_assertion(None, &event, update.as_ref(), &decision, Utc::now()).unwrap();
    assert_eq!(first.new_state.responses_sent, 1);

    let second = on_assertion(
        Some(&first.new_state),
        &event,
        update.as_ref(),
        &decision,
        Utc::now(),
    )
    .unwrap();
    assert_eq!(second.new_state.assertions.len(), 1);
    assert_eq!(second.new_state.responses_sent, 1);
    // Still re-published downstream
    assert_eq!(published_to(&second.effects, OutboundTopic::Updates), 1);
}

#[test]
fn test_close_then_message_stays_closed() {
    let close = ConversationCommand::closed(conv(), "corr", Some("resolved"));
    let closed = on_command(None, &close, &evaluation_for(&close), Utc::now()).unwrap();
    let closed_at = closed.new_state.closed_at;

    let msg = ConversationCommand::message_received(conv(), "corr", "one more thing");
    let after = on_command(
        Some(&closed.new_state),
        &msg,
        &evaluation_for(&msg),
        Utc::now() + Duration::seconds(1),
    )
    .unwrap();
    assert_eq!(after.new_state.status, ConversationStatus::Closed);
    assert_eq!(after.new_state.closed_at, closed_at);
    assert_eq!(after.new_state.message_count, 1);
}
