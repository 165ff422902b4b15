//! Integration tests for Store action broadcasting
//!
//! Effects settle in whatever order their futures finish. These tests pin down
//! what observers see and that reducers still run one action at a time.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)] // Test code can use unwrap/expect/panic

use azurea_core::{SmallVec, effect::Effect, reducer::Reducer, smallvec};
use azurea_runtime::{Store, StoreError};
use std::sync::Arc;
use std::time::Duration;

// ============================================================================
// Test Fixtures
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
enum TestAction {
    /// Start a request; a newer request supersedes older ones
    Request { latency_ms: u64 },
    /// A request settled
    Settled { generation: u32 },
    /// Plain counter command
    Increment,
    /// Counter event
    Incremented { value: u32 },
}

#[derive(Debug, Clone, Default)]
struct TestState {
    generation: u32,
    applied: Vec<u32>,
    ignored: Vec<u32>,
    counter: u32,
}

#[derive(Clone)]
struct TestEnvironment;

#[derive(Clone)]
struct TestReducer;

impl Reducer for TestReducer {
    type State = TestState;
    type Action = TestAction;
    type Environment = TestEnvironment;

    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        _env: &Self::Environment,
    ) -> SmallVec<[Effect<Self::Action>; 4]> {
        match action {
            TestAction::Request { latency_ms } => {
                state.generation += 1;
                let generation = state.generation;
                smallvec![Effect::Future(Box::pin(async move {
                    tokio::time::sleep(Duration::from_millis(latency_ms)).await;
                    Some(TestAction::Settled { generation })
                }))]
            },

            TestAction::Settled { generation } => {
                if generation == state.generation {
                    state.applied.push(generation);
                } else {
                    state.ignored.push(generation);
                }
                smallvec![Effect::None]
            },

            TestAction::Increment => {
                state.counter += 1;
                let value = state.counter;
                smallvec![Effect::Future(Box::pin(async move {
                    Some(TestAction::Incremented { value })
                }))]
            },

            TestAction::Incremented { .. } => smallvec![Effect::None],
        }
    }
}

fn new_store() -> Store<TestState, TestAction, TestEnvironment, TestReducer> {
    Store::new(TestState::default(), TestReducer, TestEnvironment)
}

// ============================================================================
// Tests
// ============================================================================

/// A slow result that settles after a newer request is ignored
#[tokio::test]
async fn test_stale_result_settles_last_and_is_ignored() {
    let store = new_store();

    store.send(TestAction::Request { latency_ms: 60 }).await.unwrap();
    store.send(TestAction::Request { latency_ms: 5 }).await.unwrap();

    store.shutdown(Duration::from_secs(1)).await.unwrap();

    let (applied, ignored) = store.state(|s| (s.applied.clone(), s.ignored.clone())).await;
    assert_eq!(applied, vec![2]);
    assert_eq!(ignored, vec![1]);
}

#[tokio::test]
async fn test_send_and_wait_for_immediate() {
    let store = new_store();

    let result = store
        .send_and_wait_for(
            TestAction::Increment,
            |action| matches!(action, TestAction::Incremented { .. }),
            Duration::from_secs(1),
        )
        .await;

    assert_eq!(result.unwrap(), TestAction::Incremented { value: 1 });
}

#[tokio::test]
async fn test_send_and_wait_for_timeout() {
    let store = new_store();

    let result = store
        .send_and_wait_for(
            TestAction::Request { latency_ms: 200 },
            |action| matches!(action, TestAction::Settled { .. }),
            Duration::from_millis(20),
        )
        .await;

    assert_eq!(result.unwrap_err(), StoreError::Timeout);
}

/// Concurrent senders each observe their own terminal action
#[tokio::test]
async fn test_concurrent_subscribers() {
    let store = Arc::new(new_store());
    let mut handles = vec![];

    for _ in 0..5 {
        let store = Arc::clone(&store);
        handles.push(tokio::spawn(async move {
            store
                .send_and_wait_for(
                    TestAction::Increment,
                    |action| matches!(action, TestAction::Incremented { .. }),
                    Duration::from_secs(1),
                )
                .await
        }));
    }

    for handle in handles {
        assert!(handle.await.unwrap().is_ok());
    }

    assert_eq!(store.state(|s| s.counter).await, 5);
}

/// Every subscriber receives every effect-produced action
#[tokio::test]
async fn test_multiple_observers_receive_same_actions() {
    let store = new_store();
    let mut first = store.subscribe_actions();
    let mut second = store.subscribe_actions();

    store.send(TestAction::Increment).await.unwrap();

    let a = tokio::time::timeout(Duration::from_secs(1), first.recv()).await.unwrap().unwrap();
    let b = tokio::time::timeout(Duration::from_secs(1), second.recv()).await.unwrap().unwrap();
    assert_eq!(a, b);
}
