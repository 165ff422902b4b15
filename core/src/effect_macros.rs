//! Declarative macros for ergonomic effect construction
//!
//! Reducers describe every network call as an `Effect::Future` whose output is
//! the settled action, so these two macros cover almost all effect building in
//! the booking crate.

/// Create an `Effect::Future` from an async block
///
/// # Example
///
/// ```rust,ignore
/// use azurea_core::async_effect;
///
/// async_effect! {
///     let check = guard.check(identity.as_ref()).await;
///     Some(BookingAction::LimitChecked { draft, user, check })
/// }
/// ```
#[macro_export]
macro_rules! async_effect {
    ($($body:tt)*) => {
        $crate::effect::Effect::Future(
            ::std::boxed::Box::pin(async move { $($body)* })
        )
    };
}

/// Create an `Effect::Delay` for scheduling delayed actions
///
/// # Example
///
/// ```rust,ignore
/// use azurea_core::delay;
/// use std::time::Duration;
///
/// delay! {
///     duration: Duration::from_secs(30),
///     action: BookingAction::WindowFocused
/// }
/// ```
#[macro_export]
macro_rules! delay {
    (
        duration: $duration:expr,
        action: $action:expr
    ) => {
        $crate::effect::Effect::Delay {
            duration: $duration,
            action: ::std::boxed::Box::new($action),
        }
    };
}

#[cfg(test)]
mod tests {
    use crate::effect::Effect;
    use std::time::Duration;

    #[derive(Clone, Debug, PartialEq)]
    enum TestAction {
        AsyncResult { value: i32 },
        TimeoutExpired,
    }

    #[tokio::test]
    async fn test_async_effect_macro_yields_action() {
        let effect = async_effect! {
            Some(TestAction::AsyncResult { value: 42 })
        };

        let Effect::Future(fut) = effect else {
            unreachable!("async_effect! must build a Future effect");
        };
        assert_eq!(fut.await, Some(TestAction::AsyncResult { value: 42 }));
    }

    #[test]
    fn test_delay_macro() {
        let effect = delay! {
            duration: Duration::from_secs(30),
            action: TestAction::TimeoutExpired
        };

        match effect {
            Effect::Delay { duration, action } => {
                assert_eq!(duration, Duration::from_secs(30));
                assert_eq!(*action, TestAction::TimeoutExpired);
            },
            other => unreachable!("unexpected effect {other:?}"),
        }
    }
}
