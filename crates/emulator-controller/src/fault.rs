//! The fault boundary around every invocation.
//!
//! [`invoke_guarded`] makes exactly one attempt to run a [`Callable`] and
//! always completes with an [`InvocationOutcome`]. Thrown errors,
//! rejected pending results, panics and deadline overruns all become
//! [`InvocationFailure`] values; none of them escape to the caller.

use std::any::Any;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::{Value, json};
use tracing::warn;

use emulator_core::{CallContext, Callable, FunctionError, Invocation};

/// Substring present in the description of every failure caused by the
/// function itself throwing, rejecting or panicking.
pub const UNCAUGHT_EXCEPTION_MARKER: &str = "uncaught exception!";

/// Result of one invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum InvocationOutcome {
    /// The function produced a value.
    Success(Value),
    /// The function failed.
    Failure(InvocationFailure),
}

impl InvocationOutcome {
    /// Whether the invocation succeeded.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// The success value, if any.
    pub fn value(&self) -> Option<&Value> {
        match self {
            Self::Success(value) => Some(value),
            Self::Failure(_) => None,
        }
    }

    /// The failure, if any.
    pub fn failure(&self) -> Option<&InvocationFailure> {
        match self {
            Self::Success(_) => None,
            Self::Failure(failure) => Some(failure),
        }
    }

    /// JSON form used by the HTTP surfaces.
    pub fn to_json(&self) -> Value {
        match self {
            Self::Success(value) => json!({ "result": value }),
            Self::Failure(failure) => json!({
                "error": failure.message,
                "kind": failure.kind,
            }),
        }
    }
}

impl From<FunctionError> for InvocationOutcome {
    fn from(err: FunctionError) -> Self {
        Self::Failure(InvocationFailure::from(err))
    }
}

/// Why an invocation failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureKind {
    /// The function threw or its pending result rejected.
    Exception,
    /// The function ran past the invocation deadline.
    Timeout,
    /// The function panicked inside the host.
    Panicked,
}

/// A failed invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvocationFailure {
    /// Failure class.
    pub kind: FailureKind,
    /// Human-readable description.
    pub message: String,
}

impl InvocationFailure {
    /// A thrown error or rejection.
    pub fn exception(detail: impl fmt::Display) -> Self {
        Self {
            kind: FailureKind::Exception,
            message: format!("{UNCAUGHT_EXCEPTION_MARKER} {detail}"),
        }
    }

    /// A panic caught at the boundary.
    pub fn panicked(detail: impl fmt::Display) -> Self {
        Self {
            kind: FailureKind::Panicked,
            message: format!("{UNCAUGHT_EXCEPTION_MARKER} function panicked: {detail}"),
        }
    }

    /// A deadline overrun.
    pub fn timeout(duration_ms: u64) -> Self {
        Self {
            kind: FailureKind::Timeout,
            message: FunctionError::TimedOut { duration_ms }.to_string(),
        }
    }

    /// Whether the description carries [`UNCAUGHT_EXCEPTION_MARKER`].
    pub fn is_uncaught_exception(&self) -> bool {
        self.message.contains(UNCAUGHT_EXCEPTION_MARKER)
    }
}

impl From<FunctionError> for InvocationFailure {
    fn from(err: FunctionError) -> Self {
        match err {
            FunctionError::TimedOut { duration_ms } => Self::timeout(duration_ms),
            thrown @ FunctionError::Thrown { .. } => Self::exception(thrown),
        }
    }
}

impl fmt::Display for InvocationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// Invoke `callable` once with `data` and wait at most `timeout` for it.
///
/// A pending result is driven on its own task so that a panic inside it is
/// contained, and is aborted when the deadline passes.
pub async fn invoke_guarded(
    callable: Arc<dyn Callable>,
    data: Value,
    ctx: CallContext,
    timeout: Duration,
) -> InvocationOutcome {
    let invocation = match catch_unwind(AssertUnwindSafe(|| callable.invoke(data, ctx))) {
        Ok(Ok(invocation)) => invocation,
        Ok(Err(err)) => return err.into(),
        Err(panic) => {
            warn!(function = callable.name(), "Function panicked during invoke");
            return InvocationOutcome::Failure(InvocationFailure::panicked(panic_message(
                panic.as_ref(),
            )));
        }
    };

    let pending = match invocation {
        Invocation::Ready(value) => return InvocationOutcome::Success(value),
        Invocation::Pending(pending) => pending,
    };

    let mut task = tokio::spawn(pending);
    match tokio::time::timeout(timeout, &mut task).await {
        Ok(Ok(Ok(value))) => InvocationOutcome::Success(value),
        Ok(Ok(Err(err))) => err.into(),
        Ok(Err(join_err)) if join_err.is_panic() => {
            warn!(function = callable.name(), "Pending result panicked");
            let panic = join_err.into_panic();
            InvocationOutcome::Failure(InvocationFailure::panicked(panic_message(panic.as_ref())))
        }
        Ok(Err(join_err)) => InvocationOutcome::Failure(InvocationFailure::exception(join_err)),
        Err(_) => {
            task.abort();
            let duration_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
            warn!(
                function = callable.name(),
                duration_ms, "Invocation deadline exceeded"
            );
            InvocationOutcome::Failure(InvocationFailure::timeout(duration_ms))
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    enum Behavior {
        Ready,
        Resolve,
        Throw,
        Reject,
        PanicNow,
        PanicLater,
        Hang,
    }

    #[derive(Debug)]
    struct Scripted(Behavior);

    impl Callable for Scripted {
        fn name(&self) -> &str {
            "scripted"
        }

        fn invoke(&self, data: Value, _ctx: CallContext) -> Result<Invocation, FunctionError> {
            match self.0 {
                Behavior::Ready => Ok(Invocation::Ready(data)),
                Behavior::Resolve => Ok(Invocation::Pending(Box::pin(async move {
                    tokio::task::yield_now().await;
                    Ok::<_, FunctionError>(data)
                }))),
                Behavior::Throw => Err(FunctionError::thrown("bad input")),
                Behavior::Reject => Ok(Invocation::Pending(Box::pin(async {
                    Err::<Value, _>(FunctionError::thrown("rejected"))
                }))),
                Behavior::PanicNow => panic!("invoke exploded"),
                Behavior::PanicLater => Ok(Invocation::Pending(Box::pin(async move {
                    if data.is_object() {
                        panic!("pending exploded");
                    }
                    Ok::<_, FunctionError>(data)
                }))),
                Behavior::Hang => Ok(Invocation::Pending(Box::pin(std::future::pending::<
                    Result<Value, FunctionError>,
                >()))),
            }
        }
    }

    async fn run(behavior: Behavior) -> InvocationOutcome {
        invoke_guarded(
            Arc::new(Scripted(behavior)),
            json!({"x": 1}),
            CallContext::new("test"),
            Duration::from_millis(100),
        )
        .await
    }

    #[tokio::test]
    async fn test_ready_and_resolved_values() {
        assert_eq!(
            run(Behavior::Ready).await,
            InvocationOutcome::Success(json!({"x": 1}))
        );
        assert_eq!(
            run(Behavior::Resolve).await,
            InvocationOutcome::Success(json!({"x": 1}))
        );
    }

    #[tokio::test]
    async fn test_throw_and_reject_look_the_same() {
        for behavior in [Behavior::Throw, Behavior::Reject] {
            let outcome = run(behavior).await;
            let failure = outcome.failure().unwrap();
            assert_eq!(failure.kind, FailureKind::Exception);
            assert!(failure.is_uncaught_exception());
        }
    }

    #[tokio::test]
    async fn test_panics_are_contained() {
        let outcome = run(Behavior::PanicNow).await;
        let failure = outcome.failure().unwrap();
        assert_eq!(failure.kind, FailureKind::Panicked);
        assert!(failure.message.contains("invoke exploded"));
        assert!(failure.is_uncaught_exception());

        let outcome = run(Behavior::PanicLater).await;
        let failure = outcome.failure().unwrap();
        assert_eq!(failure.kind, FailureKind::Panicked);
        assert!(failure.message.contains("pending exploded"));
    }

    #[tokio::test]
    async fn test_deadline() {
        let outcome = run(Behavior::Hang).await;
        let failure = outcome.failure().unwrap();
        assert_eq!(failure.kind, FailureKind::Timeout);
        assert_eq!(failure.message, "function timed out after 100ms");
        assert!(!failure.is_uncaught_exception());
    }

    #[test]
    fn test_outcome_json() {
        assert_eq!(
            InvocationOutcome::Success(json!(3)).to_json(),
            json!({"result": 3})
        );

        let failure = InvocationOutcome::from(FunctionError::thrown("nope"));
        assert_eq!(
            failure.to_json(),
            json!({"error": "uncaught exception! nope", "kind": "exception"})
        );
    }
}
