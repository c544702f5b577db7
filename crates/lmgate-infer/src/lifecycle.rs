use std::fmt;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::stream::StreamOutcome;
use crate::types::RequestId;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RouteKind {
    Predict,
    PredictStream,
    DescribeImage,
    DescribeImageStream,
    DescribeImageBatch,
    DescribeImageBatchStream,
}

impl RouteKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Predict => "predict",
            Self::PredictStream => "predict_stream",
            Self::DescribeImage => "describe_image",
            Self::DescribeImageStream => "describe_image_stream",
            Self::DescribeImageBatch => "describe_image_batch",
            Self::DescribeImageBatchStream => "describe_image_batch_stream",
        }
    }

    pub fn is_streaming(&self) -> bool {
        matches!(
            self,
            Self::PredictStream | Self::DescribeImageStream | Self::DescribeImageBatchStream
        )
    }
}

impl fmt::Display for RouteKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RequestState {
    Pending,
    Dispatching,
    Streaming,
    Computing,
    Completed,
    Cancelled,
    Errored,
}

impl RequestState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled | Self::Errored)
    }

    fn can_move_to(self, next: Self) -> bool {
        use RequestState::*;
        match (self, next) {
            (Pending, Dispatching) => true,
            (Dispatching, Streaming | Computing) => true,
            (Streaming | Computing, Completed) => true,
            (from, Cancelled | Errored) => !from.is_terminal(),
            _ => false,
        }
    }
}

/// Per-request bookkeeping: identity, timing, and a one-way state machine.
///
/// `pending -> dispatching -> {streaming | computing} -> {completed | cancelled | errored}`.
/// Cancellation and failure are accepted from any non-terminal state.
#[derive(Debug)]
pub struct RequestLifecycle {
    id: RequestId,
    route: RouteKind,
    started: Instant,
    state: RequestState,
}

impl RequestLifecycle {
    pub fn new(route: RouteKind) -> Self {
        let lifecycle = Self {
            id: Uuid::new_v4(),
            route,
            started: Instant::now(),
            state: RequestState::Pending,
        };
        debug!(request_id = %lifecycle.id, route = %route, "request accepted");
        lifecycle
    }

    pub fn id(&self) -> RequestId {
        self.id
    }

    pub fn route(&self) -> RouteKind {
        self.route
    }

    pub fn state(&self) -> RequestState {
        self.state
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn dispatch(&mut self) -> crate::Result<()> {
        self.transition(RequestState::Dispatching)
    }

    pub fn begin_streaming(&mut self) -> crate::Result<()> {
        self.transition(RequestState::Streaming)
    }

    pub fn begin_computing(&mut self) -> crate::Result<()> {
        self.transition(RequestState::Computing)
    }

    pub fn complete(&mut self) -> crate::Result<()> {
        self.transition(RequestState::Completed)
    }

    pub fn cancel(&mut self) -> crate::Result<()> {
        self.transition(RequestState::Cancelled)
    }

    pub fn fail(&mut self, error: &crate::Error) -> crate::Result<()> {
        self.transition(RequestState::Errored)?;
        if error.is_client_error() {
            debug!(request_id = %self.id, route = %self.route, error = %error, "request rejected");
        } else {
            warn!(request_id = %self.id, route = %self.route, error = %error, "request failed");
        }
        Ok(())
    }

    /// Records a failed `result` as `errored`, or `cancelled` for
    /// [`Error::Cancelled`](crate::Error::Cancelled), and hands it back unchanged.
    pub fn track<T>(&mut self, result: crate::Result<T>) -> crate::Result<T> {
        if let Err(e) = &result {
            if !self.state.is_terminal() {
                let _ = match e {
                    crate::Error::Cancelled(_) => self.cancel(),
                    _ => self.fail(e),
                };
            }
        }
        result
    }

    /// Moves a streaming request to the terminal state matching `outcome`.
    pub fn finish_stream(&mut self, outcome: &StreamOutcome) -> crate::Result<()> {
        match outcome {
            StreamOutcome::Completed { .. } => self.complete(),
            StreamOutcome::Cancelled => self.cancel(),
            StreamOutcome::Errored(message) => self.fail(&crate::Error::engine(message.clone())),
        }
    }

    fn transition(&mut self, next: RequestState) -> crate::Result<()> {
        if !self.state.can_move_to(next) {
            return Err(crate::Error::internal(format!(
                "request {} cannot move from {:?} to {next:?}",
                self.id, self.state
            )));
        }
        self.state = next;
        if next.is_terminal() {
            info!(
                request_id = %self.id,
                route = %self.route,
                state = ?next,
                elapsed_ms = self.elapsed().as_millis() as u64,
                "request finished"
            );
        }
        Ok(())
    }
}

impl Drop for RequestLifecycle {
    fn drop(&mut self) {
        if !self.state.is_terminal() {
            // The handler future was dropped, almost always a client disconnect.
            info!(request_id = %self.id, route = %self.route, state = ?self.state, "request abandoned");
        }
    }
}
