//!
//! Step representation
//!
//! A stream advances one unit at a time. Each advance produces a `Step`:
//!
//! - `Yield(value, next)` - a value was produced, resume from `next`
//! - `Skip(next)` - nothing produced this time, resume from `next`
//! - `Stop` - the stream is finished and must not be resumed
//!
//! `unfold`-style sources thread an explicit state `S` through their step
//! function. Once a source is opened its state lives inside a `Cursor`,
//! which erases `S` and reports `Step<T>` (state `()`) to its consumer.
//!

use crate::errors::StreamResult;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step<T, S = ()> {
    Yield(T, S),
    Skip(S),
    Stop,
}

impl<T, S> Step<T, S> {
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Step<U, S> {
        match self {
            Step::Yield(value, next) => Step::Yield(f(value), next),
            Step::Skip(next) => Step::Skip(next),
            Step::Stop => Step::Stop,
        }
    }

    /// Split off the resume state, leaving a state-less step behind.
    pub fn detach(self) -> (Step<T>, Option<S>) {
        match self {
            Step::Yield(value, next) => (Step::Yield(value, ()), Some(next)),
            Step::Skip(next) => (Step::Skip(()), Some(next)),
            Step::Stop => (Step::Stop, None),
        }
    }

    pub fn is_stop(&self) -> bool {
        matches!(self, Step::Stop)
    }
}

impl<T> Step<T> {
    pub fn item(value: T) -> Self {
        Step::Yield(value, ())
    }

    pub fn skip() -> Self {
        Step::Skip(())
    }

    pub fn into_item(self) -> Option<T> {
        match self {
            Step::Yield(value, ()) => Some(value),
            _ => None,
        }
    }
}

/// An opened stream: private evaluation state plus the means to advance it.
///
/// A cursor is owned by exactly one thread of evaluation at a time. After it
/// has reported `Stop` or an error, further calls to `step` return `Stop`.
pub trait Cursor<T>: Send {
    fn step(&mut self) -> StreamResult<Step<T>>;

    /// Stop early. Releases any workers running beneath this cursor.
    fn cancel(&mut self) {}
}

impl<T> Cursor<T> for Box<dyn Cursor<T>> {
    fn step(&mut self) -> StreamResult<Step<T>> {
        (**self).step()
    }

    fn cancel(&mut self) {
        (**self).cancel()
    }
}

/// Cursor over a state machine `S -> Step<T, S>`.
pub(crate) struct Unfold<S, F> {
    state: Option<S>,
    step: F,
}

impl<S, F> Unfold<S, F> {
    pub(crate) fn new(seed: S, step: F) -> Self {
        Self {
            state: Some(seed),
            step,
        }
    }
}

impl<T, S, F> Cursor<T> for Unfold<S, F>
where
    S: Send,
    F: FnMut(S) -> StreamResult<Step<T, S>> + Send,
{
    fn step(&mut self) -> StreamResult<Step<T>> {
        let Some(state) = self.state.take() else {
            return Ok(Step::Stop);
        };
        let (step, next) = (self.step)(state)?.detach();
        self.state = next;
        Ok(step)
    }

    fn cancel(&mut self) {
        self.state = None;
    }
}

/// Cursor that reports `Stop` forever.
pub(crate) struct Done;

impl<T> Cursor<T> for Done {
    fn step(&mut self) -> StreamResult<Step<T>> {
        Ok(Step::Stop)
    }
}
