//!
//! Single-threaded composition cursors
//!
//! Serial and Interleaved merges and binds are evaluated entirely on the
//! consumer's thread. Structural transitions (a branch finishing, a new
//! inner stream being opened) are reported as `Skip` so that every call to
//! `step` does a bounded amount of work.
//!

use std::collections::VecDeque;
use std::sync::Arc;

use crate::errors::StreamResult;
use crate::runtime::Runtime;
use crate::step::{Cursor, Step};
use crate::stream::Stream;

pub(crate) type Generator<U, T> = Arc<dyn Fn(U) -> Stream<T> + Send + Sync>;

/// Items of an iterator, one per step.
pub(crate) struct IterCursor<I> {
    iter: Option<I>,
}

impl<I> IterCursor<I> {
    pub(crate) fn new(iter: I) -> Self {
        Self { iter: Some(iter) }
    }
}

impl<T, I> Cursor<T> for IterCursor<I>
where
    I: Iterator<Item = T> + Send,
{
    fn step(&mut self) -> StreamResult<Step<T>> {
        match self.iter.as_mut().and_then(Iterator::next) {
            Some(item) => Ok(Step::item(item)),
            None => {
                self.iter = None;
                Ok(Step::Stop)
            }
        }
    }

    fn cancel(&mut self) {
        self.iter = None;
    }
}

/// Each stream to completion, in order. Streams are opened only when
/// their turn comes.
pub(crate) struct Concat<T> {
    queue: VecDeque<Stream<T>>,
    current: Option<Box<dyn Cursor<T>>>,
    rt: Runtime,
}

impl<T: Send + 'static> Concat<T> {
    pub(crate) fn new(streams: impl IntoIterator<Item = Stream<T>>, rt: Runtime) -> Self {
        Self {
            queue: streams.into_iter().collect(),
            current: None,
            rt,
        }
    }
}

impl<T: Send + 'static> Cursor<T> for Concat<T> {
    fn step(&mut self) -> StreamResult<Step<T>> {
        let Some(current) = self.current.as_mut() else {
            return Ok(match self.queue.pop_front() {
                Some(next) => {
                    self.current = Some(next.open(&self.rt));
                    Step::skip()
                }
                None => Step::Stop,
            });
        };

        match current.step()? {
            Step::Stop => {
                self.current = None;
                Ok(if self.queue.is_empty() { Step::Stop } else { Step::skip() })
            }
            step => Ok(step),
        }
    }

    fn cancel(&mut self) {
        if let Some(mut current) = self.current.take() {
            current.cancel();
        }
        self.queue.clear();
    }
}

/// One element from each branch in turn. A `Skip` does not use up a turn.
pub(crate) struct RoundRobin<T> {
    turns: VecDeque<Box<dyn Cursor<T>>>,
}

impl<T> RoundRobin<T> {
    pub(crate) fn new(branches: Vec<Box<dyn Cursor<T>>>) -> Self {
        Self {
            turns: branches.into(),
        }
    }
}

impl<T: Send> Cursor<T> for RoundRobin<T> {
    fn step(&mut self) -> StreamResult<Step<T>> {
        let Some(mut branch) = self.turns.pop_front() else {
            return Ok(Step::Stop);
        };

        Ok(match branch.step()? {
            Step::Yield(item, ()) => {
                self.turns.push_back(branch);
                Step::item(item)
            }
            Step::Skip(()) => {
                self.turns.push_front(branch);
                Step::skip()
            }
            Step::Stop if self.turns.is_empty() => Step::Stop,
            Step::Stop => Step::skip(),
        })
    }

    fn cancel(&mut self) {
        for mut branch in self.turns.drain(..) {
            branch.cancel();
        }
    }
}

/// Depth-first nested loop: each inner stream is exhausted before the
/// outer stream is advanced again.
pub(crate) struct ConcatMap<U, T> {
    outer: Option<Box<dyn Cursor<U>>>,
    inner: Option<Box<dyn Cursor<T>>>,
    generate: Generator<U, T>,
    rt: Runtime,
}

impl<U, T> ConcatMap<U, T> {
    pub(crate) fn new(outer: Box<dyn Cursor<U>>, generate: Generator<U, T>, rt: Runtime) -> Self {
        Self {
            outer: Some(outer),
            inner: None,
            generate,
            rt,
        }
    }
}

impl<U: Send + 'static, T: Send + 'static> Cursor<T> for ConcatMap<U, T> {
    fn step(&mut self) -> StreamResult<Step<T>> {
        if let Some(inner) = self.inner.as_mut() {
            return Ok(match inner.step()? {
                Step::Stop => {
                    self.inner = None;
                    Step::skip()
                }
                step => step,
            });
        }

        let Some(outer) = self.outer.as_mut() else {
            return Ok(Step::Stop);
        };
        Ok(match outer.step()? {
            Step::Yield(value, ()) => {
                self.inner = Some((self.generate)(value).open(&self.rt));
                Step::skip()
            }
            Step::Skip(()) => Step::skip(),
            Step::Stop => {
                self.outer = None;
                Step::Stop
            }
        })
    }

    fn cancel(&mut self) {
        if let Some(mut inner) = self.inner.take() {
            inner.cancel();
        }
        if let Some(mut outer) = self.outer.take() {
            outer.cancel();
        }
    }
}

enum Turn<T> {
    Outer,
    Inner(Box<dyn Cursor<T>>),
}

/// Fair nested loop. The outer stream takes turns alongside the inner
/// streams it has produced; a freshly produced inner stream takes its
/// first turn immediately, so `[1, 2] >>= \x -> [x, x + 10]` gives
/// `1, 2, 11, 12`.
pub(crate) struct InterleavedBind<U, T> {
    outer: Option<Box<dyn Cursor<U>>>,
    turns: VecDeque<Turn<T>>,
    generate: Generator<U, T>,
    rt: Runtime,
}

impl<U, T> InterleavedBind<U, T> {
    pub(crate) fn new(outer: Box<dyn Cursor<U>>, generate: Generator<U, T>, rt: Runtime) -> Self {
        Self {
            outer: Some(outer),
            turns: VecDeque::from([Turn::Outer]),
            generate,
            rt,
        }
    }

    fn inner_turn(&mut self, mut inner: Box<dyn Cursor<T>>) -> StreamResult<Step<T>> {
        Ok(match inner.step()? {
            Step::Yield(item, ()) => {
                self.turns.push_back(Turn::Inner(inner));
                Step::item(item)
            }
            Step::Skip(()) => {
                self.turns.push_front(Turn::Inner(inner));
                Step::skip()
            }
            Step::Stop => self.exhausted_or_skip(),
        })
    }

    fn exhausted_or_skip(&self) -> Step<T> {
        if self.turns.is_empty() {
            Step::Stop
        } else {
            Step::skip()
        }
    }
}

impl<U: Send + 'static, T: Send + 'static> Cursor<T> for InterleavedBind<U, T> {
    fn step(&mut self) -> StreamResult<Step<T>> {
        match self.turns.pop_front() {
            None => Ok(Step::Stop),
            Some(Turn::Inner(inner)) => self.inner_turn(inner),
            Some(Turn::Outer) => {
                let Some(outer) = self.outer.as_mut() else {
                    return Ok(self.exhausted_or_skip());
                };
                match outer.step()? {
                    Step::Yield(value, ()) => {
                        self.turns.push_back(Turn::Outer);
                        let inner = (self.generate)(value).open(&self.rt);
                        self.inner_turn(inner)
                    }
                    Step::Skip(()) => {
                        self.turns.push_front(Turn::Outer);
                        Ok(Step::skip())
                    }
                    Step::Stop => {
                        self.outer = None;
                        Ok(self.exhausted_or_skip())
                    }
                }
            }
        }
    }

    fn cancel(&mut self) {
        for turn in self.turns.drain(..) {
            if let Turn::Inner(mut inner) = turn {
                inner.cancel();
            }
        }
        if let Some(mut outer) = self.outer.take() {
            outer.cancel();
        }
    }
}

/// Outer values turned into inner streams; the work source of a
/// concurrent bind.
pub(crate) struct Generate<U, T> {
    outer: Box<dyn Cursor<U>>,
    generate: Generator<U, T>,
}

impl<U, T> Generate<U, T> {
    pub(crate) fn new(outer: Box<dyn Cursor<U>>, generate: Generator<U, T>) -> Self {
        Self { outer, generate }
    }
}

impl<U: Send + 'static, T: Send + 'static> Cursor<Stream<T>> for Generate<U, T> {
    fn step(&mut self) -> StreamResult<Step<Stream<T>>> {
        Ok(self.outer.step()?.map(|value| (self.generate)(value)))
    }

    fn cancel(&mut self) {
        self.outer.cancel();
    }
}

/// Endless repetition by reopening the same stream. A pass that produces
/// nothing ends the repetition.
pub(crate) struct Cycle<T> {
    source: Stream<T>,
    current: Option<Box<dyn Cursor<T>>>,
    produced: bool,
    rt: Runtime,
}

impl<T: Send + 'static> Cycle<T> {
    pub(crate) fn new(source: Stream<T>, rt: Runtime) -> Self {
        Self {
            source,
            current: None,
            produced: true,
            rt,
        }
    }
}

impl<T: Send + 'static> Cursor<T> for Cycle<T> {
    fn step(&mut self) -> StreamResult<Step<T>> {
        let Some(current) = self.current.as_mut() else {
            if !self.produced {
                return Ok(Step::Stop);
            }
            self.produced = false;
            self.current = Some(self.source.open(&self.rt));
            return Ok(Step::skip());
        };

        let step = current.step()?;
        match &step {
            Step::Yield(..) => self.produced = true,
            Step::Skip(()) => {}
            Step::Stop => self.current = None,
        }
        Ok(if step.is_stop() { Step::skip() } else { step })
    }

    fn cancel(&mut self) {
        if let Some(mut current) = self.current.take() {
            current.cancel();
        }
        self.produced = false;
    }
}
