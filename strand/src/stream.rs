//!
//! Streams
//!
//! A `Stream<T>` is an immutable recipe for a lazy, pull-based sequence of
//! effectful steps. Nothing runs until a `Driver` opens it; opening builds
//! a fresh `Cursor` holding private evaluation state, so the same stream
//! value can be run any number of times, from any thread.
//!
//! ## Composition
//!
//! - `append` - first stream to completion, then the second (always serial)
//! - `merge` / `merge_all` - union of branches, scheduled per `Style`
//! - `bind` - nested loop, inner streams scheduled per `Style`
//!
//! Every stream carries a style tag. For `merge` and `bind` the tag *is*
//! the scheduling policy of that composition, and `with_style` reattaches
//! a different one. The method forms (`a.merge(b)`, `o.bind(f)`) pass the
//! receiver's tag on to the new composition, so a style chosen at the head
//! of a pipeline flows explicitly through everything built from it.
//! Style-agnostic transformations (`map`, `filter`, ...) are transparent:
//! restyling them restyles the composition underneath.
//!

use std::fmt;
use std::sync::Arc;

use crate::compose::{Concat, ConcatMap, Cycle, Generate, Generator, InterleavedBind, IterCursor, RoundRobin};
use crate::errors::{StreamError, StreamResult};
use crate::runtime::Runtime;
use crate::scheduler::{self, Job};
use crate::step::{Cursor, Done, Step, Unfold};
use crate::style::Style;

/// A composition node: knows how to open itself under a given style.
pub(crate) trait Node<T>: Send + Sync {
    fn open(&self, style: Style, rt: &Runtime) -> Box<dyn Cursor<T>>;
}

pub struct Stream<T> {
    node: Arc<dyn Node<T>>,
    style: Style,
}

impl<T> Clone for Stream<T> {
    fn clone(&self) -> Self {
        Self {
            node: Arc::clone(&self.node),
            style: self.style,
        }
    }
}

impl<T> fmt::Debug for Stream<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stream")
            .field("style", &self.style)
            .finish_non_exhaustive()
    }
}

struct Source<F>(F);

impl<T, F> Node<T> for Source<F>
where
    F: Fn() -> Box<dyn Cursor<T>> + Send + Sync,
{
    fn open(&self, _style: Style, _rt: &Runtime) -> Box<dyn Cursor<T>> {
        (self.0)()
    }
}

struct Append<T> {
    first: Stream<T>,
    second: Stream<T>,
}

impl<T: Send + 'static> Node<T> for Append<T> {
    fn open(&self, _style: Style, rt: &Runtime) -> Box<dyn Cursor<T>> {
        Box::new(Concat::new(
            [self.first.clone(), self.second.clone()],
            rt.clone(),
        ))
    }
}

struct Merge<T> {
    branches: Vec<Stream<T>>,
}

impl<T: Send + 'static> Node<T> for Merge<T> {
    fn open(&self, style: Style, rt: &Runtime) -> Box<dyn Cursor<T>> {
        match style {
            Style::Serial => Box::new(Concat::new(self.branches.iter().cloned(), rt.clone())),
            Style::Interleaved => Box::new(RoundRobin::new(
                self.branches.iter().map(|branch| branch.open(rt)).collect(),
            )),
            Style::Async | Style::Parallel => {
                let jobs = self.branches.iter().cloned().map(Job::Drain).collect();
                scheduler::run_concurrently(jobs, style, rt)
            }
        }
    }
}

struct Bind<U, T> {
    outer: Stream<U>,
    generate: Generator<U, T>,
}

impl<U: Send + 'static, T: Send + 'static> Node<T> for Bind<U, T> {
    fn open(&self, style: Style, rt: &Runtime) -> Box<dyn Cursor<T>> {
        let outer = self.outer.open(rt);
        let generate = Arc::clone(&self.generate);
        match style {
            Style::Serial => Box::new(ConcatMap::new(outer, generate, rt.clone())),
            Style::Interleaved => Box::new(InterleavedBind::new(outer, generate, rt.clone())),
            Style::Async | Style::Parallel => {
                let expand = Job::Expand(Box::new(Generate::new(outer, generate)));
                scheduler::run_concurrently(vec![expand], style, rt)
            }
        }
    }
}

struct Repeat<T> {
    source: Stream<T>,
}

impl<T: Send + 'static> Node<T> for Repeat<T> {
    fn open(&self, _style: Style, rt: &Runtime) -> Box<dyn Cursor<T>> {
        Box::new(Cycle::new(self.source.clone(), rt.clone()))
    }
}

impl<T: Send + 'static> Stream<T> {
    pub(crate) fn from_node(node: impl Node<T> + 'static) -> Self {
        Self {
            node: Arc::new(node),
            style: Style::Serial,
        }
    }

    fn source<F>(open: F) -> Self
    where
        F: Fn() -> Box<dyn Cursor<T>> + Send + Sync + 'static,
    {
        Self::from_node(Source(open))
    }

    /// Open under the stream's own style.
    pub(crate) fn open(&self, rt: &Runtime) -> Box<dyn Cursor<T>> {
        self.node.open(self.style, rt)
    }

    /// Open under an inherited style, ignoring the stream's own tag.
    pub(crate) fn open_as(&self, style: Style, rt: &Runtime) -> Box<dyn Cursor<T>> {
        self.node.open(style, rt)
    }

    pub fn style(&self) -> Style {
        self.style
    }

    /// Reattach `style` to this composition.
    pub fn with_style(mut self, style: Style) -> Self {
        self.style = style;
        self
    }

    /// A source backed by a hand-written cursor; `open` runs once per run.
    pub fn from_cursor<C, F>(open: F) -> Self
    where
        C: Cursor<T> + 'static,
        F: Fn() -> C + Send + Sync + 'static,
    {
        Self::source(move || Box::new(open()))
    }

    pub fn empty() -> Self {
        Self::source(|| Box::new(Done))
    }

    /// A stream of exactly one element, produced by running `effect`.
    pub fn once<F>(effect: F) -> Self
    where
        F: Fn() -> StreamResult<T> + Send + Sync + 'static,
    {
        let effect = Arc::new(effect);
        Self::source(move || {
            let effect = Arc::clone(&effect);
            Box::new(Unfold::new(true, move |fresh| {
                Ok(if fresh {
                    Step::Yield(effect()?, false)
                } else {
                    Step::Stop
                })
            }))
        })
    }

    pub fn pure(value: T) -> Self
    where
        T: Clone + Sync,
    {
        Self::once(move || Ok(value.clone()))
    }

    /// `effect`'s element followed by every element of `tail`.
    pub fn cons<F>(effect: F, tail: Stream<T>) -> Self
    where
        F: Fn() -> StreamResult<T> + Send + Sync + 'static,
    {
        let style = tail.style;
        Self::once(effect).append(tail).with_style(style)
    }

    /// The general state machine: `step` maps a state to the next `Step`.
    pub fn unfold<S, F>(seed: S, step: F) -> Self
    where
        S: Clone + Send + Sync + 'static,
        F: Fn(S) -> StreamResult<Step<T, S>> + Send + Sync + 'static,
    {
        let step = Arc::new(step);
        Self::source(move || {
            let step = Arc::clone(&step);
            Box::new(Unfold::new(seed.clone(), move |state| step(state)))
        })
    }

    pub fn iter<I>(items: I) -> Self
    where
        I: IntoIterator<Item = T> + Clone + Send + Sync + 'static,
        I::IntoIter: Send + 'static,
    {
        Self::source(move || Box::new(IterCursor::new(items.clone().into_iter())))
    }

    /// An endless stream running `effect` for every element.
    pub fn repeat<F>(effect: F) -> Self
    where
        F: Fn() -> StreamResult<T> + Send + Sync + 'static,
    {
        let effect = Arc::new(effect);
        Self::unfold((), move |()| Ok(Step::Yield(effect()?, ())))
    }

    /// A stream whose first step fails with the error `make` builds.
    pub fn fail<F>(make: F) -> Self
    where
        F: Fn() -> StreamError + Send + Sync + 'static,
    {
        Self::unfold((), move |()| Err(make()))
    }

    /// This stream, reopened every time it stops.
    pub fn cycle(self) -> Self {
        let style = self.style;
        Self::from_node(Repeat { source: self }).with_style(style)
    }

    pub fn append(self, other: Stream<T>) -> Self {
        let style = self.style;
        Self::from_node(Append {
            first: self,
            second: other,
        })
        .with_style(style)
    }

    /// Merge with `other` under this stream's style.
    pub fn merge(self, other: Stream<T>) -> Self {
        let style = self.style;
        merge(self, other, style)
    }

    pub fn merge_all(streams: impl IntoIterator<Item = Stream<T>>, style: Style) -> Self {
        Self::from_node(Merge {
            branches: streams.into_iter().collect(),
        })
        .with_style(style)
    }

    /// Nested loop under this stream's style.
    pub fn bind<U, F>(self, generate: F) -> Stream<U>
    where
        U: Send + 'static,
        F: Fn(T) -> Stream<U> + Send + Sync + 'static,
    {
        let style = self.style;
        bind(self, generate, style)
    }
}

impl<T> FromIterator<T> for Stream<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Stream::iter(iter.into_iter().collect::<Vec<_>>())
    }
}

/// Union of `a` and `b`, scheduled per `style`.
pub fn merge<T: Send + 'static>(a: Stream<T>, b: Stream<T>, style: Style) -> Stream<T> {
    Stream::merge_all([a, b], style)
}

/// For every element of `outer`, the elements of `generate(element)`,
/// scheduled per `style`.
pub fn bind<T, U, F>(outer: Stream<T>, generate: F, style: Style) -> Stream<U>
where
    T: Send + 'static,
    U: Send + 'static,
    F: Fn(T) -> Stream<U> + Send + Sync + 'static,
{
    Stream::from_node(Bind {
        outer,
        generate: Arc::new(generate),
    })
    .with_style(style)
}

pub fn with_style<T: Send + 'static>(stream: Stream<T>, style: Style) -> Stream<T> {
    stream.with_style(style)
}
