//!
//! Style-agnostic transformations
//!
//! Each operation is a cursor wrapper written purely in terms of `Step`,
//! so it behaves the same under every execution style. Restyling a
//! transformed stream restyles the composition underneath it.
//!
//! `take` and `take_while` end the stream early. When they do, they cancel
//! their input, which halts and joins any workers running beneath it.
//!

use std::sync::Arc;

use crate::errors::StreamResult;
use crate::runtime::Runtime;
use crate::step::{Cursor, Step};
use crate::stream::{Node, Stream};
use crate::style::Style;

struct Transform<U, F> {
    input: Stream<U>,
    wrap: F,
}

impl<U, T, F> Node<T> for Transform<U, F>
where
    U: Send + 'static,
    F: Fn(Box<dyn Cursor<U>>) -> Box<dyn Cursor<T>> + Send + Sync,
{
    fn open(&self, style: Style, rt: &Runtime) -> Box<dyn Cursor<T>> {
        (self.wrap)(self.input.open_as(style, rt))
    }
}

fn transform<U, T, F>(input: Stream<U>, wrap: F) -> Stream<T>
where
    U: Send + 'static,
    T: Send + 'static,
    F: Fn(Box<dyn Cursor<U>>) -> Box<dyn Cursor<T>> + Send + Sync + 'static,
{
    let style = input.style();
    Stream::from_node(Transform { input, wrap }).with_style(style)
}

struct Mapped<U, F> {
    input: Box<dyn Cursor<U>>,
    f: Arc<F>,
}

impl<U, T, F> Cursor<T> for Mapped<U, F>
where
    U: Send,
    F: Fn(U) -> StreamResult<T> + Send + Sync,
{
    fn step(&mut self) -> StreamResult<Step<T>> {
        Ok(match self.input.step()? {
            Step::Yield(value, ()) => Step::item((self.f)(value)?),
            Step::Skip(()) => Step::skip(),
            Step::Stop => Step::Stop,
        })
    }

    fn cancel(&mut self) {
        self.input.cancel();
    }
}

struct Filtered<T, P> {
    input: Box<dyn Cursor<T>>,
    keep: Arc<P>,
}

impl<T, P> Cursor<T> for Filtered<T, P>
where
    T: Send,
    P: Fn(&T) -> bool + Send + Sync,
{
    fn step(&mut self) -> StreamResult<Step<T>> {
        Ok(match self.input.step()? {
            Step::Yield(value, ()) if (self.keep)(&value) => Step::item(value),
            Step::Yield(..) | Step::Skip(()) => Step::skip(),
            Step::Stop => Step::Stop,
        })
    }

    fn cancel(&mut self) {
        self.input.cancel();
    }
}

struct Take<T> {
    input: Box<dyn Cursor<T>>,
    remaining: usize,
    done: bool,
}

impl<T: Send> Cursor<T> for Take<T> {
    fn step(&mut self) -> StreamResult<Step<T>> {
        if self.done {
            return Ok(Step::Stop);
        }
        if self.remaining == 0 {
            self.cancel();
            return Ok(Step::Stop);
        }
        let step = self.input.step()?;
        match &step {
            Step::Yield(..) => {
                self.remaining -= 1;
                if self.remaining == 0 {
                    self.cancel();
                }
            }
            Step::Skip(()) => {}
            Step::Stop => self.done = true,
        }
        Ok(step)
    }

    fn cancel(&mut self) {
        if !self.done {
            self.done = true;
            self.input.cancel();
        }
    }
}

struct TakeWhile<T, P> {
    input: Box<dyn Cursor<T>>,
    keep: Arc<P>,
    done: bool,
}

impl<T, P> Cursor<T> for TakeWhile<T, P>
where
    T: Send,
    P: Fn(&T) -> bool + Send + Sync,
{
    fn step(&mut self) -> StreamResult<Step<T>> {
        if self.done {
            return Ok(Step::Stop);
        }
        match self.input.step()? {
            Step::Yield(value, ()) if (self.keep)(&value) => Ok(Step::item(value)),
            Step::Yield(..) => {
                self.cancel();
                Ok(Step::Stop)
            }
            Step::Skip(()) => Ok(Step::skip()),
            Step::Stop => {
                self.done = true;
                Ok(Step::Stop)
            }
        }
    }

    fn cancel(&mut self) {
        if !self.done {
            self.done = true;
            self.input.cancel();
        }
    }
}

impl<U: Send + 'static> Stream<U> {
    pub fn map<T, F>(self, f: F) -> Stream<T>
    where
        T: Send + 'static,
        F: Fn(U) -> T + Send + Sync + 'static,
    {
        self.then(move |value| Ok(f(value)))
    }

    /// Map with an effect that may fail.
    pub fn then<T, F>(self, f: F) -> Stream<T>
    where
        T: Send + 'static,
        F: Fn(U) -> StreamResult<T> + Send + Sync + 'static,
    {
        let f = Arc::new(f);
        transform(self, move |input| {
            Box::new(Mapped {
                input,
                f: Arc::clone(&f),
            })
        })
    }
}

impl<T: Send + 'static> Stream<T> {
    pub fn filter<P>(self, keep: P) -> Stream<T>
    where
        P: Fn(&T) -> bool + Send + Sync + 'static,
    {
        let keep = Arc::new(keep);
        transform(self, move |input| {
            Box::new(Filtered {
                input,
                keep: Arc::clone(&keep),
            })
        })
    }

    /// At most `n` elements; the input is cancelled once they are out.
    pub fn take(self, n: usize) -> Stream<T> {
        transform(self, move |input| {
            Box::new(Take {
                input,
                remaining: n,
                done: false,
            })
        })
    }

    /// Elements up to (not including) the first one failing `keep`.
    pub fn take_while<P>(self, keep: P) -> Stream<T>
    where
        P: Fn(&T) -> bool + Send + Sync + 'static,
    {
        let keep = Arc::new(keep);
        transform(self, move |input| {
            Box::new(TakeWhile {
                input,
                keep: Arc::clone(&keep),
                done: false,
            })
        })
    }

    /// Run `f` on every element as it passes.
    pub fn inspect<F>(self, f: F) -> Stream<T>
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.then(move |value| {
            f(&value);
            Ok(value)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::Driver;
    use crate::errors::StreamError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn collect<T: Send + 'static>(stream: &Stream<T>) -> Vec<T> {
        Driver::default().to_vec(stream).expect("stream should run")
    }

    #[test]
    fn test_map_filter_take() {
        let stream = Stream::iter(1..=10)
            .map(|x| x * 3)
            .filter(|x| x % 2 == 0)
            .take(3);
        assert_eq!(collect(&stream), vec![6, 12, 18]);
    }

    #[test]
    fn test_take_zero_never_steps_input() {
        let pulls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&pulls);
        let stream = Stream::repeat(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(1)
        })
        .take(0);

        assert!(collect(&stream).is_empty());
        assert_eq!(pulls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_take_while_stops_at_first_rejection() {
        let stream = Stream::iter(vec![1, 2, 5, 1]).take_while(|x| *x < 3);
        assert_eq!(collect(&stream), vec![1, 2]);
    }

    #[test]
    fn test_then_propagates_errors() {
        let stream = Stream::iter(vec![1, 2, 3]).then(|x| {
            if x == 2 {
                Err(StreamError::source_failure("two"))
            } else {
                Ok(x)
            }
        });
        let err = Driver::default().to_vec(&stream).unwrap_err();
        assert!(err.to_string().contains("two"));
    }

    #[test]
    fn test_inspect_sees_each_element() {
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&seen);
        let stream = Stream::iter(vec!['a', 'b']).inspect(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(collect(&stream), vec!['a', 'b']);
        assert_eq!(seen.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_transform_keeps_style_and_restyles_input() {
        let merged = crate::merge(Stream::iter(vec![1, 3]), Stream::iter(vec![2, 4]), Style::Serial)
            .map(|x| x * 10);
        assert_eq!(merged.style(), Style::Serial);
        assert_eq!(collect(&merged), vec![10, 30, 20, 40]);

        let restyled = merged.with_style(Style::Interleaved);
        assert_eq!(collect(&restyled), vec![10, 20, 30, 40]);
    }
}
