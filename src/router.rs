//! Routing part of a stream through an embedded pipeline.
//!
//! Two patterns:
//!
//! - [`InlineRouter`]: a matching item met while the nested pipeline is
//!   idle is pushed into a [`PushBuffer`] feeding it. From then on the
//!   nested pipeline reads the next matching items itself as it asks for
//!   input; unmatched items met on the way are released in arrival order
//!   before its next output. Items that don't match while it is idle pass
//!   straight through. The nested pipeline is built once and kept for the
//!   whole stream, and rebuilt only when it ended on its own while
//!   upstream still has matches.
//! - [`BypassRouter`]: one embedded pipeline reads only the matching items;
//!   the others are held back and released, in arrival order, right before
//!   the next item the embedded pipeline produces. Once the embedded
//!   pipeline is done, held items are released, then whatever upstream
//!   still has passes through unchanged.
//!
//! Neither pattern duplicates or loses items; counts only change when the
//! embedded pipeline itself filters or multiplies.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::iter::Fuse;
use std::rc::Rc;

use tracing::debug;

use crate::error::Result;
use crate::executor::{Transmogrifier, construct_pipeline};
use crate::expression::Condition;
use crate::section::{Item, ItemStream};

/// A queue that can be pushed to while a pipeline reads from it.
#[derive(Clone, Default)]
pub struct PushBuffer {
    queue: Rc<RefCell<VecDeque<Item>>>,
}

impl PushBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, item: Item) {
        self.queue.borrow_mut().push_back(item);
    }

    pub fn pop(&self) -> Option<Item> {
        self.queue.borrow_mut().pop_front()
    }

    pub fn len(&self) -> usize {
        self.queue.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.borrow().is_empty()
    }

    pub fn clear(&self) {
        self.queue.borrow_mut().clear();
    }

    /// A stream that pops from the front of the buffer until it is empty.
    pub fn reader(&self) -> ItemStream {
        let buffer = self.clone();
        Box::new(std::iter::from_fn(move || buffer.pop().map(Ok)))
    }
}

/// Upstream shared between a router and the input of its nested pipeline.
struct RouteState {
    previous: Fuse<ItemStream>,
    condition: Condition,
    skipped: VecDeque<Item>,
}

impl RouteState {
    fn new(previous: ItemStream, condition: Condition) -> Rc<RefCell<Self>> {
        Rc::new(RefCell::new(Self {
            previous: previous.fuse(),
            condition,
            skipped: VecDeque::new(),
        }))
    }

    /// Next matching item; the ones in between are held in `skipped`.
    fn next_match(&mut self) -> Option<Result<Item>> {
        loop {
            let item = match self.previous.next()? {
                Ok(item) => item,
                Err(e) => return Some(Err(e)),
            };
            match self.condition.matches(&item) {
                Ok(true) => return Some(Ok(item)),
                Ok(false) => self.skipped.push_back(item),
                Err(e) => return Some(Err(e)),
            }
        }
    }
}

/// Upstream of a nested pipeline: pushed items first, then matching
/// items pulled from the router's upstream.
struct RouteInput {
    state: Rc<RefCell<RouteState>>,
    buffer: Option<PushBuffer>,
}

impl Iterator for RouteInput {
    type Item = Result<Item>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(item) = self.buffer.as_ref().and_then(PushBuffer::pop) {
            return Some(Ok(item));
        }
        self.state.borrow_mut().next_match()
    }
}

/// Runs matching items through a nested pipeline, in place.
pub struct InlineRouter {
    transmogrifier: Transmogrifier,
    name: String,
    sections: Vec<String>,
    state: Rc<RefCell<RouteState>>,
    buffer: PushBuffer,
    nested: Option<ItemStream>,
    active: bool,
    ready: VecDeque<Result<Item>>,
}

impl InlineRouter {
    /// Fails right away if the nested pipeline cannot be built.
    pub fn new(
        transmogrifier: &Transmogrifier,
        name: &str,
        sections: Vec<String>,
        condition: Condition,
        previous: ItemStream,
    ) -> Result<Self> {
        let mut router = Self {
            transmogrifier: transmogrifier.clone(),
            name: name.to_string(),
            sections,
            state: RouteState::new(previous, condition),
            buffer: PushBuffer::new(),
            nested: None,
            active: false,
            ready: VecDeque::new(),
        };
        router.nested = Some(router.build()?);
        Ok(router)
    }

    fn build(&self) -> Result<ItemStream> {
        let input = RouteInput {
            state: Rc::clone(&self.state),
            buffer: Some(self.buffer.clone()),
        };
        construct_pipeline(&self.transmogrifier, &self.sections, Some(Box::new(input)))
    }

    /// Hand a matching item to the nested pipeline.
    fn activate(&mut self, item: Item) -> Result<()> {
        self.buffer.push(item);
        if self.nested.is_none() {
            debug!(section = self.name.as_str(), "rebuilding ended nested pipeline");
            self.nested = Some(self.build()?);
        }
        self.active = true;
        Ok(())
    }
}

impl Iterator for InlineRouter {
    type Item = Result<Item>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(ready) = self.ready.pop_front() {
                return Some(ready);
            }

            if self.active
                && let Some(nested) = &mut self.nested
            {
                let produced = nested.next();
                self.ready.extend(self.state.borrow_mut().skipped.drain(..).map(Ok));
                match produced {
                    Some(result) => self.ready.push_back(result),
                    None => {
                        self.nested = None;
                        self.active = false;
                        if !self.buffer.is_empty() {
                            debug!(
                                section = self.name.as_str(),
                                unread = self.buffer.len(),
                                "nested pipeline ended before reading its input"
                            );
                            self.buffer.clear();
                        }
                    }
                }
                continue;
            }

            let next = self.state.borrow_mut().previous.next()?;
            let item = match next {
                Ok(item) => item,
                Err(e) => return Some(Err(e)),
            };
            let matched = self.state.borrow().condition.matches(&item);
            match matched {
                Ok(true) => {
                    if let Err(e) = self.activate(item) {
                        return Some(Err(e));
                    }
                }
                Ok(false) => return Some(Ok(item)),
                Err(e) => return Some(Err(e)),
            }
        }
    }
}

/// Feeds matching items through one embedded pipeline and merges the
/// skipped ones back in order.
pub struct BypassRouter {
    state: Rc<RefCell<RouteState>>,
    embedded: Option<ItemStream>,
    ready: VecDeque<Result<Item>>,
}

impl BypassRouter {
    pub fn new(
        transmogrifier: &Transmogrifier,
        sections: &[String],
        condition: Condition,
        previous: ItemStream,
    ) -> Result<Self> {
        let state = RouteState::new(previous, condition);
        let input = RouteInput {
            state: Rc::clone(&state),
            buffer: None,
        };
        let embedded = construct_pipeline(transmogrifier, sections, Some(Box::new(input)))?;
        Ok(Self {
            state,
            embedded: Some(embedded),
            ready: VecDeque::new(),
        })
    }
}

impl Iterator for BypassRouter {
    type Item = Result<Item>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(ready) = self.ready.pop_front() {
                return Some(ready);
            }

            let Some(embedded) = &mut self.embedded else {
                // Embedded pipeline is done: upstream remainder passes as is
                return self.state.borrow_mut().previous.next();
            };

            let produced = embedded.next();
            self.ready.extend(self.state.borrow_mut().skipped.drain(..).map(Ok));
            match produced {
                Some(result) => self.ready.push_back(result),
                None => self.embedded = None,
            }
        }
    }
}
