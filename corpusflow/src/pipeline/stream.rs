//! Lazy document streams and the primitives steps compose them with.
//!
//! A [`DocumentStream`] is a boxed iterator: nothing is read or computed
//! until the final consumer pulls, and `None` marks the end of the stream.

use crate::core::Document;
use crate::errors::CorpusflowError;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

/// One pulled item: a document or the failure that stopped the stream.
pub type DocumentResult = Result<Document, CorpusflowError>;

/// A lazy, single-pass sequence of documents.
pub type DocumentStream = Box<dyn Iterator<Item = DocumentResult> + Send>;

/// Wraps already-materialized documents as a stream.
pub fn from_documents<I>(documents: I) -> DocumentStream
where
    I: IntoIterator<Item = Document>,
    I::IntoIter: Send + 'static,
{
    Box::new(documents.into_iter().map(Ok::<_, CorpusflowError>))
}

/// Returns a stream that yields nothing.
#[must_use]
pub fn empty() -> DocumentStream {
    Box::new(std::iter::empty())
}

/// Defers building a stream until its first item is pulled.
///
/// Steps use this to keep side effects (cache lookups, job submission,
/// model training) out of pipeline construction. If `init` fails, the
/// error is yielded once and the stream ends.
pub fn deferred<F>(init: F) -> DocumentStream
where
    F: FnOnce() -> Result<DocumentStream, CorpusflowError> + Send + 'static,
{
    Box::new(Deferred {
        init: Some(init),
        inner: None,
    })
}

struct Deferred<F> {
    init: Option<F>,
    inner: Option<DocumentStream>,
}

impl<F> Iterator for Deferred<F>
where
    F: FnOnce() -> Result<DocumentStream, CorpusflowError>,
{
    type Item = DocumentResult;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(init) = self.init.take() {
            match init() {
                Ok(stream) => self.inner = Some(stream),
                Err(err) => return Some(Err(err)),
            }
        }
        self.inner.as_mut()?.next()
    }
}

/// Splits a stream into two branches that each see every document.
///
/// Documents pulled by one branch are buffered for the other, up to
/// `budget` documents. If the lagging branch falls further behind, its
/// buffer is dropped and it reports [`TeeBranch::is_overflowed`]; pulling
/// it then yields [`CorpusflowError::FanOutBudgetExceeded`] once. Memory is
/// bounded by `budget` documents. Errors from the source reach only the
/// branch that pulled them.
pub fn tee(source: DocumentStream, budget: usize) -> (TeeBranch, TeeBranch) {
    let shared = Arc::new(Mutex::new(TeeState {
        source,
        budget,
        queues: [VecDeque::new(), VecDeque::new()],
        overflowed: [false, false],
        alive: [true, true],
    }));
    (
        TeeBranch {
            shared: Arc::clone(&shared),
            index: 0,
            reported: false,
        },
        TeeBranch {
            shared,
            index: 1,
            reported: false,
        },
    )
}

struct TeeState {
    source: DocumentStream,
    budget: usize,
    queues: [VecDeque<Document>; 2],
    overflowed: [bool; 2],
    alive: [bool; 2],
}

/// One side of a [`tee`].
pub struct TeeBranch {
    shared: Arc<Mutex<TeeState>>,
    index: usize,
    reported: bool,
}

impl TeeBranch {
    /// Returns true if this branch lost documents to the buffer budget.
    #[must_use]
    pub fn is_overflowed(&self) -> bool {
        self.shared.lock().overflowed[self.index]
    }

    /// Returns the number of documents buffered for this branch.
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.shared.lock().queues[self.index].len()
    }

    /// Boxes the branch as a [`DocumentStream`].
    #[must_use]
    pub fn into_stream(self) -> DocumentStream {
        Box::new(self)
    }
}

impl fmt::Debug for TeeBranch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TeeBranch")
            .field("index", &self.index)
            .finish_non_exhaustive()
    }
}

impl Iterator for TeeBranch {
    type Item = DocumentResult;

    fn next(&mut self) -> Option<Self::Item> {
        let mut state = self.shared.lock();
        let me = self.index;
        let other = 1 - me;

        if let Some(doc) = state.queues[me].pop_front() {
            return Some(Ok(doc));
        }
        if state.overflowed[me] {
            if self.reported {
                return None;
            }
            self.reported = true;
            return Some(Err(CorpusflowError::FanOutBudgetExceeded {
                budget: state.budget,
            }));
        }

        let item = state.source.next()?;
        if let Ok(doc) = &item {
            if state.alive[other] && !state.overflowed[other] {
                if state.queues[other].len() < state.budget {
                    state.queues[other].push_back(doc.clone());
                } else {
                    tracing::debug!(budget = state.budget, "Fan-out branch overflowed");
                    state.overflowed[other] = true;
                    state.queues[other].clear();
                }
            }
        }
        Some(item)
    }
}

impl Drop for TeeBranch {
    fn drop(&mut self) {
        let mut state = self.shared.lock();
        state.alive[self.index] = false;
        state.queues[self.index].clear();
    }
}
