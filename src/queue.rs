//! Deferred resolution queue
//!
//! A scalar whose template cannot be expanded when it is read becomes a
//! pending [`LazyScalar`] plus a [`Retry`] step on its loader's queue. The
//! queue is drained in passes: each pass snapshots the pending steps and
//! attempts every one against the current state of its scope. A failed step
//! goes back on a queue for the next pass until its retry budget runs out,
//! so the total work is bounded by `max_retries` attempts per scalar.

use std::cell::RefCell;
use std::mem;
use std::rc::Rc;

use tracing::{debug, warn};

use crate::error::LoadError;
use crate::node::LazyScalar;
use crate::options::LoadOptions;
use crate::scope::Scope;
use crate::template::{interpolate, TemplateError};

/// Unit of deferred work
#[derive(Debug)]
pub(crate) enum Step {
    /// Retry expanding one lazy scalar
    Retry(Retry),
    /// No work; keeps the root draining so it scans for variables again
    Rescan,
}

/// A lazy scalar together with the scope it must be expanded in
#[derive(Debug)]
pub(crate) struct Retry {
    pub(crate) lazy: LazyScalar,
    pub(crate) scope: Rc<Scope>,
    /// Document the scalar came from, for messages
    pub(crate) source: Rc<str>,
}

impl Retry {
    /// Make one attempt. Returns the step again when it should be retried.
    pub(crate) fn attempt(self, options: &LoadOptions) -> Result<Option<Retry>, LoadError> {
        let Some(template) = self.lazy.template() else {
            return Ok(None);
        };

        match interpolate(&template, self.scope.as_ref(), None) {
            Ok(text) => {
                self.lazy.resolve(text);
                Ok(None)
            }
            Err(TemplateError::Unresolved { name, .. }) => {
                let retries_left = self.lazy.record_failure();
                if retries_left > 0 {
                    debug!(
                        "interpolation of {} in {} failed ('{}' unknown), {} tries left",
                        template, self.source, name, retries_left
                    );
                    return Ok(Some(self));
                }
                if options.strict {
                    return Err(LoadError::TemplateExhausted {
                        template,
                        missing: name,
                        name: self.source.to_string(),
                    });
                }
                warn!("cannot expand template '{}' in {}", template, self.source);
                self.lazy.freeze();
                Ok(None)
            }
            Err(TemplateError::InvalidPlaceholder { position, template }) => {
                Err(LoadError::InvalidPlaceholder {
                    template,
                    position,
                    name: self.source.to_string(),
                })
            }
        }
    }
}

/// Worklist shared between a loader and the loaders that requeue into it
#[derive(Debug, Clone, Default)]
pub(crate) struct DeferredQueue(Rc<RefCell<Vec<Step>>>);

impl DeferredQueue {
    pub(crate) fn push(&self, step: Step) {
        self.0.borrow_mut().push(step);
    }

    /// Snapshot and clear
    pub(crate) fn take(&self) -> Vec<Step> {
        mem::take(&mut *self.0.borrow_mut())
    }

    pub(crate) fn len(&self) -> usize {
        self.0.borrow().len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.0.borrow().is_empty()
    }

    /// Drain to a fixpoint.
    ///
    /// `scan` runs at the start of every non-empty pass. Failed retries are
    /// pushed onto `requeue`, which is this queue for a root loader and the
    /// root's queue for a child.
    pub(crate) fn drain(
        &self,
        requeue: &DeferredQueue,
        options: &LoadOptions,
        name: &str,
        mut scan: impl FnMut(),
    ) -> Result<(), LoadError> {
        loop {
            let steps = self.take();
            if steps.is_empty() {
                return Ok(());
            }
            scan();
            debug!("processing {} deferred steps in {}", steps.len(), name);

            for step in steps {
                if let Step::Retry(retry) = step {
                    if let Some(again) = retry.attempt(options)? {
                        requeue.push(Step::Retry(again));
                    }
                }
            }
        }
    }
}
