//! State-holding capabilities for attached objects
//!
//! Listeners and converters attached to a component declare how they
//! participate in state saving through a closed set of capability
//! variants rather than a class hierarchy. The save/restore protocol
//! dispatches on the variant: partial holders track deltas like any
//! component property, full holders are always saved and restored in
//! full, stateless attachments carry nothing.

use arbor_types::StateValue;
use std::fmt;

/// An object that can save and restore its state in full.
pub trait StateHolder: fmt::Debug + Send {
    /// Save the holder's state; `None` means nothing to carry.
    fn save_state(&self) -> Option<StateValue>;

    /// Restore previously saved state.
    fn restore_state(&mut self, state: StateValue);

    /// Transient holders are skipped by the save protocol entirely.
    fn is_transient(&self) -> bool {
        false
    }
}

/// A [`StateHolder`] that additionally supports the delta baseline:
/// after `mark_initial_state`, `save_state` returns only changes made
/// since the mark (or `None` when unchanged).
pub trait PartialStateHolder: StateHolder {
    fn mark_initial_state(&mut self);

    fn clear_initial_state(&mut self);

    fn initial_state(&self) -> bool;
}

/// Capability variant of an attached object (listener, converter).
#[derive(Debug)]
pub enum Attachment {
    /// Carries no state at all
    Stateless,

    /// Saves and restores in full on every request; cannot be reset to
    /// a baseline, which disqualifies a pooled tree from verbatim reuse
    Full(Box<dyn StateHolder>),

    /// Participates in delta tracking like a component property
    Partial(Box<dyn PartialStateHolder>),
}

impl Attachment {
    /// Whether this attachment can be reset to its baseline and reused
    /// verbatim by the view pool.
    pub fn is_reset_capable(&self) -> bool {
        !matches!(self, Attachment::Full(_))
    }

    pub fn save_state(&self) -> Option<StateValue> {
        match self {
            Attachment::Stateless => None,
            Attachment::Full(holder) => holder.save_state(),
            Attachment::Partial(holder) => holder.save_state(),
        }
    }

    pub fn restore_state(&mut self, state: StateValue) {
        match self {
            Attachment::Stateless => {}
            Attachment::Full(holder) => holder.restore_state(state),
            Attachment::Partial(holder) => holder.restore_state(state),
        }
    }

    /// Establish the delta baseline; full holders are untouched since
    /// they do not track a baseline.
    pub fn mark_initial_state(&mut self) {
        if let Attachment::Partial(holder) = self {
            holder.mark_initial_state();
        }
    }

    pub fn clear_initial_state(&mut self) {
        if let Attachment::Partial(holder) = self {
            holder.clear_initial_state();
        }
    }
}
