//! Marker tables: the registration side of the framework.
//!
//! Plugin types declare their triggers by filling a [`Markers`] table in
//! [`Declare::declare`], usually generated by the `#[triggers]` attribute.
//! Each slot is keyed by method name and keeps its descriptors in mark
//! order; slots keep first-declaration order.
//!
//! ```rust,ignore
//! impl Declare for Sign {
//!     fn declare(markers: &mut Markers<Self>) {
//!         markers
//!             .mark("sign", Sign::sign, TriggerDescriptor::command("sign"))
//!             .mark("sign", Sign::sign, TriggerDescriptor::callback("^sign:"))
//!             .mark_shared("cancel", Sign::cancel, cancel_descriptor());
//!     }
//! }
//! ```
//!
//! The table for a type is built once per process by [`Markers::of`] and
//! shared read-only afterwards. Marking never validates anything; malformed
//! descriptors surface during discovery.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, LazyLock};

use futures::FutureExt;
use futures::future::BoxFuture;
use parking_lot::RwLock;

use crate::entry::{ErrorReport, HandlerResult};
use crate::error::BoxError;
use crate::job::{JobContext, JobDescriptor};
use crate::trigger::{ErrorDescriptor, TriggerDescriptor};
use crate::update::Update;

/// A trigger method, unbound from its instance.
pub type Method<P> = Arc<dyn Fn(Arc<P>, Arc<Update>) -> BoxFuture<'static, HandlerResult> + Send + Sync>;

/// An error-interceptor method, unbound from its instance.
pub type ErrorMethod<P> = Arc<dyn Fn(Arc<P>, Arc<ErrorReport>) -> BoxFuture<'static, ()> + Send + Sync>;

/// A job method, unbound from its instance.
pub type JobMethod<P> =
    Arc<dyn Fn(Arc<P>, JobContext) -> BoxFuture<'static, Result<(), BoxError>> + Send + Sync>;

/// Implemented by every type that carries markers.
pub trait Declare: Sized + Send + Sync + 'static {
    /// Fills `markers` with this type's marked methods.
    fn declare(markers: &mut Markers<Self>);
}

/// One marked method together with the descriptors stamped on it.
pub struct Slot<F, D> {
    name: &'static str,
    method: F,
    descriptors: Vec<D>,
}

impl<F, D> Slot<F, D> {
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn method(&self) -> &F {
        &self.method
    }

    /// Descriptors in mark order.
    pub fn descriptors(&self) -> &[D] {
        &self.descriptors
    }
}

pub type TriggerSlot<P> = Slot<Method<P>, Arc<TriggerDescriptor>>;
pub type ErrorSlot<P> = Slot<ErrorMethod<P>, ErrorDescriptor>;
pub type JobSlot<P> = Slot<JobMethod<P>, Arc<JobDescriptor>>;

fn push<F, D>(slots: &mut Vec<Slot<F, D>>, name: &'static str, method: F, descriptor: D) {
    match slots.iter_mut().find(|slot| slot.name == name) {
        Some(slot) => slot.descriptors.push(descriptor),
        None => slots.push(Slot {
            name,
            method,
            descriptors: vec![descriptor],
        }),
    }
}

fn slot_names<F, D>(slots: &[Slot<F, D>]) -> Vec<&'static str> {
    slots.iter().map(|s| s.name).collect()
}

/// Marker table of one plugin type.
pub struct Markers<P> {
    triggers: Vec<TriggerSlot<P>>,
    errors: Vec<ErrorSlot<P>>,
    jobs: Vec<JobSlot<P>>,
}

impl<P> fmt::Debug for Markers<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Markers")
            .field("triggers", &slot_names(&self.triggers))
            .field("errors", &slot_names(&self.errors))
            .field("jobs", &slot_names(&self.jobs))
            .finish()
    }
}

impl<P> Default for Markers<P> {
    fn default() -> Self {
        Self {
            triggers: Vec::new(),
            errors: Vec::new(),
            jobs: Vec::new(),
        }
    }
}

static TABLES: LazyLock<RwLock<HashMap<TypeId, Arc<dyn Any + Send + Sync>>>> =
    LazyLock::new(Default::default);

impl<P: Declare> Markers<P> {
    /// The marker table of `P`, built on first request and cached for the
    /// rest of the process.
    pub fn of() -> Arc<Self> {
        let id = TypeId::of::<P>();
        if let Some(table) = TABLES.read().get(&id).cloned() {
            if let Ok(table) = table.downcast::<Self>() {
                return table;
            }
        }

        // Build outside the lock; `declare` is user code.
        let mut markers = Self::default();
        P::declare(&mut markers);
        let built = Arc::new(markers);

        let mut tables = TABLES.write();
        let cached = tables
            .entry(id)
            .or_insert_with(|| Arc::clone(&built) as Arc<dyn Any + Send + Sync>);
        Arc::clone(cached).downcast::<Self>().unwrap_or(built)
    }
}

impl<P: Send + Sync + 'static> Markers<P> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stamps `descriptor` onto the method named `name`.
    ///
    /// Marking the same name again appends another descriptor; the callable
    /// given by the first mark is kept.
    pub fn mark<F, Fut>(&mut self, name: &'static str, method: F, descriptor: TriggerDescriptor) -> &mut Self
    where
        F: Fn(Arc<P>, Arc<Update>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.mark_shared(name, method, Arc::new(descriptor))
    }

    /// Like [`mark`](Self::mark), for a descriptor shared with other types.
    pub fn mark_shared<F, Fut>(
        &mut self,
        name: &'static str,
        method: F,
        descriptor: Arc<TriggerDescriptor>,
    ) -> &mut Self
    where
        F: Fn(Arc<P>, Arc<Update>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        let method: Method<P> =
            Arc::new(move |this: Arc<P>, update: Arc<Update>| method(this, update).boxed());
        push(&mut self.triggers, name, method, descriptor);
        self
    }

    /// Marks an error interceptor.
    pub fn mark_error<F, Fut>(&mut self, name: &'static str, method: F, descriptor: ErrorDescriptor) -> &mut Self
    where
        F: Fn(Arc<P>, Arc<ErrorReport>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let method: ErrorMethod<P> =
            Arc::new(move |this: Arc<P>, report: Arc<ErrorReport>| method(this, report).boxed());
        push(&mut self.errors, name, method, descriptor);
        self
    }

    /// Marks a time-triggered job.
    pub fn mark_job<F, Fut>(&mut self, name: &'static str, method: F, descriptor: JobDescriptor) -> &mut Self
    where
        F: Fn(Arc<P>, JobContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
    {
        let method: JobMethod<P> =
            Arc::new(move |this: Arc<P>, ctx: JobContext| method(this, ctx).boxed());
        push(&mut self.jobs, name, method, Arc::new(descriptor));
        self
    }

    pub fn triggers(&self) -> &[TriggerSlot<P>] {
        &self.triggers
    }

    pub fn errors(&self) -> &[ErrorSlot<P>] {
        &self.errors
    }

    pub fn jobs(&self) -> &[JobSlot<P>] {
        &self.jobs
    }

    /// Total number of trigger descriptors across all slots.
    pub fn trigger_count(&self) -> usize {
        self.triggers.iter().map(|s| s.descriptors.len()).sum()
    }
}

static CANCEL: LazyLock<Arc<TriggerDescriptor>> =
    LazyLock::new(|| Arc::new(TriggerDescriptor::command("cancel").fallback()));

/// The universal `/cancel` fallback, shared by every plugin that marks it.
pub fn cancel_descriptor() -> Arc<TriggerDescriptor> {
    Arc::clone(&CANCEL)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::Flow;
    use crate::trigger::ConversationRole;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Echo;

    impl Echo {
        async fn echo(self: Arc<Self>, _update: Arc<Update>) -> HandlerResult {
            Ok(Flow::Continue)
        }

        async fn cancel(self: Arc<Self>, _update: Arc<Update>) -> HandlerResult {
            Ok(Flow::End)
        }
    }

    impl Declare for Echo {
        fn declare(markers: &mut Markers<Self>) {
            markers
                .mark("echo", Echo::echo, TriggerDescriptor::command("echo"))
                .mark_shared("cancel", Echo::cancel, cancel_descriptor())
                .mark("echo", Echo::echo, TriggerDescriptor::text("^echo "));
        }
    }

    #[test]
    fn test_marks_accumulate_in_order() {
        let markers = Markers::<Echo>::of();
        let names: Vec<_> = markers.triggers().iter().map(|s| s.name()).collect();
        assert_eq!(names, ["echo", "cancel"]);

        let echo = &markers.triggers()[0];
        assert_eq!(echo.descriptors().len(), 2);
        assert_eq!(echo.descriptors()[0].kind().as_str(), "command");
        assert_eq!(echo.descriptors()[1].kind().as_str(), "text");
        assert_eq!(markers.trigger_count(), 3);
    }

    static DECLARED: AtomicUsize = AtomicUsize::new(0);

    struct Counted;

    impl Declare for Counted {
        fn declare(_markers: &mut Markers<Self>) {
            DECLARED.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_table_built_once() {
        let a = Markers::<Counted>::of();
        let b = Markers::<Counted>::of();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(DECLARED.load(Ordering::SeqCst), 1);
        assert_eq!(a.trigger_count(), 0);
    }

    #[test]
    fn test_cancel_descriptor_is_shared() {
        let markers = Markers::<Echo>::of();
        let cancel = &markers.triggers()[1].descriptors()[0];
        assert!(Arc::ptr_eq(cancel, &cancel_descriptor()));
        assert_eq!(cancel.conversation_role(), Some(&ConversationRole::Fallback));
    }

    #[tokio::test]
    async fn test_method_binds_instance() {
        let markers = Markers::<Echo>::of();
        let method = markers.triggers()[1].method();
        let flow = method(Arc::new(Echo), Arc::new(Update::message("/cancel")))
            .await
            .unwrap();
        assert_eq!(flow, Flow::End);
    }
}
