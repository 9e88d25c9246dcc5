//! Observers
//!
//! An observer is whatever must run when a notifier it watches fires. The
//! refresher calls [`Observer::update`] once per drained queue entry. The
//! result decides whether the change cascades further.

use std::future::Future;
use std::rc::Rc;

use futures_util::future::LocalBoxFuture;
use futures_util::FutureExt;

use crate::error::ReactiveError;

/// Result of an update: `Ok(true)` means the observer's own value changed and
/// its observers must be notified. `Ok(false)` stops the cascade here.
pub type UpdateResult = Result<bool, ReactiveError>;

/// The outcome of calling [`Observer::update`].
pub enum Update {
    /// The update finished synchronously.
    Ready(UpdateResult),
    /// The update must be awaited before the refresher moves on.
    Pending(LocalBoxFuture<'static, UpdateResult>),
}

impl Update {
    pub fn pending<F>(future: F) -> Self
    where
        F: Future<Output = UpdateResult> + 'static,
    {
        Self::Pending(future.boxed_local())
    }

    pub async fn resolve(self) -> UpdateResult {
        match self {
            Self::Ready(result) => result,
            Self::Pending(future) => future.await,
        }
    }
}

/// Something that reacts to the notifiers it observes.
pub trait Observer {
    fn update(self: Rc<Self>) -> Update;
}

/// Observer backed by a closure.
///
/// Useful for ad-hoc listeners (e.g. a UI repaint hook) and in tests.
pub struct FnObserver<F> {
    callback: F,
}

impl<F> FnObserver<F>
where
    F: Fn() -> UpdateResult + 'static,
{
    pub fn new(callback: F) -> Rc<Self> {
        Rc::new(Self { callback })
    }
}

impl<F> Observer for FnObserver<F>
where
    F: Fn() -> UpdateResult + 'static,
{
    fn update(self: Rc<Self>) -> Update {
        Update::Ready((self.callback)())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn fn_observer_invokes_callback() {
        let calls = Rc::new(Cell::new(0));
        let counter = calls.clone();
        let observer = FnObserver::new(move || {
            counter.set(counter.get() + 1);
            Ok(false)
        });

        let update = observer.clone().update();
        assert!(matches!(update, Update::Ready(Ok(false))));
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn pending_update_resolves() {
        let update = Update::pending(async { Ok(true) });
        let result = futures_util::FutureExt::now_or_never(update.resolve());
        assert!(matches!(result, Some(Ok(true))));
    }
}
