//! Background observation of identity handle changes

use log::debug;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::auth::{IdentityHandle, IdentityProvider};
use crate::session::{AuthGate, ProfileReconciler};
use crate::store::ProfileStore;

/// What a handle change calls for
#[derive(Debug, PartialEq, Eq)]
enum Transition {
    /// Mid-OAuth handle without id, never acted on
    Pending,
    /// The handle went away
    SignedOut,
    /// A new or different user id
    UserChanged,
    Unchanged,
}

fn classify(previous: Option<&IdentityHandle>, current: Option<&IdentityHandle>) -> Transition {
    match (previous, current) {
        (_, Some(handle)) if handle.is_pending() => Transition::Pending,
        (Some(_), None) => Transition::SignedOut,
        (None, None) => Transition::Unchanged,
        (before, Some(handle)) if before.and_then(IdentityHandle::id) == handle.id() => {
            Transition::Unchanged
        }
        (_, Some(_)) => Transition::UserChanged,
    }
}

/// Task reacting to the provider's handle changes until dropped.
///
/// The value present at spawn time is the first event and goes through the
/// [`AuthGate`], so it joins any pass a guard already started.
pub struct AuthWatcher {
    task: JoinHandle<()>,
}

impl AuthWatcher {
    pub fn spawn(
        provider: Arc<dyn IdentityProvider>,
        gate: AuthGate,
        reconciler: Arc<ProfileReconciler>,
        store: ProfileStore,
    ) -> Self {
        let mut rx = provider.subscribe();
        let initial = rx.borrow_and_update().clone();
        let task = tokio::spawn(run(rx, initial, gate, reconciler, store));
        Self { task }
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }
}

impl Drop for AuthWatcher {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn run(
    mut rx: watch::Receiver<Option<IdentityHandle>>,
    initial: Option<IdentityHandle>,
    gate: AuthGate,
    reconciler: Arc<ProfileReconciler>,
    store: ProfileStore,
) {
    let mut previous = initial;
    gate.ensure_initialized().await;

    while rx.changed().await.is_ok() {
        let current = rx.borrow_and_update().clone();

        match classify(previous.as_ref(), current.as_ref()) {
            Transition::Pending => {
                debug!("ignoring identity handle without id");
                continue;
            }
            Transition::SignedOut => {
                if store.has_valid_session() {
                    debug!("identity handle gone, keeping the persisted session");
                } else {
                    debug!("identity handle gone, clearing the profile store");
                    store.reset();
                }
            }
            Transition::UserChanged => {
                reconciler.ensure_user_profile(current.as_ref()).await;
            }
            Transition::Unchanged => {}
        }

        previous = current;
    }

    debug!("identity provider closed, watcher stopping");
}
