use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use tokio::sync::Notify;
use uuid::Uuid;

use crate::GridError;

pub type TaskId = Uuid;

/// Kind of asynchronous grid operation. Each kind owns one cancellation slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskKind {
    DataFetch,
    SelectorValues,
    Calculations,
    ProfileLoad,
    ProfileSave,
    ProfileRemove,
    RowMutation,
}

impl TaskKind {
    pub fn label(&self) -> &'static str {
        match self {
            TaskKind::DataFetch => "Data fetch",
            TaskKind::SelectorValues => "Filter values",
            TaskKind::Calculations => "Calculations",
            TaskKind::ProfileLoad => "Profile load",
            TaskKind::ProfileSave => "Profile save",
            TaskKind::ProfileRemove => "Profile remove",
            TaskKind::RowMutation => "Row mutation",
        }
    }
}

struct CancelInner {
    cancelled: AtomicBool,
    notify: Notify,
}

#[derive(Clone)]
pub struct CancelToken {
    inner: Arc<CancelInner>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(CancelInner {
                cancelled: AtomicBool::new(false),
                notify: Notify::new(),
            }),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    /// Returns `Err(Cancelled)` once the token has fired.
    pub fn check(&self) -> Result<(), GridError> {
        if self.is_cancelled() {
            Err(GridError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Resolves when the token is cancelled.
    pub async fn cancelled(&self) {
        let notified = self.inner.notify.notified();
        let mut notified = std::pin::pin!(notified);
        notified.as_mut().enable();

        if self.is_cancelled() {
            return;
        }

        notified.await;
    }

    /// Runs `fut` until it completes or the token fires, whichever happens first.
    pub async fn run<F, T>(&self, fut: F) -> Result<T, GridError>
    where
        F: std::future::Future<Output = Result<T, GridError>>,
    {
        self.check()?;

        let fut = std::pin::pin!(fut);
        let cancelled = std::pin::pin!(self.cancelled());

        match futures::future::select(fut, cancelled).await {
            futures::future::Either::Left((result, _)) => result,
            futures::future::Either::Right(((), _)) => Err(GridError::Cancelled),
        }
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CancelToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancelToken")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// Handle for one generation of an operation slot.
#[derive(Debug, Clone)]
pub struct Ticket {
    pub id: TaskId,
    pub kind: TaskKind,
    pub generation: u64,
    pub started_at: Instant,
    cancel_token: CancelToken,
    abandoned: Arc<AtomicBool>,
}

impl Ticket {
    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel_token
    }

    /// Cancels the ticket and marks it as never coming back to its slot.
    pub fn abandon(&self) {
        self.abandoned.store(true, Ordering::SeqCst);
        self.cancel_token.cancel();
    }

    pub fn is_abandoned(&self) -> bool {
        self.abandoned.load(Ordering::SeqCst)
    }

    pub fn elapsed_ms(&self) -> u128 {
        self.started_at.elapsed().as_millis()
    }
}

/// Cancel-before-restart slot.
///
/// Starting a new operation cancels the in-flight one and bumps the
/// generation, so a late response from the old request can be recognized
/// and dropped.
#[derive(Debug)]
pub struct OperationSlot {
    kind: TaskKind,
    generation: u64,
    current: Option<Ticket>,
}

impl OperationSlot {
    pub fn new(kind: TaskKind) -> Self {
        Self {
            kind,
            generation: 0,
            current: None,
        }
    }

    pub fn kind(&self) -> TaskKind {
        self.kind
    }

    pub fn start(&mut self) -> Ticket {
        if let Some(previous) = self.current.take() {
            log::debug!(
                "{} generation {} superseded after {} ms",
                self.kind.label(),
                previous.generation,
                previous.elapsed_ms()
            );
            previous.cancel_token.cancel();
        }

        self.generation += 1;
        let ticket = Ticket {
            id: TaskId::new_v4(),
            kind: self.kind,
            generation: self.generation,
            started_at: Instant::now(),
            cancel_token: CancelToken::new(),
            abandoned: Arc::new(AtomicBool::new(false)),
        };
        self.current = Some(ticket.clone());
        ticket
    }

    pub fn is_current(&self, ticket: &Ticket) -> bool {
        ticket.generation == self.generation && !ticket.cancel_token.is_cancelled()
    }

    /// Occupied by a ticket that will still be finished. A cancelled ticket
    /// keeps the slot until its result is handed back.
    pub fn is_running(&self) -> bool {
        self.current
            .as_ref()
            .is_some_and(|current| !current.is_abandoned())
    }

    /// Running and neither cancelled nor abandoned.
    pub fn is_active(&self) -> bool {
        self.current
            .as_ref()
            .is_some_and(|current| !current.cancel_token.is_cancelled())
    }

    /// Marks the ticket as finished. Stale tickets leave the slot untouched.
    pub fn finish(&mut self, ticket: &Ticket) -> bool {
        if self
            .current
            .as_ref()
            .is_some_and(|current| current.generation == ticket.generation)
        {
            self.current = None;
            return true;
        }
        false
    }

    /// Fires the current ticket's token but keeps the slot occupied until
    /// the ticket is finished. Returns false when it was already cancelled.
    pub fn cancel_current(&self) -> bool {
        match &self.current {
            Some(current) if !current.cancel_token.is_cancelled() => {
                current.cancel_token.cancel();
                true
            }
            _ => false,
        }
    }

    pub fn cancel(&mut self) -> bool {
        if let Some(current) = self.current.take() {
            current.cancel_token.cancel();
            return true;
        }
        false
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}
