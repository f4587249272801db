//! Domain events produced from inventory host notifications.
//!
//! Every event carries an [`EventMeta`] with the host identity and an optional
//! result mailbox. The sink calls [`DomainEvent::handle`] and, when a mailbox is
//! present, deposits the outcome there.

mod created;
mod deleted;
mod error;
mod updated;

use std::collections::BTreeMap;
use std::time::Duration;

use error_stack::Report;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

pub use created::HostCreated;
pub use deleted::HostDeleted;
pub use error::EventError;
pub use error::EventResult;
pub use error::SinkError;
pub use updated::HostUpdated;

/// Upper bound for the Kubernetes work of a single update event.
pub const EVENT_TIMEOUT: Duration = Duration::from_secs(3);

/// Label key to value mapping applied to a Machine.
pub type LabelSet = BTreeMap<String, String>;

/// Producer side of a per-event result mailbox.
pub type ResultSender = mpsc::Sender<EventResult>;

/// Consumer side of a per-event result mailbox.
pub type ResultReceiver = mpsc::Receiver<EventResult>;

/// Create a single-slot mailbox for observing the outcome of one event.
pub fn result_channel() -> (ResultSender, ResultReceiver) {
    mpsc::channel(1)
}

/// Host and project a domain event refers to.
///
/// The project id is also the namespace of the host's Machine.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct HostIdentity {
    pub host_id: String,
    pub project_id: String,
}

impl HostIdentity {
    pub fn new(host_id: impl Into<String>, project_id: impl Into<String>) -> Self {
        Self {
            host_id: host_id.into(),
            project_id: project_id.into(),
        }
    }

    /// # Errors
    ///
    /// - [`EventError::EmptyHostId`] if the host id is empty
    /// - [`EventError::EmptyProjectId`] if the project id is empty
    pub fn validate(&self) -> EventResult {
        if self.host_id.is_empty() {
            return Err(Report::new(EventError::EmptyHostId));
        }
        if self.project_id.is_empty() {
            return Err(Report::new(EventError::EmptyProjectId));
        }
        Ok(())
    }
}

/// Fields shared by every domain event.
#[derive(Debug, Default)]
pub struct EventMeta {
    pub identity: HostIdentity,
    pub result: Option<ResultSender>,
}

impl EventMeta {
    pub fn new(identity: HostIdentity) -> Self {
        Self {
            identity,
            result: None,
        }
    }

    #[must_use]
    pub fn with_result(mut self, result: ResultSender) -> Self {
        self.result = Some(result);
        self
    }
}

/// A host lifecycle event routed through the sink.
#[derive(Debug)]
pub enum DomainEvent {
    Created(HostCreated),
    Updated(HostUpdated),
    Deleted(HostDeleted),
}

impl DomainEvent {
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Created(_) => "created",
            Self::Updated(_) => "updated",
            Self::Deleted(_) => "deleted",
        }
    }

    pub const fn meta(&self) -> &EventMeta {
        match self {
            Self::Created(event) => &event.meta,
            Self::Updated(event) => &event.meta,
            Self::Deleted(event) => &event.meta,
        }
    }

    fn meta_mut(&mut self) -> &mut EventMeta {
        match self {
            Self::Created(event) => &mut event.meta,
            Self::Updated(event) => &mut event.meta,
            Self::Deleted(event) => &mut event.meta,
        }
    }

    pub const fn identity(&self) -> &HostIdentity {
        &self.meta().identity
    }

    /// Detach the result mailbox so the outcome can be delivered after handling.
    pub fn take_result(&mut self) -> Option<ResultSender> {
        self.meta_mut().result.take()
    }

    /// Run the variant's handler under `token`.
    pub async fn handle(&self, token: &CancellationToken) -> EventResult {
        match self {
            Self::Created(event) => event.handle(token).await,
            Self::Updated(event) => event.handle(token).await,
            Self::Deleted(event) => event.handle(token).await,
        }
    }
}

impl From<HostCreated> for DomainEvent {
    fn from(event: HostCreated) -> Self {
        Self::Created(event)
    }
}

impl From<HostUpdated> for DomainEvent {
    fn from(event: HostUpdated) -> Self {
        Self::Updated(event)
    }
}

impl From<HostDeleted> for DomainEvent {
    fn from(event: HostDeleted) -> Self {
        Self::Deleted(event)
    }
}
