pub mod error;
pub mod events;
pub mod lock;
pub mod polling;
pub mod stage;
pub mod state_store;
pub mod worker;

pub mod workflow_engine;

pub use error::{StateError, WorkflowError};
pub use events::{
    Acknowledgment, EventPublisher, NoopPublisher, PublishError, StageEvent, WebSocketPublisher,
};
pub use polling::{CancellationToken, PollOutcome, PollPolicy};
pub use stage::Stage;
pub use state_store::{WorkflowState, WorkflowStateStore};
pub use worker::{spawn_workflow, SharedStatus, StatusSnapshot, WorkflowHandle};
pub use workflow_engine::{RunOutcome, StatusListener, StatusUpdate, WorkflowEngine};
