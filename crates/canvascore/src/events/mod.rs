mod base;

pub use base::{
    ChannelObserver, EventBus, EventEmitter, ExecutionEvent, ExecutionId, ExecutionObserver,
    NodeEvent, NodeStatus, NullObserver, RunState,
};
