//! seqcheck: delivery-guarantee checker for partitioned, at-least-once event
//! pipelines.

pub mod api;
pub mod app;
pub mod broker;
pub mod config;
pub mod consumer;
pub mod echo;
pub mod event_model;
pub mod faults;
pub mod generator;
pub mod observability;
pub mod partition;
pub mod pipeline;
pub mod processor;
pub mod runtime;
pub mod test_hooks;

pub use api::{router, ApiError, ApiState};
pub use broker::{
    Broker, BrokerError, Delivery, MemoryBroker, MemoryBrokerConfig, PublishReceipt, Subscription,
};
pub use config::{
    AppConfig, ConfigError, EchoConfig, GeneratorConfig, HttpConfig, ProcessorConfig, TallyConfig,
    TopicConfig, VerifierConfig,
};
pub use consumer::{spawn_workers, ConsumerSpec, DeliveryHandler, WorkerContext};
pub use echo::{EchoChannel, Greeting, GreetingInbox};
pub use event_model::{Arrival, Event, EventId, KeyTally, TallySummary, Verifier, VerifierStatus};
pub use faults::{FaultProfile, FaultSource, RandomFaults};
pub use generator::{Generator, GeneratorStatus, MIN_RATE};
pub use observability::logging::{LogFormat, LogLevel, LoggingConfig, LoggingError};
pub use observability::HealthzStatus;
pub use partition::{hash_partition_key, partition_for_key, PartitionAssignment, PartitionError};
pub use pipeline::{MemoryBrokers, Pipeline, PipelineBrokers};
pub use processor::{ProcessError, Processor};
pub use runtime::{Role, RuntimeOptions};
pub use test_hooks::{TestHook, TestHookRegistry};
