pub mod config;
pub mod gateway;
pub mod metrics;
pub mod pool;
pub mod rate_gate;
pub mod task;
pub mod testing;

pub use config::{
    load_config, load_config_from_str, validate_config, Config, ConfigError, GatewayConfig,
    LoggingConfig, MetricsConfig, SanitizedConfig,
};
pub use gateway::{
    FatalKind, Gateway, GatewayError, PollOutcome, RateLimitTier, SubmitOutcome,
    TwoCaptchaGateway,
};
pub use pool::{
    PoolConfig, PoolError, SolveMode, Solver, SolverBuilder, SolverOutput, SolverStats, Stage,
    TaskError,
};
pub use rate_gate::RateGate;
pub use task::{InvalidTask, TaskId, TaskKind, V3Score};
