//! Unified subprocess abstraction layer
//!
//! Providers never spawn processes directly; they go through
//! [`SubprocessManager`] so tests can substitute a scripted runner.

pub mod builder;
pub mod error;
pub mod mock;
pub mod runner;

pub use builder::ProcessCommandBuilder;
pub use error::ProcessError;
pub use mock::{MockCommandConfig, MockProcessRunner};
pub use runner::{
    ExitStatus, OutputLine, OutputSource, ProcessCommand, ProcessOutput, ProcessRunner,
    ProcessStream, TokioProcessRunner,
};

use std::sync::Arc;

#[derive(Clone)]
pub struct SubprocessManager {
    runner: Arc<dyn ProcessRunner>,
}

impl SubprocessManager {
    pub fn new(runner: Arc<dyn ProcessRunner>) -> Self {
        Self { runner }
    }

    pub fn production() -> Self {
        Self::new(Arc::new(TokioProcessRunner))
    }

    pub fn mock() -> (Self, MockProcessRunner) {
        let mock = MockProcessRunner::new();
        let runner = Arc::new(mock.clone()) as Arc<dyn ProcessRunner>;
        (Self::new(runner), mock)
    }

    pub fn runner(&self) -> Arc<dyn ProcessRunner> {
        Arc::clone(&self.runner)
    }
}
