//! User interaction for deploy and teardown flows
//!
//! Abstracts prompts and message display so destructive flows can be
//! tested without simulating terminal input.

pub mod display;
pub mod prompts;

pub use display::{MessageDisplay, MessageDisplayImpl};
pub use prompts::{UserPrompter, UserPrompterImpl};

use anyhow::Result;
use async_trait::async_trait;

/// Trait for user interaction
#[async_trait]
pub trait UserInteraction: Send + Sync {
    /// Prompt user for yes/no confirmation
    async fn prompt_yes_no(&self, message: &str) -> Result<bool>;

    /// Prompt user to type an exact phrase, for irreversible operations
    async fn prompt_phrase(&self, message: &str, expected: &str) -> Result<bool>;

    /// Display information message
    fn display_info(&self, message: &str);

    /// Display warning message
    fn display_warning(&self, message: &str);

    /// Display error message
    fn display_error(&self, message: &str);

    /// Display success message
    fn display_success(&self, message: &str);
}

/// Default implementation of user interaction
pub struct DefaultUserInteraction {
    prompter: UserPrompterImpl,
    display: MessageDisplayImpl,
}

impl Default for DefaultUserInteraction {
    fn default() -> Self {
        Self::new()
    }
}

impl DefaultUserInteraction {
    pub fn new() -> Self {
        Self {
            prompter: UserPrompterImpl::new(),
            display: MessageDisplayImpl::new(),
        }
    }
}

#[async_trait]
impl UserInteraction for DefaultUserInteraction {
    async fn prompt_yes_no(&self, message: &str) -> Result<bool> {
        self.prompter.prompt_yes_no(message).await
    }

    async fn prompt_phrase(&self, message: &str, expected: &str) -> Result<bool> {
        self.prompter.prompt_phrase(message, expected).await
    }

    fn display_info(&self, message: &str) {
        self.display.info(message);
    }

    fn display_warning(&self, message: &str) {
        self.display.warning(message);
    }

    fn display_error(&self, message: &str) {
        self.display.error(message);
    }

    fn display_success(&self, message: &str) {
        self.display.success(message);
    }
}

/// Non-interactive implementation for `--yes` runs: every confirmation is
/// accepted, messages still reach the terminal
pub struct AssumeYesInteraction {
    display: MessageDisplayImpl,
}

impl Default for AssumeYesInteraction {
    fn default() -> Self {
        Self::new()
    }
}

impl AssumeYesInteraction {
    pub fn new() -> Self {
        Self {
            display: MessageDisplayImpl::new(),
        }
    }
}

#[async_trait]
impl UserInteraction for AssumeYesInteraction {
    async fn prompt_yes_no(&self, _message: &str) -> Result<bool> {
        Ok(true)
    }

    async fn prompt_phrase(&self, _message: &str, _expected: &str) -> Result<bool> {
        Ok(true)
    }

    fn display_info(&self, message: &str) {
        self.display.info(message);
    }

    fn display_warning(&self, message: &str) {
        self.display.warning(message);
    }

    fn display_error(&self, message: &str) {
        self.display.error(message);
    }

    fn display_success(&self, message: &str) {
        self.display.success(message);
    }
}

pub mod mocks {
    use super::*;
    use std::sync::Mutex;

    pub struct MockUserInteraction {
        pub yes_no_responses: Mutex<Vec<bool>>,
        pub phrase_responses: Mutex<Vec<bool>>,
        pub messages: Mutex<Vec<String>>,
    }

    impl Default for MockUserInteraction {
        fn default() -> Self {
            Self::new()
        }
    }

    impl MockUserInteraction {
        pub fn new() -> Self {
            Self {
                yes_no_responses: Mutex::new(Vec::new()),
                phrase_responses: Mutex::new(Vec::new()),
                messages: Mutex::new(Vec::new()),
            }
        }

        pub fn add_yes_no_response(&self, response: bool) {
            self.yes_no_responses.lock().unwrap().push(response);
        }

        pub fn add_phrase_response(&self, response: bool) {
            self.phrase_responses.lock().unwrap().push(response);
        }

        pub fn messages(&self) -> Vec<String> {
            self.messages.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl UserInteraction for MockUserInteraction {
        async fn prompt_yes_no(&self, message: &str) -> Result<bool> {
            self.messages
                .lock()
                .unwrap()
                .push(format!("PROMPT: {message}"));
            self.yes_no_responses
                .lock()
                .unwrap()
                .pop()
                .ok_or_else(|| anyhow::anyhow!("No mock response configured"))
        }

        async fn prompt_phrase(&self, message: &str, _expected: &str) -> Result<bool> {
            self.messages
                .lock()
                .unwrap()
                .push(format!("PHRASE: {message}"));
            self.phrase_responses
                .lock()
                .unwrap()
                .pop()
                .ok_or_else(|| anyhow::anyhow!("No mock response configured"))
        }

        fn display_info(&self, message: &str) {
            self.messages
                .lock()
                .unwrap()
                .push(format!("INFO: {message}"));
        }

        fn display_warning(&self, message: &str) {
            self.messages
                .lock()
                .unwrap()
                .push(format!("WARN: {message}"));
        }

        fn display_error(&self, message: &str) {
            self.messages
                .lock()
                .unwrap()
                .push(format!("ERROR: {message}"));
        }

        fn display_success(&self, message: &str) {
            self.messages
                .lock()
                .unwrap()
                .push(format!("SUCCESS: {message}"));
        }
    }
}
