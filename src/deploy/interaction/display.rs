//! Message display implementation

/// Trait for displaying user-facing messages
pub trait MessageDisplay: Send + Sync {
    fn info(&self, message: &str);
    fn warning(&self, message: &str);
    fn error(&self, message: &str);
    fn success(&self, message: &str);
}

/// Real implementation writing to the terminal
pub struct MessageDisplayImpl;

impl Default for MessageDisplayImpl {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageDisplayImpl {
    pub fn new() -> Self {
        Self
    }
}

impl MessageDisplay for MessageDisplayImpl {
    fn info(&self, message: &str) {
        println!("ℹ️  {message}");
    }

    fn warning(&self, message: &str) {
        eprintln!("⚠️  {message}");
    }

    fn error(&self, message: &str) {
        eprintln!("❌ {message}");
    }

    fn success(&self, message: &str) {
        println!("✅ {message}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    pub struct RecordingDisplay {
        messages: Arc<Mutex<Vec<String>>>,
    }

    impl RecordingDisplay {
        pub fn new() -> Self {
            Self {
                messages: Arc::new(Mutex::new(Vec::new())),
            }
        }

        pub fn messages(&self) -> Vec<String> {
            self.messages.lock().unwrap().clone()
        }
    }

    impl MessageDisplay for RecordingDisplay {
        fn info(&self, message: &str) {
            self.messages
                .lock()
                .unwrap()
                .push(format!("INFO: {message}"));
        }

        fn warning(&self, message: &str) {
            self.messages
                .lock()
                .unwrap()
                .push(format!("WARN: {message}"));
        }

        fn error(&self, message: &str) {
            self.messages
                .lock()
                .unwrap()
                .push(format!("ERROR: {message}"));
        }

        fn success(&self, message: &str) {
            self.messages
                .lock()
                .unwrap()
                .push(format!("SUCCESS: {message}"));
        }
    }

    #[test]
    fn test_recording_display_order() {
        let display = RecordingDisplay::new();
        display.info("a");
        display.warning("b");
        display.error("c");
        display.success("d");

        assert_eq!(
            display.messages(),
            vec!["INFO: a", "WARN: b", "ERROR: c", "SUCCESS: d"]
        );
    }
}
