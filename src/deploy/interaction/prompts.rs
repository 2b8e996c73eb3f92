//! User prompting implementation

use anyhow::Result;
use async_trait::async_trait;
use std::io::{self, Write};

/// Trait for user prompting
#[async_trait]
pub trait UserPrompter: Send + Sync {
    /// Prompt for yes/no confirmation; defaults to no
    async fn prompt_yes_no(&self, message: &str) -> Result<bool>;

    /// Prompt the user to type an exact phrase
    ///
    /// Used as the second gate on irreversible or cascading deletions,
    /// where a stray "y" should not be enough.
    async fn prompt_phrase(&self, message: &str, expected: &str) -> Result<bool>;
}

/// Real implementation reading from stdin
pub struct UserPrompterImpl;

impl Default for UserPrompterImpl {
    fn default() -> Self {
        Self::new()
    }
}

impl UserPrompterImpl {
    pub fn new() -> Self {
        Self
    }

    fn read_line() -> Result<String> {
        let mut input = String::new();
        io::stdin().read_line(&mut input)?;
        Ok(input.trim().to_string())
    }

    /// Destructive flows default to "no" on an empty answer
    pub fn parse_yes_no(input: &str) -> bool {
        let input = input.trim().to_lowercase();
        input == "y" || input == "yes"
    }
}

#[async_trait]
impl UserPrompter for UserPrompterImpl {
    async fn prompt_yes_no(&self, message: &str) -> Result<bool> {
        print!("{} [y/N]: ", message);
        io::stdout().flush()?;

        let input = Self::read_line()?;
        Ok(Self::parse_yes_no(&input))
    }

    async fn prompt_phrase(&self, message: &str, expected: &str) -> Result<bool> {
        println!("{message}");
        print!("Type '{expected}' to confirm: ");
        io::stdout().flush()?;

        let input = Self::read_line()?;
        Ok(input == expected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_yes_no_accepts_variants() {
        assert!(UserPrompterImpl::parse_yes_no("y"));
        assert!(UserPrompterImpl::parse_yes_no("yes"));
        assert!(UserPrompterImpl::parse_yes_no("  YES  "));
    }

    #[test]
    fn test_parse_yes_no_defaults_to_no() {
        assert!(!UserPrompterImpl::parse_yes_no(""));
        assert!(!UserPrompterImpl::parse_yes_no("n"));
        assert!(!UserPrompterImpl::parse_yes_no("no"));
        assert!(!UserPrompterImpl::parse_yes_no("maybe"));
    }
}
