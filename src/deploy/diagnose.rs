//! Backend error classification
//!
//! Backends report failures as formatted text (API response bodies, ssh
//! stderr, docker CLI output). [`classify`] turns that text into a
//! [`Diagnostic`] carrying a taxonomy code and an actionable suggestion
//! when the text matches a known failure class, or a cleaned/truncated
//! rendition of the raw text when it does not. Classification is total:
//! every input, including a missing error, produces a Diagnostic.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Maximum length of an unclassified message after cleanup
const MAX_MESSAGE_LEN: usize = 200;

const UNKNOWN_ERROR: &str = "unknown error";

/// The structured, classified representation of a backend failure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub provider: String,
    pub operation: String,
    /// Taxonomy key; empty when no known pattern matched
    pub code: String,
    /// Human-readable message, cleaned of transport noise
    pub message: String,
    pub suggestion: Option<String>,
    /// Original error text, retained for logging, never shown raw
    pub cause: Option<String>,
}

impl Diagnostic {
    pub fn is_classified(&self) -> bool {
        !self.code.is_empty()
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

/// One known failure class: any pattern hit supplies the code + suggestion
struct Matcher {
    code: &'static str,
    patterns: &'static [&'static str],
    message: &'static str,
    suggestion: &'static str,
}

impl Matcher {
    fn matches(&self, haystack: &str) -> bool {
        self.patterns.iter().any(|p| haystack.contains(p))
    }
}

// Matchers are tried in declaration order; the first hit wins. Patterns
// are matched against the lowercased error text.

static DIGITALOCEAN_MATCHERS: &[Matcher] = &[
    Matcher {
        code: "unauthorized",
        patterns: &["401", "unable to authenticate"],
        message: "DigitalOcean rejected the API token",
        suggestion: "Set a valid token via CAPSTAN_DO_TOKEN (or DIGITALOCEAN_TOKEN) and re-run",
    },
    Matcher {
        code: "forbidden",
        patterns: &["403", "not authorized to perform"],
        message: "The API token is not allowed to perform this operation",
        suggestion: "Regenerate the token with both read and write scopes",
    },
    Matcher {
        code: "quota_exceeded",
        patterns: &["droplet limit", "quota exceeded", "limit will be exceeded"],
        message: "Account droplet limit reached",
        suggestion: "Delete unused droplets or request a limit increase in the control panel",
    },
    Matcher {
        code: "conflict",
        patterns: &["409", "already in progress", "pending event"],
        message: "Another operation is still running against this resource",
        suggestion: "Wait for the pending operation to finish, then retry",
    },
    Matcher {
        code: "not_found",
        patterns: &["404", "could not be found"],
        message: "The requested resource does not exist",
        suggestion: "It may already be deleted; run `capstan destroy` again to reconcile state",
    },
];

static SSH_MATCHERS: &[Matcher] = &[
    Matcher {
        code: "auth_denied",
        patterns: &["permission denied (publickey", "permission denied, please try again"],
        message: "SSH authentication failed",
        suggestion: "Check the ssh user and identity_file in capstan.toml, and that the \
                     public key is in authorized_keys on the target",
    },
    Matcher {
        code: "host_key",
        patterns: &[
            "host key verification failed",
            "remote host identification has changed",
        ],
        message: "The target's host key is not trusted",
        suggestion: "Update the entry for the host in ~/.ssh/known_hosts and re-run",
    },
    Matcher {
        code: "unreachable",
        patterns: &[
            "connection refused",
            "connection timed out",
            "no route to host",
            "network is unreachable",
            "could not resolve hostname",
        ],
        message: "Cannot reach the target host over SSH",
        suggestion: "Verify the host address and that the configured SSH port is open",
    },
    Matcher {
        code: "disk_full",
        patterns: &["no space left on device"],
        message: "The target host is out of disk space",
        suggestion: "Free space on the target before retrying the installation",
    },
];

static DOCKER_MATCHERS: &[Matcher] = &[
    Matcher {
        code: "daemon_unreachable",
        patterns: &[
            "cannot connect to the docker daemon",
            "is the docker daemon running",
        ],
        message: "The Docker daemon is not reachable",
        suggestion: "Start Docker (Desktop or the docker service) and re-run",
    },
    Matcher {
        code: "port_conflict",
        patterns: &["port is already allocated", "address already in use"],
        message: "The platform port is already taken on this machine",
        suggestion: "Stop the conflicting service or change dashboard_port in capstan.toml",
    },
    Matcher {
        code: "disk_full",
        patterns: &["no space left on device"],
        message: "Docker ran out of disk space",
        suggestion: "Free disk space or run `docker system prune`",
    },
    Matcher {
        code: "pull_denied",
        patterns: &["pull access denied", "manifest unknown"],
        message: "The platform image could not be pulled",
        suggestion: "Check the image name and tag, and registry credentials if the image is private",
    },
];

// Cross-provider fallbacks, tried after the provider-specific table
static GENERIC_MATCHERS: &[Matcher] = &[
    Matcher {
        code: "permission_denied",
        patterns: &["permission denied", "unauthorized", "access denied"],
        message: "The backend denied access",
        suggestion: "Check the credentials configured for this provider",
    },
    Matcher {
        code: "quota_exceeded",
        patterns: &["quota exceeded", "rate limit", "too many requests"],
        message: "A backend quota or rate limit was hit",
        suggestion: "Wait a moment and retry, or raise the relevant limit",
    },
    Matcher {
        code: "conflict",
        patterns: &["already exists", "conflict"],
        message: "The resource already exists or is busy",
        suggestion: "Re-run after the conflicting resource is released or renamed",
    },
    Matcher {
        code: "not_found",
        patterns: &["not found", "no such"],
        message: "The backend could not find the resource",
        suggestion: "",
    },
];

fn provider_matchers(provider: &str) -> &'static [Matcher] {
    match provider {
        "digitalocean" => DIGITALOCEAN_MATCHERS,
        "ssh" => SSH_MATCHERS,
        "local" | "docker" => DOCKER_MATCHERS,
        _ => &[],
    }
}

/// Classify a backend error into a [`Diagnostic`]
///
/// Never panics. A `None` error yields a fixed unknown-error Diagnostic.
pub fn classify(provider: &str, operation: &str, error: Option<&anyhow::Error>) -> Diagnostic {
    match error {
        Some(err) => classify_text(provider, operation, &format!("{err:#}")),
        None => Diagnostic {
            provider: provider.to_string(),
            operation: operation.to_string(),
            code: String::new(),
            message: UNKNOWN_ERROR.to_string(),
            suggestion: None,
            cause: None,
        },
    }
}

/// Classify raw backend error text into a [`Diagnostic`]
pub fn classify_text(provider: &str, operation: &str, text: &str) -> Diagnostic {
    let haystack = text.to_lowercase();

    for matcher in provider_matchers(provider)
        .iter()
        .chain(GENERIC_MATCHERS.iter())
    {
        if matcher.matches(&haystack) {
            return Diagnostic {
                provider: provider.to_string(),
                operation: operation.to_string(),
                code: matcher.code.to_string(),
                message: matcher.message.to_string(),
                suggestion: if matcher.suggestion.is_empty() {
                    None
                } else {
                    Some(matcher.suggestion.to_string())
                },
                cause: Some(text.to_string()),
            };
        }
    }

    // No known pattern: fall back to cleaning the raw text
    let cleaned = clean_error_text(text);
    Diagnostic {
        provider: provider.to_string(),
        operation: operation.to_string(),
        code: String::new(),
        message: if cleaned.is_empty() {
            UNKNOWN_ERROR.to_string()
        } else {
            cleaned
        },
        suggestion: None,
        cause: Some(text.to_string()),
    }
}

static HTTP_REQUEST_NOISE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(GET|POST|PUT|DELETE|PATCH|HEAD)\s+https?://\S+").unwrap());
static STATUS_BANNER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)HTTP/\d(?:\.\d)?\s+\d{3}[^\n]*").unwrap());
static SEPARATOR_LINE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^[-=_*#]{4,}\s*$").unwrap());
static WHITESPACE_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// Strip transport noise from raw error text and bound its length
///
/// Removes HTTP method+URL fragments, status-code banners, and separator
/// lines, collapses whitespace, and truncates to a readable length.
pub fn clean_error_text(text: &str) -> String {
    let cleaned = HTTP_REQUEST_NOISE.replace_all(text, "");
    let cleaned = STATUS_BANNER.replace_all(&cleaned, "");
    let cleaned = SEPARATOR_LINE.replace_all(&cleaned, "");
    let cleaned = WHITESPACE_RUN.replace_all(&cleaned, " ");
    let cleaned = cleaned.trim();

    if cleaned.chars().count() <= MAX_MESSAGE_LEN {
        return cleaned.to_string();
    }
    let truncated: String = cleaned.chars().take(MAX_MESSAGE_LEN).collect();
    format!("{}…", truncated.trim_end())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_none_is_total() {
        let diagnostic = classify("digitalocean", "create-server", None);
        assert_eq!(diagnostic.message, "unknown error");
        assert!(!diagnostic.is_classified());
        assert!(diagnostic.suggestion.is_none());
    }

    #[test]
    fn test_classify_empty_text() {
        let diagnostic = classify_text("ssh", "probe", "");
        assert_eq!(diagnostic.message, "unknown error");
        assert!(!diagnostic.is_classified());
    }

    #[test]
    fn test_digitalocean_unauthorized() {
        let diagnostic = classify_text(
            "digitalocean",
            "create-server",
            "POST https://api.digitalocean.com/v2/droplets: 401 Unable to authenticate you",
        );
        assert_eq!(diagnostic.code, "unauthorized");
        assert!(diagnostic.suggestion.as_deref().unwrap().contains("CAPSTAN_DO_TOKEN"));
        assert!(diagnostic.cause.as_deref().unwrap().contains("401"));
    }

    #[test]
    fn test_ssh_permission_denied() {
        let diagnostic = classify_text(
            "ssh",
            "probe-target",
            "root@10.0.0.5: Permission denied (publickey,password).",
        );
        assert_eq!(diagnostic.code, "auth_denied");
        assert!(diagnostic.suggestion.is_some());
    }

    #[test]
    fn test_docker_daemon_unreachable() {
        let diagnostic = classify_text(
            "local",
            "verify-docker",
            "Cannot connect to the Docker daemon at unix:///var/run/docker.sock. Is the docker daemon running?",
        );
        assert_eq!(diagnostic.code, "daemon_unreachable");
    }

    #[test]
    fn test_provider_table_takes_priority_over_generic() {
        // "permission denied" appears in both SSH and generic tables; the
        // provider-specific code must win.
        let diagnostic = classify_text("ssh", "probe", "Permission denied, please try again.");
        assert_eq!(diagnostic.code, "auth_denied");
    }

    #[test]
    fn test_generic_fallback_for_unknown_provider() {
        let diagnostic = classify_text("somecloud", "delete", "error: quota exceeded for zone");
        assert_eq!(diagnostic.code, "quota_exceeded");
    }

    #[test]
    fn test_unmatched_text_is_cleaned_and_truncated() {
        let noisy = format!(
            "GET https://api.example.com/v2/things HTTP/1.1 500 Internal Server Error\n====\n{}",
            "details ".repeat(60)
        );
        let diagnostic = classify_text("digitalocean", "poll", &noisy);
        assert!(diagnostic.code.is_empty() || diagnostic.code == "not_found");
        assert!(diagnostic.message.chars().count() <= MAX_MESSAGE_LEN + 1);
        assert!(!diagnostic.message.contains("https://api.example.com"));
    }

    #[test]
    fn test_clean_strips_noise() {
        let cleaned = clean_error_text(
            "DELETE https://api.digitalocean.com/v2/droplets/123\nHTTP/1.1 422 Unprocessable\n----\n  request   failed  ",
        );
        assert_eq!(cleaned, "request failed");
    }

    #[test]
    fn test_clean_truncates_on_char_boundary() {
        let long = "é".repeat(400);
        let cleaned = clean_error_text(&long);
        assert!(cleaned.chars().count() <= MAX_MESSAGE_LEN + 1);
        assert!(cleaned.ends_with('…'));
    }

    #[test]
    fn test_reclassifying_clean_message_does_not_corrupt() {
        let first = classify_text("digitalocean", "create-server", "401 unauthorized");
        let second = classify_text("digitalocean", "create-server", &first.message);
        // The message was free of transport noise already, so a second pass
        // must not mangle it.
        assert!(!second.message.is_empty());
        assert!(second.message.chars().count() <= MAX_MESSAGE_LEN + 1);
    }

    #[test]
    fn test_classify_from_anyhow_error() {
        let err = anyhow::anyhow!("ssh: connect to host 10.0.0.9 port 22: Connection refused");
        let diagnostic = classify("ssh", "probe-target", Some(&err));
        assert_eq!(diagnostic.code, "unreachable");
    }
}
