/// Error code registry for Capstan
///
/// Error codes are organized by category:
/// - 1000-1999: Configuration errors
/// - 2000-2999: Provisioning errors
/// - 3000-3999: Subprocess execution errors
/// - 4000-4999: Teardown errors
/// - 5000-5999: Validation errors
/// - 9000-9999: Other errors
#[allow(dead_code)]
pub struct ErrorCode;

impl ErrorCode {
    // Configuration errors (1000-1999)
    pub const CONFIG_GENERIC: u16 = 1000;
    pub const CONFIG_NOT_FOUND: u16 = 1001;
    pub const CONFIG_INVALID_TOML: u16 = 1002;
    pub const CONFIG_INVALID_JSON: u16 = 1003;
    pub const CONFIG_MISSING_REQUIRED: u16 = 1004;
    pub const CONFIG_INVALID_VALUE: u16 = 1005;
    pub const CONFIG_PATH_ERROR: u16 = 1006;
    pub const CONFIG_UNKNOWN_PROVIDER: u16 = 1007;

    // Provisioning errors (2000-2999)
    pub const PROVISION_GENERIC: u16 = 2000;
    pub const PROVISION_STEP_FAILED: u16 = 2001;
    pub const PROVISION_CONTRACT_VIOLATION: u16 = 2002;
    pub const PROVISION_SEQUENCE_ABORTED: u16 = 2003;
    pub const PROVISION_TIMEOUT: u16 = 2004;
    pub const PROVISION_HEALTH_CHECK_FAILED: u16 = 2005;
    pub const PROVISION_CANCELLED: u16 = 2006;

    // Subprocess execution errors (3000-3999)
    pub const EXEC_GENERIC: u16 = 3000;
    pub const EXEC_COMMAND_NOT_FOUND: u16 = 3001;
    pub const EXEC_TIMEOUT: u16 = 3002;
    pub const EXEC_SUBPROCESS_FAILED: u16 = 3003;
    pub const EXEC_SPAWN_FAILED: u16 = 3004;
    pub const EXEC_OUTPUT_ERROR: u16 = 3005;
    pub const EXEC_INTERRUPTED: u16 = 3006;

    // Teardown errors (4000-4999)
    pub const TEARDOWN_GENERIC: u16 = 4000;
    pub const TEARDOWN_RETRIES_EXHAUSTED: u16 = 4001;
    pub const TEARDOWN_DECLINED: u16 = 4002;
    pub const TEARDOWN_PARTIAL: u16 = 4003;

    // Validation errors (5000-5999)
    pub const VALIDATION_GENERIC: u16 = 5000;
    pub const VALIDATION_REQUIRED_FIELD: u16 = 5001;
    pub const VALIDATION_INVALID_FORMAT: u16 = 5002;
    pub const VALIDATION_OUT_OF_RANGE: u16 = 5003;

    // Other errors (9000-9999)
    pub const OTHER_GENERIC: u16 = 9000;
    pub const OTHER_UNEXPECTED: u16 = 9001;
    pub const OTHER_INTERNAL_ERROR: u16 = 9002;
}

/// Get a human-readable description for an error code
pub fn describe_error_code(code: u16) -> &'static str {
    match code {
        // Configuration errors
        1000 => "Generic configuration error",
        1001 => "Configuration file not found",
        1002 => "Invalid TOML syntax",
        1003 => "Invalid JSON syntax",
        1004 => "Missing required configuration",
        1005 => "Invalid configuration value",
        1006 => "Configuration path error",
        1007 => "Unknown provider name",

        // Provisioning errors
        2000 => "Generic provisioning error",
        2001 => "Provisioning step failed",
        2002 => "Provider step contract violation",
        2003 => "Step sequence aborted",
        2004 => "Provisioning operation timed out",
        2005 => "Platform health check failed",
        2006 => "Deployment cancelled by user",

        // Subprocess execution errors
        3000 => "Generic execution error",
        3001 => "Command not found",
        3002 => "Command timed out",
        3003 => "Subprocess failed",
        3004 => "Failed to spawn subprocess",
        3005 => "Failed to capture subprocess output",
        3006 => "Subprocess interrupted",

        // Teardown errors
        4000 => "Generic teardown error",
        4001 => "Resource deletion retries exhausted",
        4002 => "Teardown declined by user",
        4003 => "Teardown completed with failures",

        // Validation errors
        5000 => "Generic validation error",
        5001 => "Required field missing",
        5002 => "Invalid format",
        5003 => "Value out of range",

        // Other errors
        9000 => "Unknown error",
        9001 => "Unexpected error",
        9002 => "Internal error",

        _ => "Unrecognized error code",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_describe_known_codes() {
        assert_eq!(
            describe_error_code(ErrorCode::CONFIG_NOT_FOUND),
            "Configuration file not found"
        );
        assert_eq!(
            describe_error_code(ErrorCode::PROVISION_CONTRACT_VIOLATION),
            "Provider step contract violation"
        );
        assert_eq!(
            describe_error_code(ErrorCode::TEARDOWN_RETRIES_EXHAUSTED),
            "Resource deletion retries exhausted"
        );
    }

    #[test]
    fn test_describe_unknown_code() {
        assert_eq!(describe_error_code(8888), "Unrecognized error code");
    }
}
