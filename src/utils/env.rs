/// Prefix applied to every environment variable the gateway reads.
pub const ENV_PREFIX: &str = "WALLETGATE_";

/// Get environment variable with WALLETGATE_ prefix, falling back to unprefixed version
///
/// Checks `WALLETGATE_{key}` first, then `{key}`, so deployments can keep
/// using the plain names their supervisor already exports (e.g. `PORT`).
pub fn get_env_with_prefix(key: &str) -> Option<String> {
    std::env::var(format!("{}{}", ENV_PREFIX, key))
        .or_else(|_| std::env::var(key))
        .ok()
}

/// Parse a prefixed environment variable, ignoring values that fail to parse.
pub fn parse_env_with_prefix<T: std::str::FromStr>(key: &str) -> Option<T> {
    match get_env_with_prefix(key)?.parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(key, "Ignoring unparsable environment variable");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_env_with_prefix() {
        unsafe {
            std::env::set_var("WALLETGATE_TEST_VAR", "prefixed_value");
        }
        assert_eq!(get_env_with_prefix("TEST_VAR"), Some("prefixed_value".to_string()));
        unsafe {
            std::env::remove_var("WALLETGATE_TEST_VAR");
        }

        unsafe {
            std::env::set_var("WALLETGATE_FALLBACK_VAR_PLAIN", "unprefixed_value");
        }
        assert_eq!(
            get_env_with_prefix("WALLETGATE_FALLBACK_VAR_PLAIN"),
            Some("unprefixed_value".to_string())
        );
        unsafe {
            std::env::remove_var("WALLETGATE_FALLBACK_VAR_PLAIN");
        }

        assert_eq!(get_env_with_prefix("NON_EXISTENT_VAR_FOR_GATEWAY"), None);
    }

    #[test]
    fn test_parse_env_with_prefix() {
        unsafe {
            std::env::set_var("WALLETGATE_PARSE_NUMBER", "42");
            std::env::set_var("WALLETGATE_PARSE_GARBAGE", "forty-two");
        }
        assert_eq!(parse_env_with_prefix::<u16>("PARSE_NUMBER"), Some(42));
        assert_eq!(parse_env_with_prefix::<u16>("PARSE_GARBAGE"), None);
        unsafe {
            std::env::remove_var("WALLETGATE_PARSE_NUMBER");
            std::env::remove_var("WALLETGATE_PARSE_GARBAGE");
        }
    }
}
