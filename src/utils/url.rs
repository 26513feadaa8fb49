//! URL utilities for consistent endpoint construction.

/// Normalize a base URL by removing trailing slashes so endpoint joins never
/// produce double slashes.
pub fn normalize_base_url(base_url: &str) -> String {
    base_url.trim_end_matches('/').to_string()
}

/// Join a base URL and an endpoint path.
///
/// # Examples
///
/// ```
/// use causerie::utils::url::construct_api_url;
///
/// assert_eq!(
///     construct_api_url("https://api.example.com/v1/", "/chat/completions"),
///     "https://api.example.com/v1/chat/completions"
/// );
/// ```
pub fn construct_api_url(base_url: &str, endpoint: &str) -> String {
    let normalized_base = normalize_base_url(base_url);
    let endpoint = endpoint.trim_start_matches('/');
    format!("{}/{}", normalized_base, endpoint)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trailing_slashes_are_stripped() {
        assert_eq!(
            normalize_base_url("https://api.example.com/v1///"),
            "https://api.example.com/v1"
        );
        assert_eq!(
            normalize_base_url("https://api.example.com/v1"),
            "https://api.example.com/v1"
        );
        assert_eq!(normalize_base_url(""), "");
    }

    #[test]
    fn endpoint_joins_never_double_the_slash() {
        for base in [
            "https://api.example.com/v1",
            "https://api.example.com/v1/",
            "https://api.example.com/v1//",
        ] {
            assert_eq!(
                construct_api_url(base, "chat/completions"),
                "https://api.example.com/v1/chat/completions"
            );
            assert_eq!(
                construct_api_url(base, "/chat/completions"),
                "https://api.example.com/v1/chat/completions"
            );
        }
    }
}
