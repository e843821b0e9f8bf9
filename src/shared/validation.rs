use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    /// Regex for endpoint patterns as matched by the router
    /// Must start with a slash; segments may use `{param}` placeholders
    /// - Valid: "/api/tasks", "/api/tasks/{id}", "/"
    /// - Invalid: "api/tasks", "/api tasks", "/api/tasks?x=1"
    pub static ref ENDPOINT_PATTERN_REGEX: Regex =
        Regex::new(r"^/([A-Za-z0-9_\-.~{}:*]+(/[A-Za-z0-9_\-.~{}:*]+)*/?)?$").unwrap();

    /// Regex for HTTP methods or the `*` wildcard (case-insensitive, normalised before storage)
    /// - Valid: "GET", "post", "*"
    /// - Invalid: "", "GE T", "**"
    pub static ref HTTP_METHOD_REGEX: Regex =
        Regex::new(r"^(\*|(?i:GET|POST|PUT|PATCH|DELETE|HEAD|OPTIONS))$").unwrap();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_pattern_regex_valid() {
        assert!(ENDPOINT_PATTERN_REGEX.is_match("/"));
        assert!(ENDPOINT_PATTERN_REGEX.is_match("/tasks"));
        assert!(ENDPOINT_PATTERN_REGEX.is_match("/api/tasks/{id}"));
        assert!(ENDPOINT_PATTERN_REGEX.is_match("/api/projects/{project_id}/tasks/"));
    }

    #[test]
    fn test_endpoint_pattern_regex_invalid() {
        assert!(!ENDPOINT_PATTERN_REGEX.is_match("")); // empty
        assert!(!ENDPOINT_PATTERN_REGEX.is_match("tasks")); // no leading slash
        assert!(!ENDPOINT_PATTERN_REGEX.is_match("/api tasks")); // space
        assert!(!ENDPOINT_PATTERN_REGEX.is_match("/api//tasks")); // empty segment
        assert!(!ENDPOINT_PATTERN_REGEX.is_match("/tasks?page=1")); // query string
    }

    #[test]
    fn test_http_method_regex() {
        assert!(HTTP_METHOD_REGEX.is_match("*"));
        assert!(HTTP_METHOD_REGEX.is_match("GET"));
        assert!(HTTP_METHOD_REGEX.is_match("post"));
        assert!(!HTTP_METHOD_REGEX.is_match("**"));
        assert!(!HTTP_METHOD_REGEX.is_match("FETCH"));
        assert!(!HTTP_METHOD_REGEX.is_match(""));
    }
}
