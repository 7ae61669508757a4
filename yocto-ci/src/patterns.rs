pub const SHELL_PROMPT: &str = "starry:~#";
pub const LOGIN_PROMPT: &str = "login:";
pub const WELCOME_BANNER: &str = "Welcome to";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuccessPatterns {
    patterns: Vec<String>,
}

impl SuccessPatterns {
    pub fn new<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            patterns: patterns.into_iter().map(Into::into).collect(),
        }
    }

    /// Returns the first pattern, in list order, contained in `buffer`.
    pub fn find(&self, buffer: &str) -> Option<&str> {
        self.patterns
            .iter()
            .map(String::as_str)
            .find(|pattern| buffer.contains(pattern))
    }
}

impl Default for SuccessPatterns {
    fn default() -> Self {
        Self::new([SHELL_PROMPT, LOGIN_PROMPT, WELCOME_BANNER])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_shell_prompt_in_accumulated_buffer() {
        let patterns = SuccessPatterns::default();
        let mut buffer = String::from("Booting...\n");
        assert_eq!(patterns.find(&buffer), None);

        buffer.push_str("starry:~# ");
        assert_eq!(patterns.find(&buffer), Some(SHELL_PROMPT));
    }

    #[test]
    fn first_pattern_in_list_order_wins() {
        let patterns = SuccessPatterns::default();
        let buffer = "Welcome to StarryOS\nstarry login: ";
        assert_eq!(patterns.find(buffer), Some(LOGIN_PROMPT));
    }

    #[test]
    fn matching_is_case_sensitive() {
        let patterns = SuccessPatterns::default();
        assert_eq!(patterns.find("WELCOME TO starry\nLOGIN: "), None);
    }

    #[test]
    fn pattern_may_span_appended_lines() {
        let patterns = SuccessPatterns::new(["ready\nok"]);
        let mut buffer = String::from("ready\n");
        assert_eq!(patterns.find(&buffer), None);
        buffer.push_str("ok\n");
        assert_eq!(patterns.find(&buffer), Some("ready\nok"));
    }

    #[test]
    fn empty_set_never_matches() {
        let patterns = SuccessPatterns::new(Vec::<String>::new());
        assert_eq!(patterns.find("starry:~#"), None);
    }
}
