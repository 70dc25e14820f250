use serde_json::Value;

/// One hop into a schema-less JSON document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Key(&'static str),
    Index(usize),
}

/// Fixed route into a JSON document, evaluated without failing.
#[derive(Debug, Clone, Copy)]
pub struct JsonPath(pub &'static [Step]);

impl JsonPath {
    /// Walk the path; any missing key, index or wrong container type is `None`.
    pub fn lookup<'a>(&self, root: &'a Value) -> Option<&'a Value> {
        self.0.iter().try_fold(root, |node, step| match step {
            Step::Key(key) => node.as_object()?.get(*key),
            Step::Index(index) => node.as_array()?.get(*index),
        })
    }

    pub fn lookup_str<'a>(&self, root: &'a Value) -> Option<&'a str> {
        self.lookup(root)?.as_str()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const TEXT: JsonPath = JsonPath(&[
        Step::Key("candidates"),
        Step::Index(0),
        Step::Key("content"),
        Step::Key("parts"),
        Step::Index(0),
        Step::Key("text"),
    ]);

    #[test]
    fn follows_keys_and_indices() {
        let doc = json!({"candidates": [{"content": {"parts": [{"text": "hi"}]}}]});
        assert_eq!(TEXT.lookup_str(&doc), Some("hi"));
    }

    #[test]
    fn missing_step_is_none() {
        assert_eq!(TEXT.lookup(&json!({"candidates": []})), None);
        assert_eq!(TEXT.lookup(&json!({"candidates": {"0": 1}})), None);
        assert_eq!(TEXT.lookup_str(&json!({"candidates": [{"content": {"parts": [{"text": 3}]}}]})), None);
    }

    #[test]
    fn empty_path_is_root() {
        let doc = json!([1]);
        assert_eq!(JsonPath(&[]).lookup(&doc), Some(&doc));
    }
}
