//! Translator that renders keys verbatim.

use crate::application::ports::Translator;

/// Renders `key` followed by its parameters, e.g. `errors.rateLimitSeconds{seconds=30}`.
///
/// Handy for asserting which message key and parameters were chosen.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeyTranslator;

impl Translator for KeyTranslator {
    fn translate(&self, key: &str, params: &[(&str, String)]) -> String {
        if params.is_empty() {
            return key.to_string();
        }
        let rendered: Vec<String> = params
            .iter()
            .map(|(name, value)| format!("{}={}", name, value))
            .collect();
        format!("{}{{{}}}", key, rendered.join(","))
    }
}
