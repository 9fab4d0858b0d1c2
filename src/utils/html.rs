// src/utils/html.rs

use std::borrow::Cow;

/// Sanitizes authored part content with ammonia's whitelist.
///
/// Scripts, iframes and event-handler attributes are removed. `class` and
/// `data-*` attributes survive because quizzes are declared with them
/// (see [`crate::quiz`]).
pub fn clean_html(input: &str) -> String {
    ammonia::Builder::default()
        .add_generic_attributes(&["class"])
        .add_generic_attribute_prefixes(&["data-"])
        .clean(input)
        .to_string()
}

/// Content as learners get it: quiz answer keys (`data-correct`) removed.
pub fn hide_answer_keys(input: &str) -> String {
    ammonia::Builder::default()
        .add_generic_attributes(&["class"])
        .add_generic_attribute_prefixes(&["data-"])
        .attribute_filter(|_element, attribute, value| match attribute {
            "data-correct" => None,
            _ => Some(Cow::Borrowed(value)),
        })
        .clean(input)
        .to_string()
}
