//! Naming conventions.
//!
//! Table names and default foreign-key names are derived from entity and
//! relationship names through an [`Inflector`]. The registry takes any
//! implementation; [`EnglishInflector`] is the default.

use regex::Regex;
use std::sync::OnceLock;

/// Word-form conversions used to derive storage names.
pub trait Inflector {
    /// `user` -> `users`
    fn pluralize(&self, word: &str) -> String;

    /// `users` -> `user`
    fn singularize(&self, word: &str) -> String;

    /// `UserName` -> `user_name`
    fn underscore(&self, word: &str) -> String;

    /// `user_info` -> `UserInfo`
    fn camelize(&self, word: &str) -> String {
        self.humanize(word).replace(' ', "")
    }

    /// `user_name` -> `User Name`
    fn humanize(&self, word: &str) -> String {
        self.underscore(word)
            .split('_')
            .filter(|part| !part.is_empty())
            .map(|part| {
                let mut chars = part.chars();
                chars.next().map_or_else(String::new, |first| {
                    first.to_uppercase().chain(chars).collect::<String>()
                })
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Simple English inflection with a table of irregular forms.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnglishInflector;

const IRREGULAR: &[(&str, &str)] = &[
    ("person", "people"),
    ("child", "children"),
    ("man", "men"),
    ("woman", "women"),
    ("mouse", "mice"),
    ("datum", "data"),
    ("index", "indices"),
    ("matrix", "matrices"),
    ("vertex", "vertices"),
    ("analysis", "analyses"),
    ("axis", "axes"),
];

const SIBILANT_PLURALS: &[(&str, &str)] = &[
    ("sses", "ss"),
    ("xes", "x"),
    ("zes", "z"),
    ("ches", "ch"),
    ("shes", "sh"),
];

const UNCOUNTABLE: &[&str] = &["equipment", "information", "series", "species", "news"];

fn word_boundary() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"([^A-Z_])([A-Z])").expect("boundary pattern compiles"))
}

fn acronym_boundary() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"([A-Z]+)([A-Z][a-z])").expect("acronym pattern compiles"))
}

/// Split a word into its prefix and its final segment so
/// compound names (`blog_post`) inflect only the last part.
fn split_last(word: &str) -> (&str, &str) {
    match word.rfind('_') {
        Some(i) => (&word[..=i], &word[i + 1..]),
        None => ("", word),
    }
}

fn ends_with_consonant_y(word: &str) -> bool {
    let mut chars = word.chars().rev();
    chars.next() == Some('y') && chars.next().is_some_and(|c| !"aeiou".contains(c))
}

impl Inflector for EnglishInflector {
    fn pluralize(&self, word: &str) -> String {
        let (stem, last) = split_last(word);
        let lower = last.to_lowercase();
        if last.is_empty() || UNCOUNTABLE.contains(&lower.as_str()) {
            return word.to_string();
        }
        if let Some((_, plural)) = IRREGULAR.iter().find(|(single, _)| *single == lower) {
            return format!("{stem}{plural}");
        }
        if IRREGULAR.iter().any(|(_, plural)| *plural == lower) {
            return word.to_string();
        }

        let plural = if ends_with_consonant_y(last) {
            format!("{}ies", &last[..last.len() - 1])
        } else if ["s", "x", "z", "ch", "sh"].iter().any(|s| last.ends_with(s)) {
            format!("{last}es")
        } else {
            format!("{last}s")
        };
        format!("{stem}{plural}")
    }

    fn singularize(&self, word: &str) -> String {
        let (stem, last) = split_last(word);
        let lower = last.to_lowercase();
        if UNCOUNTABLE.contains(&lower.as_str()) {
            return word.to_string();
        }
        if let Some((single, _)) = IRREGULAR.iter().find(|(_, plural)| *plural == lower) {
            return format!("{stem}{single}");
        }

        let single = if let Some(base) = last.strip_suffix("ies") {
            format!("{base}y")
        } else if let Some(base) = SIBILANT_PLURALS.iter().find_map(|(suffix, ending)| {
            last.strip_suffix(*suffix).map(|b| format!("{b}{ending}"))
        }) {
            base
        } else if let Some(base) = last.strip_suffix('s').filter(|b| !b.ends_with('s')) {
            base.to_string()
        } else {
            last.to_string()
        };
        format!("{stem}{single}")
    }

    fn underscore(&self, word: &str) -> String {
        let spaced = acronym_boundary().replace_all(word, "${1}_${2}");
        word_boundary()
            .replace_all(&spaced, "${1}_${2}")
            .replace(['-', ' '], "_")
            .to_lowercase()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn underscores_camel_case() {
        let inf = EnglishInflector;
        assert_eq!(inf.underscore("User"), "user");
        assert_eq!(inf.underscore("BlogPost"), "blog_post");
        assert_eq!(inf.underscore("HTTPServer"), "http_server");
        assert_eq!(inf.underscore("group_id"), "group_id");
    }

    #[test]
    fn pluralizes_and_singularizes() {
        let inf = EnglishInflector;
        for (single, plural) in [
            ("user", "users"),
            ("group", "groups"),
            ("category", "categories"),
            ("box", "boxes"),
            ("person", "people"),
            ("blog_post", "blog_posts"),
            ("key", "keys"),
        ] {
            assert_eq!(inf.pluralize(single), plural);
            assert_eq!(inf.singularize(plural), single);
        }
        assert_eq!(inf.pluralize("news"), "news");
    }

    #[test]
    fn camelizes_and_humanizes() {
        let inf = EnglishInflector;
        assert_eq!(inf.camelize("user_info"), "UserInfo");
        assert_eq!(inf.humanize("UserName"), "User Name");
    }
}
