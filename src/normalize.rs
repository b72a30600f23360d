//! Canonical forms of free-text identity fields.
//!
//! Every function here is total and idempotent: applying it to its own output
//! returns the same string.

use serde::{Deserialize, Serialize};

/// Collapses runs of whitespace into single spaces and trims the ends.
pub fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Lowercased full name with digits and punctuation removed.
///
/// `"  Иванов1  Иван. "` becomes `"иванов иван"`.
pub fn normalize_name(name: &str) -> String {
    let letters: String = name
        .chars()
        .filter(|c| c.is_alphabetic() || c.is_whitespace())
        .collect();
    collapse_whitespace(&letters).to_lowercase()
}

/// Uppercased class label with a single hyphen before the letter part.
///
/// `"10 а"`, `"10-А"` and `"10А"` all become `"10-А"`; `"10"` stays `"10"`.
pub fn normalize_class(label: &str) -> String {
    let compact: String = label
        .chars()
        .filter(|c| *c != '-' && !c.is_whitespace())
        .collect::<String>()
        .to_uppercase();

    match compact.char_indices().find(|(_, c)| c.is_alphabetic()) {
        Some((idx, _)) if idx > 0 => format!("{}-{}", &compact[..idx], &compact[idx..]),
        _ => compact,
    }
}

/// Optional sub-variant of a subject, e.g. "профильная" for mathematics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubjectQualifier {
    pub keywords: Vec<String>,
    pub label: String,
}

/// One row of the subject table: any keyword contained in the input selects
/// `canonical`, refined by the first matching qualifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubjectRule {
    pub keywords: Vec<String>,
    pub canonical: String,
    #[serde(default)]
    pub qualifiers: Vec<SubjectQualifier>,
}

impl SubjectRule {
    pub fn new(keywords: &[&str], canonical: &str) -> Self {
        Self {
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
            canonical: canonical.to_string(),
            qualifiers: Vec::new(),
        }
    }

    pub fn with_qualifier(mut self, keywords: &[&str], label: &str) -> Self {
        self.qualifiers.push(SubjectQualifier {
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
            label: label.to_string(),
        });
        self
    }

    fn matches(&self, lowered: &str) -> bool {
        self.keywords
            .iter()
            .any(|k| lowered.contains(&k.to_lowercase()))
    }

    fn resolve(&self, lowered: &str) -> String {
        let qualifier = self.qualifiers.iter().find(|q| {
            q.keywords
                .iter()
                .any(|k| lowered.contains(&k.to_lowercase()))
        });
        match qualifier {
            Some(q) => format!("{} {}", self.canonical, q.label),
            None => self.canonical.clone(),
        }
    }
}

/// Ordered subject table; the first matching rule wins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubjectRules {
    rules: Vec<SubjectRule>,
}

impl Default for SubjectRules {
    fn default() -> Self {
        // Order matters: narrower keywords must come before broader ones.
        let rules = vec![
            SubjectRule::new(&["вероятност", "статистик"], "Вероятность и статистика"),
            SubjectRule::new(&["математ"], "Математика")
                .with_qualifier(&["профил"], "профильная")
                .with_qualifier(&["базов"], "базовая"),
            SubjectRule::new(&["алгебр"], "Алгебра"),
            SubjectRule::new(&["геометр"], "Геометрия"),
            SubjectRule::new(&["русск"], "Русский язык"),
            SubjectRule::new(&["литерат"], "Литература"),
            SubjectRule::new(&["физкульт", "физическ"], "Физическая культура"),
            SubjectRule::new(&["физик"], "Физика"),
            SubjectRule::new(&["хими"], "Химия"),
            SubjectRule::new(&["биолог"], "Биология"),
            SubjectRule::new(&["географ"], "География"),
            SubjectRule::new(&["истори"], "История"),
            SubjectRule::new(&["обществ"], "Обществознание"),
            SubjectRule::new(&["информат"], "Информатика"),
            SubjectRule::new(&["англ"], "Английский язык"),
            SubjectRule::new(&["немец"], "Немецкий язык"),
            SubjectRule::new(&["француз"], "Французский язык"),
            SubjectRule::new(&["окружающ"], "Окружающий мир"),
        ];
        Self { rules }
    }
}

impl SubjectRules {
    /// Built-in table with `extra` rules evaluated first.
    pub fn with_overrides(extra: &[SubjectRule]) -> Self {
        let mut rules = extra.to_vec();
        rules.extend(Self::default().rules);
        Self { rules }
    }

    /// Canonical subject label, or the trimmed input when no rule matches.
    pub fn canonicalize(&self, label: &str) -> String {
        let trimmed = collapse_whitespace(label);
        let lowered = trimmed.to_lowercase();
        self.rules
            .iter()
            .find(|rule| rule.matches(&lowered))
            .map(|rule| rule.resolve(&lowered))
            .unwrap_or(trimmed)
    }
}

/// Builds join keys from raw identity fields.
#[derive(Debug, Clone, Default)]
pub struct FieldNormalizer {
    subjects: SubjectRules,
}

impl FieldNormalizer {
    pub fn new(subjects: SubjectRules) -> Self {
        Self { subjects }
    }

    pub fn name(&self, raw: &str) -> String {
        normalize_name(raw)
    }

    pub fn class(&self, raw: &str) -> String {
        normalize_class(raw)
    }

    pub fn subject(&self, raw: &str) -> String {
        self.subjects.canonicalize(raw)
    }

    /// `name|class|subject`, every part normalized and lowercased.
    pub fn composite_key(&self, name: &str, class: &str, subject: &str) -> String {
        format!(
            "{}|{}|{}",
            self.name(name),
            self.class(class).to_lowercase(),
            self.subject(subject).to_lowercase()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_strips_digits_and_punctuation() {
        assert_eq!(normalize_name("  Иванов1  Иван. "), "иванов иван");
        assert_eq!(normalize_name("Petrov-Vodkin Kuzma"), "petrovvodkin kuzma");
        assert_eq!(normalize_name("123"), "");
    }

    #[test]
    fn test_name_is_idempotent() {
        for raw in ["Иванов Иван Иванович", " a 1 b ", "Ёлкин\tПётр", "", "--"] {
            let once = normalize_name(raw);
            assert_eq!(normalize_name(&once), once);
        }
    }

    #[test]
    fn test_class_label() {
        assert_eq!(normalize_class("10 А"), "10-А");
        assert_eq!(normalize_class("10-а"), "10-А");
        assert_eq!(normalize_class(" 10  - А "), "10-А");
        assert_eq!(normalize_class("11"), "11");
        assert_eq!(normalize_class("А"), "А");
    }

    #[test]
    fn test_class_label_is_idempotent() {
        for raw in ["10 А", "9б", "11", "5 - В", ""] {
            let once = normalize_class(raw);
            assert_eq!(normalize_class(&once), once);
        }
    }

    #[test]
    fn test_subject_qualifiers() {
        let rules = SubjectRules::default();
        assert_eq!(
            rules.canonicalize("Математика (профильная)"),
            "Математика профильная"
        );
        assert_eq!(rules.canonicalize("МАТЕМАТИКА базовый уровень"), "Математика базовая");
        assert_eq!(rules.canonicalize("математика"), "Математика");
    }

    #[test]
    fn test_subject_rule_order() {
        let rules = SubjectRules::default();
        assert_eq!(rules.canonicalize("Физическая культура"), "Физическая культура");
        assert_eq!(rules.canonicalize("физика"), "Физика");
        assert_eq!(rules.canonicalize("русский яз."), "Русский язык");
    }

    #[test]
    fn test_unknown_subject_is_returned_trimmed() {
        let rules = SubjectRules::default();
        assert_eq!(rules.canonicalize("  Астрономия  "), "Астрономия");
    }

    #[test]
    fn test_subject_is_idempotent() {
        let rules = SubjectRules::default();
        for raw in ["Математика (профильная)", "Английский", "Астрономия"] {
            let once = rules.canonicalize(raw);
            assert_eq!(rules.canonicalize(&once), once);
        }
    }

    #[test]
    fn test_overrides_take_precedence() {
        let rules = SubjectRules::with_overrides(&[SubjectRule::new(&["матем"], "Математика (ОГЭ)")]);
        assert_eq!(rules.canonicalize("математика профиль"), "Математика (ОГЭ)");
        assert_eq!(rules.canonicalize("химия"), "Химия");
    }

    #[test]
    fn test_composite_key() {
        let n = FieldNormalizer::default();
        assert_eq!(
            n.composite_key("Иванов Иван Иванович", "10 А", "математика (профильная)"),
            "иванов иван иванович|10-а|математика профильная"
        );
    }
}
