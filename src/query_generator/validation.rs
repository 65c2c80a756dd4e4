//! Template placeholder detection for hand-written queries.
//!
//! Example queries ship with stand-in names that the user is expected to
//! replace. Running one unchanged silently matches nothing, so callers check
//! first and report what is left.

use std::fmt;

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref VARIABLE_PLACEHOLDER: Regex = Regex::new(r"(?i)\bVAR_[A-Z]\b").unwrap();
    static ref PROVINCE_PLACEHOLDER: Regex = Regex::new(r"(?i)NOMBRE_PROVINCIA").unwrap();
    static ref DEPARTMENT_PLACEHOLDER: Regex = Regex::new(r"(?i)NOMBRE_DEPARTAMENTO").unwrap();
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placeholder {
    /// `VAR_A`, `VAR_B`, ...
    Variable,
    ProvinceName,
    DepartmentName,
}

impl fmt::Display for Placeholder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Placeholder::Variable => f.write_str("VAR_A, VAR_B, etc."),
            Placeholder::ProvinceName => f.write_str("NOMBRE_PROVINCIA"),
            Placeholder::DepartmentName => f.write_str("NOMBRE_DEPARTAMENTO"),
        }
    }
}

/// Placeholder kinds still present in `sql`, each reported once.
pub fn find_unresolved_placeholders(sql: &str) -> Vec<Placeholder> {
    let checks: [(&Regex, Placeholder); 3] = [
        (&VARIABLE_PLACEHOLDER, Placeholder::Variable),
        (&PROVINCE_PLACEHOLDER, Placeholder::ProvinceName),
        (&DEPARTMENT_PLACEHOLDER, Placeholder::DepartmentName),
    ];
    checks
        .into_iter()
        .filter(|(re, _)| re.is_match(sql))
        .map(|(_, kind)| kind)
        .collect()
}
