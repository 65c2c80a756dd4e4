use censo_layers::query_generator::sanitize::{sanitize_label, UNKNOWN_LABEL};
use regex::Regex;

/// Labels seen in census metadata plus hostile inputs.
const LABELS: &[&str] = &[
    "Sí",
    "No",
    "Sin instrucción",
    "Primario incompleto (incluye educación especial)",
    "0-14 años",
    "65 años y más",
    "Casa / Departamento",
    "Ñandú",
    "Pieza en hotel familiar o pensión",
    "Ignorado",
    "___",
    "",
    "   ",
    "¿?",
    "🙂 emoji",
    "x'; DROP TABLE radios; --",
    "\"quoted\" label",
    "日本語",
    "12 de Octubre",
    "a  -  b",
    "ÀÉÎÕÜ",
    "tab\tseparated",
];

#[test]
fn test_output_is_a_safe_identifier_or_unknown() {
    let safe = Regex::new(r"^[a-z][a-z0-9_]*$").unwrap();
    for label in LABELS {
        let name = sanitize_label(label);
        assert!(
            safe.is_match(&name),
            "label {:?} produced unsafe name {:?}",
            label,
            name
        );
        assert!(!name.contains("__"), "label {:?} produced {:?}", label, name);
        assert!(!name.ends_with('_'), "label {:?} produced {:?}", label, name);
    }
}

#[test]
fn test_sanitizing_twice_changes_nothing() {
    for label in LABELS {
        let once = sanitize_label(label);
        assert_eq!(sanitize_label(&once), once, "label {:?}", label);
    }
}

#[test]
fn test_labels_without_usable_characters() {
    for label in ["", "   ", "¿?", "日本語", "___", "-/-"] {
        assert_eq!(sanitize_label(label), UNKNOWN_LABEL, "label {:?}", label);
    }
}

#[test]
fn test_injection_text_loses_its_syntax() {
    let name = sanitize_label("x'; DROP TABLE radios; --");
    assert_eq!(name, "x_drop_table_radios");
    assert!(!name.contains('\''));
    assert!(!name.contains(';'));
}

#[test]
fn test_long_labels_are_not_truncated() {
    let label = "Vivienda con acceso a red pública de agua y desagüe cloacal dentro del terreno";
    let name = sanitize_label(label);
    assert_eq!(
        name,
        "vivienda_con_acceso_a_red_publica_de_agua_y_desague_cloacal_dentro_del_terreno"
    );
}
