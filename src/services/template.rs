//! services/template.rs
//! Sustitución simple de placeholders `{{campo}}` con los datos del destinatario.

use std::collections::BTreeMap;

/// Reemplaza cada `{{ clave }}` por el valor del campo. Campos ausentes quedan vacíos.
/// Un `{{` sin cierre se copia tal cual.
pub fn render(template: &str, fields: &BTreeMap<String, String>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after_open = &rest[start + 2..];
        match after_open.find("}}") {
            Some(end) => {
                let key = after_open[..end].trim();
                out.push_str(lookup(fields, key));
                rest = &after_open[end + 2..];
            }
            None => {
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

fn lookup<'a>(fields: &'a BTreeMap<String, String>, key: &str) -> &'a str {
    if let Some(value) = fields.get(key) {
        return value;
    }
    fields
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(key))
        .map(|(_, v)| v.as_str())
        .unwrap_or("")
}

/// Deja solo dígitos, salvo que ya sea un JID del gateway (`...@s.whatsapp.net`, `...@g.us`).
pub fn normalize_address(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.contains('@') {
        return trimmed.to_string();
    }
    trimmed.chars().filter(|c| c.is_ascii_digit()).collect()
}
