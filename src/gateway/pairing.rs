//! gateway/pairing.rs
//! Extracción del artefacto de emparejamiento (QR o código) de respuestas heterogéneas.
//!
//! Cada regla es una función pura que mira un formato conocido; se prueban en
//! orden y gana la primera que devuelve algo.

use serde::Serialize;
use serde_json::Value;

use super::str_at;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PairingArtifact {
    pub qrcode: Option<String>,
    pub pairing_code: Option<String>,
}

impl PairingArtifact {
    pub fn is_empty(&self) -> bool {
        self.qrcode.is_none() && self.pairing_code.is_none()
    }
}

type ExtractRule = fn(&Value) -> Option<String>;

/// Formatos de QR conocidos, en orden de prioridad.
pub const QR_RULES: &[(&str, ExtractRule)] = &[
    ("nested_object", qr_from_nested_object),
    ("bare_base64_field", qr_from_base64_field),
    ("alternate_field", qr_from_alternate_field),
    ("raw_base64_string", qr_from_raw_string),
];

pub const PAIRING_CODE_RULES: &[(&str, ExtractRule)] = &[
    ("top_level", code_from_top_level),
    ("instance_object", code_from_instance),
    ("nested_qrcode_object", code_from_nested_qrcode),
];

fn first_match(rules: &[(&str, ExtractRule)], data: &Value) -> Option<String> {
    rules.iter().find_map(|(name, rule)| {
        let found = rule(data);
        if found.is_some() {
            log::debug!("(pairing::first_match) regla '{}' encontró artefacto", name);
        }
        found
    })
}

pub fn extract_qr(data: &Value) -> Option<String> {
    first_match(QR_RULES, data)
}

pub fn extract_pairing_code(data: &Value) -> Option<String> {
    first_match(PAIRING_CODE_RULES, data)
}

/// Nunca falla: un formato desconocido da un artefacto vacío.
pub fn extract_artifact(data: &Value) -> PairingArtifact {
    PairingArtifact {
        qrcode: extract_qr(data),
        pairing_code: extract_pairing_code(data),
    }
}

// {"qrcode": {"base64": "..."}} o {"instance": {"qrcode": "..."}}
fn qr_from_nested_object(data: &Value) -> Option<String> {
    str_at(data, "/qrcode/base64")
        .or_else(|| str_at(data, "/instance/qrcode/base64"))
        .or_else(|| str_at(data, "/instance/qrcode"))
        .map(str::to_string)
}

// {"base64": "..."}
fn qr_from_base64_field(data: &Value) -> Option<String> {
    str_at(data, "/base64").map(str::to_string)
}

// {"qrcode": "..."} o {"qr": "..."}
fn qr_from_alternate_field(data: &Value) -> Option<String> {
    str_at(data, "/qrcode")
        .or_else(|| str_at(data, "/qr"))
        .map(str::to_string)
}

/// Firmas de los formatos de imagen que devuelven los gateways como QR.
const IMAGE_SIGNATURES: &[&[u8]] = &[
    b"\x89PNG\r\n\x1a\n",
    b"\xff\xd8\xff",
    b"GIF8",
    b"RIFF",
];

// "data:image/png;base64,..." o base64 pelado como cuerpo completo.
// El base64 pelado solo cuenta si decodifica a una imagen: cualquier palabra
// como "InstanceNotFound" también es base64 válido.
fn qr_from_raw_string(data: &Value) -> Option<String> {
    let raw = data.as_str()?.trim();
    if raw.starts_with("data:image") {
        return Some(raw.to_string());
    }
    let compact: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
    let bytes = base64::decode(&compact).ok()?;
    IMAGE_SIGNATURES
        .iter()
        .any(|sig| bytes.starts_with(sig))
        .then(|| raw.to_string())
}

fn code_from_top_level(data: &Value) -> Option<String> {
    str_at(data, "/pairingCode")
        .or_else(|| str_at(data, "/paircode"))
        .map(str::to_string)
}

fn code_from_instance(data: &Value) -> Option<String> {
    str_at(data, "/instance/paircode")
        .or_else(|| str_at(data, "/instance/pairingCode"))
        .map(str::to_string)
}

fn code_from_nested_qrcode(data: &Value) -> Option<String> {
    str_at(data, "/qrcode/pairingCode").map(str::to_string)
}
