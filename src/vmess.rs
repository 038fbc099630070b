//! Naming of kept tokens, including the vmess payload rewrite.
//!
//! A vmess token is `vmess://` followed by base64 of a JSON object whose
//! `ps` field is the display name. Every other token type carries its name
//! in the URL fragment.

use base64::Engine as _;
use base64::alphabet;
use base64::engine::general_purpose::STANDARD;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use serde_json::Value;

use crate::config::Naming;
use crate::error::VmessError;
use crate::extract::{Protocol, Token};

const LENIENT: GeneralPurposeConfig =
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent);
const LENIENT_STANDARD: GeneralPurpose = GeneralPurpose::new(&alphabet::STANDARD, LENIENT);
const LENIENT_URL_SAFE: GeneralPurpose = GeneralPurpose::new(&alphabet::URL_SAFE, LENIENT);

/// Decode a vmess token, replace `ps` with `name`, and re-encode it. All
/// other fields keep their order and serialised values.
pub fn rewrite_vmess(token: &str, name: &str) -> Result<String, VmessError> {
    let payload = token
        .strip_prefix(Protocol::Vmess.prefix())
        .ok_or(VmessError::MissingPrefix)?
        .trim();

    let bytes = match LENIENT_STANDARD.decode(payload) {
        Ok(bytes) => bytes,
        Err(_) => LENIENT_URL_SAFE.decode(payload)?,
    };
    let mut data: Value = serde_json::from_str(&String::from_utf8(bytes)?)?;

    let fields = data.as_object_mut().ok_or(VmessError::NotAnObject)?;
    fields.insert("ps".to_string(), Value::String(name.to_string()));

    let json = serde_json::to_string(&data)?;
    Ok(format!("{}{}", Protocol::Vmess.prefix(), STANDARD.encode(json)))
}

/// Replace (or add) the `#fragment` of a URL-style token.
pub fn with_fragment(token: &str, name: &str) -> String {
    let base = token.split_once('#').map_or(token, |(base, _)| base);
    format!("{}#{}", base, urlencoding::encode(name))
}

/// Applies a [`Naming`] policy to tokens of one source, numbering labels
/// per protocol.
pub struct TokenNamer {
    naming: Naming,
    counters: [u32; 4],
}

impl TokenNamer {
    pub fn new(naming: Naming) -> Self {
        Self {
            naming,
            counters: [0; 4],
        }
    }

    /// Name one token. A vmess token whose payload cannot be rewritten is an
    /// error; the caller drops it and the label counter does not advance.
    pub fn apply(&mut self, token: &Token) -> Result<String, VmessError> {
        let Naming::Label(name) = &self.naming else {
            return match token.protocol {
                Protocol::Vmess => rewrite_vmess(&token.line, ""),
                _ => Ok(token.line.clone()),
            };
        };

        let slot = token.protocol.index();
        let label = format!("{} - {}", name, self.counters[slot] + 1);
        let named = match token.protocol {
            Protocol::Vmess => rewrite_vmess(&token.line, &label)?,
            _ => with_fragment(&token.line, &label),
        };
        self.counters[slot] += 1;
        Ok(named)
    }
}
